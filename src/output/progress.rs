//! Spinner drawn on stderr while a scan runs.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Start a steady spinner describing the scan.
pub fn scan_spinner(hosts: usize, ports: usize) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(format!(
        "Scanning {} port{} on {} host{}...",
        ports,
        plural(ports),
        hosts,
        plural(hosts)
    ));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
