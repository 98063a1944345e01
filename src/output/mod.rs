//! Output formatting module.
//!
//! Renders a finished [`ScanResult`] as plain text or JSON, summarizes its
//! errors, and draws the spinner shown while a scan runs. Renderers write to
//! any [`io::Write`] so the same code serves stdout, report files and tests.

mod json_format;
mod plain;
mod progress;

pub use json_format::{write_json, JsonReport};
pub use plain::{write_error_summary, write_header, write_plain};
pub use progress::scan_spinner;

use crate::scanner::ScanResult;
use console::style;
use std::io::{self, Write};

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Plain,
    Json,
}

/// What the renderers need to know beyond the result itself.
#[derive(Debug, Clone)]
pub struct ReportContext {
    /// Ports requested per host.
    pub total_ports: usize,
    /// List every recorded outcome, not only open ports.
    pub verbose: bool,
    /// Command line that produced the scan, for the JSON document.
    pub cmdline: String,
    /// Emit terminal colors.
    pub styled: bool,
}

/// Write the report in the requested format.
///
/// `with_header` prefixes the plain report with the program banner; the JSON
/// document carries its own name and version.
pub fn write_report<W: Write>(
    out: &mut W,
    result: &ScanResult,
    ctx: &ReportContext,
    format: ReportFormat,
    with_header: bool,
) -> io::Result<()> {
    match format {
        ReportFormat::Plain => {
            if with_header {
                write_header(out, ctx.styled)?;
            }
            write_plain(out, result, ctx)
        }
        ReportFormat::Json => write_json(out, result, ctx),
    }
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", style("Done !").green().bold(), msg);
}
