//! Plain text output formatting.
//!
//! Produces human-readable output, colored when the context asks for it.

use super::ReportContext;
use crate::scanner::{HostResults, ScanResult};
use chrono::Local;
use console::Style;
use std::io::{self, Write};
use std::net::IpAddr;

/// Program banner, `portsweep v<version>`.
pub fn write_header<W: Write>(out: &mut W, styled: bool) -> io::Result<()> {
    let title = Style::new().cyan().bold().force_styling(styled);
    writeln!(
        out,
        "{} v{}",
        title.apply_to(env!("CARGO_PKG_NAME")),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out)
}

/// Timing block followed by one section per host.
pub fn write_plain<W: Write>(out: &mut W, result: &ScanResult, ctx: &ReportContext) -> io::Result<()> {
    let started = result.started_at().with_timezone(&Local);
    writeln!(out, "Scan started at {}", started.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "Scan performed in {:.2} seconds", result.elapsed_secs())?;
    writeln!(out)?;

    if result.hosts().is_empty() {
        let dim = Style::new().dim().force_styling(ctx.styled);
        writeln!(out, "{}", dim.apply_to("No results !"))?;
        return Ok(());
    }

    for (address, host) in result.hosts() {
        write_host(out, address, host, ctx)?;
    }
    Ok(())
}

fn write_host<W: Write>(
    out: &mut W,
    address: &IpAddr,
    host: &HostResults,
    ctx: &ReportContext,
) -> io::Result<()> {
    let bold = Style::new().bold().force_styling(ctx.styled);
    let open = host.open_count();

    writeln!(out, "Host {}", bold.apply_to(address))?;
    writeln!(
        out,
        "Total ports scanned {} (of {}), not open {}, open {}",
        host.completed(),
        ctx.total_ports,
        host.completed() - open,
        open
    )?;

    if open == 0 && !ctx.verbose {
        writeln!(out)?;
        return Ok(());
    }

    let mut rows: Vec<_> = host
        .outcomes()
        .iter()
        .filter(|o| ctx.verbose || o.is_open())
        .collect();
    rows.sort_by_key(|o| o.port);

    let open_style = Style::new().green().bold().force_styling(ctx.styled);
    let closed_style = Style::new().red().force_styling(ctx.styled);

    writeln!(
        out,
        "  {:>5}  {:<4}  {:<6}  {}",
        bold.apply_to("PORT"),
        bold.apply_to("TYPE"),
        bold.apply_to("STATE"),
        bold.apply_to("SERVICE")
    )?;
    for outcome in rows {
        let state = if outcome.is_open() {
            &open_style
        } else {
            &closed_style
        };
        writeln!(
            out,
            "  {:>5}  {:<4}  {:<6}  {}",
            outcome.port,
            outcome.protocol.to_string(),
            state.apply_to(outcome.status.to_string()),
            outcome.service
        )?;
    }
    writeln!(out)
}

/// Tell the operator whether the scan can be trusted.
///
/// Probes that never ran or a pool that never drained make the scan
/// incomplete; an engine error means it was aborted.
pub fn write_error_summary<W: Write>(out: &mut W, result: &ScanResult, styled: bool) -> io::Result<()> {
    let errors = result.errors();

    if !errors.task.is_empty() || !errors.timeout.is_empty() {
        let warning = Style::new().yellow().bold().force_styling(styled);
        writeln!(out, "{}", warning.apply_to("WARNING ! The scan is incomplete !"))?;
        writeln!(
            out,
            "{} probe(s) could not run and {} drain timeout(s) occurred.",
            errors.task.len(),
            errors.timeout.len()
        )?;
        writeln!(
            out,
            "Lower the number of concurrent probes with -t MAX_THREADS and scan again."
        )?;
    }

    if let Some(first) = errors.engine.first() {
        let alert = Style::new().red().bold().force_styling(styled);
        writeln!(
            out,
            "{} {} engine error(s), first: {}",
            alert.apply_to("ALERT !"),
            errors.engine.len(),
            first.description
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support::sample_result;

    fn context(verbose: bool) -> ReportContext {
        ReportContext {
            total_ports: 2,
            verbose,
            cmdline: String::new(),
            styled: false,
        }
    }

    fn render(result: &ScanResult, verbose: bool) -> String {
        let mut out = Vec::new();
        write_plain(&mut out, result, &context(verbose)).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_header() {
        let mut out = Vec::new();
        write_header(&mut out, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().next().unwrap(), format!("portsweep v{}", env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_open_ports_only() {
        let text = render(&sample_result(false), false);

        assert!(text.contains("Scan started at "));
        assert!(text.contains("Scan performed in "));
        assert!(text.contains("Host 10.0.0.1"));
        assert!(text.contains("Total ports scanned 2 (of 2), not open 1, open 1"));
        assert!(text.contains("Host 10.0.0.2"));
        assert!(text.contains("Total ports scanned 1 (of 2), not open 1, open 0"));

        let rows: Vec<&str> = text.lines().filter(|l| l.contains(" tcp ")).collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains("open"));
        assert!(rows[0].contains("http"));
    }

    #[test]
    fn test_verbose_lists_every_port() {
        let text = render(&sample_result(true), true);

        let rows: Vec<&str> = text.lines().filter(|l| l.contains(" tcp ")).collect();
        assert_eq!(rows.len(), 3);
        // sorted by port within a host
        assert!(rows[0].contains("22") && rows[0].contains("111"));
        assert!(rows[1].contains("80") && rows[1].contains("open"));
        assert!(rows[2].contains("-1"));
        assert_eq!(text.matches("PORT").count(), 2);
    }

    #[test]
    fn test_no_results() {
        let mut result = ScanResult::begin();
        result.finalize();
        assert!(render(&result, false).contains("No results !"));
    }

    #[test]
    fn test_clean_scan_has_no_summary() {
        let mut out = Vec::new();
        write_error_summary(&mut out, &sample_result(false), false).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_incomplete_scan_summary() {
        let mut result = sample_result(false);
        result.push_task_error("failed to allocate tcp socket");
        result.push_timeout_error("timed out");

        let mut out = Vec::new();
        write_error_summary(&mut out, &result, false).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("WARNING ! The scan is incomplete !"));
        assert!(text.contains("1 probe(s) could not run and 1 drain timeout(s)"));
        assert!(text.contains("-t"));
        assert!(!text.contains("ALERT"));
    }

    #[test]
    fn test_engine_error_alert() {
        let mut result = sample_result(false);
        result.push_engine_error("scan cancelled by operator");

        let mut out = Vec::new();
        write_error_summary(&mut out, &result, false).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("ALERT ! 1 engine error(s), first: scan cancelled by operator"));
        assert!(!text.contains("WARNING"));
    }
}
