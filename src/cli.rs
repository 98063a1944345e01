//! Command-line interface definitions for portsweep.
//!
//! Uses `clap` derive macros for declarative argument parsing. Port range and
//! exclusion values are validated by clap through their `FromStr` impls, so a
//! malformed value never reaches the engine.

use crate::config::AppSettings;
use crate::error::{CliResult, ConfigError, EngineError};
use crate::output::{self, ReportContext, ReportFormat};
use crate::scanner::{EngineState, Protocol, ScanEngine, ScanJob, ScanResult};
use crate::types::{
    AddressSet, NamedRange, PortExclusion, PortRange, PortSelection, TargetSpec,
};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// A concurrent TCP/UDP port reachability scanner.
///
/// Scans a single host, a hostname or a CIDR network. Ports come from any
/// combination of explicit ports, one range and the named IANA blocks, minus
/// an optional exclusion. With no port options, port 80 is scanned.
#[derive(Parser, Debug)]
#[command(name = "portsweep")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A concurrent TCP/UDP port scanner", long_about = None)]
pub struct Args {
    /// Host, hostname or CIDR network to scan (e.g. "10.0.0.1", "10.0.0.0/24")
    #[arg(value_name = "HOST")]
    pub host: String,

    /// Ports to scan (e.g. "-p 22 80" or "-p 22,80")
    #[arg(short, long = "port", value_name = "PORT", num_args = 1.., value_delimiter = ',')]
    pub ports: Vec<u16>,

    /// Inclusive port range (e.g. "1-1024")
    #[arg(short, long, value_name = "N-M", value_parser = PortRange::from_str)]
    pub range: Option<PortRange>,

    /// Ports to skip: a range "N-M" or a quoted list "N M ..."
    #[arg(short, long, value_name = "EXCLUDE", value_parser = PortExclusion::from_str)]
    pub exclude: Option<PortExclusion>,

    /// Scan every port (0-65535)
    #[arg(long)]
    pub all: bool,

    /// Scan the reserved ports (0-1023)
    #[arg(long)]
    pub reserved: bool,

    /// Scan the registered ports (1024-49151)
    #[arg(long)]
    pub registered: bool,

    /// Scan the dynamic/private ports (49152-65535)
    #[arg(long)]
    pub free: bool,

    /// Probe over UDP instead of TCP
    #[arg(long)]
    pub udp: bool,

    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Write the report to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Report every probed port, not only the open ones
    #[arg(short, long)]
    pub verbose: bool,

    /// Maximum number of probes in flight
    #[arg(short = 't', long = "max-threads", value_name = "MAX_THREADS")]
    pub max_threads: Option<usize>,

    /// Give up on outstanding probes after SECS seconds
    #[arg(long, value_name = "SECS")]
    pub drain_timeout: Option<u64>,

    /// Path to a settings file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Command-line flags merged over the settings file.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub verbose: bool,
    pub json: bool,
    pub max_workers: Option<usize>,
    pub drain_timeout: Option<Duration>,
}

/// How a run ended, as seen by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The scan ran to the end; it may still be incomplete.
    Completed,
    /// The engine aborted the scan.
    Failed,
    /// Interrupted with Ctrl-C; no report was written.
    Interrupted,
}

impl RunStatus {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Completed => ExitCode::SUCCESS,
            Self::Failed => ExitCode::FAILURE,
            Self::Interrupted => ExitCode::from(130),
        }
    }
}

enum Waited {
    Finished(Result<ScanResult, EngineError>),
    Interrupted,
}

impl Args {
    /// Settings from `--config`, else the default file, else defaults.
    pub fn settings(&self) -> CliResult<AppSettings> {
        let settings = match &self.config {
            Some(path) => AppSettings::load_from(path)?,
            None => match AppSettings::load() {
                Err(ConfigError::DirectoryNotFound) => AppSettings::default(),
                loaded => loaded?,
            },
        };
        Ok(settings)
    }

    /// Validate the input, run the scan and write the report.
    pub async fn execute(&self, settings: &AppSettings) -> CliResult<RunStatus> {
        let options = self.merge(settings);
        let target = TargetSpec::parse(&self.host)?;
        let addresses = target.resolve().await?;
        let selection = self.to_selection();
        let job = options.job(addresses, &selection);
        let total_ports = job.ports.len();
        info!(%target, ports = %job.ports, protocol = %self.protocol(), "scan requested");

        let spinner = output::scan_spinner(job.address_count(), total_ports);
        let mut handle = ScanEngine::for_protocol(job, self.protocol()).start();

        let waited = tokio::select! {
            result = handle.wait() => Waited::Finished(result),
            _ = interrupted() => Waited::Interrupted,
        };
        spinner.finish_and_clear();

        let result = match waited {
            Waited::Finished(result) => result?,
            Waited::Interrupted => {
                handle.cancel();
                eprintln!("Aborting...");
                // The coordinator aborts its probes; the result is discarded.
                let _ = handle.wait().await;
                return Ok(RunStatus::Interrupted);
            }
        };

        let format = if options.json {
            ReportFormat::Json
        } else {
            ReportFormat::Plain
        };
        let mut ctx = ReportContext {
            total_ports,
            verbose: options.verbose,
            cmdline: std::env::args().collect::<Vec<_>>().join(" "),
            styled: false,
        };

        match &self.file {
            Some(path) => {
                let mut file = BufWriter::new(File::create(path)?);
                output::write_report(&mut file, &result, &ctx, format, true)?;
                file.flush()?;
                output::print_success(&format!("See results in file {}", path.display()));
            }
            None => {
                ctx.styled = console::colors_enabled();
                let stdout = io::stdout();
                let mut out = stdout.lock();
                output::write_report(&mut out, &result, &ctx, format, true)?;
            }
        }

        output::write_error_summary(&mut io::stderr(), &result, console::colors_enabled_stderr())?;

        Ok(match handle.state() {
            EngineState::Aborted => RunStatus::Failed,
            _ => RunStatus::Completed,
        })
    }

    pub fn protocol(&self) -> Protocol {
        if self.udp {
            Protocol::Udp
        } else {
            Protocol::Tcp
        }
    }

    pub fn named_ranges(&self) -> Vec<NamedRange> {
        [
            (self.all, NamedRange::All),
            (self.reserved, NamedRange::Reserved),
            (self.registered, NamedRange::Registered),
            (self.free, NamedRange::Free),
        ]
        .into_iter()
        .filter_map(|(set, named)| set.then_some(named))
        .collect()
    }

    /// Collect the port sources given on the command line.
    pub fn to_selection(&self) -> PortSelection {
        let mut selection = PortSelection::new().with_ports(self.ports.iter().copied());
        if let Some(range) = self.range {
            selection = selection.with_range(range);
        }
        for named in self.named_ranges() {
            selection = selection.with_named(named);
        }
        if let Some(exclude) = &self.exclude {
            selection = selection.with_exclusion(exclude.clone());
        }
        selection
    }

    /// Flags win over the settings file; switches are additive.
    pub fn merge(&self, settings: &AppSettings) -> RunOptions {
        RunOptions {
            verbose: self.verbose || settings.verbose,
            json: self.json || settings.json,
            max_workers: self.max_threads.or(settings.max_workers),
            drain_timeout: self
                .drain_timeout
                .map(Duration::from_secs)
                .or_else(|| settings.drain_timeout()),
        }
    }
}

impl RunOptions {
    /// Describe the work for the engine.
    pub fn job(&self, addresses: impl Into<AddressSet>, selection: &PortSelection) -> ScanJob {
        ScanJob::new(addresses, selection.build())
            .with_verbose(self.verbose)
            .with_max_workers(self.max_workers)
            .with_drain_timeout(self.drain_timeout)
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
