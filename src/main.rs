//! portsweep command-line entry point.

use anyhow::Context;
use clap::Parser;
use portsweep::cli::Args;
use portsweep::config::AppSettings;
use portsweep::output;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let settings = args.settings().context("failed to load settings")?;
    init_logging(&settings);

    let status = args.execute(&settings).await?;
    Ok(status.exit_code())
}

/// Log to stderr. `RUST_LOG` wins over the settings file; default is `warn`.
fn init_logging(settings: &AppSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.log_level.as_deref().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
