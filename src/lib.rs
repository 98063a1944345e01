//! # portsweep - A Concurrent Port Reachability Scanner
//!
//! portsweep expands a host or CIDR network and a port selection into
//! (address, port) pairs, probes each one over TCP or UDP on a bounded pool
//! of tokio tasks, and aggregates the outcomes with timing and error lists.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use portsweep::scanner::{Protocol, ScanEngine, ScanJob};
//! use portsweep::types::{expand_network, PortSelection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let addresses = expand_network("192.168.1.0/30")?;
//!     let ports = PortSelection::new().with_ports([22, 80, 443]).build();
//!
//!     let job = ScanJob::new(addresses, ports).with_max_workers(Some(64));
//!     let result = ScanEngine::for_protocol(job, Protocol::Tcp).run().await;
//!
//!     for (address, host) in result.hosts() {
//!         for outcome in host.outcomes() {
//!             println!("{address}:{} {}", outcome.port, outcome.status);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Targets and port selections, validated on parse
//! - [`scanner`] - TCP/UDP probes and the scan engine
//! - [`services`] - Static port-to-service-name table
//! - [`config`] - Settings file
//! - [`output`] - Plain text and JSON reports
//! - [`cli`] - Command-line front end
//! - [`error`] - Error types

pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod scanner;
pub mod services;
pub mod types;

// Re-export commonly used types
pub use error::{CliError, EngineError, ProbeError};
pub use scanner::{ProbeOutcome, Prober, Protocol, ScanEngine, ScanHandle, ScanJob, ScanResult};
pub use types::{PortSelection, PortSpec, TargetSpec};
