//! Scanner module - probes and the engine that drives them.
//!
//! [`TcpProber`] and [`UdpProber`] implement [`Prober`] for a single
//! (address, port) pair. [`ScanEngine`] fans a job out over a bounded pool of
//! probe tasks and folds their outcomes into a [`ScanResult`].

pub mod engine;
pub mod result;
pub mod tcp;
pub mod traits;
pub mod udp;

use std::sync::Arc;
use std::time::Duration;

pub use engine::{compute_worker_count, EngineState, ScanEngine, ScanHandle, ScanJob};
pub use result::{ErrorEntry, HostResults, ScanErrors, ScanResult};
pub use tcp::TcpProber;
pub use traits::{ProbeOutcome, Prober, Protocol, StatusCode, DEFAULT_PROBE_TIMEOUT};
pub use udp::{build_query, UdpProber};

/// Stock prober for a protocol.
pub fn prober_for(protocol: Protocol, timeout: Duration) -> Arc<dyn Prober> {
    match protocol {
        Protocol::Tcp => Arc::new(TcpProber::new(timeout)),
        Protocol::Udp => Arc::new(UdpProber::new(timeout)),
    }
}
