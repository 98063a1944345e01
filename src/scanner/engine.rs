//! Scan engine: bounded concurrent probing of an address x port matrix.
//!
//! The coordinator builds one unit per (address, port) pair, keeps at most
//! `worker_count` of them in flight on a [`JoinSet`], and folds each
//! completion into the [`ScanResult`]. Probe tasks never touch the result;
//! the coordinator is its only writer.
//!
//! ```text
//! Idle --start--> Running --all units resolved--> Completed
//!                    |
//!                    +--empty pool / cancel / drain timeout--> Aborted
//! ```

use crate::error::{EngineError, ProbeResult};
use crate::scanner::result::ScanResult;
use crate::scanner::prober_for;
use crate::scanner::traits::{
    ProbeOutcome, Prober, Protocol, StatusCode, DEFAULT_PROBE_TIMEOUT,
};
use crate::types::{AddressSet, PortSpec};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Number of probes allowed in flight.
///
/// Defaults to one per (address, port) pair. A cap, when given, is a hard
/// upper bound.
pub fn compute_worker_count(address_count: usize, port_count: usize, cap: Option<usize>) -> usize {
    let units = address_count.saturating_mul(port_count);
    match cap {
        Some(cap) => cap.min(units),
        None => units,
    }
}

/// Lifecycle of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Completed,
    Aborted,
}

impl EngineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Immutable description of the work to do.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub addresses: AddressSet,
    pub ports: PortSpec,
    /// Record every outcome instead of only open ports.
    pub verbose: bool,
    /// Upper bound on probes in flight.
    pub max_workers: Option<usize>,
    /// Give up on outstanding probes after this long.
    pub drain_timeout: Option<Duration>,
}

impl ScanJob {
    pub fn new(addresses: impl Into<AddressSet>, ports: PortSpec) -> Self {
        Self {
            addresses: addresses.into(),
            ports,
            verbose: false,
            max_workers: None,
            drain_timeout: None,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Option<Duration>) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Addresses to scan, saturating at `usize::MAX`.
    pub fn address_count(&self) -> usize {
        usize::try_from(self.addresses.len()).unwrap_or(usize::MAX)
    }

    /// Total (address, port) pairs, saturating.
    pub fn unit_count(&self) -> usize {
        self.address_count().saturating_mul(self.ports.len())
    }

    pub fn worker_count(&self) -> usize {
        compute_worker_count(self.address_count(), self.ports.len(), self.max_workers)
    }

    /// Every (address, port) pair, address-major, generated on demand.
    pub fn units(&self) -> impl Iterator<Item = SocketAddr> + Send + '_ {
        self.addresses
            .iter()
            .flat_map(move |ip| self.ports.iter().map(move |port| SocketAddr::new(ip, port)))
    }
}

/// Output of one probe task; a panic inside the prober is caught here.
type UnitOutput = (SocketAddr, std::thread::Result<ProbeResult<StatusCode>>);

enum Event {
    Joined(Option<Result<UnitOutput, JoinError>>),
    Cancelled,
    DeadlineReached,
}

/// A scan, ready to run.
pub struct ScanEngine {
    job: ScanJob,
    prober: Arc<dyn Prober>,
    state: watch::Sender<EngineState>,
}

impl ScanEngine {
    pub fn new(job: ScanJob, prober: Arc<dyn Prober>) -> Self {
        let (state, _) = watch::channel(EngineState::Idle);
        Self { job, prober, state }
    }

    /// Engine using the stock prober for `protocol` and the default timeout.
    pub fn for_protocol(job: ScanJob, protocol: Protocol) -> Self {
        Self::new(job, prober_for(protocol, DEFAULT_PROBE_TIMEOUT))
    }

    pub fn job(&self) -> &ScanJob {
        &self.job
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Spawn the scan on the current tokio runtime.
    pub fn start(self) -> ScanHandle {
        let (cancel, cancel_rx) = watch::channel(false);
        let state = self.state.subscribe();
        let task = tokio::spawn(self.coordinate(cancel_rx));
        ScanHandle {
            state,
            cancel,
            task,
            outcome: None,
        }
    }

    /// Run the scan to completion on the calling task.
    pub async fn run(self) -> ScanResult {
        let (_cancel, cancel_rx) = watch::channel(false);
        self.coordinate(cancel_rx).await
    }

    async fn coordinate(self, mut cancel: watch::Receiver<bool>) -> ScanResult {
        let protocol = self.prober.protocol();
        let mut result = ScanResult::begin();
        self.state.send_replace(EngineState::Running);
        info!(
            units = self.job.unit_count(),
            workers = self.job.worker_count(),
            %protocol,
            "scan started"
        );

        let final_state = match self.drive(&mut result, &mut cancel).await {
            Ok(()) => EngineState::Completed,
            Err(err @ EngineError::DrainTimeout(_)) => {
                warn!(error = %err, "scan did not drain in time");
                result.push_timeout_error(err.to_string());
                EngineState::Aborted
            }
            Err(err) => {
                warn!(error = %err, "scan aborted");
                result.push_engine_error(err.to_string());
                EngineState::Aborted
            }
        };

        result.finalize();
        self.state.send_replace(final_state);
        info!(
            state = %final_state,
            elapsed = result.elapsed_secs(),
            open = result.open_count(),
            task_errors = result.task_errors().len(),
            "scan finished"
        );
        result
    }

    async fn drive(
        &self,
        result: &mut ScanResult,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        let workers = self.job.worker_count();
        if workers == 0 {
            return Err(EngineError::EmptyPool {
                addresses: self.job.address_count(),
                ports: self.job.ports.len(),
                cap: self.job.max_workers,
            });
        }

        let protocol = self.prober.protocol();
        let deadline = self.job.drain_timeout.map(|d| Instant::now() + d);
        let mut units = self.job.units();
        let mut pool: JoinSet<UnitOutput> = JoinSet::new();

        loop {
            while pool.len() < workers {
                let Some(target) = units.next() else { break };
                let prober = Arc::clone(&self.prober);
                pool.spawn(async move {
                    let status = AssertUnwindSafe(prober.probe(target)).catch_unwind().await;
                    (target, status)
                });
            }

            if pool.is_empty() {
                return Ok(());
            }

            let event = tokio::select! {
                biased;
                _ = cancelled(cancel) => Event::Cancelled,
                _ = deadline_reached(deadline) => Event::DeadlineReached,
                joined = pool.join_next() => Event::Joined(joined),
            };

            match event {
                Event::Joined(Some(joined)) => fold(result, joined, protocol, self.job.verbose),
                Event::Joined(None) => return Ok(()),
                Event::Cancelled => {
                    pool.abort_all();
                    return Err(EngineError::Cancelled);
                }
                Event::DeadlineReached => {
                    pool.abort_all();
                    let limit = self.job.drain_timeout.unwrap_or_default();
                    return Err(EngineError::DrainTimeout(limit));
                }
            }
        }
    }
}

/// Fold one finished unit into the result.
fn fold(
    result: &mut ScanResult,
    joined: Result<UnitOutput, JoinError>,
    protocol: Protocol,
    verbose: bool,
) {
    match joined {
        Ok((target, Ok(Ok(status)))) => {
            let outcome = ProbeOutcome::new(target, protocol, status);
            let keep = verbose || outcome.is_open();
            result.record(outcome, keep);
        }
        Ok((target, Ok(Err(err)))) => {
            warn!(%target, error = %err, "probe could not run");
            result.push_task_error(err.to_string());
        }
        Ok((target, Err(panic))) => {
            let message = panic_message(panic.as_ref());
            warn!(%target, %message, "probe panicked");
            result.push_task_error(format!("probe of {target} panicked: {message}"));
        }
        Err(err) => {
            debug!(error = %err, "probe task did not complete");
            result.push_task_error(format!("probe task failed: {err}"));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let sender_dropped = cancel.wait_for(|&c| c).await.is_err();
    // A dropped handle can no longer cancel; keep running.
    if sender_dropped {
        std::future::pending::<()>().await;
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle on a spawned scan.
pub struct ScanHandle {
    state: watch::Receiver<EngineState>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<ScanResult>,
    outcome: Option<Result<ScanResult, EngineError>>,
}

impl ScanHandle {
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// The coordinator task has not returned yet.
    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the coordinator to stop; outstanding probes are aborted.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait for the finalized result.
    ///
    /// The outcome is kept once the coordinator returns, so later calls hand
    /// back the same result. Dropping the future before it resolves leaves
    /// the scan running.
    pub async fn wait(&mut self) -> Result<ScanResult, EngineError> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = (&mut self.task)
            .await
            .map_err(|e| EngineError::Coordinator(e.to_string()));
        self.outcome = Some(outcome.clone());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::types::{expand_network, PortSelection, TargetSpec};
    use async_trait::async_trait;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    /// Deterministic prober: open iff the port is listed.
    #[derive(Default)]
    struct ScriptedProber {
        open_ports: Vec<u16>,
        fail_on: Option<SocketAddr>,
        panic_on: Option<SocketAddr>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        fn protocol(&self) -> Protocol {
            Protocol::Tcp
        }

        async fn probe(&self, target: SocketAddr) -> ProbeResult<StatusCode> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on == Some(target) {
                panic!("injected failure");
            }
            if self.fail_on == Some(target) {
                return Err(ProbeError::Other("injected failure".to_string()));
            }
            if self.open_ports.contains(&target.port()) {
                Ok(StatusCode::OPEN)
            } else {
                Ok(StatusCode::new(111))
            }
        }
    }

    fn ports(list: &[u16]) -> PortSpec {
        PortSelection::new().with_ports(list.iter().copied()).build()
    }

    fn slash_30_job() -> ScanJob {
        ScanJob::new(expand_network("10.0.0.0/30").unwrap(), ports(&[22, 80, 443]))
    }

    #[test]
    fn test_compute_worker_count() {
        assert_eq!(compute_worker_count(10, 5, None), 50);
        assert_eq!(compute_worker_count(10, 5, Some(20)), 20);
        assert_eq!(compute_worker_count(2, 2, Some(100)), 4);
        assert_eq!(compute_worker_count(1, 1, Some(0)), 0);
    }

    #[test]
    fn test_units_cover_cross_product_once() {
        let job = slash_30_job();
        let units: Vec<SocketAddr> = job.units().collect();
        assert_eq!(units.len(), 6);
        assert_eq!(job.unit_count(), 6);

        let unique: std::collections::HashSet<_> = units.iter().collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn test_large_block_is_enumerated_lazily() {
        let addresses = TargetSpec::parse("10.0.0.0/8").unwrap().addresses().unwrap();
        let job = ScanJob::new(addresses, ports(&[22, 80])).with_max_workers(Some(100));

        assert_eq!(job.address_count(), (1 << 24) - 2);
        assert_eq!(job.unit_count(), ((1 << 24) - 2) * 2);
        assert_eq!(job.worker_count(), 100);

        let first: Vec<SocketAddr> = job.units().take(3).collect();
        let expected: Vec<SocketAddr> = ["10.0.0.1:22", "10.0.0.1:80", "10.0.0.2:22"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(first, expected);
    }

    #[test]
    fn test_ipv6_everything_saturates_counts() {
        let addresses = TargetSpec::parse("::/0").unwrap().addresses().unwrap();
        let job = ScanJob::new(addresses, ports(&[80]));
        assert_eq!(job.address_count(), usize::MAX);
        assert_eq!(job.unit_count(), usize::MAX);
    }

    #[tokio::test]
    async fn test_localhost_scan() {
        let localhost: IpAddr = "127.0.0.1".parse().unwrap();
        let job = ScanJob::new(vec![localhost], ports(&[1, 65535])).with_verbose(true);
        let engine = ScanEngine::for_protocol(job, Protocol::Tcp);
        assert_eq!(engine.state(), EngineState::Idle);

        let result = engine.run().await;

        let host = result.host(&localhost).unwrap();
        assert_eq!(host.outcomes().len(), 2);
        let mut scanned: Vec<u16> = host.outcomes().iter().map(|o| o.port).collect();
        scanned.sort_unstable();
        assert_eq!(scanned, vec![1, 65535]);
        assert!(result.elapsed_secs() > 0.0);
        assert!(result.errors().is_empty());
    }

    #[tokio::test]
    async fn test_finds_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let localhost: IpAddr = "127.0.0.1".parse().unwrap();
        let job = ScanJob::new(vec![localhost], ports(&[open, closed]));
        let result = ScanEngine::for_protocol(job, Protocol::Tcp).run().await;

        let host = result.host(&localhost).unwrap();
        assert_eq!(host.completed(), 2);
        assert_eq!(host.outcomes().len(), 1);
        assert_eq!(host.outcomes()[0].port, open);
        assert!(host.outcomes()[0].is_open());
    }

    #[tokio::test]
    async fn test_non_verbose_suppresses_closed_ports() {
        let prober = Arc::new(ScriptedProber {
            open_ports: vec![80],
            ..Default::default()
        });
        let result = ScanEngine::new(slash_30_job(), prober.clone()).run().await;

        assert_eq!(prober.calls.load(Ordering::SeqCst), 6);
        assert_eq!(result.hosts().len(), 2);
        assert_eq!(result.completed_count(), 6);
        assert_eq!(result.recorded_count(), 2);

        let suppressed: usize = result.hosts().values().map(|h| h.suppressed()).sum();
        assert_eq!(result.recorded_count() + suppressed, 6);
        for host in result.hosts().values() {
            assert_eq!(host.outcomes()[0].port, 80);
            assert_eq!(host.outcomes()[0].service, "http");
        }
    }

    #[tokio::test]
    async fn test_verbose_records_everything() {
        let prober = Arc::new(ScriptedProber::default());
        let job = slash_30_job().with_verbose(true);
        let result = ScanEngine::new(job, prober).run().await;

        assert_eq!(result.recorded_count(), 6);
        assert_eq!(result.open_count(), 0);
        assert!(result
            .hosts()
            .values()
            .flat_map(|h| h.outcomes())
            .all(|o| o.status.code() == 111));
    }

    #[tokio::test]
    async fn test_failing_probe_becomes_task_error() {
        let bad: SocketAddr = "10.0.0.2:443".parse().unwrap();
        let prober = Arc::new(ScriptedProber {
            fail_on: Some(bad),
            ..Default::default()
        });
        let job = slash_30_job().with_verbose(true);
        let result = ScanEngine::new(job, prober).run().await;

        assert_eq!(result.task_errors().len(), 1);
        assert_eq!(result.recorded_count(), 5);
        assert!(result.engine_errors().is_empty());
        assert!(result.is_incomplete());
        assert!(!result
            .hosts()
            .values()
            .flat_map(|h| h.outcomes())
            .any(|o| SocketAddr::new(o.address, o.port) == bad));
    }

    #[tokio::test]
    async fn test_panicking_probe_is_isolated() {
        let bad: SocketAddr = "10.0.0.1:22".parse().unwrap();
        let prober = Arc::new(ScriptedProber {
            panic_on: Some(bad),
            ..Default::default()
        });
        let job = slash_30_job().with_verbose(true);
        let result = ScanEngine::new(job, prober).run().await;

        assert_eq!(result.task_errors().len(), 1);
        assert!(result.task_errors()[0].description.contains("injected failure"));
        assert_eq!(result.recorded_count(), 5);
    }

    #[tokio::test]
    async fn test_worker_cap_is_enforced() {
        let prober = Arc::new(ScriptedProber {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let addresses = expand_network("10.0.0.0/29").unwrap();
        let job = ScanJob::new(addresses, ports(&[1, 2, 3])).with_max_workers(Some(3));
        assert_eq!(job.worker_count(), 3);

        let result = ScanEngine::new(job, prober.clone()).run().await;

        assert_eq!(result.completed_count(), 18);
        assert!(prober.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_zero_workers_aborts_with_engine_error() {
        let prober = Arc::new(ScriptedProber::default());
        let job = slash_30_job().with_max_workers(Some(0));
        let mut handle = ScanEngine::new(job, prober.clone()).start();
        let result = handle.wait().await.unwrap();

        assert_eq!(handle.state(), EngineState::Aborted);
        assert_eq!(result.engine_errors().len(), 1);
        assert!(result.hosts().is_empty());
        assert!(result.is_finalized());
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_aborts_scan() {
        let prober = Arc::new(ScriptedProber {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let mut handle = ScanEngine::new(slash_30_job(), prober).start();
        assert!(handle.is_alive());

        handle.cancel();
        let result = handle.wait().await.unwrap();

        assert_eq!(handle.state(), EngineState::Aborted);
        assert!(!handle.is_alive());
        assert_eq!(result.engine_errors().len(), 1);
        assert_eq!(result.engine_errors()[0].description, "scan cancelled by operator");
        assert!(result.is_finalized());
    }

    #[tokio::test]
    async fn test_drain_timeout_is_recorded() {
        let prober = Arc::new(ScriptedProber {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let job = slash_30_job().with_drain_timeout(Some(Duration::from_millis(50)));
        let result = ScanEngine::new(job, prober).run().await;

        assert_eq!(result.timeout_errors().len(), 1);
        assert!(result.engine_errors().is_empty());
        assert_eq!(result.completed_count(), 0);
        assert!(result.elapsed_secs() >= 0.05);
    }

    #[tokio::test]
    async fn test_handle_reports_completion() {
        let prober = Arc::new(ScriptedProber {
            open_ports: vec![22],
            ..Default::default()
        });
        let mut handle = ScanEngine::new(slash_30_job(), prober).start();
        let result = handle.wait().await.unwrap();

        assert_eq!(handle.state(), EngineState::Completed);
        assert!(!handle.is_running());
        assert_eq!(result.open_count(), 2);
    }

    #[tokio::test]
    async fn test_wait_can_be_repeated() {
        let prober = Arc::new(ScriptedProber {
            open_ports: vec![443],
            ..Default::default()
        });
        let mut handle = ScanEngine::new(slash_30_job(), prober).start();

        let first = handle.wait().await.unwrap();
        let second = handle.wait().await.unwrap();

        assert_eq!(first.open_count(), 2);
        assert_eq!(second.open_count(), first.open_count());
        assert_eq!(second.completed_count(), 6);
        assert_eq!(second.elapsed_secs(), first.elapsed_secs());
        assert_eq!(second.started_at(), first.started_at());
    }
}
