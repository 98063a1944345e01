//! Scan result aggregate.
//!
//! [`ScanResult`] is the only artifact a scan produces. The engine's
//! coordinator is its single writer: mutation is crate-private and happens
//! while the scan runs, after which the value is handed out read-only.

use crate::scanner::traits::ProbeOutcome;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Instant;

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    #[serde(serialize_with = "epoch_seconds")]
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl ErrorEntry {
    fn now(description: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            description: description.into(),
        }
    }
}

/// The three failure lists of a scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanErrors {
    /// Orchestration failures that aborted the run.
    pub engine: Vec<ErrorEntry>,
    /// Individual probes that could not run.
    pub task: Vec<ErrorEntry>,
    /// The pool did not drain in time.
    pub timeout: Vec<ErrorEntry>,
}

impl ScanErrors {
    pub fn is_empty(&self) -> bool {
        self.engine.is_empty() && self.task.is_empty() && self.timeout.is_empty()
    }
}

/// Per-host outcomes, in completion order.
///
/// Serializes as the bare list of outcomes.
#[derive(Debug, Clone, Default)]
pub struct HostResults {
    completed: usize,
    ports: Vec<ProbeOutcome>,
}

impl HostResults {
    /// Probes against this host that finished, recorded or not.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Outcomes kept in detail.
    pub fn outcomes(&self) -> &[ProbeOutcome] {
        &self.ports
    }

    /// Completed probes whose detail was dropped (not open, not verbose).
    pub fn suppressed(&self) -> usize {
        self.completed - self.ports.len()
    }

    pub fn open_count(&self) -> usize {
        self.ports.iter().filter(|o| o.is_open()).count()
    }
}

impl Serialize for HostResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.ports)
    }
}

/// Aggregated result of one scan run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    #[serde(rename = "start", serialize_with = "epoch_seconds")]
    started_at: DateTime<Utc>,
    #[serde(rename = "end", serialize_with = "epoch_seconds")]
    ended_at: DateTime<Utc>,
    #[serde(rename = "elapsed")]
    elapsed_secs: f64,
    hosts: BTreeMap<IpAddr, HostResults>,
    errors: ScanErrors,
    #[serde(skip)]
    clock: Instant,
    #[serde(skip)]
    finalized: bool,
}

impl ScanResult {
    /// Empty result stamped with the current time.
    pub(crate) fn begin() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            ended_at: now,
            elapsed_secs: 0.0,
            hosts: BTreeMap::new(),
            errors: ScanErrors::default(),
            clock: Instant::now(),
            finalized: false,
        }
    }

    /// Count a finished probe for its host; keep the detail only if asked.
    pub(crate) fn record(&mut self, outcome: ProbeOutcome, keep_detail: bool) {
        let host = self.hosts.entry(outcome.address).or_default();
        host.completed += 1;
        if keep_detail {
            host.ports.push(outcome);
        }
    }

    pub(crate) fn push_engine_error(&mut self, description: impl Into<String>) {
        self.errors.engine.push(ErrorEntry::now(description));
    }

    pub(crate) fn push_task_error(&mut self, description: impl Into<String>) {
        self.errors.task.push(ErrorEntry::now(description));
    }

    pub(crate) fn push_timeout_error(&mut self, description: impl Into<String>) {
        self.errors.timeout.push(ErrorEntry::now(description));
    }

    /// Stamp the end time and elapsed duration.
    ///
    /// Elapsed time comes from a monotonic clock, so it never goes negative
    /// even if the wall clock jumps during the scan.
    pub(crate) fn finalize(&mut self) {
        self.ended_at = Utc::now();
        self.elapsed_secs = self.clock.elapsed().as_secs_f64();
        self.finalized = true;
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn hosts(&self) -> &BTreeMap<IpAddr, HostResults> {
        &self.hosts
    }

    pub fn host(&self, address: &IpAddr) -> Option<&HostResults> {
        self.hosts.get(address)
    }

    pub fn errors(&self) -> &ScanErrors {
        &self.errors
    }

    pub fn engine_errors(&self) -> &[ErrorEntry] {
        &self.errors.engine
    }

    pub fn task_errors(&self) -> &[ErrorEntry] {
        &self.errors.task
    }

    pub fn timeout_errors(&self) -> &[ErrorEntry] {
        &self.errors.timeout
    }

    /// Probes that finished with an outcome, across all hosts.
    pub fn completed_count(&self) -> usize {
        self.hosts.values().map(HostResults::completed).sum()
    }

    /// Outcomes kept in detail, across all hosts.
    pub fn recorded_count(&self) -> usize {
        self.hosts.values().map(|h| h.outcomes().len()).sum()
    }

    pub fn open_count(&self) -> usize {
        self.hosts.values().map(HostResults::open_count).sum()
    }

    /// Some probes never produced an outcome.
    pub fn is_incomplete(&self) -> bool {
        !self.errors.task.is_empty() || !self.errors.timeout.is_empty()
    }
}

fn epoch_seconds<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(time.timestamp_micros() as f64 / 1_000_000.0)
}
