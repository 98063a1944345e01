//! Prober trait abstraction and the per-probe value types.
//!
//! A [`Prober`] checks one socket address and reports a [`StatusCode`].
//! The engine only talks to probers through this trait, which is also how
//! tests substitute deterministic or failing probes.

use crate::error::ProbeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Hard per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport used for every probe of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            _ => Err(format!("unknown protocol: {}", s)),
        }
    }
}

/// Raw probe status: `0` means open/responded, anything else means not open.
///
/// Non-zero values are either [`StatusCode::NO_RESPONSE`] or the OS error
/// code reported by a failed connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(i32);

impl StatusCode {
    pub const OPEN: Self = Self(0);
    pub const NO_RESPONSE: Self = Self(-1);

    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    /// Map an IO error to the OS code it carries, or `-1`.
    pub fn from_io_error(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) if code != 0 => Self(code),
            _ => Self::NO_RESPONSE,
        }
    }

    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn is_open(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_open() {
            write!(f, "open")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Outcome of one probe.
///
/// The address is left out of the serialized form; outcomes are always
/// grouped under their host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    #[serde(skip_serializing)]
    pub address: IpAddr,
    pub port: u16,
    pub protocol: Protocol,
    pub service: String,
    pub status: StatusCode,
}

impl ProbeOutcome {
    pub fn new(target: SocketAddr, protocol: Protocol, status: StatusCode) -> Self {
        Self {
            address: target.ip(),
            port: target.port(),
            protocol,
            service: crate::services::lookup_service_name(target.port()).to_string(),
            status,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Trait for single-address reachability checks.
///
/// Implementations must never panic and must fold every connect, send or
/// receive failure into the returned [`StatusCode`]. `Err` is reserved for
/// probes that could not run at all, which the engine records as a task
/// error.
#[async_trait]
pub trait Prober: Send + Sync {
    /// The transport this prober speaks.
    fn protocol(&self) -> Protocol;

    /// Probe one address.
    async fn probe(&self, target: SocketAddr) -> ProbeResult<StatusCode>;
}
