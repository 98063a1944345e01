//! Error types for portsweep.
//!
//! Uses `thiserror` for ergonomic error definitions. Validation errors for
//! targets and ports live next to their types in [`crate::types`] and are
//! folded into [`CliError`] here.

use crate::types::{PortError, TargetError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single probe that could not even get a socket.
///
/// Connect, send and receive failures never show up here; they are
/// reported as a status code instead.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to allocate {protocol} socket for {target}: {source}")]
    SocketAllocation {
        protocol: &'static str,
        target: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("probe failed: {0}")]
    Other(String),
}

/// Orchestration-level failures of the scan engine.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("cannot build a worker pool with zero workers ({addresses} addresses x {ports} ports, cap {cap:?})")]
    EmptyPool {
        addresses: usize,
        ports: usize,
        cap: Option<usize>,
    },

    #[error("timed out after {0:?} waiting for outstanding probes")]
    DrainTimeout(Duration),

    #[error("scan cancelled by operator")]
    Cancelled,

    #[error("scan coordinator failed: {0}")]
    Coordinator(String),
}

/// Settings file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine configuration directory")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("invalid settings file: {0}")]
    InvalidFormat(String),
}

/// Top-level error for the command-line front end.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for the CLI layer.
pub type CliResult<T> = Result<T, CliError>;
