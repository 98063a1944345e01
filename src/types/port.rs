//! Port selection types with validation and parsing.
//!
//! A scan's port set is assembled from several sources (explicit ports, one
//! inclusive range, the named IANA ranges) minus an exclusion. [`PortSelection`]
//! collects those sources and [`PortSelection::build`] resolves them into a
//! [`PortSpec`]: ascending, unique, never empty.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Port scanned when a selection resolves to nothing.
pub const DEFAULT_PORT: u16 = 80;

/// Error type for port range and exclusion parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("invalid port range {0}")]
    InvalidFormat(String),
    #[error("port {0} is out of valid range (0-65535)")]
    OutOfRange(String),
    #[error("invalid port range: start ({0}) > end ({1})")]
    InvalidRange(u16, u16),
    #[error("empty port specification")]
    Empty,
}

/// An inclusive range of ports, written `N-M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Create a new port range.
    pub fn new(start: u16, end: u16) -> Result<Self, PortError> {
        if start > end {
            Err(PortError::InvalidRange(start, end))
        } else {
            Ok(Self { start, end })
        }
    }

    pub const fn start(&self) -> u16 {
        self.start
    }

    pub const fn end(&self) -> u16 {
        self.end
    }

    /// Number of ports in the range.
    pub const fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    /// A valid range always holds at least one port.
    pub const fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for PortRange {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| PortError::InvalidFormat(s.to_string()))?;

        Self::new(parse_port(start)?, parse_port(end)?)
    }
}

/// Ports removed from a selection: either a range or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortExclusion {
    Range(PortRange),
    List(Vec<u16>),
}

impl PortExclusion {
    pub fn contains(&self, port: u16) -> bool {
        match self {
            Self::Range(range) => range.contains(port),
            Self::List(ports) => ports.contains(&port),
        }
    }
}

impl FromStr for PortExclusion {
    type Err = PortError;

    /// Accepts `"100-110"` or a space-separated list such as `"110 111"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains('-') {
            return s.parse().map(Self::Range);
        }

        let ports = s
            .split_whitespace()
            .map(parse_port)
            .collect::<Result<Vec<_>, _>>()?;
        if ports.is_empty() {
            return Err(PortError::Empty);
        }
        Ok(Self::List(ports))
    }
}

/// Well-known IANA port blocks that can be selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamedRange {
    /// 0-1023
    Reserved,
    /// 1024-49151
    Registered,
    /// 49152-65535
    Free,
    /// 0-65535
    All,
}

impl NamedRange {
    pub const fn range(self) -> PortRange {
        let (start, end) = match self {
            Self::Reserved => (0, 1023),
            Self::Registered => (1024, 49151),
            Self::Free => (49152, 65535),
            Self::All => (0, 65535),
        };
        PortRange { start, end }
    }
}

impl fmt::Display for NamedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved => write!(f, "reserved"),
            Self::Registered => write!(f, "registered"),
            Self::Free => write!(f, "free"),
            Self::All => write!(f, "all"),
        }
    }
}

/// The raw port sources of a scan, before resolution.
#[derive(Debug, Clone, Default)]
pub struct PortSelection {
    pub ports: Vec<u16>,
    pub range: Option<PortRange>,
    pub named: Vec<NamedRange>,
    pub exclude: Option<PortExclusion>,
}

impl PortSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ports.extend(ports);
        self
    }

    pub fn with_range(mut self, range: PortRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_named(mut self, named: NamedRange) -> Self {
        self.named.push(named);
        self
    }

    pub fn with_exclusion(mut self, exclude: PortExclusion) -> Self {
        self.exclude = Some(exclude);
        self
    }

    /// Union every inclusion source, drop excluded ports, and fall back to
    /// [`DEFAULT_PORT`] when nothing is left.
    pub fn build(&self) -> PortSpec {
        let mut set: BTreeSet<u16> = self.ports.iter().copied().collect();
        if let Some(range) = &self.range {
            set.extend(range.iter());
        }
        for named in &self.named {
            set.extend(named.range().iter());
        }
        if let Some(exclude) = &self.exclude {
            set.retain(|&port| !exclude.contains(port));
        }

        if set.is_empty() {
            set.insert(DEFAULT_PORT);
        }

        PortSpec {
            ports: set.into_iter().collect(),
        }
    }
}

/// A resolved port set: ascending, unique, non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortSpec {
    ports: Vec<u16>,
}

impl PortSpec {
    pub fn as_slice(&self) -> &[u16] {
        &self.ports
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.iter().copied()
    }

    /// Collapse consecutive ports back into ranges.
    pub fn ranges(&self) -> Vec<PortRange> {
        let mut ranges: Vec<PortRange> = Vec::new();
        for &port in &self.ports {
            match ranges.last_mut() {
                Some(last) if last.end.checked_add(1) == Some(port) => last.end = port,
                _ => ranges.push(PortRange {
                    start: port,
                    end: port,
                }),
            }
        }
        ranges
    }
}

impl Default for PortSpec {
    fn default() -> Self {
        PortSelection::new().build()
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.ranges().iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

fn parse_port(s: &str) -> Result<u16, PortError> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PortError::InvalidFormat(s.to_string()));
    }
    s.parse().map_err(|_| PortError::OutOfRange(s.to_string()))
}
