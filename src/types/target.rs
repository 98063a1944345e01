//! Target specification types with CIDR and hostname support.
//!
//! A target is a single address, a CIDR block or a hostname. Expansion
//! follows host-enumeration semantics:
//!
//! | block              | addresses produced                          |
//! |--------------------|---------------------------------------------|
//! | IPv4 `/0`..=`/30`  | every address except network and broadcast  |
//! | IPv4 `/31`         | both addresses (point-to-point link)        |
//! | IPv4 `/32`, bare   | the address itself                          |
//! | IPv6 `/0`..=`/126` | every address except the subnet-router one  |
//! | IPv6 `/127`        | both addresses                              |
//! | IPv6 `/128`, bare  | the address itself                          |
//!
//! Blocks of any size are accepted. [`AddressSet`] keeps a block as its first
//! and last host and yields addresses on demand.

use ipnetwork::IpNetwork;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// Error type for target parsing and resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("invalid host: {0}")]
    InvalidFormat(String),
    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),
    #[error("hostname '{0}' must be resolved before it can be expanded")]
    Unresolved(String),
    #[error("failed to resolve hostname '{0}': {1}")]
    DnsResolutionFailed(String, String),
    #[error("no IP addresses found for hostname '{0}'")]
    NoAddressesFound(String),
}

/// What the operator asked to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// A single IP address.
    Single(IpAddr),
    /// A CIDR network block. Host bits in the input are ignored.
    Cidr(IpNetwork),
    /// A hostname to be resolved.
    Hostname(String),
}

/// The usable addresses of a target.
///
/// Blocks are stored as an inclusive range of host addresses, so even an
/// IPv6 `/0` costs two integers. Ranges are never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSet {
    List(Vec<IpAddr>),
    V4 { first: u32, last: u32 },
    V6 { first: u128, last: u128 },
}

impl AddressSet {
    /// Number of addresses. Cannot overflow: the largest set, an IPv6 `/0`
    /// without its network address, holds `u128::MAX` hosts.
    pub fn len(&self) -> u128 {
        match self {
            Self::List(list) => list.len() as u128,
            Self::V4 { first, last } => u128::from(last - first) + 1,
            Self::V6 { first, last } => last - first + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::List(list) if list.is_empty())
    }

    /// Addresses in ascending order (insertion order for a list).
    pub fn iter(&self) -> Box<dyn Iterator<Item = IpAddr> + Send + '_> {
        match self {
            Self::List(list) => Box::new(list.iter().copied()),
            Self::V4 { first, last } => {
                Box::new((*first..=*last).map(|n| IpAddr::V4(Ipv4Addr::from(n))))
            }
            Self::V6 { first, last } => {
                Box::new((*first..=*last).map(|n| IpAddr::V6(Ipv6Addr::from(n))))
            }
        }
    }
}

impl From<Vec<IpAddr>> for AddressSet {
    fn from(list: Vec<IpAddr>) -> Self {
        Self::List(list)
    }
}

impl TargetSpec {
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let s = s.trim();

        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::Single(ip));
        }

        if s.contains('/') {
            let network: IpNetwork = s
                .parse()
                .map_err(|_| TargetError::InvalidCidr(s.to_string()))?;
            return Ok(Self::Cidr(network));
        }

        if is_valid_hostname(s) {
            return Ok(Self::Hostname(s.to_string()));
        }

        Err(TargetError::InvalidFormat(s.to_string()))
    }

    /// The usable host addresses, enumerated lazily, without touching the
    /// network.
    ///
    /// Hostnames cannot be expanded offline; use [`TargetSpec::resolve`].
    pub fn addresses(&self) -> Result<AddressSet, TargetError> {
        match self {
            Self::Single(ip) => Ok(AddressSet::List(vec![*ip])),
            Self::Cidr(IpNetwork::V4(net)) => {
                let (first, last) = ipv4_hosts(u32::from(net.network()), net.prefix());
                Ok(AddressSet::V4 { first, last })
            }
            Self::Cidr(IpNetwork::V6(net)) => {
                let (first, last) = ipv6_hosts(u128::from(net.network()), net.prefix());
                Ok(AddressSet::V6 { first, last })
            }
            Self::Hostname(name) => Err(TargetError::Unresolved(name.clone())),
        }
    }

    /// Every usable host address, collected.
    pub fn expand(&self) -> Result<Vec<IpAddr>, TargetError> {
        Ok(self.addresses()?.iter().collect())
    }

    /// Like [`TargetSpec::addresses`], resolving hostnames through DNS first.
    ///
    /// Only the first address returned for a hostname is scanned.
    pub async fn resolve(&self) -> Result<AddressSet, TargetError> {
        let Self::Hostname(hostname) = self else {
            return self.addresses();
        };

        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        let response = resolver
            .lookup_ip(hostname.as_str())
            .await
            .map_err(|e| TargetError::DnsResolutionFailed(hostname.clone(), e.to_string()))?;

        response
            .iter()
            .next()
            .map(|ip| AddressSet::List(vec![ip]))
            .ok_or_else(|| TargetError::NoAddressesFound(hostname.clone()))
    }

    /// Number of addresses `expand` will produce (hostnames count as one).
    pub fn host_count(&self) -> u128 {
        self.addresses().map_or(1, |set| set.len())
    }
}

impl FromStr for TargetSpec {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(ip) => write!(f, "{}", ip),
            Self::Cidr(network) => write!(f, "{}", network),
            Self::Hostname(hostname) => write!(f, "{}", hostname),
        }
    }
}

/// Parse a host or CIDR string and enumerate its usable addresses.
pub fn expand_network(s: &str) -> Result<Vec<IpAddr>, TargetError> {
    TargetSpec::parse(s)?.expand()
}

/// First and last usable host of an IPv4 block, inclusive.
fn ipv4_hosts(base: u32, prefix: u8) -> (u32, u32) {
    match prefix {
        p if p >= 32 => (base, base),
        31 => (base, base + 1),
        _ => (base + 1, (base | (u32::MAX >> prefix)) - 1),
    }
}

/// First and last usable host of an IPv6 block, inclusive.
fn ipv6_hosts(base: u128, prefix: u8) -> (u128, u128) {
    match prefix {
        p if p >= 128 => (base, base),
        127 => (base, base + 1),
        _ => (base + 1, base | (u128::MAX >> prefix)),
    }
}

/// RFC 1123 label rules; an all-numeric last label is rejected so that
/// malformed dotted quads are not mistaken for hostnames.
fn is_valid_hostname(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 {
        return false;
    }

    let labels_ok = s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    let numeric_tld = s
        .rsplit('.')
        .next()
        .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()));

    labels_ok && !numeric_tld
}
