//! UDP datagram probe.
//!
//! Sends a small DNS-style query to the port and waits for anything to come
//! back. Any datagram received before the timeout counts as a response;
//! silence and socket errors both count as no response.
//!
//! The socket is left unconnected, so ICMP port-unreachable messages are not
//! surfaced and a reply from the service is never told apart from other
//! traffic reaching the ephemeral port. Absence of a reply does not prove
//! the port is closed.

use crate::error::{ProbeError, ProbeResult};
use crate::scanner::traits::{Prober, Protocol, StatusCode, DEFAULT_PROBE_TIMEOUT};
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Receive buffer size; the content of the reply is never inspected.
const RECV_BUFFER: usize = 1024;

const FLAGS_STANDARD_QUERY: u16 = 0x0100;
const QTYPE_A: u16 = 1;
const QCLASS_IN: u16 = 1;

/// UDP prober.
///
/// Binds an ephemeral socket of the target's address family, sends the
/// [`build_query`] datagram and waits once for any reply.
///
/// # Performance Characteristics
///
/// - **Reliability**: Low - silence cannot be told apart from filtering or
///   a service that ignores the query
/// - **Speed**: Bounded by the timeout for every port that stays silent
/// - **Privileges**: None required
#[derive(Debug, Clone)]
pub struct UdpProber {
    timeout: Duration,
}

impl UdpProber {
    /// Create a new UDP prober.
    ///
    /// # Arguments
    /// * `timeout` - Budget for the send and the wait for a reply together
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange(&self, socket: &UdpSocket, target: SocketAddr) -> io::Result<usize> {
        let query = build_query(&target.ip().to_string(), target.port());
        socket.send_to(&query, target).await?;

        let mut buf = [0u8; RECV_BUFFER];
        let (n, from) = socket.recv_from(&mut buf).await?;
        trace!(%target, %from, bytes = n, "udp reply");
        Ok(n)
    }
}

impl Default for UdpProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl Prober for UdpProber {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    async fn probe(&self, target: SocketAddr) -> ProbeResult<StatusCode> {
        let local: SocketAddr = match target.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| ProbeError::SocketAllocation {
                protocol: "udp",
                target,
                source,
            })?;

        let status = match timeout(self.timeout, self.exchange(&socket, target)).await {
            Ok(Ok(_)) => StatusCode::OPEN,
            Ok(Err(e)) => {
                trace!(%target, error = %e, "udp exchange failed");
                StatusCode::NO_RESPONSE
            }
            Err(_) => StatusCode::NO_RESPONSE,
        };

        debug!(%target, status = status.code(), "udp probe finished");
        Ok(status)
    }
}

/// Build the single-question query datagram sent by the UDP probe.
///
/// Layout, all integers big-endian: transaction id (the destination port),
/// flags `0x0100`, one question, zero answer/authority/additional records,
/// `host` split on `.` into length-prefixed labels ending with a zero byte,
/// then QTYPE A and QCLASS IN.
pub fn build_query(host: &str, port: u16) -> Vec<u8> {
    let mut packet = Vec::with_capacity(12 + host.len() + 6);

    packet.extend_from_slice(&port.to_be_bytes());
    packet.extend_from_slice(&FLAGS_STANDARD_QUERY.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());

    for label in host.split('.') {
        // DNS caps labels at 63 bytes.
        let label = &label.as_bytes()[..label.len().min(63)];
        packet.push(label.len() as u8);
        packet.extend_from_slice(label);
    }
    packet.push(0);

    packet.extend_from_slice(&QTYPE_A.to_be_bytes());
    packet.extend_from_slice(&QCLASS_IN.to_be_bytes());
    packet
}
