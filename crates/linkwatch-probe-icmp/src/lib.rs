// # ICMP Probe
//
// This crate provides the `ping` probe: one ICMP echo request per attempt.
//
// ## Purpose
//
// Checks plain reachability of a host. An echo reply proves the path is up
// but says nothing about our public address, so a successful attempt reports
// the target's own address.
//
// ## Sockets
//
// A raw socket is tried first (needs CAP_NET_RAW), then an unprivileged
// datagram socket (Linux `net.ipv4.ping_group_range`). On datagram sockets
// the kernel rewrites the identifier, so replies are matched on sequence
// number alone. Socket I/O is blocking and runs on the blocking pool.

pub mod packet;

use async_trait::async_trait;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{ErrorKind, Read};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use linkwatch_core::traits::{Probe, ProbeError, ProbeFactory, ProbeSpec};
use linkwatch_core::{Error, ProbeRegistry, ProbeType, Result};

use packet::{echo_request, parse_echo_reply};

/// Sequence numbers shared by all probes in the process
static SEQUENCE: AtomicU16 = AtomicU16::new(0);

const RECV_BUFFER_LEN: usize = 1500;

/// ICMP echo probe against one resolved host
#[derive(Debug, Clone)]
pub struct IcmpProbe {
    target: String,
    address: IpAddr,
}

impl IcmpProbe {
    pub fn new(target: impl Into<String>, address: IpAddr) -> Self {
        Self {
            target: target.into(),
            address,
        }
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }
}

#[async_trait]
impl Probe for IcmpProbe {
    async fn observe(&self, timeout: Duration) -> std::result::Result<IpAddr, ProbeError> {
        let address = self.address;
        tokio::task::spawn_blocking(move || echo(address, timeout))
            .await
            .map_err(|e| ProbeError::Io(format!("echo task failed: {}", e)))??;
        Ok(address)
    }

    fn probe_type(&self) -> ProbeType {
        ProbeType::Ping
    }

    fn target(&self) -> &str {
        &self.target
    }
}

/// How an ICMP socket was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketKind {
    Raw,
    Datagram,
}

fn open_socket(v6: bool) -> std::io::Result<(Socket, SocketKind)> {
    let (domain, protocol) = if v6 {
        (Domain::IPV6, Protocol::ICMPV6)
    } else {
        (Domain::IPV4, Protocol::ICMPV4)
    };

    match Socket::new(domain, Type::RAW, Some(protocol)) {
        Ok(socket) => Ok((socket, SocketKind::Raw)),
        Err(_) => Socket::new(domain, Type::DGRAM, Some(protocol))
            .map(|socket| (socket, SocketKind::Datagram)),
    }
}

/// Send one echo request and wait for its reply (blocking)
fn echo(address: IpAddr, timeout: Duration) -> std::result::Result<(), ProbeError> {
    let v6 = address.is_ipv6();
    let (mut socket, kind) =
        open_socket(v6).map_err(|e| ProbeError::Network(format!("cannot open ICMP socket: {}", e)))?;

    socket
        .connect(&SockAddr::from(SocketAddr::new(address, 0)))
        .map_err(|e| ProbeError::Network(format!("failed to connect: {}", e)))?;

    let identifier: u16 = rand::random();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let deadline = Instant::now() + timeout;

    socket
        .send(&echo_request(v6, identifier, sequence))
        .map_err(|e| ProbeError::Network(format!("failed to send: {}", e)))?;

    let mut buf = [0u8; RECV_BUFFER_LEN];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ProbeError::Timeout(timeout));
        }
        socket
            .set_read_timeout(Some(remaining))
            .map_err(|e| ProbeError::Io(e.to_string()))?;

        let n = match socket.read(&mut buf) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(ProbeError::Timeout(timeout));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProbeError::Network(format!("failed to receive: {}", e))),
        };

        if let Some(reply) = parse_echo_reply(v6, &buf[..n])
            && reply.sequence == sequence
            && (kind == SocketKind::Datagram || reply.identifier == identifier)
        {
            return Ok(());
        }
    }
}

/// Whether this process can open any ICMP socket
pub fn icmp_available() -> bool {
    match open_socket(false) {
        Ok((_, kind)) => {
            info!("ICMP probes use {:?} sockets", kind);
            true
        }
        Err(e) => {
            warn!("ICMP sockets unavailable ({}); ping links will report down", e);
            false
        }
    }
}

/// Factory resolving the ping target once
pub struct IcmpProbeFactory;

#[async_trait]
impl ProbeFactory for IcmpProbeFactory {
    async fn create(&self, spec: &ProbeSpec) -> Result<Arc<dyn Probe>> {
        let address = resolve_host(&spec.target).await?;
        debug!("ping target {} resolved to {}", spec.target, address);
        Ok(Arc::new(IcmpProbe::new(spec.target.clone(), address)))
    }
}

async fn resolve_host(target: &str) -> Result<IpAddr> {
    let target = target.trim();
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host((target, 0))
        .await
        .map_err(|e| Error::config(format!("cannot resolve ping target {}: {}", target, e)))?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| Error::config(format!("ping target {} has no addresses", target)))
}

/// Register the ping probe
pub fn register(registry: &ProbeRegistry) {
    icmp_available();
    registry.register_probe(ProbeType::Ping, Box::new(IcmpProbeFactory));
}
