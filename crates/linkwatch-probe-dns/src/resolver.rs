//! UDP DNS client and resolver discovery

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

use linkwatch_core::{Error, ProbeError, Result};

use crate::wire::{Query, Record, WireError, parse_response};

/// Well-known DNS port
pub const DNS_PORT: u16 = 53;

/// System resolver configuration
const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Receive buffer; larger than classic 512 bytes for EDNS-capable servers
const MAX_RESPONSE_LEN: usize = 4096;

/// Sends single questions to one DNS server over UDP
#[derive(Debug, Clone)]
pub struct DnsClient {
    server: SocketAddr,
}

impl DnsClient {
    pub fn new(server: SocketAddr) -> Self {
        Self { server }
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Ask one question and return the answer records
    ///
    /// The whole exchange is bounded by `timeout`. Replies carrying another
    /// transaction ID are ignored.
    pub async fn query(
        &self,
        name: &str,
        qtype: u16,
        timeout: Duration,
    ) -> std::result::Result<Vec<Record>, ProbeError> {
        tokio::time::timeout(timeout, self.exchange(name, qtype))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
    }

    async fn exchange(&self, name: &str, qtype: u16) -> std::result::Result<Vec<Record>, ProbeError> {
        let query = Query::new(name, qtype);
        let packet = query.encode()?;

        let local: SocketAddr = if self.server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| ProbeError::Network(format!("failed to bind socket: {}", e)))?;
        socket
            .connect(self.server)
            .await
            .map_err(|e| ProbeError::Network(format!("failed to connect: {}", e)))?;
        socket
            .send(&packet)
            .await
            .map_err(|e| ProbeError::Network(format!("failed to send: {}", e)))?;

        let mut buf = vec![0u8; MAX_RESPONSE_LEN];
        loop {
            let n = socket
                .recv(&mut buf)
                .await
                .map_err(|e| ProbeError::Network(format!("failed to recv: {}", e)))?;

            match parse_response(&buf[..n], query.id) {
                Err(WireError::IdMismatch { got, .. }) => {
                    debug!("ignoring reply with ID {} from {}", got, self.server);
                }
                result => return result.map_err(ProbeError::from),
            }
        }
    }
}

/// Resolve a resolver/probe target once, at construction time
///
/// Accepts `addr`, `addr:port` or a hostname (looked up with the system
/// resolver).
pub async fn resolve_target(target: &str, default_port: u16) -> Result<SocketAddr> {
    let target = target.trim();
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    let mut addrs = tokio::net::lookup_host((target, default_port))
        .await
        .map_err(|e| Error::config(format!("cannot resolve probe target {}: {}", target, e)))?;

    addrs
        .next()
        .ok_or_else(|| Error::config(format!("probe target {} has no addresses", target)))
}

/// First nameserver listed in the system resolver configuration
pub fn system_nameserver() -> Option<IpAddr> {
    match std::fs::read_to_string(RESOLV_CONF) {
        Ok(contents) => parse_resolv_conf(&contents),
        Err(e) => {
            debug!("cannot read {}: {}", RESOLV_CONF, e);
            None
        }
    }
}

/// Extract the first usable `nameserver` entry
pub fn parse_resolv_conf(contents: &str) -> Option<IpAddr> {
    contents
        .lines()
        .map(|line| line.split(['#', ';']).next().unwrap_or_default())
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some("nameserver"), Some(addr)) => Some(addr),
                _ => None,
            }
        })
        // Zone-scoped link-local entries (fe80::1%eth0) cannot be used unscoped
        .find_map(|addr| addr.parse::<IpAddr>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolv_conf() {
        let conf = "\
# Generated by NetworkManager
search example.net
nameserver fe80::1%eth0
nameserver 192.168.1.1 ; home router
nameserver 9.9.9.9
";
        assert_eq!(parse_resolv_conf(conf), Some("192.168.1.1".parse().unwrap()));
        assert_eq!(parse_resolv_conf("search example.net\n"), None);
        assert_eq!(parse_resolv_conf("#nameserver 1.1.1.1\n"), None);
    }

    #[tokio::test]
    async fn test_resolve_literal_targets() {
        assert_eq!(
            resolve_target("216.239.32.10", DNS_PORT).await.unwrap(),
            "216.239.32.10:53".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_target("127.0.0.1:5353", DNS_PORT).await.unwrap(),
            "127.0.0.1:5353".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_target("2001:4860:4802:32::a", DNS_PORT).await.unwrap().port(),
            DNS_PORT
        );
    }

    #[tokio::test]
    async fn test_unresolvable_target_is_config_error() {
        let err = resolve_target("resolver.invalid", DNS_PORT).await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_query_times_out_without_reply() {
        // Bound but never answering
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = DnsClient::new(silent.local_addr().unwrap());

        let err = client
            .query("myip.opendns.com", crate::wire::TYPE_A, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, ProbeError::Timeout(Duration::from_millis(50)));
    }
}
