//! Reverse (PTR) lookups

use async_trait::async_trait;
use std::fmt::Write;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use linkwatch_core::traits::{ProbeError, ReverseLookup};

use crate::resolver::DnsClient;
use crate::wire::{RData, TYPE_PTR};

/// `in-addr.arpa` / `ip6.arpa` name of an address
pub fn reverse_name(address: IpAddr) -> String {
    match address {
        IpAddr::V4(ip) => {
            let [a, b, c, d] = ip.octets();
            format!("{}.{}.{}.{}.in-addr.arpa", d, c, b, a)
        }
        IpAddr::V6(ip) => {
            let mut name = String::with_capacity(72);
            for byte in ip.octets().iter().rev() {
                let _ = write!(name, "{:x}.{:x}.", byte & 0x0f, byte >> 4);
            }
            name.push_str("ip6.arpa");
            name
        }
    }
}

/// PTR lookups through a recursive resolver
#[derive(Debug, Clone)]
pub struct PtrLookup {
    client: DnsClient,
}

impl PtrLookup {
    pub fn new(resolver: SocketAddr) -> Self {
        Self {
            client: DnsClient::new(resolver),
        }
    }

    pub fn resolver(&self) -> SocketAddr {
        self.client.server()
    }
}

#[async_trait]
impl ReverseLookup for PtrLookup {
    async fn lookup(&self, address: IpAddr, timeout: Duration) -> Result<String, ProbeError> {
        let records = self
            .client
            .query(&reverse_name(address), TYPE_PTR, timeout)
            .await?;

        records
            .into_iter()
            .find_map(|record| match record.rdata {
                RData::Ptr(name) => Some(name),
                _ => None,
            })
            .ok_or_else(|| ProbeError::Network(format!("no PTR record for {}", address)))
    }
}
