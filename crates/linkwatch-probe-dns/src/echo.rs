//! DNS "what is my address" probes
//!
//! Each provider runs an authoritative server that answers a well-known
//! name with the address the query came from:
//!
//! | Probe     | Question                      | Server (typical)        |
//! |-----------|-------------------------------|-------------------------|
//! | `google`  | `o-o.myaddr.l.google.com` TXT | `ns1.google.com`        |
//! | `opendns` | `myip.opendns.com` A          | `resolver1.opendns.com` |
//! | `akamai`  | `whoami.akamai.net` A         | `ns1-1.akamaitech.net`  |

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use linkwatch_core::traits::{Probe, ProbeError, ProbeFactory, ProbeSpec};
use linkwatch_core::{Error, ProbeType, Result};

use crate::resolver::{DNS_PORT, DnsClient, resolve_target};
use crate::wire::{RData, Record, TYPE_A, TYPE_TXT};

const GOOGLE_ECHO_NAME: &str = "o-o.myaddr.l.google.com";
const OPENDNS_ECHO_NAME: &str = "myip.opendns.com";
const AKAMAI_ECHO_NAME: &str = "whoami.akamai.net";

/// Prefix of Google's answer when the query carried an EDNS client subnet
const EDNS_SUBNET_PREFIX: &str = "edns0-client-subnet";

/// Question asked by a DNS echo probe type
pub fn echo_question(probe_type: ProbeType) -> Option<(&'static str, u16)> {
    match probe_type {
        ProbeType::Google => Some((GOOGLE_ECHO_NAME, TYPE_TXT)),
        ProbeType::Opendns => Some((OPENDNS_ECHO_NAME, TYPE_A)),
        ProbeType::Akamai => Some((AKAMAI_ECHO_NAME, TYPE_A)),
        ProbeType::File | ProbeType::Ping => None,
    }
}

/// Probe asking a DNS echo service for our public address
#[derive(Debug, Clone)]
pub struct DnsEchoProbe {
    probe_type: ProbeType,
    target: String,
    question: (&'static str, u16),
    client: DnsClient,
}

impl DnsEchoProbe {
    /// Create a probe querying `server` directly
    pub fn new(probe_type: ProbeType, target: impl Into<String>, server: SocketAddr) -> Result<Self> {
        let question = echo_question(probe_type)
            .ok_or_else(|| Error::config(format!("{} is not a DNS echo probe", probe_type)))?;

        Ok(Self {
            probe_type,
            target: target.into(),
            question,
            client: DnsClient::new(server),
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.client.server()
    }
}

#[async_trait]
impl Probe for DnsEchoProbe {
    async fn observe(&self, timeout: Duration) -> std::result::Result<IpAddr, ProbeError> {
        let (name, qtype) = self.question;
        let records = self.client.query(name, qtype, timeout).await?;

        match self.probe_type {
            ProbeType::Google => parse_txt_echo(&records),
            _ => parse_address_echo(&records),
        }
    }

    fn probe_type(&self) -> ProbeType {
        self.probe_type
    }

    fn target(&self) -> &str {
        &self.target
    }
}

/// Address from TXT answers; the last TXT answer wins
pub fn parse_txt_echo(records: &[Record]) -> std::result::Result<IpAddr, ProbeError> {
    let mut address = None;
    for record in records {
        if let RData::Txt(strings) = &record.rdata
            && let Some(txt) = strings.first()
        {
            address = Some(parse_echo_txt(txt)?);
        }
    }
    address.ok_or(ProbeError::NoAddress)
}

/// Decode one TXT string: a bare address or `edns0-client-subnet <addr>/<len>`
fn parse_echo_txt(txt: &str) -> std::result::Result<IpAddr, ProbeError> {
    let value = match txt.strip_prefix(EDNS_SUBNET_PREFIX) {
        Some(subnet) => subnet.trim().split('/').next().unwrap_or_default(),
        None => txt.trim(),
    };

    value
        .parse()
        .map_err(|_| ProbeError::Malformed(format!("unexpected TXT answer {:?}", txt)))
}

/// Address from the first A or AAAA answer
pub fn parse_address_echo(records: &[Record]) -> std::result::Result<IpAddr, ProbeError> {
    records
        .iter()
        .find_map(|record| match record.rdata {
            RData::A(ip) => Some(IpAddr::V4(ip)),
            RData::Aaaa(ip) => Some(IpAddr::V6(ip)),
            _ => None,
        })
        .ok_or(ProbeError::NoAddress)
}

/// Factory for one DNS echo probe type
pub struct DnsEchoFactory {
    probe_type: ProbeType,
}

impl DnsEchoFactory {
    pub fn new(probe_type: ProbeType) -> Self {
        Self { probe_type }
    }
}

#[async_trait]
impl ProbeFactory for DnsEchoFactory {
    async fn create(&self, spec: &ProbeSpec) -> Result<Arc<dyn Probe>> {
        let server = resolve_target(&spec.target, DNS_PORT).await?;
        debug!(
            "{} probe target {} resolved to {}",
            self.probe_type, spec.target, server
        );
        Ok(Arc::new(DnsEchoProbe::new(
            self.probe_type,
            spec.target.clone(),
            server,
        )?))
    }
}
