// # Probe Trait
//
// A probe performs one reachability check against a fixed target and
// reports the address it observed.
//
// ## Implementations
//
// - File probe (built in): `crate::probe::FileProbe`
// - DNS echo probes (google, opendns, akamai): `linkwatch-probe-dns` crate
// - ICMP echo probe: `linkwatch-probe-icmp` crate
//
// ## Failure model
//
// Network failures are ordinary outcomes. A probe reports them as
// `ProbeError` and the owning link folds them into "no address observed";
// they never propagate past the link.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProbeType;

/// Probe failure (absorbed by the link as "unreachable")
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error("no address in reply")]
    NoAddress,
    #[error("I/O error: {0}")]
    Io(String),
}

/// Trait for probe implementations
///
/// Implementations are immutable once constructed and must be usable from
/// concurrent tasks.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Perform one attempt and return the observed address
    ///
    /// `timeout` bounds the network wait of this attempt. The caller also
    /// enforces it, so implementations may treat it as a hint.
    async fn observe(&self, timeout: Duration) -> Result<IpAddr, ProbeError>;

    /// The technique this probe implements
    fn probe_type(&self) -> ProbeType;

    /// Human-readable target (resolver, host or path)
    fn target(&self) -> &str;
}

/// Construction parameters handed to a [`ProbeFactory`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSpec {
    /// Requested probe type
    pub probe_type: ProbeType,
    /// Target as written in the configuration
    pub target: String,
    /// Per-attempt timeout of the link
    pub timeout: Duration,
}

/// Helper trait for constructing probes from link configuration
///
/// Errors returned here are configuration errors and abort construction
/// of the whole link set (e.g. an unresolvable resolver host).
#[async_trait]
pub trait ProbeFactory: Send + Sync {
    /// Create a probe for the given spec
    async fn create(&self, spec: &ProbeSpec) -> Result<Arc<dyn Probe>, crate::Error>;
}
