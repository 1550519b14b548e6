// # Reverse Lookup Trait
//
// Resolves the PTR name of an address. Links configured with a
// `reverse_hostname` use it to verify that their public address belongs to
// the expected provider.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

use super::ProbeError;

/// Trait for reverse DNS implementations
#[async_trait]
pub trait ReverseLookup: Send + Sync {
    /// Return the first PTR name for `address`
    async fn lookup(&self, address: IpAddr, timeout: Duration) -> Result<String, ProbeError>;
}
