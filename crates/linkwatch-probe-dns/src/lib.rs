// # DNS Probes
//
// This crate provides the DNS-based probes for the link monitor.
//
// ## Purpose
//
// - **Echo probes** (`google`, `opendns`, `akamai`): ask a provider's
//   authoritative server which address our query came from. Sent straight
//   to the configured server, so each link's probe leaves through the path
//   that routes to that server.
// - **Reverse lookup**: PTR queries through a recursive resolver, used by
//   links with a `reverse_hostname`.
//
// ## Architecture
//
// Queries are raw UDP packets built by the `wire` module; no resolver
// library and no system DNS are involved after construction. Probe targets
// given as hostnames are resolved once when the probe is created.

pub mod echo;
pub mod resolver;
pub mod reverse;
pub mod wire;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};

use linkwatch_core::{ProbeRegistry, ProbeType};

pub use echo::{DnsEchoFactory, DnsEchoProbe};
pub use resolver::{DnsClient, system_nameserver};
pub use reverse::PtrLookup;

/// Register the DNS echo probes and the reverse lookup
///
/// PTR queries go to `reverse_resolver`, or to the first system nameserver
/// when unset. Without either, no reverse lookup is registered and links
/// with a `reverse_hostname` fail to build.
pub fn register(registry: &ProbeRegistry, reverse_resolver: Option<IpAddr>) {
    for probe_type in [ProbeType::Google, ProbeType::Opendns, ProbeType::Akamai] {
        registry.register_probe(probe_type, Box::new(DnsEchoFactory::new(probe_type)));
    }

    match reverse_resolver.or_else(system_nameserver) {
        Some(resolver) => {
            info!("Reverse lookups via {}", resolver);
            registry.register_reverse_lookup(Arc::new(PtrLookup::new(SocketAddr::new(
                resolver,
                resolver::DNS_PORT,
            ))));
        }
        None => warn!("No resolver for reverse lookups; reverse_hostname is unavailable"),
    }
}
