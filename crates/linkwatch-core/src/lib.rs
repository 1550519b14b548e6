// # linkwatch-core
//
// Core library for monitoring Internet uplinks.
//
// ## Architecture Overview
//
// This library provides the core functionality for link monitoring:
// - **Probe**: Trait for discovering a link's public address
// - **ReverseLookup**: Trait for verifying an address through its PTR name
// - **ProbeRegistry**: Plugin-based probe kind → constructor table
// - **Link**: One monitored uplink with its own schedule and status
// - **LinkSet**: Uniquely named links with exactly one primary
// - **Coordinator**: Ticks the links, detects failover and aggregates status
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Probing techniques live in plugin crates
// 2. **Failures Are Data**: A failed probe is a "down" observation, not an error
// 3. **Plugin-Based**: Probes are registered dynamically, no hard-coded if-else
// 4. **Library-First**: The daemon is a thin wrapper around the Coordinator
// 5. **Single Writer**: Only the Coordinator's failover pass touches more than one link

pub mod config;
pub mod coordinator;
pub mod error;
pub mod link;
pub mod linkset;
pub mod probe;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use config::{CoordinatorConfig, LinkConfig, LinkRole, MonitorConfig, ProbeType};
pub use coordinator::{Coordinator, CoordinatorEvent, InternetStatus, StatusReport};
pub use error::{Error, Result};
pub use link::{Link, LinkSnapshot, LinkStatus};
pub use linkset::LinkSet;
pub use probe::{FileProbe, FileProbeFactory};
pub use registry::ProbeRegistry;
pub use traits::{Probe, ProbeError, ProbeFactory, ProbeSpec, ReverseLookup};
