//! Plugin-based probe registry
//!
//! The registry is the probe kind → constructor lookup table used while a
//! link set is built. Probe crates register their factories during
//! initialization instead of the core hard-coding every technique.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use linkwatch_core::ProbeRegistry;
//!
//! let registry = ProbeRegistry::with_builtin();
//! linkwatch_probe_dns::register(&registry, None);
//! linkwatch_probe_icmp::register(&registry);
//! ```

use crate::config::ProbeType;
use crate::error::{Error, Result};
use crate::probe::FileProbeFactory;
use crate::traits::{Probe, ProbeFactory, ProbeSpec, ReverseLookup};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Probe registry
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes. Factories are reference counted so that no
/// lock is held while a factory runs.
#[derive(Default)]
pub struct ProbeRegistry {
    /// Registered probe factories
    probes: RwLock<HashMap<ProbeType, Arc<dyn ProbeFactory>>>,

    /// Reverse lookup used by links with a `reverse_hostname`
    reverse_lookup: RwLock<Option<Arc<dyn ReverseLookup>>>,
}

impl ProbeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in probes (`file`) registered
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register_probe(ProbeType::File, Box::new(FileProbeFactory));
        registry
    }

    /// Register a probe factory, replacing any previous one for the type
    pub fn register_probe(&self, probe_type: ProbeType, factory: Box<dyn ProbeFactory>) {
        let mut probes = self.probes.write().unwrap_or_else(PoisonError::into_inner);
        probes.insert(probe_type, Arc::from(factory));
    }

    /// Register the reverse lookup implementation
    pub fn register_reverse_lookup(&self, lookup: Arc<dyn ReverseLookup>) {
        let mut slot = self
            .reverse_lookup
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(lookup);
    }

    /// Create a probe from a spec
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn Probe>)`: Created probe
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub async fn create_probe(&self, spec: &ProbeSpec) -> Result<Arc<dyn Probe>> {
        let factory = self
            .probe_factory(spec.probe_type)
            .ok_or_else(|| Error::config(format!("Unsupported probe type: {}", spec.probe_type)))?;

        factory.create(spec).await
    }

    /// Look up the factory for a probe type
    pub fn probe_factory(&self, probe_type: ProbeType) -> Option<Arc<dyn ProbeFactory>> {
        let probes = self.probes.read().unwrap_or_else(PoisonError::into_inner);
        probes.get(&probe_type).cloned()
    }

    /// The registered reverse lookup, if any
    pub fn reverse_lookup(&self) -> Option<Arc<dyn ReverseLookup>> {
        self.reverse_lookup
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check if a probe type is registered
    pub fn has_probe(&self, probe_type: ProbeType) -> bool {
        let probes = self.probes.read().unwrap_or_else(PoisonError::into_inner);
        probes.contains_key(&probe_type)
    }

    /// List all registered probe types
    pub fn list_probes(&self) -> Vec<ProbeType> {
        let probes = self.probes.read().unwrap_or_else(PoisonError::into_inner);
        let mut types: Vec<ProbeType> = probes.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}
