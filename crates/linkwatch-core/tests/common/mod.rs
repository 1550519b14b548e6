//! Test doubles and common utilities for behavioral contract tests
//!
//! Probes here are scripted by the test: each [`ProbeScript`] holds the
//! answer its probe returns until the test changes it.

#![allow(dead_code)]

use async_trait::async_trait;
use linkwatch_core::config::{LinkConfig, LinkRole, MonitorConfig, ProbeType};
use linkwatch_core::error::{Error, Result};
use linkwatch_core::traits::{Probe, ProbeError, ProbeFactory, ProbeSpec, ReverseLookup};
use linkwatch_core::{CoordinatorEvent, ProbeRegistry};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Shared, mutable answer of a scripted probe
#[derive(Clone, Default)]
pub struct ProbeScript {
    answer: Arc<Mutex<Option<IpAddr>>>,
    delay: Arc<Mutex<Duration>>,
    /// Call counter for observe()
    calls: Arc<AtomicUsize>,
}

impl ProbeScript {
    /// Script answering `answer` (`None` = unreachable)
    pub fn new(answer: Option<&str>) -> Self {
        let script = Self::default();
        script.answer(answer);
        script
    }

    /// Change the answer returned from now on
    pub fn answer(&self, answer: Option<&str>) {
        *self.answer.lock().unwrap() = answer.map(ip);
    }

    /// Delay every observation by `delay`
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Get the number of times observe() was called
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Probe reading its answer from a [`ProbeScript`]
pub struct ScriptedProbe {
    target: String,
    script: ProbeScript,
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn observe(&self, _timeout: Duration) -> std::result::Result<IpAddr, ProbeError> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.script.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let answer = *self.script.answer.lock().unwrap();
        answer.ok_or(ProbeError::NoAddress)
    }

    fn probe_type(&self) -> ProbeType {
        ProbeType::Google
    }

    fn target(&self) -> &str {
        &self.target
    }
}

/// Factory handing out scripted probes by target name
#[derive(Clone, Default)]
pub struct ScriptedProbeFactory {
    scripts: HashMap<String, ProbeScript>,
}

impl ScriptedProbeFactory {
    pub fn with(mut self, target: &str, script: &ProbeScript) -> Self {
        self.scripts.insert(target.to_string(), script.clone());
        self
    }
}

#[async_trait]
impl ProbeFactory for ScriptedProbeFactory {
    async fn create(&self, spec: &ProbeSpec) -> Result<Arc<dyn Probe>> {
        let script = self
            .scripts
            .get(&spec.target)
            .ok_or_else(|| Error::config(format!("cannot resolve {}", spec.target)))?;
        Ok(Arc::new(ScriptedProbe {
            target: spec.target.clone(),
            script: script.clone(),
        }))
    }
}

/// Reverse lookup answering from a fixed table
#[derive(Default)]
pub struct ScriptedReverseLookup {
    names: Mutex<HashMap<IpAddr, String>>,
}

impl ScriptedReverseLookup {
    pub fn with(self, address: &str, name: &str) -> Self {
        self.names.lock().unwrap().insert(ip(address), name.to_string());
        self
    }
}

#[async_trait]
impl ReverseLookup for ScriptedReverseLookup {
    async fn lookup(
        &self,
        address: IpAddr,
        _timeout: Duration,
    ) -> std::result::Result<String, ProbeError> {
        self.names
            .lock()
            .unwrap()
            .get(&address)
            .cloned()
            .ok_or_else(|| ProbeError::Network("NXDOMAIN".to_string()))
    }
}

/// Registry with the built-in file probe and scripted probes under `google`
pub fn registry_with(factory: ScriptedProbeFactory) -> ProbeRegistry {
    let registry = ProbeRegistry::with_builtin();
    registry.register_probe(ProbeType::Google, Box::new(factory));
    registry
}

/// Link entry for a scripted probe, one attempt per cycle
pub fn scripted_link(role: LinkRole, name: &str, target: &str) -> LinkConfig {
    LinkConfig::new(role, "google", target)
        .with_name(name)
        .with_retries(1)
}

/// Monitor configuration with the given links
pub fn monitor_config(links: Vec<LinkConfig>) -> MonitorConfig {
    let mut config = MonitorConfig::new();
    config.links = links;
    config
}

/// Overwrite a probe file
pub fn write_probe_file(path: &Path, contents: &str) {
    std::fs::write(path, format!("{}\n", contents)).unwrap();
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Drain every event currently queued
pub fn drain_events(rx: &mut mpsc::Receiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Count `StatusChanged` events
pub fn status_changes(events: &[CoordinatorEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, CoordinatorEvent::StatusChanged { .. }))
        .count()
}
