//! Link coordinator
//!
//! The Coordinator owns the [`LinkSet`] and is responsible for:
//! - Probing due links concurrently on every tick
//! - Detecting failover between main links
//! - Deriving the aggregate Internet status
//! - Learning "normal" addresses the first time everything is healthy
//! - Serializing operator commands with ticks
//!
//! ## Tick
//!
//! ```text
//!            ┌──────────── tick lock held ────────────┐
//!            │                                        │
//!  due links ─► JoinSet (one task per ProbeCycle) ─► apply outcomes
//!            │                                        │
//!            │          failover pass (all main links)│
//!            │                    │                   │
//!            │          aggregate status              │
//!            │                    │                   │
//!            │          auto-learn / RTT reports      │
//!            └────────────────────┼───────────────────┘
//!                                 ▼
//!                         CoordinatorEvent channel
//! ```
//!
//! Aggregation never observes a partially updated link set, and a new tick
//! (or command) waits for the previous one to finish.

mod status;

pub use status::{InternetStatus, aggregate, detect_failover};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::link::{LinkSnapshot, LinkStatus};
use crate::linkset::LinkSet;
use crate::registry::ProbeRegistry;

/// Events emitted by the Coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// Run loop started
    Started { name: String, links_count: usize },

    /// A link's status changed during a tick or command
    LinkStatusChanged {
        link: String,
        previous: LinkStatus,
        current: LinkStatus,
    },

    /// A main link's failover flag was raised or cleared
    FailoverChanged {
        link: String,
        failover: bool,
        address: Option<IpAddr>,
    },

    /// The aggregate status changed
    StatusChanged {
        previous: Option<InternetStatus>,
        current: InternetStatus,
    },

    /// A link's configured address was set (learned or by command)
    ConfiguredAddressSet { link: String, address: IpAddr },

    /// Every link's configured address was reset to its configured value
    ConfiguredAddressesReset,

    /// Periodic RTT report of a DNS echo link
    RttReport {
        link: String,
        rtt: Option<f64>,
        samples: Vec<f64>,
    },

    /// Run loop stopped
    Stopped { reason: String },
}

/// Serializable view of the whole coordinator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub name: String,
    pub status: Option<InternetStatus>,
    pub last_updated: Option<DateTime<Utc>>,
    pub links: Vec<LinkSnapshot>,
}

/// State guarded by the tick lock
struct CoordinatorState {
    links: LinkSet,
    status: Option<InternetStatus>,
    last_updated: Option<DateTime<Utc>>,
    /// Set once addresses were learned; cleared by a reset
    addresses_learned: bool,
}

/// Link coordinator
///
/// ## Locking
///
/// All link state sits behind one async mutex held for the duration of a
/// tick. Commands take the same lock, so they queue behind an in-flight
/// tick instead of racing it.
pub struct Coordinator {
    name: String,
    state: Mutex<CoordinatorState>,
    poll_interval: Duration,
    event_tx: mpsc::Sender<CoordinatorEvent>,
}

impl Coordinator {
    /// Build the link set and create a coordinator
    ///
    /// # Returns
    ///
    /// A tuple of (coordinator, event_receiver)
    pub async fn new(
        config: &MonitorConfig,
        registry: &ProbeRegistry,
    ) -> Result<(Self, mpsc::Receiver<CoordinatorEvent>)> {
        let links = LinkSet::build(config, registry).await?;
        let poll_interval = poll_interval(&links, config.coordinator.min_poll_interval());
        debug!("{}: poll interval {:?}", config.name, poll_interval);

        let (tx, rx) = mpsc::channel(config.coordinator.event_channel_capacity);

        let coordinator = Self {
            name: config.name.clone(),
            state: Mutex::new(CoordinatorState {
                links,
                status: None,
                last_updated: None,
                addresses_learned: false,
            }),
            poll_interval,
            event_tx: tx,
        };

        Ok((coordinator, rx))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interval of the shared timer
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Probe the links that are due, then re-aggregate
    pub async fn refresh(&self) -> InternetStatus {
        let mut state = self.state.lock().await;
        let before = statuses(&state.links);
        self.tick_locked(&mut state, false, &before).await
    }

    /// Probe every link now regardless of schedule, then re-aggregate
    pub async fn force_full_refresh(&self) -> InternetStatus {
        let mut state = self.state.lock().await;
        let before = statuses(&state.links);
        self.tick_locked(&mut state, true, &before).await
    }

    /// Anchor a link to its current address
    ///
    /// # Errors
    ///
    /// - [`Error::LinkNotFound`] for an unknown link name
    /// - [`Error::NoCurrentAddress`] if the link has no current address
    pub async fn set_configured_address(&self, link_name: &str) -> Result<IpAddr> {
        let mut state = self.state.lock().await;
        let before = statuses(&state.links);

        let link = state
            .links
            .get_mut(link_name)
            .ok_or_else(|| Error::link_not_found(link_name))?;
        let address = link.set_configured_address()?;

        self.emit_event(CoordinatorEvent::ConfiguredAddressSet {
            link: link_name.to_string(),
            address,
        });
        self.evaluate_locked(&mut state, &before);
        Ok(address)
    }

    /// Restore every link's configured address and re-learn from scratch
    ///
    /// Performs a forced full refresh under the same lock.
    pub async fn reset_all_configured_addresses(&self) -> InternetStatus {
        let mut state = self.state.lock().await;
        let before = statuses(&state.links);
        info!("{}: resetting configured addresses", self.name);

        for link in state.links.iter_mut() {
            link.reset_configured_address();
        }
        state.addresses_learned = false;
        self.emit_event(CoordinatorEvent::ConfiguredAddressesReset);

        self.tick_locked(&mut state, true, &before).await
    }

    /// Aggregate status of the last tick (`None` before the first one)
    pub async fn aggregate_status(&self) -> Option<InternetStatus> {
        self.state.lock().await.status
    }

    /// Snapshots of every link in configuration order
    pub async fn links(&self) -> Vec<LinkSnapshot> {
        let state = self.state.lock().await;
        state.links.iter().map(|l| l.snapshot()).collect()
    }

    /// Snapshot of one link
    pub async fn link(&self, name: &str) -> Option<LinkSnapshot> {
        let state = self.state.lock().await;
        state.links.get(name).map(|l| l.snapshot())
    }

    /// Full status report
    pub async fn report(&self) -> StatusReport {
        let state = self.state.lock().await;
        StatusReport {
            name: self.name.clone(),
            status: state.status,
            last_updated: state.last_updated,
            links: state.links.iter().map(|l| l.snapshot()).collect(),
        }
    }

    /// Run the coordinator until Ctrl-C
    ///
    /// Performs a full refresh, then ticks every [`poll_interval`](Self::poll_interval).
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the coordinator until `shutdown_rx` fires (or its sender is dropped)
    ///
    /// Embedders that handle signals themselves use this instead of
    /// [`run`](Self::run).
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let links_count = self.state.lock().await.links.len();
        self.emit_event(CoordinatorEvent::Started {
            name: self.name.clone(),
            links_count,
        });

        let status = self.force_full_refresh().await;
        info!("{}: initial status {}", self.name, status);

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(CoordinatorEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        Ok(())
    }

    /// One tick; `before` holds the link statuses to report changes against
    async fn tick_locked(
        &self,
        state: &mut CoordinatorState,
        force: bool,
        before: &[LinkStatus],
    ) -> InternetStatus {
        let now = Instant::now();
        let horizon = self.due_horizon(now);

        let mut tasks = JoinSet::new();
        for (idx, link) in state.links.iter().enumerate() {
            if force || link.is_due(horizon) {
                let cycle = link.cycle();
                tasks.spawn(async move { (idx, cycle.run().await) });
            }
        }
        let probed = tasks.len();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => {
                    if let Some(link) = state.links.by_index_mut(idx) {
                        link.apply(outcome, now);
                    }
                }
                // The link keeps its previous state
                Err(e) => warn!("{}: probe task failed: {}", self.name, e),
            }
        }

        let status = self.evaluate_locked(state, before);

        let report_at = Instant::now();
        let report_horizon = self.due_horizon(report_at);
        for link in state.links.iter_mut() {
            if let Some((rtt, samples)) = link.take_rtt_report(report_at, report_horizon) {
                debug!("link {} rtt {:?} samples {:?}", link.name(), rtt, samples);
                self.emit_event(CoordinatorEvent::RttReport {
                    link: link.name().to_string(),
                    rtt,
                    samples,
                });
            }
        }

        state.last_updated = Some(Utc::now());
        debug!(
            "{}: tick done, {} link(s) probed, status {}",
            self.name, probed, status
        );
        status
    }

    /// Latest deadline that counts as due at `now`
    ///
    /// Ticks fire late by wakeup jitter while deadlines are set from the
    /// previous (also late) tick, so a deadline within half a poll interval
    /// belongs to this tick rather than the next one.
    fn due_horizon(&self, now: Instant) -> Instant {
        now + self.poll_interval / 2
    }

    /// Failover pass, aggregation, learning and change events
    fn evaluate_locked(
        &self,
        state: &mut CoordinatorState,
        before: &[LinkStatus],
    ) -> InternetStatus {
        for (idx, failed_over) in detect_failover(&state.links) {
            if let Some(link) = state.links.by_index_mut(idx)
                && link.apply_failover(failed_over)
            {
                self.emit_event(CoordinatorEvent::FailoverChanged {
                    link: link.name().to_string(),
                    failover: failed_over,
                    address: link.current_address(),
                });
            }
        }

        let status = aggregate(&state.links);

        if status == InternetStatus::Up && !state.addresses_learned {
            state.addresses_learned = true;
            self.learn_addresses(&mut state.links);
        }

        for (link, previous) in state.links.iter().zip(before) {
            if link.status() != *previous {
                self.emit_event(CoordinatorEvent::LinkStatusChanged {
                    link: link.name().to_string(),
                    previous: *previous,
                    current: link.status(),
                });
            }
        }

        if state.status != Some(status) {
            info!("{}: internet status {}", self.name, status);
            self.emit_event(CoordinatorEvent::StatusChanged {
                previous: state.status,
                current: status,
            });
            state.status = Some(status);
        }

        status
    }

    /// Anchor every link that has an address but no configured one
    fn learn_addresses(&self, links: &mut LinkSet) {
        for link in links.iter_mut() {
            if link.configured_address().is_some() || link.current_address().is_none() {
                continue;
            }
            match link.set_configured_address() {
                Ok(address) => self.emit_event(CoordinatorEvent::ConfiguredAddressSet {
                    link: link.name().to_string(),
                    address,
                }),
                Err(e) => debug!("{}: not learning address: {}", link.name(), e),
            }
        }
    }

    /// Emit a coordinator event, dropping it when the channel is full
    fn emit_event(&self, event: CoordinatorEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}

fn statuses(links: &LinkSet) -> Vec<LinkStatus> {
    links.iter().map(|l| l.status()).collect()
}

/// GCD of all scan and RTT report intervals (whole seconds), floored at `min`
fn poll_interval(links: &LinkSet, min: Duration) -> Duration {
    let gcd_secs = links
        .iter()
        .flat_map(|l| std::iter::once(l.scan_interval()).chain(l.rtt_report_interval()))
        .map(|d| d.as_secs())
        .filter(|&secs| secs > 0)
        .fold(0, gcd);

    Duration::from_secs(gcd_secs).max(min)
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}
