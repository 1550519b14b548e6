//! Monitored links
//!
//! A [`Link`] owns one probe, its retry/timeout parameters, the RTT samples
//! of the latest cycle and a tri-state status.
//!
//! ## Update cycle
//!
//! ```text
//! Link::cycle() ──► ProbeCycle::run() ──► CycleOutcome ──► Link::apply()
//!  (snapshot of       (attempts, pacing,      (plain data)     (single write
//!   probe params)      reverse check)                          of link state)
//! ```
//!
//! Probing never touches the link itself; all state is written in one step
//! by [`Link::apply`]. A cycle that is abandoned halfway leaves the link
//! exactly as it was.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{LinkRole, ProbeType};
use crate::error::{Error, Result};
use crate::traits::{Probe, ReverseLookup};

/// Reachability state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Not probed yet
    Unknown,
    /// Reachable and carrying the expected address
    Up,
    /// Unreachable, or reverse check failed
    Down,
    /// Reachable but not proven to be the expected path
    Ambiguous,
}

impl LinkStatus {
    /// Tri-state view: `Some(true)` up, `Some(false)` down, `None` otherwise
    pub fn link_up(&self) -> Option<bool> {
        match self {
            LinkStatus::Up => Some(true),
            LinkStatus::Down => Some(false),
            LinkStatus::Unknown | LinkStatus::Ambiguous => None,
        }
    }

    /// True only for [`LinkStatus::Up`]
    pub fn is_up(&self) -> bool {
        matches!(self, LinkStatus::Up)
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkStatus::Unknown => "unknown",
            LinkStatus::Up => "up",
            LinkStatus::Down => "down",
            LinkStatus::Ambiguous => "ambiguous",
        })
    }
}

/// A status change produced by [`Link::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub previous: LinkStatus,
    pub current: LinkStatus,
}

/// Reverse-DNS verification bound to a link
#[derive(Clone)]
pub struct ReverseCheck {
    fragment: String,
    lookup: Arc<dyn ReverseLookup>,
}

impl ReverseCheck {
    /// Verify that the PTR name of an address contains `fragment`
    pub fn new(fragment: impl Into<String>, lookup: Arc<dyn ReverseLookup>) -> Self {
        Self {
            fragment: fragment.into(),
            lookup,
        }
    }

    /// Expected hostname fragment
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Run the PTR lookup and substring test
    pub async fn verify(&self, address: IpAddr, timeout: Duration) -> ReverseOutcome {
        match tokio::time::timeout(timeout, self.lookup.lookup(address, timeout)).await {
            Ok(Ok(ptr)) if ptr.contains(&self.fragment) => ReverseOutcome::Matched(ptr),
            Ok(Ok(ptr)) => ReverseOutcome::Mismatched(ptr),
            Ok(Err(e)) => ReverseOutcome::Failed(e.to_string()),
            Err(_) => ReverseOutcome::Failed(format!("timed out after {:?}", timeout)),
        }
    }
}

/// Result of a reverse check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReverseOutcome {
    /// PTR name contains the expected fragment
    Matched(String),
    /// PTR name does not contain the expected fragment
    Mismatched(String),
    /// The lookup itself failed
    Failed(String),
}

/// Everything needed to construct a [`Link`]
pub struct LinkParams {
    pub name: String,
    pub role: LinkRole,
    pub probe: Arc<dyn Probe>,
    pub reverse: Option<ReverseCheck>,
    pub scan_interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub configured_address: Option<IpAddr>,
    pub rtt_report_interval: Option<Duration>,
}

impl LinkParams {
    /// Parameters with the global defaults (30s interval, 1s timeout, 3 attempts)
    pub fn new(name: impl Into<String>, role: LinkRole, probe: Arc<dyn Probe>) -> Self {
        Self {
            name: name.into(),
            role,
            probe,
            reverse: None,
            scan_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(1),
            retries: 3,
            configured_address: None,
            rtt_report_interval: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RttReporting {
    interval: Duration,
    next_at: Instant,
}

/// One monitored uplink
pub struct Link {
    name: String,
    role: LinkRole,
    probe: Arc<dyn Probe>,
    reverse: Option<ReverseCheck>,
    scan_interval: Duration,
    timeout: Duration,
    retries: u32,

    /// Address supplied by configuration, restored on reset
    initial_configured_address: Option<IpAddr>,
    configured_address: Option<IpAddr>,
    current_address: Option<IpAddr>,
    status: LinkStatus,

    failover: bool,
    /// `current_address` at the time failover was last flagged
    failover_address: Option<IpAddr>,

    reverse_ok: Option<bool>,
    /// Last reverse lookup error, logged once until the lookup recovers
    reverse_failure: Option<String>,

    rtt_samples: Vec<f64>,
    rtt: Option<f64>,
    rtt_report: Option<RttReporting>,

    next_update_at: Instant,
    address_changed_at: Option<DateTime<Utc>>,
    last_probed_at: Option<DateTime<Utc>>,
}

impl Link {
    /// Create a link; it is due for its first probe immediately
    pub fn new(params: LinkParams) -> Self {
        let now = Instant::now();
        Self {
            name: params.name,
            role: params.role,
            probe: params.probe,
            reverse: params.reverse,
            scan_interval: params.scan_interval,
            timeout: params.timeout,
            retries: params.retries,
            initial_configured_address: params.configured_address,
            configured_address: params.configured_address,
            current_address: None,
            status: LinkStatus::Unknown,
            failover: false,
            failover_address: None,
            reverse_ok: None,
            reverse_failure: None,
            rtt_samples: Vec::new(),
            rtt: None,
            rtt_report: params.rtt_report_interval.map(|interval| RttReporting {
                interval,
                next_at: now,
            }),
            next_update_at: now,
            address_changed_at: None,
            last_probed_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> LinkRole {
        self.role
    }

    pub fn probe_type(&self) -> ProbeType {
        self.probe.probe_type()
    }

    pub fn probe_target(&self) -> &str {
        self.probe.target()
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Tri-state reachability (`None` = unknown or ambiguous)
    pub fn link_up(&self) -> Option<bool> {
        self.status.link_up()
    }

    /// True when this link carries another link's address
    pub fn link_failover(&self) -> bool {
        self.failover
    }

    pub fn current_address(&self) -> Option<IpAddr> {
        self.current_address
    }

    pub fn configured_address(&self) -> Option<IpAddr> {
        self.configured_address
    }

    /// Configured address if set, otherwise the current one
    pub fn anchor_address(&self) -> Option<IpAddr> {
        self.configured_address.or(self.current_address)
    }

    pub fn reverse_hostname(&self) -> Option<&str> {
        self.reverse.as_ref().map(ReverseCheck::fragment)
    }

    /// Mean RTT (ms) of the latest cycle
    pub fn rtt(&self) -> Option<f64> {
        self.rtt
    }

    /// Per-attempt RTTs (ms) of the latest cycle, in attempt order
    pub fn rtt_samples(&self) -> &[f64] {
        &self.rtt_samples
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn rtt_report_interval(&self) -> Option<Duration> {
        self.rtt_report.map(|r| r.interval)
    }

    pub fn next_update_at(&self) -> Instant {
        self.next_update_at
    }

    pub fn address_changed_at(&self) -> Option<DateTime<Utc>> {
        self.address_changed_at
    }

    /// Whether the link should probe at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_update_at <= now
    }

    /// Probe the link if due (or forced) and apply the result
    ///
    /// Returns `true` if a probe cycle was performed.
    pub async fn update(&mut self, now: Instant, force: bool) -> bool {
        if !force && !self.is_due(now) {
            return false;
        }
        let outcome = self.cycle().run().await;
        self.apply(outcome, now);
        true
    }

    /// Detach the probing work of one cycle from the link
    pub fn cycle(&self) -> ProbeCycle {
        ProbeCycle {
            name: self.name.clone(),
            probe: Arc::clone(&self.probe),
            reverse: self.reverse.clone(),
            timeout: self.timeout,
            attempts: self.retries.max(1),
        }
    }

    /// Write the result of a probe cycle into the link
    ///
    /// `now` is the time the cycle was started; the next probe is due one
    /// scan interval after it.
    pub fn apply(&mut self, outcome: CycleOutcome, now: Instant) -> Option<StatusTransition> {
        self.next_update_at = now + self.scan_interval;
        self.last_probed_at = Some(Utc::now());

        if outcome.address != self.current_address {
            debug!(
                "link {} address {:?} -> {:?}",
                self.name, self.current_address, outcome.address
            );
            self.address_changed_at = Some(Utc::now());
        }
        self.current_address = outcome.address;

        self.rtt = mean_rtt(&outcome.rtt_samples);
        self.rtt_samples = outcome.rtt_samples;

        self.reverse_ok = match outcome.reverse {
            Some(ReverseOutcome::Matched(ptr)) => {
                self.note_reverse_recovered();
                debug!("link {} reverse lookup ok: {}", self.name, ptr);
                Some(true)
            }
            Some(ReverseOutcome::Mismatched(ptr)) => {
                self.note_reverse_recovered();
                debug!(
                    "link {} reverse lookup: {} not in {}",
                    self.name,
                    self.reverse_hostname().unwrap_or_default(),
                    ptr
                );
                Some(false)
            }
            Some(ReverseOutcome::Failed(msg)) => {
                if self.reverse_failure.is_none() {
                    warn!(
                        "link {} reverse lookup for {:?} failed: {}",
                        self.name, self.current_address, msg
                    );
                    self.reverse_failure = Some(msg);
                } else {
                    debug!("link {} reverse lookup still failing: {}", self.name, msg);
                }
                Some(false)
            }
            None => None,
        };

        self.set_status(self.evaluate())
    }

    /// Flag or clear failover; only the coordinator calls this
    pub(crate) fn apply_failover(&mut self, failover: bool) -> bool {
        if failover {
            let changed = !self.failover;
            if changed {
                info!(
                    "link {} failed over: current address {:?} belongs to another link",
                    self.name, self.current_address
                );
            }
            self.failover = true;
            self.failover_address = self.current_address;
            self.set_status(LinkStatus::Ambiguous);
            changed
        } else if self.failover {
            info!("link {} failover cleared", self.name);
            self.failover = false;
            self.failover_address = None;
            self.set_status(self.evaluate());
            true
        } else {
            false
        }
    }

    pub(crate) fn demote_to_secondary(&mut self) {
        self.role = LinkRole::Secondary;
    }

    /// Anchor the link to its current address
    ///
    /// # Errors
    ///
    /// [`Error::NoCurrentAddress`] if the link has no current address; the
    /// link is left unchanged.
    pub fn set_configured_address(&mut self) -> Result<IpAddr> {
        let current = self
            .current_address
            .ok_or_else(|| Error::no_current_address(&self.name))?;

        if self.configured_address != Some(current) {
            info!("link {} configured address set to {}", self.name, current);
        }
        self.configured_address = Some(current);
        self.set_status(self.evaluate());
        Ok(current)
    }

    /// Restore the configured address supplied by configuration
    pub fn reset_configured_address(&mut self) {
        if self.configured_address != self.initial_configured_address {
            info!(
                "link {} configured address reset to {:?}",
                self.name, self.initial_configured_address
            );
        }
        self.configured_address = self.initial_configured_address;
        if self.status != LinkStatus::Unknown {
            self.set_status(self.evaluate());
        }
    }

    /// Take the RTT report if one is due by `due_by`
    ///
    /// The next report is scheduled one interval after `now`.
    pub fn take_rtt_report(
        &mut self,
        now: Instant,
        due_by: Instant,
    ) -> Option<(Option<f64>, Vec<f64>)> {
        let report = self.rtt_report.as_mut()?;
        if report.next_at > due_by {
            return None;
        }
        report.next_at = now + report.interval;
        Some((self.rtt, self.rtt_samples.clone()))
    }

    /// Read-only view for observers
    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            name: self.name.clone(),
            role: self.role,
            probe_type: self.probe_type(),
            probe_target: self.probe_target().to_string(),
            status: self.status,
            link_up: self.link_up(),
            link_failover: self.failover,
            current_address: self.current_address,
            configured_address: self.configured_address,
            rtt: self.rtt,
            rtt_samples: self.rtt_samples.clone(),
            address_changed_at: self.address_changed_at,
            last_probed_at: self.last_probed_at,
        }
    }

    /// Derive the status from the link's own observations
    fn evaluate(&self) -> LinkStatus {
        let Some(current) = self.current_address else {
            return LinkStatus::Down;
        };

        // A failed-over link stays ambiguous while it keeps the foreign
        // address; clearing failover is the coordinator's decision.
        if self.failover && self.failover_address == Some(current) {
            return LinkStatus::Ambiguous;
        }

        if self.reverse.is_some() {
            return if self.reverse_ok == Some(true) {
                LinkStatus::Up
            } else {
                LinkStatus::Down
            };
        }

        match self.configured_address {
            Some(configured) if configured != current => LinkStatus::Ambiguous,
            _ => LinkStatus::Up,
        }
    }

    fn set_status(&mut self, status: LinkStatus) -> Option<StatusTransition> {
        let previous = self.status;
        if previous == status {
            return None;
        }
        info!(
            "link {} {} -> {} (current_address={:?}, configured_address={:?})",
            self.name, previous, status, self.current_address, self.configured_address
        );
        self.status = status;
        Some(StatusTransition {
            previous,
            current: status,
        })
    }

    fn note_reverse_recovered(&mut self) {
        if self.reverse_failure.take().is_some() {
            info!("link {} reverse lookup recovered", self.name);
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("probe_type", &self.probe_type())
            .field("status", &self.status)
            .field("failover", &self.failover)
            .field("current_address", &self.current_address)
            .field("configured_address", &self.configured_address)
            .finish()
    }
}

/// The probing half of an update cycle, detached from the link
pub struct ProbeCycle {
    name: String,
    probe: Arc<dyn Probe>,
    reverse: Option<ReverseCheck>,
    timeout: Duration,
    attempts: u32,
}

impl ProbeCycle {
    /// Run every attempt, pacing successful ones to the timeout window
    ///
    /// The address of the last successful attempt wins. Failed attempts are
    /// retried immediately.
    pub async fn run(self) -> CycleOutcome {
        let mut address = None;
        let mut rtt_samples = Vec::with_capacity(self.attempts as usize);

        for remaining in (0..self.attempts).rev() {
            let start = Instant::now();
            let result =
                tokio::time::timeout(self.timeout, self.probe.observe(self.timeout)).await;
            let elapsed = start.elapsed();

            match result {
                Ok(Ok(ip)) => {
                    let rtt = millis(elapsed);
                    debug!(
                        "success: link={}, probe_type={}, target={}, address={}, rtt={}ms",
                        self.name,
                        self.probe.probe_type(),
                        self.probe.target(),
                        ip,
                        rtt
                    );
                    address = Some(ip);
                    rtt_samples.push(rtt);

                    if remaining > 0 && elapsed < self.timeout {
                        tokio::time::sleep(self.timeout - elapsed).await;
                    }
                }
                Ok(Err(e)) => {
                    debug!(
                        "failed: link={}, probe_type={}, target={}: {}",
                        self.name,
                        self.probe.probe_type(),
                        self.probe.target(),
                        e
                    );
                }
                Err(_) => {
                    debug!(
                        "failed: link={}, probe_type={}, target={}: timed out after {:?}",
                        self.name,
                        self.probe.probe_type(),
                        self.probe.target(),
                        self.timeout
                    );
                }
            }
        }

        let reverse = match (address, &self.reverse) {
            (Some(ip), Some(check)) => Some(check.verify(ip, self.timeout).await),
            _ => None,
        };

        CycleOutcome {
            address,
            rtt_samples,
            reverse,
        }
    }
}

/// Plain-data result of a probe cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    /// Address of the last successful attempt
    pub address: Option<IpAddr>,
    /// Elapsed time (ms) of each successful attempt
    pub rtt_samples: Vec<f64>,
    /// Reverse check, run only when an address was observed
    pub reverse: Option<ReverseOutcome>,
}

/// Serializable link state for observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkSnapshot {
    pub name: String,
    pub role: LinkRole,
    pub probe_type: ProbeType,
    pub probe_target: String,
    pub status: LinkStatus,
    pub link_up: Option<bool>,
    pub link_failover: bool,
    pub current_address: Option<IpAddr>,
    pub configured_address: Option<IpAddr>,
    pub rtt: Option<f64>,
    pub rtt_samples: Vec<f64>,
    pub address_changed_at: Option<DateTime<Utc>>,
    pub last_probed_at: Option<DateTime<Utc>>,
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_micros() as f64 / 1000.0
}

fn mean_rtt(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    Some((mean * 1000.0).round() / 1000.0)
}
