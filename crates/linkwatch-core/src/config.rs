//! Configuration types for the link monitor
//!
//! A [`MonitorConfig`] is an ordered list of [`LinkConfig`] entries plus
//! global defaults inherited by links that omit them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// Main monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Display name of the monitor (used in logs)
    #[serde(default = "default_name")]
    pub name: String,

    /// Default seconds between probes of a link
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,

    /// Default per-attempt network timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Default number of probe attempts per update cycle
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Recursive resolver used for reverse (PTR) lookups.
    ///
    /// Falls back to the system resolver when unset.
    #[serde(default)]
    pub reverse_resolver: Option<IpAddr>,

    /// Links to monitor, in order
    #[serde(default)]
    pub links: Vec<LinkConfig>,

    /// Optional coordinator settings
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl MonitorConfig {
    /// Create a new configuration with defaults and no links
    pub fn new() -> Self {
        Self {
            name: default_name(),
            scan_interval: default_scan_interval(),
            timeout: default_timeout(),
            retries: default_retries(),
            reverse_resolver: None,
            links: Vec::new(),
            coordinator: CoordinatorConfig::default(),
        }
    }

    /// Add a link to the configuration
    pub fn with_link(mut self, link: LinkConfig) -> Self {
        self.links.push(link);
        self
    }

    /// Validate the configuration
    ///
    /// Checks numeric ranges only. Role and probe-type consistency is
    /// checked while the link set is built, where a bad link can be dropped
    /// without failing the whole monitor.
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_interval(self.scan_interval, "scan_interval")?;
        validate_timeout(self.timeout, "timeout")?;

        for (idx, link) in self.links.iter().enumerate() {
            if let Some(secs) = link.scan_interval {
                validate_interval(secs, &format!("links[{}]: scan_interval", idx))?;
            }
            if let Some(timeout) = link.timeout {
                validate_timeout(timeout, &format!("links[{}]: timeout", idx))?;
            }
            if let Some(secs) = link.rtt_report_interval {
                validate_interval(secs, &format!("links[{}]: rtt_report_interval", idx))?;
            }
        }

        self.coordinator.validate()
    }

    /// Parse a configuration from a JSON document
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Longest accepted scan, report or poll interval (one week)
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 3600;

/// Longest accepted per-attempt timeout (one hour)
pub const MAX_TIMEOUT_SECS: f64 = 3600.0;

fn validate_interval(secs: u64, what: &str) -> Result<(), crate::Error> {
    if secs == 0 || secs > MAX_INTERVAL_SECS {
        return Err(crate::Error::config(format!(
            "{} must be between 1 and {} seconds, got {}",
            what, MAX_INTERVAL_SECS, secs
        )));
    }
    Ok(())
}

fn validate_timeout(timeout: f64, what: &str) -> Result<(), crate::Error> {
    if !timeout.is_finite() || timeout <= 0.0 || timeout > MAX_TIMEOUT_SECS {
        return Err(crate::Error::config(format!(
            "{} must be a positive number of seconds up to {}, got {}",
            what, MAX_TIMEOUT_SECS, timeout
        )));
    }
    Ok(())
}

/// Role of a link in status aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkRole {
    /// The link normally carrying Internet traffic (exactly one)
    Primary,
    /// Backup links taking over when the primary fails
    Secondary,
    /// Tracked for visibility only, never affects aggregate status
    #[default]
    MonitorOnly,
}

impl fmt::Display for LinkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkRole::Primary => "primary",
            LinkRole::Secondary => "secondary",
            LinkRole::MonitorOnly => "monitor_only",
        })
    }
}

/// Probe technique used by a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeType {
    /// TXT query for `o-o.myaddr.l.google.com`
    Google,
    /// A query for `myip.opendns.com`
    Opendns,
    /// A query for `whoami.akamai.net`
    Akamai,
    /// Address read from a local file (testing/simulation)
    File,
    /// ICMP echo to the target
    Ping,
}

impl ProbeType {
    /// All probe types, in configuration order
    pub const ALL: [ProbeType; 5] = [
        ProbeType::Google,
        ProbeType::Opendns,
        ProbeType::Akamai,
        ProbeType::File,
        ProbeType::Ping,
    ];

    /// Configuration name of the probe type
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeType::Google => "google",
            ProbeType::Opendns => "opendns",
            ProbeType::Akamai => "akamai",
            ProbeType::File => "file",
            ProbeType::Ping => "ping",
        }
    }

    /// DNS "what is my address" probes
    pub fn is_dns_echo(&self) -> bool {
        matches!(self, ProbeType::Google | ProbeType::Opendns | ProbeType::Akamai)
    }
}

impl fmt::Display for ProbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProbeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::Error::config(format!("unknown probe_type {}", s)))
    }
}

/// Per-link configuration
///
/// `probe_type` is kept as a string so that an unknown probe type drops a
/// single link instead of failing the whole configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Link name; generated as `Link N` when absent or taken
    #[serde(default)]
    pub name: Option<String>,

    /// Role in aggregation
    #[serde(default)]
    pub role: LinkRole,

    /// One of `google`, `opendns`, `akamai`, `file`, `ping`
    #[serde(default)]
    pub probe_type: Option<String>,

    /// Resolver host/address, ping target or file path
    #[serde(default)]
    pub probe_target: Option<String>,

    /// Seconds between probes (inherits the global default)
    #[serde(default)]
    pub scan_interval: Option<u64>,

    /// Per-attempt timeout in seconds (inherits the global default)
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Probe attempts per cycle (inherits the global default)
    #[serde(default)]
    pub retries: Option<u32>,

    /// Expected substring of the PTR record of the current address
    #[serde(default)]
    pub reverse_hostname: Option<String>,

    /// Address this link is expected to carry
    #[serde(default)]
    pub configured_address: Option<IpAddr>,

    /// Seconds between RTT reports (DNS echo probes only)
    #[serde(default)]
    pub rtt_report_interval: Option<u64>,
}

impl LinkConfig {
    /// Create a link configuration with a probe type and target
    pub fn new(role: LinkRole, probe_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            role,
            probe_type: Some(probe_type.into()),
            probe_target: Some(target.into()),
            ..Self::default()
        }
    }

    /// Set the link name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the expected address
    pub fn with_configured_address(mut self, address: IpAddr) -> Self {
        self.configured_address = Some(address);
        self
    }

    /// Set the expected reverse hostname fragment
    pub fn with_reverse_hostname(mut self, fragment: impl Into<String>) -> Self {
        self.reverse_hostname = Some(fragment.into());
        self
    }

    /// Override scan interval (seconds)
    pub fn with_scan_interval(mut self, secs: u64) -> Self {
        self.scan_interval = Some(secs);
        self
    }

    /// Override timeout (seconds)
    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Override attempt budget
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Enable RTT reporting every `secs` seconds
    pub fn with_rtt_report_interval(mut self, secs: u64) -> Self {
        self.rtt_report_interval = Some(secs);
        self
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Lower bound of the shared polling interval (seconds)
    #[serde(default = "default_min_poll_interval")]
    pub min_poll_interval: u64,

    /// Capacity of the coordinator event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl CoordinatorConfig {
    /// Validate coordinator settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_interval(self.min_poll_interval, "min_poll_interval")?;
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }
        Ok(())
    }

    /// Minimum polling interval as a duration
    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_secs(self.min_poll_interval)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_poll_interval: default_min_poll_interval(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_name() -> String {
    "Internet Status".to_string()
}

fn default_scan_interval() -> u64 {
    30
}

fn default_timeout() -> f64 {
    1.0
}

fn default_retries() -> u32 {
    3
}

fn default_min_poll_interval() -> u64 {
    5
}

fn default_event_channel_capacity() -> usize {
    1000
}
