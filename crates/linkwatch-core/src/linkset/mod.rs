//! Link set construction
//!
//! Turns a [`MonitorConfig`] into an ordered, uniquely named set of [`Link`]s
//! with exactly one primary. Problems confined to a single link entry drop
//! that entry with a warning; only setup-level problems fail construction.

use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{LinkConfig, LinkRole, MonitorConfig, ProbeType};
use crate::error::{Error, Result};
use crate::link::{Link, LinkParams, ReverseCheck};
use crate::registry::ProbeRegistry;
use crate::traits::ProbeSpec;

/// Prefix of generated link names
const LINK_NAME_PREFIX: &str = "Link";

/// Ordered set of links with a single primary
#[derive(Debug)]
pub struct LinkSet {
    links: Vec<Link>,
    primary: usize,
}

impl LinkSet {
    /// Build the link set described by `config`
    ///
    /// # Errors
    ///
    /// - invalid numeric settings
    /// - no link ends up with the primary role
    /// - a probe factory rejects its target (e.g. unresolvable resolver host)
    /// - a `reverse_hostname` is set but no reverse lookup is registered
    pub async fn build(config: &MonitorConfig, registry: &ProbeRegistry) -> Result<Self> {
        config.validate()?;

        let mut names = UniqueNames::default();
        let mut links: Vec<Link> = Vec::with_capacity(config.links.len());
        let mut primary: Option<usize> = None;

        for (idx, entry) in config.links.iter().enumerate() {
            let name = names.claim(entry.name.as_deref());

            let Some(params) = link_params(config, entry, &name, registry).await? else {
                continue;
            };
            let mut link = Link::new(params);

            if link.role() == LinkRole::Primary {
                if let Some(existing) = primary {
                    warn!(
                        "link {} declared primary but {} already is; demoting to secondary",
                        name,
                        links[existing].name()
                    );
                    link.demote_to_secondary();
                } else {
                    primary = Some(links.len());
                }
            }

            debug!(
                "links[{}]: {} ({}, {} {})",
                idx,
                name,
                link.role(),
                link.probe_type(),
                link.probe_target()
            );
            names.commit(&name);
            links.push(link);
        }

        let primary = primary.ok_or_else(|| Error::config("no primary link defined"))?;

        info!(
            "{}: monitoring {} link(s), primary {}",
            config.name,
            links.len(),
            links[primary].name()
        );

        Ok(Self { links, primary })
    }

    /// Number of links
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True if the set holds no links (never the case after `build`)
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Links in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Link> {
        self.links.iter_mut()
    }

    /// Link at a position in configuration order
    pub fn by_index(&self, idx: usize) -> Option<&Link> {
        self.links.get(idx)
    }

    pub fn by_index_mut(&mut self, idx: usize) -> Option<&mut Link> {
        self.links.get_mut(idx)
    }

    /// Look up a link by exact name
    pub fn get(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Link> {
        self.links.iter_mut().find(|l| l.name() == name)
    }

    /// The primary link
    pub fn primary(&self) -> &Link {
        &self.links[self.primary]
    }

    pub fn primary_index(&self) -> usize {
        self.primary
    }

    /// Secondary links in configuration order
    pub fn secondaries(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|l| l.role() == LinkRole::Secondary)
    }

    /// Monitor-only links in configuration order
    pub fn monitors(&self) -> impl Iterator<Item = &Link> {
        self.links
            .iter()
            .filter(|l| l.role() == LinkRole::MonitorOnly)
    }

    /// Link names in configuration order
    pub fn names(&self) -> Vec<&str> {
        self.links.iter().map(Link::name).collect()
    }
}

/// Resolve one link entry into constructor parameters
///
/// `Ok(None)` drops the entry.
async fn link_params(
    config: &MonitorConfig,
    entry: &LinkConfig,
    name: &str,
    registry: &ProbeRegistry,
) -> Result<Option<LinkParams>> {
    let probe_type = match entry.probe_type.as_deref().map(str::parse::<ProbeType>) {
        Some(Ok(probe_type)) => probe_type,
        Some(Err(e)) => {
            warn!("link {}: {}; link dropped", name, e);
            return Ok(None);
        }
        None => {
            warn!("link {}: no probe_type; link dropped", name);
            return Ok(None);
        }
    };

    let Some(target) = entry.probe_target.as_deref().filter(|t| !t.trim().is_empty()) else {
        warn!("link {}: no probe_target for {} probe; link dropped", name, probe_type);
        return Ok(None);
    };

    if !registry.has_probe(probe_type) {
        warn!(
            "link {}: probe type {} is not available in this build; link dropped",
            name, probe_type
        );
        return Ok(None);
    }

    let timeout = Duration::try_from_secs_f64(entry.timeout.unwrap_or(config.timeout))
        .map_err(|e| Error::config(format!("link {}: timeout: {}", name, e)))?;
    let spec = ProbeSpec {
        probe_type,
        target: target.to_string(),
        timeout,
    };
    let probe = registry
        .create_probe(&spec)
        .await
        .map_err(|e| match e {
            Error::Config(msg) => Error::config(format!("link {}: {}", name, msg)),
            other => other,
        })?;

    let reverse = match entry.reverse_hostname.as_deref() {
        Some(fragment) => {
            let lookup = registry.reverse_lookup().ok_or_else(|| {
                Error::config(format!(
                    "link {}: reverse_hostname set but no reverse lookup is available",
                    name
                ))
            })?;
            Some(ReverseCheck::new(fragment, lookup))
        }
        None => None,
    };

    let rtt_report_interval = match entry.rtt_report_interval {
        Some(secs) if probe_type.is_dns_echo() => Some(Duration::from_secs(secs)),
        Some(_) => {
            warn!(
                "link {}: rtt_report_interval is only supported for DNS probes; ignored",
                name
            );
            None
        }
        None => None,
    };

    Ok(Some(LinkParams {
        name: name.to_string(),
        role: entry.role,
        probe,
        reverse,
        scan_interval: Duration::from_secs(entry.scan_interval.unwrap_or(config.scan_interval)),
        timeout,
        retries: entry.retries.unwrap_or(config.retries),
        configured_address: entry.configured_address,
        rtt_report_interval,
    }))
}

/// Name allocator enforcing uniqueness of names and their slugs
#[derive(Debug)]
struct UniqueNames {
    names: HashSet<String>,
    slugs: HashSet<String>,
    ordinal: usize,
}

impl Default for UniqueNames {
    fn default() -> Self {
        Self {
            names: HashSet::new(),
            slugs: HashSet::new(),
            ordinal: 1,
        }
    }
}

impl UniqueNames {
    /// Pick a free name for the next entry
    ///
    /// A requested name that is taken (or whose slug is) falls back to the
    /// generated `Link N` sequence.
    fn claim(&mut self, requested: Option<&str>) -> String {
        let mut name = match requested {
            Some(name) => name.to_string(),
            None => format!("{} {}", LINK_NAME_PREFIX, self.ordinal),
        };
        while self.is_taken(&name) {
            self.ordinal += 1;
            name = format!("{} {}", LINK_NAME_PREFIX, self.ordinal);
        }
        if let Some(requested) = requested
            && requested != name
        {
            warn!("link name {} is already in use; renamed to {}", requested, name);
        }
        name
    }

    /// Record a name as used; the ordinal advances only for kept links
    fn commit(&mut self, name: &str) {
        self.slugs.insert(slugify(name));
        self.names.insert(name.to_string());
        self.ordinal += 1;
    }

    fn is_taken(&self, name: &str) -> bool {
        self.names.contains(name) || self.slugs.contains(&slugify(name))
    }
}

/// Normalize a name: lowercase, runs of non-alphanumerics become `_`
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c);
        } else {
            pending_sep = true;
        }
    }

    slug
}
