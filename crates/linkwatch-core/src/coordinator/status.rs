//! Aggregate Internet status and the cross-link failover check

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use crate::config::LinkRole;
use crate::link::Link;
use crate::linkset::LinkSet;

/// System-wide Internet status derived from the primary and secondary links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternetStatus {
    Up,
    Down,
    /// Primary down with no evidence of where traffic goes
    DegradedPrimaryDown,
    /// Primary healthy, at least one secondary is not
    DegradedSecondaryDown,
    /// Some main link is carrying another main link's address
    FailoverToSecondary,
    /// Primary reachable but not on its expected path
    FailoverToOtherLink,
}

impl InternetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InternetStatus::Up => "up",
            InternetStatus::Down => "down",
            InternetStatus::DegradedPrimaryDown => "degraded (primary down)",
            InternetStatus::DegradedSecondaryDown => "degraded (secondary down)",
            InternetStatus::FailoverToSecondary => "failover to secondary (primary down)",
            InternetStatus::FailoverToOtherLink => "failover to other link (primary down)",
        }
    }
}

impl fmt::Display for InternetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for InternetStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Derive the aggregate status; monitor-only links are ignored
pub fn aggregate(links: &LinkSet) -> InternetStatus {
    let primary = links.primary();
    let secondaries: Vec<&Link> = links.secondaries().collect();

    if !primary.status().is_up() || primary.link_failover() {
        let any_failover =
            primary.link_failover() || secondaries.iter().any(|l| l.link_failover());

        if any_failover {
            InternetStatus::FailoverToSecondary
        } else if !secondaries.iter().any(|l| l.status().is_up()) {
            InternetStatus::Down
        } else if primary.current_address().is_some() {
            InternetStatus::FailoverToOtherLink
        } else {
            InternetStatus::DegradedPrimaryDown
        }
    } else if secondaries
        .iter()
        .any(|l| !l.status().is_up() || l.link_failover())
    {
        InternetStatus::DegradedSecondaryDown
    } else {
        InternetStatus::Up
    }
}

/// Failover flag for every main link, as `(index, failed_over)`
///
/// A main link is failed over when its current address is one of the anchor
/// addresses (configured, else current) of the *other* main links. All flags
/// are computed before any is applied.
pub fn detect_failover(links: &LinkSet) -> Vec<(usize, bool)> {
    let main: Vec<(usize, &Link)> = links
        .iter()
        .enumerate()
        .filter(|(_, l)| l.role() != LinkRole::MonitorOnly)
        .collect();

    main.iter()
        .map(|&(idx, link)| {
            let failed_over = link.current_address().is_some_and(|current| {
                anchors_excluding(&main, idx).any(|anchor| anchor == current)
            });
            (idx, failed_over)
        })
        .collect()
}

fn anchors_excluding<'a>(
    main: &'a [(usize, &'a Link)],
    exclude: usize,
) -> impl Iterator<Item = IpAddr> + 'a {
    main.iter()
        .filter(move |(idx, _)| *idx != exclude)
        .filter_map(|(_, l)| l.anchor_address())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(InternetStatus::Up.to_string(), "up");
        assert_eq!(
            InternetStatus::FailoverToSecondary.to_string(),
            "failover to secondary (primary down)"
        );
        assert_eq!(
            serde_json::to_string(&InternetStatus::DegradedSecondaryDown).unwrap(),
            "\"degraded (secondary down)\""
        );
    }
}
