//! Behavioral Contract Test: Status Aggregation
//!
//! This test verifies the aggregate Internet status derived from the
//! primary and secondary links.
//!
//! Constraints verified:
//! - Every aggregate status is reachable from plausible link states
//! - Monitor-only links never affect the aggregate status
//! - Addresses are learned on the first fully healthy tick
//! - Re-running a tick with unchanged observations emits nothing new
//!
//! If this test fails, status aggregation is broken.

mod common;

use common::*;
use linkwatch_core::{
    Coordinator, CoordinatorEvent, InternetStatus, LinkConfig, LinkRole, ProbeRegistry,
};

#[tokio::test]
async fn file_probe_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("p");
    let s = dir.path().join("s");
    write_probe_file(&p, "203.0.113.5");
    write_probe_file(&s, "203.0.113.9");

    let config = monitor_config(vec![
        LinkConfig::new(LinkRole::Primary, "file", p.display().to_string())
            .with_name("P")
            .with_retries(1),
        LinkConfig::new(LinkRole::Secondary, "file", s.display().to_string())
            .with_name("S")
            .with_retries(1),
    ]);
    let registry = ProbeRegistry::with_builtin();
    let (coordinator, _events) = Coordinator::new(&config, &registry).await.unwrap();

    // Tick 1: both up, addresses learned
    assert_eq!(coordinator.force_full_refresh().await, InternetStatus::Up);
    let primary = coordinator.link("P").await.unwrap();
    let secondary = coordinator.link("S").await.unwrap();
    assert_eq!(primary.link_up, Some(true));
    assert_eq!(secondary.link_up, Some(true));
    assert_eq!(primary.configured_address, Some(ip("203.0.113.5")));
    assert_eq!(secondary.configured_address, Some(ip("203.0.113.9")));

    // Tick 2: primary unreachable
    write_probe_file(&p, "None");
    assert_eq!(
        coordinator.force_full_refresh().await,
        InternetStatus::DegradedPrimaryDown
    );
    assert_eq!(coordinator.link("P").await.unwrap().link_up, Some(false));
    assert_eq!(
        coordinator.aggregate_status().await.unwrap().to_string(),
        "degraded (primary down)"
    );

    // Tick 3: primary traffic leaves through the secondary
    write_probe_file(&p, "203.0.113.9");
    assert_eq!(
        coordinator.force_full_refresh().await,
        InternetStatus::FailoverToSecondary
    );
    let primary = coordinator.link("P").await.unwrap();
    assert!(primary.link_failover);
    assert_eq!(primary.link_up, None);
    assert!(!coordinator.link("S").await.unwrap().link_failover);
}

#[tokio::test]
async fn unchanged_observations_are_idempotent() {
    let primary = ProbeScript::new(Some("192.0.2.1"));
    let secondary = ProbeScript::new(None);
    let registry = registry_with(
        ScriptedProbeFactory::default()
            .with("p", &primary)
            .with("s", &secondary),
    );
    let config = monitor_config(vec![
        scripted_link(LinkRole::Primary, "fibre", "p"),
        scripted_link(LinkRole::Secondary, "lte", "s"),
    ]);
    let (coordinator, mut events) = Coordinator::new(&config, &registry).await.unwrap();

    let first = coordinator.force_full_refresh().await;
    let first_events = drain_events(&mut events);
    let second = coordinator.force_full_refresh().await;
    let second_events = drain_events(&mut events);

    assert_eq!(first, InternetStatus::DegradedSecondaryDown);
    assert_eq!(first, second);
    assert_eq!(status_changes(&first_events), 1);
    assert!(second_events.is_empty(), "unexpected events: {:?}", second_events);
    assert_eq!(primary.calls(), 2);
}

#[tokio::test]
async fn all_main_links_down_is_down() {
    let registry = registry_with(
        ScriptedProbeFactory::default()
            .with("p", &ProbeScript::new(None))
            .with("s", &ProbeScript::new(None))
            .with("m", &ProbeScript::new(Some("198.51.100.1"))),
    );
    let config = monitor_config(vec![
        scripted_link(LinkRole::Primary, "fibre", "p"),
        scripted_link(LinkRole::Secondary, "lte", "s"),
        scripted_link(LinkRole::MonitorOnly, "vpn", "m"),
    ]);
    let (coordinator, _events) = Coordinator::new(&config, &registry).await.unwrap();

    assert_eq!(coordinator.force_full_refresh().await, InternetStatus::Down);
    assert_eq!(coordinator.link("vpn").await.unwrap().link_up, Some(true));
}

#[tokio::test]
async fn monitor_only_links_do_not_degrade_status() {
    let registry = registry_with(
        ScriptedProbeFactory::default()
            .with("p", &ProbeScript::new(Some("192.0.2.1")))
            .with("s", &ProbeScript::new(Some("192.0.2.2")))
            .with("m", &ProbeScript::new(None)),
    );
    let config = monitor_config(vec![
        scripted_link(LinkRole::Primary, "fibre", "p"),
        scripted_link(LinkRole::Secondary, "lte", "s"),
        scripted_link(LinkRole::MonitorOnly, "vpn", "m"),
    ]);
    let (coordinator, _events) = Coordinator::new(&config, &registry).await.unwrap();

    assert_eq!(coordinator.force_full_refresh().await, InternetStatus::Up);
}

#[tokio::test]
async fn primary_on_unexpected_path_is_failover_to_other_link() {
    let registry = registry_with(
        ScriptedProbeFactory::default()
            .with("p", &ProbeScript::new(Some("192.0.2.77")))
            .with("s", &ProbeScript::new(Some("192.0.2.2"))),
    );
    let config = monitor_config(vec![
        scripted_link(LinkRole::Primary, "fibre", "p").with_configured_address(ip("192.0.2.1")),
        scripted_link(LinkRole::Secondary, "lte", "s"),
    ]);
    let (coordinator, _events) = Coordinator::new(&config, &registry).await.unwrap();

    assert_eq!(
        coordinator.force_full_refresh().await,
        InternetStatus::FailoverToOtherLink
    );
    assert_eq!(coordinator.link("fibre").await.unwrap().link_up, None);
}

#[tokio::test]
async fn addresses_are_learned_once_per_reset() {
    let primary = ProbeScript::new(Some("192.0.2.1"));
    let secondary = ProbeScript::new(Some("192.0.2.2"));
    let monitor = ProbeScript::new(Some("198.51.100.1"));
    let registry = registry_with(
        ScriptedProbeFactory::default()
            .with("p", &primary)
            .with("s", &secondary)
            .with("m", &monitor),
    );
    let config = monitor_config(vec![
        scripted_link(LinkRole::Primary, "fibre", "p"),
        scripted_link(LinkRole::Secondary, "lte", "s"),
        scripted_link(LinkRole::MonitorOnly, "vpn", "m"),
    ]);
    let (coordinator, mut events) = Coordinator::new(&config, &registry).await.unwrap();

    coordinator.force_full_refresh().await;
    let learned = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, CoordinatorEvent::ConfiguredAddressSet { .. }))
        .count();
    assert_eq!(learned, 3);
    assert_eq!(
        coordinator.link("vpn").await.unwrap().configured_address,
        Some(ip("198.51.100.1"))
    );

    // A new address on the monitor link is not learned again
    monitor.answer(Some("198.51.100.2"));
    coordinator.force_full_refresh().await;
    let vpn = coordinator.link("vpn").await.unwrap();
    assert_eq!(vpn.configured_address, Some(ip("198.51.100.1")));
    assert_eq!(vpn.link_up, None);
    assert_eq!(coordinator.aggregate_status().await, Some(InternetStatus::Up));

    // Until the operator resets
    coordinator.reset_all_configured_addresses().await;
    let vpn = coordinator.link("vpn").await.unwrap();
    assert_eq!(vpn.configured_address, Some(ip("198.51.100.2")));
    assert_eq!(vpn.link_up, Some(true));
}

#[tokio::test]
async fn status_report_serializes() {
    let registry = registry_with(
        ScriptedProbeFactory::default().with("p", &ProbeScript::new(Some("192.0.2.1"))),
    );
    let config = monitor_config(vec![scripted_link(LinkRole::Primary, "fibre", "p")]);
    let (coordinator, _events) = Coordinator::new(&config, &registry).await.unwrap();

    let report = coordinator.report().await;
    assert_eq!(report.status, None);
    assert!(report.last_updated.is_none());

    coordinator.force_full_refresh().await;
    let report = coordinator.report().await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["name"], "Internet Status");
    assert_eq!(json["status"], "up");
    assert_eq!(json["links"][0]["name"], "fibre");
    assert_eq!(json["links"][0]["role"], "primary");
    assert_eq!(json["links"][0]["link_up"], true);
    assert_eq!(json["links"][0]["current_address"], "192.0.2.1");
}
