//! Behavioral Contract Test: Operator Commands
//!
//! This test verifies the commands an operator can issue against a running
//! coordinator.
//!
//! Constraints verified:
//! - set_configured_address anchors a link to its current address
//! - set_configured_address fails without mutation when there is no address
//! - Unknown link names are reported, not ignored
//! - reset restores configuration-time addresses and re-learns them
//!
//! If this test fails, the command surface is broken.

mod common;

use common::*;
use linkwatch_core::{Coordinator, CoordinatorEvent, Error, InternetStatus, LinkRole};

#[tokio::test]
async fn set_configured_address_requires_current_address() {
    let secondary = ProbeScript::new(None);
    let registry = registry_with(
        ScriptedProbeFactory::default()
            .with("p", &ProbeScript::new(Some("192.0.2.1")))
            .with("s", &secondary),
    );
    let config = monitor_config(vec![
        scripted_link(LinkRole::Primary, "fibre", "p"),
        scripted_link(LinkRole::Secondary, "lte", "s"),
    ]);
    let (coordinator, _events) = Coordinator::new(&config, &registry).await.unwrap();
    coordinator.force_full_refresh().await;

    let err = coordinator.set_configured_address("lte").await.unwrap_err();
    assert!(matches!(err, Error::NoCurrentAddress(_)));
    assert_eq!(coordinator.link("lte").await.unwrap().configured_address, None);

    let err = coordinator.set_configured_address("dsl").await.unwrap_err();
    assert!(matches!(err, Error::LinkNotFound(_)));
}

#[tokio::test]
async fn set_configured_address_resolves_ambiguity() {
    let primary = ProbeScript::new(Some("192.0.2.50"));
    let registry = registry_with(
        ScriptedProbeFactory::default()
            .with("p", &primary)
            .with("s", &ProbeScript::new(Some("192.0.2.2"))),
    );
    let config = monitor_config(vec![
        scripted_link(LinkRole::Primary, "fibre", "p").with_configured_address(ip("192.0.2.1")),
        scripted_link(LinkRole::Secondary, "lte", "s"),
    ]);
    let (coordinator, mut events) = Coordinator::new(&config, &registry).await.unwrap();

    assert_eq!(
        coordinator.force_full_refresh().await,
        InternetStatus::FailoverToOtherLink
    );
    drain_events(&mut events);

    let address = coordinator.set_configured_address("fibre").await.unwrap();
    assert_eq!(address, ip("192.0.2.50"));

    // Re-aggregated immediately, without probing again
    assert_eq!(primary.calls(), 1);
    assert_eq!(coordinator.aggregate_status().await, Some(InternetStatus::Up));
    let fibre = coordinator.link("fibre").await.unwrap();
    assert_eq!(fibre.configured_address, Some(ip("192.0.2.50")));
    assert_eq!(fibre.link_up, Some(true));

    let events = drain_events(&mut events);
    assert!(events.contains(&CoordinatorEvent::ConfiguredAddressSet {
        link: "fibre".to_string(),
        address: ip("192.0.2.50"),
    }));
    assert_eq!(status_changes(&events), 1);
}

#[tokio::test]
async fn reset_restores_configured_values_and_relearns() {
    let primary = ProbeScript::new(Some("192.0.2.1"));
    let secondary = ProbeScript::new(Some("192.0.2.2"));
    let registry = registry_with(
        ScriptedProbeFactory::default()
            .with("p", &primary)
            .with("s", &secondary),
    );
    let config = monitor_config(vec![
        scripted_link(LinkRole::Primary, "fibre", "p").with_configured_address(ip("192.0.2.1")),
        scripted_link(LinkRole::Secondary, "lte", "s"),
    ]);
    let (coordinator, mut events) = Coordinator::new(&config, &registry).await.unwrap();

    assert_eq!(coordinator.force_full_refresh().await, InternetStatus::Up);
    assert_eq!(
        coordinator.link("lte").await.unwrap().configured_address,
        Some(ip("192.0.2.2"))
    );

    // The secondary's provider hands out a new address
    secondary.answer(Some("192.0.2.3"));
    assert_eq!(
        coordinator.force_full_refresh().await,
        InternetStatus::DegradedSecondaryDown
    );
    drain_events(&mut events);

    assert_eq!(
        coordinator.reset_all_configured_addresses().await,
        InternetStatus::Up
    );
    assert_eq!(primary.calls(), 3);

    let fibre = coordinator.link("fibre").await.unwrap();
    let lte = coordinator.link("lte").await.unwrap();
    assert_eq!(fibre.configured_address, Some(ip("192.0.2.1")));
    assert_eq!(lte.configured_address, Some(ip("192.0.2.3")));

    let events = drain_events(&mut events);
    assert_eq!(events.first(), Some(&CoordinatorEvent::ConfiguredAddressesReset));
    assert!(events.contains(&CoordinatorEvent::ConfiguredAddressSet {
        link: "lte".to_string(),
        address: ip("192.0.2.3"),
    }));
}
