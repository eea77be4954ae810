use super::super::types::OperatingMode;
use super::engine::ModeEngine;
use super::events::ModeEvent;
use super::machine::ModeApplyStatus;

#[test]
fn boot_success_lands_in_station() {
    let mut engine = ModeEngine::new();
    let result = engine.apply(ModeEvent::StationConnected);
    assert!(result.changed());
    assert_eq!(result.after, OperatingMode::Station);
}

#[test]
fn boot_timeout_lands_in_portal_without_retrying() {
    let mut engine = ModeEngine::new();
    let result = engine.apply(ModeEvent::StationTimeout);
    assert!(result.changed());
    assert_eq!(result.after, OperatingMode::ConfigurationPortal);
    // A late connect report must not pull the device back out.
    let late = engine.apply(ModeEvent::StationConnected);
    assert_eq!(late.status, ModeApplyStatus::InvalidTransition);
    assert_eq!(engine.mode(), OperatingMode::ConfigurationPortal);
}

#[test]
fn station_accepts_a_forced_portal_switch() {
    let mut engine = ModeEngine::new();
    let _ = engine.apply(ModeEvent::StationConnected);
    let result = engine.apply(ModeEvent::PortalRequested);
    assert!(result.changed());
    assert_eq!(result.before, OperatingMode::Station);
    assert_eq!(result.after, OperatingMode::ConfigurationPortal);
}

#[test]
fn portal_has_no_live_exit() {
    let mut engine = ModeEngine::new();
    let _ = engine.apply(ModeEvent::PortalRequested);
    assert_eq!(
        engine.apply(ModeEvent::StationConnected).status,
        ModeApplyStatus::InvalidTransition
    );
    assert_eq!(
        engine.apply(ModeEvent::PortalRequested).status,
        ModeApplyStatus::Unchanged
    );
    assert_eq!(engine.mode(), OperatingMode::ConfigurationPortal);
}

#[test]
fn repeated_connect_reports_are_unchanged_in_station() {
    let mut engine = ModeEngine::new();
    let _ = engine.apply(ModeEvent::StationConnected);
    let result = engine.apply(ModeEvent::StationConnected);
    assert_eq!(result.status, ModeApplyStatus::Unchanged);
}
