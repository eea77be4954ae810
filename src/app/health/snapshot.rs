use core::sync::atomic::{AtomicBool, AtomicI8, AtomicU8, Ordering};

use super::super::types::OperatingMode;

static LINK_UP: AtomicBool = AtomicBool::new(false);
static SIGNAL_DBM: AtomicI8 = AtomicI8::new(0);
static INTERNET_REACHABLE: AtomicBool = AtomicBool::new(false);
static API_REACHABLE: AtomicBool = AtomicBool::new(false);
static OPERATING_MODE: AtomicU8 = AtomicU8::new(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct HealthSnapshot {
    pub(crate) link_up: bool,
    pub(crate) signal_dbm: i8,
    pub(crate) internet_reachable: bool,
    pub(crate) api_reachable: bool,
    pub(crate) mode: OperatingMode,
}

pub(crate) fn publish_link(link_up: bool, signal_dbm: i8) {
    LINK_UP.store(link_up, Ordering::Relaxed);
    SIGNAL_DBM.store(signal_dbm, Ordering::Relaxed);
}

/// Written once per cycle by the health monitor, after both probes.
pub(crate) fn publish_probe_outcome(internet_reachable: bool, api_reachable: bool) {
    INTERNET_REACHABLE.store(internet_reachable, Ordering::Relaxed);
    API_REACHABLE.store(api_reachable && internet_reachable, Ordering::Relaxed);
}

pub(crate) fn publish_mode(mode: OperatingMode) {
    let raw = match mode {
        OperatingMode::Station => 0,
        OperatingMode::ConfigurationPortal => 1,
    };
    OPERATING_MODE.store(raw, Ordering::Relaxed);
}

pub(crate) fn current_mode() -> OperatingMode {
    match OPERATING_MODE.load(Ordering::Relaxed) {
        1 => OperatingMode::ConfigurationPortal,
        _ => OperatingMode::Station,
    }
}

pub(crate) fn read() -> HealthSnapshot {
    HealthSnapshot {
        link_up: LINK_UP.load(Ordering::Relaxed),
        signal_dbm: SIGNAL_DBM.load(Ordering::Relaxed),
        internet_reachable: INTERNET_REACHABLE.load(Ordering::Relaxed),
        api_reachable: API_REACHABLE.load(Ordering::Relaxed),
        mode: current_mode(),
    }
}
