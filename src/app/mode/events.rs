#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ModeEvent {
    /// Station association and lease came up within the boot window.
    StationConnected,
    /// The boot-time connect attempt ran out its window.
    StationTimeout,
    /// Explicit user command to enter the configuration portal.
    PortalRequested,
}

impl ModeEvent {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::StationConnected => "station_connected",
            Self::StationTimeout => "station_timeout",
            Self::PortalRequested => "portal_requested",
        }
    }
}
