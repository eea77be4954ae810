use super::config::{API_URL_MAX, NETWORK_NAME_MAX, NETWORK_SECRET_MAX};

/// The three persisted configuration strings, held as fixed-capacity byte
/// fields so the struct can cross channels and flash without allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DeviceConfig {
    pub(crate) network_name: [u8; NETWORK_NAME_MAX],
    pub(crate) network_name_len: u8,
    pub(crate) network_secret: [u8; NETWORK_SECRET_MAX],
    pub(crate) network_secret_len: u8,
    pub(crate) api_url: [u8; API_URL_MAX],
    pub(crate) api_url_len: u8,
}

impl DeviceConfig {
    pub(crate) const fn empty() -> Self {
        Self {
            network_name: [0; NETWORK_NAME_MAX],
            network_name_len: 0,
            network_secret: [0; NETWORK_SECRET_MAX],
            network_secret_len: 0,
            api_url: [0; API_URL_MAX],
            api_url_len: 0,
        }
    }

    /// Builds a config from raw parts, truncating each field to its capacity.
    pub(crate) fn from_parts(name: &[u8], secret: &[u8], api_url: &[u8]) -> Self {
        let mut config = Self::empty();
        config.network_name_len = copy_truncated(&mut config.network_name, name);
        config.network_secret_len = copy_truncated(&mut config.network_secret, secret);
        config.api_url_len = copy_truncated(&mut config.api_url, api_url);
        config
    }

    pub(crate) fn factory_defaults() -> Self {
        Self::from_parts(
            super::config::DEFAULT_NETWORK_NAME.as_bytes(),
            super::config::DEFAULT_NETWORK_SECRET.as_bytes(),
            super::config::DEFAULT_API_URL.as_bytes(),
        )
    }

    pub(crate) fn network_name(&self) -> &str {
        field_str(&self.network_name, self.network_name_len)
    }

    pub(crate) fn network_secret(&self) -> &str {
        field_str(&self.network_secret, self.network_secret_len)
    }

    pub(crate) fn api_url(&self) -> &str {
        field_str(&self.api_url, self.api_url_len)
    }

    pub(crate) fn network_name_is_empty(&self) -> bool {
        self.network_name_len == 0
    }
}

fn copy_truncated(dest: &mut [u8], src: &[u8]) -> u8 {
    let len = src.len().min(dest.len());
    dest[..len].copy_from_slice(&src[..len]);
    len as u8
}

fn field_str(bytes: &[u8], len: u8) -> &str {
    let len = (len as usize).min(bytes.len());
    core::str::from_utf8(&bytes[..len]).unwrap_or("")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OperatingMode {
    Station,
    ConfigurationPortal,
}

impl OperatingMode {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Station => "Station",
            Self::ConfigurationPortal => "ConfigurationPortal",
        }
    }
}

/// Status-channel blink patterns. The down/up pair is driven separately;
/// these only shape the status output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BlinkPattern {
    /// One short pulse at the start of every health cycle.
    CycleStart,
    /// Two short pulses: internet and API both reachable.
    Healthy,
    /// Three short pulses: internet unreachable.
    InternetDown,
    /// One long pulse: internet reachable, API endpoint not.
    ApiDegraded,
    /// Four short pulses: firmware-update session opened.
    UpdateStart,
    /// Two long pulses: a portal-mode service failed to start.
    ServiceFault,
}

impl BlinkPattern {
    /// (pulse count, on-time ms) for the pattern.
    pub(crate) const fn shape(self) -> (u8, u32) {
        match self {
            Self::CycleStart => (1, super::config::BLINK_SHORT_MS),
            Self::Healthy => (2, super::config::BLINK_SHORT_MS),
            Self::InternetDown => (3, super::config::BLINK_SHORT_MS),
            Self::ApiDegraded => (1, super::config::BLINK_LONG_MS),
            Self::UpdateStart => (4, super::config::BLINK_SHORT_MS),
            Self::ServiceFault => (2, super::config::BLINK_LONG_MS),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IndicatorCommand {
    Blink(BlinkPattern),
    /// Drives the mutually exclusive internet-up / internet-down pair.
    SetInternet { reachable: bool },
}

/// Commands from HTTP handlers back to the control task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ModeCommand {
    EnterConfigurationPortal,
}

/// Firmware-update session hooks, registered once at listener start.
pub(crate) trait UpdateSessionEvents: Sync {
    fn on_start(&self);
    fn on_end(&self);
    fn on_error(&self, code: u8);
}
