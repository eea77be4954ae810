pub(crate) mod channels;

use embassy_net::Ipv4Address;

pub(crate) const NETWORK_NAME_MAX: usize = 32;
pub(crate) const NETWORK_SECRET_MAX: usize = 64;
pub(crate) const API_URL_MAX: usize = 128;

// Flash layout of the settings sector: three fixed-width slots, 256 bytes
// reserved in total. Offsets are load-bearing; the fields are read back by
// position, not by scanning.
pub(crate) const SETTINGS_NAME_OFFSET: usize = 0;
pub(crate) const SETTINGS_SECRET_OFFSET: usize = 32;
pub(crate) const SETTINGS_URL_OFFSET: usize = 96;
pub(crate) const SETTINGS_REGION_LEN: usize = 256;

pub(crate) const DEFAULT_NETWORK_NAME: &str = "netsentry-home";
pub(crate) const DEFAULT_NETWORK_SECRET: &str = "changeme123";
pub(crate) const DEFAULT_API_URL: &str = "http://192.168.1.10:8080/api/health";

// Health cycle cadence.
pub(crate) const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;
pub(crate) const PROBE_ATTEMPTS: u8 = 3;
pub(crate) const PROBE_RETRY_DELAY_SECS: u64 = 5;
pub(crate) const PROBE_TIMEOUT_SECS: u64 = 3;

// Link supervisor: a dead link restarts the device outright; a weak link has
// to stay weak for the full streak before the lighter reconnect fires.
pub(crate) const SUPERVISOR_TICK_SECS: u64 = 10;
pub(crate) const WEAK_SIGNAL_THRESHOLD_DBM: i8 = -90;
pub(crate) const WEAK_SIGNAL_TICK_LIMIT: u8 = 6;

pub(crate) const STATION_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Ordered reachability targets; first answer wins. Public resolvers on
/// their DNS port respond from essentially anywhere with internet access.
pub(crate) const INTERNET_PROBE_HOSTS: [(Ipv4Address, u16); 3] = [
    (Ipv4Address::new(1, 1, 1, 1), 53),
    (Ipv4Address::new(8, 8, 8, 8), 53),
    (Ipv4Address::new(9, 9, 9, 9), 53),
];

pub(crate) const HTTP_PORT: u16 = 80;
pub(crate) const UPDATE_PORT: u16 = 8266;
pub(crate) const HOSTNAME: &str = "netsentry";

pub(crate) const PORTAL_AP_SSID: &str = "netsentry-setup";
pub(crate) const PORTAL_ADDR: Ipv4Address = Ipv4Address::new(192, 168, 4, 1);
pub(crate) const PORTAL_PREFIX_LEN: u8 = 24;
pub(crate) const PORTAL_NETMASK: Ipv4Address = Ipv4Address::new(255, 255, 255, 0);
pub(crate) const PORTAL_DHCP_POOL_START: Ipv4Address = Ipv4Address::new(192, 168, 4, 100);
pub(crate) const PORTAL_DHCP_POOL_SIZE: u8 = 8;

// Boot-time factory-reset input: the pin must stay low for the whole hold
// window, not just flicker low at sample time.
pub(crate) const RESET_BUTTON_HOLD_MS: u32 = 750;
pub(crate) const RESET_BUTTON_SAMPLE_MS: u32 = 50;

pub(crate) const BLINK_SHORT_MS: u32 = 120;
pub(crate) const BLINK_LONG_MS: u32 = 600;
pub(crate) const BLINK_GAP_MS: u32 = 120;

// How long gated service tasks sleep while their mode is inactive.
pub(crate) const MODE_GATE_POLL_MS: u64 = 500;
