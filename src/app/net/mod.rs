pub(crate) mod announce;
pub(crate) mod dhcp;
pub(crate) mod dns;
pub(crate) mod probe;

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_net::{Ipv4Cidr, Runner, Stack, StackResources};
use embassy_time::{with_timeout, Duration, Timer};
use esp_hal::rng::Rng;
use esp_println::println;
use esp_radio::wifi::{
    event::{self, EventExt},
    AccessPointConfig, AuthMethod, ClientConfig, Config as WifiRuntimeConfig, ModeConfig,
    ScanConfig, ScanMethod, ScanTypeConfig, WifiController, WifiDevice,
};
use static_cell::StaticCell;

use super::config::{
    PORTAL_ADDR, PORTAL_AP_SSID, PORTAL_PREFIX_LEN, STATION_CONNECT_TIMEOUT_SECS,
};
use super::types::DeviceConfig;

const WIFI_RX_QUEUE_SIZE: usize = 3;
const WIFI_TX_QUEUE_SIZE: usize = 2;
const WIFI_STATIC_RX_BUF_NUM: u8 = 4;
const WIFI_DYNAMIC_RX_BUF_NUM: u16 = 8;
const WIFI_DYNAMIC_TX_BUF_NUM: u16 = 8;
const WIFI_RX_BA_WIN: u8 = 3;
const RSSI_SCAN_ACTIVE_MIN_MS: u64 = 80;
const RSSI_SCAN_ACTIVE_MAX_MS: u64 = 240;
const RSSI_SCAN_MAX_APS: usize = 8;

static WIFI_EVENT_LOGGER_INSTALLED: AtomicBool = AtomicBool::new(false);

pub(crate) struct NetRuntime {
    pub(crate) controller: WifiController<'static>,
    pub(crate) sta_stack: Stack<'static>,
    pub(crate) sta_runner: Runner<'static, WifiDevice<'static>>,
    pub(crate) ap_stack: Stack<'static>,
    pub(crate) ap_runner: Runner<'static, WifiDevice<'static>>,
}

fn wifi_runtime_config() -> WifiRuntimeConfig {
    WifiRuntimeConfig::default()
        .with_rx_queue_size(WIFI_RX_QUEUE_SIZE)
        .with_tx_queue_size(WIFI_TX_QUEUE_SIZE)
        .with_static_rx_buf_num(WIFI_STATIC_RX_BUF_NUM)
        .with_dynamic_rx_buf_num(WIFI_DYNAMIC_RX_BUF_NUM)
        .with_dynamic_tx_buf_num(WIFI_DYNAMIC_TX_BUF_NUM)
        .with_ampdu_rx_enable(false)
        .with_ampdu_tx_enable(false)
        .with_rx_ba_win(WIFI_RX_BA_WIN)
}

/// Brings up the radio and both network stacks. The station stack runs DHCP;
/// the access-point stack carries the fixed portal identity. Only one
/// interface is active at a time, decided by the mode controller.
pub(crate) fn setup(
    wifi: esp_hal::peripherals::WIFI<'static>,
) -> Result<NetRuntime, &'static str> {
    // Station side juggles the DHCP client, DNS queries, probe sockets, the
    // HTTP listener, mDNS, and the update listener at once.
    static RADIO_CTRL: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    static STA_RESOURCES: StaticCell<StackResources<8>> = StaticCell::new();
    static AP_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

    let radio_ctrl = esp_radio::init().map_err(|err| {
        println!("net: esp_radio::init err={:?}", err);
        "net: esp_radio::init failed"
    })?;
    let radio_ctrl = RADIO_CTRL.init(radio_ctrl);
    let (controller, ifaces) = esp_radio::wifi::new(radio_ctrl, wifi, wifi_runtime_config())
        .map_err(|err| {
            println!("net: wifi init err={:?}", err);
            "net: wifi init failed"
        })?;

    let rng = Rng::new();
    let sta_seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let ap_seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let (sta_stack, sta_runner) = embassy_net::new(
        ifaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        STA_RESOURCES.init(StackResources::<8>::new()),
        sta_seed,
    );

    let ap_config = embassy_net::Config::ipv4_static(embassy_net::StaticConfigV4 {
        address: Ipv4Cidr::new(PORTAL_ADDR, PORTAL_PREFIX_LEN),
        gateway: Some(PORTAL_ADDR),
        dns_servers: heapless::Vec::new(),
    });
    let (ap_stack, ap_runner) = embassy_net::new(
        ifaces.ap,
        ap_config,
        AP_RESOURCES.init(StackResources::<4>::new()),
        ap_seed,
    );

    Ok(NetRuntime {
        controller,
        sta_stack,
        sta_runner,
        ap_stack,
        ap_runner,
    })
}

#[embassy_executor::task]
pub(crate) async fn sta_net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

#[embassy_executor::task]
pub(crate) async fn ap_net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// One bounded station-connect attempt: apply the client config, start the
/// radio, associate. The whole attempt shares a single timeout window; there
/// is deliberately no retry loop here. A miss hands the boot to the portal.
pub(crate) async fn station_connect(
    controller: &mut WifiController<'static>,
    config: &DeviceConfig,
) -> Result<(), &'static str> {
    install_wifi_event_logger();

    let mode = station_mode_config(config).ok_or("net: invalid station credentials")?;
    controller
        .set_config(&mode)
        .map_err(|_| "net: station config rejected")?;

    let attempt = async {
        controller
            .start_async()
            .await
            .map_err(|_| "net: wifi start failed")?;
        controller
            .connect_async()
            .await
            .map_err(|_| "net: association failed")
    };

    match with_timeout(Duration::from_secs(STATION_CONNECT_TIMEOUT_SECS), attempt).await {
        Ok(Ok(())) => {
            println!("net: station connected ssid={}", config.network_name());
            Ok(())
        }
        Ok(Err(err)) => {
            println!("net: station connect failed: {}", err);
            Err(err)
        }
        Err(_) => {
            println!(
                "net: station connect timed out after {}s",
                STATION_CONNECT_TIMEOUT_SECS
            );
            Err("net: station connect timeout")
        }
    }
}

fn station_mode_config(config: &DeviceConfig) -> Option<ModeConfig> {
    let ssid = config.network_name();
    if ssid.is_empty() {
        return None;
    }
    let password = config.network_secret();
    let auth_method = if password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::Wpa2Personal
    };
    let client = ClientConfig::default()
        .with_ssid(ssid.into())
        .with_password(password.into())
        .with_auth_method(auth_method)
        .with_scan_method(ScanMethod::AllChannels);
    Some(ModeConfig::Client(client))
}

/// Tears the station down and raises the fixed portal identity.
pub(crate) async fn enter_access_point(
    controller: &mut WifiController<'static>,
) -> Result<(), &'static str> {
    if matches!(controller.is_started(), Ok(true)) {
        let _ = controller.disconnect_async().await;
        let _ = controller.stop_async().await;
    }

    let ap = AccessPointConfig::default().with_ssid(PORTAL_AP_SSID.into());
    controller
        .set_config(&ModeConfig::AccessPoint(ap))
        .map_err(|_| "net: access point config rejected")?;
    controller
        .start_async()
        .await
        .map_err(|_| "net: access point start failed")?;
    println!(
        "portal: access point up ssid={} addr={}",
        PORTAL_AP_SSID, PORTAL_ADDR
    );
    Ok(())
}

/// Disconnect/reconnect without restarting the device. Used by the link
/// supervisor's weak-signal remediation.
pub(crate) async fn reassociate(
    controller: &mut WifiController<'static>,
    config: &DeviceConfig,
) -> Result<(), &'static str> {
    println!("net: reassociating ssid={}", config.network_name());
    let _ = controller.disconnect_async().await;
    Timer::after(Duration::from_millis(250)).await;
    with_timeout(
        Duration::from_secs(STATION_CONNECT_TIMEOUT_SECS),
        controller.connect_async(),
    )
    .await
    .map_err(|_| "net: reassociate timeout")?
    .map_err(|_| "net: reassociate failed")
}

pub(crate) fn link_is_up(controller: &mut WifiController<'static>) -> bool {
    matches!(controller.is_connected(), Ok(true))
}

/// Samples the associated network's signal strength with a short targeted
/// scan. `None` when the scan fails or the SSID is not seen this tick.
pub(crate) async fn sample_signal_dbm(
    controller: &mut WifiController<'static>,
    ssid: &str,
) -> Option<i8> {
    let scan = ScanConfig::default()
        .with_ssid(ssid)
        .with_show_hidden(true)
        .with_max(RSSI_SCAN_MAX_APS)
        .with_scan_type(ScanTypeConfig::Active {
            min: Duration::from_millis(RSSI_SCAN_ACTIVE_MIN_MS).into(),
            max: Duration::from_millis(RSSI_SCAN_ACTIVE_MAX_MS).into(),
        });
    match controller.scan_with_config_async(scan).await {
        Ok(results) => results
            .iter()
            .find(|ap| ap.ssid == ssid)
            .map(|ap| ap.signal_strength),
        Err(err) => {
            println!("net: signal scan err={:?}", err);
            None
        }
    }
}

fn install_wifi_event_logger() {
    if WIFI_EVENT_LOGGER_INSTALLED.swap(true, Ordering::Relaxed) {
        return;
    }

    event::StaConnected::update_handler(|event| {
        let ssid_len = (event.ssid_len() as usize).min(event.ssid().len());
        let ssid = core::str::from_utf8(&event.ssid()[..ssid_len]).unwrap_or("<non_utf8>");
        println!(
            "net: event sta_connected ssid={} channel={}",
            ssid,
            event.channel()
        );
    });

    event::StaDisconnected::update_handler(|event| {
        let reason = event.reason();
        println!(
            "net: event sta_disconnected reason={} ({}) rssi={}",
            reason,
            disconnect_reason_label(reason),
            event.rssi()
        );
    });
}

fn disconnect_reason_label(reason: u8) -> &'static str {
    match reason {
        200 => "beacon_timeout",
        201 => "no_ap_found",
        202 => "auth_fail",
        203 => "assoc_fail",
        204 => "handshake_timeout",
        205 => "connection_fail",
        210 => "no_ap_found_compatible_security",
        211 => "no_ap_found_authmode_threshold",
        212 => "no_ap_found_rssi_threshold",
        _ => "other",
    }
}
