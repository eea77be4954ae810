pub(crate) mod config;
mod health;
mod http;
mod indicators;
mod mode;
mod net;
pub(crate) mod store;
mod types;
mod update;

use embassy_futures::select::{select, Either};
use embassy_net::Stack;
use embassy_time::{with_timeout, Duration, Instant, Ticker, Timer};
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::timer::timg::TimerGroup;
use esp_println::println;
use esp_radio::wifi::WifiController;

use config::channels::MODE_COMMANDS;
use config::{
    RESET_BUTTON_HOLD_MS, RESET_BUTTON_SAMPLE_MS, SUPERVISOR_TICK_SECS, WEAK_SIGNAL_TICK_LIMIT,
};
use health::snapshot;
use health::supervisor::{LinkSupervisor, SupervisorVerdict};
use indicators::IndicatorPins;
use mode::{emit_mode_event, ModeEngine, ModeEvent};
use store::SettingsStore;
use types::{BlinkPattern, DeviceConfig, ModeCommand, OperatingMode};
use update::IndicatorUpdateHooks;

static UPDATE_HOOKS: IndicatorUpdateHooks = IndicatorUpdateHooks;

pub(crate) fn run() -> ! {
    let peripherals = esp_hal::init(esp_hal::Config::default());
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // The radio driver allocates its state from this heap.
    esp_alloc::heap_allocator!(size: 72 * 1024);

    println!("netsentry: boot");

    let pins = IndicatorPins {
        status: Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default()),
        internet_down: Output::new(peripherals.GPIO4, Level::Low, OutputConfig::default()),
        internet_up: Output::new(peripherals.GPIO5, Level::Low, OutputConfig::default()),
    };

    let mut settings = SettingsStore::new(peripherals.FLASH);

    // Physical override, sampled exactly once per boot: hold the reset input
    // low through the whole window and the device wipes itself back to
    // factory settings before either mode comes up.
    let reset_button = Input::new(
        peripherals.GPIO0,
        InputConfig::default().with_pull(Pull::Up),
    );
    if button_held_low(&reset_button) {
        println!("netsentry: reset input held at boot, restoring factory defaults");
        if let Err(err) = settings.reset_to_defaults() {
            println!("store: factory reset failed: {:?}", err);
        }
        restart();
    }

    let mut device_config = settings.load();
    if device_config.network_name_is_empty() {
        println!("store: empty network name, writing factory defaults");
        device_config = DeviceConfig::factory_defaults();
        if let Err(err) = settings.save(&device_config) {
            println!("store: default save failed: {:?}", err);
        }
    }
    println!(
        "netsentry: config ssid={} api={}",
        device_config.network_name(),
        device_config.api_url()
    );
    store::install(settings);

    let mut totals = health::counters::load();
    totals.boot_count = totals.boot_count.wrapping_add(1);
    health::counters::store(&totals);
    println!("netsentry: boot_count={}", totals.boot_count);

    let net_runtime = match net::setup(peripherals.WIFI) {
        Ok(runtime) => runtime,
        Err(err) => {
            println!("{}", err);
            let delay = esp_hal::delay::Delay::new();
            delay.delay_millis(2_000);
            restart();
        }
    };

    let mut executor = esp_rtos::embassy::Executor::new();
    let executor = unsafe { make_static(&mut executor) };
    executor.run(move |spawner| {
        spawner.must_spawn(indicators::indicator_task(pins));
        spawner.must_spawn(net::sta_net_task(net_runtime.sta_runner));
        spawner.must_spawn(net::ap_net_task(net_runtime.ap_runner));
        spawner.must_spawn(net::dns::captive_dns_task(net_runtime.ap_stack));
        spawner.must_spawn(net::dhcp::dhcp_lease_task(net_runtime.ap_stack));
        spawner.must_spawn(net::announce::mdns_responder_task(net_runtime.sta_stack));
        spawner.must_spawn(update::update_listener_task(
            net_runtime.sta_stack,
            &UPDATE_HOOKS,
        ));
        spawner.must_spawn(http::station_http_task(net_runtime.sta_stack, device_config));
        spawner.must_spawn(http::portal_http_task(net_runtime.ap_stack, device_config));
        spawner.must_spawn(health::health_cycle_task(
            net_runtime.sta_stack,
            device_config,
        ));
        spawner.must_spawn(control_task(
            net_runtime.controller,
            net_runtime.sta_stack,
            device_config,
        ));
    });
}

/// Boot decision plus the link supervisor: one owner for the WiFi controller.
#[embassy_executor::task]
async fn control_task(
    mut controller: WifiController<'static>,
    sta_stack: Stack<'static>,
    device_config: DeviceConfig,
) {
    let started_at = Instant::now();
    let mut engine = ModeEngine::new();

    // Success means associated with a lease in hand; the attempt gets its
    // bounded window and nothing more. A miss goes straight to the portal,
    // never into a boot-time retry loop.
    let station_ready = match net::station_connect(&mut controller, &device_config).await {
        Ok(()) => {
            let lease = with_timeout(
                Duration::from_secs(config::STATION_CONNECT_TIMEOUT_SECS),
                sta_stack.wait_config_up(),
            )
            .await;
            if lease.is_err() {
                println!("net: no lease within the connect window");
            }
            lease.is_ok()
        }
        Err(_) => false,
    };

    if station_ready {
        let result = engine.apply(ModeEvent::StationConnected);
        emit_mode_event("Boot", result.after, ModeEvent::StationConnected, started_at);
        snapshot::publish_mode(OperatingMode::Station);
        snapshot::publish_link(true, 0);
        if let Some(net_config) = sta_stack.config_v4() {
            println!("net: station lease {}", net_config.address.address());
        }
    } else {
        let result = engine.apply(ModeEvent::StationTimeout);
        emit_mode_event("Boot", result.after, ModeEvent::StationTimeout, started_at);
        enter_portal(&mut controller).await;
        snapshot::publish_mode(OperatingMode::ConfigurationPortal);
    }

    let mut supervisor = LinkSupervisor::new();
    let mut ticker = Ticker::every(Duration::from_secs(SUPERVISOR_TICK_SECS));
    loop {
        match select(ticker.next(), MODE_COMMANDS.receive()).await {
            Either::First(()) => {
                if !matches!(engine.mode(), OperatingMode::Station) {
                    continue;
                }
                let link_up = net::link_is_up(&mut controller);
                let signal = if link_up {
                    net::sample_signal_dbm(&mut controller, device_config.network_name()).await
                } else {
                    None
                };
                snapshot::publish_link(
                    link_up,
                    signal.unwrap_or_else(|| snapshot::read().signal_dbm),
                );
                match supervisor.on_tick(link_up, signal) {
                    SupervisorVerdict::Restart => {
                        println!("health: station link down, restarting");
                        restart();
                    }
                    SupervisorVerdict::Reassociate => {
                        println!(
                            "health: signal weak for {} ticks, reconnecting",
                            WEAK_SIGNAL_TICK_LIMIT
                        );
                        if let Err(err) = net::reassociate(&mut controller, &device_config).await {
                            println!("{}", err);
                        }
                    }
                    SupervisorVerdict::None => {}
                }
            }
            Either::Second(command) => match command {
                ModeCommand::EnterConfigurationPortal => {
                    let result = engine.apply(ModeEvent::PortalRequested);
                    if result.changed() {
                        emit_mode_event(
                            result.before.as_str(),
                            result.after,
                            ModeEvent::PortalRequested,
                            started_at,
                        );
                        enter_portal(&mut controller).await;
                        snapshot::publish_mode(OperatingMode::ConfigurationPortal);
                        snapshot::publish_link(false, 0);
                    }
                }
            },
        }
    }
}

/// Portal bring-up is all-or-nothing: a device that cannot raise its access
/// point has no recovery path besides trying the boot again.
async fn enter_portal(controller: &mut WifiController<'static>) {
    if let Err(err) = net::enter_access_point(controller).await {
        println!("{}", err);
        indicators::try_blink(BlinkPattern::ServiceFault);
        Timer::after(Duration::from_secs(2)).await;
        restart();
    }
}

fn button_held_low(button: &Input<'_>) -> bool {
    let delay = esp_hal::delay::Delay::new();
    // Let the pull-up settle after reset before trusting the level.
    delay.delay_millis(5);
    if !button.is_low() {
        return false;
    }
    let mut held_ms = 0u32;
    while held_ms < RESET_BUTTON_HOLD_MS {
        delay.delay_millis(RESET_BUTTON_SAMPLE_MS);
        held_ms += RESET_BUTTON_SAMPLE_MS;
        if !button.is_low() {
            return false;
        }
    }
    true
}

pub(crate) fn restart() -> ! {
    esp_hal::system::software_reset()
}

unsafe fn make_static<T>(value: &mut T) -> &'static mut T {
    unsafe { core::mem::transmute(value) }
}
