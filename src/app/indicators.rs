use embassy_time::{Duration, Timer};
use esp_hal::gpio::Output;

use super::config::channels::INDICATOR_COMMANDS;
use super::config::BLINK_GAP_MS;
use super::types::IndicatorCommand;

pub(crate) struct IndicatorPins {
    pub(crate) status: Output<'static>,
    pub(crate) internet_down: Output<'static>,
    pub(crate) internet_up: Output<'static>,
}

/// Single owner of the three output lines. The down/up pair is rewritten on
/// every `SetInternet`, so neither can go stale or overlap the other.
#[embassy_executor::task]
pub(crate) async fn indicator_task(mut pins: IndicatorPins) {
    loop {
        match INDICATOR_COMMANDS.receive().await {
            IndicatorCommand::Blink(pattern) => {
                let (count, on_ms) = pattern.shape();
                for _ in 0..count {
                    pins.status.set_high();
                    Timer::after(Duration::from_millis(on_ms as u64)).await;
                    pins.status.set_low();
                    Timer::after(Duration::from_millis(BLINK_GAP_MS as u64)).await;
                }
            }
            IndicatorCommand::SetInternet { reachable } => {
                if reachable {
                    pins.internet_down.set_low();
                    pins.internet_up.set_high();
                } else {
                    pins.internet_up.set_low();
                    pins.internet_down.set_high();
                }
            }
        }
    }
}

/// Fire-and-forget blink for contexts that must not block on a full channel.
pub(crate) fn try_blink(pattern: super::types::BlinkPattern) {
    let _ = INDICATOR_COMMANDS.try_send(IndicatorCommand::Blink(pattern));
}
