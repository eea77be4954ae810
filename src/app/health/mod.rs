pub(crate) mod counters;
pub(crate) mod cycle;
pub(crate) mod snapshot;
pub(crate) mod supervisor;
#[cfg(test)]
mod tests;

use embassy_net::Stack;
use embassy_time::{Duration, Ticker, Timer};
use esp_println::println;

use super::config::channels::INDICATOR_COMMANDS;
use super::config::{HEALTH_CHECK_INTERVAL_SECS, MODE_GATE_POLL_MS};
use super::net::probe;
use super::types::{DeviceConfig, IndicatorCommand, OperatingMode};
use cycle::{CycleAction, CycleEngine, ProbeKind};

/// Periodic probe cycle. Only runs in Station mode with a lease in hand;
/// otherwise it idles until the mode comes back.
#[embassy_executor::task]
pub(crate) async fn health_cycle_task(stack: Stack<'static>, config: DeviceConfig) {
    let mut ticker = Ticker::every(Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS));
    loop {
        if !matches!(snapshot::current_mode(), OperatingMode::Station) {
            Timer::after(Duration::from_millis(MODE_GATE_POLL_MS)).await;
            continue;
        }
        if stack.config_v4().is_none() {
            Timer::after(Duration::from_millis(MODE_GATE_POLL_MS)).await;
            continue;
        }
        run_cycle(stack, &config).await;
        ticker.next().await;
    }
}

async fn run_cycle(stack: Stack<'static>, config: &DeviceConfig) {
    let mut engine = CycleEngine::new();
    loop {
        match engine.next_action() {
            CycleAction::Blink(pattern) => {
                INDICATOR_COMMANDS
                    .send(IndicatorCommand::Blink(pattern))
                    .await;
            }
            CycleAction::Probe(ProbeKind::Internet) => {
                let reachable = probe::probe_internet(stack).await;
                engine.record_probe(ProbeKind::Internet, reachable);
            }
            CycleAction::Probe(ProbeKind::Api) => {
                let reachable = probe::probe_endpoint(stack, config.api_url()).await;
                engine.record_probe(ProbeKind::Api, reachable);
            }
            CycleAction::Wait { seconds } => {
                Timer::after(Duration::from_secs(seconds)).await;
            }
            CycleAction::Publish(report) => {
                // Indicators first, then the tiered feedback blink, then the
                // counters: the cycle's externally visible order.
                INDICATOR_COMMANDS
                    .send(IndicatorCommand::SetInternet {
                        reachable: report.internet_reachable,
                    })
                    .await;
                INDICATOR_COMMANDS
                    .send(IndicatorCommand::Blink(report.feedback_pattern()))
                    .await;
                snapshot::publish_probe_outcome(report.internet_reachable, report.api_reachable);

                let (internet_delta, api_delta) = report.counter_deltas();
                let mut totals = counters::load();
                totals.internet_up_count = totals.internet_up_count.wrapping_add(internet_delta);
                totals.api_success_count = totals.api_success_count.wrapping_add(api_delta);
                counters::store(&totals);

                println!(
                    "health: cycle internet={} api={} attempts={}/{} up_count={} api_count={}",
                    report.internet_reachable,
                    report.api_reachable,
                    report.internet_attempts,
                    report.api_attempts,
                    totals.internet_up_count,
                    totals.api_success_count
                );
                break;
            }
        }
    }
}
