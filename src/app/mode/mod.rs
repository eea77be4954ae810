pub(crate) mod engine;
pub(crate) mod events;
pub(crate) mod machine;
#[cfg(test)]
mod tests;

use embassy_time::Instant;
use esp_println::println;

use super::types::OperatingMode;

pub(crate) use engine::ModeEngine;
pub(crate) use events::ModeEvent;

/// One structured line per mode transition, machine-greppable from the
/// serial log.
pub(crate) fn emit_mode_event(
    from: &str,
    to: OperatingMode,
    trigger: ModeEvent,
    started_at: Instant,
) {
    let at_ms = started_at.elapsed().as_millis() as u32;
    println!(
        "MODE_EVENT {{\"from\":\"{}\",\"to\":\"{}\",\"trigger\":\"{}\",\"at_ms\":{}}}",
        from,
        to.as_str(),
        trigger.as_str(),
        at_ms
    );
}
