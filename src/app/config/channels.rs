use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};

use super::super::types::{IndicatorCommand, ModeCommand};

pub(crate) static INDICATOR_COMMANDS: Channel<CriticalSectionRawMutex, IndicatorCommand, 8> =
    Channel::new();
pub(crate) static MODE_COMMANDS: Channel<CriticalSectionRawMutex, ModeCommand, 2> = Channel::new();
