use statig::prelude::*;

use super::super::types::OperatingMode;
use super::events::ModeEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ModeApplyStatus {
    Applied,
    Unchanged,
    InvalidTransition,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct ModeMachine {
    pub(super) mode: OperatingMode,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct DispatchContext {
    pub(super) status: ModeApplyStatus,
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self {
            status: ModeApplyStatus::Unchanged,
        }
    }
}

/// Boot decides the mode exactly once; the only later transition is the
/// forced drop into the portal. There is no live path back to Station;
/// leaving the portal always goes through a restart.
#[state_machine(initial = "State::booting()")]
impl ModeMachine {
    #[state]
    fn booting(
        &mut self,
        context: &mut DispatchContext,
        event: &ModeEvent,
    ) -> Outcome<State> {
        match event {
            ModeEvent::StationConnected => {
                self.mode = OperatingMode::Station;
                context.status = ModeApplyStatus::Applied;
                Transition(State::station())
            }
            ModeEvent::StationTimeout | ModeEvent::PortalRequested => {
                self.mode = OperatingMode::ConfigurationPortal;
                context.status = ModeApplyStatus::Applied;
                Transition(State::configuration_portal())
            }
        }
    }

    #[state]
    fn station(
        &mut self,
        context: &mut DispatchContext,
        event: &ModeEvent,
    ) -> Outcome<State> {
        match event {
            ModeEvent::PortalRequested => {
                self.mode = OperatingMode::ConfigurationPortal;
                context.status = ModeApplyStatus::Applied;
                Transition(State::configuration_portal())
            }
            ModeEvent::StationConnected => {
                context.status = ModeApplyStatus::Unchanged;
                Handled
            }
            ModeEvent::StationTimeout => {
                context.status = ModeApplyStatus::InvalidTransition;
                Handled
            }
        }
    }

    #[state]
    fn configuration_portal(
        &mut self,
        context: &mut DispatchContext,
        event: &ModeEvent,
    ) -> Outcome<State> {
        match event {
            ModeEvent::PortalRequested => {
                context.status = ModeApplyStatus::Unchanged;
                Handled
            }
            ModeEvent::StationConnected | ModeEvent::StationTimeout => {
                context.status = ModeApplyStatus::InvalidTransition;
                Handled
            }
        }
    }
}
