use statig::blocking::IntoStateMachineExt as _;

use super::super::types::OperatingMode;
use super::events::ModeEvent;
use super::machine::{DispatchContext, ModeApplyStatus, ModeMachine};

#[derive(Clone, Copy, Debug)]
pub(crate) struct ModeApplyResult {
    pub(crate) before: OperatingMode,
    pub(crate) after: OperatingMode,
    pub(crate) status: ModeApplyStatus,
}

impl ModeApplyResult {
    pub(crate) fn changed(self) -> bool {
        matches!(self.status, ModeApplyStatus::Applied)
    }
}

pub(crate) struct ModeEngine {
    machine: statig::blocking::StateMachine<ModeMachine>,
}

impl ModeEngine {
    pub(crate) fn new() -> Self {
        Self {
            machine: ModeMachine {
                mode: OperatingMode::Station,
            }
            .state_machine(),
        }
    }

    pub(crate) fn mode(&self) -> OperatingMode {
        self.machine.inner().mode
    }

    pub(crate) fn apply(&mut self, event: ModeEvent) -> ModeApplyResult {
        let before = self.mode();
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(&event, &mut context);
        ModeApplyResult {
            before,
            after: self.mode(),
            status: context.status,
        }
    }
}
