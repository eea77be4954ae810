use super::super::config::{WEAK_SIGNAL_THRESHOLD_DBM, WEAK_SIGNAL_TICK_LIMIT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SupervisorVerdict {
    None,
    /// Weak-signal remediation: disconnect/reconnect without a restart.
    Reassociate,
    /// Link loss: the WiFi stack is not trusted to recover in place.
    Restart,
}

/// Tracks consecutive weak-signal ticks between supervisor runs.
pub(crate) struct LinkSupervisor {
    weak_streak: u8,
}

impl LinkSupervisor {
    pub(crate) const fn new() -> Self {
        Self { weak_streak: 0 }
    }

    pub(crate) fn weak_streak(&self) -> u8 {
        self.weak_streak
    }

    /// One supervisor tick. `signal_dbm` is `None` when no sample was
    /// available this tick; the streak is left untouched in that case.
    pub(crate) fn on_tick(&mut self, link_up: bool, signal_dbm: Option<i8>) -> SupervisorVerdict {
        if !link_up {
            self.weak_streak = 0;
            return SupervisorVerdict::Restart;
        }
        match signal_dbm {
            Some(dbm) if dbm < WEAK_SIGNAL_THRESHOLD_DBM => {
                self.weak_streak = self.weak_streak.saturating_add(1);
                if self.weak_streak >= WEAK_SIGNAL_TICK_LIMIT {
                    self.weak_streak = 0;
                    SupervisorVerdict::Reassociate
                } else {
                    SupervisorVerdict::None
                }
            }
            Some(_) => {
                self.weak_streak = 0;
                SupervisorVerdict::None
            }
            None => SupervisorVerdict::None,
        }
    }
}
