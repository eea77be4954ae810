use super::super::config::{PROBE_ATTEMPTS, PROBE_RETRY_DELAY_SECS};
use super::super::types::BlinkPattern;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ProbeKind {
    Internet,
    Api,
}

/// What the driver should do next. The engine never performs IO itself; it
/// hands out actions and consumes probe outcomes, which keeps the retry
/// shape, ordering, and feedback rules host-testable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CycleAction {
    Blink(BlinkPattern),
    Probe(ProbeKind),
    Wait { seconds: u64 },
    Publish(CycleReport),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CycleReport {
    pub(crate) internet_reachable: bool,
    pub(crate) api_reachable: bool,
    pub(crate) internet_attempts: u8,
    pub(crate) api_attempts: u8,
}

impl CycleReport {
    /// Tiered status feedback: healthy beats degraded beats down.
    pub(crate) fn feedback_pattern(&self) -> BlinkPattern {
        if !self.internet_reachable {
            BlinkPattern::InternetDown
        } else if self.api_reachable {
            BlinkPattern::Healthy
        } else {
            BlinkPattern::ApiDegraded
        }
    }

    /// (internet_up_count, api_success_count) increments for this cycle.
    pub(crate) fn counter_deltas(&self) -> (u32, u32) {
        let internet = if self.internet_reachable { 1 } else { 0 };
        let api = if self.internet_reachable && self.api_reachable {
            1
        } else {
            0
        };
        (internet, api)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Internet,
    InternetBackoff,
    Api,
    ApiBackoff,
    Done,
}

pub(crate) struct CycleEngine {
    phase: Phase,
    attempts: u8,
    report: CycleReport,
}

impl CycleEngine {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Start,
            attempts: 0,
            report: CycleReport {
                internet_reachable: false,
                api_reachable: false,
                internet_attempts: 0,
                api_attempts: 0,
            },
        }
    }

    /// Next action for the driver. `Probe` actions must be answered with
    /// `record_probe` before asking again.
    pub(crate) fn next_action(&mut self) -> CycleAction {
        match self.phase {
            Phase::Start => {
                self.phase = Phase::Internet;
                self.attempts = 0;
                CycleAction::Blink(BlinkPattern::CycleStart)
            }
            Phase::Internet => CycleAction::Probe(ProbeKind::Internet),
            Phase::InternetBackoff => {
                self.phase = Phase::Internet;
                CycleAction::Wait {
                    seconds: PROBE_RETRY_DELAY_SECS,
                }
            }
            Phase::Api => CycleAction::Probe(ProbeKind::Api),
            Phase::ApiBackoff => {
                self.phase = Phase::Api;
                CycleAction::Wait {
                    seconds: PROBE_RETRY_DELAY_SECS,
                }
            }
            Phase::Done => CycleAction::Publish(self.report),
        }
    }

    pub(crate) fn record_probe(&mut self, kind: ProbeKind, reachable: bool) {
        self.attempts = self.attempts.saturating_add(1);
        match kind {
            ProbeKind::Internet => {
                self.report.internet_attempts = self.attempts;
                if reachable {
                    self.report.internet_reachable = true;
                    self.phase = Phase::Api;
                    self.attempts = 0;
                } else if self.attempts >= PROBE_ATTEMPTS {
                    // API is only ever probed after internet confirms.
                    self.phase = Phase::Done;
                } else {
                    self.phase = Phase::InternetBackoff;
                }
            }
            ProbeKind::Api => {
                self.report.api_attempts = self.attempts;
                if reachable {
                    self.report.api_reachable = true;
                    self.phase = Phase::Done;
                } else if self.attempts >= PROBE_ATTEMPTS {
                    self.phase = Phase::Done;
                } else {
                    self.phase = Phase::ApiBackoff;
                }
            }
        }
    }
}
