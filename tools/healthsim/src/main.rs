//! Host-side replay harness for the firmware's health-cycle and
//! link-supervisor engines. The engines are pure, so the exact files from
//! the firmware tree are compiled here against a small constants shim and
//! driven with scripted probe outcomes.

#![allow(dead_code)]

mod app {
    pub(crate) mod config {
        pub(crate) const NETWORK_NAME_MAX: usize = 32;
        pub(crate) const NETWORK_SECRET_MAX: usize = 64;
        pub(crate) const API_URL_MAX: usize = 128;
        pub(crate) const DEFAULT_NETWORK_NAME: &str = "netsentry-home";
        pub(crate) const DEFAULT_NETWORK_SECRET: &str = "changeme123";
        pub(crate) const DEFAULT_API_URL: &str = "http://192.168.1.10:8080/api/health";
        pub(crate) const PROBE_ATTEMPTS: u8 = 3;
        pub(crate) const PROBE_RETRY_DELAY_SECS: u64 = 5;
        pub(crate) const WEAK_SIGNAL_THRESHOLD_DBM: i8 = -90;
        pub(crate) const WEAK_SIGNAL_TICK_LIMIT: u8 = 6;
        pub(crate) const BLINK_SHORT_MS: u32 = 120;
        pub(crate) const BLINK_LONG_MS: u32 = 600;
    }

    pub(crate) mod types {
        include!("../../../src/app/types.rs");
    }

    pub(crate) mod health {
        pub(crate) mod cycle {
            include!("../../../src/app/health/cycle.rs");
        }
        pub(crate) mod supervisor {
            include!("../../../src/app/health/supervisor.rs");
        }
    }
}

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};

use app::health::cycle::{CycleAction, CycleEngine, ProbeKind};
use app::health::supervisor::{LinkSupervisor, SupervisorVerdict};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scenario {
    /// Internet and API both answer on the first attempt.
    Healthy,
    /// Internet answers, the API endpoint never does.
    ApiDown,
    /// Every internet attempt fails.
    InternetDown,
    /// Internet recovers on the final attempt.
    InternetFlaky,
    /// Signal stays below the weak threshold across supervisor ticks.
    WeakSignal,
}

#[derive(Parser, Debug)]
#[command(about = "Replay health-monitor scenarios against the firmware engines")]
struct Args {
    #[arg(value_enum)]
    scenario: Scenario,
    /// Print every emitted action, not just the summary.
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.scenario {
        Scenario::Healthy => replay_cycle(&[true], &[true], args.trace),
        Scenario::ApiDown => replay_cycle(&[true], &[false, false, false], args.trace),
        Scenario::InternetDown => replay_cycle(&[false, false, false], &[], args.trace),
        Scenario::InternetFlaky => replay_cycle(&[false, false, true], &[true], args.trace),
        Scenario::WeakSignal => replay_weak_signal(args.trace),
    }
}

fn replay_cycle(internet: &[bool], api: &[bool], trace: bool) -> Result<()> {
    let mut engine = CycleEngine::new();
    let mut internet_iter = internet.iter();
    let mut api_iter = api.iter();

    loop {
        let action = engine.next_action();
        if trace {
            println!("action: {action:?}");
        }
        match action {
            CycleAction::Probe(ProbeKind::Internet) => {
                let Some(&outcome) = internet_iter.next() else {
                    bail!("scenario script ran out of internet outcomes");
                };
                engine.record_probe(ProbeKind::Internet, outcome);
            }
            CycleAction::Probe(ProbeKind::Api) => {
                let Some(&outcome) = api_iter.next() else {
                    bail!("scenario script ran out of api outcomes");
                };
                engine.record_probe(ProbeKind::Api, outcome);
            }
            CycleAction::Publish(report) => {
                println!(
                    "report: internet={} api={} attempts={}/{} feedback={:?} deltas={:?}",
                    report.internet_reachable,
                    report.api_reachable,
                    report.internet_attempts,
                    report.api_attempts,
                    report.feedback_pattern(),
                    report.counter_deltas(),
                );
                return Ok(());
            }
            _ => {}
        }
    }
}

fn replay_weak_signal(trace: bool) -> Result<()> {
    let mut supervisor = LinkSupervisor::new();
    for tick in 1..=8 {
        let verdict = supervisor.on_tick(true, Some(-95));
        if trace || verdict != SupervisorVerdict::None {
            println!(
                "tick {tick}: verdict={verdict:?} streak={}",
                supervisor.weak_streak()
            );
        }
        if verdict == SupervisorVerdict::Reassociate {
            println!("report: reassociated after {tick} weak ticks, streak reset");
            return Ok(());
        }
    }
    bail!("weak-signal streak never tripped");
}
