use super::super::types::BlinkPattern;
use super::counters::{HealthCounters, COUNTERS_RECORD_LEN};
use super::cycle::{CycleAction, CycleEngine, CycleReport, ProbeKind};
use super::supervisor::{LinkSupervisor, SupervisorVerdict};

/// Drives the engine with scripted probe outcomes and collects the emitted
/// actions until the report is published.
fn drive(internet: &[bool], api: &[bool]) -> (heapless::Vec<CycleAction, 16>, CycleReport) {
    let mut engine = CycleEngine::new();
    let mut actions: heapless::Vec<CycleAction, 16> = heapless::Vec::new();
    let mut internet_iter = internet.iter();
    let mut api_iter = api.iter();
    loop {
        let action = engine.next_action();
        actions.push(action).unwrap();
        match action {
            CycleAction::Probe(ProbeKind::Internet) => {
                engine.record_probe(ProbeKind::Internet, *internet_iter.next().unwrap());
            }
            CycleAction::Probe(ProbeKind::Api) => {
                engine.record_probe(ProbeKind::Api, *api_iter.next().unwrap());
            }
            CycleAction::Publish(report) => return (actions, report),
            _ => {}
        }
    }
}

fn count_waits(actions: &[CycleAction]) -> usize {
    actions
        .iter()
        .filter(|action| matches!(action, CycleAction::Wait { seconds: 5 }))
        .count()
}

#[test]
fn cycle_starts_with_a_short_blink() {
    let (actions, _) = drive(&[true], &[true]);
    assert_eq!(actions[0], CycleAction::Blink(BlinkPattern::CycleStart));
}

#[test]
fn three_failed_internet_attempts_end_the_cycle_down() {
    let (actions, report) = drive(&[false, false, false], &[]);
    assert!(!report.internet_reachable);
    assert!(!report.api_reachable);
    assert_eq!(report.internet_attempts, 3);
    assert_eq!(report.api_attempts, 0);
    assert_eq!(report.feedback_pattern(), BlinkPattern::InternetDown);
    // Two backoffs of 5 time units between the three failed attempts.
    assert_eq!(count_waits(&actions), 2);
    // The API probe never runs when internet stayed down.
    assert!(!actions
        .iter()
        .any(|action| matches!(action, CycleAction::Probe(ProbeKind::Api))));
}

#[test]
fn first_attempt_success_on_both_probes_is_healthy() {
    let (actions, report) = drive(&[true], &[true]);
    assert!(report.internet_reachable);
    assert!(report.api_reachable);
    assert_eq!(report.internet_attempts, 1);
    assert_eq!(report.api_attempts, 1);
    assert_eq!(report.feedback_pattern(), BlinkPattern::Healthy);
    assert_eq!(count_waits(&actions), 0);
    assert_eq!(report.counter_deltas(), (1, 1));
}

#[test]
fn api_down_after_three_attempts_is_one_long_blink() {
    let (actions, report) = drive(&[true], &[false, false, false]);
    assert!(report.internet_reachable);
    assert!(!report.api_reachable);
    assert_eq!(report.api_attempts, 3);
    assert_eq!(report.feedback_pattern(), BlinkPattern::ApiDegraded);
    assert_eq!(count_waits(&actions), 2);
    // Internet counter moves, API counter does not.
    assert_eq!(report.counter_deltas(), (1, 0));
}

#[test]
fn internet_recovers_on_second_attempt() {
    let (actions, report) = drive(&[false, true], &[true]);
    assert!(report.internet_reachable);
    assert_eq!(report.internet_attempts, 2);
    assert_eq!(count_waits(&actions), 1);
}

#[test]
fn api_never_reachable_without_internet() {
    for script in [[false, false, false]] {
        let (_, report) = drive(&script, &[]);
        assert!(!report.api_reachable);
        assert_eq!(report.counter_deltas(), (0, 0));
    }
}

#[test]
fn internet_probing_strictly_precedes_api_probing() {
    let (actions, _) = drive(&[false, true], &[true]);
    let first_api = actions
        .iter()
        .position(|action| matches!(action, CycleAction::Probe(ProbeKind::Api)))
        .unwrap();
    let last_internet = actions
        .iter()
        .rposition(|action| matches!(action, CycleAction::Probe(ProbeKind::Internet)))
        .unwrap();
    assert!(last_internet < first_api);
}

#[test]
fn blink_pattern_shapes_match_the_tiers() {
    assert_eq!(BlinkPattern::Healthy.shape().0, 2);
    assert_eq!(BlinkPattern::InternetDown.shape().0, 3);
    assert_eq!(BlinkPattern::ApiDegraded.shape().0, 1);
    // The degraded tier is the long pulse, the rest are short.
    assert!(BlinkPattern::ApiDegraded.shape().1 > BlinkPattern::Healthy.shape().1);
}

#[test]
fn counters_record_round_trips() {
    let counters = HealthCounters {
        boot_count: 7,
        internet_up_count: 1042,
        api_success_count: 998,
    };
    let record = counters.encode();
    assert_eq!(HealthCounters::decode(&record), Some(counters));
}

#[test]
fn corrupt_counters_record_reads_as_uninitialized() {
    let counters = HealthCounters {
        boot_count: 3,
        internet_up_count: 5,
        api_success_count: 2,
    };
    let mut record = counters.encode();
    record[6] ^= 0x40;
    assert_eq!(HealthCounters::decode(&record), None);

    let blank = [0u8; COUNTERS_RECORD_LEN];
    assert_eq!(HealthCounters::decode(&blank), None);

    let erased = [0xFFu8; COUNTERS_RECORD_LEN];
    assert_eq!(HealthCounters::decode(&erased), None);
}

#[test]
fn six_weak_ticks_trigger_exactly_one_reassociation() {
    let mut supervisor = LinkSupervisor::new();
    for _ in 0..5 {
        assert_eq!(
            supervisor.on_tick(true, Some(-95)),
            SupervisorVerdict::None
        );
    }
    assert_eq!(
        supervisor.on_tick(true, Some(-95)),
        SupervisorVerdict::Reassociate
    );
    assert_eq!(supervisor.weak_streak(), 0);
    // The streak restarts from scratch afterwards.
    assert_eq!(supervisor.on_tick(true, Some(-95)), SupervisorVerdict::None);
}

#[test]
fn five_weak_ticks_trigger_nothing() {
    let mut supervisor = LinkSupervisor::new();
    for _ in 0..5 {
        assert_eq!(
            supervisor.on_tick(true, Some(-95)),
            SupervisorVerdict::None
        );
    }
    assert_eq!(supervisor.weak_streak(), 5);
}

#[test]
fn a_strong_sample_resets_the_weak_streak() {
    let mut supervisor = LinkSupervisor::new();
    for _ in 0..4 {
        let _ = supervisor.on_tick(true, Some(-95));
    }
    let _ = supervisor.on_tick(true, Some(-60));
    assert_eq!(supervisor.weak_streak(), 0);
}

#[test]
fn exactly_at_threshold_is_not_weak() {
    let mut supervisor = LinkSupervisor::new();
    for _ in 0..8 {
        assert_eq!(
            supervisor.on_tick(true, Some(-90)),
            SupervisorVerdict::None
        );
    }
    assert_eq!(supervisor.weak_streak(), 0);
}

#[test]
fn link_down_restarts_immediately() {
    let mut supervisor = LinkSupervisor::new();
    assert_eq!(supervisor.on_tick(false, None), SupervisorVerdict::Restart);
}

#[test]
fn missing_sample_leaves_the_streak_alone() {
    let mut supervisor = LinkSupervisor::new();
    for _ in 0..3 {
        let _ = supervisor.on_tick(true, Some(-95));
    }
    assert_eq!(supervisor.on_tick(true, None), SupervisorVerdict::None);
    assert_eq!(supervisor.weak_streak(), 3);
}
