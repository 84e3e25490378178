//! End-to-end scenario tests named for the dataflow they exercise (spec §8).

use actuation_engine::prelude::*;

struct RecordingActuator {
    prefetched: Vec<u64>,
    hydrated: Vec<u64>,
}

impl RecordingActuator {
    fn new() -> Self {
        Self { prefetched: Vec::new(), hydrated: Vec::new() }
    }
}

impl Actuator for RecordingActuator {
    fn prefetch(&mut self, type_def: &IslandTypeDef, _flags: u8) -> Option<PrefetchHandle> {
        self.prefetched.push(u64::from(type_def.type_id));
        Some(PrefetchHandle { kind: HandleKind::Fetch, done: None })
    }

    fn hydrate(&mut self, _handle: Option<PrefetchHandle>, key: IslandKey) -> Result<()> {
        self.hydrated.push(key.raw());
        Ok(())
    }
}

fn registry_with(type_id: u16, est_bytes: u64) -> Registry {
    let mut registry = Registry::new();
    registry.register(IslandTypeDef {
        type_id,
        name: "card".to_string(),
        entry: "card.js".to_string(),
        export_name: None,
        kind: IslandKind::Component,
        default_flags: 0,
        est_bytes,
        est_cpu_ms: 2.0,
        est_benefit_ms: 400.0,
        nav_prop: None,
    });
    registry
}

#[test]
fn straight_approach_builds_high_score() {
    let mut predictor = KineticPredictor::new(PredictorConfig::default());
    predictor.reset(0.0, 0.0);
    for i in 1..=10 {
        predictor.update(10.0 * f64::from(i), 0.0, 16.67);
    }
    assert!(predictor.hint(30.0, 0.0, 400.0) > 0.3);
    assert_eq!(predictor.hint(-50.0, 0.0, 400.0), 0.0);
}

#[test]
fn cone_narrows_with_approach_speed() {
    let mut slow = KineticPredictor::new(PredictorConfig::default());
    slow.reset(0.0, 0.0);
    let mut fast = KineticPredictor::new(PredictorConfig::default());
    fast.reset(0.0, 0.0);
    let mut slow_pos = 0.0;
    let mut fast_pos = 0.0;
    for _ in 0..10 {
        slow_pos += 3.0;
        fast_pos += 20.0;
        slow.update(slow_pos, 0.0, 16.67);
        fast.update(fast_pos, 0.0, 16.67);
    }
    let score_slow = slow.hint(20.0, 15.0, 400.0);
    let score_fast = fast.hint(20.0, 15.0, 400.0);
    assert!(score_fast <= score_slow);
}

#[test]
fn lock_dwell_requires_hold_frames_before_switching() {
    let cfg = LockConfig {
        score_floor: 0.0,
        min_margin_2nd: 0.0,
        switch_margin: 0.0,
        hold_frames: 3,
        ..LockConfig::default()
    };
    let mut lock = TargetLock::new(cfg);
    let mut predictor = KineticPredictor::new(PredictorConfig::default());
    predictor.reset(0.0, 0.0);

    let near = Candidate { key: IslandKey::pack(1, 0, 0).unwrap(), rect: Rect { x: 1.0, y: 0.0, w: 40.0, h: 40.0 } };
    let far = Candidate { key: IslandKey::pack(2, 0, 0).unwrap(), rect: Rect { x: 1000.0, y: 1000.0, w: 40.0, h: 40.0 } };

    let first = lock.update(&[near, far], (0.0, 0.0), &predictor, 16.0);
    assert_eq!(first.winner, Some(near.key));
    assert!(first.actuate);

    let rival = Candidate { key: IslandKey::pack(2, 0, 0).unwrap(), rect: Rect { x: 1.0, y: 0.0, w: 40.0, h: 40.0 } };
    for _ in 0..2 {
        let selection = lock.update(&[far, rival], (0.0, 0.0), &predictor, 16.0);
        assert_eq!(selection.winner, Some(near.key));
        assert!(!selection.actuate);
    }
    let switched = lock.update(&[far, rival], (0.0, 0.0), &predictor, 16.0);
    assert_eq!(switched.winner, Some(rival.key));
    assert!(switched.actuate);
}

#[test]
fn scheduler_respects_inflight_and_byte_budget() {
    let cfg = SchedulerConfig { max_inflight_fetch: 1, max_bytes_in_flight: 50_000, ..SchedulerConfig::default() };
    let mut scheduler = FlightScheduler::new(cfg);
    let registry = registry_with(1, 30_000);
    let targets: Vec<PrefetchTarget> = (1..=3)
        .map(|props| PrefetchTarget {
            key: IslandKey::pack(1, props, Flag::PrefetchSafe as u8).unwrap(),
            est_bytes: 30_000,
            est_cpu_ms: 1.0,
            utility: 1.0,
        })
        .collect();
    scheduler.enqueue(&Decision::Prefetch { targets, tier: 1 }, &registry, 0.0);

    let mut actuator = RecordingActuator::new();
    scheduler.tick(0.0, &registry, &mut actuator, None, &NullSink);
    assert_eq!(scheduler.inflight_count(), 1);
    assert_eq!(scheduler.queue_len(), 2);

    // Past assumeReadyDelayMs the prefetch is promoted and its budget freed,
    // so the second target can dispatch.
    let ready_at = SchedulerConfig::default().assume_ready_delay_ms + 1.0;
    scheduler.tick(ready_at, &registry, &mut actuator, None, &NullSink);
    assert_eq!(scheduler.inflight_count(), 1);
    assert_eq!(scheduler.queue_len(), 1);
}

#[test]
fn reputation_recovers_partially_after_one_hit_following_many_misses() {
    let mut ledger = ReputationLedger::new(LedgerConfig::default());
    for t in 0..10 {
        ledger.record_miss("route", "island", f64::from(t));
    }
    let after_misses = ledger.prior("route", "island");
    assert!(after_misses < 1.0);

    ledger.record_hit("route", "island", 10.0);
    let after_hit = ledger.prior("route", "island");
    assert!(after_hit < 1.0);
    assert!(after_hit > after_misses);
}

#[test]
fn pressure_gating_skips_regardless_of_score_when_targets_zeroed() {
    let registry = registry_with(1, 10_000);
    let key = IslandKey::pack(1, 0, Flag::PrefetchSafe as u8).unwrap();
    let selection = Selection {
        winner: Some(key),
        winner_score: 1.0,
        best_key: Some(key),
        best_score: 1.0,
        second_score: 0.0,
        margin2nd: 1.0,
        nearest_key: Some(key),
        nearest_d_sq: 10.0,
        speed: 1.0,
        actuate: true,
        pending_key: None,
        pending_count: 0,
        top: vec![ScoredCandidate { key, score: 1.0, d_sq: 10.0 }],
    };
    let pressure = PressureSignals { cpu_pressure: 1.0, net_pressure: 1.0, save_data: false };
    let ledger = ReputationLedger::new(LedgerConfig::default());
    let decision = decide(&selection, &registry, &pressure, &ledger, "route", &GateConfig::default());
    assert_eq!(decision, Decision::Skip { reason: "pressure_zeroed_targets" });
}

#[test]
fn engine_tick_runs_the_full_pipeline_without_panicking() {
    let mut registry = Registry::new();
    registry.register(IslandTypeDef {
        type_id: 1,
        name: "card".to_string(),
        entry: "card.js".to_string(),
        export_name: None,
        kind: IslandKind::Component,
        default_flags: 0,
        est_bytes: 10_000,
        est_cpu_ms: 2.0,
        est_benefit_ms: 300.0,
        nav_prop: None,
    });
    let mut engine = Engine::new(EngineConfig::default(), registry);
    engine.reset_cursor(0.0, 0.0);
    let mut actuator = RecordingActuator::new();
    let island = Candidate {
        key: IslandKey::pack(1, 0, Flag::PrefetchSafe as u8).unwrap(),
        rect: Rect { x: 40.0, y: 0.0, w: 30.0, h: 30.0 },
    };
    for tick in 1..=30 {
        engine.tick(
            16.0 * f64::from(tick),
            16.0,
            (3.0 * f64::from(tick), 0.0),
            [island],
            &ConnectionSnapshot::default(),
            0.0,
            "route",
            &mut actuator,
        );
    }
    assert!(!actuator.prefetched.is_empty());
}
