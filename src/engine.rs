//! Frame loop: glues predictor → lock → pressure/ledger → gate → scheduler
//! into one `tick` call (spec §2 dataflow, §9 "Frame loop"). Grounded on
//! this codebase's daemon main loop, which runs the same kind of fixed,
//! ordered per-tick pipeline (scan → classify → act) over a single
//! logical thread.

use crate::core::config::{DerivedConfig, EngineConfig};
use crate::core::errors::EngineError;
use crate::gate::{self, Decision, Registry};
use crate::ledger::ReputationLedger;
use crate::locator::{Candidate, SpatialLocator};
use crate::lock::TargetLock;
use crate::predictor::KineticPredictor;
use crate::pressure::{ConnectionSnapshot, PressureMonitor};
use crate::scheduler::{Actuator, FlightScheduler};
use crate::telemetry::{EngineEvent, EventSink, NullSink};

/// Owns every component and runs one tick of the dataflow described in
/// the system overview: `pointer → predictor → candidates (locator) →
/// lock → selection → pressure + ledger → gate → Decision → scheduler`.
pub struct Engine<S: EventSink = NullSink> {
    config: EngineConfig,
    derived: DerivedConfig,
    predictor: KineticPredictor,
    locator: SpatialLocator,
    lock: TargetLock,
    ledger: ReputationLedger,
    pressure: PressureMonitor,
    scheduler: FlightScheduler,
    registry: Registry,
    sink: S,
    candidate_scratch: Vec<Candidate>,
    last_now_ms: f64,
}

impl Engine<NullSink> {
    /// Build an engine with no telemetry sink wired up.
    #[must_use]
    pub fn new(config: EngineConfig, registry: Registry) -> Self {
        Self::with_sink(config, registry, NullSink)
    }
}

impl<S: EventSink> Engine<S> {
    #[must_use]
    pub fn with_sink(config: EngineConfig, registry: Registry, sink: S) -> Self {
        let derived = config.derive();
        Self {
            predictor: KineticPredictor::new(config.predictor),
            locator: SpatialLocator::new(config.locator.cell_size_px),
            lock: TargetLock::new(config.lock),
            ledger: ReputationLedger::new(config.ledger),
            pressure: PressureMonitor::new(config.pressure),
            scheduler: FlightScheduler::new(config.scheduler),
            registry,
            sink,
            config,
            derived,
            candidate_scratch: Vec::new(),
            last_now_ms: 0.0,
        }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Squared-threshold cache derived from the current configuration.
    #[must_use]
    pub fn derived_config(&self) -> DerivedConfig {
        self.derived
    }

    /// Replace configuration atomically. Rejected fields are reported via
    /// [`EngineEvent::ConfigRejected`] and leave the previous value in place.
    pub fn set_config(&mut self, partial: EngineConfig) {
        let mut next = self.config;
        let rejections = next.set(partial);
        for rejection in &rejections {
            self.sink.emit(EngineEvent::ConfigRejected {
                field: field_name(rejection),
                details: rejection.to_string(),
            });
        }
        self.config = next;
        self.derived = self.config.derive();
        self.predictor.set_config(self.config.predictor);
        self.locator.set_cell_size_px(self.config.locator.cell_size_px);
        self.lock.set_config(self.config.lock);
        self.ledger.set_config(self.config.ledger);
        self.pressure.set_config(self.config.pressure);
        self.scheduler.set_config(self.config.scheduler);
    }

    pub fn reset_cursor(&mut self, x: f64, y: f64) {
        self.predictor.reset(x, y);
    }

    /// Run one frame: smooth the pointer sample, rebuild the spatial index,
    /// select a winner, read pressure, gate a decision, and drive the
    /// scheduler with it.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        now_ms: f64,
        dt_ms: f64,
        pointer: (f64, f64),
        islands: impl IntoIterator<Item = Candidate>,
        connection: &ConnectionSnapshot,
        last_engine_ms: f64,
        route_id: &str,
        actuator: &mut dyn Actuator,
    ) -> Decision {
        // `now` must be monotonically non-decreasing (spec §5); clamp a
        // regression to the last observed value rather than propagate it.
        let now_ms = now_ms.max(self.last_now_ms);
        self.last_now_ms = now_ms;

        self.predictor.update(pointer.0, pointer.1, dt_ms);
        self.locator.rebuild(islands);
        self.locator.query_nearby(pointer.0, pointer.1, None, &mut self.candidate_scratch);

        let previous_winner = self.lock.winner();
        let selection =
            self.lock.update(&self.candidate_scratch, pointer, &self.predictor, dt_ms);
        if selection.winner != previous_winner {
            match selection.winner {
                Some(winner) => {
                    self.sink.emit(EngineEvent::LockSwitch { from: previous_winner, to: winner });
                }
                None => self.sink.emit(EngineEvent::LockCleared),
            }
        }

        if !(0.0..=1000.0).contains(&dt_ms) {
            self.sink.emit(EngineEvent::DebugWarning {
                message: format!("extreme dt_ms sample: {dt_ms}"),
            });
        }

        let pressure_signals = self.pressure.read(now_ms, last_engine_ms, connection, &self.sink);

        let decision = gate::decide(
            &selection,
            &self.registry,
            &pressure_signals,
            &self.ledger,
            route_id,
            &self.config.gate,
        );
        self.emit_decision_event(&decision);

        self.scheduler.enqueue(&decision, &self.registry, now_ms);
        self.scheduler.tick(now_ms, &self.registry, actuator, connection.downlink_mbps, &self.sink);

        decision
    }

    fn emit_decision_event(&self, decision: &Decision) {
        match decision {
            Decision::Skip { reason } => self.sink.emit(EngineEvent::GateSkip { reason }),
            Decision::Prefetch { targets, tier } => {
                self.sink.emit(EngineEvent::GateDecision { tier: *tier, target_count: targets.len() });
            }
            Decision::Hydrate { tier, .. } => {
                self.sink.emit(EngineEvent::GateDecision { tier: *tier, target_count: 1 });
            }
        }
    }

    /// Request hydration of `key`, racing any in-flight prefetch.
    pub fn request_hydrate(
        &mut self,
        key: crate::key::IslandKey,
        now_ms: f64,
        route_id: &str,
        actuator: &mut dyn Actuator,
    ) -> Result<(), EngineError> {
        self.scheduler.request_hydrate(key, now_ms, actuator, &mut self.ledger, route_id)
    }

    /// Report that a prefetched/hydrated target turned out not to be used.
    pub fn feedback_miss(&mut self, key: crate::key::IslandKey, now_ms: f64, route_id: &str) {
        self.scheduler.feedback_miss(key, now_ms, &mut self.ledger, route_id);
    }

    pub fn record_long_task(&mut self, start_ms: f64, duration_ms: f64) {
        self.pressure.record_long_task(start_ms, duration_ms);
    }
}

fn field_name(error: &EngineError) -> &'static str {
    match error {
        EngineError::InvalidConfigField { field, .. } => field,
        _ => "unknown",
    }
}
