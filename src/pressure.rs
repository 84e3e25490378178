//! Pressure monitor: a sliding window of long-task samples folded into a
//! `[0,1]` CPU pressure, plus a network pressure derived from an externally
//! supplied connection snapshot (spec §4.4). Grounded on
//! `monitor::pid::PidPressureController`'s level-from-thresholds shape and
//! `monitor::voi_scheduler`'s `VecDeque`-backed windowing. The window here
//! uses a plain `VecDeque` rather than the spec's head-index/compaction
//! trick — that trick exists to dodge `Array.shift` costs in a JS host; a
//! `VecDeque` already pops from the front in O(1).

use std::collections::VecDeque;

use crate::core::config::PressureConfig;
use crate::telemetry::{EngineEvent, EventSink};

/// One externally reported long task.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LongTaskSample {
    start_ms: f64,
    duration_ms: f64,
}

/// Coarse network class (spec §3 connection snapshot `effectiveType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveType {
    Slow2g,
    TwoG,
    ThreeG,
    FourG,
    Unknown,
}

/// Externally supplied connection state for one `read` (spec §3: "Optional
/// connection snapshot: `{effectiveType?, downlink?, saveData?}`").
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConnectionSnapshot {
    pub effective_type: Option<EffectiveType>,
    pub downlink_mbps: Option<f64>,
    pub save_data: bool,
}

/// CPU/network pressure readout (spec §3 `PressureSignals`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSignals {
    pub cpu_pressure: f64,
    pub net_pressure: f64,
    pub save_data: bool,
}

/// Sliding-window CPU pressure plus connection-derived network pressure.
#[derive(Debug, Clone)]
pub struct PressureMonitor {
    config: PressureConfig,
    window: VecDeque<LongTaskSample>,
    long_task_sum: f64,
    last_tier: Option<(i32, i32)>,
}

impl PressureMonitor {
    #[must_use]
    pub fn new(config: PressureConfig) -> Self {
        Self { config, window: VecDeque::new(), long_task_sum: 0.0, last_tier: None }
    }

    pub fn set_config(&mut self, config: PressureConfig) {
        self.config = config;
    }

    /// Record a long task observed at `start_ms` lasting `duration_ms`.
    pub fn record_long_task(&mut self, start_ms: f64, duration_ms: f64) {
        self.long_task_sum += duration_ms;
        self.window.push_back(LongTaskSample { start_ms, duration_ms });
    }

    fn evict_older_than(&mut self, now_ms: f64) {
        let cutoff = now_ms - self.config.long_task_window_ms;
        while let Some(front) = self.window.front() {
            if front.start_ms < cutoff {
                let removed = self.window.pop_front().expect("front just matched");
                self.long_task_sum -= removed.duration_ms;
            } else {
                break;
            }
        }
        if self.long_task_sum < 0.0 {
            self.long_task_sum = 0.0;
        }
    }

    /// Evict stale long-task samples and compute the current pressure
    /// readout. `last_engine_ms` is this engine's own tick cost. Emits
    /// [`EngineEvent::PressureLevelChanged`] whenever the coarse pressure
    /// tier moves, so hosts can log without polling every tick.
    pub fn read(
        &mut self,
        now_ms: f64,
        last_engine_ms: f64,
        connection: &ConnectionSnapshot,
        sink: &dyn EventSink,
    ) -> PressureSignals {
        self.evict_older_than(now_ms);
        let cpu_long = (self.long_task_sum / self.config.long_task_budget_ms.max(1.0)).min(1.0);
        let cpu_eng = (last_engine_ms / 4.0).min(1.0);
        let cpu_pressure = (0.75 * cpu_long + 0.25 * cpu_eng).clamp(0.0, 1.0);
        let net_pressure = net_pressure(connection);

        let tier = (pressure_tier(cpu_pressure), pressure_tier(net_pressure));
        if self.last_tier.is_some_and(|previous| previous != tier) {
            sink.emit(EngineEvent::PressureLevelChanged { cpu: cpu_pressure, net: net_pressure });
        }
        self.last_tier = Some(tier);

        PressureSignals { cpu_pressure, net_pressure, save_data: connection.save_data }
    }
}

/// Bucket a `[0,1]` pressure value into one of five coarse tiers, so small
/// jitter around a threshold doesn't spam the event sink.
fn pressure_tier(value: f64) -> i32 {
    (value.clamp(0.0, 1.0) * 4.0).floor() as i32
}

fn net_pressure(connection: &ConnectionSnapshot) -> f64 {
    if connection.save_data {
        return 1.0;
    }
    let base: f64 = match connection.effective_type {
        Some(EffectiveType::Slow2g) => 1.0,
        Some(EffectiveType::TwoG) => 0.85,
        Some(EffectiveType::ThreeG) => 0.55,
        Some(EffectiveType::FourG) => 0.25,
        Some(EffectiveType::Unknown) | None => 0.0,
    };
    let refined = connection.downlink_mbps.map_or(0.0, downlink_pressure);
    base.max(refined)
}

/// Monotonically non-increasing in `mbps`, matching the spec's refinement
/// rule: a known downlink can only push pressure up, never below the
/// `effectiveType` table's base value.
fn downlink_pressure(mbps: f64) -> f64 {
    if mbps < 0.5 {
        1.0
    } else if mbps < 1.5 {
        0.85
    } else if mbps < 3.0 {
        0.55
    } else if mbps < 7.0 {
        0.25
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NullSink;

    #[test]
    fn empty_window_yields_zero_cpu_pressure() {
        let mut monitor = PressureMonitor::new(PressureConfig::default());
        let signals = monitor.read(1000.0, 0.0, &ConnectionSnapshot::default(), &NullSink);
        assert_eq!(signals.cpu_pressure, 0.0);
    }

    #[test]
    fn long_tasks_within_window_raise_cpu_pressure() {
        let mut monitor = PressureMonitor::new(PressureConfig::default());
        monitor.record_long_task(900.0, 150.0);
        let signals = monitor.read(1000.0, 0.0, &ConnectionSnapshot::default(), &NullSink);
        assert!(signals.cpu_pressure > 0.0);
    }

    #[test]
    fn stale_long_tasks_are_evicted_from_the_window() {
        let mut monitor = PressureMonitor::new(PressureConfig::default());
        monitor.record_long_task(0.0, 500.0);
        let signals = monitor.read(10_000.0, 0.0, &ConnectionSnapshot::default(), &NullSink);
        assert_eq!(signals.cpu_pressure, 0.0);
    }

    #[test]
    fn save_data_forces_maximum_net_pressure() {
        let mut monitor = PressureMonitor::new(PressureConfig::default());
        let connection = ConnectionSnapshot { save_data: true, ..ConnectionSnapshot::default() };
        let signals = monitor.read(0.0, 0.0, &connection, &NullSink);
        assert_eq!(signals.net_pressure, 1.0);
    }

    #[test]
    fn slow_effective_type_raises_net_pressure() {
        let mut monitor = PressureMonitor::new(PressureConfig::default());
        let connection =
            ConnectionSnapshot { effective_type: Some(EffectiveType::Slow2g), ..ConnectionSnapshot::default() };
        let signals = monitor.read(0.0, 0.0, &connection, &NullSink);
        assert_eq!(signals.net_pressure, 1.0);
    }

    #[test]
    fn low_downlink_refines_pressure_upward_over_the_table_value() {
        let mut monitor = PressureMonitor::new(PressureConfig::default());
        let connection = ConnectionSnapshot {
            effective_type: Some(EffectiveType::FourG),
            downlink_mbps: Some(0.2),
            save_data: false,
        };
        let signals = monitor.read(0.0, 0.0, &connection, &NullSink);
        assert_eq!(signals.net_pressure, 1.0);
    }

    #[test]
    fn high_downlink_never_lowers_below_the_table_value() {
        let mut monitor = PressureMonitor::new(PressureConfig::default());
        let connection = ConnectionSnapshot {
            effective_type: Some(EffectiveType::Slow2g),
            downlink_mbps: Some(50.0),
            save_data: false,
        };
        let signals = monitor.read(0.0, 0.0, &connection, &NullSink);
        assert_eq!(signals.net_pressure, 1.0);
    }

    #[test]
    fn engine_cost_contributes_a_quarter_weight_to_cpu_pressure() {
        let mut monitor = PressureMonitor::new(PressureConfig::default());
        let signals = monitor.read(0.0, 4.0, &ConnectionSnapshot::default(), &NullSink);
        assert!((signals.cpu_pressure - 0.25).abs() < 1e-9);
    }

    #[test]
    fn tier_change_emits_pressure_level_changed_after_the_first_read() {
        let mut monitor = PressureMonitor::new(PressureConfig::default());
        let sink = crate::telemetry::test_support::VecSink::default();

        // First read only establishes a baseline tier; nothing to compare yet.
        monitor.read(0.0, 0.0, &ConnectionSnapshot::default(), &sink);
        assert!(sink.drain().is_empty());

        // A long task pushes cpu pressure into a higher tier on the next read.
        monitor.record_long_task(0.0, 5_000.0);
        monitor.read(1.0, 0.0, &ConnectionSnapshot::default(), &sink);
        let events = sink.drain();
        assert!(events.iter().any(|event| matches!(event, EngineEvent::PressureLevelChanged { .. })));
    }

    #[test]
    fn steady_pressure_does_not_repeat_the_event() {
        let mut monitor = PressureMonitor::new(PressureConfig::default());
        let sink = crate::telemetry::test_support::VecSink::default();
        monitor.read(0.0, 0.0, &ConnectionSnapshot::default(), &sink);
        sink.drain();
        monitor.read(1.0, 0.0, &ConnectionSnapshot::default(), &sink);
        assert!(sink.drain().is_empty());
    }
}
