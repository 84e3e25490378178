//! Engine configuration: per-component config records, atomic replacement via
//! [`EngineConfig::set`], and a derived-config cache of precomputed
//! reciprocals/squared thresholds consulted in the hot path.
//!
//! Unlike a daemon config, `EngineConfig` is never loaded from a file or an
//! environment variable — construction is always [`EngineConfig::default`]
//! followed by zero or more [`EngineConfig::set`] calls from the embedding
//! host (spec §6: "No persisted state, no CLI, no environment variables
//! belong to the core").

use serde::{Deserialize, Serialize};

use crate::core::errors::EngineError;

/// Brown-Holt smoothing and intent-scoring parameters (spec §4.1, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub alpha_ref: f64,
    pub dt_ref_ms: f64,
    pub eps: f64,
    pub v_min: f64,
    pub v_max: f64,
    pub v_theta: f64,
    pub cos_theta_sq_slow: f64,
    pub cos_theta_sq_fast: f64,
    pub brake_floor: f64,
    pub brake_max: f64,
    pub v_brake_min: f64,
    pub brake_tau_ms: f64,
    pub horizon_base_px: f64,
    pub horizon_ms: f64,
    pub low_speed_near_mul: f64,
    pub low_speed_prox_scale: f64,
    pub proximity_bias: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            alpha_ref: 0.3,
            dt_ref_ms: 16.67,
            eps: 1e-6,
            v_min: 0.02,
            v_max: 5.0,
            v_theta: 1.0,
            cos_theta_sq_slow: 0.5,
            cos_theta_sq_fast: 0.92,
            brake_floor: 1.0,
            brake_max: 1.8,
            v_brake_min: 0.05,
            brake_tau_ms: 120.0,
            horizon_base_px: 80.0,
            horizon_ms: 250.0,
            low_speed_near_mul: 1.5,
            low_speed_prox_scale: 0.8,
            proximity_bias: 0.25,
        }
    }
}

/// Target lock hysteresis parameters (spec §4.2, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub top_k: usize,
    pub score_floor: f64,
    pub min_margin_2nd: f64,
    pub switch_margin: f64,
    pub hold_frames: u32,
    pub decay: f64,
    pub no_evidence_hold_ms: f64,
    pub clear_after_ms: f64,
    pub stick_dist_px: f64,
    pub radius_mul: f64,
    pub report_top_n: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            score_floor: 0.35,
            min_margin_2nd: 0.08,
            switch_margin: 0.12,
            hold_frames: 3,
            decay: 0.9,
            no_evidence_hold_ms: 250.0,
            clear_after_ms: 600.0,
            stick_dist_px: 120.0,
            radius_mul: 0.5,
            report_top_n: 5,
        }
    }
}

/// Reputation ledger parameters (spec §4.3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub ema_alpha: f64,
    pub min_prior: f64,
    pub max_prior: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.2,
            min_prior: 0.25,
            max_prior: 4.0,
        }
    }
}

/// Pressure monitor parameters (spec §4.4, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    pub long_task_window_ms: f64,
    pub long_task_budget_ms: f64,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            long_task_window_ms: 2000.0,
            long_task_budget_ms: 200.0,
        }
    }
}

/// Utility gate parameters (spec §4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub sigma_skip: f64,
    pub min_margin: f64,
    pub max_targets: usize,
    pub cpu_sigma_gain: f64,
    pub net_sigma_gain: f64,
    pub cpu_npf_drop: f64,
    pub net_npf_drop: f64,
    pub w_net: f64,
    pub w_cpu: f64,
    pub eta_moderate_ms: f64,
    pub eta_immediate_ms: f64,
    pub ultra_score: f64,
    pub ultra_margin: f64,
    pub ambiguity_margin: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            sigma_skip: 0.4,
            min_margin: 0.08,
            max_targets: 3,
            cpu_sigma_gain: 0.3,
            net_sigma_gain: 0.2,
            cpu_npf_drop: 2.0,
            net_npf_drop: 1.5,
            w_net: 0.000_02,
            w_cpu: 0.05,
            eta_moderate_ms: 800.0,
            eta_immediate_ms: 250.0,
            ultra_score: 0.8,
            ultra_margin: 0.2,
            ambiguity_margin: 0.1,
        }
    }
}

/// Flight scheduler parameters (spec §4.6, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_inflight_fetch: u32,
    pub max_bytes_in_flight: u64,
    pub prefetch_ttl_ms: f64,
    pub false_positive_cooldown_ms: f64,
    pub assume_ready_delay_ms: f64,
    pub max_assume_ready_delay_ms: f64,
    pub allow_early_hydrate: bool,
    pub dispatch_scan_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_inflight_fetch: 4,
            max_bytes_in_flight: 2_000_000,
            prefetch_ttl_ms: 30_000.0,
            false_positive_cooldown_ms: 5_000.0,
            assume_ready_delay_ms: 150.0,
            max_assume_ready_delay_ms: 2_000.0,
            allow_early_hydrate: false,
            // Resolved open question: windowed scan, default 8 (see SPEC_FULL.md §9).
            dispatch_scan_limit: 8,
        }
    }
}

/// Spatial locator parameters (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub cell_size_px: f64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            cell_size_px: 400.0,
        }
    }
}

/// Aggregate, immutable configuration for every component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub predictor: PredictorConfig,
    pub lock: LockConfig,
    pub ledger: LedgerConfig,
    pub pressure: PressureConfig,
    pub gate: GateConfig,
    pub scheduler: SchedulerConfig,
    pub locator: LocatorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            predictor: PredictorConfig::default(),
            lock: LockConfig::default(),
            ledger: LedgerConfig::default(),
            pressure: PressureConfig::default(),
            gate: GateConfig::default(),
            scheduler: SchedulerConfig::default(),
            locator: LocatorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Replace this config with `partial`, rejecting non-finite or
    /// out-of-range fields (the previous value is kept for each rejected
    /// field) and returning the list of rejections so the caller can log
    /// them. Construction itself never fails.
    pub fn set(&mut self, partial: Self) -> Vec<EngineError> {
        let mut rejections = Vec::new();
        self.predictor = validate_predictor(partial.predictor, self.predictor, &mut rejections);
        self.lock = validate_lock(partial.lock, self.lock, &mut rejections);
        self.ledger = validate_ledger(partial.ledger, self.ledger, &mut rejections);
        self.pressure = validate_pressure(partial.pressure, self.pressure, &mut rejections);
        self.gate = validate_gate(partial.gate, self.gate, &mut rejections);
        self.scheduler = validate_scheduler(partial.scheduler, self.scheduler, &mut rejections);
        self.locator = validate_locator(partial.locator, self.locator, &mut rejections);
        rejections
    }

    /// FNV-1a digest over a canonical JSON rendering, for embedders that want
    /// a cheap equality/version check without deriving `PartialEq` on floats.
    #[must_use]
    pub fn digest(&self) -> u64 {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        fnv1a(canonical.as_bytes())
    }

    /// Compute the derived, precomputed form consulted by the hot path.
    #[must_use]
    pub fn derive(&self) -> DerivedConfig {
        DerivedConfig::from_config(self)
    }
}

fn validate_predictor(
    candidate: PredictorConfig,
    previous: PredictorConfig,
    rejections: &mut Vec<EngineError>,
) -> PredictorConfig {
    let mut out = candidate;
    if !(candidate.v_min.is_finite() && candidate.v_min >= 0.0) {
        rejections.push(EngineError::invalid_config_field(
            "predictor.v_min",
            "must be finite and non-negative",
        ));
        out.v_min = previous.v_min;
    }
    if !(candidate.v_max.is_finite() && candidate.v_max > out.v_min) {
        rejections.push(EngineError::invalid_config_field(
            "predictor.v_max",
            "must be finite and greater than v_min",
        ));
        out.v_max = previous.v_max;
    }
    if !(candidate.eps.is_finite() && candidate.eps > 0.0) {
        rejections.push(EngineError::invalid_config_field(
            "predictor.eps",
            "must be finite and positive",
        ));
        out.eps = previous.eps;
    }
    out
}

fn validate_lock(
    candidate: LockConfig,
    previous: LockConfig,
    rejections: &mut Vec<EngineError>,
) -> LockConfig {
    let mut out = candidate;
    if candidate.top_k == 0 {
        rejections.push(EngineError::invalid_config_field(
            "lock.top_k",
            "must be non-zero",
        ));
        out.top_k = previous.top_k;
    }
    if !(0.0..=1.0).contains(&candidate.score_floor) {
        rejections.push(EngineError::invalid_config_field(
            "lock.score_floor",
            "must be in [0,1]",
        ));
        out.score_floor = previous.score_floor;
    }
    out
}

fn validate_ledger(
    candidate: LedgerConfig,
    previous: LedgerConfig,
    rejections: &mut Vec<EngineError>,
) -> LedgerConfig {
    let mut out = candidate;
    if !(candidate.min_prior.is_finite() && candidate.max_prior.is_finite())
        || candidate.min_prior > candidate.max_prior
    {
        rejections.push(EngineError::invalid_config_field(
            "ledger.min_prior/max_prior",
            "min_prior must be finite, <= max_prior",
        ));
        out.min_prior = previous.min_prior;
        out.max_prior = previous.max_prior;
    }
    if !(0.0..=1.0).contains(&candidate.ema_alpha) {
        rejections.push(EngineError::invalid_config_field(
            "ledger.ema_alpha",
            "must be in [0,1]",
        ));
        out.ema_alpha = previous.ema_alpha;
    }
    out
}

fn validate_pressure(
    candidate: PressureConfig,
    previous: PressureConfig,
    rejections: &mut Vec<EngineError>,
) -> PressureConfig {
    let mut out = candidate;
    if !(candidate.long_task_window_ms.is_finite() && candidate.long_task_window_ms > 0.0) {
        rejections.push(EngineError::invalid_config_field(
            "pressure.long_task_window_ms",
            "must be finite and positive",
        ));
        out.long_task_window_ms = previous.long_task_window_ms;
    }
    out
}

fn validate_gate(
    candidate: GateConfig,
    previous: GateConfig,
    rejections: &mut Vec<EngineError>,
) -> GateConfig {
    let mut out = candidate;
    if !(0.0..=1.0).contains(&candidate.sigma_skip) {
        rejections.push(EngineError::invalid_config_field(
            "gate.sigma_skip",
            "must be in [0,1]",
        ));
        out.sigma_skip = previous.sigma_skip;
    }
    if !(0.0..=1.0).contains(&candidate.min_margin) {
        rejections.push(EngineError::invalid_config_field(
            "gate.min_margin",
            "must be in [0,1]",
        ));
        out.min_margin = previous.min_margin;
    }
    if !(candidate.w_net.is_finite() && candidate.w_net >= 0.0)
        || !(candidate.w_cpu.is_finite() && candidate.w_cpu >= 0.0)
    {
        rejections.push(EngineError::invalid_config_field(
            "gate.w_net/w_cpu",
            "must be finite and non-negative",
        ));
        out.w_net = previous.w_net;
        out.w_cpu = previous.w_cpu;
    }
    if !(candidate.eta_immediate_ms.is_finite() && candidate.eta_immediate_ms >= 0.0)
        || !(candidate.eta_moderate_ms.is_finite())
        || candidate.eta_moderate_ms < candidate.eta_immediate_ms
    {
        rejections.push(EngineError::invalid_config_field(
            "gate.eta_immediate_ms/eta_moderate_ms",
            "must be finite, non-negative, and eta_moderate_ms >= eta_immediate_ms",
        ));
        out.eta_immediate_ms = previous.eta_immediate_ms;
        out.eta_moderate_ms = previous.eta_moderate_ms;
    }
    out
}

fn validate_scheduler(
    candidate: SchedulerConfig,
    previous: SchedulerConfig,
    rejections: &mut Vec<EngineError>,
) -> SchedulerConfig {
    let mut out = candidate;
    if candidate.max_inflight_fetch == 0 {
        rejections.push(EngineError::invalid_config_field(
            "scheduler.max_inflight_fetch",
            "must be non-zero",
        ));
        out.max_inflight_fetch = previous.max_inflight_fetch;
    }
    if candidate.max_bytes_in_flight == 0 {
        rejections.push(EngineError::invalid_config_field(
            "scheduler.max_bytes_in_flight",
            "must be non-zero",
        ));
        out.max_bytes_in_flight = previous.max_bytes_in_flight;
    }
    if !(candidate.prefetch_ttl_ms.is_finite() && candidate.prefetch_ttl_ms > 0.0) {
        rejections.push(EngineError::invalid_config_field(
            "scheduler.prefetch_ttl_ms",
            "must be finite and positive",
        ));
        out.prefetch_ttl_ms = previous.prefetch_ttl_ms;
    }
    if !(candidate.assume_ready_delay_ms.is_finite() && candidate.assume_ready_delay_ms >= 0.0)
        || !(candidate.max_assume_ready_delay_ms.is_finite())
        || candidate.max_assume_ready_delay_ms < candidate.assume_ready_delay_ms
    {
        rejections.push(EngineError::invalid_config_field(
            "scheduler.assume_ready_delay_ms/max_assume_ready_delay_ms",
            "must be finite, non-negative, and max_assume_ready_delay_ms >= assume_ready_delay_ms",
        ));
        out.assume_ready_delay_ms = previous.assume_ready_delay_ms;
        out.max_assume_ready_delay_ms = previous.max_assume_ready_delay_ms;
    }
    if candidate.dispatch_scan_limit == 0 {
        rejections.push(EngineError::invalid_config_field(
            "scheduler.dispatch_scan_limit",
            "must be non-zero",
        ));
        out.dispatch_scan_limit = previous.dispatch_scan_limit;
    }
    out
}

fn validate_locator(
    candidate: LocatorConfig,
    previous: LocatorConfig,
    rejections: &mut Vec<EngineError>,
) -> LocatorConfig {
    let mut out = candidate;
    if !(candidate.cell_size_px.is_finite() && candidate.cell_size_px > 0.0) {
        rejections.push(EngineError::invalid_config_field(
            "locator.cell_size_px",
            "must be finite and positive",
        ));
        out.cell_size_px = previous.cell_size_px;
    }
    out
}

/// Precomputed reciprocals and squared thresholds, recomputed once per
/// `EngineConfig::set` call and consulted in the hot path in place of the raw
/// config (spec §9: numerical robustness).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedConfig {
    pub v_min_sq: f64,
    pub v_max_sq: f64,
    pub v_theta_sq: f64,
    pub v_brake_min_sq: f64,
    pub stick_dist_px_sq: f64,
    pub low_speed_near_mul_sq: f64,
}

impl DerivedConfig {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        let p = &config.predictor;
        Self {
            v_min_sq: p.v_min * p.v_min,
            v_max_sq: p.v_max * p.v_max,
            v_theta_sq: p.v_theta * p.v_theta,
            v_brake_min_sq: p.v_brake_min * p.v_brake_min,
            stick_dist_px_sq: config.lock.stick_dist_px * config.lock.stick_dist_px,
            low_speed_near_mul_sq: p.low_speed_near_mul * p.low_speed_near_mul,
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
