//! Utility gate: turns a [`Selection`] into a prefetch/hydrate/skip
//! [`Decision`] (spec §4.5). Grounded on `monitor::predictive::PredictiveActionPolicy`'s
//! tiered `lerp`-based classification for the dynamic-threshold and
//! tier/ETA logic, and `monitor::voi_scheduler::compute_utility` for the
//! benefit-minus-cost ranking formula.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::core::config::GateConfig;
use crate::key::{Flag, IslandKey};
use crate::ledger::ReputationLedger;
use crate::lock::Selection;
use crate::pressure::PressureSignals;

/// Static per-type metadata (spec §3 `IslandTypeDef`).
#[derive(Debug, Clone, PartialEq)]
pub struct IslandTypeDef {
    pub type_id: u16,
    pub name: String,
    pub entry: String,
    pub export_name: Option<String>,
    pub kind: IslandKind,
    pub default_flags: u8,
    pub est_bytes: u64,
    pub est_cpu_ms: f64,
    pub est_benefit_ms: f64,
    pub nav_prop: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IslandKind {
    Component,
    NavLink,
    Form,
    Critical,
}

/// Static registry of island type definitions, keyed by the 12-bit `typeId`
/// packed into every [`IslandKey`].
#[derive(Debug, Clone, Default)]
pub struct Registry(HashMap<u16, IslandTypeDef>);

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn register(&mut self, def: IslandTypeDef) {
        self.0.insert(def.type_id, def);
    }

    #[must_use]
    pub fn lookup(&self, key: IslandKey) -> Option<&IslandTypeDef> {
        let (type_id, _, _) = key.unpack();
        self.0.get(&type_id)
    }
}

/// A single candidate the gate has decided is worth prefetching.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchTarget {
    pub key: IslandKey,
    pub est_bytes: u64,
    pub est_cpu_ms: f64,
    pub utility: f64,
}

/// Gate output.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Skip { reason: &'static str },
    Prefetch { targets: Vec<PrefetchTarget>, tier: u8 },
    Hydrate { target: PrefetchTarget, tier: u8 },
}

/// Evaluate one tick's [`Selection`] into a [`Decision`].
#[must_use]
pub fn decide(
    selection: &Selection,
    registry: &Registry,
    pressure: &PressureSignals,
    ledger: &ReputationLedger,
    route_id: &str,
    config: &GateConfig,
) -> Decision {
    let Some(best_key) = selection.best_key else {
        return Decision::Skip { reason: "no_best_key" };
    };
    if registry.lookup(best_key).is_none() {
        return Decision::Skip { reason: "type_missing" };
    }
    let Some(winner) = selection.winner else {
        return Decision::Skip { reason: "no_best_key" };
    };
    if !winner.has_flag(Flag::PrefetchSafe) {
        return Decision::Skip { reason: "winner_not_prefetch_safe" };
    }

    let cpu = pressure.cpu_pressure;
    let net = pressure.net_pressure;
    let sigma = (config.sigma_skip + config.cpu_sigma_gain * cpu + config.net_sigma_gain * net)
        .clamp(0.0, 1.0);
    #[allow(clippy::cast_precision_loss)]
    let max_targets_cap = config.max_targets as f64;
    let max_targets_f = (max_targets_cap - config.cpu_npf_drop * cpu - config.net_npf_drop * net).round();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let max_targets = max_targets_f.clamp(0.0, max_targets_cap) as usize;
    let min_margin =
        (config.min_margin + 0.06 * cpu + 0.04 * net).clamp(0.0, 1.0);

    if max_targets == 0 {
        return Decision::Skip { reason: "pressure_zeroed_targets" };
    }
    if !selection.actuate {
        return Decision::Skip { reason: "not_actuating" };
    }
    if selection.best_score < sigma {
        return Decision::Skip { reason: "below_sigma" };
    }
    if selection.margin2nd < min_margin {
        return Decision::Skip { reason: "ambiguous_margin" };
    }

    let reputation_weighted = selection.margin2nd <= config.ambiguity_margin;
    let weighted: Vec<(IslandKey, f64)> = selection
        .top
        .iter()
        .map(|candidate| {
            let weight = if reputation_weighted {
                let island_id = candidate.key.to_wire();
                candidate.score * ledger.prior(route_id, &island_id).clamp(0.25, 4.0)
            } else {
                candidate.score
            };
            (candidate.key, weight)
        })
        .collect();

    let sum: f64 = weighted.iter().map(|(_, w)| w).sum();
    if sum <= 1e-12 {
        return Decision::Skip { reason: "zero_weighted_sum" };
    }

    let mut ranked: Vec<PrefetchTarget> = weighted
        .into_iter()
        .filter(|(key, _)| key.has_flag(Flag::PrefetchSafe))
        .filter_map(|(key, weight)| {
            let type_def = registry.lookup(key)?;
            let p = weight / sum;
            #[allow(clippy::cast_precision_loss)]
            let est_bytes_f64 = type_def.est_bytes as f64;
            let utility =
                p * type_def.est_benefit_ms - (config.w_net * est_bytes_f64 + config.w_cpu * type_def.est_cpu_ms);
            (utility > 0.0)
                .then_some(PrefetchTarget { key, est_bytes: type_def.est_bytes, est_cpu_ms: type_def.est_cpu_ms, utility })
        })
        .collect();
    ranked.sort_by(|a, b| b.utility.partial_cmp(&a.utility).unwrap_or(Ordering::Equal));

    if ranked.is_empty() {
        return Decision::Skip { reason: "no_positive_utility" };
    }

    let eta = selection.nearest_d_sq.sqrt() / selection.speed.max(1e-6);
    let tier = u8::from(!pressure.save_data && eta <= config.eta_moderate_ms);

    if tier == 1 {
        let top = &ranked[0];
        if top.key == winner
            && !winner.has_flag(Flag::HydrateOnEventOnly)
            && selection.best_score >= config.ultra_score
            && selection.margin2nd >= config.ultra_margin
            && eta <= config.eta_immediate_ms
            && cpu < 0.4
            && net < 0.6
        {
            return Decision::Hydrate { target: ranked.into_iter().next().expect("non-empty"), tier };
        }
    }

    ranked.truncate(max_targets);
    Decision::Prefetch { targets: ranked, tier }
}
