//! Flight scheduler: a per-key prefetch/hydrate state machine plus a bounded
//! priority queue over dispatchable targets (spec §4.6). Grounded on
//! `monitor::voi_scheduler::VoiScheduler`'s budgeted-dispatch bookkeeping
//! (in-flight count/bytes debited at dispatch, credited on completion) and
//! generalized from a single scan budget to a full per-key lifecycle.

use std::collections::{HashMap, HashSet};

use crossbeam_channel::Receiver;

use crate::core::config::SchedulerConfig;
use crate::core::errors::EngineError;
use crate::gate::{Decision, IslandTypeDef, Registry};
use crate::key::{Flag, IslandKey};
use crate::ledger::ReputationLedger;
use crate::telemetry::{EngineEvent, EventSink};

/// Maximum number of queued-but-not-dispatched entries (spec §4.6).
pub const MAX_QUEUE_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Normal = 1,
    High = 2,
}

/// What kind of resource a [`PrefetchHandle`] represents (spec §6 Actuator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    ModulePreload,
    Fetch,
}

/// A handle returned by [`Actuator::prefetch`]. `done` signals completion by
/// receiving a value on the channel; the scheduler polls it once per tick
/// rather than blocking (spec §5: "no operation is permitted to block").
pub struct PrefetchHandle {
    pub kind: HandleKind,
    pub done: Option<Receiver<()>>,
}

impl PrefetchHandle {
    fn is_done(&self) -> bool {
        self.done.as_ref().is_some_and(|rx| rx.try_recv().is_ok())
    }

    fn has_done_channel(&self) -> bool {
        self.done.is_some()
    }
}

/// External capability the scheduler drives but never owns (spec §6).
pub trait Actuator {
    /// Request a prefetch. `None` means "no handle" (capacity deferral).
    fn prefetch(&mut self, type_def: &IslandTypeDef, flags: u8) -> Option<PrefetchHandle>;
    /// Hydrate a previously prefetched (or cold) island.
    fn hydrate(&mut self, handle: Option<PrefetchHandle>, key: IslandKey) -> Result<(), EngineError>;
}

enum IslandState {
    Idle { last_action_ts: f64, cooldown_until: f64 },
    Prefetching { started_ts: f64, bytes: u64, ready_delay_ms: f64, handle: Option<PrefetchHandle> },
    Prefetched { expires_ts: f64 },
    Hydrating { started_ts: f64 },
    Hydrated { ready_ts: f64 },
}

impl IslandState {
    fn idle_at(now: f64) -> Self {
        Self::Idle { last_action_ts: now, cooldown_until: now }
    }
}

struct QueueEntry {
    key: IslandKey,
    priority: Priority,
    est_bytes: u64,
}

/// Owns per-key lifecycle state, the prefetch queue, and in-flight budgets.
pub struct FlightScheduler {
    config: SchedulerConfig,
    states: HashMap<IslandKey, IslandState>,
    queue: Vec<QueueEntry>,
    queued_keys: HashSet<IslandKey>,
    inflight_count: u32,
    bytes_in_flight: u64,
}

impl FlightScheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            queue: Vec::new(),
            queued_keys: HashSet::new(),
            inflight_count: 0,
            bytes_in_flight: 0,
        }
    }

    pub fn set_config(&mut self, config: SchedulerConfig) {
        self.config = config;
    }

    #[must_use]
    pub fn inflight_count(&self) -> u32 {
        self.inflight_count
    }

    #[must_use]
    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_prefetching(&self, key: IslandKey) -> bool {
        matches!(self.states.get(&key), Some(IslandState::Prefetching { .. }))
    }

    #[must_use]
    pub fn is_prefetched(&self, key: IslandKey) -> bool {
        matches!(self.states.get(&key), Some(IslandState::Prefetched { .. }))
    }

    fn state_is_idle(&self, key: IslandKey, now: f64) -> bool {
        match self.states.get(&key) {
            None => true,
            Some(IslandState::Idle { cooldown_until, .. }) => now >= *cooldown_until,
            Some(_) => false,
        }
    }

    /// Enqueue a gate [`Decision`]. Rejects `Skip` outright, and rejects
    /// `Hydrate` unless `allowEarlyHydrate` is set.
    pub fn enqueue(&mut self, decision: &Decision, registry: &Registry, now: f64) {
        let (targets, priority): (Vec<&crate::gate::PrefetchTarget>, Priority) = match decision {
            Decision::Skip { .. } => return,
            Decision::Hydrate { target, tier } => {
                if !self.config.allow_early_hydrate {
                    return;
                }
                (vec![target], priority_for_tier(*tier))
            }
            Decision::Prefetch { targets, tier } => {
                (targets.iter().collect(), priority_for_tier(*tier))
            }
        };

        for target in targets {
            let key = target.key;
            if self.queued_keys.contains(&key) {
                continue;
            }
            if !key.has_flag(Flag::PrefetchSafe) || registry.lookup(key).is_none() {
                continue;
            }
            if !self.state_is_idle(key, now) {
                continue;
            }
            self.queue.push(QueueEntry { key, priority, est_bytes: target.est_bytes });
            self.queued_keys.insert(key);
        }

        self.queue.sort_by(|a, b| b.priority.cmp(&a.priority));
        if self.queue.len() > MAX_QUEUE_SIZE {
            for dropped in self.queue.split_off(MAX_QUEUE_SIZE) {
                self.queued_keys.remove(&dropped.key);
            }
        }
    }

    /// Advance per-key states, then dispatch as much of the queue as budget
    /// and `dispatchScanLimit` allow. `downlink_mbps` is the connection's
    /// current estimate, used to size each prefetch's assumed ready delay.
    pub fn tick(
        &mut self,
        now: f64,
        registry: &Registry,
        actuator: &mut dyn Actuator,
        downlink_mbps: Option<f64>,
        sink: &dyn EventSink,
    ) {
        self.advance_states(now);
        self.dispatch(now, registry, actuator, downlink_mbps, sink);
    }

    fn advance_states(&mut self, now: f64) {
        let mut freed_bytes = 0u64;
        let mut freed_count = 0u32;
        let mut to_idle = Vec::new();

        for (key, state) in &mut self.states {
            match state {
                IslandState::Prefetching { started_ts, bytes, ready_delay_ms, handle } => {
                    let elapsed = now - *started_ts;
                    let threshold = self.config.assume_ready_delay_ms.max(*ready_delay_ms * 2.0);
                    let signalled = handle.as_ref().is_some_and(PrefetchHandle::is_done);
                    if elapsed >= threshold || signalled {
                        freed_bytes += *bytes;
                        freed_count += 1;
                        *state = IslandState::Prefetched { expires_ts: now + self.config.prefetch_ttl_ms };
                    }
                }
                IslandState::Prefetched { expires_ts } => {
                    if now >= *expires_ts {
                        to_idle.push(*key);
                    }
                }
                IslandState::Idle { .. } | IslandState::Hydrating { .. } | IslandState::Hydrated { .. } => {}
            }
        }

        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(freed_bytes);
        self.inflight_count = self.inflight_count.saturating_sub(freed_count);

        for key in to_idle {
            self.states.insert(key, IslandState::idle_at(now));
        }
    }

    fn dispatch(
        &mut self,
        now: f64,
        registry: &Registry,
        actuator: &mut dyn Actuator,
        downlink_mbps: Option<f64>,
        sink: &dyn EventSink,
    ) {
        loop {
            if self.inflight_count >= self.config.max_inflight_fetch
                || self.bytes_in_flight >= self.config.max_bytes_in_flight
            {
                return;
            }
            let window = self.queue.len().min(self.config.dispatch_scan_limit.max(1));
            let Some(pick) = self.find_dispatchable(window, registry, now) else {
                return;
            };

            match pick {
                DispatchPick::Invalid(idx, reason) => {
                    let dropped = self.queue.remove(idx);
                    self.queued_keys.remove(&dropped.key);
                    sink.emit(EngineEvent::SchedulerDrop { key: dropped.key, reason });
                }
                DispatchPick::Ready(idx) => {
                    let entry = self.queue.remove(idx);
                    self.queued_keys.remove(&entry.key);
                    self.start_prefetch(entry, registry, actuator, now, downlink_mbps, sink);
                }
                DispatchPick::BlockedByBytes => return,
            }
        }
    }

    fn find_dispatchable(&self, window: usize, registry: &Registry, now: f64) -> Option<DispatchPick> {
        let mut blocked_by_bytes_only = false;
        for (idx, entry) in self.queue.iter().take(window).enumerate() {
            let structurally_valid =
                entry.key.has_flag(Flag::PrefetchSafe) && registry.lookup(entry.key).is_some();
            if !structurally_valid {
                return Some(DispatchPick::Invalid(idx, "not_prefetch_safe_or_unregistered"));
            }
            if !self.state_is_idle(entry.key, now) {
                return Some(DispatchPick::Invalid(idx, "not_idle"));
            }
            let fits = self.bytes_in_flight + entry.est_bytes <= self.config.max_bytes_in_flight;
            if fits {
                return Some(DispatchPick::Ready(idx));
            }
            blocked_by_bytes_only = true;
        }
        blocked_by_bytes_only.then_some(DispatchPick::BlockedByBytes)
    }

    fn start_prefetch(
        &mut self,
        entry: QueueEntry,
        registry: &Registry,
        actuator: &mut dyn Actuator,
        now: f64,
        downlink_mbps: Option<f64>,
        sink: &dyn EventSink,
    ) {
        let Some(type_def) = registry.lookup(entry.key) else { return };
        let (_, _, flags) = entry.key.unpack();
        let Some(handle) = actuator.prefetch(type_def, flags) else {
            // Capacity deferral: put the entry back at the front of the queue.
            let key = entry.key;
            self.queue.insert(0, entry);
            self.queued_keys.insert(key);
            return;
        };
        let ready_delay_ms = downlink_bytes_per_ms(downlink_mbps).map_or(
            self.config.assume_ready_delay_ms,
            |bytes_per_ms| {
                (entry.est_bytes as f64 / bytes_per_ms)
                    .clamp(self.config.assume_ready_delay_ms, self.config.max_assume_ready_delay_ms)
            },
        );
        self.inflight_count += 1;
        self.bytes_in_flight += entry.est_bytes;
        sink.emit(EngineEvent::SchedulerDispatch { key: entry.key, bytes: entry.est_bytes });
        self.states.insert(
            entry.key,
            IslandState::Prefetching { started_ts: now, bytes: entry.est_bytes, ready_delay_ms, handle: Some(handle) },
        );
    }

    /// Hydrate `key`, racing an in-flight prefetch if one exists.
    pub fn request_hydrate(
        &mut self,
        key: IslandKey,
        now: f64,
        actuator: &mut dyn Actuator,
        ledger: &mut ReputationLedger,
        route_id: &str,
    ) -> Result<(), EngineError> {
        if matches!(self.states.get(&key), Some(IslandState::Hydrated { .. } | IslandState::Hydrating { .. })) {
            return Ok(());
        }

        let handle = match self.states.remove(&key) {
            Some(IslandState::Prefetching { bytes, handle, .. }) => {
                // If the prefetch carries a completion channel, await it
                // instead of cancelling: the budget stays debited until
                // `advance_states` observes completion or TTL expiry.
                if handle.as_ref().is_some_and(PrefetchHandle::has_done_channel) {
                    handle
                } else {
                    self.bytes_in_flight = self.bytes_in_flight.saturating_sub(bytes);
                    self.inflight_count = self.inflight_count.saturating_sub(1);
                    handle
                }
            }
            _ => None,
        };

        self.states.insert(key, IslandState::Hydrating { started_ts: now });
        let island_id = key.to_wire();
        match actuator.hydrate(handle, key) {
            Ok(()) => {
                self.states.insert(key, IslandState::Hydrated { ready_ts: now });
                ledger.record_hit(route_id, &island_id, now);
                Ok(())
            }
            Err(error) => {
                self.states.insert(key, IslandState::idle_at(now));
                ledger.record_miss(route_id, &island_id, now);
                Err(error)
            }
        }
    }

    /// Cancel any in-flight prefetch for `key`, record a reputation miss, and
    /// put it under a false-positive cooldown.
    pub fn feedback_miss(&mut self, key: IslandKey, now: f64, ledger: &mut ReputationLedger, route_id: &str) {
        if let Some(IslandState::Prefetching { bytes, .. }) = self.states.get(&key) {
            self.bytes_in_flight = self.bytes_in_flight.saturating_sub(*bytes);
            self.inflight_count = self.inflight_count.saturating_sub(1);
        }
        self.states.insert(
            key,
            IslandState::Idle { last_action_ts: now, cooldown_until: now + self.config.false_positive_cooldown_ms },
        );
        ledger.record_miss(route_id, &key.to_wire(), now);
    }

    /// Drop `Idle` states that have outlived `prefetchTTLms` and are not in
    /// `active_keys`.
    pub fn prune_inactive(&mut self, active_keys: &HashSet<IslandKey>, now: f64) {
        self.states.retain(|key, state| {
            if active_keys.contains(key) {
                return true;
            }
            match state {
                IslandState::Idle { last_action_ts, .. } => now - *last_action_ts <= self.config.prefetch_ttl_ms,
                _ => true,
            }
        });
    }
}

enum DispatchPick {
    Ready(usize),
    Invalid(usize, &'static str),
    BlockedByBytes,
}

fn priority_for_tier(tier: u8) -> Priority {
    if tier == 1 { Priority::High } else { Priority::Normal }
}

/// Convert a downlink estimate (Mbps) to bytes/ms, or `None` if unknown or
/// non-positive. 1 Mbps = 125 bytes/ms.
fn downlink_bytes_per_ms(downlink_mbps: Option<f64>) -> Option<f64> {
    downlink_mbps.filter(|mbps| mbps.is_finite() && *mbps > 0.0).map(|mbps| mbps * 125.0)
}
