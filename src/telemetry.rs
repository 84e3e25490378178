//! Structured, non-blocking engine events.
//!
//! The core has no file or network I/O of its own — persistence is an
//! explicit non-goal — but it still emits structured events the way this
//! codebase's daemon emits events to its logger: events are pushed onto a
//! bounded channel the embedding host drains at its leisure. Nothing in the
//! hot path ever blocks on a full channel; a full channel just drops the
//! event (see [`EventSink::emit`] on [`ChannelSink`]).

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::key::IslandKey;

/// Default channel capacity, sized the way this codebase sizes its
/// worker-report channels: enough to absorb a burst without ever blocking.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A structured engine event, emitted for observability only — nothing in
/// the engine ever branches on whether an event was successfully recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// One or more config fields in a `set_config` call were rejected.
    ConfigRejected { field: &'static str, details: String },
    /// The target lock committed a winner switch.
    LockSwitch { from: Option<IslandKey>, to: IslandKey },
    /// The target lock cleared its winner after the no-evidence grace period.
    LockCleared,
    /// The utility gate returned `Skip`.
    GateSkip { reason: &'static str },
    /// The utility gate returned `Prefetch` or `Hydrate`.
    GateDecision { tier: u8, target_count: usize },
    /// The scheduler dispatched a prefetch for `key`.
    SchedulerDispatch { key: IslandKey, bytes: u64 },
    /// The scheduler dropped a structurally invalid queue entry.
    SchedulerDrop { key: IslandKey, reason: &'static str },
    /// The pressure monitor's coarse level changed.
    PressureLevelChanged { cpu: f64, net: f64 },
    /// A debug-only warning (e.g. an extreme `dt` sample).
    DebugWarning { message: String },
}

/// Sink for engine events. Implementations must never block.
pub trait EventSink {
    /// Record an event. May silently drop it (e.g. `NullSink`, or a full
    /// bounded channel) — the engine never depends on delivery.
    fn emit(&self, event: EngineEvent);
}

/// Drops every event with zero allocation. Default for production embeds
/// that have not wired up telemetry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// Channel-backed sink: events are pushed onto a bounded `crossbeam_channel`
/// that the host drains on its own schedule. A full channel drops the event
/// rather than blocking the engine thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<EngineEvent>,
}

impl ChannelSink {
    /// Build a sink/receiver pair with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) | Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {}
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::VecSink;
    use super::*;

    #[test]
    fn null_sink_drops_everything() {
        let sink = NullSink;
        sink.emit(EngineEvent::LockCleared);
    }

    #[test]
    fn vec_sink_captures_events() {
        let sink = VecSink::default();
        sink.emit(EngineEvent::LockCleared);
        sink.emit(EngineEvent::GateSkip { reason: "no_best_key" });
        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn channel_sink_does_not_block_when_full() {
        let (sink, rx) = ChannelSink::new(1);
        sink.emit(EngineEvent::LockCleared);
        sink.emit(EngineEvent::LockCleared); // dropped, channel full
        assert_eq!(rx.try_iter().count(), 1);
    }
}
