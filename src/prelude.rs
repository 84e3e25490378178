//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use actuation_engine::prelude::*;
//! ```

// Core
pub use crate::core::config::{
    EngineConfig, GateConfig, LedgerConfig, LocatorConfig, LockConfig, PredictorConfig,
    PressureConfig, SchedulerConfig,
};
pub use crate::core::errors::{EngineError, Result};

// Key codec
pub use crate::key::{Flag, IslandKey};

// Spatial locator
pub use crate::locator::{Candidate, Rect, SpatialLocator};

// Kinetic predictor
pub use crate::predictor::{KineticPredictor, Kinematics};

// Target lock
pub use crate::lock::{ScoredCandidate, Selection, TargetLock};

// Reputation ledger
pub use crate::ledger::{ReputationEntry, ReputationLedger};

// Pressure monitor
pub use crate::pressure::{ConnectionSnapshot, EffectiveType, PressureMonitor, PressureSignals};

// Utility gate
pub use crate::gate::{Decision, IslandKind, IslandTypeDef, PrefetchTarget, Registry, decide};

// Flight scheduler
pub use crate::scheduler::{Actuator, FlightScheduler, HandleKind, PrefetchHandle, Priority};

// Telemetry
pub use crate::telemetry::{ChannelSink, EngineEvent, EventSink, NullSink};

// Frame loop
pub use crate::engine::Engine;
