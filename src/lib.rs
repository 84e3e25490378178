#![forbid(unsafe_code)]

//! Predictive actuation engine: turns a stream of pointer samples and a set of
//! interactive rectangular "islands" into bounded prefetch/hydrate decisions.
//!
//! Pipeline per tick, leaves first:
//! 1. [`key`] — packed island key codec (wire + debug text formats).
//! 2. [`locator`] — uniform-grid spatial index over island rects.
//! 3. [`predictor`] — Brown-Holt kinematic smoothing and intent scoring.
//! 4. [`lock`] — winner/pending hysteresis over scored candidates.
//! 5. [`ledger`] — per (route, island) reputation prior.
//! 6. [`pressure`] — cpu/net pressure from long tasks and engine cost.
//! 7. [`gate`] — evidence gating and utility ranking into a [`gate::Decision`].
//! 8. [`scheduler`] — per-island state machine, budgets, dispatch.
//! 9. [`engine`] — glues the above together once per frame.

pub mod core;
pub mod engine;
pub mod gate;
pub mod key;
pub mod ledger;
pub mod lock;
pub mod locator;
pub mod predictor;
pub mod pressure;
pub mod scheduler;
pub mod telemetry;

pub mod prelude;
