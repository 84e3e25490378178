//! ENG-prefixed error types with structured error codes.
//!
//! Per the error handling design, most failure modes in this engine are silent
//! coercions or clamps, never a `Result::Err`. `EngineError` only covers the
//! handful of cases that are allowed to cross the public boundary: a caller
//! explicitly opting into strict key decoding, a rethrown hydrate failure, and
//! non-fatal config-field rejection reports.

use std::fmt;

use thiserror::Error;

/// Shared `Result` alias for the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error type for the actuation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("[ENG-1001] invalid island key: {details}")]
    InvalidKey { details: String },

    #[error("[ENG-1002] invalid configuration field {field}: {details}")]
    InvalidConfigField { field: &'static str, details: String },

    #[error("[ENG-2001] hydrate failed for key {key}: {source}")]
    Hydrate {
        key: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("[ENG-3001] completion channel closed in component {component}")]
    ChannelClosed { component: &'static str },
}

impl EngineError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey { .. } => "ENG-1001",
            Self::InvalidConfigField { .. } => "ENG-1002",
            Self::Hydrate { .. } => "ENG-2001",
            Self::ChannelClosed { .. } => "ENG-3001",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Hydrate { .. } | Self::ChannelClosed { .. })
    }

    /// Convenience constructor for a rejected config field: the caller keeps
    /// the previous value and is handed back a description of why.
    #[must_use]
    pub fn invalid_config_field(field: &'static str, details: impl fmt::Display) -> Self {
        Self::InvalidConfigField {
            field,
            details: details.to_string(),
        }
    }
}
