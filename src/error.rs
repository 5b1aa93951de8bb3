//! Caller-facing error types.
//!
//! Infrastructure failures (SQLite, file IO) travel as `anyhow::Error`; the
//! enums here are the ones a caller is expected to match on.

use thiserror::Error;

/// Rejected image input. Raised before normalization, never coerced.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("{side} image is empty")]
    Empty { side: &'static str },

    #[error("{side} image could not be decoded: {reason}")]
    Undecodable { side: &'static str, reason: String },

    #[error("{side} image has zero dimension ({width}x{height})")]
    ZeroDimension {
        side: &'static str,
        width: u32,
        height: u32,
    },
}

/// Invalid signal handed to the decision engine. This is a bug upstream,
/// not an expected runtime condition.
#[derive(Debug, Error, PartialEq)]
pub enum EnsembleError {
    #[error("invalid {signal} value {value}: {reason}")]
    InvalidSignal {
        signal: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// Review and labeling failures. All are caller-correctable except `Storage`.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid label: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Top-level failure of a single detection run.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Ensemble(#[from] EnsembleError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
