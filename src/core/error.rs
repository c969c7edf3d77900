//! Core capability errors (parsing, validation, domain invariants).
//!
//! These are bounded and stable: core errors represent domain/refusal states,
//! not library implementation details.

use thiserror::Error;

use crate::error::{Effect, Transience};

/// Invalid ID or content identifier.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("agent id `{raw}` is invalid: {reason}")]
    Agent { raw: String, reason: String },
    #[error("device id `{raw}` is invalid: {reason}")]
    Device { raw: String, reason: String },
    #[error("record id `{raw}` is invalid: {reason}")]
    Record { raw: String, reason: String },
    #[error("task id `{raw}` is invalid: {reason}")]
    Task { raw: String, reason: String },
    #[error("blob ref `{raw}` is invalid: {reason}")]
    Blob { raw: String, reason: String },
    #[error("document kind `{raw}` is invalid: {reason}")]
    DocumentKind { raw: String, reason: String },
}

/// A required field was absent from a draft or mutation.
#[derive(Debug, Error, Clone)]
#[error("required field `{field}` is missing")]
pub struct MissingField {
    pub field: &'static str,
}

/// Coordinate outside the valid range.
#[derive(Debug, Error, Clone)]
#[error("{field} value {value} out of range {min}..={max}")]
pub struct InvalidCoordinate {
    pub field: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Canonical error enum for core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    MissingField(#[from] MissingField),
    #[error(transparent)]
    InvalidCoordinate(#[from] InvalidCoordinate),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure domain/input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
