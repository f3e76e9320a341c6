//! Typed error hierarchy for pitchboard.
//!
//! Two top-level enums:
//! - `WorkflowError`: every failure a pitch workflow operation can report
//! - `ConfigError`: configuration loading and validation failures

use serde::Serialize;
use thiserror::Error;

use crate::pitches::models::{PitchId, PitchStatus};

/// Coarse classification of a [`WorkflowError`], used by callers that map
/// failures onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidState,
    DuplicateClaim,
    Duplicate,
    CapacityExhausted,
    SlotOccupied,
    ConcurrencyConflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::DuplicateClaim => "duplicate_claim",
            Self::Duplicate => "duplicate",
            Self::CapacityExhausted => "capacity_exhausted",
            Self::SlotOccupied => "slot_occupied",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::Internal => "internal",
        }
    }
}

/// Errors from the pitch workflow engine and its store.
///
/// Any operation returning one of these left the pitch exactly as it was.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Pitch {id} not found")]
    PitchNotFound { id: PitchId },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot {operation} pitch {id} while it is {status}")]
    InvalidState {
        id: PitchId,
        status: PitchStatus,
        operation: &'static str,
    },

    #[error("Contributor {contributor_id} already has a pending claim or holds a requested team")]
    DuplicateClaim { contributor_id: String },

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("No open seat left on team {team_id}")]
    CapacityExhausted { team_id: String },

    #[error("The {slot} slot is already occupied")]
    SlotOccupied { slot: &'static str },

    #[error("Pitch {id} changed concurrently (expected revision {expected}, found {actual})")]
    ConcurrencyConflict {
        id: PitchId,
        expected: i64,
        actual: i64,
    },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::PitchNotFound { .. } | Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::DuplicateClaim { .. } => ErrorKind::DuplicateClaim,
            Self::Duplicate(_) => ErrorKind::Duplicate,
            Self::CapacityExhausted { .. } => ErrorKind::CapacityExhausted,
            Self::SlotOccupied { .. } => ErrorKind::SlotOccupied,
            Self::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            Self::Database(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Errors raised while assembling runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {}: {source}", path.display())]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {}: {source}", path.display())]
    ParseFailed {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value '{value}' for {key}: {message}")]
    InvalidValue {
        key: &'static str,
        value: String,
        message: String,
    },
}
