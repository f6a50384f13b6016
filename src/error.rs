//! Error types for the storage proposal
//!
//! Provides structured error types for every proposal stage: settings
//! validation, free space scanning, distribution solving, device graph
//! mutation and bootability checks.

use thiserror::Error;

/// Unified error type for the proposal
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Proposal Errors
    // =========================================================================
    #[error("No disk space for target {target}: {reason}")]
    NoDiskSpace { target: String, reason: String },

    #[error("No more partition slots available for target {target}")]
    NoMorePartitionSlot { target: String },

    #[error("Proposal is not bootable: {0}")]
    NotBootable(String),

    #[error("Proposal error: {0}")]
    Proposal(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    // =========================================================================
    // Device Graph Errors
    // =========================================================================
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Device graph error: {0}")]
    DeviceGraph(String),

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Action the retry controller takes after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Try the next sizing target of the ladder
    AdvanceTarget,
    /// Stop the proposal and surface the error
    Abort,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::NoDiskSpace { .. } | Error::NoMorePartitionSlot { .. } => {
                ErrorAction::AdvanceTarget
            }
            _ => ErrorAction::Abort,
        }
    }

    /// Check if the next sizing target may still succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.action(), ErrorAction::AdvanceTarget)
    }

    /// Shorthand used by the solver
    pub(crate) fn no_disk_space(target: impl ToString, reason: impl Into<String>) -> Self {
        Error::NoDiskSpace {
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for the proposal
pub type Result<T> = std::result::Result<T, Error>;
