//! Custom error types for the container-irq-analyzer.
//!
//! This module provides a centralized error handling system using the `thiserror` crate
//! to define structured, typed errors with clear messages and proper error conversion.

use std::io;
use thiserror::Error;

/// Primary error type for the analysis engine, covering all possible error cases.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A CPU range expression contained a token that is neither a bare index
    /// nor an `a-b` range. Fatal to the call that produced it: analysis cannot
    /// proceed with an ambiguous CPU list.
    #[error("invalid CPU range token '{token}' in '{input}'")]
    InvalidRangeToken { token: String, input: String },

    /// Topology resolution could not map every CPU to a node or group.
    /// Affected alignment checks degrade to an explicit error verdict,
    /// never to a silent "aligned".
    #[error("unresolved {kind} topology: {reason}")]
    UnresolvedTopology { kind: &'static str, reason: String },

    /// NUMA node lookup failed for a single PCI device. Downgrades only that
    /// device's result.
    #[error("NUMA node unknown for PCI device {address}")]
    DeviceNumaUnknown { address: String },

    /// A per-container metadata record could not be parsed. Soft failure:
    /// the record is skipped and the run continues.
    #[error("container record '{id}' unparseable: {reason}")]
    ContainerRecord { id: String, reason: String },

    /// An input required by every computation is unavailable. Fatal to the
    /// whole analysis.
    #[error("missing required input: {0}")]
    MissingRequiredInput(String),

    /// Errors from invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Errors from the underlying IO system.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results with AnalysisError.
pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    /// Whether this error aborts the whole invocation, as opposed to
    /// degrading a single entity's result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AnalysisError::MissingRequiredInput(_)
                | AnalysisError::InvalidRangeToken { .. }
                | AnalysisError::Config(_)
        )
    }
}
