//! Error types for the jobacct crate.

use std::io;
use thiserror::Error;

/// Main error type for accounting operations
#[derive(Error, Debug)]
pub enum AcctError {
    /// No backend type configured or the type string is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No installed accounting plugin matches the requested type
    #[error("No accounting plugin found for type: {0}")]
    PluginNotFound(String),

    /// A candidate plugin is missing one or more required operations
    #[error("Incomplete accounting plugin: resolved {found} of {expected} operations")]
    IncompleteBinding {
        /// Number of operations resolved before the first gap
        found: usize,
        /// Number of operations the ABI contract requires
        expected: usize,
    },

    /// Failure surfaced by the active backend, propagated verbatim
    #[error("Backend error: {0}")]
    Backend(String),

    /// Record does not belong to the active backend
    #[error("Record does not belong to the active backend")]
    ForeignRecord,

    /// Record serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Type alias for Result with AcctError
pub type AcctResult<T> = Result<T, AcctError>;
