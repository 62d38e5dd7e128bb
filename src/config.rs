//! Configuration module for the accounting subsystem.

use std::path::PathBuf;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{AcctError, AcctResult};

/// Default threshold above which a dispatched backend call is reported as slow
pub const DEFAULT_SLOW_OP_THRESHOLD: Duration = Duration::from_secs(1);

/// Configuration for the accounting subsystem
///
/// An absent backend type is legal: the subsystem stays inert and every
/// dispatch call returns a neutral result.
#[derive(Debug, Clone)]
pub struct AcctConfig {
    /// Minor type of the backend to activate (e.g. "log", "none")
    pub backend_type: Option<String>,

    /// Directory scanned for installable backend modules
    pub plugin_dir: Option<PathBuf>,

    /// Elapsed-time threshold for slow-operation diagnostics
    pub slow_op_threshold: Duration,
}

impl Default for AcctConfig {
    fn default() -> Self {
        AcctConfig {
            backend_type: None,
            plugin_dir: None,
            slow_op_threshold: DEFAULT_SLOW_OP_THRESHOLD,
        }
    }
}

impl AcctConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend type to activate
    pub fn backend_type(mut self, backend_type: impl Into<String>) -> Self {
        self.backend_type = Some(backend_type.into());
        self
    }

    /// Set the plugin discovery directory
    pub fn plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = Some(dir.into());
        self
    }

    /// Set the slow-operation reporting threshold
    pub fn slow_op_threshold(mut self, threshold: Duration) -> Self {
        self.slow_op_threshold = threshold;
        self
    }

    /// Validate the configuration and return it
    pub fn build(self) -> AcctResult<Self> {
        if let Some(ref backend_type) = self.backend_type {
            if backend_type.trim().is_empty() {
                return Err(AcctError::Configuration(
                    "backend type string is empty".to_string(),
                ));
            }
        }
        Ok(self)
    }
}

/// Process-wide configuration slot, read lazily by the context manager
static CONFIG: Lazy<RwLock<AcctConfig>> = Lazy::new(|| RwLock::new(AcctConfig::default()));

/// Install the process-wide accounting configuration
///
/// Takes effect on the next context initialization; an already-running
/// context keeps its original selection until `shutdown`.
pub fn configure(config: AcctConfig) {
    *CONFIG.write() = config;
}

/// Snapshot the current process-wide configuration
pub(crate) fn current() -> AcctConfig {
    CONFIG.read().clone()
}
