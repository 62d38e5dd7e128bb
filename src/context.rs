//! Subsystem context and its lifecycle.
//!
//! There is exactly one accounting context per process, guarded by a single
//! mutex that serializes both lifecycle transitions and every dispatched
//! backend call. The context is either absent or fully resolved; the
//! creating thread holds the lock for the whole of creation, so no caller
//! ever observes a half-built context.
//!
//! A failed creation leaves the subsystem inert: the failure is logged once,
//! dispatch calls return neutral results, and the next call retries
//! initialization. After `shutdown` the same applies, which supports daemon
//! role transitions such as standby-to-active promotion.

use log::{error, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::config::{self, AcctConfig};
use crate::error::{AcctError, AcctResult};
use crate::plugin::{self, AcctBackend, OperationTable, JOBACCT_MAJOR_TYPE};
use crate::registry::{PluginHandle, PluginRegistry};

/// The resolved accounting context
///
/// Invariant: every field is populated before the context is published;
/// a partially initialized context is never stored.
struct AcctContext {
    backend_type: String,
    #[allow(dead_code)]
    registry: PluginRegistry,
    #[allow(dead_code)]
    plugin: PluginHandle,
    ops: OperationTable,
    last_error: Option<String>,
}

/// Mutex-guarded slot holding the context, absent until first use
struct ContextSlot {
    context: Option<AcctContext>,
    failure_logged: bool,
}

impl ContextSlot {
    const fn new() -> Self {
        ContextSlot {
            context: None,
            failure_logged: false,
        }
    }

    /// Idempotent lazy initialization from the given configuration
    fn ensure(&mut self, config: &AcctConfig) -> AcctResult<()> {
        if self.context.is_some() {
            return Ok(());
        }

        match Self::create(config) {
            Ok(context) => {
                info!(
                    "job accounting backend {}/{} ready",
                    JOBACCT_MAJOR_TYPE, context.backend_type
                );
                self.context = Some(context);
                self.failure_logged = false;
                Ok(())
            }
            Err(err) => {
                if !self.failure_logged {
                    error!("job accounting is inert: {}", err);
                    self.failure_logged = true;
                }
                Err(err)
            }
        }
    }

    /// Build a fully resolved context or fail without publishing anything
    fn create(config: &AcctConfig) -> AcctResult<AcctContext> {
        let backend_type = config
            .backend_type
            .clone()
            .ok_or_else(|| AcctError::Configuration("no accounting backend type configured".to_string()))?;
        if backend_type.trim().is_empty() {
            return Err(AcctError::Configuration(
                "accounting backend type string is empty".to_string(),
            ));
        }

        let mut registry = PluginRegistry::new(JOBACCT_MAJOR_TYPE);
        registry.scan(config.plugin_dir.as_deref());

        let handle = registry.select_by_type(&backend_type)?;
        let descriptor = registry.descriptor(handle).clone();
        let backend = registry.instantiate(handle);
        let ops = plugin::resolve(&descriptor, backend)?;

        Ok(AcctContext {
            backend_type,
            registry,
            plugin: handle,
            ops,
            last_error: None,
        })
    }

    /// Idempotent teardown; the registry is released with the context
    fn shutdown(&mut self) {
        if self.context.take().is_some() {
            info!("job accounting context shut down");
        }
        self.failure_logged = false;
    }
}

static CONTEXT: Lazy<Mutex<ContextSlot>> = Lazy::new(|| Mutex::new(ContextSlot::new()));

/// Ensure the accounting context exists, creating it from the process-wide
/// configuration on first use.
///
/// Concurrent callers block until the first finishes, then observe the same
/// terminal state. On failure the subsystem stays inert and the error is
/// returned for the caller's benefit; dispatch entry points ignore it and
/// degrade to no-ops instead.
pub fn ensure_initialized() -> AcctResult<()> {
    let config = config::current();
    CONTEXT.lock().ensure(&config)
}

/// Tear down the accounting context.
///
/// Idempotent. A later dispatch call transparently re-initializes from the
/// then-current configuration.
pub fn shutdown() -> AcctResult<()> {
    CONTEXT.lock().shutdown();
    Ok(())
}

/// Whether a resolved context currently exists
pub fn is_initialized() -> bool {
    CONTEXT.lock().context.is_some()
}

/// Last failure surfaced by the active backend, for diagnostics only
pub fn last_error() -> Option<String> {
    CONTEXT
        .lock()
        .context
        .as_ref()
        .and_then(|cx| cx.last_error.clone())
}

/// Forward a fallible operation to the active backend.
///
/// Returns `Ok(inert)` when no context exists. Backend failures are recorded
/// in the context's error slot and propagated verbatim.
pub(crate) fn dispatch_op<R>(
    inert: R,
    op: impl FnOnce(&mut dyn AcctBackend) -> AcctResult<R>,
) -> AcctResult<R> {
    let mut slot = CONTEXT.lock();
    let Some(context) = slot.context.as_mut() else {
        return Ok(inert);
    };
    let result = op(context.ops.backend_mut());
    if let Err(ref err) = result {
        context.last_error = Some(err.to_string());
    }
    result
}

/// Forward an infallible operation to the active backend
pub(crate) fn dispatch_infallible<R>(
    inert: R,
    op: impl FnOnce(&mut dyn AcctBackend) -> R,
) -> R {
    let mut slot = CONTEXT.lock();
    match slot.context.as_mut() {
        Some(context) => op(context.ops.backend_mut()),
        None => inert,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(backend_type: &str) -> AcctConfig {
        AcctConfig::new().backend_type(backend_type)
    }

    #[test]
    fn test_ensure_with_builtin_backend() {
        let mut slot = ContextSlot::new();
        slot.ensure(&config_for("none")).unwrap();
        assert!(slot.context.is_some());

        // Second call is a no-op.
        slot.ensure(&config_for("none")).unwrap();
    }

    #[test]
    fn test_ensure_without_backend_type() {
        let mut slot = ContextSlot::new();
        let result = slot.ensure(&AcctConfig::default());

        assert!(matches!(result, Err(AcctError::Configuration(_))));
        assert!(slot.context.is_none());
        assert!(slot.failure_logged);
    }

    #[test]
    fn test_ensure_with_unknown_backend() {
        let mut slot = ContextSlot::new();
        let result = slot.ensure(&config_for("bogus"));

        assert!(matches!(result, Err(AcctError::PluginNotFound(_))));
        assert!(slot.context.is_none());

        // The failure stays diagnosed but the slot keeps retrying.
        assert!(slot.ensure(&config_for("bogus")).is_err());
        assert!(slot.ensure(&config_for("none")).is_ok());
        assert!(!slot.failure_logged);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut slot = ContextSlot::new();
        slot.ensure(&config_for("none")).unwrap();

        slot.shutdown();
        assert!(slot.context.is_none());
        slot.shutdown();

        // Re-initialization after shutdown is legal.
        slot.ensure(&config_for("none")).unwrap();
        assert!(slot.context.is_some());
    }
}
