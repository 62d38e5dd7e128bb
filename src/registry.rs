//! Plugin registry for accounting backends.
//!
//! The registry indexes backend implementations by their declared type. The
//! major type partitions the namespace (every accounting backend lives under
//! `"jobacct"`); multiple minor types coexist and are switched by
//! configuration alone. Built-in backends are registered on scan, and
//! embedders can install additional factories process-wide with
//! [`install_plugin`] before the subsystem initializes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::backends;
use crate::error::{AcctError, AcctResult};
use crate::plugin::{AcctBackend, PluginDescriptor, PLUGIN_API_VERSION};

/// Factory producing a fresh backend instance for its descriptor
pub type BackendFactory = Arc<dyn Fn() -> Box<dyn AcctBackend> + Send + Sync>;

/// A descriptor paired with its factory
#[derive(Clone)]
struct RegisteredPlugin {
    descriptor: PluginDescriptor,
    factory: BackendFactory,
}

/// Opaque handle identifying a plugin within a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginHandle(usize);

/// Process-wide catalog of externally installed plugins, consulted on scan
static INSTALLED: Lazy<RwLock<Vec<RegisteredPlugin>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Install an accounting backend factory process-wide
///
/// Installed plugins become selectable by configuration the next time a
/// registry scans. Installing after the context has initialized takes effect
/// on re-initialization.
pub fn install_plugin<F>(descriptor: PluginDescriptor, factory: F)
where
    F: Fn() -> Box<dyn AcctBackend> + Send + Sync + 'static,
{
    debug!("installing accounting plugin {}", descriptor.full_type());
    INSTALLED.write().push(RegisteredPlugin {
        descriptor,
        factory: Arc::new(factory),
    });
}

fn installed_plugins() -> Vec<RegisteredPlugin> {
    INSTALLED.read().clone()
}

/// Registry of backend plugins sharing one major type
pub struct PluginRegistry {
    major_type: String,
    plugins: Vec<RegisteredPlugin>,
    scanned_dirs: Vec<PathBuf>,
}

impl PluginRegistry {
    /// Create an empty registry for the given plugin family
    pub fn new(major_type: impl Into<String>) -> Self {
        PluginRegistry {
            major_type: major_type.into(),
            plugins: Vec::new(),
            scanned_dirs: Vec::new(),
        }
    }

    /// The plugin family this registry indexes
    pub fn major_type(&self) -> &str {
        &self.major_type
    }

    /// Register a plugin factory under its declared type
    ///
    /// A descriptor whose major type does not match the registry is skipped;
    /// a minor type already present is kept as-is, making registration
    /// idempotent.
    pub fn register<F>(&mut self, descriptor: PluginDescriptor, factory: F)
    where
        F: Fn() -> Box<dyn AcctBackend> + Send + Sync + 'static,
    {
        self.register_entry(RegisteredPlugin {
            descriptor,
            factory: Arc::new(factory),
        });
    }

    fn register_entry(&mut self, plugin: RegisteredPlugin) {
        if plugin.descriptor.major_type != self.major_type {
            warn!(
                "skipping plugin {}: major type does not match registry type {}",
                plugin.descriptor.full_type(),
                self.major_type
            );
            return;
        }
        if self
            .plugins
            .iter()
            .any(|p| p.descriptor.minor_type == plugin.descriptor.minor_type)
        {
            debug!(
                "plugin {} already registered",
                plugin.descriptor.full_type()
            );
            return;
        }
        debug!("registered accounting plugin {}", plugin.descriptor.full_type());
        self.plugins.push(plugin);
    }

    /// Populate the registry: built-ins, installed factories, then the
    /// discovery directory
    ///
    /// Idempotent; a directory is inspected at most once per registry.
    pub fn scan(&mut self, dir: Option<&Path>) {
        backends::register_builtins(self);
        for plugin in installed_plugins() {
            self.register_entry(plugin);
        }
        if let Some(dir) = dir {
            self.scan_dir(dir);
        }
    }

    /// Inspect the discovery directory and warn about modules that cannot
    /// be bound to any registered backend.
    fn scan_dir(&mut self, dir: &Path) {
        if self.scanned_dirs.iter().any(|d| d == dir) {
            return;
        }
        match fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    let prefix = format!("{}_", self.major_type);
                    let Some(minor) = stem.strip_prefix(&prefix) else {
                        continue;
                    };
                    if !self.plugins.iter().any(|p| p.descriptor.minor_type == minor) {
                        warn!(
                            "ignoring plugin module {}: no loadable backend for type {}/{}",
                            path.display(),
                            self.major_type,
                            minor
                        );
                    }
                }
            }
            Err(err) => {
                debug!("plugin directory {} not readable: {}", dir.display(), err);
            }
        }
        self.scanned_dirs.push(dir.to_path_buf());
    }

    /// Select a plugin by its minor type
    ///
    /// A plugin built against a different API version is refused with a
    /// warning and treated as not installed.
    pub fn select_by_type(&self, minor_type: &str) -> AcctResult<PluginHandle> {
        for (index, plugin) in self.plugins.iter().enumerate() {
            if plugin.descriptor.minor_type != minor_type {
                continue;
            }
            if plugin.descriptor.api_version != PLUGIN_API_VERSION {
                warn!(
                    "refusing plugin {}: built against api version {}, core is {}",
                    plugin.descriptor.full_type(),
                    plugin.descriptor.api_version,
                    PLUGIN_API_VERSION
                );
                continue;
            }
            return Ok(PluginHandle(index));
        }
        Err(AcctError::PluginNotFound(format!(
            "{}/{}",
            self.major_type, minor_type
        )))
    }

    /// Descriptor of a selected plugin
    pub fn descriptor(&self, handle: PluginHandle) -> &PluginDescriptor {
        &self.plugins[handle.0].descriptor
    }

    /// Instantiate the backend of a selected plugin
    pub fn instantiate(&self, handle: PluginHandle) -> Box<dyn AcctBackend> {
        (self.plugins[handle.0].factory)()
    }

    /// Minor types currently registered, in registration order
    pub fn registered_types(&self) -> Vec<&str> {
        self.plugins
            .iter()
            .map(|p| p.descriptor.minor_type)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::none::NoneBackend;
    use crate::plugin::{JOBACCT_MAJOR_TYPE, REQUIRED_OPS};

    fn test_descriptor(minor: &'static str, api_version: u32) -> PluginDescriptor {
        PluginDescriptor {
            major_type: JOBACCT_MAJOR_TYPE,
            minor_type: minor,
            api_version,
            plugin_version: "0.0.0",
            provided_ops: &REQUIRED_OPS,
        }
    }

    #[test]
    fn test_scan_registers_builtins() {
        let mut registry = PluginRegistry::new(JOBACCT_MAJOR_TYPE);
        registry.scan(None);

        let types = registry.registered_types();
        assert!(types.contains(&"none"));
        assert!(types.contains(&"log"));
    }

    #[test]
    fn test_scan_is_idempotent() {
        let mut registry = PluginRegistry::new(JOBACCT_MAJOR_TYPE);
        registry.scan(None);
        let count = registry.registered_types().len();
        registry.scan(None);
        assert_eq!(registry.registered_types().len(), count);
    }

    #[test]
    fn test_select_unknown_type() {
        let mut registry = PluginRegistry::new(JOBACCT_MAJOR_TYPE);
        registry.scan(None);

        match registry.select_by_type("bogus") {
            Err(AcctError::PluginNotFound(full_type)) => {
                assert_eq!(full_type, "jobacct/bogus");
            }
            _ => panic!("Expected PluginNotFound"),
        }
    }

    #[test]
    fn test_select_and_instantiate() {
        let mut registry = PluginRegistry::new(JOBACCT_MAJOR_TYPE);
        registry.scan(None);

        let handle = registry.select_by_type("none").unwrap();
        assert_eq!(registry.descriptor(handle).minor_type, "none");

        let backend = registry.instantiate(handle);
        let record = backend.alloc();
        backend.free(record).unwrap();
    }

    #[test]
    fn test_version_mismatch_refused() {
        let mut registry = PluginRegistry::new(JOBACCT_MAJOR_TYPE);
        registry.register(test_descriptor("stale", PLUGIN_API_VERSION + 1), || {
            Box::new(NoneBackend::new())
        });

        assert!(matches!(
            registry.select_by_type("stale"),
            Err(AcctError::PluginNotFound(_))
        ));
    }

    #[test]
    fn test_mismatched_major_type_skipped() {
        let mut registry = PluginRegistry::new(JOBACCT_MAJOR_TYPE);
        let descriptor = PluginDescriptor {
            major_type: "jobcomp",
            minor_type: "filetxt",
            api_version: PLUGIN_API_VERSION,
            plugin_version: "0.0.0",
            provided_ops: &REQUIRED_OPS,
        };
        registry.register(descriptor, || Box::new(NoneBackend::new()));

        assert!(registry.registered_types().is_empty());
    }

    #[test]
    fn test_scan_dir_tolerates_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("jobacct_mystery.so"), b"").unwrap();
        std::fs::write(dir.path().join("README"), b"").unwrap();

        let mut registry = PluginRegistry::new(JOBACCT_MAJOR_TYPE);
        registry.scan(Some(dir.path()));

        // Stray modules are diagnosed, never fatal; built-ins still resolve.
        assert!(registry.select_by_type("log").is_ok());
    }
}
