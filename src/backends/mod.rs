//! Built-in accounting backends.
//!
//! Two variants ship with the core: `none` keeps the subsystem wired but
//! records nothing, `log` appends job and step events to an accounting log
//! file. Further backends install through [`crate::registry::install_plugin`].

pub mod log;
pub mod none;

use crate::registry::PluginRegistry;

/// Register the built-in backends into a registry
pub(crate) fn register_builtins(registry: &mut PluginRegistry) {
    registry.register(none::DESCRIPTOR.clone(), || Box::new(none::NoneBackend::new()));
    registry.register(log::DESCRIPTOR.clone(), || Box::new(log::LogBackend::new()));
}
