//! Dependency-resolved plugin execution.
//!
//! Plugins are registered once (directly, from configuration data, or by
//! scanning a directory of plugin suite files) and applied many times, once per
//! payload. Each `apply_plugins` call resolves the declared dependency graph
//! restricted to the requested plugin names, runs independent plugins
//! concurrently on a worker pool and returns a [`PluginManagerSummary`].

pub mod builtin;
pub mod config;
pub mod manager;
pub mod plugin;
pub mod summary;

pub use config::{PluginCatalog, PluginConfig, PluginSuite};
pub use manager::{PluginDetails, PluginManager};
pub use plugin::{ApplyConfig, DependencyOutputs, FnPlugin, Plugin, PluginValue};
pub use summary::{PluginManagerSummary, PluginRecord, PluginStatus};
