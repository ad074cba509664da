//! The plugin contract and per-invocation inputs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value produced by a plugin and handed to its dependents.
pub type PluginValue = serde_json::Value;

/// Outputs of a plugin's dependencies, keyed by dependency name.
pub type DependencyOutputs = BTreeMap<String, PluginValue>;

/// Trait for analysis plugins.
///
/// A registered plugin is shared by every payload the analysis stage handles,
/// possibly from several threads at once, so `apply` takes `&self`.
pub trait Plugin: Send + Sync {
    /// Runs the plugin against one payload.
    ///
    /// # Arguments
    /// * `dependency_outputs` - Output of each declared dependency, by name
    /// * `input` - Invocation inputs supplied by the calling stage
    fn apply(
        &self,
        dependency_outputs: &DependencyOutputs,
        input: &ApplyConfig,
    ) -> anyhow::Result<PluginValue>;

    /// Whether a produced output counts as a success. Defaults to `true`.
    fn was_successful(&self, output: &PluginValue) -> bool {
        let _ = output;
        true
    }
}

/// Inputs for one plugin in one `apply_plugins` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyConfig {
    pub plugin_name: String,
    #[serde(default)]
    pub args: Vec<PluginValue>,
    #[serde(default)]
    pub kwargs: serde_json::Map<String, PluginValue>,
}

impl ApplyConfig {
    pub fn new(plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            args: Vec::new(),
            kwargs: serde_json::Map::new(),
        }
    }

    /// Appends a positional input.
    pub fn with_arg(mut self, value: impl Into<PluginValue>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Sets a keyword input.
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<PluginValue>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn arg(&self, index: usize) -> Option<&PluginValue> {
        self.args.get(index)
    }

    pub fn kwarg(&self, key: &str) -> Option<&PluginValue> {
        self.kwargs.get(key)
    }
}

type ApplyFn =
    dyn Fn(&DependencyOutputs, &ApplyConfig) -> anyhow::Result<PluginValue> + Send + Sync;

/// Plugin backed by a closure.
pub struct FnPlugin {
    apply: Box<ApplyFn>,
}

impl FnPlugin {
    pub fn new<F>(apply: F) -> Self
    where
        F: Fn(&DependencyOutputs, &ApplyConfig) -> anyhow::Result<PluginValue>
            + Send
            + Sync
            + 'static,
    {
        Self {
            apply: Box::new(apply),
        }
    }
}

impl Plugin for FnPlugin {
    fn apply(
        &self,
        dependency_outputs: &DependencyOutputs,
        input: &ApplyConfig,
    ) -> anyhow::Result<PluginValue> {
        (self.apply)(dependency_outputs, input)
    }
}
