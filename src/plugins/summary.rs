//! Outcome of one `apply_plugins` call.

use crate::pipeline::component::Runtime;
use crate::plugins::plugin::PluginValue;
use serde::Serialize;
use std::collections::BTreeMap;

/// Terminal outcome of a single requested plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    /// `apply` returned an output the plugin accepted.
    Successful,
    /// `apply` was invoked and failed, panicked or produced a rejected output.
    Failed,
    /// Never invoked: unregistered, or a dependency was missing or did not succeed.
    Skipped,
}

/// Execution record for one plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginRecord {
    pub status: PluginStatus,
    pub output: Option<PluginValue>,
    pub runtime: Runtime,
    pub error: Option<String>,
}

impl PluginRecord {
    pub(crate) fn successful(output: PluginValue, runtime: Runtime) -> Self {
        Self {
            status: PluginStatus::Successful,
            output: Some(output),
            runtime,
            error: None,
        }
    }

    pub(crate) fn failed(output: Option<PluginValue>, runtime: Runtime, error: String) -> Self {
        Self {
            status: PluginStatus::Failed,
            output,
            runtime,
            error: Some(error),
        }
    }

    pub(crate) fn skipped(reason: String) -> Self {
        Self {
            status: PluginStatus::Skipped,
            output: None,
            runtime: Runtime::ZERO,
            error: Some(reason),
        }
    }

    pub fn was_successful(&self) -> bool {
        self.status == PluginStatus::Successful
    }
}

/// What happened to every requested plugin.
///
/// `failed_plugins` holds both failed and skipped plugins, in the order their
/// outcome was decided.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PluginManagerSummary {
    pub successful_plugins: Vec<String>,
    pub failed_plugins: Vec<String>,
    pub total_runtime: Runtime,
    pub records: BTreeMap<String, PluginRecord>,
}

impl PluginManagerSummary {
    pub fn total_runtime_secs(&self) -> f64 {
        self.total_runtime.as_secs()
    }

    pub fn record(&self, plugin: &str) -> Option<&PluginRecord> {
        self.records.get(plugin)
    }

    pub fn output(&self, plugin: &str) -> Option<&PluginValue> {
        self.record(plugin).and_then(|r| r.output.as_ref())
    }

    /// Plugins that were never invoked.
    pub fn skipped_plugins(&self) -> Vec<String> {
        self.failed_plugins
            .iter()
            .filter(|name| {
                self.records
                    .get(name.as_str())
                    .is_some_and(|r| r.status == PluginStatus::Skipped)
            })
            .cloned()
            .collect()
    }

    pub fn all_successful(&self) -> bool {
        self.failed_plugins.is_empty()
    }

    pub(crate) fn record_outcome(&mut self, name: &str, record: PluginRecord) {
        if record.was_successful() {
            self.successful_plugins.push(name.to_string());
        } else {
            self.failed_plugins.push(name.to_string());
        }
        self.records.insert(name.to_string(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_outcome_splits_lists() {
        let mut summary = PluginManagerSummary::default();
        summary.record_outcome("a", PluginRecord::successful(json!(1), Runtime::ZERO));
        summary.record_outcome(
            "b",
            PluginRecord::failed(None, Runtime::ZERO, "boom".to_string()),
        );
        summary.record_outcome("c", PluginRecord::skipped("missing a".to_string()));

        assert_eq!(summary.successful_plugins, vec!["a"]);
        assert_eq!(summary.failed_plugins, vec!["b", "c"]);
        assert_eq!(summary.skipped_plugins(), vec!["c"]);
        assert_eq!(summary.output("a"), Some(&json!(1)));
        assert_eq!(summary.output("c"), None);
        assert!(!summary.all_successful());
    }

    #[test]
    fn test_summary_serializes() {
        let mut summary = PluginManagerSummary::default();
        summary.record_outcome("a", PluginRecord::successful(json!({"n": 2}), Runtime::ZERO));

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["successful_plugins"], json!(["a"]));
        assert_eq!(value["records"]["a"]["status"], json!("successful"));
        assert_eq!(value["records"]["a"]["output"]["n"], json!(2));
        assert_eq!(value["total_runtime"], json!(0.0));
    }
}
