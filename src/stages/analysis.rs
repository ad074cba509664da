use crate::plugins::{ApplyConfig, PluginManager};
use crate::stages::types::Conversation;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Keyword inputs per plugin name.
pub type PluginOptions = BTreeMap<String, Map<String, Value>>;

/// Plugin analysis stage: runs the requested plugins against one conversation.
#[derive(Clone)]
pub struct AnalysisStage {
    manager: Arc<PluginManager>,
    requested: Option<Vec<String>>,
    options: Arc<PluginOptions>,
}

impl AnalysisStage {
    /// Requests every registered plugin by default.
    pub fn new(manager: Arc<PluginManager>) -> Self {
        Self {
            manager,
            requested: None,
            options: Arc::new(PluginOptions::new()),
        }
    }

    /// Restricts the stage to `plugins`.
    pub fn with_plugins(mut self, plugins: Vec<String>) -> Self {
        self.requested = Some(plugins);
        self
    }

    /// Keyword inputs passed to individual plugins.
    pub fn with_options(mut self, options: PluginOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Names requested on every conversation.
    pub fn requested_plugins(&self) -> Vec<String> {
        self.requested
            .clone()
            .unwrap_or_else(|| self.manager.plugin_names())
    }

    /// Applies the requested plugins and attaches the summary.
    ///
    /// Plugin failures are part of the summary; only an unusable payload is an
    /// error.
    pub fn apply_plugins(&self, conversation: &mut Conversation) -> anyhow::Result<()> {
        let utterances = serde_json::to_value(&conversation.utterances)?;
        let requested: BTreeMap<String, ApplyConfig> = self
            .requested_plugins()
            .into_iter()
            .map(|name| {
                let mut config = ApplyConfig::new(name.clone()).with_arg(utterances.clone());
                if let Some(kwargs) = self.options.get(&name) {
                    config.kwargs = kwargs.clone();
                }
                (name, config)
            })
            .collect();

        let summary = self.manager.apply_plugins(requested);
        if !summary.failed_plugins.is_empty() {
            tracing::warn!(
                source = %conversation.id(),
                failed = ?summary.failed_plugins,
                "some plugins did not succeed"
            );
        }
        conversation.analysis = Some(summary);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::PluginCatalog;
    use crate::plugins::builtin::builtin_suite;
    use crate::stages::types::{Source, Utterance};
    use serde_json::json;

    fn manager() -> Arc<PluginManager> {
        let mut manager = PluginManager::new(PluginCatalog::with_builtins());
        manager.register_plugins(builtin_suite());
        Arc::new(manager)
    }

    fn conversation() -> Conversation {
        let mut conversation = Conversation::new(Source::new("c1", "c1.wav"));
        conversation.utterances = vec![
            Utterance::new("alice", 0, 800, "ship the release"),
            Utterance::new("bob", 800, 1_200, "release it"),
        ];
        conversation
    }

    #[test]
    fn test_applies_all_registered_plugins_by_default() {
        let stage = AnalysisStage::new(manager());
        let mut conversation = conversation();

        stage.apply_plugins(&mut conversation).unwrap();

        let summary = conversation.analysis.unwrap();
        assert_eq!(summary.successful_plugins.len(), 4);
        assert!(summary.failed_plugins.is_empty());
        assert_eq!(summary.output("word_count").unwrap()["total"], json!(5));
    }

    #[test]
    fn test_requested_subset_and_options() {
        let mut options = PluginOptions::new();
        let mut kwargs = Map::new();
        kwargs.insert("keywords".to_string(), json!(["release"]));
        options.insert("keyword_hits".to_string(), kwargs);
        let stage = AnalysisStage::new(manager())
            .with_plugins(vec!["keyword_hits".to_string(), "speaker_stats".to_string()])
            .with_options(options);
        let mut conversation = conversation();

        stage.apply_plugins(&mut conversation).unwrap();

        let summary = conversation.analysis.unwrap();
        assert_eq!(summary.successful_plugins, vec!["keyword_hits"]);
        assert_eq!(summary.failed_plugins, vec!["speaker_stats"]);
        assert_eq!(summary.output("keyword_hits"), Some(&json!({"release": 2})));
    }
}
