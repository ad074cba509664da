//! Plugin configuration records, suite files and the entry-point catalog.
//!
//! A plugin suite file is TOML with one `[[plugins]]` table per plugin:
//!
//! ```toml
//! [[plugins]]
//! name = "speaker_stats"
//! dependencies = ["word_count", "speaker_turns"]
//! module = "analysis.speakers"
//! entry = "speaker_stats"
//! ```
//!
//! `module` is kept as descriptive metadata. `entry` names a factory in the
//! [`PluginCatalog`], which builds the plugin instance.

use crate::error::{ConvoscribeError, Result};
use crate::plugins::builtin;
use crate::plugins::plugin::Plugin;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Registration record for one plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub module: Option<String>,
    pub entry: String,
}

impl PluginConfig {
    pub fn new(name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            module: None,
            entry: entry.into(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Checks the record is usable: non-empty name and entry, no self dependency.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConvoscribeError::PluginConfig {
                message: "plugin name is empty".to_string(),
            });
        }
        if self.entry.trim().is_empty() {
            return Err(ConvoscribeError::PluginConfig {
                message: format!("plugin '{}' has an empty entry point", self.name),
            });
        }
        if self.dependencies.iter().any(|d| d == &self.name) {
            return Err(ConvoscribeError::PluginConfig {
                message: format!("plugin '{}' depends on itself", self.name),
            });
        }
        Ok(())
    }
}

/// Contents of a plugin suite file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSuite {
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

impl PluginSuite {
    /// Parses a suite from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads a suite file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }
}

/// Builds a plugin instance from its registration record.
pub type PluginFactory =
    Arc<dyn Fn(&PluginConfig) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync>;

/// Entry-point name to plugin factory.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with the built-in analysis plugins registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        builtin::register_builtins(&mut catalog);
        catalog
    }

    /// Registers a factory under `entry`, replacing any previous one.
    pub fn register<F>(&mut self, entry: impl Into<String>, factory: F)
    where
        F: Fn(&PluginConfig) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.insert(entry.into(), Arc::new(factory));
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.factories.contains_key(entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds the plugin a record points at.
    pub fn build(&self, config: &PluginConfig) -> Result<Arc<dyn Plugin>> {
        let factory =
            self.factories
                .get(&config.entry)
                .ok_or_else(|| ConvoscribeError::UnknownEntryPoint {
                    name: config.name.clone(),
                    entry: config.entry.clone(),
                })?;
        factory(config).map_err(|e| ConvoscribeError::PluginConfig {
            message: format!("plugin '{}' could not be built: {e:#}", config.name),
        })
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("entries", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
