use crate::defaults;
use crate::error::{ConvoscribeError, Result};
use crate::stages::PluginOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    pub plugins: PluginsConfig,
    pub output: OutputConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Stage fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Values below one are coerced to one when the pool is built.
    pub workers: i64,
}

/// Plugin registration and selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory scanned for plugin suite files.
    pub directory: Option<PathBuf>,
    pub workers: i64,
    /// Plugins the analysis stage requests. All registered plugins when unset.
    pub apply: Option<Vec<String>>,
    /// Keyword inputs per plugin, e.g. `[plugins.options.keyword_hits]`.
    pub options: PluginOptions,
}

/// Transcript output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub pretty: bool,
}

/// Speech-to-text engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    pub language: String,
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: defaults::POOL_WORKERS as i64,
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            workers: defaults::PLUGIN_WORKERS as i64,
            apply: None,
            options: PluginOptions::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(defaults::OUTPUT_DIR),
            pretty: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: defaults::DEFAULT_ENGINE.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConvoscribeError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConvoscribeError::Io(e)
            }
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(ConvoscribeError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Checks values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<()> {
        if self.engine.name.trim().is_empty() {
            return Err(ConvoscribeError::ConfigInvalidValue {
                key: "engine.name".to_string(),
                message: "engine name cannot be empty".to_string(),
            });
        }
        if self.output.directory.as_os_str().is_empty() {
            return Err(ConvoscribeError::ConfigInvalidValue {
                key: "output.directory".to_string(),
                message: "output directory cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CONVOSCRIBE_WORKERS → pool.workers
    /// - CONVOSCRIBE_PLUGIN_DIR → plugins.directory
    /// - CONVOSCRIBE_OUTPUT_DIR → output.directory
    /// - CONVOSCRIBE_LOG → logging.level
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(workers) = std::env::var("CONVOSCRIBE_WORKERS")
            && !workers.is_empty()
        {
            match workers.trim().parse::<i64>() {
                Ok(workers) => self.pool.workers = workers,
                Err(_) => tracing::warn!(value = %workers, "ignoring invalid CONVOSCRIBE_WORKERS"),
            }
        }

        if let Ok(directory) = std::env::var("CONVOSCRIBE_PLUGIN_DIR")
            && !directory.is_empty()
        {
            self.plugins.directory = Some(PathBuf::from(directory));
        }

        if let Ok(directory) = std::env::var("CONVOSCRIBE_OUTPUT_DIR")
            && !directory.is_empty()
        {
            self.output.directory = PathBuf::from(directory);
        }

        if let Ok(level) = std::env::var("CONVOSCRIBE_LOG")
            && !level.is_empty()
        {
            self.logging.level = level;
        }

        self
    }

    /// Worker threads for stage fan-out, at least one.
    pub fn pool_workers(&self) -> usize {
        defaults::worker_count(self.pool.workers)
    }

    /// Worker threads for concurrent plugins, at least one.
    pub fn plugin_workers(&self) -> usize {
        defaults::worker_count(self.plugins.workers)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConvoscribeError::Other(e.to_string()))
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/convoscribe/config.toml on Linux, or a path relative to
    /// the working directory when no config directory is known.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("convoscribe")
            .join("config.toml")
    }
}
