//! Error types for convoscribe.
//!
//! Everything here is a configuration-time or I/O error that is returned to
//! the caller. Failures that happen while a pipeline or plugin set is running
//! are captured into component/plugin state instead (see `pipeline::component`
//! and `plugins::summary`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvoscribeError {
    // Configuration file errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Pipeline configuration errors
    #[error("No logic set on the pipeline; call set_logic before add_component")]
    LogicNotSet,

    #[error("Logic cannot be replaced while the pipeline has components")]
    LogicInUse,

    #[error("Component name '{name}' is reserved for the base input stream")]
    ReservedComponentName { name: String },

    #[error("Component '{name}' is not supported by the pipeline logic")]
    UnsupportedComponent { name: String },

    #[error("Component '{name}' depends on unknown component '{dependency}'")]
    UnknownDependency { name: String, dependency: String },

    #[error("Component '{name}' cannot depend on itself")]
    SelfDependency { name: String },

    #[error("Re-adding component '{name}' would create a dependency cycle")]
    DependencyCycle { name: String },

    #[error("Invalid runtime {value}s: runtimes cannot be negative")]
    NegativeRuntime { value: f64 },

    // Plugin registration errors
    #[error("Plugin '{name}' is already registered")]
    DuplicatePlugin { name: String },

    #[error("Plugin '{name}' uses unknown entry point '{entry}'")]
    UnknownEntryPoint { name: String, entry: String },

    #[error("Invalid plugin configuration: {message}")]
    PluginConfig { message: String },

    // Engine errors
    #[error("Engine '{engine}' failed: {message}")]
    Engine { engine: String, message: String },

    #[error("Unknown engine: {name}")]
    UnknownEngine { name: String },

    // Output errors
    #[error("Failed to write output for '{source_id}': {message}")]
    Output { source_id: String, message: String },

    // General I/O and serialization errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ConvoscribeError>;

impl ConvoscribeError {
    /// True for errors raised while assembling a pipeline or registering plugins.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ConvoscribeError::LogicNotSet
                | ConvoscribeError::LogicInUse
                | ConvoscribeError::ReservedComponentName { .. }
                | ConvoscribeError::UnsupportedComponent { .. }
                | ConvoscribeError::UnknownDependency { .. }
                | ConvoscribeError::SelfDependency { .. }
                | ConvoscribeError::DependencyCycle { .. }
                | ConvoscribeError::DuplicatePlugin { .. }
                | ConvoscribeError::UnknownEntryPoint { .. }
                | ConvoscribeError::PluginConfig { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_file_not_found_display() {
        let error = ConvoscribeError::ConfigFileNotFound {
            path: "/path/to/config.toml".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration file not found at /path/to/config.toml"
        );
    }

    #[test]
    fn test_unknown_dependency_display() {
        let error = ConvoscribeError::UnknownDependency {
            name: "analysis".to_string(),
            dependency: "transcription".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Component 'analysis' depends on unknown component 'transcription'"
        );
    }

    #[test]
    fn test_self_dependency_display() {
        let error = ConvoscribeError::SelfDependency {
            name: "c1".to_string(),
        };
        assert_eq!(error.to_string(), "Component 'c1' cannot depend on itself");
    }

    #[test]
    fn test_duplicate_plugin_display() {
        let error = ConvoscribeError::DuplicatePlugin {
            name: "word_count".to_string(),
        };
        assert_eq!(error.to_string(), "Plugin 'word_count' is already registered");
    }

    #[test]
    fn test_negative_runtime_display() {
        let error = ConvoscribeError::NegativeRuntime { value: -1.5 };
        assert_eq!(
            error.to_string(),
            "Invalid runtime -1.5s: runtimes cannot be negative"
        );
    }

    #[test]
    fn test_is_configuration() {
        assert!(ConvoscribeError::LogicNotSet.is_configuration());
        assert!(
            ConvoscribeError::DuplicatePlugin {
                name: "a".to_string()
            }
            .is_configuration()
        );
        assert!(!ConvoscribeError::Other("x".to_string()).is_configuration());
        assert!(
            !ConvoscribeError::Io(io::Error::new(io::ErrorKind::NotFound, "gone"))
                .is_configuration()
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: ConvoscribeError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: ConvoscribeError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let error: ConvoscribeError = json_error.into();
        assert!(error.to_string().starts_with("JSON error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: ConvoscribeError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<ConvoscribeError>();
        assert_sync::<ConvoscribeError>();
    }
}
