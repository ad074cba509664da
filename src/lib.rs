//! convoscribe - transcription job orchestration
//!
//! Moves conversations through dependency-ordered stages (transcription,
//! plugin analysis, output formatting), fanning each stage out over a worker
//! pool and running analysis plugins as a dependency graph per conversation.

// Execution failures are captured into state; nothing in the library may panic on them.
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod plugins;
pub mod pool;
pub mod stages;
pub mod stt;

// Kernel
pub use pipeline::{
    ComponentState, ErrorReporter, ExecutionSummary, Logic, Payloads, Pipeline, Stream, Streams,
    TableLogic,
};
pub use pool::{PoolError, TaskError, WorkerPool};

// Plugins
pub use plugins::{
    ApplyConfig, Plugin, PluginCatalog, PluginConfig, PluginManager, PluginManagerSummary,
};

// Job layer
pub use orchestrator::{ComponentReport, JobReport, Orchestrator};
pub use stages::{Conversation, Source, TranscriptionLogic, Utterance};
pub use stt::{Engine, EngineSettings, MockEngine};

// Error handling
pub use error::{ConvoscribeError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_hash_only_when_built_from_git() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", ver);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
