//! Default configuration constants for convoscribe.
//!
//! Shared constants used by the configuration types, the pipeline kernel and
//! the transcription job layer.

/// Name under which the pipeline's initial input stream is published.
pub const BASE_STREAM: &str = "base";

/// Default number of workers used to fan out payloads inside a stage.
pub const POOL_WORKERS: usize = 4;

/// Default number of workers used to run independent plugins concurrently.
pub const PLUGIN_WORKERS: usize = 4;

/// Default directory that formatted transcripts are written to.
pub const OUTPUT_DIR: &str = "convoscribe-output";

/// Default transcription engine.
///
/// "mock" is the only engine that ships with the library; cloud engine
/// adapters live outside this crate.
pub const DEFAULT_ENGINE: &str = "mock";

/// Default language code handed to the engine.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Default log filter when neither `RUST_LOG` nor the config sets one.
pub const LOG_LEVEL: &str = "info";

/// Component name of the speech-to-text stage.
pub const TRANSCRIPTION_COMPONENT: &str = "transcription";

/// Component name of the plugin analysis stage.
pub const ANALYSIS_COMPONENT: &str = "analysis";

/// Component name of the output formatting stage.
pub const FORMAT_COMPONENT: &str = "format";

/// File extension of plugin suite files picked up by directory scans.
pub const PLUGIN_SUITE_EXTENSION: &str = "toml";

/// Extension of formatted transcript files.
pub const TRANSCRIPT_EXTENSION: &str = "json";

/// Coerce a requested worker count to the minimum of one worker.
pub fn worker_count(requested: i64) -> usize {
    if requested <= 0 {
        1
    } else {
        usize::try_from(requested).unwrap_or(usize::MAX)
    }
}
