//! Execution-time failures and how they are reported.
//!
//! These never propagate out of `Pipeline::execute` or
//! `PluginManager::apply_plugins`; they are stored on the failed component or
//! plugin and handed to an [`ErrorReporter`].

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// The step of a component run that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Preprocess,
    Process,
    Postprocess,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Preprocess => write!(f, "preprocess"),
            Phase::Process => write!(f, "process"),
            Phase::Postprocess => write!(f, "postprocess"),
        }
    }
}

/// Error retained on a component that ended in the `failed` state.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ComponentError {
    pub phase: Phase,
    pub message: String,
}

impl ComponentError {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.message)
    }
}

impl std::error::Error for ComponentError {}

/// Trait for reporting component and plugin failures.
pub trait ErrorReporter: Send + Sync {
    /// Reports a failure of the named component or plugin.
    fn report(&self, scope: &str, error: &str);
}

/// Reporter that logs failures through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, scope: &str, error: &str) {
        tracing::warn!(scope, error, "execution failed");
    }
}

/// Reporter that keeps every failure in memory, in report order.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(scope, error)` pairs reported so far.
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, scope: &str, error: &str) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((scope.to_string(), error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_error_display() {
        let error = ComponentError::new(Phase::Process, "engine unreachable");
        assert_eq!(error.to_string(), "process failed: engine unreachable");

        let error = ComponentError::new(Phase::Preprocess, "missing stream");
        assert_eq!(error.to_string(), "preprocess failed: missing stream");
    }

    #[test]
    fn test_log_reporter() {
        let reporter = LogReporter;
        // Just ensure it doesn't panic
        reporter.report("transcription", "test error");
    }

    #[test]
    fn test_collecting_reporter_keeps_order() {
        let reporter = CollectingReporter::new();
        reporter.report("c5", "boom");
        reporter.report("word_count", "bad input");

        assert_eq!(
            reporter.reports(),
            vec![
                ("c5".to_string(), "boom".to_string()),
                ("word_count".to_string(), "bad input".to_string()),
            ]
        );
    }
}
