//! Payload types flowing through the transcription job stages.

use crate::plugins::PluginManagerSummary;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An audio/video source to transcribe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Payload key. Unique within one job.
    pub id: String,
    pub path: PathBuf,
}

impl Source {
    /// Creates a new source.
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// Creates a source keyed by the path's file stem.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { id, path }
    }
}

/// One speaker turn produced by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    /// Start offset in milliseconds.
    pub start_ms: u64,
    /// End offset in milliseconds.
    pub end_ms: u64,
    pub text: String,
}

impl Utterance {
    /// Creates a new utterance.
    pub fn new(
        speaker: impl Into<String>,
        start_ms: u64,
        end_ms: u64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            speaker: speaker.into(),
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    /// Duration in milliseconds. Zero when the end precedes the start.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// A payload-level failure inside one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: String,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// One conversation moving through the job: the unit every stage fans out over.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub source: Source,
    pub utterances: Vec<Utterance>,
    pub analysis: Option<PluginManagerSummary>,
    pub output_path: Option<PathBuf>,
    /// Stage failures in the order they happened. A conversation with a
    /// failure is passed through untouched by every later stage.
    pub failures: Vec<StageFailure>,
}

impl Conversation {
    /// Creates a conversation that has not been transcribed yet.
    pub fn new(source: Source) -> Self {
        Self {
            source,
            utterances: Vec::new(),
            analysis: None,
            output_path: None,
            failures: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.source.id
    }

    pub fn has_failed(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Speakers in order of first appearance.
    pub fn speakers(&self) -> Vec<&str> {
        let mut speakers: Vec<&str> = Vec::new();
        for utterance in &self.utterances {
            if !speakers.contains(&utterance.speaker.as_str()) {
                speakers.push(&utterance.speaker);
            }
        }
        speakers
    }

    /// Total time covered by utterances, in milliseconds.
    pub fn speech_ms(&self) -> u64 {
        self.utterances.iter().map(Utterance::duration_ms).sum()
    }

    pub(crate) fn record_failure(&mut self, stage: &str, message: impl Into<String>) {
        self.failures.push(StageFailure::new(stage, message));
    }
}
