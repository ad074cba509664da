use crate::defaults;
use crate::error::{ConvoscribeError, Result};
use crate::stages::types::{Source, Utterance};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::sync::Arc;

/// Milliseconds the mock engine assigns to each transcribed word.
const MOCK_MS_PER_WORD: u64 = 400;

/// Trait for speech-to-text engines.
///
/// This trait allows swapping implementations (cloud adapters vs mock). The
/// transcription stage shares one engine across all worker threads.
pub trait Engine: Send + Sync {
    /// Engine name as used in configuration.
    fn name(&self) -> &str;

    /// Apply settings before the first `transcribe` call.
    fn configure(&mut self, settings: &EngineSettings) -> Result<()>;

    /// Transcribe one source into speaker-attributed utterances.
    ///
    /// # Returns
    /// Utterances in the order they were spoken, or an error. Retries and
    /// backoff are the adapter's business.
    fn transcribe(&self, source: &Source) -> Result<Vec<Utterance>>;

    /// Check if the engine can accept work
    fn is_ready(&self) -> bool;
}

/// Implement Engine for Box<T> so a boxed engine can be configured in place.
impl<T: Engine + ?Sized> Engine for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn configure(&mut self, settings: &EngineSettings) -> Result<()> {
        (**self).configure(settings)
    }

    fn transcribe(&self, source: &Source) -> Result<Vec<Utterance>> {
        (**self).transcribe(source)
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Settings handed to an engine's `configure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub language: String,
    /// Free-form adapter options.
    pub options: BTreeMap<String, String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            options: BTreeMap::new(),
        }
    }
}

impl EngineSettings {
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Engine that needs no network access.
///
/// Sources with a scripted response return it; scripted failures return an
/// engine error. Any other source is read as a plain-text transcript, one
/// utterance per non-empty line, with an optional `speaker:` prefix.
#[derive(Debug, Clone)]
pub struct MockEngine {
    name: String,
    settings: EngineSettings,
    scripts: BTreeMap<String, Vec<Utterance>>,
    failures: BTreeSet<String>,
    ready: bool,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a new mock engine with default settings
    pub fn new() -> Self {
        Self {
            name: defaults::DEFAULT_ENGINE.to_string(),
            settings: EngineSettings::default(),
            scripts: BTreeMap::new(),
            failures: BTreeSet::new(),
            ready: true,
        }
    }

    /// Return `utterances` for the source with id `source_id`
    pub fn with_script(mut self, source_id: &str, utterances: Vec<Utterance>) -> Self {
        self.scripts.insert(source_id.to_string(), utterances);
        self
    }

    /// Fail every transcription of the source with id `source_id`
    pub fn with_failure(mut self, source_id: &str) -> Self {
        self.failures.insert(source_id.to_string());
        self
    }

    /// Report the engine as not ready
    pub fn unavailable(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn engine_error(&self, message: String) -> ConvoscribeError {
        ConvoscribeError::Engine {
            engine: self.name.clone(),
            message,
        }
    }
}

impl Engine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, settings: &EngineSettings) -> Result<()> {
        if settings.language.trim().is_empty() {
            return Err(ConvoscribeError::ConfigInvalidValue {
                key: "engine.language".to_string(),
                message: "language cannot be empty".to_string(),
            });
        }
        self.settings = settings.clone();
        Ok(())
    }

    fn transcribe(&self, source: &Source) -> Result<Vec<Utterance>> {
        if !self.ready {
            return Err(self.engine_error("engine is not ready".to_string()));
        }
        if self.failures.contains(&source.id) {
            return Err(self.engine_error(format!("scripted failure for '{}'", source.id)));
        }
        if let Some(script) = self.scripts.get(&source.id) {
            return Ok(script.clone());
        }
        let text = fs::read_to_string(&source.path).map_err(|e| {
            self.engine_error(format!("cannot read '{}': {e}", source.path.display()))
        })?;
        Ok(parse_transcript(&text))
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

/// Parses `speaker: text` lines into back-to-back utterances.
pub fn parse_transcript(text: &str) -> Vec<Utterance> {
    let mut cursor = 0u64;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (speaker, spoken) = match line.split_once(':') {
                Some((speaker, spoken))
                    if !speaker.trim().is_empty() && !speaker.contains(char::is_whitespace) =>
                {
                    (speaker.trim(), spoken.trim())
                }
                _ => ("speaker_0", line),
            };
            let words = spoken.split_whitespace().count().max(1) as u64;
            let start_ms = cursor;
            cursor += words * MOCK_MS_PER_WORD;
            Utterance::new(speaker, start_ms, cursor, spoken)
        })
        .collect()
}

/// Builds the engine registered under `name`.
pub fn create_engine(name: &str, settings: &EngineSettings) -> Result<Arc<dyn Engine>> {
    match name {
        defaults::DEFAULT_ENGINE => {
            let mut engine = MockEngine::new();
            engine.configure(settings)?;
            Ok(Arc::new(engine))
        }
        other => Err(ConvoscribeError::UnknownEngine {
            name: other.to_string(),
        }),
    }
}
