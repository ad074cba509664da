//! Pipeline logic for the transcription job.
//!
//! Each stage reads the stream published by the stage before it, fans its
//! conversations out over the logic's worker pool and publishes every
//! conversation again, keyed by source id. A conversation that fails in a
//! stage carries a [`StageFailure`](crate::stages::types::StageFailure) from
//! then on and is passed through untouched by later stages.

use crate::defaults::{ANALYSIS_COMPONENT, BASE_STREAM, FORMAT_COMPONENT, TRANSCRIPTION_COMPONENT};
use crate::pipeline::{ErrorReporter, LogReporter, Logic, Payloads, Streams};
use crate::pool::{TaskError, WorkerPool};
use crate::stages::analysis::AnalysisStage;
use crate::stages::format::FormatStage;
use crate::stages::transcription::TranscriptionStage;
use crate::stages::types::Conversation;
use anyhow::{Context, bail};
use std::fmt;
use std::sync::Arc;

/// The stages a transcription job pipeline supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Transcription,
    Analysis,
    Format,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [
        StageKind::Transcription,
        StageKind::Analysis,
        StageKind::Format,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Component name of this stage.
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Transcription => TRANSCRIPTION_COMPONENT,
            StageKind::Analysis => ANALYSIS_COMPONENT,
            StageKind::Format => FORMAT_COMPONENT,
        }
    }

    /// Stream this stage takes its conversations from.
    pub fn upstream(self) -> &'static str {
        match self {
            StageKind::Transcription => BASE_STREAM,
            StageKind::Analysis => TRANSCRIPTION_COMPONENT,
            StageKind::Format => ANALYSIS_COMPONENT,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stage object wrapped by a pipeline component.
#[derive(Clone)]
pub enum Stage {
    Transcription(TranscriptionStage),
    Analysis(AnalysisStage),
    Format(FormatStage),
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Transcription(_) => StageKind::Transcription,
            Stage::Analysis(_) => StageKind::Analysis,
            Stage::Format(_) => StageKind::Format,
        }
    }

    /// Runs this stage against one conversation.
    pub fn run(&self, conversation: &mut Conversation) -> anyhow::Result<()> {
        match self {
            Stage::Transcription(stage) => stage.generate_utterances(conversation),
            Stage::Analysis(stage) => stage.apply_plugins(conversation),
            Stage::Format(stage) => stage.output(conversation).map(|_| ()),
        }
    }
}

/// [`Logic`] for the `transcription -> analysis -> format` job.
pub struct TranscriptionLogic {
    pool: WorkerPool<usize>,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl TranscriptionLogic {
    /// Creates the logic with a pool of `workers` threads (at least one).
    pub fn new(workers: usize) -> Self {
        let pool = WorkerPool::new(workers).with_task_error_handler(|slot: &usize, error| {
            tracing::warn!(slot, %error, "conversation task failed");
        });
        Self {
            pool,
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets the reporter told about every conversation that fails in a stage.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }
}

impl Logic for TranscriptionLogic {
    type Kind = StageKind;
    type Object = Stage;
    type Payload = Conversation;
    type Input = Vec<Conversation>;
    type Output = Vec<Conversation>;

    fn component_kind(&self, name: &str) -> Option<StageKind> {
        StageKind::from_name(name)
    }

    fn preprocess(
        &self,
        kind: StageKind,
        streams: &Streams<Conversation>,
    ) -> anyhow::Result<Vec<Conversation>> {
        let stream = streams
            .get(kind.upstream())
            .with_context(|| format!("stream '{}' has not been published", kind.upstream()))?;
        Ok(stream.payloads().values().cloned().collect())
    }

    fn process(
        &self,
        kind: StageKind,
        stage: &Stage,
        input: Vec<Conversation>,
    ) -> anyhow::Result<Vec<Conversation>> {
        if stage.kind() != kind {
            bail!("component '{kind}' wraps a '{}' stage", stage.kind());
        }

        let (pending, carried): (Vec<_>, Vec<_>) =
            input.into_iter().partition(|c| !c.has_failed());
        if pending.is_empty() {
            return Ok(carried);
        }

        let originals = pending.clone();
        let task_stage = stage.clone();
        let results = self.pool.map_slots(pending, move |mut conversation: Conversation| {
            let outcome = task_stage.run(&mut conversation);
            Ok((conversation, outcome.map_err(|e| format!("{e:#}"))))
        })?;

        let mut processed = Vec::with_capacity(originals.len() + carried.len());
        let mut failed = 0;
        for (mut original, result) in originals.into_iter().zip(results) {
            let message = match result {
                Ok((conversation, Ok(()))) => {
                    processed.push(conversation);
                    continue;
                }
                Ok((_, Err(message))) => message,
                Err(TaskError::Failed(message)) | Err(TaskError::Panicked(message)) => message,
            };
            failed += 1;
            self.error_reporter
                .report(&format!("{kind}/{}", original.id()), &message);
            original.record_failure(kind.name(), message);
            processed.push(original);
        }

        if failed == processed.len() {
            bail!("all {failed} conversations failed");
        }
        if failed > 0 {
            tracing::warn!(stage = %kind, failed, "some conversations failed");
        }
        processed.extend(carried);
        Ok(processed)
    }

    fn postprocess(
        &self,
        _kind: StageKind,
        output: Vec<Conversation>,
    ) -> anyhow::Result<Payloads<Conversation>> {
        Ok(output
            .into_iter()
            .map(|conversation| (conversation.id().to_string(), conversation))
            .collect())
    }
}
