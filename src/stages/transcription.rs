use crate::stages::types::Conversation;
use crate::stt::Engine;
use anyhow::bail;
use std::sync::Arc;

/// Speech-to-text stage: fills a conversation's utterances from its source.
#[derive(Clone)]
pub struct TranscriptionStage {
    engine: Arc<dyn Engine>,
}

impl TranscriptionStage {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Transcribes the conversation's source, replacing any earlier utterances.
    pub fn generate_utterances(&self, conversation: &mut Conversation) -> anyhow::Result<()> {
        if !self.engine.is_ready() {
            bail!("engine '{}' is not ready", self.engine_name());
        }
        let mut utterances = self.engine.transcribe(&conversation.source)?;
        utterances.sort_by_key(|u| u.start_ms);
        tracing::debug!(
            source = %conversation.id(),
            engine = %self.engine_name(),
            utterances = utterances.len(),
            "transcribed source"
        );
        conversation.utterances = utterances;
        Ok(())
    }
}
