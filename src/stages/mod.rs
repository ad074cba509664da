//! Stages of a transcription job and the pipeline logic that runs them.

pub mod analysis;
pub mod format;
pub mod logic;
pub mod transcription;
pub mod types;

pub use analysis::{AnalysisStage, PluginOptions};
pub use format::FormatStage;
pub use logic::{Stage, StageKind, TranscriptionLogic};
pub use transcription::TranscriptionStage;
pub use types::{Conversation, Source, StageFailure, Utterance};
