use crate::defaults::TRANSCRIPT_EXTENSION;
use crate::error::ConvoscribeError;
use crate::stages::types::Conversation;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Output stage: writes one JSON document per conversation.
#[derive(Debug, Clone)]
pub struct FormatStage {
    directory: Arc<PathBuf>,
    pretty: bool,
}

impl FormatStage {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Arc::new(directory.into()),
            pretty: true,
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path the conversation with id `source_id` is written to.
    pub fn output_path(&self, source_id: &str) -> PathBuf {
        let file_name: String = source_id
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.directory
            .join(format!("{file_name}.{TRANSCRIPT_EXTENSION}"))
    }

    /// Writes the conversation and records where it went.
    pub fn output(&self, conversation: &mut Conversation) -> anyhow::Result<PathBuf> {
        let source_id = conversation.id().to_string();
        let path = self.output_path(&source_id);
        let output_error = |message: String| ConvoscribeError::Output {
            source_id: source_id.clone(),
            message,
        };

        fs::create_dir_all(self.directory.as_path()).map_err(|e| {
            output_error(format!("cannot create '{}': {e}", self.directory.display()))
        })?;
        conversation.output_path = Some(path.clone());
        let document = if self.pretty {
            serde_json::to_string_pretty(&*conversation)?
        } else {
            serde_json::to_string(&*conversation)?
        };
        fs::write(&path, document)
            .map_err(|e| output_error(format!("cannot write '{}': {e}", path.display())))?;

        tracing::debug!(source = %source_id, path = %path.display(), "wrote transcript");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::types::{Source, Utterance};

    #[test]
    fn test_output_writes_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let stage = FormatStage::new(dir.path().join("out"));
        let mut conversation = Conversation::new(Source::new("call-1", "call-1.wav"));
        conversation.utterances = vec![Utterance::new("alice", 0, 400, "hi")];

        let path = stage.output(&mut conversation).unwrap();

        assert_eq!(path, dir.path().join("out").join("call-1.json"));
        assert_eq!(conversation.output_path.as_ref(), Some(&path));
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["source"]["id"], "call-1");
        assert_eq!(written["utterances"][0]["text"], "hi");
        assert_eq!(written["output_path"].as_str(), path.to_str());
    }

    #[test]
    fn test_output_path_sanitizes_ids() {
        let stage = FormatStage::new("/tmp/out");
        assert_eq!(
            stage.output_path("team/sync 01"),
            PathBuf::from("/tmp/out/team_sync_01.json")
        );
    }

    #[test]
    fn test_compact_output() {
        let dir = tempfile::tempdir().unwrap();
        let stage = FormatStage::new(dir.path()).with_pretty(false);
        let mut conversation = Conversation::new(Source::new("c1", "c1.wav"));

        let path = stage.output(&mut conversation).unwrap();

        let contents = fs::read_to_string(path).unwrap();
        assert!(!contents.contains('\n'));
    }

    #[test]
    fn test_unwritable_directory_is_an_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();
        let stage = FormatStage::new(blocker.join("nested"));
        let mut conversation = Conversation::new(Source::new("c1", "c1.wav"));

        let error = stage.output(&mut conversation).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ConvoscribeError>(),
            Some(ConvoscribeError::Output { .. })
        ));
    }
}
