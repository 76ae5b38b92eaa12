//! Builds a normalized turn request before dispatch.
//!
//! The composer never touches the history; it only validates input and
//! resolves audio to text via the transcription collaborator.

use providers::Transcriber;
use shared::error::ChatError;
use shared::history::ChatHistory;
use shared::request::{ImageAttachment, TurnRequest};
use std::path::Path;
use std::sync::Arc;

pub struct InputComposer {
    transcriber: Arc<dyn Transcriber>,
}

impl InputComposer {
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self { transcriber }
    }

    /// Empty text with no audio is rejected; an audio file replaces the text
    /// with its transcript. The image passes through untransformed - the
    /// adapters decide between inline encoding and upload-by-reference.
    pub async fn compose(
        &self,
        text: &str,
        image: Option<ImageAttachment>,
        audio_path: Option<&Path>,
    ) -> Result<TurnRequest, ChatError> {
        if text.trim().is_empty() && audio_path.is_none() {
            return Err(ChatError::EmptyInput);
        }

        let text = match audio_path {
            Some(path) => self.transcriber.transcribe(path).await?,
            None => text.to_string(),
        };

        Ok(TurnRequest { text, image })
    }
}

/// Folds a compose rejection into the history. The empty-input prompt stays
/// ephemeral; processing failures (transcription, upload) become notice
/// turns so they survive a later save. Returns whether a turn was appended.
pub fn record_input_failure(history: &mut ChatHistory, err: &ChatError) -> bool {
    match err {
        ChatError::EmptyInput => false,
        other => {
            history.push_notice(other.to_string());
            true
        }
    }
}

/// Merges uploaded document contents into the prompt for the local backend.
/// Two documents produce a comparison instruction, one gets inlined as-is.
pub fn merge_documents(text: &str, first: Option<&str>, second: Option<&str>) -> String {
    match (first, second) {
        (Some(first), Some(second)) => format!(
            "{text}\n\nVergleichen Sie die folgenden beiden Dokumente und antworten Sie \
             immer auf Deutsch:\n\nDokument 1:\n{first}\n\nDokument 2:\n{second}"
        ),
        (Some(content), None) | (None, Some(content)) => {
            format!("{text}\n\nInhalt des Dokuments:\n{content}")
        }
        (None, None) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubTranscriber {
        result: Result<String, ChatError>,
    }

    #[async_trait]
    impl Transcriber for StubTranscriber {
        async fn transcribe(&self, _path: &Path) -> Result<String, ChatError> {
            self.result.clone()
        }
    }

    fn composer(result: Result<String, ChatError>) -> InputComposer {
        InputComposer::new(Arc::new(StubTranscriber { result }))
    }

    #[tokio::test]
    async fn empty_input_without_audio_is_rejected() {
        let composer = composer(Ok("unbenutzt".into()));
        let err = composer.compose("   ", None, None).await.unwrap_err();
        assert_eq!(err, ChatError::EmptyInput);
    }

    #[tokio::test]
    async fn transcript_replaces_the_text() {
        let composer = composer(Ok("gesprochener text".into()));
        let request = composer
            .compose("", None, Some(Path::new("rede.wav")))
            .await
            .unwrap();
        assert_eq!(request.text, "gesprochener text");
    }

    #[tokio::test]
    async fn transcription_failure_propagates() {
        let composer = composer(Err(ChatError::Transcription("defekt".into())));
        let err = composer
            .compose("egal", None, Some(Path::new("rede.wav")))
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::Transcription("defekt".into()));
    }

    #[tokio::test]
    async fn image_passes_through_untouched() {
        let composer = composer(Ok("unbenutzt".into()));
        let image = ImageAttachment::new(vec![1, 2, 3]);
        let request = composer
            .compose("schau mal", Some(image.clone()), None)
            .await
            .unwrap();
        assert_eq!(request.image, Some(image));
    }

    #[tokio::test]
    async fn transcription_failure_lands_in_the_history() {
        let composer = composer(Err(ChatError::Transcription("kaputte datei".into())));
        let err = composer
            .compose("egal", None, Some(Path::new("rede.wav")))
            .await
            .unwrap_err();

        let mut history = ChatHistory::new();
        assert!(record_input_failure(&mut history, &err));
        let notice = history.last().unwrap();
        assert!(notice.is_notice());
        assert!(notice
            .assistant
            .as_deref()
            .unwrap()
            .contains("Fehler bei der Verarbeitung der Audiodatei: kaputte datei"));
    }

    #[test]
    fn empty_input_stays_out_of_the_history() {
        let mut history = ChatHistory::new();
        assert!(!record_input_failure(&mut history, &ChatError::EmptyInput));
        assert!(history.is_empty());
    }

    #[test]
    fn two_documents_form_a_comparison_prompt() {
        let merged = merge_documents("prüfe", Some("eins"), Some("zwei"));
        assert!(merged.contains("Dokument 1:\neins"));
        assert!(merged.contains("Dokument 2:\nzwei"));
    }

    #[test]
    fn single_document_is_inlined() {
        let merged = merge_documents("fasse zusammen", None, Some("inhalt"));
        assert!(merged.contains("Inhalt des Dokuments:\ninhalt"));
        assert_eq!(merge_documents("nur text", None, None), "nur text");
    }
}
