//! Speech-to-text collaborator. The core never decodes audio itself.

use async_trait::async_trait;
use shared::error::ChatError;
use std::path::Path;
use tokio::process::Command;

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, path: &Path) -> Result<String, ChatError>;
}

/// Shells out to a whisper-style CLI that prints the transcript on stdout.
/// `output()` collects both pipes and waits, so no child is left behind.
pub struct CliTranscriber {
    program: String,
}

impl CliTranscriber {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Transcriber for CliTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<String, ChatError> {
        if !path.exists() {
            return Err(ChatError::Transcription(format!(
                "Datei nicht gefunden: {}",
                path.display()
            )));
        }

        let output = Command::new(&self.program)
            .arg(path)
            .output()
            .await
            .map_err(|err| ChatError::Transcription(err.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChatError::Transcription(format!(
                "{}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(ChatError::Transcription("leere Transkription".to_string()));
        }
        tracing::info!(path = %path.display(), "audio transcribed");
        Ok(text)
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn fake_cli(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("fake-whisper.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn missing_file_fails_before_spawning() {
        let transcriber = CliTranscriber::new("unbenutzt");
        let err = transcriber
            .transcribe(Path::new("/nonexistent/audio.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Transcription(_)));
    }

    #[tokio::test]
    async fn stdout_becomes_the_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_cli(dir.path(), "echo 'hallo welt'");
        let audio = dir.path().join("audio.wav");
        std::fs::write(&audio, b"riff").unwrap();

        let transcriber = CliTranscriber::new(cli.to_str().unwrap());
        assert_eq!(transcriber.transcribe(&audio).await.unwrap(), "hallo welt");
    }

    #[tokio::test]
    async fn cli_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_cli(dir.path(), "echo 'kein modell' >&2\nexit 1");
        let audio = dir.path().join("audio.wav");
        std::fs::write(&audio, b"riff").unwrap();

        let transcriber = CliTranscriber::new(cli.to_str().unwrap());
        match transcriber.transcribe(&audio).await {
            Err(ChatError::Transcription(message)) => assert!(message.contains("kein modell")),
            other => panic!("expected Transcription error, got {other:?}"),
        }
    }
}
