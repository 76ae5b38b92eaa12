use thiserror::Error;

/// Everything that can go wrong during a chat turn or a store mutation.
///
/// Display strings double as the user-facing notice text appended to the
/// history, so they stay in the application's language.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Bitte geben Sie eine Nachricht ein oder laden Sie eine Audiodatei hoch.")]
    EmptyInput,

    #[error("Fehler bei der Verarbeitung der Audiodatei: {0}")]
    Transcription(String),

    /// Network-layer failure: connect error, non-2xx status, broken stream.
    #[error("Fehler bei der Verarbeitung der Anfrage: {0}")]
    Request(String),

    /// The stream terminated without producing any content.
    #[error("Keine Antwort vom Modell erhalten.")]
    NoResponse,

    #[error("Fehler beim Ausführen des Modellprozesses: {0}")]
    Process(String),

    #[error("Fehler beim Hochladen des Bildes: {0}")]
    Upload(String),

    #[error("Unbekannter Fehler: {0}. Bitte versuchen Sie es nochmal.")]
    Unknown(String),

    /// Store write failures are the one category that must reach the caller;
    /// a silently lost save is worse than a visible error.
    #[error("Fehler beim Speichern der Chats: {0}")]
    Persistence(String),
}
