/// Raw image bytes attached to a turn. Adapters decide how to ship them:
/// the streaming backend inlines a base64 data URI, the single-shot backend
/// uploads and references a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// A normalized per-turn request, built by the composer and handed to one
/// backend adapter. Ephemeral: constructed per dispatch, never persisted.
/// Audio input has already been resolved to text by the time this exists.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub text: String,
    pub image: Option<ImageAttachment>,
}

impl TurnRequest {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }
}
