use crate::error::ChatError;

/// What a backend adapter sends over its channel while a turn is in flight.
///
/// `Delta` carries the *display text so far*, not just the new fragment:
/// the streaming backend re-sends its growing accumulation and the local
/// process backend re-sends its re-formatted buffer, so the consumer can
/// always replace the last assistant message wholesale (last-write-wins).
///
/// Every adapter terminates with exactly one `Done` or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEvent {
    Delta(String),
    Done { full_text: String },
    Failed(ChatError),
}
