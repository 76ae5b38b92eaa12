pub mod gemini;
pub mod local;
pub mod mistral;
pub mod router;
pub mod sanitize;
pub mod sse;
pub mod transcribe;

pub use router::{Backend, BackendKind, BackendRouter};
pub use transcribe::{CliTranscriber, Transcriber};
