pub mod composer;
pub mod orchestrator;
pub mod store;

pub use composer::{record_input_failure, InputComposer};
pub use orchestrator::{Orchestrator, TurnState};
pub use store::{format_saved_chat, ChatStore, SavedChat};
