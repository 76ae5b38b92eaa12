//! Drives one backend turn against the active history.
//!
//! The orchestrator is the only mutator of a `ChatHistory`: it appends the
//! user turn before any backend I/O, folds streamed deltas into the last
//! turn, and converts failures into visible notice turns. One turn runs at
//! a time per history; retry is a new user action.

use providers::{Backend, BackendKind, BackendRouter};
use shared::error::ChatError;
use shared::events::ChunkEvent;
use shared::history::ChatHistory;
use shared::request::TurnRequest;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle of a single dispatched turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingInput,
    Dispatched,
    Streaming,
    Completed,
    Failed,
}

pub struct Orchestrator {
    router: BackendRouter,
}

impl Orchestrator {
    pub fn new(router: BackendRouter) -> Self {
        Self { router }
    }

    /// Runs one turn to its terminal state. `on_update` fires after every
    /// history mutation so the caller can re-render between deltas.
    pub async fn run_turn(
        &self,
        kind: BackendKind,
        history: &mut ChatHistory,
        request: TurnRequest,
        on_update: impl FnMut(&ChatHistory),
    ) -> TurnState {
        match self.router.select(kind) {
            Ok(backend) => self.run_turn_with(backend, history, request, on_update).await,
            Err(err) => {
                let mut on_update = on_update;
                history.push_user(request.text);
                on_update(history);
                history.push_notice(err.to_string());
                on_update(history);
                TurnState::Failed
            }
        }
    }

    /// Same as `run_turn` with an explicit backend, the seam the tests use.
    pub async fn run_turn_with(
        &self,
        backend: Arc<dyn Backend>,
        history: &mut ChatHistory,
        request: TurnRequest,
        mut on_update: impl FnMut(&ChatHistory),
    ) -> TurnState {
        // Snapshot of prior turns for the backend; the new turn travels in
        // the request itself.
        let snapshot = history.clone();

        // The user turn becomes visible before any backend I/O starts.
        history.push_user(request.text.clone());
        on_update(history);

        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            backend.stream(snapshot, request, tx).await;
        });

        let mut state = TurnState::Dispatched;
        while let Some(event) = rx.recv().await {
            match event {
                ChunkEvent::Delta(text) => {
                    state = TurnState::Streaming;
                    history.set_last_assistant(text);
                    on_update(history);
                }
                ChunkEvent::Done { full_text } => {
                    history.set_last_assistant(full_text);
                    on_update(history);
                    state = TurnState::Completed;
                }
                ChunkEvent::Failed(err) => {
                    tracing::warn!(%err, "backend turn failed");
                    // A new notice turn; the user's question stays visible.
                    history.push_notice(err.to_string());
                    on_update(history);
                    state = TurnState::Failed;
                }
            }
        }

        // Channel closed without a terminal event: treat as a failure rather
        // than leaving the turn dangling.
        if matches!(state, TurnState::Dispatched | TurnState::Streaming) {
            history.push_notice(ChatError::NoResponse.to_string());
            on_update(history);
            state = TurnState::Failed;
        }

        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shared::settings::AppSettings;
    use std::sync::Mutex;
    use tokio::sync::mpsc::UnboundedSender;

    /// Replays a fixed event script, recording the history it was handed.
    struct ScriptedBackend {
        events: Vec<ChunkEvent>,
        seen_history: Mutex<Option<ChatHistory>>,
    }

    impl ScriptedBackend {
        fn new(events: Vec<ChunkEvent>) -> Arc<Self> {
            Arc::new(Self {
                events,
                seen_history: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn stream(
            &self,
            history: ChatHistory,
            _request: TurnRequest,
            tx: UnboundedSender<ChunkEvent>,
        ) {
            *self.seen_history.lock().unwrap() = Some(history);
            for event in self.events.clone() {
                let _ = tx.send(event);
            }
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(BackendRouter::new(AppSettings::default()))
    }

    #[tokio::test]
    async fn user_turn_is_visible_before_any_backend_response() {
        let backend = ScriptedBackend::new(vec![ChunkEvent::Done {
            full_text: "antwort".into(),
        }]);
        let mut history = ChatHistory::new();
        let mut snapshots: Vec<ChatHistory> = Vec::new();

        orchestrator()
            .run_turn_with(
                backend,
                &mut history,
                TurnRequest::text_only("hello"),
                |h| snapshots.push(h.clone()),
            )
            .await;

        let first = snapshots.first().unwrap().last().unwrap();
        assert_eq!(first.user.as_deref(), Some("hello"));
        assert_eq!(first.assistant, None);
    }

    #[tokio::test]
    async fn deltas_rewrite_the_last_turn_in_place() {
        let backend = ScriptedBackend::new(vec![
            ChunkEvent::Delta("Ant".into()),
            ChunkEvent::Delta("Antwort".into()),
            ChunkEvent::Done {
                full_text: "Antwort".into(),
            },
        ]);
        let mut history = ChatHistory::new();

        let state = orchestrator()
            .run_turn_with(
                backend,
                &mut history,
                TurnRequest::text_only("frage"),
                |_| {},
            )
            .await;

        assert_eq!(state, TurnState::Completed);
        assert_eq!(history.len(), 1);
        let turn = history.last().unwrap();
        assert_eq!(turn.user.as_deref(), Some("frage"));
        assert_eq!(turn.assistant.as_deref(), Some("Antwort"));
    }

    #[tokio::test]
    async fn failure_appends_a_notice_and_keeps_the_user_turn() {
        let backend = ScriptedBackend::new(vec![ChunkEvent::Failed(ChatError::Request(
            "verbindung getrennt".into(),
        ))]);
        let mut history = ChatHistory::new();

        let state = orchestrator()
            .run_turn_with(
                backend,
                &mut history,
                TurnRequest::text_only("frage"),
                |_| {},
            )
            .await;

        assert_eq!(state, TurnState::Failed);
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].user.as_deref(), Some("frage"));
        assert_eq!(history.turns()[0].assistant, None);
        let notice = &history.turns()[1];
        assert_eq!(notice.user, None);
        assert!(notice.assistant.as_deref().unwrap().contains("verbindung"));
    }

    #[tokio::test]
    async fn backend_sees_the_snapshot_without_the_new_turn() {
        let backend = ScriptedBackend::new(vec![ChunkEvent::Done {
            full_text: "x".into(),
        }]);
        let mut history = ChatHistory::new();
        history.push_user("alte frage");
        history.set_last_assistant("alte antwort");

        orchestrator()
            .run_turn_with(
                backend.clone(),
                &mut history,
                TurnRequest::text_only("neue frage"),
                |_| {},
            )
            .await;

        let seen = backend.seen_history.lock().unwrap().clone().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen.turns()[0].user.as_deref(), Some("alte frage"));
    }

    #[tokio::test]
    async fn dropped_channel_without_terminal_event_fails_the_turn() {
        let backend = ScriptedBackend::new(vec![ChunkEvent::Delta("anfang".into())]);
        let mut history = ChatHistory::new();

        let state = orchestrator()
            .run_turn_with(
                backend,
                &mut history,
                TurnRequest::text_only("frage"),
                |_| {},
            )
            .await;

        assert_eq!(state, TurnState::Failed);
        assert!(history.last().unwrap().is_notice());
    }
}
