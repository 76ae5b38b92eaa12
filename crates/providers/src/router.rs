//! Backend selection: one interchangeable variant per delivery mechanism.

use async_trait::async_trait;
use shared::error::ChatError;
use shared::events::ChunkEvent;
use shared::history::ChatHistory;
use shared::request::TurnRequest;
use shared::settings::AppSettings;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::gemini::GeminiClient;
use crate::local::LocalClient;
use crate::mistral::MistralClient;

/// Streaming contract shared by all backends: zero or more cumulative
/// `Delta`s, then exactly one `Done` or `Failed`. `history` is the snapshot
/// of prior turns; the new turn travels in `request`.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn stream(
        &self,
        history: ChatHistory,
        request: TurnRequest,
        tx: UnboundedSender<ChunkEvent>,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// SSE streaming over HTTP.
    Sse,
    /// One blocking call, the reply arrives whole.
    SingleShot,
    /// Locally spawned model process.
    Local,
}

impl BackendKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sse" | "mistral" => Some(Self::Sse),
            "single" | "gemini" => Some(Self::SingleShot),
            "local" | "ollama" => Some(Self::Local),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sse => "sse",
            Self::SingleShot => "single",
            Self::Local => "local",
        }
    }
}

/// Maps a backend identifier to a ready client. Holds no backend-specific
/// logic beyond construction; the variants implement the contract themselves.
pub struct BackendRouter {
    settings: AppSettings,
}

impl BackendRouter {
    pub fn new(settings: AppSettings) -> Self {
        Self { settings }
    }

    /// Construction errors (e.g. a missing API key) surface here, before any
    /// request is dispatched.
    pub fn select(&self, kind: BackendKind) -> Result<Arc<dyn Backend>, ChatError> {
        match kind {
            BackendKind::Sse => Ok(Arc::new(MistralClient::from_settings(&self.settings.sse)?)),
            BackendKind::SingleShot => {
                Ok(Arc::new(GeminiClient::from_settings(&self.settings.single)?))
            }
            BackendKind::Local => {
                Ok(Arc::new(LocalClient::from_settings(&self.settings.local, None)))
            }
        }
    }
}
