//! Streaming chat backend over the SSE chat-completion endpoint.

use async_trait::async_trait;
use base64::Engine as _;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::error::ChatError;
use shared::events::ChunkEvent;
use shared::history::ChatHistory;
use shared::request::TurnRequest;
use shared::settings::SseSettings;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::router::Backend;
use crate::sse::{SseParser, DONE_MARKER};

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

#[derive(Debug, Serialize)]
struct SseChatRequest<'a> {
    model: &'a str,
    messages: Vec<serde_json::Value>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

pub struct MistralClient {
    http: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl MistralClient {
    pub fn from_settings(settings: &SseSettings) -> Result<Self, ChatError> {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| env::var("MISTRAL_API_KEY").ok())
            .ok_or_else(|| ChatError::Request("MISTRAL_API_KEY ist nicht gesetzt".to_string()))?;
        Ok(Self {
            http: SHARED_HTTP.clone(),
            api_key,
            api_url: settings.api_url.clone(),
            model: settings.model.clone(),
        })
    }

    /// Flattens prior turns to role/content pairs and appends the new turn.
    /// With an image attached, the new turn's content becomes text plus an
    /// inline data-URI part.
    fn build_messages(history: &ChatHistory, request: &TurnRequest) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();
        for turn in history.turns() {
            if let Some(user) = &turn.user {
                messages.push(serde_json::json!({"role": "user", "content": user}));
            }
            if let Some(assistant) = &turn.assistant {
                messages.push(serde_json::json!({"role": "assistant", "content": assistant}));
            }
        }

        match &request.image {
            Some(image) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
                messages.push(serde_json::json!({
                    "role": "user",
                    "content": [
                        {"type": "text", "text": request.text},
                        {"type": "image_url", "image_url": format!("data:image/jpeg;base64,{encoded}")},
                    ],
                }));
            }
            None => messages.push(serde_json::json!({"role": "user", "content": request.text})),
        }
        messages
    }
}

/// Feeds one response buffer through the parser, accumulating delta content
/// and re-sending the growing text. Returns `true` once the terminator line
/// was seen. Malformed payloads are skipped, never fatal.
fn pump(
    parser: &mut SseParser,
    bytes: &[u8],
    full: &mut String,
    tx: &UnboundedSender<ChunkEvent>,
) -> bool {
    for payload in parser.feed(bytes) {
        if payload == DONE_MARKER {
            return true;
        }
        match serde_json::from_str::<StreamResponse>(&payload) {
            Ok(response) => {
                if let Some(content) = response
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.as_deref())
                {
                    if !content.is_empty() {
                        full.push_str(content);
                        let _ = tx.send(ChunkEvent::Delta(full.clone()));
                    }
                }
            }
            Err(err) => tracing::warn!(%err, %payload, "skipping malformed stream chunk"),
        }
    }
    false
}

/// Exactly one terminal event: a stream that produced no content is a failure.
fn finish(full: String, tx: &UnboundedSender<ChunkEvent>) {
    if full.is_empty() {
        let _ = tx.send(ChunkEvent::Failed(ChatError::NoResponse));
    } else {
        let _ = tx.send(ChunkEvent::Done { full_text: full });
    }
}

#[async_trait]
impl Backend for MistralClient {
    async fn stream(
        &self,
        history: ChatHistory,
        request: TurnRequest,
        tx: UnboundedSender<ChunkEvent>,
    ) {
        let body = SseChatRequest {
            model: &self.model,
            messages: Self::build_messages(&history, &request),
            temperature: 1.0,
            top_p: 0.95,
            max_tokens: 160_192,
            stream: true,
        };

        let response = match self
            .http
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let _ = tx.send(ChunkEvent::Failed(ChatError::Request(err.to_string())));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail: String = body.chars().take(800).collect();
            let message = if detail.trim().is_empty() {
                status.to_string()
            } else {
                format!("{status}: {detail}")
            };
            let _ = tx.send(ChunkEvent::Failed(ChatError::Request(message)));
            return;
        }

        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();
        let mut full = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(err) => {
                    let _ = tx.send(ChunkEvent::Failed(ChatError::Request(err.to_string())));
                    return;
                }
            };
            if pump(&mut parser, &bytes, &mut full, &tx) {
                break;
            }
        }

        finish(full, &tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::history::Turn;
    use shared::request::ImageAttachment;
    use tokio::sync::mpsc::unbounded_channel;

    fn run_chunks(chunks: &[&[u8]]) -> Vec<ChunkEvent> {
        let (tx, mut rx) = unbounded_channel();
        let mut parser = SseParser::new();
        let mut full = String::new();
        for chunk in chunks {
            if pump(&mut parser, chunk, &mut full, &tx) {
                break;
            }
        }
        finish(full, &tx);
        drop(tx);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn deltas_accumulate_and_complete() {
        let events = run_chunks(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n",
            b"data: [DONE]\n",
        ]);
        assert_eq!(
            events,
            vec![
                ChunkEvent::Delta("Hi".to_string()),
                ChunkEvent::Done {
                    full_text: "Hi".to_string()
                },
            ]
        );
    }

    #[test]
    fn fragments_concatenate_in_order() {
        let events = run_chunks(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hal\"}}]}\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\ndata: [DONE]\n",
        ]);
        assert_eq!(
            events.last(),
            Some(&ChunkEvent::Done {
                full_text: "Hallo".to_string()
            })
        );
        assert_eq!(events[1], ChunkEvent::Delta("Hallo".to_string()));
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let events = run_chunks(&[
            b"data: {nicht json}\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            b"data: [DONE]\n",
        ]);
        assert_eq!(
            events,
            vec![
                ChunkEvent::Delta("ok".to_string()),
                ChunkEvent::Done {
                    full_text: "ok".to_string()
                },
            ]
        );
    }

    #[test]
    fn empty_stream_fails_with_no_response() {
        let events = run_chunks(&[b"data: {nur}\ndata: {muell}\n", b"data: [DONE]\n"]);
        assert_eq!(events, vec![ChunkEvent::Failed(ChatError::NoResponse)]);
    }

    #[test]
    fn history_flattens_to_role_content_pairs() {
        let history: ChatHistory = [
            Turn {
                user: Some("frage".into()),
                assistant: Some("antwort".into()),
            },
            Turn {
                user: None,
                assistant: Some("notiz".into()),
            },
        ]
        .into_iter()
        .collect();
        let messages =
            MistralClient::build_messages(&history, &TurnRequest::text_only("weiter"));
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"], "notiz");
        assert_eq!(messages[3]["content"], "weiter");
    }

    #[test]
    fn image_becomes_inline_data_uri_parts() {
        let request = TurnRequest {
            text: "was ist das".to_string(),
            image: Some(ImageAttachment::new(vec![0xFF, 0xD8])),
        };
        let messages = MistralClient::build_messages(&ChatHistory::new(), &request);
        let content = &messages[0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert!(content[1]["image_url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }
}
