//! Single-shot backend: one blocking call, the whole reply arrives at once.
//!
//! Images are not inlined here; they are uploaded to the media endpoint
//! first and referenced by the returned URI.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::error::ChatError;
use shared::events::ChunkEvent;
use shared::history::ChatHistory;
use shared::request::{ImageAttachment, TurnRequest};
use shared::settings::SingleShotSettings;
use std::env;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::router::Backend;
use crate::sanitize::sanitize;

const API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    File { file_data: GeminiFileData },
}

#[derive(Debug, Serialize)]
struct GeminiFileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    uri: String,
}

pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn from_settings(settings: &SingleShotSettings) -> Result<Self, ChatError> {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| ChatError::Request("GEMINI_API_KEY ist nicht gesetzt".to_string()))?;
        Ok(Self {
            http: Client::builder()
                .timeout(Duration::from_secs(45))
                .build()
                .map_err(|err| ChatError::Unknown(err.to_string()))?,
            api_key,
            model: settings.model.clone(),
        })
    }

    /// Pushes raw JPEG bytes to the media endpoint and returns the handle URI.
    async fn upload_image(&self, image: &ImageAttachment) -> Result<String, ChatError> {
        let url = format!("{API_BASE}/upload/v1beta/files?key={}", self.api_key);
        let response = self
            .http
            .post(url)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", "image/jpeg")
            .body(image.bytes.clone())
            .send()
            .await
            .map_err(|err| ChatError::Upload(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::Upload(response.status().to_string()));
        }
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|err| ChatError::Upload(err.to_string()))?;
        tracing::info!(uri = %body.file.uri, "image uploaded");
        Ok(body.file.uri)
    }

    async fn generate(&self, contents: Vec<GeminiContent>) -> Result<String, ChatError> {
        let url = format!(
            "{API_BASE}/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let response = self
            .http
            .post(url)
            .json(&GeminiRequest { contents })
            .send()
            .await
            .map_err(|err| ChatError::Unknown(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail: String = body.chars().take(800).collect();
            let message = if detail.trim().is_empty() {
                status.to_string()
            } else {
                format!("{status}: {detail}")
            };
            return Err(ChatError::Unknown(message));
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|err| ChatError::Unknown(err.to_string()))?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default();
        Ok(text)
    }

    fn build_contents(
        history: &ChatHistory,
        text: &str,
        image_uri: Option<String>,
    ) -> Vec<GeminiContent> {
        let mut contents = Vec::new();
        for turn in history.turns() {
            if let Some(user) = &turn.user {
                contents.push(GeminiContent {
                    role: "user".to_string(),
                    parts: vec![GeminiPart::Text { text: user.clone() }],
                });
            }
            if let Some(assistant) = &turn.assistant {
                // Backend expects "model" where the history says "assistant".
                contents.push(GeminiContent {
                    role: "model".to_string(),
                    parts: vec![GeminiPart::Text {
                        text: assistant.clone(),
                    }],
                });
            }
        }

        let mut parts = vec![GeminiPart::Text {
            text: text.to_string(),
        }];
        if let Some(uri) = image_uri {
            parts.push(GeminiPart::File {
                file_data: GeminiFileData {
                    mime_type: "image/jpeg".to_string(),
                    file_uri: uri,
                },
            });
        }
        contents.push(GeminiContent {
            role: "user".to_string(),
            parts,
        });
        contents
    }

    /// One-shot image description, appended by the caller as a notice turn.
    pub async fn describe_image(
        &self,
        image: &ImageAttachment,
        user_input: &str,
    ) -> Result<String, ChatError> {
        let uri = self.upload_image(image).await?;
        let prompt = format!(
            "{user_input} Beschreiben Sie das Bild mit einer kreativen Beschreibung. \
             Bitte auf Deutsch antworten."
        );
        let contents = Self::build_contents(&ChatHistory::new(), &prompt, Some(uri));
        self.generate(contents).await.map(|text| sanitize(&text))
    }

    /// One-shot two-image comparison.
    pub async fn compare_images(
        &self,
        first: &ImageAttachment,
        second: &ImageAttachment,
    ) -> Result<String, ChatError> {
        let first_uri = self.upload_image(first).await?;
        let second_uri = self.upload_image(second).await?;

        let mut parts = vec![GeminiPart::Text {
            text: "Was sind die Unterschiede zwischen den beiden Bildern? \
                   Bitte auf Deutsch antworten."
                .to_string(),
        }];
        for uri in [first_uri, second_uri] {
            parts.push(GeminiPart::File {
                file_data: GeminiFileData {
                    mime_type: "image/jpeg".to_string(),
                    file_uri: uri,
                },
            });
        }
        let contents = vec![GeminiContent {
            role: "user".to_string(),
            parts,
        }];
        self.generate(contents).await.map(|text| sanitize(&text))
    }
}

#[async_trait]
impl Backend for GeminiClient {
    async fn stream(
        &self,
        history: ChatHistory,
        request: TurnRequest,
        tx: UnboundedSender<ChunkEvent>,
    ) {
        let image_uri = match &request.image {
            Some(image) => match self.upload_image(image).await {
                Ok(uri) => Some(uri),
                Err(err) => {
                    let _ = tx.send(ChunkEvent::Failed(err));
                    return;
                }
            },
            None => None,
        };

        let contents = Self::build_contents(&history, &request.text, image_uri);
        match self.generate(contents).await {
            Ok(text) => {
                let clean = sanitize(&text);
                if clean.is_empty() {
                    let _ = tx.send(ChunkEvent::Failed(ChatError::NoResponse));
                } else {
                    let _ = tx.send(ChunkEvent::Delta(clean.clone()));
                    let _ = tx.send(ChunkEvent::Done { full_text: clean });
                }
            }
            Err(err) => {
                let _ = tx.send(ChunkEvent::Failed(err));
            }
        }
    }
}
