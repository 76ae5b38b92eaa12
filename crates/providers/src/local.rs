//! Locally spawned model process, streamed line by line.
//!
//! The prompt goes to the child's stdin which is then closed (one-shot, no
//! interactive protocol). Every stdout line is sanitized and appended to an
//! accumulating buffer; each delta re-sends the re-formatted buffer so the
//! consumer sees the reply grow in place. The child is waited on in every
//! exit path.

use async_trait::async_trait;
use shared::error::ChatError;
use shared::events::ChunkEvent;
use shared::history::ChatHistory;
use shared::request::TurnRequest;
use shared::settings::LocalSettings;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

use crate::router::Backend;
use crate::sanitize::{format_output, sanitize};

pub struct LocalClient {
    program: String,
    model: String,
}

impl LocalClient {
    pub fn from_settings(settings: &LocalSettings, model: Option<&str>) -> Self {
        let model = model
            .filter(|m| settings.models.iter().any(|known| known.as_str() == *m))
            .unwrap_or(&settings.default_model)
            .to_string();
        Self {
            program: settings.program.clone(),
            model,
        }
    }

    pub fn new(program: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Backend for LocalClient {
    async fn stream(
        &self,
        _history: ChatHistory,
        request: TurnRequest,
        tx: UnboundedSender<ChunkEvent>,
    ) {
        let mut child = match Command::new(&self.program)
            .arg("run")
            .arg(&self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                let _ = tx.send(ChunkEvent::Failed(ChatError::Process(err.to_string())));
                return;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = format!("{}\n", request.text);
            if let Err(err) = stdin.write_all(prompt.as_bytes()).await {
                tracing::warn!(%err, "failed to write prompt to model process");
            }
            // Dropping stdin closes the pipe; the one-shot prompt is complete.
        }

        // Drain stderr concurrently so a chatty child cannot block on a full pipe.
        let stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut captured = String::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_string(&mut captured).await;
            }
            captured
        });

        let mut buffer = String::new();
        let mut read_error = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let clean = sanitize(&line);
                        if !clean.is_empty() {
                            buffer.push_str(&clean);
                            buffer.push('\n');
                            let _ = tx.send(ChunkEvent::Delta(format_output(&buffer)));
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        read_error = Some(err);
                        let _ = child.kill().await;
                        break;
                    }
                }
            }
        }

        let stderr_text = stderr_task.await.unwrap_or_default();
        let status = match child.wait().await {
            Ok(status) => status,
            Err(err) => {
                let _ = tx.send(ChunkEvent::Failed(ChatError::Process(err.to_string())));
                return;
            }
        };

        if let Some(err) = read_error {
            let _ = tx.send(ChunkEvent::Failed(ChatError::Process(err.to_string())));
            return;
        }

        if !status.success() {
            let detail = sanitize(&stderr_text);
            let detail = detail.trim();
            let message = if detail.is_empty() {
                status.to_string()
            } else {
                format!("{status}: {detail}")
            };
            let _ = tx.send(ChunkEvent::Failed(ChatError::Process(message)));
            return;
        }

        let _ = tx.send(ChunkEvent::Done {
            full_text: format_output(&buffer),
        });
    }
}
