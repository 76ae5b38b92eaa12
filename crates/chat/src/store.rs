//! Named, timestamped conversation snapshots persisted as one JSON file.
//!
//! Every mutation rewrites the whole document (write to a temp file, then
//! rename), so a reader never observes a partial store. The read path is
//! best-effort: a malformed file yields an empty store. The write path is
//! strict: failures surface as `ChatError::Persistence`.

use chrono::Local;
use serde::{Deserialize, Serialize};
use shared::error::ChatError;
use shared::history::ChatHistory;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "Neuer Chat";

/// A saved conversation. Immutable once created, apart from full deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedChat {
    /// Stable identity. The formatted label is display-only; it stays usable
    /// as a lookup key for compatibility, but two chats saved in the same
    /// second share a label while their ids stay distinct.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    pub date: String,
    pub chat: ChatHistory,
}

/// Display form, `"{title} ({date})"`. Also accepted as a lookup key by
/// `load` and `delete`.
pub fn format_saved_chat(chat: &SavedChat) -> String {
    format!("{} ({})", chat.title, chat.date)
}

pub struct ChatStore {
    save_dir: PathBuf,
    save_file: PathBuf,
    chats: Vec<SavedChat>,
}

impl ChatStore {
    /// Opens the store, reading any existing file. Read failures are logged
    /// and start an empty store rather than blocking the application.
    pub fn open(save_dir: impl Into<PathBuf>, save_file: impl Into<PathBuf>) -> Self {
        let save_file = save_file.into();
        let chats = Self::load_from_file(&save_file);
        Self {
            save_dir: save_dir.into(),
            save_file,
            chats,
        }
    }

    pub fn chats(&self) -> &[SavedChat] {
        &self.chats
    }

    /// First two user messages, space-joined, truncated to 50 chars with a
    /// trailing ellipsis. Histories without user messages get the default.
    pub fn generate_title(history: &ChatHistory) -> String {
        let first_messages: Vec<&str> = history.user_messages().take(2).collect();
        if first_messages.is_empty() {
            return DEFAULT_TITLE.to_string();
        }
        let title = first_messages.join(" ");
        if title.chars().count() > 50 {
            let truncated: String = title.chars().take(50).collect();
            format!("{truncated}...")
        } else {
            title
        }
    }

    /// Appends a snapshot of `history` and persists. Saving an empty history
    /// is a no-op. Returns the new entry's id.
    pub fn save(&mut self, history: &ChatHistory) -> Result<Option<Uuid>, ChatError> {
        if history.is_empty() {
            return Ok(None);
        }

        let entry = SavedChat {
            id: Uuid::new_v4(),
            title: Self::generate_title(history),
            date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            chat: history.clone(),
        };
        let id = entry.id;
        tracing::info!(title = %entry.title, "saving chat");
        self.chats.push(entry);
        self.persist()?;
        Ok(Some(id))
    }

    /// Linear search by formatted label. A miss hands back the current
    /// history unchanged and no title - "not found" is not an error.
    pub fn load(&self, label: &str, current: &ChatHistory) -> (ChatHistory, Option<String>) {
        match self.chats.iter().find(|c| format_saved_chat(c) == label) {
            Some(found) => {
                tracing::info!(label, "loaded chat");
                (found.chat.clone(), Some(label.to_string()))
            }
            None => (current.clone(), None),
        }
    }

    pub fn load_by_id(&self, id: Uuid) -> Option<&SavedChat> {
        self.chats.iter().find(|c| c.id == id)
    }

    /// Removes *all* entries matching the label (labels can collide) and
    /// persists.
    pub fn delete(&mut self, label: &str) -> Result<(), ChatError> {
        self.chats.retain(|c| format_saved_chat(c) != label);
        self.persist()?;
        tracing::info!(label, "deleted chat");
        Ok(())
    }

    pub fn delete_by_id(&mut self, id: Uuid) -> Result<(), ChatError> {
        self.chats.retain(|c| c.id != id);
        self.persist()
    }

    pub fn delete_all(&mut self) -> Result<(), ChatError> {
        self.chats.clear();
        self.persist()?;
        tracing::info!("deleted all chats");
        Ok(())
    }

    fn persist(&self) -> Result<(), ChatError> {
        fs::create_dir_all(&self.save_dir)
            .map_err(|err| ChatError::Persistence(err.to_string()))?;
        let json = serde_json::to_string_pretty(&self.chats)
            .map_err(|err| ChatError::Persistence(err.to_string()))?;

        // Temp file plus rename keeps the on-disk document complete at all times.
        let tmp = self.save_file.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|err| ChatError::Persistence(err.to_string()))?;
        fs::rename(&tmp, &self.save_file)
            .map_err(|err| ChatError::Persistence(err.to_string()))?;
        Ok(())
    }

    fn load_from_file(path: &Path) -> Vec<SavedChat> {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(chats) => chats,
                Err(err) => {
                    tracing::error!(%err, "malformed chat store, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }
}
