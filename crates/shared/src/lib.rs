pub mod error;
pub mod events;
pub mod history;
pub mod request;

pub mod settings {
    use serde::{Deserialize, Serialize};

    /// Streaming chat-completion backend (SSE over HTTP).
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SseSettings {
        pub model: String,
        pub api_url: String,
        /// Falls back to the `MISTRAL_API_KEY` environment variable when unset.
        pub api_key: Option<String>,
    }

    impl Default for SseSettings {
        fn default() -> Self {
            Self {
                model: "mistral-large-latest".to_string(),
                api_url: "https://api.mistral.ai/v1/chat/completions".to_string(),
                api_key: None,
            }
        }
    }

    /// Single-shot backend (one blocking call, whole reply at once).
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SingleShotSettings {
        pub model: String,
        /// Falls back to the `GEMINI_API_KEY` environment variable when unset.
        pub api_key: Option<String>,
    }

    impl Default for SingleShotSettings {
        fn default() -> Self {
            Self {
                model: "gemini-2.0-flash-exp".to_string(),
                api_key: None,
            }
        }
    }

    /// Locally spawned model process.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LocalSettings {
        pub program: String,
        pub models: Vec<String>,
        pub default_model: String,
    }

    impl Default for LocalSettings {
        fn default() -> Self {
            Self {
                program: "ollama".to_string(),
                models: vec![
                    "phi4:latest".to_string(),
                    "wizardlm2:7b-fp16".to_string(),
                    "llama3.2:3b".to_string(),
                ],
                default_model: "phi4:latest".to_string(),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        #[serde(default)]
        pub sse: SseSettings,
        #[serde(default)]
        pub single: SingleShotSettings,
        #[serde(default)]
        pub local: LocalSettings,
        /// External speech-to-text executable, prints the transcript on stdout.
        #[serde(default = "default_transcriber")]
        pub transcriber: String,
    }

    fn default_transcriber() -> String {
        "whisper-cli".to_string()
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                sse: SseSettings::default(),
                single: SingleShotSettings::default(),
                local: LocalSettings::default(),
                transcriber: default_transcriber(),
            }
        }
    }

    impl AppSettings {
        /// Reads settings from `path`; any read or parse problem falls back to
        /// the defaults so a broken config file never blocks startup.
        pub fn load(path: &std::path::Path) -> Self {
            match std::fs::read_to_string(path) {
                Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                    tracing::warn!(%err, "malformed settings file, using defaults");
                    Self::default()
                }),
                Err(_) => Self::default(),
            }
        }

        pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
            std::fs::write(path, json)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn missing_file_yields_defaults() {
            let settings = AppSettings::load(std::path::Path::new("/nonexistent/config.json"));
            assert_eq!(settings.sse.model, "mistral-large-latest");
            assert_eq!(settings.local.default_model, "phi4:latest");
        }

        #[test]
        fn partial_config_fills_defaults() {
            let settings: AppSettings =
                serde_json::from_str(r#"{"sse": {"model": "x", "api_url": "http://h", "api_key": null}}"#)
                    .unwrap();
            assert_eq!(settings.sse.model, "x");
            assert_eq!(settings.transcriber, "whisper-cli");
        }
    }
}
