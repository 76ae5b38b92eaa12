//! Plauderkasten - line-oriented chat console over the orchestration core.
//!
//! The console is deliberately thin: it composes input, hands it to the
//! orchestrator and reprints the growing assistant reply. All chat logic
//! lives in the library crates.

use anyhow::Result;
use chat::composer::merge_documents;
use chat::{format_saved_chat, record_input_failure, ChatStore, InputComposer, Orchestrator};
use providers::gemini::GeminiClient;
use providers::{BackendKind, BackendRouter, CliTranscriber};
use shared::history::ChatHistory;
use shared::request::ImageAttachment;
use shared::settings::AppSettings;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn config_dir() -> PathBuf {
    directories::ProjectDirs::from("de.local", "Plauderkasten", "Plauderkasten")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".plauderkasten"))
}

const HELP: &str = "Befehle:
  /backend <sse|single|local>   Backend wechseln
  /image <pfad>                 Bild an die nächste Nachricht anhängen
  /audio <pfad>                 Audiodatei statt Text senden
  /doc <pfad>                   Textdokument in den Prompt einfügen (max. 2)
  /describe <pfad> [prompt]     Bild einzeln beschreiben lassen
  /compare <pfad1> <pfad2>      Zwei Bilder vergleichen
  /save                         Aktuellen Chat speichern
  /chats                        Gespeicherte Chats auflisten
  /load <bezeichnung>           Gespeicherten Chat laden
  /delete <bezeichnung>         Gespeicherten Chat löschen
  /deleteall                    Alle gespeicherten Chats löschen
  /new                          Neuen Chat beginnen
  /help                         Diese Hilfe
  /quit                         Beenden";

struct Console {
    settings: AppSettings,
    store: ChatStore,
    composer: InputComposer,
    orchestrator: Orchestrator,
    history: ChatHistory,
    backend: BackendKind,
    pending_image: Option<ImageAttachment>,
    pending_audio: Option<PathBuf>,
    pending_docs: Vec<String>,
}

impl Console {
    fn new(dir: PathBuf) -> Self {
        let config_file = dir.join("config.json");
        let settings = AppSettings::load(&config_file);
        if !config_file.exists() {
            if let Err(err) = settings.save(&config_file) {
                tracing::warn!(%err, "could not write default config");
            }
        }

        let store = ChatStore::open(dir.clone(), dir.join("chats.json"));
        let composer =
            InputComposer::new(Arc::new(CliTranscriber::new(settings.transcriber.clone())));
        let orchestrator = Orchestrator::new(BackendRouter::new(settings.clone()));

        Self {
            settings,
            store,
            composer,
            orchestrator,
            history: ChatHistory::new(),
            backend: BackendKind::Sse,
            pending_image: None,
            pending_audio: None,
            pending_docs: Vec::new(),
        }
    }

    async fn send(&mut self, text: &str) {
        let image = self.pending_image.take();
        let audio = self.pending_audio.take();
        let docs: Vec<String> = std::mem::take(&mut self.pending_docs);
        let text = merge_documents(
            text,
            docs.first().map(String::as_str),
            docs.get(1).map(String::as_str),
        );
        let request = match self.composer.compose(&text, image, audio.as_deref()).await {
            Ok(request) => request,
            Err(err) => {
                record_input_failure(&mut self.history, &err);
                println!("{err}");
                return;
            }
        };

        // Reprints only the new suffix while the cumulative text grows; a
        // reflowed buffer falls back to a full reprint.
        let mut shown = String::new();
        self.orchestrator
            .run_turn(self.backend, &mut self.history, request, |history| {
                if let Some(text) = history.last().and_then(|t| t.assistant.as_deref()) {
                    match text.strip_prefix(shown.as_str()) {
                        Some(suffix) => print!("{suffix}"),
                        None => print!("\n{text}"),
                    }
                    shown = text.to_string();
                    let _ = io::stdout().flush();
                }
            })
            .await;
        println!();
    }

    async fn describe(&mut self, rest: &str) {
        let mut parts = rest.splitn(2, ' ');
        let Some(path) = parts.next().filter(|p| !p.is_empty()) else {
            println!("Bitte einen Bildpfad angeben.");
            return;
        };
        let prompt = parts.next().unwrap_or("").trim();

        match self.single_shot_client() {
            Ok(client) => match read_image(path) {
                Ok(image) => match client.describe_image(&image, prompt).await {
                    Ok(text) => {
                        self.history.push_notice(text.clone());
                        println!("{text}");
                    }
                    Err(err) => println!("{err}"),
                },
                Err(err) => println!("{err}"),
            },
            Err(err) => println!("{err}"),
        }
    }

    async fn compare(&mut self, rest: &str) {
        let mut parts = rest.split_whitespace();
        let (Some(first), Some(second)) = (parts.next(), parts.next()) else {
            println!("Bitte zwei Bildpfade angeben.");
            return;
        };

        match self.single_shot_client() {
            Ok(client) => match (read_image(first), read_image(second)) {
                (Ok(a), Ok(b)) => match client.compare_images(&a, &b).await {
                    Ok(text) => {
                        self.history.push_notice(text.clone());
                        println!("{text}");
                    }
                    Err(err) => println!("{err}"),
                },
                (Err(err), _) | (_, Err(err)) => println!("{err}"),
            },
            Err(err) => println!("{err}"),
        }
    }

    fn single_shot_client(&self) -> Result<GeminiClient, shared::error::ChatError> {
        GeminiClient::from_settings(&self.settings.single)
    }

    async fn command(&mut self, line: &str) -> bool {
        let (cmd, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };

        match cmd {
            "quit" | "exit" => return false,
            "help" => println!("{HELP}"),
            "backend" => match BackendKind::parse(rest) {
                Some(kind) => {
                    self.backend = kind;
                    println!("Backend: {}", kind.as_str());
                }
                None => println!("Unbekanntes Backend: {rest}"),
            },
            "image" => match read_image(rest) {
                Ok(image) => {
                    self.pending_image = Some(image);
                    println!("Bild angehängt.");
                }
                Err(err) => println!("{err}"),
            },
            "audio" => {
                self.pending_audio = Some(PathBuf::from(rest));
                println!("Audiodatei wird beim nächsten Senden transkribiert.");
            }
            "doc" => {
                if self.pending_docs.len() >= 2 {
                    println!("Es sind bereits zwei Dokumente angehängt.");
                } else {
                    match std::fs::read_to_string(rest) {
                        Ok(content) => {
                            self.pending_docs.push(content);
                            println!("Dokument angehängt ({}).", self.pending_docs.len());
                        }
                        Err(err) => println!("{rest}: {err}"),
                    }
                }
            }
            "describe" => self.describe(rest).await,
            "compare" => self.compare(rest).await,
            "save" => match self.store.save(&self.history) {
                Ok(Some(_)) => println!("Chat gespeichert."),
                Ok(None) => println!("Nichts zu speichern."),
                Err(err) => println!("{err}"),
            },
            "chats" => {
                if self.store.chats().is_empty() {
                    println!("Keine gespeicherten Chats.");
                }
                for chat in self.store.chats() {
                    println!("{}", format_saved_chat(chat));
                }
            }
            "load" => {
                let (loaded, matched) = self.store.load(rest, &self.history);
                match matched {
                    Some(label) => {
                        self.history = loaded;
                        println!("Geladen: {label}");
                    }
                    None => println!("Kein Chat mit dieser Bezeichnung gefunden."),
                }
            }
            "delete" => match self.store.delete(rest) {
                Ok(()) => println!("Gelöscht."),
                Err(err) => println!("{err}"),
            },
            "deleteall" => match self.store.delete_all() {
                Ok(()) => println!("Alle Chats gelöscht."),
                Err(err) => println!("{err}"),
            },
            "new" => {
                self.history.clear();
                println!("Neuer Chat.");
            }
            other => println!("Unbekannter Befehl: /{other} (/help für Hilfe)"),
        }
        true
    }
}

fn read_image(path: &str) -> Result<ImageAttachment, shared::error::ChatError> {
    std::fs::read(path)
        .map(ImageAttachment::new)
        .map_err(|err| shared::error::ChatError::Upload(format!("{path}: {err}")))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut console = Console::new(config_dir());
    println!("Plauderkasten - Backend: {} (/help für Befehle)", console.backend.as_str());

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            if !console.command(command).await {
                break;
            }
        } else {
            console.send(input).await;
        }
    }

    Ok(())
}
