//! Minimal terminal driver for the kestrel client. Rendering stays
//! deliberately plain; the interesting behavior lives in the library.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use kestrel::{
    AgentConfig, Attachment, ChatMode, ConversationStore, Dispatcher, HttpBackend, Role,
    StoreFile, Submission,
};

const HELP: &str = "commands:
  :mode chat|search|markdown   switch interaction mode
  :attach <path>               attach a document for the next submission
  :detach                      clear the conversation's bound document
  :new                         start a new chat
  :list                        list conversations
  :retry                       retry the last failed answer
  :say <text>                  synthesize speech to kestrel-tts.wav
  :hear <path> [lang]          transcribe an audio file
  :clear                       delete all conversations
  :quit                        exit";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let config = AgentConfig::from_env();
    println!("kestrel — agent service at {}", config.base_url);
    println!("{HELP}");

    let backend = Arc::new(HttpBackend::new(config.clone()));
    let store = match StoreFile::default_location() {
        Some(file) => Arc::new(ConversationStore::with_storage(file)),
        None => Arc::new(ConversationStore::new()),
    };
    let dispatcher = Dispatcher::new(backend.clone(), store.clone());

    let mut mode = ChatMode::Chat;
    let mut pending_attachment: Option<Attachment> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if let Some(command) = line.strip_prefix(':') {
            let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
            let rest = rest.trim();
            match name {
                "quit" | "q" => break,
                "help" => println!("{HELP}"),
                "mode" => match rest {
                    "chat" => mode = ChatMode::Chat,
                    "search" => mode = ChatMode::Search,
                    "markdown" => mode = ChatMode::Markdown,
                    other => println!("unknown mode: {other}"),
                },
                "attach" => match read_attachment(rest) {
                    Ok(attachment) => {
                        println!("attached {}", attachment.file_name);
                        pending_attachment = Some(attachment);
                    }
                    Err(err) => println!("{err:#}"),
                },
                "detach" => {
                    if let Some(id) = store.current_id() {
                        store.clear_document(id);
                    }
                    pending_attachment = None;
                    println!("document cleared");
                }
                "new" => {
                    store.new_conversation();
                    println!("new chat");
                }
                "list" => {
                    for conversation in store.conversations() {
                        let marker = if Some(conversation.id) == store.current_id() {
                            "*"
                        } else {
                            " "
                        };
                        println!(
                            "{marker} {} ({} messages)",
                            conversation.title,
                            conversation.messages.len()
                        );
                    }
                }
                "retry" => {
                    let failed = store.current().and_then(|c| {
                        c.messages
                            .iter()
                            .rev()
                            .find(|m| m.role == Role::Assistant && m.is_error)
                            .map(|m| m.id)
                    });
                    match failed {
                        Some(id) => {
                            if let Some(new_id) = dispatcher.retry(id).await {
                                print_answer(&store, new_id);
                            }
                        }
                        None => println!("nothing to retry"),
                    }
                }
                "say" => match backend
                    .synthesize(rest, Some(&config.language_code), None)
                    .await
                {
                    Ok(audio) => {
                        std::fs::write("kestrel-tts.wav", &audio)?;
                        println!("wrote kestrel-tts.wav ({} bytes)", audio.len());
                    }
                    Err(err) => println!("speech synthesis failed: {err}"),
                },
                "hear" => {
                    let mut parts = rest.split_whitespace();
                    let path = parts.next().unwrap_or_default();
                    let lang = parts.next().unwrap_or(&config.language_code);
                    match transcribe_file(&backend, path, lang).await {
                        Ok(transcript) => println!("transcript: {transcript}"),
                        Err(err) => println!("{err:#}"),
                    }
                }
                "clear" => {
                    store.clear_all();
                    println!("all conversations deleted");
                }
                other => println!("unknown command: :{other} (try :help)"),
            }
            continue;
        }

        let mut submission = Submission::new(line, mode);
        if let Some(attachment) = pending_attachment.take() {
            submission = submission.with_attachment(attachment);
        }
        if let Some(id) = store.current_id() {
            submission = submission.in_conversation(id);
        }
        if let Some(answer_id) = dispatcher.submit(submission).await {
            print_answer(&store, answer_id);
        }
    }

    Ok(())
}

fn read_attachment(path: &str) -> Result<Attachment> {
    let bytes =
        std::fs::read(path).with_context(|| format!("could not read attachment {path}"))?;
    let file_name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();
    Ok(Attachment::new(file_name, bytes))
}

async fn transcribe_file(backend: &HttpBackend, path: &str, language: &str) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("could not read audio {path}"))?;
    let file_name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audio.wav");
    let result = backend
        .transcribe(bytes, file_name, language)
        .await
        .context("transcription failed")?;
    Ok(format!("[{}] {}", result.language_code, result.transcript))
}

fn print_answer(store: &ConversationStore, answer: kestrel::MessageId) {
    let message = store
        .conversations()
        .into_iter()
        .flat_map(|c| c.messages)
        .find(|m| m.id == answer);
    if let Some(message) = message {
        if message.is_error {
            println!("error: {}", message.content);
        } else {
            println!("\n{}\n", message.content);
        }
    }
}
