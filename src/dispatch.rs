//! Routes each user submission to exactly one remote operation and drives
//! the conversation store through the full lifecycle of one assistant
//! message: atomic append of the user+placeholder pair, snapshot updates
//! while a stream is live, then a single terminal update. Failures are
//! classified here; nothing escapes the submission entry point.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::backend::{AgentBackend, DocSource};
use crate::api::sse::{CorrelationField, StreamEvent};
use crate::error::ClientError;
use crate::normalize;
use crate::store::{ConversationStore, PendingHandle};
use crate::types::{Attachment, ChatMode, ConversationId, DocumentRef, MessageId};

/// Delay between successive streaming updates, keeping delivery readable
/// instead of bursty.
pub const STREAM_PACING: Duration = Duration::from_millis(40);

/// Instruction wrapper for markdown-conversion submissions.
pub const MARKDOWN_TEMPLATE: &str = "Convert the following text into clean, well-structured \
Markdown. Preserve the content and its order, use headings and lists where they fit, and \
return only the Markdown with no commentary:\n\n";

/// The remote operation a submission resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Chat,
    Search,
    Markdown,
    DocChat,
}

/// Mode-selection precedence: a document always wins, then the explicit
/// mode, then plain chat.
pub(crate) fn resolve_route(mode: ChatMode, has_document: bool) -> Route {
    if has_document {
        return Route::DocChat;
    }
    match mode {
        ChatMode::Search => Route::Search,
        ChatMode::Markdown => Route::Markdown,
        ChatMode::Chat => Route::Chat,
    }
}

/// One user submission.
#[derive(Clone, Debug)]
pub struct Submission {
    pub text: String,
    pub mode: ChatMode,
    pub attachment: Option<Attachment>,
    /// Explicit target; `None` falls back to the current selection, then to
    /// a fresh conversation.
    pub conversation: Option<ConversationId>,
}

impl Submission {
    pub fn new(text: impl Into<String>, mode: ChatMode) -> Self {
        Self {
            text: text.into(),
            mode,
            attachment: None,
            conversation: None,
        }
    }

    pub fn chat(text: impl Into<String>) -> Self {
        Self::new(text, ChatMode::Chat)
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn in_conversation(mut self, conversation: ConversationId) -> Self {
        self.conversation = Some(conversation);
        self
    }
}

pub struct Dispatcher {
    backend: Arc<dyn AgentBackend>,
    store: Arc<ConversationStore>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn AgentBackend>, store: Arc<ConversationStore>) -> Self {
        Self { backend, store }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Submit one user message. Returns the id of the assistant message
    /// created for it, or `None` for blank input. Errors never propagate;
    /// they become the terminal state of that assistant message.
    pub async fn submit(&self, submission: Submission) -> Option<MessageId> {
        let text = submission.text.trim().to_string();
        if text.is_empty() {
            return None;
        }
        let Submission {
            mode,
            attachment,
            conversation,
            ..
        } = submission;

        let handle = self.store.append_exchange(conversation, &text, mode);
        self.store.clone().schedule_new_flag_sweep();

        let bound = self.store.get(handle.conversation).and_then(|c| c.document);
        let route = resolve_route(mode, attachment.is_some() || bound.is_some());
        debug!(message = %handle.message, ?route, "dispatching submission");

        let outcome = match route {
            Route::Chat => self.run_text(&text).await,
            Route::Markdown => {
                let prompt = format!("{MARKDOWN_TEMPLATE}{text}");
                self.run_text(&prompt).await
            }
            Route::Search => self
                .backend
                .search(&text)
                .await
                .map(|payload| normalize::search_markup(&payload)),
            Route::DocChat => {
                self.run_doc_chat(&text, attachment.as_ref(), bound.as_ref(), &handle)
                    .await
            }
        };

        match outcome {
            Ok(content) => {
                self.store.complete(&handle, content);
            }
            Err(err) => {
                let kind = err.kind();
                warn!(%err, ?kind, message = %handle.message, "submission failed");
                self.store
                    .fail(&handle, kind, kind.user_message().to_string());
            }
        }
        self.store.clone().schedule_new_flag_sweep();
        Some(handle.message)
    }

    /// Re-submit the user message paired with a terminal assistant message.
    /// The old message is left untouched; a new pending message goes through
    /// the full dispatch path.
    pub async fn retry(&self, assistant: MessageId) -> Option<MessageId> {
        let ctx = self.store.retry_context(assistant)?;
        info!(conversation = %ctx.conversation, "retrying submission");
        self.submit(Submission {
            text: ctx.user_text,
            mode: ctx.mode,
            attachment: None,
            conversation: Some(ctx.conversation),
        })
        .await
    }

    async fn run_text(&self, message: &str) -> Result<String, ClientError> {
        let payload = self.backend.chat(message).await?;
        normalize::text_markup(&payload)
    }

    async fn run_doc_chat(
        &self,
        question: &str,
        attachment: Option<&Attachment>,
        bound: Option<&DocumentRef>,
        handle: &PendingHandle,
    ) -> Result<String, ClientError> {
        let source = match (attachment, bound) {
            (Some(attachment), _) => DocSource::Upload(attachment),
            (None, Some(doc)) => match doc.assistant_id.as_deref() {
                Some(assistant_id) => DocSource::Existing {
                    assistant_id,
                    thread_id: doc.thread_id.as_deref(),
                },
                None => {
                    return Err(ClientError::local(
                        "bound document has no service-side reference",
                    ));
                }
            },
            (None, None) => return Err(ClientError::local("document route without a document")),
        };

        let mut stream = self.backend.doc_chat_stream(question, source).await?;
        let mut assistant_id = bound.and_then(|d| d.assistant_id.clone());
        let mut thread_id = bound.and_then(|d| d.thread_id.clone());
        let mut latest = String::new();
        while let Some(event) = stream.next_event().await? {
            match event {
                StreamEvent::Snapshot(snapshot) => {
                    self.store.apply_snapshot(handle, &snapshot);
                    latest = snapshot;
                    tokio::time::sleep(STREAM_PACING).await;
                }
                StreamEvent::Correlation { field, value } => match field {
                    CorrelationField::AssistantId => assistant_id = Some(value),
                    CorrelationField::ThreadId => thread_id = Some(value),
                    CorrelationField::DocId => debug!(doc_id = %value, "document registered"),
                },
            }
        }

        // An ad-hoc attachment becomes the conversation's bound document
        // once the service has answered for it; an already-bound document
        // picks up refreshed correlation ids.
        let file_name = attachment
            .map(|a| a.file_name.clone())
            .or_else(|| bound.map(|d| d.file_name.clone()));
        if let Some(file_name) = file_name {
            if assistant_id.is_some() {
                self.store.bind_document(
                    handle.conversation,
                    DocumentRef {
                        file_name,
                        assistant_id,
                        thread_id,
                    },
                );
            } else {
                debug!("service announced no assistant id; document left unbound");
            }
        }
        Ok(latest)
    }
}
