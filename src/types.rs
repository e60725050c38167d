use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ErrorKind;

/// Character budget for a conversation title derived from its first message.
pub const TITLE_BUDGET: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// User-selectable interaction modes. Document-grounded QA is not selected
/// directly; it is forced whenever a document is attached or bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Chat,
    Search,
    Markdown,
}

/// A file uploaded alongside a single submission.
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// Reference to a document the agent service has already indexed for a
/// conversation. Later document-QA submissions reuse the service-side ids
/// instead of re-uploading the file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub file_name: String,
    pub assistant_id: Option<String>,
    pub thread_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Transient display hint, cleared by the housekeeping sweep.
    #[serde(skip)]
    pub is_new: bool,
    /// True only while an assistant message awaits its terminal content.
    #[serde(skip)]
    pub is_thinking: bool,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub error_kind: Option<ErrorKind>,
    /// The mode that produced an assistant message, so a retry can re-enter
    /// the same route.
    #[serde(default)]
    pub mode: Option<ChatMode>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            content: content.into(),
            created_at: OffsetDateTime::now_utc(),
            is_new: true,
            is_thinking: false,
            is_error: false,
            error_kind: None,
            mode: None,
        }
    }

    /// Placeholder assistant message awaiting its first update.
    pub fn pending(mode: ChatMode) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            content: String::new(),
            created_at: OffsetDateTime::now_utc(),
            is_new: true,
            is_thinking: true,
            is_error: false,
            error_kind: None,
            mode: Some(mode),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    /// Bound document, reused by later document-QA submissions. Never
    /// persisted; a fresh session starts unbound.
    #[serde(skip)]
    pub document: Option<DocumentRef>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: ConversationId::new(),
            title: "New chat".to_string(),
            messages: Vec::new(),
            document: None,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Title for a conversation, taken once from its first user message.
pub fn derive_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    let mut title: String = trimmed.chars().take(TITLE_BUDGET).collect();
    if trimmed.chars().count() > TITLE_BUDGET {
        title.push_str("...");
    }
    title
}
