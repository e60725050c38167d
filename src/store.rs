//! The stateful ledger of conversations and messages.
//!
//! All mutation funnels through a single mutex so the append-then-update
//! sequence of one submission stays atomic with respect to interleaved
//! submissions. The transcript is append-only with one exception: the
//! trailing pending assistant message, addressed by the [`PendingHandle`]
//! returned at append time, may be updated in place until it reaches a
//! terminal state. Terminal writes are honored at most once; anything
//! arriving later is dropped.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::persist::StoreFile;
use crate::types::{
    ChatMode, Conversation, ConversationId, DocumentRef, Message, MessageId, Role, derive_title,
};

/// How long the `is_new` display hint survives after a mutation.
pub const NEW_FLAG_TTL: Duration = Duration::from_secs(1);

/// Identifies the pending assistant message created by an atomic append.
/// Every later update for that dispatch is routed through this handle, so
/// there is never ambiguity about which message a late update targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingHandle {
    pub conversation: ConversationId,
    pub message: MessageId,
}

/// What the dispatcher needs to re-submit a terminal assistant message.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryContext {
    pub conversation: ConversationId,
    pub user_text: String,
    pub mode: ChatMode,
}

#[derive(Default)]
struct StoreState {
    /// Newest conversation first.
    conversations: Vec<Conversation>,
    current: Option<ConversationId>,
}

pub struct ConversationStore {
    state: Mutex<StoreState>,
    storage: Option<StoreFile>,
}

impl ConversationStore {
    /// In-memory store without durable persistence.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            storage: None,
        }
    }

    /// Store backed by a durable record, loading whatever it holds.
    pub fn with_storage(storage: StoreFile) -> Self {
        let conversations = storage.load().unwrap_or_default();
        Self {
            state: Mutex::new(StoreState {
                conversations,
                current: None,
            }),
            storage: Some(storage),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("conversation store poisoned")
    }

    fn persist(&self, state: &StoreState) {
        if let Some(storage) = &self.storage {
            storage.save(&state.conversations);
        }
    }

    // ----- reads -----

    pub fn conversations(&self) -> Vec<Conversation> {
        self.lock().conversations.clone()
    }

    pub fn current_id(&self) -> Option<ConversationId> {
        self.lock().current
    }

    pub fn get(&self, id: ConversationId) -> Option<Conversation> {
        self.lock().conversations.iter().find(|c| c.id == id).cloned()
    }

    pub fn current(&self) -> Option<Conversation> {
        let state = self.lock();
        let id = state.current?;
        state.conversations.iter().find(|c| c.id == id).cloned()
    }

    pub fn message(&self, handle: &PendingHandle) -> Option<Message> {
        let state = self.lock();
        let conversation = state.conversations.iter().find(|c| c.id == handle.conversation)?;
        conversation
            .messages
            .iter()
            .find(|m| m.id == handle.message)
            .cloned()
    }

    // ----- selection -----

    /// Select a conversation. Never touches the others.
    pub fn select(&self, id: ConversationId) -> bool {
        let mut state = self.lock();
        if state.conversations.iter().any(|c| c.id == id) {
            state.current = Some(id);
            true
        } else {
            false
        }
    }

    /// Explicit "new chat": an empty conversation, selected, titled on its
    /// first submission.
    pub fn new_conversation(&self) -> ConversationId {
        let mut state = self.lock();
        let conversation = Conversation::new();
        let id = conversation.id;
        state.conversations.insert(0, conversation);
        state.current = Some(id);
        self.persist(&state);
        id
    }

    // ----- the submission lifecycle -----

    /// Atomically append a user message and its pending assistant
    /// placeholder.
    ///
    /// Target resolution is an explicit rule, never inferred: an explicit id
    /// wins, otherwise the current selection, otherwise a fresh conversation
    /// is created and selected.
    pub fn append_exchange(
        &self,
        target: Option<ConversationId>,
        user_text: &str,
        mode: ChatMode,
    ) -> PendingHandle {
        let mut state = self.lock();
        let resolved = target
            .or(state.current)
            .filter(|id| state.conversations.iter().any(|c| c.id == *id));
        let index = match resolved {
            Some(id) => state
                .conversations
                .iter()
                .position(|c| c.id == id)
                .unwrap_or(0),
            None => {
                let conversation = Conversation::new();
                state.current = Some(conversation.id);
                state.conversations.insert(0, conversation);
                0
            }
        };

        let conversation = &mut state.conversations[index];
        if conversation.messages.is_empty() {
            conversation.title = derive_title(user_text);
        }
        conversation.messages.push(Message::user(user_text));
        let pending = Message::pending(mode);
        let handle = PendingHandle {
            conversation: conversation.id,
            message: pending.id,
        };
        conversation.messages.push(pending);
        self.persist(&state);
        handle
    }

    /// The single permitted in-place update: replace the pending message's
    /// content with a newer cumulative snapshot.
    pub fn apply_snapshot(&self, handle: &PendingHandle, text: &str) {
        let mut state = self.lock();
        let Some(message) = find_message(&mut state, handle) else {
            warn!(message = %handle.message, "snapshot for unknown message dropped");
            return;
        };
        if !message.is_thinking {
            debug!(message = %handle.message, "snapshot after terminal state dropped");
            return;
        }
        message.content = text.to_string();
        self.persist(&state);
    }

    /// Terminal success. Returns false when the message already left the
    /// pending state (a superseded operation's completion is dropped).
    pub fn complete(&self, handle: &PendingHandle, content: String) -> bool {
        self.finish(handle, |message| {
            message.content = content;
            message.is_error = false;
            message.error_kind = None;
        })
    }

    /// Terminal failure with a classified kind.
    pub fn fail(&self, handle: &PendingHandle, kind: ErrorKind, content: String) -> bool {
        self.finish(handle, |message| {
            message.content = content;
            message.is_error = true;
            message.error_kind = Some(kind);
        })
    }

    fn finish(&self, handle: &PendingHandle, apply: impl FnOnce(&mut Message)) -> bool {
        let mut state = self.lock();
        let Some(message) = find_message(&mut state, handle) else {
            warn!(message = %handle.message, "terminal update for unknown message dropped");
            return false;
        };
        if !message.is_thinking {
            debug!(message = %handle.message, "duplicate terminal update dropped");
            return false;
        }
        apply(message);
        message.is_thinking = false;
        self.persist(&state);
        true
    }

    /// Context for re-submitting the user message paired with a terminal
    /// assistant message. The failed message itself is never touched; the
    /// dispatcher appends a fresh pending message instead.
    pub fn retry_context(&self, assistant: MessageId) -> Option<RetryContext> {
        let state = self.lock();
        for conversation in &state.conversations {
            let Some(index) = conversation.messages.iter().position(|m| m.id == assistant) else {
                continue;
            };
            let message = &conversation.messages[index];
            if message.role != Role::Assistant || message.is_thinking {
                return None;
            }
            let user_text = conversation.messages[..index]
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())?;
            return Some(RetryContext {
                conversation: conversation.id,
                user_text,
                mode: message.mode.unwrap_or_default(),
            });
        }
        None
    }

    // ----- documents -----

    pub fn bind_document(&self, id: ConversationId, document: DocumentRef) {
        let mut state = self.lock();
        if let Some(conversation) = state.conversations.iter_mut().find(|c| c.id == id) {
            conversation.document = Some(document);
        }
    }

    pub fn clear_document(&self, id: ConversationId) {
        let mut state = self.lock();
        if let Some(conversation) = state.conversations.iter_mut().find(|c| c.id == id) {
            conversation.document = None;
        }
    }

    // ----- housekeeping -----

    /// Clear every `is_new` display hint.
    pub fn clear_new_flags(&self) {
        let mut state = self.lock();
        for conversation in &mut state.conversations {
            for message in &mut conversation.messages {
                message.is_new = false;
            }
        }
    }

    /// Run the `is_new` sweep once, `NEW_FLAG_TTL` from now.
    pub fn schedule_new_flag_sweep(self: Arc<Self>) {
        tokio::spawn(async move {
            tokio::time::sleep(NEW_FLAG_TTL).await;
            self.clear_new_flags();
        });
    }

    /// Drop every conversation and purge durable storage.
    pub fn clear_all(&self) {
        let mut state = self.lock();
        state.conversations.clear();
        state.current = None;
        if let Some(storage) = &self.storage {
            storage.purge();
        }
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn find_message<'a>(state: &'a mut StoreState, handle: &PendingHandle) -> Option<&'a mut Message> {
    state
        .conversations
        .iter_mut()
        .find(|c| c.id == handle.conversation)?
        .messages
        .iter_mut()
        .find(|m| m.id == handle.message)
}
