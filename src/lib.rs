//! Kestrel — conversational client for a remote AI-agent service.
//!
//! The service exposes interchangeable interaction modes (plain chat, web
//! search, document-grounded QA, markdown conversion) and an audio channel.
//! This crate is the client-side protocol and state layer: it decodes the
//! streamed event frames, normalizes the heterogeneous response shapes,
//! dispatches each submission to exactly one remote operation, and keeps an
//! append-only conversation ledger with bounded persistence. Rendering the
//! transcript is a caller concern.
//!
//! # Architecture
//!
//! - `api` — the service client: backend operations, SSE decoding, audio
//! - `normalize` — terminal payloads to one canonical markup string
//! - `dispatch` — mode routing and the assistant-message lifecycle
//! - `store` — the conversation ledger and its persistence
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kestrel::{ConversationStore, Dispatcher, HttpBackend, Submission};
//!
//! # async fn example() {
//! let backend = Arc::new(HttpBackend::from_env());
//! let store = Arc::new(ConversationStore::new());
//! let dispatcher = Dispatcher::new(backend, store.clone());
//! dispatcher.submit(Submission::chat("Explain TCP")).await;
//! # }
//! ```

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod normalize;
pub mod persist;
pub mod store;
pub mod types;

pub use api::{AgentBackend, EventStream, HttpBackend, StreamEvent};
pub use config::AgentConfig;
pub use dispatch::{Dispatcher, Submission};
pub use error::{ClientError, ErrorKind};
pub use persist::{MAX_STORED_CONVERSATIONS, StoreFile};
pub use store::{ConversationStore, PendingHandle, RetryContext};
pub use types::{
    Attachment, ChatMode, Conversation, ConversationId, DocumentRef, Message, MessageId, Role,
};
