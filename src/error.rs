//! Error types for the agent client.
//!
//! The decoder and normalizer signal raw failures only; mapping onto the
//! user-facing taxonomy happens once, at the dispatcher boundary, through
//! [`ClientError::kind`].

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Classified failure taxonomy attached to a failed assistant message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Network,
    Timeout,
    Server,
    Client,
    Unknown,
}

impl ErrorKind {
    /// Fixed text shown as the content of a failed assistant message.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => {
                "Unable to reach the assistant service. Check your connection and try again."
            }
            ErrorKind::Timeout => "The assistant took too long to respond. Please try again.",
            ErrorKind::Server => {
                "The assistant service could not produce an answer. Please try again."
            }
            ErrorKind::Client => "Something went wrong on this device while preparing the request.",
            ErrorKind::Unknown => "Something unexpected went wrong. Please try again.",
        }
    }
}

/// Errors raised by the transport, the stream decoder, or the normalizer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("agent service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("agent service reported: {0}")]
    Remote(String),
    #[error("stream ended without any response text")]
    EmptyResponse,
    #[error("response carries no text field")]
    MissingText,
    #[error("{0}")]
    Local(String),
}

impl ClientError {
    pub fn local(message: impl Into<String>) -> Self {
        ClientError::Local(message.into())
    }

    /// Map a raw failure onto the taxonomy using transport status and
    /// message-content heuristics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Http(err) if err.is_timeout() => ErrorKind::Timeout,
            ClientError::Http(err) if err.is_connect() || err.is_request() => ErrorKind::Network,
            ClientError::Http(err) if err.is_decode() => ErrorKind::Server,
            ClientError::Http(err) => classify_text(&err.to_string()),
            ClientError::Status { .. }
            | ClientError::EmptyResponse
            | ClientError::MissingText => ErrorKind::Server,
            ClientError::Remote(msg) => {
                if mentions_timeout(msg) {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::Server
                }
            }
            ClientError::Local(_) => ErrorKind::Client,
        }
    }
}

fn classify_text(message: &str) -> ErrorKind {
    if mentions_timeout(message) {
        ErrorKind::Timeout
    } else {
        ErrorKind::Unknown
    }
}

fn mentions_timeout(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("timeout") || lower.contains("timed out")
}
