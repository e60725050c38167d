//! Event-frame decoder for streamed agent responses.
//!
//! The service answers streaming operations with line-delimited event
//! frames (`data: {...}`) carrying JSON payloads. [`EventStream`] turns the
//! raw byte stream into an ordered sequence of cumulative-text snapshots
//! plus out-of-band correlation metadata. Chunks are consumed strictly in
//! arrival order; a trailing partial line is buffered until the next chunk
//! completes it, so snapshots are always prefix-extensions of one another.

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};

use crate::error::ClientError;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Payload fields that may carry the delta text, in lookup order.
const TEXT_FIELDS: [&str; 3] = ["text", "content", "response"];

/// Correlation identifiers the service may announce mid-stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CorrelationField {
    ThreadId,
    AssistantId,
    DocId,
}

impl CorrelationField {
    const ALL: [(&'static str, CorrelationField); 3] = [
        ("thread_id", CorrelationField::ThreadId),
        ("assistant_id", CorrelationField::AssistantId),
        ("doc_id", CorrelationField::DocId),
    ];
}

#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// The accumulated response text so far. Each snapshot extends the
    /// previous one.
    Snapshot(String),
    /// A correlation identifier, emitted once per distinct value.
    Correlation {
        field: CorrelationField,
        value: String,
    },
}

/// What one decoded payload token contributes to the stream.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct FrameUpdate {
    pub piece: Option<String>,
    pub correlations: Vec<(CorrelationField, String)>,
    pub terminal: bool,
    pub error: Option<String>,
}

/// Decode one payload token.
///
/// JSON objects yield the first present text-bearing field plus any
/// correlation ids; the sentinel and `complete: true` mark the end of the
/// stream; anything that fails structured decoding is kept verbatim so no
/// data is ever dropped.
pub(crate) fn decode_frame(token: &str) -> FrameUpdate {
    let mut update = FrameUpdate::default();
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return update;
    }
    if trimmed == DONE_SENTINEL {
        update.terminal = true;
        return update;
    }

    let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(trimmed) else {
        update.piece = Some(token.to_string());
        return update;
    };

    if let Some(err) = payload.get("error") {
        let message = match err {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        update.error = Some(message);
        return update;
    }

    for field in TEXT_FIELDS {
        if let Some(Value::String(text)) = payload.get(field) {
            update.piece = Some(text.clone());
            break;
        }
    }

    for (name, field) in CorrelationField::ALL {
        if let Some(Value::String(value)) = payload.get(name)
            && !value.is_empty()
        {
            update.correlations.push((field, value.clone()));
        }
    }

    update.terminal = payload.get("complete").and_then(Value::as_bool) == Some(true);
    update
}

/// Lazy, finite, non-restartable decoder over a byte stream.
pub struct EventStream {
    inner: BoxStream<'static, Result<Bytes, ClientError>>,
    line_buf: String,
    accumulated: String,
    pending: VecDeque<StreamEvent>,
    /// An in-stream fault, surfaced only after queued events drain.
    fault: Option<ClientError>,
    seen_correlations: HashSet<(CorrelationField, String)>,
    emitted_any: bool,
    finished: bool,
    guard_checked: bool,
}

impl EventStream {
    pub fn new<S>(inner: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        Self {
            inner: inner.boxed(),
            line_buf: String::new(),
            accumulated: String::new(),
            pending: VecDeque::new(),
            fault: None,
            seen_correlations: HashSet::new(),
            emitted_any: false,
            finished: false,
            guard_checked: false,
        }
    }

    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(response.bytes_stream().map(|item| item.map_err(ClientError::from)))
    }

    /// The accumulated response text.
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    /// Pull the next event, or `None` once the stream is exhausted.
    ///
    /// A stream that terminates without ever producing a text delta fails
    /// with [`ClientError::EmptyResponse`] instead of ending cleanly.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, ClientError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if let Some(err) = self.fault.take() {
                return Err(err);
            }
            if self.finished {
                if !self.emitted_any && !self.guard_checked {
                    self.guard_checked = true;
                    return Err(ClientError::EmptyResponse);
                }
                return Ok(None);
            }
            match self.inner.next().await {
                Some(Ok(bytes)) => self.ingest(&bytes),
                Some(Err(err)) => {
                    self.finished = true;
                    self.guard_checked = true;
                    return Err(err);
                }
                None => {
                    // Flush a trailing line the server never terminated.
                    let tail = std::mem::take(&mut self.line_buf);
                    self.finished = true;
                    if !tail.is_empty() {
                        self.handle_line(&tail);
                    }
                }
            }
        }
    }

    fn ingest(&mut self, bytes: &Bytes) {
        let chunk = String::from_utf8_lossy(bytes);
        self.line_buf.push_str(&chunk);
        while let Some(pos) = self.line_buf.find('\n') {
            let mut line: String = self.line_buf.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            self.handle_line(&line);
            if self.finished {
                break;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        // Non-conforming servers may omit the prefix; fall through to the
        // same decode-or-verbatim handling either way.
        let token = match line.strip_prefix(DATA_PREFIX) {
            Some(rest) => rest.trim_start(),
            None => line,
        };

        let update = decode_frame(token);
        if let Some(message) = update.error {
            self.finished = true;
            self.guard_checked = true;
            self.fault = Some(ClientError::Remote(message));
            return;
        }
        for (field, value) in update.correlations {
            if self.seen_correlations.insert((field, value.clone())) {
                self.pending.push_back(StreamEvent::Correlation { field, value });
            }
        }
        if let Some(piece) = update.piece
            && !piece.is_empty()
        {
            self.accumulated.push_str(&piece);
            self.emitted_any = true;
            self.pending
                .push_back(StreamEvent::Snapshot(self.accumulated.clone()));
        }
        if update.terminal {
            self.finished = true;
        }
    }
}
