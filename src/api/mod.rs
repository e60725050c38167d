/// Client for the remote agent service.
///
/// `backend` defines the operations the dispatcher selects between, with an
/// HTTP implementation; `sse` decodes the event-frame streams the service
/// answers streaming operations with; `audio` covers the speech channel.
pub mod audio;
pub mod backend;
pub mod sse;

pub use audio::{SupportedLanguages, Transcription};
pub use backend::{
    AgentBackend, ApiResult, DocAnswerPayload, DocSource, HttpBackend, SearchItem, SearchPayload,
    TextPayload,
};
pub use sse::{CorrelationField, EventStream, StreamEvent};
