//! Dispatcher lifecycle tests against a scripted backend.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kestrel::api::backend::{
    AgentBackend, ApiResult, DocAnswerPayload, DocSource, SearchPayload, TextPayload,
};
use kestrel::api::sse::EventStream;
use kestrel::dispatch::{Dispatcher, Submission};
use kestrel::error::{ClientError, ErrorKind};
use kestrel::normalize::NO_SOURCES_PLACEHOLDER;
use kestrel::store::ConversationStore;
use kestrel::types::{Attachment, ChatMode, Role};

#[derive(Default)]
struct MockBackend {
    chat_payload: Option<TextPayload>,
    search_payload: Option<SearchPayload>,
    doc_frames: Vec<String>,
    fail_once: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    fn with_chat_response(text: &str) -> Self {
        Self {
            chat_payload: Some(TextPayload {
                response: Some(text.to_string()),
                ..TextPayload::default()
            }),
            ..Self::default()
        }
    }

    fn with_doc_frames(frames: &[&str]) -> Self {
        Self {
            doc_frames: frames.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn frames_stream(&self) -> EventStream {
        let chunks: Vec<Result<Bytes, ClientError>> = self
            .doc_frames
            .iter()
            .map(|frame| Ok(Bytes::from(frame.clone())))
            .collect();
        EventStream::new(stream::iter(chunks))
    }

    fn scripted_failure(&self) -> Option<ClientError> {
        if self.fail_once.swap(false, Ordering::SeqCst) {
            Some(ClientError::Status {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: "mock failure".to_string(),
            })
        } else {
            None
        }
    }
}

#[async_trait]
impl AgentBackend for MockBackend {
    async fn chat(&self, message: &str) -> ApiResult<TextPayload> {
        self.record(format!("chat:{message}"));
        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }
        Ok(self.chat_payload.clone().unwrap_or_default())
    }

    async fn chat_stream(&self, message: &str) -> ApiResult<EventStream> {
        self.record(format!("chat_stream:{message}"));
        Ok(self.frames_stream())
    }

    async fn doc_chat_stream(
        &self,
        question: &str,
        source: DocSource<'_>,
    ) -> ApiResult<EventStream> {
        let tag = match source {
            DocSource::Upload(attachment) => format!("upload:{}", attachment.file_name),
            DocSource::Existing {
                assistant_id,
                thread_id,
            } => format!("existing:{assistant_id}:{}", thread_id.unwrap_or("-")),
        };
        self.record(format!("doc[{tag}]:{question}"));
        Ok(self.frames_stream())
    }

    async fn search(&self, query: &str) -> ApiResult<SearchPayload> {
        self.record(format!("search:{query}"));
        Ok(self.search_payload.clone().unwrap_or_default())
    }

    async fn doc_answer(&self, question: &str, assistant_id: &str) -> ApiResult<DocAnswerPayload> {
        self.record(format!("doc_answer[{assistant_id}]:{question}"));
        Ok(DocAnswerPayload {
            answer: Some("On page 3.".to_string()),
            pages: vec!["/pages/p3.png".to_string()],
            ..DocAnswerPayload::default()
        })
    }
}

fn harness(backend: MockBackend) -> (Arc<MockBackend>, Arc<ConversationStore>, Dispatcher) {
    let backend = Arc::new(backend);
    let store = Arc::new(ConversationStore::new());
    let dispatcher = Dispatcher::new(backend.clone(), store.clone());
    (backend, store, dispatcher)
}

#[tokio::test]
async fn plain_chat_completes_with_the_response_field() {
    let (_, store, dispatcher) = harness(MockBackend::with_chat_response("TCP is..."));
    let answer = dispatcher.submit(Submission::chat("Explain TCP")).await.unwrap();

    let conversation = store.current().unwrap();
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[0].role, Role::User);
    assert_eq!(conversation.messages[0].content, "Explain TCP");
    let assistant = &conversation.messages[1];
    assert_eq!(assistant.id, answer);
    assert_eq!(assistant.content, "TCP is...");
    assert!(!assistant.is_thinking);
    assert!(!assistant.is_error);
}

#[tokio::test]
async fn document_stream_aggregates_snapshots_then_completes() {
    let backend = MockBackend::with_doc_frames(&[
        "data: {\"text\":\"The \"}\n",
        "data: {\"text\":\"answer is 42.\"}\n",
        "data: [DONE]\n",
    ]);
    let (_, store, dispatcher) = harness(backend);
    let submission = Submission::chat("What is the answer?")
        .with_attachment(Attachment::new("paper.pdf", b"%PDF-".to_vec()));
    let answer = dispatcher.submit(submission).await.unwrap();

    let conversation = store.current().unwrap();
    let assistant = conversation.messages.iter().find(|m| m.id == answer).unwrap();
    assert_eq!(assistant.content, "The answer is 42.");
    assert!(!assistant.is_thinking);
    assert!(!assistant.is_error);
}

#[tokio::test]
async fn empty_stream_fails_instead_of_completing_blank() {
    let backend = MockBackend::with_doc_frames(&["data: [DONE]\n"]);
    let (_, store, dispatcher) = harness(backend);
    let submission = Submission::chat("anything")
        .with_attachment(Attachment::new("paper.pdf", b"%PDF-".to_vec()));
    let answer = dispatcher.submit(submission).await.unwrap();

    let conversation = store.current().unwrap();
    let assistant = conversation.messages.iter().find(|m| m.id == answer).unwrap();
    assert!(assistant.is_error);
    assert_eq!(assistant.error_kind, Some(ErrorKind::Server));
    assert!(!assistant.content.is_empty());
    assert!(!assistant.is_thinking);
}

#[tokio::test]
async fn search_with_no_items_renders_the_placeholder() {
    let backend = MockBackend {
        search_payload: Some(SearchPayload::default()),
        ..MockBackend::default()
    };
    let (backend, store, dispatcher) = harness(backend);
    let answer = dispatcher
        .submit(Submission::new("rust news", ChatMode::Search))
        .await
        .unwrap();

    let conversation = store.current().unwrap();
    let assistant = conversation.messages.iter().find(|m| m.id == answer).unwrap();
    assert!(assistant.content.contains(NO_SOURCES_PLACEHOLDER));
    assert!(!assistant.is_error);
    assert_eq!(backend.calls(), vec!["search:rust news".to_string()]);
}

#[tokio::test]
async fn markdown_mode_wraps_the_fixed_template() {
    let (backend, _, dispatcher) = harness(MockBackend::with_chat_response("# Notes"));
    dispatcher
        .submit(Submission::new("raw meeting notes", ChatMode::Markdown))
        .await
        .unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("chat:Convert the following text"));
    assert!(calls[0].ends_with("raw meeting notes"));
}

#[tokio::test]
async fn attachment_overrides_the_selected_mode() {
    let backend = MockBackend::with_doc_frames(&[
        "data: {\"text\":\"from the doc\"}\n",
        "data: [DONE]\n",
    ]);
    let (backend, _, dispatcher) = harness(backend);
    let submission = Submission::new("look this up", ChatMode::Search)
        .with_attachment(Attachment::new("report.pdf", b"%PDF-".to_vec()));
    dispatcher.submit(submission).await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls, vec!["doc[upload:report.pdf]:look this up".to_string()]);
}

#[tokio::test]
async fn successful_upload_binds_the_document_for_later_turns() {
    let backend = MockBackend::with_doc_frames(&[
        "data: {\"thread_id\":\"t-1\",\"text\":\"\"}\n",
        "data: {\"assistant_id\":\"asst-1\",\"status\":\"assistant_ready\",\"text\":\"\"}\n",
        "data: {\"text\":\"indexed answer\"}\n",
        "data: {\"text\":\"\",\"complete\":true}\n",
    ]);
    let (backend, store, dispatcher) = harness(backend);

    let first = Submission::chat("first question")
        .with_attachment(Attachment::new("paper.pdf", b"%PDF-".to_vec()));
    dispatcher.submit(first).await.unwrap();

    let conversation = store.current().unwrap();
    let document = conversation.document.clone().unwrap();
    assert_eq!(document.file_name, "paper.pdf");
    assert_eq!(document.assistant_id.as_deref(), Some("asst-1"));
    assert_eq!(document.thread_id.as_deref(), Some("t-1"));

    // The bound document forces the document route without a re-upload.
    dispatcher
        .submit(Submission::chat("follow-up").in_conversation(conversation.id))
        .await
        .unwrap();
    let calls = backend.calls();
    assert_eq!(calls[1], "doc[existing:asst-1:t-1]:follow-up".to_string());
}

#[tokio::test]
async fn failure_is_classified_and_terminal() {
    let backend = MockBackend::with_chat_response("unused");
    backend.fail_once.store(true, Ordering::SeqCst);
    let (_, store, dispatcher) = harness(backend);
    let answer = dispatcher.submit(Submission::chat("hello")).await.unwrap();

    let conversation = store.current().unwrap();
    let assistant = conversation.messages.iter().find(|m| m.id == answer).unwrap();
    assert!(assistant.is_error);
    assert_eq!(assistant.error_kind, Some(ErrorKind::Server));
    assert!(!assistant.is_thinking);
}

#[tokio::test]
async fn retry_appends_a_new_message_and_leaves_the_failed_one() {
    let backend = MockBackend::with_chat_response("second time lucky");
    backend.fail_once.store(true, Ordering::SeqCst);
    let (_, store, dispatcher) = harness(backend);

    let failed = dispatcher.submit(Submission::chat("hello")).await.unwrap();
    let retried = dispatcher.retry(failed).await.unwrap();
    assert_ne!(failed, retried);

    let conversation = store.current().unwrap();
    // Original exchange plus the retried pair, in order.
    assert_eq!(conversation.messages.len(), 4);
    let original = conversation.messages.iter().find(|m| m.id == failed).unwrap();
    assert!(original.is_error);
    let fresh = conversation.messages.iter().find(|m| m.id == retried).unwrap();
    assert_eq!(fresh.content, "second time lucky");
    assert!(!fresh.is_error);
    assert!(conversation.messages.iter().all(|m| !m.is_thinking));
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let (backend, store, dispatcher) = harness(MockBackend::with_chat_response("unused"));
    assert!(dispatcher.submit(Submission::chat("   ")).await.is_none());
    assert!(store.conversations().is_empty());
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn retry_of_an_unknown_message_is_a_no_op() {
    let (_, store, dispatcher) = harness(MockBackend::with_chat_response("unused"));
    assert!(dispatcher.retry(kestrel::types::MessageId::new()).await.is_none());
    assert!(store.conversations().is_empty());
}

#[tokio::test]
async fn chat_stream_aggregates_like_any_other_stream() {
    let backend = MockBackend::with_doc_frames(&[
        "data: {\"text\":\"streamed \"}\n",
        "data: {\"text\":\"chat\"}\n",
        "data: [DONE]\n",
    ]);
    let mut stream = backend.chat_stream("hello").await.unwrap();
    let mut last = String::new();
    while let Some(event) = stream.next_event().await.unwrap() {
        if let kestrel::StreamEvent::Snapshot(snapshot) = event {
            assert!(snapshot.starts_with(&last));
            last = snapshot;
        }
    }
    assert_eq!(last, "streamed chat");
    assert_eq!(stream.text(), "streamed chat");
}

#[tokio::test]
async fn non_streaming_doc_answer_normalizes_with_pages() {
    let backend = MockBackend::default();
    let payload = backend.doc_answer("where?", "asst-9").await.unwrap();
    let markup = kestrel::normalize::doc_answer_markup(&payload, "http://localhost:8000");
    assert!(markup.starts_with("On page 3."));
    assert!(markup.contains("![Page 1](http://localhost:8000/pages/p3.png)"));
    assert_eq!(backend.calls(), vec!["doc_answer[asst-9]:where?".to_string()]);
}
