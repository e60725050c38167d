use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::api::sse::EventStream;
use crate::config::AgentConfig;
use crate::error::ClientError;
use crate::types::Attachment;

pub type ApiResult<T> = Result<T, ClientError>;

/// Document source for a document-QA submission: a fresh upload, or the
/// service-side ids of one the service already indexed.
#[derive(Clone, Copy, Debug)]
pub enum DocSource<'a> {
    Upload(&'a Attachment),
    Existing {
        assistant_id: &'a str,
        thread_id: Option<&'a str>,
    },
}

/// Plain-chat and markdown-conversion responses. The service is loose about
/// which field carries the answer, so all candidates are modeled and the
/// normalizer resolves them in priority order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub status: Option<u16>,
    /// Crawled page content, shown as a truncated preview.
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPayload {
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub warning: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocAnswerPayload {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Reference-page image links, possibly relative to the service root.
    #[serde(default)]
    pub pages: Vec<String>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    start: u32,
}

/// Remote operations the dispatcher selects between.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Non-streaming chat; also carries markdown-conversion prompts.
    async fn chat(&self, message: &str) -> ApiResult<TextPayload>;

    /// Streaming chat over event frames.
    async fn chat_stream(&self, message: &str) -> ApiResult<EventStream>;

    /// Streaming document-grounded QA.
    async fn doc_chat_stream(&self, question: &str, source: DocSource<'_>)
    -> ApiResult<EventStream>;

    /// Web search with crawled sources.
    async fn search(&self, query: &str) -> ApiResult<SearchPayload>;

    /// Non-streaming document QA with reference pages.
    async fn doc_answer(&self, question: &str, assistant_id: &str) -> ApiResult<DocAnswerPayload>;
}

/// HTTP implementation of [`AgentBackend`] against the agent service.
pub struct HttpBackend {
    client: reqwest::Client,
    config: AgentConfig,
}

impl HttpBackend {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(AgentConfig::from_env())
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, self.config.endpoint(path));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        request
    }

    pub(crate) fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::POST, path)
            .timeout(self.config.request_timeout)
    }

    pub(crate) fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::GET, path)
            .timeout(self.config.request_timeout)
    }

    /// POST without an overall deadline; a streamed body stays open for as
    /// long as the agent keeps talking.
    fn post_streaming(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::POST, path)
            .header("accept", "text/event-stream")
    }

    pub(crate) async fn expect_success(
        response: reqwest::Response,
    ) -> ApiResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Status { status, body })
        }
    }
}

#[async_trait]
impl AgentBackend for HttpBackend {
    async fn chat(&self, message: &str) -> ApiResult<TextPayload> {
        let response = self
            .post("/chat")
            .form(&[("message", message)])
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn chat_stream(&self, message: &str) -> ApiResult<EventStream> {
        let response = self
            .post_streaming("/chat/stream")
            .form(&[("message", message)])
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(EventStream::from_response(response))
    }

    async fn doc_chat_stream(
        &self,
        question: &str,
        source: DocSource<'_>,
    ) -> ApiResult<EventStream> {
        let mut form = Form::new().text("question", question.to_string());
        match source {
            DocSource::Upload(attachment) => {
                let part = Part::bytes(attachment.bytes.clone())
                    .file_name(attachment.file_name.clone());
                form = form.part("file", part);
            }
            DocSource::Existing {
                assistant_id,
                thread_id,
            } => {
                form = form.text("assistant_id", assistant_id.to_string());
                if let Some(thread_id) = thread_id {
                    form = form.text("thread_id", thread_id.to_string());
                }
            }
        }
        let response = self
            .post_streaming("/rag/chat/stream")
            .multipart(form)
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(EventStream::from_response(response))
    }

    async fn search(&self, query: &str) -> ApiResult<SearchPayload> {
        let response = self
            .post("/search")
            .json(&SearchRequest { q: query, start: 1 })
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn doc_answer(&self, question: &str, assistant_id: &str) -> ApiResult<DocAnswerPayload> {
        let response = self
            .post("/rag/chat")
            .form(&[("question", question), ("assistant_id", assistant_id)])
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }
}
