use crate::types::ChatMessage;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

// ============================================
// Error Types
// ============================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("LLM endpoint error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("{0}")]
    Server(String),

    #[error("response contained no message content")]
    MissingContent,

    #[error("stream cancelled")]
    Cancelled,

    #[error("no data received for {0:?}")]
    Timeout(Duration),

    #[error("a reply is already in progress")]
    Busy,

    #[error("message is empty")]
    EmptyMessage,
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Decode(err.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

// ============================================
// Wire types
// ============================================

/// Outbound body for the chat endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_template_kwargs: Option<TemplateKwargs>,
    pub stream: bool,
}

/// Extra chat-template arguments understood by OpenAI-compatible servers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TemplateKwargs {
    pub reasoning_effort: String,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

/// Pulls `choices[0].message.content` out of a buffered completion body.
pub fn parse_completion(body: &str) -> ChatResult<String> {
    let parsed: CompletionResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or(ChatError::MissingContent)
}

// ============================================
// Backends
// ============================================

/// Raw chunks of a streamed response body, in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = ChatResult<Vec<u8>>> + Send>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// One buffered exchange returning the completion text.
    async fn complete(&self, request: &ChatRequest) -> ChatResult<String>;

    /// Starts a streamed exchange; the body is decoded by the caller.
    async fn open_stream(&self, request: &ChatRequest) -> ChatResult<ByteStream>;
}

/// Talks to an OpenAI-compatible chat endpoint over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn post(&self, request: &ChatRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn complete(&self, request: &ChatRequest) -> ChatResult<String> {
        let response = self.post(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_completion(&body)
    }

    async fn open_stream(&self, request: &ChatRequest) -> ChatResult<ByteStream> {
        let response = self
            .post(request)
            .header("accept", "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes_stream()
            .map(|item| item.map(|bytes| bytes.to_vec()).map_err(ChatError::from));
        Ok(Box::pin(body))
    }
}

// ============================================
// Model discovery
// ============================================

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

/// Asks `{base_url}/models` for the served models and returns the first id.
pub async fn detect_model(client: &Client, base_url: &str) -> anyhow::Result<String> {
    let url = format!("{}/models", base_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .timeout(Duration::from_secs(5))
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("model listing failed with {status}");
    }
    let listing: ModelList = response.json().await?;
    first_model_id(listing)
}

fn first_model_id(listing: ModelList) -> anyhow::Result<String> {
    listing
        .data
        .into_iter()
        .next()
        .map(|entry| entry.id)
        .ok_or_else(|| anyhow::anyhow!("model list is empty"))
}
