//! LLM endpoint abstraction and the Ollama implementation.

use crate::agent::errors::LlmError;
use crate::agent::tools::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Message in the chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallMessage>>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::plain(Role::Tool, content)
    }

    /// Assistant turn, carrying its tool calls when there are any.
    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallMessage>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallMessage {
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Usually an object; some models send a JSON-encoded string.
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallMessage {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            function: ToolCallFunction {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// One model turn: text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    pub content: String,
    pub tool_calls: Vec<ToolCallMessage>,
}

/// A chat endpoint that supports tool calling.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `system` followed by `messages`, offering `tools`.
    async fn chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply, LlmError>;

    /// Check that the endpoint is reachable.
    async fn ping(&self) -> Result<(), LlmError>;

    fn model_name(&self) -> &str;
}

/// Connection settings for [`OllamaClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    /// No timeout when unset.
    pub timeout_seconds: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_seconds: None,
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
    tools: &'a [ToolDefinition],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallMessage>>,
}

impl From<ResponseMessage> for AssistantReply {
    fn from(message: ResponseMessage) -> Self {
        Self {
            content: message.content,
            tool_calls: message.tool_calls.unwrap_or_default(),
        }
    }
}

/// [`ChatClient`] backed by a local Ollama server.
pub struct OllamaClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: ClientConfig) -> Result<Self, LlmError> {
        let mut builder = reqwest::Client::builder();
        if let Some(seconds) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        let http_client = builder
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.ollama_url.trim_end_matches('/'), path)
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                seconds: self.config.timeout_seconds.unwrap_or_default(),
            }
        } else if e.is_connect() {
            LlmError::Connection {
                url: self.config.ollama_url.clone(),
            }
        } else {
            LlmError::Request(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(LlmError::Http { status, body })
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn chat(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply, LlmError> {
        let preamble = ChatMessage::system(system);
        let request = OllamaChatRequest {
            model: &self.config.model_name,
            messages: std::iter::once(&preamble).chain(messages).collect(),
            tools,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        debug!("Sending chat request with {} messages", messages.len());

        let response = self
            .http_client
            .post(self.endpoint("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let chat_response: OllamaChatResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        Ok(chat_response.message.into())
    }

    async fn ping(&self) -> Result<(), LlmError> {
        let response = self
            .http_client
            .get(self.endpoint("/api/tags"))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        Self::check_status(response).await?;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}
