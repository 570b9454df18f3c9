use std::time::Duration;

use async_trait::async_trait;
use quill_core::{LlmConfig, QuillError};
use serde::{Deserialize, Serialize};

use crate::prompt::strip_code_fences;
use crate::services::{GenerateRequest, ModelService};

const ERROR_BODY_CHARS: usize = 200;

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use quill_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Summarize this change");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use quill_review::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes an OpenAI-style chat completions
/// endpoint: OpenAI, Anthropic's compatibility layer, Gemini, Ollama, vLLM,
/// LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use quill_core::LlmConfig;
/// use quill_review::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: Option<String>,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// The API key is resolved once, from config or the provider's
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, QuillError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| QuillError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.resolved_api_key(),
            config: config.clone(),
        })
    }

    /// Full URL of the chat completions endpoint.
    ///
    /// A base URL that already names an API version (`.../v1`,
    /// `.../v1beta/openai`) is used as is; otherwise `/v1` is added.
    pub fn endpoint(&self) -> String {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or_else(|| default_base_url(&self.config.provider))
            .trim_end_matches('/');
        if has_version_segment(base_url) {
            format!("{base_url}/chat/completions")
        } else {
            format!("{base_url}/v1/chat/completions")
        }
    }

    /// Send a chat completion request and return the text response.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Llm`] on HTTP errors or response parsing failures.
    pub async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
    ) -> Result<String, QuillError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": temperature,
            "response_format": { "type": "json_object" },
        });

        let mut request = self.client.post(self.endpoint());
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        request = request.header("Content-Type", "application/json");

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| QuillError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(QuillError::Llm(format!(
                "LLM API error {status}: {}",
                body_text.chars().take(ERROR_BODY_CHARS).collect::<String>()
            )));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QuillError::Llm(format!("failed to parse response: {e}")))?;

        extract_content(&response_body).map(str::to_string)
    }
}

#[async_trait]
impl ModelService for LlmClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, request: GenerateRequest) -> Result<serde_json::Value, QuillError> {
        let messages = vec![
            ChatMessage::system(request.system),
            ChatMessage::user(request.prompt),
        ];
        let content = self.chat(messages, request.temperature).await?;
        parse_json_content(&content, request.shape)
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "https://api.anthropic.com",
        "gemini" => "https://generativelanguage.googleapis.com/v1beta/openai",
        "ollama" => "http://localhost:11434",
        _ => "https://api.openai.com",
    }
}

/// True when a path segment after the host looks like `v1` or `v1beta`.
fn has_version_segment(base_url: &str) -> bool {
    let path = base_url
        .split_once("://")
        .map_or(base_url, |(_, rest)| rest)
        .split_once('/')
        .map_or("", |(_, path)| path);
    path.split('/').any(|segment| {
        segment
            .strip_prefix('v')
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_digit())
    })
}

fn extract_content(response: &serde_json::Value) -> Result<&str, QuillError> {
    response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| QuillError::Llm(format!("unexpected response structure: {response}")))
}

fn parse_json_content(content: &str, shape: &str) -> Result<serde_json::Value, QuillError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fences(content))
        .map_err(|e| QuillError::Validation(format!("{shape} response is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(QuillError::Validation(format!(
            "{shape} response is not a JSON object"
        )));
    }
    Ok(value)
}
