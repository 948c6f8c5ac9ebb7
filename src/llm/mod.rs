//! Normalized language-model capability and the model registry.
//!
//! Each backend hides its payload shapes behind [`LanguageModelClient`];
//! [`LlmProvider`] picks the backend for a model name.

mod anthropic;
mod openai;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::InferenceError;

pub use anthropic::AnthropicClient;
pub use openai::OpenAIClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Screenshot attached to a request as an extra user message.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub buffer: Vec<u8>,
    pub description: Option<String>,
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

impl Image {
    pub fn new(buffer: Vec<u8>, description: impl Into<String>) -> Self {
        Self {
            buffer,
            description: Some(description.into()),
        }
    }

    pub fn media_type(&self) -> &'static str {
        if self.buffer.starts_with(PNG_SIGNATURE) {
            "image/png"
        } else {
            "image/jpeg"
        }
    }

    pub fn base64(&self) -> String {
        STANDARD.encode(&self.buffer)
    }
}

/// Function the model may call.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

/// Backend-independent request.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub max_tokens: Option<u32>,
    pub image: Option<Image>,
    pub tools: Vec<Tool>,
}

impl ChatOptions {
    /// Request with the low-temperature sampling used by every gateway call.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: Some(0.1),
            top_p: Some(1.0),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.0),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: Option<Image>) -> Self {
        self.image = image;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    /// Parsed arguments; a string when the backend sent unparsable JSON.
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Backend-independent response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    async fn chat_completion(&self, options: ChatOptions) -> Result<ChatCompletion, InferenceError>;

    /// Ask for a JSON object conforming to `schema`, an object-rooted JSON Schema.
    async fn structured_extraction(
        &self,
        options: ChatOptions,
        schema: &Value,
    ) -> Result<Value, InferenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    OpenAI,
    Anthropic,
}

impl Backend {
    pub fn api_key_var(self) -> &'static str {
        match self {
            Backend::OpenAI => "OPENAI_API_KEY",
            Backend::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub backend: Backend,
    pub vision: bool,
}

const BUILTIN_MODELS: &[(&str, Backend, bool)] = &[
    ("gpt-4o", Backend::OpenAI, true),
    ("gpt-4o-mini", Backend::OpenAI, true),
    ("gpt-4o-2024-08-06", Backend::OpenAI, true),
    ("o1-preview", Backend::OpenAI, false),
    ("o1-mini", Backend::OpenAI, false),
    ("claude-3-5-sonnet-20240620", Backend::Anthropic, true),
    ("claude-3-5-sonnet-latest", Backend::Anthropic, true),
];

/// Model-name to backend lookup plus one client per configured backend.
#[derive(Clone)]
pub struct LlmProvider {
    models: HashMap<String, ModelInfo>,
    clients: HashMap<Backend, Arc<dyn LanguageModelClient>>,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmProvider {
    /// Built-in model table without any backend clients.
    pub fn new() -> Self {
        let models = BUILTIN_MODELS
            .iter()
            .map(|(name, backend, vision)| {
                (
                    name.to_string(),
                    ModelInfo {
                        backend: *backend,
                        vision: *vision,
                    },
                )
            })
            .collect();
        Self {
            models,
            clients: HashMap::new(),
        }
    }

    /// Register a client for every backend whose API key is set.
    pub fn from_env() -> Self {
        let mut provider = Self::new();
        if let Ok(key) = std::env::var(Backend::OpenAI.api_key_var()) {
            provider = provider.with_client(Backend::OpenAI, Arc::new(OpenAIClient::new(key)));
        }
        if let Ok(key) = std::env::var(Backend::Anthropic.api_key_var()) {
            provider =
                provider.with_client(Backend::Anthropic, Arc::new(AnthropicClient::new(key)));
        }
        provider
    }

    pub fn with_client(mut self, backend: Backend, client: Arc<dyn LanguageModelClient>) -> Self {
        self.clients.insert(backend, client);
        self
    }

    pub fn register_model(&mut self, name: impl Into<String>, backend: Backend, vision: bool) {
        self.models
            .insert(name.into(), ModelInfo { backend, vision });
    }

    pub fn model_info(&self, model: &str) -> Option<ModelInfo> {
        self.models.get(model).copied()
    }

    pub fn supports_vision(&self, model: &str) -> bool {
        self.model_info(model).is_some_and(|info| info.vision)
    }

    pub fn client(&self, model: &str) -> Result<Arc<dyn LanguageModelClient>, InferenceError> {
        let info = self
            .model_info(model)
            .ok_or_else(|| InferenceError::UnsupportedModel(model.to_string()))?;
        self.clients
            .get(&info.backend)
            .cloned()
            .ok_or_else(|| InferenceError::MissingCredentials(info.backend.api_key_var().into()))
    }
}

/// Parse a JSON object out of model text, tolerating markdown fences.
pub(crate) fn parse_json_content(content: &str) -> Result<Value, InferenceError> {
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(cleaned)
        .map_err(|e| InferenceError::MalformedResponse(format!("{e}: {cleaned}")))
}

/// Parse tool-call arguments sent as a JSON string.
pub(crate) fn parse_arguments(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
