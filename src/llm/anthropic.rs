use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{ChatCompletion, ChatOptions, LanguageModelClient, Role, ToolCall, Usage};
use crate::error::InferenceError;

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const EXTRACT_TOOL: &str = "extract_data";
const DEFAULT_MAX_TOKENS: u32 = 1500;

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self::with_url(api_key, DEFAULT_API_URL.to_string())
    }

    pub fn with_url(api_key: String, api_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url,
        }
    }

    fn build_body(options: &ChatOptions) -> Value {
        let system: Vec<&str> = options
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut messages: Vec<Value> = options
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::Assistant {
                    "assistant"
                } else {
                    "user"
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        if let Some(image) = &options.image {
            let mut content = vec![json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.media_type(),
                    "data": image.base64(),
                }
            })];
            if let Some(description) = &image.description {
                content.push(json!({ "type": "text", "text": description }));
            }
            messages.push(json!({ "role": "user", "content": content }));
        }

        let mut obj = Map::new();
        obj.insert("model".into(), json!(options.model));
        obj.insert(
            "max_tokens".into(),
            json!(options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        obj.insert("messages".into(), json!(messages));
        if !system.is_empty() {
            obj.insert("system".into(), json!(system.join("\n")));
        }
        if let Some(t) = options.temperature {
            obj.insert("temperature".into(), json!(t));
        }
        if !options.tools.is_empty() {
            let tools: Vec<Value> = options
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            obj.insert("tools".into(), json!(tools));
        }
        Value::Object(obj)
    }

    async fn send(&self, body: &Value) -> Result<ApiResponse, InferenceError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(text);
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl LanguageModelClient for AnthropicClient {
    async fn chat_completion(&self, options: ChatOptions) -> Result<ChatCompletion, InferenceError> {
        debug!(category = "anthropic", model = %options.model, "Creating chat completion");
        let body = Self::build_body(&options);
        let completion = self.send(&body).await?.into_completion();
        debug!(
            category = "anthropic",
            tool_calls = completion.tool_calls.len(),
            finish_reason = ?completion.finish_reason,
            "Transformed response"
        );
        Ok(completion)
    }

    async fn structured_extraction(
        &self,
        options: ChatOptions,
        schema: &Value,
    ) -> Result<Value, InferenceError> {
        debug!(category = "anthropic", model = %options.model, "Creating extraction");
        let mut body = Self::build_body(&options);
        body["tools"] = json!([{
            "name": EXTRACT_TOOL,
            "description": "Extracts specific data from the given content based on the provided schema.",
            "input_schema": schema,
        }]);
        body["tool_choice"] = json!({ "type": "tool", "name": EXTRACT_TOOL });

        let completion = self.send(&body).await?.into_completion();
        let extracted = completion
            .tool_calls
            .into_iter()
            .find(|call| call.name == EXTRACT_TOOL)
            .map(|call| call.arguments)
            .ok_or_else(|| {
                InferenceError::MalformedResponse(
                    "Extraction failed: no tool use with input in response".into(),
                )
            })?;
        debug!(category = "anthropic", "Extracted data: {extracted}");
        Ok(extracted)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl ApiResponse {
    fn into_completion(self) -> ChatCompletion {
        let mut content = None;
        let mut tool_calls = Vec::new();
        for block in self.content {
            match block {
                ContentBlock::Text { text } if content.is_none() => content = Some(text),
                ContentBlock::ToolUse { name, input } => {
                    tool_calls.push(ToolCall {
                        name,
                        arguments: input,
                    })
                }
                _ => {}
            }
        }
        let usage = self
            .usage
            .map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            })
            .unwrap_or_default();
        ChatCompletion {
            content,
            tool_calls,
            finish_reason: self.stop_reason,
            usage,
        }
    }
}
