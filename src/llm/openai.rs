use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{
    ChatCompletion, ChatOptions, LanguageModelClient, Role, ToolCall, Usage, parse_arguments,
    parse_json_content,
};
use crate::error::InferenceError;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAIClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: String) -> Self {
        Self::with_url(api_key, DEFAULT_API_URL.to_string())
    }

    /// Client for an OpenAI-compatible endpoint.
    pub fn with_url(api_key: String, api_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url,
        }
    }

    fn build_body(options: &ChatOptions) -> Value {
        let mut messages: Vec<Value> = options
            .messages
            .iter()
            .map(|m| json!({ "role": role_name(m.role), "content": m.content }))
            .collect();

        if let Some(image) = &options.image {
            let mut content = vec![json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{};base64,{}", image.media_type(), image.base64())
                }
            })];
            if let Some(description) = &image.description {
                content.push(json!({ "type": "text", "text": description }));
            }
            messages.push(json!({ "role": "user", "content": content }));
        }

        let mut obj = Map::new();
        obj.insert("model".into(), json!(options.model));
        obj.insert("messages".into(), json!(messages));
        if let Some(t) = options.temperature {
            obj.insert("temperature".into(), json!(t));
        }
        if let Some(p) = options.top_p {
            obj.insert("top_p".into(), json!(p));
        }
        if let Some(p) = options.frequency_penalty {
            obj.insert("frequency_penalty".into(), json!(p));
        }
        if let Some(p) = options.presence_penalty {
            obj.insert("presence_penalty".into(), json!(p));
        }
        if let Some(max) = options.max_tokens {
            obj.insert("max_tokens".into(), json!(max));
        }
        if !options.tools.is_empty() {
            let tools: Vec<Value> = options
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            obj.insert("tools".into(), json!(tools));
            obj.insert("tool_choice".into(), json!("auto"));
        }
        Value::Object(obj)
    }

    async fn send(&self, body: &Value) -> Result<ApiResponse, InferenceError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl LanguageModelClient for OpenAIClient {
    async fn chat_completion(&self, options: ChatOptions) -> Result<ChatCompletion, InferenceError> {
        debug!(category = "openai", model = %options.model, "Creating chat completion");
        let body = Self::build_body(&options);
        let response = self.send(&body).await?;
        let completion = response.into_completion()?;
        debug!(
            category = "openai",
            tool_calls = completion.tool_calls.len(),
            finish_reason = ?completion.finish_reason,
            "Response from OpenAI"
        );
        Ok(completion)
    }

    async fn structured_extraction(
        &self,
        options: ChatOptions,
        schema: &Value,
    ) -> Result<Value, InferenceError> {
        debug!(category = "openai", model = %options.model, "Creating extraction");
        let mut body = Self::build_body(&options);
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": { "name": "extraction", "schema": schema },
        });
        let completion = self.send(&body).await?.into_completion()?;
        let content = completion
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(InferenceError::EmptyResponse)?;
        debug!(category = "openai", "Extracted data: {content}");
        parse_json_content(&content)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl ApiResponse {
    fn into_completion(self) -> Result<ChatCompletion, InferenceError> {
        let usage = self
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::MalformedResponse("response has no choices".into()))?;
        Ok(ChatCompletion {
            content: choice.message.content,
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|c| ToolCall {
                    arguments: parse_arguments(&c.function.arguments),
                    name: c.function.name,
                })
                .collect(),
            finish_reason: choice.finish_reason,
            usage,
        })
    }
}
