//! Inference gateway: the four model operations the controllers rely on,
//! plus a plain question/answer call.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::InferenceError;
use crate::llm::{ChatCompletion, ChatOptions, Image, LlmProvider};
use crate::prompt::{self, DO_ACTION_TOOL, SKIP_SECTION_TOOL};
use crate::schema::Schema;
use crate::types::{ActionDecision, ElementId, MAX_RETRIES, Method};

const NO_MATCH: &str = "NONE";

/// Inputs for one extraction round over a chunk.
#[derive(Debug, Clone, Copy)]
pub struct ExtractRequest<'a> {
    pub instruction: &'a str,
    pub progress: &'a str,
    /// Accumulator so far, already unwrapped.
    pub previous: &'a Value,
    pub dom_elements: &'a str,
    pub schema: &'a Schema,
    pub chunks_seen: usize,
    pub chunks_total: usize,
}

/// Refined payload (still in request shape) and completion metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    pub payload: Value,
    pub progress: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Element(ElementId),
    NoMatch,
}

#[derive(Debug, Deserialize)]
struct DoActionArgs {
    method: String,
    #[serde(deserialize_with = "element_id")]
    element: ElementId,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    step: String,
    #[serde(default)]
    why: Option<String>,
    #[serde(default)]
    completed: bool,
}

/// Accept ids sent either as numbers or as numeric strings.
fn element_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ElementId, D::Error> {
    use serde::de::Error;
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| ElementId::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid element id {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid element id {s:?}"))),
        other => Err(D::Error::custom(format!("invalid element id {other}"))),
    }
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    progress: String,
    #[serde(default)]
    completed: bool,
}

enum ToolChoice {
    Act(ActionDecision),
    Skip,
    Nothing(String),
}

fn interpret(completion: &ChatCompletion) -> ToolChoice {
    let Some(call) = completion.tool_calls.first() else {
        return ToolChoice::Nothing("no tool calls in response".into());
    };
    match call.name.as_str() {
        SKIP_SECTION_TOOL => ToolChoice::Skip,
        DO_ACTION_TOOL => match serde_json::from_value::<DoActionArgs>(call.arguments.clone()) {
            Ok(args) => ToolChoice::Act(ActionDecision {
                element: args.element,
                method: Method::from(args.method.as_str()),
                args: args.args,
                step: args.step,
                why: args.why.unwrap_or_default(),
                completed: args.completed,
            }),
            Err(e) => ToolChoice::Nothing(format!("invalid {DO_ACTION_TOOL} arguments: {e}")),
        },
        other => ToolChoice::Nothing(format!("unknown tool {other}")),
    }
}

pub struct InferenceGateway {
    provider: LlmProvider,
}

impl InferenceGateway {
    pub fn new(provider: LlmProvider) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    pub fn supports_vision(&self, model: &str) -> bool {
        self.provider.supports_vision(model)
    }

    /// Next action for `goal`, or `None` when the model skips this chunk or
    /// never produces a usable tool call.
    pub async fn decide_action(
        &self,
        model: &str,
        goal: &str,
        steps: &str,
        dom_elements: &str,
        screenshot: Option<Vec<u8>>,
    ) -> Result<Option<ActionDecision>, InferenceError> {
        let client = self.provider.client(model)?;
        let image = screenshot.map(|shot| Image::new(shot, prompt::ANNOTATED_SCREENSHOT_TEXT));

        for attempt in 0..=MAX_RETRIES {
            let options = ChatOptions::new(
                model,
                vec![
                    prompt::build_act_system_prompt(),
                    prompt::build_act_user_prompt(goal, steps, dom_elements),
                ],
            )
            .with_tools(prompt::act_tools())
            .with_image(image.clone());

            let completion = client.chat_completion(options).await?;
            match interpret(&completion) {
                ToolChoice::Act(decision) => {
                    debug!(category = "inference", ?decision, "Model chose an action");
                    return Ok(Some(decision));
                }
                ToolChoice::Skip => {
                    debug!(category = "inference", "Model skipped this section");
                    return Ok(None);
                }
                ToolChoice::Nothing(reason) => {
                    warn!(category = "inference", attempt, "No actionable tool call: {reason}");
                }
            }
        }

        error!(category = "inference", "No tool calls found in response");
        Ok(None)
    }

    /// Whether `goal` looks reached. Unreadable answers count as not completed.
    pub async fn verify_completion(
        &self,
        model: &str,
        goal: &str,
        steps: &str,
        screenshot: Option<Vec<u8>>,
        dom_elements: Option<&str>,
    ) -> Result<bool, InferenceError> {
        let client = self.provider.client(model)?;
        let options = ChatOptions::new(
            model,
            vec![
                prompt::build_verify_system_prompt(),
                prompt::build_verify_user_prompt(goal, steps, dom_elements),
            ],
        )
        .with_image(screenshot.map(|shot| Image::new(shot, prompt::FULL_PAGE_SCREENSHOT_TEXT)));

        match client
            .structured_extraction(options, &prompt::verify_schema())
            .await
        {
            Ok(response) => match response.get("completed").and_then(Value::as_bool) {
                Some(completed) => Ok(completed),
                None => {
                    error!(category = "inference", %response, "Missing 'completed' field in response");
                    Ok(false)
                }
            },
            Err(e @ (InferenceError::MalformedResponse(_) | InferenceError::EmptyResponse)) => {
                error!(category = "inference", "Unexpected verification response: {e}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Extract from one chunk, merge with the accumulator, then classify completion.
    pub async fn extract(
        &self,
        model: &str,
        request: ExtractRequest<'_>,
    ) -> Result<ExtractionOutcome, InferenceError> {
        let client = self.provider.client(model)?;
        let schema = request.schema;
        let wire_schema = schema.request_schema().to_json_schema();

        let extracted = client
            .structured_extraction(
                ChatOptions::new(
                    model,
                    vec![
                        prompt::build_extract_system_prompt(),
                        prompt::build_extract_user_prompt(request.instruction, request.dom_elements),
                    ],
                ),
                &wire_schema,
            )
            .await?;
        let extracted = schema.unwrap_payload(extracted);
        debug!(category = "inference", %extracted, "Extracted from chunk");

        let refined = client
            .structured_extraction(
                ChatOptions::new(
                    model,
                    vec![
                        prompt::build_refine_system_prompt(),
                        prompt::build_refine_user_prompt(
                            request.instruction,
                            request.previous,
                            &extracted,
                        ),
                    ],
                ),
                &wire_schema,
            )
            .await?;
        debug!(category = "inference", %refined, "Refined extraction");

        let metadata = client
            .structured_extraction(
                ChatOptions::new(
                    model,
                    vec![
                        prompt::build_metadata_system_prompt(),
                        prompt::build_metadata_prompt(
                            request.instruction,
                            &schema.unwrap_payload(refined.clone()),
                            request.chunks_seen,
                            request.chunks_total,
                        ),
                    ],
                ),
                &prompt::metadata_schema(),
            )
            .await?;
        let metadata: Metadata = serde_json::from_value(metadata)
            .map_err(|e| InferenceError::MalformedResponse(format!("extraction metadata: {e}")))?;

        info!(
            category = "inference",
            completed = metadata.completed,
            "Extraction progress: {}",
            metadata.progress
        );
        Ok(ExtractionOutcome {
            payload: refined,
            progress: metadata.progress,
            completed: metadata.completed,
        })
    }

    /// Element id matching `description`, or [`Observation::NoMatch`].
    pub async fn observe(
        &self,
        model: &str,
        description: &str,
        dom_elements: &str,
    ) -> Result<Observation, InferenceError> {
        let client = self.provider.client(model)?;
        let completion = client
            .chat_completion(ChatOptions::new(
                model,
                vec![
                    prompt::build_observe_system_prompt(),
                    prompt::build_observe_user_message(description, dom_elements),
                ],
            ))
            .await?;

        let content = completion
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(InferenceError::EmptyResponse)?;
        parse_observation(&content)
    }

    pub async fn ask(&self, model: &str, question: &str) -> Result<String, InferenceError> {
        let client = self.provider.client(model)?;
        let completion = client
            .chat_completion(ChatOptions::new(
                model,
                vec![
                    prompt::build_ask_system_prompt(),
                    prompt::build_ask_user_prompt(question),
                ],
            ))
            .await?;
        completion.content.ok_or(InferenceError::EmptyResponse)
    }
}

fn parse_observation(content: &str) -> Result<Observation, InferenceError> {
    let token = content.trim_matches(|c: char| c.is_whitespace() || "\"'`.[]".contains(c));
    if token.eq_ignore_ascii_case(NO_MATCH) {
        return Ok(Observation::NoMatch);
    }
    token
        .parse()
        .map(Observation::Element)
        .map_err(|_| InferenceError::MalformedResponse(format!("expected an element id, got {content:?}")))
}
