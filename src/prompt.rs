//! Prompt text and the act tools. Everything here is pure.

use serde_json::{Value, json};

use crate::llm::{ChatMessage, Tool};

pub const DO_ACTION_TOOL: &str = "doAction";
pub const SKIP_SECTION_TOOL: &str = "skipSection";

pub const ANNOTATED_SCREENSHOT_TEXT: &str = "This is a screenshot of the current page state with the elements annotated on it. Each element id is annotated with a number to the top left of it. Duplicate annotations at the same location are under each other vertically.";

pub const FULL_PAGE_SCREENSHOT_TEXT: &str = "This is a screenshot of the whole visible page.";

const ACT_SYSTEM_PROMPT: &str = "\
# Instructions
You are a browser automation assistant. Your job is to accomplish the user's goal across multiple model calls.

You are given:
1. the user's overall goal
2. the steps that you've taken so far
3. a list of active DOM elements in this chunk to consider to get closer to the goal.

You have 2 tools that you can call: doAction, and skipSection. Do action only performs browser actions on the listed elements. Do not perform any other actions.

Note: If there is a popup on the page for cookies or advertising that has nothing to do with the goal, try to close it first before proceeding. As this can block the goal from being completed.

Also, verify if the goal has been accomplished already. Do this by checking if the goal has been accomplished based on the previous steps completed, the current page DOM elements and the current page URL / starting page URL. If it has, set completed to true and finish the task.

Do exactly what the user's goal is. Do not exceed the scope of the goal.
";

const VERIFY_SYSTEM_PROMPT: &str = "\
You are a browser automation assistant. The job has given you a goal and a list of steps that have been taken so far. Your job is to determine if the user's goal has been completed based on the provided information.

# Input
You will receive:
1. The user's goal: A clear description of what the user wants to achieve.
2. Steps taken so far: A list of actions that have been performed up to this point.
3. An image of the current page, or the active DOM elements of the current page

# Your Task
Analyze the provided information to determine if the user's goal has been fully completed.

# Output
Return a JSON object with a single boolean field named completed:
- true: If the goal has been definitively completed based on the steps taken and the current page.
- false: If the goal has not been completed or if there's any uncertainty about its completion.

# Important Considerations
- False positives are okay. False negatives are not okay.
- Look for evidence of errors on the page or something having gone wrong in completing the goal. If one does not exist, return true.
";

const EXTRACT_SYSTEM_PROMPT: &str = "You are extracting content on behalf of a user. You will be given: 1. An instruction 2. A list of DOM elements to extract from. Return the exact text from the DOM elements with all symbols, characters, and endlines as is. Only extract new information that has not already been extracted. Return null or an empty string if no new information is found.";

const REFINE_SYSTEM_PROMPT: &str = "\
You are tasked with refining and filtering information for the final output based on newly extracted and previously extracted content. Your responsibilities are:
1. Remove exact duplicates for elements in arrays and objects.
2. For text fields, append or update relevant text if the new content is an extension, replacement, or continuation.
3. For non-text fields (e.g., numbers, booleans), update with new values if they differ.
4. Add any completely new fields or objects.

Return the updated content that includes both the previous content and the new, non-duplicate, or extended information.";

const METADATA_SYSTEM_PROMPT: &str = "\
You are an AI assistant tasked with evaluating the progress and completion status of an extraction task.
Analyze the extraction response and determine if the task is completed or if more information is needed.

Strictly abide by the following criteria:
1. If you are certain that the instruction is completed, set the completion status to true, even if there are still chunks left.
2. If there could still be more information to extract and there are still chunks left, set the completion status to false.";

const OBSERVE_SYSTEM_PROMPT: &str = "You are helping the user automate the browser by finding the element matching a description. You will be given an instruction of the element to find, and a numbered list of possible elements. Return only the element id we are looking for. If the element is not found, return NONE.";

const ASK_SYSTEM_PROMPT: &str =
    "You are a simple question answering assistant given the user's question. Respond with only the answer.";

pub fn build_act_system_prompt() -> ChatMessage {
    ChatMessage::system(ACT_SYSTEM_PROMPT)
}

pub fn build_act_user_prompt(goal: &str, steps: &str, dom_elements: &str) -> ChatMessage {
    let steps = if steps.is_empty() { "None" } else { steps };
    ChatMessage::user(format!(
        "# My Goal\n{goal}\n\n# Steps You've Taken So Far\n{steps}\n\n# Current Active Dom Elements\n{dom_elements}\n"
    ))
}

pub fn act_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: DO_ACTION_TOOL.to_string(),
            description: "execute the next browser step that directly accomplishes the goal"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "method": {
                        "type": "string",
                        "description": "The method to call on the element: click, fill, type or scrollIntoView"
                    },
                    "element": {
                        "type": "integer",
                        "description": "The id of the element to act on"
                    },
                    "args": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Arguments for the method, e.g. the text to fill"
                    },
                    "step": {
                        "type": "string",
                        "description": "Human readable description of the step"
                    },
                    "why": {
                        "type": "string",
                        "description": "Why this step moves toward the goal"
                    },
                    "completed": {
                        "type": "boolean",
                        "description": "Whether the goal is completed after this step"
                    }
                },
                "required": ["method", "element", "args", "step", "completed"]
            }),
        },
        Tool {
            name: SKIP_SECTION_TOOL.to_string(),
            description:
                "skips this area of the webpage because the current goal cannot be accomplished here"
                    .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reason": { "type": "string" }
                },
                "required": ["reason"]
            }),
        },
    ]
}

pub fn build_verify_system_prompt() -> ChatMessage {
    ChatMessage::system(VERIFY_SYSTEM_PROMPT)
}

pub fn build_verify_user_prompt(goal: &str, steps: &str, dom_elements: Option<&str>) -> ChatMessage {
    let steps = if steps.is_empty() { "None" } else { steps };
    let mut prompt = format!("# My Goal\n{goal}\n\n# Steps You've Taken So Far\n{steps}\n");
    if let Some(dom) = dom_elements {
        prompt.push_str(&format!("\n# Active DOM Elements on the current page\n{dom}\n"));
    }
    ChatMessage::user(prompt)
}

pub fn verify_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "completed": { "type": "boolean" } },
        "required": ["completed"]
    })
}

pub fn build_extract_system_prompt() -> ChatMessage {
    ChatMessage::system(EXTRACT_SYSTEM_PROMPT)
}

pub fn build_extract_user_prompt(instruction: &str, dom_elements: &str) -> ChatMessage {
    ChatMessage::user(format!(
        "Instruction: {instruction}\nDOM: {dom_elements}\nExtracted content:"
    ))
}

pub fn build_refine_system_prompt() -> ChatMessage {
    ChatMessage::system(REFINE_SYSTEM_PROMPT)
}

pub fn build_refine_user_prompt(instruction: &str, previous: &Value, newly: &Value) -> ChatMessage {
    ChatMessage::user(format!(
        "Instruction: {instruction}\nPreviously extracted content: {previous}\nNewly extracted content: {newly}\nRefined content:"
    ))
}

pub fn build_metadata_system_prompt() -> ChatMessage {
    ChatMessage::system(METADATA_SYSTEM_PROMPT)
}

pub fn build_metadata_prompt(
    instruction: &str,
    extracted: &Value,
    chunks_seen: usize,
    chunks_total: usize,
) -> ChatMessage {
    ChatMessage::user(format!(
        "Instruction: {instruction}\nExtracted content: {extracted}\nChunks seen: {chunks_seen}\nChunks total: {chunks_total}"
    ))
}

pub fn metadata_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "progress": { "type": "string" },
            "completed": { "type": "boolean" }
        },
        "required": ["progress", "completed"]
    })
}

pub fn build_observe_system_prompt() -> ChatMessage {
    ChatMessage::system(OBSERVE_SYSTEM_PROMPT)
}

pub fn build_observe_user_message(observation: &str, dom_elements: &str) -> ChatMessage {
    ChatMessage::user(format!("instruction: {observation}\nDOM: {dom_elements}"))
}

pub fn build_ask_system_prompt() -> ChatMessage {
    ChatMessage::system(ASK_SYSTEM_PROMPT)
}

pub fn build_ask_user_prompt(question: &str) -> ChatMessage {
    ChatMessage::user(format!("question: {question}"))
}
