//! OpenAI Responses API types
//!
//! These types match the OpenAI Responses API format and are used for
//! serialization/deserialization when communicating with OpenAI's servers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// OpenAI `/responses` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIRequest {
    pub model: String,

    pub input: Vec<OpenAIInputItem>,

    /// System prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<OpenAITool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    /// Native structured output configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<OpenAITextConfig>,

    /// Caller passthrough options
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input item sent back to OpenAI.
///
/// Output items carry a `status` field that the input schema does not accept;
/// the function call variant omits it. Reasoning and unrecognized output items
/// are replayed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAIInputItem {
    Message {
        role: String,
        content: String,
    },
    FunctionCall {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
    Reasoning {
        #[serde(flatten)]
        rest: Map<String, Value>,
    },
    #[serde(untagged)]
    Other(Value),
}

/// Function tool declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAITool {
    #[serde(rename = "type")]
    pub tool_type: String,

    pub name: String,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub description: String,

    pub parameters: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// `text` request field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAITextConfig {
    pub format: OpenAITextFormat,
}

/// `text.format` request field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAITextFormat {
    #[serde(rename = "type")]
    pub format_type: String,

    pub name: String,

    pub schema: Value,

    pub strict: bool,
}

/// OpenAI `/responses` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub model: String,

    /// `completed`, `incomplete`, `failed`, ...
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<String>,

    #[serde(default)]
    pub output: Vec<OpenAIOutputItem>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub incomplete_details: Option<OpenAIIncompleteDetails>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usage: Option<OpenAIUsage>,
}

/// Item of the response `output` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAIOutputItem {
    Message {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        id: Option<String>,
        #[serde(default)]
        role: String,
        #[serde(default)]
        content: Vec<OpenAIOutputContent>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        status: Option<String>,
    },
    FunctionCall {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        id: Option<String>,
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        status: Option<String>,
    },
    Reasoning {
        #[serde(flatten)]
        rest: Map<String, Value>,
    },
    /// Output item types this adapter does not model, kept as received
    #[serde(untagged)]
    Other(Value),
}

/// Content part of an output message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAIOutputContent {
    OutputText { text: String },
    Refusal { refusal: String },
    #[serde(untagged)]
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIIncompleteDetails {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Token usage as reported by OpenAI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIUsage {
    #[serde(default)]
    pub input_tokens: u64,

    #[serde(default)]
    pub output_tokens: u64,

    #[serde(default)]
    pub total_tokens: u64,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_tokens_details: Option<OpenAIOutputTokensDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIOutputTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u64,
}
