//! OpenRouter chat completion types
//!
//! OpenRouter speaks the OpenAI chat completions dialect. Only the fields the
//! adapter reads or writes are typed; everything else passes through `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterRequest {
    pub model: String,

    pub messages: Vec<OpenRouterMessage>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<OpenRouterTool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<OpenRouterResponseFormat>,

    /// Caller passthrough options
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterMessage {
    pub role: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<OpenRouterToolCall>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
}

impl OpenRouterMessage {
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Function call requested by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterFunctionCall {
    pub name: String,

    #[serde(default)]
    pub arguments: String,
}

/// Tool call entry of an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterToolCall {
    pub id: String,

    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,

    pub function: OpenRouterFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

/// Tool definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterTool {
    #[serde(rename = "type")]
    pub tool_type: String,

    pub function: OpenRouterFunction,
}

/// Function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterFunction {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub parameters: Value,
}

/// `response_format` request field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<Value>,
}

/// Chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub choices: Vec<OpenRouterChoice>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usage: Option<OpenRouterUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterChoice {
    #[serde(default)]
    pub index: usize,

    pub message: OpenRouterMessage,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finish_reason: Option<String>,
}

/// Usage information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterUsage {
    #[serde(default)]
    pub prompt_tokens: u64,

    #[serde(default)]
    pub completion_tokens: u64,

    #[serde(default)]
    pub total_tokens: u64,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completion_tokens_details: Option<OpenRouterCompletionDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterCompletionDetails {
    #[serde(default)]
    pub reasoning_tokens: u64,
}
