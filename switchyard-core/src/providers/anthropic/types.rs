//! Anthropic Messages API types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Anthropic `/messages` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicRequest {
    pub model: String,

    pub messages: Vec<AnthropicMessage>,

    /// Required by the API
    pub max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<AnthropicTool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    /// Caller passthrough options
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One conversation turn; roles must alternate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: Vec<AnthropicContentBlock>,
}

/// Content block of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not", default)]
        is_error: bool,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: String,
    },
    RedactedThinking {
        data: String,
    },
    /// Block types this adapter does not model, kept as received
    #[serde(untagged)]
    Unknown(Value),
}

/// Tool declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicTool {
    pub name: String,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub description: String,

    pub input_schema: Value,
}

/// Anthropic `/messages` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub content: Vec<AnthropicContentBlock>,

    /// `end_turn`, `tool_use`, `max_tokens`, `stop_sequence`, ...
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stop_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usage: Option<AnthropicUsage>,
}

/// Token usage as reported by Anthropic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u64,

    #[serde(default)]
    pub output_tokens: u64,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cache_creation_input_tokens: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cache_read_input_tokens: Option<u64>,
}
