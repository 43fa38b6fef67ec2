//! Core protocol types for operate calls
//!
//! This module contains the vendor-agnostic data structures that flow through
//! the engine. The design prioritizes:
//! - An append-only conversation history shared by every vendor adapter
//! - Serialized tool arguments/results so any toolkit can sit behind the loop
//! - Normalized usage accounting regardless of vendor field names

use crate::providers::ProviderType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name reserved for the synthetic structured-output tool
pub const STRUCTURED_OUTPUT_TOOL: &str = "structured_output";

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions that guide the model's behavior
    System,
    /// User input message
    User,
    /// Assistant (model) response
    Assistant,
}

/// Status recorded on a tool output history item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Completed,
    Incomplete,
}

/// One entry of the conversation history
///
/// History is append-only: items are never mutated once pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryItem {
    /// A plain text message
    Message { role: MessageRole, content: String },

    /// A tool invocation requested by the model
    FunctionCall {
        name: String,
        arguments: String,
        call_id: String,
    },

    /// The output of a tool invocation, paired with a `FunctionCall` by `call_id`
    FunctionCallOutput {
        call_id: String,
        output: String,
        status: ToolCallStatus,
    },
}

impl HistoryItem {
    /// Create a message with the given role
    pub fn message(role: MessageRole, content: impl Into<String>) -> Self {
        Self::Message {
            role,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::message(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::message(MessageRole::Assistant, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::message(MessageRole::System, content)
    }

    /// Text content if this item is a message
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message { content, .. } => Some(content),
            _ => None,
        }
    }
}

/// Input accepted by `operate`: a bare prompt or prepared history items
#[derive(Debug, Clone, PartialEq)]
pub enum OperateInput {
    Text(String),
    Items(Vec<HistoryItem>),
}

impl OperateInput {
    /// Convert the input into history items
    pub fn into_items(self) -> Vec<HistoryItem> {
        match self {
            Self::Text(text) => vec![HistoryItem::user(text)],
            Self::Items(items) => items,
        }
    }
}

impl From<&str> for OperateInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OperateInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<HistoryItem>> for OperateInput {
    fn from(value: Vec<HistoryItem>) -> Self {
        Self::Items(value)
    }
}

impl From<HistoryItem> for OperateInput {
    fn from(value: HistoryItem) -> Self {
        Self::Items(vec![value])
    }
}

/// Tool definition exposed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, unique within one request
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Parameters schema (JSON Schema)
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool call extracted from a vendor response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier pairing the call with its result
    pub call_id: String,

    /// Name of the tool to call
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,

    /// Vendor-native payload needed to re-attach the call to vendor history
    #[serde(default)]
    pub raw: Value,
}

impl ToolCall {
    /// Whether this is the synthetic structured-output call
    pub fn is_structured_output(&self) -> bool {
        self.name == STRUCTURED_OUTPUT_TOOL
    }

    /// Parse arguments as JSON; empty arguments parse as an empty object
    pub fn arguments_json(&self) -> Result<Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&self.arguments)
    }

    /// Parse arguments as a typed value
    pub fn parse_arguments<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.arguments_json()?)
    }
}

/// Result of executing a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,

    /// Serialized output
    pub output: String,

    pub success: bool,
}

impl ToolResult {
    /// Successful result from a tool's JSON return value.
    /// String values are kept verbatim, anything else is serialized.
    pub fn success(call_id: impl Into<String>, value: &Value) -> Self {
        let output = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            call_id: call_id.into(),
            output,
            success: true,
        }
    }
}

/// Why the vendor stopped generating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the turn
    EndTurn,
    /// The model is waiting for tool results
    ToolUse,
    /// Output token limit reached
    MaxTokens,
    /// Vendor-specific reason
    Other(String),
}

/// Normalized view of one vendor response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub content: Option<String>,
    pub has_tool_calls: bool,
    pub stop_reason: StopReason,
    pub usage: UsageItem,
}

/// Token usage for one turn, or summed for one provider attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageItem {
    pub input: u64,
    pub output: u64,
    pub reasoning: u64,
    /// Billed-token count as reported by the vendor
    pub total: u64,
    pub provider: ProviderType,
    pub model: String,
}

impl UsageItem {
    /// All-zero usage for a provider/model pair
    pub fn zero(provider: ProviderType, model: impl Into<String>) -> Self {
        Self {
            input: 0,
            output: 0,
            reasoning: 0,
            total: 0,
            provider,
            model: model.into(),
        }
    }

    /// Whether no tokens were recorded
    pub fn is_empty(&self) -> bool {
        self.input == 0 && self.output == 0 && self.reasoning == 0 && self.total == 0
    }
}

/// Vendor-agnostic request driven through the tool loop
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperateRequest {
    /// Model identifier to use
    pub model: String,

    /// Conversation history, oldest first
    pub messages: Vec<HistoryItem>,

    /// System prompt
    pub system: Option<String>,

    /// Instructions appended to the final message
    pub instructions: Option<String>,

    /// Caller tools
    pub tools: Vec<ToolDefinition>,

    /// Normalized output schema
    pub format: Option<Value>,

    /// Opaque vendor parameters merged into the request body
    pub provider_options: Map<String, Value>,
}

impl OperateRequest {
    /// Create a new request
    pub fn new(model: impl Into<String>, messages: Vec<HistoryItem>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    /// Set the system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set instructions
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Set the caller tools
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the output schema
    pub fn with_format(mut self, schema: Value) -> Self {
        self.format = Some(schema);
        self
    }

    /// Set vendor passthrough options
    pub fn with_provider_options(mut self, options: Map<String, Value>) -> Self {
        self.provider_options = options;
        self
    }

    /// Messages with `instructions` appended to the final message.
    ///
    /// If the last item is not a message a new user message carries the instructions.
    pub fn messages_with_instructions(&self) -> Vec<HistoryItem> {
        let mut messages = self.messages.clone();
        let Some(instructions) = self.instructions.as_deref().filter(|i| !i.is_empty()) else {
            return messages;
        };

        match messages.last_mut() {
            Some(HistoryItem::Message { content, .. }) => {
                if content.is_empty() {
                    content.push_str(instructions);
                } else {
                    content.push_str("\n\n");
                    content.push_str(instructions);
                }
            }
            _ => messages.push(HistoryItem::user(instructions)),
        }
        messages
    }
}

/// Terminal status of an operate call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperateStatus {
    Completed,
    Incomplete,
}

/// Final content of an operate call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Free text answer
    Text(String),
    /// Schema-validated structured answer
    Json(Value),
}

/// Result of an operate call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperateResult {
    pub content: Option<Content>,

    /// Full conversation: caller history, input, and everything produced
    pub history: Vec<HistoryItem>,

    /// One summed usage item per attempted provider
    pub usage: Vec<UsageItem>,

    pub status: OperateStatus,

    /// Diagnostic detail for incomplete results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Provider that produced the result
    pub provider: ProviderType,

    /// Model that produced the result
    pub model: String,

    pub fallback_used: bool,

    /// Number of candidates tried, starting at 1
    pub fallback_attempts: u32,

    /// Raw vendor responses of the successful attempt
    pub responses: Vec<Value>,

    /// Items produced by the successful attempt
    pub output: Vec<HistoryItem>,
}

impl OperateResult {
    /// Text content, if the answer was free text
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(Content::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Structured content, if a schema was requested
    pub fn json(&self) -> Option<&Value> {
        match &self.content {
            Some(Content::Json(value)) => Some(value),
            _ => None,
        }
    }

    /// Deserialize structured content into a typed value
    pub fn deserialize<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.json().map(|value| serde_json::from_value(value.clone()))
    }

    /// Sum of all usage items across attempts
    pub fn total_usage(&self) -> (u64, u64, u64, u64) {
        self.usage.iter().fold((0, 0, 0, 0), |acc, u| {
            (
                acc.0 + u.input,
                acc.1 + u.output,
                acc.2 + u.reasoning,
                acc.3 + u.total,
            )
        })
    }

    pub fn is_complete(&self) -> bool {
        self.status == OperateStatus::Completed
    }
}
