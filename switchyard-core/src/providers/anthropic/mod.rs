//! Anthropic provider implementation
//!
//! Adapter for the Anthropic Messages API. System prompts live outside the
//! message list, roles must alternate, and tool results are `tool_result`
//! blocks inside a user message that follows the assistant's `tool_use` blocks.

pub mod types;

use crate::protocol::{
    HistoryItem, MessageRole, OperateRequest, ParsedResponse, StopReason, ToolCall,
    ToolDefinition, ToolResult, UsageItem,
};
use crate::providers::adapter::{
    passthrough_options, FormatPlan, ProviderAdapter, ProviderCapabilities, ProviderType,
};
use crate::providers::error::{ClassifiedError, ErrorCategory, ErrorClassifier, ProviderError};
use crate::structured::structured_output_tool;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::warn;
use types::*;

pub use types::{AnthropicRequest, AnthropicResponse};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Used when the caller does not pass `max_tokens` in provider options
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Status Anthropic returns when its API is overloaded
const OVERLOADED_STATUS: u16 = 529;

const RESERVED_OPTIONS: &[&str] = &["model", "messages", "system", "tools", "max_tokens"];

/// Adapter for the Anthropic Messages API
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    capabilities: ProviderCapabilities,
}

impl AnthropicAdapter {
    pub fn new() -> Self {
        Self {
            capabilities: ProviderCapabilities {
                supports_json_mode: false,
                forced_tool_choice: "any".to_string(),
                max_context_tokens: 200_000,
                ..Default::default()
            },
        }
    }
}

impl Default for AnthropicAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Append a block, merging into the previous message when the role matches
fn push_block(messages: &mut Vec<AnthropicMessage>, role: &str, block: AnthropicContentBlock) {
    match messages.last_mut() {
        Some(last) if last.role == role => last.content.push(block),
        _ => messages.push(AnthropicMessage {
            role: role.to_string(),
            content: vec![block],
        }),
    }
}

/// `tool_use.input` must be an object; unparseable arguments are sent empty
fn tool_input(name: &str, arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            warn!(tool = %name, arguments = %other, "tool arguments are not an object; sending {{}}");
            Value::Object(Map::new())
        }
        Err(error) => {
            warn!(tool = %name, %error, "tool arguments are not valid JSON; sending {{}}");
            Value::Object(Map::new())
        }
    }
}

/// Convert history into alternating messages plus the collected system text
fn to_messages(items: &[HistoryItem]) -> (Vec<AnthropicMessage>, Vec<String>) {
    let mut messages = Vec::new();
    let mut system = Vec::new();

    for item in items {
        match item {
            HistoryItem::Message { role, content } => match role {
                MessageRole::System => system.push(content.clone()),
                // Empty text blocks are rejected by the API
                _ if content.is_empty() => {}
                MessageRole::User => push_block(
                    &mut messages,
                    "user",
                    AnthropicContentBlock::Text {
                        text: content.clone(),
                    },
                ),
                MessageRole::Assistant => push_block(
                    &mut messages,
                    "assistant",
                    AnthropicContentBlock::Text {
                        text: content.clone(),
                    },
                ),
            },
            HistoryItem::FunctionCall {
                name,
                arguments,
                call_id,
            } => push_block(
                &mut messages,
                "assistant",
                AnthropicContentBlock::ToolUse {
                    id: call_id.clone(),
                    name: name.clone(),
                    input: tool_input(name, arguments),
                },
            ),
            HistoryItem::FunctionCallOutput {
                call_id, output, ..
            } => push_block(
                &mut messages,
                "user",
                AnthropicContentBlock::ToolResult {
                    tool_use_id: call_id.clone(),
                    content: output.clone(),
                    is_error: false,
                },
            ),
        }
    }

    (messages, system)
}

fn response_text(response: &AnthropicResponse) -> Option<String> {
    let text: Vec<&str> = response
        .content
        .iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text.join(""))
    }
}

fn contains_tool_use(messages: &[AnthropicMessage], call_id: &str) -> bool {
    messages.iter().flat_map(|m| &m.content).any(|block| {
        matches!(block, AnthropicContentBlock::ToolUse { id, .. } if id == call_id)
    })
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    type Request = AnthropicRequest;
    type Response = AnthropicResponse;
    type Tool = AnthropicTool;
    type ToolResultPayload = AnthropicContentBlock;

    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn base_url(&self) -> &str {
        DEFAULT_BASE_URL
    }

    fn endpoint(&self, _model: &str) -> String {
        "/messages".to_string()
    }

    fn headers(&self, api_key: &str) -> HashMap<String, String> {
        HashMap::from([
            ("x-api-key".to_string(), api_key.to_string()),
            ("anthropic-version".to_string(), API_VERSION.to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ])
    }

    fn build_request(&self, request: &OperateRequest) -> AnthropicRequest {
        let plan = FormatPlan::for_request(&self.capabilities, request);
        let extra = passthrough_options(&request.provider_options, RESERVED_OPTIONS);

        let (messages, mut system_parts) = to_messages(&request.messages_with_instructions());
        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            system_parts.insert(0, system.to_string());
        }
        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

        let tools = self.format_tools(&request.tools, plan.synthetic_schema());
        let tool_choice = if extra.contains_key("tool_choice") {
            None
        } else if plan.synthetic_schema().is_some() {
            Some(json!({"type": self.capabilities.forced_tool_choice}))
        } else if !tools.is_empty() {
            Some(json!({"type": "auto"}))
        } else {
            None
        };

        let max_tokens = request
            .provider_options
            .get("max_tokens")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        AnthropicRequest {
            model: request.model.clone(),
            messages,
            max_tokens,
            system: plan.system_prompt(system.as_deref()),
            tools,
            tool_choice,
            extra,
        }
    }

    fn format_tools(&self, tools: &[ToolDefinition], output_schema: Option<&Value>) -> Vec<AnthropicTool> {
        let synthetic = output_schema.map(structured_output_tool);
        tools
            .iter()
            .chain(synthetic.as_ref())
            .map(|tool| AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.parameters.clone(),
            })
            .collect()
    }

    fn parse_response(&self, response: &AnthropicResponse) -> ParsedResponse {
        let has_tool_calls = response
            .content
            .iter()
            .any(|block| matches!(block, AnthropicContentBlock::ToolUse { .. }));

        let stop_reason = match response.stop_reason.as_deref() {
            Some("tool_use") => StopReason::ToolUse,
            Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
            Some("max_tokens") => StopReason::MaxTokens,
            Some(other) => StopReason::Other(other.to_string()),
            None if has_tool_calls => StopReason::ToolUse,
            None => StopReason::EndTurn,
        };

        ParsedResponse {
            content: response_text(response),
            has_tool_calls,
            stop_reason,
            usage: self.extract_usage(response, &response.model),
        }
    }

    fn extract_tool_calls(&self, response: &AnthropicResponse) -> Vec<ToolCall> {
        // The whole assistant turn is kept so thinking blocks, server tool
        // blocks and sibling tool_use blocks are replayed together
        let raw = serde_json::to_value(&response.content).unwrap_or_default();

        response
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    call_id: id.clone(),
                    name: name.clone(),
                    arguments: input.to_string(),
                    raw: raw.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn extract_usage(&self, response: &AnthropicResponse, model: &str) -> UsageItem {
        let mut usage = UsageItem::zero(ProviderType::Anthropic, model);
        if let Some(reported) = &response.usage {
            usage.input = reported.input_tokens
                + reported.cache_creation_input_tokens.unwrap_or(0)
                + reported.cache_read_input_tokens.unwrap_or(0);
            usage.output = reported.output_tokens;
            usage.total = usage.input + usage.output;
        }
        usage
    }

    fn format_tool_result(&self, call: &ToolCall, result: &ToolResult) -> AnthropicContentBlock {
        AnthropicContentBlock::ToolResult {
            tool_use_id: call.call_id.clone(),
            content: result.output.clone(),
            is_error: !result.success,
        }
    }

    fn append_tool_result(
        &self,
        mut request: AnthropicRequest,
        call: &ToolCall,
        result: &ToolResult,
    ) -> AnthropicRequest {
        if !contains_tool_use(&request.messages, &call.call_id) {
            let content = serde_json::from_value::<Vec<AnthropicContentBlock>>(call.raw.clone())
                .ok()
                .filter(|blocks| !blocks.is_empty())
                .unwrap_or_else(|| {
                    vec![AnthropicContentBlock::ToolUse {
                        id: call.call_id.clone(),
                        name: call.name.clone(),
                        input: tool_input(&call.name, &call.arguments),
                    }]
                });
            request.messages.push(AnthropicMessage {
                role: "assistant".to_string(),
                content,
            });
        }

        let block = self.format_tool_result(call, result);
        match request.messages.last_mut() {
            Some(last)
                if last.role == "user"
                    && last
                        .content
                        .iter()
                        .any(|b| matches!(b, AnthropicContentBlock::ToolResult { .. })) =>
            {
                last.content.push(block)
            }
            _ => request.messages.push(AnthropicMessage {
                role: "user".to_string(),
                content: vec![block],
            }),
        }
        request
    }

    fn response_to_history_items(&self, response: &AnthropicResponse) -> Vec<HistoryItem> {
        response_text(response)
            .map(|text| vec![HistoryItem::assistant(text)])
            .unwrap_or_default()
    }

    fn classify_error(&self, error: &ProviderError) -> ClassifiedError {
        let overloaded = error.status() == Some(OVERLOADED_STATUS)
            || (error.status().is_none() && error.to_string().to_lowercase().contains("overloaded"));
        if overloaded {
            return ClassifiedError::new(error, ErrorCategory::Retryable, true);
        }
        ErrorClassifier::classify(error)
    }
}
