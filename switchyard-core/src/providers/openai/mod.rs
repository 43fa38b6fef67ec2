//! OpenAI provider implementation
//!
//! Adapter for the OpenAI Responses API (`POST /responses`). Conversation
//! history is sent as `input` items; tool calls come back as `function_call`
//! output items and are answered with `function_call_output` items.

pub mod types;

use crate::protocol::{
    HistoryItem, MessageRole, OperateRequest, ParsedResponse, StopReason, ToolCall,
    ToolDefinition, ToolResult, UsageItem,
};
use crate::providers::adapter::{
    passthrough_options, FormatPlan, ProviderAdapter, ProviderCapabilities, ProviderType,
};
use crate::structured::structured_output_tool;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use types::*;

pub use types::{OpenAIRequest, OpenAIResponse};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Body keys built from the conversation; never taken from provider options
const RESERVED_OPTIONS: &[&str] = &["model", "input", "instructions", "tools"];

/// Adapter for the OpenAI Responses API
#[derive(Debug, Clone)]
pub struct OpenAIAdapter {
    capabilities: ProviderCapabilities,
}

impl OpenAIAdapter {
    pub fn new() -> Self {
        Self {
            capabilities: ProviderCapabilities {
                supports_json_mode: true,
                forced_tool_choice: "required".to_string(),
                ..Default::default()
            },
        }
    }
}

impl Default for OpenAIAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

/// Convert one history item into a Responses input item
pub fn to_input_item(item: &HistoryItem) -> OpenAIInputItem {
    match item {
        HistoryItem::Message { role, content } => OpenAIInputItem::Message {
            role: role_name(*role).to_string(),
            content: content.clone(),
        },
        HistoryItem::FunctionCall {
            name,
            arguments,
            call_id,
        } => OpenAIInputItem::FunctionCall {
            id: None,
            call_id: call_id.clone(),
            name: name.clone(),
            arguments: arguments.clone(),
        },
        HistoryItem::FunctionCallOutput {
            call_id, output, ..
        } => OpenAIInputItem::FunctionCallOutput {
            call_id: call_id.clone(),
            output: output.clone(),
        },
    }
}

/// Input form of an output item; messages are carried as history instead
fn to_replay_item(item: &OpenAIOutputItem) -> Option<OpenAIInputItem> {
    match item {
        OpenAIOutputItem::Message { .. } => None,
        // The response-only `status` is dropped
        OpenAIOutputItem::FunctionCall {
            id,
            call_id,
            name,
            arguments,
            ..
        } => Some(OpenAIInputItem::FunctionCall {
            id: id.clone(),
            call_id: call_id.clone(),
            name: name.clone(),
            arguments: arguments.clone(),
        }),
        OpenAIOutputItem::Reasoning { rest } => Some(OpenAIInputItem::Reasoning { rest: rest.clone() }),
        OpenAIOutputItem::Other(value) => Some(OpenAIInputItem::Other(value.clone())),
    }
}

fn output_text(response: &OpenAIResponse) -> Option<String> {
    let text: String = response
        .output
        .iter()
        .filter_map(|item| match item {
            OpenAIOutputItem::Message { content, .. } => Some(content),
            _ => None,
        })
        .flatten()
        .filter_map(|part| match part {
            OpenAIOutputContent::OutputText { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIAdapter {
    type Request = OpenAIRequest;
    type Response = OpenAIResponse;
    type Tool = OpenAITool;
    type ToolResultPayload = OpenAIInputItem;

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn base_url(&self) -> &str {
        DEFAULT_BASE_URL
    }

    fn endpoint(&self, _model: &str) -> String {
        "/responses".to_string()
    }

    fn headers(&self, api_key: &str) -> HashMap<String, String> {
        HashMap::from([
            ("Authorization".to_string(), format!("Bearer {}", api_key)),
            ("Content-Type".to_string(), "application/json".to_string()),
        ])
    }

    fn build_request(&self, request: &OperateRequest) -> OpenAIRequest {
        let plan = FormatPlan::for_request(&self.capabilities, request);
        let extra = passthrough_options(&request.provider_options, RESERVED_OPTIONS);

        let tools = self.format_tools(&request.tools, plan.synthetic_schema());
        let tool_choice = if extra.contains_key("tool_choice") {
            None
        } else if plan.synthetic_schema().is_some() {
            Some(json!(self.capabilities.forced_tool_choice))
        } else if !tools.is_empty() {
            Some(json!("auto"))
        } else {
            None
        };

        let text = plan
            .native_schema()
            .filter(|_| !extra.contains_key("text"))
            .map(|schema| OpenAITextConfig {
                format: OpenAITextFormat {
                    format_type: "json_schema".to_string(),
                    name: "structured_output".to_string(),
                    schema: schema.clone(),
                    strict: false,
                },
            });

        OpenAIRequest {
            model: request.model.clone(),
            input: request
                .messages_with_instructions()
                .iter()
                .map(to_input_item)
                .collect(),
            instructions: plan.system_prompt(request.system.as_deref()),
            tools,
            tool_choice,
            text,
            extra,
        }
    }

    fn format_tools(&self, tools: &[ToolDefinition], output_schema: Option<&Value>) -> Vec<OpenAITool> {
        let synthetic = output_schema.map(structured_output_tool);
        tools
            .iter()
            .chain(synthetic.as_ref())
            .map(|tool| OpenAITool {
                tool_type: "function".to_string(),
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
                strict: None,
            })
            .collect()
    }

    fn parse_response(&self, response: &OpenAIResponse) -> ParsedResponse {
        let has_tool_calls = response
            .output
            .iter()
            .any(|item| matches!(item, OpenAIOutputItem::FunctionCall { .. }));

        let stop_reason = if has_tool_calls {
            StopReason::ToolUse
        } else if response.status.as_deref() == Some("incomplete") {
            match response
                .incomplete_details
                .as_ref()
                .and_then(|d| d.reason.as_deref())
            {
                Some("max_output_tokens") | None => StopReason::MaxTokens,
                Some(other) => StopReason::Other(other.to_string()),
            }
        } else {
            StopReason::EndTurn
        };

        ParsedResponse {
            content: output_text(response),
            has_tool_calls,
            stop_reason,
            usage: self.extract_usage(response, &response.model),
        }
    }

    fn extract_tool_calls(&self, response: &OpenAIResponse) -> Vec<ToolCall> {
        // Every non-message output item is replayed in order; reasoning models
        // reject a function call echoed without the reasoning item before it
        let replay: Vec<OpenAIInputItem> = response.output.iter().filter_map(to_replay_item).collect();
        let raw = json!({ "items": replay });

        response
            .output
            .iter()
            .filter_map(|item| match item {
                OpenAIOutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                    ..
                } => Some(ToolCall {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                    raw: raw.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn extract_usage(&self, response: &OpenAIResponse, model: &str) -> UsageItem {
        let mut usage = UsageItem::zero(ProviderType::OpenAI, model);
        if let Some(reported) = &response.usage {
            usage.input = reported.input_tokens;
            usage.output = reported.output_tokens;
            usage.total = reported.total_tokens;
            usage.reasoning = reported
                .output_tokens_details
                .as_ref()
                .map_or(0, |d| d.reasoning_tokens);
        }
        usage
    }

    fn format_tool_result(&self, call: &ToolCall, result: &ToolResult) -> OpenAIInputItem {
        OpenAIInputItem::FunctionCallOutput {
            call_id: call.call_id.clone(),
            output: result.output.clone(),
        }
    }

    fn append_tool_result(
        &self,
        mut request: OpenAIRequest,
        call: &ToolCall,
        result: &ToolResult,
    ) -> OpenAIRequest {
        let already_echoed = request.input.iter().any(|item| {
            matches!(item, OpenAIInputItem::FunctionCall { call_id, .. } if *call_id == call.call_id)
        });
        if !already_echoed {
            let replay = call
                .raw
                .get("items")
                .and_then(|items| serde_json::from_value::<Vec<OpenAIInputItem>>(items.clone()).ok())
                .filter(|items| !items.is_empty())
                .unwrap_or_else(|| {
                    vec![OpenAIInputItem::FunctionCall {
                        id: None,
                        call_id: call.call_id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    }]
                });
            request.input.extend(replay);
        }
        request.input.push(self.format_tool_result(call, result));
        request
    }

    fn response_to_history_items(&self, response: &OpenAIResponse) -> Vec<HistoryItem> {
        output_text(response)
            .map(|text| vec![HistoryItem::assistant(text)])
            .unwrap_or_default()
    }
}
