//! OpenRouter provider implementation
//!
//! Adapter for OpenRouter's OpenAI-compatible chat completions endpoint.

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

pub use types::{OpenRouterRequest, OpenRouterResponse};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

const RESERVED_OPTIONS: &[&str] = &["model", "messages", "tools"];

/// Adapter for OpenRouter chat completions
#[derive(Debug, Clone)]
pub struct OpenRouterAdapter {
    capabilities: ProviderCapabilities,
}

impl OpenRouterAdapter {
    pub fn new() -> Self {
        Self {
            capabilities: ProviderCapabilities {
                supports_json_mode: true,
                // Routed models differ; tools plus response_format is not reliable
                forced_tool_choice: "required".to_string(),
                ..Default::default()
            },
        }
    }
}

impl Default for OpenRouterAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn to_tool_call(call_id: &str, name: &str, arguments: &str) -> OpenRouterToolCall {
    OpenRouterToolCall {
        id: call_id.to_string(),
        tool_type: "function".to_string(),
        function: OpenRouterFunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        },
    }
}

fn to_messages(items: &[HistoryItem]) -> Vec<OpenRouterMessage> {
    let mut messages: Vec<OpenRouterMessage> = Vec::new();

    for item in items {
        match item {
            HistoryItem::Message { role, content } => {
                let role = match role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                };
                messages.push(OpenRouterMessage::text(role, content.clone()));
            }
            HistoryItem::FunctionCall {
                name,
                arguments,
                call_id,
            } => {
                let call = to_tool_call(call_id, name, arguments);
                match messages.last_mut() {
                    Some(last) if last.role == "assistant" => {
                        last.tool_calls.get_or_insert_with(Vec::new).push(call)
                    }
                    _ => messages.push(OpenRouterMessage {
                        role: "assistant".to_string(),
                        content: None,
                        tool_calls: Some(vec![call]),
                        tool_call_id: None,
                    }),
                }
            }
            HistoryItem::FunctionCallOutput {
                call_id, output, ..
            } => messages.push(OpenRouterMessage::tool(call_id.clone(), output.clone())),
        }
    }

    messages
}

fn first_message(response: &OpenRouterResponse) -> Option<&OpenRouterMessage> {
    response.choices.first().map(|choice| &choice.message)
}

fn response_text(response: &OpenRouterResponse) -> Option<String> {
    first_message(response)
        .and_then(|message| message.content.clone())
        .filter(|content| !content.is_empty())
}

#[async_trait]
impl ProviderAdapter for OpenRouterAdapter {
    type Request = OpenRouterRequest;
    type Response = OpenRouterResponse;
    type Tool = OpenRouterTool;
    type ToolResultPayload = OpenRouterMessage;

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenRouter
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn base_url(&self) -> &str {
        DEFAULT_BASE_URL
    }

    fn endpoint(&self, _model: &str) -> String {
        "/chat/completions".to_string()
    }

    fn headers(&self, api_key: &str) -> HashMap<String, String> {
        HashMap::from([
            ("Authorization".to_string(), format!("Bearer {}", api_key)),
            ("Content-Type".to_string(), "application/json".to_string()),
        ])
    }

    fn build_request(&self, request: &OperateRequest) -> OpenRouterRequest {
        let plan = FormatPlan::for_request(&self.capabilities, request);
        let extra = passthrough_options(&request.provider_options, RESERVED_OPTIONS);

        let mut messages = to_messages(&request.messages_with_instructions());
        if let Some(system) = plan.system_prompt(request.system.as_deref()) {
            messages.insert(0, OpenRouterMessage::text("system", system));
        }

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

        let response_format = plan
            .native_schema()
            .filter(|_| !extra.contains_key("response_format"))
            .map(|schema| OpenRouterResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: Some(json!({
                    "name": "structured_output",
                    "schema": schema,
                    "strict": false,
                })),
            });

        OpenRouterRequest {
            model: request.model.clone(),
            messages,
            tools,
            tool_choice,
            response_format,
            extra,
        }
    }

    fn format_tools(&self, tools: &[ToolDefinition], output_schema: Option<&Value>) -> Vec<OpenRouterTool> {
        let synthetic = output_schema.map(structured_output_tool);
        tools
            .iter()
            .chain(synthetic.as_ref())
            .map(|tool| OpenRouterTool {
                tool_type: "function".to_string(),
                function: OpenRouterFunction {
                    name: tool.name.clone(),
                    description: (!tool.description.is_empty()).then(|| tool.description.clone()),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    }

    fn parse_response(&self, response: &OpenRouterResponse) -> ParsedResponse {
        let has_tool_calls = first_message(response)
            .and_then(|m| m.tool_calls.as_ref())
            .is_some_and(|calls| !calls.is_empty());

        let finish_reason = response
            .choices
            .first()
            .and_then(|c| c.finish_reason.as_deref());
        let stop_reason = match finish_reason {
            Some("tool_calls") => StopReason::ToolUse,
            Some("stop") => StopReason::EndTurn,
            Some("length") => StopReason::MaxTokens,
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

    fn extract_tool_calls(&self, response: &OpenRouterResponse) -> Vec<ToolCall> {
        let Some(message) = first_message(response) else {
            return Vec::new();
        };
        let raw = serde_json::to_value(message).unwrap_or_default();

        message
            .tool_calls
            .iter()
            .flatten()
            .map(|call| ToolCall {
                call_id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
                raw: raw.clone(),
            })
            .collect()
    }

    fn extract_usage(&self, response: &OpenRouterResponse, model: &str) -> UsageItem {
        let mut usage = UsageItem::zero(ProviderType::OpenRouter, model);
        if let Some(reported) = &response.usage {
            usage.input = reported.prompt_tokens;
            usage.output = reported.completion_tokens;
            usage.total = reported.total_tokens;
            usage.reasoning = reported
                .completion_tokens_details
                .as_ref()
                .map_or(0, |d| d.reasoning_tokens);
        }
        usage
    }

    fn format_tool_result(&self, call: &ToolCall, result: &ToolResult) -> OpenRouterMessage {
        OpenRouterMessage::tool(call.call_id.clone(), result.output.clone())
    }

    fn append_tool_result(
        &self,
        mut request: OpenRouterRequest,
        call: &ToolCall,
        result: &ToolResult,
    ) -> OpenRouterRequest {
        let already_present = request
            .messages
            .iter()
            .filter_map(|m| m.tool_calls.as_ref())
            .flatten()
            .any(|c| c.id == call.call_id);

        if !already_present {
            let assistant = serde_json::from_value::<OpenRouterMessage>(call.raw.clone())
                .ok()
                .filter(|m| m.role == "assistant")
                .unwrap_or_else(|| OpenRouterMessage {
                    role: "assistant".to_string(),
                    content: None,
                    tool_calls: Some(vec![to_tool_call(&call.call_id, &call.name, &call.arguments)]),
                    tool_call_id: None,
                });
            request.messages.push(assistant);
        }

        request.messages.push(self.format_tool_result(call, result));
        request
    }

    fn response_to_history_items(&self, response: &OpenRouterResponse) -> Vec<HistoryItem> {
        response_text(response)
            .map(|text| vec![HistoryItem::assistant(text)])
            .unwrap_or_default()
    }
}
