//! Gemini provider implementation
//!
//! Adapter for Google's `generateContent` endpoint. Gemini cannot combine
//! function calling with its native JSON response mode, so a schema requested
//! alongside tools is delivered through the synthetic tool instead.

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
use tracing::warn;
use types::*;
use uuid::Uuid;

pub use types::{GeminiRequest, GeminiResponse};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const RESERVED_OPTIONS: &[&str] = &[
    "model",
    "contents",
    "systemInstruction",
    "tools",
    "generationConfig",
];

/// Schema keywords rejected by the Gemini API
const UNSUPPORTED_SCHEMA_FIELDS: &[&str] = &["default", "additionalProperties", "$schema"];

/// Adapter for the Gemini API
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    capabilities: ProviderCapabilities,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self {
            capabilities: ProviderCapabilities {
                supports_json_mode: true,
                forced_tool_choice: "ANY".to_string(),
                max_context_tokens: 1_048_576,
                ..Default::default()
            },
        }
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove keywords Gemini rejects. Property names are left alone.
pub(crate) fn strip_unsupported_schema_fields(value: &mut Value) {
    if let Some(obj) = value.as_object_mut() {
        for field in UNSUPPORTED_SCHEMA_FIELDS {
            obj.remove(*field);
        }
        for (key, v) in obj.iter_mut() {
            if key == "properties" {
                if let Some(properties) = v.as_object_mut() {
                    for (_, property) in properties.iter_mut() {
                        strip_unsupported_schema_fields(property);
                    }
                }
            } else {
                strip_unsupported_schema_fields(v);
            }
        }
    } else if let Some(arr) = value.as_array_mut() {
        for v in arr.iter_mut() {
            strip_unsupported_schema_fields(v);
        }
    }
}

fn cleaned_schema(schema: &Value) -> Value {
    let mut schema = schema.clone();
    strip_unsupported_schema_fields(&mut schema);
    schema
}

/// `functionResponse.response` must be an object
fn response_payload(output: &str) -> Value {
    match serde_json::from_str::<Value>(output) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => json!({ "result": other }),
        Err(_) => json!({ "result": output }),
    }
}

/// `functionCall.args` must be an object; unparseable arguments are sent empty
fn call_args(name: &str, arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) | Err(_) => {
            warn!(tool = %name, %arguments, "tool arguments are not a JSON object; sending {{}}");
            json!({})
        }
    }
}

fn push_part(contents: &mut Vec<GeminiContent>, role: &str, part: GeminiPart) {
    match contents.last_mut() {
        Some(last) if last.role.as_deref() == Some(role) => last.parts.push(part),
        _ => contents.push(GeminiContent {
            role: Some(role.to_string()),
            parts: vec![part],
        }),
    }
}

/// Name of the function call a result belongs to, searching backwards
fn call_name(items: &[HistoryItem], position: usize, call_id: &str) -> Option<String> {
    items[..position].iter().rev().find_map(|item| match item {
        HistoryItem::FunctionCall { name, call_id: id, .. } if id == call_id => Some(name.clone()),
        _ => None,
    })
}

fn to_contents(items: &[HistoryItem]) -> (Vec<GeminiContent>, Vec<GeminiPart>) {
    let mut contents = Vec::new();
    let mut system = Vec::new();

    for (position, item) in items.iter().enumerate() {
        match item {
            HistoryItem::Message { role, content } => {
                let part = GeminiPart::Text {
                    text: content.clone(),
                    thought: false,
                };
                match role {
                    MessageRole::System => system.push(part),
                    MessageRole::User => push_part(&mut contents, "user", part),
                    MessageRole::Assistant => push_part(&mut contents, "model", part),
                }
            }
            HistoryItem::FunctionCall {
                name, arguments, ..
            } => {
                let args = call_args(name, arguments);
                push_part(
                    &mut contents,
                    "model",
                    GeminiPart::FunctionCall {
                        function_call: FunctionCall {
                            name: name.clone(),
                            args,
                        },
                        thought_signature: None,
                    },
                );
            }
            HistoryItem::FunctionCallOutput {
                call_id, output, ..
            } => {
                let name = call_name(items, position, call_id).unwrap_or_else(|| call_id.clone());
                push_part(
                    &mut contents,
                    "user",
                    GeminiPart::FunctionResponse {
                        function_response: FunctionResponse {
                            name,
                            response: response_payload(output),
                        },
                    },
                );
            }
        }
    }

    (contents, system)
}

fn candidate_parts(response: &GeminiResponse) -> &[GeminiPart] {
    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.as_slice())
        .unwrap_or(&[])
}

fn response_text(response: &GeminiResponse) -> Option<String> {
    let text: String = candidate_parts(response)
        .iter()
        .filter_map(|part| match part {
            GeminiPart::Text { text, thought: false } => Some(text.as_str()),
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
impl ProviderAdapter for GeminiAdapter {
    type Request = GeminiRequest;
    type Response = GeminiResponse;
    type Tool = GeminiTool;
    type ToolResultPayload = GeminiPart;

    fn provider_type(&self) -> ProviderType {
        ProviderType::Gemini
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn base_url(&self) -> &str {
        DEFAULT_BASE_URL
    }

    fn endpoint(&self, model: &str) -> String {
        format!("/models/{}:generateContent", model)
    }

    fn headers(&self, api_key: &str) -> HashMap<String, String> {
        HashMap::from([
            ("x-goog-api-key".to_string(), api_key.to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ])
    }

    fn build_request(&self, request: &OperateRequest) -> GeminiRequest {
        let plan = FormatPlan::for_request(&self.capabilities, request);
        let extra = passthrough_options(&request.provider_options, RESERVED_OPTIONS);

        let (contents, mut system_parts) = to_contents(&request.messages_with_instructions());
        if let Some(prompt) = plan.system_prompt(request.system.as_deref()) {
            system_parts.insert(
                0,
                GeminiPart::Text {
                    text: prompt,
                    thought: false,
                },
            );
        }
        let system_instruction = (!system_parts.is_empty()).then(|| GeminiContent {
            role: None,
            parts: system_parts,
        });

        let tools = self.format_tools(&request.tools, plan.synthetic_schema());
        let tool_config = if extra.contains_key("toolConfig") || tools.is_empty() {
            None
        } else {
            let mode = if plan.synthetic_schema().is_some() {
                self.capabilities.forced_tool_choice.clone()
            } else {
                "AUTO".to_string()
            };
            Some(ToolConfig {
                function_calling_config: FunctionCallingConfig { mode },
            })
        };

        let mut generation_config = request
            .provider_options
            .get("generationConfig")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(schema) = plan.native_schema() {
            generation_config.insert("responseMimeType".to_string(), json!("application/json"));
            generation_config.insert("responseSchema".to_string(), cleaned_schema(schema));
        }

        GeminiRequest {
            contents,
            system_instruction,
            tools,
            tool_config,
            generation_config: (!generation_config.is_empty()).then_some(generation_config),
            extra,
        }
    }

    fn format_tools(&self, tools: &[ToolDefinition], output_schema: Option<&Value>) -> Vec<GeminiTool> {
        let synthetic = output_schema.map(structured_output_tool);
        let declarations: Vec<FunctionDeclaration> = tools
            .iter()
            .chain(synthetic.as_ref())
            .map(|tool| FunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: cleaned_schema(&tool.parameters),
            })
            .collect();

        if declarations.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTool {
                function_declarations: declarations,
            }]
        }
    }

    fn parse_response(&self, response: &GeminiResponse) -> ParsedResponse {
        let has_tool_calls = candidate_parts(response)
            .iter()
            .any(|part| matches!(part, GeminiPart::FunctionCall { .. }));

        let finish_reason = response
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref());
        let stop_reason = match finish_reason {
            _ if has_tool_calls => StopReason::ToolUse,
            Some("STOP") | None => StopReason::EndTurn,
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            Some(other) => StopReason::Other(other.to_string()),
        };

        let model = response.model_version.clone().unwrap_or_default();
        ParsedResponse {
            content: response_text(response),
            has_tool_calls,
            stop_reason,
            usage: self.extract_usage(response, &model),
        }
    }

    fn extract_tool_calls(&self, response: &GeminiResponse) -> Vec<ToolCall> {
        // Gemini assigns no call ids and may repeat a response id, so each
        // batch gets its own random segment
        let prefix = response.response_id.as_deref().unwrap_or("call");
        let batch = Uuid::new_v4().simple().to_string();
        let content = response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|content| serde_json::to_value(content).ok())
            .unwrap_or_default();

        candidate_parts(response)
            .iter()
            .filter_map(|part| match part {
                GeminiPart::FunctionCall { function_call, .. } => Some(function_call),
                _ => None,
            })
            .enumerate()
            .map(|(position, function_call)| ToolCall {
                call_id: format!("{}_{}_{}", prefix, &batch[..8], position),
                name: function_call.name.clone(),
                arguments: function_call.args.to_string(),
                raw: json!({ "content": content, "position": position }),
            })
            .collect()
    }

    fn extract_usage(&self, response: &GeminiResponse, model: &str) -> UsageItem {
        let mut usage = UsageItem::zero(ProviderType::Gemini, model);
        if let Some(reported) = &response.usage_metadata {
            usage.input = reported.prompt_token_count;
            usage.output = reported.candidates_token_count;
            usage.reasoning = reported.thoughts_token_count;
            usage.total = reported.total_token_count;
        }
        usage
    }

    fn format_tool_result(&self, call: &ToolCall, result: &ToolResult) -> GeminiPart {
        GeminiPart::FunctionResponse {
            function_response: FunctionResponse {
                name: call.name.clone(),
                response: response_payload(&result.output),
            },
        }
    }

    fn append_tool_result(
        &self,
        mut request: GeminiRequest,
        call: &ToolCall,
        result: &ToolResult,
    ) -> GeminiRequest {
        // The first call of a batch opens the model turn; siblings share it
        let position = call.raw.get("position").and_then(Value::as_u64).unwrap_or(0);
        if position == 0 {
            let model_turn = call
                .raw
                .get("content")
                .and_then(|content| serde_json::from_value::<GeminiContent>(content.clone()).ok())
                .filter(|content| !content.parts.is_empty())
                .map(|mut content| {
                    content.role = Some("model".to_string());
                    content
                })
                .unwrap_or_else(|| GeminiContent {
                    role: Some("model".to_string()),
                    parts: vec![GeminiPart::FunctionCall {
                        function_call: FunctionCall {
                            name: call.name.clone(),
                            args: call_args(&call.name, &call.arguments),
                        },
                        thought_signature: None,
                    }],
                });
            request.contents.push(model_turn);
        }

        let part = self.format_tool_result(call, result);
        match request.contents.last_mut() {
            Some(last)
                if last.role.as_deref() == Some("user")
                    && last
                        .parts
                        .iter()
                        .any(|p| matches!(p, GeminiPart::FunctionResponse { .. })) =>
            {
                last.parts.push(part)
            }
            _ => request.contents.push(GeminiContent {
                role: Some("user".to_string()),
                parts: vec![part],
            }),
        }
        request
    }

    fn response_to_history_items(&self, response: &GeminiResponse) -> Vec<HistoryItem> {
        response_text(response)
            .map(|text| vec![HistoryItem::assistant(text)])
            .unwrap_or_default()
    }
}
