//! Provider adapter trait and capabilities
//!
//! Defines the contract every vendor adapter implements. Each adapter owns one
//! conversion into its vendor-native request and one conversion out of the
//! vendor-native response; nothing outside the adapter inspects those shapes.

use crate::protocol::{
    HistoryItem, OperateRequest, ParsedResponse, ToolCall, ToolDefinition, ToolResult, UsageItem,
};
use crate::providers::error::{ClassifiedError, ErrorClassifier, ProviderError, ProviderResult};
use crate::providers::transport::{ProviderClient, TransportRequest};
use crate::structured::STRUCTURED_OUTPUT_INSTRUCTION;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// Core trait that all vendor adapters implement
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
    /// Vendor-native request body
    type Request: Serialize + Clone + Send + Sync;

    /// Vendor-native response body
    type Response: DeserializeOwned + Serialize + Send + Sync;

    /// Vendor-native tool declaration
    type Tool;

    /// Vendor-native tool result payload
    type ToolResultPayload;

    /// Which provider this adapter speaks to
    fn provider_type(&self) -> ProviderType;

    /// Get the provider's capabilities
    fn capabilities(&self) -> &ProviderCapabilities;

    /// Default base URL for this provider
    fn base_url(&self) -> &str;

    /// Endpoint path for a model
    fn endpoint(&self, model: &str) -> String;

    /// Headers required for this provider
    fn headers(&self, api_key: &str) -> HashMap<String, String>;

    /// Convert an operate request into the vendor request
    fn build_request(&self, request: &OperateRequest) -> Self::Request;

    /// Convert caller tools, appending the synthetic schema tool when a schema is given
    fn format_tools(&self, tools: &[ToolDefinition], output_schema: Option<&Value>)
        -> Vec<Self::Tool>;

    /// Perform exactly one vendor call
    async fn execute_request(
        &self,
        client: &ProviderClient,
        model: &str,
        request: &Self::Request,
    ) -> ProviderResult<Self::Response> {
        let base_url = client.base_url().unwrap_or_else(|| self.base_url());
        let transport_request = TransportRequest {
            provider: self.provider_type(),
            url: format!("{}{}", base_url.trim_end_matches('/'), self.endpoint(model)),
            headers: client
                .api_key()
                .map(|key| self.headers(key.expose_secret()))
                .unwrap_or_default(),
            body: serde_json::to_value(request)?,
            request_id: Uuid::new_v4(),
            timeout: client.timeout(),
        };
        debug!(
            provider = %self.provider_type(),
            request_id = %transport_request.request_id,
            url = %transport_request.url,
            "sending vendor request"
        );

        let value = client.transport().send(transport_request).await?;
        serde_json::from_value(value).map_err(ProviderError::from)
    }

    /// Normalize a vendor response
    fn parse_response(&self, response: &Self::Response) -> ParsedResponse;

    /// Tool calls requested by the response, in vendor order
    fn extract_tool_calls(&self, response: &Self::Response) -> Vec<ToolCall>;

    /// Token usage of the response; all zero when the vendor omitted it
    fn extract_usage(&self, response: &Self::Response, model: &str) -> UsageItem;

    /// Vendor-native payload carrying one tool result
    fn format_tool_result(&self, call: &ToolCall, result: &ToolResult) -> Self::ToolResultPayload;

    /// Extend the vendor conversation with a tool call and its result
    fn append_tool_result(
        &self,
        request: Self::Request,
        call: &ToolCall,
        result: &ToolResult,
    ) -> Self::Request;

    /// History items for a response: text becomes a message, tool calls are
    /// recorded only once they have run
    fn response_to_history_items(&self, response: &Self::Response) -> Vec<HistoryItem>;

    /// Classify a vendor error
    fn classify_error(&self, error: &ProviderError) -> ClassifiedError {
        ErrorClassifier::classify(error)
    }

    /// True unless the response holds a pending non-synthetic tool call
    fn is_complete(&self, response: &Self::Response) -> bool {
        !self
            .extract_tool_calls(response)
            .iter()
            .any(|call| !call.is_structured_output())
    }

    /// True exactly when the last tool invocation is the synthetic schema tool
    fn has_structured_output(&self, response: &Self::Response) -> bool {
        self.extract_tool_calls(response)
            .last()
            .is_some_and(ToolCall::is_structured_output)
    }

    /// Arguments of the synthetic schema call
    fn extract_structured_output(&self, response: &Self::Response) -> Option<Map<String, Value>> {
        let calls = self.extract_tool_calls(response);
        let last = calls.last().filter(|call| call.is_structured_output())?;
        match last.arguments_json().ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

/// How an adapter delivers a requested output schema
#[derive(Debug, Clone, PartialEq)]
pub enum FormatPlan {
    /// No schema requested
    None,
    /// Vendor-native JSON response mode
    Native(Value),
    /// Synthetic `structured_output` tool
    Synthetic(Value),
}

impl FormatPlan {
    /// Decide native vs. synthetic delivery for a request
    pub fn for_request(capabilities: &ProviderCapabilities, request: &OperateRequest) -> Self {
        match &request.format {
            None => Self::None,
            Some(schema) if capabilities.native_format_allowed(!request.tools.is_empty()) => {
                Self::Native(schema.clone())
            }
            Some(schema) => Self::Synthetic(schema.clone()),
        }
    }

    pub fn native_schema(&self) -> Option<&Value> {
        match self {
            Self::Native(schema) => Some(schema),
            _ => None,
        }
    }

    pub fn synthetic_schema(&self) -> Option<&Value> {
        match self {
            Self::Synthetic(schema) => Some(schema),
            _ => None,
        }
    }

    /// System prompt with the structured-output instruction merged in
    pub fn system_prompt(&self, system: Option<&str>) -> Option<String> {
        let system = system.filter(|s| !s.is_empty());
        match (self, system) {
            (Self::Synthetic(_), Some(system)) => {
                Some(format!("{}\n\n{}", system, STRUCTURED_OUTPUT_INSTRUCTION))
            }
            (Self::Synthetic(_), None) => Some(STRUCTURED_OUTPUT_INSTRUCTION.to_string()),
            (_, system) => system.map(str::to_string),
        }
    }
}

/// Provider options that may be flattened into a vendor body.
///
/// Keys owned by the adapter's typed fields are dropped so the serialized body
/// never carries duplicates.
pub(crate) fn passthrough_options(options: &Map<String, Value>, reserved: &[&str]) -> Map<String, Value> {
    options
        .iter()
        .filter(|(key, _)| {
            let keep = !reserved.contains(&key.as_str());
            if !keep {
                debug!(option = %key, "ignoring provider option owned by the adapter");
            }
            keep
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Provider capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Does the provider accept system prompts?
    pub supports_system_role: bool,

    /// Does the provider support a native JSON schema response mode?
    pub supports_json_mode: bool,

    /// Does the provider support function calling?
    pub supports_functions: bool,

    /// Tool-choice keyword that forces a tool call
    pub forced_tool_choice: String,

    /// Maximum context window size
    pub max_context_tokens: usize,

    /// Provider-specific capability flags
    pub custom: HashMap<String, Value>,
}

impl ProviderCapabilities {
    /// Native JSON mode is only used when no tools are requested
    pub fn native_format_allowed(&self, has_tools: bool) -> bool {
        self.supports_json_mode && !has_tools
    }
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            supports_system_role: true,
            supports_json_mode: false,
            supports_functions: true,
            forced_tool_choice: "required".to_string(),
            max_context_tokens: 128_000,
            custom: HashMap::new(),
        }
    }
}

/// Supported vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    Gemini,
    OpenRouter,
}

impl ProviderType {
    /// All providers, in registry order
    pub const ALL: [ProviderType; 4] = [
        ProviderType::OpenAI,
        ProviderType::Anthropic,
        ProviderType::Gemini,
        ProviderType::OpenRouter,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Gemini => "gemini",
            ProviderType::OpenRouter => "openrouter",
        }
    }

    /// Model used when a caller names the provider but no model
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "gpt-4o",
            ProviderType::Anthropic => "claude-sonnet-4-20250514",
            ProviderType::Gemini => "gemini-2.5-flash",
            ProviderType::OpenRouter => "openai/gpt-4o",
        }
    }

    /// Guess the provider from a model name
    pub fn from_model(model: &str) -> Option<Self> {
        let model = model.trim().to_lowercase();
        if model.is_empty() {
            return None;
        }
        if model.contains('/') {
            return Some(ProviderType::OpenRouter);
        }
        if model.starts_with("claude") {
            return Some(ProviderType::Anthropic);
        }
        if model.starts_with("gemini") {
            return Some(ProviderType::Gemini);
        }
        let openai_prefixes = ["gpt", "o1", "o3", "o4", "chatgpt"];
        if openai_prefixes.iter().any(|p| model.starts_with(p)) {
            return Some(ProviderType::OpenAI);
        }
        None
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAI),
            "anthropic" => Ok(ProviderType::Anthropic),
            "gemini" | "google" => Ok(ProviderType::Gemini),
            "openrouter" => Ok(ProviderType::OpenRouter),
            other => Err(ProviderError::Configuration(format!(
                "Unknown provider: {}",
                other
            ))),
        }
    }
}
