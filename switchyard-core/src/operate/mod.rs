//! The operate engine
//!
//! [`Llm::operate`] is the single entry point: it prepares the conversation,
//! then hands one attempt per fallback candidate to the tool loop until a
//! candidate succeeds.

pub mod fallback;
pub mod registry;
pub mod tool_loop;
pub mod usage;

pub use fallback::{Fallback, FallbackOrchestrator, FallbackSuccess, FallbackTarget};
pub use registry::{builtin_operator, Operator, Provider, ProviderRegistry};
pub use tool_loop::{AttemptError, LoopContext, LoopOutcome, ToolExecutionLoop, DEFAULT_MAX_TURNS};
pub use usage::UsageAccumulator;

use crate::config::{ConfigError, ConfigValidator, SwitchyardConfig};
use crate::error::OperateError;
use crate::placeholders::{placeholders, PlaceholderTargets};
use crate::protocol::{
    Content, HistoryItem, OperateInput, OperateRequest, OperateResult, OperateStatus,
    ToolDefinition, UsageItem,
};
use crate::providers::transport::{ProviderClient, Transport};
use crate::providers::{ProviderType, RetryPolicy};
use crate::structured::{OutputFormat, StructuredOutput};
use crate::tools::{validate_tool_definitions, Hooks, Toolkit};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Per-call options for [`Llm::operate`]
#[derive(Clone, Default)]
pub struct OperateOptions {
    /// Provider for the primary attempt; inferred from `model` when absent
    pub provider: Option<ProviderType>,
    pub model: Option<String>,
    pub system: Option<String>,
    /// Appended to the final message of the conversation
    pub instructions: Option<String>,
    /// Values for `{{key}}` placeholders
    pub data: Map<String, Value>,
    pub placeholders: PlaceholderTargets,
    /// Earlier conversation, placed before the input
    pub history: Vec<HistoryItem>,
    pub tools: Option<Arc<dyn Toolkit>>,
    pub format: Option<OutputFormat>,
    pub hooks: Hooks,
    pub fallback: Fallback,
    /// Opaque vendor parameters merged into the request body
    pub provider_options: Map<String, Value>,
    pub max_turns: Option<u32>,
}

impl OperateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: ProviderType) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Set one placeholder value
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Replace all placeholder values
    pub fn data_map(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Choose which fields receive placeholder substitution
    pub fn placeholder_targets(mut self, targets: PlaceholderTargets) -> Self {
        self.placeholders = targets;
        self
    }

    pub fn history(mut self, history: Vec<HistoryItem>) -> Self {
        self.history = history;
        self
    }

    pub fn tools(mut self, toolkit: impl Toolkit + 'static) -> Self {
        self.tools = Some(Arc::new(toolkit));
        self
    }

    /// Share an existing toolkit
    pub fn toolkit(mut self, toolkit: Arc<dyn Toolkit>) -> Self {
        self.tools = Some(toolkit);
        self
    }

    /// Request structured output; plain JSON values are detected as schema or shorthand
    pub fn format(mut self, format: impl Into<OutputFormat>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Exactly one attempt, ignoring any configured chain
    pub fn no_fallback(self) -> Self {
        self.fallback(Fallback::Disabled)
    }

    pub fn provider_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.provider_options.insert(key.into(), value.into());
        self
    }

    pub fn provider_options(mut self, options: Map<String, Value>) -> Self {
        self.provider_options = options;
        self
    }

    pub fn max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }
}

impl fmt::Debug for OperateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperateOptions")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("system", &self.system)
            .field("instructions", &self.instructions)
            .field("data", &self.data)
            .field("history", &self.history.len())
            .field("tools", &self.tools.is_some())
            .field("format", &self.format)
            .field("fallback", &self.fallback)
            .field("max_turns", &self.max_turns)
            .finish_non_exhaustive()
    }
}

/// Everything about a call that does not depend on the candidate
struct PreparedCall {
    /// Caller history followed by the input items
    messages: Vec<HistoryItem>,
    system: Option<String>,
    instructions: Option<String>,
    tools: Vec<ToolDefinition>,
    structured: Option<StructuredOutput>,
    provider_options: Map<String, Value>,
}

impl PreparedCall {
    fn request(&self, model: &str) -> OperateRequest {
        OperateRequest {
            model: model.to_string(),
            messages: self.messages.clone(),
            system: self.system.clone(),
            instructions: self.instructions.clone(),
            tools: self.tools.clone(),
            format: self.structured.as_ref().map(|s| s.schema().clone()),
            provider_options: self.provider_options.clone(),
        }
    }
}

/// A successful attempt with its final content
struct Attempt {
    outcome: LoopOutcome,
    content: Option<Content>,
}

/// Multi-vendor client
#[derive(Debug)]
pub struct Llm {
    registry: ProviderRegistry,
    default_provider: Option<ProviderType>,
    default_model: Option<String>,
    provider_models: HashMap<ProviderType, String>,
    system: Option<String>,
    max_turns: u32,
    fallback: Vec<FallbackTarget>,
    retry: RetryPolicy,
}

impl Llm {
    pub fn builder() -> LlmBuilder {
        LlmBuilder::new()
    }

    /// Build a client from a validated configuration
    pub fn from_config(config: &SwitchyardConfig, transport: Arc<dyn Transport>) -> Result<Self, OperateError> {
        LlmBuilder::from_config(config, transport)?.build()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Fallback chain used when a call does not override it
    pub fn fallback_chain(&self) -> &[FallbackTarget] {
        &self.fallback
    }

    /// Run a conversation to completion against the primary provider,
    /// falling back through the chain on failure
    pub async fn operate(
        &self,
        input: impl Into<OperateInput>,
        options: OperateOptions,
    ) -> Result<OperateResult, OperateError> {
        let prepared = self.prepare(input.into(), &options)?;
        let primary = self.primary_target(&options)?;
        let fallbacks = options
            .fallback
            .resolve(&self.fallback)
            .iter()
            .map(|target| self.resolve_target(target))
            .collect();
        let orchestrator = FallbackOrchestrator::new(primary, fallbacks);

        let context = LoopContext {
            toolkit: options.tools.clone(),
            hooks: options.hooks.clone(),
            max_turns: options.max_turns.unwrap_or(self.max_turns),
            retry: self.retry.clone(),
        };

        info!(
            candidates = orchestrator.candidates().count(),
            tools = prepared.tools.len(),
            structured = prepared.structured.is_some(),
            max_turns = context.max_turns,
            "operate started"
        );

        let success = orchestrator
            .run(|target| {
                let target = target.clone();
                let prepared = &prepared;
                let context = &context;
                async move { self.attempt(&target, prepared, context).await }
            })
            .await?;

        let FallbackSuccess {
            value: Attempt { outcome, content },
            target,
            attempts,
            fallback_used,
            failed_usage,
        } = success;

        let mut usage = failed_usage;
        usage.push(outcome.usage.total());

        let mut history = prepared.messages;
        history.extend(outcome.output.iter().cloned());

        Ok(OperateResult {
            content,
            history,
            usage,
            status: outcome.status,
            detail: outcome.detail,
            provider: target.provider,
            model: target.model_or_default().to_string(),
            fallback_used,
            fallback_attempts: attempts,
            responses: outcome.responses,
            output: outcome.output,
        })
    }

    fn prepare(&self, input: OperateInput, options: &OperateOptions) -> Result<PreparedCall, OperateError> {
        let tools = options
            .tools
            .as_ref()
            .map(|toolkit| toolkit.tools())
            .unwrap_or_default();
        validate_tool_definitions(&tools)?;

        let structured = options.format.as_ref().map(StructuredOutput::new).transpose()?;

        let targets = options.placeholders;
        let substitute = |text: String, enabled: bool| {
            if enabled && !options.data.is_empty() {
                placeholders(&text, &options.data)
            } else {
                text
            }
        };

        let mut messages = options.history.clone();
        messages.extend(input.into_items().into_iter().map(|item| match item {
            HistoryItem::Message { role, content } => HistoryItem::Message {
                role,
                content: substitute(content, targets.input),
            },
            other => other,
        }));

        let system = options.system.clone().or_else(|| self.system.clone());
        Ok(PreparedCall {
            messages,
            system: system.map(|s| substitute(s, targets.system)),
            instructions: options
                .instructions
                .clone()
                .map(|s| substitute(s, targets.instructions)),
            tools,
            structured,
            provider_options: options.provider_options.clone(),
        })
    }

    /// Provider: explicit, else inferred from the model, else the default
    fn primary_target(&self, options: &OperateOptions) -> Result<FallbackTarget, OperateError> {
        let inferred = options.model.as_deref().and_then(ProviderType::from_model);
        let provider = options
            .provider
            .or(inferred)
            .or(self.default_provider)
            .ok_or_else(|| match &options.model {
                Some(model) => OperateError::UnknownModel(model.clone()),
                None => OperateError::Config(ConfigError::invalid("no default provider configured")),
            })?;

        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.model_for(provider));
        Ok(FallbackTarget::new(provider, model))
    }

    fn resolve_target(&self, target: &FallbackTarget) -> FallbackTarget {
        match &target.model {
            Some(_) => target.clone(),
            None => FallbackTarget::new(target.provider, self.model_for(target.provider)),
        }
    }

    fn model_for(&self, provider: ProviderType) -> String {
        if self.default_provider == Some(provider) {
            if let Some(model) = &self.default_model {
                return model.clone();
            }
        }
        self.provider_models
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    async fn attempt(
        &self,
        target: &FallbackTarget,
        prepared: &PreparedCall,
        context: &LoopContext,
    ) -> Result<Attempt, AttemptError> {
        let model = target.model_or_default();
        let operator = self.registry.get(target.provider).ok_or_else(|| {
            AttemptError::new(
                OperateError::ProviderNotRegistered(target.provider),
                UsageItem::zero(target.provider, model),
            )
        })?;

        debug!(%target, "starting attempt");
        let outcome = operator.run(prepared.request(model), context).await?;

        match extract_content(prepared.structured.as_ref(), &outcome) {
            Ok(content) => Ok(Attempt { outcome, content }),
            Err(error) => Err(AttemptError::new(error, outcome.usage.total())),
        }
    }
}

/// Final content of a finished loop
///
/// With a schema, the `structured_output` arguments (or, in native JSON mode,
/// the response text) must validate; an incomplete loop yields no content.
fn extract_content(
    structured: Option<&StructuredOutput>,
    outcome: &LoopOutcome,
) -> Result<Option<Content>, OperateError> {
    let Some(structured) = structured else {
        return Ok(outcome.text.clone().map(Content::Text));
    };
    if outcome.status == OperateStatus::Incomplete {
        return Ok(None);
    }

    let value = match (&outcome.structured, outcome.text.as_deref()) {
        (Some(arguments), _) => structured.extract(Value::Object(arguments.clone()))?,
        (None, Some(text)) if !text.trim().is_empty() => structured.extract_from_text(text)?,
        _ => return Err(OperateError::MissingStructuredOutput),
    };
    Ok(Some(Content::Json(value)))
}

/// Builder for [`Llm`]
#[derive(Debug, Default)]
pub struct LlmBuilder {
    registry: ProviderRegistry,
    default_provider: Option<ProviderType>,
    default_model: Option<String>,
    provider_models: HashMap<ProviderType, String>,
    system: Option<String>,
    max_turns: Option<u32>,
    fallback: Vec<FallbackTarget>,
    retry: RetryPolicy,
}

impl LlmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in provider
    pub fn provider(mut self, provider: ProviderType, client: ProviderClient) -> Self {
        self.registry.register(provider, client);
        self
    }

    /// Register a custom operator
    pub fn operator(mut self, operator: Arc<dyn Operator>) -> Self {
        self.registry.insert(operator);
        self
    }

    pub fn default_provider(mut self, provider: ProviderType) -> Self {
        self.default_provider = Some(provider);
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Model used whenever `provider` is selected without one
    pub fn provider_model(mut self, provider: ProviderType, model: impl Into<String>) -> Self {
        self.provider_models.insert(provider, model.into());
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn fallback(mut self, chain: Vec<FallbackTarget>) -> Self {
        self.fallback = chain;
        self
    }

    pub fn fallback_target(mut self, target: FallbackTarget) -> Self {
        self.fallback.push(target);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder populated from a configuration; every enabled provider shares `transport`
    pub fn from_config(config: &SwitchyardConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        ConfigValidator::new().validate(config)?;

        let mut builder = Self::new()
            .max_turns(config.defaults.max_turns)
            .fallback(config.fallback.clone())
            .retry(config.retry.clone());

        for entry in config.enabled_providers() {
            let mut client = ProviderClient::new(transport.clone()).with_api_key(entry.api_key.clone());
            if let Some(base_url) = &entry.base_url {
                client = client.with_base_url(base_url.clone());
            }
            if let Some(timeout_ms) = entry.timeout_ms {
                client = client.with_timeout(Duration::from_millis(timeout_ms));
            }
            builder = builder.provider(entry.provider, client);
            if let Some(model) = &entry.default_model {
                builder = builder.provider_model(entry.provider, model.clone());
            }
        }

        if let Some(provider) = config.primary_provider() {
            builder = builder.default_provider(provider);
        }
        if let Some(model) = &config.defaults.model {
            builder = builder.default_model(model.clone());
        }
        if let Some(system) = &config.defaults.system {
            builder = builder.system(system.clone());
        }

        info!(providers = ?builder.registry.providers(), "client configured");
        Ok(builder)
    }

    pub fn build(self) -> Result<Llm, OperateError> {
        if self.registry.is_empty() {
            return Err(ConfigError::invalid("no providers registered").into());
        }

        let referenced = self
            .default_provider
            .into_iter()
            .chain(self.fallback.iter().map(|target| target.provider));
        for provider in referenced {
            if !self.registry.contains(provider) {
                return Err(OperateError::ProviderNotRegistered(provider));
            }
        }

        Ok(Llm {
            registry: self.registry,
            default_provider: self.default_provider,
            default_model: self.default_model,
            provider_models: self.provider_models,
            system: self.system,
            max_turns: self.max_turns.unwrap_or(DEFAULT_MAX_TURNS),
            fallback: self.fallback,
            retry: self.retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolCallStatus;
    use serde_json::json;

    fn outcome(status: OperateStatus, text: Option<&str>, structured: Option<Value>) -> LoopOutcome {
        LoopOutcome {
            status,
            detail: None,
            text: text.map(str::to_string),
            structured: structured.and_then(|v| v.as_object().cloned()),
            output: vec![],
            responses: vec![],
            usage: UsageAccumulator::new(ProviderType::OpenAI, "gpt-4o"),
            turns: 0,
        }
    }

    fn schema() -> StructuredOutput {
        StructuredOutput::new(&OutputFormat::Natural(json!({"answer": "string"}))).unwrap()
    }

    #[test]
    fn test_plain_text_content() {
        let content = extract_content(None, &outcome(OperateStatus::Completed, Some("hi"), None)).unwrap();
        assert_eq!(content, Some(Content::Text("hi".to_string())));
    }

    #[test]
    fn test_structured_arguments_become_content() {
        let out = outcome(OperateStatus::Completed, None, Some(json!({"answer": "42"})));
        let content = extract_content(Some(&schema()), &out).unwrap();
        assert_eq!(content, Some(Content::Json(json!({"answer": "42"}))));
    }

    #[test]
    fn test_native_text_is_parsed() {
        let out = outcome(OperateStatus::Completed, Some(r#"{"answer": "yes"}"#), None);
        let content = extract_content(Some(&schema()), &out).unwrap();
        assert_eq!(content, Some(Content::Json(json!({"answer": "yes"}))));
    }

    #[test]
    fn test_missing_structured_output_is_error() {
        let out = outcome(OperateStatus::Completed, None, None);
        assert!(matches!(
            extract_content(Some(&schema()), &out),
            Err(OperateError::MissingStructuredOutput)
        ));
    }

    #[test]
    fn test_incomplete_structured_call_has_no_content() {
        let out = outcome(OperateStatus::Incomplete, Some("partial"), None);
        assert_eq!(extract_content(Some(&schema()), &out).unwrap(), None);
    }

    #[test]
    fn test_placeholders_respect_targets() {
        let transport: Arc<dyn Transport> = Arc::new(NoTransport);
        let llm = Llm::builder()
            .provider(ProviderType::OpenAI, ProviderClient::new(transport))
            .default_provider(ProviderType::OpenAI)
            .build()
            .unwrap();

        let options = OperateOptions::new()
            .system("You help {{name}}")
            .instructions("Greet {{name}}")
            .data("name", "Ada")
            .placeholder_targets(PlaceholderTargets {
                system: false,
                ..Default::default()
            })
            .history(vec![HistoryItem::FunctionCallOutput {
                call_id: "c".to_string(),
                output: "{{name}}".to_string(),
                status: ToolCallStatus::Completed,
            }]);

        let prepared = llm.prepare(OperateInput::from("Hi {{name}}"), &options).unwrap();
        assert_eq!(prepared.system.as_deref(), Some("You help {{name}}"));
        assert_eq!(prepared.instructions.as_deref(), Some("Greet Ada"));
        assert_eq!(prepared.messages.len(), 2);
        assert_eq!(prepared.messages[1].text(), Some("Hi Ada"));
    }

    #[test]
    fn test_target_resolution() {
        let transport: Arc<dyn Transport> = Arc::new(NoTransport);
        let llm = Llm::builder()
            .provider(ProviderType::Anthropic, ProviderClient::new(transport.clone()))
            .provider(ProviderType::Gemini, ProviderClient::new(transport))
            .default_provider(ProviderType::Anthropic)
            .default_model("claude-3-5-haiku-latest")
            .provider_model(ProviderType::Gemini, "gemini-2.5-pro")
            .build()
            .unwrap();

        let primary = llm.primary_target(&OperateOptions::new()).unwrap();
        assert_eq!(primary, FallbackTarget::new(ProviderType::Anthropic, "claude-3-5-haiku-latest"));

        let inferred = llm.primary_target(&OperateOptions::new().model("gemini-2.0-flash")).unwrap();
        assert_eq!(inferred.provider, ProviderType::Gemini);

        let by_provider = llm.primary_target(&OperateOptions::new().provider(ProviderType::Gemini)).unwrap();
        assert_eq!(by_provider.model.as_deref(), Some("gemini-2.5-pro"));

        let fallback = llm.resolve_target(&FallbackTarget::provider(ProviderType::Gemini));
        assert_eq!(fallback.model.as_deref(), Some("gemini-2.5-pro"));
    }

    #[test]
    fn test_build_rejects_unregistered_fallback() {
        let transport: Arc<dyn Transport> = Arc::new(NoTransport);
        let result = Llm::builder()
            .provider(ProviderType::OpenAI, ProviderClient::new(transport))
            .fallback_target(FallbackTarget::provider(ProviderType::Anthropic))
            .build();
        assert!(matches!(
            result,
            Err(OperateError::ProviderNotRegistered(ProviderType::Anthropic))
        ));
    }

    struct NoTransport;

    #[async_trait::async_trait]
    impl Transport for NoTransport {
        async fn send(
            &self,
            _request: crate::providers::transport::TransportRequest,
        ) -> crate::providers::ProviderResult<Value> {
            Err(crate::providers::ProviderError::Network("offline".to_string()))
        }
    }
}
