//! Provider registry
//!
//! Adapters are generic over their vendor types; [`Operator`] erases those so
//! the orchestrator can hold every configured provider in one map keyed by
//! [`ProviderType`]. The map is built once and never re-resolved per call.

use crate::operate::tool_loop::{AttemptError, LoopContext, LoopOutcome, ToolExecutionLoop};
use crate::protocol::OperateRequest;
use crate::providers::transport::ProviderClient;
use crate::providers::{
    AnthropicAdapter, GeminiAdapter, OpenAIAdapter, OpenRouterAdapter, ProviderAdapter,
    ProviderCapabilities, ProviderType,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A provider that can run the tool loop
#[async_trait]
pub trait Operator: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    fn capabilities(&self) -> &ProviderCapabilities;

    /// Run one full attempt against this provider
    async fn run(&self, request: OperateRequest, context: &LoopContext) -> Result<LoopOutcome, AttemptError>;
}

/// An adapter bound to the client that carries its calls
pub struct Provider<A: ProviderAdapter> {
    adapter: A,
    client: ProviderClient,
}

impl<A: ProviderAdapter> Provider<A> {
    pub fn new(adapter: A, client: ProviderClient) -> Self {
        Self { adapter, client }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn client(&self) -> &ProviderClient {
        &self.client
    }
}

#[async_trait]
impl<A: ProviderAdapter> Operator for Provider<A> {
    fn provider_type(&self) -> ProviderType {
        self.adapter.provider_type()
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        self.adapter.capabilities()
    }

    async fn run(&self, request: OperateRequest, context: &LoopContext) -> Result<LoopOutcome, AttemptError> {
        ToolExecutionLoop::new(&self.adapter, &self.client, context)
            .run(request)
            .await
    }
}

/// Build the operator for a built-in provider
pub fn builtin_operator(provider: ProviderType, client: ProviderClient) -> Arc<dyn Operator> {
    match provider {
        ProviderType::OpenAI => Arc::new(Provider::new(OpenAIAdapter::new(), client)),
        ProviderType::Anthropic => Arc::new(Provider::new(AnthropicAdapter::new(), client)),
        ProviderType::Gemini => Arc::new(Provider::new(GeminiAdapter::new(), client)),
        ProviderType::OpenRouter => Arc::new(Provider::new(OpenRouterAdapter::new(), client)),
    }
}

/// Configured providers keyed by type
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    operators: HashMap<ProviderType, Arc<dyn Operator>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in provider with its client, replacing any previous one
    pub fn register(&mut self, provider: ProviderType, client: ProviderClient) {
        self.insert(builtin_operator(provider, client));
    }

    /// Register a custom operator under its own provider type
    pub fn insert(&mut self, operator: Arc<dyn Operator>) {
        self.operators.insert(operator.provider_type(), operator);
    }

    pub fn get(&self, provider: ProviderType) -> Option<Arc<dyn Operator>> {
        self.operators.get(&provider).cloned()
    }

    pub fn contains(&self, provider: ProviderType) -> bool {
        self.operators.contains_key(&provider)
    }

    /// Registered providers in canonical order
    pub fn providers(&self) -> Vec<ProviderType> {
        ProviderType::ALL
            .into_iter()
            .filter(|p| self.operators.contains_key(p))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
