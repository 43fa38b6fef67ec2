//! Sequential provider fallback
//!
//! Candidates are tried strictly in order, each only after the previous one
//! has fully failed. Any attempt error moves on to the next candidate; when
//! the chain is exhausted the last error is returned unchanged.

use crate::error::OperateError;
use crate::operate::tool_loop::AttemptError;
use crate::protocol::UsageItem;
use crate::providers::ProviderType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tracing::{info, warn};

/// One provider/model pair in a fallback chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackTarget {
    pub provider: ProviderType,

    /// Model to use; the provider's default model when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl FallbackTarget {
    pub fn new(provider: ProviderType, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: Some(model.into()),
        }
    }

    /// Target using the provider's default model
    pub fn provider(provider: ProviderType) -> Self {
        Self {
            provider,
            model: None,
        }
    }

    /// The model this target resolves to
    pub fn model_or_default(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }
}

impl fmt::Display for FallbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model_or_default())
    }
}

/// Per-call fallback behavior
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Fallback {
    /// Use the chain configured on the client
    #[default]
    Inherit,
    /// Exactly one attempt, even when a chain is configured
    Disabled,
    /// Use this chain instead of the configured one
    Chain(Vec<FallbackTarget>),
}

impl Fallback {
    /// Fallback candidates after applying this override to `configured`
    pub fn resolve<'a>(&'a self, configured: &'a [FallbackTarget]) -> &'a [FallbackTarget] {
        match self {
            Fallback::Inherit => configured,
            Fallback::Disabled => &[],
            Fallback::Chain(chain) => chain,
        }
    }
}

/// A successful run of the chain
#[derive(Debug)]
pub struct FallbackSuccess<T> {
    pub value: T,

    /// Candidate that succeeded
    pub target: FallbackTarget,

    /// Candidates tried, starting at 1 for the primary
    pub attempts: u32,

    /// True iff the primary did not succeed
    pub fallback_used: bool,

    /// Usage of each failed attempt, in order; all zero when the attempt
    /// never got a vendor response
    pub failed_usage: Vec<UsageItem>,
}

/// Primary with fallbacks
#[derive(Debug, Clone)]
pub struct FallbackOrchestrator {
    primary: FallbackTarget,
    fallbacks: Vec<FallbackTarget>,
}

impl FallbackOrchestrator {
    pub fn new(primary: FallbackTarget, fallbacks: Vec<FallbackTarget>) -> Self {
        Self { primary, fallbacks }
    }

    /// All candidates in the order they are tried
    pub fn candidates(&self) -> impl Iterator<Item = &FallbackTarget> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    /// Run `attempt` against each candidate until one succeeds
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<FallbackSuccess<T>, OperateError>
    where
        F: FnMut(&FallbackTarget) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempts = 0u32;
        let mut failed_usage = Vec::new();
        let mut last_error = None;

        for target in self.candidates() {
            attempts += 1;
            match attempt(target).await {
                Ok(value) => {
                    if attempts > 1 {
                        info!(%target, attempts, "fallback candidate succeeded");
                    }
                    return Ok(FallbackSuccess {
                        value,
                        target: target.clone(),
                        attempts,
                        fallback_used: attempts > 1,
                        failed_usage,
                    });
                }
                Err(AttemptError { error, usage }) => {
                    warn!(%target, attempts, error = %error, "provider attempt failed");
                    failed_usage.push(usage);
                    last_error = Some(error);
                }
            }
        }

        // The primary is always tried, so an error was recorded
        Err(last_error.unwrap_or(OperateError::ProviderNotRegistered(self.primary.provider)))
    }
}
