//! Switchyard Core Library
//!
//! One API over several LLM vendors: multi-turn tool calling, schema-validated
//! structured output, and ordered provider fallback.
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchyard_core::{Llm, OperateOptions, ProviderClient, ProviderType, Transport};
//!
//! # async fn run(transport: Arc<dyn Transport>) -> Result<(), switchyard_core::OperateError> {
//! let llm = Llm::builder()
//!     .provider(ProviderType::Anthropic, ProviderClient::new(transport).with_api_key("sk-ant-..."))
//!     .default_provider(ProviderType::Anthropic)
//!     .build()?;
//!
//! let result = llm.operate("Name three rivers", OperateOptions::new()).await?;
//! println!("{:?}", result.text());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod operate;
pub mod placeholders;
pub mod protocol;
pub mod providers;
pub mod structured;
pub mod tools;

pub use error::OperateError;
pub use operate::{Fallback, FallbackTarget, Llm, LlmBuilder, OperateOptions};
pub use placeholders::{placeholders, PlaceholderTargets};
pub use protocol::{Content, HistoryItem, OperateInput, OperateResult, OperateStatus, UsageItem};
pub use providers::{ProviderClient, ProviderError, ProviderType, RetryPolicy, Transport, TransportRequest};
pub use structured::OutputFormat;
pub use tools::{Hooks, ToolSet, Toolkit};

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), "0.1.0");
    }
}
