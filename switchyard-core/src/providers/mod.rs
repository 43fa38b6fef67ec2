//! Vendor adapters
//!
//! Every vendor speaks through a [`ProviderAdapter`]: typed wire structs in the
//! adapter's `types.rs`, one conversion into the vendor request and one out of
//! the vendor response. Network I/O stays behind the [`Transport`] seam.

pub mod adapter;
pub mod anthropic;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod openrouter;
pub mod retry;
pub mod transport;

pub use adapter::{FormatPlan, ProviderAdapter, ProviderCapabilities, ProviderType};
pub use error::{ClassifiedError, ErrorCategory, ErrorClassifier, ProviderError, ProviderResult};
pub use retry::{RetryExecutor, RetryPolicy, RetryResult};
pub use transport::{ProviderClient, Transport, TransportRequest};

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAIAdapter;
pub use openrouter::OpenRouterAdapter;
