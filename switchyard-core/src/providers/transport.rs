//! Transport seam between adapters and the vendor network clients
//!
//! Switchyard never performs HTTP itself. The surrounding application supplies a
//! [`Transport`] per provider; adapters hand it a fully-formed vendor body and
//! receive the vendor-native JSON response back.

use crate::config::SecretString;
use crate::providers::error::ProviderResult;
use crate::providers::ProviderType;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A single vendor call, ready to be sent
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Provider the request targets
    pub provider: ProviderType,

    /// Fully-qualified endpoint URL
    pub url: String,

    /// Vendor headers, including credentials
    pub headers: HashMap<String, String>,

    /// Vendor-native JSON body
    pub body: Value,

    /// Unique request ID for correlation
    pub request_id: Uuid,

    /// Optional timeout hint for the transport
    pub timeout: Option<Duration>,
}

/// Performs exactly one vendor call. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> ProviderResult<Value>;
}

/// A transport plus the credentials and overrides for one provider
#[derive(Clone)]
pub struct ProviderClient {
    transport: Arc<dyn Transport>,
    api_key: Option<SecretString>,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl ProviderClient {
    /// Create a client around a transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            api_key: None,
            base_url: None,
            timeout: None,
        }
    }

    /// Set the API key sent in vendor headers
    pub fn with_api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the adapter's default base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set a timeout hint passed to the transport
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
