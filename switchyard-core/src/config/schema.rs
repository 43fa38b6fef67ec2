//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use super::secrets::SecretString;
use crate::operate::{FallbackTarget, DEFAULT_MAX_TURNS};
use crate::providers::{ProviderType, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The only schema version understood by this crate
pub const CONFIG_VERSION: &str = "0.1";

/// Root configuration structure for Switchyard
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchyardConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// Vendor credentials and overrides, one entry per provider
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,

    /// Defaults applied to every operate call
    #[serde(default)]
    pub defaults: Defaults,

    /// Ordered fallback chain tried after the primary
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<FallbackTarget>,

    /// Per-turn retry of vendor calls
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Custom metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One configured vendor
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    /// Which vendor this entry configures
    #[serde(rename = "type")]
    pub provider: ProviderType,

    /// API key (supports environment variable interpolation)
    pub api_key: SecretString,

    /// Override for the vendor's default base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model used when this provider is selected without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Timeout hint passed to the transport (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Disabled entries are validated but not registered
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ProviderEntry {
    /// The model to use when none is given for this provider
    pub fn model(&self) -> &str {
        self.default_model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }
}

/// Default values for operate calls
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Primary provider; the first enabled provider when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderType>,

    /// Primary model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Tool-execution rounds allowed per attempt
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// System prompt used when a call sets none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            max_turns: DEFAULT_MAX_TURNS,
            system: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_turns() -> u32 {
    DEFAULT_MAX_TURNS
}

impl SwitchyardConfig {
    /// Enabled provider entries, in file order
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Entry for a provider type
    pub fn provider(&self, provider: ProviderType) -> Option<&ProviderEntry> {
        self.providers.iter().find(|p| p.provider == provider)
    }

    /// The primary provider: `defaults.provider`, else the first enabled entry
    pub fn primary_provider(&self) -> Option<ProviderType> {
        self.defaults
            .provider
            .or_else(|| self.enabled_providers().next().map(|p| p.provider))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::missing("version"));
        }

        if self.version != CONFIG_VERSION {
            let kind = ValidationErrorKind::UnsupportedVersion {
                found: self.version.clone(),
            };
            return Err(ValidationError::new("version", kind)
                .with_hint(format!("this release reads version \"{}\"", CONFIG_VERSION)));
        }

        if self.providers.is_empty() {
            return Err(ValidationError::missing("providers")
                .with_hint("list at least one vendor with its api_key"));
        }

        let mut seen = HashSet::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if !seen.insert(provider.provider) {
                return Err(ValidationError::new(
                    format!("providers[{}].type", i),
                    ValidationErrorKind::DuplicateProvider(provider.provider),
                ));
            }
            provider.validate(&format!("providers[{}]", i))?;
        }

        self.defaults.validate("defaults")?;
        Ok(())
    }
}

impl ProviderEntry {
    /// Validate provider configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        // Can still be an env var placeholder at this point
        if self.api_key.is_empty() {
            return Err(ValidationError::missing(format!("{}.api_key", path)));
        }

        if let Some(base_url) = &self.base_url {
            validate_url(base_url, &format!("{}.base_url", path))?;
        }

        if self.default_model.as_deref().is_some_and(str::is_empty) {
            return Err(ValidationError::invalid_value(
                format!("{}.default_model", path),
                "non-empty model name",
                "empty string",
            ));
        }

        if self.timeout_ms == Some(0) {
            return Err(ValidationError::out_of_range(
                format!("{}.timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Defaults {
    /// Validate defaults
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.max_turns == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_turns", path),
                "Must be at least 1",
            ));
        }

        if self.model.as_deref().is_some_and(str::is_empty) {
            return Err(ValidationError::invalid_value(
                format!("{}.model", path),
                "non-empty model name",
                "empty string",
            ));
        }

        Ok(())
    }
}

fn validate_url(value: &str, path: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        Ok(url) => Err(ValidationError::new(
            path,
            ValidationErrorKind::InvalidUrl {
                message: format!("URL scheme must be http or https, got: {}", url.scheme()),
            },
        )),
        Err(e) => Err(ValidationError::new(
            path,
            ValidationErrorKind::InvalidUrl {
                message: e.to_string(),
            },
        )),
    }
}
