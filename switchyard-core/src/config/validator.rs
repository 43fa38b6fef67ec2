//! Configuration validation utilities

use super::error::{ValidationError, ValidationErrorKind};
use super::schema::SwitchyardConfig;
use crate::providers::{ProviderType, RetryPolicy};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::warn;

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

static SENSITIVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(api_key|secret|token|password|credential)").unwrap());

/// Configuration validator with cross-field rules
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &SwitchyardConfig) -> Result<(), ValidationError> {
        // Structural rules first
        config.validate()?;

        self.validate_defaults(config)?;
        self.validate_fallback(config)?;
        self.validate_retry(&config.retry, "retry")?;

        Ok(())
    }

    /// Findings about how `api_key` values are sourced in the raw, not yet
    /// interpolated document
    pub fn api_key_findings(&self, raw: &Value) -> Vec<String> {
        let providers = raw.get("providers").and_then(Value::as_array);
        providers
            .into_iter()
            .flatten()
            .enumerate()
            .filter_map(|(index, entry)| {
                let api_key = entry.get("api_key")?.as_str()?;
                let path = format!("providers[{}].api_key", index);
                match ENV_VAR_PATTERN.captures(api_key) {
                    Some(cap) if !SENSITIVE_PATTERN.is_match(&cap[1]) => Some(format!(
                        "{}: placeholder uses non-sensitive variable name '{}'",
                        path, &cap[1]
                    )),
                    Some(_) => None,
                    None if !api_key.is_empty() => {
                        Some(format!("{}: appears to be a literal key; use ${{VAR}} instead", path))
                    }
                    None => None,
                }
            })
            .collect()
    }

    /// Log [`Self::api_key_findings`] as warnings
    pub fn warn_on_api_key_sources(&self, raw: &Value) {
        for finding in self.api_key_findings(raw) {
            warn!(finding = %finding, "api_key source");
        }
    }

    /// The primary provider must exist and be enabled
    fn validate_defaults(&self, config: &SwitchyardConfig) -> Result<(), ValidationError> {
        if config.enabled_providers().next().is_none() {
            return Err(ValidationError::new("providers", ValidationErrorKind::NoEnabledProvider));
        }

        if let Some(provider) = config.defaults.provider {
            self.require_enabled(config, provider, "defaults.provider")?;
        }

        if let (Some(model), Some(primary)) = (&config.defaults.model, config.primary_provider()) {
            if let Some(inferred) = ProviderType::from_model(model) {
                if inferred != primary {
                    warn!(
                        model = %model,
                        provider = %primary,
                        "defaults.model looks like a model of another provider"
                    );
                }
            }
        }

        Ok(())
    }

    /// Every fallback target must reference an enabled provider
    fn validate_fallback(&self, config: &SwitchyardConfig) -> Result<(), ValidationError> {
        for (i, target) in config.fallback.iter().enumerate() {
            let path = format!("fallback[{}]", i);
            self.require_enabled(config, target.provider, &format!("{}.provider", path))?;

            if target.model.as_deref().is_some_and(str::is_empty) {
                return Err(ValidationError::invalid_value(
                    format!("{}.model", path),
                    "non-empty model name",
                    "empty string",
                ));
            }
        }
        Ok(())
    }

    fn require_enabled(
        &self,
        config: &SwitchyardConfig,
        provider: ProviderType,
        path: &str,
    ) -> Result<(), ValidationError> {
        match config.provider(provider) {
            Some(entry) if entry.enabled => Ok(()),
            Some(_) => Err(ValidationError::new(path, ValidationErrorKind::DisabledProvider(provider))),
            None => Err(ValidationError::new(path, ValidationErrorKind::UnknownProvider(provider))
                .with_hint(format!("add a '{}' entry under providers", provider))),
        }
    }

    /// Validate retry policy
    pub fn validate_retry(&self, retry: &RetryPolicy, path: &str) -> Result<(), ValidationError> {
        if retry.initial_delay_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.initial_delay_ms", path),
                "Must be greater than 0",
            ));
        }

        if retry.max_delay_ms < retry.initial_delay_ms {
            return Err(ValidationError::out_of_range(
                format!("{}.max_delay_ms", path),
                "Must be >= initial_delay_ms",
            ));
        }

        if retry.exponential_base <= 1.0 {
            return Err(ValidationError::out_of_range(
                format!("{}.exponential_base", path),
                "Must be greater than 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(ValidationError::out_of_range(
                format!("{}.jitter_factor", path),
                "Must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }

    /// Check if a field name appears to contain sensitive information
    pub fn is_sensitive_field(&self, field_name: &str) -> bool {
        SENSITIVE_PATTERN.is_match(field_name)
    }

    /// Extract environment variables from a string
    pub fn extract_env_vars(&self, text: &str) -> Vec<String> {
        ENV_VAR_PATTERN
            .captures_iter(text)
            .map(|cap| cap[1].to_string())
            .collect()
    }
}
