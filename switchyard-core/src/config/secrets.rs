//! Secret handling for configuration
//!
//! API keys travel as [`SecretString`], which serializes its real value (so
//! configs can be persisted) but never prints it through `Debug` or `Display`.

use serde::{Deserialize, Serialize};
use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// A wrapper type for sensitive strings like API keys
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Get the actual value (use with caution)
    pub fn expose_secret(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// A partially redacted version for debugging
    pub fn partial_redact(&self) -> String {
        let chars: Vec<char> = self.value.chars().collect();
        let len = chars.len();
        if len == 0 {
            return "[EMPTY]".to_string();
        }
        if len <= 8 {
            return REDACTED.to_string();
        }

        let head = if self.value.starts_with("sk-") { 3 } else { 2 };
        let tail = if head == 3 { 4 } else { 2 };
        let prefix: String = chars[..head].iter().collect();
        let suffix: String = chars[len - tail..].iter().collect();
        format!("{}...{}", prefix, suffix)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Types that can describe themselves without leaking secrets
pub trait SafeLogging {
    fn safe_for_logging(&self) -> String;
}

impl SafeLogging for super::SwitchyardConfig {
    fn safe_for_logging(&self) -> String {
        let providers: Vec<String> = self
            .providers
            .iter()
            .map(|p| {
                format!(
                    "{}(key={}, enabled={})",
                    p.provider,
                    p.api_key.partial_redact(),
                    p.enabled
                )
            })
            .collect();
        format!(
            "version={} providers=[{}] fallback={}",
            self.version,
            providers.join(", "),
            self.fallback.len()
        )
    }
}

/// Redact a value when its field name looks sensitive
pub fn redact_by_field_name(field_name: &str, value: &str) -> String {
    const SENSITIVE: &[&str] = &[
        "api_key",
        "secret",
        "token",
        "password",
        "credential",
        "auth",
        "private",
    ];

    let field = field_name.to_lowercase();
    if SENSITIVE.iter().any(|pattern| field.contains(pattern)) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}
