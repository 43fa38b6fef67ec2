//! Configuration errors

use crate::providers::ProviderType;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Failure to load a configuration or to build a client from one
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `origin` is a file path or a caller-supplied label such as `inline`
    #[error("cannot parse config '{origin}'{}: {message}", location_suffix(.location))]
    Parse {
        origin: String,
        location: Option<(usize, usize)>,
        message: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("environment variable '{name}' is not set")]
    MissingEnvVar { name: String },

    /// Settings that parse and validate but cannot produce a working client
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

fn location_suffix(location: &Option<(usize, usize)>) -> String {
    location
        .map(|(line, column)| format!(" at {}:{}", line, column))
        .unwrap_or_default()
}

/// A rule broken at a field path such as `providers[0].api_key`
#[derive(Debug, Error)]
pub struct ValidationError {
    pub path: String,
    pub kind: ValidationErrorKind,
    /// Extra guidance for the user
    pub hint: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid config at '{}': {}", self.path, self.kind)?;
        match &self.hint {
            Some(hint) => write!(f, " ({})", hint),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationErrorKind {
    #[error("value is required")]
    Missing,

    #[error("expected {expected}, got {actual}")]
    InvalidValue { expected: String, actual: String },

    #[error("out of range: {message}")]
    OutOfRange { message: String },

    #[error("provider '{0}' is listed more than once")]
    DuplicateProvider(ProviderType),

    #[error("provider '{0}' is not configured")]
    UnknownProvider(ProviderType),

    #[error("provider '{0}' is disabled")]
    DisabledProvider(ProviderType),

    #[error("invalid URL: {message}")]
    InvalidUrl { message: String },

    #[error("unsupported config version '{found}'")]
    UnsupportedVersion { found: String },

    #[error("no provider is enabled")]
    NoEnabledProvider,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn missing(path: impl Into<String>) -> Self {
        Self::new(path, ValidationErrorKind::Missing)
    }

    pub fn invalid_value(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        let kind = ValidationErrorKind::InvalidValue {
            expected: expected.into(),
            actual: actual.into(),
        };
        Self::new(path, kind)
    }

    pub fn out_of_range(path: impl Into<String>, message: impl Into<String>) -> Self {
        let kind = ValidationErrorKind::OutOfRange {
            message: message.into(),
        };
        Self::new(path, kind)
    }
}
