//! Configuration for Switchyard
//!
//! A config file names the vendors to register (with credentials), the default
//! provider/model, the fallback chain and the per-turn retry policy.
//! `LlmBuilder::from_config` turns it into a ready client.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{Defaults, ProviderEntry, SwitchyardConfig, CONFIG_VERSION};
pub use secrets::{redact_by_field_name, SafeLogging, SecretString};
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;
use tracing::debug;

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<SwitchyardConfig> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_yaml(&content, &path.to_string_lossy())
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<SwitchyardConfig> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_json(&content, &path.to_string_lossy())
}

/// Parse YAML text; `origin` names the source in errors
pub fn parse_yaml(content: &str, origin: &str) -> ConfigResult<SwitchyardConfig> {
    if let Ok(raw) = serde_yaml::from_str::<serde_json::Value>(content) {
        ConfigValidator::new().warn_on_api_key_sources(&raw);
    }
    let interpolated = env::interpolate_env_vars(content)?;
    let config: SwitchyardConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            origin: origin.to_string(),
            location: e.location().map(|l| (l.line(), l.column())),
            message: e.to_string(),
        })?;
    finish(config)
}

/// Parse JSON text; `origin` names the source in errors
pub fn parse_json(content: &str, origin: &str) -> ConfigResult<SwitchyardConfig> {
    if let Ok(raw) = serde_json::from_str::<serde_json::Value>(content) {
        ConfigValidator::new().warn_on_api_key_sources(&raw);
    }
    let interpolated = env::interpolate_env_vars(content)?;
    let config: SwitchyardConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            origin: origin.to_string(),
            location: Some((e.line(), e.column())),
            message: e.to_string(),
        })?;
    finish(config)
}

fn read(path: &Path) -> ConfigResult<String> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn finish(mut config: SwitchyardConfig) -> ConfigResult<SwitchyardConfig> {
    env::interpolate_config_env_vars(&mut config)?;
    ConfigValidator::new().validate(&config)?;
    debug!(config = %config.safe_for_logging(), "configuration loaded");
    Ok(config)
}
