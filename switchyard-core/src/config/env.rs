//! Environment variable interpolation for configuration

use super::error::ConfigError;
use super::schema::SwitchyardConfig;
use super::secrets::SecretString;
use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

/// Replace every `${VAR}` in `content`. Fails on the first unset variable.
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    if let Some(cap) = ENV_VAR_PATTERN
        .captures_iter(content)
        .find(|cap| env::var(&cap[1]).is_err())
    {
        return Err(ConfigError::MissingEnvVar {
            name: cap[1].to_string(),
        });
    }

    Ok(ENV_VAR_PATTERN
        .replace_all(content, |cap: &Captures| env::var(&cap[1]).unwrap_or_default())
        .into_owned())
}

/// Interpolate the credential and URL fields of a parsed configuration.
///
/// Catches placeholders that survive parsing, e.g. when a config is
/// deserialized from a value built in code rather than read from a file.
pub fn interpolate_config_env_vars(config: &mut SwitchyardConfig) -> Result<(), ConfigError> {
    for provider in &mut config.providers {
        let api_key = provider.api_key.expose_secret();
        if ENV_VAR_PATTERN.is_match(api_key) {
            provider.api_key = SecretString::new(interpolate_env_vars(api_key)?);
        }

        if let Some(base_url) = provider.base_url.as_mut() {
            if ENV_VAR_PATTERN.is_match(base_url) {
                *base_url = interpolate_env_vars(base_url)?;
            }
        }
    }

    Ok(())
}
