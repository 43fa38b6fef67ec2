//! Loading configuration files and building a client from them

mod common;

use common::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Duration;
use switchyard_core::config::{
    self, ConfigError, SafeLogging, SecretString, SwitchyardConfig, ValidationErrorKind,
};
use switchyard_core::{FallbackTarget, Llm, OperateOptions, ProviderType, Transport};
use tempfile::NamedTempFile;

fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const FULL_YAML: &str = r#"
version: "0.1"
providers:
  - type: openai
    api_key: sk-test-openai-1234
    default_model: gpt-4o-mini
  - type: anthropic
    api_key: sk-ant-test-5678
    base_url: https://llm-proxy.internal/anthropic/v1
    timeout_ms: 15000
  - type: gemini
    api_key: gm-test
    enabled: false
defaults:
  provider: anthropic
  model: claude-3-5-haiku-latest
  max_turns: 4
  system: You are terse.
fallback:
  - provider: openai
retry:
  max_retries: 2
  initial_delay_ms: 50
  max_delay_ms: 1000
"#;

#[test]
fn test_load_yaml_file() {
    let file = write_temp(".yaml", FULL_YAML);
    let config = config::load_from_yaml(file.path()).unwrap();

    assert_eq!(config.providers.len(), 3);
    assert_eq!(config.enabled_providers().count(), 2);
    assert_eq!(config.primary_provider(), Some(ProviderType::Anthropic));
    assert_eq!(config.defaults.max_turns, 4);
    assert_eq!(config.fallback, vec![FallbackTarget::provider(ProviderType::OpenAI)]);
    assert_eq!(config.retry.max_retries, 2);
    assert_eq!(config.retry.initial_delay_ms, 50);

    let anthropic = config.provider(ProviderType::Anthropic).unwrap();
    assert_eq!(anthropic.timeout_ms, Some(15_000));
    assert_eq!(anthropic.api_key.expose_secret(), "sk-ant-test-5678");
}

#[test]
fn test_load_json_file() {
    let json = r#"{
        "version": "0.1",
        "providers": [
            {"type": "openrouter", "api_key": "or-test", "default_model": "anthropic/claude-3.5-sonnet"}
        ],
        "fallback": [{"provider": "openrouter", "model": "openai/gpt-4o-mini"}]
    }"#;
    let file = write_temp(".json", json);
    let config = config::load_from_json(file.path()).unwrap();

    assert_eq!(config.primary_provider(), Some(ProviderType::OpenRouter));
    assert_eq!(config.defaults.max_turns, 1);
    assert_eq!(
        config.fallback[0],
        FallbackTarget::new(ProviderType::OpenRouter, "openai/gpt-4o-mini")
    );
}

#[test]
fn test_missing_file_is_io_error() {
    let error = config::load_from_yaml("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(error, ConfigError::Io { .. }));
}

#[test]
fn test_env_var_interpolation() {
    std::env::set_var("SWITCHYARD_TEST_OPENAI_API_KEY", "sk-from-env-9999");
    let yaml = r#"
version: "0.1"
providers:
  - type: openai
    api_key: ${SWITCHYARD_TEST_OPENAI_API_KEY}
"#;
    let config = config::parse_yaml(yaml, "inline").unwrap();
    assert_eq!(
        config.providers[0].api_key.expose_secret(),
        "sk-from-env-9999"
    );
}

#[test]
fn test_missing_env_var_is_reported() {
    let yaml = r#"
version: "0.1"
providers:
  - type: openai
    api_key: ${SWITCHYARD_TEST_UNSET_API_KEY}
"#;
    match config::parse_yaml(yaml, "inline") {
        Err(ConfigError::MissingEnvVar { name }) => assert_eq!(name, "SWITCHYARD_TEST_UNSET_API_KEY"),
        other => panic!("expected missing variable, got {other:?}"),
    }
}

#[test]
fn test_unsupported_version_rejected() {
    let yaml = r#"
version: "9.9"
providers:
  - type: openai
    api_key: k
"#;
    match config::parse_yaml(yaml, "inline") {
        Err(ConfigError::Validation(error)) => {
            assert_eq!(error.path, "version");
            assert!(matches!(error.kind, ValidationErrorKind::UnsupportedVersion { .. }));
        }
        other => panic!("expected version error, got {other:?}"),
    }
}

#[test]
fn test_fallback_to_unconfigured_provider_rejected() {
    let yaml = r#"
version: "0.1"
providers:
  - type: openai
    api_key: k
fallback:
  - provider: gemini
"#;
    match config::parse_yaml(yaml, "inline") {
        Err(ConfigError::Validation(error)) => {
            assert_eq!(error.path, "fallback[0].provider");
            assert!(matches!(error.kind, ValidationErrorKind::UnknownProvider(ProviderType::Gemini)));
        }
        other => panic!("expected fallback error, got {other:?}"),
    }
}

#[test]
fn test_fallback_to_disabled_provider_rejected() {
    let yaml = r#"
version: "0.1"
providers:
  - type: openai
    api_key: k
  - type: gemini
    api_key: g
    enabled: false
fallback:
  - provider: gemini
"#;
    match config::parse_yaml(yaml, "inline") {
        Err(ConfigError::Validation(error)) => {
            assert!(matches!(error.kind, ValidationErrorKind::DisabledProvider(ProviderType::Gemini)));
        }
        other => panic!("expected disabled-provider error, got {other:?}"),
    }
}

#[test]
fn test_safe_logging_hides_keys() {
    let config = config::parse_yaml(FULL_YAML, "inline").unwrap();
    let logged = config.safe_for_logging();

    assert!(!logged.contains("sk-test-openai-1234"));
    assert!(!logged.contains("sk-ant-test-5678"));
    assert!(format!("{:?}", config).contains("[REDACTED]"));
}

#[derive(Serialize, Deserialize, Debug)]
struct StoredCredential {
    api_key: SecretString,
    label: String,
}

#[test]
fn test_secret_survives_persistence_but_not_formatting() {
    let stored = StoredCredential {
        api_key: SecretString::new("sk-persisted-0000"),
        label: "primary".to_string(),
    };

    let json = serde_json::to_string(&stored).unwrap();
    assert!(json.contains("sk-persisted-0000"));
    let yaml = serde_yaml::to_string(&stored).unwrap();
    assert!(yaml.contains("sk-persisted-0000"));

    let restored: StoredCredential = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(restored.api_key.expose_secret(), "sk-persisted-0000");
    assert_eq!(format!("{:?}", restored.api_key), "[REDACTED]");
    assert_eq!(restored.api_key.to_string(), "[REDACTED]");
}

#[tokio::test]
async fn test_client_from_config_uses_overrides() {
    let config: SwitchyardConfig = config::parse_yaml(FULL_YAML, "inline").unwrap();
    let transport = ScriptedTransport::new();
    transport.reply(ProviderType::Anthropic, anthropic_text("ok"));

    let shared: std::sync::Arc<dyn Transport> = transport.clone();
    let llm = Llm::from_config(&config, shared).unwrap();
    assert!(llm.registry().contains(ProviderType::OpenAI));
    assert!(!llm.registry().contains(ProviderType::Gemini));

    let result = llm.operate("Hi", OperateOptions::new()).await.unwrap();
    assert_eq!(result.provider, ProviderType::Anthropic);
    assert_eq!(result.model, "claude-3-5-haiku-latest");

    let request = &transport.requests()[0];
    assert_eq!(request.url, "https://llm-proxy.internal/anthropic/v1/messages");
    assert_eq!(request.timeout, Some(Duration::from_millis(15_000)));
    assert_eq!(
        request.headers.get("x-api-key").map(String::as_str),
        Some("sk-ant-test-5678")
    );
    assert_eq!(request.body["model"], "claude-3-5-haiku-latest");
    assert_eq!(request.body["system"], "You are terse.");
}

#[tokio::test]
async fn test_config_fallback_uses_provider_default_model() {
    let config = config::parse_yaml(FULL_YAML, "inline").unwrap();
    let transport = ScriptedTransport::new();
    transport.fail(ProviderType::Anthropic, http_error(500));
    transport.reply(ProviderType::OpenAI, openai_text("from fallback"));

    let shared: std::sync::Arc<dyn Transport> = transport.clone();
    let llm = Llm::from_config(&config, shared).unwrap();
    let result = llm.operate("Hi", OperateOptions::new()).await.unwrap();

    assert_eq!(result.provider, ProviderType::OpenAI);
    assert_eq!(result.model, "gpt-4o-mini");
    // Two retries on the primary before falling back
    assert_eq!(transport.calls_to(ProviderType::Anthropic), 3);
}
