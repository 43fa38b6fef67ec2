//! Fallback chain behavior
//!
//! Each test scripts vendor replies per provider and checks which candidates
//! were tried, in what order, and what the caller sees.

mod common;

use common::*;
use serde_json::json;
use switchyard_core::protocol::ToolDefinition;
use switchyard_core::{
    Fallback, FallbackTarget, OperateError, OperateOptions, ProviderError, ProviderType, ToolSet,
};

fn chain() -> Vec<FallbackTarget> {
    vec![
        FallbackTarget::provider(ProviderType::Anthropic),
        FallbackTarget::new(ProviderType::Gemini, "gemini-2.5-pro"),
    ]
}

#[tokio::test]
async fn test_primary_success_no_fallback() {
    let transport = ScriptedTransport::new();
    transport.reply(ProviderType::OpenAI, openai_text("Hello!"));

    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .fallback(chain())
        .build()
        .unwrap();

    let result = llm.operate("Hi", OperateOptions::new()).await.unwrap();

    assert_eq!(result.text(), Some("Hello!"));
    assert_eq!(result.provider, ProviderType::OpenAI);
    assert_eq!(result.model, "gpt-4o");
    assert!(!result.fallback_used);
    assert_eq!(result.fallback_attempts, 1);
    assert_eq!(transport.calls_to(ProviderType::Anthropic), 0);
}

#[tokio::test]
async fn test_fallback_on_server_error() {
    let transport = ScriptedTransport::new();
    transport.fail(ProviderType::OpenAI, http_error(503));
    transport.reply(ProviderType::Anthropic, anthropic_text("From Claude"));

    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .fallback(chain())
        .build()
        .unwrap();

    let result = llm.operate("Hi", OperateOptions::new()).await.unwrap();

    assert_eq!(result.text(), Some("From Claude"));
    assert_eq!(result.provider, ProviderType::Anthropic);
    assert_eq!(result.model, "claude-sonnet-4-20250514");
    assert!(result.fallback_used);
    assert_eq!(result.fallback_attempts, 2);
    // Default policy: a failing turn is never retried
    assert_eq!(transport.calls_to(ProviderType::OpenAI), 1);

    // The failed primary still gets a (zero) usage entry
    assert_eq!(result.usage.len(), result.fallback_attempts as usize);
    assert_eq!(result.usage[0].provider, ProviderType::OpenAI);
    assert_eq!(result.usage[0].model, "gpt-4o");
    assert!(result.usage[0].is_empty());
    assert_eq!(result.usage[1].provider, ProviderType::Anthropic);
}

#[tokio::test]
async fn test_third_candidate_succeeds() {
    let transport = ScriptedTransport::new();
    transport.fail(ProviderType::OpenAI, http_error(429));
    transport.fail(ProviderType::Anthropic, ProviderError::Timeout("deadline".to_string()));
    transport.reply(ProviderType::Gemini, gemini_text("From Gemini"));

    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .fallback(chain())
        .build()
        .unwrap();

    let result = llm.operate("Hi", OperateOptions::new()).await.unwrap();

    assert_eq!(result.provider, ProviderType::Gemini);
    assert_eq!(result.model, "gemini-2.5-pro");
    assert_eq!(result.fallback_attempts, 3);
    assert_eq!(result.usage.len(), 3);
    assert_eq!(
        result.usage.iter().map(|u| u.provider).collect::<Vec<_>>(),
        vec![ProviderType::OpenAI, ProviderType::Anthropic, ProviderType::Gemini]
    );

    let providers: Vec<ProviderType> = transport.requests().iter().map(|r| r.provider).collect();
    assert_eq!(
        providers,
        vec![ProviderType::OpenAI, ProviderType::Anthropic, ProviderType::Gemini]
    );
}

#[tokio::test]
async fn test_exhausted_chain_surfaces_last_error() {
    let transport = ScriptedTransport::new();
    transport.fail(ProviderType::OpenAI, http_error(500));
    transport.fail(ProviderType::Anthropic, http_error(401));
    transport.fail(ProviderType::Gemini, http_error(404));

    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .fallback(chain())
        .build()
        .unwrap();

    let error = llm.operate("Hi", OperateOptions::new()).await.unwrap_err();

    assert_eq!(error.provider_error().and_then(ProviderError::status), Some(404));
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn test_disabled_fallback_makes_one_attempt() {
    let transport = ScriptedTransport::new();
    transport.fail(ProviderType::OpenAI, http_error(503));
    transport.reply(ProviderType::Anthropic, anthropic_text("unused"));

    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .fallback(chain())
        .build()
        .unwrap();

    let error = llm
        .operate("Hi", OperateOptions::new().no_fallback())
        .await
        .unwrap_err();

    assert_eq!(error.provider_error().and_then(ProviderError::status), Some(503));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_per_call_chain_replaces_configured_chain() {
    let transport = ScriptedTransport::new();
    transport.fail(ProviderType::Anthropic, http_error(529));
    transport.reply(ProviderType::OpenRouter, openrouter_text("routed"));

    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .fallback(chain())
        .build()
        .unwrap();

    let options = OperateOptions::new()
        .model("claude-3-5-haiku-latest")
        .fallback(Fallback::Chain(vec![FallbackTarget::new(
            ProviderType::OpenRouter,
            "meta-llama/llama-3.1-8b-instruct",
        )]));
    let result = llm.operate("Hi", options).await.unwrap();

    assert_eq!(result.provider, ProviderType::OpenRouter);
    assert_eq!(result.model, "meta-llama/llama-3.1-8b-instruct");
    assert_eq!(result.fallback_attempts, 2);
    assert_eq!(transport.calls_to(ProviderType::Gemini), 0);
}

#[tokio::test]
async fn test_failed_attempt_usage_is_reported() {
    let transport = ScriptedTransport::new();
    // OpenAI asks for a tool that then fails; Anthropic answers directly
    transport.reply(
        ProviderType::OpenAI,
        openai_call("call_1", "explode", json!({})),
    );
    transport.reply(ProviderType::Anthropic, anthropic_text("recovered"));

    let tools = ToolSet::new()
        .with_tool(
            ToolDefinition::new("explode", "Always fails", json!({"type": "object"})),
            |_| async { Err::<serde_json::Value, _>(anyhow::anyhow!("kaboom")) },
        )
        .unwrap();

    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .fallback(vec![FallbackTarget::provider(ProviderType::Anthropic)])
        .build()
        .unwrap();

    let result = llm.operate("Hi", OperateOptions::new().tools(tools)).await.unwrap();

    assert_eq!(result.usage.len(), 2);
    assert_eq!(result.usage[0].provider, ProviderType::OpenAI);
    assert_eq!(result.usage[0].total, 28);
    assert_eq!(result.usage[1].provider, ProviderType::Anthropic);
    assert_eq!(result.usage[1].total, 40);
    assert_eq!(result.total_usage().3, 68);
}

#[tokio::test]
async fn test_fallback_restarts_from_caller_history() {
    let transport = ScriptedTransport::new();
    transport.reply(ProviderType::OpenAI, openai_call("call_1", "explode", json!({})));
    transport.reply(ProviderType::Anthropic, anthropic_text("done"));

    let tools = ToolSet::new()
        .with_tool(
            ToolDefinition::new("explode", "Always fails", json!({"type": "object"})),
            |_| async { Err::<serde_json::Value, _>(anyhow::anyhow!("kaboom")) },
        )
        .unwrap();

    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .fallback(vec![FallbackTarget::provider(ProviderType::Anthropic)])
        .build()
        .unwrap();

    let result = llm.operate("Hi", OperateOptions::new().tools(tools)).await.unwrap();

    // Nothing from the failed OpenAI attempt leaks into the Anthropic request
    let anthropic = &transport.requests()[1];
    assert_eq!(anthropic.body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(result.history.len(), 2);
}

#[tokio::test]
async fn test_unknown_model_without_default_provider() {
    let transport = ScriptedTransport::new();
    let llm = builder(&transport).build().unwrap();

    let error = llm
        .operate("Hi", OperateOptions::new().model("mystery-model"))
        .await
        .unwrap_err();

    assert!(matches!(error, OperateError::UnknownModel(model) if model == "mystery-model"));
    assert!(transport.requests().is_empty());
}
