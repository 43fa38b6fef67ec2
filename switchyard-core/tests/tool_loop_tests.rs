//! Multi-turn tool execution through the public `operate` API

mod common;

use common::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use switchyard_core::protocol::{ToolCallStatus, ToolDefinition, STRUCTURED_OUTPUT_TOOL};
use switchyard_core::{
    HistoryItem, Hooks, OperateError, OperateOptions, OperateStatus, ProviderType, ToolSet,
};

fn weather_tools(calls: Arc<AtomicUsize>) -> ToolSet {
    ToolSet::new()
        .with_tool(
            ToolDefinition::new(
                "get_weather",
                "Current weather for a city",
                json!({
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                    "required": ["city"]
                }),
            ),
            move |args: Value| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let city = args["city"].as_str().unwrap_or("nowhere").to_string();
                    Ok(json!({"city": city, "forecast": "sunny"}))
                }
            },
        )
        .unwrap()
}

#[tokio::test]
async fn test_openai_tool_round_trip() {
    let transport = ScriptedTransport::new();
    transport.reply(
        ProviderType::OpenAI,
        openai_call("call_1", "get_weather", json!({"city": "Paris"})),
    );
    transport.reply(ProviderType::OpenAI, openai_text("It is sunny in Paris."));

    let executed = Arc::new(AtomicUsize::new(0));
    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .build()
        .unwrap();

    let result = llm
        .operate(
            "Weather in Paris?",
            OperateOptions::new().tools(weather_tools(executed.clone())),
        )
        .await
        .unwrap();

    assert_eq!(result.status, OperateStatus::Completed);
    assert_eq!(result.text(), Some("It is sunny in Paris."));
    assert_eq!(executed.load(Ordering::SeqCst), 1);
    assert_eq!(result.responses.len(), 2);
    assert_eq!(result.usage.len(), 1);
    assert_eq!(result.usage[0].total, 28 + 16);

    assert_eq!(
        result.history,
        vec![
            HistoryItem::user("Weather in Paris?"),
            HistoryItem::FunctionCall {
                name: "get_weather".to_string(),
                arguments: json!({"city": "Paris"}).to_string(),
                call_id: "call_1".to_string(),
            },
            HistoryItem::FunctionCallOutput {
                call_id: "call_1".to_string(),
                output: json!({"city": "Paris", "forecast": "sunny"}).to_string(),
                status: ToolCallStatus::Completed,
            },
            HistoryItem::assistant("It is sunny in Paris."),
        ]
    );

    // The echoed call drops the response-only status; the result follows it
    let second = &transport.requests()[1].body;
    let input = second["input"].as_array().unwrap();
    assert_eq!(input.len(), 3);
    assert_eq!(input[1]["type"], "function_call");
    assert_eq!(input[1]["call_id"], "call_1");
    assert!(input[1].get("status").is_none());
    assert_eq!(input[2]["type"], "function_call_output");
    assert_eq!(input[2]["call_id"], "call_1");
}

#[tokio::test]
async fn test_anthropic_batches_tool_results() {
    let transport = ScriptedTransport::new();
    transport.reply(
        ProviderType::Anthropic,
        json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Checking both."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Oslo"}},
                {"type": "tool_use", "id": "toolu_2", "name": "get_weather", "input": {"city": "Rome"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 50, "output_tokens": 20}
        }),
    );
    transport.reply(ProviderType::Anthropic, anthropic_text("Oslo and Rome are sunny."));

    let executed = Arc::new(AtomicUsize::new(0));
    let llm = builder(&transport)
        .default_provider(ProviderType::Anthropic)
        .build()
        .unwrap();

    let result = llm
        .operate(
            "Oslo vs Rome?",
            OperateOptions::new().tools(weather_tools(executed.clone())),
        )
        .await
        .unwrap();

    assert_eq!(result.text(), Some("Oslo and Rome are sunny."));
    assert_eq!(executed.load(Ordering::SeqCst), 2);

    let messages = transport.requests()[1].body["messages"].as_array().unwrap().clone();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"].as_array().unwrap().len(), 3);
    assert_eq!(messages[2]["role"], "user");
    let results = messages[2]["content"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["type"], "tool_result");
    assert_eq!(results[0]["tool_use_id"], "toolu_1");
    assert_eq!(results[1]["tool_use_id"], "toolu_2");
}

#[tokio::test]
async fn test_turn_budget_exhaustion_is_incomplete() {
    let transport = ScriptedTransport::new();
    for i in 0..5 {
        transport.reply(
            ProviderType::OpenAI,
            openai_call(&format!("call_{}", i), "get_weather", json!({"city": "Lima"})),
        );
    }

    let executed = Arc::new(AtomicUsize::new(0));
    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .build()
        .unwrap();

    let result = llm
        .operate(
            "Loop forever",
            OperateOptions::new()
                .tools(weather_tools(executed.clone()))
                .max_turns(2),
        )
        .await
        .unwrap();

    assert_eq!(result.status, OperateStatus::Incomplete);
    assert!(result.detail.as_deref().unwrap().contains("max_turns (2)"));
    assert_eq!(result.content, None);
    // Never more than max_turns + 1 vendor calls
    assert_eq!(transport.requests().len(), 3);
    assert_eq!(executed.load(Ordering::SeqCst), 3);
    assert!(!result.fallback_used);
}

#[tokio::test]
async fn test_default_budget_allows_one_tool_round() {
    let transport = ScriptedTransport::new();
    transport.reply(ProviderType::Gemini, gemini_call("get_weather", json!({"city": "Kyiv"})));
    transport.reply(ProviderType::Gemini, gemini_call("get_weather", json!({"city": "Kyiv"})));
    transport.reply(ProviderType::Gemini, gemini_text("unreached"));

    let llm = builder(&transport)
        .default_provider(ProviderType::Gemini)
        .build()
        .unwrap();

    let result = llm
        .operate(
            "Weather?",
            OperateOptions::new().tools(weather_tools(Arc::new(AtomicUsize::new(0)))),
        )
        .await
        .unwrap();

    assert_eq!(result.status, OperateStatus::Incomplete);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn test_tool_failure_aborts_with_hooks() {
    let transport = ScriptedTransport::new();
    transport.reply(ProviderType::OpenAI, openai_call("call_1", "divide", json!({"by": 0})));

    let tools = ToolSet::new()
        .with_tool(
            ToolDefinition::new("divide", "Divide ten", json!({"type": "object"})),
            |_| async { Err::<Value, _>(anyhow::anyhow!("division by zero")) },
        )
        .unwrap();

    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let hooks = {
        let (before, after, errors) = (before.clone(), after.clone(), errors.clone());
        Hooks::new()
            .before_each_tool(move |_| {
                before.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .after_each_tool(move |_, _| {
                after.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_tool_error(move |call, _| {
                assert_eq!(call.name, "divide");
                errors.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
    };

    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .build()
        .unwrap();

    let error = llm
        .operate("10 / 0", OperateOptions::new().tools(tools).hooks(hooks))
        .await
        .unwrap_err();

    match error {
        OperateError::ToolExecution { name, source } => {
            assert_eq!(name, "divide");
            assert_eq!(source.to_string(), "division by zero");
        }
        other => panic!("expected tool error, got {other}"),
    }
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 0);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_failing_hook_does_not_change_outcome() {
    let transport = ScriptedTransport::new();
    transport.reply(
        ProviderType::OpenAI,
        openai_call("call_1", "get_weather", json!({"city": "Cairo"})),
    );
    transport.reply(ProviderType::OpenAI, openai_text("Hot."));

    let llm = builder(&transport)
        .default_provider(ProviderType::OpenAI)
        .build()
        .unwrap();

    let hooks = Hooks::new()
        .before_each_tool(|_| Err(anyhow::anyhow!("audit log unavailable")))
        .after_each_tool(|_, _| Err(anyhow::anyhow!("audit log unavailable")));
    let result = llm
        .operate(
            "Cairo?",
            OperateOptions::new()
                .tools(weather_tools(Arc::new(AtomicUsize::new(0))))
                .hooks(hooks),
        )
        .await
        .unwrap();

    assert_eq!(result.text(), Some("Hot."));
}

#[tokio::test]
async fn test_history_and_instructions_reach_vendor() {
    let transport = ScriptedTransport::new();
    transport.reply(ProviderType::OpenRouter, openrouter_text("Bonjour"));

    let llm = builder(&transport)
        .default_provider(ProviderType::OpenRouter)
        .system("You are a translator.")
        .build()
        .unwrap();

    let result = llm
        .operate(
            "Translate {{word}}",
            OperateOptions::new()
                .history(vec![HistoryItem::user("Hi"), HistoryItem::assistant("Hello")])
                .instructions("Answer in French")
                .data("word", "hello")
                .provider_option("temperature", 0.2),
        )
        .await
        .unwrap();

    let body = &transport.requests()[0].body;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[0]["content"], "You are a translator.");
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[3]["content"], "Translate hello\n\nAnswer in French");
    assert_eq!(body["temperature"], 0.2);

    assert_eq!(result.history.len(), 4);
    assert_eq!(result.history[2], HistoryItem::user("Translate hello"));
}

#[tokio::test]
async fn test_early_structured_output_is_acknowledged_and_loop_continues() {
    let transport = ScriptedTransport::new();
    transport.reply(
        ProviderType::Anthropic,
        json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "role": "assistant",
            "content": [
                {"type": "tool_use", "id": "toolu_1", "name": STRUCTURED_OUTPUT_TOOL,
                 "input": {"city": "Oslo", "forecast": "unknown"}},
                {"type": "tool_use", "id": "toolu_2", "name": "get_weather", "input": {"city": "Oslo"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 30, "output_tokens": 12}
        }),
    );
    transport.reply(
        ProviderType::Anthropic,
        anthropic_call(
            "toolu_3",
            STRUCTURED_OUTPUT_TOOL,
            json!({"city": "Oslo", "forecast": "sunny"}),
        ),
    );

    let executed = Arc::new(AtomicUsize::new(0));
    let before = Arc::new(AtomicUsize::new(0));
    let hooks = {
        let before = before.clone();
        Hooks::new().before_each_tool(move |_| {
            before.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    let llm = builder(&transport)
        .default_provider(ProviderType::Anthropic)
        .build()
        .unwrap();

    let result = llm
        .operate(
            "Oslo forecast",
            OperateOptions::new()
                .tools(weather_tools(executed.clone()))
                .hooks(hooks)
                .format(json!({"city": "string", "forecast": "string"})),
        )
        .await
        .unwrap();

    assert_eq!(result.status, OperateStatus::Completed);
    assert_eq!(result.json(), Some(&json!({"city": "Oslo", "forecast": "sunny"})));
    assert_eq!(transport.requests().len(), 2);
    // Only the real tool runs through the toolkit and hooks
    assert_eq!(executed.load(Ordering::SeqCst), 1);
    assert_eq!(before.load(Ordering::SeqCst), 1);

    let messages = transport.requests()[1].body["messages"].as_array().unwrap().clone();
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"].as_array().unwrap().len(), 2);
    let results = messages[2]["content"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["tool_use_id"], "toolu_1");
    assert!(results[0]["content"]
        .as_str()
        .unwrap()
        .contains("must be the last tool call"));
    assert_eq!(results[1]["tool_use_id"], "toolu_2");
    assert!(results[1]["content"].as_str().unwrap().contains("sunny"));

    assert!(result.history.iter().any(|item| matches!(
        item,
        HistoryItem::FunctionCallOutput { call_id, output, .. }
            if call_id == "toolu_1" && output.contains("must be the last tool call")
    )));
}

#[tokio::test]
async fn test_repeated_identical_gemini_calls_keep_turns_paired() {
    let transport = ScriptedTransport::new();
    transport.reply(ProviderType::Gemini, gemini_call("get_weather", json!({"city": "Kyiv"})));
    transport.reply(ProviderType::Gemini, gemini_call("get_weather", json!({"city": "Kyiv"})));
    transport.reply(ProviderType::Gemini, gemini_text("Still sunny in Kyiv."));

    let executed = Arc::new(AtomicUsize::new(0));
    let llm = builder(&transport)
        .default_provider(ProviderType::Gemini)
        .build()
        .unwrap();

    let result = llm
        .operate(
            "Weather in Kyiv?",
            OperateOptions::new()
                .tools(weather_tools(executed.clone()))
                .max_turns(5),
        )
        .await
        .unwrap();

    assert_eq!(result.status, OperateStatus::Completed);
    assert_eq!(result.text(), Some("Still sunny in Kyiv."));
    assert_eq!(executed.load(Ordering::SeqCst), 2);

    let third = &transport.requests()[2].body;
    let turns: Vec<(String, usize)> = third["contents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| {
            (
                c["role"].as_str().unwrap().to_string(),
                c["parts"].as_array().unwrap().len(),
            )
        })
        .collect();
    assert_eq!(
        turns,
        vec![
            ("user".to_string(), 1),
            ("model".to_string(), 1),
            ("user".to_string(), 1),
            ("model".to_string(), 1),
            ("user".to_string(), 1),
        ]
    );

    let call_ids: Vec<&str> = result
        .history
        .iter()
        .filter_map(|item| match item {
            HistoryItem::FunctionCall { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(call_ids.len(), 2);
    assert_ne!(call_ids[0], call_ids[1]);
}
