//! Shared helpers for integration tests: a scripted in-memory transport and
//! canned vendor responses.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use switchyard_core::providers::ProviderResult;
use switchyard_core::{
    Llm, LlmBuilder, ProviderClient, ProviderError, ProviderType, Transport, TransportRequest,
};

/// Replays queued responses per provider and records every request it sees
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<ProviderType, VecDeque<ProviderResult<Value>>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the next reply for `provider`
    pub fn push(&self, provider: ProviderType, reply: ProviderResult<Value>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(provider)
            .or_default()
            .push_back(reply);
    }

    pub fn reply(&self, provider: ProviderType, body: Value) {
        self.push(provider, Ok(body));
    }

    pub fn fail(&self, provider: ProviderType, error: ProviderError) {
        self.push(provider, Err(error));
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls_to(&self, provider: ProviderType) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.provider == provider)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> ProviderResult<Value> {
        let provider = request.provider;
        self.requests.lock().unwrap().push(request);
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&provider)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ProviderError::Other(format!("no scripted reply for {}", provider))))
    }
}

/// Builder with every built-in provider registered against `transport`
pub fn builder(transport: &Arc<ScriptedTransport>) -> LlmBuilder {
    let shared: Arc<dyn Transport> = transport.clone();
    ProviderType::ALL.into_iter().fold(Llm::builder(), |builder, provider| {
        builder.provider(
            provider,
            ProviderClient::new(shared.clone()).with_api_key(format!("test-key-{}", provider)),
        )
    })
}

pub fn http_error(status: u16) -> ProviderError {
    ProviderError::from_status(status, Some(r#"{"error": {"message": "scripted failure"}}"#))
}

// OpenAI Responses API

pub fn openai_text(text: &str) -> Value {
    json!({
        "id": "resp_1",
        "model": "gpt-4o",
        "status": "completed",
        "output": [{
            "type": "message",
            "id": "msg_1",
            "role": "assistant",
            "status": "completed",
            "content": [{"type": "output_text", "text": text}]
        }],
        "usage": {"input_tokens": 12, "output_tokens": 4, "total_tokens": 16}
    })
}

pub fn openai_call(call_id: &str, name: &str, arguments: Value) -> Value {
    json!({
        "id": "resp_2",
        "model": "gpt-4o",
        "status": "completed",
        "output": [{
            "type": "function_call",
            "id": format!("fc_{}", call_id),
            "call_id": call_id,
            "name": name,
            "arguments": arguments.to_string(),
            "status": "completed"
        }],
        "usage": {"input_tokens": 20, "output_tokens": 8, "total_tokens": 28}
    })
}

// Anthropic Messages API

pub fn anthropic_text(text: &str) -> Value {
    json!({
        "id": "msg_1",
        "model": "claude-sonnet-4-20250514",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 30, "output_tokens": 10}
    })
}

pub fn anthropic_call(id: &str, name: &str, input: Value) -> Value {
    json!({
        "id": "msg_2",
        "model": "claude-sonnet-4-20250514",
        "role": "assistant",
        "content": [{"type": "tool_use", "id": id, "name": name, "input": input}],
        "stop_reason": "tool_use",
        "usage": {"input_tokens": 40, "output_tokens": 15}
    })
}

// Gemini generateContent

pub fn gemini_text(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 3, "totalTokenCount": 11},
        "responseId": "gem_1"
    })
}

pub fn gemini_call(name: &str, args: Value) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"functionCall": {"name": name, "args": args}}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 5, "totalTokenCount": 14},
        "responseId": "gem_2"
    })
}

// OpenRouter chat completions

pub fn openrouter_text(text: &str) -> Value {
    json!({
        "id": "gen_1",
        "model": "openai/gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 7, "completion_tokens": 2, "total_tokens": 9}
    })
}
