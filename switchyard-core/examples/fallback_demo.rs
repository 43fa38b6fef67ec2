//! Fallback Demo - Tool Loop, Structured Output and Provider Fallback
//!
//! Runs entirely offline: an in-memory transport plays the vendors.
//! - OpenAI is "down" (503) for the primary attempt
//! - Anthropic asks for a tool, then answers through `structured_output`
//!
//! Run with: RUST_LOG=switchyard_core=debug cargo run --example fallback_demo

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use switchyard_core::protocol::{ToolDefinition, STRUCTURED_OUTPUT_TOOL};
use switchyard_core::providers::ProviderResult;
use switchyard_core::{
    FallbackTarget, Llm, OperateOptions, ProviderClient, ProviderError, ProviderType, ToolSet,
    Transport, TransportRequest,
};
use tracing_subscriber::EnvFilter;

/// Replays canned vendor bodies in order
struct CannedTransport {
    replies: Mutex<VecDeque<ProviderResult<Value>>>,
}

#[async_trait]
impl Transport for CannedTransport {
    async fn send(&self, request: TransportRequest) -> ProviderResult<Value> {
        println!("  -> {} {}", request.provider, request.url);
        self.replies
            .lock()
            .map_err(|_| ProviderError::Other("transport poisoned".to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Other("no canned reply left".to_string())))
    }
}

fn canned_replies() -> VecDeque<ProviderResult<Value>> {
    VecDeque::from([
        Err(ProviderError::from_status(
            503,
            Some(r#"{"error": {"message": "The server is overloaded"}}"#),
        )),
        Ok(json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "role": "assistant",
            "content": [{"type": "tool_use", "id": "toolu_1", "name": "get_stock", "input": {"sku": "A-100"}}],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 120, "output_tokens": 30}
        })),
        Ok(json!({
            "id": "msg_2",
            "model": "claude-sonnet-4-20250514",
            "role": "assistant",
            "content": [{
                "type": "tool_use",
                "id": "toolu_2",
                "name": STRUCTURED_OUTPUT_TOOL,
                "input": {"sku": "A-100", "in_stock": 42, "reorder": false}
            }],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 180, "output_tokens": 25}
        })),
    ])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("\nSwitchyard Demo - Fallback & Structured Output\n");
    println!("==============================================\n");

    let transport: Arc<dyn Transport> = Arc::new(CannedTransport {
        replies: Mutex::new(canned_replies()),
    });

    let llm = Llm::builder()
        .provider(
            ProviderType::OpenAI,
            ProviderClient::new(transport.clone()).with_api_key("sk-demo-openai"),
        )
        .provider(
            ProviderType::Anthropic,
            ProviderClient::new(transport).with_api_key("sk-ant-demo"),
        )
        .default_provider(ProviderType::OpenAI)
        .fallback_target(FallbackTarget::provider(ProviderType::Anthropic))
        .max_turns(3)
        .build()?;

    let tools = ToolSet::new().with_tool(
        ToolDefinition::new(
            "get_stock",
            "Units in stock for a SKU",
            json!({
                "type": "object",
                "properties": {"sku": {"type": "string"}},
                "required": ["sku"]
            }),
        ),
        |args: Value| async move {
            println!("  [tool] get_stock({})", args["sku"]);
            Ok(json!({"sku": args["sku"], "units": 42}))
        },
    )?;

    println!("Request: stock report for {{{{sku}}}}");
    println!("-------------------------------------");
    let result = llm
        .operate(
            "Give me a stock report for {{sku}}",
            OperateOptions::new()
                .data("sku", "A-100")
                .tools(tools)
                .format(json!({"sku": "string", "in_stock": "integer", "reorder": "boolean"})),
        )
        .await?;

    println!();
    println!("Answered by:  {} ({})", result.provider, result.model);
    println!("Attempts:     {} (fallback used: {})", result.fallback_attempts, result.fallback_used);
    println!("Status:       {:?}", result.status);
    println!("Content:      {}", serde_json::to_string_pretty(&result.content)?);

    println!("\nUsage");
    println!("-----");
    for item in &result.usage {
        println!(
            "  {:<10} {:<28} in={:<5} out={:<5} total={}",
            item.provider.to_string(),
            item.model,
            item.input,
            item.output,
            item.total
        );
    }
    let (input, output, _, total) = result.total_usage();
    println!("  {:<39} in={:<5} out={:<5} total={}", "all attempts", input, output, total);

    Ok(())
}
