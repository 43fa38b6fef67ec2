//! The tool-call turn loop
//!
//! Drives one provider attempt: send the request, execute the tool calls the
//! model asked for, feed the results back, and repeat until the model stops
//! calling tools, calls `structured_output`, or the turn budget runs out.
//!
//! ```text
//! Start -> RequestSent -> Complete
//!                      -> ToolPending -> ExecuteTool -> RequestSent -> ...
//!                                                   -> MaxTurnsExceeded
//! ```

use crate::error::OperateError;
use crate::operate::usage::UsageAccumulator;
use crate::protocol::{
    HistoryItem, OperateRequest, OperateStatus, ToolCall, ToolCallStatus, ToolResult, UsageItem,
};
use crate::providers::retry::{RetryExecutor, RetryPolicy};
use crate::providers::transport::ProviderClient;
use crate::providers::{ProviderAdapter, ProviderError};
use crate::tools::{Hooks, Toolkit};
use anyhow::anyhow;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turn budget used when the caller sets none
pub const DEFAULT_MAX_TURNS: u32 = 1;

/// Output recorded for a `structured_output` call that was not the final call
const STRUCTURED_OUTPUT_ACK: &str = "structured_output must be the last tool call; continue.";

/// Everything a loop needs besides the adapter and its client
#[derive(Clone)]
pub struct LoopContext {
    pub toolkit: Option<Arc<dyn Toolkit>>,
    pub hooks: Hooks,
    /// Tool-execution rounds allowed before the loop stops as incomplete
    pub max_turns: u32,
    pub retry: RetryPolicy,
}

impl Default for LoopContext {
    fn default() -> Self {
        Self {
            toolkit: None,
            hooks: Hooks::default(),
            max_turns: DEFAULT_MAX_TURNS,
            retry: RetryPolicy::no_retry(),
        }
    }
}

impl std::fmt::Debug for LoopContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopContext")
            .field("toolkit", &self.toolkit.is_some())
            .field("hooks", &self.hooks)
            .field("max_turns", &self.max_turns)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Result of one completed or budget-exhausted loop
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub status: OperateStatus,
    pub detail: Option<String>,
    /// Text of the final response
    pub text: Option<String>,
    /// Arguments of the terminating `structured_output` call
    pub structured: Option<Map<String, Value>>,
    /// History items produced during the loop
    pub output: Vec<HistoryItem>,
    /// Raw vendor responses, one per vendor call
    pub responses: Vec<Value>,
    pub usage: UsageAccumulator,
    /// Tool-execution rounds completed
    pub turns: u32,
}

/// A failed attempt, with the usage it incurred before failing
#[derive(Debug)]
pub struct AttemptError {
    pub error: OperateError,
    pub usage: UsageItem,
}

impl AttemptError {
    pub fn new(error: impl Into<OperateError>, usage: UsageItem) -> Self {
        Self {
            error: error.into(),
            usage,
        }
    }
}

/// Loop over one adapter
pub struct ToolExecutionLoop<'a, A: ProviderAdapter> {
    adapter: &'a A,
    client: &'a ProviderClient,
    context: &'a LoopContext,
}

impl<'a, A: ProviderAdapter> ToolExecutionLoop<'a, A> {
    pub fn new(adapter: &'a A, client: &'a ProviderClient, context: &'a LoopContext) -> Self {
        Self {
            adapter,
            client,
            context,
        }
    }

    /// Run the loop to completion or until the turn budget is spent
    pub async fn run(&self, request: OperateRequest) -> Result<LoopOutcome, AttemptError> {
        let provider = self.adapter.provider_type();
        let model = request.model.clone();
        let retry = RetryExecutor::new(self.context.retry.clone());

        let mut usage = UsageAccumulator::new(provider, model.as_str());
        let mut vendor_request = self.adapter.build_request(&request);
        let mut output = Vec::new();
        let mut responses = Vec::new();
        let mut turns = 0u32;

        loop {
            let attempt = {
                let adapter = self.adapter;
                let client = self.client;
                let model = model.as_str();
                let body = &vendor_request;
                retry
                    .execute(
                        |error| adapter.classify_error(error),
                        move || adapter.execute_request(client, model, body),
                    )
                    .await
            };

            let response = match attempt.result {
                Ok(response) => response,
                Err(error) => {
                    let classified = self.adapter.classify_error(&error);
                    warn!(
                        %provider,
                        %model,
                        turn = turns,
                        category = ?classified.category,
                        error = %error,
                        "vendor call failed"
                    );
                    return Err(AttemptError::new(error, usage.total()));
                }
            };

            usage.record(self.adapter.extract_usage(&response, &model));
            match serde_json::to_value(&response) {
                Ok(raw) => responses.push(raw),
                Err(error) => {
                    warn!(%provider, %model, turn = turns, %error, "vendor response could not be recorded");
                    return Err(AttemptError::new(ProviderError::from(error), usage.total()));
                }
            }
            let parsed = self.adapter.parse_response(&response);
            output.extend(self.adapter.response_to_history_items(&response));
            debug!(
                %provider,
                turn = turns,
                stop_reason = ?parsed.stop_reason,
                has_tool_calls = parsed.has_tool_calls,
                "vendor response"
            );

            if self.adapter.has_structured_output(&response) {
                let Some(arguments) = self.adapter.extract_structured_output(&response) else {
                    let error = OperateError::SchemaValidation {
                        errors: vec!["structured_output arguments are not a JSON object".to_string()],
                    };
                    return Err(AttemptError::new(error, usage.total()));
                };
                info!(%provider, %model, turns, "structured output received");
                return Ok(LoopOutcome {
                    status: OperateStatus::Completed,
                    detail: None,
                    text: parsed.content,
                    structured: Some(arguments),
                    output,
                    responses,
                    usage,
                    turns,
                });
            }

            if self.adapter.is_complete(&response) {
                info!(%provider, %model, turns, "operate completed");
                return Ok(LoopOutcome {
                    status: OperateStatus::Completed,
                    detail: None,
                    text: parsed.content,
                    structured: None,
                    output,
                    responses,
                    usage,
                    turns,
                });
            }

            for call in self.adapter.extract_tool_calls(&response) {
                let result = match self.execute_tool(&call).await {
                    Ok(result) => result,
                    Err(error) => return Err(AttemptError::new(error, usage.total())),
                };

                output.push(HistoryItem::FunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    call_id: call.call_id.clone(),
                });
                output.push(HistoryItem::FunctionCallOutput {
                    call_id: call.call_id.clone(),
                    output: result.output.clone(),
                    status: ToolCallStatus::Completed,
                });
                vendor_request = self.adapter.append_tool_result(vendor_request, &call, &result);
            }

            turns += 1;
            if turns > self.context.max_turns {
                let detail = format!(
                    "Stopped after {} tool turn(s): max_turns ({}) exceeded before the model finished",
                    turns, self.context.max_turns
                );
                warn!(%provider, %model, turns, "turn budget exhausted");
                return Ok(LoopOutcome {
                    status: OperateStatus::Incomplete,
                    detail: Some(detail),
                    text: parsed.content,
                    structured: None,
                    output,
                    responses,
                    usage,
                    turns,
                });
            }
        }
    }

    async fn execute_tool(&self, call: &ToolCall) -> Result<ToolResult, OperateError> {
        if call.is_structured_output() {
            return Ok(ToolResult {
                call_id: call.call_id.clone(),
                output: STRUCTURED_OUTPUT_ACK.to_string(),
                success: true,
            });
        }

        let hooks = &self.context.hooks;
        hooks.run_before(call);

        let outcome = match &self.context.toolkit {
            Some(toolkit) => toolkit.call(&call.name, &call.arguments).await,
            None => Err(anyhow!("no toolkit configured for tool call '{}'", call.name)),
        };

        match outcome {
            Ok(value) => {
                hooks.run_after(call, &value);
                debug!(tool = %call.name, call_id = %call.call_id, "tool executed");
                Ok(ToolResult::success(call.call_id.clone(), &value))
            }
            Err(source) => {
                hooks.run_on_error(call, &source);
                warn!(tool = %call.name, call_id = %call.call_id, error = %source, "tool execution failed");
                Err(OperateError::ToolExecution {
                    name: call.name.clone(),
                    source,
                })
            }
        }
    }
}
