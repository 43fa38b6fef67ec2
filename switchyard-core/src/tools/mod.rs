//! Toolkit abstraction and tool lifecycle hooks
//!
//! The engine only sees the [`Toolkit`] trait. [`ToolSet`] is a small
//! closure-backed implementation for applications without their own registry.

use crate::error::OperateError;
use crate::protocol::{ToolCall, ToolDefinition, STRUCTURED_OUTPUT_TOOL};
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::warn;

/// Registry of callable tools
#[async_trait]
pub trait Toolkit: Send + Sync {
    /// Definitions offered to the model
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Execute a tool by name with serialized JSON arguments
    async fn call(&self, name: &str, arguments: &str) -> anyhow::Result<Value>;
}

/// Reject reserved and duplicate tool names
pub fn validate_tool_definitions(tools: &[ToolDefinition]) -> Result<(), OperateError> {
    let mut seen = HashSet::new();
    for tool in tools {
        if tool.name == STRUCTURED_OUTPUT_TOOL {
            return Err(OperateError::ReservedToolName(tool.name.clone()));
        }
        if !seen.insert(tool.name.as_str()) {
            return Err(OperateError::DuplicateToolName(tool.name.clone()));
        }
    }
    Ok(())
}

type ToolFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;
type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

struct RegisteredTool {
    definition: ToolDefinition,
    handler: ToolHandler,
}

/// Closure-backed [`Toolkit`]
#[derive(Default)]
pub struct ToolSet {
    tools: Vec<RegisteredTool>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Handlers receive the parsed JSON arguments.
    pub fn register<F, Fut>(
        &mut self,
        definition: ToolDefinition,
        handler: F,
    ) -> Result<&mut Self, OperateError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        if definition.name == STRUCTURED_OUTPUT_TOOL {
            return Err(OperateError::ReservedToolName(definition.name));
        }
        if self.tools.iter().any(|t| t.definition.name == definition.name) {
            return Err(OperateError::DuplicateToolName(definition.name));
        }

        self.tools.push(RegisteredTool {
            definition,
            handler: Arc::new(move |args| -> ToolFuture { Box::pin(handler(args)) }),
        });
        Ok(self)
    }

    /// Builder-style [`ToolSet::register`]
    pub fn with_tool<F, Fut>(mut self, definition: ToolDefinition, handler: F) -> Result<Self, OperateError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(definition, handler)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl Toolkit for ToolSet {
    fn tools(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    async fn call(&self, name: &str, arguments: &str) -> anyhow::Result<Value> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.definition.name == name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", name))?;

        let args: Value = if arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(arguments)?
        };
        (tool.handler)(args).await
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tools.iter().map(|t| t.definition.name.as_str()).collect();
        f.debug_struct("ToolSet").field("tools", &names).finish()
    }
}

pub type BeforeToolHook = Arc<dyn Fn(&ToolCall) -> anyhow::Result<()> + Send + Sync>;
pub type AfterToolHook = Arc<dyn Fn(&ToolCall, &Value) -> anyhow::Result<()> + Send + Sync>;
pub type ToolErrorHook = Arc<dyn Fn(&ToolCall, &anyhow::Error) -> anyhow::Result<()> + Send + Sync>;

/// Tool lifecycle callbacks
///
/// Hook failures are logged and ignored; they never change the loop's outcome.
#[derive(Clone, Default)]
pub struct Hooks {
    pub before_each_tool: Option<BeforeToolHook>,
    pub after_each_tool: Option<AfterToolHook>,
    pub on_tool_error: Option<ToolErrorHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_each_tool<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ToolCall) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.before_each_tool = Some(Arc::new(hook));
        self
    }

    pub fn after_each_tool<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ToolCall, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.after_each_tool = Some(Arc::new(hook));
        self
    }

    pub fn on_tool_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ToolCall, &anyhow::Error) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_tool_error = Some(Arc::new(hook));
        self
    }

    pub(crate) fn run_before(&self, call: &ToolCall) {
        if let Some(hook) = &self.before_each_tool {
            if let Err(e) = hook(call) {
                warn!(tool = %call.name, error = %e, "before_each_tool hook failed");
            }
        }
    }

    pub(crate) fn run_after(&self, call: &ToolCall, result: &Value) {
        if let Some(hook) = &self.after_each_tool {
            if let Err(e) = hook(call, result) {
                warn!(tool = %call.name, error = %e, "after_each_tool hook failed");
            }
        }
    }

    pub(crate) fn run_on_error(&self, call: &ToolCall, error: &anyhow::Error) {
        if let Some(hook) = &self.on_tool_error {
            if let Err(e) = hook(call, error) {
                warn!(tool = %call.name, error = %e, "on_tool_error hook failed");
            }
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_each_tool", &self.before_each_tool.is_some())
            .field("after_each_tool", &self.after_each_tool.is_some())
            .field("on_tool_error", &self.on_tool_error.is_some())
            .finish()
    }
}
