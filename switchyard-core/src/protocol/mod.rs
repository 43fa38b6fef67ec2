//! Protocol module for operate request/response structures
//!
//! This module defines the canonical, vendor-agnostic data model shared by
//! every provider adapter. These structures are designed to be:
//! - Provider-agnostic
//! - Append-only for conversation history
//! - Serializable so results can be persisted by callers

pub mod types;

pub use types::{
    Content, HistoryItem, MessageRole, OperateInput, OperateRequest, OperateResult,
    OperateStatus, ParsedResponse, StopReason, ToolCall, ToolCallStatus, ToolDefinition,
    ToolResult, UsageItem, STRUCTURED_OUTPUT_TOOL,
};
