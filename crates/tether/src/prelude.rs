//! Convenience re-exports for common `tether` types.
//!
//! Meant to be glob-imported when building agents:
//!
//! ```ignore
//! use tether_rs::prelude::*;
//! ```
//!
//! This pulls in the content model, the [`Agent`] with its config and
//! policies, the [`Tool`] trait with [`ToolRegistry`], event handlers, and
//! the OpenRouter client. Context internals (token counters, strategies,
//! summary prompts) stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Attachment, ContentBlock, Role, ToolDef, Turn, json_schema_for};

// ── Model boundary ──────────────────────────────────────────────────
pub use crate::api::{
    Generate, GenerateError, GenerateRequest, OpenRouterClient, RetryConfig, ToolChoice,
};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    Agent, AgentConfig, AgentError, AgentEvent, CancelHandle, ChannelHandler,
    CompositeEventHandler, EventHandler, EventKind, FnEventHandler, LoggingHandler, NoopHandler,
    Policy, ReviewPolicy, RunOutcome, TaskPolicy,
};

// ── Conversation and context ────────────────────────────────────────
pub use crate::context::{ContextConfig, ContextManager};
pub use crate::history::{HistoryError, MessageHistory};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{
    CompleteTool, FnTool, SubmitReviewTool, Tool, ToolError, ToolFuture, ToolOutput,
    ToolRegistry, parse_tool_args,
};
