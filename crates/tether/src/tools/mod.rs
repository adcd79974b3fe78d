//! Tool abstractions for the agent loop.
//!
//! Every agent capability is a [`Tool`] implementor. Tools are collected into
//! a [`ToolRegistry`] which handles dispatch, validation, truncation and
//! timeouts. A tool either returns a [`ToolOutput`] or a [`ToolError`]; the
//! loop turns errors into text for the model and keeps going.
//!
//! # Defining tools
//!
//! - **[`FnTool`]**: closure-based, auto-parses arguments. Best for simple tools.
//! - **`impl Tool`**: full struct with [`Tool::definition()`] and
//!   [`Tool::run()`]. Needed for shared state or to read the conversation.
//!
//! # Submodules
//!
//! - [`core`]: [`Tool`] trait, [`ToolRegistry`], [`FnTool`], helpers.
//! - [`builtin`]: [`CompleteTool`] and [`SubmitReviewTool`].

pub mod builtin;
pub mod core;

pub use builtin::{
    COMPLETE_TOOL_NAME, CompleteTool, SUBMIT_REVIEW_TOOL_NAME, SubmitReviewTool, Verdict,
};
pub use core::{
    DEFAULT_MAX_RESULT_BYTES, DEFAULT_TOOL_TIMEOUT, FnTool, Tool, ToolError, ToolFuture,
    ToolOutput, ToolRegistry, parse_tool_args, truncate_result, validate_tool_arguments,
};
