//! Tools the agent uses to end a run.
//!
//! [`CompleteTool`] hands back a final answer; [`TaskPolicy`] stops on it
//! because its output is flagged final. [`SubmitReviewTool`] records a
//! reviewer's verdict; [`ReviewPolicy`] stops on it by name and then asks the
//! model to restate the verdict in prose.
//!
//! [`TaskPolicy`]: crate::agent::TaskPolicy
//! [`ReviewPolicy`]: crate::agent::ReviewPolicy

use super::core::{Tool, ToolFuture, ToolOutput, parse_tool_args};
use crate::{ToolDef, Turn};
use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt;

pub const COMPLETE_TOOL_NAME: &str = "complete";
pub const SUBMIT_REVIEW_TOOL_NAME: &str = "submit_review";

pub struct CompleteTool;

#[derive(Deserialize, JsonSchema)]
pub struct CompleteArgs {
    /// The final answer to return to the user.
    pub result: String,
}

impl Tool for CompleteTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            COMPLETE_TOOL_NAME,
            "Call this when the task is finished. Put the complete answer for \
             the user in 'result'; nothing else you wrote will be shown.",
            crate::json_schema_for::<CompleteArgs>(),
        )
    }

    fn run<'a>(&'a self, args: &'a str, _history: &'a [Turn]) -> ToolFuture<'a> {
        Box::pin(async move {
            let args: CompleteArgs = parse_tool_args(COMPLETE_TOOL_NAME, args)?;
            Ok(ToolOutput::final_answer(args.result))
        })
    }
}

#[derive(Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    RequestChanges,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Approve => write!(f, "approve"),
            Verdict::RequestChanges => write!(f, "request_changes"),
        }
    }
}

pub struct SubmitReviewTool;

#[derive(Deserialize, JsonSchema)]
pub struct SubmitReviewArgs {
    /// Whether the work is acceptable as is.
    pub verdict: Verdict,
    /// Concrete problems found, or why the work is acceptable.
    pub feedback: String,
}

impl Tool for SubmitReviewTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            SUBMIT_REVIEW_TOOL_NAME,
            "Submit your review once you have inspected the work. Use \
             'approve' only if nothing needs to change; otherwise use \
             'request_changes' and list every problem in 'feedback'.",
            crate::json_schema_for::<SubmitReviewArgs>(),
        )
    }

    fn run<'a>(&'a self, args: &'a str, _history: &'a [Turn]) -> ToolFuture<'a> {
        Box::pin(async move {
            let args: SubmitReviewArgs = parse_tool_args(SUBMIT_REVIEW_TOOL_NAME, args)?;
            Ok(ToolOutput::text(format!(
                "Review submitted: {}\n\n{}",
                args.verdict, args.feedback
            )))
        })
    }
}
