//! What ends a run, and what happens right after.
//!
//! The loop is the same for every agent; a [`Policy`] supplies the two
//! decisions that differ. [`TaskPolicy`] stops on any tool result flagged
//! final. [`ReviewPolicy`] stops only on its verdict tool and then asks the
//! model once more, with tool calls disabled, to restate the verdict as prose.

use crate::tools::{SUBMIT_REVIEW_TOOL_NAME, ToolOutput};

pub trait Policy: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Whether this tool result ends the run. Only asked about tool runs
    /// that succeeded.
    fn is_final(&self, tool_name: &str, output: &ToolOutput) -> bool;

    /// Prompt for one extra, tool-free model call after the final result.
    /// Its text replaces the tool output as the run's result.
    fn follow_up_prompt(&self) -> Option<&str> {
        None
    }
}

/// The primary agent: a result flagged final ends the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskPolicy;

impl Policy for TaskPolicy {
    fn name(&self) -> &str {
        "task"
    }

    fn is_final(&self, _tool_name: &str, output: &ToolOutput) -> bool {
        output.is_final
    }
}

const DEFAULT_VERDICT_PROMPT: &str = "\
Your review has been recorded. Now state your verdict and the reasons for it \
in plain prose, addressed to the author. Do not call any tools.";

/// A reviewer: only `final_tool` ends the run, followed by a verdict prompt.
#[derive(Debug, Clone)]
pub struct ReviewPolicy {
    pub final_tool: String,
    pub verdict_prompt: String,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            final_tool: SUBMIT_REVIEW_TOOL_NAME.to_string(),
            verdict_prompt: DEFAULT_VERDICT_PROMPT.to_string(),
        }
    }
}

impl ReviewPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_final_tool(mut self, name: impl Into<String>) -> Self {
        self.final_tool = name.into();
        self
    }

    pub fn with_verdict_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.verdict_prompt = prompt.into();
        self
    }
}

impl Policy for ReviewPolicy {
    fn name(&self) -> &str {
        "review"
    }

    fn is_final(&self, tool_name: &str, _output: &ToolOutput) -> bool {
        tool_name == self.final_tool
    }

    fn follow_up_prompt(&self) -> Option<&str> {
        Some(&self.verdict_prompt)
    }
}
