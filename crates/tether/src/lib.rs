//! Turn-based LLM agent loop with summarizing context management.
//!
//! `tether` drives an autonomous agent that alternates between asking a model
//! for a completion and executing **at most one** tool call per turn. The
//! conversation lives in a [`MessageHistory`](history::MessageHistory); before
//! every model call a [`ContextManager`](context::ContextManager) checks the
//! history against a token budget and a turn-count ceiling, and collapses older
//! turns into a model-written summary when either is exceeded.
//!
//! The model provider is reached only through the [`Generate`](api::Generate)
//! trait, and tools only through the [`Tool`](tools::Tool) trait, so the loop
//! itself is provider- and tool-agnostic. An OpenRouter adapter ships in
//! [`api::openrouter`].
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api_key = std::env::var("OPENROUTER_KEY")?;
//!     let client = Arc::new(OpenRouterClient::new(api_key, "anthropic/claude-sonnet-4")?);
//!
//!     let tools = ToolRegistry::new().with(CompleteTool);
//!     let config = AgentConfig::new("You are a careful assistant.")
//!         .with_max_turns(20)
//!         .with_token_budget(100_000);
//!
//!     let mut agent = Agent::new(client, tools, TaskPolicy, config)
//!         .with_event_handler(LoggingHandler);
//!
//!     let answer = agent.run("List three prime numbers.", &[]).await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Run the loop:** [`Agent`](agent::Agent) with
//!   [`AgentConfig`](agent::AgentConfig). Pick a [`Policy`](agent::Policy):
//!   [`TaskPolicy`](agent::TaskPolicy) for the primary agent,
//!   [`ReviewPolicy`](agent::ReviewPolicy) for a reviewer that must end with a
//!   prose verdict.
//!
//! - **Define tools:** implement [`Tool`](tools::Tool) or wrap a closure in
//!   [`FnTool`](tools::FnTool); collect them in a
//!   [`ToolRegistry`](tools::ToolRegistry).
//!
//! - **Observe the loop:** implement [`EventHandler`](agent::events::EventHandler)
//!   or use [`LoggingHandler`](agent::events::LoggingHandler) and
//!   [`ChannelHandler`](agent::events::ChannelHandler).
//!
//! - **Control the context window:** [`ContextConfig`](context::ContextConfig)
//!   for budgets, [`TokenCounter`](context::TokenCounter) for custom tokenizers.
//!
//! - **Persist and resume:** [`MessageHistory::save`](history::MessageHistory::save)
//!   and [`MessageHistory::load`](history::MessageHistory::load).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | Loop engine, policies, config, events, errors |
//! | [`history`] | Ordered turn log, tool-call integrity, persistence |
//! | [`context`] | Token accounting, truncation strategies, summary prompts |
//! | [`tools`] | [`Tool`](tools::Tool) trait, registry, built-in final-answer tools |
//! | [`api`] | [`Generate`](api::Generate) boundary, OpenRouter adapter, retry |

pub mod agent;
pub mod api;
pub mod context;
pub mod history;
pub mod prelude;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` for a tool argument type.
///
/// ```
/// use tether_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct EchoArgs {
///     text: String,
/// }
///
/// let schema = json_schema_for::<EchoArgs>();
/// assert_eq!(schema["type"], "object");
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Content model ──────────────────────────────────────────────────

/// Who produced a turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolResult,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::ToolResult => write!(f, "tool_result"),
        }
    }
}

/// The smallest typed unit of a turn.
///
/// Closed set: every consumer matches exhaustively. Unknown kinds can only
/// appear in persisted histories and are filtered out while decoding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// Inline image. `data` is base64.
    Image {
        media_type: String,
        data: String,
    },
    /// A tool invocation requested by the model. `args` is the raw JSON
    /// argument string as the model produced it.
    ToolCall {
        id: String,
        name: String,
        args: String,
    },
    ToolResult {
        id: String,
        name: String,
        output: String,
    },
    Thinking {
        text: String,
    },
    /// Provider-encrypted reasoning. Opaque to us.
    RedactedThinking {
        #[serde(default)]
        data: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        ContentBlock::ToolCall {
            id: id.into(),
            name: name.into(),
            args: args.into(),
        }
    }

    pub fn tool_result(
        id: impl Into<String>,
        name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        ContentBlock::ToolResult {
            id: id.into(),
            name: name.into(),
            output: output.into(),
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        ContentBlock::Thinking { text: text.into() }
    }

    /// Whether this is a `Thinking` or `RedactedThinking` block.
    pub fn is_reasoning(&self) -> bool {
        matches!(
            self,
            ContentBlock::Thinking { .. } | ContentBlock::RedactedThinking { .. }
        )
    }

    /// The text of a `Text` block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// One message-equivalent unit of the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
    /// Set only on turns produced by the context manager.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub summary: bool,
}

impl Turn {
    pub fn new(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            blocks,
            summary: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(text)])
    }

    /// A synthetic summary turn standing in for a collapsed span.
    pub fn summary(text: &str) -> Self {
        Self {
            role: Role::User,
            blocks: vec![ContentBlock::text(format!(
                "{}{text}",
                context::SUMMARY_PREFIX
            ))],
            summary: true,
        }
    }

    /// Whether this turn is a user prompt (not a summary, not a tool result).
    pub fn is_user_prompt(&self) -> bool {
        self.role == Role::User && !self.summary
    }

    pub fn has_reasoning(&self) -> bool {
        self.blocks.iter().any(ContentBlock::is_reasoning)
    }

    /// All `Text` blocks joined with newlines.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The body of a summary turn without its `Conversation Summary: ` prefix.
    pub fn summary_text(&self) -> Option<String> {
        if !self.summary {
            return None;
        }
        let text = self.text();
        Some(
            text.strip_prefix(context::SUMMARY_PREFIX)
                .map(str::to_string)
                .unwrap_or(text),
        )
    }
}

// ── Tool catalog ───────────────────────────────────────────────────

/// A tool as advertised to the model: name, description, JSON Schema.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

// ── Attachments ────────────────────────────────────────────────────

/// A binary image handed to [`Agent::run`](agent::Agent::run).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(media_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read an image from disk, guessing the media type from the extension.
    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let media_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("png") => "image/png",
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => "application/octet-stream",
        };
        Ok(Self::new(media_type, bytes))
    }

    pub fn to_block(&self) -> ContentBlock {
        ContentBlock::Image {
            media_type: self.media_type.clone(),
            data: BASE64.encode(&self.bytes),
        }
    }
}
