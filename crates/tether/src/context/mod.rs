//! Context window management: token accounting, truncation, summaries.
//!
//! 1. **[`budget`]**: prices turns in tokens. Text goes through a
//!    [`TokenCounter`]; images are flat-rate; reasoning is billed only in the
//!    newest turn.
//!
//! 2. **[`summarizer`]**: builds the summary prompt (running summary plus
//!    capped `<EVENT>` blocks) and makes the single summary call, degrading to
//!    a placeholder on failure.
//!
//! 3. **[`manager`]**: [`ContextManager`] decides when to truncate and which
//!    strategy to use, and produces whole-history summaries for compaction.

pub mod budget;
pub mod manager;
pub mod summarizer;

pub use budget::{
    CharRatioCounter, ContextUsage, DEFAULT_CHARS_PER_TOKEN, IMAGE_TOKEN_COST, TokenCounter,
};
pub use manager::{ContextConfig, ContextManager, Strategy};
pub use summarizer::{EMPTY_HISTORY_SUMMARY, NO_EVENTS_SUMMARIZED};

/// Leading text of every summary turn.
pub const SUMMARY_PREFIX: &str = "Conversation Summary: ";
