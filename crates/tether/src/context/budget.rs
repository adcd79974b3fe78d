//! Token accounting for the turn sequence.
//!
//! Prices every block of every turn so the [`ContextManager`](super::ContextManager)
//! can decide when to truncate. Text is priced by a pluggable [`TokenCounter`];
//! images cost a flat [`IMAGE_TOKEN_COST`]; reasoning is free except in the
//! newest turn, where the provider still sees it. Like role labels and tool
//! names, the [`SUMMARY_PREFIX`] label of a summary turn is framing and is
//! not billed.

use super::SUMMARY_PREFIX;
use crate::{ContentBlock, Turn};

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; 3.5 sits in between.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Flat token cost charged for every image block.
pub const IMAGE_TOKEN_COST: usize = 1_000;

/// Counts tokens in a piece of serialized text.
///
/// Plug in a provider tokenizer for exact numbers. The default
/// [`CharRatioCounter`] estimates from byte length.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Estimates tokens as `ceil(bytes / chars_per_token)`.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioCounter {
    chars_per_token: f64,
}

impl CharRatioCounter {
    /// Use a calibrated ratio. Non-positive ratios fall back to the default.
    pub fn new(chars_per_token: f64) -> Self {
        let chars_per_token = if chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self { chars_per_token }
    }
}

impl Default for CharRatioCounter {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenCounter for CharRatioCounter {
    fn count(&self, text: &str) -> usize {
        (text.len() as f64 / self.chars_per_token).ceil() as usize
    }
}

/// Cost of a single block. `in_last_turn` decides whether reasoning is billed.
pub fn block_tokens(counter: &dyn TokenCounter, block: &ContentBlock, in_last_turn: bool) -> usize {
    match block {
        ContentBlock::Text { text } => counter.count(text),
        ContentBlock::ToolCall { args, .. } => counter.count(args),
        ContentBlock::ToolResult { output, .. } => counter.count(output),
        ContentBlock::Image { .. } => IMAGE_TOKEN_COST,
        ContentBlock::Thinking { text } if in_last_turn => counter.count(text),
        ContentBlock::Thinking { .. } => 0,
        ContentBlock::RedactedThinking { .. } => 0,
    }
}

/// Cost of one turn.
pub fn turn_tokens(counter: &dyn TokenCounter, turn: &Turn, is_last: bool) -> usize {
    turn.blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } if turn.summary => {
                counter.count(text.strip_prefix(SUMMARY_PREFIX).unwrap_or(text))
            }
            _ => block_tokens(counter, block, is_last),
        })
        .sum()
}

/// Total cost of a turn sequence.
pub fn count_turns(counter: &dyn TokenCounter, turns: &[Turn]) -> usize {
    let last = turns.len().saturating_sub(1);
    turns
        .iter()
        .enumerate()
        .map(|(i, turn)| turn_tokens(counter, turn, i == last))
        .sum()
}

/// Snapshot of context usage at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextUsage {
    pub tokens: usize,
    pub turns: usize,
    pub token_budget: usize,
    pub max_size: usize,
}

impl ContextUsage {
    /// Whether either ceiling is exceeded.
    pub fn over_limit(&self) -> bool {
        self.tokens > self.token_budget || self.turns > self.max_size
    }

    /// Usage as a fraction of the token budget.
    pub fn usage_pct(&self) -> f64 {
        if self.token_budget == 0 {
            1.0
        } else {
            self.tokens as f64 / self.token_budget as f64
        }
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {}), {}/{} turns",
            self.tokens,
            self.usage_pct() * 100.0,
            self.token_budget,
            self.turns,
            self.max_size,
        )
    }
}
