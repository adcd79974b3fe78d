//! Truncation: collapsing older turns into a model-written summary.
//!
//! [`ContextManager::apply_truncation_if_needed`] triggers when the priced
//! history exceeds the token budget or the turn count exceeds `max_size`.
//! Two strategies exist and the choice depends on the whole history:
//!
//! - **Standard** (no reasoning blocks anywhere): keep the head, fold the
//!   middle into the running summary, keep a verbatim tail of
//!   `target - head - 1` turns.
//! - **With thinking blocks**: summarize a span that ends before the last
//!   user prompt and keep everything from that prompt onward verbatim, so a
//!   reasoning/tool-call chain is never cut in half.
//!
//! Both strategies reuse an existing summary turn directly after the head as
//! the seed for the new summary instead of stacking summaries. A summary that
//! would cost more tokens than the turns it replaces is cut to fit, so
//! truncation never raises the token count.

use super::budget::{CharRatioCounter, ContextUsage, TokenCounter, count_turns};
use super::summarizer::{DEFAULT_MAX_EVENT_CHARS, DEFAULT_SUMMARY_MAX_TOKENS, Summarizer};
use crate::api::Generate;
use crate::{ContentBlock, Role, Turn};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Budgets for the context window.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Token ceiling for the priced history.
    pub token_budget: usize,
    /// Turn-count ceiling.
    pub max_size: usize,
    /// Leading turns that always survive. Values below 1 are treated as 1.
    pub keep_first: usize,
    /// Per-event character cap inside summary prompts.
    pub max_event_chars: usize,
    /// Output-token ceiling for the summary call.
    pub summary_max_tokens: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: 120_000,
            max_size: 100,
            keep_first: 1,
            max_event_chars: DEFAULT_MAX_EVENT_CHARS,
            summary_max_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
        }
    }
}

impl ContextConfig {
    pub fn with_token_budget(mut self, tokens: usize) -> Self {
        self.token_budget = tokens;
        self
    }

    pub fn with_max_size(mut self, turns: usize) -> Self {
        self.max_size = turns;
        self
    }

    pub fn with_max_event_chars(mut self, chars: usize) -> Self {
        self.max_event_chars = chars;
        self
    }

    pub fn with_summary_max_tokens(mut self, tokens: u32) -> Self {
        self.summary_max_tokens = tokens;
        self
    }
}

/// Which truncation strategy applies to a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Standard,
    WithThinkingBlocks,
}

impl Strategy {
    pub fn for_turns(turns: &[Turn]) -> Self {
        if turns.iter().any(Turn::has_reasoning) {
            Strategy::WithThinkingBlocks
        } else {
            Strategy::Standard
        }
    }
}

/// Prices the history and truncates it when over budget.
///
/// Holds only configuration and collaborators; every call works on the turns
/// it is given.
#[derive(Clone)]
pub struct ContextManager {
    config: ContextConfig,
    counter: Arc<dyn TokenCounter>,
    client: Arc<dyn Generate>,
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ContextManager {
    /// Create a manager that summarizes through `client` and estimates
    /// tokens with [`CharRatioCounter`].
    pub fn new(config: ContextConfig, client: Arc<dyn Generate>) -> Self {
        Self {
            config,
            counter: Arc::new(CharRatioCounter::default()),
            client,
        }
    }

    /// Replace the token counter.
    pub fn with_token_counter(mut self, counter: impl TokenCounter + 'static) -> Self {
        self.counter = Arc::new(counter);
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn count_tokens(&self, turns: &[Turn]) -> usize {
        count_turns(self.counter.as_ref(), turns)
    }

    pub fn usage(&self, turns: &[Turn]) -> ContextUsage {
        ContextUsage {
            tokens: self.count_tokens(turns),
            turns: turns.len(),
            token_budget: self.config.token_budget,
            max_size: self.config.max_size,
        }
    }

    pub fn needs_truncation(&self, turns: &[Turn]) -> bool {
        self.usage(turns).over_limit()
    }

    fn summarizer(&self) -> Summarizer<'_> {
        Summarizer::new(
            self.client.as_ref(),
            self.config.max_event_chars,
            self.config.summary_max_tokens,
        )
    }

    fn head_len(&self, len: usize) -> usize {
        self.config.keep_first.max(1).min(len)
    }

    /// Half the effective turn ceiling.
    fn target_size(&self, len: usize) -> usize {
        self.config.max_size.min(len) / 2
    }

    /// Truncate `turns` if either ceiling is exceeded; otherwise return them
    /// untouched.
    pub async fn apply_truncation_if_needed(&self, turns: Vec<Turn>) -> Vec<Turn> {
        let usage = self.usage(&turns);
        if !usage.over_limit() {
            return turns;
        }

        let strategy = Strategy::for_turns(&turns);
        info!(
            "Truncating history ({}) using {strategy:?} strategy",
            usage.to_log_string()
        );

        let before = turns.len();
        let result = match strategy {
            Strategy::Standard => self.truncate_standard(turns, usage.tokens).await,
            Strategy::WithThinkingBlocks => {
                self.truncate_with_thinking(turns, usage.tokens).await
            }
        };

        if result.len() != before {
            info!(
                "Truncated {before} -> {} turns, ~{} -> ~{} tokens",
                result.len(),
                usage.tokens,
                self.count_tokens(&result)
            );
        }
        result
    }

    /// Running summary directly after the head, if any, and the index where
    /// summarizable turns begin.
    fn seed(turns: &[Turn], head: usize) -> (Option<String>, usize) {
        match turns.get(head) {
            Some(turn) if turn.summary => (turn.summary_text(), head + 1),
            _ => (None, head),
        }
    }

    /// Shorten `summary` on a char boundary until its cost fits `allowance`.
    fn fit_summary(&self, summary: String, allowance: usize) -> String {
        if self.counter.count(&summary) <= allowance {
            return summary;
        }
        let chars: Vec<char> = summary.chars().collect();
        let (mut fits, mut too_long) = (0, chars.len());
        while fits + 1 < too_long {
            let mid = (fits + too_long) / 2;
            let candidate: String = chars[..mid].iter().collect();
            if self.counter.count(&candidate) <= allowance {
                fits = mid;
            } else {
                too_long = mid;
            }
        }
        warn!(
            "Summary of ~{} tokens exceeds the {allowance} tokens it replaces; keeping {fits} of {} chars",
            self.counter.count(&summary),
            chars.len()
        );
        chars[..fits].iter().collect()
    }

    /// Put the summary turn at `at`, shortened so the result never costs more
    /// than the `before` tokens of the untruncated history.
    fn place_summary(
        &self,
        mut turns: Vec<Turn>,
        at: usize,
        summary: String,
        before: usize,
    ) -> Vec<Turn> {
        turns[at] = Turn::summary("");
        let allowance = before.saturating_sub(self.count_tokens(&turns));
        turns[at] = Turn::summary(&self.fit_summary(summary, allowance));
        turns
    }

    async fn truncate_standard(&self, mut turns: Vec<Turn>, before: usize) -> Vec<Turn> {
        let len = turns.len();
        let head = self.head_len(len);
        let (seed, start) = Self::seed(&turns, head);
        let tail_len = self.target_size(len).saturating_sub(head + 1);
        let mut tail_start = len.saturating_sub(tail_len).max(start);

        // Keep a tool call together with its result.
        while tail_start > start
            && tail_start < len
            && turns[tail_start].role == Role::ToolResult
        {
            tail_start -= 1;
        }
        // An unanswered call in the newest turn stays live.
        if tail_start == len && tail_start > start && ends_with_tool_call(&turns) {
            tail_start -= 1;
        }

        if tail_start <= start {
            debug!("Standard truncation skipped: no turns between head and tail");
            return turns;
        }

        let summary = self
            .summarizer()
            .summarize(seed.as_deref(), &turns[start..tail_start])
            .await;

        let tail = turns.split_off(tail_start);
        turns.truncate(head);
        turns.push(Turn::summary(""));
        turns.extend(tail);
        self.place_summary(turns, head, summary, before)
    }

    async fn truncate_with_thinking(&self, turns: Vec<Turn>, before: usize) -> Vec<Turn> {
        let len = turns.len();
        let Some(last_prompt) = turns.iter().rposition(Turn::is_user_prompt) else {
            debug!("Thinking-block truncation skipped: no user prompt");
            return turns;
        };

        let head = self.head_len(len);
        let (seed, start) = Self::seed(&turns, head);
        let end = last_prompt.min(head + self.target_size(len));

        // A prior summary at `head` belongs to the span.
        if end <= head + 1 {
            debug!(
                "Thinking-block truncation skipped: span [{head}, {end}) has at most one turn"
            );
            return turns;
        }

        let summary = self
            .summarizer()
            .summarize(seed.as_deref(), &turns[start..end])
            .await;

        let mut out = Vec::with_capacity(head + 1 + len - last_prompt);
        let mut iter = turns.into_iter();
        out.extend(iter.by_ref().take(head));
        out.push(Turn::summary(""));
        out.extend(iter.skip(last_prompt - head));
        self.place_summary(out, head, summary, before)
    }

    /// Summarize the whole conversation, for user-invoked compaction.
    pub async fn generate_complete_conversation_summary(&self, turns: &[Turn]) -> String {
        self.summarizer().summarize_all(turns).await
    }
}

fn ends_with_tool_call(turns: &[Turn]) -> bool {
    turns.last().is_some_and(|t| {
        t.role == Role::Assistant
            && t.blocks
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolCall { .. }))
    })
}
