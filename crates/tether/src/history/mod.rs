//! The conversation log.
//!
//! [`MessageHistory`] is an ordered, append-only sequence of [`Turn`]s owned by
//! one agent instance and reusable across resumed runs. It only shrinks when
//! the [`ContextManager`] collapses a span into a summary, after which
//! [`MessageHistory::ensure_tool_call_integrity`] removes any tool call or
//! result whose counterpart was summarized away.

mod store;

pub use store::{HISTORY_FORMAT_VERSION, HistoryError};

use crate::context::ContextManager;
use crate::{Attachment, ContentBlock, Role, Turn};
use std::collections::HashSet;
use tracing::{info, warn};

/// A tool call from the latest assistant turn that has no result yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub args: String,
}

/// Ordered log of conversation turns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageHistory {
    turns: Vec<Turn>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Append a user prompt; each attachment becomes an `Image` block after
    /// the text.
    pub fn add_user_prompt(&mut self, text: &str, images: &[Attachment]) {
        let mut blocks = Vec::with_capacity(1 + images.len());
        blocks.push(ContentBlock::text(text));
        blocks.extend(images.iter().map(Attachment::to_block));
        self.turns.push(Turn::new(Role::User, blocks));
    }

    /// Append a model response. Empty responses are ignored.
    pub fn add_assistant_turn(&mut self, blocks: Vec<ContentBlock>) {
        if blocks.is_empty() {
            warn!("Refusing to append an empty assistant turn");
            return;
        }
        self.turns.push(Turn::new(Role::Assistant, blocks));
    }

    pub fn add_tool_result(&mut self, id: &str, name: &str, output: &str) {
        self.turns.push(Turn::new(
            Role::ToolResult,
            vec![ContentBlock::tool_result(id, name, output)],
        ));
    }

    /// The turns to send to the model.
    pub fn get_for_model(&self) -> &[Turn] {
        &self.turns
    }

    /// Tool calls in the latest assistant turn that lack a matching result.
    pub fn get_pending_tool_calls(&self) -> Vec<PendingToolCall> {
        let Some(idx) = self.turns.iter().rposition(|t| t.role == Role::Assistant) else {
            return Vec::new();
        };

        let answered: HashSet<&str> = self.turns[idx + 1..]
            .iter()
            .flat_map(|t| &t.blocks)
            .filter_map(|b| match b {
                ContentBlock::ToolResult { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();

        self.turns[idx]
            .blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolCall { id, name, args } if !answered.contains(id.as_str()) => {
                    Some(PendingToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        args: args.clone(),
                    })
                }
                _ => None,
            })
            .collect()
    }

    /// Text of the newest assistant turn, or an empty string if there is none.
    pub fn last_assistant_text(&self) -> String {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(Turn::text)
            .unwrap_or_default()
    }

    pub fn count_tokens(&self, manager: &ContextManager) -> usize {
        manager.count_tokens(&self.turns)
    }

    /// Let `manager` truncate the history if it is over budget, then restore
    /// tool-call integrity. Returns whether truncation was triggered.
    pub async fn truncate(&mut self, manager: &ContextManager) -> bool {
        if !manager.needs_truncation(&self.turns) {
            return false;
        }
        let turns = std::mem::take(&mut self.turns);
        self.turns = manager.apply_truncation_if_needed(turns).await;
        self.ensure_tool_call_integrity();
        true
    }

    /// Replace the whole history with one summary turn. Returns the summary.
    pub async fn compact(&mut self, manager: &ContextManager) -> String {
        let summary = manager
            .generate_complete_conversation_summary(&self.turns)
            .await;
        if !self.turns.is_empty() {
            info!("Compacted {} turns into one summary", self.turns.len());
            self.turns = vec![Turn::summary(&summary)];
        }
        summary
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Remove `ToolCall` and `ToolResult` blocks that have no counterpart.
    ///
    /// A result survives only if a call with its id precedes it and no earlier
    /// result already answered that call. A call survives if a surviving
    /// result answers it, or if it sits in the final turn and is still open.
    /// Other block kinds are never touched. A turn emptied by the filter is
    /// dropped. Returns the number of blocks removed.
    pub fn ensure_tool_call_integrity(&mut self) -> usize {
        let open_turn = self
            .turns
            .len()
            .checked_sub(1)
            .filter(|&i| self.turns[i].role == Role::Assistant);

        let mut seen_calls: HashSet<&str> = HashSet::new();
        let mut answered: HashSet<&str> = HashSet::new();
        let mut keep: Vec<Vec<bool>> = Vec::with_capacity(self.turns.len());

        for turn in &self.turns {
            let mut flags = Vec::with_capacity(turn.blocks.len());
            for block in &turn.blocks {
                let k = match block {
                    ContentBlock::ToolCall { id, .. } => {
                        seen_calls.insert(id);
                        true
                    }
                    ContentBlock::ToolResult { id, .. } => {
                        seen_calls.contains(id.as_str()) && answered.insert(id)
                    }
                    _ => true,
                };
                flags.push(k);
            }
            keep.push(flags);
        }

        for (ti, turn) in self.turns.iter().enumerate() {
            for (bi, block) in turn.blocks.iter().enumerate() {
                if let ContentBlock::ToolCall { id, .. } = block {
                    keep[ti][bi] = answered.contains(id.as_str()) || open_turn == Some(ti);
                }
            }
        }

        let mut removed = 0;
        let turns = std::mem::take(&mut self.turns);
        for (turn, flags) in turns.into_iter().zip(keep) {
            let before = turn.blocks.len();
            let blocks: Vec<ContentBlock> = turn
                .blocks
                .into_iter()
                .zip(flags)
                .filter_map(|(block, k)| k.then_some(block))
                .collect();
            let dropped = before - blocks.len();
            removed += dropped;
            if dropped > 0 && blocks.is_empty() {
                continue;
            }
            self.turns.push(Turn {
                role: turn.role,
                blocks,
                summary: turn.summary,
            });
        }

        if removed > 0 {
            info!("Removed {removed} unmatched tool block(s) from history");
        }
        removed
    }
}
