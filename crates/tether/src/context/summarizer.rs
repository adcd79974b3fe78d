//! Summary prompt construction and the summarization model call.
//!
//! A summary folds a span of turns, plus any running summary, into one block
//! of prose. Each turn is serialized as a labeled `<EVENT>` block capped at
//! `max_event_chars`. The model is called once at temperature 0; if that call
//! fails the summarizer degrades to a placeholder so truncation never aborts a
//! run.

use crate::api::{Generate, GenerateRequest, ToolChoice};
use crate::{ContentBlock, Turn};
use tracing::{debug, warn};

/// Stands in for the previous summary when there is none.
pub const NO_EVENTS_SUMMARIZED: &str = "No events summarized";

/// Returned by whole-history compaction when there is nothing to compact.
pub const EMPTY_HISTORY_SUMMARY: &str = "No conversation history to summarize.";

/// Appended to an event that was cut at `max_event_chars`.
pub const TRUNCATION_SUFFIX: &str = "... [truncated]";

/// Default per-event cap in characters.
pub const DEFAULT_MAX_EVENT_CHARS: usize = 10_000;

/// Default output-token ceiling for a summary.
pub const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 4_096;

const SUMMARIZATION_PROMPT: &str = "\
You are maintaining the memory of an autonomous agent whose conversation has \
grown too long. Below is the previous summary of earlier work followed by \
events that are about to be forgotten. Produce a single updated summary that \
replaces the previous one.

Keep:
- The user's goals and any constraints they stated
- What was accomplished and what was decided
- Approaches that failed and why
- File paths, identifiers, commands and error messages, verbatim
- What remains to be done

Only state facts that appear in the events or the previous summary. Merge, \
deduplicate and update; do not simply append.";

const COMPLETE_SUMMARY_PROMPT: &str = "\
Summarize the entire conversation below so that it can replace the \
conversation as the agent's only memory. Keep the user's goals, the work \
completed, decisions made, failed approaches, and what remains to be done. \
Preserve file paths, identifiers and error messages verbatim.";

/// Serialize one turn for a summary prompt.
pub fn serialize_turn(turn: &Turn) -> String {
    turn.blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => text.clone(),
            ContentBlock::Image { media_type, .. } => format!("[image: {media_type}]"),
            ContentBlock::ToolCall { id, name, args } => {
                format!("[tool call {name} id={id}] {args}")
            }
            ContentBlock::ToolResult { id, name, output } => {
                format!("[tool result {name} id={id}] {output}")
            }
            ContentBlock::Thinking { text } => format!("[thinking] {text}"),
            ContentBlock::RedactedThinking { .. } => "[redacted thinking]".to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut `text` to `max_chars` characters, marking the cut.
pub fn cap_event(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut capped: String = text.chars().take(max_chars).collect();
    capped.push_str(TRUNCATION_SUFFIX);
    capped
}

/// Placeholder used when the summary call fails.
pub fn fallback_summary(event_count: usize) -> String {
    format!("Failed to summarize {event_count} events due to an error.")
}

/// Builds summary prompts and runs the summary call.
pub struct Summarizer<'a> {
    client: &'a dyn Generate,
    max_event_chars: usize,
    max_tokens: u32,
}

impl<'a> Summarizer<'a> {
    pub fn new(client: &'a dyn Generate, max_event_chars: usize, max_tokens: u32) -> Self {
        Self {
            client,
            max_event_chars,
            max_tokens,
        }
    }

    fn push_events(&self, prompt: &mut String, events: &[Turn]) {
        for (i, turn) in events.iter().enumerate() {
            let body = cap_event(&serialize_turn(turn), self.max_event_chars);
            prompt.push_str(&format!(
                "<EVENT id={} role={}>\n{body}\n</EVENT>\n",
                i + 1,
                turn.role
            ));
        }
    }

    /// The incremental summary prompt for `events` on top of `previous`.
    pub fn build_prompt(&self, previous: Option<&str>, events: &[Turn]) -> String {
        let mut prompt = String::from(SUMMARIZATION_PROMPT);
        prompt.push_str("\n\n<PREVIOUS SUMMARY>\n");
        prompt.push_str(previous.unwrap_or(NO_EVENTS_SUMMARIZED));
        prompt.push_str("\n</PREVIOUS SUMMARY>\n\n");
        self.push_events(&mut prompt, events);
        prompt
    }

    /// The prompt for summarizing a complete conversation.
    pub fn build_complete_prompt(&self, turns: &[Turn]) -> String {
        let mut prompt = String::from(COMPLETE_SUMMARY_PROMPT);
        prompt.push_str("\n\n");
        self.push_events(&mut prompt, turns);
        prompt
    }

    /// Fold `events` into `previous`. Never fails; see [`fallback_summary`].
    pub async fn summarize(&self, previous: Option<&str>, events: &[Turn]) -> String {
        let prompt = self.build_prompt(previous, events);
        self.call(prompt, events.len()).await
    }

    /// Summarize a whole conversation. Empty input returns
    /// [`EMPTY_HISTORY_SUMMARY`] without calling the model.
    pub async fn summarize_all(&self, turns: &[Turn]) -> String {
        if turns.is_empty() {
            return EMPTY_HISTORY_SUMMARY.to_string();
        }
        let prompt = self.build_complete_prompt(turns);
        self.call(prompt, turns.len()).await
    }

    async fn call(&self, prompt: String, event_count: usize) -> String {
        debug!(
            "Summarizing {event_count} events ({} prompt bytes)",
            prompt.len()
        );
        let turns = [Turn::user(prompt)];
        let request = GenerateRequest {
            turns: &turns,
            tools: &[],
            system_prompt: "",
            max_tokens: self.max_tokens,
            temperature: Some(0.0),
            tool_choice: ToolChoice::Auto,
        };

        match self.client.generate(request).await {
            Ok(blocks) => {
                let summary: String = blocks.iter().filter_map(ContentBlock::as_text).collect();
                if summary.trim().is_empty() {
                    warn!("Summary model returned no text for {event_count} events");
                    fallback_summary(event_count)
                } else {
                    summary
                }
            }
            Err(e) => {
                warn!("Summarization failed: {e}. Continuing with a placeholder summary.");
                fallback_summary(event_count)
            }
        }
    }
}
