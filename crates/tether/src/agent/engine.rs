//! The agent loop.
//!
//! [`Agent::run`] appends the user's instruction to history and then, once
//! per turn:
//!
//! 1. truncates the history if the [`ContextManager`] says it is over budget;
//! 2. checks for interruption;
//! 3. asks the model for a completion and appends it as an assistant turn;
//! 4. finishes if the turn has no tool call, fails if it has several;
//! 5. checks for interruption again, runs the single tool call and records
//!    its result;
//! 6. finishes if the tool succeeded and the [`Policy`] judges its result
//!    final. A failed tool never ends the run.
//!
//! A run that uses up `max_turns` returns a fixed message rather than an
//! error. Interruption is cooperative: [`CancelHandle::cancel`] sets a flag
//! that the loop reads at steps 2 and 5, so an in-flight model or tool call
//! always finishes first.

use super::config::AgentConfig;
use super::error::AgentError;
use super::events::{AgentEvent, EventHandler, EventKind, NoopHandler};
use super::policy::Policy;
use crate::api::{Generate, GenerateRequest, ToolChoice, generate_span_id, generate_trace_id};
use crate::context::ContextManager;
use crate::history::MessageHistory;
use crate::tools::{ToolOutput, ToolRegistry};
use crate::{Attachment, ContentBlock};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Stands in for an empty model response.
pub const EMPTY_RESPONSE_FALLBACK: &str = "Completed the task.";

/// Result text of an interrupted run.
pub const INTERRUPTED_MESSAGE: &str = "Agent interrupted by user";

/// Recorded as the result of a tool call skipped by interruption.
pub const TOOL_INTERRUPTED_MESSAGE: &str = "Tool execution interrupted by user.";

/// Result text of a run that used up its turns.
pub const EXHAUSTED_MESSAGE: &str = "Agent did not complete after max turns";

/// How the last run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
    Exhausted,
}

/// Shared interruption flag. Clone it into whatever task needs to stop the
/// agent.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A single-tool-call-per-turn agent.
///
/// ```ignore
/// let mut agent = Agent::new(client, tools, TaskPolicy, AgentConfig::new(prompt))
///     .with_event_handler(LoggingHandler);
/// let answer = agent.run("Summarize README.md", &[]).await?;
/// ```
pub struct Agent {
    client: Arc<dyn Generate>,
    tools: ToolRegistry,
    policy: Box<dyn Policy>,
    config: AgentConfig,
    context: ContextManager,
    history: MessageHistory,
    handler: Arc<dyn EventHandler>,
    cancel: CancelHandle,
    last_outcome: Option<RunOutcome>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("policy", &self.policy.name())
            .field("tools", &self.tools)
            .field("config", &self.config)
            .field("turns", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// The same `client` serves completions and summaries.
    pub fn new(
        client: Arc<dyn Generate>,
        tools: ToolRegistry,
        policy: impl Policy + 'static,
        config: AgentConfig,
    ) -> Self {
        let context = ContextManager::new(config.context.clone(), client.clone());
        Self {
            client,
            tools,
            policy: Box::new(policy),
            config,
            context,
            history: MessageHistory::new(),
            handler: Arc::new(NoopHandler),
            cancel: CancelHandle::default(),
            last_outcome: None,
        }
    }

    pub fn with_event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Resume from an existing conversation.
    pub fn with_history(mut self, history: MessageHistory) -> Self {
        self.history = history;
        self
    }

    /// Replace the context manager, e.g. to plug in a different token counter.
    pub fn with_context_manager(mut self, context: ContextManager) -> Self {
        self.context = context;
        self
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut MessageHistory {
        &mut self.history
    }

    pub fn context_manager(&self) -> &ContextManager {
        &self.context
    }

    /// Request interruption of the current run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Drop the conversation and any pending cancellation.
    pub fn clear(&mut self) {
        self.history.clear();
        self.cancel.reset();
        self.last_outcome = None;
    }

    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.last_outcome
    }

    fn emit(&self, kind: EventKind, payload: serde_json::Value) {
        self.handler.on_event(&AgentEvent::new(kind, payload));
    }

    /// Run one instruction to completion, interruption or exhaustion.
    ///
    /// Returns the agent's answer. Errors only on protocol violations and
    /// failed model calls.
    pub async fn run(
        &mut self,
        instruction: &str,
        attachments: &[Attachment],
    ) -> Result<String, AgentError> {
        if let Some(name) = self.tools.duplicate_name() {
            return Err(AgentError::DuplicateTool(name));
        }

        let trace_id = generate_trace_id();
        self.cancel.reset();
        self.last_outcome = None;
        info!(
            "Agent run started: trace_id={trace_id}, policy={}, max_turns={}, history={} turns",
            self.policy.name(),
            self.config.max_turns,
            self.history.len()
        );

        self.history.add_user_prompt(instruction, attachments);
        self.history.ensure_tool_call_integrity();
        self.emit(
            EventKind::UserMessage,
            json!({
                "trace_id": trace_id,
                "text": instruction,
                "attachments": attachments.len(),
            }),
        );

        let tool_defs = self.tools.definitions();

        for turn in 1..=self.config.max_turns {
            let span_id = generate_span_id(&trace_id, turn);

            if self.history.truncate(&self.context).await {
                debug!(
                    "[{span_id}] history now {}",
                    self.context.usage(self.history.turns()).to_log_string()
                );
            }

            if self.cancel.is_cancelled() {
                return Ok(self.finish_interrupted(&trace_id));
            }

            let request = GenerateRequest {
                turns: self.history.get_for_model(),
                tools: &tool_defs,
                system_prompt: &self.config.system_prompt,
                max_tokens: self.config.max_output_tokens,
                temperature: self.config.temperature,
                tool_choice: ToolChoice::Auto,
            };
            debug!(
                "[{span_id}] requesting completion ({} turns, {} tools)",
                request.turns.len(),
                request.tools.len()
            );
            let mut blocks = self.client.generate(request).await?;

            if blocks.is_empty() {
                warn!("[{span_id}] model returned no content; substituting a completion notice");
                blocks.push(ContentBlock::text(EMPTY_RESPONSE_FALLBACK));
            }
            for block in &blocks {
                if let ContentBlock::Thinking { text } = block {
                    self.emit(EventKind::AgentThinking, json!({ "text": text }));
                }
            }
            self.history.add_assistant_turn(blocks);

            let mut pending = self.history.get_pending_tool_calls();
            let call = match pending.len() {
                0 => {
                    let text = self.history.last_assistant_text();
                    return Ok(self.finish_completed(&trace_id, turn, text));
                }
                1 => pending.remove(0),
                count => {
                    warn!("[{span_id}] model requested {count} tool calls in one turn");
                    return Err(AgentError::MultipleToolCalls { count });
                }
            };

            self.emit(
                EventKind::ToolCall,
                json!({ "id": call.id, "name": call.name, "args": call.args }),
            );

            if self.cancel.is_cancelled() {
                self.history
                    .add_tool_result(&call.id, &call.name, TOOL_INTERRUPTED_MESSAGE);
                return Ok(self.finish_interrupted(&trace_id));
            }

            let (output, succeeded) = match self
                .tools
                .execute(&call.name, &call.args, self.history.turns())
                .await
            {
                Ok(output) => (output, true),
                Err(e) => {
                    warn!("[{span_id}] tool {} failed: {e}", call.name);
                    (ToolOutput::text(format!("Error executing tool: {e}")), false)
                }
            };

            self.history
                .add_tool_result(&call.id, &call.name, &output.text);
            self.emit(
                EventKind::ToolResult,
                json!({
                    "id": call.id,
                    "name": call.name,
                    "output": output.text,
                    "is_final": output.is_final,
                }),
            );

            if succeeded && self.policy.is_final(&call.name, &output) {
                let text = self.follow_up(&span_id, output).await;
                return Ok(self.finish_completed(&trace_id, turn, text));
            }
        }

        warn!(
            "Agent run {trace_id} exhausted {} turns without completing",
            self.config.max_turns
        );
        self.last_outcome = Some(RunOutcome::Exhausted);
        Ok(EXHAUSTED_MESSAGE.to_string())
    }

    /// The policy's post-final step. Falls back to the tool output when the
    /// policy has none or the model has nothing to say.
    async fn follow_up(&mut self, span_id: &str, output: ToolOutput) -> String {
        let Some(prompt) = self.policy.follow_up_prompt().map(str::to_string) else {
            return output.text;
        };
        self.history.add_user_prompt(&prompt, &[]);

        // The catalog stays so earlier tool turns remain well-formed.
        let tool_defs = self.tools.definitions();
        let request = GenerateRequest {
            turns: self.history.get_for_model(),
            tools: &tool_defs,
            system_prompt: &self.config.system_prompt,
            max_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
            tool_choice: ToolChoice::None,
        };
        debug!("[{span_id}] requesting {} follow-up", self.policy.name());

        let blocks: Vec<ContentBlock> = match self.client.generate(request).await {
            Ok(blocks) => blocks
                .into_iter()
                .filter(|b| matches!(b, ContentBlock::Text { .. } | ContentBlock::Thinking { .. }))
                .collect(),
            Err(e) => {
                warn!("[{span_id}] follow-up call failed: {e}. Using the tool output.");
                Vec::new()
            }
        };

        let text = blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            self.history
                .add_assistant_turn(vec![ContentBlock::text(output.text.clone())]);
            output.text
        } else {
            self.history.add_assistant_turn(blocks);
            text
        }
    }

    fn finish_completed(&mut self, trace_id: &str, turns: u32, text: String) -> String {
        info!("Agent run {trace_id} completed after {turns} turn(s)");
        self.emit(EventKind::AgentResponse, json!({ "text": text }));
        self.last_outcome = Some(RunOutcome::Completed);
        text
    }

    fn finish_interrupted(&mut self, trace_id: &str) -> String {
        info!("Agent run {trace_id} interrupted");
        self.history
            .add_assistant_turn(vec![ContentBlock::text(INTERRUPTED_MESSAGE)]);
        self.emit(
            EventKind::AgentResponseInterrupted,
            json!({ "text": INTERRUPTED_MESSAGE }),
        );
        self.last_outcome = Some(RunOutcome::Interrupted);
        INTERRUPTED_MESSAGE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::{CompositeEventHandler, FnEventHandler};
    use crate::agent::policy::{ReviewPolicy, TaskPolicy};
    use crate::context::ContextConfig;
    use crate::test_support::{RecordingHandler, ScriptedModel};
    use crate::tools::{CompleteTool, FnTool, SubmitReviewTool, ToolError};
    use crate::{Role, ToolDef, Turn};
    use std::sync::atomic::AtomicUsize;

    fn call(id: &str, name: &str, args: &str) -> Vec<ContentBlock> {
        vec![ContentBlock::tool_call(id, name, args)]
    }

    fn noop_tool() -> FnTool {
        FnTool::new(
            ToolDef::new("noop", "Does nothing", serde_json::json!({})),
            |_: serde_json::Value| async { Ok(ToolOutput::text("nothing happened")) },
        )
    }

    fn agent(model: &Arc<ScriptedModel>, tools: ToolRegistry) -> Agent {
        Agent::new(model.clone(), tools, TaskPolicy, AgentConfig::new("be helpful"))
    }

    #[tokio::test]
    async fn text_reply_completes_the_run() {
        let model = ScriptedModel::blocks(vec![vec![
            ContentBlock::thinking("easy"),
            ContentBlock::text("Paris"),
        ]]);
        let events = RecordingHandler::new();
        let mut agent = agent(&model, ToolRegistry::new()).with_event_handler(events.clone());

        let out = agent.run("Capital of France?", &[]).await.unwrap();
        assert_eq!(out, "Paris");
        assert_eq!(agent.last_outcome(), Some(RunOutcome::Completed));
        assert_eq!(
            events.kinds(),
            vec![
                EventKind::UserMessage,
                EventKind::AgentThinking,
                EventKind::AgentResponse
            ]
        );
        let requests = model.requests();
        let req = &requests[0];
        assert_eq!(req.system_prompt, "be helpful");
        assert_eq!(req.max_tokens, 8_192);
    }

    #[tokio::test]
    async fn empty_response_becomes_completion_notice() {
        let model = ScriptedModel::blocks(vec![Vec::new()]);
        let mut agent = agent(&model, ToolRegistry::new());

        let out = agent.run("do it", &[]).await.unwrap();
        assert_eq!(out, "Completed the task.");
        let last = agent.history().turns().last().unwrap();
        assert_eq!(last.blocks, vec![ContentBlock::text("Completed the task.")]);
    }

    #[tokio::test]
    async fn two_tool_calls_in_one_turn_is_an_error() {
        let model = ScriptedModel::blocks(vec![vec![
            ContentBlock::tool_call("a", "noop", "{}"),
            ContentBlock::tool_call("b", "noop", "{}"),
        ]]);
        let mut agent = agent(&model, ToolRegistry::new().with(noop_tool()));

        let err = agent.run("go", &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::MultipleToolCalls { count: 2 }));
        assert_eq!(err.to_string(), "only one tool call per turn is supported");
    }

    #[tokio::test]
    async fn duplicate_tool_names_are_rejected_before_any_call() {
        let model = ScriptedModel::texts(&["unused"]);
        let tools = ToolRegistry::new().with(noop_tool()).with(noop_tool());
        let mut agent = agent(&model, tools);

        let err = agent.run("go", &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(ref n) if n == "noop"));
        assert_eq!(model.calls(), 0);
        assert!(agent.history().is_empty());
    }

    #[tokio::test]
    async fn tool_result_flows_back_to_the_model() {
        let model = ScriptedModel::blocks(vec![
            call("c1", "noop", "{}"),
            vec![ContentBlock::text("all done")],
        ]);
        let events = RecordingHandler::new();
        let mut agent =
            agent(&model, ToolRegistry::new().with(noop_tool())).with_event_handler(events.clone());

        assert_eq!(agent.run("go", &[]).await.unwrap(), "all done");
        let requests = model.requests();
        let second = &requests[1];
        assert_eq!(second.tool_names, vec!["noop"]);
        assert_eq!(
            second.turns.last().unwrap().blocks,
            vec![ContentBlock::tool_result("c1", "noop", "nothing happened")]
        );

        let tool_result = events
            .events()
            .into_iter()
            .find(|e| e.kind == EventKind::ToolResult)
            .unwrap();
        assert_eq!(tool_result.field("output"), Some("nothing happened"));
        assert_eq!(tool_result.payload["is_final"], false);
    }

    #[tokio::test]
    async fn tool_errors_become_results_and_the_loop_continues() {
        let broken = FnTool::new(
            ToolDef::new("broken", "Fails", serde_json::json!({})),
            |_: serde_json::Value| async { Err(ToolError::Failed("disk on fire".into())) },
        );
        let model = ScriptedModel::blocks(vec![
            call("c1", "broken", "{}"),
            vec![ContentBlock::text("gave up")],
        ]);
        let mut agent = agent(&model, ToolRegistry::new().with(broken));

        assert_eq!(agent.run("go", &[]).await.unwrap(), "gave up");
        assert_eq!(
            model.requests()[1].turns.last().unwrap().blocks,
            vec![ContentBlock::tool_result(
                "c1",
                "broken",
                "Error executing tool: disk on fire"
            )]
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model() {
        let model = ScriptedModel::blocks(vec![
            call("c1", "missing", "{}"),
            vec![ContentBlock::text("ok")],
        ]);
        let mut agent = agent(&model, ToolRegistry::new());
        agent.run("go", &[]).await.unwrap();
        let requests = model.requests();
        let turns = &requests[1].turns;
        assert!(matches!(
            &turns.last().unwrap().blocks[0],
            ContentBlock::ToolResult { output, .. } if output == "Error executing tool: unknown tool 'missing'"
        ));
    }

    #[tokio::test]
    async fn max_turns_bounds_model_calls() {
        let model = ScriptedModel::repeating(call("c", "noop", "{}"));
        let config = AgentConfig::new("p").with_max_turns(4);
        let mut agent = Agent::new(
            model.clone(),
            ToolRegistry::new().with(noop_tool()),
            TaskPolicy,
            config,
        );

        let out = agent.run("loop forever", &[]).await.unwrap();
        assert_eq!(out, "Agent did not complete after max turns");
        assert_eq!(model.calls(), 4);
        assert_eq!(agent.last_outcome(), Some(RunOutcome::Exhausted));
    }

    #[tokio::test]
    async fn final_tool_result_ends_the_run() {
        let model = ScriptedModel::blocks(vec![call("c1", "complete", r#"{"result": "42"}"#)]);
        let mut agent = agent(&model, ToolRegistry::new().with(CompleteTool));

        assert_eq!(agent.run("answer", &[]).await.unwrap(), "42");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn cancel_before_first_call_interrupts() {
        let model = ScriptedModel::texts(&["never sent"]);
        let events = RecordingHandler::new();
        let agent = agent(&model, ToolRegistry::new());
        let handle = agent.cancel_handle();
        let handler = CompositeEventHandler::new()
            .with(events.clone())
            .with(FnEventHandler::new(move |e: &AgentEvent| {
                if e.kind == EventKind::UserMessage {
                    handle.cancel();
                }
            }));
        let mut agent = agent.with_event_handler(handler);

        let out = agent.run("go", &[]).await.unwrap();
        assert_eq!(out, "Agent interrupted by user");
        assert_eq!(model.calls(), 0);
        assert_eq!(agent.last_outcome(), Some(RunOutcome::Interrupted));
        assert_eq!(
            events.kinds().last(),
            Some(&EventKind::AgentResponseInterrupted)
        );
        assert_eq!(
            agent.history().turns().last().unwrap().text(),
            "Agent interrupted by user"
        );
    }

    #[tokio::test]
    async fn cancel_during_tool_call_skips_the_tool() {
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        let counting = FnTool::new(
            ToolDef::new("count", "Counts", serde_json::json!({})),
            move |_: serde_json::Value| {
                let r = r.clone();
                async move {
                    r.fetch_add(1, Ordering::SeqCst);
                    Ok(ToolOutput::text("ran"))
                }
            },
        );
        let model = ScriptedModel::blocks(vec![call("c1", "count", "{}")]);
        let agent = agent(&model, ToolRegistry::new().with(counting));
        let handle = agent.cancel_handle();
        let mut agent = agent.with_event_handler(FnEventHandler::new(move |e: &AgentEvent| {
            if e.kind == EventKind::ToolCall {
                handle.cancel();
            }
        }));

        assert_eq!(agent.run("go", &[]).await.unwrap(), INTERRUPTED_MESSAGE);
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        let turns = agent.history().turns();
        let n = turns.len();
        assert_eq!(
            turns[n - 2].blocks,
            vec![ContentBlock::tool_result(
                "c1",
                "count",
                "Tool execution interrupted by user."
            )]
        );
        assert_eq!(turns[n - 1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn next_run_clears_a_stale_cancel() {
        let model = ScriptedModel::texts(&["fine"]);
        let mut agent = agent(&model, ToolRegistry::new());
        agent.cancel();
        assert_eq!(agent.run("go", &[]).await.unwrap(), "fine");
    }

    #[tokio::test]
    async fn clear_resets_history_and_cancellation() {
        let model = ScriptedModel::texts(&["done"]);
        let mut agent = agent(&model, ToolRegistry::new());
        agent.run("first", &[]).await.unwrap();
        agent.cancel();

        agent.clear();
        assert!(agent.history().is_empty());
        assert!(!agent.cancel_handle().is_cancelled());
        assert_eq!(agent.last_outcome(), None);
    }

    #[tokio::test]
    async fn model_errors_surface() {
        let model = ScriptedModel::failing();
        let mut agent = agent(&model, ToolRegistry::new());
        let err = agent.run("go", &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Generate(_)));
    }

    #[tokio::test]
    async fn reviewer_restates_verdict_with_tool_calls_disabled() {
        let model = ScriptedModel::blocks(vec![
            call(
                "r1",
                "submit_review",
                r#"{"verdict": "approve", "feedback": "looks right"}"#,
            ),
            vec![
                ContentBlock::thinking("summarize"),
                ContentBlock::text("Approved: the change is correct."),
            ],
        ]);
        let mut agent = Agent::new(
            model.clone(),
            ToolRegistry::new().with(SubmitReviewTool),
            ReviewPolicy::new(),
            AgentConfig::new("review").with_max_turns(1),
        );

        let out = agent.run("review this diff", &[]).await.unwrap();
        assert_eq!(out, "Approved: the change is correct.");
        assert_eq!(model.calls(), 2);

        let requests = model.requests();
        let follow_up = &requests[1];
        assert_eq!(follow_up.tool_names, vec!["submit_review"]);
        assert_eq!(follow_up.tool_choice, ToolChoice::None);
        assert_eq!(requests[0].tool_choice, ToolChoice::Auto);
        assert!(follow_up.turns.last().unwrap().is_user_prompt());
        assert_eq!(
            agent.history().last_assistant_text(),
            "Approved: the change is correct."
        );
    }

    #[tokio::test]
    async fn reviewer_falls_back_to_tool_output() {
        let model = ScriptedModel::blocks(vec![
            call(
                "r1",
                "submit_review",
                r#"{"verdict": "request_changes", "feedback": "no tests"}"#,
            ),
            vec![ContentBlock::tool_call("x", "submit_review", "{}")],
        ]);
        let mut agent = Agent::new(
            model.clone(),
            ToolRegistry::new().with(SubmitReviewTool),
            ReviewPolicy::new(),
            AgentConfig::new("review"),
        );

        let out = agent.run("review", &[]).await.unwrap();
        assert_eq!(out, "Review submitted: request_changes\n\nno tests");
        assert!(agent.history().get_pending_tool_calls().is_empty());
    }

    #[tokio::test]
    async fn reviewer_ignores_final_flag_of_other_tools() {
        let model = ScriptedModel::blocks(vec![
            call("c1", "complete", r#"{"result": "done"}"#),
            vec![ContentBlock::text("still reviewing")],
        ]);
        let mut agent = Agent::new(
            model.clone(),
            ToolRegistry::new().with(CompleteTool).with(SubmitReviewTool),
            ReviewPolicy::new(),
            AgentConfig::new("review"),
        );
        assert_eq!(agent.run("review", &[]).await.unwrap(), "still reviewing");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn failed_verdict_call_does_not_end_the_review() {
        let model = ScriptedModel::blocks(vec![
            call("r1", "submit_review", "{}"),
            call(
                "r2",
                "submit_review",
                r#"{"verdict": "approve", "feedback": "fine"}"#,
            ),
            vec![ContentBlock::text("Approved.")],
        ]);
        let mut agent = Agent::new(
            model.clone(),
            ToolRegistry::new().with(SubmitReviewTool),
            ReviewPolicy::new(),
            AgentConfig::new("review"),
        );

        assert_eq!(agent.run("review", &[]).await.unwrap(), "Approved.");
        assert_eq!(model.calls(), 3);

        let requests = model.requests();
        let after_failure = requests[1].turns.last().unwrap();
        assert_eq!(after_failure.role, Role::ToolResult);
        assert!(matches!(
            &after_failure.blocks[0],
            ContentBlock::ToolResult { id, output, .. }
                if id == "r1" && output.starts_with("Error executing tool:")
        ));
        assert_eq!(requests[1].tool_choice, ToolChoice::Auto);
        assert_eq!(requests[2].tool_choice, ToolChoice::None);
    }

    #[tokio::test]
    async fn history_carries_over_between_runs() {
        let model = ScriptedModel::texts(&["first", "second"]);
        let mut agent = agent(&model, ToolRegistry::new());
        agent.run("one", &[]).await.unwrap();
        agent.run("two", &[]).await.unwrap();

        assert_eq!(agent.history().len(), 4);
        assert_eq!(model.requests()[1].turns.len(), 3);

        agent.clear();
        assert!(agent.history().is_empty());
        assert_eq!(agent.last_outcome(), None);
    }

    #[tokio::test]
    async fn attachments_reach_the_model_as_images() {
        let model = ScriptedModel::texts(&["a cat"]);
        let mut agent = agent(&model, ToolRegistry::new());
        agent
            .run("what is this?", &[Attachment::new("image/png", vec![1, 2, 3])])
            .await
            .unwrap();
        let requests = model.requests();
        let first = &requests[0].turns[0];
        assert!(matches!(first.blocks[1], ContentBlock::Image { .. }));
    }

    #[tokio::test]
    async fn oversized_history_is_truncated_before_the_call() {
        // summary reply first, then the answer
        let model = ScriptedModel::texts(&["earlier chatter", "answer"]);
        let seed: Vec<Turn> = (0..8)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::user(format!("q{i}"))
                } else {
                    Turn::assistant(format!("a{i}"))
                }
            })
            .collect();
        let config = AgentConfig::new("p").with_context(ContextConfig::default().with_max_size(8));
        let mut agent = Agent::new(model.clone(), ToolRegistry::new(), TaskPolicy, config)
            .with_history(MessageHistory::from_turns(seed));

        assert_eq!(agent.run("next", &[]).await.unwrap(), "answer");
        let requests = model.requests();
        assert_eq!(requests[0].temperature, Some(0.0));

        // 9 turns, target 4: head, summary, 2-turn tail
        let sent = &requests[1].turns;
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].text(), "q0");
        assert!(sent[1].summary);
        assert_eq!(sent[3].text(), "next");
    }
}
