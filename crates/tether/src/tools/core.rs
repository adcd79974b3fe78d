//! Tool contract for the agent loop.
//!
//! The [`Tool`] trait defines what every tool provides: a static API
//! definition (name, description, JSON Schema) and an async `run` that
//! receives the raw JSON arguments plus a read-only view of the conversation.
//! Tools are collected into a [`ToolRegistry`] which handles dispatch,
//! validation, timeouts and result truncation.

use crate::{ToolDef, Turn};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Boxed future returned by [`Tool::run`].
pub type ToolFuture<'a> = BoxFuture<'a, Result<ToolOutput, ToolError>>;

// ── Output and errors ──────────────────────────────────────────────

/// What a tool hands back to the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    /// Set by tools whose result is the agent's answer.
    pub is_final: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    /// A result that ends the run under [`TaskPolicy`](crate::agent::TaskPolicy).
    pub fn final_answer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Why a tool produced no output. The loop reports these to the model as
/// text and keeps going.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("{0}")]
    Failed(String),

    #[error("tool '{tool}' timed out after {} seconds", .limit.as_secs())]
    Timeout { tool: String, limit: Duration },
}

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool that an LLM agent can invoke via function-calling.
///
/// # Example
///
/// ```ignore
/// struct WordCount;
///
/// impl Tool for WordCount {
///     fn definition(&self) -> ToolDef { /* ... */ }
///
///     fn run<'a>(&'a self, args: &'a str, _history: &'a [Turn]) -> ToolFuture<'a> {
///         Box::pin(async move {
///             let args: WordCountArgs = parse_tool_args(self.name(), args)?;
///             Ok(ToolOutput::text(args.text.split_whitespace().count().to_string()))
///         })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition sent to the model.
    fn definition(&self) -> ToolDef;

    /// Run with the raw JSON arguments string. `history` is the conversation
    /// up to and including the assistant turn that made the call.
    fn run<'a>(&'a self, args: &'a str, history: &'a [Turn]) -> ToolFuture<'a>;

    /// The tool's name (delegates to the definition).
    fn name(&self) -> String {
        self.definition().name
    }
}

// ── ToolRegistry ───────────────────────────────────────────────────

/// Default timeout for tool execution when one is enabled.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// The tool catalog for one agent.
///
/// Registration order is preserved and is the order definitions are offered
/// to the model. Registering two tools with the same name is allowed here
/// but rejected by the agent when a run starts.
///
/// ```ignore
/// let tools = ToolRegistry::new()
///     .with_max_result_bytes(15_000)
///     .with_arg_validation(true)
///     .with_default_timeout(Some(Duration::from_secs(30)))
///     .with(CompleteTool)
///     .with_if(reviewing, SubmitReviewTool);
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    max_result_bytes: usize,
    validate_args: bool,
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("max_result_bytes", &self.max_result_bytes)
            .field("validate_args", &self.validate_args)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: false,
            default_timeout: None,
        }
    }

    /// Set the maximum result size in bytes before truncation.
    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    /// Validate arguments against each tool's JSON Schema before running it.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Bound every tool run. `None` disables timeouts.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.push(Box::new(tool));
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Register a tool only when `condition` is `true`.
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The first name registered more than once, if any.
    pub fn duplicate_name(&self) -> Option<String> {
        let mut seen = std::collections::HashSet::new();
        self.tools
            .iter()
            .map(|t| t.name())
            .find(|name| !seen.insert(name.clone()))
    }

    fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Dispatch a call by name with optional validation, timing, timeout
    /// and truncation of the output text.
    pub async fn execute(
        &self,
        name: &str,
        args: &str,
        history: &[Turn],
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        if self.validate_args {
            validate_tool_arguments(tool, args)?;
        }

        log_tool_call(name, args);
        let start = std::time::Instant::now();

        let result = match self.default_timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.run(args, history)).await {
                Ok(r) => r,
                Err(_) => {
                    info!(
                        "Tool {name} timed out after {:.1}s (limit: {:.0}s)",
                        start.elapsed().as_secs_f64(),
                        limit.as_secs_f64(),
                    );
                    Err(ToolError::Timeout {
                        tool: name.to_string(),
                        limit,
                    })
                }
            },
            None => tool.run(args, history).await,
        };

        let mut output = result?;
        debug!(
            "Tool {name} completed in {:.0}ms ({} bytes)",
            start.elapsed().as_secs_f64() * 1000.0,
            output.text.len()
        );
        trace!(
            "Tool {name} result preview: {}",
            output.text.chars().take(300).collect::<String>()
        );

        output.text = truncate_result(output.text, self.max_result_bytes);
        Ok(output)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── FnTool ────────────────────────────────────────────────────────

type ErasedToolHandler =
    Box<dyn Fn(String) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync>;

/// A closure-based tool that auto-parses its arguments.
///
/// For tools that need shared state or the conversation view, implement
/// [`Tool`] directly.
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct AddArgs { a: i64, b: i64 }
///
/// let add = FnTool::new(
///     ToolDef::new("add", "Add two integers", json_schema_for::<AddArgs>()),
///     |args: AddArgs| async move { Ok(ToolOutput::text((args.a + args.b).to_string())) },
/// );
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        let name = def.name.clone();
        let erased = move |raw: String| -> BoxFuture<'static, Result<ToolOutput, ToolError>> {
            match parse_tool_args::<A>(&name, &raw) {
                Ok(args) => Box::pin(handler(args)),
                Err(e) => Box::pin(async move { Err(e) }),
            }
        };

        Self {
            def,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn run<'a>(&'a self, args: &'a str, _history: &'a [Turn]) -> ToolFuture<'a> {
        (self.handler)(args.to_string())
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.name)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Parse raw JSON arguments into a typed struct.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(
    tool: &str,
    args: &str,
) -> Result<T, ToolError> {
    serde_json::from_str(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Validate arguments against the tool's declared JSON Schema.
///
/// An invalid schema skips validation.
pub fn validate_tool_arguments(tool: &dyn Tool, args: &str) -> Result<(), ToolError> {
    let name = tool.name();
    let value: serde_json::Value = serde_json::from_str(args).map_err(|e| {
        ToolError::InvalidArguments {
            tool: name.clone(),
            message: format!("not valid JSON: {e}"),
        }
    })?;

    let schema = tool.definition().parameters;
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return Ok(());
    };

    let errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| format!("{}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments {
            tool: name,
            message: errors.join("; "),
        })
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, args: &str) {
    let preview: String = args.chars().take(120).collect();
    info!(
        "[tool] {name}({preview}{})",
        if preview.len() < args.len() { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {args}");
}

/// Truncate to at most `max` bytes on a char boundary, appending a notice.
pub fn truncate_result(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let total = s.len();
    let cut = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    s.truncate(cut);
    s.push_str(&format!("...\n[truncated: {total} bytes total]"));
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        text: String,
    }

    fn echo() -> FnTool {
        FnTool::new(
            ToolDef::new("echo", "Echo the input", crate::json_schema_for::<EchoArgs>()),
            |args: EchoArgs| async move { Ok(ToolOutput::text(args.text)) },
        )
    }

    fn fail() -> FnTool {
        FnTool::new(
            ToolDef::new(
                "fail",
                "Always fails",
                serde_json::json!({"type": "object", "properties": {}}),
            ),
            |_: serde_json::Value| async { Err(ToolError::Failed("intentional failure".into())) },
        )
    }

    struct HistoryLen;

    impl Tool for HistoryLen {
        fn definition(&self) -> ToolDef {
            ToolDef::new("history_len", "Count turns", serde_json::json!({}))
        }

        fn run<'a>(&'a self, _args: &'a str, history: &'a [Turn]) -> ToolFuture<'a> {
            Box::pin(async move { Ok(ToolOutput::text(history.len().to_string())) })
        }
    }

    #[test]
    fn definitions_keep_registration_order() {
        let set = ToolRegistry::new().with(fail()).with(echo());
        let names: Vec<String> = set.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["fail", "echo"]);
    }

    #[test]
    fn duplicate_names_are_reported() {
        assert_eq!(ToolRegistry::new().with(echo()).duplicate_name(), None);
        let set = ToolRegistry::new().with(echo()).with(fail()).with(echo());
        assert_eq!(set.duplicate_name().as_deref(), Some("echo"));
    }

    #[test]
    fn with_if_false_skips_tool() {
        let set = ToolRegistry::new().with_if(false, echo()).with_if(true, fail());
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn execute_known_tool() {
        let set = ToolRegistry::new().with(echo());
        let out = set.execute("echo", r#"{"text": "hello"}"#, &[]).await.unwrap();
        assert_eq!(out, ToolOutput::text("hello"));
    }

    #[tokio::test]
    async fn execute_unknown_tool() {
        let set = ToolRegistry::new().with(echo());
        let err = set.execute("nope", "{}", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "unknown tool 'nope'");
    }

    #[tokio::test]
    async fn tool_failures_are_errors() {
        let set = ToolRegistry::new().with(fail());
        let err = set.execute("fail", "{}", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "intentional failure");
    }

    #[tokio::test]
    async fn bad_json_is_invalid_arguments() {
        let set = ToolRegistry::new().with(echo());
        let err = set.execute("echo", "not json", &[]).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { ref tool, .. } if tool == "echo"));
    }

    #[tokio::test]
    async fn schema_validation_rejects_missing_field() {
        let set = ToolRegistry::new().with_arg_validation(true).with(echo());
        let err = set.execute("echo", r#"{"txt": 1}"#, &[]).await.unwrap_err();
        match err {
            ToolError::InvalidArguments { message, .. } => assert!(message.contains("text")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tools_see_the_conversation() {
        let set = ToolRegistry::new().with(HistoryLen);
        let history = [Turn::user("a"), Turn::assistant("b")];
        let out = set.execute("history_len", "{}", &history).await.unwrap();
        assert_eq!(out.text, "2");
    }

    #[tokio::test]
    async fn slow_tools_time_out() {
        let slow = FnTool::new(
            ToolDef::new("slow", "Sleeps", serde_json::json!({})),
            |_: serde_json::Value| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ToolOutput::text("late"))
            },
        );
        let set = ToolRegistry::new()
            .with_default_timeout(Some(Duration::from_millis(10)))
            .with(slow);
        let err = set.execute("slow", "{}", &[]).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn long_results_are_truncated() {
        let big = FnTool::new(
            ToolDef::new("big", "Big output", serde_json::json!({})),
            |_: serde_json::Value| async { Ok(ToolOutput::final_answer("a".repeat(200))) },
        );
        let set = ToolRegistry::new().with_max_result_bytes(50).with(big);
        let out = set.execute("big", "{}", &[]).await.unwrap();
        assert!(out.text.contains("[truncated: 200 bytes total]"));
        assert!(out.is_final);
    }

    #[test]
    fn truncate_short_unchanged() {
        assert_eq!(truncate_result("hello".into(), 100), "hello");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let out = truncate_result("aé".repeat(10), 4);
        assert!(out.starts_with("aéa..."));
        assert!(out.contains("[truncated: 30 bytes total]"));
    }
}
