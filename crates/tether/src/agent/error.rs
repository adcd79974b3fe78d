use crate::api::GenerateError;
use thiserror::Error;

/// Failures that end a run without a result.
///
/// Tool failures are not here: they become tool results the model can react
/// to. Interruption and turn exhaustion are normal outcomes, not errors.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model asked for more than one tool call in a single turn.
    #[error("only one tool call per turn is supported")]
    MultipleToolCalls { count: usize },

    /// Two registered tools share a name.
    #[error("duplicate tool name '{0}' in tool registry")]
    DuplicateTool(String),

    /// The completion request failed after the client's own retries.
    #[error("model request failed: {0}")]
    Generate(#[from] GenerateError),
}
