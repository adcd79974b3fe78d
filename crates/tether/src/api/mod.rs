//! The model boundary.
//!
//! Everything between the agent loop and a model provider goes through the
//! [`Generate`] trait. The loop never sees a provider's wire format.
//!
//! - [`openrouter`]: a [`Generate`] adapter for the OpenRouter chat
//!   completions API.
//! - [`retry`]: exponential backoff for transient provider failures.
//! - [`trace`]: correlation IDs for runs and turns.

pub mod openrouter;
pub mod retry;
pub mod trace;

use crate::{ContentBlock, ToolDef, Turn};
use futures::future::BoxFuture;
use thiserror::Error;

pub use openrouter::OpenRouterClient;
pub use retry::RetryConfig;
pub use trace::{generate_span_id, generate_trace_id};

/// Whether the model may call tools in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    /// Tools stay visible, so earlier tool turns remain valid, but the
    /// model must answer in text.
    None,
}

/// One completion request.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub turns: &'a [Turn],
    pub tools: &'a [ToolDef],
    pub system_prompt: &'a str,
    pub max_tokens: u32,
    /// `None` leaves sampling temperature to the provider.
    pub temperature: Option<f32>,
    pub tool_choice: ToolChoice,
}

/// Failure reported by a [`Generate`] implementation.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("provider error: {0}")]
    Provider(String),
}

impl GenerateError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, 5xx responses, timeouts and connection failures are
    /// transient. Client errors and malformed responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerateError::Http { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            GenerateError::Transport(e) => e.is_timeout() || e.is_connect(),
            GenerateError::Decode(_) | GenerateError::Provider(_) => false,
        }
    }
}

/// The sole LLM capability the loop consumes.
///
/// Implementations own their own timeouts and retries. The returned blocks
/// are appended to history as one assistant turn.
pub trait Generate: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: GenerateRequest<'a>,
    ) -> BoxFuture<'a, Result<Vec<ContentBlock>, GenerateError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_statuses_classified() {
        let transient = GenerateError::Http {
            status: 429,
            body: "rate limited".into(),
        };
        let permanent = GenerateError::Http {
            status: 401,
            body: "unauthorized".into(),
        };
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
    }

    #[test]
    fn provider_errors_are_permanent() {
        assert!(!GenerateError::Provider("context length exceeded".into()).is_transient());
    }

    #[test]
    fn error_messages_carry_status() {
        let e = GenerateError::Http {
            status: 503,
            body: "overloaded".into(),
        };
        assert_eq!(e.to_string(), "provider returned HTTP 503: overloaded");
    }
}
