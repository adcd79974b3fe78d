//! Configuration for the [`Agent`](super::Agent).
//!
//! ```ignore
//! let config = AgentConfig::new("You are a careful assistant.")
//!     .with_max_turns(20)
//!     .with_max_output_tokens(4096)
//!     .with_token_budget(100_000);
//! ```
//!
//! Context-window settings live in [`ContextConfig`]; replace them wholesale
//! with [`AgentConfig::with_context`].

use crate::context::ContextConfig;

/// Default turn ceiling for one run.
pub const DEFAULT_MAX_TURNS: u32 = 30;

/// Default output-token ceiling for one completion.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8_192;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub system_prompt: String,
    /// Model calls allowed per run, not counting a policy follow-up.
    pub max_turns: u32,
    pub max_output_tokens: u32,
    /// `None` leaves sampling temperature to the provider.
    pub temperature: Option<f32>,
    pub context: ContextConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_turns: DEFAULT_MAX_TURNS,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: None,
            context: ContextConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns = turns;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Shorthand for setting `context.token_budget`.
    pub fn with_token_budget(mut self, tokens: usize) -> Self {
        self.context.token_budget = tokens;
        self
    }

    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AgentConfig::new("be brief");
        assert_eq!(config.system_prompt, "be brief");
        assert_eq!(config.max_turns, 30);
        assert_eq!(config.max_output_tokens, 8_192);
        assert_eq!(config.temperature, None);
        assert_eq!(config.context.keep_first, 1);
    }

    #[test]
    fn builders_preserve_other_fields() {
        let config = AgentConfig::new("p")
            .with_context(ContextConfig::default().with_max_size(10))
            .with_token_budget(500)
            .with_max_turns(3)
            .with_temperature(0.2);
        assert_eq!(config.context.max_size, 10);
        assert_eq!(config.context.token_budget, 500);
        assert_eq!(config.max_turns, 3);
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.system_prompt, "p");
    }
}
