//! Agent runtime: the [`Agent`] loop and its supporting modules.
//!
//! - [`engine::Agent`]: the single-tool-call-per-turn loop. Start here.
//! - [`config::AgentConfig`]: system prompt, turn and token ceilings, and the
//!   context-window settings.
//! - [`policy`]: [`Policy`] trait with [`TaskPolicy`] and [`ReviewPolicy`].
//! - [`events`]: [`EventHandler`] trait and [`AgentEvent`] for observing the
//!   loop. Includes [`LoggingHandler`], [`ChannelHandler`],
//!   [`CompositeEventHandler`] and [`FnEventHandler`].
//! - [`error`]: [`AgentError`].

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod policy;

pub use config::AgentConfig;
pub use engine::{
    Agent, CancelHandle, EMPTY_RESPONSE_FALLBACK, EXHAUSTED_MESSAGE, INTERRUPTED_MESSAGE,
    RunOutcome, TOOL_INTERRUPTED_MESSAGE,
};
pub use error::AgentError;
pub use events::{
    AgentEvent, ChannelHandler, CompositeEventHandler, EventHandler, EventKind, FnEventHandler,
    LoggingHandler, NoopHandler,
};
pub use policy::{Policy, ReviewPolicy, TaskPolicy};
