//! Events and handlers for the [`Agent`](super::Agent) loop.
//!
//! The loop reports what it does through [`AgentEvent`]s: a [`EventKind`]
//! tag, a JSON payload and a UTC timestamp. Delivery is best effort and never
//! blocks the loop; a handler that cannot keep up loses events rather than
//! stalling a run.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`ChannelHandler`] | Forward events to another task over a bounded channel |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |
//!
//! # Payloads
//!
//! | Kind | Payload fields |
//! |------|----------------|
//! | `user_message` | `trace_id`, `text`, `attachments` |
//! | `agent_thinking` | `text` |
//! | `tool_call` | `id`, `name`, `args` |
//! | `tool_result` | `id`, `name`, `output`, `is_final` |
//! | `agent_response` | `text` |
//! | `agent_response_interrupted` | `text` |

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserMessage,
    AgentResponse,
    AgentThinking,
    ToolCall,
    ToolResult,
    AgentResponseInterrupted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::UserMessage => "user_message",
            EventKind::AgentResponse => "agent_response",
            EventKind::AgentThinking => "agent_thinking",
            EventKind::ToolCall => "tool_call",
            EventKind::ToolResult => "tool_result",
            EventKind::AgentResponseInterrupted => "agent_response_interrupted",
        };
        f.write_str(s)
    }
}

/// One observable step of a run.
#[derive(Serialize, Debug, Clone)]
pub struct AgentEvent {
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// A string field of the payload.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

// ── Handlers ───────────────────────────────────────────────────────

/// Receives agent events.
///
/// Called synchronously from the loop, so implementations must return
/// quickly. Anything slow belongs behind a [`ChannelHandler`].
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &AgentEvent) {
        let _ = event;
    }
}

impl<T: EventHandler + ?Sized> EventHandler for Arc<T> {
    fn on_event(&self, event: &AgentEvent) {
        (**self).on_event(event);
    }
}

/// Ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if event.kind == EventKind::AgentResponse {
///         println!("{}", event.field("text").unwrap_or_default());
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&AgentEvent) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&AgentEvent) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&AgentEvent) + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent) {
        (self.0)(event);
    }
}

/// Dispatches every event to each inner handler in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_opt(events_tx.map(ChannelHandler::new));
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add `handler` only when `condition` is `true`.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &AgentEvent) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Forwards events to a bounded `tokio` channel without blocking.
///
/// A full channel drops the event. A closed channel marks the handler dead:
/// one warning is logged and every later event is dropped.
pub struct ChannelHandler {
    tx: mpsc::Sender<AgentEvent>,
    dead: AtomicBool,
}

impl ChannelHandler {
    pub fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self {
            tx,
            dead: AtomicBool::new(false),
        }
    }

    /// A handler plus the receiving end of a fresh channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Relaxed)
    }
}

impl EventHandler for ChannelHandler {
    fn on_event(&self, event: &AgentEvent) {
        if self.is_dead() {
            return;
        }
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                debug!("Event channel full; dropped {} event", dropped.kind);
            }
            Err(TrySendError::Closed(_)) => {
                if !self.dead.swap(true, Ordering::Relaxed) {
                    warn!("Event channel closed; further events will be dropped");
                }
            }
        }
    }
}

/// Logs events via `tracing`.
pub struct LoggingHandler;

fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if out.len() < text.len() {
        out.push_str("...");
    }
    out
}

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &AgentEvent) {
        let text = |key: &str| event.field(key).unwrap_or_default();
        match event.kind {
            EventKind::UserMessage => {
                info!(
                    "[{}] user: {}",
                    text("trace_id"),
                    preview(text("text"), 200)
                );
            }
            EventKind::AgentThinking => {
                debug!("LLM reasoning: {}", preview(text("text"), 200));
            }
            EventKind::ToolCall => {
                debug!("Executing tool: {}", text("name"));
            }
            EventKind::ToolResult => {
                debug!(
                    "Tool {} result: {} bytes",
                    text("name"),
                    text("output").len()
                );
            }
            EventKind::AgentResponse => {
                info!("Agent finished: {}", preview(text("text"), 200));
            }
            EventKind::AgentResponseInterrupted => {
                info!("Agent interrupted");
            }
        }
    }
}
