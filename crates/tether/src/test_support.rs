//! Test doubles shared by the unit tests.

use crate::agent::events::{AgentEvent, EventHandler, EventKind};
use crate::api::{Generate, GenerateError, GenerateRequest, ToolChoice};
use crate::{ContentBlock, Turn};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// What a [`ScriptedModel`] saw in one request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub turns: Vec<Turn>,
    pub tool_names: Vec<String>,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub tool_choice: ToolChoice,
}

type Reply = Result<Vec<ContentBlock>, GenerateError>;

/// A [`Generate`] that replays a fixed script of replies.
///
/// Once the script is exhausted it repeats `fallback`, or fails with a
/// provider error when there is none.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Reply>>,
    fallback: Option<Vec<ContentBlock>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// One text reply per entry.
    pub fn texts(replies: &[&str]) -> Arc<Self> {
        Self::new(
            replies
                .iter()
                .map(|t| Ok(vec![ContentBlock::text(*t)]))
                .collect(),
        )
    }

    /// One reply per entry, each a list of blocks.
    pub fn blocks(replies: Vec<Vec<ContentBlock>>) -> Arc<Self> {
        Self::new(replies.into_iter().map(Ok).collect())
    }

    /// Every call fails.
    pub fn failing() -> Arc<Self> {
        Self::new(Vec::new())
    }

    /// Every call returns `reply`.
    pub fn repeating(reply: Vec<ContentBlock>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(reply),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Generate for ScriptedModel {
    fn generate<'a>(
        &'a self,
        request: GenerateRequest<'a>,
    ) -> BoxFuture<'a, Result<Vec<ContentBlock>, GenerateError>> {
        self.requests.lock().unwrap().push(RecordedRequest {
            turns: request.turns.to_vec(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            system_prompt: request.system_prompt.to_string(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tool_choice: request.tool_choice,
        });
        let reply = self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            self.fallback
                .clone()
                .ok_or_else(|| GenerateError::Provider("script exhausted".into()))
        });
        Box::pin(async move { reply })
    }
}

/// Collects every event it receives.
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<AgentEvent>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<AgentEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }
}

impl EventHandler for RecordingHandler {
    fn on_event(&self, event: &AgentEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
