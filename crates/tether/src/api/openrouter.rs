//! [`Generate`] adapter for the OpenRouter chat completions API.
//!
//! Turns are mapped onto OpenAI-style chat messages: user turns become `user`
//! messages (with `image_url` parts for images), assistant turns become
//! `assistant` messages carrying at most one `tool_calls` entry, and every
//! `ToolResult` block becomes its own `tool` message. Thinking blocks are not
//! sent back; the provider's `reasoning` field comes back as a `Thinking`
//! block.

use super::retry::{RetryConfig, with_retry};
use super::{Generate, GenerateError, GenerateRequest, ToolChoice};
use crate::{ContentBlock, Role, ToolDef, Turn};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Model used when the caller doesn't pick one.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn new(role: &'static str, content: Option<WireContent>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
struct WireImageUrl {
    url: String,
}

#[derive(Serialize, Debug)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolDef,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
    reasoning: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

#[derive(Deserialize, Debug, Clone)]
struct UsageInfo {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

// ── Mapping ────────────────────────────────────────────────────────

fn to_wire_messages(system_prompt: &str, turns: &[Turn]) -> Vec<WireMessage> {
    let mut out = Vec::with_capacity(turns.len() + 1);
    if !system_prompt.is_empty() {
        out.push(WireMessage::new(
            "system",
            Some(WireContent::Text(system_prompt.to_string())),
        ));
    }

    for turn in turns {
        match turn.role {
            Role::User => out.push(user_message(&turn.blocks)),
            Role::Assistant => out.push(assistant_message(&turn.blocks)),
            Role::ToolResult => {
                for block in &turn.blocks {
                    if let ContentBlock::ToolResult { id, output, .. } = block {
                        let mut msg =
                            WireMessage::new("tool", Some(WireContent::Text(output.clone())));
                        msg.tool_call_id = Some(id.clone());
                        out.push(msg);
                    }
                }
            }
        }
    }
    out
}

fn user_message(blocks: &[ContentBlock]) -> WireMessage {
    let mut parts = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(WirePart::Text { text: text.clone() }),
            ContentBlock::Image { media_type, data } => parts.push(WirePart::ImageUrl {
                image_url: WireImageUrl {
                    url: format!("data:{media_type};base64,{data}"),
                },
            }),
            ContentBlock::ToolCall { .. }
            | ContentBlock::ToolResult { .. }
            | ContentBlock::Thinking { .. }
            | ContentBlock::RedactedThinking { .. } => {}
        }
    }

    let content = match parts.as_slice() {
        [WirePart::Text { text }] => WireContent::Text(text.clone()),
        _ => WireContent::Parts(parts),
    };
    WireMessage::new("user", Some(content))
}

fn assistant_message(blocks: &[ContentBlock]) -> WireMessage {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(t);
            }
            ContentBlock::ToolCall { id, name, args } => tool_calls.push(WireToolCall {
                id: id.clone(),
                call_type: function_type(),
                function: WireFunctionCall {
                    name: name.clone(),
                    arguments: args.clone(),
                },
            }),
            ContentBlock::Image { .. }
            | ContentBlock::ToolResult { .. }
            | ContentBlock::Thinking { .. }
            | ContentBlock::RedactedThinking { .. } => {}
        }
    }

    let mut msg = WireMessage::new(
        "assistant",
        (!text.is_empty()).then_some(WireContent::Text(text)),
    );
    msg.tool_calls = tool_calls;
    msg
}

fn from_wire_response(message: RawResponseMessage) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    if let Some(reasoning) = message.reasoning.filter(|r| !r.is_empty()) {
        blocks.push(ContentBlock::Thinking { text: reasoning });
    }
    if let Some(content) = message.content.filter(|c| !c.trim().is_empty()) {
        blocks.push(ContentBlock::Text { text: content });
    }
    for call in message.tool_calls.unwrap_or_default() {
        blocks.push(ContentBlock::ToolCall {
            id: call.id,
            name: call.function.name,
            args: call.function.arguments,
        });
    }
    blocks
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for OpenRouter, usable as a [`Generate`] capability.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    referer: String,
    title: String,
    retry: RetryConfig,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("model", &self.model)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl OpenRouterClient {
    /// Create a client for `model` with default headers and retry policy.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tether/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(180))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            referer: "https://github.com/tether-rs/tether".into(),
            title: "tether".into(),
            retry: RetryConfig::default(),
        })
    }

    /// Override the `HTTP-Referer` and `X-Title` attribution headers.
    pub fn with_headers(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<Vec<ContentBlock>, GenerateError> {
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}",
            body.model,
            body.messages.len(),
            body.tools.len(),
            body.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(GenerateError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)?;
        if let Some(err) = parsed.error {
            return Err(GenerateError::Provider(err.message));
        }
        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
            );
        }

        let blocks = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .map(|c| from_wire_response(c.message))
            .unwrap_or_default();
        debug!("LLM output: {} block(s)", blocks.len());
        Ok(blocks)
    }
}

impl Generate for OpenRouterClient {
    fn generate<'a>(
        &'a self,
        request: GenerateRequest<'a>,
    ) -> BoxFuture<'a, Result<Vec<ContentBlock>, GenerateError>> {
        Box::pin(async move {
            let body = ChatRequest {
                model: &self.model,
                messages: to_wire_messages(request.system_prompt, request.turns),
                max_tokens: request.max_tokens,
                temperature: request.temperature,
                tools: request
                    .tools
                    .iter()
                    .map(|def| WireTool {
                        tool_type: "function",
                        function: def,
                    })
                    .collect(),
                tool_choice: match request.tool_choice {
                    ToolChoice::None if !request.tools.is_empty() => Some("none"),
                    _ => None,
                },
            };
            with_retry(&self.retry, || self.send(&body)).await
        })
    }
}
