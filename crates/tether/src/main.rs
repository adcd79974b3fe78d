//! Command-line front end for the tether agent loop.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # One task, resumable history, answer checked by a reviewer agent
//! tether run --prompt "Explain the borrow checker in two sentences" \
//!     --history .tether/history.json --review
//!
//! # Fold a saved conversation into a single summary turn
//! tether compact --history .tether/history.json
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to change verbosity.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tether_rs::agent::config::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MAX_TURNS};
use tether_rs::api::openrouter::DEFAULT_MODEL;
use tether_rs::prelude::*;
use tether_rs::tools::DEFAULT_TOOL_TIMEOUT;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const TASK_SYSTEM_PROMPT: &str = "\
You are an autonomous assistant working through a task one step at a time. \
You may call at most one tool per reply. When the task is finished, call the \
`complete` tool with the full answer; otherwise reply in plain text.";

const REVIEW_SYSTEM_PROMPT: &str = "\
You are a strict reviewer. Check the answer below against the task it was \
meant to solve. Look for factual errors, missing parts and unclear wording. \
When you are done, call `submit_review` exactly once.";

/// Event channel capacity for `--events`.
const EVENT_BUFFER: usize = 256;

/// Single-tool-per-turn LLM agent.
#[derive(Parser)]
#[command(name = "tether", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one task to completion.
    Run(RunArgs),
    /// Replace a saved history with a single summary turn.
    Compact(CompactArgs),
}

#[derive(Args)]
struct RunArgs {
    /// The task for the agent.
    #[arg(long)]
    prompt: String,

    /// Model to use for completions and summaries.
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Maximum model calls per run.
    #[arg(long, default_value_t = DEFAULT_MAX_TURNS)]
    max_turns: u32,

    /// Maximum tokens per model response.
    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_TOKENS)]
    max_tokens: u32,

    /// Context budget in tokens before older turns are summarized.
    #[arg(long, default_value_t = 120_000)]
    token_budget: usize,

    /// Load history from this file if it exists and save it back afterwards.
    #[arg(long)]
    history: Option<PathBuf>,

    /// Image to attach to the prompt. Repeatable.
    #[arg(long = "image")]
    images: Vec<PathBuf>,

    /// Per-tool timeout in seconds. 0 disables it.
    #[arg(long, default_value_t = DEFAULT_TOOL_TIMEOUT.as_secs())]
    tool_timeout: u64,

    /// Have a second agent review the answer.
    #[arg(long)]
    review: bool,

    /// Print agent events to stdout as JSON lines.
    #[arg(long)]
    events: bool,
}

#[derive(Args)]
struct CompactArgs {
    /// History file to compact in place.
    #[arg(long)]
    history: PathBuf,

    /// Model used to write the summary.
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn client_for(model: &str) -> Arc<OpenRouterClient> {
    let api_key = match std::env::var("OPENROUTER_KEY") {
        Ok(key) => key,
        Err(_) => fail("OPENROUTER_KEY environment variable is not set"),
    };
    match OpenRouterClient::new(api_key, model) {
        Ok(c) => Arc::new(c.with_headers("https://github.com/tether-rs/tether", "tether")),
        Err(e) => fail(format!("failed to create API client: {e}")),
    }
}

fn load_history(path: Option<&Path>) -> MessageHistory {
    match path {
        Some(p) if p.exists() => match MessageHistory::load(p) {
            Ok(h) => {
                info!("Resuming {} turns from {}", h.len(), p.display());
                h
            }
            Err(e) => fail(format!("failed to load {}: {e}", p.display())),
        },
        _ => MessageHistory::new(),
    }
}

/// Print every event as one JSON line until the channel closes.
fn spawn_event_printer() -> ChannelHandler {
    let (handler, mut rx) = ChannelHandler::channel(EVENT_BUFFER);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to encode {} event: {e}", event.kind),
            }
        }
    });
    handler
}

async fn run(args: RunArgs) {
    let client = client_for(&args.model);
    let history = load_history(args.history.as_deref());

    let attachments: Vec<Attachment> = args
        .images
        .iter()
        .map(|p| {
            Attachment::from_path(p)
                .unwrap_or_else(|e| fail(format!("failed to read {}: {e}", p.display())))
        })
        .collect();

    let tools = ToolRegistry::new()
        .with_arg_validation(true)
        .with_default_timeout((args.tool_timeout > 0).then(|| Duration::from_secs(args.tool_timeout)))
        .with(CompleteTool);

    let config = AgentConfig::new(TASK_SYSTEM_PROMPT)
        .with_max_turns(args.max_turns)
        .with_max_output_tokens(args.max_tokens)
        .with_token_budget(args.token_budget);

    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with_opt(args.events.then(spawn_event_printer));

    let mut agent = Agent::new(client.clone(), tools, TaskPolicy, config)
        .with_history(history)
        .with_event_handler(handler);

    let cancel = agent.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping at the next checkpoint");
            cancel.cancel();
        }
    });

    let result = agent.run(&args.prompt, &attachments).await;

    if let Some(path) = &args.history {
        match agent.history().save(path) {
            Ok(()) => info!("Saved {} turns to {}", agent.history().len(), path.display()),
            Err(e) => warn!("Failed to save history to {}: {e}", path.display()),
        }
    }

    let answer = match result {
        Ok(answer) => answer,
        Err(e) => fail(e),
    };
    println!("{answer}");

    if args.review && agent.last_outcome() == Some(RunOutcome::Completed) {
        let review = review(client, &args.prompt, &answer, args.max_tokens).await;
        println!("\n--- Review ---\n{review}");
    }
}

/// Run a reviewer agent on its own task and return its verdict.
async fn review(client: Arc<OpenRouterClient>, task: &str, answer: &str, max_tokens: u32) -> String {
    let instruction = format!("<TASK>\n{task}\n</TASK>\n\n<ANSWER>\n{answer}\n</ANSWER>");
    let handle = tokio::spawn(async move {
        let config = AgentConfig::new(REVIEW_SYSTEM_PROMPT)
            .with_max_turns(5)
            .with_max_output_tokens(max_tokens);
        let mut reviewer = Agent::new(
            client,
            ToolRegistry::new().with_arg_validation(true).with(SubmitReviewTool),
            ReviewPolicy::new(),
            config,
        )
        .with_event_handler(LoggingHandler);
        reviewer.run(&instruction, &[]).await
    });

    match handle.await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => fail(format!("review failed: {e}")),
        Err(e) => fail(format!("review task panicked: {e}")),
    }
}

async fn compact(args: CompactArgs) {
    let client = client_for(&args.model);
    let mut history = match MessageHistory::load(&args.history) {
        Ok(h) => h,
        Err(e) => fail(format!("failed to load {}: {e}", args.history.display())),
    };
    let manager = ContextManager::new(ContextConfig::default(), client);
    let summary = history.compact(&manager).await;
    if let Err(e) = history.save(&args.history) {
        fail(format!("failed to save {}: {e}", args.history.display()));
    }
    println!("{summary}");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Compact(args) => compact(args).await,
    }
}
