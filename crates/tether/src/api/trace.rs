//! Correlation IDs for agent runs.
//!
//! Every [`Agent::run`](crate::agent::Agent::run) gets a `trace_id`; each
//! model round-trip within it gets a `span_id`. Both appear in log lines.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generate a unique trace ID for an agent run.
pub fn generate_trace_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("tr-{ts:x}-{count:04x}")
}

/// Span ID for one turn of a run.
pub fn generate_span_id(trace_id: &str, turn: u32) -> String {
    format!("{trace_id}:t{turn}")
}
