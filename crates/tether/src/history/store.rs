//! On-disk persistence for [`MessageHistory`].
//!
//! A history is stored as one pretty-printed JSON document:
//!
//! ```json
//! { "version": 1, "saved_at": "2026-01-01T00:00:00Z", "turns": [ ... ] }
//! ```
//!
//! Writes go to a hidden temp file in the same directory and are renamed into
//! place. Block kinds this build doesn't know are dropped while decoding, and
//! tool-call integrity is restored on the decoded turns.

use super::MessageHistory;
use crate::{ContentBlock, Role, Turn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Current persisted format version.
pub const HISTORY_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("history is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported history format version {found} (expected {HISTORY_FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },
}

#[derive(Serialize)]
struct StoredHistoryRef<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    turns: &'a [Turn],
}

#[derive(Deserialize)]
struct StoredHistory {
    version: u32,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    turns: Vec<StoredTurn>,
}

#[derive(Deserialize)]
struct StoredTurn {
    role: Role,
    #[serde(default)]
    summary: bool,
    blocks: Vec<StoredBlock>,
}

/// Decode-side mirror of [`ContentBlock`] with a catch-all variant.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StoredBlock {
    Text {
        text: String,
    },
    Image {
        media_type: String,
        data: String,
    },
    ToolCall {
        id: String,
        name: String,
        args: String,
    },
    ToolResult {
        id: String,
        name: String,
        output: String,
    },
    Thinking {
        text: String,
    },
    RedactedThinking {
        #[serde(default)]
        data: String,
    },
    #[serde(other)]
    Unknown,
}

impl StoredBlock {
    fn into_block(self) -> Option<ContentBlock> {
        Some(match self {
            StoredBlock::Text { text } => ContentBlock::Text { text },
            StoredBlock::Image { media_type, data } => ContentBlock::Image { media_type, data },
            StoredBlock::ToolCall { id, name, args } => ContentBlock::ToolCall { id, name, args },
            StoredBlock::ToolResult { id, name, output } => {
                ContentBlock::ToolResult { id, name, output }
            }
            StoredBlock::Thinking { text } => ContentBlock::Thinking { text },
            StoredBlock::RedactedThinking { data } => ContentBlock::RedactedThinking { data },
            StoredBlock::Unknown => return None,
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "history.json".into());
    path.with_file_name(format!(".{name}.tmp"))
}

impl MessageHistory {
    /// Serialize to the persisted JSON format.
    pub fn to_json(&self) -> Result<String, HistoryError> {
        let doc = StoredHistoryRef {
            version: HISTORY_FORMAT_VERSION,
            saved_at: Utc::now(),
            turns: &self.turns,
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Parse the persisted JSON format.
    pub fn from_json(json: &str) -> Result<Self, HistoryError> {
        let doc: StoredHistory = serde_json::from_str(json)?;
        if doc.version != HISTORY_FORMAT_VERSION {
            return Err(HistoryError::UnsupportedVersion { found: doc.version });
        }
        if let Some(saved_at) = doc.saved_at {
            debug!("Loading history saved at {saved_at}");
        }

        let mut unknown = 0usize;
        let mut turns = Vec::with_capacity(doc.turns.len());
        for stored in doc.turns {
            let before = stored.blocks.len();
            let blocks: Vec<ContentBlock> = stored
                .blocks
                .into_iter()
                .filter_map(StoredBlock::into_block)
                .collect();
            let dropped = before - blocks.len();
            unknown += dropped;
            if dropped > 0 && blocks.is_empty() {
                continue;
            }
            turns.push(Turn {
                role: stored.role,
                blocks,
                summary: stored.summary,
            });
        }
        if unknown > 0 {
            warn!("Dropped {unknown} block(s) of unknown type while loading history");
        }
        let mut history = Self { turns };
        history.ensure_tool_call_integrity();
        Ok(history)
    }

    /// Write atomically to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = self.to_json()?;
        let tmp = temp_path(path);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        debug!("Saved {} turns to {}", self.turns.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MessageHistory {
        let mut h = MessageHistory::new();
        h.add_user_prompt(
            "describe this",
            &[crate::Attachment::new("image/png", vec![137, 80, 78, 71])],
        );
        h.add_assistant_turn(vec![
            ContentBlock::thinking("look first"),
            ContentBlock::RedactedThinking {
                data: "enc".into(),
            },
            ContentBlock::tool_call("c1", "inspect", r#"{"x":1}"#),
        ]);
        h.add_tool_result("c1", "inspect", "a png header");
        h.add_assistant_turn(vec![ContentBlock::text("It is a PNG.")]);
        let mut turns = h.turns().to_vec();
        turns.insert(1, Turn::summary("earlier"));
        MessageHistory::from_turns(turns)
    }

    #[test]
    fn save_then_load_reproduces_turns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");
        let original = sample();
        original.save(&path).unwrap();

        let loaded = MessageHistory::load(&path).unwrap();
        assert_eq!(loaded, original);
        assert!(loaded.turns()[1].summary);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.json");
        sample().save(&path).unwrap();
        assert!(!dir.path().join(".h.json.tmp").exists());
        assert!(path.exists());
    }

    #[test]
    fn unknown_blocks_are_dropped_on_load() {
        let json = r#"{
            "version": 1,
            "turns": [
                {"role": "user", "blocks": [{"type": "text", "text": "hi"}]},
                {"role": "assistant", "blocks": [
                    {"type": "hologram", "frames": 3},
                    {"type": "text", "text": "hello"}
                ]},
                {"role": "assistant", "blocks": [{"type": "hologram"}]}
            ]
        }"#;
        let h = MessageHistory::from_json(json).unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h.turns()[1].blocks, vec![ContentBlock::text("hello")]);
    }

    #[test]
    fn load_restores_tool_call_integrity() {
        let json = r#"{
            "version": 1,
            "turns": [
                {"role": "user", "blocks": [{"type": "text", "text": "hi"}]},
                {"role": "tool_result", "blocks": [
                    {"type": "tool_result", "id": "x", "name": "ls", "output": "stale"}
                ]},
                {"role": "assistant", "blocks": [{"type": "text", "text": "hello"}]}
            ]
        }"#;
        let h = MessageHistory::from_json(json).unwrap();
        assert_eq!(h.len(), 2);
        assert!(h.turns().iter().all(|t| t.role != Role::ToolResult));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let err = MessageHistory::from_json(r#"{"version": 99, "turns": []}"#).unwrap_err();
        assert!(matches!(err, HistoryError::UnsupportedVersion { found: 99 }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MessageHistory::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, HistoryError::Io(_)));
    }
}
