//! Read-only access to the agent's own session logs.
//!
//! The agent appends one JSONL file per session under a sessions directory
//! (`~/.codex/sessions/YYYY/MM/DD/rollout-<timestamp>-<uuid>.jsonl`). Mint only
//! reads them: to notice which session a run created, and to recover the last
//! assistant message as a cleaner summary than raw terminal output.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument};
use walkdir::WalkDir;

static SESSION_FILE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\.jsonl$",
    )
    .unwrap()
});

/// Source of session identity and messages. Missing data is never an error.
pub trait SessionLog {
    /// Id of the most recently modified session, or an empty string.
    fn latest_session_id(&self) -> String;

    /// Most recent non-empty assistant message recorded for `session_id`.
    fn latest_assistant_message(&self, session_id: &str) -> Option<String>;
}

/// Session logs stored as `rollout-*.jsonl` files below `root`.
#[derive(Debug, Clone)]
pub struct CodexSessionDir {
    root: PathBuf,
}

impl CodexSessionDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$HOME/.codex/sessions`, when `HOME` is set.
    pub fn default_root() -> Option<PathBuf> {
        std::env::var("HOME")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .map(|home| PathBuf::from(home).join(".codex").join("sessions"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_files(&self) -> impl Iterator<Item = walkdir::DirEntry> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_type().is_file() && {
                    let name = entry.file_name().to_string_lossy();
                    name.starts_with("rollout-") && name.ends_with(".jsonl")
                }
            })
    }

    /// Most recently modified session file.
    pub fn latest_session_file(&self) -> Option<PathBuf> {
        if !self.root.exists() {
            return None;
        }
        let mut latest: Option<(SystemTime, PathBuf)> = None;
        for entry in self.session_files() {
            let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
                continue;
            };
            if latest.as_ref().is_none_or(|(best, _)| modified > *best) {
                latest = Some((modified, entry.into_path()));
            }
        }
        latest.map(|(_, path)| path)
    }

    /// First session file whose name ends in `<session_id>.jsonl`.
    pub fn find_session_file(&self, session_id: &str) -> Option<PathBuf> {
        if session_id.is_empty() || !self.root.exists() {
            return None;
        }
        let suffix = format!("{session_id}.jsonl");
        self.session_files()
            .find(|entry| entry.file_name().to_string_lossy().ends_with(&suffix))
            .map(walkdir::DirEntry::into_path)
    }
}

impl SessionLog for CodexSessionDir {
    fn latest_session_id(&self) -> String {
        self.latest_session_file()
            .and_then(|path| session_id_from_path(&path))
            .unwrap_or_default()
    }

    /// Falls back to the most recently modified session when `session_id`
    /// has no file of its own.
    #[instrument(skip(self))]
    fn latest_assistant_message(&self, session_id: &str) -> Option<String> {
        let path = self
            .find_session_file(session_id)
            .or_else(|| self.latest_session_file())?;
        debug!(path = %path.display(), "scanning session log");
        let file = File::open(&path).ok()?;
        latest_assistant_message_in(BufReader::new(file))
    }
}

/// Session uuid encoded at the end of a session file name.
pub fn session_id_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    SESSION_FILE_ID_RE
        .captures(&name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Scan JSONL session records for the latest assistant-authored message.
///
/// Candidates are `agent_message` events, `task_complete` events carrying a
/// final message, and assistant `output_text` content blocks; later candidates
/// replace earlier ones. Malformed lines are skipped.
pub fn latest_assistant_message_in<R: BufRead>(reader: R) -> Option<String> {
    let mut latest: Option<String> = None;
    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        for message in record_messages(&record) {
            latest = Some(message);
        }
    }
    latest
}

fn record_messages(record: &Value) -> Vec<String> {
    let Some(payload) = record.get("payload").filter(|p| p.is_object()) else {
        return Vec::new();
    };
    let payload_type = payload.get("type").and_then(Value::as_str);
    match (record.get("type").and_then(Value::as_str), payload_type) {
        (Some("event_msg"), Some("agent_message")) => {
            non_empty(payload.get("message")).into_iter().collect()
        }
        (Some("event_msg"), Some("task_complete")) => {
            non_empty(payload.get("last_agent_message")).into_iter().collect()
        }
        (Some("response_item"), Some("message"))
            if payload.get("role").and_then(Value::as_str) == Some("assistant") =>
        {
            payload
                .get("content")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("output_text"))
                .filter_map(|item| non_empty(item.get("text")))
                .collect()
        }
        _ => Vec::new(),
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}
