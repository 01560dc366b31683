//! Shared deterministic types for mint core logic.
//!
//! These types define stable contracts between the queue driver, the
//! execution engine and the queue stores. They carry no I/O.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize, de};

/// Lifecycle status of a task row.
///
/// The names double as the persisted values, so they must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Ongoing,
    Testing,
    Blocked,
    Completed,
    Approved,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Ongoing,
        TaskStatus::Testing,
        TaskStatus::Blocked,
        TaskStatus::Completed,
        TaskStatus::Approved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Ongoing => "Ongoing",
            TaskStatus::Testing => "Testing",
            TaskStatus::Blocked => "Blocked",
            TaskStatus::Completed => "Completed",
            TaskStatus::Approved => "Approved",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == trimmed)
            .ok_or_else(|| anyhow!("unknown task status {trimmed:?}"))
    }
}

/// One unit of work in the queue, identified by its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRow {
    pub prompt: String,
    /// Short label; empty until the row has been executed once.
    pub ticket: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_status"
    )]
    pub status: Option<TaskStatus>,
    /// Operator follow-up used instead of `prompt` when resuming.
    pub user_input: String,
    pub thoughts: String,
    pub session_id: String,
}

impl TaskRow {
    /// A row with no content in any task column.
    pub fn is_blank(&self) -> bool {
        self.prompt.is_empty()
            && self.ticket.is_empty()
            && self.status.is_none()
            && self.user_input.is_empty()
            && self.thoughts.is_empty()
            && self.session_id.is_empty()
    }
}

/// Blank status cells read as unset; anything else must be a known status.
fn deserialize_status<'de, D>(deserializer: D) -> std::result::Result<Option<TaskStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text.parse().map(Some).map_err(de::Error::custom),
    }
}

/// Targeted write to a subset of a row's columns. `None` leaves a column as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowUpdate {
    pub ticket: Option<String>,
    pub status: Option<TaskStatus>,
    pub thoughts: Option<String>,
    pub session_id: Option<String>,
}

impl RowUpdate {
    pub fn is_empty(&self) -> bool {
        self.ticket.is_none()
            && self.status.is_none()
            && self.thoughts.is_none()
            && self.session_id.is_none()
    }

    /// Apply the update to `row` in place.
    pub fn apply_to(&self, row: &mut TaskRow) {
        if let Some(ticket) = &self.ticket {
            row.ticket.clone_from(ticket);
        }
        if let Some(status) = self.status {
            row.status = Some(status);
        }
        if let Some(thoughts) = &self.thoughts {
            row.thoughts.clone_from(thoughts);
        }
        if let Some(session_id) = &self.session_id {
            row.session_id.clone_from(session_id);
        }
    }
}

/// Outcome of a single agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: TaskStatus,
    /// Final agent message or raw output, bounded in length.
    pub thoughts: String,
    /// Resolved session id; empty when none was observed or supplied.
    pub session_id: String,
    /// POSIX-style exit code; `124` means the invocation timed out.
    pub return_code: i32,
}

impl ExecutionResult {
    /// Column writes that persist this result onto its row.
    ///
    /// The session column is only touched when a session id was resolved.
    pub fn row_update(&self) -> RowUpdate {
        RowUpdate {
            ticket: None,
            status: Some(self.status),
            thoughts: Some(self.thoughts.clone()),
            session_id: (!self.session_id.is_empty()).then(|| self.session_id.clone()),
        }
    }
}

/// Run-time settings sourced from the queue, with local fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueProperties {
    pub prefix: String,
    pub command: String,
    /// Kept as text because operators type it by hand; see [`parse_flag`].
    pub auto_close: String,
}

/// Aggregate statistics for one driver pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub executed_rows: u32,
    pub archived_rows: u32,
    pub stopped_at_row: usize,
}

/// Parse a loosely typed boolean (`true/1/yes/on`, `false/0/no/off`).
///
/// Returns `None` for anything else, including blank input.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
