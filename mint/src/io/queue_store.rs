//! Queue stores: the abstract row interface and its JSON file backing.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{debug, instrument};

use crate::core::queue::QueueSheet;
use crate::core::types::{QueueProperties, RowUpdate, TaskRow};
use crate::io::config::write_atomic;

static QUEUE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Ordered, position-addressed task rows plus run-time properties.
pub trait QueueStore {
    /// Row at `position`; blank when nothing is stored there.
    fn read_row(&self, position: usize) -> Result<TaskRow>;

    /// Write only the columns named in `update`.
    fn update_row(&mut self, position: usize, update: &RowUpdate) -> Result<()>;

    /// Archive the row at `position` and move the following rows up.
    fn archive_and_shift(&mut self, position: usize) -> Result<()>;

    fn properties(&self) -> Result<QueueProperties>;
}

impl QueueStore for QueueSheet {
    fn read_row(&self, position: usize) -> Result<TaskRow> {
        self.row(position)
    }

    fn update_row(&mut self, position: usize, update: &RowUpdate) -> Result<()> {
        QueueSheet::update_row(self, position, update)
    }

    fn archive_and_shift(&mut self, position: usize) -> Result<()> {
        QueueSheet::archive_and_shift(self, position)
    }

    fn properties(&self) -> Result<QueueProperties> {
        Ok(self.properties.clone())
    }
}

/// How the operator named a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueRef {
    /// Explicit path to a queue document.
    File(PathBuf),
    /// Bare id stored under `.mint/queues/<id>.json`.
    Named(String),
}

impl QueueRef {
    /// Values ending in `.json` or containing a path separator are paths;
    /// `[A-Za-z0-9_-]+` is a queue id; anything else is rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            bail!("invalid queue reference: empty");
        }
        if trimmed.ends_with(".json") || trimmed.contains(['/', std::path::MAIN_SEPARATOR]) {
            return Ok(Self::File(PathBuf::from(trimmed)));
        }
        if QUEUE_ID_RE.is_match(trimmed) {
            return Ok(Self::Named(trimmed.to_string()));
        }
        bail!(
            "invalid queue reference {trimmed:?}: expected a .json path or an id made of letters, digits, '-' and '_'"
        )
    }
}

impl fmt::Display for QueueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueRef::File(path) => write!(f, "{}", path.display()),
            QueueRef::Named(id) => f.write_str(id),
        }
    }
}

/// Queue persisted as one JSON document.
///
/// Every operation loads the file, applies the change and rewrites it, so
/// edits made between rows are picked up.
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<QueueSheet> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read queue {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse queue {}", self.path.display()))
    }

    /// Write `sheet` with trailing blank rows dropped.
    pub fn save(&self, sheet: &QueueSheet) -> Result<()> {
        let mut sheet = sheet.clone();
        sheet.trim_trailing_blank_rows();
        let mut buf = serde_json::to_string_pretty(&sheet).context("serialize queue json")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }

    fn modify(&self, apply: impl FnOnce(&mut QueueSheet) -> Result<()>) -> Result<()> {
        let mut sheet = self.load()?;
        apply(&mut sheet)?;
        self.save(&sheet)
    }
}

impl QueueStore for FileQueueStore {
    fn read_row(&self, position: usize) -> Result<TaskRow> {
        self.load()?.row(position)
    }

    #[instrument(skip_all, fields(position = position))]
    fn update_row(&mut self, position: usize, update: &RowUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        debug!(path = %self.path.display(), "updating row");
        self.modify(|sheet| sheet.update_row(position, update))
    }

    #[instrument(skip_all, fields(position = position))]
    fn archive_and_shift(&mut self, position: usize) -> Result<()> {
        debug!(path = %self.path.display(), "archiving row");
        self.modify(|sheet| sheet.archive_and_shift(position))
    }

    fn properties(&self) -> Result<QueueProperties> {
        Ok(self.load()?.properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskStatus;

    fn sample_sheet() -> QueueSheet {
        QueueSheet {
            properties: QueueProperties {
                prefix: "p".to_string(),
                command: "codex".to_string(),
                auto_close: "true".to_string(),
            },
            rows: vec![
                TaskRow {
                    prompt: "first".to_string(),
                    ticket: "T1".to_string(),
                    status: Some(TaskStatus::Approved),
                    thoughts: "done\nand dusted".to_string(),
                    ..TaskRow::default()
                },
                TaskRow {
                    prompt: "second".to_string(),
                    ..TaskRow::default()
                },
            ],
            archive: Vec::new(),
        }
    }

    #[test]
    fn parse_queue_refs() {
        assert_eq!(
            QueueRef::parse(" backlog_2 ").expect("id"),
            QueueRef::Named("backlog_2".to_string())
        );
        assert_eq!(
            QueueRef::parse("work.json").expect("file"),
            QueueRef::File(PathBuf::from("work.json"))
        );
        assert_eq!(
            QueueRef::parse("queues/today").expect("path"),
            QueueRef::File(PathBuf::from("queues/today"))
        );
        for bad in ["", "   ", "has space", "what?"] {
            assert!(QueueRef::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn file_store_round_trips_and_archives() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut store = FileQueueStore::new(temp.path().join("q.json"));
        store.save(&sample_sheet()).expect("save");

        assert_eq!(store.properties().expect("props").command, "codex");
        assert_eq!(store.read_row(2).expect("row").prompt, "second");

        store.archive_and_shift(1).expect("archive");

        let sheet = store.load().expect("load");
        assert_eq!(sheet.rows.len(), 1, "cleared trailing row is trimmed");
        assert_eq!(sheet.rows[0].prompt, "second");
        assert_eq!(sheet.archive[0].ticket, "T1");
        assert_eq!(sheet.archive[0].thoughts, "done and dusted");
        assert!(store.read_row(2).expect("row").is_blank());
    }

    #[test]
    fn update_writes_only_named_columns() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut store = FileQueueStore::new(temp.path().join("q.json"));
        store.save(&sample_sheet()).expect("save");

        store
            .update_row(
                2,
                &RowUpdate {
                    status: Some(TaskStatus::Blocked),
                    ..RowUpdate::default()
                },
            )
            .expect("update");

        let row = store.read_row(2).expect("row");
        assert_eq!(row.prompt, "second");
        assert_eq!(row.status, Some(TaskStatus::Blocked));
    }

    #[test]
    fn unknown_status_fails_to_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("q.json");
        fs::write(&path, r#"{"rows":[{"prompt":"x","status":"Finished"}]}"#).expect("write");

        let err = FileQueueStore::new(&path).load().unwrap_err();
        assert!(format!("{err:#}").contains("unknown task status"));
    }

    #[test]
    fn missing_queue_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileQueueStore::new(temp.path().join("absent.json"));
        assert!(store.read_row(1).is_err());
    }
}
