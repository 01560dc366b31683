//! Test-only helpers: scripted collaborators, row builders and scratch workspaces.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::queue::QueueSheet;
use crate::core::types::{ExecutionResult, QueueProperties, TaskRow, TaskStatus};
use crate::io::init::MintPaths;
use crate::io::executor::{ExecRequest, Executor};
use crate::io::queue_store::FileQueueStore;
use crate::io::session_log::SessionLog;

/// In-memory session log.
///
/// Each `latest_session_id` call consumes the next scripted id; once the
/// script runs out the last id keeps being returned.
#[derive(Debug, Default)]
pub struct ScriptedSessionLog {
    latest: RefCell<VecDeque<String>>,
    last_seen: RefCell<String>,
    messages: HashMap<String, String>,
}

impl ScriptedSessionLog {
    pub fn with_latest<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            latest: RefCell::new(ids.into_iter().map(str::to_string).collect()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, session_id: &str, message: &str) -> Self {
        self.messages
            .insert(session_id.to_string(), message.to_string());
        self
    }
}

impl SessionLog for ScriptedSessionLog {
    fn latest_session_id(&self) -> String {
        if let Some(next) = self.latest.borrow_mut().pop_front() {
            self.last_seen.replace(next);
        }
        self.last_seen.borrow().clone()
    }

    fn latest_assistant_message(&self, session_id: &str) -> Option<String> {
        self.messages.get(session_id).cloned()
    }
}

/// Executor that records every request and replays queued results.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    results: RefCell<VecDeque<ExecutionResult>>,
    requests: RefCell<Vec<ExecRequest>>,
}

impl ScriptedExecutor {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.borrow().clone()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<ExecutionResult> {
        self.requests.borrow_mut().push(request.clone());
        self.results
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted executor has no result for {:?}", request.prompt))
    }
}

/// Result with the given status, thoughts and session id and a zero exit code.
pub fn result(status: TaskStatus, thoughts: &str, session_id: &str) -> ExecutionResult {
    ExecutionResult {
        status,
        thoughts: thoughts.to_string(),
        session_id: session_id.to_string(),
        return_code: 0,
    }
}

/// Fresh row that has never been executed.
pub fn new_row(prompt: &str) -> TaskRow {
    TaskRow {
        prompt: prompt.to_string(),
        ..TaskRow::default()
    }
}

/// Previously executed row with the given ticket and status.
pub fn row_with_status(prompt: &str, ticket: &str, status: TaskStatus) -> TaskRow {
    TaskRow {
        prompt: prompt.to_string(),
        ticket: ticket.to_string(),
        status: Some(status),
        ..TaskRow::default()
    }
}

/// Command properties pointing at `command`, with auto-close disabled.
pub fn properties(command: &str) -> QueueProperties {
    QueueProperties {
        prefix: String::new(),
        command: command.to_string(),
        auto_close: "false".to_string(),
    }
}

/// Scratch project directory with a `.mint/` layout.
pub struct TestWorkspace {
    temp: TempDir,
    paths: MintPaths,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let paths = MintPaths::new(temp.path());
        Ok(Self { temp, paths })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> &MintPaths {
        &self.paths
    }

    /// Write `sheet` as the named queue and return a store for it.
    pub fn write_queue(&self, name: &str, sheet: &QueueSheet) -> Result<FileQueueStore> {
        let store = FileQueueStore::new(self.paths.named_queue_path(name));
        store.save(sheet)?;
        Ok(store)
    }
}
