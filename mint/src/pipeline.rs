//! Queue driver for `mint run`.
//!
//! Scans rows from the first task position and decides per row whether to
//! archive it, start it, resume it or leave it alone. Rows execute strictly one
//! at a time and every result is persisted before the next row is read.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::queue::TASK_START_ROW;
use crate::core::summary::summarize;
use crate::core::types::{ExecutionResult, RowUpdate, RunSummary, TaskStatus};
use crate::io::config::RunSettings;
use crate::io::executor::{ExecRequest, Executor};
use crate::io::queue_store::QueueStore;

/// Progress notifications emitted while the driver works through the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowEvent {
    /// An approved row was archived; the same position is examined next.
    Archived { position: usize, ticket: String },
    /// A never-executed row is about to run for the first time.
    Started { position: usize, ticket: String },
    /// An ongoing row is about to resume its session.
    Resumed { position: usize, ticket: String },
    /// An execution finished and its result was written back.
    Finished {
        position: usize,
        status: TaskStatus,
        return_code: i32,
    },
}

/// Space-join a non-empty `prefix` ahead of `prompt`, trimming both.
pub fn join_prefix(prefix: &str, prompt: &str) -> String {
    let prefix = prefix.trim();
    let prompt = prompt.trim();
    match (prefix.is_empty(), prompt.is_empty()) {
        (true, _) => prompt.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix} {prompt}"),
    }
}

/// Run one pass over the queue until the first row without a prompt.
///
/// Store failures and agent spawn failures abort the pass; timeouts and
/// non-zero exits are recorded on their row and the scan continues.
#[instrument(skip_all, fields(command = %settings.command))]
pub fn run_queue<S: QueueStore, E: Executor, F: FnMut(&RowEvent)>(
    store: &mut S,
    executor: &E,
    settings: &RunSettings,
    mut on_event: F,
) -> Result<RunSummary> {
    let mut position = TASK_START_ROW;
    let mut executed_rows = 0u32;
    let mut archived_rows = 0u32;

    loop {
        let row = store
            .read_row(position)
            .with_context(|| format!("read row {position}"))?;

        if row.prompt.trim().is_empty() {
            info!(position, executed_rows, archived_rows, "reached end of queue");
            return Ok(RunSummary {
                executed_rows,
                archived_rows,
                stopped_at_row: position,
            });
        }

        if row.status == Some(TaskStatus::Approved) {
            store
                .archive_and_shift(position)
                .with_context(|| format!("archive row {position}"))?;
            archived_rows += 1;
            on_event(&RowEvent::Archived {
                position,
                ticket: row.ticket,
            });
            // Compaction moved the next row into this position.
            continue;
        }

        if row.ticket.trim().is_empty() {
            let ticket = summarize(&row.prompt);
            // Mark progress before the agent runs so a crash leaves a trace.
            store
                .update_row(
                    position,
                    &RowUpdate {
                        ticket: Some(ticket.clone()),
                        status: Some(TaskStatus::Ongoing),
                        ..RowUpdate::default()
                    },
                )
                .with_context(|| format!("update row {position}"))?;
            on_event(&RowEvent::Started { position, ticket });

            let result = executor.exec(&ExecRequest {
                command: settings.command.clone(),
                prompt: join_prefix(&settings.prefix, &row.prompt),
                session_id: String::new(),
                auto_close: settings.auto_close,
            })?;
            persist(store, position, &result)?;
            executed_rows += 1;
            on_event(&finished(position, &result));
        } else if row.status == Some(TaskStatus::Ongoing) {
            let resume_prompt = if row.user_input.trim().is_empty() {
                row.prompt.as_str()
            } else {
                row.user_input.as_str()
            };
            on_event(&RowEvent::Resumed {
                position,
                ticket: row.ticket.clone(),
            });

            let result = executor.exec(&ExecRequest {
                command: settings.command.clone(),
                prompt: join_prefix(&settings.prefix, resume_prompt),
                session_id: row.session_id.trim().to_string(),
                auto_close: settings.auto_close,
            })?;
            persist(store, position, &result)?;
            executed_rows += 1;
            on_event(&finished(position, &result));
        }

        position += 1;
    }
}

fn persist<S: QueueStore>(store: &mut S, position: usize, result: &ExecutionResult) -> Result<()> {
    store
        .update_row(position, &result.row_update())
        .with_context(|| format!("record result for row {position}"))
}

fn finished(position: usize, result: &ExecutionResult) -> RowEvent {
    RowEvent::Finished {
        position,
        status: result.status,
        return_code: result.return_code,
    }
}
