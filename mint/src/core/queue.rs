//! In-memory queue model shared by every queue store.
//!
//! Rows are addressed by 1-based position. Reading past the last stored row
//! yields a blank row, which the driver treats as the end of the queue.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::summary::collapse_whitespace;
use crate::core::types::{QueueProperties, RowUpdate, TaskRow};

/// Position of the first task row.
pub const TASK_START_ROW: usize = 1;

/// A row removed from active processing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivedTicket {
    pub ticket: String,
    pub prompt: String,
    /// Final thoughts, collapsed to a single line.
    pub thoughts: String,
}

/// Full queue document: properties, active rows and the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSheet {
    pub properties: QueueProperties,
    pub rows: Vec<TaskRow>,
    pub archive: Vec<ArchivedTicket>,
}

impl QueueSheet {
    pub fn with_rows(rows: Vec<TaskRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    fn index(position: usize) -> Result<usize> {
        if position < TASK_START_ROW {
            bail!("row {position} is before the first task row {TASK_START_ROW}");
        }
        Ok(position - TASK_START_ROW)
    }

    /// Row at `position`, or a blank row past the end.
    pub fn row(&self, position: usize) -> Result<TaskRow> {
        let index = Self::index(position)?;
        Ok(self.rows.get(index).cloned().unwrap_or_default())
    }

    /// Apply a targeted column update, growing the row list if needed.
    pub fn update_row(&mut self, position: usize, update: &RowUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        let index = Self::index(position)?;
        if index >= self.rows.len() {
            self.rows.resize_with(index + 1, TaskRow::default);
        }
        update.apply_to(&mut self.rows[index]);
        Ok(())
    }

    /// Archive the row at `position`, then close the gap.
    ///
    /// The contiguous block of non-blank rows after `position` moves up by one
    /// and the row it vacates is cleared. Rows after the first blank row stay put.
    pub fn archive_and_shift(&mut self, position: usize) -> Result<()> {
        let index = Self::index(position)?;
        let row = self.row(position)?;
        self.archive.push(ArchivedTicket {
            ticket: row.ticket,
            prompt: row.prompt,
            thoughts: collapse_whitespace(&row.thoughts),
        });

        if index >= self.rows.len() {
            return Ok(());
        }
        let block_end = self.rows[index + 1..]
            .iter()
            .position(TaskRow::is_blank)
            .map_or(self.rows.len(), |offset| index + 1 + offset);
        // Rotating the archived row to the end of the block and clearing it
        // shifts everything in between up by one.
        self.rows[index..block_end].rotate_left(1);
        self.rows[block_end - 1] = TaskRow::default();
        Ok(())
    }

    /// Drop blank rows at the end of the list.
    pub fn trim_trailing_blank_rows(&mut self) {
        while self.rows.last().is_some_and(TaskRow::is_blank) {
            self.rows.pop();
        }
    }
}
