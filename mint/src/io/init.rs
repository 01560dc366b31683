//! Project layout under `.mint/` and queue initialization.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use super::queue_store::{FileQueueStore, QueueRef};
use crate::core::queue::QueueSheet;
use crate::core::types::QueueProperties;

/// All canonical paths within `.mint/` for a project root.
#[derive(Debug, Clone)]
pub struct MintPaths {
    pub root: PathBuf,
    pub mint_dir: PathBuf,
    pub queues_dir: PathBuf,
    pub config_path: PathBuf,
}

impl MintPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mint_dir = root.join(".mint");
        Self {
            root,
            queues_dir: mint_dir.join("queues"),
            config_path: mint_dir.join("config.toml"),
            mint_dir,
        }
    }

    pub fn named_queue_path(&self, id: &str) -> PathBuf {
        self.queues_dir.join(format!("{id}.json"))
    }

    /// Location of the queue document; relative paths are taken from the root.
    pub fn queue_path(&self, queue: &QueueRef) -> PathBuf {
        match queue {
            QueueRef::File(path) if path.is_absolute() => path.clone(),
            QueueRef::File(path) => self.root.join(path),
            QueueRef::Named(id) => self.named_queue_path(id),
        }
    }
}

/// Whether [`init_queue`] created a document or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueInit {
    Created,
    Refreshed,
}

/// Create the queue document at `path` seeded with `properties`.
///
/// An existing document keeps its rows and archive; only properties change.
pub fn init_queue(path: &Path, properties: &QueueProperties) -> Result<QueueInit> {
    let store = FileQueueStore::new(path);
    let (mut sheet, outcome) = if path.exists() {
        (store.load()?, QueueInit::Refreshed)
    } else {
        (QueueSheet::default(), QueueInit::Created)
    };
    sheet.properties = properties.clone();
    store.save(&sheet)?;
    info!(path = %path.display(), ?outcome, "queue initialized");
    Ok(outcome)
}
