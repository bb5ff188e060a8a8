//! Persistence: workflow checkpoints and image objects

pub mod checkpoint;
pub mod object_store;
pub mod sqlite;

use thiserror::Error;

pub use checkpoint::{Checkpoint, Checkpointer, InMemoryCheckpointer};
pub use object_store::{FsObjectStore, InMemoryObjectStore};
pub use sqlite::{SessionSummary, SqliteCheckpointer, TransitionRecord};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("checkpoint encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}
