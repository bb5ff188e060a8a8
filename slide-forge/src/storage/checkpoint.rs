//! Checkpoint contract and the in-memory backend

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::graph::{Node, RunOutcome};
use crate::state::WorkflowState;
use crate::storage::StorageError;

/// Latest durable position of a session: the state and the node to run next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub workflow_id: String,
    pub next: Node,
    /// Set once the run reached a terminal state
    pub outcome: Option<RunOutcome>,
    pub state: WorkflowState,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn is_finished(&self) -> bool {
        self.next == Node::End
    }
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StorageError>;
    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, StorageError>;
}

/// Process-local checkpoints; lost on restart
#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
    saves: AtomicUsize,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saves since creation
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.checkpoints.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        self.checkpoints
            .write()
            .await
            .insert(checkpoint.session_id.clone(), checkpoint.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, StorageError> {
        Ok(self.checkpoints.read().await.get(session_id).cloned())
    }
}
