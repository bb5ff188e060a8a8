//! SQLite checkpoint store
//!
//! Keeps the latest checkpoint of every session plus a compact log of each
//! transition, so sessions survive restarts and can be inspected from the CLI.
//!
//! # Database Schema
//!
//! 1. **checkpoints** - latest checkpoint per session (state as JSON)
//! 2. **checkpoint_log** - one row per save: node, step index, counters
//! 3. **schema_version** - schema version for migrations
//!
//! WAL mode is enabled for file-backed databases. All blocking work runs on
//! the tokio blocking pool when used through [`Checkpointer`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::graph::{Node, RunOutcome};
use crate::storage::{Checkpoint, Checkpointer, StorageError};

const SCHEMA_VERSION: i32 = 1;

/// One row of `slide-forge sessions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub workflow_id: String,
    pub next: Node,
    pub outcome: Option<RunOutcome>,
    pub step_index: usize,
    pub plan_len: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One saved transition of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    pub sequence: i64,
    pub workflow_id: String,
    pub next: Node,
    pub step_index: usize,
    pub review_status: String,
    pub retry_count: u32,
    pub replanning_count: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Durable checkpointer backed by a single SQLite connection
#[derive(Clone)]
pub struct SqliteCheckpointer {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointer {
    /// Open (or create) the database at `path` and make sure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self::from_connection(conn);
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self::from_connection(conn);
        store.initialize_schema()?;
        Ok(store)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Task("checkpoint connection poisoned".to_string()))
    }

    pub fn initialize_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,

                -- Position
                next_node TEXT NOT NULL,
                outcome TEXT,
                step_index INTEGER NOT NULL,
                plan_len INTEGER NOT NULL,

                -- Full WorkflowState as JSON
                state_json TEXT NOT NULL,

                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_checkpoints_updated_at ON checkpoints(updated_at DESC);

            CREATE TABLE IF NOT EXISTS checkpoint_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                workflow_id TEXT NOT NULL,
                next_node TEXT NOT NULL,
                step_index INTEGER NOT NULL,
                review_status TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                replanning_count INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,

                FOREIGN KEY(session_id) REFERENCES checkpoints(session_id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_checkpoint_log_session ON checkpoint_log(session_id, sequence);

            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i32, StorageError> {
        let conn = self.lock()?;
        let version: i32 =
            conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
        Ok(version)
    }

    pub fn save_blocking(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        let next = serde_json::to_string(&checkpoint.next)?;
        let outcome = checkpoint
            .outcome
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let state_json = serde_json::to_string(&checkpoint.state)?;
        let saved_at = timestamp(checkpoint.saved_at);
        let state = &checkpoint.state;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        // upsert keeps the row (and its log) instead of replacing it
        tx.execute(
            r#"
            INSERT INTO checkpoints (
                session_id, workflow_id, next_node, outcome, step_index, plan_len,
                state_json, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(session_id) DO UPDATE SET
                workflow_id = excluded.workflow_id,
                next_node = excluded.next_node,
                outcome = excluded.outcome,
                step_index = excluded.step_index,
                plan_len = excluded.plan_len,
                state_json = excluded.state_json,
                updated_at = excluded.updated_at
            "#,
            params![
                checkpoint.session_id,
                checkpoint.workflow_id,
                next,
                outcome,
                state.current_step_index as i64,
                state.plan.len() as i64,
                state_json,
                saved_at,
            ],
        )?;

        let sequence: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence), -1) + 1 FROM checkpoint_log WHERE session_id = ?1",
            params![checkpoint.session_id],
            |row| row.get(0),
        )?;
        tx.execute(
            r#"
            INSERT INTO checkpoint_log (
                session_id, sequence, workflow_id, next_node, step_index,
                review_status, retry_count, replanning_count, recorded_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                checkpoint.session_id,
                sequence,
                checkpoint.workflow_id,
                next,
                state.current_step_index as i64,
                state.review_status.as_str(),
                state.retry_count,
                state.replanning_count,
                saved_at,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_blocking(&self, session_id: &str) -> Result<Option<Checkpoint>, StorageError> {
        let conn = self.lock()?;
        let checkpoint = conn
            .query_row(
                r#"
                SELECT session_id, workflow_id, next_node, outcome, state_json, updated_at
                FROM checkpoints
                WHERE session_id = ?1
                "#,
                params![session_id],
                map_checkpoint_row,
            )
            .optional()?;
        Ok(checkpoint)
    }

    /// Sessions ordered by most recent activity
    pub fn list_sessions(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionSummary>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT session_id, workflow_id, next_node, outcome, step_index, plan_len,
                   created_at, updated_at
            FROM checkpoints
            ORDER BY updated_at DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )?;
        let sessions = stmt
            .query_map(params![limit as i64, offset as i64], map_summary_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Transition log of a session, oldest first; `limit` keeps the most recent
    pub fn history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TransitionRecord>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT sequence, workflow_id, next_node, step_index, review_status,
                   retry_count, replanning_count, recorded_at
            FROM checkpoint_log
            WHERE session_id = ?1
            ORDER BY sequence DESC
            LIMIT ?2
            "#,
        )?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut records = stmt
            .query_map(params![session_id, limit], map_transition_row)?
            .collect::<Result<Vec<_>, _>>()?;
        records.reverse();
        Ok(records)
    }

    /// Returns false when the session did not exist
    pub fn delete_session(&self, session_id: &str) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM checkpoints WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(deleted > 0)
    }

    /// Delete sessions with no activity since `cutoff`
    pub fn delete_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM checkpoints WHERE updated_at < ?1",
            params![timestamp(cutoff)],
        )?;
        Ok(deleted)
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        let store = self.clone();
        let checkpoint = checkpoint.clone();
        tokio::task::spawn_blocking(move || store.save_blocking(&checkpoint))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, StorageError> {
        let store = self.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || store.load_blocking(&session_id))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

/// Fixed-width UTC timestamps so text comparison matches time order
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    column: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_time(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn parse_node(column: usize, raw: &str) -> rusqlite::Result<Node> {
    serde_json::from_str(raw).map_err(|e| conversion_error(column, e))
}

fn parse_outcome(column: usize, raw: Option<String>) -> rusqlite::Result<Option<RunOutcome>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| conversion_error(column, e))
}

fn map_checkpoint_row(row: &Row) -> rusqlite::Result<Checkpoint> {
    let session_id: String = row.get(0)?;
    let workflow_id: String = row.get(1)?;
    let next_str: String = row.get(2)?;
    let outcome_str: Option<String> = row.get(3)?;
    let state_str: String = row.get(4)?;
    let updated_at_str: String = row.get(5)?;

    let state = serde_json::from_str(&state_str).map_err(|e| conversion_error(4, e))?;

    Ok(Checkpoint {
        session_id,
        workflow_id,
        next: parse_node(2, &next_str)?,
        outcome: parse_outcome(3, outcome_str)?,
        state,
        saved_at: parse_time(5, &updated_at_str)?,
    })
}

fn map_summary_row(row: &Row) -> rusqlite::Result<SessionSummary> {
    let next_str: String = row.get(2)?;
    let outcome_str: Option<String> = row.get(3)?;
    let step_index: i64 = row.get(4)?;
    let plan_len: i64 = row.get(5)?;
    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;

    Ok(SessionSummary {
        session_id: row.get(0)?,
        workflow_id: row.get(1)?,
        next: parse_node(2, &next_str)?,
        outcome: parse_outcome(3, outcome_str)?,
        step_index: step_index.max(0) as usize,
        plan_len: plan_len.max(0) as usize,
        created_at: parse_time(6, &created_at_str)?,
        updated_at: parse_time(7, &updated_at_str)?,
    })
}

fn map_transition_row(row: &Row) -> rusqlite::Result<TransitionRecord> {
    let next_str: String = row.get(2)?;
    let step_index: i64 = row.get(3)?;
    let recorded_at_str: String = row.get(7)?;

    Ok(TransitionRecord {
        sequence: row.get(0)?,
        workflow_id: row.get(1)?,
        next: parse_node(2, &next_str)?,
        step_index: step_index.max(0) as usize,
        review_status: row.get(4)?,
        retry_count: row.get(5)?,
        replanning_count: row.get(6)?,
        recorded_at: parse_time(7, &recorded_at_str)?,
    })
}
