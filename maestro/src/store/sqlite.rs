//! SQLite-backed run store. One table `runs`, indexed by started_at descending.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use crate::run::{Run, RunState};

use super::{RunStore, StoreError, DEFAULT_LIST_LIMIT};

/// SQLite store: columns
/// `run_id, goal, state, steps(JSON), final_answer, error, started_at, finished_at`.
pub struct SqliteRunStore {
    db_path: std::path::PathBuf,
}

impl SqliteRunStore {
    /// Creates the store and ensures the schema exists. `path` is the SQLite
    /// file path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = open(&db_path)?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                goal TEXT NOT NULL,
                state TEXT NOT NULL,
                steps TEXT NOT NULL,
                final_answer TEXT,
                error TEXT,
                started_at INTEGER NOT NULL,
                finished_at INTEGER
            )
            "#,
            [],
        )
        .map_err(backend)?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at DESC)",
            [],
        )
        .map_err(backend)?;
        Ok(Self { db_path })
    }
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn open(path: &Path) -> Result<rusqlite::Connection, StoreError> {
    rusqlite::Connection::open(path).map_err(backend)
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
    let state: String = row.get(2)?;
    let steps_json: String = row.get(3)?;
    Ok(Run {
        run_id: row.get(0)?,
        goal: row.get(1)?,
        state: state.parse().unwrap_or(RunState::Error),
        steps: serde_json::from_str(&steps_json).unwrap_or_default(),
        final_answer: row.get(4)?,
        error: row.get(5)?,
        started_at: row.get(6)?,
        finished_at: row.get(7)?,
    })
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn upsert(&self, run: &Run) -> Result<(), StoreError> {
        let db_path = self.db_path.clone();
        let run = run.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            let steps = serde_json::to_string(&run.steps).map_err(backend)?;
            conn.execute(
                r#"
                INSERT INTO runs (run_id, goal, state, steps, final_answer, error, started_at, finished_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(run_id) DO UPDATE SET
                    goal = excluded.goal,
                    state = excluded.state,
                    steps = excluded.steps,
                    final_answer = excluded.final_answer,
                    error = excluded.error,
                    started_at = excluded.started_at,
                    finished_at = excluded.finished_at
                "#,
                params![
                    run.run_id,
                    run.goal,
                    run.state.to_string(),
                    steps,
                    run.final_answer,
                    run.error,
                    run.started_at,
                    run.finished_at,
                ],
            )
            .map_err(backend)?;
            Ok::<(), StoreError>(())
        })
        .await
        .map_err(backend)?
    }

    async fn get(&self, run_id: &str) -> Result<Option<Run>, StoreError> {
        let db_path = self.db_path.clone();
        let run_id = run_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            conn.query_row(
                "SELECT run_id, goal, state, steps, final_answer, error, started_at, finished_at
                 FROM runs WHERE run_id = ?1",
                params![run_id],
                row_to_run,
            )
            .optional()
            .map_err(backend)
        })
        .await
        .map_err(backend)?
    }

    async fn delete(&self, run_id: &str) -> Result<bool, StoreError> {
        let db_path = self.db_path.clone();
        let run_id = run_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            let affected = conn
                .execute("DELETE FROM runs WHERE run_id = ?1", params![run_id])
                .map_err(backend)?;
            Ok::<bool, StoreError>(affected > 0)
        })
        .await
        .map_err(backend)?
    }

    async fn list(&self, limit: Option<u32>) -> Result<Vec<Run>, StoreError> {
        let db_path = self.db_path.clone();
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            let mut stmt = conn
                .prepare(
                    "SELECT run_id, goal, state, steps, final_answer, error, started_at, finished_at
                     FROM runs ORDER BY started_at DESC LIMIT ?1",
                )
                .map_err(backend)?;
            let rows = stmt
                .query_map(params![limit as i64], row_to_run)
                .map_err(backend)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(backend)?);
            }
            Ok::<Vec<Run>, StoreError>(out)
        })
        .await
        .map_err(backend)?
    }
}
