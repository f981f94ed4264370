//! Run handlers: the bounded in-memory recent-run map, goal submission, and
//! run CRUD backed by the optional persistent store.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use maestro::{Run, RunOptions};
use run_event::RunEvent;

use crate::app::AppState;
use crate::sse::RunEventObserver;

/// Bounded recent-run map with oldest-by-insertion eviction. Submission order
/// tracks `started_at`, so insertion-order eviction drops the oldest run.
pub(crate) struct RunMap {
    max_runs: usize,
    entries: Mutex<Vec<(String, Arc<RwLock<Run>>)>>,
}

impl RunMap {
    pub(crate) fn new(max_runs: usize) -> Self {
        Self {
            max_runs: max_runs.max(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    fn insert(&self, run_id: String, run: Arc<RwLock<Run>>) {
        let mut entries = self.entries.lock().expect("run map lock poisoned");
        entries.push((run_id, run));
        while entries.len() > self.max_runs {
            entries.remove(0);
        }
    }

    fn get(&self, run_id: &str) -> Option<Arc<RwLock<Run>>> {
        self.entries
            .lock()
            .expect("run map lock poisoned")
            .iter()
            .find(|(id, _)| id == run_id)
            .map(|(_, run)| Arc::clone(run))
    }

    fn remove(&self, run_id: &str) -> bool {
        let mut entries = self.entries.lock().expect("run map lock poisoned");
        let before = entries.len();
        entries.retain(|(id, _)| id != run_id);
        entries.len() != before
    }

    fn all(&self) -> Vec<(String, Arc<RwLock<Run>>)> {
        self.entries
            .lock()
            .expect("run map lock poisoned")
            .iter()
            .map(|(id, run)| (id.clone(), Arc::clone(run)))
            .collect()
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// POST /api/runs — validate the goal, mint a run id, spawn the loop, 201.
pub(crate) async fn submit_goal(State(state): State<Arc<AppState>>, body: String) -> Response {
    let value: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "invalid JSON body"),
    };
    let goal = value
        .get("goal")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if goal.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "goal is required");
    }

    let run_id = Uuid::new_v4().to_string();
    let mut options = RunOptions {
        run_id: Some(run_id.clone()),
        ..RunOptions::default()
    };
    if let Some(max_concurrency) = value.get("maxConcurrency").and_then(Value::as_u64) {
        options.max_concurrency = (max_concurrency as usize).max(1);
    }
    if let Some(max_steps) = value.get("maxSteps").and_then(Value::as_u64) {
        options.max_steps = (max_steps as u32).max(1);
    }

    state.broadcaster.send(RunEvent::RunStarted {
        run_id: run_id.clone(),
        goal: goal.to_string(),
    });
    let observer = Arc::new(RunEventObserver::new(&run_id, state.broadcaster.clone()));
    let (run, _handle) = state.orchestrator.spawn(goal, options, observer);
    state.runs.insert(run_id.clone(), run);

    (
        StatusCode::CREATED,
        Json(json!({ "runId": run_id, "goal": goal })),
    )
        .into_response()
}

/// GET /api/runs — live snapshots plus stored history, most recent first.
pub(crate) async fn list_runs(State(state): State<Arc<AppState>>) -> Response {
    let mut runs: Vec<Run> = Vec::new();
    for (_, run) in state.runs.all() {
        runs.push(run.read().await.clone());
    }
    if let Some(store) = &state.store {
        match store.list(None).await {
            Ok(stored) => {
                for run in stored {
                    if !runs.iter().any(|r| r.run_id == run.run_id) {
                        runs.push(run);
                    }
                }
            }
            Err(e) => warn!("run store list failed: {}", e),
        }
    }
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Json(runs).into_response()
}

/// GET /api/runs/:id
pub(crate) async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Response {
    if let Some(run) = state.runs.get(&run_id) {
        let snapshot = run.read().await.clone();
        return Json(snapshot).into_response();
    }
    if let Some(store) = &state.store {
        match store.get(&run_id).await {
            Ok(Some(run)) => return Json(run).into_response(),
            Ok(None) => {}
            Err(e) => warn!("run store get failed: {}", e),
        }
    }
    error_response(StatusCode::NOT_FOUND, "Run not found")
}

/// DELETE /api/runs/:id
pub(crate) async fn delete_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Response {
    let removed_live = state.runs.remove(&run_id);
    let removed_stored = match &state.store {
        Some(store) => store.delete(&run_id).await.unwrap_or_else(|e| {
            warn!("run store delete failed: {}", e);
            false
        }),
        None => false,
    };
    if !removed_live && !removed_stored {
        return error_response(StatusCode::NOT_FOUND, "Run not found");
    }
    state.broadcaster.send(RunEvent::RunDeleted {
        run_id: run_id.clone(),
    });
    Json(json!({ "deleted": true, "runId": run_id })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: &str) -> Arc<RwLock<Run>> {
        Arc::new(RwLock::new(Run::new(id, "g")))
    }

    #[test]
    fn run_map_evicts_oldest_insertion() {
        let map = RunMap::new(2);
        map.insert("a".to_string(), handle("a"));
        map.insert("b".to_string(), handle("b"));
        map.insert("c".to_string(), handle("c"));
        assert!(map.get("a").is_none());
        assert!(map.get("b").is_some());
        assert!(map.get("c").is_some());
    }

    #[test]
    fn run_map_remove_reports_presence() {
        let map = RunMap::new(5);
        map.insert("a".to_string(), handle("a"));
        assert!(map.remove("a"));
        assert!(!map.remove("a"));
    }
}
