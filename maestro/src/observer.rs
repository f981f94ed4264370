//! Run lifecycle callbacks.
//!
//! The loop invokes these from its own task in a fixed order per step:
//! `on_thinking` → `on_step_start` → (interleaved task start/chunk/end) →
//! `on_step_end`; a step's `on_step_end` happens-before the next step's
//! `on_thinking`. All methods default to no-ops so observers implement only
//! what they need.

use async_trait::async_trait;

use run_event::{TaskOutcome, TaskResult};

use crate::run::StepTask;

/// Observer of one run's lifecycle. The dashboard bridges these into SSE
/// events; tests record orderings.
#[async_trait]
pub trait RunObserver: Send + Sync {
    /// When true, streaming-capable adapters are wired to `on_task_chunk`.
    fn wants_chunks(&self) -> bool {
        false
    }

    async fn on_thinking(&self, step_number: u32) {
        let _ = step_number;
    }

    async fn on_step_start(&self, step_number: u32, task_ids: &[String], tasks: &[StepTask]) {
        let _ = (step_number, task_ids, tasks);
    }

    async fn on_task_start(&self, step_number: u32, task_id: &str) {
        let _ = (step_number, task_id);
    }

    async fn on_task_chunk(&self, step_number: u32, task_id: &str, content: &str, done: bool) {
        let _ = (step_number, task_id, content, done);
    }

    async fn on_task_end(
        &self,
        step_number: u32,
        task_id: &str,
        result: &TaskResult,
        outcome: TaskOutcome,
    ) {
        let _ = (step_number, task_id, result, outcome);
    }

    async fn on_step_end(&self, step_number: u32) {
        let _ = step_number;
    }

    async fn on_finish(&self, answer: &str) {
        let _ = answer;
    }

    async fn on_error(&self, error: &str) {
        let _ = error;
    }
}

/// Observer that ignores everything.
pub struct NoopObserver;

#[async_trait]
impl RunObserver for NoopObserver {}
