//! Step executor: dispatch one batch of tasks with bounded concurrency.
//!
//! Tasks run in insertion order as fixed-size windows of `max_concurrency`:
//! each window is awaited to completion before the next begins. This windowed
//! fan-out is deliberate (slots idle when durations are skewed) and is part of
//! the loop's observable behavior; it is not a sliding pool.
//!
//! Failure isolation: a task's error becomes its own non-ok result; siblings
//! are never cancelled.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tokio::sync::mpsc;

use run_event::{TaskOutcome, TaskResult};

use crate::agent::{AgentAdapter, AgentRegistry, TaskChunk};
use crate::observer::RunObserver;
use crate::run::{Step, StepTask, StepTaskStatus};

/// Executes every task of `step` to a terminal status.
pub async fn execute_step(
    step: &mut Step,
    registry: &AgentRegistry,
    max_concurrency: usize,
    observer: &Arc<dyn RunObserver>,
) {
    let window = max_concurrency.max(1);
    let step_number = step.step_number;
    for batch in step.tasks.chunks_mut(window) {
        join_all(
            batch
                .iter_mut()
                .map(|task| run_task(step_number, task, registry, observer)),
        )
        .await;
    }
}

async fn run_task(
    step_number: u32,
    task: &mut StepTask,
    registry: &AgentRegistry,
    observer: &Arc<dyn RunObserver>,
) {
    observer.on_task_start(step_number, &task.id).await;

    let adapter = task
        .agent
        .as_deref()
        .and_then(|key| registry.pick(key))
        .or_else(|| registry.first());

    let result = match adapter {
        Some(adapter) => {
            task.status = StepTaskStatus::Running;
            dispatch(step_number, task, adapter, observer).await
        }
        None => TaskResult::error(format!("No agent available for task '{}'", task.id), 0),
    };

    task.complete(result.clone());
    let outcome = match task.status {
        StepTaskStatus::Done => TaskOutcome::Done,
        _ => TaskOutcome::Failed,
    };
    observer
        .on_task_end(step_number, &task.id, &result, outcome)
        .await;
}

async fn dispatch(
    step_number: u32,
    task: &StepTask,
    adapter: Arc<dyn AgentAdapter>,
    observer: &Arc<dyn RunObserver>,
) -> TaskResult {
    let started = Instant::now();
    let outcome = if adapter.supports_streaming() && observer.wants_chunks() {
        let (tx, mut rx) = mpsc::channel::<TaskChunk>(64);
        let forward = async {
            while let Some(chunk) = rx.recv().await {
                observer
                    .on_task_chunk(step_number, &task.id, &chunk.content, false)
                    .await;
            }
        };
        let (result, ()) = tokio::join!(adapter.execute_stream(&task.task, tx), forward);
        result
    } else {
        adapter.execute(&task.task).await
    };

    match outcome {
        Ok(result) => result,
        Err(e) => TaskResult::error(e.to_string(), started.elapsed().as_millis() as u64),
    }
}
