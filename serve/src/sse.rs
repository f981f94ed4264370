//! SSE fan-out: one broadcast channel, one `data: <json>\n\n` line per event.
//!
//! Fan-out is best-effort: a slow subscriber lags and drops on its own
//! channel without blocking siblings.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use maestro::{RunObserver, StepTask};
use run_event::{RunEvent, TaskOutcome, TaskResult};

use crate::app::AppState;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for [`RunEvent`]s.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<RunEvent>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Sends to every current subscriber; no-op with none connected.
    pub fn send(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// GET /api/events: registers the subscriber and streams events until the
/// socket closes. The keep-alive comment line holds idle connections open.
pub(crate) async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|incoming| async move {
        let event = incoming.ok()?; // lagged subscribers skip missed events
        let json = serde_json::to_string(&event).ok()?;
        Some(Ok(Event::default().data(json)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Bridges one run's observer callbacks into broadcast events.
pub struct RunEventObserver {
    run_id: String,
    broadcaster: Broadcaster,
    started: Instant,
}

impl RunEventObserver {
    pub fn new(run_id: impl Into<String>, broadcaster: Broadcaster) -> Self {
        Self {
            run_id: run_id.into(),
            broadcaster,
            started: Instant::now(),
        }
    }
}

#[async_trait]
impl RunObserver for RunEventObserver {
    fn wants_chunks(&self) -> bool {
        true
    }

    async fn on_thinking(&self, step_number: u32) {
        self.broadcaster.send(RunEvent::StepThinking {
            run_id: self.run_id.clone(),
            step_number,
        });
    }

    async fn on_step_start(&self, step_number: u32, task_ids: &[String], tasks: &[StepTask]) {
        self.broadcaster.send(RunEvent::StepStarted {
            run_id: self.run_id.clone(),
            step_number,
            task_ids: task_ids.to_vec(),
            tasks: Some(tasks.iter().map(|t| t.task.clone()).collect()),
        });
    }

    async fn on_task_start(&self, step_number: u32, task_id: &str) {
        self.broadcaster.send(RunEvent::TaskStarted {
            run_id: self.run_id.clone(),
            step_number,
            task_id: task_id.to_string(),
        });
    }

    async fn on_task_chunk(&self, step_number: u32, task_id: &str, content: &str, done: bool) {
        self.broadcaster.send(RunEvent::TaskChunk {
            run_id: self.run_id.clone(),
            step_number,
            task_id: task_id.to_string(),
            content: content.to_string(),
            done,
        });
    }

    async fn on_task_end(
        &self,
        step_number: u32,
        task_id: &str,
        result: &TaskResult,
        outcome: TaskOutcome,
    ) {
        self.broadcaster.send(RunEvent::TaskEnded {
            run_id: self.run_id.clone(),
            step_number,
            task_id: task_id.to_string(),
            result: result.clone(),
            status: outcome,
        });
    }

    async fn on_step_end(&self, step_number: u32) {
        self.broadcaster.send(RunEvent::StepEnded {
            run_id: self.run_id.clone(),
            step_number,
        });
    }

    async fn on_finish(&self, answer: &str) {
        self.broadcaster.send(RunEvent::RunComplete {
            run_id: self.run_id.clone(),
            answer: Some(answer.to_string()),
            duration_ms: self.started.elapsed().as_millis() as u64,
        });
    }

    async fn on_error(&self, error: &str) {
        self.broadcaster.send(RunEvent::RunError {
            run_id: self.run_id.clone(),
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let broadcaster = Broadcaster::new();
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();
        broadcaster.send(RunEvent::RunDeleted {
            run_id: "r".to_string(),
        });
        assert!(matches!(rx1.recv().await.unwrap(), RunEvent::RunDeleted { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), RunEvent::RunDeleted { .. }));
    }

    #[tokio::test]
    async fn observer_emits_lifecycle_events() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();
        let observer = RunEventObserver::new("r1", broadcaster.clone());

        observer.on_thinking(1).await;
        observer.on_finish("done").await;

        match rx.recv().await.unwrap() {
            RunEvent::StepThinking { run_id, step_number } => {
                assert_eq!(run_id, "r1");
                assert_eq!(step_number, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        match rx.recv().await.unwrap() {
            RunEvent::RunComplete { answer, .. } => {
                assert_eq!(answer.as_deref(), Some("done"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let broadcaster = Broadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);
        broadcaster.send(RunEvent::RunDeleted {
            run_id: "r".to_string(),
        });
    }
}
