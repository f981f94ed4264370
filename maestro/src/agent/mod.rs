//! Executor agents: the uniform adapter surface and its three concrete
//! implementations (in-process callable, HTTP endpoint, gateway chat).
//!
//! # Streaming support
//!
//! `AgentAdapter` supports streaming via `execute_stream()`, which accepts a
//! `Sender<TaskChunk>` for emitting partial output as it arrives. Adapters
//! that cannot stream use the default implementation that calls `execute()`
//! and sends the full output as one chunk.

mod function;
mod gateway;
mod http;
mod registry;
pub mod soul;

pub use function::FunctionAdapter;
pub use gateway::GatewayAdapter;
pub use http::HttpAdapter;
pub use registry::{AgentHealth, AgentRegistry, RegistryError};
pub use soul::SoulDoc;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use run_event::TaskResult;

/// Default per-task execution timeout for the function and HTTP adapters.
pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(60);

/// One piece of streamed task output.
#[derive(Clone, Debug)]
pub struct TaskChunk {
    pub content: String,
}

/// Adapter-level failure. Most failures are *contained*: adapters fold them
/// into a non-ok [`TaskResult`] so one bad task never aborts its siblings;
/// `Err` is reserved for faults outside the task itself.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("task timed out after {0}ms")]
    Timeout(u64),
}

/// Uniform executor surface: name, type tag, capabilities, execute.
///
/// A capability interface, not a base class — the concrete adapters are
/// parallel implementations. `name` routes explicitly; `capabilities` route
/// by tag when no name matches.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Type tag, e.g. "function", "http", "gateway".
    fn kind(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn capabilities(&self) -> &[String] {
        &[]
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Executes one task to completion.
    async fn execute(&self, task: &str) -> Result<TaskResult, AgentError>;

    /// Streaming variant: send partial output through `chunk_tx` as it
    /// arrives, then return the complete result.
    ///
    /// Default implementation calls `execute()` and sends the full output as
    /// a single chunk.
    async fn execute_stream(
        &self,
        task: &str,
        chunk_tx: mpsc::Sender<TaskChunk>,
    ) -> Result<TaskResult, AgentError> {
        let result = self.execute(task).await?;
        if !result.output.is_empty() {
            let _ = chunk_tx
                .send(TaskChunk {
                    content: result.output.clone(),
                })
                .await;
        }
        Ok(result)
    }

    /// Liveness probe. Adapters without a meaningful probe report healthy.
    async fn health_check(&self) -> Result<bool, AgentError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubAdapter;

    #[async_trait]
    impl AgentAdapter for StubAdapter {
        fn name(&self) -> &str {
            "stub"
        }

        fn kind(&self) -> &str {
            "function"
        }

        async fn execute(&self, task: &str) -> Result<TaskResult, AgentError> {
            Ok(TaskResult::ok(format!("echo: {}", task), 1))
        }
    }

    #[tokio::test]
    async fn default_execute_stream_sends_single_chunk() {
        let adapter = StubAdapter;
        let (tx, mut rx) = mpsc::channel(4);
        let result = adapter.execute_stream("hello", tx).await.unwrap();
        assert_eq!(result.output, "echo: hello");
        let chunk = rx.recv().await.expect("one chunk");
        assert_eq!(chunk.content, "echo: hello");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn default_health_check_is_healthy() {
        assert!(StubAdapter.health_check().await.unwrap());
    }
}
