//! In-process callable executor: wraps an async closure as an agent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;

use run_event::TaskResult;

use super::{AgentAdapter, AgentError, DEFAULT_EXECUTE_TIMEOUT};

type TaskFn = dyn Fn(String) -> BoxFuture<'static, Result<String, String>> + Send + Sync;

/// Agent backed by an in-process async function.
///
/// The callable receives the task prompt and returns output or an error
/// message; both outcomes (and timeouts) are folded into the `TaskResult`.
pub struct FunctionAdapter {
    name: String,
    description: Option<String>,
    capabilities: Vec<String>,
    timeout: Duration,
    f: Arc<TaskFn>,
}

impl FunctionAdapter {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            capabilities: Vec::new(),
            timeout: DEFAULT_EXECUTE_TIMEOUT,
            f: Arc::new(move |task| Box::pin(f(task))),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AgentAdapter for FunctionAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "function"
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn execute(&self, task: &str) -> Result<TaskResult, AgentError> {
        let started = Instant::now();
        let fut = (self.f)(task.to_string());
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(output)) => TaskResult::ok(output, started.elapsed().as_millis() as u64),
            Ok(Err(message)) => TaskResult::error(message, started.elapsed().as_millis() as u64),
            Err(_) => TaskResult::timeout(
                format!("task timed out after {}ms", self.timeout.as_millis()),
                started.elapsed().as_millis() as u64,
            ),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use run_event::TaskStatus;

    #[tokio::test]
    async fn executes_callable() {
        let adapter = FunctionAdapter::new("echo", |task: String| async move {
            Ok(format!("Done: {}", task))
        });
        let result = adapter.execute("write code").await.unwrap();
        assert_eq!(result.status, TaskStatus::Ok);
        assert_eq!(result.output, "Done: write code");
        assert!(result.duration_ms().is_some());
    }

    #[tokio::test]
    async fn callable_error_becomes_error_result() {
        let adapter =
            FunctionAdapter::new("fails", |_task: String| async move { Err("nope".to_string()) });
        let result = adapter.execute("x").await.unwrap();
        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(result.output, "nope");
    }

    #[tokio::test]
    async fn slow_callable_times_out() {
        let adapter = FunctionAdapter::new("slow", |_task: String| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("never".to_string())
        })
        .with_timeout(Duration::from_millis(20));
        let result = adapter.execute("x").await.unwrap();
        assert_eq!(result.status, TaskStatus::Timeout);
        assert!(result.output.contains("timed out"), "{}", result.output);
    }

    #[tokio::test]
    async fn builder_sets_metadata() {
        let adapter = FunctionAdapter::new("researcher", |t: String| async move { Ok(t) })
            .with_description("finds things")
            .with_capabilities(["research", "web"]);
        assert_eq!(adapter.description(), Some("finds things"));
        assert_eq!(adapter.capabilities(), ["research", "web"]);
        assert_eq!(adapter.kind(), "function");
    }
}
