//! Remote HTTP executor: POSTs the task to an endpoint, reads the reply.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use run_event::TaskResult;

use crate::limiter::RateLimiter;

use super::{AgentAdapter, AgentError, DEFAULT_EXECUTE_TIMEOUT};

/// Agent backed by a remote HTTP endpoint.
///
/// Sends `{"task": "<prompt>"}` as JSON; accepts either a JSON body with an
/// `output` field or a plain-text body. Non-2xx statuses and timeouts become
/// non-ok results.
pub struct HttpAdapter {
    name: String,
    endpoint: String,
    description: Option<String>,
    capabilities: Vec<String>,
    timeout: Duration,
    limiter: Option<Arc<RateLimiter>>,
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            description: None,
            capabilities: Vec::new(),
            timeout: DEFAULT_EXECUTE_TIMEOUT,
            limiter: None,
            client: reqwest::Client::new(),
        }
    }

    /// Caps the request rate to the endpoint; rejections become non-ok
    /// results at the dispatch site.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
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

    fn output_from_body(body: &str) -> String {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => value
                .get("output")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string()),
            Err(_) => body.to_string(),
        }
    }
}

#[async_trait]
impl AgentAdapter for HttpAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "http"
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn execute(&self, task: &str) -> Result<TaskResult, AgentError> {
        let started = Instant::now();
        if let Some(limiter) = &self.limiter {
            if let Err(e) = limiter.acquire().await {
                return Ok(TaskResult::error(
                    e.to_string(),
                    started.elapsed().as_millis() as u64,
                ));
            }
        }
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&json!({ "task": task }))
            .send()
            .await;

        let elapsed = started.elapsed().as_millis() as u64;
        let result = match response {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                if status.is_success() {
                    TaskResult::ok(Self::output_from_body(&body), elapsed)
                } else {
                    TaskResult::error(format!("HTTP {}: {}", status.as_u16(), body), elapsed)
                }
            }
            Err(e) if e.is_timeout() => TaskResult::timeout(
                format!("task timed out after {}ms", self.timeout.as_millis()),
                elapsed,
            ),
            Err(e) => TaskResult::error(e.to_string(), elapsed),
        };
        Ok(result)
    }

    /// Probes the endpoint with a HEAD request; any response counts as alive.
    async fn health_check(&self) -> Result<bool, AgentError> {
        let probe = self
            .client
            .head(&self.endpoint)
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        match probe {
            Ok(_) => Ok(true),
            Err(e) => Err(AgentError::Execution(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_prefers_json_output_field() {
        assert_eq!(
            HttpAdapter::output_from_body(r#"{"output":"hello"}"#),
            "hello"
        );
    }

    #[test]
    fn output_falls_back_to_raw_body() {
        assert_eq!(HttpAdapter::output_from_body("plain text"), "plain text");
        assert_eq!(
            HttpAdapter::output_from_body(r#"{"other":"field"}"#),
            r#"{"other":"field"}"#
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_contained_error() {
        let adapter = HttpAdapter::new("remote", "http://127.0.0.1:1/task")
            .with_timeout(Duration::from_millis(200));
        let result = adapter.execute("x").await.unwrap();
        assert!(!result.is_ok());
    }

    #[tokio::test]
    async fn rate_limit_rejection_is_contained_error() {
        use crate::limiter::RateLimiterConfig;

        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            max_requests: 0,
            ..RateLimiterConfig::default()
        }));
        let adapter =
            HttpAdapter::new("remote", "http://127.0.0.1:1/task").with_rate_limiter(limiter);
        let result = adapter.execute("x").await.unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.output, "Rate limit exceeded");
    }
}
