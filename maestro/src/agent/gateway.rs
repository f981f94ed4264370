//! Gateway-chat executor: runs tasks as chat turns on a remote gateway agent.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use run_event::TaskResult;

use crate::cache::{task_key, TaskCache};
use crate::gateway::{ChatOptions, DiscoveredAgent, GatewayClient, GatewayError};
use crate::limiter::RateLimiter;

use super::{AgentAdapter, AgentError};

/// Agent backed by a gateway chat session.
///
/// Every task is sent as one chat message, prefixed by the agent's role
/// prompt when present. Each adapter instance tags its own session so the
/// gateway groups the conversation.
pub struct GatewayAdapter {
    name: String,
    description: Option<String>,
    capabilities: Vec<String>,
    role_prompt: Option<String>,
    session_key: String,
    agent_id: Option<String>,
    limiter: Option<Arc<RateLimiter>>,
    cache: Option<Arc<TaskCache>>,
    client: Arc<GatewayClient>,
}

impl GatewayAdapter {
    pub fn new(name: impl Into<String>, client: Arc<GatewayClient>) -> Self {
        let name = name.into();
        let session_key = format!("agent:{}:{}", name, uuid::Uuid::new_v4());
        Self {
            name,
            description: None,
            capabilities: Vec::new(),
            role_prompt: None,
            session_key,
            agent_id: None,
            limiter: None,
            cache: None,
            client,
        }
    }

    /// Builds an adapter from a discovery record (SOUL.md metadata included).
    pub fn from_discovered(agent: DiscoveredAgent, client: Arc<GatewayClient>) -> Self {
        let mut adapter = Self::new(agent.name, client);
        adapter.agent_id = Some(agent.id);
        adapter.description = agent.description;
        adapter.capabilities = agent.capabilities;
        adapter.role_prompt = agent.role_prompt;
        adapter
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Role prompt prepended verbatim to every task.
    pub fn with_role_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.role_prompt = Some(prompt.into());
        self
    }

    /// Caps the chat rate to the gateway; rejections become non-ok results.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Reuses replies for identical tasks (keyed by [`task_key`]).
    pub fn with_cache(mut self, cache: Arc<TaskCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn compose_message(&self, task: &str) -> String {
        match &self.role_prompt {
            Some(prompt) => format!("{}\n\n{}", prompt, task),
            None => task.to_string(),
        }
    }
}

#[async_trait]
impl AgentAdapter for GatewayAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "gateway"
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn execute(&self, task: &str) -> Result<TaskResult, AgentError> {
        let started = Instant::now();
        let key = self
            .cache
            .as_ref()
            .map(|_| task_key(task, Some(self.name.as_str())));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(reply) = cache.get(key).await {
                return Ok(TaskResult::ok(reply, started.elapsed().as_millis() as u64)
                    .with_metadata("cached", serde_json::Value::Bool(true)));
            }
        }
        if let Some(limiter) = &self.limiter {
            if let Err(e) = limiter.acquire().await {
                return Ok(TaskResult::error(
                    e.to_string(),
                    started.elapsed().as_millis() as u64,
                ));
            }
        }

        let message = self.compose_message(task);
        let mut options = ChatOptions::new(&self.session_key);
        options.agent_id = self.agent_id.clone();
        let outcome = self.client.chat(&message, options).await;
        let elapsed = started.elapsed().as_millis() as u64;
        let result = match outcome {
            Ok(reply) => {
                if let (Some(cache), Some(key)) = (&self.cache, &key) {
                    cache.set(key.clone(), reply.clone()).await;
                }
                TaskResult::ok(reply, elapsed)
            }
            Err(GatewayError::Timeout { .. }) => {
                TaskResult::timeout("chat timed out".to_string(), elapsed)
            }
            Err(e) => TaskResult::error(e.to_string(), elapsed),
        };
        Ok(result)
    }

    /// Healthy when the gateway answers a `health` call.
    async fn health_check(&self) -> Result<bool, AgentError> {
        self.client
            .call("health", None, None)
            .await
            .map(|_| true)
            .map_err(|e| AgentError::Execution(e.to_string()))
    }
}
