//! Agent registry: name/capability routing and cached health snapshots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use super::AgentAdapter;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent '{0}' is already registered")]
    Duplicate(String),
}

/// Cached outcome of one adapter's health check.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// Epoch milliseconds of the check.
    pub last_check: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Registry of executor agents, routed by name first, then capability.
///
/// Insertion order matters: capability routing returns the first match, and
/// the step executor falls back to the first registered adapter when a task
/// names no resolvable agent.
#[derive(Default)]
pub struct AgentRegistry {
    adapters: Vec<Arc<dyn AgentAdapter>>,
    health: RwLock<HashMap<String, AgentHealth>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter; duplicate names are rejected.
    pub fn add(&mut self, adapter: Arc<dyn AgentAdapter>) -> Result<(), RegistryError> {
        if self.adapters.iter().any(|a| a.name() == adapter.name()) {
            return Err(RegistryError::Duplicate(adapter.name().to_string()));
        }
        self.adapters.push(adapter);
        Ok(())
    }

    /// Resolves a routing key: an adapter with that exact name, else the first
    /// adapter (insertion order) listing it as a capability, else none.
    pub fn pick(&self, key: &str) -> Option<Arc<dyn AgentAdapter>> {
        if let Some(by_name) = self.adapters.iter().find(|a| a.name() == key) {
            return Some(Arc::clone(by_name));
        }
        self.adapters
            .iter()
            .find(|a| a.capabilities().iter().any(|c| c == key))
            .map(Arc::clone)
    }

    /// First registered adapter; the dispatch fallback.
    pub fn first(&self) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters.first().map(Arc::clone)
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// All adapters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AgentAdapter>> {
        self.adapters.iter()
    }

    /// Runs every adapter's health check in parallel and caches the outcomes.
    pub async fn check_all_health(&self) -> HashMap<String, AgentHealth> {
        let checks = self.adapters.iter().map(|adapter| async move {
            let started = Instant::now();
            let outcome = adapter.health_check().await;
            let response_time_ms = started.elapsed().as_millis() as u64;
            let health = match outcome {
                Ok(healthy) => AgentHealth {
                    healthy,
                    response_time_ms: Some(response_time_ms),
                    last_check: chrono::Utc::now().timestamp_millis(),
                    error: None,
                },
                Err(e) => AgentHealth {
                    healthy: false,
                    response_time_ms: Some(response_time_ms),
                    last_check: chrono::Utc::now().timestamp_millis(),
                    error: Some(e.to_string()),
                },
            };
            (adapter.name().to_string(), health)
        });
        let snapshot: HashMap<String, AgentHealth> = join_all(checks).await.into_iter().collect();
        *self.health.write().await = snapshot.clone();
        snapshot
    }

    /// Last cached health snapshot (empty before the first check).
    pub async fn health_snapshot(&self) -> HashMap<String, AgentHealth> {
        self.health.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, FunctionAdapter};
    use async_trait::async_trait;
    use run_event::TaskResult;

    fn echo(name: &str) -> Arc<dyn AgentAdapter> {
        Arc::new(FunctionAdapter::new(name, |t: String| async move { Ok(t) }))
    }

    fn with_caps(name: &str, caps: &[&str]) -> Arc<dyn AgentAdapter> {
        Arc::new(
            FunctionAdapter::new(name, |t: String| async move { Ok(t) })
                .with_capabilities(caps.iter().copied()),
        )
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut registry = AgentRegistry::new();
        registry.add(echo("a")).unwrap();
        let err = registry.add(echo("a")).unwrap_err();
        assert!(err.to_string().contains("already registered"), "{}", err);
    }

    #[test]
    fn pick_prefers_exact_name() {
        let mut registry = AgentRegistry::new();
        registry.add(with_caps("coder", &["code"])).unwrap();
        registry.add(with_caps("reviewer", &["code"])).unwrap();
        assert_eq!(registry.pick("coder").unwrap().name(), "coder");
    }

    #[test]
    fn pick_falls_back_to_first_capability_match() {
        let mut registry = AgentRegistry::new();
        registry.add(with_caps("coder", &["code"])).unwrap();
        registry.add(with_caps("reviewer", &["code", "review"])).unwrap();
        assert_eq!(registry.pick("code").unwrap().name(), "coder");
        assert_eq!(registry.pick("review").unwrap().name(), "reviewer");
    }

    #[test]
    fn pick_unknown_returns_none() {
        let mut registry = AgentRegistry::new();
        registry.add(echo("a")).unwrap();
        assert!(registry.pick("unknown").is_none());
    }

    #[tokio::test]
    async fn health_check_runs_in_parallel_and_caches() {
        struct Unhealthy;

        #[async_trait]
        impl AgentAdapter for Unhealthy {
            fn name(&self) -> &str {
                "down"
            }

            fn kind(&self) -> &str {
                "function"
            }

            async fn execute(&self, _task: &str) -> Result<TaskResult, AgentError> {
                Ok(TaskResult::ok("", 0))
            }

            async fn health_check(&self) -> Result<bool, AgentError> {
                Err(AgentError::Execution("unreachable".to_string()))
            }
        }

        let mut registry = AgentRegistry::new();
        registry.add(echo("up")).unwrap();
        registry.add(Arc::new(Unhealthy)).unwrap();

        let snapshot = registry.check_all_health().await;
        assert!(snapshot["up"].healthy);
        assert!(!snapshot["down"].healthy);
        assert_eq!(snapshot["down"].error.as_deref(), Some("execution failed: unreachable"));

        let cached = registry.health_snapshot().await;
        assert_eq!(cached.len(), 2);
    }
}
