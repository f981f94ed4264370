//! Thinker abstraction for the orchestration loop.
//!
//! The loop depends on a callable that maps a context string to raw model
//! output; this module defines the trait, a scripted implementation for tests,
//! and the gateway-backed implementation used in production.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::OrchestratorError;
use crate::gateway::{ChatOptions, GatewayRegistry};

/// The external language model consulted once per step.
///
/// Implementations: [`GatewayThinker`] (chat over a connected gateway),
/// [`ScriptedThinker`] (canned replies), or any injected callable.
#[async_trait]
pub trait Thinker: Send + Sync {
    /// One think turn: read the assembled context, return raw model output.
    async fn think(&self, context: &str) -> Result<String, OrchestratorError>;
}

/// Scripted thinker: pops canned replies in order, repeating the last one when
/// the script runs out. Useful in tests and demos.
pub struct ScriptedThinker {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
}

impl ScriptedThinker {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Thinker for ScriptedThinker {
    async fn think(&self, _context: &str) -> Result<String, OrchestratorError> {
        let popped = self
            .replies
            .lock()
            .expect("scripted thinker lock poisoned")
            .pop_front();
        let mut last = self.last.lock().expect("scripted thinker lock poisoned");
        match popped {
            Some(reply) => {
                *last = Some(reply.clone());
                Ok(reply)
            }
            None => last.clone().ok_or_else(|| {
                OrchestratorError::Thinker("scripted thinker has no replies".to_string())
            }),
        }
    }
}

/// Thinker backed by a gateway chat session.
///
/// Picks a gateway from the registry on every think (connecting with retry as
/// needed), so a pool with no configured gateways surfaces
/// "No gateways configured" into the run.
pub struct GatewayThinker {
    gateways: Arc<GatewayRegistry>,
    preferred: Option<String>,
    session_key: String,
}

impl GatewayThinker {
    pub fn new(gateways: Arc<GatewayRegistry>) -> Self {
        Self {
            gateways,
            preferred: None,
            session_key: format!("orchestrator:{}", uuid::Uuid::new_v4()),
        }
    }

    /// Prefer a named gateway over insertion order.
    pub fn with_preferred(mut self, name: impl Into<String>) -> Self {
        self.preferred = Some(name.into());
        self
    }

    /// Groups all thinks of one orchestrator under a fixed session key.
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = key.into();
        self
    }
}

#[async_trait]
impl Thinker for GatewayThinker {
    async fn think(&self, context: &str) -> Result<String, OrchestratorError> {
        let client = self.gateways.pick(self.preferred.as_deref()).await?;
        let reply = client
            .chat(context, ChatOptions::new(&self.session_key))
            .await?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_thinker_pops_in_order_then_repeats() {
        let thinker = ScriptedThinker::new(["one", "two"]);
        assert_eq!(thinker.think("ctx").await.unwrap(), "one");
        assert_eq!(thinker.think("ctx").await.unwrap(), "two");
        assert_eq!(thinker.think("ctx").await.unwrap(), "two");
    }

    #[tokio::test]
    async fn empty_script_errors() {
        let thinker = ScriptedThinker::new(Vec::<String>::new());
        let err = thinker.think("ctx").await.unwrap_err();
        assert!(err.to_string().contains("no replies"), "{}", err);
    }
}
