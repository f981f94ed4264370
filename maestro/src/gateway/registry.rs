//! Gateway registry: a named pool with retrying connect and insertion-order
//! fallback pick.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::client::GatewayClient;
use super::GatewayError;

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Pool of gateway clients, picked by name or insertion order.
#[derive(Default)]
pub struct GatewayRegistry {
    clients: Vec<Arc<GatewayClient>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, client: Arc<GatewayClient>) {
        self.clients.push(client);
    }

    pub fn get(&self, name: &str) -> Option<Arc<GatewayClient>> {
        self.clients.iter().find(|c| c.name() == name).map(Arc::clone)
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.name().to_string()).collect()
    }

    /// Picks a connected gateway: the preferred one when named and present,
    /// else each client in insertion order. Every candidate gets up to three
    /// connect attempts with a fixed backoff; when all fail, the last error
    /// is raised. An empty pool raises "No gateways configured".
    pub async fn pick(&self, preferred: Option<&str>) -> Result<Arc<GatewayClient>, GatewayError> {
        if self.clients.is_empty() {
            return Err(GatewayError::NoGateways);
        }
        let candidates: Vec<Arc<GatewayClient>> = match preferred.and_then(|name| self.get(name)) {
            Some(client) => vec![client],
            None => self.clients.iter().map(Arc::clone).collect(),
        };

        let mut last_error = None;
        for client in candidates {
            for attempt in 1..=CONNECT_ATTEMPTS {
                match client.connect().await {
                    Ok(()) => return Ok(client),
                    Err(e) => {
                        debug!(
                            gateway = %client.name(),
                            attempt,
                            "gateway connect failed: {}",
                            e
                        );
                        last_error = Some(e);
                        if attempt < CONNECT_ATTEMPTS {
                            tokio::time::sleep(CONNECT_BACKOFF).await;
                        }
                    }
                }
            }
            warn!(gateway = %client.name(), "giving up after {} attempts", CONNECT_ATTEMPTS);
        }
        Err(last_error.expect("at least one candidate attempted"))
    }
}
