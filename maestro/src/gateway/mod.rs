//! Gateway protocol: long-lived WebSocket clients hosting remote agents and
//! the thinker model.
//!
//! One [`GatewayClient`] per configured URL, all backed by a persistent
//! Ed25519 [`DeviceIdentity`]. The connect sequence is: best-effort HTTP
//! login (session cookie), WebSocket open, optional challenge/nonce, signed
//! `connect` frame, `hello` payload. Requests correlate by id; chat streams
//! correlate by runId.

pub mod client;
pub mod discovery;
pub mod identity;
pub mod protocol;
pub mod registry;

pub use client::{ChatOptions, GatewayClient, DEFAULT_CALL_TIMEOUT, DEFAULT_CHAT_TIMEOUT};
pub use discovery::{discover_agents, DiscoveredAgent};
pub use identity::{DeviceIdentity, IdentityError};
pub use protocol::{ErrorShape, EventFrame, Frame, RequestFrame, ResponseFrame};
pub use registry::GatewayRegistry;

use thiserror::Error;

/// One gateway endpoint: name, websocket URL, optional bearer token.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub name: String,
    pub url: String,
    pub token: Option<String>,
}

impl GatewayConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Protocol-level gateway failure.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Error frame from the gateway, surfaced as `code: message`.
    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    /// The socket closed while requests were pending.
    #[error("Connection closed (code={0})")]
    Closed(u16),

    /// A request or the connect sequence exceeded its deadline.
    #[error("{method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// Socket or serialization failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation attempted before a successful connect.
    #[error("not connected")]
    NotConnected,

    /// The registry has no entries to pick from.
    #[error("No gateways configured")]
    NoGateways,

    /// Chat-stream failure reported by the gateway.
    #[error("chat failed: {0}")]
    Chat(String),

    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}
