//! Wire frames for the gateway WebSocket protocol.
//!
//! Three frame kinds flow over one socket, discriminated by `type`:
//! `req` (client → server), `res` (the matching reply), and `event`
//! (server-pushed, including the async chat stream). Payload fields are
//! camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version pinned by this client (min = max).
pub const PROTOCOL_VERSION: u32 = 3;

/// Client identity presented during connect.
pub const CLIENT_ID: &str = "openclaw-control-ui";
pub const CLIENT_MODE: &str = "webchat";
pub const CLIENT_ROLE: &str = "operator";

/// Request frame: client-initiated method call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Error body of a failed response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// Response frame: matches a request by id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

/// Event frame: server-pushed, no request id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// Any frame on the socket.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Req(RequestFrame),
    Res(ResponseFrame),
    Event(EventFrame),
}

/// Composes the pipe-joined signature input for the connect handshake, in
/// fixed field order. `v2` appends the server nonce.
pub fn signature_payload(
    version: &str,
    device_id: &str,
    scopes: &[String],
    signed_at_ms: i64,
    token: &str,
    nonce: Option<&str>,
) -> String {
    let mut fields = vec![
        version.to_string(),
        device_id.to_string(),
        CLIENT_ID.to_string(),
        CLIENT_MODE.to_string(),
        CLIENT_ROLE.to_string(),
        scopes.join(","),
        signed_at_ms.to_string(),
        token.to_string(),
    ];
    if let Some(nonce) = nonce {
        fields.push(nonce.to_string());
    }
    fields.join("|")
}
