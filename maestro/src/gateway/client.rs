//! Gateway client: one WebSocket connection with request/response correlation
//! by id and asynchronous chat correlation by runId.
//!
//! Connect sequence: best-effort HTTP login for a session cookie, WebSocket
//! open with Origin/Cookie headers, a short wait for a `connect.challenge`
//! event (protocol v2 signs the nonce; v1 signs without), then a signed
//! `connect` request whose matching response carries the server `hello`.
//!
//! On socket close every pending request and pending chat is rejected exactly
//! once with the close code; the tables never leak entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use uuid::Uuid;

use super::identity::DeviceIdentity;
use super::protocol::{
    signature_payload, ErrorShape, EventFrame, Frame, RequestFrame, CLIENT_ID, CLIENT_MODE,
    CLIENT_ROLE, PROTOCOL_VERSION,
};
use super::{GatewayConfig, GatewayError};

/// Default per-request deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Default deadline for one full chat exchange.
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const CHALLENGE_WAIT: Duration = Duration::from_millis(800);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

type PendingMap = Arc<StdMutex<HashMap<String, oneshot::Sender<Result<Value, GatewayError>>>>>;
type PendingChatMap = Arc<StdMutex<HashMap<String, oneshot::Sender<Result<String, GatewayError>>>>>;

/// Options for one chat exchange.
#[derive(Clone, Debug)]
pub struct ChatOptions {
    /// Client-chosen correlation key grouping related chats at the gateway.
    pub session_key: String,
    pub timeout: Duration,
    /// Accepted for routing intent but not transmitted; the server routes by
    /// session key only.
    pub agent_id: Option<String>,
}

impl ChatOptions {
    pub fn new(session_key: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            timeout: DEFAULT_CHAT_TIMEOUT,
            agent_id: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One client per configured gateway URL.
#[derive(Debug)]
pub struct GatewayClient {
    config: GatewayConfig,
    identity: Arc<DeviceIdentity>,
    scopes: Vec<String>,
    writer: Mutex<Option<WsSink>>,
    pending: PendingMap,
    pending_chats: PendingChatMap,
    connected: Arc<AtomicBool>,
    hello: StdMutex<Option<Value>>,
    connect_lock: Mutex<()>,
    read_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig, identity: Arc<DeviceIdentity>) -> Self {
        Self {
            config,
            identity,
            scopes: Vec::new(),
            writer: Mutex::new(None),
            pending: Arc::new(StdMutex::new(HashMap::new())),
            pending_chats: Arc::new(StdMutex::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(false)),
            hello: StdMutex::new(None),
            connect_lock: Mutex::new(()),
            read_task: StdMutex::new(None),
        }
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The server `hello` payload from the last successful connect.
    pub fn hello(&self) -> Option<Value> {
        self.hello.lock().expect("hello lock poisoned").clone()
    }

    /// Establishes the connection. Concurrent calls coalesce: the connect
    /// lock serializes them and later callers observe the connected state.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        tokio::time::timeout(CONNECT_TIMEOUT, self.establish())
            .await
            .map_err(|_| GatewayError::Timeout {
                method: "connect".to_string(),
                timeout_ms: CONNECT_TIMEOUT.as_millis() as u64,
            })?
    }

    async fn establish(&self) -> Result<(), GatewayError> {
        let origin = http_origin(&self.config.url)?;
        let cookie = self.login(&origin).await;

        let mut request = self
            .config
            .url
            .clone()
            .into_client_request()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        {
            let headers = request.headers_mut();
            headers.insert(
                "Origin",
                origin
                    .parse()
                    .map_err(|_| GatewayError::InvalidUrl(origin.clone()))?,
            );
            if let Some(cookie) = &cookie {
                if let Ok(value) = cookie.parse() {
                    headers.insert("Cookie", value);
                }
            }
        }

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        let nonce = wait_for_challenge(&mut read).await;
        let connect_id = Uuid::new_v4().to_string();
        let frame = self.connect_frame(&connect_id, nonce.as_deref());
        let text =
            serde_json::to_string(&frame).map_err(|e| GatewayError::Transport(e.to_string()))?;
        write
            .send(Message::Text(text))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let hello = await_connect_response(&mut read, &connect_id).await?;
        *self.hello.lock().expect("hello lock poisoned") = Some(hello);
        *self.writer.lock().await = Some(write);
        self.connected.store(true, Ordering::SeqCst);
        self.spawn_read_loop(read);
        debug!(gateway = %self.config.name, protocol = if nonce.is_some() { "v2" } else { "v1" }, "gateway connected");
        Ok(())
    }

    /// Best-effort HTTP login: POST the token form-encoded to `/login` on the
    /// http(s) origin and keep the `connect.sid` cookie. Failure is non-fatal.
    async fn login(&self, origin: &str) -> Option<String> {
        let token = self.config.token.as_deref()?;
        let client = reqwest::Client::new();
        let response = match client
            .post(format!("{}/login", origin))
            .form(&[("token", token)])
            .timeout(LOGIN_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                debug!(gateway = %self.config.name, "login skipped: {}", e);
                return None;
            }
        };
        for value in response.headers().get_all(reqwest::header::SET_COOKIE) {
            let Ok(cookie) = value.to_str() else {
                continue;
            };
            if let Some(start) = cookie.find("connect.sid=") {
                let rest = &cookie[start..];
                let end = rest.find(';').unwrap_or(rest.len());
                return Some(rest[..end].to_string());
            }
        }
        None
    }

    fn connect_frame(&self, id: &str, nonce: Option<&str>) -> Frame {
        let signed_at = chrono::Utc::now().timestamp_millis();
        let version = if nonce.is_some() { "v2" } else { "v1" };
        let token = self.config.token.clone().unwrap_or_default();
        let payload = signature_payload(
            version,
            self.identity.device_id(),
            &self.scopes,
            signed_at,
            &token,
            nonce,
        );
        let signature = self.identity.sign_base64url(payload.as_bytes());
        Frame::Req(RequestFrame {
            id: id.to_string(),
            method: "connect".to_string(),
            params: Some(json!({
                "minProtocol": PROTOCOL_VERSION,
                "maxProtocol": PROTOCOL_VERSION,
                "client": {
                    "id": CLIENT_ID,
                    "mode": CLIENT_MODE,
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "role": CLIENT_ROLE,
                "scopes": self.scopes,
                "caps": [],
                "auth": { "token": token },
                "device": {
                    "id": self.identity.device_id(),
                    "publicKey": self.identity.public_key_base64url(),
                    "signature": signature,
                    "signedAt": signed_at,
                    "nonce": nonce,
                },
            })),
        })
    }

    fn spawn_read_loop(&self, read: WsSource) {
        let pending = Arc::clone(&self.pending);
        let pending_chats = Arc::clone(&self.pending_chats);
        let connected = Arc::clone(&self.connected);
        let gateway = self.config.name.clone();
        let handle = tokio::spawn(async move {
            let code = read_until_closed(read, &pending, &pending_chats).await;
            connected.store(false, Ordering::SeqCst);
            reject_all(&pending, &pending_chats, code);
            debug!(gateway = %gateway, code, "gateway socket closed");
        });
        if let Some(old) = self
            .read_task
            .lock()
            .expect("read task lock poisoned")
            .replace(handle)
        {
            old.abort();
        }
    }

    /// Sends one request and awaits its matching response.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        let timeout = timeout.unwrap_or(DEFAULT_CALL_TIMEOUT);
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(id.clone(), tx);

        let frame = Frame::Req(RequestFrame {
            id: id.clone(),
            method: method.to_string(),
            params,
        });
        if let Err(e) = self.send_frame(&frame).await {
            self.pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without sending: the sweep already ran.
            Ok(Err(_)) => Err(GatewayError::Closed(1006)),
            Err(_) => {
                self.pending
                    .lock()
                    .expect("pending lock poisoned")
                    .remove(&id);
                Err(GatewayError::Timeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// One chat exchange: `chat.send` yields a runId; the reply arrives as
    /// `chat` events correlated solely by that runId, so any number of chats
    /// can be in flight at once. Resolves with the final assistant text.
    pub async fn chat(&self, message: &str, options: ChatOptions) -> Result<String, GatewayError> {
        let params = json!({
            "message": message,
            "sessionKey": options.session_key,
            "idempotencyKey": Uuid::new_v4().to_string(),
            "deliver": false,
        });
        let payload = self.call("chat.send", Some(params), None).await?;
        let run_id = payload
            .get("runId")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Chat("chat.send response missing runId".to_string()))?
            .to_string();

        let (tx, rx) = oneshot::channel();
        self.pending_chats
            .lock()
            .expect("pending chats lock poisoned")
            .insert(run_id.clone(), tx);

        match tokio::time::timeout(options.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(GatewayError::Closed(1006)),
            Err(_) => {
                self.pending_chats
                    .lock()
                    .expect("pending chats lock poisoned")
                    .remove(&run_id);
                Err(GatewayError::Timeout {
                    method: "chat".to_string(),
                    timeout_ms: options.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// `models.list`: the models the gateway can route chats to.
    pub async fn list_models(&self) -> Result<Value, GatewayError> {
        self.call("models.list", None, None).await
    }

    /// `sessions.list`: sessions the gateway currently tracks.
    pub async fn list_sessions(&self) -> Result<Value, GatewayError> {
        self.call("sessions.list", None, None).await
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), GatewayError> {
        let text =
            serde_json::to_string(frame).map_err(|e| GatewayError::Transport(e.to_string()))?;
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(sink) => sink
                .send(Message::Text(text))
                .await
                .map_err(|e| GatewayError::Transport(e.to_string())),
            None => Err(GatewayError::NotConnected),
        }
    }

    /// Drops the connection. The read loop performs the pending sweep.
    pub async fn close(&self) {
        if let Some(mut sink) = self.writer.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Rewrites ws[s] to http[s] and returns the origin string.
fn http_origin(ws_url: &str) -> Result<String, GatewayError> {
    let mut url =
        url::Url::parse(ws_url).map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
    let scheme = match url.scheme() {
        "ws" => "http",
        "wss" => "https",
        other => {
            return Err(GatewayError::InvalidUrl(format!(
                "expected ws or wss scheme, got {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| GatewayError::InvalidUrl(ws_url.to_string()))?;
    Ok(url.origin().ascii_serialization())
}

/// Waits up to the challenge window for a `connect.challenge` event carrying
/// a nonce. Anything else arriving early is ignored; a missing challenge
/// selects protocol v1.
async fn wait_for_challenge(read: &mut WsSource) -> Option<String> {
    let deadline = tokio::time::sleep(CHALLENGE_WAIT);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => return None,
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(Frame::Event(ev)) = serde_json::from_str::<Frame>(&text) {
                        if ev.event == "connect.challenge" {
                            return ev
                                .payload
                                .as_ref()
                                .and_then(|p| p.get("nonce"))
                                .and_then(Value::as_str)
                                .map(str::to_string);
                        }
                    }
                }
                Some(Ok(_)) => continue,
                _ => return None,
            },
        }
    }
}

async fn await_connect_response(read: &mut WsSource, id: &str) -> Result<Value, GatewayError> {
    while let Some(msg) = read.next().await {
        let msg = msg.map_err(|e| GatewayError::Transport(e.to_string()))?;
        match msg {
            Message::Text(text) => match serde_json::from_str::<Frame>(&text) {
                Ok(Frame::Res(res)) if res.id == id => {
                    return if res.ok {
                        Ok(res.payload.unwrap_or(Value::Null))
                    } else {
                        Err(remote_error(res.error))
                    };
                }
                _ => continue,
            },
            Message::Close(frame) => return Err(GatewayError::Closed(close_code(frame))),
            _ => continue,
        }
    }
    Err(GatewayError::Closed(1006))
}

async fn read_until_closed(
    mut read: WsSource,
    pending: &PendingMap,
    pending_chats: &PendingChatMap,
) -> u16 {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_text(&text, pending, pending_chats),
            Ok(Message::Close(frame)) => return close_code(frame),
            Ok(_) => continue,
            Err(e) => {
                warn!("gateway read error: {}", e);
                return 1006;
            }
        }
    }
    1006
}

fn handle_text(text: &str, pending: &PendingMap, pending_chats: &PendingChatMap) {
    match serde_json::from_str::<Frame>(text) {
        Ok(Frame::Res(res)) => {
            let entry = pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&res.id);
            match entry {
                Some(tx) => {
                    let outcome = if res.ok {
                        Ok(res.payload.unwrap_or(Value::Null))
                    } else {
                        Err(remote_error(res.error))
                    };
                    let _ = tx.send(outcome);
                }
                None => debug!("response for unknown request id {}", res.id),
            }
        }
        Ok(Frame::Event(ev)) => handle_event(ev, pending_chats),
        Ok(Frame::Req(req)) => debug!("ignoring server-initiated request {}", req.method),
        Err(e) => debug!("unparseable gateway frame: {}", e),
    }
}

/// Chat events resolve pending chats by runId; `final` is terminal, `error`
/// rejects, every other state is streaming progress and leaves the entry.
fn handle_event(event: EventFrame, pending_chats: &PendingChatMap) {
    if event.event != "chat" {
        debug!("gateway event {}", event.event);
        return;
    }
    let Some(payload) = event.payload else {
        return;
    };
    let Some(run_id) = payload.get("runId").and_then(Value::as_str) else {
        return;
    };
    match payload.get("state").and_then(Value::as_str) {
        Some("final") => {
            if let Some(tx) = pending_chats
                .lock()
                .expect("pending chats lock poisoned")
                .remove(run_id)
            {
                let _ = tx.send(Ok(final_chat_text(&payload)));
            }
        }
        Some("error") => {
            if let Some(tx) = pending_chats
                .lock()
                .expect("pending chats lock poisoned")
                .remove(run_id)
            {
                let message = match payload.get("error") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => "unknown chat error".to_string(),
                };
                let _ = tx.send(Err(GatewayError::Chat(message)));
            }
        }
        _ => {} // streaming progress
    }
}

/// Concatenation of `message.content[*].text`; the JSON of the message when
/// that shape is absent.
fn final_chat_text(payload: &Value) -> String {
    let message = payload.get("message").unwrap_or(payload);
    if let Some(parts) = message.get("content").and_then(Value::as_array) {
        let texts: Vec<&str> = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        if !texts.is_empty() {
            return texts.concat();
        }
    }
    message.to_string()
}

fn remote_error(error: Option<ErrorShape>) -> GatewayError {
    match error {
        Some(e) => GatewayError::Remote {
            code: e.code,
            message: e.message,
        },
        None => GatewayError::Remote {
            code: "unknown".to_string(),
            message: "malformed error frame".to_string(),
        },
    }
}

fn close_code(frame: Option<CloseFrame<'_>>) -> u16 {
    frame.map(|f| u16::from(f.code)).unwrap_or(1005)
}

fn reject_all(pending: &PendingMap, pending_chats: &PendingChatMap, code: u16) {
    let drained: Vec<_> = pending
        .lock()
        .expect("pending lock poisoned")
        .drain()
        .collect();
    for (_, tx) in drained {
        let _ = tx.send(Err(GatewayError::Closed(code)));
    }
    let drained: Vec<_> = pending_chats
        .lock()
        .expect("pending chats lock poisoned")
        .drain()
        .collect();
    for (_, tx) in drained {
        let _ = tx.send(Err(GatewayError::Closed(code)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_origin_rewrites_schemes() {
        assert_eq!(
            http_origin("ws://gw.example:8080/path").unwrap(),
            "http://gw.example:8080"
        );
        assert_eq!(http_origin("wss://gw.example/ws").unwrap(), "https://gw.example");
    }

    #[test]
    fn http_origin_rejects_other_schemes() {
        assert!(matches!(
            http_origin("http://gw.example"),
            Err(GatewayError::InvalidUrl(_))
        ));
    }

    #[test]
    fn final_chat_text_concatenates_parts() {
        let payload = json!({
            "runId": "r",
            "state": "final",
            "message": {"content": [{"type":"text","text":"Hello "}, {"type":"text","text":"world"}]}
        });
        assert_eq!(final_chat_text(&payload), "Hello world");
    }

    #[test]
    fn final_chat_text_falls_back_to_json() {
        let payload = json!({"runId":"r","state":"final","message":{"weird":"shape"}});
        assert_eq!(final_chat_text(&payload), r#"{"weird":"shape"}"#);
    }

    #[test]
    fn reject_all_rejects_each_entry_once() {
        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let pending_chats: PendingChatMap = Arc::new(StdMutex::new(HashMap::new()));
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        pending.lock().unwrap().insert("a".to_string(), tx1);
        pending_chats.lock().unwrap().insert("r1".to_string(), tx2);

        reject_all(&pending, &pending_chats, 1001);

        assert!(matches!(
            rx1.try_recv().unwrap(),
            Err(GatewayError::Closed(1001))
        ));
        assert!(matches!(
            rx2.try_recv().unwrap(),
            Err(GatewayError::Closed(1001))
        ));
        assert!(pending.lock().unwrap().is_empty());
        assert!(pending_chats.lock().unwrap().is_empty());
    }

    #[test]
    fn closed_error_message_format() {
        assert_eq!(
            GatewayError::Closed(1006).to_string(),
            "Connection closed (code=1006)"
        );
    }
}
