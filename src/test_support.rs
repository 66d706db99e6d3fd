//! In-process mock of the soundboard service for async tests.
//!
//! One axum app on `127.0.0.1:0` serves both channels:
//! - `/api/v1/*`: token refresh, a few fixed-outcome routes, and a
//!   bearer-protected echo for everything else. Every request is recorded.
//! - `/ws`: each accepted connection consumes the next [`SocketScript`]
//!   (falling back to accept-and-hold) and is timestamped.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{Json, Router};
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::{ClientConfig, ReconnectPolicy};

const API_PREFIX: &str = "/api/v1/";

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    /// Path relative to the API prefix, e.g. `sounds/abc`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// What the next socket connection does.
#[derive(Clone, Debug)]
pub enum SocketScript {
    /// Complete the upgrade, then drop the transport without a word.
    DropImmediately,
    /// Wait for `auth`, answer `authok`, send `events` verbatim, then `end`.
    Accept { events: Vec<String>, end: SocketEnd },
    /// Wait for `auth`, answer `authpromptfailed`, then close normally.
    Reject,
}

#[derive(Clone, Copy, Debug)]
pub enum SocketEnd {
    Hold,
    Drop,
    Close(u16),
}

impl SocketScript {
    pub fn hold() -> Self {
        Self::Accept { events: Vec::new(), end: SocketEnd::Hold }
    }
}

#[derive(Default)]
struct MockInner {
    valid_token: Option<String>,
    issued: usize,
    token_ttl: Option<time::Duration>,
    refresh_delay: Duration,
    refresh_fails: bool,
    expires_override: Option<String>,
    requests: Vec<RecordedRequest>,
    scripts: VecDeque<SocketScript>,
    connections: Vec<Instant>,
    socket_tokens: Vec<String>,
}

#[derive(Clone)]
pub struct MockServer {
    addr: SocketAddr,
    inner: Arc<Mutex<MockInner>>,
}

impl MockServer {
    pub async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr");
        let server = Self { addr, inner: Arc::new(Mutex::new(MockInner::default())) };

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .fallback(api_handler)
            .with_state(server.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server failed");
        });
        server
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Config pointing at this server with a fast reconnect policy.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.endpoint())
            .expect("mock endpoint is valid")
            .with_reconnect(ReconnectPolicy { jitter_min_ms: 20, jitter_max_ms: 30, max_attempt: 15 })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // knobs
    // =========================================================================

    pub fn set_valid_token(&self, token: &str) {
        self.lock().valid_token = Some(token.to_string());
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.lock().refresh_delay = delay;
    }

    pub fn set_refresh_fails(&self, fails: bool) {
        self.lock().refresh_fails = fails;
    }

    /// Hand out this literal `expires` string instead of a real timestamp.
    pub fn set_refresh_expires(&self, expires: &str) {
        self.lock().expires_override = Some(expires.to_string());
    }

    pub fn set_token_ttl(&self, ttl: time::Duration) {
        self.lock().token_ttl = Some(ttl);
    }

    pub fn push_script(&self, script: SocketScript) {
        self.lock().scripts.push_back(script);
    }

    // =========================================================================
    // observations
    // =========================================================================

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.lock().requests.iter().filter(|r| r.path == path).cloned().collect()
    }

    pub fn refresh_calls(&self) -> usize {
        self.requests_to("auth/refresh").len()
    }

    pub fn connections(&self) -> Vec<Instant> {
        self.lock().connections.clone()
    }

    pub fn socket_tokens(&self) -> Vec<String> {
        self.lock().socket_tokens.clone()
    }
}

// =============================================================================
// HTTP
// =============================================================================

async fn api_handler(
    State(server): State<MockServer>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(path) = uri.path().strip_prefix(API_PREFIX).map(str::to_string) else {
        return (StatusCode::NOT_FOUND, "no such route").into_response();
    };
    server.lock().requests.push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        headers: headers.clone(),
        body: body.to_vec(),
    });

    match path.as_str() {
        "auth/refresh" => refresh(&server).await,
        "auth/logincapabilities" => Json(json!(["discord", "twitch"])).into_response(),
        "nocontent" => StatusCode::NO_CONTENT.into_response(),
        "garbage" => (StatusCode::OK, "<html>hello</html>").into_response(),
        "teapot" => {
            (StatusCode::IM_A_TEAPOT, Json(json!({ "status": 4180, "message": "short and stout" }))).into_response()
        }
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
        "always-stale" => invalid_token(),
        _ => protected(&server, &method, &path, &headers, &body),
    }
}

async fn refresh(server: &MockServer) -> Response {
    let delay = server.lock().refresh_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut inner = server.lock();
    if inner.refresh_fails {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "status": 401, "message": "invalid refresh token" })))
            .into_response();
    }
    inner.issued += 1;
    let token = format!("token-{}", inner.issued);
    let ttl = inner.token_ttl.unwrap_or(time::Duration::hours(1));
    let expires = match &inner.expires_override {
        Some(expires) => expires.clone(),
        None => (OffsetDateTime::now_utc() + ttl).format(&Rfc3339).expect("format expiry"),
    };
    inner.valid_token = Some(token.clone());
    Json(json!({ "access_token": token, "expires": expires })).into_response()
}

fn protected(server: &MockServer, method: &Method, path: &str, headers: &HeaderMap, body: &[u8]) -> Response {
    let auth = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_string);
    let valid = server.lock().valid_token.clone();
    let authorized = match (&auth, &valid) {
        (Some(auth), Some(valid)) => auth == &format!("bearer {valid}"),
        _ => false,
    };
    if !authorized {
        return invalid_token();
    }

    if path == "auth/check" {
        return Json(json!({ "status": 200, "message": "ok" })).into_response();
    }

    Json(json!({
        "method": method.as_str(),
        "path": path,
        "auth": auth,
        "body": String::from_utf8_lossy(body),
    }))
    .into_response()
}

fn invalid_token() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "status": 401, "message": "invalid access token" }))).into_response()
}


// =============================================================================
// WebSocket
// =============================================================================

async fn ws_handler(State(server): State<MockServer>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_socket(server, socket))
}

async fn run_socket(server: MockServer, mut socket: WebSocket) {
    let script = {
        let mut inner = server.lock();
        inner.connections.push(Instant::now());
        inner.scripts.pop_front().unwrap_or_else(SocketScript::hold)
    };

    match script {
        SocketScript::DropImmediately => drop(socket),
        SocketScript::Reject => {
            if await_auth(&server, &mut socket).await {
                let _ = socket.send(text(json!({ "type": "authpromptfailed" }))).await;
                let _ = socket.send(Message::Close(Some(CloseFrame { code: 1000, reason: "".into() }))).await;
                drain(&mut socket).await;
            }
        }
        SocketScript::Accept { events, end } => {
            if !await_auth(&server, &mut socket).await {
                return;
            }
            let _ = socket.send(text(auth_ok())).await;
            for event in events {
                let _ = socket.send(Message::Text(event.into())).await;
            }
            match end {
                SocketEnd::Hold => drain(&mut socket).await,
                SocketEnd::Drop => drop(socket),
                SocketEnd::Close(code) => {
                    let _ = socket.send(Message::Close(Some(CloseFrame { code, reason: "".into() }))).await;
                    drain(&mut socket).await;
                }
            }
        }
    }
}

/// Send the prompt, then wait for the client's auth envelope and record its token.
async fn await_auth(server: &MockServer, socket: &mut WebSocket) -> bool {
    let prompt = json!({ "type": "authpromp", "payload": { "token_type": "bearer" } });
    if socket.send(text(prompt)).await.is_err() {
        return false;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(raw) = msg else { continue };
        let Ok(value) = serde_json::from_str::<Value>(raw.as_str()) else { continue };
        if value["type"] == "auth" {
            let token = value["payload"]["token"].as_str().unwrap_or_default().to_string();
            server.lock().socket_tokens.push(token);
            return true;
        }
    }
    false
}

async fn drain(socket: &mut WebSocket) {
    while let Some(Ok(_)) = socket.recv().await {}
}

fn auth_ok() -> Value {
    json!({
        "type": "authok",
        "payload": {
            "volume": 50,
            "filters": { "include": [], "exclude": [] },
            "guild": { "id": "g1", "name": "Test Guild", "icon_url": "" },
            "connected": true,
            "joined": false,
            "is_admin": false
        }
    })
}

fn text(value: Value) -> Message {
    Message::Text(value.to_string().into())
}
