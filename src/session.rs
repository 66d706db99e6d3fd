//! Top-level client: authenticated HTTP calls plus the push socket.
//!
//! DESIGN
//! ======
//! `SessionClient` composes the executor, the auth coordinator, the router,
//! and the socket. Every API call goes through `request_value`, which attaches
//! the current token, and on an `invalid access token` rejection refreshes and
//! replays the identical request exactly once. The socket shares the same
//! coordinator, so its auth handshake and HTTP calls never race two refreshes.
//!
//! ERROR HANDLING
//! ==============
//! A refresh failure ends the call with the refresh error; the original
//! request is not replayed. A 401 that survives the replay is returned as is.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::auth::AuthCoordinator;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::PushEvent;
use crate::executor::{ApiRequest, RequestExecutor};
use crate::models::{LoginProvider, Status};
use crate::router::{EventRouter, Subscriber};
use crate::socket::SocketConnection;

pub struct SessionClient {
    config: ClientConfig,
    executor: Arc<RequestExecutor>,
    auth: AuthCoordinator,
    router: EventRouter,
    socket: SocketConnection,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("endpoint", &self.config.endpoint)
            .field("auth", &self.auth)
            .field("socket", &self.socket)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Build the client and start connecting the push socket.
    ///
    /// Events that arrive before a push handler is bound are dropped; use
    /// [`SessionClient::new_lazy`] to bind first. Must be called inside a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] / [`ClientError::InvalidUrl`] for a bad
    /// configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Self::new_lazy(config)?;
        client.socket.connect();
        Ok(client)
    }

    /// Build the client without dialing the socket; call
    /// [`SocketConnection::connect`] through [`SessionClient::socket`] later.
    ///
    /// # Errors
    ///
    /// Same as [`SessionClient::new`].
    pub fn new_lazy(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let executor = Arc::new(RequestExecutor::new(&config)?);
        let auth = AuthCoordinator::new(Arc::clone(&executor), config.token_skew);
        let router = EventRouter::new();
        let socket =
            SocketConnection::new(config.ws_endpoint()?, config.reconnect, Arc::new(auth.clone()), router.clone())?;

        Ok(Self { config, executor, auth, router, socket })
    }

    /// Issue an API call and decode the response body as `T`.
    ///
    /// # Errors
    ///
    /// See [`SessionClient::request_value`]; additionally
    /// [`ClientError::Decode`] when the body does not match `T`.
    ///
    /// An empty body (204 or non-JSON) also decodes as `null`, so `()` and
    /// `Option<_>` accept it.
    pub async fn request<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ClientError> {
        let value = self.request_value(req).await?;
        decode_body(&value)
    }

    /// Issue an API call with refresh-and-replay on a stale token.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`ClientError`]: transport failure, API error, or
    /// the refresh failure that prevented a replay.
    pub async fn request_value(&self, req: ApiRequest) -> Result<Value, ClientError> {
        let token = self.auth.prepare().await?;
        match self.executor.execute(&req, token.as_deref()).await {
            Err(e) if e.is_invalid_token() => {
                tracing::debug!(path = %req.path, "access token rejected; refreshing and replaying");
                self.auth.invalidate(token.as_deref());
                let fresh = self.auth.ensure_fresh().await?;
                self.executor.execute(&req, Some(&fresh.value)).await
            }
            outcome => outcome,
        }
    }

    /// Fully-qualified URL for an API path.
    #[must_use]
    pub fn base_path(&self, path: &str) -> String {
        self.executor.url(path)
    }

    /// Route push events to `handler`, replacing any previous handler.
    pub fn bind_push_events<F>(&self, handler: F) -> Option<Subscriber>
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.router.bind(handler)
    }

    /// Route push events into a channel, replacing any previous handler.
    pub fn push_events(&self) -> mpsc::UnboundedReceiver<PushEvent> {
        self.router.bind_channel()
    }

    pub fn unbind_push_events(&self) -> Option<Subscriber> {
        self.router.unbind()
    }

    #[must_use]
    pub fn auth(&self) -> &AuthCoordinator {
        &self.auth
    }

    #[must_use]
    pub fn socket(&self) -> &SocketConnection {
        &self.socket
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Close the push socket. HTTP calls keep working.
    pub async fn close(&self) {
        self.socket.close().await;
    }

    // =========================================================================
    // auth endpoints
    // =========================================================================

    /// `GET auth/check`: succeeds while the session is authenticated.
    ///
    /// # Errors
    ///
    /// Returns the API error when the session is not authenticated.
    pub async fn check_auth(&self) -> Result<Status, ClientError> {
        self.request(ApiRequest::get("auth/check")).await
    }

    /// OAuth providers the server has configured.
    ///
    /// # Errors
    ///
    /// Returns transport or API failures.
    pub async fn login_capabilities(&self) -> Result<Vec<String>, ClientError> {
        self.request(ApiRequest::get("auth/logincapabilities")).await
    }

    /// Browser URL that starts the OAuth flow for `provider`.
    #[must_use]
    pub fn login_url(&self, provider: LoginProvider) -> String {
        self.base_path(&format!("auth/oauth2/{}/login", provider.as_str()))
    }

    /// Browser URL that ends the session and clears the refresh cookie.
    #[must_use]
    pub fn logout_url(&self) -> String {
        self.base_path("auth/logout")
    }
}

fn decode_body<T: DeserializeOwned>(value: &Value) -> Result<T, ClientError> {
    T::deserialize(value).or_else(|e| {
        let empty = value.as_object().is_some_and(serde_json::Map::is_empty);
        if empty { T::deserialize(&Value::Null).map_err(|_| e) } else { Err(e) }
    })
    .map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
