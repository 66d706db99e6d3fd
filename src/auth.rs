//! Access-token lifecycle: expiry checks and single-flight refresh.
//!
//! DESIGN
//! ======
//! The coordinator owns the only [`TokenStore`]. A refresh is a shared future
//! kept in `pending`; every caller that needs a token while one is in flight
//! clones and awaits that same future, so concurrent expiry triggers exactly
//! one call to `auth/refresh`. The future settles the state itself (clears
//! `pending`, installs the token on success) before any waiter observes the
//! result, which means a caller that wakes up always sees the settled store.
//!
//! ERROR HANDLING
//! ==============
//! A failed refresh is handed to every waiter unchanged and leaves the store
//! empty. `pending` is cleared either way so the next caller starts a new
//! attempt.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use crate::error::ClientError;
use crate::executor::{ApiRequest, RequestExecutor};
use crate::socket::TokenSource;
use crate::token::{AccessToken, RefreshResponse, TokenStore};

pub const REFRESH_PATH: &str = "auth/refresh";

type PendingRefresh = Shared<BoxFuture<'static, Result<AccessToken, ClientError>>>;

#[derive(Clone)]
pub struct AuthCoordinator {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    executor: Arc<RequestExecutor>,
    state: Mutex<AuthState>,
}

struct AuthState {
    store: TokenStore,
    pending: Option<PendingRefresh>,
}

impl std::fmt::Debug for AuthCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("AuthCoordinator")
            .field("token", &state.store.get())
            .field("refreshing", &state.pending.is_some())
            .finish()
    }
}

impl AuthCoordinator {
    #[must_use]
    pub fn new(executor: Arc<RequestExecutor>, skew: std::time::Duration) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                executor,
                state: Mutex::new(AuthState { store: TokenStore::new(skew), pending: None }),
            }),
        }
    }

    /// Return a valid token, refreshing first if the stored one is missing or
    /// expired. Concurrent callers share one refresh.
    ///
    /// # Errors
    ///
    /// Returns the refresh failure (transport, API, or expiry parse error).
    pub async fn ensure_fresh(&self) -> Result<AccessToken, ClientError> {
        let pending = {
            let mut state = self.inner.lock();
            if !state.store.is_expired() {
                if let Some(token) = state.store.get() {
                    return Ok(token.clone());
                }
            }
            state.store.clear();
            self.pending_or_start(&mut state)
        };
        pending.await
    }

    /// Token to attach to an outgoing request.
    ///
    /// `None` means the request goes out unauthenticated: no token has ever
    /// been issued and no refresh is running. An expired token is dropped and
    /// refreshed; an in-flight refresh is awaited.
    ///
    /// # Errors
    ///
    /// Returns the refresh failure when one had to be awaited.
    pub async fn prepare(&self) -> Result<Option<String>, ClientError> {
        let pending = {
            let mut state = self.inner.lock();
            let current = state.store.get().map(|token| token.value.clone());
            match current {
                Some(value) if !state.store.is_expired() => return Ok(Some(value)),
                Some(_) => {
                    state.store.clear();
                    self.pending_or_start(&mut state)
                }
                None => match state.pending.clone() {
                    Some(pending) => pending,
                    None => return Ok(None),
                },
            }
        };
        Ok(Some(pending.await?.value))
    }

    /// Drop the stored token if it is still the one a request was rejected
    /// with. A token installed by a newer refresh is left alone.
    pub fn invalidate(&self, stale: Option<&str>) {
        let mut state = self.inner.lock();
        let is_current = stale.is_some_and(|stale| state.store.get().is_some_and(|token| token.value == stale));
        if is_current {
            tracing::debug!("stored access token rejected; clearing");
            state.store.clear();
        }
    }

    /// Install a token obtained elsewhere (e.g. restored from disk).
    pub fn set_token(&self, token: AccessToken) {
        self.inner.lock().store.set(token);
    }

    pub fn clear(&self) {
        self.inner.lock().store.clear();
    }

    #[must_use]
    pub fn current(&self) -> Option<AccessToken> {
        self.inner.lock().store.get().cloned()
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    fn pending_or_start(&self, state: &mut AuthState) -> PendingRefresh {
        if let Some(pending) = &state.pending {
            tracing::debug!("joining in-flight token refresh");
            return pending.clone();
        }

        let inner = Arc::clone(&self.inner);
        let refresh = async move {
            let result = inner.fetch().await;
            inner.settle(&result);
            result
        }
        .boxed()
        .shared();
        state.pending = Some(refresh.clone());
        refresh
    }
}

impl AuthInner {
    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch(&self) -> Result<AccessToken, ClientError> {
        tracing::info!("refreshing access token");
        let value = self
            .executor
            .execute(&ApiRequest::get(REFRESH_PATH), None)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, code = e.error_code(), "token refresh failed"))?;
        let response: RefreshResponse =
            serde_json::from_value(value).map_err(|e| ClientError::Decode(format!("refresh response: {e}")))?;
        let token = AccessToken::from_refresh(response)?;
        tracing::info!(expires_at = %token.expires_at, "access token refreshed");
        Ok(token)
    }

    fn settle(&self, result: &Result<AccessToken, ClientError>) {
        let mut state = self.lock();
        state.pending = None;
        if let Ok(token) = result {
            state.store.set(token.clone());
        }
    }
}

#[async_trait]
impl TokenSource for AuthCoordinator {
    async fn access_token(&self) -> Result<String, ClientError> {
        self.ensure_fresh().await.map(|token| token.value)
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
