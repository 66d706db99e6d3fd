//! Access token model and the store that answers "is it expired".

use std::time::Duration;

use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::ClientError;

/// A bearer token together with its absolute server-declared deadline.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: OffsetDateTime,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Body of `GET auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires: String,
}

impl AccessToken {
    #[must_use]
    pub fn new(value: impl Into<String>, expires_at: OffsetDateTime) -> Self {
        Self { value: value.into(), expires_at }
    }

    /// Build a token from the refresh response, parsing `expires` as RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TokenParse`] when `expires` is not a timestamp.
    pub fn from_refresh(resp: RefreshResponse) -> Result<Self, ClientError> {
        let expires_at = OffsetDateTime::parse(&resp.expires, &Rfc3339)
            .map_err(|e| ClientError::TokenParse(format!("{}: {e}", resp.expires)))?;
        Ok(Self::new(resp.access_token, expires_at))
    }

    /// Expired once `now + skew` reaches the deadline.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime, skew: Duration) -> bool {
        now + skew >= self.expires_at
    }
}

/// Holds at most one access token. Not synchronized; the auth coordinator
/// owns the only instance and serializes access to it.
#[derive(Debug, Default)]
pub struct TokenStore {
    current: Option<AccessToken>,
    skew: Duration,
}

impl TokenStore {
    #[must_use]
    pub fn new(skew: Duration) -> Self {
        Self { current: None, skew }
    }

    #[must_use]
    pub fn get(&self) -> Option<&AccessToken> {
        self.current.as_ref()
    }

    pub fn set(&mut self, token: AccessToken) {
        self.current = Some(token);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// `true` when no token is held or the held one is past its deadline.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.current
            .as_ref()
            .is_none_or(|token| token.is_expired_at(now, self.skew))
    }
}

#[cfg(test)]
#[path = "token_test.rs"]
mod tests;
