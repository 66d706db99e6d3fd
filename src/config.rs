//! Client configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! One typed `ClientConfig` carries everything the HTTP and socket channels
//! need. Numeric overrides that fail to parse fall back to their defaults;
//! structurally invalid values (bad scheme, inverted jitter window) are
//! rejected so a misconfigured client never starts dialing.

use std::time::Duration;

use crate::error::ClientError;
use crate::paths;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";
pub const DEFAULT_API_PREFIX: &str = "/api/v1";
pub const DEFAULT_WS_PATH: &str = "/ws";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TOKEN_SKEW_MS: u64 = 0;
pub const DEFAULT_JITTER_MIN_MS: u64 = 1800;
pub const DEFAULT_JITTER_MAX_MS: u64 = 2200;
pub const DEFAULT_MAX_ATTEMPT: u32 = 15;

/// Name of the cookie the refresh endpoint reads.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Reconnect timing for the push socket.
///
/// The delay before attempt `n` is `base * n` where `base` is drawn uniformly
/// from `jitter_min_ms..=jitter_max_ms` and `n` never exceeds `max_attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub max_attempt: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { jitter_min_ms: DEFAULT_JITTER_MIN_MS, jitter_max_ms: DEFAULT_JITTER_MAX_MS, max_attempt: DEFAULT_MAX_ATTEMPT }
    }
}

impl ReconnectPolicy {
    /// Upper bound for any single reconnect delay.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.jitter_max_ms.saturating_mul(u64::from(self.max_attempt)))
    }

    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for an inverted jitter window or a zero
    /// attempt cap.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.jitter_min_ms > self.jitter_max_ms {
            return Err(ClientError::Config(format!(
                "reconnect jitter window is inverted ({} > {})",
                self.jitter_min_ms, self.jitter_max_ms
            )));
        }
        if self.max_attempt == 0 {
            return Err(ClientError::Config("reconnect attempt cap must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Whole-request timeout. `None` leaves it to the transport.
    pub request: Option<Duration>,
    pub connect: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request: None, connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Service origin, e.g. `https://sounds.example.com`.
    pub endpoint: String,
    pub api_prefix: String,
    pub ws_path: String,
    /// Seeds the refresh cookie so a headless client can renew access tokens.
    pub refresh_token: Option<String>,
    /// Tokens are treated as expired this long before their literal deadline.
    pub token_skew: Duration,
    pub timeouts: Timeouts,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Build a config for `endpoint` with every other setting at its default.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the endpoint is not an http(s) URL.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClientError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let config = Self {
            endpoint,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            refresh_token: None,
            token_skew: Duration::from_millis(DEFAULT_TOKEN_SKEW_MS),
            timeouts: Timeouts::default(),
            reconnect: ReconnectPolicy::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `SOUNDBOARD_ENDPOINT`: default `http://localhost:8080`
    /// - `SOUNDBOARD_API_PREFIX`: default `/api/v1`
    /// - `SOUNDBOARD_WS_PATH`: default `/ws`
    /// - `SOUNDBOARD_REFRESH_TOKEN`: refresh cookie value
    /// - `SOUNDBOARD_REQUEST_TIMEOUT_SECS`: unset means no explicit timeout
    /// - `SOUNDBOARD_CONNECT_TIMEOUT_SECS`: default 10
    /// - `SOUNDBOARD_TOKEN_SKEW_MS`: default 0
    /// - `SOUNDBOARD_RECONNECT_JITTER_MIN_MS` / `_MAX_MS`: default 1800 / 2200
    /// - `SOUNDBOARD_RECONNECT_MAX_ATTEMPT`: default 15
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the resulting config is invalid.
    pub fn from_env() -> Result<Self, ClientError> {
        let endpoint = std::env::var("SOUNDBOARD_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let mut config = Self::new(endpoint)?;

        if let Ok(prefix) = std::env::var("SOUNDBOARD_API_PREFIX") {
            config.api_prefix = prefix;
        }
        if let Ok(path) = std::env::var("SOUNDBOARD_WS_PATH") {
            config.ws_path = path;
        }
        config.refresh_token = std::env::var("SOUNDBOARD_REFRESH_TOKEN")
            .ok()
            .filter(|s| !s.is_empty());
        config.token_skew = Duration::from_millis(env_parse("SOUNDBOARD_TOKEN_SKEW_MS", DEFAULT_TOKEN_SKEW_MS));
        config.timeouts = Timeouts {
            request: std::env::var("SOUNDBOARD_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs),
            connect: Duration::from_secs(env_parse("SOUNDBOARD_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)),
        };
        config.reconnect = ReconnectPolicy {
            jitter_min_ms: env_parse("SOUNDBOARD_RECONNECT_JITTER_MIN_MS", DEFAULT_JITTER_MIN_MS),
            jitter_max_ms: env_parse("SOUNDBOARD_RECONNECT_JITTER_MAX_MS", DEFAULT_JITTER_MAX_MS),
            max_attempt: env_parse("SOUNDBOARD_RECONNECT_MAX_ATTEMPT", DEFAULT_MAX_ATTEMPT),
        };

        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Base URL every API path is resolved against, e.g. `http://host/api/v1`.
    #[must_use]
    pub fn http_endpoint(&self) -> String {
        paths::normalize_url(&format!("{}/{}", self.endpoint, self.api_prefix))
            .trim_end_matches('/')
            .to_string()
    }

    /// Socket URL: the endpoint with its scheme swapped to `ws`/`wss`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when the endpoint has no http(s) scheme.
    pub fn ws_endpoint(&self) -> Result<String, ClientError> {
        let ws_base = paths::ws_base_url(&self.endpoint)?;
        Ok(paths::normalize_url(&format!("{ws_base}/{}", self.ws_path)))
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] describing the first violation found.
    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "endpoint must start with http:// or https:// (got '{}')",
                self.endpoint
            )));
        }
        self.reconnect.validate()
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
