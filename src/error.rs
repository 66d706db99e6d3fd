//! Error taxonomy for the HTTP and socket channels.
//!
//! ERROR HANDLING
//! ==============
//! Every variant carries owned strings rather than source errors so the value
//! is `Clone`: a single refresh outcome is handed to every caller waiting on
//! it. The expired-token case is not a variant of its own; it is an `Api`
//! error recognized by [`ClientError::is_invalid_token`] and absorbed by the
//! refresh-and-replay path before it can reach a caller.

/// Message the server puts in a 401 body when the bearer token is stale.
pub const INVALID_TOKEN_MESSAGE: &str = "invalid access token";

/// Errors produced by client operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// A configuration value is missing or inconsistent.
    #[error("config invalid: {0}")]
    Config(String),

    /// A URL could not be derived or parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A caller-supplied header name or value is not valid HTTP.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The request never produced an HTTP response (DNS, connect, TLS, reset).
    #[error("transport failed: {0}")]
    Transport(String),

    /// The server answered with a status of 400 or above.
    #[error("API error {status} (code {code}): {message}")]
    Api { status: u16, code: i64, message: String },

    /// A successful response body did not match the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// A request body could not be serialized.
    #[error("request encode failed: {0}")]
    Encode(String),

    /// The refresh endpoint returned an expiry that is not a valid timestamp.
    #[error("token expiry parse failed: {0}")]
    TokenParse(String),

    /// The push socket is not connected.
    #[error("socket closed")]
    SocketClosed,
}

impl ClientError {
    /// `true` for the 401 + sentinel-message combination that triggers a refresh.
    #[must_use]
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::Api { status: 401, message, .. } if message == INVALID_TOKEN_MESSAGE)
    }

    /// `true` for any 401, including one that survived a refresh.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }

    /// HTTP status for API errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Grepable code for logs and CLI output.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "E_CONFIG",
            Self::InvalidUrl(_) => "E_INVALID_URL",
            Self::InvalidHeader(_) => "E_INVALID_HEADER",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Api { .. } => "E_API",
            Self::Decode(_) => "E_DECODE",
            Self::Encode(_) => "E_ENCODE",
            Self::TokenParse(_) => "E_TOKEN_PARSE",
            Self::SocketClosed => "E_SOCKET_CLOSED",
        }
    }

    /// Whether retrying the same call later could succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::SocketClosed | Self::Api { status: 429 | 500..=599, .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
