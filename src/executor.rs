//! Single HTTP request execution against the versioned API base.
//!
//! DESIGN
//! ======
//! `RequestExecutor` holds no auth state: the
//! caller hands it the bearer token to attach (or none). Token bookkeeping and
//! the refresh-and-replay protocol live in `auth` and `session`. Outcome
//! classification is a pure function (`classify_response`) so the status and
//! body rules can be tested without a server.

use std::sync::Arc;

use reqwest::Method;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

use crate::config::{ClientConfig, REFRESH_COOKIE_NAME};
use crate::error::ClientError;
use crate::paths;

/// Request payload: either structured JSON or raw bytes sent untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// Uploads. No content type is set so the server sniffs the payload.
    Binary(Vec<u8>),
}

/// Everything needed to issue (and later replay) one API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base, e.g. `sounds/abc`.
    pub path: String,
    pub body: Option<RequestBody>,
    /// Caller headers, applied after the defaults.
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, headers: Vec::new() }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    #[must_use]
    pub fn binary(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = Some(RequestBody::Binary(bytes.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

pub struct RequestExecutor {
    http: reqwest::Client,
    base: String,
}

impl RequestExecutor {
    /// Build the HTTP client: cookie jar (seeded with the refresh cookie when
    /// configured) and transport timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be parsed or the client fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        if let Some(refresh_token) = &config.refresh_token {
            let origin = config
                .endpoint
                .parse::<reqwest::Url>()
                .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", config.endpoint)))?;
            jar.add_cookie_str(&format!("{REFRESH_COOKIE_NAME}={refresh_token}; Path=/"), &origin);
        }

        let mut builder = reqwest::Client::builder()
            .cookie_provider(jar)
            .connect_timeout(config.timeouts.connect);
        if let Some(timeout) = config.timeouts.request {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Config(format!("http client build failed: {e}")))?;

        Ok(Self { http, base: config.http_endpoint() })
    }

    /// Fully-qualified URL for a relative API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        paths::join(&self.base, path)
    }

    /// Issue one request and classify the response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when no response arrives,
    /// [`ClientError::Api`] for statuses of 400 and above, and
    /// [`ClientError::InvalidHeader`] for malformed caller headers, and
    /// [`ClientError::Encode`] when the JSON body cannot be serialized.
    pub async fn execute(&self, req: &ApiRequest, token: Option<&str>) -> Result<Value, ClientError> {
        let url = self.url(&req.path);
        let headers = build_headers(req, token)?;

        let mut builder = self.http.request(req.method.clone(), &url).headers(headers);
        match &req.body {
            Some(RequestBody::Json(value)) => {
                let bytes = serde_json::to_vec(value).map_err(|e| ClientError::Encode(e.to_string()))?;
                builder = builder.body(bytes);
            }
            Some(RequestBody::Binary(bytes)) => builder = builder.body(bytes.clone()),
            None => {}
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = if status == 204 { Vec::new() } else { response.bytes().await?.to_vec() };

        tracing::debug!(method = %req.method, path = %req.path, status, authed = token.is_some(), "api request");
        classify_response(status, &body)
    }
}

/// Default headers first, caller headers on top, then auth and content type.
fn build_headers(req: &ApiRequest, token: Option<&str>) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    for (name, value) in &req.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ClientError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::from_str(value).map_err(|e| ClientError::InvalidHeader(format!("{name}: {e}")))?;
        headers.insert(name, value);
    }

    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("bearer {token}"))
            .map_err(|e| ClientError::InvalidHeader(format!("authorization: {e}")))?;
        headers.insert(AUTHORIZATION, value);
    }

    if matches!(req.body, Some(RequestBody::Json(_))) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    Ok(headers)
}

/// Turn a status and raw body into the parsed success value or an API error.
///
/// 204 short-circuits to an empty object without touching the body. Bodies
/// that are not JSON parse as an empty object.
pub(crate) fn classify_response(status: u16, body: &[u8]) -> Result<Value, ClientError> {
    if status == 204 {
        return Ok(Value::Object(Map::new()));
    }

    let data = serde_json::from_slice::<Value>(body).unwrap_or_else(|_| Value::Object(Map::new()));

    if status >= 400 {
        let code = data.get("status").and_then(Value::as_i64).unwrap_or(0);
        let message = data
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        return Err(ClientError::Api { status, code, message });
    }

    Ok(data)
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
