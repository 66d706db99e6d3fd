//! URL and query-string helpers shared by the HTTP and socket channels.

use crate::error::ClientError;

/// Collapse redundant slashes in `url` while keeping the `scheme://` separator.
///
/// `http://host/api//v1///sounds` becomes `http://host/api/v1/sounds`.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    };

    let mut collapsed = String::with_capacity(rest.len());
    let mut prev_slash = false;
    for ch in rest.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        collapsed.push(ch);
    }

    match scheme {
        Some(scheme) => format!("{scheme}://{collapsed}"),
        None => collapsed,
    }
}

/// Resolve a relative resource path against a base URL.
#[must_use]
pub fn join(base: &str, path: &str) -> String {
    normalize_url(&format!("{base}/{path}"))
}

/// Swap an `http(s)` origin to its `ws(s)` counterpart.
///
/// # Errors
///
/// Returns [`ClientError::InvalidUrl`] for any other scheme.
pub fn ws_base_url(endpoint: &str) -> Result<String, ClientError> {
    let trimmed = endpoint.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else {
        Err(ClientError::InvalidUrl(endpoint.to_string()))
    }
}

/// Build `?k=v&k2=v2`, skipping pairs whose value is empty.
///
/// Returns an empty string when no pair survives so the result can always be
/// appended to a path.
#[must_use]
pub fn query_string(params: &[(&str, &str)]) -> String {
    let pairs = params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>();
    if pairs.is_empty() {
        String::new()
    } else {
        format!("?{}", pairs.join("&"))
    }
}

#[cfg(test)]
#[path = "paths_test.rs"]
mod tests;
