use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::ApiConfig;
use crate::error::ApiError;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_USER_AGENT: &str = "user-agent";

pub const ACCEPT_JSON: &str = "application/json";
pub const ACCEPT_EVENT_STREAM: &str = "text/event-stream";
pub const ACCEPT_ANY: &str = "*/*";

/// Build a deterministic header map for one request.
///
/// The bearer token is required on every request; an empty token is a
/// missing credential, not an anonymous request.
pub fn build_headers(
    config: &ApiConfig,
    token: &str,
    accept: &str,
) -> Result<BTreeMap<String, String>, ApiError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::MissingCredential);
    }

    let mut headers = BTreeMap::new();
    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    let user_agent = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), user_agent);
    headers.insert(HEADER_ACCEPT.to_owned(), accept.to_owned());
    headers.insert(HEADER_AUTHORIZATION.to_owned(), format!("Bearer {token}"));

    Ok(headers)
}

pub fn to_header_map(headers: BTreeMap<String, String>) -> Result<HeaderMap, ApiError> {
    let mut out = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ApiError::InvalidHeader(format!("invalid header name: {key}")))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|_| ApiError::InvalidHeader(format!("invalid header value for {key}")))?;
        out.insert(name, value);
    }
    Ok(out)
}

fn default_user_agent() -> String {
    format!("workbench-sync/{}", env!("CARGO_PKG_VERSION"))
}
