use std::fmt;

use reqwest::StatusCode;
use serde_json::{Error as JsonError, Value};
use sync_protocol::{CredentialError, SourceError, SourceErrorKind};

#[derive(Debug)]
pub enum ApiError {
    /// The credential provider had no token to offer.
    MissingCredential,
    /// The credential provider itself failed.
    Credential(String),
    InvalidUrl(String),
    InvalidHeader(String),
    /// Transport failure before a response status was available.
    Request(reqwest::Error),
    /// 401 or 403 from the server.
    Unauthorized(StatusCode, String),
    Status(StatusCode, String),
    Serde(JsonError),
}

impl ApiError {
    /// Builds the error for a non-2xx response, splitting out auth rejections.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = parse_error_message(status, body);
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            Self::Unauthorized(status, message)
        } else {
            Self::Status(status, message)
        }
    }

    /// True when re-authenticating, not retrying, is the useful reaction.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential | Self::Credential(_) | Self::Unauthorized(..)
        )
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized(status, _) | Self::Status(status, _) => Some(*status),
            Self::Request(error) => error.status(),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "no credential available"),
            Self::Credential(message) => write!(f, "credential provider failed: {message}"),
            Self::InvalidUrl(message) => write!(f, "invalid URL: {message}"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Unauthorized(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

impl From<CredentialError> for ApiError {
    fn from(error: CredentialError) -> Self {
        Self::Credential(error.message().to_string())
    }
}

impl From<ApiError> for SourceError {
    fn from(error: ApiError) -> Self {
        let kind = match &error {
            ApiError::MissingCredential | ApiError::Credential(_) | ApiError::Unauthorized(..) => {
                SourceErrorKind::Auth
            }
            ApiError::Status(status, _) => SourceErrorKind::Status(status.as_u16()),
            ApiError::Serde(_) => SourceErrorKind::Decode,
            ApiError::Request(_) | ApiError::InvalidUrl(_) | ApiError::InvalidHeader(_) => {
                SourceErrorKind::Network
            }
        };
        SourceError::new(kind, error.to_string())
    }
}

/// Extracts a human-readable message from an error response body.
///
/// JSON bodies are searched for `error` (string or `{message}`), `detail`
/// and `message`, in that order. Anything else falls back to the raw body,
/// or the canonical reason when the body is empty.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = message_from_json(&value) {
            return message;
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

fn message_from_json(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    let error = object.get("error").and_then(|error| match error {
        Value::String(message) => Some(message.as_str()),
        Value::Object(fields) => fields.get("message").and_then(Value::as_str),
        _ => None,
    });

    error
        .or_else(|| object.get("detail").and_then(Value::as_str))
        .or_else(|| object.get("message").and_then(Value::as_str))
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(ToString::to_string)
}
