//! Shared contract types for the workbench sync layer.
//!
//! This crate defines the transcript and resource data model plus the two
//! seams the core talks through: a [`CredentialProvider`] that supplies bearer
//! tokens and a [`ResourceSource`] that serves metadata and content. It
//! contains no transport code.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

mod message;
mod resource;
mod timestamp;

pub use message::{Message, Role, ToolCall, ToolResultItem};
pub use resource::{
    collection_prefix, FetchedContent, Profile, ResourceKey, ResourceMetadata, Session,
    StreamContext,
};
pub use timestamp::Timestamp;

/// Error raised by a credential provider while producing a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialError {
    message: String,
}

impl CredentialError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CredentialError {}

/// Supplies bearer credentials. Asked again on every connection attempt and request.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns the current token, or `None` when the user is signed out.
    async fn bearer_token(&self) -> Result<Option<String>, CredentialError>;
}

#[async_trait]
impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    async fn bearer_token(&self) -> Result<Option<String>, CredentialError> {
        (**self).bearer_token().await
    }
}

/// Coarse failure class for metadata/content fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Transport-level failure; a retry may succeed.
    Network,
    /// Missing or rejected credential.
    Auth,
    /// Non-2xx response other than an auth rejection.
    Status(u16),
    /// Response body did not match the expected shape.
    Decode,
}

/// Error returned by a [`ResourceSource`] operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub message: String,
}

impl SourceError {
    #[must_use]
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Network, message)
    }

    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.kind == SourceErrorKind::Auth
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SourceErrorKind::Network => write!(f, "network error: {}", self.message),
            SourceErrorKind::Auth => write!(f, "authentication failed: {}", self.message),
            SourceErrorKind::Status(status) => write!(f, "HTTP {status}: {}", self.message),
            SourceErrorKind::Decode => write!(f, "invalid response body: {}", self.message),
        }
    }
}

impl std::error::Error for SourceError {}

/// Read access to the server of record for resource collections.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Lists metadata for every resource in a collection without fetching content.
    async fn list_metadata(&self, collection_id: &str)
        -> Result<Vec<ResourceMetadata>, SourceError>;

    /// Fetches the full content of one resource.
    async fn fetch_content(&self, key: &ResourceKey) -> Result<FetchedContent, SourceError>;
}

#[async_trait]
impl<T: ResourceSource + ?Sized> ResourceSource for Arc<T> {
    async fn list_metadata(
        &self,
        collection_id: &str,
    ) -> Result<Vec<ResourceMetadata>, SourceError> {
        (**self).list_metadata(collection_id).await
    }

    async fn fetch_content(&self, key: &ResourceKey) -> Result<FetchedContent, SourceError> {
        (**self).fetch_content(key).await
    }
}
