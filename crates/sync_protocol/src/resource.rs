use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// Lightweight metadata row returned by the resource listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    pub path: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(rename = "size", default)]
    pub size_bytes: u64,
    pub last_modified: Timestamp,
}

/// Identity of one resource: a path unique within its collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub collection_id: String,
    pub path: String,
}

impl ResourceKey {
    #[must_use]
    pub fn new(collection_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            path: path.into(),
        }
    }

    /// Composite persistence key. The NUL separator cannot appear in either part.
    #[must_use]
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{}{}", collection_prefix(prefix, &self.collection_id), self.path)
    }
}

/// Persistence key prefix shared by every resource of one collection.
#[must_use]
pub fn collection_prefix(prefix: &str, collection_id: &str) -> String {
    format!("{prefix}:{collection_id}\u{0}")
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection_id, self.path)
    }
}

/// Raw body returned by a content fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedContent {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(ToString::to_string),
        }
    }

    /// Content type without parameters (`text/plain; charset=utf-8` -> `text/plain`).
    #[must_use]
    pub fn mime_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_ascii_lowercase)
    }
}

/// One conversation thread available for a (resource, profile) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(alias = "session_id")]
    pub session_id: String,
    #[serde(default, alias = "last_message")]
    pub last_message: Option<String>,
    #[serde(default, alias = "last_updated")]
    pub last_updated: Option<Timestamp>,
    #[serde(default, alias = "is_default")]
    pub is_default: bool,
}

/// Assistant profile selectable for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The (resource, profile, session) triple scoping one stream and one message log.
///
/// Values are immutable; switching any part yields a new context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamContext {
    resource_id: String,
    profile: String,
    session_id: String,
}

impl StreamContext {
    #[must_use]
    pub fn new(
        resource_id: impl Into<String>,
        profile: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            profile: profile.into(),
            session_id: session_id.into(),
        }
    }

    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    #[must_use]
    pub fn profile(&self) -> &str {
        &self.profile
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn with_session(&self, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..self.clone()
        }
    }

    /// Profile switches keep the resource but must pick a session again.
    #[must_use]
    pub fn with_profile(&self, profile: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            resource_id: self.resource_id.clone(),
            profile: profile.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for StreamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.resource_id, self.profile, self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchedContent, ResourceKey, ResourceMetadata, StreamContext};
    use serde_json::json;

    #[test]
    fn metadata_reads_size_and_last_modified() {
        let metadata: ResourceMetadata = serde_json::from_value(json!({
            "path": "src/main.rs",
            "mimeType": "text/x-rust",
            "size": 42,
            "lastModified": "2026-02-14T00:00:00Z",
        }))
        .expect("metadata parses");
        assert_eq!(metadata.size_bytes, 42);
        assert_eq!(metadata.mime_type.as_deref(), Some("text/x-rust"));
    }

    #[test]
    fn storage_keys_share_collection_prefix() {
        let key = ResourceKey::new("c1", "a/b.txt");
        assert!(key
            .storage_key("content")
            .starts_with(&super::collection_prefix("content", "c1")));
        assert_ne!(
            ResourceKey::new("c1", "x").storage_key("lm"),
            ResourceKey::new("c", "1x").storage_key("lm")
        );
    }

    #[test]
    fn mime_type_strips_parameters() {
        let content = FetchedContent::new(b"x".to_vec(), Some("Text/Plain; charset=utf-8"));
        assert_eq!(content.mime_type().as_deref(), Some("text/plain"));
    }

    #[test]
    fn context_transitions_produce_new_values() {
        let context = StreamContext::new("repo", "default", "s1");
        let next = context.with_session("s2");
        assert_eq!(context.session_id(), "s1");
        assert_eq!(next.session_id(), "s2");
        assert_eq!(next.resource_id(), "repo");
    }
}
