use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sync_protocol::{ResourceKey, Timestamp};

/// Number of leading bytes inspected when sniffing for binary content.
pub const SNIFF_PREFIX_BYTES: usize = 1000;

/// Cached body of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum Content {
    Text(String),
    Binary(
        #[serde(
            serialize_with = "serialize_base64",
            deserialize_with = "deserialize_base64"
        )]
        Vec<u8>,
    ),
}

impl Content {
    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Persisted copy of one resource, always written and replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub resource_key: ResourceKey,
    pub content: Content,
    pub mime_type: Option<String>,
    pub cached_last_modified: Timestamp,
}

impl CacheEntry {
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.content.is_binary()
    }
}

/// Decodes `bytes` as text, then sniffs the decoded prefix for control and
/// high-range characters. Plenty of binary formats survive a UTF-8 decode, so
/// a successful decode alone is not enough to call something text.
#[must_use]
pub fn classify_content(bytes: Vec<u8>) -> Content {
    match String::from_utf8(bytes) {
        Ok(text) if !has_binary_prefix(&text) => Content::Text(text),
        Ok(text) => Content::Binary(text.into_bytes()),
        Err(error) => Content::Binary(error.into_bytes()),
    }
}

fn has_binary_prefix(text: &str) -> bool {
    let limit = text.len().min(SNIFF_PREFIX_BYTES);
    text.char_indices()
        .take_while(|(offset, _)| *offset < limit)
        .any(|(_, c)| is_suspicious(c))
}

/// Tab, line feed, vertical tab, form feed and carriage return are allowed.
fn is_suspicious(c: char) -> bool {
    matches!(u32::from(c), 0x00..=0x08 | 0x0E..=0x1F | 0x7F..=0xFF)
}

fn serialize_base64<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
}

fn deserialize_base64<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}
