use sync_protocol::{ResourceKey, StreamContext};
use url::Url;

use crate::error::ApiError;

/// Default base URL for the workbench server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// `{base}/resources/{resource}/stream?profile=..&session_id=..`
pub fn stream_url(base: &str, context: &StreamContext) -> Result<Url, ApiError> {
    let mut url = endpoint(base, &["resources", context.resource_id(), "stream"])?;
    url.query_pairs_mut()
        .append_pair("profile", context.profile())
        .append_pair("session_id", context.session_id());
    Ok(url)
}

/// `{base}/collections/{collection}/resources`
pub fn metadata_url(base: &str, collection_id: &str) -> Result<Url, ApiError> {
    endpoint(base, &["collections", collection_id, "resources"])
}

/// `{base}/collections/{collection}/content/{path...}`
///
/// Each path segment is percent-encoded on its own so `/` keeps its meaning.
pub fn content_url(base: &str, key: &ResourceKey) -> Result<Url, ApiError> {
    let mut segments = vec!["collections", key.collection_id.as_str(), "content"];
    segments.extend(key.path.split('/').filter(|segment| !segment.is_empty()));
    endpoint(base, &segments)
}

/// `{base}/resources/{resource}/sessions?profile=..`
pub fn sessions_url(base: &str, resource_id: &str, profile: &str) -> Result<Url, ApiError> {
    let mut url = endpoint(base, &["resources", resource_id, "sessions"])?;
    url.query_pairs_mut().append_pair("profile", profile);
    Ok(url)
}

/// `{base}/resources/{resource}/profiles`
pub fn profiles_url(base: &str, resource_id: &str) -> Result<Url, ApiError> {
    endpoint(base, &["resources", resource_id, "profiles"])
}

fn endpoint(base: &str, segments: &[&str]) -> Result<Url, ApiError> {
    let base = match base.trim() {
        "" => DEFAULT_BASE_URL,
        trimmed => trimmed,
    };
    let mut url =
        Url::parse(base).map_err(|error| ApiError::InvalidUrl(format!("{base}: {error}")))?;
    url.path_segments_mut()
        .map_err(|()| ApiError::InvalidUrl(format!("{base}: cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
