use server_api::url::{
    content_url, metadata_url, profiles_url, sessions_url, stream_url, DEFAULT_BASE_URL,
};
use sync_protocol::{ResourceKey, StreamContext};

#[test]
fn stream_url_carries_profile_and_session_in_query() {
    let context = StreamContext::new("repo 1", "code review", "s/1");
    let url = stream_url("https://example.test/api/", &context).expect("url");

    assert_eq!(
        url.as_str(),
        "https://example.test/api/resources/repo%201/stream?profile=code+review&session_id=s%2F1"
    );
}

#[test]
fn content_url_encodes_each_path_segment() {
    let key = ResourceKey::new("c1", "src/my file#1.rs");
    let url = content_url("https://example.test/api", &key).expect("url");

    assert_eq!(
        url.as_str(),
        "https://example.test/api/collections/c1/content/src/my%20file%231.rs"
    );
}

#[test]
fn empty_base_uses_default() {
    let url = metadata_url("  ", "c1").expect("url");
    assert_eq!(url.as_str(), format!("{DEFAULT_BASE_URL}/collections/c1/resources"));
}

#[test]
fn session_and_profile_urls() {
    assert_eq!(
        sessions_url("http://h/api", "r1", "default")
            .expect("url")
            .as_str(),
        "http://h/api/resources/r1/sessions?profile=default"
    );
    assert_eq!(
        profiles_url("http://h/api", "r1").expect("url").as_str(),
        "http://h/api/resources/r1/profiles"
    );
}

#[test]
fn invalid_base_is_reported() {
    assert!(metadata_url("not a url", "c1").is_err());
    assert!(metadata_url("mailto:someone@example.test", "c1").is_err());
}
