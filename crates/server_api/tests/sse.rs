use server_api::{SseFrame, SseFrameParser};

fn frame(event: Option<&str>, data: &str) -> SseFrame {
    SseFrame {
        event: event.map(ToString::to_string),
        data: data.to_string(),
    }
}

#[test]
fn sse_framing_reads_event_names_and_joins_data_lines() {
    let payload = concat!(
        "event: initial\n",
        "data: {\"history\":\n",
        "data: []}\n",
        "\n",
        "data: {\"type\":\"heartbeat\"}\n\n",
    );

    assert_eq!(
        SseFrameParser::parse_frames(payload),
        vec![
            frame(Some("initial"), "{\"history\":\n[]}"),
            frame(None, "{\"type\":\"heartbeat\"}"),
        ]
    );
}

#[test]
fn sse_parser_accepts_crlf_line_endings() {
    let payload = "event: message\r\ndata: {}\r\n\r\nevent: heartbeat\r\n\r\n";

    assert_eq!(
        SseFrameParser::parse_frames(payload),
        vec![frame(Some("message"), "{}"), frame(Some("heartbeat"), "")]
    );
}

#[test]
fn sse_parser_ignores_comments_and_unknown_fields() {
    let payload = concat!(
        ": ping\n\n",
        "id: 7\n",
        "retry: 1000\n",
        "event: heartbeat\n",
        "\n",
    );

    assert_eq!(
        SseFrameParser::parse_frames(payload),
        vec![frame(Some("heartbeat"), "")]
    );
}

#[test]
fn sse_parser_handles_split_frames_incrementally() {
    let mut parser = SseFrameParser::default();
    assert!(parser.feed(b"event: mess").is_empty());
    assert!(parser.feed(b"age\ndata: {\"message\":").is_empty());
    let frames = parser.feed(b"{}}\n\n");

    assert_eq!(frames, vec![frame(Some("message"), "{\"message\":{}}")]);
    assert!(parser.is_empty_buffer());
}

#[test]
fn sse_parser_keeps_incomplete_trailing_frame_pending() {
    let mut parser = SseFrameParser::default();
    assert!(parser.feed(b"event: initial\ndata: {\"history\":[]}\n").is_empty());
    assert!(!parser.is_empty_buffer());
}
