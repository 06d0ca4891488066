use serde::{Deserialize, Serialize};
use serde_json::Value;
use sync_protocol::Message;

use crate::sse::SseFrame;

pub const FRAME_INITIAL: &str = "initial";
pub const FRAME_MESSAGE: &str = "message";
pub const FRAME_ERROR: &str = "error";
pub const FRAME_HEARTBEAT: &str = "heartbeat";

/// Typed push-stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Full history; replaces whatever the consumer holds.
    Initial { history: Vec<Message> },
    /// One new message, in arrival order.
    Append { message: Message },
    /// Server-reported error text. The connection stays open.
    ServerError { error: String },
    Heartbeat,
}

/// Result of classifying one raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Event(StreamEvent),
    /// Well-formed frame of a type this client does not handle.
    Ignored { frame_type: String },
    /// Frame whose payload could not be decoded. Only this frame is lost.
    Malformed {
        frame_type: Option<String>,
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct InitialPayload {
    history: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    message: Message,
}

/// Classify a frame by its declared type.
///
/// The `event:` field names the type; without one, a `type` field in the JSON
/// payload is used instead.
pub fn classify_frame(frame: &SseFrame) -> FrameOutcome {
    let payload = if frame.data.trim().is_empty() {
        None
    } else {
        match serde_json::from_str::<Value>(&frame.data) {
            Ok(value) => Some(value),
            Err(error) => {
                return FrameOutcome::Malformed {
                    frame_type: frame.event.clone(),
                    reason: error.to_string(),
                }
            }
        }
    };

    let frame_type = frame.event.clone().or_else(|| {
        payload
            .as_ref()
            .and_then(|value| value.get("type"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
    });
    let Some(frame_type) = frame_type else {
        return FrameOutcome::Malformed {
            frame_type: None,
            reason: "frame has no type".to_string(),
        };
    };

    match frame_type.as_str() {
        FRAME_HEARTBEAT => FrameOutcome::Event(StreamEvent::Heartbeat),
        FRAME_INITIAL => match decode::<InitialPayload>(payload, &frame_type) {
            Ok(InitialPayload { history }) => FrameOutcome::Event(StreamEvent::Initial { history }),
            Err(outcome) => outcome,
        },
        FRAME_MESSAGE => match decode::<MessagePayload>(payload, &frame_type) {
            Ok(MessagePayload { message }) => FrameOutcome::Event(StreamEvent::Append { message }),
            Err(outcome) => outcome,
        },
        FRAME_ERROR => FrameOutcome::Event(StreamEvent::ServerError {
            error: error_text(payload.as_ref()),
        }),
        _ => FrameOutcome::Ignored { frame_type },
    }
}

fn decode<T>(payload: Option<Value>, frame_type: &str) -> Result<T, FrameOutcome>
where
    T: for<'de> Deserialize<'de>,
{
    let Some(payload) = payload else {
        return Err(FrameOutcome::Malformed {
            frame_type: Some(frame_type.to_string()),
            reason: "missing payload".to_string(),
        });
    };
    serde_json::from_value(payload).map_err(|error| FrameOutcome::Malformed {
        frame_type: Some(frame_type.to_string()),
        reason: error.to_string(),
    })
}

fn error_text(payload: Option<&Value>) -> String {
    match payload.and_then(|value| value.get("error")) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => "unknown server error".to_string(),
        Some(other) => other.to_string(),
    }
}
