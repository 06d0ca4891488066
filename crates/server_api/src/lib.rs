//! Transport-only client for the workbench server.
//!
//! This crate owns request building, push-stream framing and frame
//! classification. It contains no credential acquisition and no caching; a
//! [`sync_protocol::CredentialProvider`] is consulted on every connection
//! attempt and every REST call.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod reconnect;
pub mod sse;
pub mod state;
pub mod stream;
pub mod url;

pub use client::ApiClient;
pub use config::ApiConfig;
pub use error::{parse_error_message, ApiError};
pub use events::{classify_frame, FrameOutcome, StreamEvent};
pub use reconnect::ReconnectPolicy;
pub use sse::{SseFrame, SseFrameParser};
pub use state::{ConnectionId, ConnectionState, DisconnectCause, StreamUpdate, UpdateKind};
pub use stream::{ConnectionHandle, StreamClient};
