use std::fmt;

use crate::error::ApiError;
use crate::events::StreamEvent;

/// Identifies one connection attempt of a [`crate::StreamClient`].
///
/// Ids are never reused by a client, so updates from a superseded connection
/// can always be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a connection is not (or no longer) open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Closed locally or ended cleanly by the server.
    Closed,
    /// Credential rejected by the server.
    Auth(String),
    /// Non-2xx response other than an auth rejection.
    Http(u16, String),
    /// Network failure while opening or reading.
    Transport(String),
    /// The credential provider had no token.
    MissingCredential,
}

impl DisconnectCause {
    pub fn from_error(error: &ApiError) -> Self {
        match error {
            ApiError::MissingCredential => Self::MissingCredential,
            ApiError::Credential(message) => Self::Auth(message.clone()),
            ApiError::Unauthorized(_, message) => Self::Auth(message.clone()),
            ApiError::Status(status, message) => Self::Http(status.as_u16(), message.clone()),
            other => Self::Transport(other.to_string()),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::MissingCredential)
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::Auth(message) => write!(f, "authentication failed: {message}"),
            Self::Http(status, message) => write!(f, "HTTP {status}: {message}"),
            Self::Transport(message) => write!(f, "connection lost: {message}"),
            Self::MissingCredential => write!(f, "sign in required"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected { cause: Option<DisconnectCause> },
    Connecting,
    Connected,
}

impl ConnectionState {
    pub const fn idle() -> Self {
        Self::Disconnected { cause: None }
    }

    pub fn disconnected(cause: DisconnectCause) -> Self {
        Self::Disconnected { cause: Some(cause) }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    pub fn cause(&self) -> Option<&DisconnectCause> {
        match self {
            Self::Disconnected { cause } => cause.as_ref(),
            _ => None,
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::idle()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    Event(StreamEvent),
    State(ConnectionState),
}

/// One item delivered on the stream client's update channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUpdate {
    pub connection: ConnectionId,
    pub kind: UpdateKind,
}

impl StreamUpdate {
    pub fn event(connection: ConnectionId, event: StreamEvent) -> Self {
        Self {
            connection,
            kind: UpdateKind::Event(event),
        }
    }

    pub fn state(connection: ConnectionId, state: ConnectionState) -> Self {
        Self {
            connection,
            kind: UpdateKind::State(state),
        }
    }
}
