//! Selection of the (resource, profile, session) context.

use server_api::{ApiClient, ApiError};
use sync_protocol::Session;

pub use sync_protocol::StreamContext;

/// Outcome of moving to a new context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextSwitch {
    /// Already on this context with a usable connection.
    Unchanged,
    Switched {
        previous: Option<StreamContext>,
        current: StreamContext,
    },
}

impl ContextSwitch {
    pub fn plan(current: Option<&StreamContext>, next: &StreamContext) -> Self {
        match current {
            Some(current) if current == next => Self::Unchanged,
            previous => Self::Switched {
                previous: previous.cloned(),
                current: next.clone(),
            },
        }
    }

    pub fn is_switch(&self) -> bool {
        matches!(self, Self::Switched { .. })
    }
}

/// The session a context should open: the server's default if it names one,
/// otherwise the most recently updated. Ties keep server order.
pub fn select_current_session(sessions: &[Session]) -> Option<&Session> {
    sessions.iter().find(|session| session.is_default).or_else(|| {
        sessions
            .iter()
            .rev()
            .max_by_key(|session| session.last_updated)
    })
}

/// Resolves a full context for `resource_id`/`profile`, creating a session
/// when the server has none.
pub async fn resolve_context(
    client: &ApiClient,
    resource_id: &str,
    profile: &str,
) -> Result<StreamContext, ApiError> {
    let sessions = client.list_sessions(resource_id, profile).await?;
    let session_id = match select_current_session(&sessions) {
        Some(session) => session.session_id.clone(),
        None => {
            tracing::info!(resource = %resource_id, profile = %profile, "creating first session");
            client.create_session(resource_id, profile).await?.session_id
        }
    };
    Ok(StreamContext::new(resource_id, profile, session_id))
}
