//! Stream client, message log and context bound together.

use std::fmt;
use std::sync::Arc;

use futures_util::Stream;
use server_api::{
    ApiConfig, ApiError, ConnectionHandle, ConnectionId, ConnectionState, DisconnectCause,
    StreamClient, StreamEvent, StreamUpdate, UpdateKind,
};
use sync_protocol::{CredentialProvider, Message};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::context::{ContextSwitch, StreamContext};
use crate::message_log::MessageLog;
use crate::transcript::{render_transcript, RenderedMessage};

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("no context selected")]
    NoContext,
    #[error("failed to open stream: {0}")]
    Connect(#[from] ApiError),
}

impl ConversationError {
    pub fn is_auth(&self) -> bool {
        match self {
            Self::NoContext => false,
            Self::Connect(error) => error.is_auth(),
        }
    }
}

/// The live conversation for one context at a time.
///
/// Updates from the stream are applied by [`Conversation::drain`] or
/// [`Conversation::next_update`]; anything tagged with a connection other
/// than the current one is discarded.
pub struct Conversation {
    client: StreamClient,
    updates: mpsc::UnboundedReceiver<StreamUpdate>,
    credentials: Arc<dyn CredentialProvider>,
    log: MessageLog,
    context: Option<StreamContext>,
    connection: Option<ConnectionHandle>,
    state: ConnectionState,
    last_server_error: Option<String>,
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("context", &self.context)
            .field("connection", &self.current_connection())
            .field("state", &self.state)
            .field("messages", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl Conversation {
    pub fn new(
        config: ApiConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ConversationError> {
        let (tx, updates) = mpsc::unbounded_channel();
        let client = StreamClient::new(config, tx)?;
        Ok(Self {
            client,
            updates,
            credentials,
            log: MessageLog::new(),
            context: None,
            connection: None,
            state: ConnectionState::idle(),
            last_server_error: None,
        })
    }

    pub fn context(&self) -> Option<&StreamContext> {
        self.context.as_ref()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Error text from the most recent `error` frame, cleared by heartbeats
    /// and context changes.
    pub fn last_server_error(&self) -> Option<&str> {
        self.last_server_error.as_deref()
    }

    pub fn current_connection(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(ConnectionHandle::id)
    }

    pub fn messages(&self) -> Arc<[Message]> {
        self.log.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<[Message]>> {
        self.log.subscribe()
    }

    pub fn render(&self) -> Vec<RenderedMessage> {
        render_transcript(&self.messages())
    }

    /// Moves to `context`. The previous connection is closed and the log
    /// emptied before the new connection is attempted.
    ///
    /// Switching to the current context is a no-op while connected and a
    /// [`Conversation::reconnect`] otherwise.
    pub async fn switch_context(
        &mut self,
        context: StreamContext,
    ) -> Result<ContextSwitch, ConversationError> {
        let plan = ContextSwitch::plan(self.context.as_ref(), &context);
        if plan.is_switch() {
            self.enter(context);
        } else if self.connection.is_some() && !self.state.is_disconnected() {
            return Ok(plan);
        } else {
            self.close();
        }

        self.connect().await?;
        Ok(plan)
    }

    /// Opens a fresh connection for the current context. The log is kept
    /// until the new connection's `initial` frame replaces it.
    pub async fn reconnect(&mut self) -> Result<(), ConversationError> {
        if self.context.is_none() {
            return Err(ConversationError::NoContext);
        }
        self.close();
        self.connect().await
    }

    /// Like [`Conversation::switch_context`], over an already-open frame
    /// stream instead of an HTTP request.
    pub fn attach<S, B, E>(&mut self, context: StreamContext, bytes: S) -> ContextSwitch
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let plan = ContextSwitch::plan(self.context.as_ref(), &context);
        if plan.is_switch() {
            self.enter(context.clone());
        } else {
            self.close();
        }
        self.connection = Some(self.client.attach_stream(context, bytes));
        self.state = ConnectionState::Connecting;
        plan
    }

    pub fn disconnect(&mut self) {
        if self.close() {
            self.state = ConnectionState::disconnected(DisconnectCause::Closed);
        }
    }

    /// Applies one update. Returns `false` when it came from a stale connection.
    pub fn apply(&mut self, update: StreamUpdate) -> bool {
        if self.current_connection() != Some(update.connection) {
            tracing::trace!(connection = %update.connection, "discarding update from stale connection");
            return false;
        }

        match update.kind {
            UpdateKind::State(state) => {
                if let ConnectionState::Disconnected { cause } = &state {
                    tracing::info!(
                        connection = %update.connection,
                        cause = ?cause,
                        "conversation disconnected"
                    );
                }
                self.state = state;
            }
            UpdateKind::Event(StreamEvent::Initial { history }) => self.log.on_initial(history),
            UpdateKind::Event(StreamEvent::Append { message }) => self.log.on_append(message),
            UpdateKind::Event(StreamEvent::ServerError { error }) => {
                self.last_server_error = Some(error);
            }
            UpdateKind::Event(StreamEvent::Heartbeat) => {
                self.last_server_error = None;
                self.state = ConnectionState::Connected;
            }
        }
        true
    }

    /// Applies every update already queued. Returns how many were current.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.updates.try_recv() {
            if self.apply(update) {
                applied += 1;
            }
        }
        applied
    }

    /// Waits for the next update from the current connection and applies it.
    pub async fn next_update(&mut self) -> Option<StreamUpdate> {
        loop {
            let update = self.updates.recv().await?;
            if self.apply(update.clone()) {
                return Some(update);
            }
        }
    }

    fn enter(&mut self, context: StreamContext) {
        self.close();
        self.log.reset();
        self.last_server_error = None;
        tracing::info!(context = %context, "switching conversation context");
        self.context = Some(context);
    }

    async fn connect(&mut self) -> Result<(), ConversationError> {
        let context = self.context.clone().ok_or(ConversationError::NoContext)?;
        self.state = ConnectionState::Connecting;
        match self.client.connect(context, self.credentials.as_ref()).await {
            Ok(handle) => {
                self.connection = Some(handle);
                Ok(())
            }
            Err(error) => {
                self.state = ConnectionState::disconnected(DisconnectCause::from_error(&error));
                Err(error.into())
            }
        }
    }

    fn close(&mut self) -> bool {
        match self.connection.take() {
            Some(handle) => {
                self.client.disconnect(&handle);
                true
            }
            None => false,
        }
    }
}
