use std::fmt;

use futures_util::{Stream, StreamExt};
use reqwest::Client;
use sync_protocol::{CredentialProvider, StreamContext};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::events::{classify_frame, FrameOutcome, StreamEvent};
use crate::headers::{build_headers, to_header_map, ACCEPT_EVENT_STREAM};
use crate::sse::SseFrameParser;
use crate::state::{ConnectionId, ConnectionState, DisconnectCause, StreamUpdate};
use crate::url::stream_url;

/// Returned by [`StreamClient::connect`]; names one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    id: ConnectionId,
    context: StreamContext,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn context(&self) -> &StreamContext {
        &self.context
    }
}

struct LiveConnection {
    id: ConnectionId,
    pump: JoinHandle<()>,
}

/// Push-stream client holding at most one live connection.
///
/// Events and state transitions are delivered on the channel passed to
/// [`StreamClient::new`], each tagged with the [`ConnectionId`] that produced
/// it. Connections are never reopened automatically.
pub struct StreamClient {
    http: Client,
    config: ApiConfig,
    updates: UnboundedSender<StreamUpdate>,
    next_id: u64,
    live: Option<LiveConnection>,
}

impl fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("config", &self.config)
            .field("live", &self.live.as_ref().map(|live| live.id))
            .finish_non_exhaustive()
    }
}

impl StreamClient {
    pub fn new(config: ApiConfig, updates: UnboundedSender<StreamUpdate>) -> Result<Self, ApiError> {
        // No request timeout: a stream is expected to stay open indefinitely.
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            config,
            updates,
            next_id: 0,
            live: None,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Id of the live connection, if any.
    pub fn live_connection(&self) -> Option<ConnectionId> {
        self.live.as_ref().map(|live| live.id)
    }

    /// Opens a connection for `context`, closing any previous one first.
    ///
    /// A fresh token is requested from `credentials` on every call. Failures
    /// are both returned and reported as a `Disconnected` update carrying the
    /// matching cause.
    pub async fn connect(
        &mut self,
        context: StreamContext,
        credentials: &dyn CredentialProvider,
    ) -> Result<ConnectionHandle, ApiError> {
        self.close_live();
        let id = self.allocate_id();
        self.emit(StreamUpdate::state(id, ConnectionState::Connecting));
        tracing::debug!(connection = %id, context = %context, "opening stream");

        match self.open(&context, credentials).await {
            Ok(response) => Ok(self.start_pump(id, context, response.bytes_stream())),
            Err(error) => {
                let cause = DisconnectCause::from_error(&error);
                tracing::warn!(connection = %id, context = %context, error = %error, "stream open failed");
                self.emit(StreamUpdate::state(id, ConnectionState::disconnected(cause)));
                Err(error)
            }
        }
    }

    /// Starts a connection over an already-open byte stream, closing any
    /// previous connection first. Must be called within a Tokio runtime.
    pub fn attach_stream<S, B, E>(&mut self, context: StreamContext, bytes: S) -> ConnectionHandle
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.close_live();
        let id = self.allocate_id();
        self.emit(StreamUpdate::state(id, ConnectionState::Connecting));
        self.start_pump(id, context, bytes)
    }

    /// Closes the connection named by `handle`. Stale handles are ignored.
    pub fn disconnect(&mut self, handle: &ConnectionHandle) {
        if self.live_connection() == Some(handle.id) {
            self.close_live();
        }
    }

    async fn open(
        &self,
        context: &StreamContext,
        credentials: &dyn CredentialProvider,
    ) -> Result<reqwest::Response, ApiError> {
        let token = credentials
            .bearer_token()
            .await?
            .ok_or(ApiError::MissingCredential)?;
        let url = stream_url(&self.config.base_url, context)?;
        let headers = to_header_map(build_headers(&self.config, &token, ACCEPT_EVENT_STREAM)?)?;

        let response = self.http.get(url).headers(headers).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }

    fn start_pump<S, B, E>(
        &mut self,
        id: ConnectionId,
        context: StreamContext,
        bytes: S,
    ) -> ConnectionHandle
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.emit(StreamUpdate::state(id, ConnectionState::Connected));
        tracing::info!(connection = %id, context = %context, "stream connected");
        let pump = tokio::spawn(pump(id, bytes, self.updates.clone()));
        self.live = Some(LiveConnection { id, pump });
        ConnectionHandle { id, context }
    }

    fn close_live(&mut self) {
        if let Some(live) = self.live.take() {
            live.pump.abort();
            tracing::debug!(connection = %live.id, "stream closed");
            self.emit(StreamUpdate::state(
                live.id,
                ConnectionState::disconnected(DisconnectCause::Closed),
            ));
        }
    }

    fn allocate_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId::new(self.next_id)
    }

    fn emit(&self, update: StreamUpdate) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.updates.send(update);
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            live.pump.abort();
        }
    }
}

async fn pump<S, B, E>(id: ConnectionId, bytes: S, updates: UnboundedSender<StreamUpdate>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut bytes = std::pin::pin!(bytes);
    let mut parser = SseFrameParser::default();
    let mut initial_seen = false;

    while let Some(chunk) = bytes.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                tracing::warn!(connection = %id, error = %error, "stream transport failed");
                let cause = DisconnectCause::Transport(error.to_string());
                let _ = updates.send(StreamUpdate::state(id, ConnectionState::disconnected(cause)));
                return;
            }
        };

        for frame in parser.feed(chunk.as_ref()) {
            let updates_for_frame = match classify_frame(&frame) {
                FrameOutcome::Event(event) => on_event(id, event, &mut initial_seen),
                FrameOutcome::Ignored { frame_type } => {
                    tracing::debug!(connection = %id, frame_type = %frame_type, "ignoring unknown frame type");
                    Vec::new()
                }
                FrameOutcome::Malformed { frame_type, reason } => {
                    tracing::warn!(
                        connection = %id,
                        frame_type = frame_type.as_deref().unwrap_or("<none>"),
                        reason = %reason,
                        "dropping malformed frame"
                    );
                    Vec::new()
                }
            };
            for update in updates_for_frame {
                if updates.send(update).is_err() {
                    return;
                }
            }
        }
    }

    if !parser.is_empty_buffer() {
        tracing::debug!(connection = %id, "discarding incomplete trailing frame");
    }
    tracing::info!(connection = %id, "stream ended");
    let _ = updates.send(StreamUpdate::state(
        id,
        ConnectionState::disconnected(DisconnectCause::Closed),
    ));
}

fn on_event(id: ConnectionId, event: StreamEvent, initial_seen: &mut bool) -> Vec<StreamUpdate> {
    match &event {
        StreamEvent::Initial { history } => {
            if *initial_seen {
                tracing::info!(connection = %id, messages = history.len(), "resynchronizing history");
            } else {
                tracing::debug!(connection = %id, messages = history.len(), "initial history");
            }
            *initial_seen = true;
            vec![StreamUpdate::event(id, event)]
        }
        StreamEvent::Heartbeat => vec![
            StreamUpdate::state(id, ConnectionState::Connected),
            StreamUpdate::event(id, event),
        ],
        StreamEvent::ServerError { error } => {
            tracing::warn!(connection = %id, error = %error, "server reported error");
            vec![StreamUpdate::event(id, event)]
        }
        StreamEvent::Append { .. } => vec![StreamUpdate::event(id, event)],
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use sync_protocol::{Message, StreamContext};
    use tokio::sync::mpsc;

    use super::StreamClient;
    use crate::config::ApiConfig;
    use crate::events::StreamEvent;
    use crate::state::{ConnectionState, DisconnectCause, StreamUpdate, UpdateKind};

    fn context() -> StreamContext {
        StreamContext::new("r1", "default", "s1")
    }

    async fn collect_until_disconnected(
        rx: &mut mpsc::UnboundedReceiver<StreamUpdate>,
    ) -> Vec<StreamUpdate> {
        let mut seen = Vec::new();
        while let Some(update) = rx.recv().await {
            let done = matches!(
                &update.kind,
                UpdateKind::State(ConnectionState::Disconnected { .. })
            );
            seen.push(update);
            if done {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn pump_emits_events_in_arrival_order_then_closes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client = StreamClient::new(ApiConfig::default(), tx).expect("client");
        let body = concat!(
            "event: initial\ndata: {\"history\":[{\"role\":\"user\",\"content\":\"hi\"}]}\n\n",
            ": keep-alive comment\n\n",
            "event: bogus\ndata: {}\n\n",
            "event: message\ndata: {not json\n\n",
            "event: message\ndata: {\"message\":{\"role\":\"assistant\",\"content\":\"yo\"}}\n\n",
        );
        let chunks: Vec<Result<&'static [u8], std::io::Error>> = vec![
            Ok(&body.as_bytes()[..20]),
            Ok(&body.as_bytes()[20..]),
        ];
        let handle = client.attach_stream(context(), stream::iter(chunks));

        let updates = collect_until_disconnected(&mut rx).await;
        assert!(updates.iter().all(|update| update.connection == handle.id()));
        let kinds: Vec<_> = updates.into_iter().map(|update| update.kind).collect();
        assert_eq!(
            kinds,
            vec![
                UpdateKind::State(ConnectionState::Connecting),
                UpdateKind::State(ConnectionState::Connected),
                UpdateKind::Event(StreamEvent::Initial {
                    history: vec![Message::user("hi")],
                }),
                UpdateKind::Event(StreamEvent::Append {
                    message: Message::assistant("yo"),
                }),
                UpdateKind::State(ConnectionState::disconnected(DisconnectCause::Closed)),
            ]
        );
    }

    #[tokio::test]
    async fn transport_error_reports_transport_cause() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client = StreamClient::new(ApiConfig::default(), tx).expect("client");
        let chunks: Vec<Result<&'static [u8], String>> = vec![
            Ok(&b"event: heartbeat\n\n"[..]),
            Err("connection reset by peer".to_string()),
        ];
        client.attach_stream(context(), stream::iter(chunks));

        let updates = collect_until_disconnected(&mut rx).await;
        let last = updates.last().expect("final update");
        assert_eq!(
            last.kind,
            UpdateKind::State(ConnectionState::disconnected(DisconnectCause::Transport(
                "connection reset by peer".to_string()
            )))
        );
        assert!(updates
            .iter()
            .any(|update| update.kind == UpdateKind::Event(StreamEvent::Heartbeat)));
    }

    #[tokio::test]
    async fn attaching_again_closes_the_previous_connection() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client = StreamClient::new(ApiConfig::default(), tx).expect("client");
        let first = client.attach_stream(
            context(),
            stream::pending::<Result<&'static [u8], String>>(),
        );
        let second = client.attach_stream(
            context().with_session("s2"),
            stream::pending::<Result<&'static [u8], String>>(),
        );

        assert_ne!(first.id(), second.id());
        assert_eq!(client.live_connection(), Some(second.id()));

        client.disconnect(&first);
        assert_eq!(client.live_connection(), Some(second.id()));

        let mut closed_first = false;
        while let Ok(update) = rx.try_recv() {
            if update.connection == first.id()
                && update.kind
                    == UpdateKind::State(ConnectionState::disconnected(DisconnectCause::Closed))
            {
                closed_first = true;
            }
        }
        assert!(closed_first);

        client.disconnect(&second);
        assert_eq!(client.live_connection(), None);
    }
}
