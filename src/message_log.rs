//! Ordered transcript of the current context.

use std::sync::Arc;

use sync_protocol::Message;
use tokio::sync::watch;

/// Append-only message sequence, replaced wholesale by each `initial` frame.
///
/// Subscribers receive the full sequence after every mutation. The log keeps
/// arrival order and never deduplicates.
#[derive(Debug)]
pub struct MessageLog {
    messages: watch::Sender<Arc<[Message]>>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    pub fn new() -> Self {
        let (messages, _) = watch::channel(Arc::from(Vec::new()));
        Self { messages }
    }

    /// Replaces the whole log with `history`.
    pub fn on_initial(&self, history: Vec<Message>) {
        self.messages.send_replace(Arc::from(history));
    }

    pub fn on_append(&self, message: Message) {
        self.messages.send_modify(|messages| {
            let mut next = Vec::with_capacity(messages.len() + 1);
            next.extend_from_slice(messages);
            next.push(message);
            *messages = Arc::from(next);
        });
    }

    /// Empties the log, as when the context changes.
    pub fn reset(&self) {
        self.on_initial(Vec::new());
    }

    pub fn snapshot(&self) -> Arc<[Message]> {
        Arc::clone(&self.messages.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<[Message]>> {
        self.messages.subscribe()
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
