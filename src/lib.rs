//! Client-side synchronization core for an interactive workbench.
//!
//! Two kinds of remote state are kept in step with the server of record:
//! - a live conversation transcript, fed by a push stream scoped to a
//!   (resource, profile, session) [`StreamContext`] ([`conversation`]);
//! - resource trees, polled by the [`reconciler`] and cached through
//!   [`resource_cache`].
//!
//! Message bodies are interpreted into renderable directives by
//! [`directive_parser`] via [`transcript`].

pub mod config;
pub mod context;
pub mod conversation;
pub mod logging;
pub mod message_log;
pub mod reconciler;
pub mod transcript;

pub use config::SyncConfig;
pub use context::{resolve_context, select_current_session, ContextSwitch, StreamContext};
pub use conversation::{Conversation, ConversationError};
pub use logging::init_logging;
pub use message_log::MessageLog;
pub use reconciler::{diff_snapshots, ChangeSet, ReconcileError, Reconciler, Snapshot};
pub use transcript::{active_prompt_index, render_transcript, RenderedMessage};

pub use directive_parser;
pub use resource_cache;
pub use server_api;
pub use sync_protocol;
