//! Per-message directive rendering with the single-active-prompt rule.

use directive_parser::{contains_choice, parse_message, set_choices_interactive, Directive};
use sync_protocol::{Message, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Position in the log snapshot.
    pub index: usize,
    pub role: Role,
    pub directives: Vec<Directive>,
}

/// Index of the last assistant message whose content holds a choice prompt.
///
/// Derived from the snapshot on every call; nothing is stored.
pub fn active_prompt_index(messages: &[Message]) -> Option<usize> {
    messages.iter().rposition(|message| {
        message.role == Role::Assistant
            && message
                .content
                .as_deref()
                .is_some_and(|content| contains_choice(&parse_message(content)))
    })
}

/// Parses every message; only choices of the active prompt are interactive.
pub fn render_transcript(messages: &[Message]) -> Vec<RenderedMessage> {
    let active = active_prompt_index(messages);
    messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let mut directives = message
                .content
                .as_deref()
                .map(parse_message)
                .unwrap_or_default();
            set_choices_interactive(&mut directives, active == Some(index));
            RenderedMessage {
                index,
                role: message.role,
                directives,
            }
        })
        .collect()
}
