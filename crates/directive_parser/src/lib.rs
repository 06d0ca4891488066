//! Structured-markup interpretation for conversational text.
//!
//! Message bodies are tokenized into a [`Node`] tree and then classified into
//! typed [`Directive`]s (code diffs, choice prompts, response echoes and
//! formatted blocks). Anything that does not match a known shape falls back to
//! default rendering instead of failing.

mod directive;
mod node;
mod parse;
mod tokenize;

pub use directive::{
    contains_choice, set_choices_interactive, BlockFormat, ChoiceItem, ChoicePrompt, CodeDiff,
    Directive, FormattedBlock, ResponseEcho, ResponseItem,
};
pub use node::{flatten_text, to_markup, Element, Node};
pub use parse::{parse, parse_message};
pub use tokenize::{decode_entities, tokenize};
