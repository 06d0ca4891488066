use std::collections::BTreeMap;

use serde::Serialize;

use crate::node::Node;

/// Renderer-agnostic instruction derived from message markup.
///
/// Directives are rebuilt on every render pass and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    /// Plain text for default rendering.
    Text { text: String },
    /// Unrecognized element rendered by default, with parsed children.
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        children: Vec<Directive>,
    },
    CodeDiff(CodeDiff),
    Choice(ChoicePrompt),
    ResponseEcho(ResponseEcho),
    FormattedBlock(FormattedBlock),
}

impl Directive {
    /// One-for-one conversion used when nothing in a subtree is recognized.
    #[must_use]
    pub fn from_node(node: &Node) -> Self {
        match node {
            Node::Text { text } => Self::Text { text: text.clone() },
            Node::Element(element) => Self::Element {
                tag: element.tag.clone(),
                attributes: element.attributes.clone(),
                children: element.children.iter().map(Self::from_node).collect(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeDiff {
    pub file: String,
    pub original: String,
    pub updated: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceItem {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Single-choice prompt. Only the transcript's most recent prompt is interactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoicePrompt {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub items: Vec<ChoiceItem>,
    pub interactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseItem {
    pub id: String,
    pub value: String,
}

/// Echo of answers the user already submitted to earlier prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseEcho {
    pub items: Vec<ResponseItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", content = "value", rename_all = "snake_case")]
pub enum BlockFormat {
    Html,
    Mermaid,
    Unsupported(String),
}

impl BlockFormat {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "html" => Self::Html,
            "mermaid" => Self::Mermaid,
            _ => Self::Unsupported(normalized),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedBlock {
    pub format: BlockFormat,
    pub raw: String,
}

impl FormattedBlock {
    /// Visible warning text for formats the renderer cannot display.
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        match &self.format {
            BlockFormat::Unsupported(name) => Some(format!(
                "Unsupported block format \"{name}\"; showing raw content:\n{}",
                self.raw
            )),
            BlockFormat::Html | BlockFormat::Mermaid => None,
        }
    }
}

/// Returns whether any choice prompt appears anywhere in `directives`.
#[must_use]
pub fn contains_choice(directives: &[Directive]) -> bool {
    directives.iter().any(|directive| match directive {
        Directive::Choice(_) => true,
        Directive::Element { children, .. } => contains_choice(children),
        _ => false,
    })
}

/// Sets the interactive flag on every choice prompt in `directives`.
pub fn set_choices_interactive(directives: &mut [Directive], interactive: bool) {
    for directive in directives {
        match directive {
            Directive::Choice(choice) => choice.interactive = interactive,
            Directive::Element { children, .. } => set_choices_interactive(children, interactive),
            _ => {}
        }
    }
}
