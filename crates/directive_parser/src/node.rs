use std::collections::BTreeMap;

use serde::Serialize;

/// One tokenized content node: a plain text run or a tagged span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Text { text: String },
    Element(Element),
}

/// Tagged span with attributes and ordered children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Node>,
}

impl Node {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn element(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Self::Element(Element::new(tag, children))
    }

    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            Self::Text { .. } => None,
        }
    }
}

impl Element {
    #[must_use]
    pub fn new(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children,
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    /// Element children in document order, skipping text runs.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// First descendant element with `tag`, depth-first in document order.
    #[must_use]
    pub fn find_descendant(&self, tag: &str) -> Option<&Element> {
        for child in self.child_elements() {
            if child.is(tag) {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(tag) {
                return Some(found);
            }
        }
        None
    }

    #[must_use]
    pub fn text_content(&self) -> String {
        flatten_text(&self.children)
    }
}

/// Concatenates all text under `nodes` in document order.
#[must_use]
pub fn flatten_text(nodes: &[Node]) -> String {
    let mut out = String::new();
    collect_text(nodes, &mut out);
    out
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text { text } => out.push_str(text),
            Node::Element(element) => collect_text(&element.children, out),
        }
    }
}

/// Serializes nodes back to markup, escaping text and attribute values.
#[must_use]
pub fn to_markup(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_markup(nodes, &mut out);
    out
}

fn write_markup(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text { text } => escape_into(text, false, out),
            Node::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                write_markup(&element.children, out);
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{flatten_text, to_markup, Element, Node};

    #[test]
    fn flatten_concatenates_nested_text_in_order() {
        let nodes = vec![
            Node::text("a"),
            Node::element(
                "b",
                vec![Node::text("c"), Node::element("d", vec![Node::text("e")])],
            ),
            Node::text("f"),
        ];
        assert_eq!(flatten_text(&nodes), "acef");
    }

    #[test]
    fn markup_escapes_text_and_attributes() {
        let nodes = vec![Node::Element(
            Element::new("p", vec![Node::text("1 < 2")]).with_attribute("title", "\"q\""),
        )];
        assert_eq!(to_markup(&nodes), "<p title=\"&quot;q&quot;\">1 &lt; 2</p>");
    }

    #[test]
    fn find_descendant_searches_depth_first() {
        let root = Element::new(
            "edit",
            vec![Node::element(
                "wrap",
                vec![Node::element("original", vec![Node::text("x")])],
            )],
        );
        assert_eq!(
            root.find_descendant("original").map(Element::text_content),
            Some("x".to_string())
        );
    }
}
