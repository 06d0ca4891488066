use crate::directive::{
    BlockFormat, ChoiceItem, ChoicePrompt, CodeDiff, Directive, FormattedBlock, ResponseEcho,
    ResponseItem,
};
use crate::node::{flatten_text, to_markup, Element, Node};
use crate::tokenize::tokenize;

/// Directive shape an element was classified as.
enum Shape<'a> {
    Choice(ChoicePrompt),
    CodeDiff(&'a Element, &'a str),
    Formatted(&'a Element, &'a str),
    Generic(&'a Element),
}

/// Tokenizes and parses one message body.
#[must_use]
pub fn parse_message(text: &str) -> Vec<Directive> {
    parse(&tokenize(text))
}

/// Turns content nodes into directives.
///
/// A `responses` child wins outright. Otherwise each element is classified on
/// its own in priority order: `select` prompt, then a `file` attribute (code
/// diff), then a `format` attribute (formatted block). Unrecognized elements
/// are parsed recursively. When nothing in the tree is recognized the nodes
/// come back unchanged.
#[must_use]
pub fn parse(nodes: &[Node]) -> Vec<Directive> {
    let (directives, matched) = parse_level(nodes);
    if matched {
        directives
    } else {
        nodes.iter().map(Directive::from_node).collect()
    }
}

fn parse_level(nodes: &[Node]) -> (Vec<Directive>, bool) {
    if let Some(responses) = nodes
        .iter()
        .filter_map(Node::as_element)
        .find(|element| element.is("responses"))
    {
        return (vec![Directive::ResponseEcho(response_echo(responses))], true);
    }

    let mut matched = false;
    let directives = nodes
        .iter()
        .map(|node| match node {
            Node::Text { text } => Directive::Text { text: text.clone() },
            Node::Element(element) => {
                let (directive, element_matched) = parse_element(element);
                matched |= element_matched;
                directive
            }
        })
        .collect();
    (directives, matched)
}

fn parse_element(element: &Element) -> (Directive, bool) {
    match classify(element) {
        Shape::Choice(choice) => (Directive::Choice(choice), true),
        Shape::CodeDiff(element, file) => (Directive::CodeDiff(code_diff(element, file)), true),
        Shape::Formatted(element, format) => (
            Directive::FormattedBlock(formatted_block(element, format)),
            true,
        ),
        Shape::Generic(element) => {
            let (children, matched) = parse_level(&element.children);
            let directive = Directive::Element {
                tag: element.tag.clone(),
                attributes: element.attributes.clone(),
                children,
            };
            (directive, matched)
        }
    }
}

fn classify(element: &Element) -> Shape<'_> {
    if element.is("select") {
        if let Some(choice) = choice_prompt(element) {
            return Shape::Choice(choice);
        }
    }
    if let Some(file) = element.attribute("file") {
        return Shape::CodeDiff(element, file);
    }
    if let Some(format) = element.attribute("format") {
        return Shape::Formatted(element, format);
    }
    Shape::Generic(element)
}

/// A `select` needs an id and at least one item; anything else renders by default.
fn choice_prompt(element: &Element) -> Option<ChoicePrompt> {
    let id = element
        .attribute("id")
        .or_else(|| element.attribute("name"))
        .map(str::trim)
        .filter(|id| !id.is_empty())?;

    let items: Vec<ChoiceItem> = element
        .child_elements()
        .filter(|child| child.is("option") || child.is("item"))
        .map(|child| ChoiceItem {
            text: child.text_content().trim().to_string(),
            description: child
                .attribute("description")
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string),
        })
        .filter(|item| !item.text.is_empty())
        .collect();
    if items.is_empty() {
        return None;
    }

    let label = element
        .attribute("label")
        .map(ToString::to_string)
        .or_else(|| {
            element
                .child_elements()
                .find(|child| child.is("label"))
                .map(Element::text_content)
        })
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty());

    Some(ChoicePrompt {
        id: id.to_string(),
        label,
        items,
        interactive: false,
    })
}

fn response_echo(element: &Element) -> ResponseEcho {
    let items = element
        .child_elements()
        .filter_map(|child| {
            let id = child.attribute("id")?;
            Some(ResponseItem {
                id: id.to_string(),
                value: child.text_content().trim().to_string(),
            })
        })
        .collect();
    ResponseEcho { items }
}

fn code_diff(element: &Element, file: &str) -> CodeDiff {
    let section = |tag: &str| {
        element
            .find_descendant(tag)
            .map(|found| trim_block(&found.text_content()).to_string())
            .unwrap_or_default()
    };
    CodeDiff {
        file: file.trim().to_string(),
        original: section("original"),
        updated: section("updated"),
    }
}

fn formatted_block(element: &Element, format: &str) -> FormattedBlock {
    let format = BlockFormat::parse(format);
    let raw = match format {
        BlockFormat::Html => to_markup(&element.children),
        BlockFormat::Mermaid | BlockFormat::Unsupported(_) => flatten_text(&element.children),
    };
    FormattedBlock {
        format,
        raw: trim_block(&raw).to_string(),
    }
}

/// Strips surrounding blank lines but keeps leading indentation of the first line.
fn trim_block(text: &str) -> &str {
    let text = text.trim_end();
    let mut start = 0;
    for line in text.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        start += line.len();
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::trim_block;

    #[test]
    fn trim_block_keeps_indentation() {
        assert_eq!(trim_block("\n\n    fn a() {}\n  \n"), "    fn a() {}");
        assert_eq!(trim_block("x"), "x");
        assert_eq!(trim_block("\n \n"), "");
    }
}
