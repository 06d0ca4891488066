use std::collections::BTreeMap;

use crate::node::{Element, Node};

/// Longest entity body (between `&` and `;`) the decoder will look at.
const MAX_ENTITY_LEN: usize = 10;

struct OpenElement {
    raw: String,
    element: Element,
}

enum Tag {
    Open {
        name: String,
        attributes: BTreeMap<String, String>,
        self_closing: bool,
    },
    Close {
        name: String,
    },
}

/// Tokenizes message text into plain runs and tagged spans.
///
/// Properly closed (or self-closing) tags become elements. A tag still open at
/// end of input is closed there if it holds element children, so a truncated
/// `<select>` keeps its options. Any other unclosed tag is kept as literal
/// text with its children hoisted into the parent, so code such as
/// `Vec<String>` survives intact. Stray closing tags and malformed `<`
/// sequences are literal text too.
#[must_use]
pub fn tokenize(input: &str) -> Vec<Node> {
    let mut root = Vec::new();
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        let Some(offset) = rest.find('<') else {
            push_text(children_mut(&mut root, &mut stack), &decode_entities(rest));
            break;
        };
        if offset > 0 {
            push_text(
                children_mut(&mut root, &mut stack),
                &decode_entities(&rest[..offset]),
            );
        }

        let tag_start = pos + offset;
        match scan_tag(&input[tag_start..]) {
            Some((
                Tag::Open {
                    name,
                    attributes,
                    self_closing,
                },
                len,
            )) => {
                let element = Element {
                    tag: name,
                    attributes,
                    children: Vec::new(),
                };
                if self_closing {
                    push_node(children_mut(&mut root, &mut stack), Node::Element(element));
                } else {
                    stack.push(OpenElement {
                        raw: input[tag_start..tag_start + len].to_string(),
                        element,
                    });
                }
                pos = tag_start + len;
            }
            Some((Tag::Close { name }, len)) => {
                match stack.iter().rposition(|open| open.element.tag == name) {
                    Some(depth) => {
                        while stack.len() > depth + 1 {
                            if let Some(unclosed) = stack.pop() {
                                revert(unclosed, children_mut(&mut root, &mut stack));
                            }
                        }
                        if let Some(open) = stack.pop() {
                            push_node(
                                children_mut(&mut root, &mut stack),
                                Node::Element(open.element),
                            );
                        }
                    }
                    None => push_text(
                        children_mut(&mut root, &mut stack),
                        &input[tag_start..tag_start + len],
                    ),
                }
                pos = tag_start + len;
            }
            None => {
                push_text(children_mut(&mut root, &mut stack), "<");
                pos = tag_start + 1;
            }
        }
    }

    while let Some(unclosed) = stack.pop() {
        let target = children_mut(&mut root, &mut stack);
        if unclosed
            .element
            .children
            .iter()
            .any(|child| child.as_element().is_some())
        {
            push_node(target, Node::Element(unclosed.element));
        } else {
            revert(unclosed, target);
        }
    }

    root
}

fn children_mut<'a>(root: &'a mut Vec<Node>, stack: &'a mut [OpenElement]) -> &'a mut Vec<Node> {
    match stack.last_mut() {
        Some(open) => &mut open.element.children,
        None => root,
    }
}

fn revert(open: OpenElement, target: &mut Vec<Node>) {
    push_text(target, &open.raw);
    for child in open.element.children {
        push_node(target, child);
    }
}

fn push_node(target: &mut Vec<Node>, node: Node) {
    match node {
        Node::Text { text } => push_text(target, &text),
        element => target.push(element),
    }
}

fn push_text(target: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text { text: last }) = target.last_mut() {
        last.push_str(text);
        return;
    }
    target.push(Node::text(text));
}

fn scan_tag(input: &str) -> Option<(Tag, usize)> {
    let bytes = input.as_bytes();
    let mut i = 1;
    let closing = bytes.get(i) == Some(&b'/');
    if closing {
        i += 1;
    }

    let name_start = i;
    if !bytes.get(i).is_some_and(u8::is_ascii_alphabetic) {
        return None;
    }
    while bytes.get(i).is_some_and(|b| is_name_byte(*b)) {
        i += 1;
    }
    let name = input[name_start..i].to_ascii_lowercase();

    if closing {
        i = skip_whitespace(bytes, i);
        return (bytes.get(i) == Some(&b'>')).then_some((Tag::Close { name }, i + 1));
    }

    let mut attributes = BTreeMap::new();
    loop {
        let separator_start = i;
        i = skip_whitespace(bytes, i);
        match bytes.get(i)? {
            b'>' => {
                let tag = Tag::Open {
                    name,
                    attributes,
                    self_closing: false,
                };
                return Some((tag, i + 1));
            }
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                let tag = Tag::Open {
                    name,
                    attributes,
                    self_closing: true,
                };
                return Some((tag, i + 2));
            }
            _ if i == separator_start => return None,
            _ => {}
        }

        let attr_start = i;
        while bytes.get(i).is_some_and(|b| is_attribute_byte(*b)) {
            i += 1;
        }
        if i == attr_start {
            return None;
        }
        let attr_name = input[attr_start..i].to_ascii_lowercase();

        let after_name = skip_whitespace(bytes, i);
        let value = if bytes.get(after_name) == Some(&b'=') {
            i = skip_whitespace(bytes, after_name + 1);
            let (value, next) = scan_attribute_value(input, i)?;
            i = next;
            value
        } else {
            String::new()
        };
        attributes.insert(attr_name, value);
    }
}

fn scan_attribute_value(input: &str, start: usize) -> Option<(String, usize)> {
    let bytes = input.as_bytes();
    match *bytes.get(start)? {
        quote @ (b'"' | b'\'') => {
            let body_start = start + 1;
            let end = body_start + input[body_start..].find(char::from(quote))?;
            Some((decode_entities(&input[body_start..end]), end + 1))
        }
        _ => {
            let mut i = start;
            while let Some(&b) = bytes.get(i) {
                let ends_tag = b == b'/' && bytes.get(i + 1) == Some(&b'>');
                if b.is_ascii_whitespace() || b == b'>' || ends_tag {
                    break;
                }
                i += 1;
            }
            (i > start).then(|| (decode_entities(&input[start..i]), i))
        }
    }
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn is_attribute_byte(b: u8) -> bool {
    is_name_byte(b) || b == b':' || b == b'.'
}

/// Decodes the named entities markup authors commonly use plus numeric references.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .char_indices()
            .skip(1)
            .take(MAX_ENTITY_LEN + 1)
            .find(|(_, c)| *c == ';')
            .and_then(|(semi, _)| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(body: &str) -> Option<char> {
    match body {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = body.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_entities, tokenize};
    use crate::node::{Element, Node};

    #[test]
    fn plain_text_is_a_single_run() {
        assert_eq!(tokenize("hello world"), vec![Node::text("hello world")]);
    }

    #[test]
    fn nested_elements_and_attributes() {
        let nodes = tokenize("a<edit file='src/lib.rs'><original>x</original></edit>b");
        assert_eq!(
            nodes,
            vec![
                Node::text("a"),
                Node::Element(
                    Element::new(
                        "edit",
                        vec![Node::element("original", vec![Node::text("x")])]
                    )
                    .with_attribute("file", "src/lib.rs")
                ),
                Node::text("b"),
            ]
        );
    }

    #[test]
    fn unclosed_generic_stays_literal() {
        assert_eq!(
            tokenize("let v: Vec<String> = x < y;"),
            vec![Node::text("let v: Vec<String> = x < y;")]
        );
    }

    #[test]
    fn unclosed_tag_inside_closed_parent_is_hoisted() {
        let nodes = tokenize("<updated>fn f() -> Option<u8> {}</updated>");
        assert_eq!(
            nodes,
            vec![Node::element(
                "updated",
                vec![Node::text("fn f() -> Option<u8> {}")]
            )]
        );
    }

    #[test]
    fn unclosed_text_only_tag_at_end_stays_literal() {
        assert_eq!(tokenize("<updated>abc"), vec![Node::text("<updated>abc")]);
    }

    #[test]
    fn unclosed_tag_with_elements_is_closed_at_end() {
        let nodes = tokenize("x<list><item>a</item>tail");
        assert_eq!(
            nodes,
            vec![
                Node::text("x"),
                Node::element(
                    "list",
                    vec![
                        Node::element("item", vec![Node::text("a")]),
                        Node::text("tail"),
                    ]
                ),
            ]
        );
    }

    #[test]
    fn stray_close_tag_is_text() {
        assert_eq!(tokenize("a</b>c"), vec![Node::text("a</b>c")]);
    }

    #[test]
    fn self_closing_and_flag_attributes() {
        let nodes = tokenize("<br/><input disabled value=ok/>");
        assert_eq!(
            nodes,
            vec![
                Node::element("br", Vec::new()),
                Node::Element(
                    Element::new("input", Vec::new())
                        .with_attribute("disabled", "")
                        .with_attribute("value", "ok")
                ),
            ]
        );
    }

    #[test]
    fn tag_names_are_case_insensitive() {
        let nodes = tokenize("<Select id=q></SELECT>");
        assert_eq!(
            nodes,
            vec![Node::Element(
                Element::new("select", Vec::new()).with_attribute("id", "q")
            )]
        );
    }

    #[test]
    fn entities_decode_known_forms_only() {
        assert_eq!(
            decode_entities("&lt;a&gt; &amp; &#65;&#x42; &bogus; & tail"),
            "<a> & AB &bogus; & tail"
        );
    }
}
