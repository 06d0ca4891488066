use directive_parser::{
    contains_choice, parse, parse_message, BlockFormat, ChoiceItem, ChoicePrompt, CodeDiff,
    Directive, Element, FormattedBlock, Node, ResponseEcho, ResponseItem,
};
use pretty_assertions::assert_eq;

fn text(value: &str) -> Directive {
    Directive::Text {
        text: value.to_string(),
    }
}

#[test]
fn responses_outrank_select() {
    let directives = parse_message(concat!(
        "<select id=\"color\"><option>Red</option></select>",
        "<responses><response id=\"color\">Red</response></responses>",
    ));

    assert_eq!(
        directives,
        vec![Directive::ResponseEcho(ResponseEcho {
            items: vec![ResponseItem {
                id: "color".to_string(),
                value: "Red".to_string(),
            }],
        })]
    );
}

#[test]
fn select_becomes_non_interactive_choice() {
    let directives = parse_message(concat!(
        "Pick one:\n",
        "<select id=\"plan\" label=\"Which plan?\">",
        "<option description=\"fast\">Quick fix</option>",
        "<option>Full rewrite</option>",
        "</select>",
    ));

    assert_eq!(
        directives,
        vec![
            text("Pick one:\n"),
            Directive::Choice(ChoicePrompt {
                id: "plan".to_string(),
                label: Some("Which plan?".to_string()),
                items: vec![
                    ChoiceItem {
                        text: "Quick fix".to_string(),
                        description: Some("fast".to_string()),
                    },
                    ChoiceItem {
                        text: "Full rewrite".to_string(),
                        description: None,
                    },
                ],
                interactive: false,
            }),
        ]
    );
    assert!(contains_choice(&directives));
}

#[test]
fn truncated_select_at_end_of_message_still_becomes_choice() {
    let directives = parse_message("Pick one:\n<select id=\"q\"><option>A</option><option>B</option>");

    assert_eq!(
        directives,
        vec![
            text("Pick one:\n"),
            Directive::Choice(ChoicePrompt {
                id: "q".to_string(),
                label: None,
                items: vec![
                    ChoiceItem {
                        text: "A".to_string(),
                        description: None,
                    },
                    ChoiceItem {
                        text: "B".to_string(),
                        description: None,
                    },
                ],
                interactive: false,
            }),
        ]
    );
    assert!(contains_choice(&directives));
}

#[test]
fn unclosed_generic_in_prose_stays_text() {
    assert_eq!(
        parse_message("returns Vec<String> here"),
        vec![text("returns Vec<String> here")]
    );
}

#[test]
fn select_without_items_renders_by_default() {
    let nodes = vec![Node::Element(
        Element::new("select", vec![Node::text("nothing")]).with_attribute("id", "q"),
    )];
    let directives = parse(&nodes);
    assert_eq!(directives, nodes.iter().map(Directive::from_node).collect::<Vec<_>>());
    assert!(!contains_choice(&directives));
}

#[test]
fn file_attribute_yields_code_diff_with_flattened_sections() {
    let directives = parse_message(concat!(
        "<edit file=\"src/lib.rs\">\n",
        "<original>\nfn a() -> Vec<u8> {\n    vec![]\n}\n</original>\n",
        "<updated>\nfn a() -> Vec<u8> {\n    <b>vec![1]</b>\n}\n</updated>\n",
        "</edit>",
    ));

    assert_eq!(
        directives,
        vec![Directive::CodeDiff(CodeDiff {
            file: "src/lib.rs".to_string(),
            original: "fn a() -> Vec<u8> {\n    vec![]\n}".to_string(),
            updated: "fn a() -> Vec<u8> {\n    vec![1]\n}".to_string(),
        })]
    );
}

#[test]
fn code_diff_missing_section_is_empty() {
    let directives = parse_message("<edit file=new.txt><updated>hello</updated></edit>");
    assert_eq!(
        directives,
        vec![Directive::CodeDiff(CodeDiff {
            file: "new.txt".to_string(),
            original: String::new(),
            updated: "hello".to_string(),
        })]
    );
}

#[test]
fn formatted_blocks_select_by_format_attribute() {
    let html = parse_message("<block format=\"HTML\"><p class=\"x\">1 &lt; 2</p></block>");
    assert_eq!(
        html,
        vec![Directive::FormattedBlock(FormattedBlock {
            format: BlockFormat::Html,
            raw: "<p class=\"x\">1 &lt; 2</p>".to_string(),
        })]
    );

    let mermaid = parse_message("<block format=mermaid>\ngraph TD\n  A-->B\n</block>");
    assert_eq!(
        mermaid,
        vec![Directive::FormattedBlock(FormattedBlock {
            format: BlockFormat::Mermaid,
            raw: "graph TD\n  A-->B".to_string(),
        })]
    );
}

#[test]
fn unsupported_format_keeps_raw_text_for_warning() {
    let directives = parse_message("<block format=\"latex\">\\frac{a}{b}</block>");
    let Directive::FormattedBlock(block) = &directives[0] else {
        panic!("expected formatted block, got {directives:?}");
    };
    assert_eq!(block.format, BlockFormat::Unsupported("latex".to_string()));
    let warning = block.warning().expect("unsupported formats carry a warning");
    assert!(warning.contains("latex"));
    assert!(warning.contains("\\frac{a}{b}"));
}

#[test]
fn unknown_markup_is_returned_unchanged() {
    let nodes = vec![
        Node::text("see "),
        Node::element("em", vec![Node::text("this")]),
    ];
    assert_eq!(
        parse(&nodes),
        vec![
            text("see "),
            Directive::Element {
                tag: "em".to_string(),
                attributes: Default::default(),
                children: vec![text("this")],
            },
        ]
    );
}

#[test]
fn nested_shapes_are_found_recursively() {
    let directives =
        parse_message("<div><p>intro</p><select id=q><item>yes</item></select></div>");
    let Directive::Element { tag, children, .. } = &directives[0] else {
        panic!("expected wrapper element");
    };
    assert_eq!(tag, "div");
    assert!(matches!(children[1], Directive::Choice(_)));
    assert!(contains_choice(&directives));
}

#[test]
fn directives_serialize_with_kind_tags() {
    let directives = parse_message("<edit file=a><original>x</original></edit>");
    let value = serde_json::to_value(&directives).expect("serialize directives");
    assert_eq!(value[0]["kind"], "code_diff");
    assert_eq!(value[0]["file"], "a");
}
