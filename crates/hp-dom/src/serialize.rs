//! HTML serialization of an arena document.
//!
//! Output is written so that parsing it again yields the same element
//! structure: raw text cannot close its element early, attribute values and
//! comment bodies cannot end their construct.

use crate::Document;
use crate::NodeId;
use crate::NodeKind;
use crate::content::TextModel;
use crate::content::children_are_foreign;
use crate::content::is_void;
use crate::content::text_model;

pub(crate) fn to_html(doc: &Document) -> String {
    let mut out = String::new();
    for child in doc.children(doc.root()) {
        write_node(doc, *child, false, false, &mut out);
    }
    out
}

/// `foreign` is whether `id` sits in SVG/MathML content; `raw` is whether
/// text is copied verbatim because an ancestor holds raw text.
fn write_node(doc: &Document, id: NodeId, foreign: bool, raw: bool, out: &mut String) {
    let Some(node) = doc.node(id) else {
        return;
    };

    match &node.kind {
        NodeKind::Document => {
            for child in &node.children {
                write_node(doc, *child, false, false, out);
            }
        }
        NodeKind::Doctype(name) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(name);
            out.push('>');
        }
        NodeKind::Comment(text) => write_comment(text, out),
        NodeKind::Text(text) if raw => out.push_str(text),
        NodeKind::Text(text) => escape_into(text, false, out),
        NodeKind::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, value) in &element.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_into(value, true, out);
                out.push('"');
            }

            if foreign && node.children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            if !foreign && is_void(&element.tag) {
                return;
            }

            let children_foreign = children_are_foreign(foreign, element);
            let holds_raw_text = !foreign
                && matches!(
                    text_model(&element.tag),
                    TextModel::RawText | TextModel::PlainText
                );
            if holds_raw_text {
                let mut body = String::new();
                for child in &node.children {
                    write_node(doc, *child, children_foreign, true, &mut body);
                }
                push_raw_text(&body, &element.tag, out);
            } else {
                for child in &node.children {
                    write_node(doc, *child, children_foreign, raw, out);
                }
            }

            out.push_str("</");
            out.push_str(&element.tag);
            out.push('>');
        }
    }
}

/// Copies raw text, breaking every `</tag` so only the end tag written after
/// it can close the element.
fn push_raw_text(body: &str, tag: &str, out: &mut String) {
    let mut rest = body;
    while let Some(at) = rest.find("</") {
        let after = &rest[at + 2..];
        let closes = after
            .get(..tag.len())
            .is_some_and(|name| name.eq_ignore_ascii_case(tag));
        out.push_str(&rest[..at]);
        out.push_str(if closes { "<\\/" } else { "</" });
        rest = after;
    }
    out.push_str(rest);
}

fn write_comment(text: &str, out: &mut String) {
    out.push_str("<!--");
    if text.starts_with('>') || text.starts_with("->") {
        out.push(' ');
    }
    out.push_str(&text.replace("--!>", "--! >").replace("-->", "-- >"));
    out.push_str("-->");
}

fn escape_into(input: &str, attribute: bool, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}
