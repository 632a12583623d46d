//! Markup serialization for arena nodes.

use crate::is_raw_text;
use crate::is_void;
use gf_dom::Document;
use gf_dom::NodeId;
use gf_dom::NodeKind;

pub fn serialize_children(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    let raw = doc.tag_name(node).is_some_and(is_raw_text);
    for child in doc.children(node) {
        write_node(doc, *child, raw, &mut out);
    }
    out
}

pub fn outer_html(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, node, false, &mut out);
    out
}

fn write_node(doc: &Document, node: NodeId, raw_parent: bool, out: &mut String) {
    match doc.kind(node) {
        Some(NodeKind::Text(text)) => {
            if raw_parent {
                out.push_str(text);
            } else {
                escape_into(text, false, out);
            }
        }
        Some(NodeKind::Element(element)) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, value) in &element.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_into(value, true, out);
                out.push('"');
            }
            out.push('>');

            if is_void(&element.tag) {
                return;
            }

            let raw = is_raw_text(&element.tag);
            for child in doc.children(node) {
                write_node(doc, *child, raw, out);
            }
            out.push_str("</");
            out.push_str(&element.tag);
            out.push('>');
        }
        Some(NodeKind::Document | NodeKind::Fragment | NodeKind::ShadowRoot { .. }) => {
            for child in doc.children(node) {
                write_node(doc, *child, false, out);
            }
        }
        None => {}
    }
}

fn escape_into(input: &str, attribute: bool, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}
