//! HTML tokenization, fragment parsing into the DOM arena, and serialization.

mod serialize;
mod tokenizer;

use gf_core::EmbedResult;
use gf_dom::Document;
use gf_dom::NodeId;
use tokenizer::Token;

pub use serialize::outer_html;
pub use serialize::serialize_children;

/// Parses markup into a new detached fragment, the way template content is built.
///
/// Elements created here are parser-inserted, so any `<script>` they contain stays
/// inert until something re-creates it. Document-level wrappers (`html`, `head`,
/// `body`) are dropped and their contents kept, matching content assignment.
pub fn parse_fragment(doc: &mut Document, source: &str) -> EmbedResult<NodeId> {
    let fragment = doc.create_fragment();
    build_into(doc, fragment, tokenizer::tokenize(source), true)?;
    Ok(fragment)
}

/// Parses a full host page, keeping its document structure.
pub fn parse_document(source: &str) -> EmbedResult<Document> {
    let mut doc = Document::new();
    let root = doc.root();
    build_into(&mut doc, root, tokenizer::tokenize(source), false)?;
    Ok(doc)
}

fn build_into(
    doc: &mut Document,
    container: NodeId,
    tokens: Vec<Token>,
    flatten_document_wrappers: bool,
) -> EmbedResult<()> {
    let mut open: Vec<(String, NodeId)> = Vec::new();

    for token in tokens {
        let parent = open.last().map(|(_, id)| *id).unwrap_or(container);
        match token {
            Token::Text { text, raw } => {
                let value = if raw { text } else { decode_entities(&text) };
                let node = doc.create_text(&value);
                doc.append_child(parent, node)?;
            }
            Token::Start {
                name,
                attrs,
                self_closing,
            } => {
                if flatten_document_wrappers && is_document_wrapper(&name) {
                    continue;
                }

                let attrs = attrs
                    .into_iter()
                    .map(|(key, value)| (key, decode_entities(&value)))
                    .collect();
                let node = doc.create_parsed_element(&name, attrs);
                doc.append_child(parent, node)?;
                if !self_closing && !is_void(&name) {
                    open.push((name, node));
                }
            }
            Token::End { name } => {
                if let Some(depth) = open.iter().rposition(|(tag, _)| *tag == name) {
                    open.truncate(depth);
                }
            }
        }
    }

    Ok(())
}

pub(crate) fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

pub(crate) fn is_raw_text(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

fn is_document_wrapper(tag: &str) -> bool {
    matches!(tag, "html" | "head" | "body")
}

/// Decodes the named and numeric character references HTML fragments commonly carry.
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|semi| *semi <= 10)
            .and_then(|semi| decode_entity(&after[..semi]).map(|ch| (ch, semi)));

        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}
