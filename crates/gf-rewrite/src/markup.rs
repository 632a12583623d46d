//! Pre-insertion rewriting of raw fragment markup.
//!
//! Runs before the markup is parsed so subresources never resolve against the
//! host page. Values are compared with `&amp;` decoded, but the emitted text
//! keeps the original encoding.

use crate::AttributeKind;
use crate::ORIGINAL_HREF_ATTRIBUTE;
use crate::Rewriter;
use gf_core::EmbedError;
use gf_core::EmbedResult;
use regex::Captures;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

struct Patterns {
    tag: Regex,
    attribute: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            tag: Regex::new(r#"(<[A-Za-z][A-Za-z0-9:-]*)((?:"[^"]*"|'[^']*'|[^'">])*)(>)"#)?,
            attribute: Regex::new(
                r#"(\s+)([^\s"'>/=]+)(?:(\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#,
            )?,
        })
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::compile);

/// Rewrites every `href`, `src`, and `srcset` value in start tags of `html`.
///
/// A rewritten anchor `href` also leaves its authored value in
/// [`ORIGINAL_HREF_ATTRIBUTE`].
pub fn rewrite_markup(html: &str, rewriter: &Rewriter) -> EmbedResult<String> {
    let patterns = PATTERNS.as_ref().map_err(|error| {
        EmbedError::new(
            "rewrite.markup.pattern",
            format!("markup patterns failed to compile: {error}"),
        )
    })?;

    let mut rewritten = 0_usize;
    let output = patterns.tag.replace_all(html, |tag: &Captures<'_>| {
        let open = capture(tag, 1);
        let body = capture(tag, 2);
        let anchor = open.get(1..).is_some_and(|name| name.eq_ignore_ascii_case("a"));
        let attributes = patterns.attribute.replace_all(body, |attribute: &Captures<'_>| {
            let replacement = rewrite_attribute(attribute, rewriter, anchor);
            if replacement.is_some() {
                rewritten += 1;
            }
            replacement.unwrap_or_else(|| capture(attribute, 0).to_owned())
        });
        format!("{open}{attributes}>")
    });

    debug!(rewritten, "markup pre-insertion pass complete");
    Ok(output.into_owned())
}

fn rewrite_attribute(attribute: &Captures<'_>, rewriter: &Rewriter, anchor: bool) -> Option<String> {
    let kind = AttributeKind::from_attribute(capture(attribute, 2))?;
    let (quote, raw) = if let Some(value) = attribute.get(4) {
        ("\"", value.as_str())
    } else if let Some(value) = attribute.get(5) {
        ("'", value.as_str())
    } else {
        ("", attribute.get(6)?.as_str())
    };

    let decoded = raw.replace("&amp;", "&");
    if !rewriter.needs_rewrite(&decoded, kind) {
        return None;
    }

    let lead = capture(attribute, 1);
    let original = if anchor && kind == AttributeKind::Href {
        let quote = if quote.is_empty() { "\"" } else { quote };
        format!("{lead}{ORIGINAL_HREF_ATTRIBUTE}={quote}{raw}{quote}")
    } else {
        String::new()
    };

    Some(format!(
        "{lead}{name}{equals}{quote}{value}{quote}{original}",
        name = capture(attribute, 2),
        equals = capture(attribute, 3),
        value = rewriter.rewrite(raw, kind),
    ))
}

fn capture<'h>(captures: &Captures<'h>, index: usize) -> &'h str {
    captures.get(index).map_or("", |found| found.as_str())
}
