//! Response body text decoding.

use encoding_rs::Encoding;
use encoding_rs::UTF_8;
use tracing::debug;

const META_SCAN_BYTES: usize = 1024;

/// Decodes `body` as text. A byte-order mark wins, then the `Content-Type`
/// charset, then a `<meta charset>` near the top of the markup, then UTF-8.
pub fn decode_text(body: &[u8], content_type: Option<&str>) -> String {
    let label = content_type
        .and_then(charset_from_content_type)
        .or_else(|| charset_from_markup(body));
    let encoding = label
        .as_deref()
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        debug!(encoding = used.name(), "body contained malformed sequences");
    }
    text.into_owned()
}

pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|parameter| {
        let (name, value) = parameter.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches(['"', '\'']);
        (!label.is_empty()).then(|| label.to_owned())
    })
}

/// Looks for `charset=` in the first kilobyte, covering both `<meta charset>`
/// and the `http-equiv` content form.
pub fn charset_from_markup(body: &[u8]) -> Option<String> {
    let prefix = &body[..body.len().min(META_SCAN_BYTES)];
    let text = String::from_utf8_lossy(prefix).to_ascii_lowercase();
    let mut from = 0_usize;

    while let Some(found) = text[from..].find("charset=") {
        let start = from + found + "charset=".len();
        let label: String = text[start..]
            .trim_start_matches(['"', '\'', ' '])
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ':' | '.'))
            .collect();
        if !label.is_empty() {
            return Some(label);
        }
        from = start;
    }

    None
}
