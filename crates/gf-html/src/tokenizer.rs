//! Byte-level HTML tokenizer.

use crate::is_raw_text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    /// `raw` text comes from script/style bodies and must not be entity-decoded.
    Text {
        text: String,
        raw: bool,
    },
}

pub(crate) fn tokenize(source: &str) -> Vec<Token> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut idx = 0_usize;

    while idx < bytes.len() {
        if bytes[idx] != b'<' {
            let end = find_byte(bytes, idx, b'<').unwrap_or(bytes.len());
            push_text(&mut tokens, &source[idx..end], false);
            idx = end;
            continue;
        }

        if starts_with(bytes, idx, b"<!--") {
            idx = find_subslice(bytes, idx + 4, b"-->")
                .map(|end| end + 3)
                .unwrap_or(bytes.len());
            continue;
        }

        if starts_with(bytes, idx, b"<!") || starts_with(bytes, idx, b"<?") {
            idx = find_byte(bytes, idx, b'>')
                .map(|end| end + 1)
                .unwrap_or(bytes.len());
            continue;
        }

        if starts_with(bytes, idx, b"</") {
            match read_end_tag(bytes, idx) {
                Some((name, next)) => {
                    tokens.push(Token::End { name });
                    idx = next;
                }
                None => {
                    push_text(&mut tokens, "<", false);
                    idx += 1;
                }
            }
            continue;
        }

        let Some((name, attrs, self_closing, next)) = read_start_tag(source, idx) else {
            push_text(&mut tokens, "<", false);
            idx += 1;
            continue;
        };

        idx = next;
        let raw_body = !self_closing && is_raw_text(&name);
        tokens.push(Token::Start {
            name: name.clone(),
            attrs,
            self_closing,
        });

        if raw_body {
            let (body_end, after_close) = find_raw_text_end(bytes, idx, &name);
            push_text(&mut tokens, &source[idx..body_end], true);
            tokens.push(Token::End { name });
            idx = after_close;
        }
    }

    tokens
}

fn push_text(tokens: &mut Vec<Token>, text: &str, raw: bool) {
    if text.is_empty() {
        return;
    }

    if let Some(Token::Text {
        text: previous,
        raw: previous_raw,
    }) = tokens.last_mut()
        && *previous_raw == raw
    {
        previous.push_str(text);
        return;
    }

    tokens.push(Token::Text {
        text: text.to_owned(),
        raw,
    });
}

type StartTag = (String, Vec<(String, String)>, bool, usize);

fn read_start_tag(source: &str, start: usize) -> Option<StartTag> {
    let bytes = source.as_bytes();
    let mut idx = start + 1;
    let name_start = idx;
    while idx < bytes.len() && is_name_char(bytes[idx]) {
        idx += 1;
    }
    if idx == name_start || !bytes[name_start].is_ascii_alphabetic() {
        return None;
    }

    let name = source[name_start..idx].to_ascii_lowercase();
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;

    loop {
        idx = skip_spaces(bytes, idx);
        match bytes.get(idx).copied() {
            None => return None,
            Some(b'>') => {
                idx += 1;
                break;
            }
            Some(b'/') => {
                self_closing = true;
                idx += 1;
                continue;
            }
            Some(_) => {}
        }
        self_closing = false;

        let attr_start = idx;
        while idx < bytes.len()
            && !bytes[idx].is_ascii_whitespace()
            && !matches!(bytes[idx], b'=' | b'>' | b'/')
        {
            idx += 1;
        }
        if idx == attr_start {
            idx += 1;
            continue;
        }
        let attr_name = source[attr_start..idx].to_ascii_lowercase();

        idx = skip_spaces(bytes, idx);
        let mut value = String::new();
        if bytes.get(idx).copied() == Some(b'=') {
            idx = skip_spaces(bytes, idx + 1);
            match bytes.get(idx).copied() {
                Some(quote @ (b'"' | b'\'')) => {
                    let value_start = idx + 1;
                    let value_end = find_byte(bytes, value_start, quote).unwrap_or(bytes.len());
                    value = source[value_start..value_end].to_owned();
                    idx = (value_end + 1).min(bytes.len());
                }
                Some(_) => {
                    let value_start = idx;
                    while idx < bytes.len() && !bytes[idx].is_ascii_whitespace() && bytes[idx] != b'>'
                    {
                        idx += 1;
                    }
                    value = source[value_start..idx].to_owned();
                }
                None => return None,
            }
        }

        if !attrs.iter().any(|(existing, _)| *existing == attr_name) {
            attrs.push((attr_name, value));
        }
    }

    Some((name, attrs, self_closing, idx))
}

fn read_end_tag(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let name_start = start + 2;
    let mut idx = name_start;
    while idx < bytes.len() && is_name_char(bytes[idx]) {
        idx += 1;
    }
    if idx == name_start {
        return None;
    }

    let name = String::from_utf8_lossy(&bytes[name_start..idx]).to_ascii_lowercase();
    let close = find_byte(bytes, idx, b'>')?;
    Some((name, close + 1))
}

/// Returns (end of raw body, index after the closing tag).
fn find_raw_text_end(bytes: &[u8], from: usize, tag: &str) -> (usize, usize) {
    let tag_bytes = tag.as_bytes();
    let mut idx = from;

    while let Some(open) = find_subslice(bytes, idx, b"</") {
        let name_start = open + 2;
        let name_end = name_start + tag_bytes.len();
        if name_end <= bytes.len()
            && bytes[name_start..name_end].eq_ignore_ascii_case(tag_bytes)
            && bytes
                .get(name_end)
                .is_none_or(|byte| byte.is_ascii_whitespace() || *byte == b'>')
        {
            let after = find_byte(bytes, name_end, b'>')
                .map(|close| close + 1)
                .unwrap_or(bytes.len());
            return (open, after);
        }
        idx = open + 2;
    }

    (bytes.len(), bytes.len())
}

fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}

fn skip_spaces(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx += 1;
    }
    idx
}

fn starts_with(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    bytes
        .get(idx..idx.saturating_add(pattern.len()))
        .is_some_and(|window| window == pattern)
}

fn find_byte(bytes: &[u8], from: usize, byte: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|candidate| *candidate == byte)
        .map(|offset| from + offset)
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

#[cfg(test)]
mod tests {
    use super::Token;
    use super::tokenize;

    #[test]
    fn reads_quoted_unquoted_and_bare_attributes() {
        let tokens = tokenize("<a href=\"/x\" data-id=7 hidden target='_blank'>");
        let Some(Token::Start { name, attrs, .. }) = tokens.first() else {
            panic!("expected start tag, got {tokens:?}");
        };
        assert_eq!(name, "a");
        assert_eq!(
            attrs,
            &vec![
                ("href".to_owned(), "/x".to_owned()),
                ("data-id".to_owned(), "7".to_owned()),
                ("hidden".to_owned(), String::new()),
                ("target".to_owned(), "_blank".to_owned()),
            ]
        );
    }

    #[test]
    fn script_bodies_are_raw_until_matching_close() {
        let tokens = tokenize("<script>if (a < b) { x = '</div>'; }</script><p>");
        assert_eq!(
            tokens[1],
            Token::Text {
                text: "if (a < b) { x = '</div>'; }".to_owned(),
                raw: true,
            }
        );
        assert_eq!(tokens[2], Token::End { name: "script".to_owned() });
    }

    #[test]
    fn self_closing_marker_is_detected() {
        let tokens = tokenize("<img src=a.png />");
        assert!(matches!(tokens.first(), Some(Token::Start { self_closing: true, .. })));
    }

    #[test]
    fn stray_angle_bracket_becomes_text() {
        let tokens = tokenize("1 < 2");
        assert_eq!(
            tokens,
            vec![Token::Text {
                text: "1 < 2".to_owned(),
                raw: false,
            }]
        );
    }
}
