//! Strict percent-decoding used only to compare URLs, never to emit them.

use std::borrow::Cow;

/// Position of the first `%` sequence that could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    pub offset: usize,
}

/// Decodes `%XX` escapes; fails on truncated/non-hex escapes or invalid UTF-8.
pub fn percent_decode(input: &str) -> Result<Cow<'_, str>, DecodeError> {
    if !input.contains('%') {
        return Ok(Cow::Borrowed(input));
    }

    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0_usize;

    while idx < bytes.len() {
        if bytes[idx] != b'%' {
            out.push(bytes[idx]);
            idx += 1;
            continue;
        }

        let high = bytes.get(idx + 1).copied().and_then(hex_value);
        let low = bytes.get(idx + 2).copied().and_then(hex_value);
        match (high, low) {
            (Some(high), Some(low)) => {
                out.push((high << 4) | low);
                idx += 3;
            }
            _ => return Err(DecodeError { offset: idx }),
        }
    }

    String::from_utf8(out)
        .map(Cow::Owned)
        .map_err(|error| DecodeError {
            offset: error.utf8_error().valid_up_to(),
        })
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
