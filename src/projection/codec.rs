//! Payload codec for the projection document.
//!
//! The song list is serialised to JSON, then characters that could end the
//! surrounding embedding early are escaped: line terminators (including
//! U+2028/U+2029, which script parsers treat as line breaks) and any
//! `</script` sequence. The escaped text is finally percent-encoded with the
//! same unreserved set as `encodeURIComponent`, so it fits into a one-line
//! template substitution. Every escape is also a valid JSON string escape,
//! which makes decoding a plain percent-decode followed by a JSON parse.

use crate::error::CodecError;
use crate::models::ProjectionSong;

/// Bytes left untouched by percent-encoding besides ASCII alphanumerics.
const UNRESERVED: &[u8] = b"-_.!~*'()";
const HEX: &[u8; 16] = b"0123456789ABCDEF";
const SCRIPT_CLOSE: &str = "</script";

/// Encode songs for embedding in the projection document.
pub fn encode(songs: &[ProjectionSong]) -> Result<String, CodecError> {
    let json = serde_json::to_string(songs)?;
    Ok(percent_encode(&escape_for_script(&json)))
}

/// Exact inverse of [`encode`].
pub fn decode(payload: &str) -> Result<Vec<ProjectionSong>, CodecError> {
    let json = percent_decode(payload)?;
    Ok(serde_json::from_str(&json)?)
}

/// Neutralise everything that would terminate an inline script region or a
/// single-line literal.
pub fn escape_for_script(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    let mut rest = json;
    while let Some(ch) = rest.chars().next() {
        match ch {
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            '<' if starts_with_ignore_ascii_case(rest, SCRIPT_CLOSE) => {
                // `<\/` is still `</` once parsed as JSON.
                escaped.push_str("<\\/");
                rest = &rest[2..];
                continue;
            }
            other => escaped.push(other),
        }
        rest = &rest[ch.len_utf8()..];
    }
    escaped
}

fn starts_with_ignore_ascii_case(haystack: &str, prefix: &str) -> bool {
    haystack
        .as_bytes()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
}

/// Percent-encode UTF-8 bytes outside the URI-component unreserved set.
pub fn percent_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for &byte in input.as_bytes() {
        if byte.is_ascii_alphanumeric() || UNRESERVED.contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push('%');
            encoded.push(HEX[(byte >> 4) as usize] as char);
            encoded.push(HEX[(byte & 0x0f) as usize] as char);
        }
    }
    encoded
}

pub fn percent_decode(input: &str) -> Result<String, CodecError> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' {
            let high = bytes.get(idx + 1).and_then(|b| hex_value(*b));
            let low = bytes.get(idx + 2).and_then(|b| hex_value(*b));
            match (high, low) {
                (Some(high), Some(low)) => decoded.push(high << 4 | low),
                _ => return Err(CodecError::MalformedEscape(idx)),
            }
            idx += 3;
        } else {
            decoded.push(bytes[idx]);
            idx += 1;
        }
    }
    Ok(String::from_utf8(decoded)?)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
