//! RFC 5322 header sections: field splitting, encoded-words (RFC 2047), and dates.

use base64::Engine;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::model::mime::Header;

/// Split a raw message into its header fields and the offset where the body starts.
///
/// Parsing stops at the first empty line (which is consumed) or at the first
/// line that is neither a field nor a continuation, in which case that line
/// becomes the first body line. Folded values keep their line breaks,
/// normalized to CRLF, in both the decoded value and the raw field bytes.
pub fn split_header_section(data: &[u8]) -> (Vec<Header>, usize) {
    let stripped = strip_bom(data);
    let mut headers: Vec<Header> = Vec::new();
    let mut offset = data.len() - stripped.len();

    for raw_line in stripped.split_inclusive(|&b| b == b'\n') {
        let line = trim_line_ending(raw_line);

        if line.is_empty() {
            offset += raw_line.len();
            return (headers, offset);
        }

        if line[0] == b' ' || line[0] == b'\t' {
            if let Some(last) = headers.last_mut() {
                last.value.push_str("\r\n");
                last.value.push_str(&decode_header_bytes(line));
                if let Some(raw) = last.raw.as_mut() {
                    raw.extend_from_slice(b"\r\n");
                    raw.extend_from_slice(line);
                }
                offset += raw_line.len();
                continue;
            }
        } else if let Some(colon) = field_name_end(line) {
            let name = decode_header_bytes(&line[..colon]).trim_end().to_string();
            let value = decode_header_bytes(&line[colon + 1..])
                .trim_start()
                .to_string();
            headers.push(Header {
                name,
                value,
                raw: Some(line.to_vec()),
            });
            offset += raw_line.len();
            continue;
        }

        // Not a header line: the body starts here.
        return (headers, offset);
    }

    (headers, data.len())
}

/// Position of the colon ending a valid field name, if `line` starts with one.
fn field_name_end(line: &[u8]) -> Option<usize> {
    let colon = line.iter().position(|&b| b == b':')?;
    let name = &line[..colon];
    let name = match name.iter().rposition(|&b| b != b' ' && b != b'\t') {
        Some(end) => &name[..=end],
        None => return None,
    };
    name.iter()
        .all(|&b| (33..=126).contains(&b) && b != b':')
        .then_some(colon)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two adjacent encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            result.push_str(&decoded.text);
            remaining = &remaining[start + 2 + decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

struct DecodedWord {
    text: String,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let total_consumed = first_q + 1 + second_q + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => crate::rewrite::BASE64_LENIENT.decode(encoded_text).ok()?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some(DecodedWord {
        text: decode_charset(charset, &bytes),
        consumed: total_consumed,
    })
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("zz");
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    // RFC 2231 language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);
    match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(charset, "Unknown charset, falling back to UTF-8 lossy");
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

/// Extract the first `<…>` token (for Message-ID), or the trimmed input.
pub fn extract_angle_bracket(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(start) = trimmed.find('<') {
        if let Some(end) = trimmed[start..].find('>') {
            return trimmed[start..start + end + 1].to_string();
        }
    }
    trimmed.to_string()
}

/// Parse a `Date:` value: RFC 2822 first, then whatever `mail-parser` accepts.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    use mail_parser::MessageParser;

    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_header_section_crlf() {
        let data = b"Subject: Hi\r\nX-Foo: 1\r\n\r\nhello";
        let (headers, body) = split_header_section(data);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].name, "Subject");
        assert_eq!(headers[0].value, "Hi");
        assert_eq!(&data[body..], b"hello");
    }

    #[test]
    fn test_split_header_section_folded() {
        let data = b"Subject: This is a long\n\tsubject line\nFrom: a@b.com\n\nBody\n";
        let (headers, body) = split_header_section(data);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].value, "This is a long\r\n\tsubject line");
        assert_eq!(
            headers[0].raw.as_deref(),
            Some(&b"Subject: This is a long\r\n\tsubject line"[..])
        );
        assert_eq!(&data[body..], b"Body\n");
    }

    #[test]
    fn test_split_header_section_without_headers() {
        let data = b"just a body line\r\nmore\r\n";
        let (headers, body) = split_header_section(data);
        assert!(headers.is_empty());
        assert_eq!(body, 0);
    }

    #[test]
    fn test_split_header_section_leading_blank_line() {
        let data = b"\r\nhello";
        let (headers, body) = split_header_section(data);
        assert!(headers.is_empty());
        assert_eq!(&data[body..], b"hello");
    }

    #[test]
    fn test_split_header_section_headers_only() {
        let data = b"Subject: no body\r\n";
        let (headers, body) = split_header_section(data);
        assert_eq!(headers.len(), 1);
        assert_eq!(body, data.len());
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_plain_passthrough() {
        assert_eq!(decode_encoded_words("Normal subject"), "Normal subject");
    }

    #[test]
    fn test_parse_date_rfc2822() {
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 +0000").is_some());
    }

    #[test]
    fn test_parse_date_obsolete_zone() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 EST").expect("named zone");
        assert_eq!(dt.to_rfc3339(), "2024-01-04T15:00:00+00:00");
    }

    #[test]
    fn test_parse_date_garbage() {
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("  ").is_none());
    }

    #[test]
    fn test_split_header_section_keeps_raw_bytes() {
        let data = b"Subject:caf\xE9\r\nX-Spaced :  v\r\n\r\n";
        let (headers, _) = split_header_section(data);
        assert_eq!(headers[0].value, "caf\u{e9}");
        assert_eq!(headers[0].raw.as_deref(), Some(&b"Subject:caf\xE9"[..]));
        assert_eq!(headers[1].name, "X-Spaced");
        assert_eq!(headers[1].raw.as_deref(), Some(&b"X-Spaced :  v"[..]));
    }

    #[test]
    fn test_extract_angle_bracket() {
        assert_eq!(extract_angle_bracket(" <a@b> trailing"), "<a@b>");
        assert_eq!(extract_angle_bracket("bare-id"), "bare-id");
    }
}
