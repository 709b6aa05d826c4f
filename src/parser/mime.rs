//! MIME message parsing into [`MimeMessage`] and display summaries.
//!
//! The parser only splits header sections and multipart bodies on
//! boundaries. Content decoding for display goes through `mail-parser`.

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;

use crate::model::address::EmailAddress;
use crate::model::mime::{ContentType, MimeBody, MimeMessage};
use crate::parser::header::{self, decode_encoded_words};

/// Maximum multipart nesting that is split into children; deeper bodies stay raw.
const MAX_DEPTH: usize = 16;

/// Characters of body text kept in a [`MessageSummary`].
const PREVIEW_CHARS: usize = 400;

/// Parse raw RFC 5322 bytes. Never fails: malformed input degrades to
/// fewer headers or a raw body.
pub fn parse_message(data: &[u8]) -> MimeMessage {
    parse_at_depth(data, 0)
}

fn parse_at_depth(data: &[u8], depth: usize) -> MimeMessage {
    let (headers, body_start) = header::split_header_section(data);
    let body = data[body_start..].to_vec();

    let content_type = headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-type"))
        .map(|h| ContentType::parse(&h.value))
        .unwrap_or_default();

    let boundary = content_type
        .param("boundary")
        .filter(|b| !b.is_empty() && content_type.is_multipart() && depth < MAX_DEPTH);

    let body = match boundary {
        Some(boundary) => {
            let parts = split_multipart(&body, boundary)
                .into_iter()
                .map(|part| parse_at_depth(part, depth + 1))
                .collect();
            MimeBody::Multipart { raw: body, parts }
        }
        None => MimeBody::Raw(body),
    };

    MimeMessage::new(headers, body)
}

/// Split a multipart body into the raw bytes of each part.
///
/// The line break before each delimiter belongs to the delimiter. A missing
/// close delimiter lets the last part run to the end of the body.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut current_start: Option<usize> = None;
    let mut offset = 0usize;

    for line in body.split_inclusive(|&b| b == b'\n') {
        let line_start = offset;
        offset += line.len();

        let content = trim_trailing_ws(line);
        let Some(rest) = content.strip_prefix(delimiter.as_bytes()) else {
            continue;
        };
        let closing = rest == b"--";
        if !rest.is_empty() && !closing {
            continue;
        }

        if let Some(start) = current_start.take() {
            parts.push(&body[start..part_end(body, start, line_start)]);
        }
        if closing {
            return parts;
        }
        current_start = Some(offset);
    }

    if let Some(start) = current_start {
        parts.push(&body[start..]);
    }
    parts
}

fn part_end(body: &[u8], start: usize, delimiter_start: usize) -> usize {
    let before = &body[start..delimiter_start];
    let trimmed = before
        .strip_suffix(b"\r\n")
        .or_else(|| before.strip_suffix(b"\n"))
        .unwrap_or(before);
    start + trimmed.len()
}

fn trim_trailing_ws(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| !matches!(b, b'\r' | b'\n' | b' ' | b'\t'))
        .map_or(0, |i| i + 1);
    &line[..end]
}

/// Human-oriented view of a message for CLI output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MessageSummary {
    pub subject: String,
    pub from: Vec<EmailAddress>,
    pub date: Option<DateTime<Utc>>,
    pub content_type: String,
    pub part_count: usize,
    pub size: usize,
    /// Start of the first text body, when one can be decoded.
    pub text_preview: Option<String>,
}

/// Summarize a message: decoded subject/from/date plus a text preview.
pub fn summarize(message: &MimeMessage) -> MessageSummary {
    let bytes = message.to_bytes();

    let text_preview = MessageParser::default()
        .parse(bytes.as_slice())
        .and_then(|parsed| parsed.body_text(0).map(|t| t.into_owned()))
        .map(|text| text.chars().take(PREVIEW_CHARS).collect::<String>());

    MessageSummary {
        subject: message
            .header("subject")
            .map(|s| decode_encoded_words(&crate::model::mime::unfold(s)))
            .unwrap_or_default(),
        from: message
            .header("from")
            .map(|f| EmailAddress::parse_list(&crate::model::mime::unfold(f)))
            .unwrap_or_default(),
        date: message.header("date").and_then(header::parse_date),
        content_type: message.content_type().mime_type,
        part_count: message.parts().len(),
        size: bytes.len(),
        text_preview,
    }
}
