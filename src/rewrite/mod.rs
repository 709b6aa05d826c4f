//! Unwrap the `smime.p7m` attachment into a standalone message.
//!
//! The attachment holds a complete MIME entity (headers and body). The
//! rewritten message is that entity's body under the original message's
//! headers, copied byte for byte, with the entity's own `Content-Type` (and
//! any other preserved header) put back on top.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use tracing::debug;

use crate::error::{RepairError, Result};
use crate::model::mime::MimeMessage;
use crate::parser::mime::parse_message;
use crate::scan::matcher::P7M_NAME;

/// Standard alphabet, padding optional on decode.
pub const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Which headers of the embedded message survive the rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Header names taken from the decoded message, overriding the
    /// original's value. Defaults to `Content-Type`.
    pub preserve_headers: Vec<String>,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            preserve_headers: vec!["Content-Type".to_string()],
        }
    }
}

/// Rewrite with default options (only `Content-Type` preserved).
pub fn rewrite(original: &MimeMessage) -> Result<MimeMessage> {
    rewrite_with(original, &RewriteOptions::default())
}

/// Rewrite `original`, which must have the mis-wrapped `smime.p7m` shape.
///
/// Errors with [`RepairError::Shape`] when the shape is wrong and
/// [`RepairError::Decode`] when the attachment is not valid base64.
pub fn rewrite_with(original: &MimeMessage, options: &RewriteOptions) -> Result<MimeMessage> {
    let payload = p7m_payload(original)?;
    let decoded = decode_payload(payload)?;
    let mut message = parse_message(&decoded);

    let preserved: Vec<(String, String)> = options
        .preserve_headers
        .iter()
        .filter_map(|name| {
            message
                .header(name)
                .map(|value| (name.clone(), value.to_string()))
        })
        .collect();

    debug!(
        dropped = message.headers().len(),
        copied = original.headers().len(),
        preserved = preserved.len(),
        body_bytes = message.raw_body().len(),
        "Rebuilding headers"
    );

    message.clear_headers();
    for header in original.headers() {
        message.push_header(header.clone());
    }
    for (name, value) in preserved {
        message.set_header(&name, value);
    }

    Ok(message)
}

/// Locate the encoded attachment text, checking the shape on the way.
fn p7m_payload(original: &MimeMessage) -> Result<&[u8]> {
    if !original.is_multipart() {
        return Err(RepairError::Shape("not multipart"));
    }
    let part = original
        .parts()
        .get(1)
        .ok_or(RepairError::Shape("missing attachment part"))?;

    let content_type = part.content_type();
    if content_type.mime_type != "application/octet-stream" {
        return Err(RepairError::Shape("unexpected attachment type"));
    }
    let name_ok = content_type
        .param("name")
        .is_some_and(|name| name.eq_ignore_ascii_case(P7M_NAME));
    if !name_ok {
        return Err(RepairError::Shape("unexpected attachment name"));
    }

    Ok(part.raw_body())
}

/// Base64-decode attachment text, ignoring line breaks and other whitespace.
fn decode_payload(payload: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = payload
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    Ok(BASE64_LENIENT.decode(compact)?)
}
