//! Local `.eml` files (RFC 5322 messages without MBOX framing).

use std::path::Path;

use crate::error::{RepairError, Result};
use crate::model::mime::MimeMessage;
use crate::parser::mime;

/// Read and parse a single `.eml` file.
///
/// A leading MBOX `From ` separator line, if present, is skipped.
pub fn load_eml(path: impl AsRef<Path>) -> Result<MimeMessage> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| RepairError::io(path, e))?;
    Ok(mime::parse_message(skip_from_line(&data)))
}

/// Strip the `From ` separator line some tools prepend to exported messages.
fn skip_from_line(raw: &[u8]) -> &[u8] {
    if raw.starts_with(b"From ") {
        if let Some(pos) = raw.iter().position(|&b| b == b'\n') {
            return &raw[pos + 1..];
        }
    }
    raw
}
