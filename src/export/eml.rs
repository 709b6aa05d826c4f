//! Write rewritten messages as individual `.eml` files.

use std::path::{Path, PathBuf};

use crate::error::{RepairError, Result};
use crate::imap::Uid;
use crate::model::candidate::CandidateRecord;
use crate::model::mime::MimeMessage;

/// Save a rewritten message into `dir`, creating it if needed.
///
/// Returns the path of the created file.
pub fn save_rewritten(
    dir: &Path,
    uid: Uid,
    candidate: &CandidateRecord,
    message: &MimeMessage,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| RepairError::io(dir, e))?;
    let path = dir.join(eml_filename(uid, candidate));
    std::fs::write(&path, message.to_bytes()).map_err(|e| RepairError::io(&path, e))?;
    tracing::debug!(uid, path = %path.display(), "Saved rewritten message");
    Ok(path)
}

/// Format: `{date}_{uid}_{subject}.eml`, at most 200 characters.
///
/// The date is the sent date, falling back to the internal date.
fn eml_filename(uid: Uid, candidate: &CandidateRecord) -> String {
    let date = candidate
        .date_sent
        .map(|d| d.format("%Y%m%d_%H%M%S").to_string())
        .or_else(|| {
            candidate
                .internal_date
                .map(|d| d.format("%Y%m%d_%H%M%S").to_string())
        })
        .unwrap_or_else(|| "nodate".to_string());
    let subject = sanitize_filename_part(&candidate.subject, 80);

    let name = format!("{date}_{uid}_{subject}");
    let stem: String = name.chars().take(196).collect();
    format!("{stem}.eml")
}

/// Sanitize a string for use in filenames.
///
/// Replaces invalid characters with `_` and truncates to `max_len`.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}
