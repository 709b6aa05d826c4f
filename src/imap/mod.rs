//! The IMAP operations the repair pipeline needs, behind one trait.
//!
//! [`ImapSession`] is the live implementation; tests drive the pipeline
//! with an in-memory one.

pub mod convert;
pub mod session;

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};

use crate::error::Result;
use crate::model::candidate::{Envelope, StructureFetch};

pub use session::ImapSession;

/// Per-folder message identifier, stable while UIDVALIDITY is unchanged.
pub type Uid = u32;

/// Flag that marks a message for removal on the next expunge.
pub const DELETED: &str = "\\Deleted";

/// The selected folder as reported by SELECT / EXAMINE.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FolderInfo {
    pub name: String,
    /// Number of messages in the folder.
    pub exists: u32,
    pub uid_validity: Option<u32>,
}

/// One entry of a LIST response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FolderName {
    pub name: String,
    pub delimiter: Option<String>,
}

/// Blocking IMAP commands against one authenticated session.
///
/// Every method is one round trip. UIDs refer to the folder selected by the
/// last [`select_folder`](ImapOps::select_folder) call.
pub trait ImapOps {
    /// SELECT (or EXAMINE when `readonly`) a folder.
    fn select_folder(&mut self, name: &str, readonly: bool) -> Result<FolderInfo>;

    fn list_folders(&mut self) -> Result<Vec<FolderName>>;

    /// UID SEARCH; results are sorted ascending.
    fn search(&mut self, criteria: &str) -> Result<Vec<Uid>>;

    /// Fetch BODYSTRUCTURE and INTERNALDATE for a set of UIDs.
    fn fetch_structures(&mut self, uids: &[Uid]) -> Result<BTreeMap<Uid, StructureFetch>>;

    fn fetch_envelope(&mut self, uid: Uid) -> Result<Envelope>;

    /// The full RFC 822 message.
    fn fetch_message(&mut self, uid: Uid) -> Result<Vec<u8>>;

    /// APPEND a message, keeping `internal_date` when given.
    fn append(
        &mut self,
        folder: &str,
        message: &[u8],
        internal_date: Option<DateTime<FixedOffset>>,
    ) -> Result<()>;

    /// UID COPY to another folder.
    fn copy(&mut self, uid: Uid, folder: &str) -> Result<()>;

    /// UID STORE `+FLAGS`.
    fn add_flags(&mut self, uid: Uid, flag: &str) -> Result<()>;

    /// EXPUNGE the selected folder; returns how many messages were removed.
    fn expunge(&mut self) -> Result<usize>;
}

/// Render UIDs as an IMAP sequence set (`1,2,5`).
pub fn uid_set(uids: &[Uid]) -> String {
    uids.iter()
        .map(|uid| uid.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
