//! Integration tests for the repair pipeline against an in-memory IMAP session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use p7mfix::batch::{RepairOptions, Repairer, UidState};
use p7mfix::error::{RepairError, Result, Stage};
use p7mfix::imap::{FolderInfo, FolderName, ImapOps, Uid};
use p7mfix::model::candidate::{Envelope, StructureFetch};
use p7mfix::parser::{bodystructure, mime};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

const PLAIN: &str = r#"("text" "plain" ("charset" "utf-8") NIL NIL "7bit" 17 1)"#;
const WRAPPED: &str = r#"(("text" "plain" ("charset" "utf-8") NIL NIL "7bit" 41 1)("application" "octet-stream" ("name" "smime.p7m") NIL NIL "base64" 312) "mixed" ("boundary" "GW-BOUNDARY"))"#;
const PDF: &str = r#"(("text" "plain" NIL NIL NIL "7bit" 10 1)("application" "pdf" ("name" "a.pdf") NIL NIL "base64" 400) "mixed")"#;

/// A server call made by the pipeline.
#[derive(Debug, Clone, PartialEq)]
enum Call {
    FetchStructures(usize),
    FetchEnvelope(Uid),
    FetchMessage(Uid),
    Append {
        folder: String,
        internal_date: Option<DateTime<FixedOffset>>,
    },
    Copy(Uid, String),
    AddFlags(Uid, String),
    Expunge,
}

struct FakeMessage {
    structure: &'static str,
    raw: Vec<u8>,
    internal_date: Option<DateTime<FixedOffset>>,
}

/// Scripted session over a fixed set of messages.
#[derive(Default)]
struct FakeSession {
    messages: BTreeMap<Uid, FakeMessage>,
    calls: Vec<Call>,
    appended: Vec<Vec<u8>>,
    fail_append: bool,
    fail_envelope_for: Option<Uid>,
}

impl FakeSession {
    fn add(&mut self, uid: Uid, structure: &'static str, raw: Vec<u8>) {
        self.messages.insert(
            uid,
            FakeMessage {
                structure,
                raw,
                internal_date: DateTime::parse_from_rfc3339("2024-01-04T10:00:05+01:00").ok(),
            },
        );
    }

    fn uids(&self) -> Vec<Uid> {
        self.messages.keys().copied().collect()
    }
}

impl ImapOps for FakeSession {
    fn select_folder(&mut self, name: &str, _readonly: bool) -> Result<FolderInfo> {
        Ok(FolderInfo {
            name: name.to_string(),
            exists: self.messages.len() as u32,
            uid_validity: Some(1),
        })
    }

    fn list_folders(&mut self) -> Result<Vec<FolderName>> {
        Ok(vec![FolderName {
            name: "INBOX".to_string(),
            delimiter: Some("/".to_string()),
        }])
    }

    fn search(&mut self, _criteria: &str) -> Result<Vec<Uid>> {
        Ok(self.uids())
    }

    fn fetch_structures(&mut self, uids: &[Uid]) -> Result<BTreeMap<Uid, StructureFetch>> {
        self.calls.push(Call::FetchStructures(uids.len()));
        let mut out = BTreeMap::new();
        for uid in uids {
            if let Some(msg) = self.messages.get(uid) {
                out.insert(
                    *uid,
                    StructureFetch {
                        structure: bodystructure::parse(msg.structure)?,
                        internal_date: msg.internal_date,
                        seq: Some(*uid),
                    },
                );
            }
        }
        Ok(out)
    }

    fn fetch_envelope(&mut self, uid: Uid) -> Result<Envelope> {
        self.calls.push(Call::FetchEnvelope(uid));
        if self.fail_envelope_for == Some(uid) {
            return Err(RepairError::transport("uid_fetch", "connection reset"));
        }
        Ok(Envelope {
            seq: Some(uid + 100),
            subject: Some(format!("Message {uid}")),
            ..Default::default()
        })
    }

    fn fetch_message(&mut self, uid: Uid) -> Result<Vec<u8>> {
        self.calls.push(Call::FetchMessage(uid));
        self.messages
            .get(&uid)
            .map(|m| m.raw.clone())
            .ok_or_else(|| RepairError::transport("uid_fetch", "no such message"))
    }

    fn append(
        &mut self,
        folder: &str,
        message: &[u8],
        internal_date: Option<DateTime<FixedOffset>>,
    ) -> Result<()> {
        if self.fail_append {
            return Err(RepairError::transport("append", "over quota"));
        }
        self.calls.push(Call::Append {
            folder: folder.to_string(),
            internal_date,
        });
        self.appended.push(message.to_vec());
        Ok(())
    }

    fn copy(&mut self, uid: Uid, folder: &str) -> Result<()> {
        self.calls.push(Call::Copy(uid, folder.to_string()));
        Ok(())
    }

    fn add_flags(&mut self, uid: Uid, flag: &str) -> Result<()> {
        self.calls.push(Call::AddFlags(uid, flag.to_string()));
        Ok(())
    }

    fn expunge(&mut self) -> Result<usize> {
        self.calls.push(Call::Expunge);
        Ok(0)
    }
}

fn wrapped_raw() -> Vec<u8> {
    std::fs::read(fixture("wrapped_signed.eml")).unwrap()
}

fn three_message_session() -> FakeSession {
    let mut session = FakeSession::default();
    session.add(1, PLAIN, std::fs::read(fixture("plain.eml")).unwrap());
    session.add(2, WRAPPED, wrapped_raw());
    session.add(3, PDF, b"Subject: pdf\r\n\r\n".to_vec());
    session
}

fn upload_and_trash() -> RepairOptions {
    RepairOptions {
        upload_folder: Some("Repaired".to_string()),
        trash_folder: Some("Trash".to_string()),
        ..Default::default()
    }
}

// ─── Batching ───────────────────────────────────────────────────────

#[test]
fn test_120_uids_fetched_in_three_batches() {
    let mut session = FakeSession::default();
    for uid in 1..=120 {
        session.add(uid, PLAIN, Vec::new());
    }
    let uids = session.uids();

    let structures = Repairer::new(&mut session, RepairOptions::default())
        .fetch_structures(&uids)
        .unwrap();

    assert_eq!(structures.len(), 120);
    assert_eq!(
        session.calls,
        vec![
            Call::FetchStructures(50),
            Call::FetchStructures(50),
            Call::FetchStructures(20),
        ]
    );
}

// ─── Scan ───────────────────────────────────────────────────────────

#[test]
fn test_scan_finds_only_wrapped_message() {
    let mut session = three_message_session();
    let uids = session.uids();
    let mut repairer = Repairer::new(&mut session, RepairOptions::default());

    let structures = repairer.fetch_structures(&uids).unwrap();
    let candidates = repairer.find_candidates(&structures).unwrap();

    assert_eq!(candidates.keys().copied().collect::<Vec<_>>(), vec![2]);
    let record = &candidates[&2];
    assert_eq!(record.subject, "Message 2");
    // The envelope's sequence number wins over the structure fetch's.
    assert_eq!(record.seq, Some(102));
    assert!(record.internal_date.is_some());
    assert_eq!(repairer.state(1), UidState::Rejected);
    assert_eq!(repairer.state(2), UidState::Candidate);
    drop(repairer);

    let envelope_calls: Vec<_> = session
        .calls
        .iter()
        .filter(|c| matches!(c, Call::FetchEnvelope(_)))
        .collect();
    assert_eq!(envelope_calls, vec![&Call::FetchEnvelope(2)]);
}

#[test]
fn test_envelope_failure_aborts_with_uid() {
    let mut session = three_message_session();
    session.fail_envelope_for = Some(2);
    let uids = session.uids();

    let err = Repairer::new(&mut session, RepairOptions::default())
        .run(&uids)
        .unwrap_err();
    assert_eq!(err.location(), Some((2, Stage::FetchEnvelope)));
    assert!(err.to_string().contains("connection reset"));
}

// ─── Repair ─────────────────────────────────────────────────────────

#[test]
fn test_run_uploads_then_trashes_without_expunge() {
    let mut session = three_message_session();
    let uids = session.uids();

    let mut repairer = Repairer::new(&mut session, upload_and_trash());
    let summary = repairer.run(&uids).unwrap();
    assert_eq!(repairer.state(2), UidState::Trashed);
    drop(repairer);

    assert_eq!(summary.scanned, 3);
    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.repaired.len(), 1);
    let report = &summary.repaired[0];
    assert_eq!(report.uid, 2);
    assert_eq!(report.state, UidState::Trashed);
    assert_eq!(report.uploaded_to.as_deref(), Some("Repaired"));
    assert_eq!(report.trashed_to.as_deref(), Some("Trash"));

    let after_body: Vec<_> = session
        .calls
        .iter()
        .skip_while(|c| !matches!(c, Call::FetchMessage(_)))
        .cloned()
        .collect();
    assert_eq!(
        after_body,
        vec![
            Call::FetchMessage(2),
            Call::Append {
                folder: "Repaired".to_string(),
                internal_date: DateTime::parse_from_rfc3339("2024-01-04T10:00:05+01:00").ok(),
            },
            Call::Copy(2, "Trash".to_string()),
            Call::AddFlags(2, "\\Deleted".to_string()),
        ]
    );
    assert!(!session.calls.contains(&Call::Expunge));

    let uploaded = mime::parse_message(&session.appended[0]);
    assert_eq!(uploaded.content_type().mime_type, "application/pkcs7-mime");
    assert_eq!(uploaded.header("message-id"), Some("<wrapped-1@example.org>"));
}

#[test]
fn test_repair_consumes_candidate_records() {
    let mut session = three_message_session();
    let uids = session.uids();
    let mut repairer = Repairer::new(&mut session, RepairOptions::default());

    let structures = repairer.fetch_structures(&uids).unwrap();
    let mut candidates = repairer.find_candidates(&structures).unwrap();
    let reports = repairer.repair(&mut candidates, &[2]).unwrap();

    assert!(candidates.is_empty());
    assert_eq!(reports[0].state, UidState::Rewritten);
    assert!(reports[0].uploaded_to.is_none());
}

#[test]
fn test_upload_failure_stops_before_trash() {
    let mut session = three_message_session();
    session.fail_append = true;
    let uids = session.uids();

    let err = Repairer::new(&mut session, upload_and_trash())
        .run(&uids)
        .unwrap_err();

    assert_eq!(err.location(), Some((2, Stage::Upload)));
    assert!(matches!(err.root(), RepairError::Transport { op: "append", .. }));
    assert!(!session
        .calls
        .iter()
        .any(|c| matches!(c, Call::Copy(..) | Call::AddFlags(..))));
}

#[test]
fn test_rewrite_failure_is_tagged() {
    let mut session = FakeSession::default();
    // Structure says smime.p7m but the body is not a multipart message.
    session.add(5, WRAPPED, b"Subject: broken\r\n\r\nnot mime".to_vec());
    let uids = session.uids();

    let err = Repairer::new(&mut session, upload_and_trash())
        .run(&uids)
        .unwrap_err();
    assert_eq!(err.location(), Some((5, Stage::Rewrite)));
    assert!(matches!(err.root(), RepairError::Shape("not multipart")));
    assert!(session.appended.is_empty());
}

#[test]
fn test_save_dir_receives_rewritten_copy() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = three_message_session();
    let uids = session.uids();
    let options = RepairOptions {
        save_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };

    let summary = Repairer::new(&mut session, options).run(&uids).unwrap();
    let saved = summary.repaired[0].saved_to.clone().unwrap();
    assert!(saved.starts_with(dir.path()));
    assert!(saved
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains("_2_Message_2")));

    let message = mime::parse_message(&std::fs::read(&saved).unwrap());
    assert_eq!(message.content_type().mime_type, "application/pkcs7-mime");
}

#[test]
fn test_unknown_uid_is_rejected_before_any_fetch() {
    let mut session = three_message_session();
    let uids = session.uids();
    let mut repairer = Repairer::new(&mut session, upload_and_trash());
    let structures = repairer.fetch_structures(&uids).unwrap();
    let mut candidates = repairer.find_candidates(&structures).unwrap();

    let err = repairer.repair(&mut candidates, &[1, 2]).unwrap_err();
    assert!(matches!(err, RepairError::Config(_)));
    assert_eq!(candidates.len(), 1);
    drop(repairer);
    assert!(!session
        .calls
        .iter()
        .any(|c| matches!(c, Call::FetchMessage(_))));
}
