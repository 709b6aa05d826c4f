//! Scan a batch of fetched structures for candidates and attach their envelopes.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::matcher;
use crate::error::{Result, Stage};
use crate::imap::Uid;
use crate::model::candidate::{CandidateRecord, CandidateSet, Envelope, StructureFetch};

/// Apply [`matcher::matches`] to every structure and build the candidate set.
///
/// `fetch_envelope` is called once per matching UID; its first failure aborts
/// the scan, tagged with that UID. The progress callback receives
/// `(processed, total)`.
pub fn scan(
    structures: &BTreeMap<Uid, StructureFetch>,
    fetch_envelope: &mut dyn FnMut(Uid) -> Result<Envelope>,
    progress: Option<&dyn Fn(usize, usize)>,
) -> Result<CandidateSet> {
    let total = structures.len();
    let mut candidates = CandidateSet::new();

    for (i, (&uid, fetched)) in structures.iter().enumerate() {
        if let Some(cb) = progress {
            cb(i, total);
        }

        if !matcher::matches(&fetched.structure) {
            debug!(uid, mime_type = %fetched.structure.mime_type(), "Rejected");
            continue;
        }

        let envelope = fetch_envelope(uid).map_err(|e| e.at(uid, Stage::FetchEnvelope))?;
        let mut record = CandidateRecord::from_structure(uid, fetched);
        record.merge_envelope(envelope);
        debug!(uid, subject = %record.subject, "Candidate");
        candidates.insert(uid, record);
    }

    if let Some(cb) = progress {
        cb(total, total);
    }
    info!(scanned = total, candidates = candidates.len(), "Scan complete");

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepairError;
    use crate::parser::bodystructure;

    fn fetch(structure: &str) -> StructureFetch {
        StructureFetch {
            structure: bodystructure::parse(structure).unwrap(),
            internal_date: None,
            seq: None,
        }
    }

    const PLAIN: &str = r#"("text" "plain" NIL NIL NIL "7bit" 10 1)"#;
    const P7M: &str = r#"(("text" "plain" NIL NIL NIL "7bit" 10 1)("application" "octet-stream" ("name" "smime.p7m") NIL NIL "base64" 400) "mixed")"#;
    const OTHER: &str = r#"(("text" "plain" NIL NIL NIL "7bit" 10 1)("application" "pdf" ("name" "a.pdf") NIL NIL "base64" 400) "mixed")"#;

    #[test]
    fn test_only_matching_uid_becomes_candidate() {
        let structures = BTreeMap::from([(1, fetch(PLAIN)), (2, fetch(P7M)), (3, fetch(OTHER))]);
        let mut asked = Vec::new();
        let mut fetch_envelope = |uid: Uid| -> Result<Envelope> {
            asked.push(uid);
            Ok(Envelope {
                subject: Some(format!("subject {uid}")),
                ..Default::default()
            })
        };

        let candidates = scan(&structures, &mut fetch_envelope, None).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[&2].subject, "subject 2");
        assert_eq!(asked, vec![2]);
    }

    #[test]
    fn test_envelope_failure_aborts_scan() {
        let structures = BTreeMap::from([(4, fetch(P7M)), (5, fetch(P7M))]);
        let mut fetch_envelope =
            |_uid: Uid| -> Result<Envelope> { Err(RepairError::transport("uid_fetch", "gone")) };

        let err = scan(&structures, &mut fetch_envelope, None).unwrap_err();
        assert_eq!(err.location(), Some((4, Stage::FetchEnvelope)));
    }

    #[test]
    fn test_progress_reports_completion() {
        use std::cell::Cell;
        let structures = BTreeMap::from([(1, fetch(PLAIN)), (2, fetch(PLAIN))]);
        let last = Cell::new((0, 0));
        let progress = |done: usize, total: usize| last.set((done, total));
        let mut fetch_envelope = |_uid: Uid| -> Result<Envelope> { Ok(Envelope::default()) };

        scan(&structures, &mut fetch_envelope, Some(&progress)).unwrap();
        assert_eq!(last.get(), (2, 2));
    }
}
