use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, info};

use super::cursor::{UidBatches, DEFAULT_BATCH_SIZE};
use crate::error::{RepairError, Result, Stage};
use crate::export::eml::save_rewritten;
use crate::imap::{ImapOps, Uid, DELETED};
use crate::model::candidate::{CandidateRecord, CandidateSet, StructureFetch};
use crate::parser::mime::parse_message;
use crate::rewrite::{rewrite_with, RewriteOptions};
use crate::scan;

/// What to do with each repaired message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOptions {
    /// UIDs per structure fetch.
    pub batch_size: usize,
    /// Folder the rewritten message is appended to.
    pub upload_folder: Option<String>,
    /// Folder the original is copied to before being flagged `\Deleted`.
    pub trash_folder: Option<String>,
    /// Local directory for `.eml` copies of rewritten messages.
    pub save_dir: Option<PathBuf>,
    pub rewrite: RewriteOptions,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            upload_folder: None,
            trash_folder: None,
            save_dir: None,
            rewrite: RewriteOptions::default(),
        }
    }
}

/// Where a UID is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UidState {
    Pending,
    StructureFetched,
    Candidate,
    Rejected,
    BodyFetched,
    Rewritten,
    Uploaded,
    Trashed,
}

/// Pipeline phase reported to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Structures,
    Scan,
    Repair,
}

/// Outcome of repairing one message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RepairReport {
    pub uid: Uid,
    pub state: UidState,
    /// Size of the rewritten message.
    pub bytes: usize,
    pub uploaded_to: Option<String>,
    pub saved_to: Option<PathBuf>,
    pub trashed_to: Option<String>,
}

/// Totals of a full [`Repairer::run`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RunSummary {
    pub scanned: usize,
    pub candidates: usize,
    pub repaired: Vec<RepairReport>,
}

/// Drives structure fetch, scan and repair over one selected folder.
///
/// Work is strictly sequential. The first failure aborts with the UID and
/// stage attached; side effects already applied on the server are kept.
pub struct Repairer<'a, S: ImapOps + ?Sized> {
    session: &'a mut S,
    options: RepairOptions,
    states: BTreeMap<Uid, UidState>,
    progress: Option<&'a dyn Fn(Phase, usize, usize)>,
}

impl<'a, S: ImapOps + ?Sized> Repairer<'a, S> {
    pub fn new(session: &'a mut S, options: RepairOptions) -> Self {
        Self {
            session,
            options,
            states: BTreeMap::new(),
            progress: None,
        }
    }

    /// Report `(phase, done, total)` while working.
    pub fn with_progress(mut self, progress: &'a dyn Fn(Phase, usize, usize)) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Current state of a UID; `Pending` if it was never seen.
    pub fn state(&self, uid: Uid) -> UidState {
        self.states.get(&uid).copied().unwrap_or(UidState::Pending)
    }

    /// Fetch BODYSTRUCTURE and INTERNALDATE in batches of `batch_size`.
    pub fn fetch_structures(&mut self, uids: &[Uid]) -> Result<BTreeMap<Uid, StructureFetch>> {
        let batches = UidBatches::new(uids, self.options.batch_size);
        let batch_count = batches.len();
        let mut structures = BTreeMap::new();
        let mut done = 0;

        for (i, batch) in batches.enumerate() {
            let first = batch[0];
            let fetched = self
                .session
                .fetch_structures(batch)
                .map_err(|e| e.at(first, Stage::FetchStructure))?;
            for uid in fetched.keys() {
                self.states.insert(*uid, UidState::StructureFetched);
            }
            structures.extend(fetched);

            done += batch.len();
            self.report(Phase::Structures, done, uids.len());
            debug!(batch = i + 1, of = batch_count, size = batch.len(), "Fetched structures");
        }

        info!(requested = uids.len(), fetched = structures.len(), "Structures fetched");
        Ok(structures)
    }

    /// Match every structure and fetch envelopes for the matches.
    pub fn find_candidates(
        &mut self,
        structures: &BTreeMap<Uid, StructureFetch>,
    ) -> Result<CandidateSet> {
        let session = &mut *self.session;
        let progress = self.progress;
        let report = move |done: usize, total: usize| {
            if let Some(cb) = progress {
                cb(Phase::Scan, done, total);
            }
        };

        let candidates = scan::scan(
            structures,
            &mut |uid| session.fetch_envelope(uid),
            Some(&report),
        )?;

        for uid in structures.keys() {
            let state = if candidates.contains_key(uid) {
                UidState::Candidate
            } else {
                UidState::Rejected
            };
            self.states.insert(*uid, state);
        }
        Ok(candidates)
    }

    /// Repair the chosen candidates one at a time.
    ///
    /// Each UID's record is taken out of `candidates` before it is
    /// processed. Every UID must be a candidate; this is checked before
    /// anything is fetched.
    pub fn repair(
        &mut self,
        candidates: &mut CandidateSet,
        uids: &[Uid],
    ) -> Result<Vec<RepairReport>> {
        let unknown: Vec<String> = uids
            .iter()
            .filter(|uid| !candidates.contains_key(uid))
            .map(|uid| uid.to_string())
            .collect();
        if !unknown.is_empty() {
            return Err(RepairError::Config(format!(
                "not candidates: {}",
                unknown.join(", ")
            )));
        }

        let mut reports = Vec::with_capacity(uids.len());
        for (i, uid) in uids.iter().enumerate() {
            let Some(record) = candidates.remove(uid) else {
                continue;
            };
            reports.push(self.repair_one(&record)?);
            self.report(Phase::Repair, i + 1, uids.len());
        }

        info!(repaired = reports.len(), "Repair complete");
        Ok(reports)
    }

    /// Fetch structures, scan, and repair every candidate.
    pub fn run(&mut self, uids: &[Uid]) -> Result<RunSummary> {
        let structures = self.fetch_structures(uids)?;
        let mut candidates = self.find_candidates(&structures)?;
        let scanned = structures.len();
        drop(structures);
        let chosen: Vec<Uid> = candidates.keys().copied().collect();
        let repaired = self.repair(&mut candidates, &chosen)?;

        Ok(RunSummary {
            scanned,
            candidates: chosen.len(),
            repaired,
        })
    }

    fn repair_one(&mut self, record: &CandidateRecord) -> Result<RepairReport> {
        let uid = record.uid;

        let raw = self
            .session
            .fetch_message(uid)
            .map_err(|e| e.at(uid, Stage::FetchBody))?;
        self.states.insert(uid, UidState::BodyFetched);

        let original = parse_message(&raw);
        drop(raw);
        let rewritten =
            rewrite_with(&original, &self.options.rewrite).map_err(|e| e.at(uid, Stage::Rewrite))?;
        drop(original);
        let bytes = rewritten.to_bytes();
        self.states.insert(uid, UidState::Rewritten);
        debug!(uid, bytes = bytes.len(), "Rewritten");

        let mut report = RepairReport {
            uid,
            state: UidState::Rewritten,
            bytes: bytes.len(),
            uploaded_to: None,
            saved_to: None,
            trashed_to: None,
        };

        if let Some(folder) = &self.options.upload_folder {
            self.session
                .append(folder, &bytes, record.internal_date)
                .map_err(|e| e.at(uid, Stage::Upload))?;
            self.states.insert(uid, UidState::Uploaded);
            report.state = UidState::Uploaded;
            report.uploaded_to = Some(folder.clone());
            debug!(uid, folder = %folder, "Uploaded");
        }

        if let Some(dir) = &self.options.save_dir {
            let path =
                save_rewritten(dir, uid, record, &rewritten).map_err(|e| e.at(uid, Stage::Save))?;
            report.saved_to = Some(path);
        }

        if let Some(trash) = &self.options.trash_folder {
            self.session
                .copy(uid, trash)
                .map_err(|e| e.at(uid, Stage::Trash))?;
            self.session
                .add_flags(uid, DELETED)
                .map_err(|e| e.at(uid, Stage::Trash))?;
            self.states.insert(uid, UidState::Trashed);
            report.state = UidState::Trashed;
            report.trashed_to = Some(trash.clone());
            debug!(uid, folder = %trash, "Original trashed");
        }

        info!(uid, state = ?report.state, "Repaired");
        Ok(report)
    }

    fn report(&self, phase: Phase, done: usize, total: usize) {
        if let Some(cb) = self.progress {
            cb(phase, done, total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imap::{FolderInfo, FolderName};
    use crate::model::candidate::Envelope;
    use crate::parser::bodystructure;
    use chrono::{DateTime, FixedOffset};

    const PLAIN: &str = r#"("text" "plain" NIL NIL NIL "7bit" 10 1)"#;

    /// Counts structure fetches; every UID is a plain text message.
    #[derive(Default)]
    struct CountingSession {
        batches: Vec<usize>,
    }

    impl ImapOps for CountingSession {
        fn select_folder(&mut self, name: &str, _readonly: bool) -> Result<FolderInfo> {
            Ok(FolderInfo {
                name: name.to_string(),
                exists: 0,
                uid_validity: None,
            })
        }
        fn list_folders(&mut self) -> Result<Vec<FolderName>> {
            Ok(Vec::new())
        }
        fn search(&mut self, _criteria: &str) -> Result<Vec<Uid>> {
            Ok(Vec::new())
        }
        fn fetch_structures(&mut self, uids: &[Uid]) -> Result<BTreeMap<Uid, StructureFetch>> {
            self.batches.push(uids.len());
            Ok(uids
                .iter()
                .map(|&uid| {
                    let fetch = StructureFetch {
                        structure: bodystructure::parse(PLAIN).unwrap(),
                        internal_date: None,
                        seq: Some(uid),
                    };
                    (uid, fetch)
                })
                .collect())
        }
        fn fetch_envelope(&mut self, _uid: Uid) -> Result<Envelope> {
            Ok(Envelope::default())
        }
        fn fetch_message(&mut self, _uid: Uid) -> Result<Vec<u8>> {
            Err(RepairError::transport("uid_fetch", "unused"))
        }
        fn append(
            &mut self,
            _folder: &str,
            _message: &[u8],
            _internal_date: Option<DateTime<FixedOffset>>,
        ) -> Result<()> {
            Ok(())
        }
        fn copy(&mut self, _uid: Uid, _folder: &str) -> Result<()> {
            Ok(())
        }
        fn add_flags(&mut self, _uid: Uid, _flag: &str) -> Result<()> {
            Ok(())
        }
        fn expunge(&mut self) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_fetch_structures_in_batches() {
        let mut session = CountingSession::default();
        let uids: Vec<Uid> = (1..=120).collect();
        let mut repairer = Repairer::new(&mut session, RepairOptions::default());

        let structures = repairer.fetch_structures(&uids).unwrap();
        assert_eq!(structures.len(), 120);
        assert_eq!(repairer.state(120), UidState::StructureFetched);
        assert_eq!(repairer.state(121), UidState::Pending);
        drop(repairer);
        assert_eq!(session.batches, vec![50, 50, 20]);
    }

    #[test]
    fn test_plain_messages_are_rejected() {
        let mut session = CountingSession::default();
        let mut repairer = Repairer::new(&mut session, RepairOptions::default());
        let structures = repairer.fetch_structures(&[1, 2]).unwrap();
        let candidates = repairer.find_candidates(&structures).unwrap();
        assert!(candidates.is_empty());
        assert_eq!(repairer.state(1), UidState::Rejected);
    }

    #[test]
    fn test_repair_rejects_unknown_uids_before_fetching() {
        let mut session = CountingSession::default();
        let mut repairer = Repairer::new(&mut session, RepairOptions::default());
        let mut candidates = CandidateSet::new();
        let err = repairer.repair(&mut candidates, &[9]).unwrap_err();
        assert!(matches!(err, RepairError::Config(_)));
    }

    #[test]
    fn test_progress_reports_structure_batches() {
        use std::cell::RefCell;
        let seen = RefCell::new(Vec::new());
        let progress = |phase: Phase, done: usize, total: usize| {
            if phase == Phase::Structures {
                seen.borrow_mut().push((done, total));
            }
        };
        let mut session = CountingSession::default();
        let uids: Vec<Uid> = (1..=5).collect();
        let options = RepairOptions {
            batch_size: 2,
            ..Default::default()
        };
        Repairer::new(&mut session, options)
            .with_progress(&progress)
            .fetch_structures(&uids)
            .unwrap();
        assert_eq!(*seen.borrow(), vec![(2, 5), (4, 5), (5, 5)]);
    }
}
