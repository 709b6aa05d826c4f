//! Per-UID fetch results and the candidate records built from them.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};

use super::address::EmailAddress;
use super::bodystructure::BodyStructureNode;
use crate::imap::Uid;

/// Result of fetching `BODYSTRUCTURE` and `INTERNALDATE` for one UID.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureFetch {
    pub structure: BodyStructureNode,
    pub internal_date: Option<DateTime<FixedOffset>>,
    /// Message sequence number reported alongside the fetch.
    pub seq: Option<u32>,
}

/// Envelope summary for one UID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    /// Message sequence number reported alongside the fetch.
    pub seq: Option<u32>,
    /// `Date:` as sent.
    pub date_raw: Option<String>,
    /// `Date:` parsed, when it could be.
    pub date: Option<DateTime<Utc>>,
    /// Decoded subject.
    pub subject: Option<String>,
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub message_id: Option<String>,
}

/// A message whose structure matched the mis-wrapped `smime.p7m` shape.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CandidateRecord {
    pub uid: Uid,
    #[serde(skip)]
    pub structure: BodyStructureNode,
    pub internal_date: Option<DateTime<FixedOffset>>,
    pub seq: Option<u32>,
    pub date_sent: Option<DateTime<Utc>>,
    pub subject: String,
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub message_id: Option<String>,
}

/// Candidates of one run, ordered by UID.
pub type CandidateSet = BTreeMap<Uid, CandidateRecord>;

impl CandidateRecord {
    /// Start a record from the structure fetch alone.
    pub fn from_structure(uid: Uid, fetch: &StructureFetch) -> Self {
        Self {
            uid,
            structure: fetch.structure.clone(),
            internal_date: fetch.internal_date,
            seq: fetch.seq,
            date_sent: None,
            subject: String::new(),
            from: Vec::new(),
            to: Vec::new(),
            message_id: None,
        }
    }

    /// Merge envelope fields into the record.
    ///
    /// Fields carried by both fetches (the sequence number) take the
    /// envelope's value.
    pub fn merge_envelope(&mut self, envelope: Envelope) {
        if envelope.seq.is_some() {
            self.seq = envelope.seq;
        }
        self.date_sent = envelope.date;
        self.subject = envelope.subject.unwrap_or_default();
        self.from = envelope.from;
        self.to = envelope.to;
        self.message_id = envelope.message_id;
    }

    /// First sender, formatted for display.
    pub fn sender(&self) -> String {
        self.from.first().map(EmailAddress::display).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bodystructure::MultipartNode;

    fn fetch(seq: Option<u32>) -> StructureFetch {
        StructureFetch {
            structure: BodyStructureNode::Multipart(MultipartNode {
                subtype: "mixed".into(),
                ..Default::default()
            }),
            internal_date: None,
            seq,
        }
    }

    #[test]
    fn test_envelope_seq_overrides_structure_seq() {
        let mut record = CandidateRecord::from_structure(5, &fetch(Some(1)));
        record.merge_envelope(Envelope {
            seq: Some(2),
            subject: Some("Signed report".into()),
            ..Default::default()
        });
        assert_eq!(record.seq, Some(2));
        assert_eq!(record.subject, "Signed report");
    }

    #[test]
    fn test_missing_envelope_seq_keeps_structure_seq() {
        let mut record = CandidateRecord::from_structure(5, &fetch(Some(1)));
        record.merge_envelope(Envelope::default());
        assert_eq!(record.seq, Some(1));
        assert_eq!(record.sender(), "");
    }
}
