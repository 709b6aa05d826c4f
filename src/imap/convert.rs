//! Convert `imap-proto` response types into the crate's model.
//!
//! Servers send header text as raw bytes; it is decoded lossily and RFC 2047
//! encoded words are resolved here, so the rest of the crate sees plain
//! strings.

use imap_proto::types::{
    Address, BodyContentCommon, BodyContentSinglePart, BodyStructure, ContentEncoding,
};
use tracing::warn;

use crate::model::address::EmailAddress;
use crate::model::bodystructure::{BodyStructureNode, Disposition, LeafNode, MultipartNode};
use crate::model::candidate::Envelope;
use crate::model::mime::unfold;
use crate::parser::header::{decode_encoded_words, extract_angle_bracket, parse_date};

/// Convert a BODYSTRUCTURE response.
pub fn body_structure(structure: &BodyStructure<'_>) -> BodyStructureNode {
    match structure {
        BodyStructure::Basic { common, other, .. } => {
            BodyStructureNode::Leaf(leaf(common, other, None))
        }
        BodyStructure::Text {
            common,
            other,
            lines,
            ..
        }
        | BodyStructure::Message {
            common,
            other,
            lines,
            ..
        } => BodyStructureNode::Leaf(leaf(common, other, Some(*lines))),
        BodyStructure::Multipart { common, bodies, .. } => {
            BodyStructureNode::Multipart(MultipartNode {
                parts: bodies.iter().map(body_structure).collect(),
                subtype: common.ty.subtype.to_string(),
                params: params(&common.ty.params),
                disposition: disposition(common),
                language: language(common),
                location: common.location.as_deref().map(str::to_string),
            })
        }
    }
}

fn leaf(
    common: &BodyContentCommon<'_>,
    other: &BodyContentSinglePart<'_>,
    lines: Option<u32>,
) -> LeafNode {
    LeafNode {
        media_type: common.ty.ty.to_string(),
        subtype: common.ty.subtype.to_string(),
        params: params(&common.ty.params),
        id: other.id.as_deref().map(str::to_string),
        description: other.description.as_deref().map(str::to_string),
        encoding: Some(encoding_name(&other.transfer_encoding)),
        size: Some(other.octets),
        lines,
        md5: other.md5.as_deref().map(str::to_string),
        disposition: disposition(common),
        language: language(common),
        location: common.location.as_deref().map(str::to_string),
    }
}

fn params<K: ToString, V: ToString>(params: &Option<Vec<(K, V)>>) -> Vec<(String, String)> {
    params
        .iter()
        .flatten()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn disposition(common: &BodyContentCommon<'_>) -> Option<Disposition> {
    common.disposition.as_ref().map(|d| Disposition {
        kind: d.ty.to_string(),
        params: params(&d.params),
    })
}

fn language(common: &BodyContentCommon<'_>) -> Vec<String> {
    common
        .language
        .iter()
        .flatten()
        .map(|tag| tag.to_string())
        .collect()
}

fn encoding_name(encoding: &ContentEncoding<'_>) -> String {
    match encoding {
        ContentEncoding::SevenBit => "7bit".to_string(),
        ContentEncoding::EightBit => "8bit".to_string(),
        ContentEncoding::Binary => "binary".to_string(),
        ContentEncoding::Base64 => "base64".to_string(),
        ContentEncoding::QuotedPrintable => "quoted-printable".to_string(),
        ContentEncoding::Other(other) => other.to_string(),
    }
}

/// Convert an ENVELOPE response; `seq` is the message sequence number of
/// the fetch it came with.
pub fn envelope(seq: u32, envelope: &imap_proto::types::Envelope<'_>) -> Envelope {
    build_envelope(
        seq,
        envelope.date.as_deref(),
        envelope.subject.as_deref(),
        envelope.message_id.as_deref(),
        addresses(&envelope.from),
        addresses(&envelope.to),
    )
}

fn addresses(list: &Option<Vec<Address<'_>>>) -> Vec<EmailAddress> {
    list.iter()
        .flatten()
        .map(|a| address(a.name.as_deref(), a.mailbox.as_deref(), a.host.as_deref()))
        .collect()
}

fn address(name: Option<&[u8]>, mailbox: Option<&[u8]>, host: Option<&[u8]>) -> EmailAddress {
    let name = name.map(lossy);
    let mailbox = mailbox.map(lossy);
    let host = host.map(lossy);
    EmailAddress::from_envelope_parts(name.as_deref(), mailbox.as_deref(), host.as_deref())
}

fn build_envelope(
    seq: u32,
    date: Option<&[u8]>,
    subject: Option<&[u8]>,
    message_id: Option<&[u8]>,
    from: Vec<EmailAddress>,
    to: Vec<EmailAddress>,
) -> Envelope {
    let date_raw = date.map(lossy);
    let parsed = date_raw.as_deref().and_then(parse_date);
    if let (Some(raw), None) = (&date_raw, parsed) {
        warn!(seq, date = %raw, "Unparseable envelope date");
    }

    Envelope {
        seq: Some(seq),
        date: parsed,
        date_raw,
        subject: subject.map(|s| decode_encoded_words(&unfold(&lossy(s)))),
        from,
        to,
        message_id: message_id.map(|id| extract_angle_bracket(&lossy(id))),
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
