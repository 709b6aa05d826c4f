//! The structural predicate for the mis-wrapped S/MIME shape.
//!
//! The gateway we are cleaning up after produces `multipart/mixed` with a
//! text part first and the real S/MIME message base64-encoded as an
//! `application/octet-stream` attachment named `smime.p7m` second. Only that
//! exact shape is accepted.

use crate::model::bodystructure::{BodyStructureNode, LeafNode};

/// Attachment file name the gateway uses.
pub const P7M_NAME: &str = "smime.p7m";

/// Whether a body structure has the mis-wrapped `smime.p7m` shape.
///
/// Never fails: any missing field or unexpected variant is a non-match.
pub fn matches(node: &BodyStructureNode) -> bool {
    let BodyStructureNode::Multipart(multi) = node else {
        return false;
    };
    if !multi.subtype.eq_ignore_ascii_case("mixed") {
        return false;
    }
    // The first part is not examined.
    match multi.parts.get(1) {
        Some(BodyStructureNode::Leaf(leaf)) => is_p7m_attachment(leaf),
        _ => false,
    }
}

fn is_p7m_attachment(leaf: &LeafNode) -> bool {
    leaf.media_type.eq_ignore_ascii_case("application")
        && leaf.subtype.eq_ignore_ascii_case("octet-stream")
        && leaf
            .param("name")
            .is_some_and(|name| name.eq_ignore_ascii_case(P7M_NAME))
        && leaf
            .encoding
            .as_deref()
            .is_some_and(|enc| enc.eq_ignore_ascii_case("base64"))
}
