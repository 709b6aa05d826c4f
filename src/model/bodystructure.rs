//! Typed IMAP `BODYSTRUCTURE` tree.
//!
//! Nodes are produced per UID by [`crate::parser::bodystructure::parse`] or
//! by converting the IMAP library's response, and are read-only afterwards.
//! Every wire field that a server may omit is an `Option` so that a
//! truncated structure is representable instead of being a parse failure.

/// `Content-Disposition` extension data.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Disposition {
    /// Disposition type, e.g. `"attachment"` or `"inline"`.
    pub kind: String,
    /// Disposition parameters in wire order.
    pub params: Vec<(String, String)>,
}

/// A single (non-multipart) body part.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LeafNode {
    /// Media type, e.g. `"application"`.
    pub media_type: String,
    /// Media subtype, e.g. `"octet-stream"`.
    pub subtype: String,
    /// `Content-Type` parameters in wire order.
    pub params: Vec<(String, String)>,
    /// `Content-ID`.
    pub id: Option<String>,
    /// `Content-Description`.
    pub description: Option<String>,
    /// `Content-Transfer-Encoding`.
    pub encoding: Option<String>,
    /// Encoded size in octets.
    pub size: Option<u32>,
    /// Line count; only sent for `text/*` and `message/rfc822`.
    pub lines: Option<u32>,
    /// Body MD5 (extension data).
    pub md5: Option<String>,
    /// Disposition (extension data).
    pub disposition: Option<Disposition>,
    /// Body language tags (extension data).
    pub language: Vec<String>,
    /// Body location (extension data).
    pub location: Option<String>,
}

/// A `multipart/*` node.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MultipartNode {
    /// Child parts in order.
    pub parts: Vec<BodyStructureNode>,
    /// Multipart subtype, e.g. `"mixed"`.
    pub subtype: String,
    /// `Content-Type` parameters (extension data).
    pub params: Vec<(String, String)>,
    /// Disposition (extension data).
    pub disposition: Option<Disposition>,
    /// Body language tags (extension data).
    pub language: Vec<String>,
    /// Body location (extension data).
    pub location: Option<String>,
}

/// One node of a `BODYSTRUCTURE` tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BodyStructureNode {
    Leaf(LeafNode),
    Multipart(MultipartNode),
}

impl LeafNode {
    /// First parameter with this name (case-insensitive).
    pub fn param(&self, name: &str) -> Option<&str> {
        find_param(&self.params, name)
    }

    /// `"type/subtype"`, lowercased.
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.media_type, self.subtype).to_ascii_lowercase()
    }
}

impl MultipartNode {
    /// First parameter with this name (case-insensitive).
    pub fn param(&self, name: &str) -> Option<&str> {
        find_param(&self.params, name)
    }
}

impl BodyStructureNode {
    /// `"type/subtype"` of this node, lowercased.
    pub fn mime_type(&self) -> String {
        match self {
            Self::Leaf(leaf) => leaf.mime_type(),
            Self::Multipart(multi) => format!("multipart/{}", multi.subtype.to_ascii_lowercase()),
        }
    }

    /// Child parts; empty for a leaf.
    pub fn parts(&self) -> &[BodyStructureNode] {
        match self {
            Self::Leaf(_) => &[],
            Self::Multipart(multi) => &multi.parts,
        }
    }
}

fn find_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
