//! Parser for the IMAP `BODYSTRUCTURE` / `BODY` wire grammar (RFC 3501 §7.4.2).
//!
//! Parsing happens in two steps: the input is read into a generic
//! parenthesized value tree, then the tree is mapped onto
//! [`BodyStructureNode`]. Only the first step can fail. The mapping is
//! positional and lenient: fields that are missing or of the wrong kind
//! become `None`/empty instead of errors.

use crate::error::{RepairError, Result};
use crate::model::bodystructure::{BodyStructureNode, Disposition, LeafNode, MultipartNode};

/// Maximum list nesting accepted from the wire.
const MAX_DEPTH: usize = 64;

/// One value of the wire grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Nil,
    Str(String),
    Atom(String),
    List(Vec<Value>),
}

impl Value {
    fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Atom(s) => Some(s),
            _ => None,
        }
    }

    fn as_u32(&self) -> Option<u32> {
        self.as_str().and_then(|s| s.parse().ok())
    }

    fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Parse a body structure, e.g.
/// `(("text" "plain" NIL NIL NIL "7bit" 5 1) ("application" "octet-stream" ("name" "smime.p7m") NIL NIL "base64" 1024) "mixed")`.
///
/// A leading `BODYSTRUCTURE` or `BODY` keyword is accepted and skipped.
pub fn parse(input: &str) -> Result<BodyStructureNode> {
    let mut reader = Reader::new(input.as_bytes());
    reader.skip_ws();
    for keyword in ["BODYSTRUCTURE", "BODY"] {
        if reader.eat_keyword(keyword) {
            reader.skip_ws();
            break;
        }
    }

    let value = reader.value(0)?;
    reader.skip_ws();
    if !reader.at_end() {
        return Err(reader.error("trailing data after body structure"));
    }

    match &value {
        Value::List(items) => Ok(build_node(items)),
        _ => Err(RepairError::StructureParse {
            offset: 0,
            reason: "body structure must be a parenthesized list".to_string(),
        }),
    }
}

fn build_node(items: &[Value]) -> BodyStructureNode {
    if matches!(items.first(), Some(Value::List(_))) {
        BodyStructureNode::Multipart(build_multipart(items))
    } else {
        BodyStructureNode::Leaf(build_leaf(items))
    }
}

fn build_multipart(items: &[Value]) -> MultipartNode {
    let children = items
        .iter()
        .take_while(|v| matches!(v, Value::List(_)))
        .filter_map(Value::as_list)
        .map(build_node)
        .collect::<Vec<_>>();
    let rest = &items[children.len()..];

    MultipartNode {
        parts: children,
        subtype: opt_string(rest.first()).unwrap_or_default(),
        params: params(rest.get(1)),
        disposition: disposition(rest.get(2)),
        language: language(rest.get(3)),
        location: opt_string(rest.get(4)),
    }
}

fn build_leaf(items: &[Value]) -> LeafNode {
    let media_type = opt_string(items.first()).unwrap_or_default();
    let subtype = opt_string(items.get(1)).unwrap_or_default();

    // Type-specific fields sit between the basic fields and the extension data.
    let (lines, ext_start) = if media_type.eq_ignore_ascii_case("text") {
        (items.get(7).and_then(Value::as_u32), 8)
    } else if media_type.eq_ignore_ascii_case("message") && subtype.eq_ignore_ascii_case("rfc822")
    {
        (items.get(9).and_then(Value::as_u32), 10)
    } else {
        (None, 7)
    };
    let ext = items.get(ext_start..).unwrap_or(&[]);

    LeafNode {
        media_type,
        subtype,
        params: params(items.get(2)),
        id: opt_string(items.get(3)),
        description: opt_string(items.get(4)),
        encoding: opt_string(items.get(5)),
        size: items.get(6).and_then(Value::as_u32),
        lines,
        md5: opt_string(ext.first()),
        disposition: disposition(ext.get(1)),
        language: language(ext.get(2)),
        location: opt_string(ext.get(3)),
    }
}

fn opt_string(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn params(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(items) = value.and_then(Value::as_list) else {
        return Vec::new();
    };
    items
        .chunks(2)
        .filter_map(|pair| match pair {
            [k, v] => Some((k.as_str()?.to_string(), v.as_str().unwrap_or("").to_string())),
            _ => None,
        })
        .collect()
}

fn disposition(value: Option<&Value>) -> Option<Disposition> {
    let items = value.and_then(Value::as_list)?;
    Some(Disposition {
        kind: opt_string(items.first())?,
        params: params(items.get(1)),
    })
}

fn language(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(v) => v.as_str().map(|s| vec![s.to_string()]).unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Byte-level reader over the wire text.
struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn error(&self, reason: &str) -> RepairError {
        RepairError::StructureParse {
            offset: self.pos,
            reason: reason.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let end = self.pos + keyword.len();
        let matches_keyword = self
            .input
            .get(self.pos..end)
            .is_some_and(|s| s.eq_ignore_ascii_case(keyword.as_bytes()));
        let followed_by_delim = matches!(self.input.get(end), None | Some(b' ' | b'('));
        if matches_keyword && followed_by_delim {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(b'(') => self.list(depth),
            Some(b'"') => self.quoted(),
            Some(b'{') => self.literal(),
            Some(b')') => Err(self.error("unexpected ')'")),
            Some(_) => Ok(self.atom()),
        }
    }

    fn list(&mut self, depth: usize) -> Result<Value> {
        if depth >= MAX_DEPTH {
            return Err(self.error("body structure nested too deeply"));
        }
        self.pos += 1; // '('
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.error("unterminated list")),
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                Some(_) => items.push(self.value(depth + 1)?),
            }
        }
    }

    fn quoted(&mut self) -> Result<Value> {
        self.pos += 1; // opening quote
        let mut buf = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated quoted string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Value::Str(String::from_utf8_lossy(&buf).into_owned()));
                }
                Some(b'\\') => {
                    let escaped = self
                        .input
                        .get(self.pos + 1)
                        .copied()
                        .ok_or_else(|| self.error("dangling escape"))?;
                    buf.push(escaped);
                    self.pos += 2;
                }
                Some(b) => {
                    buf.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    /// `{n}\r\n` followed by `n` raw octets.
    fn literal(&mut self) -> Result<Value> {
        let close = self.input[self.pos..]
            .iter()
            .position(|&b| b == b'}')
            .map(|i| self.pos + i)
            .ok_or_else(|| self.error("unterminated literal length"))?;
        let len: usize = std::str::from_utf8(&self.input[self.pos + 1..close])
            .ok()
            .and_then(|s| s.trim_end_matches('+').parse().ok())
            .ok_or_else(|| self.error("invalid literal length"))?;
        self.pos = close + 1;
        if self.input[self.pos..].starts_with(b"\r\n") {
            self.pos += 2;
        } else if self.peek() == Some(b'\n') {
            self.pos += 1;
        }
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| self.error("literal length too large"))?;
        let bytes = self
            .input
            .get(self.pos..end)
            .ok_or_else(|| self.error("literal runs past end of input"))?;
        self.pos = end;
        Ok(Value::Str(String::from_utf8_lossy(bytes).into_owned()))
    }

    fn atom(&mut self) -> Value {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'(' | b')' | b'"') {
                break;
            }
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if text.eq_ignore_ascii_case("NIL") {
            Value::Nil
        } else {
            Value::Atom(text)
        }
    }
}
