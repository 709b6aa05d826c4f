//! In-memory MIME message: ordered headers plus a raw or multipart body.
//!
//! Bodies are kept as the exact bytes they were parsed from, even when the
//! message is multipart and its children are also available. Serializing a
//! message therefore never re-encodes content, which keeps S/MIME signatures
//! over the body intact.

/// One header field.
///
/// `value` is the decoded text: leading whitespace after the colon removed,
/// folded continuation lines kept with `\r\n` separators. Fields read from a
/// message also keep their exact bytes in `raw`, which is what gets written
/// back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
    /// The field as parsed, name through last continuation line, without
    /// the final line break. `None` for fields built in code.
    pub raw: Option<Vec<u8>>,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            raw: None,
        }
    }

    /// Serialized field bytes, without the trailing line break.
    fn write_to(&self, out: &mut Vec<u8>) {
        match &self.raw {
            Some(raw) => out.extend_from_slice(raw),
            None => {
                out.extend_from_slice(self.name.as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(self.value.as_bytes());
            }
        }
    }
}

/// Message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeBody {
    /// A single part's payload, still transfer-encoded.
    Raw(Vec<u8>),
    /// A multipart body: the original bytes and the parsed children.
    Multipart {
        raw: Vec<u8>,
        parts: Vec<MimeMessage>,
    },
}

/// A parsed `Content-Type` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Lowercased `type/subtype`.
    pub mime_type: String,
    /// Parameters in header order, quotes removed.
    pub params: Vec<(String, String)>,
}

/// A message (or a part of one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeMessage {
    headers: Vec<Header>,
    body: MimeBody,
}

impl MimeMessage {
    pub fn new(headers: Vec<Header>, body: MimeBody) -> Self {
        Self { headers, body }
    }

    /// All headers in order, duplicates included.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// First value of a header (case-insensitive name).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Every value of a header, in order.
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Add a header at the end, keeping any existing ones with the same name.
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.push_header(Header::new(name, value));
    }

    /// Add an existing field at the end, raw bytes included.
    pub fn push_header(&mut self, header: Header) {
        self.headers.push(header);
    }

    /// Remove every occurrence of a header; returns how many were removed.
    pub fn remove_header(&mut self, name: &str) -> usize {
        let before = self.headers.len();
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
        before - self.headers.len()
    }

    /// Drop all headers.
    pub fn clear_headers(&mut self) {
        self.headers.clear();
    }

    /// Set a header to a single value.
    ///
    /// The first existing occurrence is replaced in place and later ones are
    /// removed; if there is none the header is appended.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(name))
        {
            Some(first) => {
                self.headers[first] = Header::new(name, value);
                let mut idx = 0;
                self.headers.retain(|h| {
                    let keep = idx <= first || !h.name.eq_ignore_ascii_case(name);
                    idx += 1;
                    keep
                });
            }
            None => self.append_header(name, value),
        }
    }

    /// The body bytes exactly as parsed.
    pub fn raw_body(&self) -> &[u8] {
        match &self.body {
            MimeBody::Raw(raw) | MimeBody::Multipart { raw, .. } => raw,
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, MimeBody::Multipart { .. })
    }

    /// Child parts; empty unless multipart.
    pub fn parts(&self) -> &[MimeMessage] {
        match &self.body {
            MimeBody::Raw(_) => &[],
            MimeBody::Multipart { parts, .. } => parts,
        }
    }

    /// The parsed `Content-Type`, defaulting to `text/plain` when absent
    /// or unparseable.
    pub fn content_type(&self) -> ContentType {
        self.header("content-type")
            .map(ContentType::parse)
            .unwrap_or_default()
    }

    /// Serialize to RFC 5322 bytes: headers with CRLF line endings, a blank
    /// line, then the body verbatim.
    ///
    /// Parsed fields are written from their raw bytes. Fields set in code
    /// are formatted as `Name: value`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.raw_body();
        let mut out = Vec::with_capacity(body.len() + self.headers.len() * 64);
        for header in &self.headers {
            header.write_to(&mut out);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(body);
        out
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self {
            mime_type: "text/plain".to_string(),
            params: Vec::new(),
        }
    }
}

impl ContentType {
    /// Parse a header value such as `application/octet-stream; name="smime.p7m"`.
    pub fn parse(value: &str) -> Self {
        let value = unfold(value);
        let mut segments = split_params(&value).into_iter();
        let mime_type = segments
            .next()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| {
                s.split_once('/')
                    .is_some_and(|(t, st)| !t.is_empty() && !st.is_empty())
            })
            .unwrap_or_else(|| "text/plain".to_string());

        let params = segments
            .filter_map(|segment| {
                let (key, val) = segment.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), unquote(val.trim())))
            })
            .collect();

        Self { mime_type, params }
    }

    /// First parameter with this name (case-insensitive).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_multipart(&self) -> bool {
        self.mime_type.starts_with("multipart/")
    }
}

/// Remove header folding: CRLF/LF followed by whitespace become that whitespace.
pub fn unfold(value: &str) -> String {
    value.replace("\r\n", "").replace('\n', "")
}

/// Split on `;` outside of double quotes.
fn split_params(value: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in value.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                escaped = true;
                current.push(ch);
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    segments.push(current);
    segments
}

/// Strip surrounding quotes and resolve backslash escapes.
fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}
