//! Mailbox addresses as they appear in IMAP envelopes and `From:`/`To:` headers.

use crate::parser::header::decode_encoded_words;

/// A sender or recipient.
///
/// `display_name` is already RFC 2047 decoded; it is empty when the source
/// carried no phrase.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare `mailbox@host` address.
    pub address: String,
}

impl EmailAddress {
    /// Build an address from the split fields of an IMAP envelope address
    /// (`name`, `mailbox`, `host`).
    ///
    /// A missing host yields just the mailbox part, which is how servers
    /// report group syntax and undisclosed recipients.
    pub fn from_envelope_parts(
        name: Option<&str>,
        mailbox: Option<&str>,
        host: Option<&str>,
    ) -> Self {
        let display_name = name
            .map(|n| decode_encoded_words(n).trim().to_string())
            .unwrap_or_default();
        let address = match (mailbox, host) {
            (Some(m), Some(h)) if !h.is_empty() => format!("{m}@{h}"),
            (Some(m), _) => m.to_string(),
            (None, Some(h)) => format!("@{h}"),
            (None, None) => String::new(),
        };
        Self {
            display_name,
            address,
        }
    }

    /// Parse one address from a header value.
    ///
    /// Accepts `user@host`, `<user@host>`, `Name <user@host>` and
    /// `"Quoted, Name" <user@host>`. Unrecognized input is kept verbatim
    /// as the address.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    display_name: strip_quotes(&trimmed[..open]),
                    address: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }
        Self {
            display_name: String::new(),
            address: trimmed.to_string(),
        }
    }

    /// Parse a comma-separated address list, honoring quotes and angle brackets.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        for ch in raw.chars() {
            match ch {
                '"' => in_quotes = !in_quotes,
                '<' if !in_quotes => in_angle = true,
                '>' if !in_quotes => in_angle = false,
                ',' if !in_quotes && !in_angle => {
                    push_parsed(&mut results, &current);
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        push_parsed(&mut results, &current);

        results
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

fn push_parsed(results: &mut Vec<EmailAddress>, segment: &str) {
    let addr = EmailAddress::parse(&decode_encoded_words(segment));
    if !addr.address.is_empty() {
        results.push(addr);
    }
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_envelope_parts() {
        let addr = EmailAddress::from_envelope_parts(
            Some("=?UTF-8?B?SG9sYQ==?="),
            Some("gateway"),
            Some("example.org"),
        );
        assert_eq!(addr.display_name, "Hola");
        assert_eq!(addr.address, "gateway@example.org");
    }

    #[test]
    fn test_from_envelope_parts_without_host() {
        let addr = EmailAddress::from_envelope_parts(None, Some("undisclosed-recipients"), None);
        assert_eq!(addr.address, "undisclosed-recipients");
        assert_eq!(addr.display(), "undisclosed-recipients");
    }

    #[test]
    fn test_parse_name_and_address() {
        let addr = EmailAddress::parse("User One <user1@example.com>");
        assert_eq!(addr.address, "user1@example.com");
        assert_eq!(addr.display_name, "User One");
    }

    #[test]
    fn test_parse_list_with_quoted_comma() {
        let list = EmailAddress::parse_list("\"Last, First\" <a@b.com>, other@c.com");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].display_name, "Last, First");
        assert_eq!(list[0].address, "a@b.com");
        assert_eq!(list[1].address, "other@c.com");
    }

    #[test]
    fn test_parse_list_empty() {
        assert!(EmailAddress::parse_list("  ").is_empty());
    }
}
