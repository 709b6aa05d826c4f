//! Parsing: IMAP body structures, RFC 5322 headers, MIME messages and local `.eml` files.

pub mod bodystructure;
pub mod eml;
pub mod header;
pub mod mime;
