//! `p7mfix`: find IMAP messages whose S/MIME payload was delivered as a
//! plain `smime.p7m` attachment, and turn them back into proper S/MIME
//! messages.
//!
//! This crate provides the core library: the `BODYSTRUCTURE` parser and
//! matcher, the message rewriter, and the batched repair pipeline over an
//! [`imap::ImapOps`] session.

pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod imap;
pub mod model;
pub mod parser;
pub mod rewrite;
pub mod scan;
