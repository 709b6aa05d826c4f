//! Local copies of rewritten messages.

pub mod eml;
