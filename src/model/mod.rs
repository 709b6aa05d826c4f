//! Core data model: body structures, candidates, MIME messages and addresses.

pub mod address;
pub mod bodystructure;
pub mod candidate;
pub mod mime;
