//! Candidate detection: the body-structure predicate and the scan over a fetch batch.

pub mod candidates;
pub mod matcher;

pub use candidates::scan;
pub use matcher::matches;
