//! Centralized error types for p7mfix.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::imap::Uid;

/// Pipeline step a per-message failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchStructure,
    FetchEnvelope,
    FetchBody,
    Rewrite,
    Upload,
    Save,
    Trash,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FetchStructure => "structure fetch",
            Stage::FetchEnvelope => "envelope fetch",
            Stage::FetchBody => "body fetch",
            Stage::Rewrite => "rewrite",
            Stage::Upload => "upload",
            Stage::Save => "local save",
            Stage::Trash => "trash",
        };
        f.write_str(name)
    }
}

/// All errors produced by the p7mfix library.
#[derive(Error, Debug)]
pub enum RepairError {
    /// The message does not have the shape the rewriter expects.
    #[error("Unexpected message shape: {0}")]
    Shape(&'static str),

    /// The embedded attachment is not valid base64.
    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    /// An IMAP round trip failed (network, authentication or protocol).
    #[error("IMAP {op} failed: {reason}")]
    Transport { op: &'static str, reason: String },

    /// A BODYSTRUCTURE string could not be tokenized.
    #[error("BODYSTRUCTURE parse error at offset {offset}: {reason}")]
    StructureParse { offset: usize, reason: String },

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A failure while processing one message, tagged with where it happened.
    #[error("UID {uid}: {stage} failed: {source}")]
    Uid {
        uid: Uid,
        stage: Stage,
        source: Box<RepairError>,
    },
}

/// Convenience alias for `Result<T, RepairError>`.
pub type Result<T> = std::result::Result<T, RepairError>;

impl RepairError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Transport` variant for the named IMAP operation.
    pub fn transport(op: &'static str, reason: impl fmt::Display) -> Self {
        Self::Transport {
            op,
            reason: reason.to_string(),
        }
    }

    /// Attach the UID and pipeline stage to this error.
    ///
    /// Already-tagged errors are returned unchanged so the innermost
    /// location wins.
    pub fn at(self, uid: Uid, stage: Stage) -> Self {
        match self {
            tagged @ Self::Uid { .. } => tagged,
            other => Self::Uid {
                uid,
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The UID and stage this error was tagged with, if any.
    pub fn location(&self) -> Option<(Uid, Stage)> {
        match self {
            Self::Uid { uid, stage, .. } => Some((*uid, *stage)),
            _ => None,
        }
    }

    /// The underlying error, skipping the UID/stage wrapper.
    pub fn root(&self) -> &RepairError {
        match self {
            Self::Uid { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_wraps_once() {
        let err = RepairError::Shape("not multipart")
            .at(7, Stage::Rewrite)
            .at(9, Stage::Upload);
        assert_eq!(err.location(), Some((7, Stage::Rewrite)));
        assert!(matches!(err.root(), RepairError::Shape("not multipart")));
    }

    #[test]
    fn test_display_includes_context() {
        let err = RepairError::transport("uid_copy", "connection reset").at(42, Stage::Trash);
        assert_eq!(
            err.to_string(),
            "UID 42: trash failed: IMAP uid_copy failed: connection reset"
        );
    }
}
