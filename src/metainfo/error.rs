use crate::bencode::BencodeError;
use thiserror::Error;

/// Errors raised while parsing, validating, or creating torrents.
#[derive(Debug, Error)]
pub enum MetainfoError {
    /// The input was not syntactically valid bencode.
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    /// A required field was absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field had the wrong type or a value outside its allowed range.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Path of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Fields were individually well-formed but mutually inconsistent.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A path component was empty, `.`, `..`, or contained a separator.
    #[error("unsafe path component: {0:?}")]
    UnsafePath(String),

    /// An unrecognized key was rejected because strict schema mode is on.
    #[error("unknown key {0:?} rejected by strict schema")]
    UnknownKey(String),

    /// A hex string had the wrong length for an info hash.
    #[error("invalid info hash length")]
    InvalidInfoHashLength,

    /// Hashing was aborted through a cancellation token.
    #[error("hashing cancelled")]
    Cancelled,

    /// A referenced file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetainfoError {
    /// Shorthand for [`MetainfoError::InvalidField`].
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        MetainfoError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
