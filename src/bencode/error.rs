use thiserror::Error;

/// Errors that can occur while decoding bencode.
///
/// Every syntax variant carries the byte offset in the input at which
/// decoding failed, so callers can report the exact position.
///
/// # Examples
///
/// ```
/// use btmeta::bencode::{decode, BencodeError};
///
/// // Truncated input
/// let result = decode(b"i42");
/// assert!(matches!(result, Err(BencodeError::UnexpectedEof(_))));
///
/// // Keys out of order
/// let result = decode(b"d1:b0:1:a0:e");
/// assert!(matches!(result, Err(BencodeError::NonAscendingKey(_))));
/// ```
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BencodeError {
    /// Input ended before a complete value was parsed.
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    /// A byte that cannot start or continue a value at this position.
    #[error("unexpected byte {byte:#04x} at offset {offset}")]
    UnexpectedByte {
        /// Position of the offending byte.
        offset: usize,
        /// The byte found there.
        byte: u8,
    },

    /// Integer is malformed (leading zeros, `-0`, empty, or out of range).
    #[error("invalid integer at offset {offset}: {reason}")]
    InvalidInteger {
        /// Position where the integer began.
        offset: usize,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Byte string length prefix is not a valid nonnegative number.
    #[error("invalid string length at offset {0}")]
    InvalidLength(usize),

    /// A dictionary key compared lower than or equal in prefix to its
    /// predecessor instead of strictly ascending.
    #[error("dictionary keys not in ascending order at offset {0}")]
    NonAscendingKey(usize),

    /// The same dictionary key appeared twice.
    #[error("duplicate dictionary key at offset {0}")]
    DuplicateKey(usize),

    /// A dictionary key was not a byte string.
    #[error("dictionary key is not a byte string at offset {0}")]
    NonStringKey(usize),

    /// Extra data exists after the top-level value.
    #[error("trailing data after value at offset {0}")]
    TrailingData(usize),

    /// Recursion limit exceeded, to prevent stack overflow on crafted input.
    #[error("nesting too deep")]
    NestingTooDeep,
}
