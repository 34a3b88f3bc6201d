//! Size constants and format-level defaults.
//!
//! These values come from BEP-3 and BEP-52 plus the conventions of widely
//! deployed torrent creators; callers can override piece length but not the
//! block size, which is fixed by the v2 wire format.

// ============================================================================
// Byte units
// ============================================================================

/// One kibibyte.
pub const KIB: u64 = 1024;

/// One mebibyte.
pub const MIB: u64 = 1024 * KIB;

/// One gibibyte.
pub const GIB: u64 = 1024 * MIB;

// ============================================================================
// Piece and block geometry
// ============================================================================

/// The v2 merkle leaf size (16 KiB), fixed by BEP-52.
pub const BLOCK_SIZE: usize = 16384;

/// Smallest piece length accepted anywhere (16 KiB, the BEP-52 minimum).
pub const MIN_PIECE_LENGTH: u64 = 16 * KIB;

/// Piece length used by the create facade when the caller does not pick one.
pub const DEFAULT_PIECE_LENGTH: u64 = 256 * KIB;

/// Length of a SHA-1 digest, the unit of the v1 `pieces` string.
pub const SHA1_LEN: usize = 20;

/// Length of a SHA-256 digest, the unit of v2 roots and piece layers.
pub const SHA256_LEN: usize = 32;

// ============================================================================
// File layout
// ============================================================================

/// Directory name under which BEP-47 pad files live (`.pad/<length>`).
pub const PAD_DIR: &str = ".pad";

/// System files silently skipped when enumerating a directory tree.
pub const EXCLUDE_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// Read granularity for file hashing. Reads are synchronous; a larger
/// buffer just amortizes syscalls while pieces are cut out of it.
pub const READ_BUFFER_SIZE: usize = MIB as usize;

/// `created by` string stamped on generated torrents.
pub const DEFAULT_CREATED_BY: &str = concat!("btmeta/", env!("CARGO_PKG_VERSION"));
