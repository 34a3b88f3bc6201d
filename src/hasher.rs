//! Piece and merkle hashing (BEP-3 / BEP-52)
//!
//! The v1 pipeline rolls SHA-1 pieces over the padded file catenation; the
//! v2 pipeline builds one SHA-256 merkle tree per file from 16 KiB block
//! leaves. Hybrid hashing shares a single read pass between the two. File
//! reads are synchronous by design; with more than one worker, digest
//! computation moves to a thread pool fed through a bounded queue.

mod merkle;
mod piece;
mod pipeline;

pub use merkle::{
    assemble_file_hashes, hash_block, leaf_capacity, merkle_root, FileHashes, FileTreeHasher,
};
pub use piece::PieceHasher;
pub use pipeline::{CancelToken, HashOutput, Hasher, StreamItem};

#[cfg(test)]
mod tests;
