use sha2::{Digest, Sha256};

use crate::constants::BLOCK_SIZE;

/// Hashes a single block of data with SHA-256, producing one merkle leaf.
pub fn hash_block(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub(crate) fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Combines a power-of-two level of hashes pairwise up to a single root.
pub fn merkle_root(mut level: Vec<[u8; 32]>) -> [u8; 32] {
    debug_assert!(level.len().is_power_of_two());
    while level.len() > 1 {
        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    level[0]
}

/// Number of leaves a file's padded merkle tree has: the block count rounded
/// up to a power of two, and at least one full piece worth of blocks.
pub fn leaf_capacity(n_blocks: usize, blocks_per_piece: usize) -> usize {
    n_blocks.max(1).next_power_of_two().max(blocks_per_piece)
}

/// The v2 hashes of a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHashes {
    /// File length in bytes.
    pub length: u64,
    /// Merkle root over the padded leaves; `None` for empty files.
    pub pieces_root: Option<[u8; 32]>,
    /// Hashes at the level where each node covers `piece_length` bytes,
    /// truncated to the real piece count. Empty when the file fits in a
    /// single piece.
    pub piece_layer: Vec<[u8; 32]>,
}

/// Builds [`FileHashes`] from a file's block leaves.
///
/// Leaves are zero-padded to [`leaf_capacity`]. For multi-piece files the
/// piece layer is the intermediate level whose nodes each cover
/// `piece_length` bytes; pad pieces beyond the end of the file contribute to
/// the root but are not part of the layer.
pub fn assemble_file_hashes(
    length: u64,
    piece_length: u64,
    mut leaves: Vec<[u8; 32]>,
) -> FileHashes {
    if length == 0 {
        return FileHashes {
            length,
            pieces_root: None,
            piece_layer: Vec::new(),
        };
    }

    let blocks_per_piece = piece_length as usize / BLOCK_SIZE;
    let capacity = leaf_capacity(leaves.len(), blocks_per_piece);
    leaves.resize(capacity, [0u8; 32]);

    let n_pieces = length.div_ceil(piece_length) as usize;
    if n_pieces > 1 {
        let piece_hashes: Vec<[u8; 32]> = leaves
            .chunks(blocks_per_piece)
            .map(|piece| merkle_root(piece.to_vec()))
            .collect();
        let pieces_root = merkle_root(piece_hashes.clone());
        FileHashes {
            length,
            pieces_root: Some(pieces_root),
            piece_layer: piece_hashes[..n_pieces].to_vec(),
        }
    } else {
        FileHashes {
            length,
            pieces_root: Some(merkle_root(leaves)),
            piece_layer: Vec::new(),
        }
    }
}

/// Incremental v2 hasher for one file.
///
/// Feed it file bytes in any chunking; it cuts 16 KiB blocks internally and
/// produces the file's [`FileHashes`] on [`finish`](Self::finish).
#[derive(Debug)]
pub struct FileTreeHasher {
    piece_length: u64,
    length: u64,
    block: Vec<u8>,
    leaves: Vec<[u8; 32]>,
}

impl FileTreeHasher {
    /// Creates a hasher for a file in a torrent with the given piece length.
    pub fn new(piece_length: u64) -> Self {
        Self {
            piece_length,
            length: 0,
            block: Vec::with_capacity(BLOCK_SIZE),
            leaves: Vec::new(),
        }
    }

    /// Absorbs the next run of file bytes.
    pub fn update(&mut self, mut data: &[u8]) {
        self.length += data.len() as u64;
        while !data.is_empty() {
            let take = (BLOCK_SIZE - self.block.len()).min(data.len());
            self.block.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.block.len() == BLOCK_SIZE {
                self.leaves.push(hash_block(&self.block));
                self.block.clear();
            }
        }
    }

    /// Finishes the file, returning its root and piece layer.
    pub fn finish(mut self) -> FileHashes {
        if !self.block.is_empty() {
            self.leaves.push(hash_block(&self.block));
        }
        assemble_file_hashes(self.length, self.piece_length, self.leaves)
    }
}
