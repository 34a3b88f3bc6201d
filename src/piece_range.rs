//! Piece-range location and validation.
//!
//! Maps a piece coordinate back to the source-file byte ranges that feed it,
//! together with the expected hash, so callers can verify payload bytes
//! without this crate ever touching the payload itself. Also builds BEP-19
//! web seed URLs for the located files.

use bytes::Bytes;
use sha1::{Digest, Sha1};

use crate::constants::{BLOCK_SIZE, SHA256_LEN};
use crate::hasher::{hash_block, leaf_capacity, merkle_root};
use crate::metainfo::{Metainfo, TorrentPath, V1Storage};

const ZEROS: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// A contiguous byte range within one file of the v1 stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSlice {
    /// Path relative to the torrent root; `[name]` for single-file
    /// torrents.
    pub path: TorrentPath,
    /// Offset of the range within the file.
    pub offset: u64,
    /// Length of the range in bytes.
    pub length: u64,
    /// Whether this range belongs to a pad file. Pad bytes are zeros by
    /// definition; callers never supply them.
    pub pad: bool,
}

/// The source ranges and expected hash of one v1 piece.
#[derive(Debug, Clone)]
pub struct V1PieceRange {
    /// Index of the piece in the catenated stream.
    pub piece_index: u32,
    /// The file ranges feeding this piece, in stream order.
    pub ranges: Vec<FileSlice>,
    expected: [u8; 20],
    name: Bytes,
    single_file: bool,
}

impl V1PieceRange {
    pub(crate) fn for_piece(meta: &Metainfo, index: u32) -> Option<Self> {
        let v1 = meta.info.data.v1()?;
        if index as usize >= v1.piece_count() {
            return None;
        }
        let layout = meta.info.v1_layout()?;
        let piece_length = meta.info.piece_length;
        let total = v1.padded_total_length();

        let start = u64::from(index) * piece_length;
        let end = (start + piece_length).min(total);

        // Walk cumulative offsets; the position inside each file comes from
        // subtraction, not modulo, so runs of piece-sized files stay
        // distinct.
        let mut ranges = Vec::new();
        let mut offset = 0u64;
        for file in &layout {
            let file_start = offset;
            let file_end = offset + file.length;
            offset = file_end;
            let overlap_start = start.max(file_start);
            let overlap_end = end.min(file_end);
            if overlap_start < overlap_end {
                ranges.push(FileSlice {
                    path: file.path.clone(),
                    offset: overlap_start - file_start,
                    length: overlap_end - overlap_start,
                    pad: file.pad,
                });
            }
        }

        Some(V1PieceRange {
            piece_index: index,
            ranges,
            expected: v1.pieces[index as usize],
            name: meta.info.name.clone(),
            single_file: matches!(v1.storage, V1Storage::Single { .. }),
        })
    }

    /// The expected SHA-1 of this piece.
    pub fn expected_hash(&self) -> &[u8; 20] {
        &self.expected
    }

    /// Checks caller-supplied payload bytes against the piece hash.
    ///
    /// `chunks` is the concatenated payload for the non-pad ranges, split
    /// at arbitrary boundaries. Pad ranges contribute zeros no matter what;
    /// the caller does not supply bytes for them. Returns `false` on a
    /// hash mismatch or when the supplied byte count does not match the
    /// real ranges.
    pub fn validate_data<T: AsRef<[u8]>>(&self, chunks: &[T]) -> bool {
        let supplied: u64 = chunks.iter().map(|c| c.as_ref().len() as u64).sum();
        let needed: u64 = self
            .ranges
            .iter()
            .filter(|r| !r.pad)
            .map(|r| r.length)
            .sum();
        if supplied != needed {
            return false;
        }

        let mut hasher = Sha1::new();
        let mut chunks = chunks.iter();
        let mut current: &[u8] = &[];
        for range in &self.ranges {
            if range.pad {
                let mut remaining = range.length;
                while remaining > 0 {
                    let take = remaining.min(BLOCK_SIZE as u64) as usize;
                    hasher.update(&ZEROS[..take]);
                    remaining -= take as u64;
                }
                continue;
            }
            let mut remaining = range.length as usize;
            while remaining > 0 {
                if current.is_empty() {
                    match chunks.next() {
                        Some(chunk) => current = chunk.as_ref(),
                        None => return false,
                    }
                    continue;
                }
                let take = remaining.min(current.len());
                hasher.update(&current[..take]);
                current = &current[take..];
                remaining -= take;
            }
        }

        let digest: [u8; 20] = hasher.finalize().into();
        digest == self.expected
    }

    /// BEP-19 web seed URL for the file containing the start of this piece.
    ///
    /// Returns `None` when the piece covers only pad bytes.
    pub fn webseed_url(&self, base: &str) -> Option<String> {
        let first = self.ranges.iter().find(|r| !r.pad)?;
        Some(join_webseed(base, &self.name, first, self.single_file))
    }

    /// BEP-19 web seed URLs for every real file this piece touches.
    pub fn webseed_urls(&self, base: &str) -> Vec<String> {
        self.ranges
            .iter()
            .filter(|r| !r.pad)
            .map(|r| join_webseed(base, &self.name, r, self.single_file))
            .collect()
    }
}

/// The byte range and expected hash of one v2 piece of one file.
#[derive(Debug, Clone)]
pub struct V2PieceRange {
    /// Path of the file relative to the torrent root.
    pub path: TorrentPath,
    /// Length of the whole file.
    pub file_length: u64,
    /// Piece index within the file.
    pub piece_index: u32,
    /// Offset of the piece within the file.
    pub offset: u64,
    /// Number of real file bytes the piece covers.
    pub length: u64,
    expected: [u8; 32],
    leaf_cap: usize,
    name: Bytes,
}

impl V2PieceRange {
    pub(crate) fn for_file_piece(meta: &Metainfo, path: &str, index: u32) -> Option<Self> {
        let v2 = meta.info.data.v2()?;
        let components: Vec<Bytes> = path
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| Bytes::copy_from_slice(c.as_bytes()))
            .collect();
        let path = TorrentPath::new(components).ok()?;
        let entry = v2.file_tree.get(&path)?;
        let root = entry.pieces_root?;

        let piece_length = meta.info.piece_length;
        let blocks_per_piece = piece_length as usize / BLOCK_SIZE;
        let n = entry.length;

        if n <= piece_length {
            // The whole file is one piece; its root is the digest.
            if index != 0 {
                return None;
            }
            let n_blocks = n.div_ceil(BLOCK_SIZE as u64) as usize;
            return Some(V2PieceRange {
                path,
                file_length: n,
                piece_index: 0,
                offset: 0,
                length: n,
                expected: root,
                leaf_cap: leaf_capacity(n_blocks, blocks_per_piece),
                name: meta.info.name.clone(),
            });
        }

        let n_pieces = n.div_ceil(piece_length);
        if u64::from(index) >= n_pieces {
            return None;
        }
        let layer = meta.piece_layers.get(root.as_slice())?;
        let at = index as usize * SHA256_LEN;
        let mut expected = [0u8; 32];
        expected.copy_from_slice(&layer[at..at + SHA256_LEN]);

        let offset = u64::from(index) * piece_length;
        Some(V2PieceRange {
            path,
            file_length: n,
            piece_index: index,
            offset,
            length: (offset + piece_length).min(n) - offset,
            expected,
            leaf_cap: blocks_per_piece,
            name: meta.info.name.clone(),
        })
    }

    /// The expected SHA-256 digest: the file's `pieces root` for
    /// single-piece files, otherwise the piece's layer hash.
    pub fn expected_hash(&self) -> &[u8; 32] {
        &self.expected
    }

    /// Checks caller-supplied payload bytes against the piece digest.
    ///
    /// `blocks` are the piece's 16 KiB sub-blocks in order (the last may be
    /// short). They are hashed into leaves, zero-padded to the piece's leaf
    /// capacity, and rebuilt into a sub-tree root. Returns `false` on a
    /// mismatch, a wrong byte count, or mis-sized blocks.
    pub fn validate_data<T: AsRef<[u8]>>(&self, blocks: &[T]) -> bool {
        let supplied: u64 = blocks.iter().map(|b| b.as_ref().len() as u64).sum();
        if supplied != self.length {
            return false;
        }
        for (i, block) in blocks.iter().enumerate() {
            let len = block.as_ref().len();
            if len > BLOCK_SIZE || (len < BLOCK_SIZE && i + 1 != blocks.len()) {
                return false;
            }
        }

        let mut leaves: Vec<[u8; 32]> = blocks.iter().map(|b| hash_block(b.as_ref())).collect();
        if leaves.len() > self.leaf_cap {
            return false;
        }
        leaves.resize(self.leaf_cap, [0u8; 32]);
        merkle_root(leaves) == self.expected
    }

    /// BEP-19 web seed URL for this file.
    pub fn webseed_url(&self, base: &str) -> String {
        let base = base.strip_suffix('/').unwrap_or(base);
        let name = String::from_utf8_lossy(&self.name);
        format!("{}/{}/{}", base, name, self.path)
    }
}

fn join_webseed(base: &str, name: &Bytes, range: &FileSlice, single_file: bool) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    let name = String::from_utf8_lossy(name);
    let name = name.strip_prefix('/').unwrap_or(&name);
    if single_file {
        format!("{}/{}", base, name)
    } else {
        format!("{}/{}/{}", base, name, range.path)
    }
}
