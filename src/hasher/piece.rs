use sha1::{Digest, Sha1};

use crate::constants::BLOCK_SIZE;

const ZEROS: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Incremental v1 piece hasher.
///
/// Absorbs the catenated file stream (real bytes via [`update`],
/// pad-file bytes via [`pad`]) and emits one SHA-1 per `piece_length`
/// bytes. The stream is never materialized; only the current piece is
/// buffered.
///
/// [`update`]: Self::update
/// [`pad`]: Self::pad
#[derive(Debug)]
pub struct PieceHasher {
    piece_length: usize,
    buffer: Vec<u8>,
    pieces: Vec<[u8; 20]>,
}

impl PieceHasher {
    /// Creates a hasher cutting pieces of the given length.
    pub fn new(piece_length: u64) -> Self {
        Self {
            piece_length: piece_length as usize,
            buffer: Vec::with_capacity(piece_length as usize),
            pieces: Vec::new(),
        }
    }

    /// Absorbs the next run of stream bytes.
    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (self.piece_length - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buffer.len() == self.piece_length {
                self.emit();
            }
        }
    }

    /// Absorbs `length` zero bytes, as contributed by a pad file.
    pub fn pad(&mut self, mut length: u64) {
        while length > 0 {
            let take = length.min(BLOCK_SIZE as u64) as usize;
            self.update(&ZEROS[..take]);
            length -= take as u64;
        }
    }

    /// Number of whole pieces emitted so far.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Finishes the stream and returns the piece hashes.
    ///
    /// The trailing short piece is hashed as-is. An entirely empty stream
    /// yields a single hash of empty input.
    pub fn finish(mut self) -> Vec<[u8; 20]> {
        if !self.buffer.is_empty() || self.pieces.is_empty() {
            self.emit();
        }
        self.pieces
    }

    fn emit(&mut self) {
        let digest: [u8; 20] = Sha1::digest(&self.buffer).into();
        self.pieces.push(digest);
        self.buffer.clear();
    }
}
