use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::constants::{BLOCK_SIZE, READ_BUFFER_SIZE};
use crate::metainfo::{MetainfoError, TorrentVersion};

use super::merkle::{assemble_file_hashes, hash_block, FileHashes, FileTreeHasher};
use super::piece::PieceHasher;

/// Cooperative cancellation flag for a hashing run.
///
/// Cloning shares the flag. The hasher checks it at least once per block;
/// a cancelled run returns [`MetainfoError::Cancelled`] and produces no
/// partial output.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Workers finish their current block and exit.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One element of the catenated hashing stream, in torrent order.
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// A real file on disk.
    File {
        /// Where to read it from.
        path: PathBuf,
        /// Its length as previously stat'd; a mismatch aborts hashing.
        length: u64,
    },
    /// A pad file: `length` zero bytes feeding only the v1 stream.
    Pad {
        /// Pad length in bytes.
        length: u64,
    },
}

/// Everything a hashing run produces.
#[derive(Debug, Clone)]
pub struct HashOutput {
    /// v1 piece hashes in catenation order; empty for v2-only runs.
    pub v1_pieces: Vec<[u8; 20]>,
    /// Per-file v2 hashes, one entry per real file in stream order; empty
    /// for v1-only runs.
    pub files: Vec<FileHashes>,
}

/// Hashing jobs handed to workers. Workers are stateless; ordering is
/// restored from the indices when results are collected.
enum Job {
    V1Piece { index: usize, data: Vec<u8> },
    V2Block { file: usize, index: usize, data: Vec<u8> },
}

#[derive(Default)]
struct JobResults {
    v1: BTreeMap<usize, [u8; 20]>,
    v2: BTreeMap<(usize, usize), [u8; 32]>,
}

struct DispatchSummary {
    v1_pieces: usize,
    /// `(length, block count)` per real file, in stream order.
    file_blocks: Vec<(u64, usize)>,
}

/// Drives piece and merkle hashing over a stream of files and pads.
///
/// With `workers == 1` everything runs inline in the calling thread. With
/// more, reads stay in the calling thread and digests are computed by a
/// worker pool fed through a bounded queue, so memory stays proportional to
/// the worker count.
///
/// # Examples
///
/// ```no_run
/// use btmeta::hasher::{Hasher, StreamItem};
/// use btmeta::metainfo::TorrentVersion;
///
/// # fn main() -> Result<(), btmeta::metainfo::MetainfoError> {
/// let items = vec![StreamItem::File {
///     path: "data.bin".into(),
///     length: 1_048_576,
/// }];
/// let output = Hasher::new(262_144, TorrentVersion::V2)
///     .workers(4)
///     .run(&items)?;
/// assert_eq!(output.files.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Hasher {
    piece_length: u64,
    version: TorrentVersion,
    workers: usize,
    cancel: CancelToken,
}

impl Hasher {
    /// Creates a serial hasher for the given piece length and flavor.
    pub fn new(piece_length: u64, version: TorrentVersion) -> Self {
        Self {
            piece_length,
            version,
            workers: 1,
            cancel: CancelToken::new(),
        }
    }

    /// Sets the worker count. `1` (the default) means fully serial.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Installs a cancellation token shared with the caller.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Hashes the stream and returns piece hashes and per-file trees.
    ///
    /// # Errors
    ///
    /// Fails on the first I/O error, on a file whose size changed since it
    /// was stat'd, or with [`MetainfoError::Cancelled`] if the token fired.
    pub fn run(&self, items: &[StreamItem]) -> Result<HashOutput, MetainfoError> {
        if self.workers <= 1 {
            self.run_serial(items)
        } else {
            self.run_parallel(items)
        }
    }

    fn run_serial(&self, items: &[StreamItem]) -> Result<HashOutput, MetainfoError> {
        let mut v1 = self
            .version
            .has_v1()
            .then(|| PieceHasher::new(self.piece_length));
        let mut files = Vec::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        for item in items {
            match item {
                StreamItem::Pad { length } => {
                    if let Some(v1) = &mut v1 {
                        v1.pad(*length);
                    }
                }
                StreamItem::File { path, length } => {
                    let mut tree = self
                        .version
                        .has_v2()
                        .then(|| FileTreeHasher::new(self.piece_length));
                    let mut file = File::open(path)?;
                    let mut seen = 0u64;
                    loop {
                        let n = file.read(&mut buf)?;
                        if n == 0 {
                            break;
                        }
                        seen += n as u64;
                        for block in buf[..n].chunks(BLOCK_SIZE) {
                            if self.cancel.is_cancelled() {
                                return Err(MetainfoError::Cancelled);
                            }
                            if let Some(v1) = &mut v1 {
                                v1.update(block);
                            }
                            if let Some(tree) = &mut tree {
                                tree.update(block);
                            }
                        }
                    }
                    check_length(path, seen, *length)?;
                    if let Some(tree) = tree {
                        files.push(tree.finish());
                    }
                }
            }
        }

        Ok(HashOutput {
            v1_pieces: v1.map(PieceHasher::finish).unwrap_or_default(),
            files,
        })
    }

    fn run_parallel(&self, items: &[StreamItem]) -> Result<HashOutput, MetainfoError> {
        debug!(workers = self.workers, "hashing with worker pool");
        let results = Mutex::new(JobResults::default());

        let summary = thread::scope(|scope| {
            // Bounded queue: the dispatcher blocks once workers fall
            // behind, which caps in-flight buffers.
            let (tx, rx) = bounded::<Job>(self.workers * 2);
            for _ in 0..self.workers {
                let rx: Receiver<Job> = rx.clone();
                let results = &results;
                let cancel = self.cancel.clone();
                scope.spawn(move || {
                    for job in rx.iter() {
                        if cancel.is_cancelled() {
                            continue;
                        }
                        match job {
                            Job::V1Piece { index, data } => {
                                let digest: [u8; 20] = Sha1::digest(&data).into();
                                results.lock().v1.insert(index, digest);
                            }
                            Job::V2Block { file, index, data } => {
                                let digest = hash_block(&data);
                                results.lock().v2.insert((file, index), digest);
                            }
                        }
                    }
                });
            }
            drop(rx);
            self.dispatch(items, &tx)
        })?;

        // A token that fired after the last dispatcher check may have made
        // workers drop jobs on the floor; treat that as cancelled too.
        if self.cancel.is_cancelled() {
            return Err(MetainfoError::Cancelled);
        }

        let results = results.into_inner();
        if results.v1.len() != summary.v1_pieces {
            return Err(MetainfoError::Cancelled);
        }
        let v1_pieces: Vec<[u8; 20]> = results.v1.into_values().collect();

        let mut files = Vec::with_capacity(summary.file_blocks.len());
        for (file_index, (length, blocks)) in summary.file_blocks.iter().enumerate() {
            let leaves: Vec<[u8; 32]> = results
                .v2
                .range((file_index, 0)..(file_index + 1, 0))
                .map(|(_, digest)| *digest)
                .collect();
            if leaves.len() != *blocks {
                return Err(MetainfoError::Cancelled);
            }
            files.push(assemble_file_hashes(*length, self.piece_length, leaves));
        }

        Ok(HashOutput { v1_pieces, files })
    }

    /// Reads the stream and enqueues fixed-size hash jobs. Runs in the
    /// calling thread; all blocking I/O happens here, never in workers.
    fn dispatch(
        &self,
        items: &[StreamItem],
        tx: &Sender<Job>,
    ) -> Result<DispatchSummary, MetainfoError> {
        let piece_length = self.piece_length as usize;
        let has_v1 = self.version.has_v1();
        let has_v2 = self.version.has_v2();

        let mut piece_buf = Vec::with_capacity(if has_v1 { piece_length } else { 0 });
        let mut v1_pieces = 0usize;
        let mut file_blocks = Vec::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let mut submit_piece = |data: Vec<u8>, count: &mut usize| {
            let job = Job::V1Piece {
                index: *count,
                data,
            };
            *count += 1;
            // Send only fails when all workers are gone, which cannot
            // happen while the scope is alive.
            let _ = tx.send(job);
        };

        for item in items {
            let (path, length) = match item {
                StreamItem::Pad { length } => {
                    if has_v1 {
                        let mut remaining = *length as usize;
                        while remaining > 0 {
                            let take = remaining.min(piece_length - piece_buf.len());
                            piece_buf.resize(piece_buf.len() + take, 0);
                            remaining -= take;
                            if piece_buf.len() == piece_length {
                                submit_piece(std::mem::take(&mut piece_buf), &mut v1_pieces);
                            }
                        }
                    }
                    continue;
                }
                StreamItem::File { path, length } => (path, length),
            };

            let file_index = file_blocks.len();
            let mut block_index = 0usize;
            let mut block_buf: Vec<u8> = Vec::with_capacity(BLOCK_SIZE);
            let mut file = File::open(path)?;
            let mut seen = 0u64;

            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                seen += n as u64;
                let mut data = &buf[..n];
                while !data.is_empty() {
                    if self.cancel.is_cancelled() {
                        return Err(MetainfoError::Cancelled);
                    }
                    let take = (BLOCK_SIZE - block_buf.len()).min(data.len());
                    block_buf.extend_from_slice(&data[..take]);
                    data = &data[take..];

                    if has_v1 {
                        let mut chunk = &block_buf[block_buf.len() - take..];
                        while !chunk.is_empty() {
                            let fit = (piece_length - piece_buf.len()).min(chunk.len());
                            piece_buf.extend_from_slice(&chunk[..fit]);
                            chunk = &chunk[fit..];
                            if piece_buf.len() == piece_length {
                                submit_piece(std::mem::take(&mut piece_buf), &mut v1_pieces);
                            }
                        }
                    }
                    if block_buf.len() == BLOCK_SIZE {
                        if has_v2 {
                            let _ = tx.send(Job::V2Block {
                                file: file_index,
                                index: block_index,
                                data: std::mem::take(&mut block_buf),
                            });
                            block_index += 1;
                        } else {
                            block_buf.clear();
                        }
                    }
                }
            }
            check_length(path, seen, *length)?;

            if has_v2 {
                if !block_buf.is_empty() {
                    let _ = tx.send(Job::V2Block {
                        file: file_index,
                        index: block_index,
                        data: block_buf,
                    });
                    block_index += 1;
                }
                file_blocks.push((*length, block_index));
            }
        }

        if has_v1 && (!piece_buf.is_empty() || v1_pieces == 0) {
            submit_piece(std::mem::take(&mut piece_buf), &mut v1_pieces);
        }

        Ok(DispatchSummary {
            v1_pieces: if has_v1 { v1_pieces } else { 0 },
            file_blocks,
        })
    }
}

fn check_length(path: &std::path::Path, seen: u64, expected: u64) -> Result<(), MetainfoError> {
    if seen != expected {
        return Err(MetainfoError::Invariant(format!(
            "file {} is {} bytes, expected {}",
            path.display(),
            seen,
            expected
        )));
    }
    Ok(())
}
