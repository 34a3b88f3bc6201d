//! btmeta - BitTorrent metainfo library
//!
//! A pure data/codec engine for `.torrent` files across all three wire
//! variants: v1 (BEP-3), v2 (BEP-52), and hybrid. It parses bytes into a
//! typed, validated model, serializes models back to canonical bytes,
//! computes piece hashes from file content, and answers which source-file
//! byte ranges back a given piece. It never speaks to the network and never
//! writes payload data.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 bencode encoding/decoding with canonical ordering
//! - [`metainfo`] - The typed v1/v2/hybrid metainfo model and its invariants
//! - [`hasher`] - SHA-1 piece hashing and SHA-256 merkle trees, serial or
//!   pooled
//! - [`piece_range`] - Piece-to-byte-range location and data validation
//! - [`create`] - Building torrents from a directory tree
//! - [`constants`] - Sizes and defaults shared by all of the above
//!
//! # Examples
//!
//! ```no_run
//! use btmeta::Metainfo;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let torrent = Metainfo::read_path("debian.torrent")?;
//! println!("{} ({} bytes)", torrent.info.name_lossy(), torrent.info.total_length());
//! # Ok(())
//! # }
//! ```

pub mod bencode;
pub mod constants;
pub mod create;
pub mod hasher;
pub mod metainfo;
pub mod piece_range;

pub use bencode::{decode, encode, BencodeError, Value};
pub use create::TorrentCreate;
pub use hasher::{CancelToken, Hasher};
pub use metainfo::{
    FileAttrs, FileEntry, InfoDict, InfoHashV1, InfoHashV2, Metainfo, MetainfoError, ParseOptions,
    TorrentPath, TorrentVersion,
};
pub use piece_range::{FileSlice, V1PieceRange, V2PieceRange};
