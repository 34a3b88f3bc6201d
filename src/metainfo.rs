//! Torrent metainfo handling (BEP-3, BEP-47, BEP-52)
//!
//! This module turns `.torrent` bytes into a typed, validated model and
//! back, for v1, v2, and hybrid torrents. Unknown keys are preserved so the
//! format can keep evolving underneath us; strict checking is opt-in via
//! [`ParseOptions`].

mod error;
mod file_tree;
mod info;
mod info_hash;
mod torrent;

pub use error::MetainfoError;
pub use file_tree::{FileTree, FileTreeEntry, FlatFile};
pub use info::{
    FileAttrs, FileEntry, GenericFile, InfoData, InfoDict, LayoutFile, ParseOptions, TorrentPath,
    TorrentVersion, V1Info, V1Storage, V2Info,
};
pub use info_hash::{InfoHashV1, InfoHashV2};
pub use torrent::{FilePosition, Metainfo};

#[cfg(test)]
mod tests;
