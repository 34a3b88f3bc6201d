//! Torrent creation: binding a file tree and parameters into a model.
//!
//! [`TorrentCreate`] enumerates files deterministically, drives the hasher
//! for the chosen flavor, assembles the info dictionary, and re-parses the
//! result so created torrents pass through exactly the same validation as
//! parsed ones.
//!
//! # Examples
//!
//! ```no_run
//! use btmeta::create::TorrentCreate;
//! use btmeta::metainfo::TorrentVersion;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let torrent = TorrentCreate::new("path/to/data")
//!     .version(TorrentVersion::Hybrid)
//!     .piece_length(262_144)
//!     .tracker("http://tracker.example.com/announce")
//!     .comment("nightly build")
//!     .generate()?;
//!
//! torrent.write("data.torrent")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::debug;
use walkdir::WalkDir;

use crate::bencode::{encode, Value};
use crate::constants::{
    DEFAULT_CREATED_BY, DEFAULT_PIECE_LENGTH, EXCLUDE_FILES, MIN_PIECE_LENGTH, PAD_DIR,
};
use crate::hasher::{CancelToken, FileHashes, Hasher, StreamItem};
use crate::metainfo::{
    FileEntry, FileTree, FileTreeEntry, InfoData, InfoDict, Metainfo, MetainfoError, TorrentPath,
    TorrentVersion, V1Info, V1Storage, V2Info,
};

struct SourceFile {
    /// Path components relative to the torrent root.
    components: Vec<String>,
    /// Absolute location on disk.
    disk_path: PathBuf,
    /// Length from the enumeration stat; hashing re-checks it.
    length: u64,
}

/// Builder that assembles a torrent from a file or directory on disk.
#[derive(Debug)]
pub struct TorrentCreate {
    root: PathBuf,
    version: TorrentVersion,
    piece_length: u64,
    name: Option<String>,
    trackers: Vec<Vec<String>>,
    comment: Option<String>,
    created_by: Option<String>,
    creation_date: Option<i64>,
    web_seeds: Vec<String>,
    private: bool,
    pad_files: bool,
    workers: usize,
    cancel: CancelToken,
}

impl TorrentCreate {
    /// Creates a builder rooted at a file or directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            version: TorrentVersion::V1,
            piece_length: DEFAULT_PIECE_LENGTH,
            name: None,
            trackers: Vec::new(),
            comment: None,
            created_by: Some(DEFAULT_CREATED_BY.to_string()),
            creation_date: None,
            web_seeds: Vec::new(),
            private: false,
            pad_files: false,
            workers: 1,
            cancel: CancelToken::new(),
        }
    }

    /// Sets the flavor to produce (v1 by default).
    pub fn version(mut self, version: TorrentVersion) -> Self {
        self.version = version;
        self
    }

    /// Sets the piece length; must be a power of two of at least 16 KiB.
    pub fn piece_length(mut self, piece_length: u64) -> Self {
        self.piece_length = piece_length;
        self
    }

    /// Overrides the torrent name (defaults to the root's file name).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a tracker as its own tier.
    pub fn tracker(mut self, url: impl Into<String>) -> Self {
        self.trackers.push(vec![url.into()]);
        self
    }

    /// Adds a tier of equivalent trackers (BEP-12).
    pub fn tracker_tier(mut self, urls: Vec<String>) -> Self {
        self.trackers.push(urls);
        self
    }

    /// Sets the comment field.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Overrides the `created by` string.
    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Sets the creation date (Unix timestamp; defaults to now).
    pub fn creation_date(mut self, timestamp: i64) -> Self {
        self.creation_date = Some(timestamp);
        self
    }

    /// Adds a web seed URL (BEP-19).
    pub fn web_seed(mut self, url: impl Into<String>) -> Self {
        self.web_seeds.push(url.into());
        self
    }

    /// Marks the torrent private (BEP-27).
    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Inserts BEP-47 pad files between files of v1 torrents so every file
    /// starts on a piece boundary. Hybrid torrents always pad; v2 never
    /// does.
    pub fn pad_files(mut self, pad: bool) -> Self {
        self.pad_files = pad;
        self
    }

    /// Sets the hashing worker count (1 = serial, the default).
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Installs a cancellation token for the hashing phase.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Enumerates, hashes, and assembles the torrent.
    ///
    /// # Errors
    ///
    /// Fails before hashing if the piece length is invalid, the tree is
    /// empty, or any path component is unsafe or not UTF-8; during hashing
    /// on I/O errors or cancellation; and afterwards if the assembled
    /// torrent does not validate (which would be a bug, not an input
    /// problem).
    pub fn generate(self) -> Result<Metainfo, MetainfoError> {
        if self.piece_length < MIN_PIECE_LENGTH || !self.piece_length.is_power_of_two() {
            return Err(MetainfoError::invalid(
                "piece length",
                format!("{} is not a power of two >= 16384", self.piece_length),
            ));
        }

        let single_file = self.root.is_file();
        let name = match &self.name {
            Some(name) => name.clone(),
            None => self
                .root
                .file_name()
                .and_then(|n| n.to_str())
                .map(String::from)
                .ok_or_else(|| {
                    MetainfoError::invalid("name", "cannot infer a name from the root path")
                })?,
        };
        TorrentPath::from_strs(&[name.as_str()])?;

        let files = if single_file {
            let length = std::fs::metadata(&self.root)?.len();
            vec![SourceFile {
                components: vec![name.clone()],
                disk_path: self.root.clone(),
                length,
            }]
        } else {
            self.enumerate()?
        };
        if files.is_empty() {
            return Err(MetainfoError::MissingField("files"));
        }
        debug!(files = files.len(), "enumerated source files");

        // Pad lengths, aligned with `files`: pads[i] follows files[i].
        // No pad after the last file.
        let with_pads = match self.version {
            TorrentVersion::Hybrid => true,
            TorrentVersion::V1 => self.pad_files,
            TorrentVersion::V2 => false,
        };
        let pads: Vec<Option<u64>> = files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let remainder = file.length % self.piece_length;
                (with_pads && i + 1 != files.len() && remainder != 0)
                    .then(|| self.piece_length - remainder)
            })
            .collect();

        let mut items = Vec::new();
        for (file, pad) in files.iter().zip(&pads) {
            items.push(StreamItem::File {
                path: file.disk_path.clone(),
                length: file.length,
            });
            if let Some(pad_length) = pad {
                items.push(StreamItem::Pad {
                    length: *pad_length,
                });
            }
        }

        let output = Hasher::new(self.piece_length, self.version)
            .workers(self.workers)
            .cancel_token(self.cancel.clone())
            .run(&items)?;

        let info = self.build_info(&name, single_file, &files, &pads, &output)?;
        let root = self.build_outer(info, &output)?;
        let bytes = encode(&root);
        Metainfo::from_bytes(&bytes)
    }

    /// Walks the root directory depth-first with per-directory byte-order
    /// sorting, which yields paths in lexicographic component order.
    fn enumerate(&self) -> Result<Vec<SourceFile>, MetainfoError> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter();
        for entry in walker {
            let entry = entry.map_err(|e| match e.into_io_error() {
                Some(io) => MetainfoError::Io(io),
                None => MetainfoError::invalid("files", "filesystem loop under root"),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_str().ok_or_else(|| {
                MetainfoError::invalid("files", "file name is not valid UTF-8")
            })?;
            if EXCLUDE_FILES.contains(&file_name) {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|_| MetainfoError::invalid("files", "entry escapes the root"))?;
            let components = relative
                .iter()
                .map(|c| {
                    c.to_str().map(String::from).ok_or_else(|| {
                        MetainfoError::invalid("files", "path component is not valid UTF-8")
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            TorrentPath::from_strs(&components)?;

            let metadata = entry.metadata().map_err(|e| match e.into_io_error() {
                Some(io) => MetainfoError::Io(io),
                None => MetainfoError::invalid("files", "unreadable metadata"),
            })?;
            files.push(SourceFile {
                components,
                disk_path: entry.path().to_path_buf(),
                length: metadata.len(),
            });
        }
        files.sort_by(|a, b| a.components.cmp(&b.components));
        Ok(files)
    }

    /// Builds the typed info dict and serializes it through the model, so
    /// created torrents use exactly the representation the parser produces.
    fn build_info(
        &self,
        name: &str,
        single_file: bool,
        files: &[SourceFile],
        pads: &[Option<u64>],
        output: &crate::hasher::HashOutput,
    ) -> Result<Value, MetainfoError> {
        let v1 = if self.version.has_v1() {
            let storage = if single_file {
                V1Storage::Single {
                    length: files[0].length,
                }
            } else {
                let mut list = Vec::new();
                for (file, pad) in files.iter().zip(pads) {
                    list.push(FileEntry {
                        path: TorrentPath::from_strs(&file.components)?,
                        length: file.length,
                        attr: None,
                        symlink_path: None,
                        extra: BTreeMap::new(),
                    });
                    if let Some(pad_length) = pad {
                        list.push(FileEntry {
                            path: TorrentPath::from_strs(&[
                                PAD_DIR.to_string(),
                                pad_length.to_string(),
                            ])?,
                            length: *pad_length,
                            attr: Some(Bytes::from_static(b"p")),
                            symlink_path: None,
                            extra: BTreeMap::new(),
                        });
                    }
                }
                V1Storage::Multiple { files: list }
            };
            Some(V1Info {
                pieces: output.v1_pieces.clone(),
                storage,
            })
        } else {
            None
        };

        let v2 = if self.version.has_v2() {
            let mut tree = BTreeMap::new();
            for (file, hashes) in files.iter().zip(&output.files) {
                let entry = FileTreeEntry {
                    length: hashes.length,
                    pieces_root: hashes.pieces_root,
                    attr: None,
                    extra: BTreeMap::new(),
                };
                insert_tree_file(&mut tree, &file.components, entry)?;
            }
            Some(V2Info {
                file_tree: FileTree::Directory(tree),
            })
        } else {
            None
        };

        let data = match (v1, v2) {
            (Some(v1), Some(v2)) => InfoData::Hybrid { v1, v2 },
            (Some(v1), None) => InfoData::V1(v1),
            (None, Some(v2)) => InfoData::V2(v2),
            (None, None) => {
                return Err(MetainfoError::invalid("version", "no hash scheme selected"))
            }
        };

        let info = InfoDict {
            name: Bytes::copy_from_slice(name.as_bytes()),
            piece_length: self.piece_length,
            private: self.private.then_some(true),
            source: None,
            data,
            extra: BTreeMap::new(),
        };
        Ok(info.to_value())
    }

    fn build_outer(
        &self,
        info: Value,
        output: &crate::hasher::HashOutput,
    ) -> Result<Value, MetainfoError> {
        let mut root = BTreeMap::new();
        root.insert(Bytes::from_static(b"info"), info);

        let flat: Vec<&String> = self.trackers.iter().flatten().collect();
        if let Some(first) = flat.first() {
            root.insert(
                Bytes::from_static(b"announce"),
                Value::from((*first).clone()),
            );
        }
        if flat.len() > 1 {
            let tiers = Value::List(
                self.trackers
                    .iter()
                    .map(|tier| {
                        Value::List(tier.iter().map(|url| Value::from(url.clone())).collect())
                    })
                    .collect(),
            );
            root.insert(Bytes::from_static(b"announce-list"), tiers);
        }

        if let Some(comment) = &self.comment {
            root.insert(Bytes::from_static(b"comment"), Value::from(comment.clone()));
        }
        if let Some(created_by) = &self.created_by {
            root.insert(
                Bytes::from_static(b"created by"),
                Value::from(created_by.clone()),
            );
        }
        let timestamp = match self.creation_date {
            Some(timestamp) => timestamp,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
        };
        root.insert(
            Bytes::from_static(b"creation date"),
            Value::Integer(timestamp),
        );

        match self.web_seeds.as_slice() {
            [] => {}
            [single] => {
                root.insert(Bytes::from_static(b"url-list"), Value::from(single.clone()));
            }
            many => {
                root.insert(
                    Bytes::from_static(b"url-list"),
                    Value::List(many.iter().map(|url| Value::from(url.clone())).collect()),
                );
            }
        }

        if self.version.has_v2() {
            let layers: BTreeMap<Bytes, Value> = output
                .files
                .iter()
                .filter(|f| !f.piece_layer.is_empty())
                .map(layer_entry)
                .collect();
            if !layers.is_empty() {
                root.insert(Bytes::from_static(b"piece layers"), Value::Dict(layers));
            }
        }

        Ok(Value::Dict(root))
    }
}

fn layer_entry(hashes: &FileHashes) -> (Bytes, Value) {
    let root = hashes.pieces_root.unwrap_or_default();
    let concatenated: Vec<u8> = hashes.piece_layer.iter().flatten().copied().collect();
    (Bytes::copy_from_slice(&root), Value::from(concatenated))
}

fn insert_tree_file(
    tree: &mut BTreeMap<Bytes, FileTree>,
    components: &[String],
    entry: FileTreeEntry,
) -> Result<(), MetainfoError> {
    match components {
        [] => Err(MetainfoError::invalid("file tree", "empty path")),
        [last] => {
            tree.insert(Bytes::copy_from_slice(last.as_bytes()), FileTree::File(entry));
            Ok(())
        }
        [first, rest @ ..] => {
            let node = tree
                .entry(Bytes::copy_from_slice(first.as_bytes()))
                .or_insert_with(|| FileTree::Directory(BTreeMap::new()));
            match node {
                FileTree::Directory(children) => insert_tree_file(children, rest, entry),
                FileTree::File(_) => Err(MetainfoError::invalid("file tree", "path conflict")),
            }
        }
    }
}
