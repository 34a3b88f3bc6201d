use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::bencode::Value;
use crate::constants::{MIN_PIECE_LENGTH, PAD_DIR, SHA1_LEN};

use super::error::MetainfoError;
use super::file_tree::FileTree;

/// The set of hash schemes a torrent carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TorrentVersion {
    /// BEP-3 only: SHA-1 piece hashes over the file catenation.
    V1,
    /// BEP-52 only: per-file SHA-256 merkle trees.
    V2,
    /// Both schemes in one file, with BEP-47 pad files aligning the v1 view.
    Hybrid,
}

impl TorrentVersion {
    /// Returns `true` if the torrent carries v1 piece hashes.
    pub fn has_v1(&self) -> bool {
        matches!(self, TorrentVersion::V1 | TorrentVersion::Hybrid)
    }

    /// Returns `true` if the torrent carries v2 merkle trees.
    pub fn has_v2(&self) -> bool {
        matches!(self, TorrentVersion::V2 | TorrentVersion::Hybrid)
    }
}

impl fmt::Display for TorrentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TorrentVersion::V1 => "v1",
            TorrentVersion::V2 => "v2",
            TorrentVersion::Hybrid => "hybrid",
        };
        write!(f, "{}", name)
    }
}

/// Options controlling how strictly input is validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Require BEP-47 pad files wherever a v1 piece boundary would otherwise
    /// fall mid-file, and require them to be named `.pad/<length>`.
    pub strict: bool,
    /// Reject unknown keys instead of preserving them.
    pub strict_schema: bool,
}

/// A file path inside a torrent: a non-empty sequence of raw byte
/// components.
///
/// Components are raw byte strings, semantically UTF-8 when possible; the
/// raw form is never discarded. No component may be empty, `.`, `..`, or
/// contain a path separator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TorrentPath(Vec<Bytes>);

impl TorrentPath {
    /// Builds a path from components, rejecting unsafe ones.
    pub fn new(components: Vec<Bytes>) -> Result<Self, MetainfoError> {
        if components.is_empty() {
            return Err(MetainfoError::invalid("path", "empty path"));
        }
        for component in &components {
            validate_component(component)?;
        }
        Ok(TorrentPath(components))
    }

    /// Builds a path from UTF-8 components, rejecting unsafe ones.
    pub fn from_strs<S: AsRef<str>>(components: &[S]) -> Result<Self, MetainfoError> {
        Self::new(
            components
                .iter()
                .map(|c| Bytes::copy_from_slice(c.as_ref().as_bytes()))
                .collect(),
        )
    }

    /// The raw components.
    pub fn components(&self) -> &[Bytes] {
        &self.0
    }

    /// Components that were already validated (file tree keys, `name`).
    pub(crate) fn from_components(components: Vec<Bytes>) -> Self {
        TorrentPath(components)
    }

    /// Returns `true` if the path lives under the `.pad` directory.
    pub fn is_pad_path(&self) -> bool {
        self.0
            .first()
            .is_some_and(|c| c.as_ref() == PAD_DIR.as_bytes())
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::List(self.0.iter().cloned().map(Value::Bytes).collect())
    }
}

impl fmt::Display for TorrentPath {
    /// Joins components with `/`, replacing invalid UTF-8.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", String::from_utf8_lossy(component))?;
        }
        Ok(())
    }
}

pub(crate) fn validate_component(component: &[u8]) -> Result<(), MetainfoError> {
    let bad = component.is_empty()
        || component == b"."
        || component == b".."
        || component.contains(&b'/')
        || component.contains(&b'\\');
    if bad {
        return Err(MetainfoError::UnsafePath(
            String::from_utf8_lossy(component).into_owned(),
        ));
    }
    Ok(())
}

/// BEP-47 file attributes, decoded from the `attr` byte string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttrs {
    /// `p`: a pad file whose bytes are all zeros.
    pub pad: bool,
    /// `x`: executable.
    pub executable: bool,
    /// `h`: hidden.
    pub hidden: bool,
    /// `l`: symlink; the target is in `symlink path`.
    pub symlink: bool,
}

impl FileAttrs {
    /// Parses the attribute characters, ignoring unknown ones.
    pub fn from_bytes(attr: &[u8]) -> Self {
        let mut attrs = FileAttrs::default();
        for b in attr {
            match b {
                b'p' => attrs.pad = true,
                b'x' => attrs.executable = true,
                b'h' => attrs.hidden = true,
                b'l' => attrs.symlink = true,
                _ => {}
            }
        }
        attrs
    }
}

/// One entry of a v1 `files` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the torrent root (the `name` directory).
    pub path: TorrentPath,
    /// File length in bytes.
    pub length: u64,
    /// Raw BEP-47 `attr` string, if present.
    pub attr: Option<Bytes>,
    /// Symlink target components (BEP-47), if this entry is a symlink.
    pub symlink_path: Option<TorrentPath>,
    /// Unknown keys, preserved for re-encoding.
    pub(crate) extra: BTreeMap<Bytes, Value>,
}

impl FileEntry {
    /// Decoded view of the attribute string.
    pub fn attrs(&self) -> FileAttrs {
        self.attr
            .as_deref()
            .map(FileAttrs::from_bytes)
            .unwrap_or_default()
    }

    /// Returns `true` for BEP-47 pad files, recognized by attribute or by
    /// the conventional `.pad/<length>` path.
    pub fn is_pad(&self) -> bool {
        self.attrs().pad || self.path.is_pad_path()
    }

    pub(crate) fn from_value(
        value: &Value,
        opts: &ParseOptions,
    ) -> Result<Self, MetainfoError> {
        let dict = value
            .as_dict()
            .ok_or_else(|| MetainfoError::invalid("files", "entry is not a dictionary"))?;

        let length = dict
            .get(b"length".as_slice())
            .ok_or(MetainfoError::MissingField("files.length"))?
            .as_u64()
            .ok_or_else(|| MetainfoError::invalid("files.length", "not a nonnegative integer"))?;

        let path_list = dict
            .get(b"path".as_slice())
            .ok_or(MetainfoError::MissingField("files.path"))?
            .as_list()
            .ok_or_else(|| MetainfoError::invalid("files.path", "not a list"))?;
        let components = path_list
            .iter()
            .map(|p| {
                p.as_bytes()
                    .cloned()
                    .ok_or_else(|| MetainfoError::invalid("files.path", "component is not a string"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let path = TorrentPath::new(components)?;

        let attr = dict.get(b"attr".as_slice()).and_then(|v| v.as_bytes()).cloned();

        let symlink_path = match dict.get(b"symlink path".as_slice()) {
            None => None,
            Some(v) => {
                let list = v.as_list().ok_or_else(|| {
                    MetainfoError::invalid("files.symlink path", "not a list")
                })?;
                let components = list
                    .iter()
                    .map(|p| {
                        p.as_bytes().cloned().ok_or_else(|| {
                            MetainfoError::invalid("files.symlink path", "component is not a string")
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Some(TorrentPath::new(components)?)
            }
        };

        let mut extra = BTreeMap::new();
        for (key, val) in dict {
            match key.as_ref() {
                b"length" | b"path" | b"attr" | b"symlink path" => {}
                _ => {
                    if opts.strict_schema {
                        return Err(MetainfoError::UnknownKey(
                            String::from_utf8_lossy(key).into_owned(),
                        ));
                    }
                    extra.insert(key.clone(), val.clone());
                }
            }
        }

        Ok(FileEntry {
            path,
            length,
            attr,
            symlink_path,
            extra,
        })
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut dict = self.extra.clone();
        if let Some(attr) = &self.attr {
            dict.insert(Bytes::from_static(b"attr"), Value::Bytes(attr.clone()));
        }
        dict.insert(
            Bytes::from_static(b"length"),
            Value::Integer(self.length as i64),
        );
        dict.insert(Bytes::from_static(b"path"), self.path.to_value());
        if let Some(target) = &self.symlink_path {
            dict.insert(Bytes::from_static(b"symlink path"), target.to_value());
        }
        Value::Dict(dict)
    }
}

/// The two storage shapes of a v1 info dict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum V1Storage {
    /// Single-file form: `length` at the top of the info dict.
    Single {
        /// Length of the single file named by `name`.
        length: u64,
    },
    /// Multi-file form: an ordered `files` list under the `name` directory.
    Multiple {
        /// The ordered file list, pad files included.
        files: Vec<FileEntry>,
    },
}

/// The v1 half of an info dict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V1Info {
    /// SHA-1 hash of each piece of the padded file catenation.
    pub pieces: Vec<[u8; 20]>,
    /// Single- or multi-file layout.
    pub storage: V1Storage,
}

impl V1Info {
    /// Number of piece hashes.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Total bytes in the catenated stream, pad files included.
    pub fn padded_total_length(&self) -> u64 {
        match &self.storage {
            V1Storage::Single { length } => *length,
            V1Storage::Multiple { files } => files.iter().map(|f| f.length).sum(),
        }
    }

    /// Total bytes of real payload, pad files excluded.
    pub fn total_length(&self) -> u64 {
        match &self.storage {
            V1Storage::Single { length } => *length,
            V1Storage::Multiple { files } => files
                .iter()
                .filter(|f| !f.is_pad())
                .map(|f| f.length)
                .sum(),
        }
    }
}

/// The v2 half of an info dict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2Info {
    /// The BEP-52 file tree.
    pub file_tree: FileTree,
}

impl V2Info {
    /// Total bytes across all files in the tree.
    pub fn total_length(&self) -> u64 {
        self.file_tree.flatten().iter().map(|f| f.length).sum()
    }
}

/// Flavor-specific contents of an info dict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoData {
    /// v1-only torrent.
    V1(V1Info),
    /// v2-only torrent.
    V2(V2Info),
    /// Hybrid torrent carrying both views of the same files.
    Hybrid {
        /// The v1 view (pieces plus a pad-filled file list).
        v1: V1Info,
        /// The v2 view (file tree without pads).
        v2: V2Info,
    },
}

impl InfoData {
    /// Which hash schemes are present.
    pub fn version(&self) -> TorrentVersion {
        match self {
            InfoData::V1(_) => TorrentVersion::V1,
            InfoData::V2(_) => TorrentVersion::V2,
            InfoData::Hybrid { .. } => TorrentVersion::Hybrid,
        }
    }

    /// The v1 half, if present.
    pub fn v1(&self) -> Option<&V1Info> {
        match self {
            InfoData::V1(v1) | InfoData::Hybrid { v1, .. } => Some(v1),
            InfoData::V2(_) => None,
        }
    }

    /// The v2 half, if present.
    pub fn v2(&self) -> Option<&V2Info> {
        match self {
            InfoData::V2(v2) | InfoData::Hybrid { v2, .. } => Some(v2),
            InfoData::V1(_) => None,
        }
    }
}

/// A file's place in the v1 catenated stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutFile {
    /// Path relative to the torrent root; `[name]` for single-file torrents.
    pub path: TorrentPath,
    /// Length in bytes.
    pub length: u64,
    /// Whether this entry is a pad file (its bytes are zeros).
    pub pad: bool,
}

/// A flavor-independent view of one real payload file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericFile {
    /// Path relative to the torrent root; `[name]` for single-file torrents.
    pub path: TorrentPath,
    /// Length in bytes.
    pub length: u64,
    /// Decoded BEP-47 attributes.
    pub attrs: FileAttrs,
    /// The file's merkle root, when the torrent carries v2 hashes.
    pub pieces_root: Option<[u8; 32]>,
}

/// The typed info dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoDict {
    /// Suggested root name (file name or directory name), raw bytes.
    pub name: Bytes,
    /// Piece length in bytes; a power of two, at least 16 KiB.
    pub piece_length: u64,
    /// BEP-27 private flag.
    pub private: Option<bool>,
    /// Cross-seeding source tag, if present.
    pub source: Option<Bytes>,
    /// Flavor-specific fields.
    pub data: InfoData,
    /// Unknown keys, preserved for re-encoding.
    pub(crate) extra: BTreeMap<Bytes, Value>,
}

impl InfoDict {
    /// The name as UTF-8, if it decodes.
    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }

    /// The name as UTF-8 with replacement characters.
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    /// Which hash schemes this info dict carries.
    pub fn version(&self) -> TorrentVersion {
        self.data.version()
    }

    /// Total bytes of real payload, pad files excluded.
    pub fn total_length(&self) -> u64 {
        match &self.data {
            InfoData::V1(v1) => v1.total_length(),
            InfoData::V2(v2) | InfoData::Hybrid { v2, .. } => v2.total_length(),
        }
    }

    /// Total bytes of the v1 catenated stream, pad files included.
    ///
    /// Equal to [`total_length`](Self::total_length) for v2-only torrents.
    pub fn padded_total_length(&self) -> u64 {
        match &self.data {
            InfoData::V1(v1) | InfoData::Hybrid { v1, .. } => v1.padded_total_length(),
            InfoData::V2(v2) => v2.total_length(),
        }
    }

    /// The v1 stream layout in catenation order, pad files included.
    ///
    /// Single-file torrents yield one entry whose path is `[name]`.
    /// Returns `None` for v2-only torrents.
    pub fn v1_layout(&self) -> Option<Vec<LayoutFile>> {
        let v1 = self.data.v1()?;
        let layout = match &v1.storage {
            V1Storage::Single { length } => vec![LayoutFile {
                path: TorrentPath(vec![self.name.clone()]),
                length: *length,
                pad: false,
            }],
            V1Storage::Multiple { files } => files
                .iter()
                .map(|f| LayoutFile {
                    path: f.path.clone(),
                    length: f.length,
                    pad: f.is_pad(),
                })
                .collect(),
        };
        Some(layout)
    }

    /// Flavor-independent list of real files, in catenation/tree order.
    pub fn files(&self) -> Vec<GenericFile> {
        match &self.data {
            InfoData::V2(v2) | InfoData::Hybrid { v2, .. } => v2
                .file_tree
                .flatten()
                .into_iter()
                .filter(|f| !f.attrs().pad)
                .map(|f| GenericFile {
                    attrs: f.attrs(),
                    path: f.path,
                    length: f.length,
                    pieces_root: f.pieces_root,
                })
                .collect(),
            InfoData::V1(v1) => match &v1.storage {
                V1Storage::Single { length } => vec![GenericFile {
                    path: TorrentPath(vec![self.name.clone()]),
                    length: *length,
                    attrs: FileAttrs::default(),
                    pieces_root: None,
                }],
                V1Storage::Multiple { files } => files
                    .iter()
                    .filter(|f| !f.is_pad())
                    .map(|f| GenericFile {
                        path: f.path.clone(),
                        length: f.length,
                        attrs: f.attrs(),
                        pieces_root: None,
                    })
                    .collect(),
            },
        }
    }

    /// Number of real files.
    pub fn file_count(&self) -> usize {
        self.files().len()
    }

    pub(crate) fn from_value(value: &Value, opts: &ParseOptions) -> Result<Self, MetainfoError> {
        let dict = value
            .as_dict()
            .ok_or_else(|| MetainfoError::invalid("info", "not a dictionary"))?;

        let name = dict
            .get(b"name".as_slice())
            .ok_or(MetainfoError::MissingField("info.name"))?
            .as_bytes()
            .cloned()
            .ok_or_else(|| MetainfoError::invalid("info.name", "not a string"))?;

        let piece_length = dict
            .get(b"piece length".as_slice())
            .ok_or(MetainfoError::MissingField("info.piece length"))?
            .as_u64()
            .ok_or_else(|| {
                MetainfoError::invalid("info.piece length", "not a nonnegative integer")
            })?;
        if piece_length < MIN_PIECE_LENGTH || !piece_length.is_power_of_two() {
            return Err(MetainfoError::invalid(
                "info.piece length",
                format!("{} is not a power of two >= 16384", piece_length),
            ));
        }

        let private = match dict.get(b"private".as_slice()) {
            None => None,
            Some(v) => Some(
                v.as_integer()
                    .map(|i| i == 1)
                    .ok_or_else(|| MetainfoError::invalid("info.private", "not an integer"))?,
            ),
        };

        let source = dict
            .get(b"source".as_slice())
            .and_then(|v| v.as_bytes())
            .cloned();

        let meta_version = match dict.get(b"meta version".as_slice()) {
            None => None,
            Some(v) => Some(v.as_integer().ok_or_else(|| {
                MetainfoError::invalid("info.meta version", "not an integer")
            })?),
        };
        if let Some(mv) = meta_version {
            if mv != 2 {
                return Err(MetainfoError::invalid(
                    "info.meta version",
                    format!("unsupported meta version {}", mv),
                ));
            }
        }

        let v1 = Self::parse_v1(dict, opts)?;
        let v2 = Self::parse_v2(dict, meta_version, opts)?;

        let data = match (v1, v2) {
            (Some(v1), Some(v2)) => InfoData::Hybrid { v1, v2 },
            (Some(v1), None) => InfoData::V1(v1),
            (None, Some(v2)) => InfoData::V2(v2),
            (None, None) => return Err(MetainfoError::MissingField("info.pieces or file tree")),
        };

        let mut extra = BTreeMap::new();
        for (key, val) in dict {
            match key.as_ref() {
                b"name" | b"piece length" | b"private" | b"source" | b"meta version"
                | b"pieces" | b"length" | b"files" | b"file tree" => {}
                _ => {
                    if opts.strict_schema {
                        return Err(MetainfoError::UnknownKey(
                            String::from_utf8_lossy(key).into_owned(),
                        ));
                    }
                    extra.insert(key.clone(), val.clone());
                }
            }
        }

        Ok(InfoDict {
            name,
            piece_length,
            private,
            source,
            data,
            extra,
        })
    }

    fn parse_v1(
        dict: &BTreeMap<Bytes, Value>,
        opts: &ParseOptions,
    ) -> Result<Option<V1Info>, MetainfoError> {
        let pieces_bytes = match dict.get(b"pieces".as_slice()) {
            None => return Ok(None),
            Some(v) => v
                .as_bytes()
                .ok_or_else(|| MetainfoError::invalid("info.pieces", "not a string"))?,
        };
        if pieces_bytes.len() % SHA1_LEN != 0 {
            return Err(MetainfoError::invalid(
                "info.pieces",
                format!("length {} is not a multiple of 20", pieces_bytes.len()),
            ));
        }
        let pieces: Vec<[u8; 20]> = pieces_bytes
            .chunks_exact(SHA1_LEN)
            .map(|chunk| {
                let mut arr = [0u8; 20];
                arr.copy_from_slice(chunk);
                arr
            })
            .collect();

        let length = match dict.get(b"length".as_slice()) {
            None => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                MetainfoError::invalid("info.length", "not a nonnegative integer")
            })?),
        };
        let files = match dict.get(b"files".as_slice()) {
            None => None,
            Some(v) => {
                let list = v
                    .as_list()
                    .ok_or_else(|| MetainfoError::invalid("info.files", "not a list"))?;
                if list.is_empty() {
                    return Err(MetainfoError::invalid("info.files", "empty file list"));
                }
                Some(
                    list.iter()
                        .map(|f| FileEntry::from_value(f, opts))
                        .collect::<Result<Vec<_>, _>>()?,
                )
            }
        };

        let storage = match (length, files) {
            (Some(length), None) => V1Storage::Single { length },
            (None, Some(files)) => V1Storage::Multiple { files },
            _ => {
                return Err(MetainfoError::invalid(
                    "info",
                    "exactly one of `length` and `files` must be present",
                ))
            }
        };

        Ok(Some(V1Info { pieces, storage }))
    }

    fn parse_v2(
        dict: &BTreeMap<Bytes, Value>,
        meta_version: Option<i64>,
        opts: &ParseOptions,
    ) -> Result<Option<V2Info>, MetainfoError> {
        let tree_value = dict.get(b"file tree".as_slice());
        match (meta_version, tree_value) {
            (None, None) => Ok(None),
            (Some(_), None) => Err(MetainfoError::MissingField("info.file tree")),
            (None, Some(_)) => Err(MetainfoError::MissingField("info.meta version")),
            (Some(_), Some(tree)) => Ok(Some(V2Info {
                file_tree: FileTree::from_value(tree, opts)?,
            })),
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut dict = self.extra.clone();
        dict.insert(Bytes::from_static(b"name"), Value::Bytes(self.name.clone()));
        dict.insert(
            Bytes::from_static(b"piece length"),
            Value::Integer(self.piece_length as i64),
        );
        if let Some(private) = self.private {
            dict.insert(
                Bytes::from_static(b"private"),
                Value::Integer(i64::from(private)),
            );
        }
        if let Some(source) = &self.source {
            dict.insert(Bytes::from_static(b"source"), Value::Bytes(source.clone()));
        }
        if let Some(v1) = self.data.v1() {
            let pieces: Vec<u8> = v1.pieces.iter().flatten().copied().collect();
            dict.insert(Bytes::from_static(b"pieces"), Value::from(pieces));
            match &v1.storage {
                V1Storage::Single { length } => {
                    dict.insert(
                        Bytes::from_static(b"length"),
                        Value::Integer(*length as i64),
                    );
                }
                V1Storage::Multiple { files } => {
                    dict.insert(
                        Bytes::from_static(b"files"),
                        Value::List(files.iter().map(FileEntry::to_value).collect()),
                    );
                }
            }
        }
        if let Some(v2) = self.data.v2() {
            dict.insert(Bytes::from_static(b"meta version"), Value::Integer(2));
            dict.insert(Bytes::from_static(b"file tree"), v2.file_tree.to_value());
        }
        Value::Dict(dict)
    }
}
