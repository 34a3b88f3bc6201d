//! BitTorrent v2 file tree structure (BEP-52).

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::bencode::Value;
use crate::constants::SHA256_LEN;

use super::error::MetainfoError;
use super::info::{validate_component, FileAttrs, ParseOptions, TorrentPath};

/// A file leaf in a v2 file tree: the dictionary under the empty-string
/// sentinel key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTreeEntry {
    /// The length of the file in bytes.
    pub length: u64,
    /// The SHA-256 merkle root of the file's padded block leaves.
    /// Absent exactly when the file is empty.
    pub pieces_root: Option<[u8; 32]>,
    /// Raw BEP-47 `attr` string, if present.
    pub attr: Option<Bytes>,
    /// Unknown keys, preserved for re-encoding.
    pub(crate) extra: BTreeMap<Bytes, Value>,
}

impl FileTreeEntry {
    /// Decoded view of the attribute string.
    pub fn attrs(&self) -> FileAttrs {
        self.attr
            .as_deref()
            .map(FileAttrs::from_bytes)
            .unwrap_or_default()
    }
}

/// Hierarchical file structure of a v2 torrent (BEP-52).
///
/// Directories are nested dictionaries keyed by path component; a file is a
/// dictionary holding only the empty-string key with the file description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTree {
    /// A file node.
    File(FileTreeEntry),
    /// A directory node containing child entries.
    Directory(BTreeMap<Bytes, FileTree>),
}

/// A file from a flattened file tree, with its full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatFile {
    /// Full path relative to the torrent root.
    pub path: TorrentPath,
    /// File length in bytes.
    pub length: u64,
    /// Merkle root, absent for empty files.
    pub pieces_root: Option<[u8; 32]>,
    /// Raw BEP-47 `attr` string, if present.
    pub attr: Option<Bytes>,
}

impl FlatFile {
    /// Decoded view of the attribute string.
    pub fn attrs(&self) -> FileAttrs {
        self.attr
            .as_deref()
            .map(FileAttrs::from_bytes)
            .unwrap_or_default()
    }
}

impl FileTree {
    /// Parses the `file tree` dictionary of a v2 info dict.
    pub(crate) fn from_value(value: &Value, opts: &ParseOptions) -> Result<Self, MetainfoError> {
        parse_node(value, opts, true)
    }

    /// Flattens the tree into files with full paths, in tree (lexicographic)
    /// order.
    pub fn flatten(&self) -> Vec<FlatFile> {
        let mut files = Vec::new();
        flatten_node(self, &mut Vec::new(), &mut files);
        files
    }

    /// Looks up a file leaf by its path components.
    pub fn get(&self, path: &TorrentPath) -> Option<&FileTreeEntry> {
        let mut node = self;
        for component in path.components() {
            match node {
                FileTree::Directory(children) => {
                    node = children.get(component.as_ref())?;
                }
                FileTree::File(_) => return None,
            }
        }
        match node {
            FileTree::File(entry) => Some(entry),
            FileTree::Directory(_) => None,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            FileTree::File(entry) => {
                let mut props = entry.extra.clone();
                if let Some(attr) = &entry.attr {
                    props.insert(Bytes::from_static(b"attr"), Value::Bytes(attr.clone()));
                }
                props.insert(
                    Bytes::from_static(b"length"),
                    Value::Integer(entry.length as i64),
                );
                if let Some(root) = &entry.pieces_root {
                    props.insert(
                        Bytes::from_static(b"pieces root"),
                        Value::from(root.to_vec()),
                    );
                }
                let mut node = BTreeMap::new();
                node.insert(Bytes::from_static(b""), Value::Dict(props));
                Value::Dict(node)
            }
            FileTree::Directory(children) => Value::Dict(
                children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.to_value()))
                    .collect(),
            ),
        }
    }
}

fn parse_node(value: &Value, opts: &ParseOptions, root: bool) -> Result<FileTree, MetainfoError> {
    let dict = value
        .as_dict()
        .ok_or_else(|| MetainfoError::invalid("file tree", "node is not a dictionary"))?;

    // A file node holds exactly the empty-string sentinel key.
    if let Some(props) = dict.get(b"".as_slice()) {
        if root {
            return Err(MetainfoError::invalid(
                "file tree",
                "root cannot be a file node",
            ));
        }
        if dict.len() > 1 {
            return Err(MetainfoError::invalid(
                "file tree",
                "file node mixed with directory entries",
            ));
        }
        return parse_file_entry(props, opts).map(FileTree::File);
    }

    let mut children = BTreeMap::new();
    for (key, child) in dict {
        validate_component(key)?;
        children.insert(key.clone(), parse_node(child, opts, false)?);
    }
    Ok(FileTree::Directory(children))
}

fn parse_file_entry(value: &Value, opts: &ParseOptions) -> Result<FileTreeEntry, MetainfoError> {
    let dict = value
        .as_dict()
        .ok_or_else(|| MetainfoError::invalid("file tree", "file entry is not a dictionary"))?;

    let length = dict
        .get(b"length".as_slice())
        .ok_or(MetainfoError::MissingField("file tree.length"))?
        .as_u64()
        .ok_or_else(|| MetainfoError::invalid("file tree.length", "not a nonnegative integer"))?;

    let pieces_root = match dict.get(b"pieces root".as_slice()) {
        None => None,
        Some(v) => {
            let bytes = v.as_bytes().ok_or_else(|| {
                MetainfoError::invalid("file tree.pieces root", "not a string")
            })?;
            if bytes.len() != SHA256_LEN {
                return Err(MetainfoError::invalid(
                    "file tree.pieces root",
                    format!("expected 32 bytes, got {}", bytes.len()),
                ));
            }
            let mut arr = [0u8; 32];
            arr.copy_from_slice(bytes);
            Some(arr)
        }
    };

    let attr = dict
        .get(b"attr".as_slice())
        .and_then(|v| v.as_bytes())
        .cloned();

    let mut extra = BTreeMap::new();
    for (key, val) in dict {
        match key.as_ref() {
            b"length" | b"pieces root" | b"attr" => {}
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

    Ok(FileTreeEntry {
        length,
        pieces_root,
        attr,
        extra,
    })
}

fn flatten_node(tree: &FileTree, prefix: &mut Vec<Bytes>, files: &mut Vec<FlatFile>) {
    match tree {
        FileTree::File(entry) => {
            files.push(FlatFile {
                path: TorrentPath::from_components(prefix.clone()),
                length: entry.length,
                pieces_root: entry.pieces_root,
                attr: entry.attr.clone(),
            });
        }
        FileTree::Directory(children) => {
            for (name, child) in children {
                prefix.push(name.clone());
                flatten_node(child, prefix, files);
                prefix.pop();
            }
        }
    }
}
