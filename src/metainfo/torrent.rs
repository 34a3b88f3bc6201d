use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use bytes::Bytes;

use crate::bencode::{decode_document, encode, Value};
use crate::constants::SHA256_LEN;
use crate::piece_range::{V1PieceRange, V2PieceRange};

use super::error::MetainfoError;
use super::info::{GenericFile, InfoDict, LayoutFile, ParseOptions, TorrentVersion, V1Storage};
use super::info_hash::{InfoHashV1, InfoHashV2};

/// A parsed, validated torrent file.
///
/// Holds the typed info dictionary, the outer metadata fields, and the raw
/// bencoded bytes of the info dictionary exactly as the parser saw them.
/// Infohashes are computed from those bytes once, at construction, so they
/// stay stable no matter how the model is re-serialized later.
///
/// # Examples
///
/// ```no_run
/// use btmeta::metainfo::Metainfo;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let metainfo = Metainfo::read_path("example.torrent")?;
///
/// println!("name: {}", metainfo.info.name_lossy());
/// println!("size: {} bytes", metainfo.info.total_length());
/// if let Some(hash) = metainfo.v1_info_hash() {
///     println!("v1 infohash: {}", hash);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// The info dictionary.
    pub info: InfoDict,
    /// Primary tracker URL.
    pub announce: Option<String>,
    /// Multi-tier tracker list (BEP-12).
    pub announce_list: Vec<Vec<String>>,
    /// Optional free-form comment.
    pub comment: Option<String>,
    /// Name/version of the program that created the torrent.
    pub created_by: Option<String>,
    /// Unix timestamp of creation.
    pub creation_date: Option<i64>,
    /// Web seed URLs (BEP-19).
    pub url_list: Vec<String>,
    /// BEP-52 piece layers: merkle root -> concatenated layer hashes.
    pub piece_layers: BTreeMap<Bytes, Bytes>,
    /// Unknown top-level keys, preserved for re-encoding.
    pub(crate) extra: BTreeMap<Bytes, Value>,
    raw_info: Bytes,
    v1_hash: Option<InfoHashV1>,
    v2_hash: Option<InfoHashV2>,
}

impl Metainfo {
    /// Parses a torrent from raw bytes with default (lenient) options.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid bencode, schema violations (missing or
    /// mistyped fields, bad piece length), cross-field inconsistencies
    /// (piece counts, piece layers, hybrid file sets), or unsafe paths.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        Self::from_bytes_with(data, &ParseOptions::default())
    }

    /// Parses a torrent from raw bytes with explicit [`ParseOptions`].
    pub fn from_bytes_with(data: &[u8], opts: &ParseOptions) -> Result<Self, MetainfoError> {
        let doc = decode_document(data)?;
        let dict = doc
            .root
            .as_dict()
            .ok_or_else(|| MetainfoError::invalid("root", "not a dictionary"))?;
        let span = doc.info_span.ok_or(MetainfoError::MissingField("info"))?;

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingField("info"))?;
        let info = InfoDict::from_value(info_value, opts)?;
        let raw_info = Bytes::copy_from_slice(&data[span]);

        let mut extra = BTreeMap::new();
        let announce = take_text(dict, b"announce", &mut extra, opts)?;
        let comment = take_text(dict, b"comment", &mut extra, opts)?;
        let created_by = take_text(dict, b"created by", &mut extra, opts)?;

        let creation_date = match dict.get(b"creation date".as_slice()) {
            None => None,
            Some(v) => Some(v.as_integer().ok_or_else(|| {
                MetainfoError::invalid("creation date", "not an integer")
            })?),
        };

        let announce_list = match dict.get(b"announce-list".as_slice()) {
            None => Vec::new(),
            Some(v) => match parse_tiers(v) {
                Some(tiers) => tiers,
                None => {
                    if opts.strict_schema {
                        return Err(MetainfoError::invalid(
                            "announce-list",
                            "not a list of string lists",
                        ));
                    }
                    extra.insert(Bytes::from_static(b"announce-list"), v.clone());
                    Vec::new()
                }
            },
        };

        // BEP-19 allows url-list as either a single string or a list.
        let url_list = match dict.get(b"url-list".as_slice()) {
            None => Vec::new(),
            Some(v) => match parse_url_list(v) {
                Some(urls) => urls,
                None => {
                    if opts.strict_schema {
                        return Err(MetainfoError::invalid(
                            "url-list",
                            "not a string or string list",
                        ));
                    }
                    extra.insert(Bytes::from_static(b"url-list"), v.clone());
                    Vec::new()
                }
            },
        };

        let piece_layers = match dict.get(b"piece layers".as_slice()) {
            None => BTreeMap::new(),
            Some(v) => {
                let layers = v.as_dict().ok_or_else(|| {
                    MetainfoError::invalid("piece layers", "not a dictionary")
                })?;
                layers
                    .iter()
                    .map(|(root, hashes)| {
                        let hashes = hashes.as_bytes().ok_or_else(|| {
                            MetainfoError::invalid("piece layers", "layer is not a string")
                        })?;
                        Ok((root.clone(), hashes.clone()))
                    })
                    .collect::<Result<_, MetainfoError>>()?
            }
        };

        for (key, val) in dict {
            match key.as_ref() {
                b"info" | b"announce" | b"announce-list" | b"comment" | b"created by"
                | b"creation date" | b"url-list" | b"piece layers" => {}
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

        let version = info.version();
        let v1_hash = version
            .has_v1()
            .then(|| InfoHashV1::from_info_bytes(&raw_info));
        let v2_hash = version
            .has_v2()
            .then(|| InfoHashV2::from_info_bytes(&raw_info));

        let metainfo = Metainfo {
            info,
            announce,
            announce_list,
            comment,
            created_by,
            creation_date,
            url_list,
            piece_layers,
            extra,
            raw_info,
            v1_hash,
            v2_hash,
        };
        metainfo.validate(opts)?;
        Ok(metainfo)
    }

    /// Reads and parses a torrent file from disk.
    pub fn read_path(path: impl AsRef<Path>) -> Result<Self, MetainfoError> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Serializes the torrent to canonical bencode bytes.
    ///
    /// The info dictionary is emitted verbatim from the bytes it was parsed
    /// or created from, so serialization never perturbs the infohash.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut entries: BTreeMap<Bytes, Vec<u8>> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), encode(v)))
            .collect();

        if let Some(announce) = &self.announce {
            entries.insert(
                Bytes::from_static(b"announce"),
                encode(&Value::from(announce.clone())),
            );
        }
        if !self.announce_list.is_empty() {
            let tiers = Value::List(
                self.announce_list
                    .iter()
                    .map(|tier| {
                        Value::List(tier.iter().map(|url| Value::from(url.clone())).collect())
                    })
                    .collect(),
            );
            entries.insert(Bytes::from_static(b"announce-list"), encode(&tiers));
        }
        if let Some(comment) = &self.comment {
            entries.insert(
                Bytes::from_static(b"comment"),
                encode(&Value::from(comment.clone())),
            );
        }
        if let Some(created_by) = &self.created_by {
            entries.insert(
                Bytes::from_static(b"created by"),
                encode(&Value::from(created_by.clone())),
            );
        }
        if let Some(date) = self.creation_date {
            entries.insert(
                Bytes::from_static(b"creation date"),
                encode(&Value::Integer(date)),
            );
        }
        if !self.piece_layers.is_empty() {
            let layers = Value::Dict(
                self.piece_layers
                    .iter()
                    .map(|(root, hashes)| (root.clone(), Value::Bytes(hashes.clone())))
                    .collect(),
            );
            entries.insert(Bytes::from_static(b"piece layers"), encode(&layers));
        }
        match self.url_list.as_slice() {
            [] => {}
            [single] => {
                entries.insert(
                    Bytes::from_static(b"url-list"),
                    encode(&Value::from(single.clone())),
                );
            }
            many => {
                let urls = Value::List(many.iter().map(|u| Value::from(u.clone())).collect());
                entries.insert(Bytes::from_static(b"url-list"), encode(&urls));
            }
        }
        entries.insert(Bytes::from_static(b"info"), self.raw_info.to_vec());

        let mut out = Vec::new();
        out.push(b'd');
        for (key, payload) in &entries {
            out.extend_from_slice(key.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(key);
            out.extend_from_slice(payload);
        }
        out.push(b'e');
        out
    }

    /// Writes the torrent to a file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), MetainfoError> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// The raw bencoded info dictionary.
    pub fn raw_info(&self) -> &Bytes {
        &self.raw_info
    }

    /// Which hash schemes this torrent carries.
    pub fn version(&self) -> TorrentVersion {
        self.info.version()
    }

    /// The v1 infohash, present for v1 and hybrid torrents.
    pub fn v1_info_hash(&self) -> Option<&InfoHashV1> {
        self.v1_hash.as_ref()
    }

    /// The v2 infohash, present for v2 and hybrid torrents.
    pub fn v2_info_hash(&self) -> Option<&InfoHashV2> {
        self.v2_hash.as_ref()
    }

    /// Flavor-independent list of real files (pad files excluded).
    pub fn files(&self) -> Vec<GenericFile> {
        self.info.files()
    }

    /// All tracker URLs from `announce` and `announce-list`, deduplicated,
    /// primary tracker first.
    pub fn trackers(&self) -> Vec<String> {
        let mut trackers = Vec::new();
        if let Some(announce) = &self.announce {
            trackers.push(announce.clone());
        }
        for tier in &self.announce_list {
            for tracker in tier {
                if !trackers.contains(tracker) {
                    trackers.push(tracker.clone());
                }
            }
        }
        trackers
    }

    /// Each v1 stream entry (pads included) with its absolute offset in the
    /// padded catenation and the index of the piece containing its first
    /// byte. Returns `None` for v2-only torrents.
    pub fn v1_file_positions(&self) -> Option<Vec<FilePosition>> {
        let layout = self.info.v1_layout()?;
        let piece_length = self.info.piece_length;
        let mut offset = 0u64;
        Some(
            layout
                .into_iter()
                .map(|file| {
                    let position = FilePosition {
                        offset,
                        piece_index: (offset / piece_length) as u32,
                        file,
                    };
                    offset += position.file.length;
                    position
                })
                .collect(),
        )
    }

    /// The byte ranges and expected hash of v1 piece `index`.
    ///
    /// Returns `None` when the torrent has no v1 hashes or the index is out
    /// of range.
    pub fn v1_piece_range(&self, index: u32) -> Option<V1PieceRange> {
        V1PieceRange::for_piece(self, index)
    }

    /// The byte range and expected hash of v2 piece `index` of the file at
    /// `path` (components joined with `/`, not including the torrent name).
    ///
    /// Returns `None` when the torrent has no v2 hashes, the file does not
    /// exist or is empty, or the index is out of range.
    pub fn v2_piece_range(&self, path: &str, index: u32) -> Option<V2PieceRange> {
        V2PieceRange::for_file_piece(self, path, index)
    }

    fn validate(&self, opts: &ParseOptions) -> Result<(), MetainfoError> {
        let piece_length = self.info.piece_length;

        if let Some(v1) = self.info.data.v1() {
            let padded = v1.padded_total_length();
            let expected = padded.div_ceil(piece_length) as usize;
            let actual = v1.piece_count();
            // An empty torrent conventionally carries one hash (of empty
            // input) rather than none.
            let ok = actual == expected || (padded == 0 && actual == 1);
            if !ok {
                return Err(MetainfoError::Invariant(format!(
                    "expected {} pieces for padded length {} and piece length {}, got {}",
                    expected, padded, piece_length, actual
                )));
            }

            if opts.strict {
                self.check_pad_files(piece_length)?;
            }
        }

        if let Some(v2) = self.info.data.v2() {
            let mut needed_roots = BTreeSet::new();
            for file in v2.file_tree.flatten() {
                match (file.length, file.pieces_root) {
                    (0, Some(_)) => {
                        return Err(MetainfoError::Invariant(format!(
                            "empty file {} has a pieces root",
                            file.path
                        )))
                    }
                    (0, None) => continue,
                    (_, None) => {
                        return Err(MetainfoError::Invariant(format!(
                            "file {} is missing its pieces root",
                            file.path
                        )))
                    }
                    (length, Some(root)) => {
                        if length > piece_length {
                            let layer =
                                self.piece_layers.get(root.as_slice()).ok_or_else(|| {
                                    MetainfoError::Invariant(format!(
                                        "file {} has no piece layers entry",
                                        file.path
                                    ))
                                })?;
                            let expected = length.div_ceil(piece_length) * SHA256_LEN as u64;
                            if layer.len() as u64 != expected {
                                return Err(MetainfoError::Invariant(format!(
                                    "file {} piece layer has {} bytes, expected {}",
                                    file.path,
                                    layer.len(),
                                    expected
                                )));
                            }
                            needed_roots.insert(Bytes::copy_from_slice(&root));
                        } else if self.piece_layers.contains_key(root.as_slice()) {
                            return Err(MetainfoError::Invariant(format!(
                                "file {} fits in one piece but has a piece layers entry",
                                file.path
                            )));
                        }
                    }
                }
            }
            for root in self.piece_layers.keys() {
                if !needed_roots.contains(root) {
                    return Err(MetainfoError::Invariant(
                        "piece layers entry matches no file".into(),
                    ));
                }
            }
        }

        if self.version() == TorrentVersion::Hybrid {
            self.check_hybrid_file_sets()?;
        }

        Ok(())
    }

    /// Strict mode: every real file except the last must be followed by a
    /// correctly sized, correctly named pad file when it does not end on a
    /// piece boundary.
    fn check_pad_files(&self, piece_length: u64) -> Result<(), MetainfoError> {
        let Some(layout) = self.info.v1_layout() else {
            return Ok(());
        };

        let last_real = match layout.iter().rposition(|f| !f.pad) {
            Some(i) => i,
            None => return Ok(()),
        };

        let mut offset = 0u64;
        for (i, file) in layout.iter().enumerate() {
            if file.pad {
                let expected_name = [
                    Bytes::from_static(crate::constants::PAD_DIR.as_bytes()),
                    Bytes::from(file.length.to_string()),
                ];
                if file.path.components() != expected_name.as_slice() {
                    return Err(MetainfoError::Invariant(format!(
                        "pad file named {}, expected .pad/{}",
                        file.path, file.length
                    )));
                }
            }
            offset += file.length;
            if !file.pad && i < last_real && offset % piece_length != 0 {
                let next_is_pad = layout.get(i + 1).is_some_and(|f| f.pad);
                if !next_is_pad {
                    return Err(MetainfoError::Invariant(format!(
                        "file {} does not end on a piece boundary and is not followed by a pad",
                        file.path
                    )));
                }
            }
        }
        Ok(())
    }

    /// Hybrid torrents must describe the same files in both views: the v1
    /// list without pads and the flattened file tree must match pairwise in
    /// path and length.
    fn check_hybrid_file_sets(&self) -> Result<(), MetainfoError> {
        let (Some(v1), Some(v2)) = (self.info.data.v1(), self.info.data.v2()) else {
            return Ok(());
        };

        let tree_files: Vec<_> = v2
            .file_tree
            .flatten()
            .into_iter()
            .filter(|f| !f.attrs().pad)
            .collect();

        let v1_files: Vec<(Vec<Bytes>, u64)> = match &v1.storage {
            V1Storage::Single { length } => {
                vec![(vec![self.info.name.clone()], *length)]
            }
            V1Storage::Multiple { files } => files
                .iter()
                .filter(|f| !f.is_pad())
                .map(|f| (f.path.components().to_vec(), f.length))
                .collect(),
        };

        if v1_files.len() != tree_files.len() {
            return Err(MetainfoError::Invariant(format!(
                "hybrid views disagree: {} v1 files vs {} tree files",
                v1_files.len(),
                tree_files.len()
            )));
        }
        for ((path, length), tree_file) in v1_files.iter().zip(&tree_files) {
            if path.as_slice() != tree_file.path.components() || *length != tree_file.length {
                return Err(MetainfoError::Invariant(format!(
                    "hybrid views disagree at {}: v1 has {} ({} bytes), tree has {} ({} bytes)",
                    tree_file.path,
                    TorrentPathDisplay(path),
                    length,
                    tree_file.path,
                    tree_file.length
                )));
            }
        }
        Ok(())
    }
}

/// A file's place in the v1 stream, as yielded by
/// [`Metainfo::v1_file_positions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePosition {
    /// The layout entry (path, length, pad flag).
    pub file: LayoutFile,
    /// Absolute offset of the file's first byte in the padded catenation.
    pub offset: u64,
    /// Index of the piece containing that byte.
    pub piece_index: u32,
}

struct TorrentPathDisplay<'a>(&'a [Bytes]);

impl std::fmt::Display for TorrentPathDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", String::from_utf8_lossy(component))?;
        }
        Ok(())
    }
}

fn take_text(
    dict: &BTreeMap<Bytes, Value>,
    key: &'static [u8],
    extra: &mut BTreeMap<Bytes, Value>,
    opts: &ParseOptions,
) -> Result<Option<String>, MetainfoError> {
    match dict.get(key) {
        None => Ok(None),
        Some(value) => match value.as_str() {
            Some(s) => Ok(Some(s.to_string())),
            None => {
                if opts.strict_schema {
                    return Err(MetainfoError::invalid(
                        "outer metadata",
                        format!("{} is not UTF-8 text", String::from_utf8_lossy(key)),
                    ));
                }
                // Keep the raw value so re-encoding stays lossless.
                extra.insert(Bytes::copy_from_slice(key), value.clone());
                Ok(None)
            }
        },
    }
}

fn parse_tiers(value: &Value) -> Option<Vec<Vec<String>>> {
    value
        .as_list()?
        .iter()
        .map(|tier| {
            tier.as_list()?
                .iter()
                .map(|url| url.as_str().map(String::from))
                .collect()
        })
        .collect()
}

fn parse_url_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Bytes(_) => Some(vec![value.as_str()?.to_string()]),
        Value::List(urls) => urls
            .iter()
            .map(|url| url.as_str().map(String::from))
            .collect(),
        _ => None,
    }
}
