use std::collections::BTreeMap;

use bytes::Bytes;

use super::*;
use crate::bencode::{encode, BencodeError, Value};

fn dict(entries: Vec<(&'static [u8], Value)>) -> Value {
    let mut map = BTreeMap::new();
    for (k, v) in entries {
        map.insert(Bytes::from_static(k), v);
    }
    Value::Dict(map)
}

fn file_entry(length: i64, path: &[&str]) -> Value {
    dict(vec![
        (b"length", Value::Integer(length)),
        (
            b"path",
            Value::List(path.iter().map(|c| Value::string(c)).collect()),
        ),
    ])
}

fn pad_entry(length: i64) -> Value {
    dict(vec![
        (b"attr", Value::Bytes(Bytes::from_static(b"p"))),
        (b"length", Value::Integer(length)),
        (
            b"path",
            Value::List(vec![
                Value::string(".pad"),
                Value::from(length.to_string()),
            ]),
        ),
    ])
}

fn tree_leaf(length: i64, root: Option<[u8; 32]>) -> Value {
    let mut props = vec![(b"length" as &'static [u8], Value::Integer(length))];
    if let Some(root) = root {
        props.push((b"pieces root", Value::from(root.to_vec())));
    }
    dict(vec![(b"", dict(props))])
}

fn v1_single(length: i64, piece_length: i64, n_pieces: usize) -> Value {
    dict(vec![
        (b"length", Value::Integer(length)),
        (b"name", Value::string("test.bin")),
        (b"piece length", Value::Integer(piece_length)),
        (b"pieces", Value::from(vec![0xabu8; 20 * n_pieces])),
    ])
}

fn wrap(info: Value) -> Vec<u8> {
    encode(&dict(vec![(b"info", info)]))
}

#[test]
fn test_parse_v1_single_file() {
    let bytes = encode(&dict(vec![
        (b"announce", Value::string("http://tracker.example/announce")),
        (b"info", v1_single(32768, 16384, 2)),
    ]));
    let meta = Metainfo::from_bytes(&bytes).unwrap();

    assert_eq!(meta.version(), TorrentVersion::V1);
    assert_eq!(meta.info.name_str(), Some("test.bin"));
    assert_eq!(meta.info.piece_length, 16384);
    assert_eq!(meta.info.total_length(), 32768);
    assert_eq!(meta.info.file_count(), 1);
    assert_eq!(meta.files()[0].path.to_string(), "test.bin");
    assert_eq!(
        meta.announce.as_deref(),
        Some("http://tracker.example/announce")
    );

    let hash = meta.v1_info_hash().unwrap();
    assert_eq!(*hash, InfoHashV1::from_info_bytes(meta.raw_info()));
    assert_eq!(hash.to_hex().len(), 40);
    assert!(meta.v2_info_hash().is_none());
}

#[test]
fn test_infohash_survives_reserialization() {
    let bytes = wrap(v1_single(32768, 16384, 2));
    let meta = Metainfo::from_bytes(&bytes).unwrap();
    let expected = meta.v1_info_hash().unwrap().to_hex();

    let rewritten = meta.to_bytes();
    let reread = Metainfo::from_bytes(&rewritten).unwrap();
    assert_eq!(reread.v1_info_hash().unwrap().to_hex(), expected);
}

#[test]
fn test_roundtrip_preserves_unknown_keys() {
    let info = dict(vec![
        (b"length", Value::Integer(16384)),
        (b"name", Value::string("test.bin")),
        (b"piece length", Value::Integer(16384)),
        (b"pieces", Value::from(vec![0u8; 20])),
        (b"x-unknown", Value::Integer(7)),
    ]);
    let bytes = encode(&dict(vec![
        (b"info", info),
        (b"x-custom", Value::string("kept")),
    ]));

    let meta = Metainfo::from_bytes(&bytes).unwrap();
    assert_eq!(meta.to_bytes(), bytes);

    let opts = ParseOptions {
        strict_schema: true,
        ..Default::default()
    };
    assert!(matches!(
        Metainfo::from_bytes_with(&bytes, &opts),
        Err(MetainfoError::UnknownKey(_))
    ));
}

#[test]
fn test_non_utf8_comment_preserved_raw() {
    let bytes = encode(&dict(vec![
        (b"comment", Value::from(vec![0xff, 0xfe])),
        (b"info", v1_single(16384, 16384, 1)),
    ]));
    let meta = Metainfo::from_bytes(&bytes).unwrap();
    assert_eq!(meta.comment, None);
    assert_eq!(meta.to_bytes(), bytes);
}

#[test]
fn test_unordered_keys_fail_before_modeling() {
    // A dict with "b" before "a" never reaches the model layer.
    let result = Metainfo::from_bytes(b"d1:b0:1:a0:e");
    assert!(matches!(
        result,
        Err(MetainfoError::Bencode(BencodeError::NonAscendingKey(_)))
    ));
}

#[test]
fn test_piece_count_invariant() {
    // 32768 bytes at 16384 per piece needs 2 hashes, not 3.
    let result = Metainfo::from_bytes(&wrap(v1_single(32768, 16384, 3)));
    assert!(matches!(result, Err(MetainfoError::Invariant(_))));
}

#[test]
fn test_empty_torrent_carries_one_piece() {
    let meta = Metainfo::from_bytes(&wrap(v1_single(0, 16384, 1))).unwrap();
    assert_eq!(meta.info.total_length(), 0);
    assert_eq!(meta.info.data.v1().unwrap().piece_count(), 1);
}

#[test]
fn test_pieces_length_must_be_multiple_of_20() {
    let info = dict(vec![
        (b"length", Value::Integer(16384)),
        (b"name", Value::string("test.bin")),
        (b"piece length", Value::Integer(16384)),
        (b"pieces", Value::from(vec![0u8; 19])),
    ]);
    let result = Metainfo::from_bytes(&wrap(info));
    assert!(matches!(
        result,
        Err(MetainfoError::InvalidField { field: "info.pieces", .. })
    ));
}

#[test]
fn test_piece_length_must_be_power_of_two() {
    for bad in [30000, 8192, 0] {
        let result = Metainfo::from_bytes(&wrap(v1_single(16384, bad, 1)));
        assert!(
            matches!(
                result,
                Err(MetainfoError::InvalidField { field: "info.piece length", .. })
            ),
            "piece length {} accepted",
            bad
        );
    }
}

#[test]
fn test_length_xor_files() {
    let info = dict(vec![
        (
            b"files",
            Value::List(vec![file_entry(16384, &["a.bin"])]),
        ),
        (b"length", Value::Integer(16384)),
        (b"name", Value::string("test")),
        (b"piece length", Value::Integer(16384)),
        (b"pieces", Value::from(vec![0u8; 20])),
    ]);
    let result = Metainfo::from_bytes(&wrap(info));
    assert!(matches!(result, Err(MetainfoError::InvalidField { .. })));
}

#[test]
fn test_unsafe_path_components() {
    for component in ["..", ".", "a/b", "a\\b", ""] {
        let info = dict(vec![
            (
                b"files",
                Value::List(vec![file_entry(16384, &[component])]),
            ),
            (b"name", Value::string("test")),
            (b"piece length", Value::Integer(16384)),
            (b"pieces", Value::from(vec![0u8; 20])),
        ]);
        let result = Metainfo::from_bytes(&wrap(info));
        assert!(
            matches!(
                result,
                Err(MetainfoError::UnsafePath(_)) | Err(MetainfoError::InvalidField { .. })
            ),
            "component {:?} accepted",
            component
        );
    }
}

#[test]
fn test_parse_v2() {
    let root = [0x11u8; 32];
    let info = dict(vec![
        (
            b"file tree",
            dict(vec![(b"file.bin", tree_leaf(65536, Some(root)))]),
        ),
        (b"meta version", Value::Integer(2)),
        (b"name", Value::string("test")),
        (b"piece length", Value::Integer(65536)),
    ]);
    let meta = Metainfo::from_bytes(&wrap(info)).unwrap();

    assert_eq!(meta.version(), TorrentVersion::V2);
    assert!(meta.v1_info_hash().is_none());
    let hash = meta.v2_info_hash().unwrap();
    assert_eq!(*hash, InfoHashV2::from_info_bytes(meta.raw_info()));

    let files = meta.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].length, 65536);
    assert_eq!(files[0].pieces_root, Some(root));
}

#[test]
fn test_v2_requires_meta_version_and_tree_together() {
    let tree = dict(vec![(b"file.bin", tree_leaf(16384, Some([0x11; 32])))]);
    let without_version = dict(vec![
        (b"file tree", tree.clone()),
        (b"name", Value::string("test")),
        (b"piece length", Value::Integer(16384)),
    ]);
    assert!(matches!(
        Metainfo::from_bytes(&wrap(without_version)),
        Err(MetainfoError::MissingField("info.meta version"))
    ));

    let without_tree = dict(vec![
        (b"meta version", Value::Integer(2)),
        (b"name", Value::string("test")),
        (b"piece length", Value::Integer(16384)),
    ]);
    assert!(matches!(
        Metainfo::from_bytes(&wrap(without_tree)),
        Err(MetainfoError::MissingField("info.file tree"))
    ));

    let wrong_version = dict(vec![
        (b"file tree", tree),
        (b"meta version", Value::Integer(3)),
        (b"name", Value::string("test")),
        (b"piece length", Value::Integer(16384)),
    ]);
    assert!(matches!(
        Metainfo::from_bytes(&wrap(wrong_version)),
        Err(MetainfoError::InvalidField { field: "info.meta version", .. })
    ));
}

#[test]
fn test_v2_piece_layers_iff_multi_piece() {
    let root = [0x22u8; 32];
    let info = dict(vec![
        (
            b"file tree",
            dict(vec![(b"big.bin", tree_leaf(40960, Some(root)))]),
        ),
        (b"meta version", Value::Integer(2)),
        (b"name", Value::string("test")),
        (b"piece length", Value::Integer(16384)),
    ]);

    // 40960 bytes > 16384: a layers entry with ceil(40960/16384) = 3 hashes
    // is required.
    let no_layers = encode(&dict(vec![(b"info", info.clone())]));
    assert!(matches!(
        Metainfo::from_bytes(&no_layers),
        Err(MetainfoError::Invariant(_))
    ));

    let wrong_len = encode(&dict(vec![
        (b"info", info.clone()),
        (
            b"piece layers",
            dict_raw(vec![(root.to_vec(), vec![0u8; 64])]),
        ),
    ]));
    assert!(matches!(
        Metainfo::from_bytes(&wrong_len),
        Err(MetainfoError::Invariant(_))
    ));

    let good = encode(&dict(vec![
        (b"info", info),
        (
            b"piece layers",
            dict_raw(vec![(root.to_vec(), vec![0u8; 96])]),
        ),
    ]));
    let meta = Metainfo::from_bytes(&good).unwrap();
    assert_eq!(meta.piece_layers.len(), 1);
}

#[test]
fn test_v2_orphan_piece_layer() {
    let info = dict(vec![
        (
            b"file tree",
            dict(vec![(b"small.bin", tree_leaf(16384, Some([0x33; 32])))]),
        ),
        (b"meta version", Value::Integer(2)),
        (b"name", Value::string("test")),
        (b"piece length", Value::Integer(16384)),
    ]);
    let bytes = encode(&dict(vec![
        (b"info", info),
        (
            b"piece layers",
            dict_raw(vec![(vec![0x44u8; 32], vec![0u8; 64])]),
        ),
    ]));
    assert!(matches!(
        Metainfo::from_bytes(&bytes),
        Err(MetainfoError::Invariant(_))
    ));
}

#[test]
fn test_v2_empty_file_has_no_root() {
    let ok = dict(vec![
        (
            b"file tree",
            dict(vec![(b"empty.bin", tree_leaf(0, None))]),
        ),
        (b"meta version", Value::Integer(2)),
        (b"name", Value::string("test")),
        (b"piece length", Value::Integer(16384)),
    ]);
    let meta = Metainfo::from_bytes(&wrap(ok)).unwrap();
    assert_eq!(meta.info.total_length(), 0);
    assert_eq!(meta.files()[0].pieces_root, None);

    let bad = dict(vec![
        (
            b"file tree",
            dict(vec![(b"empty.bin", tree_leaf(0, Some([0x55; 32])))]),
        ),
        (b"meta version", Value::Integer(2)),
        (b"name", Value::string("test")),
        (b"piece length", Value::Integer(16384)),
    ]);
    assert!(matches!(
        Metainfo::from_bytes(&wrap(bad)),
        Err(MetainfoError::Invariant(_))
    ));
}

fn hybrid_info(b_tree_length: i64) -> Value {
    let root_a = [0x66u8; 32];
    let root_b = [0x77u8; 32];
    dict(vec![
        (
            b"file tree",
            dict(vec![
                (b"a.bin", tree_leaf(20480, Some(root_a))),
                (b"b.bin", tree_leaf(b_tree_length, Some(root_b))),
            ]),
        ),
        (
            b"files",
            Value::List(vec![
                file_entry(20480, &["a.bin"]),
                pad_entry(12288),
                file_entry(20480, &["b.bin"]),
            ]),
        ),
        (b"meta version", Value::Integer(2)),
        (b"name", Value::string("hy")),
        (b"piece length", Value::Integer(32768)),
        (b"pieces", Value::from(vec![0xcdu8; 40])),
    ])
}

#[test]
fn test_hybrid_parses_and_matches_views() {
    let meta = Metainfo::from_bytes(&wrap(hybrid_info(20480))).unwrap();
    assert_eq!(meta.version(), TorrentVersion::Hybrid);
    assert!(meta.v1_info_hash().is_some());
    assert!(meta.v2_info_hash().is_some());

    // The generic file list excludes the pad and matches the tree.
    let files = meta.files();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].path.to_string(), "a.bin");
    assert_eq!(files[1].path.to_string(), "b.bin");

    // The padded catenation counts the pad.
    assert_eq!(meta.info.total_length(), 40960);
    assert_eq!(meta.info.padded_total_length(), 53248);
}

#[test]
fn test_v1_file_positions() {
    let meta = Metainfo::from_bytes(&wrap(hybrid_info(20480))).unwrap();
    let positions = meta.v1_file_positions().unwrap();
    assert_eq!(positions.len(), 3);

    assert_eq!(positions[0].offset, 0);
    assert_eq!(positions[0].piece_index, 0);
    assert!(positions[1].file.pad);
    assert_eq!(positions[1].offset, 20480);
    assert_eq!(positions[1].piece_index, 0);
    assert_eq!(positions[2].file.path.to_string(), "b.bin");
    assert_eq!(positions[2].offset, 32768);
    assert_eq!(positions[2].piece_index, 1);
}

#[test]
fn test_hybrid_view_mismatch() {
    let result = Metainfo::from_bytes(&wrap(hybrid_info(20481)));
    assert!(matches!(result, Err(MetainfoError::Invariant(_))));
}

#[test]
fn test_strict_requires_pad_files() {
    let info = dict(vec![
        (
            b"files",
            Value::List(vec![
                file_entry(20480, &["a.bin"]),
                file_entry(20480, &["b.bin"]),
            ]),
        ),
        (b"name", Value::string("nopads")),
        (b"piece length", Value::Integer(32768)),
        (b"pieces", Value::from(vec![0u8; 40])),
    ]);
    let bytes = wrap(info);

    // Fine by default; pads are only demanded in strict mode.
    assert!(Metainfo::from_bytes(&bytes).is_ok());

    let opts = ParseOptions {
        strict: true,
        ..Default::default()
    };
    assert!(matches!(
        Metainfo::from_bytes_with(&bytes, &opts),
        Err(MetainfoError::Invariant(_))
    ));
}

#[test]
fn test_strict_checks_pad_names() {
    let misnamed = dict(vec![
        (b"attr", Value::Bytes(Bytes::from_static(b"p"))),
        (b"length", Value::Integer(12288)),
        (
            b"path",
            Value::List(vec![Value::string(".pad"), Value::string("wrong")]),
        ),
    ]);
    let info = dict(vec![
        (
            b"files",
            Value::List(vec![
                file_entry(20480, &["a.bin"]),
                misnamed,
                file_entry(20480, &["b.bin"]),
            ]),
        ),
        (b"name", Value::string("pads")),
        (b"piece length", Value::Integer(32768)),
        (b"pieces", Value::from(vec![0u8; 40])),
    ]);
    let bytes = wrap(info);

    assert!(Metainfo::from_bytes(&bytes).is_ok());

    let opts = ParseOptions {
        strict: true,
        ..Default::default()
    };
    assert!(matches!(
        Metainfo::from_bytes_with(&bytes, &opts),
        Err(MetainfoError::Invariant(_))
    ));
}

#[test]
fn test_trackers_merged_and_deduplicated() {
    let bytes = encode(&dict(vec![
        (b"announce", Value::string("http://a.example/announce")),
        (
            b"announce-list",
            Value::List(vec![
                Value::List(vec![Value::string("http://a.example/announce")]),
                Value::List(vec![Value::string("http://b.example/announce")]),
            ]),
        ),
        (b"info", v1_single(16384, 16384, 1)),
    ]));
    let meta = Metainfo::from_bytes(&bytes).unwrap();
    assert_eq!(
        meta.trackers(),
        vec![
            "http://a.example/announce".to_string(),
            "http://b.example/announce".to_string()
        ]
    );
}

#[test]
fn test_file_attrs() {
    let attrs = FileAttrs::from_bytes(b"hpx");
    assert!(attrs.hidden && attrs.pad && attrs.executable && !attrs.symlink);
    assert_eq!(FileAttrs::from_bytes(b""), FileAttrs::default());
}

#[test]
fn test_torrent_path() {
    let path = TorrentPath::from_strs(&["dir", "file.bin"]).unwrap();
    assert_eq!(path.to_string(), "dir/file.bin");
    assert!(!path.is_pad_path());

    let pad = TorrentPath::from_strs(&[".pad", "12288"]).unwrap();
    assert!(pad.is_pad_path());

    assert!(TorrentPath::from_strs(&["ok", ".."]).is_err());
}

#[test]
fn test_info_hash_hex_roundtrip() {
    let hex = "0123456789abcdef0123456789abcdef01234567";
    let hash = InfoHashV1::from_hex(hex).unwrap();
    assert_eq!(hash.to_hex(), hex);
    assert!(InfoHashV1::from_hex("xyz").is_err());

    let hex = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
    let hash = InfoHashV2::from_hex(hex).unwrap();
    assert_eq!(hash.to_hex(), hex);
}

fn dict_raw(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Value {
    let mut map = BTreeMap::new();
    for (k, v) in entries {
        map.insert(Bytes::from(k), Value::from(v));
    }
    Value::Dict(map)
}
