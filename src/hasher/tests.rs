use std::io::Write;

use super::*;
use crate::constants::{BLOCK_SIZE, KIB, MIB};
use crate::metainfo::{MetainfoError, TorrentVersion};

fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn hex20(s: &str) -> [u8; 20] {
    hex(s).try_into().unwrap()
}

fn hex32(s: &str) -> [u8; 32] {
    hex(s).try_into().unwrap()
}

// SHA-1 of empty input and of runs of zeros, for cross-checking against
// independent implementations.
const SHA1_EMPTY: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";
const SHA1_ZEROS_32K: &str = "5188431849b4613152fd7bdba6a3ff0a4fd6424b";
const SHA1_ZEROS_18K: &str = "1ca1b255c5c75f83be93ef3370770b9ace9b6427";

// SHA-256 of a 16 KiB zero block, and merkle roots over all-zero leaves.
const LEAF_ZEROS_16K: &str = "4fe7b59af6de3b665b67788cc2f99892ab827efae3a467342b3bb4e3bc8e5bfe";
const ROOT_4_ZERO_LEAVES: &str = "60aae9c7b428f87e0713e88229e18f0adf12cd7b22a0dd8a92bb2485eb7af242";
const ROOT_16_ZERO_LEAVES: &str = "0ee38dbbe040ef1d6f2435117c70f2579e768215c91a640e7d855a647084869c";
const ROOT_1M_ZEROS_256K: &str = "515ea9181744b817744ded9d2e8e9dc6a8450c0b0c52e24b5077f302ffbd9008";

#[test]
fn test_piece_hasher_empty_stream() {
    let hasher = PieceHasher::new(16 * KIB);
    assert_eq!(hasher.finish(), vec![hex20(SHA1_EMPTY)]);
}

#[test]
fn test_piece_hasher_exact_boundary() {
    let mut hasher = PieceHasher::new(32 * KIB);
    hasher.update(&vec![0u8; 32768]);
    let pieces = hasher.finish();
    assert_eq!(pieces, vec![hex20(SHA1_ZEROS_32K)]);
}

#[test]
fn test_piece_hasher_short_last_piece() {
    // 50 KiB of zeros in uneven chunks: one full 32 KiB piece and an
    // 18 KiB tail.
    let mut hasher = PieceHasher::new(32 * KIB);
    hasher.update(&vec![0u8; 10000]);
    hasher.update(&vec![0u8; 40000]);
    hasher.update(&vec![0u8; 1200]);
    let pieces = hasher.finish();
    assert_eq!(pieces.len(), 2);
    assert_eq!(pieces[0], hex20(SHA1_ZEROS_32K));
    assert_eq!(pieces[1], hex20(SHA1_ZEROS_18K));
}

#[test]
fn test_piece_hasher_pad_is_zeros() {
    let mut padded = PieceHasher::new(32 * KIB);
    padded.update(&vec![0u8; 20480]);
    padded.pad(12288);

    let mut plain = PieceHasher::new(32 * KIB);
    plain.update(&vec![0u8; 32768]);

    assert_eq!(padded.finish(), plain.finish());
}

#[test]
fn test_merkle_root_single_leaf() {
    let leaf = hash_block(&[1, 2, 3]);
    assert_eq!(merkle_root(vec![leaf]), leaf);
}

#[test]
fn test_leaf_capacity() {
    // Rounded up to a power of two...
    assert_eq!(leaf_capacity(3, 2), 4);
    assert_eq!(leaf_capacity(4, 2), 4);
    assert_eq!(leaf_capacity(5, 2), 8);
    // ...and never below one piece worth of blocks.
    assert_eq!(leaf_capacity(1, 16), 16);
    assert_eq!(leaf_capacity(17, 16), 32);
}

#[test]
fn test_file_tree_hasher_single_piece_file() {
    // 64 KiB of zeros with a 64 KiB piece: four zero leaves, no layer.
    let mut hasher = FileTreeHasher::new(64 * KIB);
    hasher.update(&vec![0u8; 65536]);
    let hashes = hasher.finish();
    assert_eq!(hashes.length, 65536);
    assert_eq!(hashes.pieces_root, Some(hex32(ROOT_4_ZERO_LEAVES)));
    assert!(hashes.piece_layer.is_empty());
}

#[test]
fn test_file_tree_hasher_block_chunking_is_irrelevant() {
    let mut odd = FileTreeHasher::new(64 * KIB);
    odd.update(&vec![0u8; 100]);
    odd.update(&vec![0u8; 40000]);
    odd.update(&vec![0u8; 25436]);
    let mut even = FileTreeHasher::new(64 * KIB);
    even.update(&vec![0u8; 65536]);
    assert_eq!(odd.finish(), even.finish());
}

#[test]
fn test_file_tree_hasher_multi_piece_file() {
    // 1 MiB of zeros with 256 KiB pieces: 64 leaves, 4 piece hashes.
    let mut hasher = FileTreeHasher::new(256 * KIB);
    hasher.update(&vec![0u8; MIB as usize]);
    let hashes = hasher.finish();
    assert_eq!(hashes.pieces_root, Some(hex32(ROOT_1M_ZEROS_256K)));
    assert_eq!(hashes.piece_layer.len(), 4);
    for piece in &hashes.piece_layer {
        assert_eq!(*piece, hex32(ROOT_16_ZERO_LEAVES));
    }
}

#[test]
fn test_file_tree_hasher_empty_file() {
    let hasher = FileTreeHasher::new(16 * KIB);
    let hashes = hasher.finish();
    assert_eq!(hashes.length, 0);
    assert_eq!(hashes.pieces_root, None);
    assert!(hashes.piece_layer.is_empty());
}

#[test]
fn test_file_tree_hasher_small_file_padded_to_piece_capacity() {
    // A single 16 KiB block in a 64 KiB-piece torrent still pads its tree
    // to four leaves.
    let mut hasher = FileTreeHasher::new(64 * KIB);
    hasher.update(&vec![0u8; BLOCK_SIZE]);
    let hashes = hasher.finish();

    let leaf = hex32(LEAF_ZEROS_16K);
    let zero = [0u8; 32];
    let expected = merkle_root(vec![leaf, zero, zero, zero]);
    assert_eq!(hashes.pieces_root, Some(expected));
}

#[test]
fn test_assemble_truncates_layer_to_real_pieces() {
    // 5 pieces of data pad to an 8-piece tree, but only the 5 real piece
    // hashes belong in the layer.
    let piece_length = 16 * KIB;
    let length = 5 * piece_length;
    let leaves: Vec<[u8; 32]> = (0..5u8).map(|i| hash_block(&[i])).collect();
    let hashes = assemble_file_hashes(length, piece_length, leaves);
    assert_eq!(hashes.piece_layer.len(), 5);
    assert!(hashes.pieces_root.is_some());
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn write_files(dir: &std::path::Path, sizes: &[usize]) -> Vec<StreamItem> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, size)| {
            let path = dir.join(format!("file{}.bin", i));
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(&patterned(*size)).unwrap();
            StreamItem::File {
                path,
                length: *size as u64,
            }
        })
        .collect()
}

#[test]
fn test_parallel_matches_serial() {
    let dir = tempfile::tempdir().unwrap();
    let mut items = write_files(dir.path(), &[100_000, 0, 65536, 3]);
    // Pad between the first and second real files, as a hybrid creator
    // would insert.
    items.insert(1, StreamItem::Pad { length: 31072 });

    let serial = Hasher::new(32 * KIB, TorrentVersion::Hybrid)
        .run(&items)
        .unwrap();
    let pooled = Hasher::new(32 * KIB, TorrentVersion::Hybrid)
        .workers(4)
        .run(&items)
        .unwrap();

    assert_eq!(serial.v1_pieces, pooled.v1_pieces);
    assert_eq!(serial.files, pooled.files);
    assert_eq!(serial.files.len(), 4);
}

#[test]
fn test_v1_only_produces_no_trees() {
    let dir = tempfile::tempdir().unwrap();
    let items = write_files(dir.path(), &[40_000]);
    let output = Hasher::new(16 * KIB, TorrentVersion::V1)
        .run(&items)
        .unwrap();
    assert_eq!(output.v1_pieces.len(), 3);
    assert!(output.files.is_empty());
}

#[test]
fn test_missing_file_fails() {
    let items = vec![StreamItem::File {
        path: "/nonexistent/btmeta-test".into(),
        length: 10,
    }];
    let result = Hasher::new(16 * KIB, TorrentVersion::V1).run(&items);
    assert!(matches!(result, Err(MetainfoError::Io(_))));
}

#[test]
fn test_length_mismatch_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut items = write_files(dir.path(), &[1000]);
    if let StreamItem::File { length, .. } = &mut items[0] {
        *length = 999;
    }
    let result = Hasher::new(16 * KIB, TorrentVersion::V1).run(&items);
    assert!(matches!(result, Err(MetainfoError::Invariant(_))));
}

#[test]
fn test_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let items = write_files(dir.path(), &[100_000]);
    let token = CancelToken::new();
    token.cancel();

    let result = Hasher::new(16 * KIB, TorrentVersion::V2)
        .cancel_token(token.clone())
        .run(&items);
    assert!(matches!(result, Err(MetainfoError::Cancelled)));

    let result = Hasher::new(16 * KIB, TorrentVersion::V2)
        .workers(2)
        .cancel_token(token)
        .run(&items);
    assert!(matches!(result, Err(MetainfoError::Cancelled)));
}
