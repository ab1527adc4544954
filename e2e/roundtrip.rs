//! E2E Test Suite 01: Round-Trips
//!
//! Validates that every built-in level and hand-written model header
//! reproduces its input exactly, across empty, tiny, highly redundant and
//! incompressible payloads, and across multi-segment and multi-block
//! archives.

use sha1::{Digest, Sha1};
use zpaq::{compress, decompress, Compressor, Decompresser, SliceReader};

fn roundtrip(data: &[u8], level: u8) -> Vec<u8> {
    let mut archive = Vec::new();
    compress(&mut SliceReader::new(data), &mut archive, level).unwrap();
    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    restored
}

fn sha1_of(data: &[u8]) -> [u8; 20] {
    let mut h = Sha1::new();
    h.update(data);
    h.finalize().into()
}

/// A one-CM-component header: CM sizebits=5 limit=10, HALT-only context
/// program (every bit shares one context).
fn tiny_cm_header() -> Vec<u8> {
    let mut h = vec![11, 0]; // hsize
    h.extend_from_slice(&[0, 0, 0, 0, 1]); // hh hm ph pm n
    h.extend_from_slice(&[2, 5, 10]); // CM 5 10
    h.push(0);
    h.extend_from_slice(&[56, 0]); // HALT
    h
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: empty segment — 4 init bytes and one EOS bit still flow
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_segment_roundtrips() {
    let mut c = Compressor::new(Vec::new());
    c.start_block(&tiny_cm_header()).unwrap();
    c.start_segment("", "").unwrap();
    c.post_process(None).unwrap();
    c.end_segment(None).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    // Trailer byte 0xFE (no checksum) then end-of-block 0xFF.
    assert_eq!(archive[archive.len() - 2], 0xFE);
    assert_eq!(archive[archive.len() - 1], 0xFF);

    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    assert!(restored.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: single byte with checksum trailer
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_single_byte_with_checksum() {
    let data = [0x41u8];
    let mut c = Compressor::new(Vec::new());
    c.start_block(&tiny_cm_header()).unwrap();
    c.start_segment("", "").unwrap();
    c.post_process(None).unwrap();
    c.compress_byte(0x41).unwrap();
    c.end_segment(Some(&sha1_of(&data))).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    // Trailer is 0xFD followed by the 20-byte digest, then 0xFF.
    let n = archive.len();
    assert_eq!(archive[n - 22], 0xFD);
    assert_eq!(&archive[n - 21..n - 1], &sha1_of(&data));
    assert_eq!(archive[n - 1], 0xFF);

    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    assert_eq!(restored, data);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: all-zero kibibyte stays tiny through the CM
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_all_zero_1k_compresses_hard() {
    let data = vec![0u8; 1024];
    let mut c = Compressor::new(Vec::new());
    c.start_block(&tiny_cm_header()).unwrap();
    c.start_segment("", "").unwrap();
    c.post_process(None).unwrap();
    for &b in &data {
        c.compress_byte(b).unwrap();
    }
    c.end_segment(Some(&sha1_of(&data))).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    // Fixed framing: magic+level+type (5) + header (13) + segment head (4)
    // + zero tail (4) + trailer (21) + block end (1) = 48 bytes.
    let coded = archive.len() - 48;
    assert!(coded <= 40, "coded {} bytes", coded);

    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    assert_eq!(restored, data);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: two segments share one block's model
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_two_segments_in_one_block() {
    let mut c = Compressor::new(Vec::new());
    c.start_block_level(2).unwrap();
    c.start_segment("first", "5").unwrap();
    c.post_process(None).unwrap();
    for &b in b"hello" {
        c.compress_byte(b).unwrap();
    }
    c.end_segment(Some(&sha1_of(b"hello"))).unwrap();
    c.start_segment("second", "5").unwrap();
    for &b in b"world" {
        c.compress_byte(b).unwrap();
    }
    c.end_segment(Some(&sha1_of(b"world"))).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    let mut d = Decompresser::new(SliceReader::new(&archive));
    assert!(d.find_block().unwrap());

    let name = d.find_filename().unwrap().unwrap();
    assert_eq!(name, b"first");
    assert_eq!(d.read_comment().unwrap(), b"5");
    let mut out = Vec::new();
    d.decompress_segment(&mut out).unwrap();
    assert!(d.read_segment_end().unwrap().is_some());
    assert_eq!(out, b"hello");

    let name = d.find_filename().unwrap().unwrap();
    assert_eq!(name, b"second");
    d.read_comment().unwrap();
    let mut out = Vec::new();
    d.decompress_segment(&mut out).unwrap();
    assert!(d.read_segment_end().unwrap().is_some());
    assert_eq!(out, b"world");

    assert!(d.find_filename().unwrap().is_none()); // end of block
    assert!(!d.find_block().unwrap()); // end of archive
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: all levels, assorted payloads
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_levels_on_text() {
    let data = b"The quick brown fox jumps over the lazy dog. ".repeat(40);
    for level in 0..=3 {
        assert_eq!(roundtrip(&data, level), data, "level {level}");
    }
}

#[test]
fn test_levels_on_pseudorandom_bytes() {
    // LCG byte soup: essentially incompressible but must round-trip.
    let mut x = 0x2545_F491u32;
    let data: Vec<u8> = (0..4096)
        .map(|_| {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (x >> 16) as u8
        })
        .collect();
    for level in 0..=3 {
        assert_eq!(roundtrip(&data, level), data, "level {level}");
    }
}

#[test]
fn test_levels_on_binary_with_zeros() {
    let mut data = vec![0u8; 512];
    data.extend_from_slice(&[0xFF; 512]);
    data.extend((0..=255u8).cycle().take(1024));
    for level in 0..=3 {
        assert_eq!(roundtrip(&data, level), data, "level {level}");
    }
}

#[test]
fn test_redundant_text_actually_compresses() {
    let data = b"compression ".repeat(1000);
    let mut archive = Vec::new();
    compress(&mut SliceReader::new(&data), &mut archive, 2).unwrap();
    assert!(
        archive.len() < data.len() / 4,
        "archive {} vs input {}",
        archive.len(),
        data.len()
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: multiple blocks in one archive
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_multi_block_archive() {
    let mut archive = Vec::new();
    compress(&mut SliceReader::new(b"block one"), &mut archive, 1).unwrap();
    compress(&mut SliceReader::new(b"block two"), &mut archive, 2).unwrap();
    compress(&mut SliceReader::new(b"block three"), &mut archive, 0).unwrap();

    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    assert_eq!(restored, b"block oneblock twoblock three");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: store level keeps bytes verbatim inside the framing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_store_level_embeds_raw_bytes() {
    let data = b"plainly stored payload";
    let mut archive = Vec::new();
    compress(&mut SliceReader::new(data), &mut archive, 0).unwrap();
    // The payload appears verbatim (after the one-byte pass-through flag in
    // the first chunk).
    assert!(archive.windows(data.len()).any(|w| w == &data[..]));
    assert_eq!(roundtrip(data, 0), data);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 8: determinism — same input, same archive
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_compression_is_deterministic() {
    let data = b"determinism test payload, repeated a little ".repeat(30);
    let mut a1 = Vec::new();
    let mut a2 = Vec::new();
    compress(&mut SliceReader::new(&data), &mut a1, 2).unwrap();
    compress(&mut SliceReader::new(&data), &mut a2, 2).unwrap();
    assert_eq!(a1, a2);
}
