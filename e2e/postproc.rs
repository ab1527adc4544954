//! E2E Test Suite 04: Post-Processing
//!
//! Validates the embedded post-processor path: program transmission inside
//! the coded stream, per-byte execution, the end-of-segment sentinel run,
//! and the checksum contract over post-processed output.

use sha1::{Digest, Sha1};
use zpaq::{decompress, Compressor, Decompresser, SliceReader};

fn sha1_of(data: &[u8]) -> [u8; 20] {
    let mut h = Sha1::new();
    h.update(data);
    h.finalize().into()
}

/// Serialize a PCOMP program: 2-byte little-endian length prefix over the
/// program bytes (trailing guard byte included).
fn pcomp(prog: &[u8]) -> Vec<u8> {
    let mut p = vec![(prog.len() & 255) as u8, (prog.len() >> 8) as u8];
    p.extend_from_slice(prog);
    p
}

/// Echo every input byte, suppressing output on the end-of-segment
/// sentinel: A > 255? skip OUT.
const ECHO: &[u8] = &[239, 255, 39, 1, 57, 56, 0];

/// Add one to every input byte; nothing at end of segment.
const ADD_ONE: &[u8] = &[239, 255, 39, 3, 135, 1, 57, 56, 0];

/// Emit a single 'X' at end of segment and swallow all data bytes.
const EOF_MARKER: &[u8] = &[239, 255, 47, 3, 71, 88, 57, 56, 0];

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: identity post-processor round-trips
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_echo_program_roundtrips() {
    let data = b"post-processed but unchanged";
    let mut c = Compressor::new(Vec::new());
    c.start_block_level(2).unwrap();
    c.start_segment("echo", "").unwrap();
    c.post_process(Some(&pcomp(ECHO))).unwrap();
    for &b in data {
        c.compress_byte(b).unwrap();
    }
    c.end_segment(Some(&sha1_of(data))).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    assert_eq!(restored, data);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: transforming post-processor, checksum over the *output*
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_transforming_program_and_checksum_contract() {
    // The archive stores each byte decremented; the program re-adds one.
    // The trailer checksum covers the post-processed output, not the
    // stored intermediate.
    let plain = b"hello";
    let stored: Vec<u8> = plain.iter().map(|&b| b - 1).collect();

    let mut c = Compressor::new(Vec::new());
    c.start_block_level(1).unwrap();
    c.start_segment("shifted", "").unwrap();
    c.post_process(Some(&pcomp(ADD_ONE))).unwrap();
    for &b in &stored {
        c.compress_byte(b).unwrap();
    }
    c.end_segment(Some(&sha1_of(plain))).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    // Verification on: the stored digest must match the transformed output.
    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    assert_eq!(restored, plain);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: the end-of-segment sentinel runs exactly once
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_eof_marker_program() {
    let mut c = Compressor::new(Vec::new());
    c.start_block_level(1).unwrap();
    c.start_segment("marker", "").unwrap();
    c.post_process(Some(&pcomp(EOF_MARKER))).unwrap();
    for &b in b"all of this is swallowed" {
        c.compress_byte(b).unwrap();
    }
    c.end_segment(Some(&sha1_of(b"X"))).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    assert_eq!(restored, b"X");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: one program serves every segment of its block
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_program_is_per_block_not_per_segment() {
    let mut c = Compressor::new(Vec::new());
    c.start_block_level(1).unwrap();
    c.start_segment("a", "").unwrap();
    c.post_process(Some(&pcomp(ADD_ONE))).unwrap();
    for &b in b"`a" {
        c.compress_byte(b).unwrap();
    }
    c.end_segment(None).unwrap();
    // Second segment: no post_process call; the block's program applies.
    c.start_segment("b", "").unwrap();
    for &b in b"bc" {
        c.compress_byte(b).unwrap();
    }
    c.end_segment(None).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    assert_eq!(restored, b"abcd");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: the loaded program is visible to listings
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_pcomp_listing_after_decode() {
    let data = b"listed";
    let mut c = Compressor::new(Vec::new());
    c.start_block_level(1).unwrap();
    c.start_segment("", "").unwrap();
    c.post_process(Some(&pcomp(ECHO))).unwrap();
    for &b in data {
        c.compress_byte(b).unwrap();
    }
    c.end_segment(None).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    let mut d = Decompresser::new(SliceReader::new(&archive));
    assert!(d.find_block().unwrap());

    // Before any decoding there is no program to show.
    let mut listing = Vec::new();
    assert!(!d.pcomp(&mut listing).unwrap());

    d.find_filename().unwrap().unwrap();
    d.read_comment().unwrap();
    let mut out = Vec::new();
    d.decompress_segment(&mut out).unwrap();
    d.read_segment_end().unwrap();
    assert_eq!(out, data);

    // After decoding, the program re-serializes exactly as embedded.
    assert!(d.has_postprocessor());
    let mut listing = Vec::new();
    assert!(d.pcomp(&mut listing).unwrap());
    assert_eq!(listing, pcomp(ECHO));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: pass-through blocks report no program
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_pass_through_has_no_program() {
    let mut archive = Vec::new();
    zpaq::compress(&mut SliceReader::new(b"plain"), &mut archive, 1).unwrap();
    let mut d = Decompresser::new(SliceReader::new(&archive));
    assert!(d.find_block().unwrap());
    d.find_filename().unwrap().unwrap();
    d.read_comment().unwrap();
    let mut out = Vec::new();
    d.decompress_segment(&mut out).unwrap();
    d.read_segment_end().unwrap();
    assert!(!d.has_postprocessor());
    let mut listing = Vec::new();
    assert!(!d.pcomp(&mut listing).unwrap());
    assert!(listing.is_empty());
}
