//! E2E Test Suite 02: Framing
//!
//! Validates the byte-level archive structure: magic and level bytes, the
//! locator tag, resynchronization over foreign prefixes, segment walking
//! without decoding, and header re-serialization for listings.

use zpaq::{compress, decompress, Compressor, Decompresser, SliceReader, LOCATOR_TAG, MAGIC};

fn small_archive(payload: &[u8], level: u8) -> Vec<u8> {
    let mut archive = Vec::new();
    compress(&mut SliceReader::new(payload), &mut archive, level).unwrap();
    archive
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: archives open with zPQ, level 2, type 1
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_archive_magic_and_level() {
    let archive = small_archive(b"x", 1);
    assert_eq!(&archive[..3], &MAGIC);
    assert_eq!(archive[3], zpaq::ZPAQ_LEVEL);
    assert_eq!(archive[3], 2);
    assert_eq!(archive[4], 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: the locator tag precedes blocks when requested
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_write_tag_emits_the_13_byte_tag() {
    let mut c = Compressor::new(Vec::new());
    c.write_tag().unwrap();
    c.start_block_level(1).unwrap();
    c.start_segment("f", "").unwrap();
    c.post_process(None).unwrap();
    c.compress_byte(b'z').unwrap();
    c.end_segment(None).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    assert_eq!(&archive[..13], &LOCATOR_TAG);
    assert_eq!(&archive[13..16], &MAGIC);

    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    assert_eq!(restored, b"z");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: resynchronization — junk before a tagged block is ignored
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_junk_prefix_before_tagged_block() {
    let data = b"payload under junk";
    let mut tagged = Vec::new();
    {
        let mut c = Compressor::new(&mut tagged);
        c.write_tag().unwrap();
        c.start_block_level(2).unwrap();
        c.start_segment("", "").unwrap();
        c.post_process(None).unwrap();
        assert!(!c.compress(&mut SliceReader::new(data), None).unwrap());
        c.end_segment(None).unwrap();
        c.end_block().unwrap();
    }

    let mut stream: Vec<u8> = b"this is not a zpaq archive at all ........".to_vec();
    stream.extend((0u32..500).map(|i| (i * 31 % 251) as u8));
    stream.extend_from_slice(&tagged);

    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&stream), &mut restored).unwrap();
    assert_eq!(restored, data);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: concatenated archives decode as consecutive blocks
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_concatenated_archives() {
    let mut stream = small_archive(b"alpha ", 1);
    stream.extend_from_slice(&small_archive(b"beta", 3));
    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&stream), &mut restored).unwrap();
    assert_eq!(restored, b"alpha beta");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: walking segments without decoding (listing path)
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_skip_segments_without_decoding() {
    let mut c = Compressor::new(Vec::new());
    c.start_block_level(2).unwrap();
    c.start_segment("a.txt", "3").unwrap();
    c.post_process(None).unwrap();
    for &b in b"abc" {
        c.compress_byte(b).unwrap();
    }
    c.end_segment(None).unwrap();
    c.start_segment("b.txt", "4").unwrap();
    for &b in b"defg" {
        c.compress_byte(b).unwrap();
    }
    c.end_segment(None).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    let mut d = Decompresser::new(SliceReader::new(&archive));
    assert!(d.find_block().unwrap());
    let mut names = Vec::new();
    while let Some(name) = d.find_filename().unwrap() {
        d.read_comment().unwrap();
        // No decompress_segment: read_segment_end skips the data.
        assert!(d.read_segment_end().unwrap().is_none());
        names.push(String::from_utf8(name).unwrap());
    }
    assert_eq!(names, ["a.txt", "b.txt"]);
    assert!(!d.find_block().unwrap());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: decoding after a skipped segment of the same block is refused
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_decode_after_skip_is_refused() {
    let mut c = Compressor::new(Vec::new());
    c.start_block_level(1).unwrap();
    c.start_segment("a", "").unwrap();
    c.post_process(None).unwrap();
    c.compress_byte(b'1').unwrap();
    c.end_segment(None).unwrap();
    c.start_segment("b", "").unwrap();
    c.compress_byte(b'2').unwrap();
    c.end_segment(None).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    let mut d = Decompresser::new(SliceReader::new(&archive));
    assert!(d.find_block().unwrap());
    d.find_filename().unwrap().unwrap();
    d.read_comment().unwrap();
    d.read_segment_end().unwrap(); // skip segment "a"
    d.find_filename().unwrap().unwrap();
    d.read_comment().unwrap();
    let mut out = Vec::new();
    assert!(d.decompress_segment(&mut out).is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: the block header round-trips through the listing writer
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_hcomp_reserialization() {
    let archive = small_archive(b"header echo", 2);
    let mut d = Decompresser::new(SliceReader::new(&archive));
    assert!(d.find_block().unwrap());
    let mut header = Vec::new();
    assert!(d.hcomp(&mut header).unwrap());
    assert_eq!(header, zpaq::models::MID);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 8: memory estimate is sane and header-driven
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_memory_estimate_grows_with_level() {
    let mut mems = Vec::new();
    for level in 1..=3 {
        let archive = small_archive(b"m", level);
        let mut d = Decompresser::new(SliceReader::new(&archive));
        assert!(d.find_block().unwrap());
        mems.push(d.memory_estimate());
    }
    assert!(mems[0] < mems[1] && mems[1] < mems[2], "{mems:?}");
}
