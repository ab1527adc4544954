//! E2E Test Suite 05: Properties
//!
//! Randomized round-trip checks across levels, segmentations and framing
//! prefixes. Each property decodes what it just encoded, so the coder and
//! model exercise each other on every sample.

use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use sha1::{Digest, Sha1};
use zpaq::{compress, decompress, Compressor, SliceReader};

fn sha1_of(data: &[u8]) -> [u8; 20] {
    let mut h = Sha1::new();
    h.update(data);
    h.finalize().into()
}

#[quickcheck]
fn prop_roundtrip_any_payload_any_level(data: Vec<u8>, level: u8) -> bool {
    let level = level % 4;
    let mut archive = Vec::new();
    compress(&mut SliceReader::new(&data), &mut archive, level).unwrap();
    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    restored == data
}

#[quickcheck]
fn prop_roundtrip_two_segments(a: Vec<u8>, b: Vec<u8>, level: u8) -> TestResult {
    let level = level % 3 + 1; // modeled levels only
    let mut c = Compressor::new(Vec::new());
    c.start_block_level(level).unwrap();
    c.start_segment("a", "").unwrap();
    c.post_process(None).unwrap();
    for &x in &a {
        c.compress_byte(x).unwrap();
    }
    c.end_segment(Some(&sha1_of(&a))).unwrap();
    c.start_segment("b", "").unwrap();
    for &x in &b {
        c.compress_byte(x).unwrap();
    }
    c.end_segment(Some(&sha1_of(&b))).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&archive), &mut restored).unwrap();
    let mut expect = a.clone();
    expect.extend_from_slice(&b);
    TestResult::from_bool(restored == expect)
}

#[quickcheck]
fn prop_foreign_prefix_is_skipped(junk: Vec<u8>, data: Vec<u8>) -> bool {
    // Build a tagged archive and bury it under arbitrary bytes. A leading
    // guard byte keeps the junk from accidentally *being* a block start
    // (the magic is only recognized mid-stream after the tag).
    let mut c = Compressor::new(Vec::new());
    c.write_tag().unwrap();
    c.start_block_level(1).unwrap();
    c.start_segment("", "").unwrap();
    c.post_process(None).unwrap();
    for &x in &data {
        c.compress_byte(x).unwrap();
    }
    c.end_segment(Some(&sha1_of(&data))).unwrap();
    c.end_block().unwrap();
    let archive = c.into_inner();

    let mut stream = vec![0xEEu8];
    stream.extend_from_slice(&junk);
    stream.extend_from_slice(&archive);

    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&stream), &mut restored).unwrap();
    restored == data
}

#[quickcheck]
fn prop_store_level_size_overhead_is_bounded(data: Vec<u8>) -> bool {
    let mut archive = Vec::new();
    compress(&mut SliceReader::new(&data), &mut archive, 0).unwrap();
    // Fixed framing plus 4 bytes per 64 KiB chunk plus the flag byte.
    let chunks = 1 + data.len() / (1 << 16);
    archive.len() <= data.len() + 64 + 4 * chunks
}

#[quickcheck]
fn prop_compression_is_deterministic(data: Vec<u8>, level: u8) -> bool {
    let level = level % 4;
    let mut a1 = Vec::new();
    let mut a2 = Vec::new();
    compress(&mut SliceReader::new(&data), &mut a1, level).unwrap();
    compress(&mut SliceReader::new(&data), &mut a2, level).unwrap();
    a1 == a2
}

#[quickcheck]
fn prop_archives_never_hide_a_locator_tag_break(data: Vec<u8>) -> TestResult {
    // Appending a second tagged block right after a first one must keep
    // both decodable — i.e. a block's coded data never swallows the
    // following tag.
    if data.len() > 2000 {
        return TestResult::discard();
    }
    let mut stream = Vec::new();
    for _ in 0..2 {
        let mut c = Compressor::new(&mut stream);
        c.write_tag().unwrap();
        c.start_block_level(1).unwrap();
        c.start_segment("", "").unwrap();
        c.post_process(None).unwrap();
        for &x in &data {
            c.compress_byte(x).unwrap();
        }
        c.end_segment(None).unwrap();
        c.end_block().unwrap();
    }
    let mut restored = Vec::new();
    decompress(&mut SliceReader::new(&stream), &mut restored).unwrap();
    let mut expect = data.clone();
    expect.extend_from_slice(&data);
    TestResult::from_bool(restored == expect)
}
