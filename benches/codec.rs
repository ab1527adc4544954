//! Criterion benches: compression and decompression throughput per level.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zpaq::{compress, decompress, SliceReader};

/// 64 KiB of word-ish text: compressible but not degenerate.
fn sample_text() -> Vec<u8> {
    const WORDS: &[&str] = &[
        "archive", "block", "segment", "context", "mixing", "predictor", "probability",
        "arithmetic", "coder", "history", "hash", "component", "model", "stretch", "squash",
    ];
    let mut out = Vec::with_capacity(1 << 16);
    let mut x = 0x9E37_79B9u32;
    while out.len() < (1 << 16) {
        x = x.wrapping_mul(2_654_435_761).wrapping_add(1);
        out.extend_from_slice(WORDS[(x >> 24) as usize % WORDS.len()].as_bytes());
        out.push(b' ');
    }
    out.truncate(1 << 16);
    out
}

fn bench_compress(c: &mut Criterion) {
    let data = sample_text();
    let mut group = c.benchmark_group("compress");
    group.throughput(Throughput::Bytes(data.len() as u64));
    for level in [0u8, 1, 2] {
        group.bench_with_input(BenchmarkId::from_parameter(level), &level, |b, &level| {
            b.iter(|| {
                let mut archive = Vec::new();
                compress(&mut SliceReader::new(&data), &mut archive, level).unwrap();
                archive
            })
        });
    }
    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let data = sample_text();
    let mut group = c.benchmark_group("decompress");
    group.throughput(Throughput::Bytes(data.len() as u64));
    for level in [0u8, 1, 2] {
        let mut archive = Vec::new();
        compress(&mut SliceReader::new(&data), &mut archive, level).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(level), &archive, |b, archive| {
            b.iter(|| {
                let mut restored = Vec::new();
                decompress(&mut SliceReader::new(archive), &mut restored).unwrap();
                restored
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress);
criterion_main!(benches);
