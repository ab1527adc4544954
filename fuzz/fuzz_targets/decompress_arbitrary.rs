#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes through the decompressor: errors are expected and
    // fine, panics are not.
    let mut out = Vec::new();
    let _ = zpaq::decompress(&mut zpaq::SliceReader::new(data), &mut out);
});
