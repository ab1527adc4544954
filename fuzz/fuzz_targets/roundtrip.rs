#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: &[u8]| {
    // First byte selects the level, the rest is payload.
    let Some((&sel, payload)) = input.split_first() else {
        return;
    };
    let level = sel % 4;
    let mut archive = Vec::new();
    zpaq::compress(&mut zpaq::SliceReader::new(payload), &mut archive, level)
        .expect("compression of valid input cannot fail");
    let mut restored = Vec::new();
    zpaq::decompress(&mut zpaq::SliceReader::new(&archive), &mut restored)
        .expect("round-trip decode cannot fail");
    assert_eq!(restored, payload);
});
