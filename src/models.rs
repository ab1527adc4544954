//! Built-in compression models.
//!
//! Each model is an ordinary serialized block header (2-byte length prefix
//! included), consumed through the same parser as any caller-provided
//! header. They are configuration presets, nothing more — decoding never
//! depends on recognizing them.
//!
//! - level 0: no components; segment data is stored in counted chunks.
//! - level 1 "fast": an order-2 indirect context model refined by an
//!   order-4 indirect secondary estimator.
//! - level 2 "mid": a chain of indirect models of increasing order, a match
//!   model, and an adaptive mixer over all of them.
//! - level 3 "max": the mid graph widened with a word model, sparse
//!   contexts, and two SSE stages under adaptive 2-input mixers.

/// Level 0: store. Minimal header with `n = 0` and a HALT-only program.
pub const STORE: &[u8] = &[8, 0, 0, 0, 0, 0, 0, 0, 56, 0];

/// Level 1: ICM-ISSE chain, 2 components.
pub const FAST: &[u8] = &[
    26, 0, 1, 2, 0, 0, 2, 3, 16, 8, 19, 0, 0, // header: ICM 16, ISSE 19 0
    96, 4, 28, // hcomp: *B=A, A=0, D=0
    59, 10, 59, 112, 25, 10, 59, 10, 59, 112, 56, 0,
];

/// Level 2: ICM-ISSE chain of orders 0..5, match model, mixer; 8 components.
pub const MID: &[u8] = &[
    69, 0, 3, 3, 0, 0, 8, 3, 5, 8, 13, 0, 8, 17, 1, 8, //
    18, 2, 8, 18, 3, 8, 19, 4, 4, 22, 24, 7, 16, 0, 7, 24, //
    255, 0, // MIX 16 0 7 24 255
    // hcomp: hash orders 1..5, word-ish order 0, match and mix contexts
    17, 104, 74, 4, 95, 1, 59, 112, 10, 25, 59, 112, 10, 25, 59, 112, //
    10, 25, 59, 112, 10, 25, 59, 112, 10, 25, 59, 10, 59, 112, 25, 69, //
    207, 8, 112, 56, 0,
];

/// Level 3: the mid graph plus word/sparse contexts and two SSE stages;
/// 22 components.
pub const MAX: &[u8] = &[
    196, 0, 5, 9, 0, 0, 22, 1, 160, 3, 5, 8, 13, 1, 8, 16, //
    2, 8, 18, 3, 8, 19, 4, 8, 19, 5, 8, 20, 6, 4, 22, 24, //
    3, 17, 8, 19, 9, 3, 13, 3, 13, 3, 13, 3, 14, 7, 16, 0, //
    15, 24, 255, 7, 8, 0, 16, 10, 255, 6, 0, 15, 16, 24, 0, 9, //
    8, 17, 32, 255, 6, 8, 17, 18, 16, 255, 9, 16, 19, 32, 255, 6, //
    0, 19, 20, 16, 0, 0, //
    // hcomp
    17, 104, 74, 4, 95, 2, 59, 112, 10, 25, //
    59, 112, 10, 25, 59, 112, 10, 25, 59, 112, 10, 25, 59, 112, 10, 25, //
    59, 10, 59, 112, 10, 25, 59, 112, 10, 25, 69, 183, 32, 239, 64, 47, //
    14, 231, 91, 47, 10, 25, 60, 26, 48, 134, 151, 20, 112, 63, 9, 70, //
    223, 0, 39, 3, 25, 112, 26, 52, 25, 25, 74, 10, 4, 59, 112, 25, //
    10, 4, 59, 112, 25, 10, 4, 59, 112, 25, 65, 143, 212, 72, 4, 59, //
    112, 8, 143, 216, 8, 68, 175, 60, 60, 25, 69, 207, 9, 112, 25, 25, //
    25, 25, 25, 112, 56, 0,
];

/// The serialized header for a compression level, 0..=3.
pub fn by_level(level: u8) -> Option<&'static [u8]> {
    match level {
        0 => Some(STORE),
        1 => Some(FAST),
        2 => Some(MID),
        3 => Some(MAX),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceReader;
    use crate::model::Predictor;
    use crate::vm::Vm;

    /// Every model's 2-byte length prefix matches its actual body length.
    #[test]
    fn length_prefixes_are_consistent() {
        for (name, m) in [("store", STORE), ("fast", FAST), ("mid", MID), ("max", MAX)] {
            let declared = m[0] as usize | ((m[1] as usize) << 8);
            assert_eq!(declared + 2, m.len(), "{name}");
        }
    }

    /// Every model parses and builds a predictor.
    #[test]
    fn models_parse_and_initialize() {
        for (name, m, n) in [
            ("store", STORE, 0usize),
            ("fast", FAST, 2),
            ("mid", MID, 8),
            ("max", MAX, 22),
        ] {
            let mut vm = Vm::new();
            let read = vm
                .read_header(&mut SliceReader::new(m))
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(read, m.len(), "{name}");
            assert_eq!(vm.n_components(), n, "{name}");
            let mut pr = Predictor::new(vm);
            pr.init().unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(pr.is_modeled(), n > 0, "{name}");
        }
    }

    #[test]
    fn by_level_bounds() {
        assert!(by_level(0).is_some());
        assert!(by_level(3).is_some());
        assert!(by_level(4).is_none());
    }
}
