//! Model components.
//!
//! A block's model is a list of up to 255 components, each predicting the
//! next bit from a context hash and the predictions of earlier components.
//! The wire descriptor for each component is a type byte followed by a
//! type-specific fixed number of argument bytes; [`parse_components`]
//! decodes and validates the list, and [`Component::init`] allocates the
//! per-component tables at the sizes the descriptor declares.

use crate::array::ZArray;
use crate::error::{Result, ZpaqError};
use crate::state_table::StateTable;
use crate::tables::Tables;

/// Serialized length of a descriptor (type byte included) per type byte,
/// or `None` for an unknown type.
pub(crate) fn descriptor_len(ty: u8) -> Option<usize> {
    const SIZES: [usize; 10] = [0, 2, 3, 2, 3, 4, 6, 6, 3, 5];
    match SIZES.get(ty as usize) {
        Some(&n) if n > 0 => Some(n),
        _ => None,
    }
}

/// A parsed component descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Desc {
    /// Fixed prediction `(c - 128) * 4` in the stretched domain.
    Const { c: u8 },
    /// Direct context model: `cm[cxt]` packs a 22-bit prediction over a
    /// 10-bit saturating count.
    Cm { sizebits: u8, limit: u8 },
    /// Indirect context model: hashed context selects a bit history, the
    /// bit history selects a prediction.
    Icm { sizebits: u8 },
    /// Order-k match model over a cyclic history buffer.
    Match { sizebits: u8, bufbits: u8 },
    /// Fixed-weight average of two earlier predictions.
    Avg { j: u8, k: u8, wt: u8 },
    /// Adaptive two-input mixer with a per-context weight.
    Mix2 { sizebits: u8, j: u8, k: u8, rate: u8, mask: u8 },
    /// Adaptive m-input mixer over components `j .. j+m-1`.
    Mix { sizebits: u8, j: u8, m: u8, rate: u8, mask: u8 },
    /// Indirect secondary estimator: bit history selects a weight pair.
    Isse { sizebits: u8, j: u8 },
    /// Direct secondary estimator over a quantized input prediction.
    Sse { sizebits: u8, j: u8, start: u8, limit: u8 },
}

/// Decode and statically validate the component list.
///
/// Validation enforces the constraints a decoder must check before
/// allocating: every cross-reference strictly earlier than the referring
/// component, `MIX.m` in `1..=i-j`, `SSE.start <= 4 * SSE.limit`, and the
/// per-type size caps (CM/MATCH/MIX2/MIX/ISSE/SSE 32 bits, ICM 26).
pub(crate) fn parse_components(comp: &[u8], n: usize) -> Result<Vec<Desc>> {
    let mut out = Vec::with_capacity(n);
    let mut cp = 0usize;
    for i in 0..n {
        if cp >= comp.len() {
            return Err(ZpaqError::HeaderInvalid("component list truncated"));
        }
        let ty = comp[cp];
        let len = descriptor_len(ty)
            .ok_or(ZpaqError::HeaderInvalid("unknown component type"))?;
        if cp + len > comp.len() {
            return Err(ZpaqError::HeaderInvalid("component list truncated"));
        }
        let arg = &comp[cp + 1..cp + len];
        let i = i as u8;
        let desc = match ty {
            1 => Desc::Const { c: arg[0] },
            2 => {
                if arg[0] > 32 {
                    return Err(ZpaqError::HeaderInvalid("CM size above 32 bits"));
                }
                Desc::Cm { sizebits: arg[0], limit: arg[1] }
            }
            3 => {
                if arg[0] > 26 {
                    return Err(ZpaqError::HeaderInvalid("ICM size above 26 bits"));
                }
                Desc::Icm { sizebits: arg[0] }
            }
            4 => {
                if arg[0] > 32 || arg[1] > 32 {
                    return Err(ZpaqError::HeaderInvalid("MATCH size above 32 bits"));
                }
                Desc::Match { sizebits: arg[0], bufbits: arg[1] }
            }
            5 => {
                if arg[0] >= i || arg[1] >= i {
                    return Err(ZpaqError::HeaderInvalid("AVG input not earlier than component"));
                }
                Desc::Avg { j: arg[0], k: arg[1], wt: arg[2] }
            }
            6 => {
                if arg[0] > 32 {
                    return Err(ZpaqError::HeaderInvalid("MIX2 size above 32 bits"));
                }
                if arg[1] >= i || arg[2] >= i {
                    return Err(ZpaqError::HeaderInvalid("MIX2 input not earlier than component"));
                }
                Desc::Mix2 { sizebits: arg[0], j: arg[1], k: arg[2], rate: arg[3], mask: arg[4] }
            }
            7 => {
                if arg[0] > 32 {
                    return Err(ZpaqError::HeaderInvalid("MIX size above 32 bits"));
                }
                if arg[1] >= i {
                    return Err(ZpaqError::HeaderInvalid("MIX input not earlier than component"));
                }
                if arg[2] < 1 || arg[2] > i - arg[1] {
                    return Err(ZpaqError::HeaderInvalid("MIX input count out of range"));
                }
                Desc::Mix { sizebits: arg[0], j: arg[1], m: arg[2], rate: arg[3], mask: arg[4] }
            }
            8 => {
                if arg[0] > 32 {
                    return Err(ZpaqError::HeaderInvalid("ISSE size above 32 bits"));
                }
                if arg[1] >= i {
                    return Err(ZpaqError::HeaderInvalid("ISSE input not earlier than component"));
                }
                Desc::Isse { sizebits: arg[0], j: arg[1] }
            }
            9 => {
                if arg[0] > 32 {
                    return Err(ZpaqError::HeaderInvalid("SSE size above 32 bits"));
                }
                if arg[1] >= i {
                    return Err(ZpaqError::HeaderInvalid("SSE input not earlier than component"));
                }
                if arg[2] as u32 > arg[3] as u32 * 4 {
                    return Err(ZpaqError::HeaderInvalid("SSE start above limit*4"));
                }
                Desc::Sse { sizebits: arg[0], j: arg[1], start: arg[2], limit: arg[3] }
            }
            _ => unreachable!(),
        };
        out.push(desc);
        cp += len;
    }
    Ok(out)
}

/// Per-component mutable state. All tables are zero at block start and
/// reinitialized by [`init`](Component::init).
pub(crate) struct Component {
    /// Saturation limit for the packed count (CM and SSE).
    pub limit: u32,
    /// Saved context: table index, bit history, or match confidence,
    /// depending on the variant.
    pub cxt: u32,
    /// MATCH: current match length 0..=255.
    pub a: u32,
    /// MATCH: offset back to the matched position.
    pub b: u32,
    /// MATCH: predicted bit. ICM/ISSE: hash-table row base index.
    /// MIX/MIX2: context mask.
    pub c: u32,
    /// Main table: packed predictions, mixer weights, or match positions.
    pub cm: ZArray<u32>,
    /// Byte table: bit-history rows, or the match history buffer.
    pub ht: ZArray<u8>,
    /// MIX2 per-context weights.
    pub a16: ZArray<u16>,
}

impl Component {
    pub fn new() -> Component {
        Component {
            limit: 0,
            cxt: 0,
            a: 0,
            b: 0,
            c: 0,
            cm: ZArray::empty(),
            ht: ZArray::empty(),
            a16: ZArray::empty(),
        }
    }

    /// Allocate and initialize state for `desc`.
    pub fn init(&mut self, desc: &Desc, st: &StateTable, t: &Tables) {
        *self = Component::new();
        match *desc {
            Desc::Const { .. } | Desc::Avg { .. } => {}
            Desc::Cm { sizebits, limit } => {
                self.cm = ZArray::new(1, sizebits as u32);
                self.limit = limit as u32 * 4;
                for j in 0..self.cm.len() {
                    self.cm[j] = 0x8000_0000; // p = 1/2, count = 0
                }
            }
            Desc::Icm { sizebits } => {
                self.limit = 1023;
                self.cm = ZArray::new(256, 0);
                self.ht = ZArray::new(64, sizebits as u32);
                for j in 0..256 {
                    self.cm[j] = st.cminit(j as u8);
                }
            }
            Desc::Match { sizebits, bufbits } => {
                self.cm = ZArray::new(1, sizebits as u32); // last position per hash
                self.ht = ZArray::new(1, bufbits as u32); // cyclic history
                self.ht[0] = 1;
            }
            Desc::Mix2 { sizebits, .. } => {
                self.c = ((1u64 << sizebits) - 1) as u32;
                self.a16 = ZArray::new(1, sizebits as u32);
                for j in 0..self.a16.len() {
                    self.a16[j] = 32768; // even weighting
                }
            }
            Desc::Mix { sizebits, m, .. } => {
                self.c = ((1u64 << sizebits) - 1) as u32;
                self.cm = ZArray::new(m as usize, sizebits as u32);
                for j in 0..self.cm.len() {
                    self.cm[j] = 65536 / m as u32;
                }
            }
            Desc::Isse { sizebits, .. } => {
                self.ht = ZArray::new(64, sizebits as u32);
                self.cm = ZArray::new(512, 0);
                for j in 0..256u32 {
                    // Weight pair per bit history: unit weight on the input
                    // prediction, bias from the history's own estimate.
                    self.cm[(j * 2) as usize] = 1 << 15;
                    let bias = clamp512k(t.stretch((st.cminit(j as u8) >> 8) as i32) << 10);
                    self.cm[(j * 2 + 1) as usize] = bias as u32;
                }
            }
            Desc::Sse { sizebits, start, limit, .. } => {
                self.cm = ZArray::new(32, sizebits as u32);
                self.limit = limit as u32 * 4;
                for j in 0..self.cm.len() {
                    let p = t.squash((j as i32 & 31) * 64 - 992) as u32;
                    self.cm[j] = (p << 17) | start as u32;
                }
            }
        }
    }
}

/// Bound a value to a signed 12-bit range (a stretched prediction).
#[inline]
pub(crate) fn clamp2k(x: i32) -> i32 {
    x.clamp(-2048, 2047)
}

/// Bound a value to a signed 20-bit range (a mixer weight).
#[inline]
pub(crate) fn clamp512k(x: i32) -> i32 {
    x.clamp(-(1 << 19), (1 << 19) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(bytes: &[u8], i: usize) -> Result<Vec<Desc>> {
        // Pad with earlier CONST components so cross-references to 0..i-1
        // are legal.
        let mut comp = Vec::new();
        for _ in 0..i {
            comp.extend_from_slice(&[1, 128]);
        }
        comp.extend_from_slice(bytes);
        parse_components(&comp, i + 1)
    }

    #[test]
    fn descriptor_lengths() {
        assert_eq!(descriptor_len(1), Some(2)); // CONST
        assert_eq!(descriptor_len(2), Some(3)); // CM
        assert_eq!(descriptor_len(3), Some(2)); // ICM
        assert_eq!(descriptor_len(4), Some(3)); // MATCH
        assert_eq!(descriptor_len(5), Some(4)); // AVG
        assert_eq!(descriptor_len(6), Some(6)); // MIX2
        assert_eq!(descriptor_len(7), Some(6)); // MIX
        assert_eq!(descriptor_len(8), Some(3)); // ISSE
        assert_eq!(descriptor_len(9), Some(5)); // SSE
        assert_eq!(descriptor_len(0), None);
        assert_eq!(descriptor_len(10), None);
        assert_eq!(descriptor_len(255), None);
    }

    #[test]
    fn parses_a_typical_graph() {
        // ICM 16, ISSE 19 0 — the "fast" configuration.
        let descs = parse_components(&[3, 16, 8, 19, 0], 2).unwrap();
        assert_eq!(descs[0], Desc::Icm { sizebits: 16 });
        assert_eq!(descs[1], Desc::Isse { sizebits: 19, j: 0 });
    }

    #[test]
    fn rejects_forward_references() {
        assert!(parse_one(&[8, 19, 1], 1).is_err()); // ISSE j == i
        assert!(parse_one(&[5, 2, 0, 128], 1).is_err()); // AVG j > i
        assert!(parse_one(&[6, 8, 0, 3, 24, 255], 2).is_err()); // MIX2 k > i
    }

    #[test]
    fn rejects_size_caps() {
        assert!(parse_one(&[2, 33, 4], 0).is_err()); // CM 33
        assert!(parse_one(&[3, 27], 0).is_err()); // ICM 27
        assert!(parse_one(&[4, 33, 8], 0).is_err()); // MATCH 33
        assert!(parse_one(&[4, 8, 33], 0).is_err()); // MATCH buf 33
        assert!(parse_one(&[2, 32, 4], 0).is_ok());
        assert!(parse_one(&[3, 26], 0).is_ok());
    }

    #[test]
    fn rejects_bad_mix_and_sse_args() {
        // MIX m = 0 and m > i - j.
        assert!(parse_one(&[7, 8, 0, 0, 24, 255], 2).is_err());
        assert!(parse_one(&[7, 8, 0, 3, 24, 255], 2).is_err());
        assert!(parse_one(&[7, 8, 0, 2, 24, 255], 2).is_ok());
        // SSE start > limit * 4.
        assert!(parse_one(&[9, 8, 0, 33, 8], 1).is_err());
        assert!(parse_one(&[9, 8, 0, 32, 8], 1).is_ok());
    }

    #[test]
    fn rejects_unknown_type_and_truncation() {
        assert!(parse_components(&[10, 0], 1).is_err());
        assert!(parse_components(&[2, 16], 1).is_err()); // CM missing limit
        assert!(parse_components(&[], 1).is_err());
    }

    #[test]
    fn cm_init_is_half_with_zero_count() {
        let st = StateTable::new();
        let t = crate::tables::get();
        let mut c = Component::new();
        c.init(&Desc::Cm { sizebits: 4, limit: 10 }, &st, t);
        assert_eq!(c.cm.len(), 16);
        assert_eq!(c.cm[0], 0x8000_0000);
        assert_eq!(c.limit, 40);
    }

    #[test]
    fn icm_maps_histories_through_cminit() {
        let st = StateTable::new();
        let t = crate::tables::get();
        let mut c = Component::new();
        c.init(&Desc::Icm { sizebits: 4 }, &st, t);
        assert_eq!(c.cm.len(), 256);
        assert_eq!(c.ht.len(), 64 << 4);
        assert_eq!(c.cm[0], st.cminit(0));
        assert_eq!(c.cm[255], st.cminit(255));
    }

    #[test]
    fn mix_weights_start_uniform() {
        let st = StateTable::new();
        let t = crate::tables::get();
        let mut c = Component::new();
        c.init(
            &Desc::Mix { sizebits: 3, j: 0, m: 4, rate: 24, mask: 255 },
            &st,
            t,
        );
        assert_eq!(c.cm.len(), 4 << 3);
        assert!((0..c.cm.len()).all(|i| c.cm[i] == 65536 / 4));
    }
}
