//! The bit predictor.
//!
//! A `Predictor` owns the block's HCOMP machine and the component state, and
//! produces one probability per coded bit. For each bit, every component in
//! header order computes a stretched prediction `p[i]` from its tables, the
//! context hash `H[i]` left by the last HCOMP run, and the partial-byte
//! context; the final component's output, squashed, is the probability
//! handed to the arithmetic coder. After the coder reveals the bit, every
//! component trains on it, and on each completed byte HCOMP runs to refresh
//! the context hashes.
//!
//! Two small pieces of partial-byte bookkeeping thread through everything:
//! `c8`, the bits of the current byte prefixed with a 1 sentinel, and
//! `hmap4`, a 9-bit recoding of `c8` that is stable within a nibble so the
//! hash-table components only re-probe twice per byte.

pub(crate) mod component;

use crate::error::Result;
use crate::state_table::StateTable;
use crate::tables::{self, Tables};
use crate::vm::{OutSink, Vm, VmInput};
use component::{clamp2k, clamp512k, parse_components, Component, Desc};

/// Per-block bit predictor. Owns the HCOMP machine.
pub(crate) struct Predictor {
    pub vm: Vm,
    /// Current byte's bits behind a leading 1 (1..=255).
    c8: u32,
    /// Nibble-stable recoding of `c8` (1..=511).
    hmap4: u32,
    /// Stretched predictions, one per component.
    p: [i32; 256],
    descs: Vec<Desc>,
    comps: Vec<Component>,
    st: StateTable,
    t: &'static Tables,
}

impl Predictor {
    pub fn new(vm: Vm) -> Predictor {
        Predictor {
            vm,
            c8: 1,
            hmap4: 1,
            p: [0; 256],
            descs: Vec::new(),
            comps: Vec::new(),
            st: StateTable::new(),
            t: tables::get(),
        }
    }

    /// True when the block declares at least one component. With none, the
    /// segment data is stored bytes and no prediction happens.
    pub fn is_modeled(&self) -> bool {
        self.vm.n_components() > 0
    }

    /// Build the model declared by the header: validate the component list
    /// and allocate all tables. Must be called once per block, before the
    /// first bit.
    pub fn init(&mut self) -> Result<()> {
        self.vm.init_h()?;
        self.c8 = 1;
        self.hmap4 = 1;
        self.p = [0; 256];

        let n = self.vm.n_components();
        self.descs = parse_components(self.vm.comp_bytes(), n)?;
        self.comps = (0..n).map(|_| Component::new()).collect();
        for (i, desc) in self.descs.iter().enumerate() {
            self.comps[i].init(desc, &self.st, self.t);
            if let Desc::Const { c } = desc {
                self.p[i] = (*c as i32 - 128) * 4;
            }
        }
        tracing::debug!(
            components = n,
            memory = self.vm.memory_estimate(),
            "model initialized"
        );
        Ok(())
    }

    /// Probability (0..=32767) that the next bit is a 1.
    pub fn predict(&mut self) -> i32 {
        debug_assert!((1..=255).contains(&self.c8));
        let n = self.descs.len();
        for i in 0..n {
            let h = self.vm.h_at(i as u32);
            let cr = &mut self.comps[i];
            self.p[i] = match self.descs[i] {
                Desc::Const { .. } => self.p[i],

                Desc::Cm { .. } => {
                    cr.cxt = h ^ self.hmap4;
                    let v = cr.cm[cr.cm.wrap(cr.cxt)];
                    self.t.stretch((v >> 17) as i32)
                }

                Desc::Icm { sizebits } => {
                    if self.c8 == 1 || (self.c8 & 0xf0) == 16 {
                        cr.c = find(
                            &mut cr.ht,
                            sizebits as u32 + 2,
                            h.wrapping_add(16 * self.c8),
                        ) as u32;
                    }
                    cr.cxt = cr.ht[cr.c as usize + (self.hmap4 & 15) as usize] as u32;
                    let v = cr.cm[cr.cm.wrap(cr.cxt)];
                    self.t.stretch((v >> 8) as i32)
                }

                Desc::Match { .. } => {
                    if cr.a == 0 {
                        0
                    } else {
                        // Bit of the matched position, weighted by the
                        // confidence set at the last byte boundary.
                        let idx = cr.ht.wrap((cr.limit >> 3).wrapping_sub(cr.b));
                        cr.c = ((cr.ht[idx] >> (7 - (cr.limit & 7))) & 1) as u32;
                        let sign = if cr.c == 1 { -1 } else { 1 };
                        self.t.stretch((cr.cxt as i32 * sign) & 32767)
                    }
                }

                Desc::Avg { j, k, wt } => {
                    (self.p[j as usize] * wt as i32
                        + self.p[k as usize] * (256 - wt as i32))
                        >> 8
                }

                Desc::Mix2 { j, k, mask, .. } => {
                    cr.cxt = h.wrapping_add(self.c8 & mask as u32) & cr.c;
                    let w = cr.a16[cr.cxt as usize] as i32;
                    (w * self.p[j as usize] + (65536 - w) * self.p[k as usize]) >> 16
                }

                Desc::Mix { j, m, mask, .. } => {
                    let cxt = h.wrapping_add(self.c8 & mask as u32) & cr.c;
                    cr.cxt = cxt * m as u32; // weight row base
                    let mut sum = 0i32;
                    for k in 0..m as usize {
                        let w = cr.cm[cr.cxt as usize + k] as i32;
                        sum += (w >> 8) * self.p[j as usize + k];
                    }
                    clamp2k(sum >> 8)
                }

                Desc::Isse { sizebits, j } => {
                    if self.c8 == 1 || (self.c8 & 0xf0) == 16 {
                        cr.c = find(
                            &mut cr.ht,
                            sizebits as u32 + 2,
                            h.wrapping_add(16 * self.c8),
                        ) as u32;
                    }
                    cr.cxt = cr.ht[cr.c as usize + (self.hmap4 & 15) as usize] as u32;
                    let w0 = cr.cm[cr.cxt as usize * 2] as i32;
                    let w1 = cr.cm[cr.cxt as usize * 2 + 1] as i32;
                    clamp2k((w0 * self.p[j as usize] + w1 * 64) >> 16)
                }

                Desc::Sse { j, .. } => {
                    // Quantize the input prediction to a bin pair and
                    // interpolate; remember the nearer bin for training.
                    cr.cxt = h.wrapping_add(self.c8).wrapping_mul(32);
                    let pq = (self.p[j as usize] + 992).clamp(0, 1983);
                    let wt = pq & 63;
                    cr.cxt = cr.cxt.wrapping_add((pq >> 6) as u32);
                    let lo = (cr.cm[cr.cm.wrap(cr.cxt)] >> 10) as i32;
                    let hi = (cr.cm[cr.cm.wrap(cr.cxt.wrapping_add(1))] >> 10) as i32;
                    let out = self.t.stretch((lo * (64 - wt) + hi * wt) >> 13);
                    cr.cxt = cr.cxt.wrapping_add((wt >> 5) as u32);
                    out
                }
            };
            debug_assert!((-2048..2048).contains(&self.p[i]));
        }
        self.t.squash(self.p[n - 1])
    }

    /// Train every component on the revealed bit, then advance the
    /// partial-byte context, running HCOMP when a byte completes.
    pub fn update(&mut self, y: u32) -> Result<()> {
        debug_assert!(y < 2);
        let n = self.descs.len();
        for i in 0..n {
            let cr = &mut self.comps[i];
            match self.descs[i] {
                Desc::Const { .. } | Desc::Avg { .. } => {}

                Desc::Cm { .. } => train(cr, self.t, y),

                Desc::Icm { .. } => {
                    let slot = cr.c as usize + (self.hmap4 & 15) as usize;
                    cr.ht[slot] = self.st.next(cr.ht[slot], y);
                    let idx = cr.cm.wrap(cr.cxt);
                    let pn = cr.cm[idx];
                    let delta = ((y as i32 * 32767) - (pn >> 8) as i32) >> 2;
                    cr.cm[idx] = pn.wrapping_add(delta as u32);
                }

                Desc::Match { .. } => {
                    if cr.c != y {
                        cr.a = 0; // mismatch ends the match
                    }
                    let idx = cr.ht.wrap(cr.limit >> 3);
                    cr.ht[idx] = (cr.ht[idx] << 1).wrapping_add(y as u8);
                    cr.limit = cr.limit.wrapping_add(1);
                    if cr.limit & 7 == 0 {
                        let pos = cr.limit >> 3;
                        let h = self.vm.h_at(i as u32);
                        if cr.a == 0 {
                            // Look for a match against the position this
                            // context hash last occurred at.
                            cr.b = pos.wrapping_sub(cr.cm[cr.cm.wrap(h)]);
                            if cr.b & (cr.ht.len() as u32 - 1) != 0 {
                                while cr.a < 255 {
                                    let recent =
                                        cr.ht[cr.ht.wrap(pos.wrapping_sub(cr.a).wrapping_sub(1))];
                                    let matched = cr.ht[cr.ht.wrap(
                                        pos.wrapping_sub(cr.a)
                                            .wrapping_sub(cr.b)
                                            .wrapping_sub(1),
                                    )];
                                    if recent != matched {
                                        break;
                                    }
                                    cr.a += 1;
                                }
                            }
                        } else if cr.a < 255 {
                            cr.a += 1;
                        }
                        let idx = cr.cm.wrap(h);
                        cr.cm[idx] = pos;
                        if cr.a > 0 {
                            cr.cxt = self.t.dt2k(cr.a);
                        }
                    }
                }

                Desc::Mix2 { j, k, rate, .. } => {
                    let err = ((y as i32 * 32767 - self.t.squash(self.p[i])) * rate as i32) >> 5;
                    let mut w = cr.a16[cr.cxt as usize] as i32;
                    w += (err * (self.p[j as usize] - self.p[k as usize]) + (1 << 12)) >> 13;
                    cr.a16[cr.cxt as usize] = w.clamp(0, 65535) as u16;
                }

                Desc::Mix { j, m, rate, .. } => {
                    let err = ((y as i32 * 32767 - self.t.squash(self.p[i])) * rate as i32) >> 4;
                    for k in 0..m as usize {
                        let idx = cr.cxt as usize + k;
                        let w = cr.cm[idx] as i32;
                        let step = (err * self.p[j as usize + k] + (1 << 12)) >> 13;
                        cr.cm[idx] = clamp512k(w + step) as u32;
                    }
                }

                Desc::Isse { j, .. } => {
                    let err = y as i32 * 32767 - self.t.squash(self.p[i]);
                    let idx = cr.cxt as usize * 2;
                    let w0 = cr.cm[idx] as i32;
                    let w1 = cr.cm[idx + 1] as i32;
                    cr.cm[idx] = clamp512k(w0 + ((err * self.p[j as usize] + (1 << 12)) >> 13)) as u32;
                    cr.cm[idx + 1] = clamp512k(w1 + ((err + 16) >> 5)) as u32;
                    let slot = cr.c as usize + (self.hmap4 & 15) as usize;
                    cr.ht[slot] = self.st.next(cr.cxt as u8, y);
                }

                Desc::Sse { .. } => train(cr, self.t, y),
            }
        }

        // Advance the partial byte; on completion, refresh the context
        // hashes for the next byte.
        self.c8 = self.c8 * 2 + y;
        if self.c8 >= 256 {
            let byte = (self.c8 - 256) as u8;
            self.vm.run(VmInput::Byte(byte), &mut OutSink::none())?;
            self.hmap4 = 1;
            self.c8 = 1;
        } else if (16..32).contains(&self.c8) {
            self.hmap4 = (self.hmap4 & 0xf) << 5 | y << 4 | 1;
        } else {
            self.hmap4 = (self.hmap4 & 0x1f0) | (((self.hmap4 & 0xf) * 2 + y) & 0xf);
        }
        Ok(())
    }
}

/// Bounded-count Bayesian update shared by CM and SSE: the packed entry is a
/// 22-bit prediction over a 10-bit saturating count, and the step size is
/// the count's reciprocal.
#[inline]
fn train(cr: &mut Component, t: &Tables, y: u32) {
    let idx = cr.cm.wrap(cr.cxt);
    let pn = cr.cm[idx];
    let count = (pn & 0x3ff) as usize;
    let err = y as i32 * 32767 - (pn >> 17) as i32;
    let step = (err.wrapping_mul(t.dt(count)) & -1024) as u32;
    cr.cm[idx] = pn
        .wrapping_add(step)
        .wrapping_add((count < cr.limit as usize) as u32);
}

/// Probe the 16-byte-row hash table for `cxt`.
///
/// Row 0 of each row holds a checksum byte of the key's high bits; rows are
/// tried at `h0`, `h0^16`, `h0^32`. On a triple miss the row whose first
/// bit-history byte is smallest (the least established) is cleared and
/// reused. Returns the row base index.
fn find(ht: &mut crate::array::ZArray<u8>, sizebits: u32, cxt: u32) -> usize {
    debug_assert_eq!(ht.len(), 16 << sizebits);
    let chk = ((cxt >> sizebits) & 255) as u8;
    let h0 = cxt.wrapping_mul(16) as usize & (ht.len() - 16);
    if ht[h0] == chk {
        return h0;
    }
    let h1 = h0 ^ 16;
    if ht[h1] == chk {
        return h1;
    }
    let h2 = h0 ^ 32;
    if ht[h2] == chk {
        return h2;
    }
    let victim = if ht[h0 + 1] <= ht[h1 + 1] && ht[h0 + 1] <= ht[h2 + 1] {
        h0
    } else if ht[h1 + 1] < ht[h2 + 1] {
        h1
    } else {
        h2
    };
    for i in 0..16 {
        ht[victim + i] = 0;
    }
    ht[victim] = chk;
    victim
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ZArray;
    use crate::io::SliceReader;

    #[test]
    fn find_probes_and_evicts() {
        let mut ht: ZArray<u8> = ZArray::new(16, 4); // 16 rows of 16
        let sizebits = 4;

        // First lookup installs the checksum in the primary row.
        let cxt = 0x0123_4567u32;
        let r0 = find(&mut ht, sizebits, cxt);
        assert_eq!(r0 % 16, 0);
        assert_eq!(ht[r0], ((cxt >> sizebits) & 255) as u8);
        // Same key finds the same row.
        assert_eq!(find(&mut ht, sizebits, cxt), r0);

        // Mark r0 as established (nonzero first bit history). A colliding
        // key — same row bits, different checksum bits — must then take an
        // alternate row rather than evict it.
        ht[r0 + 1] = 200;
        let cxt2 = cxt ^ (0xFF << 4);
        let r1 = find(&mut ht, sizebits, cxt2);
        assert_ne!(r0, r1);
        assert!(r1 == r0 ^ 16 || r1 == r0 ^ 32);
        assert_eq!(find(&mut ht, sizebits, cxt2), r1);

        // With both occupied rows established, a third collision evicts the
        // remaining empty alternate.
        ht[r1 + 1] = 100;
        let cxt3 = cxt ^ (0x55 << 4);
        let r2 = find(&mut ht, sizebits, cxt3);
        assert_ne!(r2, r0);
        assert_ne!(r2, r1);

        // A fourth collision evicts the least established row (r2, still
        // all-zero histories), zeroing it and installing the new checksum.
        let cxt4 = cxt ^ (0xAA << 4);
        let r3 = find(&mut ht, sizebits, cxt4);
        assert_eq!(r3, r2);
        assert_ne!(r3, r0);
        assert_eq!(ht[r3], ((cxt4 >> sizebits) & 255) as u8);
        for i in 1..16 {
            assert_eq!(ht[r3 + i], 0);
        }
    }

    /// Drive a tiny one-CM model through a full byte and check the
    /// partial-byte bookkeeping.
    #[test]
    fn c8_and_hmap4_evolution() {
        let comp: &[u8] = &[2, 4, 10]; // CM 4 10
        let prog: &[u8] = &[56]; // HALT
        let hsize = 5 + comp.len() + 1 + prog.len() + 1;
        let mut hdr = vec![(hsize & 255) as u8, (hsize >> 8) as u8];
        hdr.extend_from_slice(&[2, 2, 0, 0, 1]);
        hdr.extend_from_slice(comp);
        hdr.push(0);
        hdr.extend_from_slice(prog);
        hdr.push(0);

        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(&hdr)).unwrap();
        let mut pr = Predictor::new(vm);
        pr.init().unwrap();
        assert!(pr.is_modeled());
        assert_eq!((pr.c8, pr.hmap4), (1, 1));

        // Feed the bits of 0b1010_1100 MSB-first.
        let bits = [1, 0, 1, 0, 1, 1, 0, 0];
        for (k, &y) in bits.iter().enumerate() {
            let p = pr.predict();
            assert!((0..=32767).contains(&p));
            pr.update(y).unwrap();
            if k < 7 {
                let prefix: u32 =
                    bits[..=k].iter().fold(1, |acc, &b| acc * 2 + b);
                assert_eq!(pr.c8, prefix);
            }
        }
        // Byte complete: both contexts reset.
        assert_eq!((pr.c8, pr.hmap4), (1, 1));
    }

    /// The first prediction of a fresh CM must be exactly 1/2.
    #[test]
    fn fresh_cm_predicts_half() {
        let comp: &[u8] = &[2, 4, 10];
        let prog: &[u8] = &[56];
        let hsize = 5 + comp.len() + 1 + prog.len() + 1;
        let mut hdr = vec![(hsize & 255) as u8, (hsize >> 8) as u8];
        hdr.extend_from_slice(&[2, 2, 0, 0, 1]);
        hdr.extend_from_slice(comp);
        hdr.push(0);
        hdr.extend_from_slice(prog);
        hdr.push(0);

        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(&hdr)).unwrap();
        let mut pr = Predictor::new(vm);
        pr.init().unwrap();
        assert_eq!(pr.predict(), 16384);
    }

    /// A CM trained on a constant bit stream must converge toward
    /// certainty.
    #[test]
    fn cm_learns_constant_stream() {
        let comp: &[u8] = &[2, 4, 255];
        let prog: &[u8] = &[56];
        let hsize = 5 + comp.len() + 1 + prog.len() + 1;
        let mut hdr = vec![(hsize & 255) as u8, (hsize >> 8) as u8];
        hdr.extend_from_slice(&[2, 2, 0, 0, 1]);
        hdr.extend_from_slice(comp);
        hdr.push(0);
        hdr.extend_from_slice(prog);
        hdr.push(0);

        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(&hdr)).unwrap();
        let mut pr = Predictor::new(vm);
        pr.init().unwrap();
        for _ in 0..64 {
            pr.predict();
            pr.update(1).unwrap();
        }
        assert!(pr.predict() > 30000, "p = {}", pr.predict());
    }
}
