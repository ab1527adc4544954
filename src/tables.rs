//! Fixed-point probability tables.
//!
//! The predictor works in two probability domains: a linear 15-bit domain
//! (0..32767, probability of a 1 bit) and a "stretched" signed 12-bit domain
//! (-2048..2047, the logit). `squash` maps stretched to linear, `stretch` is
//! its approximate inverse. Both are table lookups so every build of the
//! library produces identical output; the format fixes the tables down to
//! their truncating float-to-int conversions, verified here by the two
//! polynomial fingerprints below.
//!
//! `dt` is the reciprocal table used by the bounded-count update of CM and
//! SSE components, `dt2k` the match-length-to-confidence table of MATCH.

use std::sync::OnceLock;

/// All four lookup tables, built once per process.
pub(crate) struct Tables {
    squasht: Box<[u16; 4096]>,
    stretcht: Box<[i16; 32768]>,
    dt: Box<[i32; 1024]>,
    dt2k: Box<[u32; 256]>,
}

static TABLES: OnceLock<Tables> = OnceLock::new();

/// The shared table set.
pub(crate) fn get() -> &'static Tables {
    TABLES.get_or_init(Tables::build)
}

impl Tables {
    fn build() -> Tables {
        let mut squasht = Box::new([0u16; 4096]);
        for (i, q) in squasht.iter_mut().enumerate() {
            let x = (i as f64 - 2048.0) * (-1.0 / 64.0);
            *q = (32768.0 / (1.0 + x.exp())) as u16;
        }

        let mut stretcht = Box::new([0i16; 32768]);
        for (i, s) in stretcht.iter_mut().enumerate() {
            // The +100000 offset makes the truncating cast round half-up for
            // negative arguments as well.
            let x = ((i as f64 + 0.5) / (32767.5 - i as f64)).ln();
            *s = ((x * 64.0 + 0.5 + 100_000.0) as i32 - 100_000) as i16;
        }

        let mut dt = Box::new([0i32; 1024]);
        for (i, d) in dt.iter_mut().enumerate() {
            *d = (1 << 17) / (i as i32 * 2 + 3) * 2;
        }

        let mut dt2k = Box::new([0u32; 256]);
        for i in 1..256 {
            dt2k[i] = 2048 / i as u32;
        }

        let t = Tables {
            squasht,
            stretcht,
            dt,
            dt2k,
        };
        debug_assert_eq!(t.stretch_fingerprint(), 3_887_533_746);
        debug_assert_eq!(t.squash_fingerprint(), 2_278_286_169);
        t
    }

    /// Map a stretched prediction (-2048..=2047) to a 15-bit probability.
    #[inline]
    pub fn squash(&self, x: i32) -> i32 {
        debug_assert!((-2048..=2047).contains(&x));
        self.squasht[(x + 2048) as usize] as i32
    }

    /// Map a 15-bit probability (0..=32767) to its stretched value.
    #[inline]
    pub fn stretch(&self, p: i32) -> i32 {
        debug_assert!((0..=32767).contains(&p));
        self.stretcht[p as usize] as i32
    }

    /// Reciprocal step for a saturating count (0..=1023).
    #[inline]
    pub fn dt(&self, count: usize) -> i32 {
        self.dt[count]
    }

    /// Match-model confidence for a match length (0..=255).
    #[inline]
    pub fn dt2k(&self, len: u32) -> u32 {
        self.dt2k[len as usize]
    }

    /// Ternary polynomial hash over the stretch table, high index first.
    fn stretch_fingerprint(&self) -> u32 {
        let mut sum: u32 = 0;
        for i in (0..=32767).rev() {
            sum = sum.wrapping_mul(3).wrapping_add(self.stretch(i) as u32);
        }
        sum
    }

    /// Ternary polynomial hash over the squash table, high index first.
    fn squash_fingerprint(&self) -> u32 {
        let mut sum: u32 = 0;
        for i in (0..=4095).rev() {
            sum = sum.wrapping_mul(3).wrapping_add(self.squash(i - 2048) as u32);
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The two constant-sum fingerprints pin the floating-point construction
    /// bit-for-bit; any drift here breaks on-wire compatibility.
    #[test]
    fn fingerprints() {
        let t = get();
        assert_eq!(t.stretch_fingerprint(), 3_887_533_746);
        assert_eq!(t.squash_fingerprint(), 2_278_286_169);
    }

    #[test]
    fn squash_endpoints_and_midpoint() {
        let t = get();
        assert_eq!(t.squash(0), 16384);
        assert_eq!(t.squash(-2048), 0);
        // Near-certain prediction saturates just below 1.0.
        assert!(t.squash(2047) >= 32700 && t.squash(2047) <= 32767);
        // Monotone non-decreasing.
        let mut prev = -1;
        for x in -2048..=2047 {
            let q = t.squash(x);
            assert!(q >= prev);
            prev = q;
        }
    }

    #[test]
    fn stretch_is_odd_and_monotone() {
        let t = get();
        assert_eq!(t.stretch(16384), 0);
        // stretch(p) = -stretch(32767 - p) by symmetry of the logit.
        for p in [0, 1, 100, 5000, 16000] {
            assert_eq!(t.stretch(p), -t.stretch(32767 - p));
        }
        let mut prev = i32::MIN;
        for p in 0..=32767 {
            let s = t.stretch(p);
            assert!(s >= prev);
            prev = s;
        }
    }

    #[test]
    fn stretch_inverts_squash_midrange() {
        // Inversion only holds where the sigmoid is steep enough for one
        // probability step per stretched unit; the tails saturate.
        let t = get();
        for x in (-256..=256).step_by(7) {
            let p = t.squash(x);
            assert!((t.stretch(p) - x).abs() <= 2, "x={x} p={p}");
        }
    }

    #[test]
    fn dt_values() {
        let t = get();
        assert_eq!(t.dt(0), (1 << 17) / 3 * 2);
        assert_eq!(t.dt(1), (1 << 17) / 5 * 2);
        assert_eq!(t.dt(1023), (1 << 17) / 2049 * 2);
    }

    #[test]
    fn dt2k_values() {
        let t = get();
        assert_eq!(t.dt2k(0), 0);
        assert_eq!(t.dt2k(1), 2048);
        assert_eq!(t.dt2k(2), 1024);
        assert_eq!(t.dt2k(255), 2048 / 255);
    }
}
