//! Archive framing.
//!
//! At the byte level an archive is one or more blocks, each introduced by
//! the magic `zPQ`, a level byte (1 or 2) and a type byte (1), followed by
//! the serialized machine header and one or more segments. A standalone
//! 13-byte locator tag may precede any block so archives remain findable
//! when appended to arbitrary data.
//!
//! Block starts are located with four simultaneous rolling hashes over a
//! 16-byte window (the tag plus the magic). Each multiplier is divisible by
//! four, so every hash forgets anything older than 16 bytes; the initial
//! state equals the tag's own contribution, which makes a stream that opens
//! directly with `zPQ` match too. Four independent 32-bit checks make
//! accidental matches in foreign data vanishingly unlikely.

pub(crate) mod compressor;
pub(crate) mod decompressor;
pub(crate) mod postproc;

pub use compressor::Compressor;
pub use decompressor::Decompresser;

use crate::error::Result;
use crate::io::ByteReader;

/// Block magic, immediately after the optional locator tag.
pub const MAGIC: [u8; 3] = *b"zPQ";

/// The standalone 13-byte locator tag.
pub const LOCATOR_TAG: [u8; 13] = [
    0x37, 0x6B, 0x53, 0x74, 0xA0, 0x31, 0x83, 0xD3, 0x8C, 0xB2, 0x28, 0xB0, 0xD3,
];

/// Rolling-hash multipliers. All divisible by 4: `m^16 == 0 (mod 2^32)`.
const ROLL_MULT: [u32; 4] = [12, 20, 28, 44];

/// Hash state equal to the locator tag's own contribution from zero.
const ROLL_INIT: [u32; 4] = [0x3D49_B113, 0x29EB_7F93, 0x2614_BE13, 0x3828_EB13];

/// Hash state after the tag plus `zPQ`.
const ROLL_CHECK: [u32; 4] = [0xB16B_88F1, 0xFF53_76F1, 0x72AC_5BF1, 0x2F90_9AF1];

/// Consume input up to and including the next block magic (tagged or bare).
/// Returns false at end of input, with the stream positioned after `zPQ`
/// on success.
pub(crate) fn scan_to_block<R: ByteReader + ?Sized>(input: &mut R) -> Result<bool> {
    let mut h = ROLL_INIT;
    let mut skipped = 0u64;
    while let Some(c) = input.get()? {
        for (hi, &m) in h.iter_mut().zip(&ROLL_MULT) {
            *hi = hi.wrapping_mul(m).wrapping_add(c as u32);
        }
        if h == ROLL_CHECK {
            if skipped > 2 {
                tracing::debug!(skipped = skipped - 2, "resynchronized to block magic");
            }
            return Ok(true);
        }
        skipped += 1;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceReader;

    /// A stream that opens directly with the magic matches after 3 bytes.
    #[test]
    fn bare_magic_matches() {
        let mut r = SliceReader::new(b"zPQ\x02\x01rest");
        assert!(scan_to_block(&mut r).unwrap());
        assert_eq!(r.position(), 3);
    }

    /// The initial hash state is exactly the tag's contribution, so
    /// tag-then-magic matches at the same point.
    #[test]
    fn tagged_magic_matches() {
        let mut data = LOCATOR_TAG.to_vec();
        data.extend_from_slice(b"zPQ\x02\x01");
        let mut r = SliceReader::new(&data);
        assert!(scan_to_block(&mut r).unwrap());
        assert_eq!(r.position(), 16);
    }

    /// Arbitrary garbage before the tag is skipped; the multipliers forget
    /// state older than the 16-byte window.
    #[test]
    fn junk_prefix_is_skipped() {
        let mut data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        data.extend_from_slice(&LOCATOR_TAG);
        data.extend_from_slice(b"zPQ");
        let mut r = SliceReader::new(&data);
        assert!(scan_to_block(&mut r).unwrap());
        assert_eq!(r.position(), 1016);
    }

    /// A bare magic after garbage does NOT match (the window still holds
    /// the garbage); only the tag resynchronizes mid-stream.
    #[test]
    fn bare_magic_after_junk_needs_the_tag() {
        let mut data = vec![0x55u8; 100];
        data.extend_from_slice(b"zPQ");
        let mut r = SliceReader::new(&data);
        assert!(!scan_to_block(&mut r).unwrap());
    }

    #[test]
    fn eof_returns_false() {
        let mut r = SliceReader::new(b"no block here at all");
        assert!(!scan_to_block(&mut r).unwrap());
    }

    /// The multiplier/window design: m^16 vanishes mod 2^32.
    #[test]
    fn multipliers_forget_after_16_bytes() {
        for m in ROLL_MULT {
            let mut pow = 1u64;
            for _ in 0..16 {
                pow = (pow * m as u64) % (1 << 32);
            }
            assert_eq!(pow, 0, "multiplier {m}");
        }
    }
}
