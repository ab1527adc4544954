//! Arithmetic decoding of one segment's data.

use crate::error::{Result, ZpaqError};
use crate::io::ByteReader;
use crate::model::Predictor;
use crate::vm::Vm;

use super::range_mid;

/// Decodes segment data: arithmetic-coded bytes under the block's model, or
/// stored chunks when the block has no components.
pub(crate) struct Decoder<R> {
    pub input: R,
    low: u32,
    high: u32,
    /// Modeled: the last four input bytes. Stored: bytes left in the
    /// current chunk. Zero at segment start in both cases.
    curr: u32,
    pub pr: Predictor,
}

impl<R: ByteReader> Decoder<R> {
    pub fn new(input: R, vm: Vm) -> Decoder<R> {
        Decoder {
            input,
            low: 1,
            high: u32::MAX,
            curr: 0,
            pr: Predictor::new(vm),
        }
    }

    /// Build the model and reset the range for the start of a block.
    pub fn init(&mut self) -> Result<()> {
        self.pr.init()?;
        if self.pr.is_modeled() {
            self.low = 1;
            self.high = u32::MAX;
        } else {
            self.low = 0;
            self.high = 0;
        }
        self.curr = 0;
        Ok(())
    }

    #[inline]
    fn must_get(&mut self) -> Result<u8> {
        self.input
            .get()?
            .ok_or(ZpaqError::CorruptStream("unexpected end of input"))
    }

    /// Decode one bit with 16-bit probability `p` of being 1.
    fn decode(&mut self, p: u32) -> Result<u32> {
        debug_assert!(p < 65536);
        if self.curr < self.low || self.curr > self.high {
            return Err(ZpaqError::CorruptStream("decoder out of range"));
        }
        let mid = range_mid(self.low, self.high, p);
        let y = u32::from(self.curr <= mid);
        if y == 1 {
            self.high = mid;
        } else {
            self.low = mid + 1;
        }
        while (self.high ^ self.low) < 0x0100_0000 {
            // Shift out settled leading bytes; low is kept nonzero so the
            // data can never contain a 4-zero run.
            self.high = (self.high << 8) | 255;
            self.low <<= 8;
            self.low += u32::from(self.low == 0);
            let c = self.must_get()?;
            self.curr = (self.curr << 8) | c as u32;
        }
        Ok(y)
    }

    /// Decode the next byte, or `None` at end of segment.
    pub fn decompress(&mut self) -> Result<Option<u8>> {
        if self.pr.is_modeled() {
            if self.curr == 0 {
                // Segment start: prime the range with the first 4 bytes.
                for _ in 0..4 {
                    self.curr = (self.curr << 8) | self.must_get()? as u32;
                }
            }
            if self.decode(0)? == 1 {
                if self.curr != 0 {
                    return Err(ZpaqError::CorruptStream("end of stream with pending bytes"));
                }
                Ok(None)
            } else {
                let mut c: u32 = 1;
                while c < 256 {
                    let p = self.pr.predict() as u32 * 2 + 1;
                    let y = self.decode(p)?;
                    c = c * 2 + y;
                    self.pr.update(y)?;
                }
                Ok(Some((c - 256) as u8))
            }
        } else {
            // Stored chunks.
            if self.curr == 0 {
                for _ in 0..4 {
                    self.curr = (self.curr << 8) | self.must_get()? as u32;
                }
                if self.curr == 0 {
                    return Ok(None);
                }
            }
            self.curr -= 1;
            Ok(Some(self.must_get()?))
        }
    }

    /// Skip to the end of the segment without decoding and return the next
    /// byte (the segment trailer tag).
    pub fn skip(&mut self) -> Result<u8> {
        if self.pr.is_modeled() {
            // Roll bytes until four consecutive zeros have been seen.
            while self.curr == 0 {
                self.curr = self.must_get()? as u32;
            }
            while self.curr != 0 {
                let c = self.must_get()?;
                self.curr = (self.curr << 8) | c as u32;
            }
            // There may be more than four zeros; the trailer tag is the
            // first nonzero byte.
            loop {
                let c = self.must_get()?;
                if c != 0 {
                    return Ok(c);
                }
            }
        } else {
            loop {
                if self.curr == 0 {
                    for _ in 0..4 {
                        self.curr = (self.curr << 8) | self.must_get()? as u32;
                    }
                    if self.curr == 0 {
                        return self.must_get();
                    }
                }
                while self.curr > 0 {
                    self.must_get()?;
                    self.curr -= 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::Encoder;
    use crate::io::SliceReader;

    /// Minimal serialized header: one CM component, HALT-only program.
    fn tiny_header() -> Vec<u8> {
        let comp: &[u8] = &[2, 5, 10];
        let prog: &[u8] = &[56];
        let hsize = 5 + comp.len() + 1 + prog.len() + 1;
        let mut hdr = vec![(hsize & 255) as u8, (hsize >> 8) as u8];
        hdr.extend_from_slice(&[2, 2, 0, 0, 1]);
        hdr.extend_from_slice(comp);
        hdr.push(0);
        hdr.extend_from_slice(prog);
        hdr.push(0);
        hdr
    }

    fn vm_from(hdr: &[u8]) -> Vm {
        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(hdr)).unwrap();
        vm
    }

    #[test]
    fn bytes_roundtrip_through_the_coder() {
        let hdr = tiny_header();
        let data = b"the quick brown fox jumps over the lazy dog";

        let mut enc = Encoder::new(Vec::new(), vm_from(&hdr));
        enc.init().unwrap();
        for &c in data.iter() {
            enc.compress(Some(c)).unwrap();
        }
        enc.compress(None).unwrap();
        let mut wire = enc.into_output();
        wire.extend_from_slice(&[0, 0, 0, 0]); // segment tail

        let mut dec = Decoder::new(SliceReader::new(&wire), vm_from(&hdr));
        dec.init().unwrap();
        let mut out = Vec::new();
        while let Some(c) = dec.decompress().unwrap() {
            out.push(c);
        }
        assert_eq!(out, data);
    }

    #[test]
    fn empty_segment_is_four_init_bytes_plus_eos() {
        let hdr = tiny_header();
        let mut enc = Encoder::new(Vec::new(), vm_from(&hdr));
        enc.init().unwrap();
        enc.compress(None).unwrap();
        let wire = enc.into_output();
        // EOS with an empty range flushes the 4 priming bytes and nothing
        // else.
        assert_eq!(wire.len(), 4);

        let mut full = wire.clone();
        full.extend_from_slice(&[0, 0, 0, 0]);
        let mut dec = Decoder::new(SliceReader::new(&full), vm_from(&hdr));
        dec.init().unwrap();
        assert_eq!(dec.decompress().unwrap(), None);
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let hdr = tiny_header();
        let mut enc = Encoder::new(Vec::new(), vm_from(&hdr));
        enc.init().unwrap();
        for &c in b"hello world, hello world" {
            enc.compress(Some(c)).unwrap();
        }
        enc.compress(None).unwrap();
        let wire = enc.into_output();

        // Cut the stream short (no tail, truncated payload).
        let cut = &wire[..wire.len() / 2];
        let mut dec = Decoder::new(SliceReader::new(cut), vm_from(&hdr));
        dec.init().unwrap();
        let mut res = Ok(Some(0u8));
        while let Ok(Some(_)) = res {
            res = dec.decompress();
        }
        assert!(matches!(res, Err(ZpaqError::CorruptStream(_))));
    }

    #[test]
    fn skip_finds_the_trailer() {
        let hdr = tiny_header();
        let mut enc = Encoder::new(Vec::new(), vm_from(&hdr));
        enc.init().unwrap();
        for &c in b"some segment payload" {
            enc.compress(Some(c)).unwrap();
        }
        enc.compress(None).unwrap();
        let mut wire = enc.into_output();
        wire.extend_from_slice(&[0, 0, 0, 0]);
        wire.push(0xFE); // trailer: no checksum

        let mut dec = Decoder::new(SliceReader::new(&wire), vm_from(&hdr));
        dec.init().unwrap();
        assert_eq!(dec.skip().unwrap(), 0xFE);
    }
}
