//! Arithmetic encoding of one segment's data.

use crate::error::Result;
use crate::io::ByteWriter;
use crate::model::Predictor;
use crate::vm::Vm;

use super::{range_mid, STORE_CHUNK};

/// Encodes segment data: arithmetic-coded bytes under the block's model, or
/// stored chunks when the block has no components.
pub(crate) struct Encoder<W> {
    pub out: W,
    low: u32,
    high: u32,
    pub pr: Predictor,
    /// Store-mode staging buffer.
    buf: Vec<u8>,
}

impl<W: ByteWriter> Encoder<W> {
    pub fn new(out: W, vm: Vm) -> Encoder<W> {
        Encoder {
            out,
            low: 1,
            high: u32::MAX,
            pr: Predictor::new(vm),
            buf: Vec::new(),
        }
    }

    /// Build the model and reset the range for the start of a block.
    pub fn init(&mut self) -> Result<()> {
        self.pr.init()?;
        self.low = 1;
        self.high = u32::MAX;
        self.buf.clear();
        Ok(())
    }

    /// Consume the encoder, returning the output sink.
    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.out
    }

    /// Encode bit `y` with 16-bit probability `p` of being 1.
    fn encode(&mut self, y: u32, p: u32) -> Result<()> {
        debug_assert!(p < 65536 && y < 2);
        let mid = range_mid(self.low, self.high, p);
        if y == 1 {
            self.high = mid;
        } else {
            self.low = mid + 1;
        }
        while (self.high ^ self.low) < 0x0100_0000 {
            // The settled top byte is the same in low and high.
            self.out.put((self.high >> 24) as u8)?;
            self.high = (self.high << 8) | 255;
            self.low <<= 8;
            self.low += u32::from(self.low == 0);
        }
        Ok(())
    }

    /// Encode one byte, or the end-of-segment marker for `None`.
    ///
    /// Ending a segment fully flushes the coder: the range collapses and
    /// exactly four bytes are emitted, leaving `low`/`high` back at their
    /// initial values for a following segment.
    pub fn compress(&mut self, c: Option<u8>) -> Result<()> {
        if self.pr.is_modeled() {
            match c {
                None => self.encode(1, 0)?,
                Some(c) => {
                    self.encode(0, 0)?;
                    for i in (0..8).rev() {
                        let p = self.pr.predict() as u32 * 2 + 1;
                        let y = (c as u32 >> i) & 1;
                        self.encode(y, p)?;
                        self.pr.update(y)?;
                    }
                }
            }
        } else {
            match c {
                None => self.flush_chunk()?,
                Some(c) => {
                    self.buf.push(c);
                    if self.buf.len() == STORE_CHUNK {
                        self.flush_chunk()?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Write the staged store-mode bytes as one `[count][bytes]` chunk.
    fn flush_chunk(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let n = self.buf.len() as u32;
        for shift in [24, 16, 8, 0] {
            self.out.put((n >> shift) as u8)?;
        }
        for &c in &self.buf {
            self.out.put(c)?;
        }
        self.buf.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::Decoder;
    use crate::io::SliceReader;

    /// A header with no components: store mode.
    fn store_header() -> Vec<u8> {
        // hh hm ph pm all zero, n = 0, program is a bare HALT.
        vec![8, 0, 0, 0, 0, 0, 0, 0, 56, 0]
    }

    fn vm_from(hdr: &[u8]) -> Vm {
        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(hdr)).unwrap();
        vm
    }

    #[test]
    fn store_mode_chunks_and_roundtrips() {
        let hdr = store_header();
        let data: Vec<u8> = (0u32..200_000).map(|i| (i * 7 % 256) as u8).collect();

        let mut enc = Encoder::new(Vec::new(), vm_from(&hdr));
        enc.init().unwrap();
        assert!(!enc.pr.is_modeled());
        for &c in &data {
            enc.compress(Some(c)).unwrap();
        }
        enc.compress(None).unwrap();
        let mut wire = enc.into_output();
        // 200000 bytes -> 3 full chunks + remainder, 4 bytes of framing each.
        assert_eq!(wire.len(), data.len() + 4 * 4);
        // First chunk header is a big-endian 65536.
        assert_eq!(&wire[..4], &[0, 1, 0, 0]);
        wire.extend_from_slice(&[0, 0, 0, 0]);

        let mut dec = Decoder::new(SliceReader::new(&wire), vm_from(&hdr));
        dec.init().unwrap();
        let mut out = Vec::new();
        while let Some(c) = dec.decompress().unwrap() {
            out.push(c);
        }
        assert_eq!(out, data);
    }

    #[test]
    fn store_mode_empty_segment_is_just_the_tail() {
        let hdr = store_header();
        let mut enc = Encoder::new(Vec::new(), vm_from(&hdr));
        enc.init().unwrap();
        enc.compress(None).unwrap();
        assert!(enc.into_output().is_empty());

        let mut dec = Decoder::new(SliceReader::new(&[0, 0, 0, 0]), vm_from(&hdr));
        dec.init().unwrap();
        assert_eq!(dec.decompress().unwrap(), None);
    }

    #[test]
    fn store_mode_skip_walks_chunks() {
        let hdr = store_header();
        let mut enc = Encoder::new(Vec::new(), vm_from(&hdr));
        enc.init().unwrap();
        for _ in 0..70_000u32 {
            enc.compress(Some(0xAA)).unwrap();
        }
        enc.compress(None).unwrap();
        let mut wire = enc.into_output();
        wire.extend_from_slice(&[0, 0, 0, 0]);
        wire.push(0xFD);

        let mut dec = Decoder::new(SliceReader::new(&wire), vm_from(&hdr));
        dec.init().unwrap();
        assert_eq!(dec.skip().unwrap(), 0xFD);
    }

    /// The coder never emits four zero bytes in a row inside segment data.
    #[test]
    fn no_four_zero_run_in_coded_data() {
        let comp: &[u8] = &[2, 5, 10];
        let prog: &[u8] = &[56];
        let hsize = 5 + comp.len() + 1 + prog.len() + 1;
        let mut hdr = vec![(hsize & 255) as u8, (hsize >> 8) as u8];
        hdr.extend_from_slice(&[2, 2, 0, 0, 1]);
        hdr.extend_from_slice(comp);
        hdr.push(0);
        hdr.extend_from_slice(prog);
        hdr.push(0);

        // All-zero input maximizes the chance of zero output bytes.
        let mut enc = Encoder::new(Vec::new(), vm_from(&hdr));
        enc.init().unwrap();
        for _ in 0..4096 {
            enc.compress(Some(0)).unwrap();
        }
        enc.compress(None).unwrap();
        let wire = enc.into_output();
        assert!(!wire.windows(4).any(|w| w == [0, 0, 0, 0]));
    }
}
