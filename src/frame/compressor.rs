//! Block and segment writing.

use crate::coder::Encoder;
use crate::error::{Result, ZpaqError};
use crate::io::{ByteReader, ByteWriter, SliceReader};
use crate::models;
use crate::vm::Vm;

use super::{LOCATOR_TAG, MAGIC};

/// Level byte written on new blocks. Level 2 adds the `n = 0` stored-bytes
/// path; level 1 archives are still read.
pub const WRITE_LEVEL: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No block open.
    Init,
    /// Block header written; first segment not started.
    FirstSegment,
    /// First segment header written; post-processor choice pending.
    PostProcess,
    /// Coding segment data.
    Data,
    /// Between segments.
    BetweenSegments,
}

/// Writes an archive: blocks, segments, and the coded data within them.
///
/// Call order per block: [`start_block`](Compressor::start_block) (or
/// [`start_block_level`](Compressor::start_block_level)), then per segment
/// [`start_segment`](Compressor::start_segment), `post_process` (first
/// segment of the block only), [`compress`](Compressor::compress),
/// [`end_segment`](Compressor::end_segment), and finally
/// [`end_block`](Compressor::end_block).
pub struct Compressor<W> {
    enc: Encoder<W>,
    state: State,
}

impl<W: ByteWriter> Compressor<W> {
    pub fn new(out: W) -> Compressor<W> {
        Compressor {
            enc: Encoder::new(out, Vm::new()),
            state: State::Init,
        }
    }

    /// Consume the compressor, returning the output sink.
    pub fn into_inner(self) -> W {
        self.enc.out
    }

    /// Write the 13-byte locator tag. Harmless anywhere between blocks;
    /// required for the block to be found if the archive is appended to
    /// arbitrary data.
    pub fn write_tag(&mut self) -> Result<()> {
        debug_assert_eq!(self.state, State::Init);
        for c in LOCATOR_TAG {
            self.enc.out.put(c)?;
        }
        Ok(())
    }

    /// Start a block using a built-in model, level 0..=3.
    pub fn start_block_level(&mut self, level: u8) -> Result<()> {
        let header = models::by_level(level)
            .ok_or(ZpaqError::HeaderInvalid("compression level must be 0..=3"))?;
        self.start_block(header)
    }

    /// Start a block with a caller-provided serialized header
    /// (2-byte length prefix included).
    pub fn start_block(&mut self, header: &[u8]) -> Result<()> {
        debug_assert_eq!(self.state, State::Init);
        // Parse first: nothing is emitted for a malformed header.
        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(header))?;
        for c in MAGIC {
            self.enc.out.put(c)?;
        }
        self.enc.out.put(WRITE_LEVEL)?;
        self.enc.out.put(1)?;
        let declared = header[0] as usize | ((header[1] as usize) << 8);
        for &c in &header[..declared + 2] {
            self.enc.out.put(c)?;
        }
        self.enc.pr.vm = vm;
        self.state = State::FirstSegment;
        Ok(())
    }

    /// Start a segment. The name and comment stop at any NUL byte, since
    /// both are NUL-terminated on the wire.
    pub fn start_segment(&mut self, filename: &str, comment: &str) -> Result<()> {
        debug_assert!(matches!(
            self.state,
            State::FirstSegment | State::BetweenSegments
        ));
        self.enc.out.put(1)?;
        for &c in filename.as_bytes().iter().take_while(|&&c| c != 0) {
            self.enc.out.put(c)?;
        }
        self.enc.out.put(0)?;
        for &c in comment.as_bytes().iter().take_while(|&&c| c != 0) {
            self.enc.out.put(c)?;
        }
        self.enc.out.put(0)?;
        self.enc.out.put(0)?; // reserved
        if self.state == State::FirstSegment {
            self.state = State::PostProcess;
        } else {
            self.state = State::Data;
        }
        Ok(())
    }

    /// Choose the block's post-processing: `None` for pass-through, or a
    /// serialized PCOMP program (2-byte length prefix included). Must be
    /// called exactly once per block, on its first segment; the choice is
    /// coded into the data stream.
    pub fn post_process(&mut self, pcomp: Option<&[u8]>) -> Result<()> {
        debug_assert_eq!(self.state, State::PostProcess);
        self.enc.init()?;
        match pcomp {
            Some(prog) => {
                if prog.len() < 3 {
                    return Err(ZpaqError::PostProcessorProtocol("program too short"));
                }
                let declared = prog[0] as usize | ((prog[1] as usize) << 8);
                if declared + 2 != prog.len() {
                    return Err(ZpaqError::PostProcessorProtocol(
                        "program length prefix mismatch",
                    ));
                }
                self.enc.compress(Some(1))?;
                for &c in prog {
                    self.enc.compress(Some(c))?;
                }
            }
            None => self.enc.compress(Some(0))?,
        }
        self.state = State::Data;
        Ok(())
    }

    /// Compress one byte of segment data.
    pub fn compress_byte(&mut self, c: u8) -> Result<()> {
        debug_assert_eq!(self.state, State::Data);
        self.enc.compress(Some(c))
    }

    /// Compress up to `n` bytes from `input` (all of it for `None`).
    /// Returns true if the input may have more bytes.
    pub fn compress<R: ByteReader + ?Sized>(
        &mut self,
        input: &mut R,
        n: Option<u64>,
    ) -> Result<bool> {
        debug_assert_eq!(self.state, State::Data);
        let mut left = n.unwrap_or(u64::MAX);
        while left > 0 {
            match input.get()? {
                Some(c) => self.enc.compress(Some(c))?,
                None => return Ok(false),
            }
            left -= 1;
        }
        Ok(true)
    }

    /// End the segment: code the end-of-stream marker, write the 4-zero
    /// tail and the trailer (with the SHA-1 of the segment's original
    /// content, if given).
    pub fn end_segment(&mut self, sha1: Option<&[u8; 20]>) -> Result<()> {
        debug_assert_eq!(self.state, State::Data);
        self.enc.compress(None)?;
        for _ in 0..4 {
            self.enc.out.put(0)?;
        }
        match sha1 {
            Some(digest) => {
                self.enc.out.put(0xFD)?;
                for &c in digest {
                    self.enc.out.put(c)?;
                }
            }
            None => self.enc.out.put(0xFE)?,
        }
        self.state = State::BetweenSegments;
        Ok(())
    }

    /// End the block.
    pub fn end_block(&mut self) -> Result<()> {
        debug_assert_eq!(self.state, State::BetweenSegments);
        self.enc.out.put(0xFF)?;
        self.state = State::Init;
        Ok(())
    }
}
