//! Block and segment reading.

use sha1::{Digest, Sha1};

use crate::coder::Decoder;
use crate::error::{Result, ZpaqError};
use crate::io::{ByteReader, ByteWriter};
use crate::vm::{OutSink, Vm, VmInput};

use super::{postproc::PostProcessor, scan_to_block};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting a block (scan for the magic).
    Block,
    /// Expecting a segment start or the end-of-block byte.
    Filename,
    /// Expecting the segment comment.
    Comment,
    /// Expecting segment data.
    Data,
    /// Expecting the segment trailer.
    SegEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// First segment of the block: model not yet built.
    FirstSegment,
    /// Model built; later segments continue its state.
    Segment,
    /// A segment was skipped; later segments of this block cannot be
    /// decoded because the model missed its training data.
    Skipped,
}

/// Reads an archive: locates blocks, walks segments, decodes data and
/// verifies checksums.
///
/// Call order per block: [`find_block`](Decompresser::find_block), then per
/// segment [`find_filename`](Decompresser::find_filename),
/// [`read_comment`](Decompresser::read_comment),
/// [`decompress_segment`](Decompresser::decompress_segment) (or skip
/// straight to the trailer), and
/// [`read_segment_end`](Decompresser::read_segment_end).
pub struct Decompresser<R> {
    dec: Decoder<R>,
    pp: PostProcessor,
    state: State,
    decode_state: DecodeState,
    verify: bool,
    hasher: Sha1,
}

impl<R: ByteReader> Decompresser<R> {
    pub fn new(input: R) -> Decompresser<R> {
        Decompresser {
            dec: Decoder::new(input, Vm::new()),
            pp: PostProcessor::new(),
            state: State::Block,
            decode_state: DecodeState::FirstSegment,
            verify: true,
            hasher: Sha1::new(),
        }
    }

    /// Enable or disable checksum verification (on by default). When off,
    /// stored checksums are still returned by
    /// [`read_segment_end`](Decompresser::read_segment_end), just not
    /// checked.
    pub fn verify_checksums(&mut self, on: bool) {
        self.verify = on;
    }

    /// Consume the decompresser, returning the input source.
    pub fn into_inner(self) -> R {
        self.dec.input
    }

    /// The underlying input source (e.g. to read its position).
    pub fn input(&self) -> &R {
        &self.dec.input
    }

    /// The block's model memory requirement in bytes.
    pub fn memory_estimate(&self) -> f64 {
        self.dec.pr.vm.memory_estimate()
    }

    /// Write the current block's serialized header (for listing).
    pub fn hcomp<W: ByteWriter + ?Sized>(&self, out: &mut W) -> Result<bool> {
        self.dec.pr.vm.write_header(out)
    }

    /// Write the current block's post-processor program, if one was loaded.
    pub fn pcomp<W: ByteWriter + ?Sized>(&self, out: &mut W) -> Result<bool> {
        self.pp.vm.write_header(out)
    }

    /// True when the current block decodes through a loaded post-processor
    /// program (known only after its first segment has been decoded).
    pub fn has_postprocessor(&self) -> bool {
        self.pp.has_program()
    }

    #[inline]
    fn must_get(&mut self) -> Result<u8> {
        self.dec
            .input
            .get()?
            .ok_or(ZpaqError::CorruptStream("unexpected end of input"))
    }

    /// Scan to the next block and read its header. Returns false at end of
    /// input.
    pub fn find_block(&mut self) -> Result<bool> {
        debug_assert_eq!(self.state, State::Block);
        if !scan_to_block(&mut self.dec.input)? {
            return Ok(false);
        }
        let level = self.must_get()?;
        if level != 1 && level != 2 {
            return Err(ZpaqError::UnsupportedLevel { level });
        }
        let ty = self.must_get()?;
        if ty != 1 {
            return Err(ZpaqError::UnsupportedLevel { level: ty });
        }
        self.dec.pr.vm.read_header(&mut self.dec.input)?;
        if level == 1 && self.dec.pr.vm.n_components() == 0 {
            return Err(ZpaqError::HeaderInvalid("level 1 block with no components"));
        }
        tracing::debug!(
            level,
            components = self.dec.pr.vm.n_components(),
            memory = self.memory_estimate(),
            "block found"
        );
        self.state = State::Filename;
        self.decode_state = DecodeState::FirstSegment;
        Ok(true)
    }

    /// Read the next segment's filename, or `None` at end of block.
    pub fn find_filename(&mut self) -> Result<Option<Vec<u8>>> {
        debug_assert_eq!(self.state, State::Filename);
        match self.must_get()? {
            1 => {
                let mut name = Vec::new();
                loop {
                    match self.must_get()? {
                        0 => break,
                        c => name.push(c),
                    }
                }
                self.state = State::Comment;
                Ok(Some(name))
            }
            0xFF => {
                self.state = State::Block;
                Ok(None)
            }
            _ => Err(ZpaqError::CorruptStream("missing segment or end of block")),
        }
    }

    /// Read the segment comment and the reserved byte.
    pub fn read_comment(&mut self) -> Result<Vec<u8>> {
        debug_assert_eq!(self.state, State::Comment);
        let mut comment = Vec::new();
        loop {
            match self.must_get()? {
                0 => break,
                c => comment.push(c),
            }
        }
        if self.must_get()? != 0 {
            return Err(ZpaqError::CorruptStream("missing reserved byte"));
        }
        self.state = State::Data;
        Ok(comment)
    }

    /// Decode the whole segment into `out` (through the post-processor when
    /// the block carries one).
    pub fn decompress_segment<W: ByteWriter>(&mut self, out: &mut W) -> Result<()> {
        debug_assert_eq!(self.state, State::Data);
        match self.decode_state {
            DecodeState::FirstSegment => {
                self.dec.init()?;
                let (ph, pm) = (self.dec.pr.vm.header[4], self.dec.pr.vm.header[5]);
                self.pp.init(ph, pm);
                self.decode_state = DecodeState::Segment;
            }
            DecodeState::Segment => {}
            DecodeState::Skipped => {
                return Err(ZpaqError::CorruptStream(
                    "segment follows a skipped segment",
                ));
            }
        }
        self.hasher = Sha1::new();

        // Drive the post-processor loader until it knows what to do with
        // data bytes.
        while !self.pp.ready() {
            match self.dec.decompress()? {
                Some(c) => {
                    let mut sink = OutSink { output: None, sha1: None };
                    self.pp.write(VmInput::Byte(c), &mut sink)?;
                }
                None => {
                    return Err(ZpaqError::PostProcessorProtocol(
                        "end of segment while loading post-processor",
                    ))
                }
            }
        }

        let mut bytes = 0u64;
        loop {
            let decoded = self.dec.decompress()?;
            let mut sink = OutSink {
                output: Some(&mut *out),
                sha1: self.verify.then_some(&mut self.hasher),
            };
            match decoded {
                Some(c) => {
                    self.pp.write(VmInput::Byte(c), &mut sink)?;
                    bytes += 1;
                }
                None => {
                    self.pp.write(VmInput::Eof, &mut sink)?;
                    break;
                }
            }
        }
        tracing::debug!(bytes, "segment decoded");
        self.state = State::SegEnd;
        Ok(())
    }

    /// Read the segment trailer, skipping the segment data first if it was
    /// not decompressed. Returns the stored checksum, if any.
    ///
    /// When verification is enabled and the segment was decoded, a stored
    /// checksum that disagrees with the decoded output fails with
    /// `ChecksumMismatch`.
    pub fn read_segment_end(&mut self) -> Result<Option<[u8; 20]>> {
        debug_assert!(matches!(self.state, State::Data | State::SegEnd));
        let (tag, decoded) = if self.state == State::Data {
            // Not decoded: skip to the trailer. Later segments of this
            // block are undecodable, the model state having diverged.
            let tag = self.dec.skip()?;
            self.decode_state = DecodeState::Skipped;
            (tag, false)
        } else {
            (self.must_get()?, true)
        };

        let stored = match tag {
            0xFE => None,
            0xFD => {
                let mut digest = [0u8; 20];
                for d in digest.iter_mut() {
                    *d = self.must_get()?;
                }
                Some(digest)
            }
            _ => return Err(ZpaqError::CorruptStream("missing segment trailer")),
        };

        if decoded && self.verify {
            if let Some(expected) = stored {
                let computed: [u8; 20] = self.hasher.finalize_reset().into();
                if computed != expected {
                    return Err(ZpaqError::ChecksumMismatch { expected, computed });
                }
            }
        }
        self.state = State::Filename;
        Ok(stored)
    }
}
