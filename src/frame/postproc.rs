//! The post-processor stage.
//!
//! The first decoded byte of every block's data stream tells the
//! decompressor what to do with the rest: `0` means the decoded bytes are
//! the output ("pass"), `1` means a post-processing program follows — a
//! 2-byte little-endian length and that many ZPAQL bytes — and the decoded
//! bytes after it are that program's input. The program's `OUT`
//! instructions produce the real output; at end of segment it runs once
//! more with the end-of-input sentinel so it can flush.

use crate::error::{Result, ZpaqError};
use crate::vm::{OutSink, Vm, VmInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting the type byte.
    Init,
    /// Decoded bytes are the output.
    Pass,
    /// Expecting the low length byte of the program.
    SizeLo,
    /// Expecting the high length byte.
    SizeHi,
    /// Collecting program bytes.
    Load,
    /// Program loaded; decoded bytes are its input.
    Run,
}

/// Loader state machine plus the PCOMP machine itself.
pub(crate) struct PostProcessor {
    state: State,
    prog_len: usize,
    prog: Vec<u8>,
    ph: u8,
    pm: u8,
    pub vm: Vm,
}

impl PostProcessor {
    pub fn new() -> PostProcessor {
        PostProcessor {
            state: State::Init,
            prog_len: 0,
            prog: Vec::new(),
            ph: 0,
            pm: 0,
            vm: Vm::new(),
        }
    }

    /// Reset for a new block. `ph`/`pm` are the PCOMP memory sizes from the
    /// block header.
    pub fn init(&mut self, ph: u8, pm: u8) {
        self.state = State::Init;
        self.prog_len = 0;
        self.prog.clear();
        self.ph = ph;
        self.pm = pm;
        self.vm.clear();
    }

    /// True once the loader protocol is complete and data bytes flow to the
    /// output.
    pub fn ready(&self) -> bool {
        matches!(self.state, State::Pass | State::Run)
    }

    /// True when a program was loaded (as opposed to pass-through).
    pub fn has_program(&self) -> bool {
        self.state == State::Run
    }

    /// Feed one decoded byte (or the end-of-segment sentinel) through the
    /// loader or the loaded program.
    pub fn write(&mut self, input: VmInput, sink: &mut OutSink<'_>) -> Result<()> {
        let byte = match input {
            VmInput::Byte(c) => Some(c),
            VmInput::Eof => None,
        };
        match self.state {
            State::Init => {
                let c = byte.ok_or(ZpaqError::PostProcessorProtocol(
                    "end of stream before post-processor type",
                ))?;
                self.state = match c {
                    0 => State::Pass,
                    1 => State::SizeLo,
                    _ => {
                        return Err(ZpaqError::PostProcessorProtocol(
                            "unknown post-processor type",
                        ))
                    }
                };
            }
            State::Pass => {
                if let Some(c) = byte {
                    sink.put(c)?;
                }
            }
            State::SizeLo => {
                let c = byte.ok_or(ZpaqError::PostProcessorProtocol(
                    "end of stream in program length",
                ))?;
                self.prog_len = c as usize;
                self.state = State::SizeHi;
            }
            State::SizeHi => {
                let c = byte.ok_or(ZpaqError::PostProcessorProtocol(
                    "end of stream in program length",
                ))?;
                self.prog_len |= (c as usize) << 8;
                if self.prog_len == 0 {
                    return Err(ZpaqError::PostProcessorProtocol(
                        "empty post-processor program",
                    ));
                }
                self.prog.reserve(self.prog_len);
                self.state = State::Load;
            }
            State::Load => {
                let c = byte.ok_or(ZpaqError::PostProcessorProtocol(
                    "end of stream in program body",
                ))?;
                self.prog.push(c);
                if self.prog.len() == self.prog_len {
                    self.vm.load_pcomp(self.ph, self.pm, &self.prog)?;
                    self.state = State::Run;
                    tracing::debug!(len = self.prog_len, "post-processor program loaded");
                }
            }
            State::Run => {
                self.vm.run(input, sink)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(pp: &mut PostProcessor, bytes: &[u8], eof: bool) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for &c in bytes {
            let mut sink = OutSink { output: Some(&mut out), sha1: None };
            pp.write(VmInput::Byte(c), &mut sink)?;
        }
        if eof {
            let mut sink = OutSink { output: Some(&mut out), sha1: None };
            pp.write(VmInput::Eof, &mut sink)?;
        }
        Ok(out)
    }

    #[test]
    fn pass_mode_copies_bytes() {
        let mut pp = PostProcessor::new();
        pp.init(0, 0);
        let out = collect(&mut pp, &[0, b'h', b'i'], true).unwrap();
        assert!(pp.ready());
        assert!(!pp.has_program());
        assert_eq!(out, b"hi");
    }

    #[test]
    fn bad_type_byte_is_rejected() {
        let mut pp = PostProcessor::new();
        pp.init(0, 0);
        let err = collect(&mut pp, &[2], false).unwrap_err();
        assert!(matches!(err, ZpaqError::PostProcessorProtocol(_)));
    }

    #[test]
    fn eof_during_load_is_rejected() {
        // Type 1, length 4, then only one program byte before EOF.
        let mut pp = PostProcessor::new();
        pp.init(0, 0);
        let err = collect(&mut pp, &[1, 4, 0, 56], true).unwrap_err();
        assert!(matches!(err, ZpaqError::PostProcessorProtocol(_)));
    }

    #[test]
    fn zero_length_program_is_rejected() {
        let mut pp = PostProcessor::new();
        pp.init(0, 0);
        let err = collect(&mut pp, &[1, 0, 0], false).unwrap_err();
        assert!(matches!(err, ZpaqError::PostProcessorProtocol(_)));
    }

    /// Load a program that echoes bytes but suppresses the EOF sentinel:
    /// A > 255? skip OUT. The sentinel run must produce no output.
    #[test]
    fn loaded_program_runs_and_honors_eof() {
        let prog: &[u8] = &[239, 255, 39, 1, 57, 56, 0]; // A>255 JT+1 OUT HALT, guard
        let mut pp = PostProcessor::new();
        pp.init(0, 0);
        let mut stream = vec![1, prog.len() as u8, 0];
        stream.extend_from_slice(prog);
        stream.extend_from_slice(b"zpaq");
        let out = collect(&mut pp, &stream, true).unwrap();
        assert!(pp.has_program());
        assert_eq!(out, b"zpaq");
    }
}
