//! The ZPAQL virtual machine.
//!
//! Every block header carries two programs for this machine: HCOMP, run once
//! per coded byte to compute the context hashes the predictor reads from
//! `H`, and optionally PCOMP, run once per decoded byte (plus once at end of
//! segment) to post-process the decoded stream into the final output.
//!
//! Machine state is four 32-bit registers `A B C D`, a one-bit flag `F`, a
//! 256-word register file `R`, a byte memory `M` (indexed mod size through
//! `B` and `C`) and a word memory `H` (indexed mod size through `D`).
//! Programs are bounded by the 16-bit header size and contain no loops other
//! than what the jump instructions express; execution always terminates at
//! `HALT` or with an error.
//!
//! The serialized header layout kept in [`Vm::header`] is the on-wire one:
//!
//! ```text
//! hsize[2] hh hm ph pm n comp[0..n] 0 (128-byte guard gap) hcomp 0
//! ```
//!
//! The guard gap between the component list and the program mirrors the
//! reserved addressing headroom of the format: a short jump past either end
//! of the program lands on zero bytes, and the zero opcode is an error.

pub(crate) mod opcode;

use sha1::{Digest, Sha1};

use crate::array::ZArray;
use crate::error::{Result, ZpaqError};
use crate::io::{ByteReader, ByteWriter};
use crate::model::component::descriptor_len;
use opcode::{decode, BinOp, Instr, Loc, Src};

/// Offset of the component list inside the serialized header.
pub(crate) const COMP_START: usize = 7;

/// Width of the guard gap between the component list and the program.
const GUARD_GAP: usize = 128;

/// Slack appended to the header buffer so guard reads stay in bounds.
const HEADER_SLACK: usize = 300;

/// One input to a program run: a stream byte, or the end-of-segment
/// sentinel. The sentinel is presented to the bytecode as a value above 255
/// in register `A`, which is how programs test for end of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmInput {
    /// An ordinary byte.
    Byte(u8),
    /// End of segment.
    Eof,
}

impl VmInput {
    #[inline]
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            VmInput::Byte(c) => c as u32,
            VmInput::Eof => u32::MAX,
        }
    }
}

/// Destination of the `OUT` instruction: an optional byte sink and an
/// optional running SHA-1. Either may be absent; HCOMP runs with neither.
pub(crate) struct OutSink<'a> {
    pub output: Option<&'a mut dyn ByteWriter>,
    pub sha1: Option<&'a mut Sha1>,
}

impl<'a> OutSink<'a> {
    /// A sink that discards everything.
    pub fn none() -> OutSink<'static> {
        OutSink { output: None, sha1: None }
    }

    #[inline]
    pub fn put(&mut self, c: u8) -> Result<()> {
        if let Some(w) = self.output.as_deref_mut() {
            w.put(c)?;
        }
        if let Some(h) = self.sha1.as_deref_mut() {
            h.update([c]);
        }
        Ok(())
    }
}

/// A ZPAQL machine: serialized header plus run-time state.
pub struct Vm {
    /// Serialized block header with guard gap; see the module docs.
    pub(crate) header: Vec<u8>,
    /// One past the component-list terminator.
    pub(crate) cend: usize,
    /// Start of the program within `header`.
    pub(crate) hbegin: usize,
    /// One past the program's trailing zero byte.
    pub(crate) hend: usize,

    a: u32,
    b: u32,
    c: u32,
    d: u32,
    f: bool,
    pc: usize,
    m: ZArray<u8>,
    h: ZArray<u32>,
    r: Vec<u32>,
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

impl Vm {
    /// An empty machine; call [`read_header`](Vm::read_header) or
    /// [`load_pcomp`](Vm::load_pcomp) before running.
    pub fn new() -> Vm {
        Vm {
            header: Vec::new(),
            cend: 0,
            hbegin: 0,
            hend: 0,
            a: 0,
            b: 0,
            c: 0,
            d: 0,
            f: false,
            pc: 0,
            m: ZArray::empty(),
            h: ZArray::empty(),
            r: Vec::new(),
        }
    }

    /// Free memory and erase the program and machine state.
    pub fn clear(&mut self) {
        self.header.clear();
        self.cend = 0;
        self.hbegin = 0;
        self.hend = 0;
        self.a = 0;
        self.b = 0;
        self.c = 0;
        self.d = 0;
        self.f = false;
        self.pc = 0;
        self.m = ZArray::empty();
        self.h = ZArray::empty();
        self.r = Vec::new();
    }

    /// True once a header (or PCOMP program) has been loaded.
    pub fn has_program(&self) -> bool {
        self.header.len() > 6
    }

    /// Number of components declared by the header (0..=255).
    #[inline]
    pub(crate) fn n_components(&self) -> usize {
        self.header[6] as usize
    }

    /// The raw component descriptor bytes (without the terminator).
    #[inline]
    pub(crate) fn comp_bytes(&self) -> &[u8] {
        &self.header[COMP_START..self.cend - 1]
    }

    /// Context hash for component `i`, i.e. `H[i mod |H|]`.
    #[inline]
    pub(crate) fn h_at(&self, i: u32) -> u32 {
        self.h[self.h.wrap(i)]
    }

    // ─────────────────────────────────────────────────────────────────────
    // Header serialization
    // ─────────────────────────────────────────────────────────────────────

    /// Read and layout a serialized block header:
    /// `hsize[2] hh hm ph pm n comp.. 0 hcomp.. 0`.
    ///
    /// Returns the number of meaningful header bytes
    /// (`cend + hend - hbegin`).
    pub fn read_header<R: ByteReader + ?Sized>(&mut self, input: &mut R) -> Result<usize> {
        let mut get = |r: &mut R| -> Result<u8> {
            r.get()?
                .ok_or(ZpaqError::HeaderInvalid("unexpected end of header"))
        };

        let hsize = {
            let lo = get(input)? as usize;
            let hi = get(input)? as usize;
            lo | (hi << 8)
        };
        self.header.clear();
        self.header.resize(hsize + HEADER_SLACK, 0);
        self.header[0] = (hsize & 255) as u8;
        self.header[1] = (hsize >> 8) as u8;
        for i in 2..COMP_START {
            self.header[i] = get(input)?; // hh hm ph pm n
        }
        self.cend = COMP_START;

        // Component list: type byte plus a type-specific argument count.
        let n = self.header[6] as usize;
        for _ in 0..n {
            let ty = get(input)?;
            let size = descriptor_len(ty)
                .ok_or(ZpaqError::HeaderInvalid("unknown component type"))?;
            if self.cend + size > self.header.len() - 8 {
                return Err(ZpaqError::HeaderInvalid("component list exceeds header size"));
            }
            self.header[self.cend] = ty;
            self.cend += 1;
            for _ in 1..size {
                self.header[self.cend] = get(input)?;
                self.cend += 1;
            }
        }
        if get(input)? != 0 {
            return Err(ZpaqError::HeaderInvalid("missing component list terminator"));
        }
        self.header[self.cend] = 0;
        self.cend += 1;

        // Program, after the guard gap. The trailing zero byte is part of
        // the declared header size.
        self.hbegin = self.cend + GUARD_GAP;
        self.hend = self.hbegin;
        while self.hend < hsize + GUARD_GAP + 1 {
            if self.hend >= self.header.len() - 8 {
                return Err(ZpaqError::HeaderInvalid("program exceeds header size"));
            }
            self.header[self.hend] = get(input)?;
            self.hend += 1;
        }
        if get(input)? != 0 {
            return Err(ZpaqError::HeaderInvalid("missing program terminator"));
        }
        self.header[self.hend] = 0;
        self.hend += 1;

        if hsize != self.cend - 2 + self.hend - self.hbegin {
            return Err(ZpaqError::HeaderInvalid("header size mismatch"));
        }
        tracing::trace!(hsize, n, "block header parsed");
        Ok(self.cend + self.hend - self.hbegin)
    }

    /// Write the serialized header. With components present the full
    /// `hsize[2] .. comp 0` prefix is emitted; a bare PCOMP writes only its
    /// 2-byte program length. Returns false (writing nothing) when no
    /// program is loaded.
    pub fn write_header<W: ByteWriter + ?Sized>(&self, out: &mut W) -> Result<bool> {
        if !self.has_program() {
            return Ok(false);
        }
        let prog_len = self.hend - self.hbegin;
        if self.header[6] > 0 {
            for i in 0..self.cend {
                out.put(self.header[i])?;
            }
        } else {
            out.put((prog_len & 255) as u8)?;
            out.put((prog_len >> 8) as u8)?;
        }
        for i in self.hbegin..self.hend {
            out.put(self.header[i])?;
        }
        Ok(true)
    }

    /// Lay out a bare PCOMP program received through the loader
    /// subprotocol. `ph`/`pm` come from the enclosing block header; `prog`
    /// is the program exactly as embedded, trailing zero byte included.
    pub(crate) fn load_pcomp(&mut self, ph: u8, pm: u8, prog: &[u8]) -> Result<()> {
        self.clear();
        let hsize = 6 + prog.len(); // cend-2 plus the program extent
        self.header.resize(hsize + HEADER_SLACK, 0);
        self.header[0] = (hsize & 255) as u8;
        self.header[1] = (hsize >> 8) as u8;
        self.header[4] = ph;
        self.header[5] = pm;
        self.cend = 8; // empty component list, terminator included
        self.hbegin = self.cend + GUARD_GAP;
        self.header[self.hbegin..self.hbegin + prog.len()].copy_from_slice(prog);
        self.hend = self.hbegin + prog.len();
        self.init_p()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Machine initialization
    // ─────────────────────────────────────────────────────────────────────

    /// Initialize run-time state for the HCOMP program (`hh`/`hm` sizes).
    pub(crate) fn init_h(&mut self) -> Result<()> {
        let (hh, hm) = (self.header[2], self.header[3]);
        self.init(hh, hm)
    }

    /// Initialize run-time state for the PCOMP program (`ph`/`pm` sizes).
    pub(crate) fn init_p(&mut self) -> Result<()> {
        let (ph, pm) = (self.header[4], self.header[5]);
        self.init(ph, pm)
    }

    /// Largest supported log2 size for `H` and `M`.
    const MAX_MEM_BITS: u8 = 30;

    fn init(&mut self, hbits: u8, mbits: u8) -> Result<()> {
        if hbits > Self::MAX_MEM_BITS || mbits > Self::MAX_MEM_BITS {
            return Err(ZpaqError::HeaderInvalid("machine memory size too large"));
        }
        self.h = ZArray::new(1, hbits as u32);
        self.m = ZArray::new(1, mbits as u32);
        self.r = vec![0; 256];
        self.a = 0;
        self.b = 0;
        self.c = 0;
        self.d = 0;
        self.f = false;
        self.pc = 0;
        Ok(())
    }

    /// Model memory requirement in bytes, computed from the header alone.
    pub fn memory_estimate(&self) -> f64 {
        let mut mem = (2f64).powi(self.header[2] as i32 + 2)
            + (2f64).powi(self.header[3] as i32)
            + (2f64).powi(self.header[4] as i32 + 2)
            + (2f64).powi(self.header[5] as i32)
            + self.header.len() as f64;
        let mut cp = COMP_START;
        for _ in 0..self.n_components() {
            let size = (2f64).powi(self.header[cp + 1] as i32);
            match self.header[cp] {
                2 => mem += 4.0 * size,                                        // CM
                3 => mem += 64.0 * size + 1024.0,                              // ICM
                4 => mem += 4.0 * size + (2f64).powi(self.header[cp + 2] as i32), // MATCH
                6 => mem += 2.0 * size,                                        // MIX2
                7 => mem += 4.0 * size * self.header[cp + 3] as f64,           // MIX
                8 => mem += 64.0 * size + 2048.0,                              // ISSE
                9 => mem += 128.0 * size,                                      // SSE
                _ => {}
            }
            cp += descriptor_len(self.header[cp]).unwrap_or(1);
        }
        mem
    }

    // ─────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────

    /// Run the program: `A` is set to the input, `PC` to the program start,
    /// and instructions execute until `HALT`.
    pub(crate) fn run(&mut self, input: VmInput, sink: &mut OutSink<'_>) -> Result<()> {
        debug_assert!(self.has_program() && !self.m.is_empty() && !self.h.is_empty());
        self.a = input.as_u32();
        self.pc = self.hbegin;
        loop {
            let (instr, next) = decode(&self.header, self.pc)?;
            self.pc = next;
            if !self.step(instr, sink)? {
                return Ok(());
            }
        }
    }

    /// Execute one instruction; false after `HALT`.
    fn step(&mut self, instr: Instr, sink: &mut OutSink<'_>) -> Result<bool> {
        match instr {
            Instr::Halt => return Ok(false),
            Instr::Out => sink.put((self.a & 0xFF) as u8)?,
            Instr::Hash => {
                let mb = self.m[self.m.wrap(self.b)] as u32;
                self.a = self.a.wrapping_add(mb).wrapping_add(512).wrapping_mul(773);
            }
            Instr::HashD => {
                let i = self.h.wrap(self.d);
                self.h[i] = self.h[i].wrapping_add(self.a).wrapping_add(512).wrapping_mul(773);
            }
            Instr::Swap(loc) => self.swap(loc),
            Instr::Inc(loc) => self.modify(loc, |v| v.wrapping_add(1)),
            Instr::Dec(loc) => self.modify(loc, |v| v.wrapping_sub(1)),
            Instr::Not(loc) => self.modify(loc, |v| !v),
            Instr::Zero(loc) => self.modify(loc, |_| 0),
            Instr::LoadR { dst, idx } => {
                let v = self.r[idx as usize];
                match dst {
                    Loc::A => self.a = v,
                    Loc::B => self.b = v,
                    Loc::C => self.c = v,
                    Loc::D => self.d = v,
                    _ => unreachable!(),
                }
            }
            Instr::StoreR { idx } => self.r[idx as usize] = self.a,
            Instr::Jt { off } => {
                if self.f {
                    self.jump(off)?;
                }
            }
            Instr::Jf { off } => {
                if !self.f {
                    self.jump(off)?;
                }
            }
            Instr::Jmp { off } => self.jump(off)?,
            Instr::Lj { target } => {
                let pc = self.hbegin + target as usize;
                if pc >= self.hend {
                    return Err(ZpaqError::VmInvalidInstruction("long jump out of bounds"));
                }
                self.pc = pc;
            }
            Instr::Set { dst, src } => {
                let v = self.eval(src);
                self.store(dst, v);
            }
            Instr::Bin { op, src } => {
                let x = self.eval(src);
                match op {
                    BinOp::Add => self.a = self.a.wrapping_add(x),
                    BinOp::Sub => self.a = self.a.wrapping_sub(x),
                    BinOp::Mul => self.a = self.a.wrapping_mul(x),
                    BinOp::Div => self.a = if x != 0 { self.a / x } else { 0 },
                    BinOp::Mod => self.a = if x != 0 { self.a % x } else { 0 },
                    BinOp::And => self.a &= x,
                    BinOp::AndNot => self.a &= !x,
                    BinOp::Or => self.a |= x,
                    BinOp::Xor => self.a ^= x,
                    BinOp::Shl => self.a <<= x & 31,
                    BinOp::Shr => self.a >>= x & 31,
                    BinOp::Eq => self.f = self.a == x,
                    BinOp::Lt => self.f = self.a < x,
                    BinOp::Gt => self.f = self.a > x,
                }
            }
        }
        Ok(true)
    }

    /// Short jump: the offset is relative to the instruction following the
    /// offset byte.
    #[inline]
    fn jump(&mut self, off: i8) -> Result<()> {
        let pc = self.pc as i64 + off as i64;
        if pc < 0 {
            return Err(ZpaqError::VmInvalidInstruction("jump out of bounds"));
        }
        self.pc = pc as usize;
        Ok(())
    }

    #[inline]
    fn eval(&self, src: Src) -> u32 {
        match src {
            Src::A => self.a,
            Src::B => self.b,
            Src::C => self.c,
            Src::D => self.d,
            Src::MB => self.m[self.m.wrap(self.b)] as u32,
            Src::MC => self.m[self.m.wrap(self.c)] as u32,
            Src::HD => self.h[self.h.wrap(self.d)],
            Src::Imm(n) => n as u32,
        }
    }

    #[inline]
    fn store(&mut self, dst: Loc, v: u32) {
        match dst {
            Loc::A => self.a = v,
            Loc::B => self.b = v,
            Loc::C => self.c = v,
            Loc::D => self.d = v,
            Loc::MB => {
                let i = self.m.wrap(self.b);
                self.m[i] = (v & 0xFF) as u8;
            }
            Loc::MC => {
                let i = self.m.wrap(self.c);
                self.m[i] = (v & 0xFF) as u8;
            }
            Loc::HD => {
                let i = self.h.wrap(self.d);
                self.h[i] = v;
            }
        }
    }

    /// In-place update. Through `*B`/`*C` the value seen and stored is the
    /// single memory byte.
    #[inline]
    fn modify(&mut self, loc: Loc, f: impl Fn(u32) -> u32) {
        match loc {
            Loc::A => self.a = f(self.a),
            Loc::B => self.b = f(self.b),
            Loc::C => self.c = f(self.c),
            Loc::D => self.d = f(self.d),
            Loc::MB => {
                let i = self.m.wrap(self.b);
                self.m[i] = f(self.m[i] as u32) as u8;
            }
            Loc::MC => {
                let i = self.m.wrap(self.c);
                self.m[i] = f(self.m[i] as u32) as u8;
            }
            Loc::HD => {
                let i = self.h.wrap(self.d);
                self.h[i] = f(self.h[i]);
            }
        }
    }

    /// `X <> A`. Swaps through `*B`/`*C` exchange only the low byte of `A`;
    /// register and `H` swaps exchange the full word.
    #[inline]
    fn swap(&mut self, loc: Loc) {
        match loc {
            Loc::A => {} // not encodable
            Loc::B => std::mem::swap(&mut self.a, &mut self.b),
            Loc::C => std::mem::swap(&mut self.a, &mut self.c),
            Loc::D => std::mem::swap(&mut self.a, &mut self.d),
            Loc::MB => {
                let i = self.m.wrap(self.b);
                let old = self.m[i];
                self.m[i] = (self.a & 0xFF) as u8;
                self.a = (self.a & !0xFF) | old as u32;
            }
            Loc::MC => {
                let i = self.m.wrap(self.c);
                let old = self.m[i];
                self.m[i] = (self.a & 0xFF) as u8;
                self.a = (self.a & !0xFF) | old as u32;
            }
            Loc::HD => {
                let i = self.h.wrap(self.d);
                std::mem::swap(&mut self.a, &mut self.h[i]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceReader;

    /// Serialize a minimal one-CM-component header around `prog` (which
    /// must include its HALT) for VM-level tests.
    fn header_with(prog: &[u8]) -> Vec<u8> {
        let comp: &[u8] = &[2, 4, 12]; // CM sizebits=4 limit=12
        let hsize = 5 + comp.len() + 1 + prog.len() + 1;
        let mut hdr = vec![(hsize & 255) as u8, (hsize >> 8) as u8];
        hdr.extend_from_slice(&[4, 4, 0, 0, 1]); // hh hm ph pm n
        hdr.extend_from_slice(comp);
        hdr.push(0);
        hdr.extend_from_slice(prog);
        hdr.push(0);
        hdr
    }

    fn run_prog(prog: &[u8], input: u8) -> (Vm, Vec<u8>) {
        let hdr = header_with(prog);
        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(&hdr)).unwrap();
        vm.init_h().unwrap();
        let mut out = Vec::new();
        let mut sink = OutSink { output: Some(&mut out), sha1: None };
        vm.run(VmInput::Byte(input), &mut sink).unwrap();
        (vm, out)
    }

    #[test]
    fn arithmetic_and_out() {
        // A= 5; A+= 3; OUT; HALT
        let (vm, out) = run_prog(&[71, 5, 135, 3, 57, 56], 0);
        assert_eq!(vm.a, 8);
        assert_eq!(out, [8]);
    }

    #[test]
    fn input_lands_in_a() {
        // OUT; HALT
        let (_, out) = run_prog(&[57, 56], 0xAB);
        assert_eq!(out, [0xAB]);
    }

    #[test]
    fn division_by_zero_yields_zero() {
        // A= 7; B=0; A/=B; HALT
        let (vm, _) = run_prog(&[71, 7, 12, 153, 56], 0);
        assert_eq!(vm.a, 0);
        // A= 7; A%= 0; HALT
        let (vm, _) = run_prog(&[71, 7, 167, 0, 56], 0);
        assert_eq!(vm.a, 0);
    }

    #[test]
    fn shift_count_masked_to_5_bits() {
        // A= 1; A<<= 33; HALT — 33 & 31 = 1
        let (vm, _) = run_prog(&[71, 1, 207, 33, 56], 0);
        assert_eq!(vm.a, 2);
    }

    #[test]
    fn mem_swap_touches_low_byte_only() {
        // *B=A stores low byte; then swap exchanges it back into a cleared A.
        // A= 0xAB; *B<>A; A= 0; *B<>A; HALT
        let (vm, _) = run_prog(&[71, 0xAB, 32, 71, 0, 32, 56], 0);
        assert_eq!(vm.a, 0xAB);
    }

    #[test]
    fn conditional_jumps() {
        // A= 1; A== 1; JT +2 (skip A= 99); HALT
        let (vm, _) = run_prog(&[71, 1, 223, 1, 39, 2, 71, 99, 56], 0);
        assert_eq!(vm.a, 1);
        // A= 1; A== 2; JT +2; A= 99; HALT — not taken
        let (vm, _) = run_prog(&[71, 1, 223, 2, 39, 2, 71, 99, 56], 0);
        assert_eq!(vm.a, 99);
    }

    #[test]
    fn backward_jump_loops() {
        // Count A down to 0: A= 3; A-- ; A> 0; JT -5; HALT
        let (vm, _) = run_prog(&[71, 3, 2, 239, 0, 39, 0xFB, 56], 0);
        assert_eq!(vm.a, 0);
    }

    #[test]
    fn long_jump_and_bounds() {
        // LJ 4 jumps over A= 99 (bytes 3..5): target is program-relative.
        let (vm, _) = run_prog(&[255, 5, 0, 71, 99, 56], 0);
        assert_eq!(vm.a, 0);

        // An LJ past hend is an execution error.
        let hdr = header_with(&[255, 255, 255, 56]);
        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(&hdr)).unwrap();
        vm.init_h().unwrap();
        let err = vm.run(VmInput::Byte(0), &mut OutSink::none()).unwrap_err();
        assert!(matches!(err, ZpaqError::VmInvalidInstruction(_)));
    }

    #[test]
    fn undefined_opcode_fails() {
        let hdr = header_with(&[5, 56]);
        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(&hdr)).unwrap();
        vm.init_h().unwrap();
        let err = vm.run(VmInput::Byte(0), &mut OutSink::none()).unwrap_err();
        assert!(matches!(err, ZpaqError::VmInvalidInstruction(_)));
    }

    #[test]
    fn running_off_program_end_hits_guard() {
        // No HALT: falls through to the trailing zero byte, which errors.
        let hdr = header_with(&[1]); // A++
        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(&hdr)).unwrap();
        vm.init_h().unwrap();
        assert!(vm.run(VmInput::Byte(0), &mut OutSink::none()).is_err());
    }

    #[test]
    fn register_file_roundtrip() {
        // A= 42; R=A 5; A= 0; A=R 5; HALT
        let (vm, _) = run_prog(&[71, 42, 55, 5, 71, 0, 7, 5, 56], 0);
        assert_eq!(vm.a, 42);
    }

    #[test]
    fn hash_instruction() {
        // M is all zero, so HASH computes (a + 0 + 512) * 773.
        let (vm, _) = run_prog(&[59, 56], 3);
        assert_eq!(vm.a, (3u32 + 512).wrapping_mul(773));
    }

    #[test]
    fn eof_sentinel_is_above_255() {
        // A> 255; JT +2; A= 0; HALT — keeps u32::MAX only for the sentinel.
        let prog = &[239, 255, 39, 2, 71, 0, 56];
        let hdr = header_with(prog);
        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(&hdr)).unwrap();
        vm.init_h().unwrap();
        vm.run(VmInput::Eof, &mut OutSink::none()).unwrap();
        assert_eq!(vm.a, u32::MAX);
        vm.run(VmInput::Byte(7), &mut OutSink::none()).unwrap();
        assert_eq!(vm.a, 0);
    }

    #[test]
    fn header_roundtrips_through_write() {
        let hdr = header_with(&[71, 1, 56]);
        let mut vm = Vm::new();
        vm.read_header(&mut SliceReader::new(&hdr)).unwrap();
        let mut out = Vec::new();
        assert!(vm.write_header(&mut out).unwrap());
        assert_eq!(out, hdr);
    }

    #[test]
    fn header_errors() {
        // Unknown component type 77.
        let bad = [9u8, 0, 4, 4, 0, 0, 1, 77, 0, 56, 0];
        let mut vm = Vm::new();
        assert!(matches!(
            vm.read_header(&mut SliceReader::new(&bad)),
            Err(ZpaqError::HeaderInvalid(_))
        ));

        // Truncated input.
        let mut vm = Vm::new();
        assert!(matches!(
            vm.read_header(&mut SliceReader::new(&[10, 0, 1])),
            Err(ZpaqError::HeaderInvalid(_))
        ));

        // Missing component-list terminator.
        let hdr = header_with(&[56]);
        let mut broken = hdr.clone();
        broken[10] = 1; // the comp terminator slot
        let mut vm = Vm::new();
        assert!(matches!(
            vm.read_header(&mut SliceReader::new(&broken)),
            Err(ZpaqError::HeaderInvalid(_))
        ));
    }
}
