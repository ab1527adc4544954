//! ZPAQL instruction decoding.
//!
//! The instruction set is a fixed 256-entry opcode table. Every opcode is a
//! single byte except the short jumps (1-byte signed offset), assignments
//! from an immediate, the register-file moves (1-byte register number), and
//! the long jump `LJ` (2-byte little-endian absolute target). The byte
//! layout is regular: opcodes 1..=55 are eight-entry groups of per-location
//! operations, 64..=239 are eight-entry rows of `dst = src` /
//! `A <op>= src` with the source selected by the low three bits.
//!
//! Decoding is lazy — one instruction at a time, at the program counter —
//! so an undefined byte in never-executed code is not an error, matching
//! the on-wire semantics. Executing an undefined opcode (including the
//! reserved byte 0) fails with `VmInvalidInstruction`.

use crate::error::{Result, ZpaqError};

/// An addressable location: a register, a byte of `M` (through `B` or `C`),
/// or a word of `H` (through `D`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Loc {
    A,
    B,
    C,
    D,
    /// `*B` — `M[B mod |M|]`, one byte.
    MB,
    /// `*C` — `M[C mod |M|]`, one byte.
    MC,
    /// `*D` — `H[D mod |H|]`, one 32-bit word.
    HD,
}

/// A value source for `dst = src` and `A <op>= src` forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Src {
    A,
    B,
    C,
    D,
    MB,
    MC,
    HD,
    Imm(u8),
}

/// Binary operations applied to `A` (comparisons set the flag instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    /// Division by zero yields 0.
    Div,
    /// Modulo by zero yields 0.
    Mod,
    And,
    /// `A &= !src`.
    AndNot,
    Or,
    Xor,
    /// Shift count masked to 5 bits.
    Shl,
    /// Shift count masked to 5 bits.
    Shr,
    /// `F = (A == src)`.
    Eq,
    /// `F = (A < src)`, unsigned.
    Lt,
    /// `F = (A > src)`, unsigned.
    Gt,
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Instr {
    Halt,
    /// Send the low byte of `A` to the output sinks.
    Out,
    /// `A = (A + *B + 512) * 773`.
    Hash,
    /// `*D = (*D + A + 512) * 773`.
    HashD,
    /// `X <> A`: swap with `A`. Through `*B`/`*C` only the low byte of `A`
    /// participates.
    Swap(Loc),
    Inc(Loc),
    Dec(Loc),
    /// Bitwise complement in place.
    Not(Loc),
    Zero(Loc),
    /// `A=R n` family: load a register from the register file.
    LoadR { dst: Loc, idx: u8 },
    /// `R=A n`: store `A` into the register file.
    StoreR { idx: u8 },
    /// Jump if flag set; offset is relative to the following instruction.
    Jt { off: i8 },
    /// Jump if flag clear.
    Jf { off: i8 },
    /// Unconditional short jump.
    Jmp { off: i8 },
    /// Absolute jump within the program.
    Lj { target: u16 },
    /// `dst = src`.
    Set { dst: Loc, src: Src },
    /// `A <op>= src`, or a flag-setting comparison.
    Bin { op: BinOp, src: Src },
}

const LOCS: [Loc; 7] = [Loc::A, Loc::B, Loc::C, Loc::D, Loc::MB, Loc::MC, Loc::HD];

const BIN_OPS: [BinOp; 14] = [
    BinOp::Add,
    BinOp::Sub,
    BinOp::Mul,
    BinOp::Div,
    BinOp::Mod,
    BinOp::And,
    BinOp::AndNot,
    BinOp::Or,
    BinOp::Xor,
    BinOp::Shl,
    BinOp::Shr,
    BinOp::Eq,
    BinOp::Lt,
    BinOp::Gt,
];

#[inline]
fn invalid() -> ZpaqError {
    ZpaqError::VmInvalidInstruction("undefined opcode")
}

#[inline]
fn truncated() -> ZpaqError {
    ZpaqError::VmInvalidInstruction("program counter out of bounds")
}

/// Decode the instruction at `pc`. Returns the instruction and the index of
/// the next one.
pub(crate) fn decode(code: &[u8], pc: usize) -> Result<(Instr, usize)> {
    let op = *code.get(pc).ok_or_else(truncated)?;
    let mut next = pc + 1;
    let mut imm = || -> Result<u8> {
        let v = *code.get(next).ok_or_else(truncated)?;
        next += 1;
        Ok(v)
    };

    let instr = match op {
        0 => return Err(invalid()),

        // Per-location groups: A B C D *B *C *D, eight opcodes each.
        1..=55 => {
            let loc = LOCS[(op >> 3) as usize];
            match op & 7 {
                0 => Instr::Swap(loc), // op 0 (A<>A) already handled above
                1 => Instr::Inc(loc),
                2 => Instr::Dec(loc),
                3 => Instr::Not(loc),
                4 => Instr::Zero(loc),
                7 => match op {
                    7 | 15 | 23 | 31 => Instr::LoadR { dst: loc, idx: imm()? },
                    39 => Instr::Jt { off: imm()? as i8 },
                    47 => Instr::Jf { off: imm()? as i8 },
                    55 => Instr::StoreR { idx: imm()? },
                    _ => unreachable!(),
                },
                _ => return Err(invalid()), // sub-opcodes 5 and 6 are reserved
            }
        }

        56 => Instr::Halt,
        57 => Instr::Out,
        58 => return Err(invalid()),
        59 => Instr::Hash,
        60 => Instr::HashD,
        61 | 62 => return Err(invalid()),
        63 => Instr::Jmp { off: imm()? as i8 },

        // dst = src rows (row 15, opcodes 120..=127, is reserved).
        64..=119 => {
            let dst = LOCS[(op >> 3) as usize - 8];
            Instr::Set { dst, src: decode_src(op, &mut imm)? }
        }
        120..=127 => return Err(invalid()),

        // A <op>= src rows.
        128..=239 => {
            let bin = BIN_OPS[(op >> 3) as usize - 16];
            Instr::Bin { op: bin, src: decode_src(op, &mut imm)? }
        }

        240..=254 => return Err(invalid()),

        255 => {
            let lo = imm()? as u16;
            let hi = imm()? as u16;
            Instr::Lj { target: lo | (hi << 8) }
        }
    };
    Ok((instr, next))
}

#[inline]
fn decode_src(op: u8, imm: &mut impl FnMut() -> Result<u8>) -> Result<Src> {
    Ok(match op & 7 {
        0 => Src::A,
        1 => Src::B,
        2 => Src::C,
        3 => Src::D,
        4 => Src::MB,
        5 => Src::MC,
        6 => Src::HD,
        _ => Src::Imm(imm()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_opcodes_are_invalid() {
        let reserved = [
            0u8, 5, 6, 13, 14, 21, 22, 29, 30, 37, 38, 45, 46, 53, 54, 58, 61, 62, 120, 121,
            122, 123, 124, 125, 126, 127, 240, 245, 250, 254,
        ];
        for op in reserved {
            assert!(decode(&[op, 0, 0], 0).is_err(), "opcode {op}");
        }
    }

    #[test]
    fn all_defined_opcodes_decode() {
        let reserved: &[u8] = &[
            0, 5, 6, 13, 14, 21, 22, 29, 30, 37, 38, 45, 46, 53, 54, 58, 61, 62,
        ];
        for op in 0..=255u8 {
            let defined = !(reserved.contains(&op)
                || (120..=127).contains(&op)
                || (240..=254).contains(&op));
            assert_eq!(decode(&[op, 0, 0], 0).is_ok(), defined, "opcode {op}");
        }
    }

    #[test]
    fn immediates_advance_pc() {
        // A= 42 is opcode 71 followed by the immediate.
        assert_eq!(
            decode(&[71, 42], 0).unwrap(),
            (Instr::Set { dst: Loc::A, src: Src::Imm(42) }, 2)
        );
        // A++ has no operand.
        assert_eq!(decode(&[1], 0).unwrap(), (Instr::Inc(Loc::A), 1));
        // LJ takes a little-endian 16-bit target.
        assert_eq!(
            decode(&[255, 0x34, 0x12], 0).unwrap(),
            (Instr::Lj { target: 0x1234 }, 3)
        );
    }

    #[test]
    fn group_decoding_spot_checks() {
        assert_eq!(decode(&[8], 0).unwrap().0, Instr::Swap(Loc::B));
        assert_eq!(decode(&[32], 0).unwrap().0, Instr::Swap(Loc::MB));
        assert_eq!(decode(&[52], 0).unwrap().0, Instr::Zero(Loc::HD));
        assert_eq!(decode(&[56], 0).unwrap().0, Instr::Halt);
        assert_eq!(decode(&[57], 0).unwrap().0, Instr::Out);
        assert_eq!(decode(&[59], 0).unwrap().0, Instr::Hash);
        assert_eq!(decode(&[60], 0).unwrap().0, Instr::HashD);
        assert_eq!(
            decode(&[39, 0xFE], 0).unwrap().0,
            Instr::Jt { off: -2 }
        );
        assert_eq!(
            decode(&[7, 9], 0).unwrap().0,
            Instr::LoadR { dst: Loc::A, idx: 9 }
        );
        assert_eq!(decode(&[55, 3], 0).unwrap().0, Instr::StoreR { idx: 3 });
        assert_eq!(
            decode(&[68], 0).unwrap().0,
            Instr::Set { dst: Loc::A, src: Src::MB }
        );
        assert_eq!(
            decode(&[119, 7], 0).unwrap().0,
            Instr::Set { dst: Loc::HD, src: Src::Imm(7) }
        );
        assert_eq!(
            decode(&[135, 10], 0).unwrap().0,
            Instr::Bin { op: BinOp::Add, src: Src::Imm(10) }
        );
        assert_eq!(
            decode(&[239, 255], 0).unwrap().0,
            Instr::Bin { op: BinOp::Gt, src: Src::Imm(255) }
        );
        assert_eq!(
            decode(&[208], 0).unwrap().0,
            Instr::Bin { op: BinOp::Shr, src: Src::A }
        );
    }
}
