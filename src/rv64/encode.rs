//! Generic per-format encoders driven by [`Op::layout`]
//!
//! Every function checks that `op` belongs to the format it encodes and that every
//! operand fits its field, then packs the fields with [`bits::insert`]. Operand-range
//! violations are upstream code-generation bugs and panic.

use crate::bits;
use crate::util::misc;
use crate::util::opcode::AqRl;
use crate::rv64::{Op, Format, Layout, Register, RoundingMode};

#[track_caller]
#[inline(always)]
fn layout_of(op: Op, format: Format) -> Layout {
    let layout = op.layout();
    assert!{
        layout.format == format,
        "`{}` is not a {format:?}-format instruction",
        op.mnemonic()
    };
    layout
}

#[inline(always)]
fn base(layout: &Layout, funct3: u32) -> u32 {
    let w = bits::insert(0, 6, 0, layout.opcode.as_u32());
    bits::insert(w, 14, 12, funct3)
}

/// Encode an R-format instruction (integer ALU, M-extension, FP sign-injection/min/max/compare).
///
/// # Example
/// ```
/// use rvjit::rv64::{Op, Reg, encode};
///
/// assert_eq!(encode::r(Op::Mul, Reg::A0, Reg::A1, Reg::A2), 0x02c58533); // mul a0, a1, a2
/// assert_eq!(encode::r(Op::Div, Reg::A0, Reg::A1, Reg::A2), 0x02c5c533); // div a0, a1, a2
/// assert_eq!(encode::r(Op::Sub, Reg::A0, Reg::A1, Reg::A2), 0x40c58533); // sub a0, a1, a2
/// ```
#[track_caller]
pub fn r(op: Op, rd: impl Register, rs1: impl Register, rs2: impl Register) -> u32 {
    let l = layout_of(op, Format::R);
    let w = base(&l, l.funct3 as _);
    let w = bits::insert(w, 11, 7, rd.encoding());
    let w = bits::insert(w, 19, 15, rs1.encoding());
    let w = bits::insert(w, 24, 20, rs2.encoding());
    bits::insert(w, 31, 25, l.funct7 as _)
}

/// Encode an I-format instruction (ALU immediate, loads, `jalr`).
///
/// # Example
/// ```
/// use rvjit::rv64::{Op, Reg, encode};
///
/// assert_eq!(encode::i(Op::Addi, Reg::A0, Reg::A0, 1), 0x00150513);  // addi a0, a0, 1
/// assert_eq!(encode::i(Op::Ld, Reg::T0, Reg::T0, 12), 0x00c2b283);   // ld t0, 12(t0)
/// assert_eq!(encode::i(Op::Jalr, Reg::ZERO, Reg::RA, 0), 0x00008067); // ret
/// ```
#[track_caller]
pub fn i(op: Op, rd: impl Register, rs1: impl Register, imm: i32) -> u32 {
    let l = layout_of(op, Format::I);
    assert!{
        misc::fits_into_12_bits(imm as _),
        "`{}`: immediate {imm} does not fit into 12 bits",
        op.mnemonic()
    };

    let w = base(&l, l.funct3 as _);
    let w = bits::insert(w, 11, 7, rd.encoding());
    let w = bits::insert(w, 19, 15, rs1.encoding());
    bits::insert(w, 31, 20, imm as u32 & 0xfff)
}

/// Encode a shift-by-immediate (`slli`, `srli`, `srai` take 6-bit amounts, the `*w` forms 5-bit).
#[track_caller]
pub fn shift(op: Op, rd: impl Register, rs1: impl Register, shamt: u32) -> u32 {
    let l = op.layout();
    let w = match l.format {
        Format::Shift => {
            assert!(shamt < 64, "`{}`: shift amount {shamt} does not fit into 6 bits", op.mnemonic());
            let w = bits::insert(0, 25, 20, shamt);
            bits::insert(w, 31, 26, l.funct7 as _)
        }
        Format::ShiftW => {
            assert!(shamt < 32, "`{}`: shift amount {shamt} does not fit into 5 bits", op.mnemonic());
            let w = bits::insert(0, 24, 20, shamt);
            bits::insert(w, 31, 25, l.funct7 as _)
        }
        _ => panic!("`{}` is not a shift-by-immediate instruction", op.mnemonic()),
    };

    let w = w | base(&l, l.funct3 as _);
    let w = bits::insert(w, 11, 7, rd.encoding());
    bits::insert(w, 19, 15, rs1.encoding())
}

/// Encode an S-format store: `src` is written to `offset(base_reg)`.
///
/// # Example
/// ```
/// use rvjit::rv64::{Op, Reg, encode};
///
/// assert_eq!(encode::s(Op::Sd, Reg::A0, Reg::SP, 0), 0x00a13023); // sd a0, 0(sp)
/// assert_eq!(encode::s(Op::Sw, Reg::A1, Reg::A0, -4), 0xfeb52e23); // sw a1, -4(a0)
/// ```
#[track_caller]
pub fn s(op: Op, src: impl Register, base_reg: impl Register, offset: i32) -> u32 {
    let l = layout_of(op, Format::S);
    assert!{
        misc::fits_into_12_bits(offset as _),
        "`{}`: offset {offset} does not fit into 12 bits",
        op.mnemonic()
    };

    let imm = offset as u32 & 0xfff;
    let w = base(&l, l.funct3 as _);
    let w = bits::insert(w, 11, 7, imm & 0x1f);          // imm[4:0]
    let w = bits::insert(w, 19, 15, base_reg.encoding());
    let w = bits::insert(w, 24, 20, src.encoding());
    bits::insert(w, 31, 25, imm >> 5)                     // imm[11:5]
}

/// Encode a conditional branch with a byte offset relative to the branch itself.
///
/// # Example
/// ```
/// use rvjit::rv64::{Op, Reg, encode};
///
/// assert_eq!(encode::b(Op::Beq, Reg::A0, Reg::A1, 16), 0x00b50863); // beq a0, a1, .+16
/// ```
#[track_caller]
pub fn b(op: Op, rs1: impl Register, rs2: impl Register, offset: i64) -> u32 {
    let l = layout_of(op, Format::B);
    assert!{
        bits::is_imm_in_range(offset, 12, 1),
        "`{}`: branch offset {offset} is out of range",
        op.mnemonic()
    };

    let w = base(&l, l.funct3 as _);
    let w = bits::insert(w, 19, 15, rs1.encoding());
    let w = bits::insert(w, 24, 20, rs2.encoding());
    set_branch_offset(w, offset)
}

/// Replace the offset fields of a B-format word.
#[inline]
pub fn set_branch_offset(word: u32, offset: i64) -> u32 {
    let w = bits::insert(word, 31, 31, ((offset >> 12) & 0x1) as _); // offset[12]   -> [31]
    let w = bits::insert(w, 30, 25, ((offset >> 5) & 0x3f) as _);    // offset[10:5] -> [30:25]
    let w = bits::insert(w, 11, 8, ((offset >> 1) & 0xf) as _);      // offset[4:1]  -> [11:8]
    bits::insert(w, 7, 7, ((offset >> 11) & 0x1) as _)              // offset[11]   -> [7]
}

/// Byte offset held in a B-format word.
#[inline]
pub const fn branch_offset(word: u32) -> i64 {
    let offset = (bits::extract(word, 31, 31) << 12)
        | (bits::extract(word, 7, 7) << 11)
        | (bits::extract(word, 30, 25) << 5)
        | (bits::extract(word, 11, 8) << 1);
    bits::sext(offset as _, 13)
}

/// Encode `lui`/`auipc` with a signed 20-bit upper immediate.
///
/// # Example
/// ```
/// use rvjit::rv64::{Op, Reg, encode};
///
/// assert_eq!(encode::u(Op::Lui, Reg::A0, 0x12345), 0x12345537); // lui a0, 0x12345
/// assert_eq!(encode::u(Op::Auipc, Reg::T0, 0), 0x00000297);     // auipc t0, 0
/// assert_eq!(encode::u(Op::Lui, Reg::A0, -1), 0xfffff537);      // lui a0, 0xfffff
/// ```
#[track_caller]
pub fn u(op: Op, rd: impl Register, imm20: i32) -> u32 {
    let l = layout_of(op, Format::U);
    assert!{
        bits::is_imm_in_range(imm20 as _, 20, 0),
        "`{}`: upper immediate {imm20} does not fit into 20 bits",
        op.mnemonic()
    };

    let w = bits::insert(0, 6, 0, l.opcode.as_u32());
    let w = bits::insert(w, 11, 7, rd.encoding());
    bits::insert(w, 31, 12, imm20 as u32 & 0xfffff)
}

/// Encode `jal` with a byte offset relative to the jump itself.
///
/// # Example
/// ```
/// use rvjit::rv64::{Op, Reg, encode};
///
/// assert_eq!(encode::j(Op::Jal, Reg::ZERO, 0), 0x0000006f);  // j .
/// assert_eq!(encode::j(Op::Jal, Reg::RA, 2048), 0x001000ef); // jal ra, .+2048
/// ```
#[track_caller]
pub fn j(op: Op, rd: impl Register, offset: i64) -> u32 {
    let l = layout_of(op, Format::J);
    assert!{
        bits::is_imm_in_range(offset, 20, 1),
        "`{}`: jump offset {offset} is out of range",
        op.mnemonic()
    };

    let w = bits::insert(0, 6, 0, l.opcode.as_u32());
    let w = bits::insert(w, 11, 7, rd.encoding());
    set_jal_offset(w, offset)
}

/// Replace the offset fields of a J-format word.
#[inline]
pub fn set_jal_offset(word: u32, offset: i64) -> u32 {
    let w = bits::insert(word, 31, 31, ((offset >> 20) & 0x1) as _);  // offset[20]    -> [31]
    let w = bits::insert(w, 30, 21, ((offset >> 1) & 0x3ff) as _);    // offset[10:1]  -> [30:21]
    let w = bits::insert(w, 20, 20, ((offset >> 11) & 0x1) as _);     // offset[11]    -> [20]
    bits::insert(w, 19, 12, ((offset >> 12) & 0xff) as _)            // offset[19:12] -> [19:12]
}

/// Byte offset held in a J-format word.
#[inline]
pub const fn jal_offset(word: u32) -> i64 {
    let offset = (bits::extract(word, 31, 31) << 20)
        | (bits::extract(word, 19, 12) << 12)
        | (bits::extract(word, 20, 20) << 11)
        | (bits::extract(word, 30, 21) << 1);
    bits::sext(offset as _, 21)
}

/// Encode an atomic memory operation or store-conditional: `rd <- op(mem[addr], src)`.
///
/// # Example
/// ```
/// use rvjit::rv64::{Op, Reg, encode};
/// use rvjit::util::opcode::AqRl;
///
/// // amoadd.d a0, a1, (a2)
/// assert_eq!(encode::amo(Op::AmoaddD, Reg::A0, Reg::A1, Reg::A2, AqRl::None), 0x00b6352f);
/// // amoswap.w.aqrl a0, a1, (a2)
/// assert_eq!(encode::amo(Op::AmoswapW, Reg::A0, Reg::A1, Reg::A2, AqRl::AcquireRelease), 0x0eb6252f);
/// ```
#[track_caller]
pub fn amo(op: Op, rd: impl Register, src: impl Register, addr: impl Register, aqrl: AqRl) -> u32 {
    let l = layout_of(op, Format::Amo);
    amo_word(&l, rd.encoding(), addr.encoding(), src.encoding(), aqrl)
}

/// Encode a load-reserved.
///
/// # Example
/// ```
/// use rvjit::rv64::{Op, Reg, encode};
/// use rvjit::util::opcode::AqRl;
///
/// assert_eq!(encode::lr(Op::LrW, Reg::A0, Reg::A1, AqRl::None), 0x1005a52f); // lr.w a0, (a1)
/// ```
#[track_caller]
pub fn lr(op: Op, rd: impl Register, addr: impl Register, aqrl: AqRl) -> u32 {
    let l = layout_of(op, Format::LoadReserved);
    amo_word(&l, rd.encoding(), addr.encoding(), 0, aqrl)
}

#[inline(always)]
fn amo_word(l: &Layout, rd: u32, rs1: u32, rs2: u32, aqrl: AqRl) -> u32 {
    let w = base(l, l.funct3 as _);
    let w = bits::insert(w, 11, 7, rd);
    let w = bits::insert(w, 19, 15, rs1);
    let w = bits::insert(w, 24, 20, rs2);
    let w = bits::insert(w, 26, 25, aqrl.as_u32());
    bits::insert(w, 31, 27, l.funct7 as _)
}

/// Encode `csrrw`/`csrrs`/`csrrc`.
#[track_caller]
pub fn csr(op: Op, rd: impl Register, csr: u16, rs1: impl Register) -> u32 {
    let l = layout_of(op, Format::Csr);
    csr_word(&l, rd.encoding(), csr, rs1.encoding())
}

/// Encode `csrrwi`/`csrrsi`/`csrrci` with a 5-bit unsigned immediate.
#[track_caller]
pub fn csri(op: Op, rd: impl Register, csr: u16, uimm: u32) -> u32 {
    let l = layout_of(op, Format::CsrImm);
    assert!(uimm < 32, "`{}`: immediate {uimm} does not fit into 5 bits", op.mnemonic());
    csr_word(&l, rd.encoding(), csr, uimm)
}

#[track_caller]
#[inline(always)]
fn csr_word(l: &Layout, rd: u32, csr: u16, rs1: u32) -> u32 {
    assert!(csr < 4096, "CSR number {csr:#x} does not fit into 12 bits");
    let w = base(l, l.funct3 as _);
    let w = bits::insert(w, 11, 7, rd);
    let w = bits::insert(w, 19, 15, rs1);
    bits::insert(w, 31, 20, csr as _)
}

/// Encode `fence pred, succ`; each set is a 4-bit `iorw` mask.
///
/// # Example
/// ```
/// use rvjit::rv64::encode;
///
/// assert_eq!(encode::fence(0b0011, 0b0011), 0x0330000f); // fence rw, rw
/// assert_eq!(encode::fence(0b1111, 0b1111), 0x0ff0000f); // fence iorw, iorw
/// ```
#[track_caller]
pub fn fence(pred: u32, succ: u32) -> u32 {
    let l = layout_of(Op::Fence, Format::Fence);
    let w = base(&l, l.funct3 as _);
    let w = bits::insert(w, 23, 20, succ);
    bits::insert(w, 27, 24, pred)
}

/// Encode an instruction with no operands (`ecall`, `ebreak`, `fence.i`).
///
/// # Example
/// ```
/// use rvjit::rv64::{Op, encode};
///
/// assert_eq!(encode::fixed(Op::Ecall), 0x00000073);
/// assert_eq!(encode::fixed(Op::Ebreak), 0x00100073);
/// assert_eq!(encode::fixed(Op::FenceI), 0x0000100f);
/// ```
#[track_caller]
pub fn fixed(op: Op) -> u32 {
    let l = layout_of(op, Format::Fixed);
    bits::insert(base(&l, l.funct3 as _), 31, 20, l.aux as _)
}

/// Encode a two-source FP arithmetic op with a rounding mode.
///
/// # Example
/// ```
/// use rvjit::rv64::{Op, FReg, RoundingMode, encode};
///
/// // fadd.d fa0, fa1, fa2 (dyn)
/// assert_eq!(encode::fp(Op::FaddD, FReg::FA0, FReg::FA1, FReg::FA2, RoundingMode::Dyn), 0x02c5f553);
/// ```
#[track_caller]
pub fn fp(op: Op, rd: impl Register, rs1: impl Register, rs2: impl Register, rm: RoundingMode) -> u32 {
    let l = layout_of(op, Format::FpRm);
    let w = base(&l, rm.as_u32());
    let w = bits::insert(w, 11, 7, rd.encoding());
    let w = bits::insert(w, 19, 15, rs1.encoding());
    let w = bits::insert(w, 24, 20, rs2.encoding());
    bits::insert(w, 31, 25, l.funct7 as _)
}

/// Encode a one-source FP op (`fsqrt`, `fcvt.*`, `fmv.*`, `fclass`).
///
/// `rm` is only meaningful for the rounding forms; fixed-`funct3` forms ignore it.
#[track_caller]
pub fn fp_unary(op: Op, rd: impl Register, rs1: impl Register, rm: RoundingMode) -> u32 {
    let l = op.layout();
    let funct3 = match l.format {
        Format::FpUnaryRm => rm.as_u32(),
        Format::FpUnary   => l.funct3 as _,
        _ => panic!("`{}` is not a unary floating-point instruction", op.mnemonic()),
    };

    let w = base(&l, funct3);
    let w = bits::insert(w, 11, 7, rd.encoding());
    let w = bits::insert(w, 19, 15, rs1.encoding());
    let w = bits::insert(w, 24, 20, l.aux as _);
    bits::insert(w, 31, 25, l.funct7 as _)
}

/// Encode a fused multiply-add: `rd = ±(rs1 * rs2) ± rs3`.
#[track_caller]
pub fn r4(
    op: Op,
    rd: impl Register,
    rs1: impl Register,
    rs2: impl Register,
    rs3: impl Register,
    rm: RoundingMode
) -> u32 {
    let l = layout_of(op, Format::R4);
    let w = base(&l, rm.as_u32());
    let w = bits::insert(w, 11, 7, rd.encoding());
    let w = bits::insert(w, 19, 15, rs1.encoding());
    let w = bits::insert(w, 24, 20, rs2.encoding());
    let w = bits::insert(w, 26, 25, l.aux as _);
    bits::insert(w, 31, 27, rs3.encoding())
}
