//! Declarative RV64GC encoding table
//!
//! Each row maps a mnemonic to its field layout. `funct7` holds whatever lives in the
//! top bits for that format (funct7, funct6 of 64-bit shifts, funct5 of AMOs) and `aux`
//! holds the fixed rs2 selector of unary FP ops, the `fmt` of fused multiply-adds, or the
//! fixed immediate of system instructions.

use crate::util::opcode::Opcode;

/// Field layout family of an instruction.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum Format {
    /// `funct7 | rs2 | rs1 | funct3 | rd | opcode`
    R,
    /// `imm[11:0] | rs1 | funct3 | rd | opcode`
    I,
    /// `funct6 | shamt[5:0] | rs1 | funct3 | rd | opcode`
    Shift,
    /// `funct7 | shamt[4:0] | rs1 | funct3 | rd | opcode`
    ShiftW,
    /// `imm[11:5] | rs2 | rs1 | funct3 | imm[4:0] | opcode`
    S,
    /// `imm[12|10:5] | rs2 | rs1 | funct3 | imm[4:1|11] | opcode`
    B,
    /// `imm[31:12] | rd | opcode`
    U,
    /// `imm[20|10:1|11|19:12] | rd | opcode`
    J,
    /// `funct5 | aq | rl | rs2 | rs1 | funct3 | rd | opcode`
    Amo,
    /// AMO layout with rs2 fixed to zero
    LoadReserved,
    /// `csr | rs1 | funct3 | rd | opcode`
    Csr,
    /// `csr | uimm[4:0] | funct3 | rd | opcode`
    CsrImm,
    /// `fm | pred | succ | rs1 | funct3 | rd | opcode`
    Fence,
    /// Whole word is fixed (`aux` is `imm[11:0]`)
    Fixed,
    /// R layout with `funct3` carrying the rounding mode
    FpRm,
    /// R layout with `rs2` fixed to `aux` and `funct3` carrying the rounding mode
    FpUnaryRm,
    /// R layout with `rs2` fixed to `aux`
    FpUnary,
    /// `rs3 | fmt | rs2 | rs1 | rm | rd | opcode`
    R4,
}

/// Opcode/funct constants of one mnemonic.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub struct Layout {
    pub format: Format,
    pub opcode: Opcode,
    pub funct3: u8,
    pub funct7: u8,
    pub aux: u16,
}

macro_rules! isa_table {
    ($(
        $op:ident = $mnemonic:literal : $format:ident, $opcode:ident, $funct3:literal, $funct7:literal, $aux:literal;
    )*) => {
        /// Every instruction the emitter can encode.
        #[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
        pub enum Op {
            $($op,)*
        }

        impl Op {
            pub const ALL: &'static [Op] = &[$(Op::$op,)*];

            #[inline]
            pub const fn layout(self) -> Layout {
                match self {
                    $(Op::$op => Layout {
                        format: Format::$format,
                        opcode: Opcode::$opcode,
                        funct3: $funct3,
                        funct7: $funct7,
                        aux: $aux,
                    },)*
                }
            }

            #[inline]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Op::$op => $mnemonic,)*
                }
            }
        }
    };
}

isa_table! {
    // ===== RV64I register-register =====
    Add      = "add"      : R,            Op,      0b000, 0b0000000, 0;
    Sub      = "sub"      : R,            Op,      0b000, 0b0100000, 0;
    Sll      = "sll"      : R,            Op,      0b001, 0b0000000, 0;
    Slt      = "slt"      : R,            Op,      0b010, 0b0000000, 0;
    Sltu     = "sltu"     : R,            Op,      0b011, 0b0000000, 0;
    Xor      = "xor"      : R,            Op,      0b100, 0b0000000, 0;
    Srl      = "srl"      : R,            Op,      0b101, 0b0000000, 0;
    Sra      = "sra"      : R,            Op,      0b101, 0b0100000, 0;
    Or       = "or"       : R,            Op,      0b110, 0b0000000, 0;
    And      = "and"      : R,            Op,      0b111, 0b0000000, 0;
    Addw     = "addw"     : R,            Op32,    0b000, 0b0000000, 0;
    Subw     = "subw"     : R,            Op32,    0b000, 0b0100000, 0;
    Sllw     = "sllw"     : R,            Op32,    0b001, 0b0000000, 0;
    Srlw     = "srlw"     : R,            Op32,    0b101, 0b0000000, 0;
    Sraw     = "sraw"     : R,            Op32,    0b101, 0b0100000, 0;

    // ===== M-extension =====
    Mul      = "mul"      : R,            Op,      0b000, 0b0000001, 0;
    Mulh     = "mulh"     : R,            Op,      0b001, 0b0000001, 0;
    Mulhsu   = "mulhsu"   : R,            Op,      0b010, 0b0000001, 0;
    Mulhu    = "mulhu"    : R,            Op,      0b011, 0b0000001, 0;
    Div      = "div"      : R,            Op,      0b100, 0b0000001, 0;
    Divu     = "divu"     : R,            Op,      0b101, 0b0000001, 0;
    Rem      = "rem"      : R,            Op,      0b110, 0b0000001, 0;
    Remu     = "remu"     : R,            Op,      0b111, 0b0000001, 0;
    Mulw     = "mulw"     : R,            Op32,    0b000, 0b0000001, 0;
    Divw     = "divw"     : R,            Op32,    0b100, 0b0000001, 0;
    Divuw    = "divuw"    : R,            Op32,    0b101, 0b0000001, 0;
    Remw     = "remw"     : R,            Op32,    0b110, 0b0000001, 0;
    Remuw    = "remuw"    : R,            Op32,    0b111, 0b0000001, 0;

    // ===== RV64I register-immediate =====
    Addi     = "addi"     : I,            OpImm,   0b000, 0, 0;
    Slti     = "slti"     : I,            OpImm,   0b010, 0, 0;
    Sltiu    = "sltiu"    : I,            OpImm,   0b011, 0, 0;
    Xori     = "xori"     : I,            OpImm,   0b100, 0, 0;
    Ori      = "ori"      : I,            OpImm,   0b110, 0, 0;
    Andi     = "andi"     : I,            OpImm,   0b111, 0, 0;
    Addiw    = "addiw"    : I,            OpImm32, 0b000, 0, 0;
    Slli     = "slli"     : Shift,        OpImm,   0b001, 0b000000, 0;
    Srli     = "srli"     : Shift,        OpImm,   0b101, 0b000000, 0;
    Srai     = "srai"     : Shift,        OpImm,   0b101, 0b010000, 0;
    Slliw    = "slliw"    : ShiftW,       OpImm32, 0b001, 0b0000000, 0;
    Srliw    = "srliw"    : ShiftW,       OpImm32, 0b101, 0b0000000, 0;
    Sraiw    = "sraiw"    : ShiftW,       OpImm32, 0b101, 0b0100000, 0;
    Lui      = "lui"      : U,            Lui,     0, 0, 0;
    Auipc    = "auipc"    : U,            Auipc,   0, 0, 0;

    // ===== loads/stores =====
    Lb       = "lb"       : I,            Load,    0b000, 0, 0;
    Lh       = "lh"       : I,            Load,    0b001, 0, 0;
    Lw       = "lw"       : I,            Load,    0b010, 0, 0;
    Ld       = "ld"       : I,            Load,    0b011, 0, 0;
    Lbu      = "lbu"      : I,            Load,    0b100, 0, 0;
    Lhu      = "lhu"      : I,            Load,    0b101, 0, 0;
    Lwu      = "lwu"      : I,            Load,    0b110, 0, 0;
    Flw      = "flw"      : I,            LoadFp,  0b010, 0, 0;
    Fld      = "fld"      : I,            LoadFp,  0b011, 0, 0;
    Sb       = "sb"       : S,            Store,   0b000, 0, 0;
    Sh       = "sh"       : S,            Store,   0b001, 0, 0;
    Sw       = "sw"       : S,            Store,   0b010, 0, 0;
    Sd       = "sd"       : S,            Store,   0b011, 0, 0;
    Fsw      = "fsw"      : S,            StoreFp, 0b010, 0, 0;
    Fsd      = "fsd"      : S,            StoreFp, 0b011, 0, 0;

    // ===== control transfer =====
    Beq      = "beq"      : B,            Branch,  0b000, 0, 0;
    Bne      = "bne"      : B,            Branch,  0b001, 0, 0;
    Blt      = "blt"      : B,            Branch,  0b100, 0, 0;
    Bge      = "bge"      : B,            Branch,  0b101, 0, 0;
    Bltu     = "bltu"     : B,            Branch,  0b110, 0, 0;
    Bgeu     = "bgeu"     : B,            Branch,  0b111, 0, 0;
    Jal      = "jal"      : J,            Jal,     0, 0, 0;
    Jalr     = "jalr"     : I,            Jalr,    0b000, 0, 0;

    // ===== system =====
    Fence    = "fence"    : Fence,        MiscMem, 0b000, 0, 0;
    FenceI   = "fence.i"  : Fixed,        MiscMem, 0b001, 0, 0;
    Ecall    = "ecall"    : Fixed,        System,  0b000, 0, 0;
    Ebreak   = "ebreak"   : Fixed,        System,  0b000, 0, 1;
    Csrrw    = "csrrw"    : Csr,          System,  0b001, 0, 0;
    Csrrs    = "csrrs"    : Csr,          System,  0b010, 0, 0;
    Csrrc    = "csrrc"    : Csr,          System,  0b011, 0, 0;
    Csrrwi   = "csrrwi"   : CsrImm,       System,  0b101, 0, 0;
    Csrrsi   = "csrrsi"   : CsrImm,       System,  0b110, 0, 0;
    Csrrci   = "csrrci"   : CsrImm,       System,  0b111, 0, 0;

    // ===== A-extension =====
    LrW      = "lr.w"     : LoadReserved, Amo,     0b010, 0b00010, 0;
    ScW      = "sc.w"     : Amo,          Amo,     0b010, 0b00011, 0;
    AmoswapW = "amoswap.w": Amo,          Amo,     0b010, 0b00001, 0;
    AmoaddW  = "amoadd.w" : Amo,          Amo,     0b010, 0b00000, 0;
    AmoxorW  = "amoxor.w" : Amo,          Amo,     0b010, 0b00100, 0;
    AmoandW  = "amoand.w" : Amo,          Amo,     0b010, 0b01100, 0;
    AmoorW   = "amoor.w"  : Amo,          Amo,     0b010, 0b01000, 0;
    AmominW  = "amomin.w" : Amo,          Amo,     0b010, 0b10000, 0;
    AmomaxW  = "amomax.w" : Amo,          Amo,     0b010, 0b10100, 0;
    AmominuW = "amominu.w": Amo,          Amo,     0b010, 0b11000, 0;
    AmomaxuW = "amomaxu.w": Amo,          Amo,     0b010, 0b11100, 0;
    LrD      = "lr.d"     : LoadReserved, Amo,     0b011, 0b00010, 0;
    ScD      = "sc.d"     : Amo,          Amo,     0b011, 0b00011, 0;
    AmoswapD = "amoswap.d": Amo,          Amo,     0b011, 0b00001, 0;
    AmoaddD  = "amoadd.d" : Amo,          Amo,     0b011, 0b00000, 0;
    AmoxorD  = "amoxor.d" : Amo,          Amo,     0b011, 0b00100, 0;
    AmoandD  = "amoand.d" : Amo,          Amo,     0b011, 0b01100, 0;
    AmoorD   = "amoor.d"  : Amo,          Amo,     0b011, 0b01000, 0;
    AmominD  = "amomin.d" : Amo,          Amo,     0b011, 0b10000, 0;
    AmomaxD  = "amomax.d" : Amo,          Amo,     0b011, 0b10100, 0;
    AmominuD = "amominu.d": Amo,          Amo,     0b011, 0b11000, 0;
    AmomaxuD = "amomaxu.d": Amo,          Amo,     0b011, 0b11100, 0;

    // ===== F/D-extension arithmetic =====
    FaddS    = "fadd.s"   : FpRm,         OpFp,    0, 0b0000000, 0;
    FsubS    = "fsub.s"   : FpRm,         OpFp,    0, 0b0000100, 0;
    FmulS    = "fmul.s"   : FpRm,         OpFp,    0, 0b0001000, 0;
    FdivS    = "fdiv.s"   : FpRm,         OpFp,    0, 0b0001100, 0;
    FaddD    = "fadd.d"   : FpRm,         OpFp,    0, 0b0000001, 0;
    FsubD    = "fsub.d"   : FpRm,         OpFp,    0, 0b0000101, 0;
    FmulD    = "fmul.d"   : FpRm,         OpFp,    0, 0b0001001, 0;
    FdivD    = "fdiv.d"   : FpRm,         OpFp,    0, 0b0001101, 0;
    FsqrtS   = "fsqrt.s"  : FpUnaryRm,    OpFp,    0, 0b0101100, 0;
    FsqrtD   = "fsqrt.d"  : FpUnaryRm,    OpFp,    0, 0b0101101, 0;
    FmaddS   = "fmadd.s"  : R4,           Madd,    0, 0, 0;
    FmsubS   = "fmsub.s"  : R4,           Msub,    0, 0, 0;
    FnmsubS  = "fnmsub.s" : R4,           Nmsub,   0, 0, 0;
    FnmaddS  = "fnmadd.s" : R4,           Nmadd,   0, 0, 0;
    FmaddD   = "fmadd.d"  : R4,           Madd,    0, 0, 1;
    FmsubD   = "fmsub.d"  : R4,           Msub,    0, 0, 1;
    FnmsubD  = "fnmsub.d" : R4,           Nmsub,   0, 0, 1;
    FnmaddD  = "fnmadd.d" : R4,           Nmadd,   0, 0, 1;

    // ===== F/D-extension sign injection, min/max, compare =====
    FsgnjS   = "fsgnj.s"  : R,            OpFp,    0b000, 0b0010000, 0;
    FsgnjnS  = "fsgnjn.s" : R,            OpFp,    0b001, 0b0010000, 0;
    FsgnjxS  = "fsgnjx.s" : R,            OpFp,    0b010, 0b0010000, 0;
    FsgnjD   = "fsgnj.d"  : R,            OpFp,    0b000, 0b0010001, 0;
    FsgnjnD  = "fsgnjn.d" : R,            OpFp,    0b001, 0b0010001, 0;
    FsgnjxD  = "fsgnjx.d" : R,            OpFp,    0b010, 0b0010001, 0;
    FminS    = "fmin.s"   : R,            OpFp,    0b000, 0b0010100, 0;
    FmaxS    = "fmax.s"   : R,            OpFp,    0b001, 0b0010100, 0;
    FminD    = "fmin.d"   : R,            OpFp,    0b000, 0b0010101, 0;
    FmaxD    = "fmax.d"   : R,            OpFp,    0b001, 0b0010101, 0;
    FeqS     = "feq.s"    : R,            OpFp,    0b010, 0b1010000, 0;
    FltS     = "flt.s"    : R,            OpFp,    0b001, 0b1010000, 0;
    FleS     = "fle.s"    : R,            OpFp,    0b000, 0b1010000, 0;
    FeqD     = "feq.d"    : R,            OpFp,    0b010, 0b1010001, 0;
    FltD     = "flt.d"    : R,            OpFp,    0b001, 0b1010001, 0;
    FleD     = "fle.d"    : R,            OpFp,    0b000, 0b1010001, 0;

    // ===== F/D-extension conversions and moves =====
    FcvtWS   = "fcvt.w.s" : FpUnaryRm,    OpFp,    0, 0b1100000, 0;
    FcvtWuS  = "fcvt.wu.s": FpUnaryRm,    OpFp,    0, 0b1100000, 1;
    FcvtLS   = "fcvt.l.s" : FpUnaryRm,    OpFp,    0, 0b1100000, 2;
    FcvtLuS  = "fcvt.lu.s": FpUnaryRm,    OpFp,    0, 0b1100000, 3;
    FcvtWD   = "fcvt.w.d" : FpUnaryRm,    OpFp,    0, 0b1100001, 0;
    FcvtWuD  = "fcvt.wu.d": FpUnaryRm,    OpFp,    0, 0b1100001, 1;
    FcvtLD   = "fcvt.l.d" : FpUnaryRm,    OpFp,    0, 0b1100001, 2;
    FcvtLuD  = "fcvt.lu.d": FpUnaryRm,    OpFp,    0, 0b1100001, 3;
    FcvtSW   = "fcvt.s.w" : FpUnaryRm,    OpFp,    0, 0b1101000, 0;
    FcvtSWu  = "fcvt.s.wu": FpUnaryRm,    OpFp,    0, 0b1101000, 1;
    FcvtSL   = "fcvt.s.l" : FpUnaryRm,    OpFp,    0, 0b1101000, 2;
    FcvtSLu  = "fcvt.s.lu": FpUnaryRm,    OpFp,    0, 0b1101000, 3;
    FcvtDW   = "fcvt.d.w" : FpUnaryRm,    OpFp,    0, 0b1101001, 0;
    FcvtDWu  = "fcvt.d.wu": FpUnaryRm,    OpFp,    0, 0b1101001, 1;
    FcvtDL   = "fcvt.d.l" : FpUnaryRm,    OpFp,    0, 0b1101001, 2;
    FcvtDLu  = "fcvt.d.lu": FpUnaryRm,    OpFp,    0, 0b1101001, 3;
    FcvtSD   = "fcvt.s.d" : FpUnaryRm,    OpFp,    0, 0b0100000, 1;
    FcvtDS   = "fcvt.d.s" : FpUnaryRm,    OpFp,    0, 0b0100001, 0;
    FmvXW    = "fmv.x.w"  : FpUnary,      OpFp,    0b000, 0b1110000, 0;
    FclassS  = "fclass.s" : FpUnary,      OpFp,    0b001, 0b1110000, 0;
    FmvWX    = "fmv.w.x"  : FpUnary,      OpFp,    0b000, 0b1111000, 0;
    FmvXD    = "fmv.x.d"  : FpUnary,      OpFp,    0b000, 0b1110001, 0;
    FclassD  = "fclass.d" : FpUnary,      OpFp,    0b001, 0b1110001, 0;
    FmvDX    = "fmv.d.x"  : FpUnary,      OpFp,    0b000, 0b1111001, 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashSet;

    // (opcode, funct3, funct7, aux) must tell every row apart, otherwise two mnemonics
    // would encode to the same word for the same operands
    #[test]
    fn signatures_are_unique() {
        let mut seen = FxHashSet::default();
        for &op in Op::ALL {
            let l = op.layout();
            let funct3 = match l.format {
                Format::U | Format::J | Format::FpRm | Format::FpUnaryRm | Format::R4 => 0,
                _ => l.funct3,
            };
            let key = (l.opcode, funct3, l.funct7, l.aux);
            assert!(seen.insert(key), "{} shares its signature", op.mnemonic());
        }
    }

    #[test]
    fn mnemonics_are_unique() {
        let mut seen = FxHashSet::default();
        for &op in Op::ALL {
            assert!(seen.insert(op.mnemonic()), "duplicate mnemonic {}", op.mnemonic());
        }
    }
}
