//! One emission routine per mnemonic
//!
//! Every routine comes as an `emit_<mnemonic>_at(section, ..)` / `emit_<mnemonic>(..)`
//! pair, encodes through [`encode`] (which checks every operand range) and appends
//! exactly one word.

use crate::asm::Assembler;
use crate::asm::buffer::SectionKind;
use crate::util::opcode::AqRl;
use crate::rv64::{encode, Op, Reg, FReg, RoundingMode};

macro_rules! r_type {
    ($rd:ty, $rs:ty; $($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: $rd, rs1: $rs, rs2: $rs) -> u64 {
                self.emit_inst_at(section, encode::r(Op::$op, rd, rs1, rs2))
            }
        }
    )* } };
}

macro_rules! i_type {
    ($rd:ty; $($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: $rd, rs1: Reg, imm: i32) -> u64 {
                self.emit_inst_at(section, encode::i(Op::$op, rd, rs1, imm))
            }
        }
    )* } };
}

macro_rules! shift_type {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: Reg, rs1: Reg, shamt: u32) -> u64 {
                self.emit_inst_at(section, encode::shift(Op::$op, rd, rs1, shamt))
            }
        }
    )* } };
}

macro_rules! s_type {
    ($src:ty; $($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, src: $src, base: Reg, offset: i32) -> u64 {
                self.emit_inst_at(section, encode::s(Op::$op, src, base, offset))
            }
        }
    )* } };
}

macro_rules! b_type {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rs1: Reg, rs2: Reg, offset: i64) -> u64 {
                self.emit_inst_at(section, encode::b(Op::$op, rs1, rs2, offset))
            }
        }
    )* } };
}

macro_rules! u_type {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: Reg, imm20: i32) -> u64 {
                self.emit_inst_at(section, encode::u(Op::$op, rd, imm20))
            }
        }
    )* } };
}

macro_rules! amo_type {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: Reg, src: Reg, addr: Reg, aqrl: AqRl) -> u64 {
                self.emit_inst_at(section, encode::amo(Op::$op, rd, src, addr, aqrl))
            }
        }
    )* } };
}

macro_rules! lr_type {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: Reg, addr: Reg, aqrl: AqRl) -> u64 {
                self.emit_inst_at(section, encode::lr(Op::$op, rd, addr, aqrl))
            }
        }
    )* } };
}

macro_rules! csr_type {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: Reg, csr: u16, rs1: Reg) -> u64 {
                self.emit_inst_at(section, encode::csr(Op::$op, rd, csr, rs1))
            }
        }
    )* } };
}

macro_rules! csri_type {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: Reg, csr: u16, uimm: u32) -> u64 {
                self.emit_inst_at(section, encode::csri(Op::$op, rd, csr, uimm))
            }
        }
    )* } };
}

macro_rules! fixed_type {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[inline(always)]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind) -> u64 {
                self.emit_inst_at(section, encode::fixed(Op::$op))
            }
        }
    )* } };
}

macro_rules! fp_rm_type {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: FReg, rs1: FReg, rs2: FReg, rm: RoundingMode) -> u64 {
                self.emit_inst_at(section, encode::fp(Op::$op, rd, rs1, rs2, rm))
            }
        }
    )* } };
}

macro_rules! fp_unary_type {
    ($rd:ty, $rs:ty; $($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: $rd, rs1: $rs, rm: RoundingMode) -> u64 {
                self.emit_inst_at(section, encode::fp_unary(Op::$op, rd, rs1, rm))
            }
        }
    )* } };
}

// moves and classification carry no rounding mode
macro_rules! fp_move_type {
    ($rd:ty, $rs:ty; $($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: $rd, rs1: $rs) -> u64 {
                self.emit_inst_at(section, encode::fp_unary(Op::$op, rd, rs1, RoundingMode::Rne))
            }
        }
    )* } };
}

macro_rules! r4_type {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](
                &mut self,
                section: SectionKind,
                rd: FReg,
                rs1: FReg,
                rs2: FReg,
                rs3: FReg,
                rm: RoundingMode
            ) -> u64 {
                self.emit_inst_at(section, encode::r4(Op::$op, rd, rs1, rs2, rs3, rm))
            }
        }
    )* } };
}

impl Assembler {
    // ----- RV64I -----

    r_type! {
        Reg, Reg;
        add  => Add,  sub  => Sub,  sll  => Sll,  slt  => Slt,  sltu => Sltu,
        xor  => Xor,  srl  => Srl,  sra  => Sra,  or   => Or,   and  => And,
        addw => Addw, subw => Subw, sllw => Sllw, srlw => Srlw, sraw => Sraw,
    }

    i_type! {
        Reg;
        addi => Addi, slti => Slti, sltiu => Sltiu, xori => Xori, ori => Ori, andi => Andi,
        addiw => Addiw,
        lb => Lb, lh => Lh, lw => Lw, ld => Ld, lbu => Lbu, lhu => Lhu, lwu => Lwu,
        jalr => Jalr,
    }

    shift_type! {
        slli => Slli, srli => Srli, srai => Srai,
        slliw => Slliw, srliw => Srliw, sraiw => Sraiw,
    }

    s_type! {
        Reg;
        sb => Sb, sh => Sh, sw => Sw, sd => Sd,
    }

    b_type! {
        beq => Beq, bne => Bne, blt => Blt, bge => Bge, bltu => Bltu, bgeu => Bgeu,
    }

    u_type! {
        lui => Lui, auipc => Auipc,
    }

    with_no_at! {
        emit_jal,
        #[track_caller]
        pub fn emit_jal_at(&mut self, section: SectionKind, rd: Reg, offset: i64) -> u64 {
            self.emit_inst_at(section, encode::j(Op::Jal, rd, offset))
        }
    }

    with_no_at! {
        emit_fence,
        /// `pred`/`succ` are `IORW` nibbles
        #[track_caller]
        pub fn emit_fence_at(&mut self, section: SectionKind, pred: u32, succ: u32) -> u64 {
            self.emit_inst_at(section, encode::fence(pred, succ))
        }
    }

    fixed_type! {
        fence_i => FenceI, ecall => Ecall, ebreak => Ebreak,
    }

    // ----- Zicsr -----

    csr_type! {
        csrrw => Csrrw, csrrs => Csrrs, csrrc => Csrrc,
    }

    csri_type! {
        csrrwi => Csrrwi, csrrsi => Csrrsi, csrrci => Csrrci,
    }

    // ----- M -----

    r_type! {
        Reg, Reg;
        mul  => Mul,  mulh  => Mulh,  mulhsu => Mulhsu, mulhu => Mulhu,
        div  => Div,  divu  => Divu,  rem    => Rem,    remu  => Remu,
        mulw => Mulw, divw  => Divw,  divuw  => Divuw,  remw  => Remw, remuw => Remuw,
    }

    // ----- A -----

    lr_type! {
        lr_w => LrW, lr_d => LrD,
    }

    amo_type! {
        sc_w       => ScW,       sc_d       => ScD,
        amoswap_w  => AmoswapW,  amoswap_d  => AmoswapD,
        amoadd_w   => AmoaddW,   amoadd_d   => AmoaddD,
        amoxor_w   => AmoxorW,   amoxor_d   => AmoxorD,
        amoand_w   => AmoandW,   amoand_d   => AmoandD,
        amoor_w    => AmoorW,    amoor_d    => AmoorD,
        amomin_w   => AmominW,   amomin_d   => AmominD,
        amomax_w   => AmomaxW,   amomax_d   => AmomaxD,
        amominu_w  => AmominuW,  amominu_d  => AmominuD,
        amomaxu_w  => AmomaxuW,  amomaxu_d  => AmomaxuD,
    }

    // ----- F/D -----

    i_type! {
        FReg;
        flw => Flw, fld => Fld,
    }

    s_type! {
        FReg;
        fsw => Fsw, fsd => Fsd,
    }

    fp_rm_type! {
        fadd_s => FaddS, fsub_s => FsubS, fmul_s => FmulS, fdiv_s => FdivS,
        fadd_d => FaddD, fsub_d => FsubD, fmul_d => FmulD, fdiv_d => FdivD,
    }

    fp_unary_type! {
        FReg, FReg;
        fsqrt_s => FsqrtS, fsqrt_d => FsqrtD,
        fcvt_s_d => FcvtSD, fcvt_d_s => FcvtDS,
    }

    fp_unary_type! {
        Reg, FReg;
        fcvt_w_s => FcvtWS, fcvt_wu_s => FcvtWuS, fcvt_l_s => FcvtLS, fcvt_lu_s => FcvtLuS,
        fcvt_w_d => FcvtWD, fcvt_wu_d => FcvtWuD, fcvt_l_d => FcvtLD, fcvt_lu_d => FcvtLuD,
    }

    fp_unary_type! {
        FReg, Reg;
        fcvt_s_w => FcvtSW, fcvt_s_wu => FcvtSWu, fcvt_s_l => FcvtSL, fcvt_s_lu => FcvtSLu,
        fcvt_d_w => FcvtDW, fcvt_d_wu => FcvtDWu, fcvt_d_l => FcvtDL, fcvt_d_lu => FcvtDLu,
    }

    r4_type! {
        fmadd_s => FmaddS, fmsub_s => FmsubS, fnmsub_s => FnmsubS, fnmadd_s => FnmaddS,
        fmadd_d => FmaddD, fmsub_d => FmsubD, fnmsub_d => FnmsubD, fnmadd_d => FnmaddD,
    }

    r_type! {
        FReg, FReg;
        fsgnj_s => FsgnjS, fsgnjn_s => FsgnjnS, fsgnjx_s => FsgnjxS,
        fsgnj_d => FsgnjD, fsgnjn_d => FsgnjnD, fsgnjx_d => FsgnjxD,
        fmin_s  => FminS,  fmax_s   => FmaxS,
        fmin_d  => FminD,  fmax_d   => FmaxD,
    }

    r_type! {
        Reg, FReg;
        feq_s => FeqS, flt_s => FltS, fle_s => FleS,
        feq_d => FeqD, flt_d => FltD, fle_d => FleD,
    }

    fp_move_type! {
        Reg, FReg;
        fmv_x_w => FmvXW, fmv_x_d => FmvXD, fclass_s => FclassS, fclass_d => FclassD,
    }

    fp_move_type! {
        FReg, Reg;
        fmv_w_x => FmvWX, fmv_d_x => FmvDX,
    }
}
