//! Pseudo-instructions: moves, extensions, immediate loads, compare-and-branch, CSR access

use crate::bits;
use crate::util::misc;
use crate::asm::Assembler;
use crate::asm::label::Label;
use crate::asm::buffer::SectionKind;
use crate::materialize;
use crate::rv64::{csr, encode, Op, Reg, FReg};

/// Integer branch conditions.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    Ltu,
    Geu,
    Gtu,
    Leu,
}

impl Cond {
    #[inline]
    pub const fn negate(self) -> Cond {
        match self {
            Self::Eq  => Self::Ne,
            Self::Ne  => Self::Eq,
            Self::Lt  => Self::Ge,
            Self::Ge  => Self::Lt,
            Self::Gt  => Self::Le,
            Self::Le  => Self::Gt,
            Self::Ltu => Self::Geu,
            Self::Geu => Self::Ltu,
            Self::Gtu => Self::Leu,
            Self::Leu => Self::Gtu,
        }
    }

    /// Native branch for `a <cond> b`; `gt`/`le` forms swap their operands.
    #[inline]
    pub const fn lower(self, a: Reg, b: Reg) -> (Op, Reg, Reg) {
        match self {
            Self::Eq  => (Op::Beq,  a, b),
            Self::Ne  => (Op::Bne,  a, b),
            Self::Lt  => (Op::Blt,  a, b),
            Self::Ge  => (Op::Bge,  a, b),
            Self::Gt  => (Op::Blt,  b, a),
            Self::Le  => (Op::Bge,  b, a),
            Self::Ltu => (Op::Bltu, a, b),
            Self::Geu => (Op::Bgeu, a, b),
            Self::Gtu => (Op::Bltu, b, a),
            Self::Leu => (Op::Bgeu, b, a),
        }
    }
}

/// Floating-point branch conditions.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum FCond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum FloatKind {
    Single,
    Double,
}

impl FloatKind {
    #[inline(always)]
    const fn feq(self) -> Op {
        match self { Self::Single => Op::FeqS, Self::Double => Op::FeqD }
    }

    #[inline(always)]
    const fn flt(self) -> Op {
        match self { Self::Single => Op::FltS, Self::Double => Op::FltD }
    }

    #[inline(always)]
    const fn fle(self) -> Op {
        match self { Self::Single => Op::FleS, Self::Double => Op::FleD }
    }
}

macro_rules! zero_branches {
    ($($name:ident => $cond:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rs: Reg, label: Label, is_far: bool) -> u64 {
                self.emit_branch_label_at(section, Cond::$cond, rs, Reg::ZERO, label, is_far)
            }
        }
    )* } };
}

macro_rules! csr_reads {
    ($($name:ident => $csr:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[inline(always)]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: Reg) -> u64 {
                self.emit_csrr_at(section, rd, csr::$csr)
            }
        }
    )* } };
}

macro_rules! csr_writes {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[inline(always)]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, csr: u16, rs: Reg) -> u64 {
                self.emit_inst_at(section, encode::csr(Op::$op, Reg::ZERO, csr, rs))
            }
        }
    )* } };
}

macro_rules! csr_write_imms {
    ($($name:ident => $op:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            #[track_caller]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, csr: u16, uimm: u32) -> u64 {
                self.emit_inst_at(section, encode::csri(Op::$op, Reg::ZERO, csr, uimm))
            }
        }
    )* } };
}

macro_rules! csr_swaps {
    ($($name:ident => $csr:ident),* $(,)?) => { paste::paste! { $(
        with_no_at! {
            [<emit_ $name>],
            /// Old value into `rd` (pass `ZERO` to drop it), `rs` into the CSR
            #[inline(always)]
            pub fn [<emit_ $name _at>](&mut self, section: SectionKind, rd: Reg, rs: Reg) -> u64 {
                self.emit_inst_at(section, encode::csr(Op::Csrrw, rd, csr::$csr, rs))
            }
        }
    )* } };
}

impl Assembler {
    // ----- MOVES AND ARITHMETIC -----

    with_no_at! {
        emit_nop,
        #[inline(always)]
        pub fn emit_nop_at(&mut self, section: SectionKind) -> u64 {
            self.emit_inst_at(section, encode::i(Op::Addi, Reg::ZERO, Reg::ZERO, 0))
        }
    }

    with_no_at! {
        emit_mv,
        /// Emits nothing when `rd == rs`
        #[inline]
        pub fn emit_mv_at(&mut self, section: SectionKind, rd: Reg, rs: Reg) -> u64 {
            if rd == rs {
                return self.offset_at(section)
            }

            self.emit_inst_at(section, encode::i(Op::Addi, rd, rs, 0))
        }
    }

    with_no_at! {
        emit_not,
        #[inline]
        pub fn emit_not_at(&mut self, section: SectionKind, rd: Reg, rs: Reg) -> u64 {
            self.emit_inst_at(section, encode::i(Op::Xori, rd, rs, -1))
        }
    }

    with_no_at! {
        emit_neg,
        #[inline]
        pub fn emit_neg_at(&mut self, section: SectionKind, rd: Reg, rs: Reg) -> u64 {
            self.emit_inst_at(section, encode::r(Op::Sub, rd, Reg::ZERO, rs))
        }
    }

    with_no_at! {
        emit_negw,
        #[inline]
        pub fn emit_negw_at(&mut self, section: SectionKind, rd: Reg, rs: Reg) -> u64 {
            self.emit_inst_at(section, encode::r(Op::Subw, rd, Reg::ZERO, rs))
        }
    }

    with_no_at! {
        emit_sext_w,
        #[inline]
        pub fn emit_sext_w_at(&mut self, section: SectionKind, rd: Reg, rs: Reg) -> u64 {
            self.emit_inst_at(section, encode::i(Op::Addiw, rd, rs, 0))
        }
    }

    with_no_at! {
        emit_seqz,
        #[inline]
        pub fn emit_seqz_at(&mut self, section: SectionKind, rd: Reg, rs: Reg) -> u64 {
            self.emit_inst_at(section, encode::i(Op::Sltiu, rd, rs, 1))
        }
    }

    with_no_at! {
        emit_snez,
        #[inline]
        pub fn emit_snez_at(&mut self, section: SectionKind, rd: Reg, rs: Reg) -> u64 {
            self.emit_inst_at(section, encode::r(Op::Sltu, rd, Reg::ZERO, rs))
        }
    }

    with_no_at! {
        emit_sltz,
        #[inline]
        pub fn emit_sltz_at(&mut self, section: SectionKind, rd: Reg, rs: Reg) -> u64 {
            self.emit_inst_at(section, encode::r(Op::Slt, rd, rs, Reg::ZERO))
        }
    }

    with_no_at! {
        emit_sgtz,
        #[inline]
        pub fn emit_sgtz_at(&mut self, section: SectionKind, rd: Reg, rs: Reg) -> u64 {
            self.emit_inst_at(section, encode::r(Op::Slt, rd, Reg::ZERO, rs))
        }
    }

    with_no_at! {
        emit_zero_extend,
        /// Keep the low `bits` bits of `rs`, clear the rest
        #[track_caller]
        pub fn emit_zero_extend_at(&mut self, section: SectionKind, rd: Reg, rs: Reg, bits: u32) -> u64 {
            assert!(bits > 0 && bits < 64, "cannot zero-extend from {bits} bits");
            let start = self.emit_inst_at(section, encode::shift(Op::Slli, rd, rs, 64 - bits));
            self.emit_inst_at(section, encode::shift(Op::Srli, rd, rd, 64 - bits));
            start
        }
    }

    with_no_at! {
        emit_sign_extend,
        /// Sign-extend the low `bits` bits of `rs`
        #[track_caller]
        pub fn emit_sign_extend_at(&mut self, section: SectionKind, rd: Reg, rs: Reg, bits: u32) -> u64 {
            assert!(bits > 0 && bits < 64, "cannot sign-extend from {bits} bits");
            let start = self.emit_inst_at(section, encode::shift(Op::Slli, rd, rs, 64 - bits));
            self.emit_inst_at(section, encode::shift(Op::Srai, rd, rd, 64 - bits));
            start
        }
    }

    with_no_at! {
        emit_abs,
        /// `rd = |rs|`, wrapping for `i64::MIN`; clobbers `tmp`
        #[track_caller]
        pub fn emit_abs_at(&mut self, section: SectionKind, rd: Reg, rs: Reg, tmp: Reg) -> u64 {
            assert!(tmp != rd && tmp != rs, "abs: temp register {tmp:?} overlaps an operand");
            let start = self.emit_inst_at(section, encode::shift(Op::Srai, tmp, rs, 63));
            self.emit_inst_at(section, encode::r(Op::Xor, rd, rs, tmp));
            self.emit_inst_at(section, encode::r(Op::Sub, rd, rd, tmp));
            start
        }
    }

    /// Three-way compare of two longs: `rd` = -1, 0 or 1; clobbers `tmp` if `rd` aliases a source.
    #[track_caller]
    pub fn emit_cmp_l2i_at(&mut self, section: SectionKind, rd: Reg, src1: Reg, src2: Reg, tmp: Reg) -> u64 {
        if src1 == src2 {
            return self.emit_mv_at(section, rd, Reg::ZERO)
        }

        let start = self.offset_at(section);

        let (mut left, mut right) = (src1, src2);
        if rd == src1 {
            assert!(tmp != rd && tmp != src2, "cmp_l2i: temp register {tmp:?} overlaps an operand");
            self.emit_mv_at(section, tmp, src1);
            left = tmp;
        } else if rd == src2 {
            assert!(tmp != rd && tmp != src1, "cmp_l2i: temp register {tmp:?} overlaps an operand");
            self.emit_mv_at(section, tmp, src2);
            right = tmp;
        }

        let done = self.new_label();
        self.emit_inst_at(section, encode::r(Op::Slt, rd, right, left));
        self.emit_bnez_at(section, rd, done, false);
        self.emit_inst_at(section, encode::r(Op::Slt, rd, left, right));
        self.emit_neg_at(section, rd, rd);
        self.bind_at(section, done);
        start
    }

    #[inline(always)]
    #[track_caller]
    pub fn emit_cmp_l2i(&mut self, rd: Reg, src1: Reg, src2: Reg, tmp: Reg) -> u64 {
        self.emit_cmp_l2i_at(self.curr_section(), rd, src1, src2, tmp)
    }

    with_no_at! {
        emit_fmv_s,
        #[inline]
        pub fn emit_fmv_s_at(&mut self, section: SectionKind, rd: FReg, rs: FReg) -> u64 {
            if rd == rs {
                return self.offset_at(section)
            }

            self.emit_inst_at(section, encode::r(Op::FsgnjS, rd, rs, rs))
        }
    }

    with_no_at! {
        emit_fmv_d,
        #[inline]
        pub fn emit_fmv_d_at(&mut self, section: SectionKind, rd: FReg, rs: FReg) -> u64 {
            if rd == rs {
                return self.offset_at(section)
            }

            self.emit_inst_at(section, encode::r(Op::FsgnjD, rd, rs, rs))
        }
    }

    with_no_at! {
        emit_fabs_s,
        #[inline]
        pub fn emit_fabs_s_at(&mut self, section: SectionKind, rd: FReg, rs: FReg) -> u64 {
            self.emit_inst_at(section, encode::r(Op::FsgnjxS, rd, rs, rs))
        }
    }

    with_no_at! {
        emit_fabs_d,
        #[inline]
        pub fn emit_fabs_d_at(&mut self, section: SectionKind, rd: FReg, rs: FReg) -> u64 {
            self.emit_inst_at(section, encode::r(Op::FsgnjxD, rd, rs, rs))
        }
    }

    with_no_at! {
        emit_fneg_s,
        #[inline]
        pub fn emit_fneg_s_at(&mut self, section: SectionKind, rd: FReg, rs: FReg) -> u64 {
            self.emit_inst_at(section, encode::r(Op::FsgnjnS, rd, rs, rs))
        }
    }

    with_no_at! {
        emit_fneg_d,
        #[inline]
        pub fn emit_fneg_d_at(&mut self, section: SectionKind, rd: FReg, rs: FReg) -> u64 {
            self.emit_inst_at(section, encode::r(Op::FsgnjnD, rd, rs, rs))
        }
    }

    // ----- IMMEDIATES -----

    with_no_at! {
        emit_li,
        /// Load any 64-bit constant with the shortest sequence for its magnitude:
        /// `addiw`, `lui` + `addiw`, or a recursive `li` + `slli` + `addi` chain.
        pub fn emit_li_at(&mut self, section: SectionKind, rd: Reg, imm: i64) -> u64 {
            let start = self.offset_at(section);
            self.li_into(section, rd, imm);
            start
        }
    }

    fn li_into(&mut self, section: SectionKind, rd: Reg, imm: i64) {
        let lower = bits::sext(imm, 12);
        let upper = imm.wrapping_sub(lower);

        if !misc::fits_into_32_bits(imm) {
            let mut shift = 12;
            while (upper >> shift) & 1 == 0 {
                shift += 1
            }

            self.li_into(section, rd, upper >> shift);
            self.emit_inst_at(section, encode::shift(Op::Slli, rd, rd, shift));
            if lower != 0 {
                self.emit_inst_at(section, encode::i(Op::Addi, rd, rd, lower as _));
            }

            return
        }

        let mut hi = Reg::ZERO;
        if upper != 0 {
            self.emit_inst_at(section, encode::u(Op::Lui, rd, (upper as i32) >> 12));
            hi = rd;
        }

        if lower != 0 || hi == Reg::ZERO {
            self.emit_inst_at(section, encode::i(Op::Addiw, rd, hi, lower as _));
        }
    }

    with_no_at! {
        emit_li32,
        /// Patchable `lui` + `addiw`, always two words
        pub fn emit_li32_at(&mut self, section: SectionKind, rd: Reg, imm: i32) -> u64 {
            let p = materialize::li32_split(imm);
            let start = self.emit_inst_at(section, encode::u(Op::Lui, rd, p.lui));
            self.emit_inst_at(section, encode::i(Op::Addiw, rd, rd, p.lo12));
            start
        }
    }

    with_no_at! {
        emit_li64,
        /// Patchable 8-word load of any 64-bit constant
        pub fn emit_li64_at(&mut self, section: SectionKind, rd: Reg, imm: i64) -> u64 {
            let p = materialize::li64_split(imm);
            let start = self.emit_inst_at(section, encode::u(Op::Lui, rd, p.lui));
            self.emit_inst_at(section, encode::i(Op::Addi, rd, rd, p.a1));
            self.emit_inst_at(section, encode::shift(Op::Slli, rd, rd, 12));
            self.emit_inst_at(section, encode::i(Op::Addi, rd, rd, p.a2));
            self.emit_inst_at(section, encode::shift(Op::Slli, rd, rd, 12));
            self.emit_inst_at(section, encode::i(Op::Addi, rd, rd, p.a3));
            self.emit_inst_at(section, encode::shift(Op::Slli, rd, rd, 8));
            self.emit_inst_at(section, encode::i(Op::Addi, rd, rd, p.a4));
            start
        }
    }

    with_no_at! {
        emit_movptr,
        /// Patchable 6-word load of an address below [`materialize::MOVPTR_LIMIT`]
        #[track_caller]
        pub fn emit_movptr_at(&mut self, section: SectionKind, rd: Reg, target: u64) -> u64 {
            let (start, lo5) = self.movptr_prefix_at(section, rd, target);
            self.emit_inst_at(section, encode::i(Op::Addi, rd, rd, lo5));
            start
        }
    }

    /// First five words of a `movptr`; the consumer adds the returned low bits.
    #[track_caller]
    pub(crate) fn movptr_prefix_at(&mut self, section: SectionKind, rd: Reg, target: u64) -> (u64, i32) {
        let m = materialize::movptr_split(target);
        let start = self.emit_inst_at(section, encode::u(Op::Lui, rd, m.lui));
        self.emit_inst_at(section, encode::i(Op::Addi, rd, rd, m.hi12));
        self.emit_inst_at(section, encode::shift(Op::Slli, rd, rd, 11));
        self.emit_inst_at(section, encode::i(Op::Addi, rd, rd, m.mid11));
        self.emit_inst_at(section, encode::shift(Op::Slli, rd, rd, 5));
        (start, m.lo5)
    }

    /// Patchable absolute prefix for `target`: a `movptr` prefix, or a whole `li64` with
    /// nothing left for the consumer when the address is out of `movptr` reach.
    #[track_caller]
    pub(crate) fn absolute_prefix_at(&mut self, section: SectionKind, rd: Reg, target: u64) -> (u64, i32) {
        if materialize::movptr_reaches(target) {
            self.movptr_prefix_at(section, rd, target)
        } else {
            (self.emit_li64_at(section, rd, target as i64), 0)
        }
    }

    /// `auipc rd` towards `target`; the consumer adds the returned low 12 bits.
    #[track_caller]
    pub(crate) fn pcrel_prefix_at(&mut self, section: SectionKind, rd: Reg, target: u64) -> (u64, i32) {
        let parts = materialize::pcrel_split(self.distance_at(section, target));
        let start = self.emit_inst_at(section, encode::u(Op::Auipc, rd, parts.hi20));
        (start, parts.lo12)
    }

    with_no_at! {
        emit_la_label,
        /// `auipc` + `addi` to the address of `label`
        #[track_caller]
        pub fn emit_la_label_at(&mut self, section: SectionKind, rd: Reg, label: Label) -> u64 {
            let target = self.label_target_at(section, label);
            let (start, lo12) = self.pcrel_prefix_at(section, rd, target);
            self.emit_inst_at(section, encode::i(Op::Addi, rd, rd, lo12));
            start
        }
    }

    // ----- BRANCHES -----

    with_no_at! {
        emit_branch_label,
        /// Branch to `label` if `rs1 <cond> rs2`.
        ///
        /// A far branch is the inverted condition jumping over a `jal` to `label`.
        #[track_caller]
        pub fn emit_branch_label_at(
            &mut self,
            section: SectionKind,
            cond: Cond,
            rs1: Reg,
            rs2: Reg,
            label: Label,
            is_far: bool
        ) -> u64 {
            if is_far {
                let (op, a, b) = cond.negate().lower(rs1, rs2);
                let start = self.emit_inst_at(section, encode::b(op, a, b, 8));
                self.emit_j_label_at(section, label);
                return start
            }

            let (op, a, b) = cond.lower(rs1, rs2);
            let target = self.label_target_at(section, label);
            let offset = self.distance_at(section, target);
            self.emit_inst_at(section, encode::b(op, a, b, offset))
        }
    }

    zero_branches! {
        beqz => Eq, bnez => Ne, bltz => Lt, bgez => Ge, bgtz => Gt, blez => Le,
    }

    with_no_at! {
        emit_j_label,
        #[track_caller]
        pub fn emit_j_label_at(&mut self, section: SectionKind, label: Label) -> u64 {
            self.jal_label_at(section, Reg::ZERO, label)
        }
    }

    with_no_at! {
        emit_jal_label,
        /// Call `label`, return address in `ra`
        #[track_caller]
        pub fn emit_jal_label_at(&mut self, section: SectionKind, label: Label) -> u64 {
            self.jal_label_at(section, Reg::RA, label)
        }
    }

    #[track_caller]
    fn jal_label_at(&mut self, section: SectionKind, rd: Reg, label: Label) -> u64 {
        let target = self.label_target_at(section, label);
        let offset = self.distance_at(section, target);
        self.emit_inst_at(section, encode::j(Op::Jal, rd, offset))
    }

    with_no_at! {
        emit_cmp_branch,
        #[track_caller]
        pub fn emit_cmp_branch_at(
            &mut self,
            section: SectionKind,
            cond: Cond,
            op1: Reg,
            op2: Reg,
            label: Label,
            is_far: bool
        ) -> u64 {
            self.emit_branch_label_at(section, cond, op1, op2, label, is_far)
        }
    }

    with_no_at! {
        emit_float_branch,
        /// Branch to `label` on a float comparison; clobbers `t0`.
        ///
        /// With `is_unordered`, a NaN operand makes `lt`/`le`/`gt`/`ge` take the branch.
        #[track_caller]
        pub fn emit_float_branch_at(
            &mut self,
            section: SectionKind,
            cond: FCond,
            kind: FloatKind,
            rs1: FReg,
            rs2: FReg,
            label: Label,
            is_far: bool,
            is_unordered: bool
        ) -> u64 {
            let start = self.offset_at(section);
            let t0 = Reg::T0;

            let (op, a, b, on_true) = match cond {
                FCond::Eq => (kind.feq(), rs1, rs2, true),
                FCond::Ne => (kind.feq(), rs1, rs2, false),
                FCond::Lt => (kind.flt(), rs1, rs2, true),
                FCond::Le => (kind.fle(), rs1, rs2, true),
                FCond::Gt => (kind.flt(), rs2, rs1, true),
                FCond::Ge => (kind.fle(), rs2, rs1, true),
            };

            if is_unordered && !matches!(cond, FCond::Eq | FCond::Ne) {
                self.float_cmp_unordered_at(section, op, kind, t0, a, b);
            } else {
                self.emit_inst_at(section, encode::r(op, t0, a, b));
            }

            if on_true {
                self.emit_bnez_at(section, t0, label, is_far);
            } else {
                self.emit_beqz_at(section, t0, label, is_far);
            }

            start
        }
    }

    with_no_at! {
        emit_float_cmp_branch,
        /// Unordered operands take `lt`/`le`/`ne` branches and skip `eq`/`gt`/`ge`
        #[track_caller]
        pub fn emit_float_cmp_branch_at(
            &mut self,
            section: SectionKind,
            cond: FCond,
            kind: FloatKind,
            op1: FReg,
            op2: FReg,
            label: Label,
            is_far: bool
        ) -> u64 {
            let is_unordered = !matches!(cond, FCond::Ge | FCond::Gt);
            self.emit_float_branch_at(section, cond, kind, op1, op2, label, is_far, is_unordered)
        }
    }

    // ----- FLOAT COMPARES -----

    /// `rd = cmp(rs1, rs2)`, or 1 if either operand is NaN.
    fn float_cmp_unordered_at(
        &mut self,
        section: SectionKind,
        cmp: Op,
        kind: FloatKind,
        rd: Reg,
        rs1: FReg,
        rs2: FReg
    ) -> u64 {
        let is_nan = self.new_label();
        let compare = self.new_label();
        let done = self.new_label();

        let start = self.emit_inst_at(section, encode::r(kind.feq(), rd, rs1, rs1));
        self.emit_beqz_at(section, rd, is_nan, false);
        self.emit_inst_at(section, encode::r(kind.feq(), rd, rs2, rs2));
        self.emit_bnez_at(section, rd, compare, false);
        self.bind_at(section, is_nan);
        self.emit_inst_at(section, encode::i(Op::Addiw, rd, Reg::ZERO, 1));
        self.emit_j_label_at(section, done);
        self.bind_at(section, compare);
        self.emit_inst_at(section, encode::r(cmp, rd, rs1, rs2));
        self.bind_at(section, done);
        start
    }

    with_no_at! {
        emit_flt_u,
        /// `rd = rs1 < rs2 || unordered`
        pub fn emit_flt_u_at(&mut self, section: SectionKind, kind: FloatKind, rd: Reg, rs1: FReg, rs2: FReg) -> u64 {
            self.float_cmp_unordered_at(section, kind.flt(), kind, rd, rs1, rs2)
        }
    }

    with_no_at! {
        emit_fle_u,
        /// `rd = rs1 <= rs2 || unordered`
        pub fn emit_fle_u_at(&mut self, section: SectionKind, kind: FloatKind, rd: Reg, rs1: FReg, rs2: FReg) -> u64 {
            self.float_cmp_unordered_at(section, kind.fle(), kind, rd, rs1, rs2)
        }
    }

    with_no_at! {
        emit_float_compare,
        /// `rd` = -1 (less), 0 (equal) or 1 (greater); unordered operands give
        /// `unordered_result`'s sign (-1 when negative, 1 otherwise)
        pub fn emit_float_compare_at(
            &mut self,
            section: SectionKind,
            kind: FloatKind,
            rd: Reg,
            rs1: FReg,
            rs2: FReg,
            unordered_result: i32
        ) -> u64 {
            let done = self.new_label();
            let flt = kind.flt();

            let start = if unordered_result < 0 {
                let start = self.emit_inst_at(section, encode::r(flt, rd, rs2, rs1));
                self.emit_bnez_at(section, rd, done, false);
                self.float_cmp_unordered_at(section, flt, kind, rd, rs1, rs2);
                start
            } else {
                let start = self.float_cmp_unordered_at(section, flt, kind, rd, rs2, rs1);
                self.emit_bnez_at(section, rd, done, false);
                self.emit_inst_at(section, encode::r(flt, rd, rs1, rs2));
                start
            };

            self.emit_neg_at(section, rd, rd);
            self.bind_at(section, done);
            start
        }
    }

    // ----- CSR -----

    with_no_at! {
        emit_csrr,
        #[inline(always)]
        pub fn emit_csrr_at(&mut self, section: SectionKind, rd: Reg, csr: u16) -> u64 {
            self.emit_inst_at(section, encode::csr(Op::Csrrs, rd, csr, Reg::ZERO))
        }
    }

    csr_reads! {
        rdinstret => INSTRET, rdcycle => CYCLE, rdtime => TIME,
        frcsr => FCSR, frrm => FRM, frflags => FFLAGS,
    }

    csr_writes! {
        csrw => Csrrw, csrs => Csrrs, csrc => Csrrc,
    }

    csr_write_imms! {
        csrwi => Csrrwi, csrsi => Csrrsi, csrci => Csrrci,
    }

    csr_swaps! {
        fscsr => FCSR, fsrm => FRM, fsflags => FFLAGS,
    }

    with_no_at! {
        emit_fsrmi,
        /// Swap in the static rounding mode `imm` (0..=4)
        #[track_caller]
        pub fn emit_fsrmi_at(&mut self, section: SectionKind, rd: Reg, imm: u32) -> u64 {
            assert!(imm < 5, "rounding mode {imm} is invalid");
            self.emit_inst_at(section, encode::csri(Op::Csrrwi, rd, csr::FRM, imm))
        }
    }

    with_no_at! {
        emit_fsflagsi,
        #[track_caller]
        pub fn emit_fsflagsi_at(&mut self, section: SectionKind, rd: Reg, imm: u32) -> u64 {
            self.emit_inst_at(section, encode::csri(Op::Csrrwi, rd, csr::FFLAGS, imm))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rv64::Reg::*;
    use crate::asm::config::Config;

    fn words(asm: &Assembler) -> Vec<u32> {
        asm.insts().data()
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn mv_to_itself_is_elided() {
        let mut asm = Assembler::default();
        assert_eq!(asm.emit_mv(A0, A0), 0);
        assert!(asm.insts().is_empty());
        asm.emit_mv(A0, A1);
        assert_eq!(words(&asm), [0x00058513]); // mv a0, a1
    }

    #[test]
    fn li_picks_shortest_form() {
        let mut asm = Assembler::default();
        asm.emit_li(A0, 0);
        assert_eq!(asm.offset(), 4);
        asm.emit_li(A0, 0x12345);
        assert_eq!(asm.offset(), 12);
        asm.emit_li(A0, 0x1000);
        assert_eq!(asm.offset(), 16);
        assert_eq!(words(&asm)[0], 0x0000051b); // addiw a0, zero, 0
    }

    #[test]
    fn forward_branch_is_fixed_up_at_bind() {
        let mut asm = Assembler::new(Config::new().insts_base(0x1000));
        let exit = asm.new_label();
        asm.emit_beqz(A0, exit, false);
        asm.emit_nop();
        asm.emit_nop();
        asm.emit_nop();
        asm.bind(exit);

        assert_eq!(asm.recover_at(SectionKind::Insts, 0), 0x1010);
        assert_eq!(words(&asm)[0], 0x00050863); // beqz a0, .+16
    }

    #[test]
    fn far_branch_inverts_over_jal() {
        let mut asm = Assembler::default();
        let target = asm.new_label();
        asm.bind(target);
        asm.emit_cmp_branch(Cond::Gt, A0, A1, target, true);

        let ws = words(&asm);
        assert_eq!(ws.len(), 2);
        assert_eq!(ws[0], encode::b(Op::Bge, A1, A0, 8));   // ble a0, a1, .+8
        assert_eq!(ws[1], encode::j(Op::Jal, ZERO, -4));   // j target
    }

    #[test]
    fn csr_pseudos() {
        let mut asm = Assembler::default();
        asm.emit_rdcycle(A0);
        asm.emit_csrw(csr::FCSR, A1);
        asm.emit_fsrmi(ZERO, 1);
        assert_eq!(words(&asm), [
            0xc0002573, // rdcycle a0
            0x00359073, // fscsr a1
            0x0020d073, // fsrmi 1
        ]);
    }

    #[test]
    #[should_panic(expected = "rounding mode 7 is invalid")]
    fn fsrmi_rejects_dynamic_mode() {
        let mut asm = Assembler::default();
        asm.emit_fsrmi(ZERO, 7);
    }
}
