//! Memory barriers, AMOs and LR/SC compare-and-swap loops

use crate::bits;
use crate::asm::{Assembler, Cond};
use crate::asm::label::Position;
use crate::asm::buffer::SectionKind;
use crate::patch::native;
use crate::rv64::{encode, Op, Reg};
use crate::util::opcode::AqRl;

use core::ops::BitOr;

use log::trace;

/// Ordering constraint of a memory barrier, as a 4-bit `pred:succ` mask.
///
/// The high two bits are the predecessor set and the low two the successor set,
/// each as `r:w`, so merging two barriers is a plain bitwise or.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub struct MemBarrier(u32);

impl MemBarrier {
    pub const STORE_STORE : Self = Self(0b0101);
    pub const LOAD_STORE  : Self = Self(0b1001);
    pub const STORE_LOAD  : Self = Self(0b0110);
    pub const LOAD_LOAD   : Self = Self(0b1010);
    pub const ANY_ANY     : Self = Self(0b1111);

    #[inline(always)]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub const fn predecessor(self) -> u32 {
        (self.0 >> 2) & 0b11
    }

    #[inline(always)]
    pub const fn successor(self) -> u32 {
        self.0 & 0b11
    }
}

impl BitOr for MemBarrier {
    type Output = Self;

    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Width of the memory operand of an atomic sequence.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum OperandSize {
    Int8,
    Int16,
    Int32,
    /// 32-bit, with results zero-extended
    Uint32,
    Int64,
}

impl OperandSize {
    #[inline(always)]
    const fn is_narrow(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16)
    }

    #[track_caller]
    #[inline]
    const fn amo(self, word: Op, double: Op) -> Op {
        match self {
            Self::Int32 | Self::Uint32 => word,
            Self::Int64 => double,
            Self::Int8 | Self::Int16 => panic!("no native atomic for sub-word operands"),
        }
    }
}

#[track_caller]
fn assert_different_registers(regs: &[Reg]) {
    for (i, a) in regs.iter().enumerate() {
        for b in &regs[i + 1..] {
            assert!(a != b, "register {a:?} is used for two operands of an atomic sequence");
        }
    }
}

impl Assembler {
    with_no_at! {
        emit_membar,
        /// Emit a `fence` for `order`, or fold `order` into the fence right before the
        /// write cursor if there is one.
        pub fn emit_membar_at(&mut self, section: SectionKind, order: MemBarrier) -> u64 {
            let offset = self.offset_at(section);

            if let Some(last) = self.last_barrier {
                if last.section == section && last.offset + 4 == offset {
                    let code = self.section_mut(section).code_mut(last.offset);
                    let word = bits::read_word(code);
                    debug_assert!(native::is_fence(word));

                    let pred = bits::extract(word, 27, 24) | order.predecessor();
                    let succ = bits::extract(word, 23, 20) | order.successor();
                    bits::patch(code, 27, 24, pred);
                    bits::patch(code, 23, 20, succ);

                    trace!("merged membar into {section}+{:#x}", last.offset);
                    return last.offset
                }
            }

            self.last_barrier = Some(Position { section, offset });
            self.emit_inst_at(section, encode::fence(order.predecessor(), order.successor()))
        }
    }

    // ----- AMO -----

    with_no_at! {
        emit_atomic_add,
        /// `prev = *addr; *addr += incr`; pass `ZERO` as `prev` to drop the old value
        #[track_caller]
        pub fn emit_atomic_add_at(
            &mut self,
            section: SectionKind,
            size: OperandSize,
            prev: Reg,
            incr: Reg,
            addr: Reg,
            ordering: AqRl
        ) -> u64 {
            let op = size.amo(Op::AmoaddW, Op::AmoaddD);
            self.emit_inst_at(section, encode::amo(op, prev, incr, addr, ordering))
        }
    }

    with_no_at! {
        emit_atomic_add_imm,
        /// Like [`emit_atomic_add`](Self::emit_atomic_add) with a constant; clobbers `t0`
        #[track_caller]
        pub fn emit_atomic_add_imm_at(
            &mut self,
            section: SectionKind,
            size: OperandSize,
            prev: Reg,
            incr: i64,
            addr: Reg,
            ordering: AqRl
        ) -> u64 {
            assert!(addr != Reg::T0, "atomic_add_imm: address in t0 would be clobbered");
            let start = self.emit_li_at(section, Reg::T0, incr);
            self.emit_atomic_add_at(section, size, prev, Reg::T0, addr, ordering);
            start
        }
    }

    with_no_at! {
        emit_atomic_xchg,
        /// `prev = *addr; *addr = new`; `Uint32` zero-extends `prev`
        #[track_caller]
        pub fn emit_atomic_xchg_at(
            &mut self,
            section: SectionKind,
            size: OperandSize,
            prev: Reg,
            new: Reg,
            addr: Reg,
            ordering: AqRl
        ) -> u64 {
            let op = size.amo(Op::AmoswapW, Op::AmoswapD);
            let start = self.emit_inst_at(section, encode::amo(op, prev, new, addr, ordering));
            if size == OperandSize::Uint32 && prev != Reg::ZERO {
                self.emit_zero_extend_at(section, prev, prev, 32);
            }
            start
        }
    }

    // ----- LR/SC -----

    /// `lr` of the word or doubleword at `addr` into `t0`.
    #[track_caller]
    fn load_reserved_at(&mut self, section: SectionKind, size: OperandSize, addr: Reg, ordering: AqRl) {
        let op = size.amo(Op::LrW, Op::LrD);
        self.emit_inst_at(section, encode::lr(op, Reg::T0, addr, ordering.acquire_part()));
        if size == OperandSize::Uint32 {
            self.emit_zero_extend_at(section, Reg::T0, Reg::T0, 32);
        }
    }

    /// `sc` of `new` to `addr`, status into `t0`.
    #[track_caller]
    fn store_conditional_at(&mut self, section: SectionKind, size: OperandSize, addr: Reg, new: Reg, ordering: AqRl) {
        let op = size.amo(Op::ScW, Op::ScD);
        self.emit_inst_at(section, encode::amo(op, Reg::T0, new, addr, ordering.release_part()));
    }

    with_no_at! {
        emit_cmpxchg,
        /// Strong compare-and-swap of a word or doubleword; clobbers `t0`.
        ///
        /// Retries until the value either mismatches or the store-conditional succeeds.
        /// With `result_as_bool`, `result` is 1 on success and 0 on mismatch; otherwise
        /// it is the value found in memory.
        #[track_caller]
        pub fn emit_cmpxchg_at(
            &mut self,
            section: SectionKind,
            addr: Reg,
            expected: Reg,
            new: Reg,
            size: OperandSize,
            ordering: AqRl,
            result: Reg,
            result_as_bool: bool
        ) -> u64 {
            assert!(!size.is_narrow(), "use cmpxchg_narrow for {size:?} operands");
            assert_different_registers(&[addr, expected, Reg::T0]);
            assert_different_registers(&[addr, new, Reg::T0]);

            let start = self.offset_at(section);
            let retry = self.new_label();
            let ne_done = self.new_label();
            let done = self.new_label();

            self.bind_at(section, retry);
            self.load_reserved_at(section, size, addr, ordering);
            self.emit_branch_label_at(section, Cond::Ne, Reg::T0, expected, ne_done, false);
            self.store_conditional_at(section, size, addr, new, ordering);
            self.emit_bnez_at(section, Reg::T0, retry, false);

            if result_as_bool {
                self.emit_li_at(section, result, 1);
            } else {
                self.emit_mv_at(section, result, expected);
            }
            self.emit_j_label_at(section, done);

            self.bind_at(section, ne_done);
            if result_as_bool {
                self.emit_mv_at(section, result, Reg::ZERO);
            } else {
                self.emit_mv_at(section, result, Reg::T0);
            }

            self.bind_at(section, done);
            start
        }
    }

    with_no_at! {
        emit_cmpxchg_weak,
        /// Single-attempt compare-and-swap; clobbers `t0`.
        ///
        /// `result` is 0 on success and 1 on failure, including a spurious
        /// store-conditional failure.
        #[track_caller]
        pub fn emit_cmpxchg_weak_at(
            &mut self,
            section: SectionKind,
            addr: Reg,
            expected: Reg,
            new: Reg,
            size: OperandSize,
            ordering: AqRl,
            result: Reg
        ) -> u64 {
            assert!(!size.is_narrow(), "use cmpxchg_narrow_weak for {size:?} operands");
            assert_different_registers(&[addr, expected, Reg::T0]);
            assert_different_registers(&[addr, new, Reg::T0]);

            let start = self.offset_at(section);
            let fail = self.new_label();
            let sc_done = self.new_label();
            let done = self.new_label();

            self.load_reserved_at(section, size, addr, ordering);
            self.emit_branch_label_at(section, Cond::Ne, Reg::T0, expected, fail, false);
            self.store_conditional_at(section, size, addr, new, ordering);
            self.emit_beqz_at(section, Reg::T0, sc_done, false);

            self.bind_at(section, fail);
            self.emit_li_at(section, result, 1);
            self.emit_j_label_at(section, done);

            self.bind_at(section, sc_done);
            self.emit_mv_at(section, result, Reg::ZERO);

            self.bind_at(section, done);
            start
        }
    }

    // ----- SUB-WORD -----

    /// Shared preamble of every sub-word sequence:
    ///
    /// ```text
    ///     shift    = (addr & 3) * 8
    ///     t1       = addr & !3
    ///     mask     = (0xff | 0xffff) << shift
    ///     not_mask = !mask
    /// ```
    ///
    /// then shifts and masks each of `values` into position in place.
    #[track_caller]
    fn narrow_setup_at(
        &mut self,
        section: SectionKind,
        size: OperandSize,
        addr: Reg,
        shift: Reg,
        mask: Reg,
        not_mask: Reg,
        values: &[Reg]
    ) {
        assert!(size.is_narrow(), "{size:?} is not a sub-word operand");

        self.emit_inst_at(section, encode::i(Op::Andi, shift, addr, 3));
        self.emit_inst_at(section, encode::shift(Op::Slli, shift, shift, 3));
        self.emit_inst_at(section, encode::i(Op::Andi, Reg::T1, addr, !3));

        if size == OperandSize::Int8 {
            self.emit_inst_at(section, encode::i(Op::Addi, mask, Reg::ZERO, 0xff));
        } else {
            self.emit_inst_at(section, encode::i(Op::Addi, mask, Reg::ZERO, -1));
            self.emit_zero_extend_at(section, mask, mask, 16);
        }
        self.emit_inst_at(section, encode::r(Op::Sll, mask, mask, shift));
        self.emit_not_at(section, not_mask, mask);

        for &v in values {
            self.emit_inst_at(section, encode::r(Op::Sll, v, v, shift));
            self.emit_inst_at(section, encode::r(Op::And, v, v, mask));
        }
    }

    with_no_at! {
        emit_cmpxchg_narrow,
        /// Strong compare-and-swap of an 8- or 16-bit value, emulated on its containing
        /// aligned word.
        ///
        /// Clobbers `t0`, `t1`, `expected`, `new` and the three temps. With
        /// `result_as_bool`, `result` is 1 on success and 0 on mismatch; otherwise it is
        /// the zero-extended sub-word found in memory.
        #[track_caller]
        pub fn emit_cmpxchg_narrow_at(
            &mut self,
            section: SectionKind,
            addr: Reg,
            expected: Reg,
            new: Reg,
            size: OperandSize,
            ordering: AqRl,
            result: Reg,
            result_as_bool: bool,
            tmp1: Reg,
            tmp2: Reg,
            tmp3: Reg
        ) -> u64 {
            let (shift, mask, not_mask, old, tmp) = (tmp1, tmp2, tmp3, result, Reg::T0);
            assert_different_registers(&[addr, old, mask, not_mask, new, expected, shift, tmp, Reg::T1]);

            let start = self.offset_at(section);
            self.narrow_setup_at(section, size, addr, shift, mask, not_mask, &[expected, new]);

            let retry = self.new_label();
            let fail = self.new_label();
            let done = self.new_label();

            self.bind_at(section, retry);
            self.emit_inst_at(section, encode::lr(Op::LrW, old, Reg::T1, ordering.acquire_part()));
            self.emit_inst_at(section, encode::r(Op::And, tmp, old, mask));
            self.emit_branch_label_at(section, Cond::Ne, tmp, expected, fail, false);

            self.emit_inst_at(section, encode::r(Op::And, tmp, old, not_mask));
            self.emit_inst_at(section, encode::r(Op::Or, tmp, tmp, new));
            self.emit_inst_at(section, encode::amo(Op::ScW, tmp, tmp, Reg::T1, ordering.release_part()));
            self.emit_bnez_at(section, tmp, retry, false);

            if result_as_bool {
                self.emit_inst_at(section, encode::i(Op::Addi, result, Reg::ZERO, 1));
                self.emit_j_label_at(section, done);

                self.bind_at(section, fail);
                self.emit_mv_at(section, result, Reg::ZERO);

                self.bind_at(section, done);
            } else {
                self.emit_inst_at(section, encode::r(Op::And, tmp, old, mask));

                self.bind_at(section, fail);
                self.emit_inst_at(section, encode::r(Op::Srl, result, tmp, shift));

                // `done` is only used by the boolean form
                self.bind_at(section, done);
            }

            start
        }
    }

    with_no_at! {
        emit_cmpxchg_narrow_weak,
        /// Single-attempt sub-word compare-and-swap: `result` is 0 on success and 1 on
        /// failure. Clobbers the same registers as [`emit_cmpxchg_narrow`](Self::emit_cmpxchg_narrow).
        #[track_caller]
        pub fn emit_cmpxchg_narrow_weak_at(
            &mut self,
            section: SectionKind,
            addr: Reg,
            expected: Reg,
            new: Reg,
            size: OperandSize,
            ordering: AqRl,
            result: Reg,
            tmp1: Reg,
            tmp2: Reg,
            tmp3: Reg
        ) -> u64 {
            let (shift, mask, not_mask, old, tmp) = (tmp1, tmp2, tmp3, result, Reg::T0);
            assert_different_registers(&[addr, old, mask, not_mask, new, expected, shift, tmp, Reg::T1]);

            let start = self.offset_at(section);
            self.narrow_setup_at(section, size, addr, shift, mask, not_mask, &[expected, new]);

            let succ = self.new_label();
            let fail = self.new_label();
            let done = self.new_label();

            self.emit_inst_at(section, encode::lr(Op::LrW, old, Reg::T1, ordering.acquire_part()));
            self.emit_inst_at(section, encode::r(Op::And, tmp, old, mask));
            self.emit_branch_label_at(section, Cond::Ne, tmp, expected, fail, false);

            self.emit_inst_at(section, encode::r(Op::And, tmp, old, not_mask));
            self.emit_inst_at(section, encode::r(Op::Or, tmp, tmp, new));
            self.emit_inst_at(section, encode::amo(Op::ScW, tmp, tmp, Reg::T1, ordering.release_part()));
            self.emit_beqz_at(section, tmp, succ, false);

            self.bind_at(section, fail);
            self.emit_inst_at(section, encode::i(Op::Addi, result, Reg::ZERO, 1));
            self.emit_j_label_at(section, done);

            self.bind_at(section, succ);
            self.emit_mv_at(section, result, Reg::ZERO);

            self.bind_at(section, done);
            start
        }
    }

    with_no_at! {
        emit_xchg_narrow,
        /// Exchange of an 8- or 16-bit value; `result` gets the zero-extended old
        /// sub-word. Clobbers `t0`, `t1`, `new` and the three temps.
        #[track_caller]
        pub fn emit_xchg_narrow_at(
            &mut self,
            section: SectionKind,
            addr: Reg,
            new: Reg,
            size: OperandSize,
            ordering: AqRl,
            result: Reg,
            tmp1: Reg,
            tmp2: Reg,
            tmp3: Reg
        ) -> u64 {
            let (shift, mask, not_mask, old, tmp) = (tmp1, tmp2, tmp3, result, Reg::T0);
            assert_different_registers(&[addr, old, mask, not_mask, new, shift, tmp, Reg::T1]);

            let start = self.offset_at(section);
            self.narrow_setup_at(section, size, addr, shift, mask, not_mask, &[new]);

            let retry = self.new_label();
            self.bind_at(section, retry);
            self.emit_inst_at(section, encode::lr(Op::LrW, old, Reg::T1, ordering.acquire_part()));
            self.emit_inst_at(section, encode::r(Op::And, tmp, old, not_mask));
            self.emit_inst_at(section, encode::r(Op::Or, tmp, tmp, new));
            self.emit_inst_at(section, encode::amo(Op::ScW, tmp, tmp, Reg::T1, ordering.release_part()));
            self.emit_bnez_at(section, tmp, retry, false);

            self.emit_inst_at(section, encode::r(Op::And, tmp, old, mask));
            self.emit_inst_at(section, encode::r(Op::Srl, result, tmp, shift));
            start
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rv64::Reg::*;

    #[test]
    fn adjacent_barriers_merge() {
        let mut asm = Assembler::default();
        assert_eq!(asm.emit_membar(MemBarrier::LOAD_LOAD), 0);
        assert_eq!(asm.emit_membar(MemBarrier::STORE_STORE), 0);
        assert_eq!(asm.offset(), 4);
        assert_eq!(asm.insts().word_at(0), encode::fence(0b11, 0b11)); // fence rw, rw
    }

    #[test]
    fn barriers_separated_by_code_do_not_merge() {
        let mut asm = Assembler::default();
        asm.emit_membar(MemBarrier::LOAD_STORE);
        asm.emit_nop();
        asm.emit_membar(MemBarrier::STORE_LOAD);
        assert_eq!(asm.offset(), 12);
        assert_eq!(asm.insts().word_at(0), encode::fence(0b10, 0b01));
        assert_eq!(asm.insts().word_at(8), encode::fence(0b01, 0b10));
    }

    #[test]
    fn label_between_barriers_stops_merging() {
        let mut asm = Assembler::default();
        let l = asm.new_label();
        asm.emit_membar(MemBarrier::ANY_ANY);
        asm.bind(l);
        asm.emit_membar(MemBarrier::ANY_ANY);
        assert_eq!(asm.offset(), 8);
    }

    #[test]
    fn amo_orderings() {
        let mut asm = Assembler::default();
        asm.emit_atomic_xchg(OperandSize::Int32, A0, A1, A2, AqRl::AcquireRelease);
        assert_eq!(asm.insts().word_at(0), 0x0eb6252f); // amoswap.w.aqrl a0, a1, (a2)

        asm.emit_atomic_xchg(OperandSize::Uint32, A0, A1, A2, AqRl::None);
        assert_eq!(asm.offset(), 16);
    }

    #[test]
    #[should_panic(expected = "used for two operands")]
    fn narrow_cas_rejects_aliasing() {
        let mut asm = Assembler::default();
        asm.emit_cmpxchg_narrow(A0, A1, A2, OperandSize::Int8, AqRl::None, A3, true, A4, A4, A5);
    }

    #[test]
    #[should_panic(expected = "no native atomic")]
    fn amo_rejects_sub_word() {
        let mut asm = Assembler::default();
        asm.emit_atomic_add(OperandSize::Int16, A0, A1, A2, AqRl::None);
    }
}
