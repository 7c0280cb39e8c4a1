//! Memory operands and the loads, stores and `la` that materialize them

use crate::asm::Assembler;
use crate::asm::buffer::SectionKind;
use crate::asm::reloc::RelocationTag;
use crate::materialize::{self, Strategy};
use crate::patch::native;
use crate::rv64::{encode, Op, Reg, Register};

/// An operand naming a memory location.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum Address {
    /// `base + offset`; offsets outside 12 bits go through a temp register
    BaseOffset { base: Reg, offset: i64 },
    /// Relative to the first instruction of the access sequence
    PcRelative { offset: i64 },
    /// Absolute address, optionally tagged for relocation
    Literal { target: u64, reloc: RelocationTag },
    /// No operand; using it is a bug
    None,
}

impl Address {
    #[inline(always)]
    pub const fn base(base: Reg, offset: i64) -> Self {
        Self::BaseOffset { base, offset }
    }

    #[inline(always)]
    pub const fn pc_relative(offset: i64) -> Self {
        Self::PcRelative { offset }
    }

    #[inline(always)]
    pub const fn literal(target: u64, reloc: RelocationTag) -> Self {
        Self::Literal { target, reloc }
    }
}

impl Assembler {
    /// Emit whatever has to precede the memory instruction for `adr`.
    ///
    /// Returns the offset of the first word, the base register and the 12-bit
    /// immediate the consumer must carry.
    #[track_caller]
    fn address_prefix_at(&mut self, section: SectionKind, adr: Address, tmp: Reg) -> (u64, Reg, i32) {
        let start = self.offset_at(section);
        match adr {
            Address::BaseOffset { base, offset } => match Strategy::for_displacement(offset) {
                Strategy::BaseOffset => (start, base, offset as i32),
                Strategy::Abs32 => {
                    assert!(tmp != base, "temp register {tmp:?} is the base of the access");
                    let parts = materialize::pcrel_split(offset);
                    self.emit_inst_at(section, encode::u(Op::Lui, tmp, parts.hi20));
                    self.emit_inst_at(section, encode::r(Op::Add, tmp, tmp, base));
                    (start, tmp, parts.lo12)
                }
                _ => {
                    assert!(tmp != base, "temp register {tmp:?} is the base of the access");
                    self.emit_li64_at(section, tmp, offset);
                    self.emit_inst_at(section, encode::r(Op::Add, tmp, tmp, base));
                    (start, tmp, 0)
                }
            },

            Address::PcRelative { offset } => {
                assert!{
                    materialize::pcrel_reaches(offset),
                    "pc-relative offset {offset:#x} is out of auipc range"
                };
                let target = self.pc_at(section).wrapping_add(offset as u64);
                let (_, lo12) = self.pcrel_prefix_at(section, tmp, target);
                (start, tmp, lo12)
            }

            Address::Literal { target, reloc } => {
                if reloc != RelocationTag::None {
                    self.add_relocation(section, start, reloc);
                }

                let lo = if self.code_cache().pcrel_reaches(target)
                    && materialize::pcrel_reaches(self.distance_at(section, target))
                {
                    self.pcrel_prefix_at(section, tmp, target).1
                } else {
                    self.absolute_prefix_at(section, tmp, target).1
                };

                (start, tmp, lo)
            }

            Address::None => panic!("memory access through an empty address"),
        }
    }

    with_no_at! {
        emit_load,
        /// Load through any [`Address`]; `tmp` carries the address when the offset does
        /// not fit the instruction, and may equal `rd`.
        ///
        /// Returns the offset of the first instruction of the sequence.
        #[track_caller]
        pub fn emit_load_at(&mut self, section: SectionKind, op: Op, rd: impl Register, adr: Address, tmp: Reg) -> u64 {
            assert!(tmp != Reg::ZERO, "zero cannot be a temp register");
            let (start, base, lo) = self.address_prefix_at(section, adr, tmp);
            let word = encode::i(op, rd, base, lo);
            assert!(native::is_load(word), "{op:?} is not a load");
            self.emit_inst_at(section, word);
            start
        }
    }

    with_no_at! {
        emit_store,
        /// Store through any [`Address`]; `tmp` must differ from `src`
        #[track_caller]
        pub fn emit_store_at(&mut self, section: SectionKind, op: Op, src: impl Register, adr: Address, tmp: Reg) -> u64 {
            assert!(tmp != Reg::ZERO, "zero cannot be a temp register");
            assert!(!src.is(tmp), "temp register {tmp:?} holds the stored value");
            let (start, base, lo) = self.address_prefix_at(section, adr, tmp);
            let word = encode::s(op, src, base, lo);
            assert!(native::is_store(word), "{op:?} is not a store");
            self.emit_inst_at(section, word);
            start
        }
    }

    with_no_at! {
        emit_la,
        /// Load the effective address of `adr` into `rd`.
        ///
        /// An untagged literal is a plain [`emit_li`](Self::emit_li); a tagged one is a
        /// patchable `movptr`, or `li64` for addresses out of its reach.
        #[track_caller]
        pub fn emit_la_at(&mut self, section: SectionKind, rd: Reg, adr: Address) -> u64 {
            let start = self.offset_at(section);
            match adr {
                Address::Literal { target, reloc: RelocationTag::None } => {
                    self.emit_li_at(section, rd, target as i64);
                }

                Address::Literal { target, reloc } => {
                    self.add_relocation(section, start, reloc);
                    if materialize::movptr_reaches(target) {
                        self.emit_movptr_at(section, rd, target);
                    } else {
                        self.emit_li64_at(section, rd, target as i64);
                    }
                }

                Address::BaseOffset { base, offset } => match Strategy::for_displacement(offset) {
                    Strategy::BaseOffset => {
                        self.emit_inst_at(section, encode::i(Op::Addi, rd, base, offset as i32));
                    }
                    Strategy::Abs32 => {
                        assert!(rd != base, "la: destination {rd:?} is the base register");
                        let parts = materialize::pcrel_split(offset);
                        self.emit_inst_at(section, encode::u(Op::Lui, rd, parts.hi20));
                        self.emit_inst_at(section, encode::r(Op::Add, rd, rd, base));
                        self.emit_inst_at(section, encode::i(Op::Addi, rd, rd, parts.lo12));
                    }
                    _ => {
                        assert!(rd != base, "la: destination {rd:?} is the base register");
                        self.emit_li64_at(section, rd, offset);
                        self.emit_inst_at(section, encode::r(Op::Add, rd, rd, base));
                    }
                },

                Address::PcRelative { .. } => {
                    let (_, _, lo) = self.address_prefix_at(section, adr, rd);
                    self.emit_inst_at(section, encode::i(Op::Addi, rd, rd, lo));
                }

                Address::None => panic!("la of an empty address"),
            }

            start
        }
    }
}
