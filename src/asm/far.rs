//! Calls and jumps that may leave `jal` range

use crate::asm::Assembler;
use crate::asm::buffer::SectionKind;
use crate::asm::errors::EmitError;
use crate::asm::reloc::RelocationTag;
use crate::materialize;
use crate::rv64::{encode, Op, Reg};

use log::trace;

impl Assembler {
    with_no_at! {
        emit_la_patchable,
        /// Address of `target` into `rd` through a sequence the patch engine can retarget
        /// anywhere in the code cache: an `auipc` when the whole cache reaches `target`,
        /// a `movptr` prefix otherwise (a whole `li64` past `movptr` reach).
        ///
        /// Returns the start offset and the low 12 bits the consumer must add.
        #[track_caller]
        pub fn emit_la_patchable_at(
            &mut self,
            section: SectionKind,
            rd: Reg,
            target: u64,
            reloc: RelocationTag
        ) -> (u64, i32) {
            if reloc != RelocationTag::None {
                let offset = self.offset_at(section);
                self.add_relocation(section, offset, reloc);
            }

            let near = self.code_cache().pcrel_reaches(target)
                && materialize::pcrel_reaches(self.distance_at(section, target));

            if near {
                self.pcrel_prefix_at(section, rd, target)
            } else {
                self.absolute_prefix_at(section, rd, target)
            }
        }
    }

    #[track_caller]
    fn far_transfer_at(
        &mut self,
        section: SectionKind,
        link: Reg,
        target: u64,
        reloc: RelocationTag,
        tmp: Reg
    ) -> u64 {
        let distance = self.distance_at(section, target);
        if !self.code_cache().far_branches() && materialize::jal_reaches(distance) {
            let start = self.offset_at(section);
            if reloc != RelocationTag::None {
                self.add_relocation(section, start, reloc);
            }

            return self.emit_inst_at(section, encode::j(Op::Jal, link, distance))
        }

        assert!(tmp != Reg::ZERO, "zero cannot be a temp register");
        trace!("far transfer to {target:#x} through {tmp:?}");

        let (start, lo) = self.emit_la_patchable_at(section, tmp, target, reloc);
        self.emit_inst_at(section, encode::i(Op::Jalr, link, tmp, lo));
        start
    }

    with_no_at! {
        emit_far_call,
        /// Call `target`, return address in `ra`; `tmp` is clobbered by the long form
        #[track_caller]
        pub fn emit_far_call_at(&mut self, section: SectionKind, target: u64, reloc: RelocationTag, tmp: Reg) -> u64 {
            self.far_transfer_at(section, Reg::RA, target, reloc, tmp)
        }
    }

    with_no_at! {
        emit_far_jump,
        #[track_caller]
        pub fn emit_far_jump_at(&mut self, section: SectionKind, target: u64, reloc: RelocationTag, tmp: Reg) -> u64 {
            self.far_transfer_at(section, Reg::ZERO, target, reloc, tmp)
        }
    }

    /// Single-`jal` call to `target` from the instruction section.
    ///
    /// When the code cache is wider than `jal` reach, the call is routed through a
    /// trampoline stub whenever `target` is out of direct range, so the call stays one
    /// instruction and can be retargeted later with [`retarget_call`](crate::asm::buffer::CodeBuffer::retarget_call).
    ///
    /// Fails if the stub area is full or the stub itself is out of reach; nothing is
    /// emitted then.
    #[track_caller]
    pub fn emit_trampoline_call(&mut self, target: u64, reloc: RelocationTag) -> Result<u64, EmitError> {
        let section = SectionKind::Insts;
        let call_site = self.offset_at(section);

        if self.code_cache().far_branches() {
            self.emit_inst_at(section, encode::j(Op::Jal, Reg::RA, 0));
            if let Err(e) = self.retarget_call(call_site, target) {
                self.section_mut(section).truncate(call_site);
                return Err(e)
            }
        } else {
            let distance = self.distance_at(section, target);
            if !materialize::jal_reaches(distance) {
                return Err(EmitError::UnreachableWithoutTrampoline {
                    call_site: self.pc_at(section),
                    target
                })
            }

            self.emit_inst_at(section, encode::j(Op::Jal, Reg::RA, distance));
        }

        if reloc != RelocationTag::None {
            self.add_relocation(section, call_site, reloc);
        }

        Ok(call_site)
    }
}
