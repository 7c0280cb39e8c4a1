//! Code buffer: instruction and stub sections, relocation records, trampolines

use crate::bits::{self, INSTRUCTION_SIZE};
use crate::util::misc;
use crate::util::into_bytes::IntoBytes;
use crate::rv64::{encode, Op, Reg};
use crate::materialize;
use crate::patch::{self, Pattern};
use crate::asm::label::Position;
use crate::asm::errors::EmitError;
use crate::asm::config::{Config, CodeCacheBounds};
use crate::asm::reloc::{Relocation, RelocationTag};

use core::fmt;

use log::{debug, trace};
use rustc_hash::FxHashMap;

#[derive(Eq, Ord, Hash, Copy, Clone, Debug, PartialEq, PartialOrd)]
pub enum SectionKind {
    /// Main instruction stream
    Insts,
    /// Trampoline stubs
    Stubs,
}

impl fmt::Display for SectionKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insts => write!(f, "insts"),
            Self::Stubs => write!(f, "stubs"),
        }
    }
}

/// Append-only byte region that will live at `base` at run time.
#[derive(Clone, Debug)]
pub struct Section {
    kind: SectionKind,
    base: u64,
    capacity: usize,
    data: Vec<u8>,
}

impl Section {
    const PREALLOCATION_SIZE: usize = 1024;

    #[inline]
    pub fn new(kind: SectionKind, base: u64, capacity: usize) -> Self {
        Self {
            kind,
            base,
            capacity,
            data: Vec::with_capacity(capacity.min(Self::PREALLOCATION_SIZE))
        }
    }

    #[inline(always)]
    pub const fn kind(&self) -> SectionKind {
        self.kind
    }

    #[inline(always)]
    pub const fn base(&self) -> u64 {
        self.base
    }

    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Runtime address of `offset`.
    #[inline(always)]
    pub const fn address_of(&self, offset: u64) -> u64 {
        self.base.wrapping_add(offset)
    }

    /// Runtime address of the write cursor.
    #[inline(always)]
    pub fn pc(&self) -> u64 {
        self.address_of(self.data.len() as u64)
    }

    /// Does `address` fall into the part of the runtime range this section reserves?
    #[inline(always)]
    pub const fn contains(&self, address: u64) -> bool {
        address >= self.base && address - self.base < self.capacity as u64
    }

    #[track_caller]
    #[inline(always)]
    pub fn word_at(&self, offset: u64) -> u32 {
        bits::read_word(&self.data[offset as usize..])
    }

    #[inline]
    pub(crate) fn emit_bytes<'a>(&mut self, bytes: impl IntoBytes<'a>) -> u64 {
        let offset = self.data.len() as u64;
        bytes.move_into(&mut self.data);
        offset
    }

    #[inline(always)]
    pub(crate) fn emit_word(&mut self, word: u32) -> u64 {
        self.emit_bytes(&word.to_le_bytes())
    }

    /// Drop everything emitted at or after `offset`.
    #[inline(always)]
    pub(crate) fn truncate(&mut self, offset: u64) {
        self.data.truncate(offset as usize)
    }

    #[track_caller]
    #[inline(always)]
    pub(crate) fn code_mut(&mut self, offset: u64) -> &mut [u8] {
        &mut self.data[offset as usize..]
    }

    #[track_caller]
    #[inline(always)]
    pub(crate) fn code(&self, offset: u64) -> &[u8] {
        &self.data[offset as usize..]
    }
}

/// Emitted code together with the out-of-band records a linking pass needs.
#[derive(Clone, Debug)]
pub struct CodeBuffer {
    insts: Section,
    stubs: Section,

    relocs: Vec<Relocation>,

    /// Call-site offset in the instruction section -> stub offset in the stub section
    trampolines: FxHashMap<u64, u64>,

    /// Fence that may absorb the next barrier
    pub(crate) last_barrier: Option<Position>,

    code_cache: Option<CodeCacheBounds>,
}

impl CodeBuffer {
    const RELOC_PREALLOCATION_COUNT: usize = 16;

    /// Byte offset of the destination constant inside a stub.
    pub const STUB_DATA_OFFSET: u64 = 3 * INSTRUCTION_SIZE as u64;
    /// `auipc, ld, jalr` + 64-bit destination.
    pub const STUB_SIZE: usize = 3 * INSTRUCTION_SIZE + 8;

    #[track_caller]
    pub fn new(config: &Config) -> Self {
        assert!{
            config.stubs_in_jal_reach(),
            "stub section at {:#x} is out of jal reach of the instruction section at {:#x}",
            config.stubs_base(),
            config.get_insts_base()
        };

        Self {
            insts: Section::new(
                SectionKind::Insts,
                config.get_insts_base(),
                config.get_insts_capacity()
            ),
            stubs: Section::new(
                SectionKind::Stubs,
                config.stubs_base(),
                config.get_stubs_capacity()
            ),
            relocs: Vec::with_capacity(Self::RELOC_PREALLOCATION_COUNT),
            trampolines: FxHashMap::default(),
            last_barrier: None,
            code_cache: config.explicit_code_cache(),
        }
    }

    #[inline(always)]
    pub fn section(&self, kind: SectionKind) -> &Section {
        match kind {
            SectionKind::Insts => &self.insts,
            SectionKind::Stubs => &self.stubs,
        }
    }

    #[inline(always)]
    pub(crate) fn section_mut(&mut self, kind: SectionKind) -> &mut Section {
        match kind {
            SectionKind::Insts => &mut self.insts,
            SectionKind::Stubs => &mut self.stubs,
        }
    }

    #[inline(always)]
    pub fn insts(&self) -> &Section {
        &self.insts
    }

    #[inline(always)]
    pub fn stubs(&self) -> &Section {
        &self.stubs
    }

    #[inline(always)]
    pub fn relocations(&self) -> &[Relocation] {
        &self.relocs
    }

    /// Stub serving `call_site`, if one was ever allocated.
    #[inline(always)]
    pub fn trampoline_for(&self, call_site: u64) -> Option<u64> {
        self.trampolines.get(&call_site).copied()
    }

    #[inline(always)]
    pub fn trampoline_count(&self) -> usize {
        self.trampolines.len()
    }

    /// Code-cache bounds; unless configured, the buffer's own runtime range.
    #[inline]
    pub fn code_cache(&self) -> CodeCacheBounds {
        self.code_cache.unwrap_or_else(|| {
            CodeCacheBounds::new(
                self.insts.base,
                self.stubs.base + self.stubs.capacity as u64
            )
        })
    }

    #[inline]
    pub fn add_relocation(&mut self, section: SectionKind, offset: u64, tag: RelocationTag) {
        trace!("relocation {tag:?} at {section}+{offset:#x}");
        self.relocs.push(Relocation { section, offset, tag })
    }

    // ----- PATCH ENGINE OVER SECTIONS -----

    #[inline]
    pub fn classify_at(&self, section: SectionKind, offset: u64) -> Option<Pattern> {
        patch::classify(self.section(section).code(offset))
    }

    /// Rewrite the sequence at `section + offset` to reach `target`; returns its length.
    #[track_caller]
    #[inline]
    pub fn patch_at(&mut self, section: SectionKind, offset: u64, target: u64) -> usize {
        let s = self.section_mut(section);
        let pc = s.address_of(offset);
        patch::patch(s.code_mut(offset), pc, target)
    }

    /// Target currently encoded by the sequence at `section + offset`.
    #[track_caller]
    #[inline]
    pub fn recover_at(&self, section: SectionKind, offset: u64) -> u64 {
        let s = self.section(section);
        patch::recover(s.code(offset), s.address_of(offset))
    }

    // ----- TRAMPOLINES -----

    /// Destination constant held by the stub at `stub`.
    #[track_caller]
    #[inline]
    pub fn stub_destination(&self, stub: u64) -> u64 {
        let data = self.stubs.code(stub + Self::STUB_DATA_OFFSET);
        misc::le_bytes_into_int::<u64>(&data[..8])
    }

    #[track_caller]
    #[inline]
    fn set_stub_destination(&mut self, stub: u64, dest: u64) {
        trace!("stub at stubs+{stub:#x} now jumps to {dest:#x}");
        let data = self.stubs.code_mut(stub + Self::STUB_DATA_OFFSET);
        data[..8].copy_from_slice(&dest.to_le_bytes())
    }

    /// Stub that jumps to `dest` on behalf of the call at `call_site` (an offset into
    /// the instruction section). A call site owns at most one stub: asking again only
    /// rewrites the stub's destination constant.
    ///
    /// ```text
    ///     auipc t0, 0
    ///     ld    t0, 12(t0)
    ///     jalr  x0, 0(t0)
    ///     .8byte dest
    /// ```
    pub fn emit_trampoline_stub(&mut self, call_site: u64, dest: u64) -> Result<u64, EmitError> {
        if let Some(stub) = self.trampoline_for(call_site) {
            self.set_stub_destination(stub, dest);
            return Ok(stub)
        }

        let len = self.stubs.len() as u64;
        let pad = self.next_stub_offset() - len;
        let requested = pad as usize + Self::STUB_SIZE;

        let remaining = self.stubs.remaining();
        if requested > remaining {
            return Err(EmitError::BufferExhausted {
                section: SectionKind::Stubs,
                requested,
                remaining
            })
        }

        for _ in 0..pad / INSTRUCTION_SIZE as u64 {
            self.stubs.emit_word(encode::i(Op::Addi, Reg::ZERO, Reg::ZERO, 0));
        }

        let stub = self.stubs.emit_word(encode::u(Op::Auipc, Reg::T0, 0));
        self.stubs.emit_word(encode::i(Op::Ld, Reg::T0, Reg::T0, Self::STUB_DATA_OFFSET as _));
        self.stubs.emit_word(encode::i(Op::Jalr, Reg::ZERO, Reg::T0, 0));
        self.stubs.emit_bytes(&dest.to_le_bytes());

        self.add_relocation(SectionKind::Stubs, stub, RelocationTag::TrampolineStub);
        self.trampolines.insert(call_site, stub);

        debug!{
            "allocated trampoline at {:#x} for call at {:#x} -> {dest:#x}",
            self.stubs.address_of(stub),
            self.insts.address_of(call_site)
        };

        Ok(stub)
    }

    /// Stub-section offset the next fresh stub would get.
    #[inline]
    fn next_stub_offset(&self) -> u64 {
        // the destination constant has to be 8-byte aligned
        let len = self.stubs.len() as u64;
        misc::align_up(len + Self::STUB_DATA_OFFSET, 8) - Self::STUB_DATA_OFFSET
    }

    /// Make the `jal` at `call_site` (instruction-section offset) end up at `target`.
    ///
    /// A direct `jal` is used whenever it reaches; otherwise the call goes through the
    /// call site's stub, which is allocated on first need.
    #[track_caller]
    pub fn retarget_call(&mut self, call_site: u64, target: u64) -> Result<(), EmitError> {
        assert!{
            matches!(self.classify_at(SectionKind::Insts, call_site), Some(Pattern::Jal)),
            "no call instruction at insts+{call_site:#x}"
        };

        let pc = self.insts.address_of(call_site);
        if materialize::jal_reaches(target.wrapping_sub(pc) as _) {
            if let Some(stub) = self.trampoline_for(call_site) {
                self.set_stub_destination(stub, target)
            }

            self.patch_at(SectionKind::Insts, call_site, target);
            return Ok(())
        }

        let stub = self.trampoline_for(call_site).unwrap_or_else(|| self.next_stub_offset());
        let stub_address = self.stubs.address_of(stub);
        if !materialize::jal_reaches(stub_address.wrapping_sub(pc) as _) {
            return Err(EmitError::UnreachableWithoutTrampoline { call_site: pc, target })
        }

        let stub = self.emit_trampoline_stub(call_site, target)?;
        debug_assert_eq!(self.stubs.address_of(stub), stub_address);

        debug!("call at {pc:#x} routed through trampoline at {stub_address:#x}");

        self.patch_at(SectionKind::Insts, call_site, stub_address);
        Ok(())
    }

    // ----- RELOCATION -----

    /// Where a relocated sequence really leads, looking through trampolines.
    #[track_caller]
    fn relocation_target(&self, reloc: &Relocation) -> u64 {
        match reloc.tag {
            RelocationTag::TrampolineStub => self.stub_destination(reloc.offset),
            tag if tag.is_call() && reloc.section == SectionKind::Insts => {
                match self.trampoline_for(reloc.offset) {
                    Some(stub) if self.recover_at(reloc.section, reloc.offset) == self.stubs.address_of(stub) => {
                        self.stub_destination(stub)
                    }
                    _ => self.recover_at(reloc.section, reloc.offset)
                }
            }
            _ => self.recover_at(reloc.section, reloc.offset)
        }
    }

    /// Move the whole buffer so that the instruction section starts at `new_base`.
    ///
    /// Every relocation is re-resolved: targets inside the buffer move with it, external
    /// targets stay put. Direct calls that fall out of `jal` reach go through a stub.
    /// The new placement must keep every pc-relative site in reach of its external
    /// target, which holds whenever both placements lie inside the configured code cache.
    ///
    /// On error the buffer is left exactly as it was.
    #[track_caller]
    pub fn relocate_to(&mut self, new_base: u64) -> Result<(), EmitError> {
        let mut moved = self.clone();
        moved.relocate_in_place(new_base)?;
        *self = moved;
        Ok(())
    }

    #[track_caller]
    fn relocate_in_place(&mut self, new_base: u64) -> Result<(), EmitError> {
        let old_base = self.insts.base;
        let delta = new_base.wrapping_sub(old_base);
        assert!(delta % 8 == 0, "relocation by {delta:#x} breaks stub alignment");

        let old_low = self.insts.base;
        let old_high = self.stubs.base + self.stubs.capacity as u64;
        let is_internal = |address: u64| address >= old_low && address < old_high;

        let targets = self.relocs.iter()
            .map(|reloc| self.relocation_target(reloc))
            .collect::<Vec<_>>();

        self.insts.base = new_base;
        self.stubs.base = self.stubs.base.wrapping_add(delta);

        debug!("relocating code buffer {old_base:#x} -> {new_base:#x}");

        let relocs = self.relocs.clone();
        for (reloc, old_target) in relocs.into_iter().zip(targets) {
            let target = match reloc.tag {
                RelocationTag::None => continue,
                RelocationTag::InternalWord => old_target.wrapping_add(delta),
                tag if !tag.is_external() && is_internal(old_target) => old_target.wrapping_add(delta),
                _ => old_target,
            };

            match reloc.tag {
                RelocationTag::TrampolineStub => self.set_stub_destination(reloc.offset, target),

                tag if tag.is_call()
                    && reloc.section == SectionKind::Insts
                    && self.classify_at(reloc.section, reloc.offset) == Some(Pattern::Jal) =>
                {
                    self.retarget_call(reloc.offset, target)?
                }

                _ => {
                    self.patch_at(reloc.section, reloc.offset, target);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(base: u64) -> CodeBuffer {
        let config = Config::new()
            .insts_base(base)
            .insts_capacity(0x1000)
            .stubs_capacity(64);
        CodeBuffer::new(&config)
    }

    fn emit_call(buf: &mut CodeBuffer) -> u64 {
        let site = buf.insts.emit_word(encode::j(Op::Jal, Reg::RA, 0));
        buf.add_relocation(SectionKind::Insts, site, RelocationTag::RuntimeCall);
        site
    }

    #[test]
    fn one_stub_per_call_site() {
        let mut buf = buffer(0x1000_0000);
        let site = emit_call(&mut buf);

        let first = buf.emit_trampoline_stub(site, 0x7000_0000).unwrap();
        let second = buf.emit_trampoline_stub(site, 0x7000_0000).unwrap();
        assert_eq!(first, second);
        assert_eq!(buf.trampoline_count(), 1);
        assert_eq!(buf.stubs().len(), CodeBuffer::STUB_SIZE + 4);
        assert_eq!(buf.stub_destination(first), 0x7000_0000);
        assert_eq!((buf.stubs().address_of(first) + CodeBuffer::STUB_DATA_OFFSET) % 8, 0);
    }

    #[test]
    fn stub_area_exhaustion_is_reported() {
        let mut buf = buffer(0x1000_0000);
        let sites = (0..4).map(|_| emit_call(&mut buf)).collect::<Vec<_>>();

        assert!(buf.emit_trampoline_stub(sites[0], 0x7000_0000).is_ok());
        assert!(buf.emit_trampoline_stub(sites[1], 0x7000_0000).is_ok());

        let err = buf.emit_trampoline_stub(sites[2], 0x7000_0000).unwrap_err();
        assert!(matches!(err, EmitError::BufferExhausted { section: SectionKind::Stubs, .. }));
    }

    #[test]
    fn retarget_prefers_direct_jal() {
        let mut buf = buffer(0x1000_0000);
        let site = emit_call(&mut buf);

        buf.retarget_call(site, 0x1008_0000).unwrap();
        assert_eq!(buf.recover_at(SectionKind::Insts, site), 0x1008_0000);
        assert_eq!(buf.trampoline_count(), 0);

        buf.retarget_call(site, 0x7000_0000).unwrap();
        let stub = buf.trampoline_for(site).unwrap();
        assert_eq!(buf.recover_at(SectionKind::Insts, site), buf.stubs().address_of(stub));
        assert_eq!(buf.stub_destination(stub), 0x7000_0000);

        // the stub's auipc pair points at its own constant
        assert_eq!(
            buf.recover_at(SectionKind::Stubs, stub),
            buf.stubs().address_of(stub) + CodeBuffer::STUB_DATA_OFFSET
        );
    }

    #[test]
    fn relocation_keeps_external_targets() {
        let mut buf = buffer(0x1000_0000);
        let site = emit_call(&mut buf);
        buf.retarget_call(site, 0x1008_0000).unwrap();

        buf.relocate_to(0x1100_0000).unwrap();
        let stub = buf.trampoline_for(site).unwrap();
        assert_eq!(buf.insts().base(), 0x1100_0000);
        assert_eq!(buf.recover_at(SectionKind::Insts, site), buf.stubs().address_of(stub));
        assert_eq!(buf.stub_destination(stub), 0x1008_0000);

        buf.relocate_to(0x1000_0000).unwrap();
        assert_eq!(buf.recover_at(SectionKind::Insts, site), 0x1008_0000);
    }

    #[test]
    fn failed_relocation_leaves_buffer_untouched() {
        let config = Config::new()
            .insts_base(0x1000_0000)
            .insts_capacity(0x1000)
            .stubs_capacity(24);
        let mut buf = CodeBuffer::new(&config);

        let sites = [emit_call(&mut buf), emit_call(&mut buf)];
        for site in sites {
            buf.retarget_call(site, 0x1008_0000).unwrap();
        }
        let insts = buf.insts().data().to_vec();
        let stubs_base = buf.stubs().base();

        // both calls fall out of reach, but only one stub fits
        let err = buf.relocate_to(0x1100_0000).unwrap_err();
        assert!(matches!{
            err,
            EmitError::BufferExhausted { section: SectionKind::Stubs, requested: 24, remaining: 0 }
        });

        assert_eq!(buf.insts().base(), 0x1000_0000);
        assert_eq!(buf.stubs().base(), stubs_base);
        assert_eq!(buf.insts().data(), &insts[..]);
        assert!(buf.stubs().is_empty());
        assert_eq!(buf.trampoline_count(), 0);
        assert_eq!(buf.relocations().len(), 2);
        for site in sites {
            assert_eq!(buf.recover_at(SectionKind::Insts, site), 0x1008_0000);
        }
    }

    #[test]
    fn failed_retarget_allocates_nothing() {
        let config = Config::new()
            .insts_base(0x1000_0000)
            .insts_capacity(0x1000)
            .stubs_capacity(CodeBuffer::STUB_SIZE - 4);
        let mut buf = CodeBuffer::new(&config);

        let site = emit_call(&mut buf);
        buf.retarget_call(site, 0x1000_0100).unwrap();

        let err = buf.retarget_call(site, 0x7000_0000).unwrap_err();
        assert!(matches!(err, EmitError::BufferExhausted { section: SectionKind::Stubs, .. }));
        assert!(buf.stubs().is_empty());
        assert_eq!(buf.trampoline_count(), 0);
        assert_eq!(buf.relocations().len(), 1);
        assert_eq!(buf.recover_at(SectionKind::Insts, site), 0x1000_0100);
    }

    #[test]
    #[should_panic(expected = "out of jal reach")]
    fn layout_wider_than_jal_reach_is_rejected() {
        _ = CodeBuffer::new(&Config::new().insts_capacity(1 << 20));
    }
}
