//! Emission session

use crate::bits::INSTRUCTION_SIZE;
use crate::util::into_bytes::IntoBytes;
use crate::asm::config::Config;
use crate::asm::buffer::{CodeBuffer, SectionKind};
use crate::asm::errors::{EmitError, FinishError};
use crate::asm::label::{
    Label,
    Position,
    LabelInfo,
    LabelState,
};

use core::panic;
use core::ops::{Deref, DerefMut};

use log::trace;
use smallvec::SmallVec;

/// One code-generation session over a [`CodeBuffer`].
///
/// The assembler owns the buffer and all label state; every `emit_*` routine returns the
/// offset (within its section) of the first word it wrote.
#[derive(Debug)]
pub struct Assembler {
    buf: CodeBuffer,

    curr_section: SectionKind,

    labels: Vec<LabelInfo>,
}

impl Deref for Assembler {
    type Target = CodeBuffer;

    #[inline(always)]
    fn deref(&self) -> &Self::Target { &self.buf }
}

impl DerefMut for Assembler {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.buf }
}

impl Default for Assembler {
    #[inline(always)]
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Assembler {
    /// Create a new `Assembler` instance.
    ///
    /// # Examples
    ///
    /// ```
    /// use rvjit::asm::Assembler;
    /// use rvjit::asm::config::Config;
    /// use rvjit::rv64::Reg::*;
    ///
    /// let mut asm = Assembler::new(Config::new().insts_base(0x1000));
    /// asm.emit_addi(A0, ZERO, 42);
    /// asm.emit_jalr(ZERO, RA, 0);
    ///
    /// let buf = asm.finish().unwrap();
    /// assert_eq!(buf.insts().data(), &[
    ///     0x13, 0x05, 0xa0, 0x02, // addi a0, zero, 42
    ///     0x67, 0x80, 0x00, 0x00, // ret
    /// ]);
    /// ```
    pub fn new(config: Config) -> Self {
        Self {
            buf: CodeBuffer::new(&config),
            curr_section: SectionKind::Insts,
            labels: Vec::new(),
        }
    }

    /// Finishes emission
    ///
    /// Fails if a label was never bound or the instruction section outgrew its capacity.
    #[inline]
    pub fn finish(self) -> Result<CodeBuffer, FinishError> {
        let unbound = self.labels.iter()
            .filter(|info| info.position().is_none())
            .collect::<Vec<_>>();

        if !unbound.is_empty() {
            return Err(FinishError::from_unbound_labels(unbound))
        }

        let insts = self.buf.insts();
        if insts.len() > insts.capacity() {
            return Err(EmitError::BufferExhausted {
                section: SectionKind::Insts,
                requested: insts.len(),
                remaining: insts.capacity()
            }.into())
        }

        Ok(self.buf)
    }

    #[inline(always)]
    pub fn code_buffer(&self) -> &CodeBuffer {
        &self.buf
    }

    #[inline(always)]
    pub fn position_at_end(&mut self, section: SectionKind) {
        self.curr_section = section
    }

    #[inline(always)]
    pub fn curr_section(&self) -> SectionKind {
        self.curr_section
    }

    /// Offset of the write cursor within `section`.
    #[inline(always)]
    pub fn offset_at(&self, section: SectionKind) -> u64 {
        self.buf.section(section).len() as _
    }

    #[inline(always)]
    pub fn offset(&self) -> u64 {
        self.offset_at(self.curr_section)
    }

    /// Runtime address of the write cursor within `section`.
    #[inline(always)]
    pub fn pc_at(&self, section: SectionKind) -> u64 {
        self.buf.section(section).pc()
    }

    #[inline(always)]
    pub fn pc(&self) -> u64 {
        self.pc_at(self.curr_section)
    }

    with_no_at! {
        emit_inst,
        #[inline(always)]
        pub fn emit_inst_at(&mut self, section: SectionKind, word: u32) -> u64 {
            self.buf.section_mut(section).emit_word(word)
        }
    }

    /// Raw data, e.g. a constant pool entry.
    #[inline]
    pub fn emit_bytes_at<'a>(&mut self, section: SectionKind, bytes: impl IntoBytes<'a>) -> u64 {
        self.buf.section_mut(section).emit_bytes(bytes)
    }

    #[inline(always)]
    pub fn emit_bytes<'a>(&mut self, bytes: impl IntoBytes<'a>) -> u64 {
        self.emit_bytes_at(self.curr_section, bytes)
    }

    // ----- LABELS -----

    #[track_caller]
    #[inline]
    pub fn new_label(&mut self) -> Label {
        let name = format!(".L{}", self.labels.len());
        self.add_label(name, panic::Location::caller())
    }

    #[track_caller]
    #[inline]
    pub fn new_named_label(&mut self, name: impl Into<String>) -> Label {
        self.add_label(name.into(), panic::Location::caller())
    }

    #[inline]
    fn add_label(&mut self, name: String, caller_loc: &'static panic::Location<'static>) -> Label {
        let label = Label(self.labels.len());
        self.labels.push(LabelInfo {
            name,
            caller_loc,
            state: LabelState::Unbound(SmallVec::new()),
        });
        label
    }

    #[inline(always)]
    pub fn label_name(&self, label: Label) -> &str {
        &self.labels[label.0].name
    }

    #[inline(always)]
    pub fn label_position(&self, label: Label) -> Option<Position> {
        self.labels[label.0].position()
    }

    #[inline]
    pub fn label_address(&self, label: Label) -> Option<u64> {
        self.label_position(label).map(|pos| {
            self.buf.section(pos.section).address_of(pos.offset)
        })
    }

    with_no_at! {
        bind,
        /// Place `label` at the write cursor of `section` and patch every sequence
        /// that was waiting for it.
        ///
        /// Panics if the label is already bound.
        #[track_caller]
        pub fn bind_at(&mut self, section: SectionKind, label: Label) {
            let pos = Position { section, offset: self.offset_at(section) };
            let target = self.buf.section(section).address_of(pos.offset);

            let info = &mut self.labels[label.0];
            let fixups = match core::mem::replace(&mut info.state, LabelState::Bound(pos)) {
                LabelState::Unbound(fixups) => fixups,
                LabelState::Bound(_) => panic!("label '{}' is bound twice", info.name),
            };

            trace!("binding {} at {target:#x}, {} fix-up(s)", info.name, fixups.len());

            for fixup in fixups {
                self.buf.patch_at(fixup.section, fixup.offset, target);
            }

            // control may now arrive from elsewhere, a preceding fence must stay whole
            self.buf.last_barrier = None;
        }
    }

    /// Target address for a sequence about to be emitted at the write cursor of
    /// `section` that refers to `label`.
    ///
    /// Unbound labels record a fix-up for that sequence and yield the cursor itself, so
    /// the placeholder encodes a zero offset.
    pub(crate) fn label_target_at(&mut self, section: SectionKind, label: Label) -> u64 {
        let offset = self.offset_at(section);
        let info = &mut self.labels[label.0];
        match &mut info.state {
            LabelState::Bound(pos) => self.buf.section(pos.section).address_of(pos.offset),
            LabelState::Unbound(fixups) => {
                trace!("fix-up for {} at {section}+{offset:#x}", info.name);
                fixups.push(Position { section, offset });
                self.buf.section(section).address_of(offset)
            }
        }
    }

    /// Signed distance from the write cursor of `section` to `target`.
    #[inline(always)]
    pub(crate) fn distance_at(&self, section: SectionKind, target: u64) -> i64 {
        target.wrapping_sub(self.pc_at(section)) as _
    }

    /// Distance from the word `words` instructions past the cursor to `target`.
    #[inline(always)]
    pub(crate) fn distance_after(&self, section: SectionKind, words: usize, target: u64) -> i64 {
        let pc = self.pc_at(section) + (words * INSTRUCTION_SIZE) as u64;
        target.wrapping_sub(pc) as _
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rv64::Reg::*;

    #[test]
    fn offsets_and_pcs() {
        let mut asm = Assembler::new(Config::new().insts_base(0x2000));
        assert_eq!(asm.emit_addi(A0, A0, 1), 0);
        assert_eq!(asm.emit_addi(A0, A0, 1), 4);
        assert_eq!(asm.offset(), 8);
        assert_eq!(asm.pc(), 0x2008);

        asm.position_at_end(SectionKind::Stubs);
        assert_eq!(asm.pc(), asm.stubs().base());
    }

    #[test]
    fn raw_bytes_share_the_cursor() {
        let mut asm = Assembler::default();
        asm.emit_addi(A0, A0, 1);
        assert_eq!(asm.emit_bytes(0xdead_beef_u32), 4);
        assert_eq!(asm.emit_bytes(&[1u8, 2, 3, 4]), 8);
        assert_eq!(asm.insts().word_at(4), 0xdead_beef);
        assert_eq!(asm.insts().word_at(8), 0x0403_0201);
    }

    #[test]
    fn unbound_label_fails_finish() {
        let mut asm = Assembler::default();
        let l = asm.new_named_label("exit");
        asm.emit_j_label(l);

        let err = asm.finish().unwrap_err();
        assert!(matches!(err, FinishError::UnboundLabels { .. }));
        assert!(err.to_string().contains("unbound label 'exit'"));
    }

    #[test]
    fn insts_overflow_fails_finish() {
        let mut asm = Assembler::new(Config::new().insts_capacity(4));
        asm.emit_addi(A0, A0, 1);
        asm.emit_addi(A0, A0, 1);

        let err = asm.finish().unwrap_err();
        assert!(matches!{
            err,
            FinishError::Emit(EmitError::BufferExhausted { section: SectionKind::Insts, requested: 8, remaining: 4 })
        });
    }

    #[test]
    #[should_panic(expected = "bound twice")]
    fn double_bind_panics() {
        let mut asm = Assembler::default();
        let l = asm.new_label();
        asm.bind(l);
        asm.bind(l);
    }
}
