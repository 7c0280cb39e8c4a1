//! Labels and their pending fix-ups

use crate::asm::buffer::SectionKind;

use core::panic;

use smallvec::SmallVec;

/// Handle to a position in the code buffer, possibly not known yet.
#[derive(Eq, Ord, Hash, Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Label(pub(crate) usize);

/// Section-relative location of an instruction.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub struct Position {
    pub section: SectionKind,
    pub offset: u64,
}

#[derive(Debug)]
pub(crate) enum LabelState {
    /// Sequences waiting for the label, patched at bind time
    Unbound(SmallVec<[Position; 4]>),
    Bound(Position),
}

#[derive(Debug)]
pub(crate) struct LabelInfo {
    pub(crate) name: String,
    pub(crate) state: LabelState,
    /// Where the label was created, reported if it is never bound
    pub(crate) caller_loc: &'static panic::Location<'static>,
}

impl LabelInfo {
    #[inline(always)]
    pub(crate) fn position(&self) -> Option<Position> {
        match self.state {
            LabelState::Bound(pos) => Some(pos),
            LabelState::Unbound(_) => None,
        }
    }
}
