//! Relocation records attached to emitted sequences

use crate::asm::buffer::SectionKind;

/// Why an address-shaped sequence was emitted.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum RelocationTag {
    /// Plain constant; nothing to recompute when code moves
    None,
    /// Absolute address of something outside the buffer
    ExternalWord,
    /// Address of something inside the buffer
    InternalWord,
    /// Call into runtime code
    RuntimeCall,
    /// Call to a statically bound method
    StaticCall,
    /// Start of a trampoline stub
    TrampolineStub,
}

impl RelocationTag {
    /// Does the target stay put when the buffer moves?
    #[inline(always)]
    pub const fn is_external(self) -> bool {
        matches!(self, Self::ExternalWord | Self::RuntimeCall | Self::StaticCall)
    }

    #[inline(always)]
    pub const fn is_call(self) -> bool {
        matches!(self, Self::RuntimeCall | Self::StaticCall)
    }
}

/// Out-of-band record pairing a tag with the sequence it describes.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub struct Relocation {
    pub section: SectionKind,
    /// Offset of the first instruction of the sequence within `section`
    pub offset: u64,
    pub tag: RelocationTag,
}
