//! Patch engine: recognize an emitted sequence, rewrite its target, or read it back
//!
//! All three entry points take the code starting at the sequence and the runtime address
//! `pc` of its first instruction. Only immediate fields are ever rewritten, so the number
//! and kind of instructions never change.

pub mod native;

use crate::bits::{self, INSTRUCTION_SIZE};
use crate::rv64::encode;
use crate::materialize::{
    self,
    LI32_WORDS,
    LI64_WORDS,
    MOVPTR_WORDS,
    PCREL_WORDS,
};

use core::fmt;

use log::trace;

/// Shape of a patchable sequence.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum Pattern {
    /// `jal`
    Jal,
    /// `beq`/`bne`/`blt`/`bge`/`bltu`/`bgeu`
    Branch,
    /// `auipc` + address consumer
    PcRelative,
    /// `lui, addi, slli, addi, slli` + address consumer
    Movptr,
    /// `lui, addi, slli, addi, slli, addi, slli, addi`
    Li64,
    /// `lui` + `addiw`
    Li32,
}

impl Pattern {
    /// Number of instruction words the pattern spans.
    #[inline(always)]
    pub const fn words(self) -> usize {
        match self {
            Self::Jal | Self::Branch => 1,
            Self::PcRelative => PCREL_WORDS,
            Self::Movptr     => MOVPTR_WORDS,
            Self::Li64       => LI64_WORDS,
            Self::Li32       => LI32_WORDS,
        }
    }

    #[inline(always)]
    pub const fn len(self) -> usize {
        self.words() * INSTRUCTION_SIZE
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Jal        => "jal",
            Self::Branch     => "branch",
            Self::PcRelative => "auipc pair",
            Self::Movptr     => "movptr",
            Self::Li64       => "li64",
            Self::Li32       => "li32",
        };
        f.write_str(s)
    }
}

/// Which pattern starts at `code`, if any.
///
/// # Example
/// ```
/// use rvjit::patch::{classify, Pattern};
///
/// let beq = 0x00b50863u32.to_le_bytes(); // beq a0, a1, .+16
/// assert_eq!(classify(&beq), Some(Pattern::Branch));
/// assert_eq!(classify(&0x00000013u32.to_le_bytes()), None); // nop
/// ```
pub fn classify(code: &[u8]) -> Option<Pattern> {
    let word = bits::read_word(code.get(..INSTRUCTION_SIZE)?);
    if native::is_jal(word) {
        Some(Pattern::Jal)
    } else if native::is_branch(word) {
        Some(Pattern::Branch)
    } else if native::is_pc_relative_at(code) {
        Some(Pattern::PcRelative)
    } else if native::is_movptr_at(code) {
        Some(Pattern::Movptr)
    } else if native::is_li64_at(code) {
        Some(Pattern::Li64)
    } else if native::is_li32_at(code) {
        Some(Pattern::Li32)
    } else {
        None
    }
}

#[track_caller]
#[inline]
fn expect_pattern(code: &[u8], pc: u64) -> Pattern {
    match classify(code) {
        Some(p) => p,
        None => {
            let word = code.get(..INSTRUCTION_SIZE).map(bits::read_word).unwrap_or_default();
            panic!("unrecognized instruction pattern {word:#010x} at {pc:#x}")
        }
    }
}

#[inline(always)]
fn word_mut(code: &mut [u8], index: usize) -> &mut [u8] {
    &mut code[index * INSTRUCTION_SIZE..]
}

#[inline(always)]
fn word(code: &[u8], index: usize) -> u32 {
    bits::read_word(&code[index * INSTRUCTION_SIZE..])
}

#[inline(always)]
fn patch_upper(code: &mut [u8], imm20: i32) {
    bits::patch(code, 31, 12, imm20 as u32 & 0xfffff)
}

#[inline(always)]
fn patch_imm12(code: &mut [u8], imm12: i32) {
    bits::patch(code, 31, 20, imm12 as u32 & 0xfff)
}

/// Point the sequence at `code` (living at `pc`) to `target`.
///
/// Returns the number of bytes rewritten. Panics if no known pattern starts at `code` or
/// if `target` is outside the reach of the pattern found there.
///
/// # Example
/// ```
/// use rvjit::patch::{patch, recover};
///
/// let mut code = 0x0000006fu32.to_le_bytes(); // j .
/// assert_eq!(patch(&mut code, 0x1000, 0x1800), 4);
/// assert_eq!(recover(&code, 0x1000), 0x1800);
/// ```
#[track_caller]
pub fn patch(code: &mut [u8], pc: u64, target: u64) -> usize {
    let pattern = expect_pattern(code, pc);
    let offset = target.wrapping_sub(pc) as i64;

    trace!("patching {pattern} at {pc:#x} -> {target:#x}");

    match pattern {
        Pattern::Jal => {
            assert!(materialize::jal_reaches(offset), "jal at {pc:#x} cannot reach {target:#x}");
            let w = bits::read_word(code);
            bits::write_word(code, encode::set_jal_offset(w, offset))
        }

        Pattern::Branch => {
            assert!(materialize::branch_reaches(offset), "branch at {pc:#x} cannot reach {target:#x}");
            let w = bits::read_word(code);
            bits::write_word(code, encode::set_branch_offset(w, offset))
        }

        Pattern::PcRelative => {
            let parts = materialize::pcrel_split(offset);
            patch_upper(code, parts.hi20);
            native::set_consumer_imm(word_mut(code, 1), parts.lo12)
        }

        Pattern::Movptr => {
            let m = materialize::movptr_split(target);
            patch_upper(code, m.lui);
            patch_imm12(word_mut(code, 1), m.hi12);
            patch_imm12(word_mut(code, 3), m.mid11);
            native::set_consumer_imm(word_mut(code, 5), m.lo5)
        }

        Pattern::Li64 => {
            let p = materialize::li64_split(target as i64);
            patch_upper(code, p.lui);
            patch_imm12(word_mut(code, 1), p.a1);
            patch_imm12(word_mut(code, 3), p.a2);
            patch_imm12(word_mut(code, 5), p.a3);
            patch_imm12(word_mut(code, 7), p.a4)
        }

        Pattern::Li32 => {
            let value = target as i64;
            assert!{
                bits::is_imm_in_range(value, 32, 0),
                "li32 at {pc:#x} cannot hold {target:#x}"
            };

            let p = materialize::li32_split(value as i32);
            patch_upper(code, p.lui);
            patch_imm12(word_mut(code, 1), p.lo12)
        }
    }

    pattern.len()
}

/// Target currently encoded by the sequence at `code` (living at `pc`).
///
/// Panics if no known pattern starts at `code`.
///
/// # Example
/// ```
/// use rvjit::patch::recover;
///
/// let beq = 0x00b50863u32.to_le_bytes(); // beq a0, a1, .+16
/// assert_eq!(recover(&beq, 0x1000), 0x1010);
/// ```
#[track_caller]
pub fn recover(code: &[u8], pc: u64) -> u64 {
    match expect_pattern(code, pc) {
        Pattern::Jal => pc.wrapping_add(encode::jal_offset(word(code, 0)) as u64),

        Pattern::Branch => pc.wrapping_add(encode::branch_offset(word(code, 0)) as u64),

        Pattern::PcRelative => {
            let hi20 = bits::sextract(word(code, 0), 31, 12);
            let lo12 = native::consumer_imm(word(code, 1));
            pc.wrapping_add(materialize::pcrel_join(hi20, lo12) as u64)
        }

        Pattern::Movptr => materialize::movptr_join(
            bits::sextract(word(code, 0), 31, 12),
            bits::sextract(word(code, 1), 31, 20),
            bits::sextract(word(code, 3), 31, 20),
            native::consumer_imm(word(code, 5)),
        ),

        Pattern::Li64 => materialize::li64_join(
            bits::sextract(word(code, 0), 31, 12),
            bits::sextract(word(code, 1), 31, 20),
            bits::sextract(word(code, 3), 31, 20),
            bits::sextract(word(code, 5), 31, 20),
            bits::sextract(word(code, 7), 31, 20),
        ) as u64,

        Pattern::Li32 => materialize::li32_join(
            bits::sextract(word(code, 0), 31, 12),
            bits::sextract(word(code, 1), 31, 20),
        ) as u64,
    }
}
