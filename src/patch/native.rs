//! Predicates over emitted instruction words
//!
//! Each `is_*_at` check looks at a whole sequence and requires the registers to chain
//! (the destination of one step is the source of the next), so a random run of `lui`s and
//! `addi`s is never mistaken for a materialization sequence.

use crate::bits::{self, INSTRUCTION_SIZE};
use crate::util::opcode::Opcode;
use crate::materialize::{LI32_WORDS, LI64_WORDS, MOVPTR_WORDS, PCREL_WORDS};

#[inline(always)]
pub const fn opcode(word: u32) -> u32 { bits::extract(word, 6, 0) }

#[inline(always)]
pub const fn rd(word: u32) -> u32 { bits::extract(word, 11, 7) }

#[inline(always)]
pub const fn funct3(word: u32) -> u32 { bits::extract(word, 14, 12) }

#[inline(always)]
pub const fn rs1(word: u32) -> u32 { bits::extract(word, 19, 15) }

#[inline(always)]
pub const fn rs2(word: u32) -> u32 { bits::extract(word, 24, 20) }

#[inline(always)]
const fn has_opcode(word: u32, opcode: Opcode) -> bool {
    self::opcode(word) == opcode.as_u32()
}

#[inline(always)]
pub const fn is_jal(word: u32) -> bool { has_opcode(word, Opcode::Jal) }

#[inline(always)]
pub const fn is_branch(word: u32) -> bool { has_opcode(word, Opcode::Branch) }

#[inline(always)]
pub const fn is_fence(word: u32) -> bool {
    has_opcode(word, Opcode::MiscMem) && funct3(word) == 0
}

#[inline(always)]
pub const fn is_auipc(word: u32) -> bool { has_opcode(word, Opcode::Auipc) }

#[inline(always)]
pub const fn is_lui(word: u32) -> bool { has_opcode(word, Opcode::Lui) }

#[inline(always)]
pub const fn is_jalr(word: u32) -> bool {
    has_opcode(word, Opcode::Jalr) && funct3(word) == 0
}

#[inline(always)]
pub const fn is_addi(word: u32) -> bool {
    has_opcode(word, Opcode::OpImm) && funct3(word) == 0
}

#[inline(always)]
pub const fn is_addiw(word: u32) -> bool {
    has_opcode(word, Opcode::OpImm32) && funct3(word) == 0
}

/// `slli rd, rs1, shamt` with exactly the given shift amount.
#[inline(always)]
pub const fn is_slli_by(word: u32, shamt: u32) -> bool {
    has_opcode(word, Opcode::OpImm)
        && funct3(word) == 0b001
        && bits::extract(word, 31, 26) == 0
        && bits::extract(word, 25, 20) == shamt
}

/// Integer or floating-point load: both carry a 12-bit I-type offset.
#[inline(always)]
pub const fn is_load(word: u32) -> bool {
    has_opcode(word, Opcode::Load) || has_opcode(word, Opcode::LoadFp)
}

/// Integer or floating-point store: both carry a split S-type offset.
#[inline(always)]
pub const fn is_store(word: u32) -> bool {
    has_opcode(word, Opcode::Store) || has_opcode(word, Opcode::StoreFp)
}

/// Instructions that can consume the low part of an address in their 12-bit immediate.
#[inline(always)]
pub const fn is_address_consumer(word: u32) -> bool {
    is_addi(word) || is_jalr(word) || is_load(word) || is_store(word)
}

/// Low 12-bit immediate of an address consumer, whichever layout it uses.
#[inline]
pub const fn consumer_imm(word: u32) -> i32 {
    if is_store(word) {
        (bits::sextract(word, 31, 25) << 5) | bits::extract(word, 11, 7) as i32
    } else {
        bits::sextract(word, 31, 20)
    }
}

/// Overwrite the 12-bit immediate of the address consumer at the start of `code`.
#[track_caller]
#[inline]
pub fn set_consumer_imm(code: &mut [u8], imm: i32) {
    debug_assert!(bits::is_imm_in_range(imm as _, 12, 0));
    let imm = imm as u32 & 0xfff;
    if is_store(bits::read_word(code)) {
        bits::patch(code, 31, 25, imm >> 5);
        bits::patch(code, 11, 7, imm & 0x1f)
    } else {
        bits::patch(code, 31, 20, imm)
    }
}

#[inline(always)]
fn word_at(code: &[u8], index: usize) -> Option<u32> {
    let start = index * INSTRUCTION_SIZE;
    code.get(start..start + INSTRUCTION_SIZE).map(bits::read_word)
}

#[inline]
fn words<const N: usize>(code: &[u8]) -> Option<[u32; N]> {
    let mut out = [0; N];
    for (i, w) in out.iter_mut().enumerate() {
        *w = word_at(code, i)?;
    }
    Some(out)
}

/// `auipc rd` followed by an `addi`/`jalr`/load/store based on `rd`.
pub fn is_pc_relative_at(code: &[u8]) -> bool {
    let Some([auipc, consumer]) = words::<PCREL_WORDS>(code) else {
        return false
    };

    is_auipc(auipc) && is_address_consumer(consumer) && rs1(consumer) == rd(auipc)
}

/// `lui, addi, slli 11, addi, slli 5` followed by an `addi`/`jalr`/load/store,
/// all on the same register.
pub fn is_movptr_at(code: &[u8]) -> bool {
    let Some([lui, addi1, slli1, addi2, slli2, consumer]) = words::<MOVPTR_WORDS>(code) else {
        return false
    };

    if !(is_lui(lui)
        && is_addi(addi1)
        && is_slli_by(slli1, 11)
        && is_addi(addi2)
        && is_slli_by(slli2, 5)
        && is_address_consumer(consumer))
    {
        return false
    }

    let r = rd(lui);
    [addi1, slli1, addi2, slli2].iter().all(|&w| rd(w) == r && rs1(w) == r) && rs1(consumer) == r
}

/// `lui, addi, slli 12, addi, slli 12, addi, slli 8, addi`, all on the same register.
pub fn is_li64_at(code: &[u8]) -> bool {
    let Some(ws) = words::<LI64_WORDS>(code) else {
        return false
    };

    let [lui, a1, s1, a2, s2, a3, s3, a4] = ws;
    if !(is_lui(lui)
        && is_addi(a1) && is_slli_by(s1, 12)
        && is_addi(a2) && is_slli_by(s2, 12)
        && is_addi(a3) && is_slli_by(s3, 8)
        && is_addi(a4))
    {
        return false
    }

    let r = rd(lui);
    ws[1..].iter().all(|&w| rd(w) == r && rs1(w) == r)
}

/// `lui rd` + `addiw rd, rd`.
pub fn is_li32_at(code: &[u8]) -> bool {
    let Some([lui, addiw]) = words::<LI32_WORDS>(code) else {
        return false
    };

    is_lui(lui) && is_addiw(addiw) && rd(addiw) == rd(lui) && rs1(addiw) == rd(lui)
}
