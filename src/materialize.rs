//! Address materialization strategies
//!
//! Picking a strategy is a pure function of the distance between the emitting
//! instruction and the target (or, for patchable sites, of the code-cache bounds).
//! The `*_split` functions give the immediate fields each sequence carries, and the
//! `*_join` functions decode them back. Emission and patching both go through the same
//! split, so re-patching a sequence with its current target rewrites identical bits.

use crate::bits;

/// Lowest offset a `jal` can encode.
pub const JAL_MIN: i64 = -(1 << 20);
/// Highest offset a `jal` can encode.
pub const JAL_MAX: i64 = (1 << 20) - 2;

/// Lowest offset a conditional branch can encode.
pub const BRANCH_MIN: i64 = -(1 << 12);
/// Highest offset a conditional branch can encode.
pub const BRANCH_MAX: i64 = (1 << 12) - 2;

/// Lowest offset an `auipc` pair reaches: `-(2 GiB + 2 KiB)`.
pub const PCREL_MIN: i64 = -(1 << 31) - (1 << 11);
/// Highest offset an `auipc` pair reaches: `2 GiB - 2 KiB - 1`.
pub const PCREL_MAX: i64 = (1 << 31) - (1 << 11) - 1;

/// Addresses `movptr` can hold are below this bound.
///
/// The `lui` field carries target[46:28] plus the carry out of target[27] and is
/// sign-extended by the hardware, so the top `2^27` bytes of the 47-bit range round up
/// into bit 47 and are left to `li64`.
pub const MOVPTR_LIMIT: u64 = (1 << 47) - (1 << 27);

pub const PCREL_WORDS  : usize = 2;
pub const LI32_WORDS   : usize = 2;
pub const MOVPTR_WORDS : usize = 6;
pub const LI64_WORDS   : usize = 8;

/// How an address gets into a register, or into a branch.
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum Strategy {
    /// `base + imm12` folded into the memory instruction itself
    BaseOffset,
    /// A single `jal` or conditional branch
    PcRel21,
    /// `auipc` + `addi`/`jalr`/load/store
    PcRel32,
    /// `lui` + `addiw`, or `lui` + `add` onto a base register
    Abs32,
    /// `lui, addi, slli 11, addi, slli 5` + `addi`/`jalr`/load/store
    Movptr,
    /// `lui, addi, slli 12, addi, slli 12, addi, slli 8, addi`
    Li64,
}

impl Strategy {
    /// Number of instruction words the strategy adds in front of the consumer.
    #[inline(always)]
    pub const fn words(self) -> usize {
        match self {
            Self::BaseOffset => 0,
            Self::PcRel21    => 1,
            Self::PcRel32    => PCREL_WORDS,
            Self::Abs32      => LI32_WORDS,
            Self::Movptr     => MOVPTR_WORDS,
            Self::Li64       => LI64_WORDS,
        }
    }

    /// Cheapest way to jump from `pc` to `target`.
    #[inline]
    pub const fn for_jump(pc: u64, target: u64) -> Strategy {
        let distance = target.wrapping_sub(pc) as i64;
        if jal_reaches(distance) {
            Self::PcRel21
        } else if pcrel_reaches(distance) {
            Self::PcRel32
        } else {
            Self::absolute(target)
        }
    }

    /// Cheapest way to get `target` into a register at `pc`.
    #[inline]
    pub const fn for_address(pc: u64, target: u64) -> Strategy {
        if pcrel_reaches(target.wrapping_sub(pc) as i64) {
            Self::PcRel32
        } else {
            Self::absolute(target)
        }
    }

    /// Strategy for a site whose target may move later.
    ///
    /// The pc-relative pair is only chosen when every address in `[low, high)` can reach
    /// `target` with it, so the site stays patchable wherever the code ends up.
    #[inline]
    pub const fn for_patchable(target: u64, low: u64, high: u64) -> Strategy {
        let from_high = target.wrapping_sub(high) as i64;
        let from_low = target.wrapping_sub(low) as i64;
        if from_high >= PCREL_MIN && from_low <= PCREL_MAX {
            Self::PcRel32
        } else {
            Self::absolute(target)
        }
    }

    /// Absolute load of `target`: `movptr` when it holds the address, `li64` otherwise.
    #[inline(always)]
    pub const fn absolute(target: u64) -> Strategy {
        if movptr_reaches(target) {
            Self::Movptr
        } else {
            Self::Li64
        }
    }

    /// Strategy for a displacement added to a base register.
    ///
    /// The `lui` form splits like an `auipc` pair, so it covers the same window.
    #[inline]
    pub const fn for_displacement(offset: i64) -> Strategy {
        if bits::is_imm_in_range(offset, 12, 0) {
            Self::BaseOffset
        } else if pcrel_reaches(offset) {
            Self::Abs32
        } else {
            Self::Li64
        }
    }
}

#[inline(always)]
pub const fn jal_reaches(distance: i64) -> bool {
    bits::is_imm_in_range(distance, 20, 1)
}

#[inline(always)]
pub const fn branch_reaches(distance: i64) -> bool {
    bits::is_imm_in_range(distance, 12, 1)
}

#[inline(always)]
pub const fn pcrel_reaches(distance: i64) -> bool {
    distance >= PCREL_MIN && distance <= PCREL_MAX
}

#[inline(always)]
pub const fn movptr_reaches(target: u64) -> bool {
    target < MOVPTR_LIMIT
}

// ----- PC-RELATIVE PAIR -----

/// Immediates of an `auipc` pair.
#[derive(Eq, Copy, Clone, Debug, PartialEq)]
pub struct PcRel {
    /// `auipc` field, biased by `0x800` so that `lo12` can be signed
    pub hi20: i32,
    pub lo12: i32,
}

/// Split a pc-relative offset into `auipc` + low 12 bits.
///
/// # Example
/// ```
/// use rvjit::materialize::{pcrel_split, pcrel_join};
///
/// let parts = pcrel_split(0x1800);
/// assert_eq!((parts.hi20, parts.lo12), (2, -0x800));
/// assert_eq!(pcrel_join(parts.hi20, parts.lo12), 0x1800);
/// ```
#[track_caller]
#[inline]
pub fn pcrel_split(offset: i64) -> PcRel {
    assert!(pcrel_reaches(offset), "offset {offset:#x} is out of auipc reach");
    PcRel {
        hi20: bits::sext((offset + 0x800) >> 12, 20) as _,
        lo12: bits::sext(offset, 12) as _,
    }
}

#[inline(always)]
pub const fn pcrel_join(hi20: i32, lo12: i32) -> i64 {
    ((hi20 as i64) << 12) + lo12 as i64
}

// ----- LI32: lui + addiw -----

#[derive(Eq, Copy, Clone, Debug, PartialEq)]
pub struct Li32 {
    pub lui: i32,
    pub lo12: i32,
}

#[inline]
pub const fn li32_split(imm: i32) -> Li32 {
    let lo12 = bits::sext(imm as _, 12) as i32;
    let upper = imm.wrapping_sub(lo12);
    Li32 { lui: upper >> 12, lo12 }
}

/// Value a `lui` + `addiw` pair leaves in its register.
#[inline(always)]
pub const fn li32_join(lui: i32, lo12: i32) -> i64 {
    ((lui << 12).wrapping_add(lo12)) as i64
}

// ----- MOVPTR: 6 instructions, addresses below MOVPTR_LIMIT -----

#[derive(Eq, Copy, Clone, Debug, PartialEq)]
pub struct Movptr {
    /// `lui` field: target[46:28] plus the carry of target[27]
    pub lui: i32,
    /// target[27:16]
    pub hi12: i32,
    /// target[15:5]
    pub mid11: i32,
    /// target[4:0], carried by the consumer instruction
    pub lo5: i32,
}

/// Split an address for the `movptr` sequence.
///
/// # Example
/// ```
/// use rvjit::materialize::{movptr_split, movptr_join};
///
/// let target = 0x7fff_dead_beef;
/// let m = movptr_split(target);
/// assert_eq!(movptr_join(m.lui, m.hi12, m.mid11, m.lo5), target);
/// ```
#[track_caller]
#[inline]
pub fn movptr_split(target: u64) -> Movptr {
    assert!(movptr_reaches(target), "address {target:#x} is out of movptr reach");
    let target = target as i64;
    let lower = bits::sext(target, 28);
    let upper = (target - lower) >> 28;
    Movptr {
        lui: upper as _,
        hi12: (lower >> 16) as _,
        mid11: ((lower >> 5) & 0x7ff) as _,
        lo5: (lower & 0x1f) as _,
    }
}

#[inline(always)]
pub const fn movptr_join(lui: i32, hi12: i32, mid11: i32, lo5: i32) -> u64 {
    // `lui` sign-extends, so a field with bit 19 set lands in the upper half
    let target = ((lui as i64) << 28)
        + ((hi12 as i64) << 16)
        + ((mid11 as i64) << 5)
        + lo5 as i64;
    target as u64
}

// ----- LI64: 8 instructions, any 64-bit value -----

#[derive(Eq, Copy, Clone, Debug, PartialEq)]
pub struct Li64 {
    pub lui: i32,
    /// added before the first `slli 12`
    pub a1: i32,
    /// added before the second `slli 12`
    pub a2: i32,
    /// added before `slli 8`
    pub a3: i32,
    /// low byte, always non-negative
    pub a4: i32,
}

/// Split a 64-bit literal for the `li64` sequence.
///
/// # Example
/// ```
/// use rvjit::materialize::{li64_split, li64_join};
///
/// for imm in [0, -1, 0x1234_5678_9abc_def0, i64::MIN, 0xff_ffff_ffff] {
///     let p = li64_split(imm);
///     assert_eq!(li64_join(p.lui, p.a1, p.a2, p.a3, p.a4), imm);
/// }
/// ```
#[inline]
pub const fn li64_split(imm: i64) -> Li64 {
    let lower = imm & 0xffff_ffff;
    let lower = lower - bits::sext(lower, 20);
    let tmp = ((imm as u64 & 0xffff_ffff_0000_0000).wrapping_add(lower as u64)) as i64;
    let upper = (tmp.wrapping_sub(lower as i32 as i64) >> 32) as i32;

    let lo = bits::sext(upper as _, 12) as i32;
    let up = upper.wrapping_sub(lo);

    Li64 {
        lui: up >> 12,
        a1: lo,
        a2: (lower as i32) >> 20,
        a3: bits::sext(imm >> 8, 12) as _,
        a4: (imm & 0xff) as _,
    }
}

#[inline(always)]
pub const fn li64_join(lui: i32, a1: i32, a2: i32, a3: i32, a4: i32) -> i64 {
    ((lui as i64 & 0xfffff) << 44)
        .wrapping_add((a1 as i64) << 32)
        .wrapping_add((a2 as i64) << 20)
        .wrapping_add((a3 as i64) << 8)
        .wrapping_add(a4 as i64)
}
