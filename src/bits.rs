//! Bit-field codec over 32-bit instruction words
//!
//! Every encoder, decoder and patcher in the crate goes through these helpers, so field
//! boundaries are always given as inclusive `[msb, lsb]` bit positions, matching the
//! layout tables in the RISC-V manual (e.g. opcode is always `[6, 0]`).

use crate::util::misc;

pub const INSTRUCTION_SIZE: usize = 4;

#[inline(always)]
const fn field_mask(width: u32) -> u32 {
    if width >= 32 { u32::MAX } else { (1 << width) - 1 }
}

/// Unsigned value of bits `[lsb, msb]` of `word`.
///
/// # Example
/// ```
/// use rvjit::bits::extract;
///
/// let addi = 0x00150513; // addi a0, a0, 1
/// assert_eq!(extract(addi, 6, 0), 0x13);   // opcode
/// assert_eq!(extract(addi, 11, 7), 10);    // rd = a0
/// assert_eq!(extract(addi, 31, 20), 1);    // imm
/// ```
#[inline(always)]
pub const fn extract(word: u32, msb: u32, lsb: u32) -> u32 {
    debug_assert!(msb < 32 && lsb <= msb);
    (word >> lsb) & field_mask(msb - lsb + 1)
}

/// Bits `[lsb, msb]` of `word`, sign-extended from bit `msb`.
///
/// # Example
/// ```
/// use rvjit::bits::sextract;
///
/// let addi = 0xfff50513; // addi a0, a0, -1
/// assert_eq!(sextract(addi, 31, 20), -1);
/// assert_eq!(sextract(addi, 11, 7), 10);
/// ```
#[inline(always)]
pub const fn sextract(word: u32, msb: u32, lsb: u32) -> i32 {
    debug_assert!(msb < 32 && lsb <= msb);
    let width = msb - lsb + 1;
    ((word << (31 - msb)) as i32) >> (32 - width)
}

/// Return `word` with bits `[lsb, msb]` replaced by `value`.
///
/// Panics if `value` needs more than `msb - lsb + 1` bits.
#[track_caller]
#[inline(always)]
pub fn insert(word: u32, msb: u32, lsb: u32, value: u32) -> u32 {
    debug_assert!(msb < 32 && lsb <= msb);
    let mask = field_mask(msb - lsb + 1);
    assert!{
        value & !mask == 0,
        "value {value:#x} does not fit into bits [{msb}:{lsb}]"
    };

    (word & !(mask << lsb)) | (value << lsb)
}

/// Overwrite bits `[lsb, msb]` of the little-endian word at the start of `code`.
///
/// Only the first four bytes of `code` are touched.
///
/// # Example
/// ```
/// use rvjit::bits::{patch, read_word};
///
/// let mut code = 0x00000013u32.to_le_bytes(); // nop
/// patch(&mut code, 31, 20, 0x7ff);
/// assert_eq!(read_word(&code), 0x7ff00013);   // addi x0, x0, 2047
/// ```
#[track_caller]
#[inline]
pub fn patch(code: &mut [u8], msb: u32, lsb: u32, value: u32) {
    let word = read_word(code);
    write_word(code, insert(word, msb, lsb, value))
}

#[track_caller]
#[inline(always)]
pub fn read_word(code: &[u8]) -> u32 {
    misc::le_bytes_into_int::<u32>(&code[..INSTRUCTION_SIZE])
}

#[track_caller]
#[inline(always)]
pub fn write_word(code: &mut [u8], word: u32) {
    code[..INSTRUCTION_SIZE].copy_from_slice(&word.to_le_bytes())
}

/// Sign-extend the low `bits` bits of `value`.
#[inline(always)]
pub const fn sext(value: i64, bits: u32) -> i64 {
    let shift = 64 - bits;
    (value << shift) >> shift
}

/// Is `value` a signed `bits`-bit quantity whose low `align_bits` bits are zero?
///
/// Branch offsets use `align_bits = 1`: a 13-bit field stores offsets in `[-4096, 4094]`.
///
/// # Example
/// ```
/// use rvjit::bits::is_imm_in_range;
///
/// assert!(is_imm_in_range(2047, 12, 0));
/// assert!(!is_imm_in_range(2048, 12, 0));
/// assert!(is_imm_in_range(-4096, 12, 1));
/// assert!(!is_imm_in_range(4095, 12, 1)); // odd
/// ```
#[inline(always)]
pub const fn is_imm_in_range(value: i64, bits: u32, align_bits: u32) -> bool {
    let sign_bits = value >> (bits + align_bits - 1);
    value & ((1 << align_bits) - 1) == 0 && (sign_bits == 0 || sign_bits == -1)
}

/// Is `value` an unsigned `bits`-bit quantity whose low `align_bits` bits are zero?
#[inline(always)]
pub const fn is_unsigned_imm_in_range(value: i64, bits: u32, align_bits: u32) -> bool {
    value >= 0 && value >> (bits + align_bits) == 0 && value & ((1 << align_bits) - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // (msb, lsb) of every field family the encoders use
    const FIELDS: &[(u32, u32)] = &[
        (6, 0), (11, 7), (14, 12), (19, 15), (24, 20), (31, 25),
        (31, 20), (31, 12), (31, 27), (26, 25), (27, 24), (23, 20),
        (31, 31), (30, 25), (11, 8), (7, 7), (30, 21), (20, 20), (19, 12),
        (25, 20), (31, 0),
    ];

    fn samples(width: u32) -> Vec<u32> {
        let max = field_mask(width);
        let mut v = vec![0, 1, max, max >> 1, (max >> 1) + 1];
        let mut x = 0x9e37_79b9u32;
        for _ in 0..32 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            v.push(x & max);
        }
        v
    }

    #[test]
    fn extract_inverts_insert() {
        for &(msb, lsb) in FIELDS {
            for value in samples(msb - lsb + 1) {
                for background in [0, u32::MAX, 0xdead_beef] {
                    let word = insert(background, msb, lsb, value);
                    assert_eq!(extract(word, msb, lsb), value, "[{msb}:{lsb}] = {value:#x}");

                    let outside = !(field_mask(msb - lsb + 1) << lsb);
                    assert_eq!(word & outside, background & outside);
                }
            }
        }
    }

    #[test]
    fn patch_touches_one_word() {
        let mut code = [0xaau8; 12];
        patch(&mut code[4..], 31, 20, 0x123);
        assert_eq!(&code[..4], &[0xaa; 4]);
        assert_eq!(&code[8..], &[0xaa; 4]);
        assert_eq!(extract(read_word(&code[4..]), 31, 20), 0x123);
        assert_eq!(extract(read_word(&code[4..]), 19, 0), 0xaaaaa);
    }

    #[test]
    fn sextract_sign_extends_from_msb() {
        assert_eq!(sextract(0x8000_0000, 31, 31), -1);
        assert_eq!(sextract(0x0000_0800, 11, 0), -2048);
        assert_eq!(sextract(0x0000_07ff, 11, 0), 2047);
        assert_eq!(sextract(0xfffff000, 31, 12), -1);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn insert_rejects_wide_value() {
        _ = insert(0, 11, 7, 32);
    }

    #[test]
    fn imm_ranges() {
        assert!(is_imm_in_range(-2048, 12, 0));
        assert!(!is_imm_in_range(-2049, 12, 0));
        assert!(is_imm_in_range((1 << 20) - 2, 20, 1));
        assert!(!is_imm_in_range(1 << 20, 20, 1));
        assert!(is_imm_in_range(-(1 << 20), 20, 1));
        assert!(is_unsigned_imm_in_range((1 << 48) - 1, 48, 0));
        assert!(!is_unsigned_imm_in_range(1 << 48, 48, 0));
        assert!(!is_unsigned_imm_in_range(-1, 48, 0));
        assert_eq!(sext(0xfff, 12), -1);
        assert_eq!(sext(0x7ff, 12), 2047);
    }
}
