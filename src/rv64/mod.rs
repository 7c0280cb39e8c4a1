//! RV64GC register files, rounding modes, CSR numbers and the instruction table

use core::fmt;

pub mod table;
pub mod encode;

pub use table::{Op, Format, Layout};

/// Anything that occupies a 5-bit register field.
pub trait Register: Copy + fmt::Debug {
    /// Lives in the integer register file
    const INTEGER: bool;

    fn encoding(self) -> u32;

    /// Is this the integer register `reg`?
    #[inline(always)]
    fn is(self, reg: Reg) -> bool {
        Self::INTEGER && self.encoding() == reg.as_u32()
    }
}

/// Integer registers, by ABI name.
#[repr(u8)]
#[derive(Eq, Ord, Hash, Copy, Clone, Debug, PartialEq, PartialOrd)]
pub enum Reg {
    ZERO = 0,
    RA   = 1,
    SP   = 2,
    GP   = 3,
    TP   = 4,
    T0   = 5,
    T1   = 6,
    T2   = 7,
    S0   = 8,
    S1   = 9,
    A0   = 10,
    A1   = 11,
    A2   = 12,
    A3   = 13,
    A4   = 14,
    A5   = 15,
    A6   = 16,
    A7   = 17,
    S2   = 18,
    S3   = 19,
    S4   = 20,
    S5   = 21,
    S6   = 22,
    S7   = 23,
    S8   = 24,
    S9   = 25,
    S10  = 26,
    S11  = 27,
    T3   = 28,
    T4   = 29,
    T5   = 30,
    T6   = 31,
}

impl Reg {
    /// Frame pointer alias of `s0`
    pub const FP: Reg = Reg::S0;

    const ALL: [Reg; 32] = {
        use Reg::*;
        [
            ZERO, RA, SP, GP, TP, T0, T1, T2,
            S0, S1, A0, A1, A2, A3, A4, A5,
            A6, A7, S2, S3, S4, S5, S6, S7,
            S8, S9, S10, S11, T3, T4, T5, T6,
        ]
    };

    /// Register named by a 5-bit field value.
    #[inline(always)]
    pub const fn from_u32(n: u32) -> Reg {
        Self::ALL[(n & 0x1f) as usize]
    }

    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self as u8 as u32
    }
}

impl Register for Reg {
    const INTEGER: bool = true;

    #[inline(always)]
    fn encoding(self) -> u32 {
        self.as_u32()
    }
}

/// Floating-point registers, by ABI name.
#[repr(u8)]
#[derive(Eq, Ord, Hash, Copy, Clone, Debug, PartialEq, PartialOrd)]
pub enum FReg {
    FT0  = 0,
    FT1  = 1,
    FT2  = 2,
    FT3  = 3,
    FT4  = 4,
    FT5  = 5,
    FT6  = 6,
    FT7  = 7,
    FS0  = 8,
    FS1  = 9,
    FA0  = 10,
    FA1  = 11,
    FA2  = 12,
    FA3  = 13,
    FA4  = 14,
    FA5  = 15,
    FA6  = 16,
    FA7  = 17,
    FS2  = 18,
    FS3  = 19,
    FS4  = 20,
    FS5  = 21,
    FS6  = 22,
    FS7  = 23,
    FS8  = 24,
    FS9  = 25,
    FS10 = 26,
    FS11 = 27,
    FT8  = 28,
    FT9  = 29,
    FT10 = 30,
    FT11 = 31,
}

impl Register for FReg {
    const INTEGER: bool = false;

    #[inline(always)]
    fn encoding(self) -> u32 {
        self as u8 as u32
    }
}

/// Static rounding modes of the F/D extensions (`rm` field, bits `[14:12]`).
#[repr(u8)]
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum RoundingMode {
    /// Round to nearest, ties to even
    Rne = 0b000,
    /// Round towards zero
    Rtz = 0b001,
    /// Round down
    Rdn = 0b010,
    /// Round up
    Rup = 0b011,
    /// Round to nearest, ties to max magnitude
    Rmm = 0b100,
    /// Use the mode held in `frm`
    Dyn = 0b111,
}

impl RoundingMode {
    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self as u8 as u32
    }
}

/// CSR numbers used by the pseudo-instructions.
pub mod csr {
    pub const FFLAGS  : u16 = 0x001;
    pub const FRM     : u16 = 0x002;
    pub const FCSR    : u16 = 0x003;
    pub const CYCLE   : u16 = 0xc00;
    pub const TIME    : u16 = 0xc01;
    pub const INSTRET : u16 = 0xc02;
}
