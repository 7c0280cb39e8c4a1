/// RV64GC major opcodes (bits `[6:0]` of every 32-bit instruction).
#[repr(u32)]
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum Opcode {
    /// LOAD        opcode (`0x03`, binary `0000011`) for integer loads (e.g., LB, LWU, LD).
    Load     = 0x03,

    /// LOAD-FP     opcode (`0x07`, binary `0000111`) for FLW/FLD.
    LoadFp   = 0x07,

    /// MISC-MEM    opcode (`0x0F`, binary `0001111`) for FENCE and FENCE.I.
    MiscMem  = 0x0F,

    /// OP-IMM      opcode (`0x13`, binary `0010011`) for immediate operations (e.g., ADDI, SLLI).
    OpImm    = 0x13,

    /// AUIPC       opcode (`0x17`, binary `0010111`) for Add Upper Immediate to PC.
    Auipc    = 0x17,

    /// OP-IMM-32   opcode (`0x1B`, binary `0011011`) for 32-bit immediate operations (e.g., ADDIW, SLLIW, SRLIW, SRAIW).
    OpImm32  = 0x1B,

    /// STORE       opcode (`0x23`, binary `0100011`) for integer stores (e.g., SB, SD).
    Store    = 0x23,

    /// STORE-FP    opcode (`0x27`, binary `0100111`) for FSW/FSD.
    StoreFp  = 0x27,

    /// AMO         opcode (`0x2F`, binary `0101111`) for atomic operations (e.g., LR.W, AMOADD.D).
    Amo      = 0x2F,

    /// OP          opcode (`0x33`, binary `0110011`) for register-register operations (e.g., MUL, ADD).
    Op       = 0x33,

    /// LUI         opcode (`0x37`, binary `0110111`) for Load Upper Immediate.
    Lui      = 0x37,

    /// OP-32       opcode (`0x3B`, binary `0111011`) for 32-bit register-register operations (e.g., ADDW, SUBW, SLLW, SRLW, SRAW).
    Op32     = 0x3B,

    /// MADD        opcode (`0x43`) for FMADD.S/D.
    Madd     = 0x43,

    /// MSUB        opcode (`0x47`) for FMSUB.S/D.
    Msub     = 0x47,

    /// NMSUB       opcode (`0x4B`) for FNMSUB.S/D.
    Nmsub    = 0x4B,

    /// NMADD       opcode (`0x4F`) for FNMADD.S/D.
    Nmadd    = 0x4F,

    /// OP-FP       opcode (`0x53`, binary `1010011`) for floating-point arithmetic, compares, conversions and moves.
    OpFp     = 0x53,

    /// BRANCH      opcode (`0x63`, binary `1100011`) for conditional branches.
    Branch   = 0x63,

    /// JALR        opcode (`0x67`, binary `1100111`) for Jump And Link Register.
    Jalr     = 0x67,

    /// JAL         opcode (`0x6F`, binary `1101111`) for Jump And Link.
    Jal      = 0x6F,

    /// SYSTEM      opcode (`0x73`, binary `1110011`) for ECALL/EBREAK and CSR access.
    System   = 0x73,
}

impl Opcode {
    /// Returns the 7-bit opcode value as a `u32` for instruction encoding.
    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self as _
    }
}

/// Memory ordering bits for A-extension instructions (aq: acquire, rl: release).
#[repr(u8)]
#[derive(Eq, Hash, Copy, Clone, Debug, PartialEq)]
pub enum AqRl {
    /// No ordering constraints       (aq=0, rl=0).
    None           = 0b00,
    /// Release semantics             (aq=0, rl=1).
    Release        = 0b01,
    /// Acquire semantics             (aq=1, rl=0).
    Acquire        = 0b10,
    /// Acquire and release semantics (aq=1, rl=1).
    AcquireRelease = 0b11,
}

impl AqRl {
    /// Returns the 2-bit aq/rl value as a `u32` for instruction encoding.
    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self as u8 as u32
    }

    /// Ordering with only the acquire half kept (what a load-reserved may carry).
    #[inline(always)]
    pub const fn acquire_part(self) -> AqRl {
        match self {
            Self::Acquire | Self::AcquireRelease => Self::Acquire,
            Self::None | Self::Release => Self::None,
        }
    }

    /// Ordering with only the release half kept (what a store-conditional may carry).
    #[inline(always)]
    pub const fn release_part(self) -> AqRl {
        match self {
            Self::Release | Self::AcquireRelease => Self::Release,
            Self::None | Self::Acquire => Self::None,
        }
    }
}
