//! RV64 machine-code emission for a JIT: one routine per instruction, address
//! materialization, in-place patching of emitted sequences, trampolines and LR/SC atomics.

#[macro_use]
pub mod util;

pub mod asm;
pub mod bits;
pub mod rv64;
pub mod patch;
pub mod materialize;
