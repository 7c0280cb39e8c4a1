//! Helper functions and macros, opcodes and memory ordering, diagnostics rendering

#[macro_use]
pub mod misc;
pub mod diag;
pub mod opcode;
pub mod into_bytes;
