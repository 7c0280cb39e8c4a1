#[allow(clippy::module_inception)]
mod asm;

pub use asm::*;

pub mod label;
pub mod reloc;
pub mod config;
pub mod buffer;
pub mod errors;
pub mod address;

mod far;
mod insts;
mod pseudo;
mod atomic;

pub use address::Address;
pub use pseudo::{Cond, FCond, FloatKind};
pub use atomic::{MemBarrier, OperandSize};
