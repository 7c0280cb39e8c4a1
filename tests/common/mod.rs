//! Single-hart RV64 interpreter for running emitted sequences in tests
//!
//! Covers RV64I, M, the A-extension (`lr`/`sc`/`amo*`), the F/D compares and raw
//! `fmv` moves. Fences are no-ops. Anything else panics.

#![allow(dead_code)]

use rvjit::asm::buffer::CodeBuffer;

/// Return address that stops [`Machine::call`].
pub const HALT: u64 = 0xdead_0000;

const STEP_LIMIT: usize = 1_000_000;

struct Region {
    base: u64,
    bytes: Vec<u8>,
}

pub struct Machine {
    pub x: [u64; 32],
    pub f: [u64; 32],
    pub pc: u64,

    regions: Vec<Region>,
    reservation: Option<u64>,

    /// Number of upcoming store-conditionals to fail regardless of the reservation
    pub spurious_sc_failures: u32,
}

#[inline(always)]
fn sext(value: u64, bits: u32) -> u64 {
    let shift = 64 - bits;
    (((value << shift) as i64) >> shift) as u64
}

#[inline(always)]
fn f64_of(bits: u64) -> f64 {
    f64::from_bits(bits)
}

#[inline(always)]
fn f32_of(bits: u64) -> f32 {
    f32::from_bits(bits as u32)
}

impl Machine {
    pub fn new() -> Self {
        Self {
            x: [0; 32],
            f: [0; 32],
            pc: 0,
            regions: Vec::new(),
            reservation: None,
            spurious_sc_failures: 0,
        }
    }

    /// Machine with the instruction and stub sections of `buf` mapped at their bases.
    pub fn with_buffer(buf: &CodeBuffer) -> Self {
        let mut m = Self::new();
        m.map_buffer(buf);
        m
    }

    pub fn map_buffer(&mut self, buf: &CodeBuffer) {
        self.map(buf.insts().base(), buf.insts().data().to_vec());
        if !buf.stubs().is_empty() {
            self.map(buf.stubs().base(), buf.stubs().data().to_vec());
        }
    }

    pub fn map(&mut self, base: u64, bytes: Vec<u8>) {
        assert!{
            self.regions.iter().all(|r| base + bytes.len() as u64 <= r.base || r.base + r.bytes.len() as u64 <= base),
            "region at {base:#x} overlaps an existing one"
        };
        self.regions.push(Region { base, bytes })
    }

    fn slice(&self, addr: u64, size: usize) -> &[u8] {
        for r in &self.regions {
            if addr >= r.base && addr + size as u64 <= r.base + r.bytes.len() as u64 {
                let start = (addr - r.base) as usize;
                return &r.bytes[start..start + size]
            }
        }
        panic!("access of {size} byte(s) at unmapped address {addr:#x}")
    }

    fn slice_mut(&mut self, addr: u64, size: usize) -> &mut [u8] {
        for r in &mut self.regions {
            if addr >= r.base && addr + size as u64 <= r.base + r.bytes.len() as u64 {
                let start = (addr - r.base) as usize;
                return &mut r.bytes[start..start + size]
            }
        }
        panic!("access of {size} byte(s) at unmapped address {addr:#x}")
    }

    pub fn read(&self, addr: u64, size: usize) -> u64 {
        self.slice(addr, size)
            .iter()
            .rev()
            .fold(0, |acc, &b| (acc << 8) | b as u64)
    }

    pub fn write(&mut self, addr: u64, size: usize, value: u64) {
        if let Some(reserved) = self.reservation {
            if reserved & !7 == addr & !7 {
                self.reservation = None
            }
        }

        let bytes = value.to_le_bytes();
        self.slice_mut(addr, size).copy_from_slice(&bytes[..size])
    }

    /// Run from `entry` with `ra = HALT` until the code returns; yields `a0`.
    pub fn call(&mut self, entry: u64) -> u64 {
        self.x[1] = HALT;
        self.pc = entry;

        for _ in 0..STEP_LIMIT {
            if self.pc == HALT {
                return self.x[10]
            }
            self.step()
        }

        panic!("no return after {STEP_LIMIT} steps, pc = {:#x}", self.pc)
    }

    #[inline(always)]
    fn set(&mut self, rd: usize, value: u64) {
        if rd != 0 {
            self.x[rd] = value
        }
    }

    pub fn step(&mut self) {
        let pc = self.pc;
        let w = self.read(pc, 4) as u32;

        let opcode = w & 0x7f;
        let rd = ((w >> 7) & 0x1f) as usize;
        let f3 = (w >> 12) & 0x7;
        let rs1 = ((w >> 15) & 0x1f) as usize;
        let rs2 = ((w >> 20) & 0x1f) as usize;
        let f7 = w >> 25;

        let a = self.x[rs1];
        let b = self.x[rs2];

        let imm_i = ((w as i32) >> 20) as i64 as u64;
        let imm_s = ((((w as i32) >> 25) << 5) | ((w >> 7) & 0x1f) as i32) as i64 as u64;
        let imm_b = ((((w as i32) >> 31) << 12)
            | (((w >> 7) & 1) << 11) as i32
            | (((w >> 25) & 0x3f) << 5) as i32
            | (((w >> 8) & 0xf) << 1) as i32) as i64 as u64;
        let imm_u = (w & 0xffff_f000) as i32 as i64 as u64;
        let imm_j = ((((w as i32) >> 31) << 20)
            | (((w >> 12) & 0xff) << 12) as i32
            | (((w >> 20) & 1) << 11) as i32
            | (((w >> 21) & 0x3ff) << 1) as i32) as i64 as u64;

        let mut next = pc.wrapping_add(4);

        match opcode {
            // lui
            0x37 => self.set(rd, imm_u),
            // auipc
            0x17 => self.set(rd, pc.wrapping_add(imm_u)),
            // jal
            0x6f => {
                self.set(rd, next);
                next = pc.wrapping_add(imm_j)
            }
            // jalr
            0x67 => {
                let target = a.wrapping_add(imm_i) & !1;
                self.set(rd, next);
                next = target
            }
            // branch
            0x63 => {
                let taken = match f3 {
                    0 => a == b,
                    1 => a != b,
                    4 => (a as i64) < (b as i64),
                    5 => (a as i64) >= (b as i64),
                    6 => a < b,
                    7 => a >= b,
                    _ => panic!("bad branch {w:#010x}"),
                };
                if taken {
                    next = pc.wrapping_add(imm_b)
                }
            }
            // load
            0x03 => {
                let addr = a.wrapping_add(imm_i);
                let v = match f3 {
                    0 => sext(self.read(addr, 1), 8),
                    1 => sext(self.read(addr, 2), 16),
                    2 => sext(self.read(addr, 4), 32),
                    3 => self.read(addr, 8),
                    4 => self.read(addr, 1),
                    5 => self.read(addr, 2),
                    6 => self.read(addr, 4),
                    _ => panic!("bad load {w:#010x}"),
                };
                self.set(rd, v)
            }
            // store
            0x23 => {
                let addr = a.wrapping_add(imm_s);
                self.write(addr, 1 << f3, b)
            }
            // op-imm
            0x13 => {
                let shamt = (w >> 20) & 0x3f;
                let v = match f3 {
                    0 => a.wrapping_add(imm_i),
                    1 => a << shamt,
                    2 => ((a as i64) < (imm_i as i64)) as u64,
                    3 => (a < imm_i) as u64,
                    4 => a ^ imm_i,
                    5 if (w >> 30) & 1 == 1 => ((a as i64) >> shamt) as u64,
                    5 => a >> shamt,
                    6 => a | imm_i,
                    _ => a & imm_i,
                };
                self.set(rd, v)
            }
            // op-imm-32
            0x1b => {
                let shamt = (w >> 20) & 0x1f;
                let v = match f3 {
                    0 => (a as i32).wrapping_add(imm_i as i32),
                    1 => ((a as u32) << shamt) as i32,
                    5 if (w >> 30) & 1 == 1 => (a as i32) >> shamt,
                    5 => ((a as u32) >> shamt) as i32,
                    _ => panic!("bad op-imm-32 {w:#010x}"),
                };
                self.set(rd, v as i64 as u64)
            }
            // op
            0x33 if f7 == 1 => {
                let v = match f3 {
                    0 => a.wrapping_mul(b),
                    1 => ((a as i64 as i128 * b as i64 as i128) >> 64) as u64,
                    2 => ((a as i64 as i128 * b as i128) >> 64) as u64,
                    3 => ((a as u128 * b as u128) >> 64) as u64,
                    4 if b == 0 => u64::MAX,
                    4 => (a as i64).wrapping_div(b as i64) as u64,
                    5 if b == 0 => u64::MAX,
                    5 => a / b,
                    6 if b == 0 => a,
                    6 => (a as i64).wrapping_rem(b as i64) as u64,
                    _ if b == 0 => a,
                    _ => a % b,
                };
                self.set(rd, v)
            }
            0x33 => {
                let v = match (f3, f7) {
                    (0, 0x00) => a.wrapping_add(b),
                    (0, 0x20) => a.wrapping_sub(b),
                    (1, 0x00) => a << (b & 63),
                    (2, 0x00) => ((a as i64) < (b as i64)) as u64,
                    (3, 0x00) => (a < b) as u64,
                    (4, 0x00) => a ^ b,
                    (5, 0x00) => a >> (b & 63),
                    (5, 0x20) => ((a as i64) >> (b & 63)) as u64,
                    (6, 0x00) => a | b,
                    (7, 0x00) => a & b,
                    _ => panic!("bad op {w:#010x}"),
                };
                self.set(rd, v)
            }
            // op-32
            0x3b => {
                let (a32, b32) = (a as i32, b as i32);
                let v = match (f3, f7) {
                    (0, 0x00) => a32.wrapping_add(b32),
                    (0, 0x20) => a32.wrapping_sub(b32),
                    (1, 0x00) => ((a32 as u32) << (b & 31)) as i32,
                    (5, 0x00) => ((a32 as u32) >> (b & 31)) as i32,
                    (5, 0x20) => a32 >> (b & 31),
                    (0, 0x01) => a32.wrapping_mul(b32),
                    (4, 0x01) if b32 == 0 => -1,
                    (4, 0x01) => a32.wrapping_div(b32),
                    (5, 0x01) if b32 == 0 => -1,
                    (5, 0x01) => ((a32 as u32) / (b32 as u32)) as i32,
                    (6, 0x01) if b32 == 0 => a32,
                    (6, 0x01) => a32.wrapping_rem(b32),
                    (7, 0x01) if b32 == 0 => a32,
                    (7, 0x01) => ((a32 as u32) % (b32 as u32)) as i32,
                    _ => panic!("bad op-32 {w:#010x}"),
                };
                self.set(rd, v as i64 as u64)
            }
            // fence
            0x0f => {}
            // amo
            0x2f => self.amo(w, rd, f3, a, b),
            // op-fp
            0x53 => self.op_fp(w, rd, rs1, rs2, f3, f7),
            _ => panic!("unsupported instruction {w:#010x} at {pc:#x}"),
        }

        self.pc = next
    }

    fn amo(&mut self, w: u32, rd: usize, f3: u32, addr: u64, src: u64) {
        let f5 = w >> 27;
        let size = match f3 {
            2 => 4,
            3 => 8,
            _ => panic!("bad amo width {w:#010x}"),
        };
        assert!(addr % size as u64 == 0, "misaligned atomic at {addr:#x}");

        let load = |m: &Self| {
            let v = m.read(addr, size);
            if size == 4 { sext(v, 32) } else { v }
        };

        match f5 {
            // lr
            0b00010 => {
                let v = load(self);
                self.reservation = Some(addr);
                self.set(rd, v)
            }
            // sc
            0b00011 => {
                let ok = self.reservation == Some(addr) && self.spurious_sc_failures == 0;
                self.spurious_sc_failures = self.spurious_sc_failures.saturating_sub(1);
                if ok {
                    self.write(addr, size, src);
                }
                self.reservation = None;
                self.set(rd, !ok as u64)
            }
            _ => {
                let old = load(self);
                let (o, s) = if size == 4 {
                    (old, sext(src, 32))
                } else {
                    (old, src)
                };
                let new = match f5 {
                    0b00001 => s,
                    0b00000 => o.wrapping_add(s),
                    0b00100 => o ^ s,
                    0b01100 => o & s,
                    0b01000 => o | s,
                    0b10000 => (o as i64).min(s as i64) as u64,
                    0b10100 => (o as i64).max(s as i64) as u64,
                    0b11000 => o.min(s),
                    0b11100 => o.max(s),
                    _ => panic!("bad amo {w:#010x}"),
                };
                self.write(addr, size, new);
                self.set(rd, old)
            }
        }
    }

    fn op_fp(&mut self, w: u32, rd: usize, rs1: usize, rs2: usize, f3: u32, f7: u32) {
        match f7 {
            // compares, single
            0x50 => {
                let (a, b) = (f32_of(self.f[rs1]), f32_of(self.f[rs2]));
                let v = match f3 { 2 => a == b, 1 => a < b, 0 => a <= b, _ => panic!("bad fcmp {w:#010x}") };
                self.set(rd, v as u64)
            }
            // compares, double
            0x51 => {
                let (a, b) = (f64_of(self.f[rs1]), f64_of(self.f[rs2]));
                let v = match f3 { 2 => a == b, 1 => a < b, 0 => a <= b, _ => panic!("bad fcmp {w:#010x}") };
                self.set(rd, v as u64)
            }
            // fmv.w.x, NaN-boxed
            0x78 => self.f[rd] = 0xffff_ffff_0000_0000 | (self.x[rs1] & 0xffff_ffff),
            // fmv.d.x
            0x79 => self.f[rd] = self.x[rs1],
            _ => panic!("unsupported fp instruction {w:#010x}"),
        }
    }
}
