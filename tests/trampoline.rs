mod common;

use common::Machine;

use rvjit::asm::Assembler;
use rvjit::asm::buffer::{CodeBuffer, SectionKind};
use rvjit::asm::config::Config;
use rvjit::asm::errors::EmitError;
use rvjit::asm::reloc::RelocationTag;
use rvjit::patch::Pattern;
use rvjit::rv64::Reg::*;

const MIB: u64 = 1024 * 1024;

const CACHE_LOW: u64 = 0x100_0000;
const CACHE_HIGH: u64 = CACHE_LOW + 16 * MIB;

const BASE: u64 = CACHE_LOW;
const RUNTIME_A: u64 = CACHE_LOW + 15 * MIB;
const RUNTIME_B: u64 = CACHE_LOW + 14 * MIB;

fn config(base: u64) -> Config {
    Config::new()
        .insts_base(base)
        .insts_capacity(64 * 1024)
        .stubs_capacity(1024)
        .code_cache(CACHE_LOW, CACHE_HIGH)
}

/// `a0 = value + a1; ret`, placed at `base`.
fn runtime_function(base: u64, value: i64) -> Vec<u8> {
    let mut asm = Assembler::new(Config::new().insts_base(base).insts_capacity(4096));
    asm.emit_li(A0, value);
    asm.emit_add(A0, A0, A1);
    asm.emit_jalr(ZERO, RA, 0);
    asm.finish().unwrap().insts().data().to_vec()
}

/// Calls `target` and returns what it returns; the call site is at offset 4.
fn caller(base: u64, target: u64) -> CodeBuffer {
    let mut asm = Assembler::new(config(base));
    asm.emit_mv(S1, RA);
    let site = asm.emit_trampoline_call(target, RelocationTag::RuntimeCall).unwrap();
    assert_eq!(site, 4);
    asm.emit_mv(RA, S1);
    asm.emit_jalr(ZERO, RA, 0);
    asm.finish().unwrap()
}

fn machine(buf: &CodeBuffer) -> Machine {
    let mut m = Machine::with_buffer(buf);
    m.map(RUNTIME_A, runtime_function(RUNTIME_A, 1000));
    m.map(RUNTIME_B, runtime_function(RUNTIME_B, 2000));
    m
}

#[test]
fn call_goes_through_stub_to_far_target() {
    let buf = caller(BASE, RUNTIME_A);

    assert_eq!(buf.trampoline_count(), 1);
    let stub = buf.trampoline_for(4).unwrap();
    assert_eq!(buf.stub_destination(stub), RUNTIME_A);
    assert_eq!(buf.classify_at(SectionKind::Insts, 4), Some(Pattern::Jal));
    assert_eq!(buf.recover_at(SectionKind::Insts, 4), buf.stubs().address_of(stub));

    let mut m = machine(&buf);
    m.x[11] = 7;
    assert_eq!(m.call(BASE), 1007);
}

#[test]
fn retargeting_reuses_the_stub() {
    let mut buf = caller(BASE, RUNTIME_A);

    buf.retarget_call(4, RUNTIME_B).unwrap();
    let stubs = buf.stubs().data().to_vec();
    let insts = buf.insts().data().to_vec();

    buf.retarget_call(4, RUNTIME_B).unwrap();
    assert_eq!(buf.trampoline_count(), 1);
    assert_eq!(buf.stubs().data(), &stubs[..]);
    assert_eq!(buf.insts().data(), &insts[..]);

    let mut m = machine(&buf);
    m.x[11] = 5;
    assert_eq!(m.call(BASE), 2005);
}

#[test]
fn retarget_within_reach_becomes_direct() {
    let mut buf = caller(BASE, RUNTIME_A);
    let near = BASE + 0x8000;

    buf.retarget_call(4, near).unwrap();
    assert_eq!(buf.recover_at(SectionKind::Insts, 4), near);

    // the stub follows so that a later move still knows the destination
    let stub = buf.trampoline_for(4).unwrap();
    assert_eq!(buf.stub_destination(stub), near);
}

#[test]
fn relocated_call_still_reaches_external_target() {
    let mut buf = caller(BASE, RUNTIME_A);
    let new_base = BASE + 4 * MIB;

    buf.relocate_to(new_base).unwrap();
    assert_eq!(buf.insts().base(), new_base);
    assert_eq!(buf.trampoline_count(), 1);

    let stub = buf.trampoline_for(4).unwrap();
    assert_eq!(buf.stub_destination(stub), RUNTIME_A);
    assert_eq!(buf.recover_at(SectionKind::Insts, 4), buf.stubs().address_of(stub));

    let mut m = machine(&buf);
    m.x[11] = 1;
    assert_eq!(m.call(new_base), 1001);
}

#[test]
fn relocation_moves_internal_addresses() {
    let data = 0x100;

    let mut asm = Assembler::new(config(BASE));
    let (_, lo) = asm.emit_la_patchable(A0, BASE + data, RelocationTag::InternalWord);
    asm.emit_addi(A0, A0, lo);
    asm.emit_jalr(ZERO, RA, 0);
    let mut buf = asm.finish().unwrap();

    assert_eq!(Machine::with_buffer(&buf).call(BASE), BASE + data);

    let new_base = BASE + 0x12_3458;
    buf.relocate_to(new_base).unwrap();
    assert_eq!(Machine::with_buffer(&buf).call(new_base), new_base + data);
}

#[test]
fn default_layout_reaches_far_runtime_through_stub() {
    let base = 0x4000_0000;
    let runtime = 0x9000_0000;

    let mut asm = Assembler::new(Config::new().insts_base(base));
    asm.emit_mv(S1, RA);
    let site = asm.emit_trampoline_call(runtime, RelocationTag::RuntimeCall).unwrap();
    asm.emit_mv(RA, S1);
    asm.emit_jalr(ZERO, RA, 0);
    let buf = asm.finish().unwrap();

    assert_eq!(site, 4);
    assert_eq!(buf.trampoline_count(), 1);

    let mut m = Machine::with_buffer(&buf);
    m.map(runtime, runtime_function(runtime, 3000));
    m.x[11] = 4;
    assert_eq!(m.call(base), 3004);
}

#[test]
fn failed_relocation_keeps_code_running_in_place() {
    let config = Config::new()
        .insts_base(BASE)
        .insts_capacity(64 * 1024)
        .stubs_capacity(24)
        .code_cache(CACHE_LOW, CACHE_HIGH);
    let near = BASE + 0x8000;

    let mut asm = Assembler::new(config);
    asm.emit_mv(S1, RA);
    asm.emit_trampoline_call(near, RelocationTag::RuntimeCall).unwrap();
    asm.emit_trampoline_call(near, RelocationTag::RuntimeCall).unwrap();
    asm.emit_mv(RA, S1);
    asm.emit_jalr(ZERO, RA, 0);
    let mut buf = asm.finish().unwrap();
    assert_eq!(buf.trampoline_count(), 0);

    let insts = buf.insts().data().to_vec();
    let err = buf.relocate_to(BASE + 4 * MIB).unwrap_err();
    assert!(matches!(err, EmitError::BufferExhausted { requested: 24, remaining: 0, .. }));

    assert_eq!(buf.insts().base(), BASE);
    assert_eq!(buf.insts().data(), &insts[..]);
    assert_eq!(buf.trampoline_count(), 0);
    assert!(buf.stubs().is_empty());

    // each call returns 10 + a1
    let mut m = Machine::with_buffer(&buf);
    m.map(near, runtime_function(near, 10));
    m.x[11] = 1;
    assert_eq!(m.call(BASE), 11);
}
