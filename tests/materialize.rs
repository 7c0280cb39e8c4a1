mod common;

use common::Machine;

use rvjit::asm::Assembler;
use rvjit::asm::buffer::SectionKind;
use rvjit::asm::config::Config;
use rvjit::asm::reloc::RelocationTag;
use rvjit::materialize;
use rvjit::patch::{self, Pattern};
use rvjit::rv64::Reg::*;

const BASE: u64 = 0x10_0000;

fn config() -> Config {
    Config::new().insts_base(BASE).insts_capacity(64 * 1024).stubs_capacity(1024)
}

/// Assemble `body` followed by `ret`, run it and return `a0`.
fn run(body: impl FnOnce(&mut Assembler)) -> u64 {
    let mut asm = Assembler::new(config());
    body(&mut asm);
    asm.emit_jalr(ZERO, RA, 0);

    let buf = asm.finish().unwrap();
    Machine::with_buffer(&buf).call(BASE)
}

const VALUES: &[i64] = &[
    0,
    1,
    -1,
    2047,
    -2048,
    2048,
    -2049,
    0x7ff,
    0x800,
    0x1000,
    0x12345,
    0x7fff_f7ff,
    0x7fff_f800,
    0x7fff_ffff,
    i32::MIN as i64,
    0x8000_0000,
    0xffff_ffff,
    0x1_0000_0000,
    0xab_cdef_1234,
    -0xab_cdef_1234,
    0x1234_5678_9abc_def0,
    0x7fff_ffff_ffff_ffff,
    i64::MIN,
    -0x1234_5678_9abc,
    0x0000_7fff_ffff_f800,
];

#[test]
fn li_loads_every_magnitude() {
    for &v in VALUES {
        assert_eq!(run(|asm| { asm.emit_li(A0, v); }) as i64, v, "li {v:#x}");
    }
}

#[test]
fn li_size_follows_magnitude() {
    let words = |v: i64| {
        let mut asm = Assembler::new(config());
        asm.emit_li(A0, v);
        asm.offset() / 4
    };

    assert_eq!(words(-2048), 1);
    assert_eq!(words(2047), 1);
    assert_eq!(words(0x12345), 2);
    assert_eq!(words(i32::MIN as i64), 1);
    assert!(words(0x1_0000_0000) <= 3);
    assert!(words(0x1234_5678_9abc_def0) <= 8);
}

#[test]
fn li64_loads_every_value() {
    for &v in VALUES {
        assert_eq!(run(|asm| { asm.emit_li64(A0, v); }) as i64, v, "li64 {v:#x}");
    }
}

#[test]
fn li32_loads_every_i32() {
    for v in [0, 1, -1, 2047, 2048, -2049, 0x7fff_f800, i32::MAX, i32::MIN] {
        assert_eq!(run(|asm| { asm.emit_li32(A0, v); }) as i64, v as i64, "li32 {v:#x}");
    }
}

#[test]
fn forty_bit_address_decodes_bit_for_bit() {
    let target = 0xab_cdef_1234_i64;

    let mut asm = Assembler::new(config());
    asm.emit_li64(A0, target);
    asm.emit_jalr(ZERO, RA, 0);

    let buf = asm.finish().unwrap();
    assert_eq!(buf.classify_at(SectionKind::Insts, 0), Some(Pattern::Li64));
    assert_eq!(buf.recover_at(SectionKind::Insts, 0), target as u64);
    assert_eq!(Machine::with_buffer(&buf).call(BASE), target as u64);
}

#[test]
fn movptr_runs_and_repatches() {
    let first = 0x7654_3210_abcd;
    let second = 0x0123_4567_89ab;

    let mut asm = Assembler::new(config());
    asm.emit_movptr(A0, first);
    asm.emit_jalr(ZERO, RA, 0);
    let mut buf = asm.finish().unwrap();

    assert_eq!(Machine::with_buffer(&buf).call(BASE), first);

    assert_eq!(buf.patch_at(SectionKind::Insts, 0, second), 24);
    assert_eq!(buf.recover_at(SectionKind::Insts, 0), second);
    assert_eq!(Machine::with_buffer(&buf).call(BASE), second);
}

#[test]
fn movptr_holds_the_top_of_its_window() {
    for target in [materialize::MOVPTR_LIMIT - 1, 0x7fff_e800_0000, 0x7fff_f7ff_f800] {
        assert_eq!(run(|asm| { asm.emit_movptr(A0, target); }), target, "movptr {target:#x}");
    }
}

#[test]
fn patchable_address_past_movptr_reach_runs_through_li64() {
    for target in [materialize::MOVPTR_LIMIT, 0x7fff_ffff_f000, 0xffff_ffc0_0000_0000] {
        let mut asm = Assembler::new(config());
        let (start, lo) = asm.emit_la_patchable(A0, target, RelocationTag::ExternalWord);
        asm.emit_addi(A0, A0, lo);
        asm.emit_jalr(ZERO, RA, 0);
        let buf = asm.finish().unwrap();

        assert_eq!((start, lo), (0, 0));
        assert_eq!(buf.classify_at(SectionKind::Insts, 0), Some(Pattern::Li64));
        assert_eq!(buf.recover_at(SectionKind::Insts, 0), target);
        assert_eq!(Machine::with_buffer(&buf).call(BASE), target, "la {target:#x}");
    }
}

#[test]
fn pcrel_patch_keeps_length_and_reaches_new_target() {
    let mut asm = Assembler::new(config());
    let (start, lo) = asm.emit_la_patchable(A0, BASE + 0x800, RelocationTag::InternalWord);
    asm.emit_addi(A0, A0, lo);
    asm.emit_jalr(ZERO, RA, 0);
    let mut buf = asm.finish().unwrap();

    assert_eq!(start, 0);
    assert_eq!(Machine::with_buffer(&buf).call(BASE), BASE + 0x800);

    let before = buf.insts().data().len();
    let new_target = BASE + 0x7654_3000 + 0x7ff;
    assert_eq!(buf.patch_at(SectionKind::Insts, 0, new_target), 8);
    assert_eq!(buf.insts().data().len(), before);
    assert_eq!(buf.recover_at(SectionKind::Insts, 0), new_target);
    assert_eq!(Machine::with_buffer(&buf).call(BASE), new_target);
}

#[test]
fn repatching_with_the_same_target_is_idempotent() {
    let mut asm = Assembler::new(config());
    asm.emit_li64(A0, 0x1234_5678);
    asm.emit_movptr(A1, 0x7fff_0000_1000);
    asm.emit_li32(A2, -77);
    let mut buf = asm.finish().unwrap();

    let original = buf.insts().data().to_vec();
    for (offset, target) in [(0, 0x1234_5678), (32, 0x7fff_0000_1000), (56, -77_i64 as u64)] {
        buf.patch_at(SectionKind::Insts, offset, target);
    }
    assert_eq!(buf.insts().data(), &original[..]);
}

#[test]
fn every_emitted_pattern_is_classified() {
    let mut asm = Assembler::new(config());
    let l = asm.new_label();
    asm.bind(l);
    asm.emit_j_label(l);                                       // 0
    asm.emit_bnez(A0, l, false);                               // 4
    asm.emit_la_label(A0, l);                                  // 8
    asm.emit_movptr(A0, 0x4000_0000_0000);                     // 16
    asm.emit_li64(A0, -1);                                     // 40
    asm.emit_li32(A0, 0x1234_5678);                            // 72

    let buf = asm.finish().unwrap();
    let code = buf.insts().data();
    let expected = [
        (0,  Pattern::Jal),
        (4,  Pattern::Branch),
        (8,  Pattern::PcRelative),
        (16, Pattern::Movptr),
        (40, Pattern::Li64),
        (72, Pattern::Li32),
    ];

    for (offset, pattern) in expected {
        assert_eq!(patch::classify(&code[offset..]), Some(pattern), "at {offset}");
        assert_eq!(pattern.len(), pattern.words() * 4);
    }
}
