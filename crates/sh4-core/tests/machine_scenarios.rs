//! End-to-end scenarios driven through the `Dreamcast` aggregate.
//!
//! Guest programs are written as raw opcode words with the mnemonic beside
//! each one.

use bitflags as _;
use lru as _;
use proptest as _;
#[cfg(feature = "serde")]
use serde as _;
#[cfg(not(feature = "serde"))]
use serde_json as _;
use thiserror as _;
use tracing as _;

use std::rc::Rc;

use rstest::rstest;
use sh4_core::peripherals::{CcnRegister, InterruptSource};
use sh4_core::state::SR_MD;
use sh4_core::{
    ContextFixture, DiagProvider, Dreamcast, EmulatorError, ExecutionMode, MachineConfig,
    RegisterId, Sh4Context, Sh4Exception,
};

const BASE: u32 = 0x8c01_0000;
const VBR: u32 = 0x8c00_0000;
const STACK: u32 = 0x8d00_0000;

fn machine(mode: ExecutionMode) -> Dreamcast {
    Dreamcast::create(MachineConfig {
        execution_mode: mode,
        vblank_hz: None,
        ..MachineConfig::default()
    })
    .unwrap()
}

fn words(code: &[u16]) -> Vec<u8> {
    let mut bytes: Vec<u8> = code.iter().flat_map(|w| w.to_le_bytes()).collect();
    bytes.resize(bytes.len().next_multiple_of(4), 0);
    bytes
}

fn load(dc: &mut Dreamcast, at: u32, code: &[u16]) {
    dc.memcpy_to_guest(at, &words(code)).unwrap();
}

fn call(dc: &mut Dreamcast, entry: u32) {
    dc.context_mut().unwrap().pr = 0;
    dc.set_pc(entry).unwrap();
    for _ in 0..10_000 {
        if dc.context().unwrap().pc == 0 {
            return;
        }
        dc.run_cpu(1).unwrap();
    }
    panic!("guest never returned from {entry:#010x}");
}

/// Advances every device one cycle at a time so the return is caught
/// before the core runs past it.
fn run_until_return(dc: &mut Dreamcast) {
    for _ in 0..10_000 {
        if dc.context().unwrap().pc == 0 {
            return;
        }
        dc.run(1).unwrap();
    }
    panic!("guest never returned");
}

#[rstest]
fn fixture_in_fixture_out(
    #[values(ExecutionMode::Interpreter, ExecutionMode::Translator)] mode: ExecutionMode,
) {
    let mut dc = machine(mode);
    // mov r4,r0; add r5,r0; sts.l pr,@-r15; lds.l @r15+,pr; rts; shll r0
    load(&mut dc, BASE, &[0x6043, 0x305c, 0x4f22, 0x4f26, 0x000b, 0x4000]);

    let inputs = ContextFixture::default()
        .with(RegisterId::R(4), 20)
        .with(RegisterId::R(5), 22)
        .with(RegisterId::R(15), STACK);
    inputs.apply(&mut dc.context_mut().unwrap());
    call(&mut dc, BASE);

    let outputs = ContextFixture::default()
        .with(RegisterId::R(0), 84)
        .with(RegisterId::R(15), STACK)
        .with(RegisterId::Pr, 0);
    let ctx = dc.context().unwrap();
    assert!(outputs.mismatches(&ctx).is_empty(), "{:?}", outputs.mismatches(&ctx));
    // Unchecked fields are never compared.
    assert_eq!(outputs.get(RegisterId::R(1)), None);
}

#[rstest]
fn trapa_handler_returns_through_rte(
    #[values(ExecutionMode::Interpreter, ExecutionMode::Translator)] mode: ExecutionMode,
) {
    let mut dc = machine(mode);
    // trapa #5; mov #1,r4; rts; nop
    load(&mut dc, BASE, &[0xc305, 0xe401, 0x000b, 0x0009]);
    // mov #7,r8; rte; nop
    load(&mut dc, VBR + 0x100, &[0xe807, 0x002b, 0x0009]);
    {
        let mut ctx = dc.context_mut().unwrap();
        ctx.set_sr(SR_MD);
        ctx.vbr = VBR;
    }
    call(&mut dc, BASE);

    let ctx = dc.context().unwrap();
    assert_eq!(ctx.r(8), 7);
    assert_eq!(ctx.r(4), 1);
    assert_eq!(ctx.spc, BASE + 2);
    assert_eq!(ctx.sr(), SR_MD);
    drop(ctx);

    let space = dc.space().unwrap();
    assert_eq!(space.read_u32(0xff00_0000 + CcnRegister::Tra as u32).unwrap(), 5 << 2);
    assert_eq!(space.read_u32(0xff00_0000 + CcnRegister::Expevt as u32).unwrap(), 0x160);
    let diag = dc.diagnostics();
    assert_eq!(diag.last_exception, Some(Sh4Exception::Trap(5)));
    assert_eq!(diag.guest_exceptions, 1);
}

#[rstest]
fn timer_underflow_wakes_sleeping_core(
    #[values(ExecutionMode::Interpreter, ExecutionMode::Translator)] mode: ExecutionMode,
) {
    let mut dc = machine(mode);
    // sleep; mov #1,r4; rts; nop
    load(&mut dc, BASE, &[0x001b, 0xe401, 0x000b, 0x0009]);
    // mov #0,r0; mov.w r0,@r8 (clear TCR0); mov #9,r9; rte; nop
    load(&mut dc, VBR + 0x600, &[0xe000, 0x2801, 0xe909, 0x002b, 0x0009]);
    {
        let space = dc.space_mut().unwrap();
        // IPRA: TMU0 at level 5.
        space.write_u16(0xffd0_0004, 0x5000).unwrap();
        // TCOR0, TCNT0, TCR0 = UNIE, TSTR = channel 0.
        space.write_u32(0xffd8_0008, 10).unwrap();
        space.write_u32(0xffd8_000c, 10).unwrap();
        space.write_u16(0xffd8_0010, 0x20).unwrap();
        space.write_u8(0xffd8_0004, 1).unwrap();
    }
    {
        let mut ctx = dc.context_mut().unwrap();
        ctx.set_sr(SR_MD);
        ctx.vbr = VBR;
        ctx.set_r(8, 0xffd8_0010);
        ctx.pr = 0;
    }
    dc.set_pc(BASE).unwrap();
    run_until_return(&mut dc);

    let ctx = dc.context().unwrap();
    assert_eq!(ctx.r(9), 9);
    assert_eq!(ctx.r(4), 1);
    assert_eq!(ctx.spc, BASE + 2);
    drop(ctx);
    assert!(!dc.intc().unwrap().borrow().is_pending(InterruptSource::Tmu0));
    assert_eq!(dc.diagnostics().interrupts, 1);
}

#[rstest]
fn guest_store_through_mirror_reaches_running_code(
    #[values(ExecutionMode::Interpreter, ExecutionMode::Translator)] mode: ExecutionMode,
) {
    let mut dc = machine(mode);
    // mov.w r2,@r1; add #1,r0; rts; nop
    load(&mut dc, BASE, &[0x2121, 0x7001, 0x000b, 0x0009]);
    {
        let mut ctx = dc.context_mut().unwrap();
        // Uncached view of the 0x0d000000 mirror.
        ctx.set_r(1, 0xad01_0002);
        // add #16,r0
        ctx.set_r(2, 0x7010);
    }
    call(&mut dc, BASE);
    assert_eq!(dc.context().unwrap().r(0), 16);
}

#[test]
fn host_rewrite_retranslates_block() {
    let mut dc = machine(ExecutionMode::Translator);
    // add #1,r0; rts; nop
    load(&mut dc, BASE, &[0x7001, 0x000b, 0x0009]);
    call(&mut dc, BASE);
    assert_eq!(dc.context().unwrap().r(0), 1);

    // add #5,r0, written through a mirror.
    dc.space_mut().unwrap().write_u16(0x8d01_0000, 0x7005).unwrap();
    call(&mut dc, BASE);
    assert_eq!(dc.context().unwrap().r(0), 6);

    let diag = dc.diagnostics();
    assert_eq!(diag.blocks_compiled, 2);
    assert_eq!(diag.block_invalidations, 1);
}

#[rstest]
fn host_byte_patch_reaches_cached_code(
    #[values(ExecutionMode::Interpreter, ExecutionMode::Translator)] mode: ExecutionMode,
) {
    let mut dc = machine(mode);
    // add #1,r0; rts; nop
    load(&mut dc, BASE, &[0x7001, 0x000b, 0x0009]);
    call(&mut dc, BASE);
    assert_eq!(dc.context().unwrap().r(0), 1);

    // Low byte of the immediate only: add #5,r0.
    dc.space_mut().unwrap().write_u8(BASE, 0x05).unwrap();
    call(&mut dc, BASE);
    assert_eq!(dc.context().unwrap().r(0), 6);

    if mode == ExecutionMode::Translator {
        assert_eq!(dc.diagnostics().block_invalidations, 1);
    }
}

#[rstest]
fn guest_byte_store_rewrites_later_instruction_in_same_block(
    #[values(ExecutionMode::Interpreter, ExecutionMode::Translator)] mode: ExecutionMode,
) {
    let mut dc = machine(mode);
    // mov.b r2,@r1; add #1,r0; rts; nop
    load(&mut dc, BASE, &[0x2120, 0x7001, 0x000b, 0x0009]);
    {
        let mut ctx = dc.context_mut().unwrap();
        // Immediate byte of the add.
        ctx.set_r(1, BASE + 2);
        ctx.set_r(2, 0x09);
    }
    call(&mut dc, BASE);
    assert_eq!(dc.context().unwrap().r(0), 9);
    assert_eq!(dc.space().unwrap().read_u16(BASE + 2).unwrap(), 0x7009);
}

#[rstest]
fn interrupt_entry_at_slice_edge_defers_the_handler(
    #[values(ExecutionMode::Interpreter, ExecutionMode::Translator)] mode: ExecutionMode,
) {
    let mut dc = machine(mode);
    // add #1,r0; bra .; nop
    load(&mut dc, BASE, &[0x7001, 0xaffe, 0x0009]);
    // add #1,r1; bra .; nop
    load(&mut dc, VBR + 0x600, &[0x7101, 0xaffe, 0x0009]);
    {
        let mut ctx = dc.context_mut().unwrap();
        ctx.set_sr(SR_MD);
        ctx.vbr = VBR;
    }
    dc.set_pc(BASE).unwrap();
    dc.intc().unwrap().borrow_mut().raise(InterruptSource::Irl13);

    // Entry alone overruns a one-cycle slice.
    assert_eq!(dc.run(1).unwrap(), 1);
    let ctx = dc.context().unwrap();
    assert_eq!(ctx.pc, VBR + 0x600);
    assert_eq!(ctx.spc, BASE);
    assert_eq!((ctx.r(0), ctx.r(1)), (0, 0));
    drop(ctx);
    assert_eq!(dc.cpu().unwrap().borrow().debt(), 4);

    assert_eq!(dc.run(4).unwrap(), 4);
    assert_eq!(dc.context().unwrap().r(1), 0);
    assert_eq!(dc.run(1).unwrap(), 1);
    assert_eq!(dc.context().unwrap().r(1), 1);
    assert_eq!(dc.context().unwrap().r(0), 0);
    assert_eq!(dc.now(), 6);
    assert_eq!(dc.diagnostics().interrupts, 1);
}

#[test]
fn code_cache_evicts_least_recently_used_block() {
    let mut dc = Dreamcast::create(MachineConfig {
        code_cache_blocks: 2,
        vblank_hz: None,
        ..MachineConfig::default()
    })
    .unwrap();
    let entries = [BASE, BASE + 0x100, BASE + 0x200];
    for entry in entries {
        // add #1,r0; rts; nop
        load(&mut dc, entry, &[0x7001, 0x000b, 0x0009]);
    }

    call(&mut dc, entries[0]);
    call(&mut dc, entries[1]);
    call(&mut dc, entries[0]);
    // entries[1] is now the least recently used.
    call(&mut dc, entries[2]);
    let cache = Rc::clone(dc.cpu().unwrap().borrow().code_cache());
    assert!(cache.borrow().contains_pc(entries[0]));
    assert!(!cache.borrow().contains_pc(entries[1]));
    assert!(cache.borrow().contains_pc(entries[2]));
    assert_eq!(dc.diagnostics().evictions, 1);

    call(&mut dc, entries[1]);
    assert_eq!(dc.context().unwrap().r(0), 5);
    assert_eq!(dc.diagnostics().blocks_compiled, 4);
    assert!(cache.borrow().len() <= 2);
}

#[rstest]
fn illegal_slot_instruction_reports_branch(
    #[values(ExecutionMode::Interpreter, ExecutionMode::Translator)] mode: ExecutionMode,
) {
    let mut dc = machine(mode);
    // bra +4; rts (illegal in a delay slot)
    load(&mut dc, BASE, &[0xa002, 0x000b]);
    {
        let mut ctx = dc.context_mut().unwrap();
        ctx.set_sr(SR_MD);
        ctx.vbr = VBR;
    }
    dc.set_pc(BASE).unwrap();
    dc.run_cpu(1).unwrap();

    let ctx = dc.context().unwrap();
    assert_eq!(ctx.pc, VBR + 0x100);
    assert_eq!(ctx.spc, BASE);
    drop(ctx);
    assert_eq!(
        dc.diagnostics().last_exception,
        Some(Sh4Exception::SlotIllegalInstruction)
    );
}

#[test]
fn context_survives_byte_round_trip() {
    let mut dc = machine(ExecutionMode::Interpreter);
    {
        let mut ctx = dc.context_mut().unwrap();
        ctx.set_r(3, 0x1234_5678);
        ctx.set_fr(7, 0x3f80_0000);
        ctx.set_xf(2, 0xdead_beef);
        ctx.macl = 42;
    }
    let bytes = dc.context().unwrap().to_bytes();
    let restored = Sh4Context::from_bytes(&bytes).unwrap();
    assert_eq!(restored, *dc.context().unwrap());

    let err = Sh4Context::from_bytes(&bytes[1..]).unwrap_err();
    assert!(matches!(err, EmulatorError::ContextLayout { .. }));
}

#[cfg(feature = "serde")]
#[test]
fn context_and_config_serialize() {
    let config = MachineConfig::interpreter();
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(serde_json::from_str::<MachineConfig>(&json).unwrap(), config);

    let mut ctx = Sh4Context::default();
    ctx.set_r(0, 9);
    ctx.set_fr(1, 0x4000_0000);
    let json = serde_json::to_string(&ctx).unwrap();
    assert_eq!(serde_json::from_str::<Sh4Context>(&json).unwrap(), ctx);
}

#[test]
fn stopped_machine_keeps_reporting_its_failure() {
    let mut dc = machine(ExecutionMode::Translator);
    // mov.l @r1,r0 against unmapped memory with the trap hook removed.
    load(&mut dc, BASE, &[0x6012, 0x0009]);
    dc.context_mut().unwrap().set_r(1, 0x8200_0000);
    dc.set_pc(BASE).unwrap();
    dc.space().unwrap().trap_layer().borrow_mut().uninstall();

    let err = dc.run(100).unwrap_err();
    assert!(err.is_terminal());
    assert_eq!(dc.failure(), Some(&err));
    assert_eq!(dc.run_cpu(1).unwrap_err(), err);
}
