//! Flag, control-register and system handlers.

use crate::decoder::DecodedInstruction;
use crate::encoding::Opcode;
use crate::fault::Sh4Exception;
use crate::memory::AccessWidth;
use crate::state::{SR_MASK, SR_S};

use super::{Exec, ExecFault, ExecResult, Flow};

pub(super) fn nop(_: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    Ok(Flow::Next)
}

pub(super) fn clrmac(x: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    x.ctx.mach = 0;
    x.ctx.macl = 0;
    Ok(Flow::Next)
}

pub(super) fn clrs(x: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    x.ctx.set_sr_bit(SR_S, false);
    Ok(Flow::Next)
}

pub(super) fn clrt(x: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    x.ctx.set_t(false);
    Ok(Flow::Next)
}

pub(super) fn sets(x: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    x.ctx.set_sr_bit(SR_S, true);
    Ok(Flow::Next)
}

pub(super) fn sett(x: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    x.ctx.set_t(true);
    Ok(Flow::Next)
}

pub(super) fn sleep(_: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    Ok(Flow::Sleep)
}

pub(super) fn trapa(_: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    Err(ExecFault::Guest(Sh4Exception::Trap(i.imm)))
}

/// Writes a control or system register selected by `op`.
fn write_control(x: &mut Exec<'_>, op: Opcode, bank: usize, value: u32) {
    match op {
        Opcode::LdcSr | Opcode::LdcLSr => x.ctx.set_sr(value & SR_MASK),
        Opcode::LdcGbr | Opcode::LdcLGbr => x.ctx.gbr = value,
        Opcode::LdcVbr | Opcode::LdcLVbr => x.ctx.vbr = value,
        Opcode::LdcSsr | Opcode::LdcLSsr => x.ctx.ssr = value,
        Opcode::LdcSpc | Opcode::LdcLSpc => x.ctx.spc = value,
        Opcode::LdcDbr | Opcode::LdcLDbr => x.ctx.dbr = value,
        Opcode::LdcBank | Opcode::LdcLBank => x.ctx.set_r_bank(bank, value),
        Opcode::LdsMach | Opcode::LdsLMach => x.ctx.mach = value,
        Opcode::LdsMacl | Opcode::LdsLMacl => x.ctx.macl = value,
        Opcode::LdsPr | Opcode::LdsLPr => x.ctx.pr = value,
        Opcode::LdsFpscr | Opcode::LdsLFpscr => x.ctx.set_fpscr(value),
        Opcode::LdsFpul | Opcode::LdsLFpul => x.ctx.fpul = value,
        other => tracing::error!(?other, "not a control-register load"),
    }
}

/// Reads a control or system register selected by `op`.
fn read_control(x: &Exec<'_>, op: Opcode, bank: usize) -> u32 {
    match op {
        Opcode::StcSr | Opcode::StcLSr => x.ctx.sr(),
        Opcode::StcGbr | Opcode::StcLGbr => x.ctx.gbr,
        Opcode::StcVbr | Opcode::StcLVbr => x.ctx.vbr,
        Opcode::StcSsr | Opcode::StcLSsr => x.ctx.ssr,
        Opcode::StcSpc | Opcode::StcLSpc => x.ctx.spc,
        Opcode::StcSgr | Opcode::StcLSgr => x.ctx.sgr,
        Opcode::StcDbr | Opcode::StcLDbr => x.ctx.dbr,
        Opcode::StcBank | Opcode::StcLBank => x.ctx.r_bank(bank),
        Opcode::StsMach | Opcode::StsLMach => x.ctx.mach,
        Opcode::StsMacl | Opcode::StsLMacl => x.ctx.macl,
        Opcode::StsPr | Opcode::StsLPr => x.ctx.pr,
        Opcode::StsFpscr | Opcode::StsLFpscr => x.ctx.fpscr(),
        Opcode::StsFpul | Opcode::StsLFpul => x.ctx.fpul,
        other => {
            tracing::error!(?other, "not a control-register store");
            0
        }
    }
}

/// `LDC`/`LDS Rm,<reg>`; the bank forms carry the bank index in `n`.
pub(super) fn load_control(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.rm(i);
    write_control(x, i.op(), i.rn(), value);
    Ok(Flow::Next)
}

/// `LDC.L`/`LDS.L @Rm+,<reg>`: the increment lands in the bank that was
/// active before an `SR` load switches banks.
pub(super) fn load_control_inc(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rm(i);
    let value = x.load_long(addr)?;
    x.ctx.set_r(i.rm(), addr.wrapping_add(4));
    write_control(x, i.op(), i.rn(), value);
    Ok(Flow::Next)
}

/// `STC`/`STS <reg>,Rn`; the bank forms carry the bank index in `m`.
pub(super) fn store_control(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = read_control(x, i.op(), i.rm());
    x.set_rn(i, value);
    Ok(Flow::Next)
}

pub(super) fn store_control_dec(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = read_control(x, i.op(), i.rm());
    let addr = x.rn(i).wrapping_sub(4);
    x.store(addr, AccessWidth::Long, value)?;
    x.set_rn(i, addr);
    Ok(Flow::Next)
}
