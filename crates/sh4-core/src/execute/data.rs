//! Data movement: immediate, register and memory moves.

use crate::decoder::DecodedInstruction;
use crate::encoding::Opcode;
use crate::memory::AccessWidth;

use super::helpers::width_of;
use super::{Exec, ExecResult, Flow};

pub(super) fn mov_imm(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    x.set_rn(i, i.imm_i32() as u32);
    Ok(Flow::Next)
}

pub(super) fn mov_word_pc_rel(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.pc().wrapping_add(4).wrapping_add(i.disp_scaled());
    let value = x.load(addr, AccessWidth::Word)?;
    x.set_rn(i, value);
    Ok(Flow::Next)
}

pub(super) fn mov_long_pc_rel(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = (x.pc() & !3).wrapping_add(4).wrapping_add(i.disp_scaled());
    let value = x.load_long(addr)?;
    x.set_rn(i, value);
    Ok(Flow::Next)
}

pub(super) fn mov(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.rm(i);
    x.set_rn(i, value);
    Ok(Flow::Next)
}

pub(super) fn mov_store(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let (addr, value) = (x.rn(i), x.rm(i));
    x.store(addr, width_of(i.op()), value)?;
    Ok(Flow::Next)
}

pub(super) fn mov_load(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.load(x.rm(i), width_of(i.op()))?;
    x.set_rn(i, value);
    Ok(Flow::Next)
}

/// `@-Rn`: the store uses the pre-decrement value of `Rm` and `Rn` is only
/// updated once the store succeeded.
pub(super) fn mov_store_dec(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let width = width_of(i.op());
    let addr = x.rn(i).wrapping_sub(width.bytes());
    let value = x.rm(i);
    x.store(addr, width, value)?;
    x.set_rn(i, addr);
    Ok(Flow::Next)
}

/// `@Rm+`: when `m == n` the loaded value wins over the increment.
pub(super) fn mov_load_inc(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let width = width_of(i.op());
    let addr = x.rm(i);
    let value = x.load(addr, width)?;
    x.ctx.set_r(i.rm(), addr.wrapping_add(width.bytes()));
    x.set_rn(i, value);
    Ok(Flow::Next)
}

pub(super) fn mov_store_disp(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rn(i).wrapping_add(i.disp_scaled());
    let value = if i.op() == Opcode::MovLongStoreDisp {
        x.rm(i)
    } else {
        x.ctx.r(0)
    };
    x.store(addr, width_of(i.op()), value)?;
    Ok(Flow::Next)
}

pub(super) fn mov_load_disp(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rm(i).wrapping_add(i.disp_scaled());
    let value = x.load(addr, width_of(i.op()))?;
    let dest = if i.op() == Opcode::MovLongLoadDisp {
        i.rn()
    } else {
        0
    };
    x.ctx.set_r(dest, value);
    Ok(Flow::Next)
}

pub(super) fn mov_store_indexed(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rn(i).wrapping_add(x.ctx.r(0));
    let value = x.rm(i);
    x.store(addr, width_of(i.op()), value)?;
    Ok(Flow::Next)
}

pub(super) fn mov_load_indexed(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rm(i).wrapping_add(x.ctx.r(0));
    let value = x.load(addr, width_of(i.op()))?;
    x.set_rn(i, value);
    Ok(Flow::Next)
}

pub(super) fn mov_store_gbr(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.ctx.gbr.wrapping_add(i.disp_scaled());
    let value = x.ctx.r(0);
    x.store(addr, width_of(i.op()), value)?;
    Ok(Flow::Next)
}

pub(super) fn mov_load_gbr(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.ctx.gbr.wrapping_add(i.disp_scaled());
    let value = x.load(addr, width_of(i.op()))?;
    x.ctx.set_r(0, value);
    Ok(Flow::Next)
}

pub(super) fn mova(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = (x.pc() & !3).wrapping_add(4).wrapping_add(i.disp_scaled());
    x.ctx.set_r(0, addr);
    Ok(Flow::Next)
}

pub(super) fn movt(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let t = u32::from(x.ctx.t());
    x.set_rn(i, t);
    Ok(Flow::Next)
}

/// Operand cache is not modelled; the allocate is a plain store.
pub(super) fn movca(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let (addr, value) = (x.rn(i), x.ctx.r(0));
    x.store(addr, AccessWidth::Long, value)?;
    Ok(Flow::Next)
}

pub(super) fn swap_byte(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let rm = x.rm(i);
    let swapped = (rm & 0xffff_0000) | ((rm & 0xff) << 8) | ((rm >> 8) & 0xff);
    x.set_rn(i, swapped);
    Ok(Flow::Next)
}

pub(super) fn swap_word(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let rm = x.rm(i);
    x.set_rn(i, rm.rotate_left(16));
    Ok(Flow::Next)
}

pub(super) fn xtrct(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = (x.rm(i) << 16) | (x.rn(i) >> 16);
    x.set_rn(i, value);
    Ok(Flow::Next)
}
