//! Branches, jumps, calls and returns.

use crate::decoder::DecodedInstruction;

use super::{Exec, ExecResult, Flow};

pub(super) fn bf(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    Ok(if x.ctx.t() {
        Flow::Next
    } else {
        Flow::Branch(x.branch_target(i))
    })
}

pub(super) fn bfs(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    Ok(if x.ctx.t() {
        Flow::Next
    } else {
        Flow::DelayedBranch(x.branch_target(i))
    })
}

pub(super) fn bt(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    Ok(if x.ctx.t() {
        Flow::Branch(x.branch_target(i))
    } else {
        Flow::Next
    })
}

pub(super) fn bts(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    Ok(if x.ctx.t() {
        Flow::DelayedBranch(x.branch_target(i))
    } else {
        Flow::Next
    })
}

pub(super) fn bra(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    Ok(Flow::DelayedBranch(x.branch_target(i)))
}

pub(super) fn braf(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let target = x.pc().wrapping_add(4).wrapping_add(x.rm(i));
    Ok(Flow::DelayedBranch(target))
}

pub(super) fn bsr(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let target = x.branch_target(i);
    x.ctx.pr = x.pc().wrapping_add(4);
    Ok(Flow::DelayedBranch(target))
}

pub(super) fn bsrf(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let target = x.pc().wrapping_add(4).wrapping_add(x.rm(i));
    x.ctx.pr = x.pc().wrapping_add(4);
    Ok(Flow::DelayedBranch(target))
}

pub(super) fn jmp(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    Ok(Flow::DelayedBranch(x.rm(i)))
}

pub(super) fn jsr(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let target = x.rm(i);
    x.ctx.pr = x.pc().wrapping_add(4);
    Ok(Flow::DelayedBranch(target))
}

pub(super) fn rts(x: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    Ok(Flow::DelayedBranch(x.ctx.pr))
}

/// `SR` is restored before the delay slot runs.
pub(super) fn rte(x: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    let target = x.ctx.spc;
    let ssr = x.ctx.ssr;
    x.ctx.set_sr(ssr);
    Ok(Flow::DelayedBranch(target))
}
