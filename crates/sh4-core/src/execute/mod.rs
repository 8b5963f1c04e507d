//! Instruction handlers shared by the interpreter and the translator.
//!
//! Every handler has the [`Handler`] signature, so a translated block is a
//! sequence of plain function pointers and the interpreter calls the very
//! same functions after decoding. Handlers never advance `PC` themselves;
//! they report the control-flow outcome as a [`Flow`] and leave sequencing,
//! delay slots and exception entry to the CPU.
//!
//! Faulting instructions commit no partial register side effects: memory
//! is accessed before any register write-back.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

mod alu;
mod branch;
mod data;
mod fpu;
mod helpers;
mod system;

use crate::decoder::DecodedInstruction;
use crate::encoding::{OpFlags, Opcode};
use crate::fault::{EmulatorError, Sh4Exception};
use crate::memory::AddressSpace;
use crate::state::{Sh4Context, SR_FD};

/// Control-flow outcome of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next sequential instruction.
    Next,
    /// Jump to the target immediately.
    Branch(u32),
    /// Execute the delay slot, then jump to the target.
    DelayedBranch(u32),
    /// Halt until an interrupt is pending.
    Sleep,
}

impl Flow {
    /// Returns true when control leaves the sequential path.
    #[must_use]
    pub const fn is_taken(self) -> bool {
        matches!(self, Self::Branch(_) | Self::DelayedBranch(_))
    }
}

/// Why an instruction did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecFault {
    /// Guest-visible exception; becomes exception entry.
    Guest(Sh4Exception),
    /// Unrecoverable host condition; terminates the run.
    Host(EmulatorError),
}

impl From<Sh4Exception> for ExecFault {
    fn from(exception: Sh4Exception) -> Self {
        Self::Guest(exception)
    }
}

impl From<EmulatorError> for ExecFault {
    fn from(err: EmulatorError) -> Self {
        Self::Host(err)
    }
}

/// Result of one handler invocation.
pub type ExecResult = Result<Flow, ExecFault>;

/// Machine state a handler operates on.
///
/// `ctx.pc` holds the address of the executing instruction for the whole
/// call.
pub struct Exec<'a> {
    /// Register context.
    pub ctx: &'a mut Sh4Context,
    /// Guest address space.
    pub space: &'a mut AddressSpace,
    /// Route data accesses through the trapping fast path.
    pub fastmem: bool,
}

impl<'a> Exec<'a> {
    /// Bundles the state for one step.
    pub fn new(ctx: &'a mut Sh4Context, space: &'a mut AddressSpace, fastmem: bool) -> Self {
        Self {
            ctx,
            space,
            fastmem,
        }
    }

    /// Address of the executing instruction.
    #[must_use]
    pub fn pc(&self) -> u32 {
        self.ctx.pc
    }
}

/// Instruction handler.
pub type Handler = fn(&mut Exec<'_>, &DecodedInstruction) -> ExecResult;

/// Checks mode and FPU state, then runs `handler`.
///
/// # Errors
///
/// Returns the guest exception for privileged instructions in user mode,
/// FPU instructions while `SR.FD` is set, branches in a delay slot, and
/// whatever the handler itself raises.
pub fn execute(
    exec: &mut Exec<'_>,
    handler: Handler,
    instr: &DecodedInstruction,
    in_delay_slot: bool,
) -> ExecResult {
    if in_delay_slot && (instr.has(OpFlags::BRANCH) || instr.op() == Opcode::Trapa) {
        return Err(Sh4Exception::SlotIllegalInstruction.into());
    }
    if instr.has(OpFlags::PRIVILEGED) && !exec.ctx.privileged() {
        return Err(Sh4Exception::IllegalInstruction.into());
    }
    if instr.has(OpFlags::FPU) && exec.ctx.sr() & SR_FD != 0 {
        return Err(Sh4Exception::FpuDisabled.into());
    }
    handler(exec, instr)
}

/// Returns the handler for `op`.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn handler_for(op: Opcode) -> Handler {
    match op {
        Opcode::MovImm => data::mov_imm,
        Opcode::MovWordPcRel => data::mov_word_pc_rel,
        Opcode::MovLongPcRel => data::mov_long_pc_rel,
        Opcode::Mov => data::mov,
        Opcode::MovByteStore | Opcode::MovWordStore | Opcode::MovLongStore => data::mov_store,
        Opcode::MovByteLoad | Opcode::MovWordLoad | Opcode::MovLongLoad => data::mov_load,
        Opcode::MovByteStoreDec | Opcode::MovWordStoreDec | Opcode::MovLongStoreDec => {
            data::mov_store_dec
        }
        Opcode::MovByteLoadInc | Opcode::MovWordLoadInc | Opcode::MovLongLoadInc => {
            data::mov_load_inc
        }
        Opcode::MovByteStoreDisp | Opcode::MovWordStoreDisp | Opcode::MovLongStoreDisp => {
            data::mov_store_disp
        }
        Opcode::MovByteLoadDisp | Opcode::MovWordLoadDisp | Opcode::MovLongLoadDisp => {
            data::mov_load_disp
        }
        Opcode::MovByteStoreIndexed
        | Opcode::MovWordStoreIndexed
        | Opcode::MovLongStoreIndexed => data::mov_store_indexed,
        Opcode::MovByteLoadIndexed | Opcode::MovWordLoadIndexed | Opcode::MovLongLoadIndexed => {
            data::mov_load_indexed
        }
        Opcode::MovByteStoreGbr | Opcode::MovWordStoreGbr | Opcode::MovLongStoreGbr => {
            data::mov_store_gbr
        }
        Opcode::MovByteLoadGbr | Opcode::MovWordLoadGbr | Opcode::MovLongLoadGbr => {
            data::mov_load_gbr
        }
        Opcode::Mova => data::mova,
        Opcode::Movt => data::movt,
        Opcode::Movcal => data::movca,
        Opcode::SwapByte => data::swap_byte,
        Opcode::SwapWord => data::swap_word,
        Opcode::Xtrct => data::xtrct,
        Opcode::Add => alu::add,
        Opcode::AddImm => alu::add_imm,
        Opcode::Addc => alu::addc,
        Opcode::Addv => alu::addv,
        Opcode::CmpEqImm => alu::cmp_eq_imm,
        Opcode::CmpEq => alu::cmp_eq,
        Opcode::CmpHs => alu::cmp_hs,
        Opcode::CmpGe => alu::cmp_ge,
        Opcode::CmpHi => alu::cmp_hi,
        Opcode::CmpGt => alu::cmp_gt,
        Opcode::CmpPz => alu::cmp_pz,
        Opcode::CmpPl => alu::cmp_pl,
        Opcode::CmpStr => alu::cmp_str,
        Opcode::Div0s => alu::div0s,
        Opcode::Div0u => alu::div0u,
        Opcode::Div1 => alu::div1,
        Opcode::DmulsL => alu::dmuls,
        Opcode::DmuluL => alu::dmulu,
        Opcode::Dt => alu::dt,
        Opcode::ExtsByte => alu::exts_byte,
        Opcode::ExtsWord => alu::exts_word,
        Opcode::ExtuByte => alu::extu_byte,
        Opcode::ExtuWord => alu::extu_word,
        Opcode::MacL => alu::mac_long,
        Opcode::MacW => alu::mac_word,
        Opcode::MulL => alu::mul_long,
        Opcode::MulsW => alu::muls_word,
        Opcode::MuluW => alu::mulu_word,
        Opcode::Neg => alu::neg,
        Opcode::Negc => alu::negc,
        Opcode::Sub => alu::sub,
        Opcode::Subc => alu::subc,
        Opcode::Subv => alu::subv,
        Opcode::And => alu::and,
        Opcode::AndImm => alu::and_imm,
        Opcode::AndByte => alu::and_byte,
        Opcode::Not => alu::not,
        Opcode::Or => alu::or,
        Opcode::OrImm => alu::or_imm,
        Opcode::OrByte => alu::or_byte,
        Opcode::TasByte => alu::tas_byte,
        Opcode::Tst => alu::tst,
        Opcode::TstImm => alu::tst_imm,
        Opcode::TstByte => alu::tst_byte,
        Opcode::Xor => alu::xor,
        Opcode::XorImm => alu::xor_imm,
        Opcode::XorByte => alu::xor_byte,
        Opcode::Rotl => alu::rotl,
        Opcode::Rotr => alu::rotr,
        Opcode::Rotcl => alu::rotcl,
        Opcode::Rotcr => alu::rotcr,
        Opcode::Shad => alu::shad,
        Opcode::Shal | Opcode::Shll => alu::shll,
        Opcode::Shar => alu::shar,
        Opcode::Shld => alu::shld,
        Opcode::Shlr => alu::shlr,
        Opcode::Shll2 => alu::shll2,
        Opcode::Shlr2 => alu::shlr2,
        Opcode::Shll8 => alu::shll8,
        Opcode::Shlr8 => alu::shlr8,
        Opcode::Shll16 => alu::shll16,
        Opcode::Shlr16 => alu::shlr16,
        Opcode::Bf => branch::bf,
        Opcode::Bfs => branch::bfs,
        Opcode::Bt => branch::bt,
        Opcode::Bts => branch::bts,
        Opcode::Bra => branch::bra,
        Opcode::Braf => branch::braf,
        Opcode::Bsr => branch::bsr,
        Opcode::Bsrf => branch::bsrf,
        Opcode::Jmp => branch::jmp,
        Opcode::Jsr => branch::jsr,
        Opcode::Rts => branch::rts,
        Opcode::Rte => branch::rte,
        Opcode::Clrmac => system::clrmac,
        Opcode::Clrs => system::clrs,
        Opcode::Clrt => system::clrt,
        Opcode::Sets => system::sets,
        Opcode::Sett => system::sett,
        Opcode::Nop | Opcode::Ldtlb | Opcode::Pref | Opcode::Ocbi | Opcode::Ocbp | Opcode::Ocbwb => {
            system::nop
        }
        Opcode::Sleep => system::sleep,
        Opcode::Trapa => system::trapa,
        Opcode::LdcSr
        | Opcode::LdcGbr
        | Opcode::LdcVbr
        | Opcode::LdcSsr
        | Opcode::LdcSpc
        | Opcode::LdcDbr
        | Opcode::LdcBank
        | Opcode::LdsMach
        | Opcode::LdsMacl
        | Opcode::LdsPr
        | Opcode::LdsFpscr
        | Opcode::LdsFpul => system::load_control,
        Opcode::LdcLSr
        | Opcode::LdcLGbr
        | Opcode::LdcLVbr
        | Opcode::LdcLSsr
        | Opcode::LdcLSpc
        | Opcode::LdcLDbr
        | Opcode::LdcLBank
        | Opcode::LdsLMach
        | Opcode::LdsLMacl
        | Opcode::LdsLPr
        | Opcode::LdsLFpscr
        | Opcode::LdsLFpul => system::load_control_inc,
        Opcode::StcSr
        | Opcode::StcGbr
        | Opcode::StcVbr
        | Opcode::StcSsr
        | Opcode::StcSpc
        | Opcode::StcSgr
        | Opcode::StcDbr
        | Opcode::StcBank
        | Opcode::StsMach
        | Opcode::StsMacl
        | Opcode::StsPr
        | Opcode::StsFpscr
        | Opcode::StsFpul => system::store_control,
        Opcode::StcLSr
        | Opcode::StcLGbr
        | Opcode::StcLVbr
        | Opcode::StcLSsr
        | Opcode::StcLSpc
        | Opcode::StcLSgr
        | Opcode::StcLDbr
        | Opcode::StcLBank
        | Opcode::StsLMach
        | Opcode::StsLMacl
        | Opcode::StsLPr
        | Opcode::StsLFpscr
        | Opcode::StsLFpul => system::store_control_dec,
        Opcode::Fldi0 => fpu::fldi0,
        Opcode::Fldi1 => fpu::fldi1,
        Opcode::Fmov => fpu::fmov,
        Opcode::FmovLoad => fpu::fmov_load,
        Opcode::FmovLoadIndexed => fpu::fmov_load_indexed,
        Opcode::FmovLoadInc => fpu::fmov_load_inc,
        Opcode::FmovStore => fpu::fmov_store,
        Opcode::FmovStoreIndexed => fpu::fmov_store_indexed,
        Opcode::FmovStoreDec => fpu::fmov_store_dec,
        Opcode::Flds => fpu::flds,
        Opcode::Fsts => fpu::fsts,
        Opcode::Fabs => fpu::fabs,
        Opcode::Fneg => fpu::fneg,
        Opcode::Fadd => fpu::fadd,
        Opcode::Fsub => fpu::fsub,
        Opcode::Fmul => fpu::fmul,
        Opcode::Fdiv => fpu::fdiv,
        Opcode::FcmpEq => fpu::fcmp_eq,
        Opcode::FcmpGt => fpu::fcmp_gt,
        Opcode::Float => fpu::float,
        Opcode::Ftrc => fpu::ftrc,
        Opcode::Fmac => fpu::fmac,
        Opcode::Fsqrt => fpu::fsqrt,
        Opcode::Fsrra => fpu::fsrra,
        Opcode::Fcnvds => fpu::fcnvds,
        Opcode::Fcnvsd => fpu::fcnvsd,
        Opcode::Fipr => fpu::fipr,
        Opcode::Ftrv => fpu::ftrv,
        Opcode::Fsca => fpu::fsca,
        Opcode::Fschg => fpu::fschg,
        Opcode::Frchg => fpu::frchg,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::decoder::{DecodedInstruction, Decoder};
    use crate::memory::{AddressSpace, RegionDescriptor, SYSTEM_RAM_BASE, SYSTEM_RAM_MAX};
    use crate::state::Sh4Context;
    use crate::trap::{HostTrapLayer, SoftwarePlatform};

    use super::{execute, handler_for, Exec, ExecResult};

    pub(crate) const BASE: u32 = 0x8c01_0000;

    /// Context plus a system-RAM-only address space.
    pub(crate) struct Bench {
        pub ctx: Sh4Context,
        pub space: AddressSpace,
        decoder: Decoder,
    }

    impl Bench {
        pub(crate) fn new() -> Self {
            let trap = HostTrapLayer::shared(Box::new(SoftwarePlatform));
            let mut space = AddressSpace::new(trap);
            space
                .add_region(RegionDescriptor::ram("system ram", SYSTEM_RAM_BASE, SYSTEM_RAM_MAX))
                .unwrap();
            let mut ctx = Sh4Context::default();
            ctx.pc = BASE;
            Self {
                ctx,
                space,
                decoder: Decoder::new(),
            }
        }

        pub(crate) fn decode(&self, word: u16) -> DecodedInstruction {
            self.decoder.decode(word).expect("test word decodes")
        }

        pub(crate) fn run(&mut self, word: u16) -> ExecResult {
            let instr = self.decode(word);
            let mut exec = Exec::new(&mut self.ctx, &mut self.space, false);
            execute(&mut exec, handler_for(instr.op()), &instr, false)
        }

        pub(crate) fn run_in_slot(&mut self, word: u16) -> ExecResult {
            let instr = self.decode(word);
            let mut exec = Exec::new(&mut self.ctx, &mut self.space, false);
            execute(&mut exec, handler_for(instr.op()), &instr, true)
        }
    }
}
