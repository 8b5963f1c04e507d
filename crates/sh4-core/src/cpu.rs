//! The SH4 CPU core: interpreter and block-translating front ends over one
//! set of instruction handlers, plus exception and interrupt entry.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error, trace};

use crate::api::{ExceptionVectors, ExecutionMode, MachineConfig};
use crate::decoder::Decoder;
use crate::diag::{DiagProvider, Sh4Diagnostics};
use crate::disasm::Disassembly;
use crate::encoding::OpFlags;
use crate::execute::{execute, handler_for, Exec, ExecFault, Flow};
use crate::fault::{EmulatorError, Sh4Exception};
use crate::jit::{CodeCache, CompiledOp, TranslatedBlock, Translator};
use crate::memory::AddressSpace;
use crate::peripherals::{Ccn, Intc};
use crate::scheduler::ScheduledDevice;
use crate::state::{RunState, Sh4Context, SR_BL, SR_MD, SR_RB};
use crate::timing::{cycle_cost, instruction_cycles, CycleCostKind};
use crate::trap::{ExceptionRecord, SharedTrapLayer, TrapHandle, TrapPriority};

/// How a retired instruction left the sequential path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Jump,
    Exception,
    Sleep,
}

enum Lookup {
    Hit(Rc<TranslatedBlock>),
    Uncached,
    Faulted(u64),
}

fn entry_cost(kind: CycleCostKind) -> u64 {
    cycle_cost(kind).map_or(1, u64::from)
}

/// SH4 CPU core.
pub struct Sh4 {
    ctx: Sh4Context,
    decoder: Decoder,
    translator: Translator,
    cache: Rc<RefCell<CodeCache>>,
    intc: Option<Rc<RefCell<Intc>>>,
    ccn: Option<Rc<RefCell<Ccn>>>,
    mode: ExecutionMode,
    fastmem: bool,
    vectors: ExceptionVectors,
    run_state: RunState,
    debt: u64,
    diag: Sh4Diagnostics,
    resume: Option<(Rc<TranslatedBlock>, usize)>,
    trap: SharedTrapLayer,
    listener: Option<TrapHandle>,
}

impl fmt::Debug for Sh4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sh4")
            .field("pc", &format_args!("{:#010x}", self.ctx.pc))
            .field("mode", &self.mode)
            .field("run_state", &self.run_state)
            .field("debt", &self.debt)
            .finish_non_exhaustive()
    }
}

impl Sh4 {
    /// Creates a core in its reset state and registers the fastmem
    /// fallback listener with `trap`.
    ///
    /// The listener claims fast-path traps raised while the faulting PC lies
    /// inside a valid translated block, so the access is retried through the
    /// checked path.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::Configuration`] when the trap layer has no
    /// free listener slot.
    pub fn new(
        config: &MachineConfig,
        trap: SharedTrapLayer,
        cache: Rc<RefCell<CodeCache>>,
    ) -> Result<Self, EmulatorError> {
        let weak = Rc::downgrade(&cache);
        let listener = move |record: &ExceptionRecord| {
            weak.upgrade().is_some_and(|cache| {
                cache
                    .try_borrow()
                    .is_ok_and(|cache| cache.contains_pc(record.state.pc))
            })
        };
        let handle = trap
            .borrow_mut()
            .add(TrapPriority::Normal, Box::new(listener))?;

        Ok(Self {
            ctx: Sh4Context::default(),
            decoder: Decoder::new(),
            translator: Translator::new(config.max_block_instructions),
            cache,
            intc: None,
            ccn: None,
            mode: config.execution_mode,
            fastmem: config.fastmem,
            vectors: config.vectors,
            run_state: RunState::Running,
            debt: 0,
            diag: Sh4Diagnostics::new(),
            resume: None,
            trap,
            listener: Some(handle),
        })
    }

    /// Wires the interrupt and exception-latch peripherals.
    pub fn connect(&mut self, intc: Rc<RefCell<Intc>>, ccn: Rc<RefCell<Ccn>>) {
        self.intc = Some(intc);
        self.ccn = Some(ccn);
    }

    /// Register context.
    #[must_use]
    pub const fn context(&self) -> &Sh4Context {
        &self.ctx
    }

    /// Mutable register context.
    pub fn context_mut(&mut self) -> &mut Sh4Context {
        self.resume = None;
        &mut self.ctx
    }

    /// Redirects execution to `addr` and wakes the core.
    pub fn set_pc(&mut self, addr: u32) {
        self.resume = None;
        self.ctx.pc = addr;
        self.run_state = RunState::Running;
    }

    /// Current run state.
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Active execution mode.
    #[must_use]
    pub const fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Switches between interpreting and translating.
    pub fn set_execution_mode(&mut self, mode: ExecutionMode) {
        self.resume = None;
        self.mode = mode;
    }

    /// Shared translated-code cache.
    #[must_use]
    pub const fn code_cache(&self) -> &Rc<RefCell<CodeCache>> {
        &self.cache
    }

    /// Cycles already spent past the end of the previous budget.
    #[must_use]
    pub const fn debt(&self) -> u64 {
        self.debt
    }

    /// Executes until `budget` cycles are consumed or the core halts.
    ///
    /// Returns the cycles consumed, never more than `budget`. A branch and
    /// its delay slot are never split, so any overshoot is charged to the
    /// next call.
    ///
    /// # Errors
    ///
    /// Terminal host conditions: an unclaimed fast-path trap or an exhausted
    /// code cache.
    pub fn run(&mut self, space: &mut AddressSpace, budget: u64) -> Result<u64, EmulatorError> {
        let mut used = std::mem::take(&mut self.debt);
        while used < budget {
            used += self.accept_interrupt();
            if self.run_state.is_halted() || used >= budget {
                break;
            }
            used += match self.mode {
                ExecutionMode::Interpreter => self.step(space)?,
                ExecutionMode::Translator => {
                    self.run_block(space, budget.saturating_sub(used))?
                }
            };
        }
        if used > budget {
            self.debt = used - budget;
            used = budget;
        }
        Ok(used)
    }

    /// Decodes and executes one instruction (two for a taken delayed
    /// branch) through the checked memory path.
    ///
    /// # Errors
    ///
    /// See [`Sh4::run`].
    pub fn step(&mut self, space: &mut AddressSpace) -> Result<u64, EmulatorError> {
        let pc = self.ctx.pc;
        match self.fetch(space, pc) {
            Ok(op) => Ok(self.retire(space, op, None, false)?.1),
            Err(exception) => Ok(self.enter_exception(exception, pc)),
        }
    }

    fn fetch(&self, space: &AddressSpace, pc: u32) -> Result<CompiledOp, Sh4Exception> {
        let word = space
            .read_u16(pc)
            .map_err(|_| Sh4Exception::AddressErrorRead(pc))?;
        let instr = self
            .decoder
            .decode(word)
            .ok_or(Sh4Exception::IllegalInstruction)?;
        Ok(CompiledOp {
            handler: handler_for(instr.op()),
            instr,
            pc,
        })
    }

    fn lookup(&mut self, space: &mut AddressSpace) -> Result<Lookup, EmulatorError> {
        let pc = self.ctx.pc;
        if let Some(block) = self.cache.borrow_mut().lookup(pc) {
            return Ok(Lookup::Hit(block));
        }
        match self.translator.translate(&self.decoder, space, pc) {
            Ok(Some(block)) => {
                space.protect_code(block.store(), block.offset(), block.byte_len());
                let block = self.cache.borrow_mut().insert(block)?;
                Ok(Lookup::Hit(block))
            }
            Ok(None) => Ok(Lookup::Uncached),
            Err(exception) => Ok(Lookup::Faulted(self.enter_exception(exception, pc))),
        }
    }

    fn run_block(&mut self, space: &mut AddressSpace, budget: u64) -> Result<u64, EmulatorError> {
        let pc = self.ctx.pc;
        let (block, mut index) = match self.resume.take() {
            Some((block, index))
                if block.is_valid() && block.ops().get(index).is_some_and(|op| op.pc == pc) =>
            {
                (block, index)
            }
            _ => match self.lookup(space)? {
                Lookup::Hit(block) => (block, 0),
                Lookup::Uncached => return self.step(space),
                Lookup::Faulted(cycles) => return Ok(cycles),
            },
        };

        let ops = block.ops();
        let mut used = 0;
        while let Some(&op) = ops.get(index) {
            if used >= budget {
                self.resume = Some((Rc::clone(&block), index));
                break;
            }
            let slot = ops
                .get(index + 1)
                .copied()
                .filter(|_| op.instr.has(OpFlags::DELAYED));
            let (step, cycles) = self.retire(space, op, slot, self.fastmem)?;
            used += cycles;
            if step != Step::Continue || !block.is_valid() {
                break;
            }
            index += 1;
        }
        Ok(used)
    }

    /// Executes `op` and, for a taken delayed branch, its slot.
    fn retire(
        &mut self,
        space: &mut AddressSpace,
        op: CompiledOp,
        slot: Option<CompiledOp>,
        fastmem: bool,
    ) -> Result<(Step, u64), EmulatorError> {
        self.ctx.pc = op.pc;
        let result = {
            let mut exec = Exec::new(&mut self.ctx, space, fastmem);
            execute(&mut exec, op.handler, &op.instr, false)
        };
        let flow = match result {
            Ok(flow) => flow,
            Err(ExecFault::Guest(exception)) => {
                return Ok((Step::Exception, self.enter_exception(exception, op.pc)));
            }
            Err(ExecFault::Host(err)) => return Err(self.terminal(err)),
        };
        trace!(
            pc = format_args!("{:#010x}", op.pc),
            instr = %Disassembly::new(&op.instr, op.pc),
            "retired"
        );
        self.diag.record_instructions(1);
        let cycles = instruction_cycles(op.instr.class(), flow.is_taken());

        match flow {
            Flow::Next => {
                self.ctx.pc = op.pc.wrapping_add(2);
                Ok((Step::Continue, cycles))
            }
            Flow::Branch(target) => {
                self.ctx.pc = target;
                Ok((Step::Jump, cycles))
            }
            Flow::Sleep => {
                self.ctx.pc = op.pc.wrapping_add(2);
                self.run_state = RunState::Sleeping;
                debug!(pc = format_args!("{:#010x}", op.pc), "cpu sleeping");
                Ok((Step::Sleep, cycles))
            }
            Flow::DelayedBranch(target) => {
                let (step, slot_cycles) = self.retire_slot(space, op.pc, target, slot, fastmem)?;
                Ok((step, cycles + slot_cycles))
            }
        }
    }

    fn retire_slot(
        &mut self,
        space: &mut AddressSpace,
        branch_pc: u32,
        target: u32,
        slot: Option<CompiledOp>,
        fastmem: bool,
    ) -> Result<(Step, u64), EmulatorError> {
        let slot_pc = branch_pc.wrapping_add(2);
        let (slot, fastmem) = match slot {
            Some(slot) => (slot, fastmem),
            None => match self.fetch(space, slot_pc) {
                Ok(slot) => (slot, false),
                Err(exception) => {
                    let cycles = self.enter_exception(exception.in_delay_slot(), branch_pc);
                    return Ok((Step::Exception, cycles));
                }
            },
        };

        self.ctx.pc = slot_pc;
        let result = {
            let mut exec = Exec::new(&mut self.ctx, space, fastmem);
            execute(&mut exec, slot.handler, &slot.instr, true)
        };
        match result {
            Ok(_) => {
                trace!(
                    pc = format_args!("{:#010x}", slot_pc),
                    instr = %Disassembly::new(&slot.instr, slot_pc),
                    "retired delay slot"
                );
                self.diag.record_instructions(1);
                self.ctx.pc = target;
                Ok((Step::Jump, instruction_cycles(slot.instr.class(), false)))
            }
            Err(ExecFault::Guest(exception)) => {
                let cycles = self.enter_exception(exception.in_delay_slot(), branch_pc);
                Ok((Step::Exception, cycles))
            }
            Err(ExecFault::Host(err)) => Err(self.terminal(err)),
        }
    }

    fn terminal(&mut self, err: EmulatorError) -> EmulatorError {
        self.resume = None;
        error!(pc = format_args!("{:#010x}", self.ctx.pc), %err, "cpu run failed");
        err
    }

    /// Saves the interrupted state and enters privileged mode on bank 1 with
    /// exceptions blocked.
    fn save_state(&mut self, spc: u32) {
        let sr = self.ctx.sr();
        self.ctx.spc = spc;
        self.ctx.ssr = sr;
        self.ctx.sgr = self.ctx.r(15);
        self.ctx.set_sr(sr | SR_MD | SR_RB | SR_BL);
    }

    /// Redirects to the general exception vector. `pc` is the address of
    /// the instruction that raised `exception`.
    fn enter_exception(&mut self, exception: Sh4Exception, pc: u32) -> u64 {
        self.resume = None;
        let spc = match exception {
            Sh4Exception::Trap(_) => pc.wrapping_add(2),
            _ => pc,
        };
        self.save_state(spc);
        self.ctx.pc = self.ctx.vbr.wrapping_add(self.vectors.general);

        if let Some(ccn) = &self.ccn {
            let mut ccn = ccn.borrow_mut();
            ccn.latch_exception(exception.expevt(), exception.tea());
            if let Sh4Exception::Trap(imm) = exception {
                ccn.latch_trap(imm);
            }
        }
        self.diag.record_exception(exception, pc);
        debug!(
            %exception,
            pc = format_args!("{pc:#010x}"),
            expevt = format_args!("{:#x}", exception.expevt()),
            "guest exception"
        );
        entry_cost(CycleCostKind::ExceptionEntry)
    }

    /// Takes the highest pending interrupt if `SR.BL` is clear and its level
    /// beats `SR.IMASK`. Returns the entry cost, or 0 when nothing was
    /// accepted.
    fn accept_interrupt(&mut self) -> u64 {
        let Some(intc) = self.intc.clone() else {
            return 0;
        };
        if self.ctx.sr() & SR_BL != 0 {
            return 0;
        }
        let Some(pending) = intc.borrow().highest_pending() else {
            return 0;
        };
        if pending.level <= self.ctx.imask() {
            return 0;
        }
        intc.borrow_mut().acknowledge(pending.source);

        self.resume = None;
        let pc = self.ctx.pc;
        self.save_state(pc);
        self.ctx.pc = self.ctx.vbr.wrapping_add(self.vectors.interrupt);
        if let Some(ccn) = &self.ccn {
            ccn.borrow_mut().latch_interrupt(pending.intevt);
        }
        self.run_state = RunState::Running;
        self.diag.record_interrupt();
        debug!(
            source = ?pending.source,
            level = pending.level,
            pc = format_args!("{pc:#010x}"),
            "interrupt accepted"
        );
        entry_cost(CycleCostKind::InterruptEntry)
    }
}

impl DiagProvider for Sh4 {
    fn diagnostics(&self) -> Sh4Diagnostics {
        let stats = self
            .cache
            .try_borrow()
            .map(|cache| cache.stats())
            .unwrap_or_default();
        let dispatched = self
            .trap
            .try_borrow()
            .map(|trap| trap.dispatched())
            .unwrap_or_default();
        self.diag.with_cache(stats).with_trap_dispatches(dispatched)
    }
}

impl ScheduledDevice for Sh4 {
    fn name(&self) -> &'static str {
        "sh4"
    }

    fn run(&mut self, space: &mut AddressSpace, cycles: u64) -> Result<u64, EmulatorError> {
        Self::run(self, space, cycles)
    }
}

impl Drop for Sh4 {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.take() {
            if let Ok(mut trap) = self.trap.try_borrow_mut() {
                trap.remove(handle);
            }
        }
    }
}
