//! SH4 CPU core and machine plumbing for a Dreamcast emulator.

/// Host trap layer for fast-path memory faults.
pub mod trap;
pub use trap::{
    AccessKind, CapturedState, ExceptionRecord, HostTrapLayer, SharedTrapLayer,
    SoftwarePlatform, TrapCause, TrapHandle, TrapListener, TrapPlatform, TrapPriority,
    TRAP_LISTENER_CAPACITY,
};

/// Guest address space and region map.
pub mod memory;
pub use memory::{
    AccessError, AccessWidth, AddressSpace, CodeWriteObserver, MmioDevice, MmioError,
    RegionDescriptor, RegionId, RegionKind, SharedMmio, StoreId,
};

/// Error taxonomy: guest exceptions, memory faults and terminal errors.
pub mod fault;
pub use fault::{EmulatorError, ErrorClass, MemoryFault, Sh4Exception};

/// Architectural CPU state.
pub mod state;
pub use state::{ContextFixture, RegisterId, RegisterMismatch, RunState, Sh4Context};

/// Opcode definition table shared by decoder, disassembler and assembler.
pub mod encoding;
pub use encoding::{InstructionClass, OpDef, OpFlags, Opcode, Operand, OPCODE_TABLE};

/// Instruction decoder.
pub mod decoder;
pub use decoder::{DecodedInstruction, Decoder};

/// Per-class cycle costs.
pub mod timing;
pub use timing::{cycle_cost, instruction_cycles, CycleCostKind, CYCLE_COST_TABLE};

/// Instruction handlers.
pub mod execute;
pub use execute::{execute, handler_for, Exec, ExecFault, ExecResult, Flow, Handler};

/// Block translation and the translated-code cache.
pub mod jit;
pub use jit::{CacheStats, CodeCache, CompiledOp, TranslatedBlock, Translator};

/// The CPU core.
pub mod cpu;
pub use cpu::Sh4;

/// Shared virtual clock and timed events.
pub mod scheduler;
pub use scheduler::{ScheduledDevice, Scheduler, TimerAction, TimerCallback, TimerHandle};

/// On-chip peripherals.
pub mod peripherals;
pub use peripherals::{Ccn, Intc, InterruptSource, Tmu};

/// The device aggregate.
pub mod machine;
pub use machine::Dreamcast;

/// Host-facing configuration.
pub mod api;
pub use api::{ExceptionVectors, ExecutionMode, MachineConfig};

/// Execution counters.
pub mod diag;
pub use diag::{DiagProvider, Sh4Diagnostics};

/// Instruction disassembly.
pub mod disasm;
pub use disasm::{disassemble_one, disassemble_range, Disassembly, DisassemblyRow};

/// Render sink interface.
pub mod render;
pub use render::{HeadlessBackend, RenderBackend};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use serde_json as _;
