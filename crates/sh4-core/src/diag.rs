//! Saturating execution counters and the provider trait hosts read them
//! through.

use crate::fault::Sh4Exception;
use crate::jit::CacheStats;

/// Counters kept by the CPU core and its collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Sh4Diagnostics {
    /// Guest instructions retired, delay slots included.
    pub instructions: u64,
    /// Blocks translated into the code cache.
    pub blocks_compiled: u64,
    /// Blocks dropped because their code was overwritten or flushed.
    pub block_invalidations: u64,
    /// Blocks dropped to make room in the code cache.
    pub evictions: u64,
    /// Guest exceptions entered.
    pub guest_exceptions: u64,
    /// Interrupts accepted.
    pub interrupts: u64,
    /// Fast-path traps offered to listeners.
    pub trap_dispatches: u64,
    /// Most recent guest exception.
    pub last_exception: Option<Sh4Exception>,
    /// Address of the instruction that raised `last_exception`.
    pub last_exception_pc: u32,
}

impl Sh4Diagnostics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts `count` retired instructions.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_instructions(&mut self, count: u64) {
        self.instructions = self.instructions.saturating_add(count);
    }

    /// Records entry into a guest exception handler.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_exception(&mut self, exception: Sh4Exception, pc: u32) {
        self.guest_exceptions = self.guest_exceptions.saturating_add(1);
        self.last_exception = Some(exception);
        self.last_exception_pc = pc;
    }

    /// Records an accepted interrupt.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_interrupt(&mut self) {
        self.interrupts = self.interrupts.saturating_add(1);
    }

    /// Folds in the code cache totals.
    #[must_use]
    pub const fn with_cache(mut self, stats: CacheStats) -> Self {
        self.blocks_compiled = stats.compiled;
        self.block_invalidations = stats.invalidated;
        self.evictions = stats.evicted;
        self
    }

    /// Folds in the trap layer's dispatch count.
    #[must_use]
    pub const fn with_trap_dispatches(mut self, dispatched: u64) -> Self {
        self.trap_dispatches = dispatched;
        self
    }

    /// Resets every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Source of diagnostic counters.
pub trait DiagProvider {
    /// Snapshot of the current counters.
    fn diagnostics(&self) -> Sh4Diagnostics;
}
