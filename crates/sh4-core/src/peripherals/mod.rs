//! On-chip peripherals mapped into area 7.

/// Cache and exception controller.
pub mod ccn;
/// Interrupt controller.
pub mod intc;
/// Timer unit.
pub mod tmu;

pub use ccn::{Ccn, CcnRegister, CCN_BLOCK_SIZE, CCR_ICI};
pub use intc::{Intc, InterruptSource, PendingInterrupt, INTC_BLOCK_SIZE};
pub use tmu::{Tmu, TMU_BLOCK_SIZE, TMU_CHANNELS};
