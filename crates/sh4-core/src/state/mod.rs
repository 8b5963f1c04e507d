//! Architectural CPU state.

/// Register context with banked general and floating-point files.
pub mod context;
/// Named register enumeration and partial-context fixtures.
pub mod registers;
/// Core run state between `run` calls.
pub mod run_state;

pub use context::{
    FpBank, Sh4Context, CONTEXT_LAYOUT_BYTES, FPSCR_DN, FPSCR_FR, FPSCR_MASK, FPSCR_PR,
    FPSCR_RM, FPSCR_SZ, SR_BL, SR_FD, SR_IMASK, SR_IMASK_SHIFT, SR_M, SR_MASK, SR_MD, SR_Q,
    SR_RB, SR_S, SR_T,
};
pub use registers::{ContextFixture, RegisterId, RegisterMismatch, UNINITIALIZED_REG};
pub use run_state::RunState;
