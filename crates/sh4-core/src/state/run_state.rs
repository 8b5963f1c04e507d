/// Execution state of the CPU core between `run` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Ready to execute the next instruction.
    #[default]
    Running,
    /// Halted by `SLEEP`; consumes no cycles until an interrupt is pending.
    Sleeping,
}

impl RunState {
    /// Returns true while halted.
    #[must_use]
    pub const fn is_halted(self) -> bool {
        matches!(self, Self::Sleeping)
    }
}
