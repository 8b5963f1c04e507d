//! Host-facing configuration for embedding the emulator core.

use crate::fault::EmulatorError;
use crate::memory::SYSTEM_RAM_MAX;

/// Default scheduler slice length in CPU cycles.
pub const DEFAULT_SLICE_CYCLES: u64 = 4096;
/// Default translated-block cache capacity.
pub const DEFAULT_CODE_CACHE_BLOCKS: usize = 8192;
/// Default upper bound on guest instructions per translated block.
pub const DEFAULT_MAX_BLOCK_INSTRUCTIONS: usize = 64;
/// Default system RAM size (16 MiB).
pub const DEFAULT_RAM_SIZE: u32 = SYSTEM_RAM_MAX;
/// Smallest accepted system RAM size.
pub const MIN_RAM_SIZE: u32 = 0x0001_0000;
/// Default CPU clock (200 MHz).
pub const DEFAULT_CPU_CLOCK_HZ: u64 = 200_000_000;
/// Default vertical blank rate.
pub const DEFAULT_VBLANK_HZ: u32 = 60;

/// How the CPU core turns guest code into host work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ExecutionMode {
    /// Decode and execute one instruction at a time, without caching.
    Interpreter,
    /// Pre-decode basic blocks into the translated-code cache.
    #[default]
    Translator,
}

/// Offsets from `VBR` at which exception and interrupt entry land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ExceptionVectors {
    /// General exception vector offset.
    pub general: u32,
    /// Interrupt vector offset.
    pub interrupt: u32,
}

impl Default for ExceptionVectors {
    fn default() -> Self {
        Self {
            general: 0x100,
            interrupt: 0x600,
        }
    }
}

/// Top-level immutable configuration for one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MachineConfig {
    /// Interpreter or block translator.
    pub execution_mode: ExecutionMode,
    /// Routes translated loads and stores through the trap-backed fast path.
    pub fastmem: bool,
    /// Scheduler slice length in CPU cycles.
    pub slice_cycles: u64,
    /// Maximum number of live translated blocks.
    pub code_cache_blocks: usize,
    /// Upper bound on instructions per translated block.
    pub max_block_instructions: usize,
    /// System RAM size; a power of two between 64 KiB and 16 MiB.
    pub ram_size: u32,
    /// Exception and interrupt vector offsets.
    pub vectors: ExceptionVectors,
    /// CPU clock in Hz, used to convert timer rates into cycles.
    pub cpu_clock_hz: u64,
    /// Vertical blank rate, or `None` to disable the vblank source.
    pub vblank_hz: Option<u32>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Translator,
            fastmem: true,
            slice_cycles: DEFAULT_SLICE_CYCLES,
            code_cache_blocks: DEFAULT_CODE_CACHE_BLOCKS,
            max_block_instructions: DEFAULT_MAX_BLOCK_INSTRUCTIONS,
            ram_size: DEFAULT_RAM_SIZE,
            vectors: ExceptionVectors::default(),
            cpu_clock_hz: DEFAULT_CPU_CLOCK_HZ,
            vblank_hz: Some(DEFAULT_VBLANK_HZ),
        }
    }
}

impl MachineConfig {
    /// Interpreter-mode configuration with everything else at defaults.
    #[must_use]
    pub fn interpreter() -> Self {
        Self {
            execution_mode: ExecutionMode::Interpreter,
            ..Self::default()
        }
    }

    /// Checks every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::Configuration`] naming the first bad field.
    pub fn validate(&self) -> Result<(), EmulatorError> {
        let fail = |msg: String| Err(EmulatorError::Configuration(msg));
        if self.slice_cycles == 0 {
            return fail("slice_cycles must be non-zero".into());
        }
        if self.code_cache_blocks == 0 {
            return fail("code_cache_blocks must be non-zero".into());
        }
        if self.max_block_instructions == 0 {
            return fail("max_block_instructions must be non-zero".into());
        }
        if !self.ram_size.is_power_of_two()
            || self.ram_size < MIN_RAM_SIZE
            || self.ram_size > SYSTEM_RAM_MAX
        {
            return fail(format!(
                "ram_size {:#x} must be a power of two in {MIN_RAM_SIZE:#x}..={SYSTEM_RAM_MAX:#x}",
                self.ram_size
            ));
        }
        if self.vectors.general % 2 != 0 || self.vectors.interrupt % 2 != 0 {
            return fail("exception vectors must be instruction aligned".into());
        }
        if self.cpu_clock_hz == 0 {
            return fail("cpu_clock_hz must be non-zero".into());
        }
        if self.vblank_hz == Some(0) {
            return fail("vblank_hz must be non-zero when set".into());
        }
        Ok(())
    }

    /// Cycles between two vertical blanks, if enabled.
    #[must_use]
    pub fn vblank_period(&self) -> Option<u64> {
        self.vblank_hz
            .map(|hz| (self.cpu_clock_hz / u64::from(hz)).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = MachineConfig::default();
        assert_eq!(config.execution_mode, ExecutionMode::Translator);
        assert_eq!(config.vectors.general, 0x100);
        assert_eq!(config.vectors.interrupt, 0x600);
        assert!(config.validate().is_ok());
        assert_eq!(config.vblank_period(), Some(3_333_333));
    }

    #[rstest]
    #[case::zero_slice(MachineConfig { slice_cycles: 0, ..MachineConfig::default() })]
    #[case::zero_cache(MachineConfig { code_cache_blocks: 0, ..MachineConfig::default() })]
    #[case::zero_block(MachineConfig { max_block_instructions: 0, ..MachineConfig::default() })]
    #[case::odd_ram(MachineConfig { ram_size: 0x0030_0000, ..MachineConfig::default() })]
    #[case::tiny_ram(MachineConfig { ram_size: 0x1000, ..MachineConfig::default() })]
    #[case::huge_ram(MachineConfig { ram_size: 0x0200_0000, ..MachineConfig::default() })]
    #[case::zero_vblank(MachineConfig { vblank_hz: Some(0), ..MachineConfig::default() })]
    fn invalid_configs_are_rejected(#[case] config: MachineConfig) {
        assert!(matches!(
            config.validate(),
            Err(EmulatorError::Configuration(_))
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_config_fills_defaults() {
        let config: MachineConfig =
            serde_json::from_str(r#"{"execution_mode":"Interpreter","slice_cycles":128}"#)
                .unwrap();
        assert_eq!(config.execution_mode, ExecutionMode::Interpreter);
        assert_eq!(config.slice_cycles, 128);
        assert_eq!(config.code_cache_blocks, DEFAULT_CODE_CACHE_BLOCKS);
    }
}
