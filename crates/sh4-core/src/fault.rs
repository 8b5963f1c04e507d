use thiserror::Error;

use crate::memory::AccessWidth;
use crate::trap::ExceptionRecord;

/// Error classes used for diagnostics aggregation and propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ErrorClass {
    /// Setup-time resource-limit violation; never retried.
    Configuration,
    /// Guest-visible fault resolved by redirecting guest execution.
    Architectural,
    /// Unclaimed trap; terminates the current run.
    Host,
    /// Cache or region-table limits that could not be reclaimed.
    ResourceExhaustion,
}

/// Guest-visible exceptions raised by instruction execution.
///
/// These never escape the CPU core: they are turned into exception entry at
/// the guest vector base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Sh4Exception {
    /// Undefined or privileged-in-user-mode instruction.
    #[error("general illegal instruction")]
    IllegalInstruction,
    /// Illegal instruction (including any branch) in a delay slot.
    #[error("slot illegal instruction")]
    SlotIllegalInstruction,
    /// Misaligned or unmapped data read, or instruction fetch.
    #[error("address error on read at {0:#010x}")]
    AddressErrorRead(u32),
    /// Misaligned, unmapped or read-only data write.
    #[error("address error on write at {0:#010x}")]
    AddressErrorWrite(u32),
    /// `TRAPA #imm`.
    #[error("unconditional trap #{0:#04x}")]
    Trap(u8),
    /// FPU instruction while `SR.FD` is set.
    #[error("fpu disabled")]
    FpuDisabled,
    /// FPU instruction in a delay slot while `SR.FD` is set.
    #[error("slot fpu disabled")]
    SlotFpuDisabled,
}

impl Sh4Exception {
    /// Returns the `EXPEVT` code written on exception entry.
    #[must_use]
    pub const fn expevt(self) -> u32 {
        match self {
            Self::IllegalInstruction => 0x180,
            Self::SlotIllegalInstruction => 0x1A0,
            Self::AddressErrorRead(_) => 0x0E0,
            Self::AddressErrorWrite(_) => 0x100,
            Self::Trap(_) => 0x160,
            Self::FpuDisabled => 0x800,
            Self::SlotFpuDisabled => 0x820,
        }
    }

    /// Returns the faulting address latched into `TEA`, if any.
    #[must_use]
    pub const fn tea(self) -> Option<u32> {
        match self {
            Self::AddressErrorRead(addr) | Self::AddressErrorWrite(addr) => Some(addr),
            _ => None,
        }
    }

    /// Returns the delay-slot flavour of this exception.
    #[must_use]
    pub const fn in_delay_slot(self) -> Self {
        match self {
            Self::IllegalInstruction => Self::SlotIllegalInstruction,
            Self::FpuDisabled => Self::SlotFpuDisabled,
            other => other,
        }
    }
}

/// Defined faults produced by guest address-space accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MemoryFault {
    /// Address is not a multiple of the access width, or a bulk copy length
    /// is not a multiple of 4.
    #[error("misaligned {width} access at {addr:#010x}")]
    Misaligned {
        /// Guest address of the access.
        addr: u32,
        /// Width of the access.
        width: AccessWidth,
    },
    /// No region backs the address.
    #[error("unmapped address {addr:#010x}")]
    Unmapped {
        /// Guest address of the access.
        addr: u32,
    },
    /// Region does not accept accesses of this width.
    #[error("{width} access not supported at {addr:#010x}")]
    WidthNotSupported {
        /// Guest address of the access.
        addr: u32,
        /// Width of the access.
        width: AccessWidth,
    },
    /// Write to a read-only host block.
    #[error("write to read-only address {addr:#010x}")]
    ReadOnly {
        /// Guest address of the access.
        addr: u32,
    },
    /// MMIO device rejected the access.
    #[error("device rejected access at {addr:#010x}")]
    Device {
        /// Guest address of the access.
        addr: u32,
    },
}

impl MemoryFault {
    /// Returns the guest address that faulted.
    #[must_use]
    pub const fn addr(self) -> u32 {
        match self {
            Self::Misaligned { addr, .. }
            | Self::Unmapped { addr }
            | Self::WidthNotSupported { addr, .. }
            | Self::ReadOnly { addr }
            | Self::Device { addr } => addr,
        }
    }
}

/// Terminal errors surfaced to the device aggregate and its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmulatorError {
    /// Setup-time limit violation or invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A trap no listener claimed; address-space integrity is lost.
    #[error("unclaimed host fault at {:#010x} (pc {:#010x})", .0.fault_addr, .0.state.pc)]
    HostFault(Box<ExceptionRecord>),
    /// Translated-code cache or region table is full and nothing is reclaimable.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),
    /// Trap platform hook could not be installed.
    #[error("trap handler install failed: {0}")]
    Install(String),
    /// Serialized register context does not match the fixed layout.
    #[error("register context layout mismatch: expected {expected} bytes, got {actual}")]
    ContextLayout {
        /// Required byte length.
        expected: usize,
        /// Supplied byte length.
        actual: usize,
    },
}

impl EmulatorError {
    /// Returns the error class for propagation and diagnostics.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Configuration(_) | Self::Install(_) | Self::ContextLayout { .. } => {
                ErrorClass::Configuration
            }
            Self::HostFault(_) => ErrorClass::Host,
            Self::ResourceExhaustion(_) => ErrorClass::ResourceExhaustion,
        }
    }

    /// Returns true if the machine must not continue after this error.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::HostFault(_) | Self::ResourceExhaustion(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Sh4Exception::IllegalInstruction, 0x180)]
    #[case(Sh4Exception::SlotIllegalInstruction, 0x1A0)]
    #[case(Sh4Exception::AddressErrorRead(0x8c00_0001), 0x0E0)]
    #[case(Sh4Exception::AddressErrorWrite(0x8c00_0001), 0x100)]
    #[case(Sh4Exception::Trap(0x20), 0x160)]
    #[case(Sh4Exception::FpuDisabled, 0x800)]
    #[case(Sh4Exception::SlotFpuDisabled, 0x820)]
    fn expevt_codes_match_hardware(#[case] exception: Sh4Exception, #[case] code: u32) {
        assert_eq!(exception.expevt(), code);
    }

    #[test]
    fn delay_slot_flavour_only_changes_illegal_and_fpu() {
        assert_eq!(
            Sh4Exception::IllegalInstruction.in_delay_slot(),
            Sh4Exception::SlotIllegalInstruction
        );
        assert_eq!(
            Sh4Exception::FpuDisabled.in_delay_slot(),
            Sh4Exception::SlotFpuDisabled
        );
        assert_eq!(
            Sh4Exception::Trap(3).in_delay_slot(),
            Sh4Exception::Trap(3)
        );
        assert_eq!(
            Sh4Exception::AddressErrorRead(2).in_delay_slot(),
            Sh4Exception::AddressErrorRead(2)
        );
    }

    #[test]
    fn tea_is_only_latched_for_address_errors() {
        assert_eq!(Sh4Exception::AddressErrorWrite(0x1234).tea(), Some(0x1234));
        assert_eq!(Sh4Exception::Trap(1).tea(), None);
    }

    #[test]
    fn error_classes_drive_terminal_policy() {
        let config = EmulatorError::Configuration("too many listeners".into());
        assert_eq!(config.class(), ErrorClass::Configuration);
        assert!(!config.is_terminal());

        let exhausted = EmulatorError::ResourceExhaustion("code cache".into());
        assert_eq!(exhausted.class(), ErrorClass::ResourceExhaustion);
        assert!(exhausted.is_terminal());
    }

    #[test]
    fn memory_fault_reports_address() {
        let fault = MemoryFault::Misaligned {
            addr: 0x8c01_0001,
            width: AccessWidth::Word,
        };
        assert_eq!(fault.addr(), 0x8c01_0001);
        assert!(fault.to_string().contains("0x8c010001"));
    }
}
