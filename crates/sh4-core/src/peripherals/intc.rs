//! Interrupt controller (INTC).

use tracing::{trace, warn};

use crate::memory::{AccessWidth, MmioDevice, MmioError};

/// Size of the mapped register block.
pub const INTC_BLOCK_SIZE: u32 = 0x10;

/// Interrupt request lines routed through the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InterruptSource {
    /// Timer channel 0 underflow.
    Tmu0,
    /// Timer channel 1 underflow.
    Tmu1,
    /// Timer channel 2 underflow.
    Tmu2,
    /// External request at level 9.
    Irl9,
    /// External request at level 11.
    Irl11,
    /// External request at level 13 (vertical blank).
    Irl13,
}

impl InterruptSource {
    /// Every source, in fixed-priority tie-break order.
    pub const ALL: [Self; 6] = [
        Self::Irl13,
        Self::Irl11,
        Self::Irl9,
        Self::Tmu0,
        Self::Tmu1,
        Self::Tmu2,
    ];

    /// Code latched into `INTEVT` when the source is accepted.
    #[must_use]
    pub const fn intevt(self) -> u32 {
        match self {
            Self::Tmu0 => 0x400,
            Self::Tmu1 => 0x420,
            Self::Tmu2 => 0x440,
            Self::Irl9 => 0x320,
            Self::Irl11 => 0x360,
            Self::Irl13 => 0x3A0,
        }
    }

    /// External requests are edge triggered and drop on acceptance.
    #[must_use]
    pub const fn is_external(self) -> bool {
        matches!(self, Self::Irl9 | Self::Irl11 | Self::Irl13)
    }

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// The highest-priority request awaiting acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingInterrupt {
    /// Requesting source.
    pub source: InterruptSource,
    /// Priority level, 1 to 15.
    pub level: u32,
    /// Code for `INTEVT`.
    pub intevt: u32,
}

/// INTC register block and pending-request latch.
#[derive(Debug, Default, Clone)]
pub struct Intc {
    icr: u16,
    ipra: u16,
    iprb: u16,
    iprc: u16,
    pending: u8,
}

impl Intc {
    /// Creates the controller with every priority at zero (masked).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asserts `source`.
    pub fn raise(&mut self, source: InterruptSource) {
        trace!(?source, "interrupt raised");
        self.pending |= source.bit();
    }

    /// Deasserts `source`.
    pub fn clear(&mut self, source: InterruptSource) {
        self.pending &= !source.bit();
    }

    /// Returns true while `source` is asserted.
    #[must_use]
    pub const fn is_pending(&self, source: InterruptSource) -> bool {
        self.pending & source.bit() != 0
    }

    /// Called on acceptance; drops edge-triggered requests.
    pub fn acknowledge(&mut self, source: InterruptSource) {
        if source.is_external() {
            self.clear(source);
        }
    }

    /// Priority of `source`; zero means masked.
    #[must_use]
    pub const fn level(&self, source: InterruptSource) -> u32 {
        let nibble = match source {
            InterruptSource::Tmu0 => self.ipra >> 12,
            InterruptSource::Tmu1 => self.ipra >> 8,
            InterruptSource::Tmu2 => self.ipra >> 4,
            InterruptSource::Irl9 => return 9,
            InterruptSource::Irl11 => return 11,
            InterruptSource::Irl13 => return 13,
        };
        (nibble & 0xF) as u32
    }

    /// Highest-level asserted source with a non-zero priority.
    #[must_use]
    pub fn highest_pending(&self) -> Option<PendingInterrupt> {
        InterruptSource::ALL
            .iter()
            .copied()
            .filter(|&source| self.is_pending(source))
            .map(|source| PendingInterrupt {
                source,
                level: self.level(source),
                intevt: source.intevt(),
            })
            .filter(|pending| pending.level > 0)
            .reduce(|best, next| if next.level > best.level { next } else { best })
    }

    fn register(&mut self, offset: u32) -> Option<&mut u16> {
        match offset {
            0x0 => Some(&mut self.icr),
            0x4 => Some(&mut self.ipra),
            0x8 => Some(&mut self.iprb),
            0xC => Some(&mut self.iprc),
            _ => None,
        }
    }
}

impl MmioDevice for Intc {
    fn name(&self) -> &'static str {
        "intc"
    }

    fn read(&mut self, offset: u32, width: AccessWidth) -> Result<u32, MmioError> {
        let reg = self.register(offset).ok_or(MmioError::Unhandled(offset))?;
        if width != AccessWidth::Word {
            return Err(MmioError::Width(offset, width));
        }
        Ok(u32::from(*reg))
    }

    fn write(&mut self, offset: u32, width: AccessWidth, value: u32) -> Result<(), MmioError> {
        let Some(reg) = self.register(offset) else {
            warn!(offset = format_args!("{offset:#x}"), "unhandled intc write");
            return Err(MmioError::Unhandled(offset));
        };
        if width != AccessWidth::Word {
            return Err(MmioError::Width(offset, width));
        }
        #[allow(clippy::cast_possible_truncation)]
        {
            *reg = value as u16;
        }
        Ok(())
    }
}
