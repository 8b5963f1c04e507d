//! Timer unit (TMU): three 32-bit down counters on the peripheral clock.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{trace, warn};

use super::intc::{Intc, InterruptSource};
use crate::fault::EmulatorError;
use crate::memory::{AccessWidth, AddressSpace, MmioDevice, MmioError};
use crate::scheduler::ScheduledDevice;

/// Size of the mapped register block.
pub const TMU_BLOCK_SIZE: u32 = 0x30;
/// Number of timer channels.
pub const TMU_CHANNELS: usize = 3;
/// CPU cycles per peripheral clock tick.
pub const PERIPHERAL_CLOCK_DIVIDER: u64 = 4;

/// `TCR.UNF`: underflow flag.
pub const TCR_UNF: u16 = 1 << 8;
/// `TCR.UNIE`: underflow interrupt enable.
pub const TCR_UNIE: u16 = 1 << 5;
/// `TCR.TPSC`: prescaler select.
pub const TCR_TPSC: u16 = 0b111;

const TOCR: u32 = 0x00;
const TSTR: u32 = 0x04;
const CHANNEL_BASE: u32 = 0x08;
const CHANNEL_STRIDE: u32 = 0x0C;
const TCPR2: u32 = 0x2C;

#[derive(Debug, Clone, Copy, Default)]
struct Channel {
    tcor: u32,
    tcnt: u32,
    tcr: u16,
    /// CPU cycles accumulated towards the next count.
    residue: u64,
}

impl Channel {
    /// CPU cycles per count for the selected prescaler.
    fn period(self) -> u64 {
        let divider = match self.tcr & TCR_TPSC {
            0 => 4,
            1 => 16,
            2 => 64,
            3 => 256,
            _ => 1024,
        };
        PERIPHERAL_CLOCK_DIVIDER * divider
    }

    /// Advances by `cycles` and returns true on any underflow.
    fn advance(&mut self, cycles: u64) -> bool {
        let period = self.period();
        self.residue += cycles;
        let mut ticks = self.residue / period;
        self.residue %= period;
        let mut underflowed = false;
        while ticks > 0 {
            let to_underflow = u64::from(self.tcnt) + 1;
            if ticks < to_underflow {
                #[allow(clippy::cast_possible_truncation)]
                {
                    self.tcnt -= ticks as u32;
                }
                break;
            }
            ticks -= to_underflow;
            self.tcnt = self.tcor;
            underflowed = true;
            let reload_period = u64::from(self.tcor) + 1;
            ticks %= reload_period;
        }
        underflowed
    }
}

enum Register {
    Tocr,
    Tstr,
    Tcor(usize),
    Tcnt(usize),
    Tcr(usize),
    Tcpr2,
}

impl Register {
    fn at(offset: u32) -> Option<Self> {
        match offset {
            TOCR => Some(Self::Tocr),
            TSTR => Some(Self::Tstr),
            TCPR2 => Some(Self::Tcpr2),
            o if (CHANNEL_BASE..TCPR2).contains(&o) && o % 4 == 0 => {
                let channel = ((o - CHANNEL_BASE) / CHANNEL_STRIDE) as usize;
                Some(match (o - CHANNEL_BASE) % CHANNEL_STRIDE {
                    0 => Self::Tcor(channel),
                    4 => Self::Tcnt(channel),
                    _ => Self::Tcr(channel),
                })
            }
            _ => None,
        }
    }

    const fn width(&self) -> AccessWidth {
        match self {
            Self::Tocr | Self::Tstr => AccessWidth::Byte,
            Self::Tcr(_) => AccessWidth::Word,
            Self::Tcor(_) | Self::Tcnt(_) | Self::Tcpr2 => AccessWidth::Long,
        }
    }
}

/// TMU register block and counters.
#[derive(Debug)]
pub struct Tmu {
    tocr: u8,
    tstr: u8,
    tcpr2: u32,
    channels: [Channel; TMU_CHANNELS],
    intc: Rc<RefCell<Intc>>,
}

impl Tmu {
    /// Creates the unit with every channel stopped; underflows raise
    /// through `intc`.
    #[must_use]
    pub fn new(intc: Rc<RefCell<Intc>>) -> Self {
        let reset = Channel {
            tcor: u32::MAX,
            tcnt: u32::MAX,
            ..Channel::default()
        };
        Self {
            tocr: 0,
            tstr: 0,
            tcpr2: 0,
            channels: [reset; TMU_CHANNELS],
            intc,
        }
    }

    const fn source(channel: usize) -> InterruptSource {
        match channel {
            0 => InterruptSource::Tmu0,
            1 => InterruptSource::Tmu1,
            _ => InterruptSource::Tmu2,
        }
    }

    /// Returns true while `channel` is counting.
    #[must_use]
    pub const fn is_started(&self, channel: usize) -> bool {
        channel < TMU_CHANNELS && self.tstr & (1 << channel) != 0
    }

    /// Current counter value of `channel`.
    #[must_use]
    pub fn count(&self, channel: usize) -> Option<u32> {
        self.channels.get(channel).map(|c| c.tcnt)
    }

    fn write_tcr(&mut self, channel: usize, value: u16) {
        let tcr = &mut self.channels[channel].tcr;
        // UNF can only be cleared by software.
        let unf = if value & TCR_UNF == 0 { 0 } else { *tcr & TCR_UNF };
        *tcr = (value & !TCR_UNF) | unf;
        self.update_interrupt(channel);
    }

    fn update_interrupt(&self, channel: usize) {
        let tcr = self.channels[channel].tcr;
        let source = Self::source(channel);
        let mut intc = self.intc.borrow_mut();
        if tcr & TCR_UNF != 0 && tcr & TCR_UNIE != 0 {
            intc.raise(source);
        } else {
            intc.clear(source);
        }
    }
}

impl ScheduledDevice for Tmu {
    fn name(&self) -> &'static str {
        "tmu"
    }

    fn run(&mut self, _: &mut AddressSpace, cycles: u64) -> Result<u64, EmulatorError> {
        if self.tstr & 0b111 == 0 {
            return Ok(0);
        }
        for channel in 0..TMU_CHANNELS {
            if !self.is_started(channel) {
                continue;
            }
            if self.channels[channel].advance(cycles) {
                trace!(channel, "timer underflow");
                self.channels[channel].tcr |= TCR_UNF;
                self.update_interrupt(channel);
            }
        }
        Ok(cycles)
    }
}

impl MmioDevice for Tmu {
    fn name(&self) -> &'static str {
        "tmu"
    }

    fn read(&mut self, offset: u32, width: AccessWidth) -> Result<u32, MmioError> {
        let reg = Register::at(offset).ok_or(MmioError::Unhandled(offset))?;
        if reg.width() != width {
            return Err(MmioError::Width(offset, width));
        }
        Ok(match reg {
            Register::Tocr => u32::from(self.tocr),
            Register::Tstr => u32::from(self.tstr),
            Register::Tcpr2 => self.tcpr2,
            Register::Tcor(c) => self.channels[c].tcor,
            Register::Tcnt(c) => self.channels[c].tcnt,
            Register::Tcr(c) => u32::from(self.channels[c].tcr),
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write(&mut self, offset: u32, width: AccessWidth, value: u32) -> Result<(), MmioError> {
        let Some(reg) = Register::at(offset) else {
            warn!(offset = format_args!("{offset:#x}"), "unhandled tmu write");
            return Err(MmioError::Unhandled(offset));
        };
        if reg.width() != width {
            return Err(MmioError::Width(offset, width));
        }
        match reg {
            Register::Tocr => self.tocr = value as u8 & 1,
            Register::Tstr => {
                let started = value as u8 & 0b111;
                for channel in 0..TMU_CHANNELS {
                    if started & (1 << channel) != 0 && !self.is_started(channel) {
                        self.channels[channel].residue = 0;
                    }
                }
                self.tstr = started;
            }
            Register::Tcpr2 => self.tcpr2 = value,
            Register::Tcor(c) => self.channels[c].tcor = value,
            Register::Tcnt(c) => self.channels[c].tcnt = value,
            Register::Tcr(c) => self.write_tcr(c, value as u16),
        }
        Ok(())
    }
}
