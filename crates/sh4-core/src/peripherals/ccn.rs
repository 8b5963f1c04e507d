//! Cache and exception controller (CCN).
//!
//! Holds the exception event registers the CPU latches on exception and
//! interrupt entry, and the cache-control register whose `ICI` bit flushes
//! the translated-code cache.

use std::cell::RefCell;
use std::rc::Weak;

use tracing::{debug, warn};

use crate::jit::CodeCache;
use crate::memory::{AccessWidth, MmioDevice, MmioError};

/// `CCR.ICI`: instruction cache invalidate.
pub const CCR_ICI: u32 = 1 << 11;
/// `CCR.OCI`: operand cache invalidate.
pub const CCR_OCI: u32 = 1 << 3;
/// Size of the mapped register block.
pub const CCN_BLOCK_SIZE: u32 = 0x40;

/// CCN register offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CcnRegister {
    /// Page table entry high.
    Pteh = 0x00,
    /// Page table entry low.
    Ptel = 0x04,
    /// Translation table base.
    Ttb = 0x08,
    /// Faulting address of the last address error.
    Tea = 0x0C,
    /// MMU control.
    Mmucr = 0x10,
    /// Break ASID A.
    Basra = 0x14,
    /// Break ASID B.
    Basrb = 0x18,
    /// Cache control.
    Ccr = 0x1C,
    /// `TRAPA` immediate, shifted left by two.
    Tra = 0x20,
    /// Exception event code.
    Expevt = 0x24,
    /// Interrupt event code.
    Intevt = 0x28,
    /// Page table entry assistance.
    Ptea = 0x34,
    /// Store queue area 0 control.
    Qacr0 = 0x38,
    /// Store queue area 1 control.
    Qacr1 = 0x3C,
}

impl CcnRegister {
    fn at(offset: u32) -> Option<Self> {
        Some(match offset {
            0x00 => Self::Pteh,
            0x04 => Self::Ptel,
            0x08 => Self::Ttb,
            0x0C => Self::Tea,
            0x10 => Self::Mmucr,
            0x14 => Self::Basra,
            0x18 => Self::Basrb,
            0x1C => Self::Ccr,
            0x20 => Self::Tra,
            0x24 => Self::Expevt,
            0x28 => Self::Intevt,
            0x34 => Self::Ptea,
            0x38 => Self::Qacr0,
            0x3C => Self::Qacr1,
            _ => return None,
        })
    }

    const fn slot(self) -> usize {
        self as usize / 4
    }
}

/// CCN register block.
#[derive(Debug, Default)]
pub struct Ccn {
    regs: [u32; 16],
    code_cache: Option<Weak<RefCell<CodeCache>>>,
}

impl Ccn {
    /// Creates the block with every register cleared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects the cache flushed by `CCR.ICI`.
    pub fn attach_code_cache(&mut self, cache: Weak<RefCell<CodeCache>>) {
        self.code_cache = Some(cache);
    }

    /// Current value of `reg`.
    #[must_use]
    pub const fn get(&self, reg: CcnRegister) -> u32 {
        self.regs[reg.slot()]
    }

    fn set(&mut self, reg: CcnRegister, value: u32) {
        self.regs[reg.slot()] = value;
    }

    /// Records a general exception: `EXPEVT`, and `TEA` for address errors.
    pub fn latch_exception(&mut self, expevt: u32, tea: Option<u32>) {
        self.set(CcnRegister::Expevt, expevt);
        if let Some(tea) = tea {
            self.set(CcnRegister::Tea, tea);
        }
    }

    /// Records a `TRAPA` immediate.
    pub fn latch_trap(&mut self, imm: u8) {
        self.set(CcnRegister::Tra, u32::from(imm) << 2);
    }

    /// Records an accepted interrupt.
    pub fn latch_interrupt(&mut self, intevt: u32) {
        self.set(CcnRegister::Intevt, intevt);
    }

    fn write_ccr(&mut self, value: u32) {
        if value & CCR_ICI != 0 {
            match self.code_cache.as_ref().and_then(Weak::upgrade) {
                Some(cache) => cache.borrow_mut().flush(),
                None => debug!("instruction cache invalidate with no code cache attached"),
            }
        }
        self.set(CcnRegister::Ccr, value & !(CCR_ICI | CCR_OCI));
    }
}

impl MmioDevice for Ccn {
    fn name(&self) -> &'static str {
        "ccn"
    }

    fn read(&mut self, offset: u32, width: AccessWidth) -> Result<u32, MmioError> {
        let reg = CcnRegister::at(offset).ok_or(MmioError::Unhandled(offset))?;
        if width != AccessWidth::Long {
            return Err(MmioError::Width(offset, width));
        }
        Ok(self.get(reg))
    }

    fn write(&mut self, offset: u32, width: AccessWidth, value: u32) -> Result<(), MmioError> {
        let Some(reg) = CcnRegister::at(offset) else {
            warn!(offset = format_args!("{offset:#x}"), "unhandled ccn write");
            return Err(MmioError::Unhandled(offset));
        };
        if width != AccessWidth::Long {
            return Err(MmioError::Width(offset, width));
        }
        match reg {
            CcnRegister::Ccr => self.write_ccr(value),
            other => self.set(other, value),
        }
        Ok(())
    }
}
