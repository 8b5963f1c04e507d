//! Guest address map: segment mirroring, the default console layout and
//! region descriptors.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use super::access::{AccessWidth, WidthMask};

/// log2 of the page-table granularity.
pub const PAGE_BITS: u32 = 16;
/// Page-table granularity in bytes (64 KiB).
pub const PAGE_SIZE: u32 = 1 << PAGE_BITS;
/// Number of page-table entries covering the 32-bit space.
pub const PAGE_COUNT: usize = 1 << (32 - PAGE_BITS);
/// log2 of the code-protection granularity.
pub const CODE_PAGE_BITS: u32 = 12;
/// Code-protection granularity in bytes (4 KiB).
pub const CODE_PAGE_SIZE: u32 = 1 << CODE_PAGE_BITS;

/// Exclusive end of the 29-bit physical area space.
pub const PHYSICAL_END: u32 = 0x2000_0000;
/// Offsets at which physical areas reappear in P0, P1, P2 and P3.
pub const SEGMENT_MIRRORS: [u32; 6] = [
    0x2000_0000,
    0x4000_0000,
    0x6000_0000,
    0x8000_0000,
    0xA000_0000,
    0xC000_0000,
];
/// Start of area 7 control registers in physical space.
pub const AREA7_BASE: u32 = 0x1F00_0000;
/// Start of the P4 mirror of area 7.
pub const P4_CONTROL_BASE: u32 = 0xFF00_0000;

/// Boot ROM base.
pub const BOOT_ROM_BASE: u32 = 0x0000_0000;
/// Boot ROM size.
pub const BOOT_ROM_SIZE: u32 = 0x0020_0000;
/// Flash base.
pub const FLASH_BASE: u32 = 0x0020_0000;
/// Flash size.
pub const FLASH_SIZE: u32 = 0x0002_0000;
/// Audio RAM base.
pub const AUDIO_RAM_BASE: u32 = 0x0080_0000;
/// Audio RAM size.
pub const AUDIO_RAM_SIZE: u32 = 0x0020_0000;
/// Video RAM (32-bit path) base.
pub const VIDEO_RAM_BASE: u32 = 0x0500_0000;
/// Video RAM (64-bit path alias) base.
pub const VIDEO_RAM_ALIAS_BASE: u32 = 0x0400_0000;
/// Video RAM size.
pub const VIDEO_RAM_SIZE: u32 = 0x0080_0000;
/// System RAM base.
pub const SYSTEM_RAM_BASE: u32 = 0x0C00_0000;
/// Bases of the system RAM mirrors within area 3.
pub const SYSTEM_RAM_MIRRORS: [u32; 3] = [0x0D00_0000, 0x0E00_0000, 0x0F00_0000];
/// Largest system RAM a single area-3 window holds.
pub const SYSTEM_RAM_MAX: u32 = 0x0100_0000;
/// Cache/exception controller register block.
pub const CCN_BASE: u32 = 0x1F00_0000;
/// Interrupt controller register block.
pub const INTC_BASE: u32 = 0x1FD0_0000;
/// Timer unit register block.
pub const TMU_BASE: u32 = 0x1FD8_0000;

const _: () = assert_default_layout();

const fn assert_default_layout() {
    let bases = [
        BOOT_ROM_BASE,
        FLASH_BASE,
        AUDIO_RAM_BASE,
        VIDEO_RAM_ALIAS_BASE,
        VIDEO_RAM_BASE,
        SYSTEM_RAM_BASE,
        CCN_BASE,
        INTC_BASE,
        TMU_BASE,
    ];
    let mut index = 0;
    while index < bases.len() {
        assert!(bases[index] % PAGE_SIZE == 0, "region bases must be page aligned");
        assert!(bases[index] < PHYSICAL_END, "default regions are physical");
        index += 1;
    }
    assert!(BOOT_ROM_BASE + BOOT_ROM_SIZE <= FLASH_BASE, "rom overlaps flash");
    assert!(FLASH_BASE + FLASH_SIZE <= AUDIO_RAM_BASE, "flash overlaps audio ram");
    assert!(
        VIDEO_RAM_ALIAS_BASE + VIDEO_RAM_SIZE <= VIDEO_RAM_BASE,
        "video ram alias overlaps primary"
    );
    assert!(AREA7_BASE + (u32::MAX - P4_CONTROL_BASE) < PHYSICAL_END);
}

/// Returns every guest base at which a physical range starting at `base`
/// is visible, the physical base first.
///
/// Ranges in area 7 additionally appear in the P4 control window.
#[must_use]
pub fn mirrored_bases(base: u32, size: u32) -> Vec<u32> {
    if base >= PHYSICAL_END || base.saturating_add(size) > PHYSICAL_END {
        return vec![base];
    }
    let mut bases = Vec::with_capacity(SEGMENT_MIRRORS.len() + 2);
    bases.push(base);
    bases.extend(SEGMENT_MIRRORS.iter().map(|mirror| base + mirror));
    if base >= AREA7_BASE {
        bases.push(base - AREA7_BASE + P4_CONTROL_BASE);
    }
    bases
}

/// Error an MMIO device reports for an access it does not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MmioError {
    /// No register at this offset.
    #[error("no register at offset {0:#x}")]
    Unhandled(u32),
    /// Register exists but rejects this width.
    #[error("register at offset {0:#x} rejects {1} access")]
    Width(u32, AccessWidth),
}

/// Register-block device mapped into the guest address space.
pub trait MmioDevice {
    /// Short device name for logs.
    fn name(&self) -> &'static str;

    /// Reads a register at `offset` within the region.
    ///
    /// # Errors
    ///
    /// Returns [`MmioError`] for unimplemented offsets or widths.
    fn read(&mut self, offset: u32, width: AccessWidth) -> Result<u32, MmioError>;

    /// Writes a register at `offset` within the region.
    ///
    /// # Errors
    ///
    /// Returns [`MmioError`] for unimplemented offsets or widths.
    fn write(&mut self, offset: u32, width: AccessWidth, value: u32) -> Result<(), MmioError>;
}

/// Shared handle to a mapped device.
pub type SharedMmio = Rc<RefCell<dyn MmioDevice>>;

/// Identifier of a registered region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub(crate) u16);

impl RegionId {
    /// Index into the region table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Backing kind of a region declaration.
#[derive(Clone)]
pub enum RegionKind {
    /// Fresh zeroed host memory block.
    Ram {
        /// False for ROM-like blocks.
        writable: bool,
    },
    /// Register block served by a device.
    Mmio(SharedMmio),
    /// View into another region's backing at `offset`.
    Alias {
        /// Region whose backing is shared.
        target: RegionId,
        /// Byte offset into the target.
        offset: u32,
    },
}

impl fmt::Debug for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ram { writable } => f.debug_struct("Ram").field("writable", writable).finish(),
            Self::Mmio(device) => f
                .debug_tuple("Mmio")
                .field(&device.try_borrow().map_or("<busy>", |d| d.name()))
                .finish(),
            Self::Alias { target, offset } => f
                .debug_struct("Alias")
                .field("target", target)
                .field("offset", offset)
                .finish(),
        }
    }
}

/// Declaration of one guest address range.
#[derive(Debug, Clone)]
pub struct RegionDescriptor {
    /// Name for logs and diagnostics.
    pub name: &'static str,
    /// Page-aligned base in guest space.
    pub base: u32,
    /// Size in bytes.
    pub size: u32,
    /// Backing kind.
    pub kind: RegionKind,
    /// Accepted access widths.
    pub widths: WidthMask,
    /// Map the range into every segment mirror as well.
    pub mirrored: bool,
}

impl RegionDescriptor {
    /// Read-write host memory, mirrored across segments.
    #[must_use]
    pub const fn ram(name: &'static str, base: u32, size: u32) -> Self {
        Self {
            name,
            base,
            size,
            kind: RegionKind::Ram { writable: true },
            widths: WidthMask::ALL,
            mirrored: true,
        }
    }

    /// Read-only host memory, mirrored across segments.
    #[must_use]
    pub const fn rom(name: &'static str, base: u32, size: u32) -> Self {
        Self {
            name,
            base,
            size,
            kind: RegionKind::Ram { writable: false },
            widths: WidthMask::ALL,
            mirrored: true,
        }
    }

    /// Device register block, mirrored across segments.
    #[must_use]
    pub fn mmio(name: &'static str, base: u32, size: u32, device: SharedMmio) -> Self {
        Self {
            name,
            base,
            size,
            kind: RegionKind::Mmio(device),
            widths: WidthMask::UP_TO_LONG,
            mirrored: true,
        }
    }

    /// View of `target` starting at `offset`, mirrored across segments.
    #[must_use]
    pub const fn alias(
        name: &'static str,
        base: u32,
        size: u32,
        target: RegionId,
        offset: u32,
    ) -> Self {
        Self {
            name,
            base,
            size,
            kind: RegionKind::Alias { target, offset },
            widths: WidthMask::ALL,
            mirrored: true,
        }
    }

    /// Restricts the declaration to its own base only.
    #[must_use]
    pub fn unmirrored(mut self) -> Self {
        self.mirrored = false;
        self
    }
}
