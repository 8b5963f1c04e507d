//! Guest memory: access policy, address map and the address space itself.

/// Access widths, width masks and alignment policy.
pub mod access;
/// Segment mirroring, default console layout and region descriptors.
pub mod map;
/// Page-table backed guest address space.
pub mod space;

pub use access::{validate_alignment, validate_bulk_copy, AccessWidth, WidthMask};
pub use map::{
    mirrored_bases, MmioDevice, MmioError, RegionDescriptor, RegionId, RegionKind, SharedMmio,
    AUDIO_RAM_BASE, AUDIO_RAM_SIZE, BOOT_ROM_BASE, BOOT_ROM_SIZE, CCN_BASE, CODE_PAGE_BITS,
    CODE_PAGE_SIZE, FLASH_BASE, FLASH_SIZE, INTC_BASE, PAGE_SIZE, SYSTEM_RAM_BASE,
    SYSTEM_RAM_MAX, SYSTEM_RAM_MIRRORS, TMU_BASE, VIDEO_RAM_ALIAS_BASE, VIDEO_RAM_BASE,
    VIDEO_RAM_SIZE,
};
pub use space::{AccessError, AddressSpace, CodeWriteObserver, Resolution, StoreId, MAX_REGIONS};
