//! Flat guest address space assembled from region descriptors.
//!
//! Every 32-bit address resolves through a 64 KiB page table to exactly one
//! region or to a defined [`MemoryFault`]. Host memory regions own a backing
//! store; aliases and segment mirrors share it, so a write through any view
//! is visible through all of them.
//!
//! Two access paths exist. The checked path (`read_*` / `write_*`) resolves
//! and validates every access. The fast path (`fast_read_*` /
//! `fast_write_*`) only completes plain aligned RAM accesses on its own; any
//! other access is handed to the trap layer, and a claimed trap is retried
//! on the checked path.

use std::cell::RefCell;
use std::fmt;
use std::rc::Weak;

use tracing::debug;

use super::access::{read_le, validate_alignment, validate_bulk_copy, write_le, AccessWidth, WidthMask};
use super::map::{
    mirrored_bases, RegionDescriptor, RegionId, RegionKind, SharedMmio, CODE_PAGE_BITS,
    PAGE_BITS, PAGE_COUNT, PAGE_SIZE,
};
use crate::fault::{EmulatorError, MemoryFault};
use crate::trap::{AccessKind, CapturedState, ExceptionRecord, SharedTrapLayer, TrapCause};

/// Maximum number of declared regions.
pub const MAX_REGIONS: usize = 64;

const PAGE_MASK: u32 = PAGE_SIZE - 1;

/// Identifier of a host backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(pub(crate) u16);

impl StoreId {
    /// Index into the store table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Receives writes that land on code-protected pages.
///
/// Implemented by the translated-code cache so memory never needs to know
/// how blocks are tracked.
pub trait CodeWriteObserver {
    /// Invalidates every block overlapping `store[offset..offset + len]`.
    fn invalidate_code(&mut self, store: StoreId, offset: u32, len: u32);

    /// Returns true while any valid block still covers the 4 KiB code page.
    fn holds_code(&self, store: StoreId, code_page: u32) -> bool;
}

/// Failure of a fast-path access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// The trap was claimed and the checked retry produced a defined fault.
    Fault(MemoryFault),
    /// No listener claimed the trap.
    Unclaimed(ExceptionRecord),
}

/// Result of resolving one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Region the address belongs to.
    pub region: RegionId,
    /// Region name.
    pub name: &'static str,
    /// Byte offset within the region.
    pub offset: u32,
}

#[derive(Clone)]
enum Backing {
    Ram { store: StoreId, writable: bool },
    Mmio(SharedMmio),
}

struct Region {
    name: &'static str,
    size: u32,
    backing: Backing,
    backing_offset: u32,
    widths: WidthMask,
}

struct Store {
    data: Vec<u8>,
    code_pages: Vec<u64>,
}

impl Store {
    fn new(size: u32) -> Self {
        let code_page_count = (size as usize).div_ceil(1 << CODE_PAGE_BITS);
        Self {
            data: vec![0; size as usize],
            code_pages: vec![0; code_page_count.div_ceil(64)],
        }
    }

    fn page_range(offset: u32, len: u32) -> std::ops::RangeInclusive<u32> {
        let last = offset.saturating_add(len.max(1) - 1);
        (offset >> CODE_PAGE_BITS)..=(last >> CODE_PAGE_BITS)
    }

    fn is_code_page(&self, page: u32) -> bool {
        let page = page as usize;
        self.code_pages
            .get(page / 64)
            .is_some_and(|bits| bits & (1 << (page % 64)) != 0)
    }

    fn is_code(&self, offset: u32, len: u32) -> bool {
        Self::page_range(offset, len).any(|page| self.is_code_page(page))
    }

    fn set_code_page(&mut self, page: u32, protected: bool) {
        let page = page as usize;
        if let Some(bits) = self.code_pages.get_mut(page / 64) {
            if protected {
                *bits |= 1 << (page % 64);
            } else {
                *bits &= !(1 << (page % 64));
            }
        }
    }
}

#[derive(Clone, Copy)]
struct PageEntry {
    region: u16,
    page_offset: u32,
}

enum Target<'a> {
    Ram {
        store: StoreId,
        offset: u32,
        writable: bool,
    },
    Mmio {
        device: &'a SharedMmio,
        offset: u32,
    },
}

/// The guest address space of one machine.
pub struct AddressSpace {
    pages: Box<[Option<PageEntry>]>,
    regions: Vec<Region>,
    stores: Vec<Store>,
    trap: SharedTrapLayer,
    observer: Option<Weak<RefCell<dyn CodeWriteObserver>>>,
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("regions", &self.regions.iter().map(|r| r.name).collect::<Vec<_>>())
            .field("stores", &self.stores.len())
            .finish_non_exhaustive()
    }
}

impl AddressSpace {
    /// Creates an empty space whose fast path reports through `trap`.
    #[must_use]
    pub fn new(trap: SharedTrapLayer) -> Self {
        Self {
            pages: vec![None; PAGE_COUNT].into_boxed_slice(),
            regions: Vec::new(),
            stores: Vec::new(),
            trap,
            observer: None,
        }
    }

    /// Trap layer injected at construction.
    #[must_use]
    pub const fn trap_layer(&self) -> &SharedTrapLayer {
        &self.trap
    }

    /// Registers the observer notified of writes to code-protected pages.
    pub fn set_code_observer(&mut self, observer: Weak<RefCell<dyn CodeWriteObserver>>) {
        self.observer = Some(observer);
    }

    /// Number of declared regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Declares a region and maps it at its base (and mirrors, if requested).
    ///
    /// # Errors
    ///
    /// - [`EmulatorError::ResourceExhaustion`] once [`MAX_REGIONS`] exist.
    /// - [`EmulatorError::Configuration`] for empty, misaligned, overflowing
    ///   or overlapping ranges, and for aliases that exceed their target.
    pub fn add_region(&mut self, desc: RegionDescriptor) -> Result<RegionId, EmulatorError> {
        if self.regions.len() >= MAX_REGIONS {
            return Err(EmulatorError::ResourceExhaustion(format!(
                "region table full ({MAX_REGIONS} regions)"
            )));
        }
        if desc.size == 0 || desc.base % PAGE_SIZE != 0 {
            return Err(EmulatorError::Configuration(format!(
                "region {} must be non-empty and start on a {PAGE_SIZE:#x} boundary",
                desc.name
            )));
        }
        if u64::from(desc.base) + u64::from(desc.size) > 1 << 32 {
            return Err(EmulatorError::Configuration(format!(
                "region {} runs past the end of the address space",
                desc.name
            )));
        }

        let (backing, backing_offset) = match desc.kind {
            RegionKind::Ram { writable } => {
                let store = StoreId(u16::try_from(self.stores.len()).map_err(|_| {
                    EmulatorError::ResourceExhaustion("backing store table full".into())
                })?);
                self.stores.push(Store::new(desc.size));
                (Backing::Ram { store, writable }, 0)
            }
            RegionKind::Mmio(device) => (Backing::Mmio(device), 0),
            RegionKind::Alias { target, offset } => {
                let Some(target_region) = self.regions.get(target.index()) else {
                    return Err(EmulatorError::Configuration(format!(
                        "alias {} targets unknown region {}",
                        desc.name,
                        target.index()
                    )));
                };
                if u64::from(offset) + u64::from(desc.size) > u64::from(target_region.size) {
                    return Err(EmulatorError::Configuration(format!(
                        "alias {} exceeds target region {}",
                        desc.name, target_region.name
                    )));
                }
                (
                    target_region.backing.clone(),
                    target_region.backing_offset + offset,
                )
            }
        };

        let bases = if desc.mirrored {
            mirrored_bases(desc.base, desc.size)
        } else {
            vec![desc.base]
        };
        let page_span = desc.size.div_ceil(PAGE_SIZE);
        for &base in &bases {
            let first = (base >> PAGE_BITS) as usize;
            if let Some(taken) = self.pages[first..first + page_span as usize]
                .iter()
                .flatten()
                .next()
            {
                return Err(EmulatorError::Configuration(format!(
                    "region {} at {base:#010x} overlaps {}",
                    desc.name, self.regions[usize::from(taken.region)].name
                )));
            }
        }

        let id = RegionId(u16::try_from(self.regions.len()).unwrap_or(u16::MAX));
        for &base in &bases {
            let first = (base >> PAGE_BITS) as usize;
            for page in 0..page_span {
                self.pages[first + page as usize] = Some(PageEntry {
                    region: id.0,
                    page_offset: page * PAGE_SIZE,
                });
            }
        }
        self.regions.push(Region {
            name: desc.name,
            size: desc.size,
            backing,
            backing_offset,
            widths: desc.widths,
        });

        debug!(
            region = desc.name,
            base = format_args!("{:#010x}", desc.base),
            size = desc.size,
            mirrors = bases.len() - 1,
            "region mapped"
        );
        Ok(id)
    }

    /// Resolves `addr` to its region, or the defined fault for it.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryFault::Unmapped`] when no region covers `addr`.
    pub fn resolve(&self, addr: u32) -> Result<Resolution, MemoryFault> {
        let entry = self.pages[(addr >> PAGE_BITS) as usize].ok_or(MemoryFault::Unmapped { addr })?;
        let region = &self.regions[usize::from(entry.region)];
        let offset = entry.page_offset + (addr & PAGE_MASK);
        if offset >= region.size {
            return Err(MemoryFault::Unmapped { addr });
        }
        Ok(Resolution {
            region: RegionId(entry.region),
            name: region.name,
            offset,
        })
    }

    fn locate(&self, addr: u32, width: AccessWidth) -> Result<Target<'_>, MemoryFault> {
        validate_alignment(addr, width)?;
        let entry = self.pages[(addr >> PAGE_BITS) as usize].ok_or(MemoryFault::Unmapped { addr })?;
        let region = &self.regions[usize::from(entry.region)];
        if !region.widths.allows(width) {
            return Err(MemoryFault::WidthNotSupported { addr, width });
        }
        let offset = entry.page_offset + (addr & PAGE_MASK);
        if u64::from(offset) + u64::from(width.bytes()) > u64::from(region.size) {
            return Err(MemoryFault::Unmapped { addr });
        }
        let offset = region.backing_offset + offset;
        Ok(match &region.backing {
            Backing::Ram { store, writable } => Target::Ram {
                store: *store,
                offset,
                writable: *writable,
            },
            Backing::Mmio(device) => Target::Mmio { device, offset },
        })
    }

    /// Returns the backing store location of `addr` when it is host memory.
    #[must_use]
    pub fn ram_location(&self, addr: u32) -> Option<(StoreId, u32)> {
        match self.locate(addr, AccessWidth::Word) {
            Ok(Target::Ram { store, offset, .. }) => Some((store, offset)),
            _ => None,
        }
    }

    pub(crate) fn read(&self, addr: u32, width: AccessWidth) -> Result<u64, MemoryFault> {
        match self.locate(addr, width)? {
            Target::Ram { store, offset, .. } => {
                let data = &self.stores[store.index()].data;
                Ok(read_le(&data[offset as usize..], width))
            }
            Target::Mmio { device, offset } => {
                if width == AccessWidth::Quad {
                    return Err(MemoryFault::WidthNotSupported { addr, width });
                }
                let mut device = device.borrow_mut();
                device.read(offset, width).map(u64::from).map_err(|err| {
                    tracing::warn!(device = device.name(), %err, "mmio read rejected");
                    MemoryFault::Device { addr }
                })
            }
        }
    }

    pub(crate) fn write(
        &mut self,
        addr: u32,
        width: AccessWidth,
        value: u64,
    ) -> Result<(), MemoryFault> {
        let (store, offset) = match self.locate(addr, width)? {
            Target::Ram {
                store,
                offset,
                writable,
            } => {
                if !writable {
                    return Err(MemoryFault::ReadOnly { addr });
                }
                (store, offset)
            }
            Target::Mmio { device, offset } => {
                if width == AccessWidth::Quad {
                    return Err(MemoryFault::WidthNotSupported { addr, width });
                }
                let device = std::rc::Rc::clone(device);
                let mut device = device.borrow_mut();
                // Truncation to the access width is intended; wider bits are zero.
                #[allow(clippy::cast_possible_truncation)]
                return device.write(offset, width, value as u32).map_err(|err| {
                    tracing::warn!(device = device.name(), %err, "mmio write rejected");
                    MemoryFault::Device { addr }
                });
            }
        };

        if self.stores[store.index()].is_code(offset, width.bytes()) {
            self.notify_code_write(store, offset, width.bytes());
        }
        let data = &mut self.stores[store.index()].data;
        write_le(&mut data[offset as usize..], width, value);
        Ok(())
    }

    fn notify_code_write(&mut self, store: StoreId, offset: u32, len: u32) {
        let observer = self.observer.as_ref().and_then(Weak::upgrade);
        let pages = Store::page_range(offset, len);
        match observer {
            Some(observer) => {
                let mut observer = observer.borrow_mut();
                observer.invalidate_code(store, offset, len);
                for page in pages {
                    if !observer.holds_code(store, page) {
                        self.stores[store.index()].set_code_page(page, false);
                    }
                }
            }
            None => {
                for page in pages {
                    self.stores[store.index()].set_code_page(page, false);
                }
            }
        }
    }

    /// Marks `store[offset..offset + len]` as backing translated code.
    pub fn protect_code(&mut self, store: StoreId, offset: u32, len: u32) {
        if let Some(backing) = self.stores.get_mut(store.index()) {
            for page in Store::page_range(offset, len) {
                backing.set_code_page(page, true);
            }
        }
    }

    /// Returns true when the byte at `addr` lies on a code-protected page.
    #[must_use]
    pub fn is_code_protected(&self, addr: u32) -> bool {
        self.ram_location(addr & !1)
            .is_some_and(|(store, offset)| self.stores[store.index()].is_code(offset, 1))
    }

    /// Checked 8-bit read.
    ///
    /// # Errors
    ///
    /// Returns the defined [`MemoryFault`] for the address.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_u8(&self, addr: u32) -> Result<u8, MemoryFault> {
        self.read(addr, AccessWidth::Byte).map(|v| v as u8)
    }

    /// Checked 16-bit read.
    ///
    /// # Errors
    ///
    /// Returns the defined [`MemoryFault`] for the address.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_u16(&self, addr: u32) -> Result<u16, MemoryFault> {
        self.read(addr, AccessWidth::Word).map(|v| v as u16)
    }

    /// Checked 32-bit read.
    ///
    /// # Errors
    ///
    /// Returns the defined [`MemoryFault`] for the address.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_u32(&self, addr: u32) -> Result<u32, MemoryFault> {
        self.read(addr, AccessWidth::Long).map(|v| v as u32)
    }

    /// Checked 64-bit read.
    ///
    /// # Errors
    ///
    /// Returns the defined [`MemoryFault`] for the address.
    pub fn read_u64(&self, addr: u32) -> Result<u64, MemoryFault> {
        self.read(addr, AccessWidth::Quad)
    }

    /// Checked 8-bit write.
    ///
    /// # Errors
    ///
    /// Returns the defined [`MemoryFault`] for the address.
    pub fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), MemoryFault> {
        self.write(addr, AccessWidth::Byte, u64::from(value))
    }

    /// Checked 16-bit write.
    ///
    /// # Errors
    ///
    /// Returns the defined [`MemoryFault`] for the address.
    pub fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), MemoryFault> {
        self.write(addr, AccessWidth::Word, u64::from(value))
    }

    /// Checked 32-bit write.
    ///
    /// # Errors
    ///
    /// Returns the defined [`MemoryFault`] for the address.
    pub fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), MemoryFault> {
        self.write(addr, AccessWidth::Long, u64::from(value))
    }

    /// Checked 64-bit write.
    ///
    /// # Errors
    ///
    /// Returns the defined [`MemoryFault`] for the address.
    pub fn write_u64(&mut self, addr: u32, value: u64) -> Result<(), MemoryFault> {
        self.write(addr, AccessWidth::Quad, value)
    }

    /// Reads through the fast path.
    ///
    /// # Errors
    ///
    /// See [`AccessError`].
    pub fn fast_read(
        &self,
        addr: u32,
        width: AccessWidth,
        state: &CapturedState,
    ) -> Result<u64, AccessError> {
        let cause = match self.locate(addr, width) {
            Ok(Target::Ram { store, offset, .. }) => {
                let data = &self.stores[store.index()].data;
                return Ok(read_le(&data[offset as usize..], width));
            }
            Err(MemoryFault::Misaligned { .. }) => TrapCause::Misaligned,
            _ => TrapCause::Unbacked,
        };
        self.raise(addr, width, AccessKind::Read, cause, state)?;
        self.read(addr, width).map_err(AccessError::Fault)
    }

    /// Writes through the fast path.
    ///
    /// # Errors
    ///
    /// See [`AccessError`].
    pub fn fast_write(
        &mut self,
        addr: u32,
        width: AccessWidth,
        value: u64,
        state: &CapturedState,
    ) -> Result<(), AccessError> {
        let cause = match self.locate(addr, width) {
            Ok(Target::Ram {
                store,
                offset,
                writable: true,
            }) => {
                let backing = &mut self.stores[store.index()];
                if !backing.is_code(offset, width.bytes()) {
                    write_le(&mut backing.data[offset as usize..], width, value);
                    return Ok(());
                }
                TrapCause::WriteProtected
            }
            Err(MemoryFault::Misaligned { .. }) => TrapCause::Misaligned,
            _ => TrapCause::Unbacked,
        };
        self.raise(addr, width, AccessKind::Write, cause, state)?;
        self.write(addr, width, value).map_err(AccessError::Fault)
    }

    fn raise(
        &self,
        addr: u32,
        width: AccessWidth,
        access: AccessKind,
        cause: TrapCause,
        state: &CapturedState,
    ) -> Result<(), AccessError> {
        let record = ExceptionRecord {
            fault_addr: addr,
            access,
            width,
            cause,
            state: *state,
        };
        if self.trap.borrow_mut().dispatch(&record) {
            Ok(())
        } else {
            Err(AccessError::Unclaimed(record))
        }
    }

    /// Copies `src` into guest memory at `addr`.
    ///
    /// The whole destination is checked before the first byte lands, so a
    /// failed copy leaves guest memory untouched. Stores go through the
    /// checked path, so code-protected pages are invalidated exactly as for
    /// guest stores.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryFault::Misaligned`] unless both `addr` and the length
    /// are multiples of 4, otherwise the fault of the first word that is not
    /// writable host memory. Device registers are never bulk targets and
    /// report [`MemoryFault::Device`].
    pub fn memcpy_to_guest(&mut self, addr: u32, src: &[u8]) -> Result<(), MemoryFault> {
        validate_bulk_copy(addr, src.len())?;
        let mut cursor = addr;
        for _ in src.chunks_exact(4) {
            match self.locate(cursor, AccessWidth::Long)? {
                Target::Ram { writable: true, .. } => {}
                Target::Ram { .. } => return Err(MemoryFault::ReadOnly { addr: cursor }),
                Target::Mmio { .. } => return Err(MemoryFault::Device { addr: cursor }),
            }
            cursor = cursor.wrapping_add(4);
        }

        let mut cursor = addr;
        for chunk in src.chunks_exact(4) {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.write_u32(cursor, word)?;
            cursor = cursor.wrapping_add(4);
        }
        Ok(())
    }

    /// Copies guest memory at `addr` into `dst`.
    ///
    /// # Errors
    ///
    /// Same constraints as [`Self::memcpy_to_guest`].
    pub fn memcpy_from_guest(&self, addr: u32, dst: &mut [u8]) -> Result<(), MemoryFault> {
        validate_bulk_copy(addr, dst.len())?;
        let mut cursor = addr;
        for chunk in dst.chunks_exact_mut(4) {
            chunk.copy_from_slice(&self.read_u32(cursor)?.to_le_bytes());
            cursor = cursor.wrapping_add(4);
        }
        Ok(())
    }
}
