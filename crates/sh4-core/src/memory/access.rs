//! Access widths, width constraints and alignment policy.

use std::fmt;

use crate::fault::MemoryFault;

/// Width of a single guest memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessWidth {
    /// 8-bit access.
    Byte = 1,
    /// 16-bit access.
    Word = 2,
    /// 32-bit access.
    Long = 4,
    /// 64-bit access (paired FMOV).
    Quad = 8,
}

impl AccessWidth {
    /// Every width, narrowest first.
    pub const ALL: [Self; 4] = [Self::Byte, Self::Word, Self::Long, Self::Quad];

    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        self as u32
    }

    const fn mask_bit(self) -> u8 {
        match self {
            Self::Byte => 0b0001,
            Self::Word => 0b0010,
            Self::Long => 0b0100,
            Self::Quad => 0b1000,
        }
    }
}

impl fmt::Display for AccessWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bytes() * 8)
    }
}

/// Set of access widths a region accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WidthMask(u8);

impl WidthMask {
    /// Host memory: every width.
    pub const ALL: Self = Self(0b1111);
    /// Register blocks: 8, 16 and 32 bit.
    pub const UP_TO_LONG: Self = Self(0b0111);

    /// Builds a mask from an explicit width list.
    #[must_use]
    pub const fn of(widths: &[AccessWidth]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < widths.len() {
            bits |= widths[index].mask_bit();
            index += 1;
        }
        Self(bits)
    }

    /// Returns true when `width` is accepted.
    #[must_use]
    pub const fn allows(self, width: AccessWidth) -> bool {
        self.0 & width.mask_bit() != 0
    }
}

/// Rejects accesses whose address is not a multiple of the width.
///
/// # Errors
///
/// Returns [`MemoryFault::Misaligned`] for misaligned addresses.
pub const fn validate_alignment(addr: u32, width: AccessWidth) -> Result<(), MemoryFault> {
    if addr & (width.bytes() - 1) == 0 {
        Ok(())
    } else {
        Err(MemoryFault::Misaligned { addr, width })
    }
}

/// Rejects bulk copies whose length is not a multiple of 4 bytes.
///
/// # Errors
///
/// Returns [`MemoryFault::Misaligned`] when `addr` or `len` breaks the
/// 4-byte granularity.
pub const fn validate_bulk_copy(addr: u32, len: usize) -> Result<(), MemoryFault> {
    if len % 4 != 0 || addr & 3 != 0 {
        return Err(MemoryFault::Misaligned {
            addr,
            width: AccessWidth::Long,
        });
    }
    Ok(())
}

/// Reads a little-endian value of `width` from `bytes`.
#[must_use]
pub fn read_le(bytes: &[u8], width: AccessWidth) -> u64 {
    let mut buf = [0u8; 8];
    let len = width.bytes() as usize;
    buf[..len].copy_from_slice(&bytes[..len]);
    u64::from_le_bytes(buf)
}

/// Writes the low `width` bytes of `value` to `bytes`, little-endian.
pub fn write_le(bytes: &mut [u8], width: AccessWidth, value: u64) {
    let len = width.bytes() as usize;
    bytes[..len].copy_from_slice(&value.to_le_bytes()[..len]);
}
