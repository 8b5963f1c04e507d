use std::cell::Cell;
use std::fmt;

use crate::decoder::DecodedInstruction;
use crate::execute::Handler;
use crate::memory::StoreId;

/// One pre-decoded instruction of a block.
#[derive(Clone, Copy)]
pub struct CompiledOp {
    /// Shared instruction handler.
    pub handler: Handler,
    /// Decoded operand fields.
    pub instr: DecodedInstruction,
    /// Guest address of the instruction.
    pub pc: u32,
}

impl fmt::Debug for CompiledOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledOp")
            .field("pc", &format_args!("{:#010x}", self.pc))
            .field("op", &self.instr.op())
            .finish_non_exhaustive()
    }
}

/// A run of guest instructions translated into threaded handler calls.
#[derive(Debug)]
pub struct TranslatedBlock {
    start: u32,
    store: StoreId,
    offset: u32,
    ops: Vec<CompiledOp>,
    valid: Cell<bool>,
}

impl TranslatedBlock {
    pub(crate) const fn new(start: u32, store: StoreId, offset: u32, ops: Vec<CompiledOp>) -> Self {
        Self {
            start,
            store,
            offset,
            ops,
            valid: Cell::new(true),
        }
    }

    /// Guest address of the first instruction.
    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Exclusive guest end address.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.start.wrapping_add(self.byte_len())
    }

    /// Number of guest bytes covered.
    #[must_use]
    pub fn byte_len(&self) -> u32 {
        u32::try_from(self.ops.len() * 2).unwrap_or(u32::MAX)
    }

    /// Backing store the code was read from.
    #[must_use]
    pub const fn store(&self) -> StoreId {
        self.store
    }

    /// Offset of the first instruction within the backing store.
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// Pre-decoded instructions in guest order.
    #[must_use]
    pub fn ops(&self) -> &[CompiledOp] {
        &self.ops
    }

    /// False once any byte of the block has been overwritten.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    pub(crate) fn invalidate(&self) {
        self.valid.set(false);
    }

    /// Returns true when `pc` addresses one of the block's instructions.
    #[must_use]
    pub fn covers(&self, pc: u32) -> bool {
        pc.wrapping_sub(self.start) < self.byte_len()
    }

    /// Returns true when `store[offset..offset + len]` intersects the block.
    #[must_use]
    pub fn overlaps(&self, store: StoreId, offset: u32, len: u32) -> bool {
        let end = self.offset + self.byte_len();
        store == self.store && offset < end && offset.saturating_add(len) > self.offset
    }
}
