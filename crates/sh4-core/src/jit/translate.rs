use super::block::{CompiledOp, TranslatedBlock};
use crate::decoder::{DecodedInstruction, Decoder};
use crate::encoding::{OpFlags, Opcode};
use crate::execute::handler_for;
use crate::fault::Sh4Exception;
use crate::memory::{AddressSpace, StoreId, CODE_PAGE_SIZE};

/// Splits guest code into basic blocks of pre-decoded handlers.
#[derive(Debug, Clone, Copy)]
pub struct Translator {
    max_instructions: usize,
}

impl Translator {
    /// Creates a translator emitting at most `max_instructions` per block,
    /// plus one trailing delay slot.
    #[must_use]
    pub const fn new(max_instructions: usize) -> Self {
        Self { max_instructions }
    }

    /// Translates the block starting at `pc`.
    ///
    /// Returns `Ok(None)` when `pc` is not backed by host memory; such code
    /// is interpreted instead.
    ///
    /// # Errors
    ///
    /// Returns the guest exception the first instruction raises on fetch or
    /// decode. Later undecodable words simply end the block.
    pub fn translate(
        &self,
        decoder: &Decoder,
        space: &AddressSpace,
        pc: u32,
    ) -> Result<Option<TranslatedBlock>, Sh4Exception> {
        let Some((store, offset)) = space.ram_location(pc) else {
            return Ok(None);
        };
        let mut ops = Vec::with_capacity(self.max_instructions.min(64));
        let mut cursor = pc;

        while ops.len() < self.max_instructions {
            if !ops.is_empty() && cursor % CODE_PAGE_SIZE == 0 {
                break;
            }
            let Some(instr) = Self::fetch(decoder, space, cursor, store, offset, ops.len()) else {
                if ops.is_empty() {
                    return Err(match space.read_u16(pc) {
                        Ok(_) => Sh4Exception::IllegalInstruction,
                        Err(_) => Sh4Exception::AddressErrorRead(pc),
                    });
                }
                break;
            };
            ops.push(Self::compile(instr, cursor));
            cursor = cursor.wrapping_add(2);

            if Self::ends_block(&instr) {
                if instr.has(OpFlags::DELAYED) {
                    if let Some(slot) = Self::fetch(decoder, space, cursor, store, offset, ops.len()) {
                        ops.push(Self::compile(slot, cursor));
                    }
                }
                break;
            }
        }
        Ok(Some(TranslatedBlock::new(pc, store, offset, ops)))
    }

    /// Fetches and decodes the `index`th word of a block, provided it still
    /// lies in the same contiguous backing store.
    fn fetch(
        decoder: &Decoder,
        space: &AddressSpace,
        addr: u32,
        store: StoreId,
        offset: u32,
        index: usize,
    ) -> Option<DecodedInstruction> {
        let expected = offset.checked_add(u32::try_from(index * 2).ok()?)?;
        if space.ram_location(addr) != Some((store, expected)) {
            return None;
        }
        decoder.decode(space.read_u16(addr).ok()?)
    }

    fn compile(instr: DecodedInstruction, pc: u32) -> CompiledOp {
        CompiledOp {
            handler: handler_for(instr.op()),
            instr,
            pc,
        }
    }

    fn ends_block(instr: &DecodedInstruction) -> bool {
        instr.has(OpFlags::BRANCH) || matches!(instr.op(), Opcode::Sleep | Opcode::Trapa)
    }
}
