//! Data access and operand helpers for instruction execution.

use crate::decoder::DecodedInstruction;
use crate::encoding::Opcode;
use crate::fault::{EmulatorError, MemoryFault, Sh4Exception};
use crate::memory::{AccessError, AccessWidth};
use crate::state::FpBank;
use crate::trap::AccessKind;

use super::{Exec, ExecFault};

/// Maps a failed data access onto the exception it raises.
fn access_fault(err: AccessError, access: AccessKind) -> ExecFault {
    match err {
        AccessError::Fault(fault) => memory_fault(fault, access),
        AccessError::Unclaimed(record) => {
            ExecFault::Host(EmulatorError::HostFault(Box::new(record)))
        }
    }
}

fn memory_fault(fault: MemoryFault, access: AccessKind) -> ExecFault {
    let addr = fault.addr();
    tracing::debug!(%fault, "guest data access faulted");
    ExecFault::Guest(match access {
        AccessKind::Read => Sh4Exception::AddressErrorRead(addr),
        AccessKind::Write => Sh4Exception::AddressErrorWrite(addr),
    })
}

/// Access width of a sized data-movement opcode.
pub(super) const fn width_of(op: Opcode) -> AccessWidth {
    match op {
        Opcode::MovByteStore
        | Opcode::MovByteLoad
        | Opcode::MovByteStoreDec
        | Opcode::MovByteLoadInc
        | Opcode::MovByteStoreDisp
        | Opcode::MovByteLoadDisp
        | Opcode::MovByteStoreIndexed
        | Opcode::MovByteLoadIndexed
        | Opcode::MovByteStoreGbr
        | Opcode::MovByteLoadGbr => AccessWidth::Byte,
        Opcode::MovWordStore
        | Opcode::MovWordLoad
        | Opcode::MovWordStoreDec
        | Opcode::MovWordLoadInc
        | Opcode::MovWordStoreDisp
        | Opcode::MovWordLoadDisp
        | Opcode::MovWordStoreIndexed
        | Opcode::MovWordLoadIndexed
        | Opcode::MovWordStoreGbr
        | Opcode::MovWordLoadGbr => AccessWidth::Word,
        _ => AccessWidth::Long,
    }
}

/// Sign-extends a zero-extended value of `width` to 32 bits.
pub(super) const fn sign_extend(value: u32, width: AccessWidth) -> u32 {
    match width {
        AccessWidth::Byte => value as u8 as i8 as i32 as u32,
        AccessWidth::Word => value as u16 as i16 as i32 as u32,
        AccessWidth::Long | AccessWidth::Quad => value,
    }
}

impl Exec<'_> {
    /// Reads `width` bytes at `addr`, zero-extended.
    pub(super) fn read(&mut self, addr: u32, width: AccessWidth) -> Result<u64, ExecFault> {
        if self.fastmem {
            let state = self.ctx.captured();
            self.space
                .fast_read(addr, width, &state)
                .map_err(|err| access_fault(err, AccessKind::Read))
        } else {
            self.space
                .read(addr, width)
                .map_err(|fault| memory_fault(fault, AccessKind::Read))
        }
    }

    /// Writes the low `width` bytes of `value` at `addr`.
    pub(super) fn write(
        &mut self,
        addr: u32,
        width: AccessWidth,
        value: u64,
    ) -> Result<(), ExecFault> {
        if self.fastmem {
            let state = self.ctx.captured();
            self.space
                .fast_write(addr, width, value, &state)
                .map_err(|err| access_fault(err, AccessKind::Write))
        } else {
            self.space
                .write(addr, width, value)
                .map_err(|fault| memory_fault(fault, AccessKind::Write))
        }
    }

    /// Reads a byte, word or long and sign-extends it to 32 bits.
    #[allow(clippy::cast_possible_truncation)]
    pub(super) fn load(&mut self, addr: u32, width: AccessWidth) -> Result<u32, ExecFault> {
        let value = self.read(addr, width)? as u32;
        Ok(sign_extend(value, width))
    }

    /// Reads a long.
    #[allow(clippy::cast_possible_truncation)]
    pub(super) fn load_long(&mut self, addr: u32) -> Result<u32, ExecFault> {
        Ok(self.read(addr, AccessWidth::Long)? as u32)
    }

    /// Reads an unsigned byte.
    #[allow(clippy::cast_possible_truncation)]
    pub(super) fn load_byte(&mut self, addr: u32) -> Result<u8, ExecFault> {
        Ok(self.read(addr, AccessWidth::Byte)? as u8)
    }

    /// Writes the low `width` bytes of a register value.
    pub(super) fn store(
        &mut self,
        addr: u32,
        width: AccessWidth,
        value: u32,
    ) -> Result<(), ExecFault> {
        self.write(addr, width, u64::from(value))
    }

    /// `Rn` of the decoded instruction.
    pub(super) fn rn(&self, instr: &DecodedInstruction) -> u32 {
        self.ctx.r(instr.rn())
    }

    /// `Rm` of the decoded instruction.
    pub(super) fn rm(&self, instr: &DecodedInstruction) -> u32 {
        self.ctx.r(instr.rm())
    }

    /// Writes `Rn` of the decoded instruction.
    pub(super) fn set_rn(&mut self, instr: &DecodedInstruction, value: u32) {
        self.ctx.set_r(instr.rn(), value);
    }

    /// Branch target for a PC-relative displacement.
    #[allow(clippy::cast_sign_loss)]
    pub(super) fn branch_target(&self, instr: &DecodedInstruction) -> u32 {
        self.ctx
            .pc
            .wrapping_add(4)
            .wrapping_add(instr.branch_disp() as u32)
    }

    /// Bank and base index of a 64-bit pair operand.
    ///
    /// An even register number names `DRn` in the active bank, an odd one
    /// names `XDn-1` in the other bank.
    pub(super) fn pair_operand(&self, reg: usize) -> (FpBank, usize) {
        let active = self.ctx.active_fp_bank();
        if reg & 1 == 0 {
            (active, reg)
        } else {
            (active.opposite(), reg & !1)
        }
    }

    /// Reads a pair in memory order: the low word lands at the lower
    /// address.
    pub(super) fn pair_bits(&self, reg: usize) -> u64 {
        let (bank, base) = self.pair_operand(reg);
        let first = self.ctx.fp_reg(bank, base) as u64;
        let second = self.ctx.fp_reg(bank, base + 1) as u64;
        first | (second << 32)
    }

    /// Writes a pair from memory order.
    #[allow(clippy::cast_possible_truncation)]
    pub(super) fn set_pair_bits(&mut self, reg: usize, value: u64) {
        let (bank, base) = self.pair_operand(reg);
        self.ctx.set_fp_reg(bank, base, value as u32);
        self.ctx.set_fp_reg(bank, base + 1, (value >> 32) as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::test_support::Bench;
    use crate::state::FPSCR_FR;
    use rstest::rstest;

    #[rstest]
    #[case(0x80, AccessWidth::Byte, 0xffff_ff80)]
    #[case(0x7f, AccessWidth::Byte, 0x7f)]
    #[case(0x8000, AccessWidth::Word, 0xffff_8000)]
    #[case(0x1234_5678, AccessWidth::Long, 0x1234_5678)]
    fn sign_extension(#[case] value: u32, #[case] width: AccessWidth, #[case] expected: u32) {
        assert_eq!(sign_extend(value, width), expected);
    }

    #[test]
    fn unmapped_read_raises_address_error() {
        let mut bench = Bench::new();
        let mut exec = Exec::new(&mut bench.ctx, &mut bench.space, false);
        assert_eq!(
            exec.load_long(0x1000_0000),
            Err(ExecFault::Guest(Sh4Exception::AddressErrorRead(0x1000_0000)))
        );
        assert_eq!(
            exec.store(0x8c00_0001, AccessWidth::Word, 0),
            Err(ExecFault::Guest(Sh4Exception::AddressErrorWrite(0x8c00_0001)))
        );
    }

    #[test]
    fn unclaimed_fast_path_fault_is_a_host_error() {
        let mut bench = Bench::new();
        let mut exec = Exec::new(&mut bench.ctx, &mut bench.space, true);
        assert!(matches!(
            exec.load_long(0x1000_0000),
            Err(ExecFault::Host(EmulatorError::HostFault(_)))
        ));
    }

    #[test]
    fn odd_pair_operand_names_other_bank() {
        let mut bench = Bench::new();
        let exec = Exec::new(&mut bench.ctx, &mut bench.space, false);
        assert_eq!(exec.pair_operand(2), (FpBank::Primary, 2));
        assert_eq!(exec.pair_operand(3), (FpBank::Extended, 2));

        bench.ctx.set_fpscr(bench.ctx.fpscr() | FPSCR_FR);
        let exec = Exec::new(&mut bench.ctx, &mut bench.space, false);
        assert_eq!(exec.pair_operand(2), (FpBank::Extended, 2));
        assert_eq!(exec.pair_operand(3), (FpBank::Primary, 2));
    }
}
