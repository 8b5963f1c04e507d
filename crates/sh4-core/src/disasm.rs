//! Instruction disassembly.
//!
//! Operands are rendered from the opcode table's templates, so every form
//! the decoder accepts has a spelling the assembler reads back.

use std::fmt;

use crate::decoder::{DecodedInstruction, Decoder};
use crate::encoding::{Opcode, Operand};
use crate::memory::AddressSpace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single disassembled instruction row.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisassemblyRow {
    /// Guest address of the instruction.
    pub addr: u32,
    /// Raw instruction word.
    pub raw: u16,
    /// Mnemonic, lowercase (e.g. `mov.l`).
    pub mnemonic: String,
    /// Comma-separated operands (e.g. `@(4,pc),r1`).
    pub operands: String,
    /// Whether the word has no definition.
    pub is_illegal: bool,
}

impl fmt::Display for DisassemblyRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}: {:04x}  {}", self.addr, self.raw, self.mnemonic)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands)?;
        }
        Ok(())
    }
}

/// Lazily formatted instruction, for log fields.
#[derive(Debug, Clone, Copy)]
pub struct Disassembly<'a> {
    instr: &'a DecodedInstruction,
    pc: u32,
}

impl<'a> Disassembly<'a> {
    /// Wraps `instr` located at `pc`.
    #[must_use]
    pub const fn new(instr: &'a DecodedInstruction, pc: u32) -> Self {
        Self { instr, pc }
    }
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.instr.def.mnemonic)?;
        for (index, &operand) in self.instr.def.operands.iter().enumerate() {
            f.write_str(if index == 0 { " " } else { "," })?;
            write_operand(f, self.instr, operand, self.pc)?;
        }
        Ok(())
    }
}

const fn sign_extended_immediate(op: Opcode) -> bool {
    matches!(op, Opcode::MovImm | Opcode::AddImm | Opcode::CmpEqImm)
}

/// Address a PC-relative operand refers to.
#[must_use]
pub fn pc_relative_target(instr: &DecodedInstruction, pc: u32) -> u32 {
    match instr.op() {
        Opcode::MovLongPcRel | Opcode::Mova => (pc & !3)
            .wrapping_add(4)
            .wrapping_add(instr.disp_scaled()),
        _ => pc.wrapping_add(4).wrapping_add(instr.disp_scaled()),
    }
}

/// Branch destination of a `label` operand.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn branch_target(instr: &DecodedInstruction, pc: u32) -> u32 {
    pc.wrapping_add(4).wrapping_add(instr.branch_disp() as u32)
}

fn write_operand(
    f: &mut fmt::Formatter<'_>,
    instr: &DecodedInstruction,
    operand: Operand,
    pc: u32,
) -> fmt::Result {
    let (n, m) = (instr.n, instr.m);
    let disp = instr.disp_scaled();
    match operand {
        Operand::Rn => write!(f, "r{n}"),
        Operand::Rm => write!(f, "r{m}"),
        Operand::R0 => f.write_str("r0"),
        Operand::Imm if sign_extended_immediate(instr.op()) => write!(f, "#{}", instr.imm_i32()),
        Operand::Imm => write!(f, "#{:#x}", instr.imm),
        Operand::AtRn => write!(f, "@r{n}"),
        Operand::AtRm => write!(f, "@r{m}"),
        Operand::AtRmInc => write!(f, "@r{m}+"),
        Operand::AtRnInc => write!(f, "@r{n}+"),
        Operand::AtRnDec => write!(f, "@-r{n}"),
        Operand::DispRn => write!(f, "@({disp},r{n})"),
        Operand::DispRm => write!(f, "@({disp},r{m})"),
        Operand::R0Rn => write!(f, "@(r0,r{n})"),
        Operand::R0Rm => write!(f, "@(r0,r{m})"),
        Operand::DispGbr => write!(f, "@({disp},gbr)"),
        Operand::R0Gbr => f.write_str("@(r0,gbr)"),
        Operand::DispPc => write!(f, "@({disp},pc)"),
        Operand::Label => write!(f, "{:#010x}", branch_target(instr, pc)),
        Operand::RmBank => write!(f, "r{m}_bank"),
        Operand::RnBank => write!(f, "r{n}_bank"),
        Operand::FRn => write!(f, "fr{n}"),
        Operand::FRm => write!(f, "fr{m}"),
        Operand::FR0 => f.write_str("fr0"),
        Operand::DRn => write!(f, "dr{}", n * 2),
        Operand::DRm => write!(f, "dr{}", m * 2),
        Operand::FVn => write!(f, "fv{}", n * 4),
        Operand::FVm => write!(f, "fv{}", m * 4),
        other => f.write_str(&other.template().to_ascii_lowercase()),
    }
}

/// Disassembles one word located at `addr`.
#[must_use]
pub fn disassemble_one(decoder: &Decoder, addr: u32, word: u16) -> DisassemblyRow {
    match decoder.decode(word) {
        Some(instr) => {
            let text = Disassembly::new(&instr, addr).to_string();
            let (mnemonic, operands) = text.split_once(' ').unwrap_or((&text, ""));
            DisassemblyRow {
                addr,
                raw: word,
                mnemonic: mnemonic.to_owned(),
                operands: operands.to_owned(),
                is_illegal: false,
            }
        }
        None => DisassemblyRow {
            addr,
            raw: word,
            mnemonic: ".word".to_owned(),
            operands: format!("{word:#06x}"),
            is_illegal: true,
        },
    }
}

/// Disassembles up to `count` instructions starting at `start`, stopping at
/// the first unreadable address.
#[must_use]
pub fn disassemble_range(
    decoder: &Decoder,
    space: &AddressSpace,
    start: u32,
    count: usize,
) -> Vec<DisassemblyRow> {
    (0..count)
        .map_while(|index| {
            let addr = start.wrapping_add(u32::try_from(index * 2).ok()?);
            let word = space.read_u16(addr).ok()?;
            Some(disassemble_one(decoder, addr, word))
        })
        .collect()
}
