//! Instruction decoder for the SH4 instruction set.
//!
//! The decode table is built per instance from [`OPCODE_TABLE`]: every one of
//! the 65 536 instruction words maps to at most one definition, with more
//! specific patterns (more fixed bits) taking precedence.

use crate::encoding::{Field, InstructionClass, OpDef, OpFlags, Opcode, OPCODE_TABLE};

const NO_ENTRY: u16 = u16::MAX;

/// Decoded instruction with all operand fields extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Matching definition.
    pub def: &'static OpDef,
    /// Raw instruction word.
    pub raw: u16,
    /// `n` field (register, bank, pair or vector number).
    pub n: u8,
    /// `m` field.
    pub m: u8,
    /// Raw `i` field.
    pub imm: u8,
    /// Raw `d` field.
    pub disp: u16,
    /// Width of the `d` field in bits.
    pub disp_bits: u8,
}

impl DecodedInstruction {
    /// Handler selector.
    #[must_use]
    pub const fn op(&self) -> Opcode {
        self.def.op
    }

    /// Cost class.
    #[must_use]
    pub const fn class(&self) -> InstructionClass {
        self.def.class
    }

    /// Returns true when every property in `flags` is set.
    #[must_use]
    pub const fn has(&self, flags: OpFlags) -> bool {
        self.def.flags.contains(flags)
    }

    /// `n` as a register index.
    #[must_use]
    pub const fn rn(&self) -> usize {
        self.n as usize
    }

    /// `m` as a register index.
    #[must_use]
    pub const fn rm(&self) -> usize {
        self.m as usize
    }

    /// Immediate zero-extended.
    #[must_use]
    pub const fn imm_u32(&self) -> u32 {
        self.imm as u32
    }

    /// Immediate sign-extended.
    #[must_use]
    pub const fn imm_i32(&self) -> i32 {
        self.imm as i8 as i32
    }

    /// Displacement zero-extended and scaled.
    #[must_use]
    pub const fn disp_scaled(&self) -> u32 {
        self.disp as u32 * self.def.disp_scale as u32
    }

    /// Branch displacement sign-extended and scaled.
    #[must_use]
    pub const fn branch_disp(&self) -> i32 {
        if self.disp_bits == 0 {
            return 0;
        }
        let shift = 32 - self.disp_bits as u32;
        (((self.disp as u32) << shift) as i32 >> shift) * self.def.disp_scale as i32
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    def: &'static OpDef,
    n: Option<Field>,
    m: Option<Field>,
    imm: Option<Field>,
    disp: Option<Field>,
}

impl Entry {
    fn new(def: &'static OpDef) -> Self {
        Self {
            def,
            n: def.field(b'n'),
            m: def.field(b'm'),
            imm: def.field(b'i'),
            disp: def.field(b'd'),
        }
    }
}

/// Word-indexed decode table.
pub struct Decoder {
    entries: Vec<Entry>,
    lookup: Box<[u16]>,
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("definitions", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

const fn narrow(field: Option<Field>, word: u16) -> u16 {
    match field {
        Some(field) => field.extract(word),
        None => 0,
    }
}

impl Decoder {
    /// Builds the decode table.
    #[must_use]
    pub fn new() -> Self {
        let entries: Vec<Entry> = OPCODE_TABLE.iter().map(Entry::new).collect();
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&index| entries[index].def.fixed_bits());

        let mut lookup = vec![NO_ENTRY; 1 << 16].into_boxed_slice();
        for index in order {
            let (mask, value) = entries[index].def.mask_value();
            let free = !mask;
            let tag = u16::try_from(index).unwrap_or(NO_ENTRY);
            // Walk every submask of the free bits.
            let mut sub = 0u16;
            loop {
                lookup[usize::from(value | sub)] = tag;
                if sub == free {
                    break;
                }
                sub = sub.wrapping_sub(free) & free;
            }
        }
        Self { entries, lookup }
    }

    /// Decodes one instruction word. `None` is an illegal instruction.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(&self, word: u16) -> Option<DecodedInstruction> {
        let entry = self.entries.get(usize::from(self.lookup[usize::from(word)]))?;
        Some(DecodedInstruction {
            def: entry.def,
            raw: word,
            n: narrow(entry.n, word) as u8,
            m: narrow(entry.m, word) as u8,
            imm: narrow(entry.imm, word) as u8,
            disp: narrow(entry.disp, word),
            disp_bits: entry.disp.map_or(0, |field| field.width as u8),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x0009, Opcode::Nop)]
    #[case(0x000b, Opcode::Rts)]
    #[case(0x7001, Opcode::AddImm)]
    #[case(0x6503, Opcode::Mov)]
    #[case(0x402b, Opcode::Jmp)]
    #[case(0xf3fd, Opcode::Fschg)]
    #[case(0xfbfd, Opcode::Frchg)]
    #[case(0xf1fd, Opcode::Ftrv)]
    #[case(0xf2fd, Opcode::Fsca)]
    #[case(0xc320, Opcode::Trapa)]
    fn known_words_decode(#[case] word: u16, #[case] op: Opcode) {
        let decoder = Decoder::new();
        assert_eq!(decoder.decode(word).map(|i| i.op()), Some(op));
    }

    #[rstest]
    #[case(0x0000)]
    #[case(0xffff)]
    #[case(0x4ffb)]
    fn undefined_words_are_illegal(#[case] word: u16) {
        assert!(Decoder::new().decode(word).is_none());
    }

    #[test]
    fn add_immediate_fields() {
        let add = Decoder::new().decode(0x70ff).unwrap();
        assert_eq!(add.rn(), 0);
        assert_eq!(add.imm_u32(), 0xff);
        assert_eq!(add.imm_i32(), -1);
    }

    #[test]
    fn branch_displacements_sign_extend() {
        let decoder = Decoder::new();
        let bra = decoder.decode(0xaffe).unwrap();
        assert_eq!(bra.op(), Opcode::Bra);
        assert_eq!(bra.branch_disp(), -4);

        let bt = decoder.decode(0x8902).unwrap();
        assert_eq!(bt.op(), Opcode::Bt);
        assert_eq!(bt.branch_disp(), 4);
    }

    #[test]
    fn pc_relative_loads_scale_displacement() {
        let movl = Decoder::new().decode(0xd103).unwrap();
        assert_eq!(movl.op(), Opcode::MovLongPcRel);
        assert_eq!(movl.rn(), 1);
        assert_eq!(movl.disp_scaled(), 12);
    }

    #[test]
    fn every_definition_decodes_from_its_fixed_bits() {
        let decoder = Decoder::new();
        for def in OPCODE_TABLE {
            let (_, value) = def.mask_value();
            let decoded = decoder.decode(value).expect("definition word decodes");
            assert_eq!(decoded.op(), def.op, "{}", def.pattern);
        }
    }

    #[test]
    fn exhaustive_decode_prefers_most_specific_match() {
        let decoder = Decoder::new();
        let masks: Vec<(u16, u16)> = OPCODE_TABLE.iter().map(OpDef::mask_value).collect();
        for word in 0u16..=u16::MAX {
            let best = masks
                .iter()
                .filter(|(mask, value)| word & mask == *value)
                .map(|(mask, _)| mask.count_ones())
                .max();
            match decoder.decode(word) {
                Some(decoded) => {
                    assert!(decoded.def.matches(word), "{word:#06x}");
                    assert_eq!(Some(decoded.def.fixed_bits()), best, "{word:#06x}");
                }
                None => assert_eq!(best, None, "{word:#06x}"),
            }
        }
    }

    #[test]
    fn bank_fields_are_three_bits() {
        let decoded = Decoder::new().decode(0x41fe).unwrap();
        assert_eq!(decoded.op(), Opcode::LdcBank);
        assert_eq!(decoded.rm(), 1);
        assert_eq!(decoded.rn(), 7);
    }
}
