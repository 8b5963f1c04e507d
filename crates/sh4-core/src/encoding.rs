//! SH4 instruction definitions.
//!
//! [`OPCODE_TABLE`] is the single source of truth for every encoding: the
//! decoder, the disassembler and the assembler all derive from it. Bit
//! patterns are written most significant bit first; `0`/`1` are fixed bits
//! and the letters `n`, `m`, `i` and `d` mark the operand fields.

use std::fmt;

/// Every distinct instruction form with its own handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum Opcode {
    MovImm,
    MovWordPcRel,
    MovLongPcRel,
    Mov,
    MovByteStore,
    MovWordStore,
    MovLongStore,
    MovByteLoad,
    MovWordLoad,
    MovLongLoad,
    MovByteStoreDec,
    MovWordStoreDec,
    MovLongStoreDec,
    MovByteLoadInc,
    MovWordLoadInc,
    MovLongLoadInc,
    MovByteStoreDisp,
    MovWordStoreDisp,
    MovLongStoreDisp,
    MovByteLoadDisp,
    MovWordLoadDisp,
    MovLongLoadDisp,
    MovByteStoreIndexed,
    MovWordStoreIndexed,
    MovLongStoreIndexed,
    MovByteLoadIndexed,
    MovWordLoadIndexed,
    MovLongLoadIndexed,
    MovByteStoreGbr,
    MovWordStoreGbr,
    MovLongStoreGbr,
    MovByteLoadGbr,
    MovWordLoadGbr,
    MovLongLoadGbr,
    Mova,
    Movt,
    Movcal,
    SwapByte,
    SwapWord,
    Xtrct,
    Add,
    AddImm,
    Addc,
    Addv,
    CmpEqImm,
    CmpEq,
    CmpHs,
    CmpGe,
    CmpHi,
    CmpGt,
    CmpPz,
    CmpPl,
    CmpStr,
    Div0s,
    Div0u,
    Div1,
    DmulsL,
    DmuluL,
    Dt,
    ExtsByte,
    ExtsWord,
    ExtuByte,
    ExtuWord,
    MacL,
    MacW,
    MulL,
    MulsW,
    MuluW,
    Neg,
    Negc,
    Sub,
    Subc,
    Subv,
    And,
    AndImm,
    AndByte,
    Not,
    Or,
    OrImm,
    OrByte,
    TasByte,
    Tst,
    TstImm,
    TstByte,
    Xor,
    XorImm,
    XorByte,
    Rotl,
    Rotr,
    Rotcl,
    Rotcr,
    Shad,
    Shal,
    Shar,
    Shld,
    Shll,
    Shlr,
    Shll2,
    Shlr2,
    Shll8,
    Shlr8,
    Shll16,
    Shlr16,
    Bf,
    Bfs,
    Bt,
    Bts,
    Bra,
    Braf,
    Bsr,
    Bsrf,
    Jmp,
    Jsr,
    Rts,
    Rte,
    Clrmac,
    Clrs,
    Clrt,
    Sets,
    Sett,
    Nop,
    Sleep,
    Trapa,
    Ldtlb,
    Pref,
    Ocbi,
    Ocbp,
    Ocbwb,
    LdcSr,
    LdcGbr,
    LdcVbr,
    LdcSsr,
    LdcSpc,
    LdcDbr,
    LdcBank,
    LdcLSr,
    LdcLGbr,
    LdcLVbr,
    LdcLSsr,
    LdcLSpc,
    LdcLDbr,
    LdcLBank,
    StcSr,
    StcGbr,
    StcVbr,
    StcSsr,
    StcSpc,
    StcSgr,
    StcDbr,
    StcBank,
    StcLSr,
    StcLGbr,
    StcLVbr,
    StcLSsr,
    StcLSpc,
    StcLSgr,
    StcLDbr,
    StcLBank,
    LdsMach,
    LdsMacl,
    LdsPr,
    LdsLMach,
    LdsLMacl,
    LdsLPr,
    StsMach,
    StsMacl,
    StsPr,
    StsLMach,
    StsLMacl,
    StsLPr,
    LdsFpscr,
    LdsFpul,
    LdsLFpscr,
    LdsLFpul,
    StsFpscr,
    StsFpul,
    StsLFpscr,
    StsLFpul,
    Fldi0,
    Fldi1,
    Fmov,
    FmovLoad,
    FmovLoadIndexed,
    FmovLoadInc,
    FmovStore,
    FmovStoreIndexed,
    FmovStoreDec,
    Flds,
    Fsts,
    Fabs,
    Fadd,
    FcmpEq,
    FcmpGt,
    Fdiv,
    Float,
    Fmac,
    Fmul,
    Fneg,
    Fsqrt,
    Fsub,
    Ftrc,
    Fcnvds,
    Fcnvsd,
    Fipr,
    Ftrv,
    Fsrra,
    Fsca,
    Fschg,
    Frchg,
}

/// Operand slot of an instruction template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Operand {
    Rn,
    Rm,
    R0,
    /// `#imm`
    Imm,
    /// `@Rn`
    AtRn,
    /// `@Rm`
    AtRm,
    /// `@Rm+`
    AtRmInc,
    /// `@Rn+`
    AtRnInc,
    /// `@-Rn`
    AtRnDec,
    /// `@(disp,Rn)`
    DispRn,
    /// `@(disp,Rm)`
    DispRm,
    /// `@(R0,Rn)`
    R0Rn,
    /// `@(R0,Rm)`
    R0Rm,
    /// `@(disp,GBR)`
    DispGbr,
    /// `@(R0,GBR)`
    R0Gbr,
    /// `@(disp,PC)`
    DispPc,
    /// PC-relative branch target.
    Label,
    Sr,
    Gbr,
    Vbr,
    Ssr,
    Spc,
    Sgr,
    Dbr,
    Mach,
    Macl,
    Pr,
    Fpscr,
    Fpul,
    /// `Rm_BANK` (3-bit field)
    RmBank,
    /// `Rn_BANK` (3-bit field)
    RnBank,
    FRn,
    FRm,
    FR0,
    /// `DRn`; the 3-bit field holds the pair number.
    DRn,
    /// `DRm`; the 3-bit field holds the pair number.
    DRm,
    /// `FVn` (2-bit field)
    FVn,
    /// `FVm` (2-bit field)
    FVm,
    Xmtrx,
}

impl Operand {
    /// Template spelling.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::Rn => "Rn",
            Self::Rm => "Rm",
            Self::R0 => "R0",
            Self::Imm => "#imm",
            Self::AtRn => "@Rn",
            Self::AtRm => "@Rm",
            Self::AtRmInc => "@Rm+",
            Self::AtRnInc => "@Rn+",
            Self::AtRnDec => "@-Rn",
            Self::DispRn => "@(disp,Rn)",
            Self::DispRm => "@(disp,Rm)",
            Self::R0Rn => "@(R0,Rn)",
            Self::R0Rm => "@(R0,Rm)",
            Self::DispGbr => "@(disp,GBR)",
            Self::R0Gbr => "@(R0,GBR)",
            Self::DispPc => "@(disp,PC)",
            Self::Label => "label",
            Self::Sr => "SR",
            Self::Gbr => "GBR",
            Self::Vbr => "VBR",
            Self::Ssr => "SSR",
            Self::Spc => "SPC",
            Self::Sgr => "SGR",
            Self::Dbr => "DBR",
            Self::Mach => "MACH",
            Self::Macl => "MACL",
            Self::Pr => "PR",
            Self::Fpscr => "FPSCR",
            Self::Fpul => "FPUL",
            Self::RmBank => "Rm_BANK",
            Self::RnBank => "Rn_BANK",
            Self::FRn => "FRn",
            Self::FRm => "FRm",
            Self::FR0 => "FR0",
            Self::DRn => "DRn",
            Self::DRm => "DRm",
            Self::FVn => "FVn",
            Self::FVm => "FVm",
            Self::Xmtrx => "XMTRX",
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template())
    }
}

/// Execution class, used for cycle costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum InstructionClass {
    Move,
    Load,
    Store,
    Arithmetic,
    Multiply,
    Logic,
    Shift,
    Branch,
    System,
    ControlLoad,
    FpuMove,
    FpuArith,
    FpuComplex,
}

bitflags::bitflags! {
    /// Instruction property bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpFlags: u8 {
        /// Changes the flow of control.
        const BRANCH = 1 << 0;
        /// Executes a delay-slot instruction before the branch takes effect.
        const DELAYED = 1 << 1;
        /// Branch depends on `SR.T`.
        const CONDITIONAL = 1 << 2;
        /// Requires the FPU (`SR.FD` clear).
        const FPU = 1 << 3;
        /// Requires privileged mode.
        const PRIVILEGED = 1 << 4;
        /// Writes guest memory.
        const STORE = 1 << 5;
        /// Reads guest memory.
        const LOAD = 1 << 6;
    }
}

/// Location of an operand field within the instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Bit position of the least significant bit.
    pub shift: u32,
    /// Width in bits.
    pub width: u32,
}

impl Field {
    /// Extracts the field from `word`.
    #[must_use]
    pub const fn extract(self, word: u16) -> u16 {
        (word >> self.shift) & ((1 << self.width) - 1)
    }

    /// Returns true when `value` fits the field unsigned.
    #[must_use]
    pub const fn fits(self, value: u32) -> bool {
        value < (1 << self.width)
    }
}

/// One instruction definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpDef {
    /// Handler selector.
    pub op: Opcode,
    /// Assembler mnemonic, lowercase.
    pub mnemonic: &'static str,
    /// Operand template in source order.
    pub operands: &'static [Operand],
    /// Sixteen-character bit pattern.
    pub pattern: &'static str,
    /// Cost class.
    pub class: InstructionClass,
    /// Property bits.
    pub flags: OpFlags,
    /// Multiplier applied to the displacement field.
    pub disp_scale: u8,
}

impl OpDef {
    /// Mask of fixed bits and their values.
    #[must_use]
    pub fn mask_value(&self) -> (u16, u16) {
        self.pattern
            .bytes()
            .fold((0u16, 0u16), |(mask, value), bit| match bit {
                b'0' => ((mask << 1) | 1, value << 1),
                b'1' => ((mask << 1) | 1, (value << 1) | 1),
                _ => (mask << 1, value << 1),
            })
    }

    /// Number of fixed bits; more specific definitions take precedence.
    #[must_use]
    pub fn fixed_bits(&self) -> u32 {
        self.mask_value().0.count_ones()
    }

    /// Returns true when `word` matches the fixed bits.
    #[must_use]
    pub fn matches(&self, word: u16) -> bool {
        let (mask, value) = self.mask_value();
        word & mask == value
    }

    /// Locates the field marked with `letter`.
    #[must_use]
    pub fn field(&self, letter: u8) -> Option<Field> {
        let bits = self.pattern.as_bytes();
        let first = bits.iter().position(|&b| b == letter)?;
        let width = bits[first..].iter().take_while(|&&b| b == letter).count();
        let shift = bits.len() - first - width;
        Some(Field {
            shift: u32::try_from(shift).ok()?,
            width: u32::try_from(width).ok()?,
        })
    }

    /// Returns true when every property in `flags` is set.
    #[must_use]
    pub const fn has(&self, flags: OpFlags) -> bool {
        self.flags.contains(flags)
    }
}

mod table {
    use super::{InstructionClass as C, OpDef, OpFlags as F, Opcode as Op, Operand as O};

    const fn def(
        op: Op,
        mnemonic: &'static str,
        operands: &'static [O],
        pattern: &'static str,
        class: C,
        flags: F,
    ) -> OpDef {
        OpDef {
            op,
            mnemonic,
            operands,
            pattern,
            class,
            flags,
            disp_scale: 1,
        }
    }

    const fn scaled(
        op: Op,
        mnemonic: &'static str,
        operands: &'static [O],
        pattern: &'static str,
        class: C,
        flags: F,
        disp_scale: u8,
    ) -> OpDef {
        OpDef {
            op,
            mnemonic,
            operands,
            pattern,
            class,
            flags,
            disp_scale,
        }
    }

    const LD: F = F::LOAD;
    const ST: F = F::STORE;
    const PRIV: F = F::PRIVILEGED;
    const FPU: F = F::FPU;
    const N: F = F::empty();
    const JUMP: F = F::BRANCH.union(F::DELAYED);
    const COND: F = F::BRANCH.union(F::CONDITIONAL);
    const COND_DELAYED: F = COND.union(F::DELAYED);

    pub(super) const OPCODES: &[OpDef] = &[
        // data transfer
        def(Op::MovImm, "mov", &[O::Imm, O::Rn], "1110nnnniiiiiiii", C::Move, N),
        scaled(Op::MovWordPcRel, "mov.w", &[O::DispPc, O::Rn], "1001nnnndddddddd", C::Load, LD, 2),
        scaled(Op::MovLongPcRel, "mov.l", &[O::DispPc, O::Rn], "1101nnnndddddddd", C::Load, LD, 4),
        def(Op::Mov, "mov", &[O::Rm, O::Rn], "0110nnnnmmmm0011", C::Move, N),
        def(Op::MovByteStore, "mov.b", &[O::Rm, O::AtRn], "0010nnnnmmmm0000", C::Store, ST),
        def(Op::MovWordStore, "mov.w", &[O::Rm, O::AtRn], "0010nnnnmmmm0001", C::Store, ST),
        def(Op::MovLongStore, "mov.l", &[O::Rm, O::AtRn], "0010nnnnmmmm0010", C::Store, ST),
        def(Op::MovByteLoad, "mov.b", &[O::AtRm, O::Rn], "0110nnnnmmmm0000", C::Load, LD),
        def(Op::MovWordLoad, "mov.w", &[O::AtRm, O::Rn], "0110nnnnmmmm0001", C::Load, LD),
        def(Op::MovLongLoad, "mov.l", &[O::AtRm, O::Rn], "0110nnnnmmmm0010", C::Load, LD),
        def(Op::MovByteStoreDec, "mov.b", &[O::Rm, O::AtRnDec], "0010nnnnmmmm0100", C::Store, ST),
        def(Op::MovWordStoreDec, "mov.w", &[O::Rm, O::AtRnDec], "0010nnnnmmmm0101", C::Store, ST),
        def(Op::MovLongStoreDec, "mov.l", &[O::Rm, O::AtRnDec], "0010nnnnmmmm0110", C::Store, ST),
        def(Op::MovByteLoadInc, "mov.b", &[O::AtRmInc, O::Rn], "0110nnnnmmmm0100", C::Load, LD),
        def(Op::MovWordLoadInc, "mov.w", &[O::AtRmInc, O::Rn], "0110nnnnmmmm0101", C::Load, LD),
        def(Op::MovLongLoadInc, "mov.l", &[O::AtRmInc, O::Rn], "0110nnnnmmmm0110", C::Load, LD),
        def(Op::MovByteStoreDisp, "mov.b", &[O::R0, O::DispRn], "10000000nnnndddd", C::Store, ST),
        scaled(Op::MovWordStoreDisp, "mov.w", &[O::R0, O::DispRn], "10000001nnnndddd", C::Store, ST, 2),
        scaled(Op::MovLongStoreDisp, "mov.l", &[O::Rm, O::DispRn], "0001nnnnmmmmdddd", C::Store, ST, 4),
        def(Op::MovByteLoadDisp, "mov.b", &[O::DispRm, O::R0], "10000100mmmmdddd", C::Load, LD),
        scaled(Op::MovWordLoadDisp, "mov.w", &[O::DispRm, O::R0], "10000101mmmmdddd", C::Load, LD, 2),
        scaled(Op::MovLongLoadDisp, "mov.l", &[O::DispRm, O::Rn], "0101nnnnmmmmdddd", C::Load, LD, 4),
        def(Op::MovByteStoreIndexed, "mov.b", &[O::Rm, O::R0Rn], "0000nnnnmmmm0100", C::Store, ST),
        def(Op::MovWordStoreIndexed, "mov.w", &[O::Rm, O::R0Rn], "0000nnnnmmmm0101", C::Store, ST),
        def(Op::MovLongStoreIndexed, "mov.l", &[O::Rm, O::R0Rn], "0000nnnnmmmm0110", C::Store, ST),
        def(Op::MovByteLoadIndexed, "mov.b", &[O::R0Rm, O::Rn], "0000nnnnmmmm1100", C::Load, LD),
        def(Op::MovWordLoadIndexed, "mov.w", &[O::R0Rm, O::Rn], "0000nnnnmmmm1101", C::Load, LD),
        def(Op::MovLongLoadIndexed, "mov.l", &[O::R0Rm, O::Rn], "0000nnnnmmmm1110", C::Load, LD),
        def(Op::MovByteStoreGbr, "mov.b", &[O::R0, O::DispGbr], "11000000dddddddd", C::Store, ST),
        scaled(Op::MovWordStoreGbr, "mov.w", &[O::R0, O::DispGbr], "11000001dddddddd", C::Store, ST, 2),
        scaled(Op::MovLongStoreGbr, "mov.l", &[O::R0, O::DispGbr], "11000010dddddddd", C::Store, ST, 4),
        def(Op::MovByteLoadGbr, "mov.b", &[O::DispGbr, O::R0], "11000100dddddddd", C::Load, LD),
        scaled(Op::MovWordLoadGbr, "mov.w", &[O::DispGbr, O::R0], "11000101dddddddd", C::Load, LD, 2),
        scaled(Op::MovLongLoadGbr, "mov.l", &[O::DispGbr, O::R0], "11000110dddddddd", C::Load, LD, 4),
        scaled(Op::Mova, "mova", &[O::DispPc, O::R0], "11000111dddddddd", C::Move, N, 4),
        def(Op::Movt, "movt", &[O::Rn], "0000nnnn00101001", C::Move, N),
        def(Op::Movcal, "movca.l", &[O::R0, O::AtRn], "0000nnnn11000011", C::Store, ST),
        def(Op::SwapByte, "swap.b", &[O::Rm, O::Rn], "0110nnnnmmmm1000", C::Move, N),
        def(Op::SwapWord, "swap.w", &[O::Rm, O::Rn], "0110nnnnmmmm1001", C::Move, N),
        def(Op::Xtrct, "xtrct", &[O::Rm, O::Rn], "0010nnnnmmmm1101", C::Move, N),
        // arithmetic
        def(Op::Add, "add", &[O::Rm, O::Rn], "0011nnnnmmmm1100", C::Arithmetic, N),
        def(Op::AddImm, "add", &[O::Imm, O::Rn], "0111nnnniiiiiiii", C::Arithmetic, N),
        def(Op::Addc, "addc", &[O::Rm, O::Rn], "0011nnnnmmmm1110", C::Arithmetic, N),
        def(Op::Addv, "addv", &[O::Rm, O::Rn], "0011nnnnmmmm1111", C::Arithmetic, N),
        def(Op::CmpEqImm, "cmp/eq", &[O::Imm, O::R0], "10001000iiiiiiii", C::Arithmetic, N),
        def(Op::CmpEq, "cmp/eq", &[O::Rm, O::Rn], "0011nnnnmmmm0000", C::Arithmetic, N),
        def(Op::CmpHs, "cmp/hs", &[O::Rm, O::Rn], "0011nnnnmmmm0010", C::Arithmetic, N),
        def(Op::CmpGe, "cmp/ge", &[O::Rm, O::Rn], "0011nnnnmmmm0011", C::Arithmetic, N),
        def(Op::CmpHi, "cmp/hi", &[O::Rm, O::Rn], "0011nnnnmmmm0110", C::Arithmetic, N),
        def(Op::CmpGt, "cmp/gt", &[O::Rm, O::Rn], "0011nnnnmmmm0111", C::Arithmetic, N),
        def(Op::CmpPz, "cmp/pz", &[O::Rn], "0100nnnn00010001", C::Arithmetic, N),
        def(Op::CmpPl, "cmp/pl", &[O::Rn], "0100nnnn00010101", C::Arithmetic, N),
        def(Op::CmpStr, "cmp/str", &[O::Rm, O::Rn], "0010nnnnmmmm1100", C::Arithmetic, N),
        def(Op::Div0s, "div0s", &[O::Rm, O::Rn], "0010nnnnmmmm0111", C::Arithmetic, N),
        def(Op::Div0u, "div0u", &[], "0000000000011001", C::Arithmetic, N),
        def(Op::Div1, "div1", &[O::Rm, O::Rn], "0011nnnnmmmm0100", C::Arithmetic, N),
        def(Op::DmulsL, "dmuls.l", &[O::Rm, O::Rn], "0011nnnnmmmm1101", C::Multiply, N),
        def(Op::DmuluL, "dmulu.l", &[O::Rm, O::Rn], "0011nnnnmmmm0101", C::Multiply, N),
        def(Op::Dt, "dt", &[O::Rn], "0100nnnn00010000", C::Arithmetic, N),
        def(Op::ExtsByte, "exts.b", &[O::Rm, O::Rn], "0110nnnnmmmm1110", C::Arithmetic, N),
        def(Op::ExtsWord, "exts.w", &[O::Rm, O::Rn], "0110nnnnmmmm1111", C::Arithmetic, N),
        def(Op::ExtuByte, "extu.b", &[O::Rm, O::Rn], "0110nnnnmmmm1100", C::Arithmetic, N),
        def(Op::ExtuWord, "extu.w", &[O::Rm, O::Rn], "0110nnnnmmmm1101", C::Arithmetic, N),
        def(Op::MacL, "mac.l", &[O::AtRmInc, O::AtRnInc], "0000nnnnmmmm1111", C::Multiply, LD),
        def(Op::MacW, "mac.w", &[O::AtRmInc, O::AtRnInc], "0100nnnnmmmm1111", C::Multiply, LD),
        def(Op::MulL, "mul.l", &[O::Rm, O::Rn], "0000nnnnmmmm0111", C::Multiply, N),
        def(Op::MulsW, "muls.w", &[O::Rm, O::Rn], "0010nnnnmmmm1111", C::Multiply, N),
        def(Op::MuluW, "mulu.w", &[O::Rm, O::Rn], "0010nnnnmmmm1110", C::Multiply, N),
        def(Op::Neg, "neg", &[O::Rm, O::Rn], "0110nnnnmmmm1011", C::Arithmetic, N),
        def(Op::Negc, "negc", &[O::Rm, O::Rn], "0110nnnnmmmm1010", C::Arithmetic, N),
        def(Op::Sub, "sub", &[O::Rm, O::Rn], "0011nnnnmmmm1000", C::Arithmetic, N),
        def(Op::Subc, "subc", &[O::Rm, O::Rn], "0011nnnnmmmm1010", C::Arithmetic, N),
        def(Op::Subv, "subv", &[O::Rm, O::Rn], "0011nnnnmmmm1011", C::Arithmetic, N),
        // logic
        def(Op::And, "and", &[O::Rm, O::Rn], "0010nnnnmmmm1001", C::Logic, N),
        def(Op::AndImm, "and", &[O::Imm, O::R0], "11001001iiiiiiii", C::Logic, N),
        def(Op::AndByte, "and.b", &[O::Imm, O::R0Gbr], "11001101iiiiiiii", C::Logic, LD.union(ST)),
        def(Op::Not, "not", &[O::Rm, O::Rn], "0110nnnnmmmm0111", C::Logic, N),
        def(Op::Or, "or", &[O::Rm, O::Rn], "0010nnnnmmmm1011", C::Logic, N),
        def(Op::OrImm, "or", &[O::Imm, O::R0], "11001011iiiiiiii", C::Logic, N),
        def(Op::OrByte, "or.b", &[O::Imm, O::R0Gbr], "11001111iiiiiiii", C::Logic, LD.union(ST)),
        def(Op::TasByte, "tas.b", &[O::AtRn], "0100nnnn00011011", C::Logic, LD.union(ST)),
        def(Op::Tst, "tst", &[O::Rm, O::Rn], "0010nnnnmmmm1000", C::Logic, N),
        def(Op::TstImm, "tst", &[O::Imm, O::R0], "11001000iiiiiiii", C::Logic, N),
        def(Op::TstByte, "tst.b", &[O::Imm, O::R0Gbr], "11001100iiiiiiii", C::Logic, LD),
        def(Op::Xor, "xor", &[O::Rm, O::Rn], "0010nnnnmmmm1010", C::Logic, N),
        def(Op::XorImm, "xor", &[O::Imm, O::R0], "11001010iiiiiiii", C::Logic, N),
        def(Op::XorByte, "xor.b", &[O::Imm, O::R0Gbr], "11001110iiiiiiii", C::Logic, LD.union(ST)),
        // shift
        def(Op::Rotl, "rotl", &[O::Rn], "0100nnnn00000100", C::Shift, N),
        def(Op::Rotr, "rotr", &[O::Rn], "0100nnnn00000101", C::Shift, N),
        def(Op::Rotcl, "rotcl", &[O::Rn], "0100nnnn00100100", C::Shift, N),
        def(Op::Rotcr, "rotcr", &[O::Rn], "0100nnnn00100101", C::Shift, N),
        def(Op::Shad, "shad", &[O::Rm, O::Rn], "0100nnnnmmmm1100", C::Shift, N),
        def(Op::Shal, "shal", &[O::Rn], "0100nnnn00100000", C::Shift, N),
        def(Op::Shar, "shar", &[O::Rn], "0100nnnn00100001", C::Shift, N),
        def(Op::Shld, "shld", &[O::Rm, O::Rn], "0100nnnnmmmm1101", C::Shift, N),
        def(Op::Shll, "shll", &[O::Rn], "0100nnnn00000000", C::Shift, N),
        def(Op::Shlr, "shlr", &[O::Rn], "0100nnnn00000001", C::Shift, N),
        def(Op::Shll2, "shll2", &[O::Rn], "0100nnnn00001000", C::Shift, N),
        def(Op::Shlr2, "shlr2", &[O::Rn], "0100nnnn00001001", C::Shift, N),
        def(Op::Shll8, "shll8", &[O::Rn], "0100nnnn00011000", C::Shift, N),
        def(Op::Shlr8, "shlr8", &[O::Rn], "0100nnnn00011001", C::Shift, N),
        def(Op::Shll16, "shll16", &[O::Rn], "0100nnnn00101000", C::Shift, N),
        def(Op::Shlr16, "shlr16", &[O::Rn], "0100nnnn00101001", C::Shift, N),
        // branch
        scaled(Op::Bf, "bf", &[O::Label], "10001011dddddddd", C::Branch, COND, 2),
        scaled(Op::Bfs, "bf/s", &[O::Label], "10001111dddddddd", C::Branch, COND_DELAYED, 2),
        scaled(Op::Bt, "bt", &[O::Label], "10001001dddddddd", C::Branch, COND, 2),
        scaled(Op::Bts, "bt/s", &[O::Label], "10001101dddddddd", C::Branch, COND_DELAYED, 2),
        scaled(Op::Bra, "bra", &[O::Label], "1010dddddddddddd", C::Branch, JUMP, 2),
        def(Op::Braf, "braf", &[O::Rm], "0000mmmm00100011", C::Branch, JUMP),
        scaled(Op::Bsr, "bsr", &[O::Label], "1011dddddddddddd", C::Branch, JUMP, 2),
        def(Op::Bsrf, "bsrf", &[O::Rm], "0000mmmm00000011", C::Branch, JUMP),
        def(Op::Jmp, "jmp", &[O::AtRm], "0100mmmm00101011", C::Branch, JUMP),
        def(Op::Jsr, "jsr", &[O::AtRm], "0100mmmm00001011", C::Branch, JUMP),
        def(Op::Rts, "rts", &[], "0000000000001011", C::Branch, JUMP),
        def(Op::Rte, "rte", &[], "0000000000101011", C::Branch, JUMP.union(PRIV)),
        // system
        def(Op::Clrmac, "clrmac", &[], "0000000000101000", C::System, N),
        def(Op::Clrs, "clrs", &[], "0000000001001000", C::System, N),
        def(Op::Clrt, "clrt", &[], "0000000000001000", C::System, N),
        def(Op::Sets, "sets", &[], "0000000001011000", C::System, N),
        def(Op::Sett, "sett", &[], "0000000000011000", C::System, N),
        def(Op::Nop, "nop", &[], "0000000000001001", C::System, N),
        def(Op::Sleep, "sleep", &[], "0000000000011011", C::System, PRIV),
        def(Op::Trapa, "trapa", &[O::Imm], "11000011iiiiiiii", C::System, N),
        def(Op::Ldtlb, "ldtlb", &[], "0000000000111000", C::System, PRIV),
        def(Op::Pref, "pref", &[O::AtRn], "0000nnnn10000011", C::System, N),
        def(Op::Ocbi, "ocbi", &[O::AtRn], "0000nnnn10010011", C::System, N),
        def(Op::Ocbp, "ocbp", &[O::AtRn], "0000nnnn10100011", C::System, N),
        def(Op::Ocbwb, "ocbwb", &[O::AtRn], "0000nnnn10110011", C::System, N),
        def(Op::LdcSr, "ldc", &[O::Rm, O::Sr], "0100mmmm00001110", C::ControlLoad, PRIV),
        def(Op::LdcGbr, "ldc", &[O::Rm, O::Gbr], "0100mmmm00011110", C::ControlLoad, N),
        def(Op::LdcVbr, "ldc", &[O::Rm, O::Vbr], "0100mmmm00101110", C::ControlLoad, PRIV),
        def(Op::LdcSsr, "ldc", &[O::Rm, O::Ssr], "0100mmmm00111110", C::ControlLoad, PRIV),
        def(Op::LdcSpc, "ldc", &[O::Rm, O::Spc], "0100mmmm01001110", C::ControlLoad, PRIV),
        def(Op::LdcDbr, "ldc", &[O::Rm, O::Dbr], "0100mmmm11111010", C::ControlLoad, PRIV),
        def(Op::LdcBank, "ldc", &[O::Rm, O::RnBank], "0100mmmm1nnn1110", C::ControlLoad, PRIV),
        def(Op::LdcLSr, "ldc.l", &[O::AtRmInc, O::Sr], "0100mmmm00000111", C::ControlLoad, PRIV.union(LD)),
        def(Op::LdcLGbr, "ldc.l", &[O::AtRmInc, O::Gbr], "0100mmmm00010111", C::ControlLoad, LD),
        def(Op::LdcLVbr, "ldc.l", &[O::AtRmInc, O::Vbr], "0100mmmm00100111", C::ControlLoad, PRIV.union(LD)),
        def(Op::LdcLSsr, "ldc.l", &[O::AtRmInc, O::Ssr], "0100mmmm00110111", C::ControlLoad, PRIV.union(LD)),
        def(Op::LdcLSpc, "ldc.l", &[O::AtRmInc, O::Spc], "0100mmmm01000111", C::ControlLoad, PRIV.union(LD)),
        def(Op::LdcLDbr, "ldc.l", &[O::AtRmInc, O::Dbr], "0100mmmm11110110", C::ControlLoad, PRIV.union(LD)),
        def(Op::LdcLBank, "ldc.l", &[O::AtRmInc, O::RnBank], "0100mmmm1nnn0111", C::ControlLoad, PRIV.union(LD)),
        def(Op::StcSr, "stc", &[O::Sr, O::Rn], "0000nnnn00000010", C::System, PRIV),
        def(Op::StcGbr, "stc", &[O::Gbr, O::Rn], "0000nnnn00010010", C::System, N),
        def(Op::StcVbr, "stc", &[O::Vbr, O::Rn], "0000nnnn00100010", C::System, PRIV),
        def(Op::StcSsr, "stc", &[O::Ssr, O::Rn], "0000nnnn00110010", C::System, PRIV),
        def(Op::StcSpc, "stc", &[O::Spc, O::Rn], "0000nnnn01000010", C::System, PRIV),
        def(Op::StcSgr, "stc", &[O::Sgr, O::Rn], "0000nnnn00111010", C::System, PRIV),
        def(Op::StcDbr, "stc", &[O::Dbr, O::Rn], "0000nnnn11111010", C::System, PRIV),
        def(Op::StcBank, "stc", &[O::RmBank, O::Rn], "0000nnnn1mmm0010", C::System, PRIV),
        def(Op::StcLSr, "stc.l", &[O::Sr, O::AtRnDec], "0100nnnn00000011", C::Store, PRIV.union(ST)),
        def(Op::StcLGbr, "stc.l", &[O::Gbr, O::AtRnDec], "0100nnnn00010011", C::Store, ST),
        def(Op::StcLVbr, "stc.l", &[O::Vbr, O::AtRnDec], "0100nnnn00100011", C::Store, PRIV.union(ST)),
        def(Op::StcLSsr, "stc.l", &[O::Ssr, O::AtRnDec], "0100nnnn00110011", C::Store, PRIV.union(ST)),
        def(Op::StcLSpc, "stc.l", &[O::Spc, O::AtRnDec], "0100nnnn01000011", C::Store, PRIV.union(ST)),
        def(Op::StcLSgr, "stc.l", &[O::Sgr, O::AtRnDec], "0100nnnn00110010", C::Store, PRIV.union(ST)),
        def(Op::StcLDbr, "stc.l", &[O::Dbr, O::AtRnDec], "0100nnnn11110010", C::Store, PRIV.union(ST)),
        def(Op::StcLBank, "stc.l", &[O::RmBank, O::AtRnDec], "0100nnnn1mmm0011", C::Store, PRIV.union(ST)),
        def(Op::LdsMach, "lds", &[O::Rm, O::Mach], "0100mmmm00001010", C::System, N),
        def(Op::LdsMacl, "lds", &[O::Rm, O::Macl], "0100mmmm00011010", C::System, N),
        def(Op::LdsPr, "lds", &[O::Rm, O::Pr], "0100mmmm00101010", C::System, N),
        def(Op::LdsLMach, "lds.l", &[O::AtRmInc, O::Mach], "0100mmmm00000110", C::Load, LD),
        def(Op::LdsLMacl, "lds.l", &[O::AtRmInc, O::Macl], "0100mmmm00010110", C::Load, LD),
        def(Op::LdsLPr, "lds.l", &[O::AtRmInc, O::Pr], "0100mmmm00100110", C::Load, LD),
        def(Op::StsMach, "sts", &[O::Mach, O::Rn], "0000nnnn00001010", C::System, N),
        def(Op::StsMacl, "sts", &[O::Macl, O::Rn], "0000nnnn00011010", C::System, N),
        def(Op::StsPr, "sts", &[O::Pr, O::Rn], "0000nnnn00101010", C::System, N),
        def(Op::StsLMach, "sts.l", &[O::Mach, O::AtRnDec], "0100nnnn00000010", C::Store, ST),
        def(Op::StsLMacl, "sts.l", &[O::Macl, O::AtRnDec], "0100nnnn00010010", C::Store, ST),
        def(Op::StsLPr, "sts.l", &[O::Pr, O::AtRnDec], "0100nnnn00100010", C::Store, ST),
        // fpu
        def(Op::LdsFpscr, "lds", &[O::Rm, O::Fpscr], "0100mmmm01101010", C::FpuMove, FPU),
        def(Op::LdsFpul, "lds", &[O::Rm, O::Fpul], "0100mmmm01011010", C::FpuMove, FPU),
        def(Op::LdsLFpscr, "lds.l", &[O::AtRmInc, O::Fpscr], "0100mmmm01100110", C::FpuMove, FPU.union(LD)),
        def(Op::LdsLFpul, "lds.l", &[O::AtRmInc, O::Fpul], "0100mmmm01010110", C::FpuMove, FPU.union(LD)),
        def(Op::StsFpscr, "sts", &[O::Fpscr, O::Rn], "0000nnnn01101010", C::FpuMove, FPU),
        def(Op::StsFpul, "sts", &[O::Fpul, O::Rn], "0000nnnn01011010", C::FpuMove, FPU),
        def(Op::StsLFpscr, "sts.l", &[O::Fpscr, O::AtRnDec], "0100nnnn01100010", C::FpuMove, FPU.union(ST)),
        def(Op::StsLFpul, "sts.l", &[O::Fpul, O::AtRnDec], "0100nnnn01010010", C::FpuMove, FPU.union(ST)),
        def(Op::Fldi0, "fldi0", &[O::FRn], "1111nnnn10001101", C::FpuMove, FPU),
        def(Op::Fldi1, "fldi1", &[O::FRn], "1111nnnn10011101", C::FpuMove, FPU),
        def(Op::Fmov, "fmov", &[O::FRm, O::FRn], "1111nnnnmmmm1100", C::FpuMove, FPU),
        def(Op::FmovLoad, "fmov.s", &[O::AtRm, O::FRn], "1111nnnnmmmm1000", C::FpuMove, FPU.union(LD)),
        def(Op::FmovLoadIndexed, "fmov.s", &[O::R0Rm, O::FRn], "1111nnnnmmmm0110", C::FpuMove, FPU.union(LD)),
        def(Op::FmovLoadInc, "fmov.s", &[O::AtRmInc, O::FRn], "1111nnnnmmmm1001", C::FpuMove, FPU.union(LD)),
        def(Op::FmovStore, "fmov.s", &[O::FRm, O::AtRn], "1111nnnnmmmm1010", C::FpuMove, FPU.union(ST)),
        def(Op::FmovStoreIndexed, "fmov.s", &[O::FRm, O::R0Rn], "1111nnnnmmmm0111", C::FpuMove, FPU.union(ST)),
        def(Op::FmovStoreDec, "fmov.s", &[O::FRm, O::AtRnDec], "1111nnnnmmmm1011", C::FpuMove, FPU.union(ST)),
        def(Op::Flds, "flds", &[O::FRm, O::Fpul], "1111mmmm00011101", C::FpuMove, FPU),
        def(Op::Fsts, "fsts", &[O::Fpul, O::FRn], "1111nnnn00001101", C::FpuMove, FPU),
        def(Op::Fabs, "fabs", &[O::FRn], "1111nnnn01011101", C::FpuMove, FPU),
        def(Op::Fadd, "fadd", &[O::FRm, O::FRn], "1111nnnnmmmm0000", C::FpuArith, FPU),
        def(Op::FcmpEq, "fcmp/eq", &[O::FRm, O::FRn], "1111nnnnmmmm0100", C::FpuArith, FPU),
        def(Op::FcmpGt, "fcmp/gt", &[O::FRm, O::FRn], "1111nnnnmmmm0101", C::FpuArith, FPU),
        def(Op::Fdiv, "fdiv", &[O::FRm, O::FRn], "1111nnnnmmmm0011", C::FpuComplex, FPU),
        def(Op::Float, "float", &[O::Fpul, O::FRn], "1111nnnn00101101", C::FpuArith, FPU),
        def(Op::Fmac, "fmac", &[O::FR0, O::FRm, O::FRn], "1111nnnnmmmm1110", C::FpuArith, FPU),
        def(Op::Fmul, "fmul", &[O::FRm, O::FRn], "1111nnnnmmmm0010", C::FpuArith, FPU),
        def(Op::Fneg, "fneg", &[O::FRn], "1111nnnn01001101", C::FpuMove, FPU),
        def(Op::Fsqrt, "fsqrt", &[O::FRn], "1111nnnn01101101", C::FpuComplex, FPU),
        def(Op::Fsub, "fsub", &[O::FRm, O::FRn], "1111nnnnmmmm0001", C::FpuArith, FPU),
        def(Op::Ftrc, "ftrc", &[O::FRm, O::Fpul], "1111mmmm00111101", C::FpuArith, FPU),
        def(Op::Fcnvds, "fcnvds", &[O::DRm, O::Fpul], "1111mmm010111101", C::FpuArith, FPU),
        def(Op::Fcnvsd, "fcnvsd", &[O::Fpul, O::DRn], "1111nnn010101101", C::FpuArith, FPU),
        def(Op::Fipr, "fipr", &[O::FVm, O::FVn], "1111nnmm11101101", C::FpuArith, FPU),
        def(Op::Ftrv, "ftrv", &[O::Xmtrx, O::FVn], "1111nn0111111101", C::FpuComplex, FPU),
        def(Op::Fsrra, "fsrra", &[O::FRn], "1111nnnn01111101", C::FpuComplex, FPU),
        def(Op::Fsca, "fsca", &[O::Fpul, O::DRn], "1111nnn011111101", C::FpuComplex, FPU),
        def(Op::Fschg, "fschg", &[], "1111001111111101", C::FpuMove, FPU),
        def(Op::Frchg, "frchg", &[], "1111101111111101", C::FpuMove, FPU),
    ];
}

/// Every SH4 instruction definition.
pub const OPCODE_TABLE: &[OpDef] = table::OPCODES;

/// Looks up the definition of `op`.
#[must_use]
pub fn definition(op: Opcode) -> Option<&'static OpDef> {
    OPCODE_TABLE.iter().find(|def| def.op == op)
}

/// Definitions sharing `mnemonic`, in table order.
pub fn by_mnemonic(mnemonic: &str) -> impl Iterator<Item = &'static OpDef> + '_ {
    OPCODE_TABLE
        .iter()
        .filter(move |def| def.mnemonic.eq_ignore_ascii_case(mnemonic))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn patterns_are_sixteen_known_characters() {
        for def in OPCODE_TABLE {
            assert_eq!(def.pattern.len(), 16, "{:?}", def.op);
            assert!(
                def.pattern.bytes().all(|b| b"01nmid".contains(&b)),
                "{:?} has stray pattern characters",
                def.op
            );
        }
    }

    #[test]
    fn each_opcode_is_defined_once() {
        let ops: HashSet<_> = OPCODE_TABLE.iter().map(|def| def.op).collect();
        assert_eq!(ops.len(), OPCODE_TABLE.len());
    }

    #[test]
    fn fixed_bit_sets_are_unique() {
        let keys: HashSet<_> = OPCODE_TABLE.iter().map(OpDef::mask_value).collect();
        assert_eq!(keys.len(), OPCODE_TABLE.len());
    }

    #[test]
    fn fields_are_located_from_the_pattern() {
        let movl = definition(Opcode::MovLongStoreDisp).unwrap();
        assert_eq!(movl.field(b'n'), Some(Field { shift: 8, width: 4 }));
        assert_eq!(movl.field(b'm'), Some(Field { shift: 4, width: 4 }));
        assert_eq!(movl.field(b'd'), Some(Field { shift: 0, width: 4 }));
        assert_eq!(movl.field(b'i'), None);

        let bra = definition(Opcode::Bra).unwrap();
        assert_eq!(bra.field(b'd'), Some(Field { shift: 0, width: 12 }));

        let ldc = definition(Opcode::LdcBank).unwrap();
        assert_eq!(ldc.field(b'n'), Some(Field { shift: 4, width: 3 }));
    }

    #[test]
    fn mask_value_matches_fixed_bits() {
        let add = definition(Opcode::AddImm).unwrap();
        assert_eq!(add.mask_value(), (0xF000, 0x7000));
        assert!(add.matches(0x7001));
        assert_eq!(definition(Opcode::Nop).unwrap().mask_value(), (0xFFFF, 0x0009));
    }

    #[test]
    fn delayed_branches_are_branches() {
        for def in OPCODE_TABLE.iter().filter(|def| def.has(OpFlags::DELAYED)) {
            assert!(def.has(OpFlags::BRANCH), "{:?}", def.op);
        }
    }

    #[test]
    fn rte_flags_combine_as_a_set() {
        let rte = definition(Opcode::Rte).unwrap();
        assert_eq!(
            rte.flags,
            OpFlags::BRANCH | OpFlags::DELAYED | OpFlags::PRIVILEGED
        );
        assert!(rte.has(OpFlags::BRANCH | OpFlags::PRIVILEGED));
        assert!(!rte.has(OpFlags::BRANCH | OpFlags::CONDITIONAL));
        assert!(definition(Opcode::Nop).unwrap().flags.is_empty());
        assert_eq!(OpFlags::from_bits(0x80), None);
    }

    #[test]
    fn fpu_encodings_are_flagged() {
        for def in OPCODE_TABLE
            .iter()
            .filter(|def| def.pattern.starts_with("1111"))
        {
            assert!(def.has(OpFlags::FPU), "{:?}", def.op);
        }
    }

    #[test]
    fn mnemonic_lookup_groups_forms() {
        let forms: Vec<_> = by_mnemonic("MOV").map(|def| def.op).collect();
        assert_eq!(forms, vec![Opcode::MovImm, Opcode::Mov]);
    }
}
