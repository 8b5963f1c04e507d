//! Mnemonic resolution against the core opcode table.
//!
//! A mnemonic names several definitions (`mov` alone has three); the one
//! whose operand template accepts every parsed operand wins, in table order.

use std::fmt;

use sh4_core::encoding::{by_mnemonic, OpDef, Operand as Template};

use crate::parser::{Base, Operand, ParsedInstruction, SystemRegister};

/// Resolution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No definition uses this mnemonic.
    UnknownMnemonic(String),
    /// The mnemonic exists but no form takes these operands.
    NoMatchingForm {
        /// Mnemonic as written.
        mnemonic: String,
        /// Accepted templates, for the message.
        forms: Vec<String>,
    },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMnemonic(m) => write!(f, "unknown mnemonic: {m}"),
            Self::NoMatchingForm { mnemonic, forms } => write!(
                f,
                "operands do not match any form of {mnemonic} (expected one of: {})",
                forms.join(" | ")
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

const fn system_template(reg: SystemRegister) -> Template {
    match reg {
        SystemRegister::Sr => Template::Sr,
        SystemRegister::Gbr => Template::Gbr,
        SystemRegister::Vbr => Template::Vbr,
        SystemRegister::Ssr => Template::Ssr,
        SystemRegister::Spc => Template::Spc,
        SystemRegister::Sgr => Template::Sgr,
        SystemRegister::Dbr => Template::Dbr,
        SystemRegister::Mach => Template::Mach,
        SystemRegister::Macl => Template::Macl,
        SystemRegister::Pr => Template::Pr,
        SystemRegister::Fpscr => Template::Fpscr,
        SystemRegister::Fpul => Template::Fpul,
        SystemRegister::Xmtrx => Template::Xmtrx,
    }
}

/// Returns true when `operand` has the shape `template` asks for.
#[must_use]
pub fn fits(template: Template, operand: &Operand) -> bool {
    use Template as T;
    match (template, operand) {
        (T::Rn | T::Rm, Operand::Gpr(_))
        | (T::R0, Operand::Gpr(0))
        | (T::Imm, Operand::Immediate(_))
        | (T::AtRn | T::AtRm, Operand::Indirect(_))
        | (T::AtRmInc | T::AtRnInc, Operand::PostIncrement(_))
        | (T::AtRnDec, Operand::PreDecrement(_))
        | (T::R0Rn | T::R0Rm, Operand::Indexed(Base::Gpr(_)))
        | (T::R0Gbr, Operand::Indexed(Base::Gbr))
        | (T::Label, Operand::Address(_))
        | (T::RmBank | T::RnBank, Operand::Bank(_))
        | (T::FRn | T::FRm, Operand::Fr(_))
        | (T::FR0, Operand::Fr(0))
        | (T::DRn | T::DRm, Operand::Dr(_))
        | (T::FVn | T::FVm, Operand::Fv(_)) => true,
        (T::DispRn | T::DispRm, Operand::Displacement { base, .. }) => {
            matches!(base, Base::Gpr(_))
        }
        (T::DispGbr, Operand::Displacement { base, .. }) => *base == Base::Gbr,
        (T::DispPc, Operand::Displacement { base, .. }) => *base == Base::Pc,
        (T::DispPc, Operand::Address(_)) => true,
        (template, Operand::System(reg)) => system_template(*reg) == template,
        _ => false,
    }
}

/// Finds the definition for `instr`.
///
/// # Errors
///
/// [`ResolveError`] when the mnemonic is unknown or no form fits.
pub fn resolve(instr: &ParsedInstruction) -> Result<&'static OpDef, ResolveError> {
    let mut candidates = by_mnemonic(&instr.mnemonic).peekable();
    if candidates.peek().is_none() {
        return Err(ResolveError::UnknownMnemonic(instr.mnemonic.clone()));
    }
    let mut forms = Vec::new();
    for def in candidates {
        let shape_ok = def.operands.len() == instr.operands.len()
            && def
                .operands
                .iter()
                .zip(&instr.operands)
                .all(|(&template, operand)| fits(template, operand));
        if shape_ok {
            return Ok(def);
        }
        let templates: Vec<_> = def.operands.iter().map(|t| t.template()).collect();
        forms.push(format!("{} {}", def.mnemonic, templates.join(",")).trim_end().to_owned());
    }
    Err(ResolveError::NoMatchingForm {
        mnemonic: instr.mnemonic.clone(),
        forms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_line, Item};
    use rstest::rstest;
    use sh4_core::Opcode;

    fn resolve_text(text: &str) -> Result<&'static OpDef, ResolveError> {
        match parse_line(text, 1).unwrap().item {
            Item::Instruction(instr) => resolve(&instr),
            other => panic!("not an instruction: {other:?}"),
        }
    }

    #[rstest]
    #[case("mov #1,r0", Opcode::MovImm)]
    #[case("mov r1,r2", Opcode::Mov)]
    #[case("mov.l @(4,pc),r1", Opcode::MovLongPcRel)]
    #[case("mov.l data,r1", Opcode::MovLongPcRel)]
    #[case("mov.l @(4,r1),r2", Opcode::MovLongLoadDisp)]
    #[case("mov.l r1,@(4,r2)", Opcode::MovLongStoreDisp)]
    #[case("mov.w r0,@(2,r3)", Opcode::MovWordStoreDisp)]
    #[case("mov.b @(r0,r2),r3", Opcode::MovByteLoadIndexed)]
    #[case("mov.l r0,@(8,gbr)", Opcode::MovLongStoreGbr)]
    #[case("cmp/eq #3,r0", Opcode::CmpEqImm)]
    #[case("cmp/eq r3,r0", Opcode::CmpEq)]
    #[case("and.b #1,@(r0,gbr)", Opcode::AndByte)]
    #[case("ldc r1,sr", Opcode::LdcSr)]
    #[case("ldc r1,r3_bank", Opcode::LdcBank)]
    #[case("stc.l sgr,@-r15", Opcode::StcLSgr)]
    #[case("lds.l @r15+,pr", Opcode::LdsLPr)]
    #[case("fmac fr0,fr1,fr2", Opcode::Fmac)]
    #[case("fcnvds dr2,fpul", Opcode::Fcnvds)]
    #[case("ftrv xmtrx,fv4", Opcode::Ftrv)]
    #[case("bra loop", Opcode::Bra)]
    #[case("rts", Opcode::Rts)]
    fn picks_the_matching_form(#[case] text: &str, #[case] op: Opcode) {
        assert_eq!(resolve_text(text).unwrap().op, op);
    }

    #[test]
    fn and_immediate_requires_r0() {
        let err = resolve_text("and #1,r2").unwrap_err();
        assert!(matches!(err, ResolveError::NoMatchingForm { .. }));
        assert!(err.to_string().contains("and #imm,R0"));
    }

    #[test]
    fn unknown_mnemonics_are_reported() {
        assert_eq!(
            resolve_text("halt").unwrap_err(),
            ResolveError::UnknownMnemonic("halt".into())
        );
    }

    #[test]
    fn fmac_needs_fr0_first() {
        assert!(resolve_text("fmac fr1,fr1,fr2").is_err());
    }
}
