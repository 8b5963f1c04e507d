//! Pass-2 encoding of instructions and data directives.
//!
//! Output is little-endian, matching the guest byte order. Operand fields
//! are placed using the field positions of the resolved [`OpDef`].

use std::fmt;

use sh4_core::encoding::{OpDef, Opcode, Operand as Template};

use crate::mnemonic::{resolve, ResolveError};
use crate::parser::{Base, Directive, Item, Operand, ParsedInstruction, ParsedLine, Value};
use crate::symbols::{align_padding, SymbolTable};

const NOP: u16 = 0x0009;

/// Encoding failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Mnemonic or operand shape did not resolve.
    Resolve(ResolveError),
    /// Label used but never defined.
    UndefinedLabel(String),
    /// Value does not fit its field.
    OutOfRange {
        /// What was being encoded.
        what: &'static str,
        /// Offending value.
        value: i64,
    },
    /// Displacement or target not a multiple of the access size.
    Misaligned {
        /// What was being encoded.
        what: &'static str,
        /// Offending value.
        value: i64,
        /// Required alignment.
        align: u32,
    },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve(e) => write!(f, "{e}"),
            Self::UndefinedLabel(name) => write!(f, "undefined label: {name}"),
            Self::OutOfRange { what, value } => write!(f, "{what} out of range: {value:#x}"),
            Self::Misaligned { what, value, align } => {
                write!(f, "{what} {value:#x} is not a multiple of {align}")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<ResolveError> for EncodeError {
    fn from(e: ResolveError) -> Self {
        Self::Resolve(e)
    }
}

fn resolve_value(value: &Value, symbols: &SymbolTable) -> Result<i64, EncodeError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Symbol(name) => symbols
            .get(name)
            .map(|symbol| i64::from(symbol.address))
            .ok_or_else(|| EncodeError::UndefinedLabel(name.clone())),
    }
}

fn in_range(what: &'static str, value: i64, min: i64, max: i64) -> Result<i64, EncodeError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(EncodeError::OutOfRange { what, value })
    }
}

fn scaled(what: &'static str, value: i64, scale: u8) -> Result<i64, EncodeError> {
    let scale = i64::from(scale.max(1));
    if value % scale == 0 {
        Ok(value / scale)
    } else {
        Err(EncodeError::Misaligned {
            what,
            value,
            align: u32::try_from(scale).unwrap_or(1),
        })
    }
}

#[derive(Default)]
struct Fields {
    n: Option<i64>,
    m: Option<i64>,
    i: Option<i64>,
    d: Option<i64>,
}

/// Encodes one instruction located at `address`.
///
/// # Errors
///
/// Resolution failures, undefined labels and values that do not fit.
pub fn encode_instruction(
    instr: &ParsedInstruction,
    symbols: &SymbolTable,
    address: u32,
) -> Result<u16, EncodeError> {
    let def = resolve(instr)?;
    let mut fields = Fields::default();

    for (&template, operand) in def.operands.iter().zip(&instr.operands) {
        collect(def, template, operand, symbols, address, &mut fields)?;
    }

    let (_, mut word) = def.mask_value();
    for (letter, value, what) in [
        (b'n', fields.n, "register"),
        (b'm', fields.m, "register"),
        (b'i', fields.i, "immediate"),
        (b'd', fields.d, "displacement"),
    ] {
        let (Some(field), Some(value)) = (def.field(letter), value) else {
            continue;
        };
        let mask = (1i64 << field.width) - 1;
        // Signed fields arrive pre-checked; truncation keeps two's complement.
        if value < -(1 << (field.width - 1)) || value > mask {
            return Err(EncodeError::OutOfRange { what, value });
        }
        let bits = u16::try_from(value & mask).map_err(|_| EncodeError::OutOfRange { what, value })?;
        word |= bits << field.shift;
    }
    Ok(word)
}

fn collect(
    def: &OpDef,
    template: Template,
    operand: &Operand,
    symbols: &SymbolTable,
    address: u32,
    fields: &mut Fields,
) -> Result<(), EncodeError> {
    use Template as T;
    let reg = |n: u8| i64::from(n);
    match (template, operand) {
        (T::Rn, Operand::Gpr(n))
        | (T::AtRn, Operand::Indirect(n))
        | (T::AtRnInc, Operand::PostIncrement(n))
        | (T::AtRnDec, Operand::PreDecrement(n))
        | (T::R0Rn, Operand::Indexed(Base::Gpr(n)))
        | (T::RnBank, Operand::Bank(n))
        | (T::FRn, Operand::Fr(n)) => fields.n = Some(reg(*n)),
        (T::Rm, Operand::Gpr(n))
        | (T::AtRm, Operand::Indirect(n))
        | (T::AtRmInc, Operand::PostIncrement(n))
        | (T::R0Rm, Operand::Indexed(Base::Gpr(n)))
        | (T::RmBank, Operand::Bank(n))
        | (T::FRm, Operand::Fr(n)) => fields.m = Some(reg(*n)),
        (T::DRn, Operand::Dr(n)) => fields.n = Some(reg(*n / 2)),
        (T::DRm, Operand::Dr(n)) => fields.m = Some(reg(*n / 2)),
        (T::FVn, Operand::Fv(n)) => fields.n = Some(reg(*n / 4)),
        (T::FVm, Operand::Fv(n)) => fields.m = Some(reg(*n / 4)),
        (T::DispRn, Operand::Displacement { disp, base }) => {
            if let Base::Gpr(n) = base {
                fields.n = Some(reg(*n));
            }
            let d = unsigned_disp(def, disp, symbols)?;
            fields.d = Some(d);
        }
        (T::DispRm, Operand::Displacement { disp, base }) => {
            if let Base::Gpr(n) = base {
                fields.m = Some(reg(*n));
            }
            let d = unsigned_disp(def, disp, symbols)?;
            fields.d = Some(d);
        }
        (T::DispGbr, Operand::Displacement { disp, .. }) => {
            let d = unsigned_disp(def, disp, symbols)?;
            fields.d = Some(d);
        }
        (T::DispPc, Operand::Displacement {
            disp: Value::Number(n),
            ..
        }) => {
            let d = scaled("displacement", *n, def.disp_scale)?;
            fields.d = Some(in_range("displacement", d, 0, 0xff)?);
        }
        (T::DispPc, Operand::Displacement { disp: target, .. } | Operand::Address(target)) => {
            let target = resolve_value(target, symbols)?;
            let base = if def.disp_scale == 4 {
                i64::from((address & !3).wrapping_add(4))
            } else {
                i64::from(address.wrapping_add(4))
            };
            let d = scaled("pc-relative offset", target - base, def.disp_scale)?;
            fields.d = Some(in_range("pc-relative offset", d, 0, 0xff)?);
        }
        (T::Label, Operand::Address(target)) => {
            let target = resolve_value(target, symbols)?;
            let offset = scaled("branch offset", target - (i64::from(address) + 4), 2)?;
            let bits = def.field(b'd').map_or(8, |f| f.width);
            let half = 1i64 << (bits - 1);
            fields.d = Some(in_range("branch offset", offset, -half, half - 1)?);
        }
        (T::Imm, Operand::Immediate(value)) => {
            let value = resolve_value(value, symbols)?;
            let min = if signed_immediate(def.op) { -128 } else { 0 };
            let max = if signed_immediate(def.op) { 127 } else { 255 };
            // Raw bit patterns like `#0xff` are accepted for signed forms too.
            let value = if signed_immediate(def.op) && (128..=255).contains(&value) {
                value - 256
            } else {
                value
            };
            fields.i = Some(in_range("immediate", value, min, max)?);
        }
        _ => {}
    }
    Ok(())
}

fn unsigned_disp(def: &OpDef, disp: &Value, symbols: &SymbolTable) -> Result<i64, EncodeError> {
    let value = resolve_value(disp, symbols)?;
    let d = scaled("displacement", value, def.disp_scale)?;
    let max = def.field(b'd').map_or(0, |f| (1i64 << f.width) - 1);
    in_range("displacement", d, 0, max)
}

const fn signed_immediate(op: Opcode) -> bool {
    matches!(op, Opcode::MovImm | Opcode::AddImm | Opcode::CmpEqImm)
}

/// Encodes a directive located at `address`.
///
/// # Errors
///
/// Undefined labels and values that do not fit the data width.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode_directive(
    directive: &Directive,
    symbols: &SymbolTable,
    address: u32,
) -> Result<Vec<u8>, EncodeError> {
    match directive {
        Directive::Long(values) => values.iter().try_fold(Vec::new(), |mut out, value| {
            let v = in_range(
                ".long value",
                resolve_value(value, symbols)?,
                i64::from(i32::MIN),
                i64::from(u32::MAX),
            )?;
            out.extend_from_slice(&(v as u32).to_le_bytes());
            Ok(out)
        }),
        Directive::Word(values) => values.iter().try_fold(Vec::new(), |mut out, value| {
            let v = in_range(
                ".word value",
                resolve_value(value, symbols)?,
                i64::from(i16::MIN),
                i64::from(u16::MAX),
            )?;
            out.extend_from_slice(&(v as u16).to_le_bytes());
            Ok(out)
        }),
        Directive::Align(align) => {
            let padding = align_padding(address, *align) as usize;
            let mut out = Vec::with_capacity(padding);
            if padding % 2 == 1 {
                out.push(0);
            }
            while out.len() < padding {
                out.extend_from_slice(&NOP.to_le_bytes());
            }
            Ok(out)
        }
    }
}

/// Encodes any parsed line to bytes.
///
/// # Errors
///
/// See [`encode_instruction`] and [`encode_directive`].
pub fn encode_line(
    parsed: &ParsedLine,
    symbols: &SymbolTable,
    address: u32,
) -> Result<Vec<u8>, EncodeError> {
    match &parsed.item {
        Item::Empty => Ok(Vec::new()),
        Item::Instruction(instr) => {
            Ok(encode_instruction(instr, symbols, address)?.to_le_bytes().to_vec())
        }
        Item::Directive(directive) => encode_directive(directive, symbols, address),
    }
}
