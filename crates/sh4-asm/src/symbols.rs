//! Symbol table and pass-1 address assignment.
//!
//! Every instruction is one 16-bit word, so pass 1 only needs directive sizes
//! and alignment to place labels.

use std::collections::HashMap;
use std::fmt;

use crate::parser::{Directive, Item, ParsedLine};

/// A label with its assigned address and definition line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    /// Guest address of the label.
    pub address: u32,
    /// Source line of the definition.
    pub defined_at: usize,
}

/// Label name to definition.
pub type SymbolTable = HashMap<String, Symbol>;

/// Error during address assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolError {
    /// Kind of error.
    pub kind: SymbolErrorKind,
    /// Source line where it occurred.
    pub line: usize,
}

/// Classification of symbol errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolErrorKind {
    /// Label defined twice.
    DuplicateLabel {
        /// The label.
        name: String,
        /// Line of the first definition.
        first_definition: usize,
    },
    /// Output ran past the end of the 32-bit address space.
    AddressOverflow {
        /// Address the line would have started at.
        address: u64,
    },
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for SymbolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateLabel {
                name,
                first_definition,
            } => write!(
                f,
                "duplicate label '{name}' (first defined at line {first_definition})"
            ),
            Self::AddressOverflow { address } => {
                write!(f, "address overflow: {address:#x} exceeds 32-bit address space")
            }
        }
    }
}

impl std::error::Error for SymbolError {}

/// A line with its assigned address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressedLine {
    /// Address where the line's content begins.
    pub address: u32,
    /// Size in bytes, including alignment padding.
    pub size: u32,
    /// Parsed content.
    pub parsed: ParsedLine,
    /// 1-indexed source line.
    pub source_line: usize,
}

/// Result of pass 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Lines with addresses, blank lines dropped.
    pub lines: Vec<AddressedLine>,
    /// Label definitions.
    pub symbols: SymbolTable,
    /// One past the last byte.
    pub end_address: u32,
}

/// Byte size of `parsed` when placed at `address`.
#[must_use]
pub fn line_size(parsed: &ParsedLine, address: u32) -> u32 {
    match &parsed.item {
        Item::Empty => 0,
        Item::Instruction(_) => 2,
        Item::Directive(Directive::Long(values)) => 4 * count(values.len()),
        Item::Directive(Directive::Word(values)) => 2 * count(values.len()),
        Item::Directive(Directive::Align(align)) => align_padding(address, *align),
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Bytes needed to bring `address` up to a multiple of `align`.
#[must_use]
pub const fn align_padding(address: u32, align: u32) -> u32 {
    if align <= 1 {
        0
    } else {
        address.wrapping_neg() & (align - 1)
    }
}

/// Assigns addresses starting at `origin` and collects labels.
///
/// `lines[i]` is source line `i + 1`.
///
/// # Errors
///
/// Duplicate labels and address overflow.
pub fn assign_addresses(lines: &[ParsedLine], origin: u32) -> Result<Assignment, SymbolError> {
    let mut symbols = SymbolTable::new();
    let mut addressed = Vec::with_capacity(lines.len());
    let mut pc = u64::from(origin);

    for (index, parsed) in lines.iter().enumerate() {
        let source_line = index + 1;
        if parsed.is_blank() {
            continue;
        }
        let address = u32::try_from(pc).map_err(|_| SymbolError {
            kind: SymbolErrorKind::AddressOverflow { address: pc },
            line: source_line,
        })?;
        let size = line_size(parsed, address);

        if let Some(name) = &parsed.label {
            // Labels on `.align` lines name the aligned address.
            let label_address = if matches!(parsed.item, Item::Directive(Directive::Align(_))) {
                address.wrapping_add(size)
            } else {
                address
            };
            if let Some(existing) = symbols.get(name) {
                return Err(SymbolError {
                    kind: SymbolErrorKind::DuplicateLabel {
                        name: name.clone(),
                        first_definition: existing.defined_at,
                    },
                    line: source_line,
                });
            }
            symbols.insert(
                name.clone(),
                Symbol {
                    address: label_address,
                    defined_at: source_line,
                },
            );
        }

        addressed.push(AddressedLine {
            address,
            size,
            parsed: parsed.clone(),
            source_line,
        });
        pc += u64::from(size);
    }

    let end_address = u32::try_from(pc).map_err(|_| SymbolError {
        kind: SymbolErrorKind::AddressOverflow { address: pc },
        line: lines.len(),
    })?;
    Ok(Assignment {
        lines: addressed,
        symbols,
        end_address,
    })
}
