//! Top-level assembler pipeline.
//!
//! 1. **Pass 1**: parse every line, assign addresses and build the symbol
//!    table.
//! 2. **Pass 2**: encode instructions and data against the symbol table.
//!
//! [`assemble`] reads a file; [`assemble_source`] takes text directly.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::encoder::encode_line;
use crate::errors::{AssembleError, AssembleErrorKind};
use crate::parser::{parse_line, ParsedLine};
use crate::symbols::{assign_addresses, SymbolTable};

/// Address programs are assembled for unless told otherwise.
pub const DEFAULT_ORIGIN: u32 = 0x8c01_0000;

/// Assembled program and its metadata.
#[derive(Debug, Clone)]
pub struct AssembleResult {
    /// Guest address of `binary[0]`.
    pub origin: u32,
    /// Little-endian program image.
    pub binary: Vec<u8>,
    /// Label definitions.
    pub symbols: SymbolTable,
    /// Address-to-source listing.
    pub listing: Vec<ListingEntry>,
}

impl AssembleResult {
    /// Offset of `label` from the origin.
    #[must_use]
    pub fn offset_of(&self, label: &str) -> Option<u32> {
        self.symbols
            .get(label)
            .map(|symbol| symbol.address.wrapping_sub(self.origin))
    }
}

/// One listing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Address of the first byte.
    pub address: u32,
    /// Emitted bytes.
    pub bytes: Vec<u8>,
    /// Source text of the line.
    pub source: String,
    /// 1-indexed source line.
    pub line: usize,
}

/// Assembles the file at `path` for `origin`.
///
/// # Errors
///
/// I/O failure reading the file, or any parse, symbol or encoding error,
/// located at its file and line.
pub fn assemble(path: &Path, origin: u32) -> Result<AssembleResult, AssembleError> {
    let source = fs::read_to_string(path).map_err(|e| {
        AssembleError::new(AssembleErrorKind::Io(format!("{}: {e}", path.display())))
    })?;
    assemble_named(&source, path, origin)
}

/// Assembles in-memory `source` for `origin`.
///
/// # Errors
///
/// See [`assemble`]; locations carry no file name.
pub fn assemble_source(source: &str, origin: u32) -> Result<AssembleResult, AssembleError> {
    assemble_named(source, Path::new(""), origin)
}

fn assemble_named(
    source: &str,
    file: &Path,
    origin: u32,
) -> Result<AssembleResult, AssembleError> {
    let at = |kind, line| AssembleError::at(kind, PathBuf::from(file), line);
    let texts: Vec<&str> = source.lines().collect();

    let parsed = texts
        .iter()
        .enumerate()
        .map(|(index, text)| {
            parse_line(text, index + 1).map_err(|e| at(AssembleErrorKind::Parse(e.kind), e.line))
        })
        .collect::<Result<Vec<ParsedLine>, _>>()?;

    let assignment = assign_addresses(&parsed, origin)
        .map_err(|e| at(AssembleErrorKind::Symbol(e.kind), e.line))?;

    let mut binary = Vec::new();
    let mut listing = Vec::new();
    for line in &assignment.lines {
        let bytes = encode_line(&line.parsed, &assignment.symbols, line.address)
            .map_err(|e| at(AssembleErrorKind::Encode(e), line.source_line))?;
        if !bytes.is_empty() {
            listing.push(ListingEntry {
                address: line.address,
                bytes: bytes.clone(),
                source: texts
                    .get(line.source_line - 1)
                    .map_or_else(String::new, |text| text.trim().to_owned()),
                line: line.source_line,
            });
        }
        binary.extend(bytes);
    }

    debug!(
        file = %file.display(),
        origin = format_args!("{origin:#010x}"),
        bytes = binary.len(),
        labels = assignment.symbols.len(),
        "assembled"
    );
    Ok(AssembleResult {
        origin,
        binary,
        symbols: assignment.symbols,
        listing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodeError;
    use crate::parser::ParseErrorKind;
    use crate::symbols::SymbolErrorKind;

    #[test]
    fn assembles_a_small_function() {
        let source = "\
start:
    mov #5,r0
loop:
    dt r0
    bf loop
    rts
    nop
";
        let result = assemble_source(source, DEFAULT_ORIGIN).unwrap();
        assert_eq!(
            result.binary,
            [0x05, 0xe0, 0x10, 0x40, 0xfd, 0x8b, 0x0b, 0x00, 0x09, 0x00]
        );
        assert_eq!(result.offset_of("loop"), Some(2));
        assert_eq!(result.listing.len(), 5);
        assert_eq!(result.listing[2].source, "bf loop");
        assert_eq!(result.listing[2].address, DEFAULT_ORIGIN + 4);
    }

    #[test]
    fn literal_pools_resolve_forward() {
        let source = "\
    mov.l value,r1
    rts
    nop
    .align 4
value: .long 0xdeadbeef
";
        let result = assemble_source(source, DEFAULT_ORIGIN).unwrap();
        assert_eq!(&result.binary[0..2], &[0x01, 0xd1]);
        assert_eq!(&result.binary[8..12], &[0xef, 0xbe, 0xad, 0xde]);
    }

    #[test]
    fn errors_carry_their_line() {
        let err = assemble_source("nop\n  halt\n", DEFAULT_ORIGIN).unwrap_err();
        assert_eq!(err.location.as_ref().map(|l| l.line), Some(2));
        assert!(matches!(err.kind, AssembleErrorKind::Encode(EncodeError::Resolve(_))));

        let err = assemble_source("mov #0xzz,r0", DEFAULT_ORIGIN).unwrap_err();
        assert!(matches!(err.kind, AssembleErrorKind::Parse(ParseErrorKind::InvalidNumber(_))));

        let err = assemble_source("a:\na:\n", DEFAULT_ORIGIN).unwrap_err();
        assert!(matches!(
            err.kind,
            AssembleErrorKind::Symbol(SymbolErrorKind::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = assemble(Path::new("/nonexistent/prog.s"), DEFAULT_ORIGIN).unwrap_err();
        assert!(matches!(err.kind, AssembleErrorKind::Io(_)));
        assert!(err.location.is_none());
    }
}
