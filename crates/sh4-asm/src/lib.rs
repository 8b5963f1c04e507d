//! SH4 assembler and register-fixture test runner.

/// Top-level two-pass assembler pipeline.
pub mod assembler;
/// Instruction and directive encoding.
pub mod encoder;
/// Structured assembly error types.
pub mod errors;
/// Mnemonic resolution against the core opcode table.
pub mod mnemonic;
/// Line parser for instructions, labels, and directives.
pub mod parser;
/// Symbol table and pass-1 address assignment.
pub mod symbols;
/// `REGISTER_IN`/`REGISTER_OUT` fixture annotations.
pub mod test_format;
/// Executes fixture cases on a fresh machine.
pub mod test_runner;

pub use assembler::{assemble, assemble_source, AssembleResult, ListingEntry, DEFAULT_ORIGIN};
pub use errors::{AssembleError, AssembleErrorKind, SourceLoc};
pub use test_format::{parse_fixtures, FixtureCase};
pub use test_runner::{run_cases, TestRunResult, TestSummary};

#[cfg(test)]
use tempfile as _;
use tracing_subscriber as _;
