//! Runs annotated fixture cases on a fresh machine.
//!
//! ## Execution model
//!
//! For every case and every [`ExecutionMode`]:
//!
//! 1. Create a [`Dreamcast`] and apply the case's `REGISTER_IN` values.
//! 2. Point `r15` at [`STACK_TOP`].
//! 3. Copy the image, padded to a whole number of words, to [`LOAD_BASE`].
//! 4. Start at the case's entry label and single-step until `pc` reaches
//!    zero, the conventional return address.
//! 5. Compare the `REGISTER_OUT` values against the final context.

use std::fmt;

use sh4_core::{Dreamcast, ExecutionMode, MachineConfig, RegisterMismatch};
use tracing::{debug, warn};

use crate::assembler::AssembleResult;
use crate::test_format::FixtureCase;

/// Guest address fixture images are loaded at.
pub const LOAD_BASE: u32 = 0x8c01_0000;

/// Initial stack pointer for every case.
pub const STACK_TOP: u32 = 0x8d00_0000;

/// Instruction budget before a case is declared runaway.
pub const STEP_LIMIT: usize = 1_000_000;

/// Modes every case is run under.
pub const MODES: [ExecutionMode; 2] = [ExecutionMode::Interpreter, ExecutionMode::Translator];

/// Why a case did not reach its comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseFailure {
    /// The entry label is not defined in the image.
    MissingEntry(String),
    /// Machine setup or execution returned an error.
    Emulator(String),
    /// `pc` never reached zero.
    StepLimit {
        /// Steps taken.
        steps: usize,
        /// `pc` when the limit hit.
        pc: u32,
    },
}

impl fmt::Display for CaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEntry(label) => write!(f, "entry label not defined: {label}"),
            Self::Emulator(msg) => write!(f, "emulator error: {msg}"),
            Self::StepLimit { steps, pc } => {
                write!(f, "no return after {steps} steps (pc {pc:#010x})")
            }
        }
    }
}

/// Outcome of one case under one mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    /// Case name.
    pub name: String,
    /// Mode the case ran under.
    pub mode: ExecutionMode,
    /// Source line of the case.
    pub line: usize,
    /// Steps executed.
    pub steps: usize,
    /// Registers that differed from `REGISTER_OUT`.
    pub mismatches: Vec<RegisterMismatch>,
    /// Set when the case could not complete.
    pub failure: Option<CaseFailure>,
}

impl CaseResult {
    /// True when the case completed with every output matching.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.mismatches.is_empty()
    }
}

impl fmt::Display for CaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            ExecutionMode::Interpreter => "interpreter",
            ExecutionMode::Translator => "translator",
        };
        if self.passed() {
            return write!(f, "PASS {} [{mode}]", self.name);
        }
        write!(f, "FAIL {} [{mode}] (line {})", self.name, self.line)?;
        if let Some(failure) = &self.failure {
            write!(f, "\n  {failure}")?;
        }
        for mismatch in &self.mismatches {
            write!(f, "\n  {mismatch}")?;
        }
        Ok(())
    }
}

/// Results for every case of one program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestRunResult {
    /// One entry per case and mode.
    pub results: Vec<CaseResult>,
}

impl TestRunResult {
    /// True when every case passed in every mode.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(CaseResult::passed)
    }

    /// Counts for reporting.
    #[must_use]
    pub fn summary(&self) -> TestSummary {
        let passed = self.results.iter().filter(|r| r.passed()).count();
        TestSummary {
            passed,
            failed: self.results.len() - passed,
            total: self.results.len(),
        }
    }

    /// Failed results only.
    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results.iter().filter(|r| !r.passed())
    }
}

/// Summary counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestSummary {
    /// Passing runs.
    pub passed: usize,
    /// Failing runs.
    pub failed: usize,
    /// All runs.
    pub total: usize,
}

impl TestSummary {
    /// Adds `other` into `self`.
    pub const fn absorb(&mut self, other: Self) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.total += other.total;
    }
}

impl fmt::Display for TestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} total",
            self.passed, self.failed, self.total
        )
    }
}

/// Runs every case against `program` in every mode of [`MODES`].
///
/// `program` must have been assembled for [`LOAD_BASE`].
#[must_use]
pub fn run_cases(program: &AssembleResult, cases: &[FixtureCase]) -> TestRunResult {
    let image = padded_image(&program.binary);
    let results = cases
        .iter()
        .flat_map(|case| {
            MODES
                .into_iter()
                .map(|mode| run_case(program, &image, case, mode))
        })
        .collect();
    TestRunResult { results }
}

/// Runs one case under `mode`.
#[must_use]
pub fn run_case(
    program: &AssembleResult,
    image: &[u8],
    case: &FixtureCase,
    mode: ExecutionMode,
) -> CaseResult {
    let mut result = CaseResult {
        name: case.name.clone(),
        mode,
        line: case.line,
        steps: 0,
        mismatches: Vec::new(),
        failure: None,
    };

    let offset = match &case.entry {
        Some(label) => match program.offset_of(label) {
            Some(offset) => offset,
            None => {
                result.failure = Some(CaseFailure::MissingEntry(label.clone()));
                return result;
            }
        },
        None => 0,
    };

    match execute(case, image, LOAD_BASE.wrapping_add(offset), mode, &mut result.steps) {
        Ok(mismatches) => result.mismatches = mismatches,
        Err(Outcome::Emulator(err)) => result.failure = Some(CaseFailure::Emulator(err)),
        Err(Outcome::Runaway(pc)) => {
            result.failure = Some(CaseFailure::StepLimit {
                steps: result.steps,
                pc,
            });
        }
    }

    if result.passed() {
        debug!(case = %result.name, ?mode, steps = result.steps, "case passed");
    } else {
        warn!(case = %result.name, ?mode, steps = result.steps, "case failed");
    }
    result
}

enum Outcome {
    Emulator(String),
    Runaway(u32),
}

impl From<sh4_core::EmulatorError> for Outcome {
    fn from(err: sh4_core::EmulatorError) -> Self {
        Self::Emulator(err.to_string())
    }
}

fn execute(
    case: &FixtureCase,
    image: &[u8],
    entry: u32,
    mode: ExecutionMode,
    steps: &mut usize,
) -> Result<Vec<RegisterMismatch>, Outcome> {
    let mut machine = Dreamcast::create(MachineConfig {
        execution_mode: mode,
        ..MachineConfig::default()
    })?;
    {
        let mut ctx = machine.context_mut()?;
        case.inputs.apply(&mut ctx);
        ctx.set_r(15, STACK_TOP);
    }
    machine.memcpy_to_guest(LOAD_BASE, image)?;
    machine.set_pc(entry)?;

    while machine.context()?.pc != 0 {
        if *steps >= STEP_LIMIT {
            return Err(Outcome::Runaway(machine.context()?.pc));
        }
        machine.run_cpu(1)?;
        *steps += 1;
    }

    let ctx = machine.context()?;
    Ok(case.outputs.mismatches(&ctx))
}

/// `binary` zero-padded to a multiple of four bytes.
#[must_use]
pub fn padded_image(binary: &[u8]) -> Vec<u8> {
    let mut image = binary.to_vec();
    image.resize(binary.len().next_multiple_of(4), 0);
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble_source;
    use crate::test_format::parse_fixtures;
    use sh4_core::RegisterId;

    fn run(source: &str) -> TestRunResult {
        let program = assemble_source(source, LOAD_BASE).unwrap();
        let cases = parse_fixtures(source, "inline").unwrap();
        run_cases(&program, &cases)
    }

    #[test]
    fn padding_rounds_up_to_words() {
        assert_eq!(padded_image(&[1, 2]), [1, 2, 0, 0]);
        assert_eq!(padded_image(&[1, 2, 3, 4]), [1, 2, 3, 4]);
        assert!(padded_image(&[]).is_empty());
    }

    #[test]
    fn passing_case_runs_in_both_modes() {
        let result = run("\
# REGISTER_IN r0 0x10
    add #1,r0
    rts
    nop
# REGISTER_OUT r0 0x11
");
        assert_eq!(result.results.len(), 2);
        assert!(result.all_passed(), "{:?}", result.results);
        assert_eq!(result.results[0].mode, ExecutionMode::Interpreter);
        assert_eq!(result.results[1].mode, ExecutionMode::Translator);
        assert_eq!(result.summary().passed, 2);
    }

    #[test]
    fn stack_pointer_is_preset() {
        let result = run("\
    rts
    nop
# REGISTER_OUT r15 0x8d000000
");
        assert!(result.all_passed());
    }

    #[test]
    fn mismatches_are_reported() {
        let result = run("\
test_wrong:
    mov #3,r2
    rts
    nop
# REGISTER_OUT r2 4
");
        assert!(!result.all_passed());
        let failure = &result.results[0];
        assert_eq!(failure.mismatches.len(), 1);
        assert_eq!(failure.mismatches[0].register, RegisterId::R(2));
        assert_eq!(failure.mismatches[0].actual, 3);
        assert!(failure.to_string().contains("r2 expected: 0x4, actual 0x3"));
        assert_eq!(result.summary().failed, 2);
    }

    #[test]
    fn cases_enter_at_their_labels() {
        let result = run("\
test_one:
    rts
    mov #1,r1
# REGISTER_OUT r1 1
test_two:
    rts
    mov #2,r1
# REGISTER_OUT r1 2
");
        assert_eq!(result.results.len(), 4);
        assert!(result.all_passed(), "{:?}", result.results);
    }

    #[test]
    fn runaway_case_hits_the_step_limit() {
        let program = assemble_source("spin: bra spin\n nop\n", LOAD_BASE).unwrap();
        let case = parse_fixtures("", "spin").unwrap().remove(0);
        let image = padded_image(&program.binary);
        let result = run_case(&program, &image, &case, ExecutionMode::Interpreter);
        assert!(matches!(result.failure, Some(CaseFailure::StepLimit { .. })));
    }
}
