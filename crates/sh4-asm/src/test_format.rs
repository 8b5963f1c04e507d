//! Fixture annotations embedded in assembly comments.
//!
//! ```text
//! test_add:
//!   # REGISTER_IN r0 0x1
//!   add #1,r0
//!   rts
//!   nop
//!   # REGISTER_OUT r0 0x2
//! ```
//!
//! Each label starting with `test_` opens a case that begins executing at
//! that label. Annotations above the first such label, or a file without
//! any, form one case entered at the origin.

use std::fmt;

use sh4_core::{ContextFixture, RegisterId};

use crate::parser::{parse_line, parse_number};

/// Prefix that marks a label as a fixture entry point.
pub const CASE_PREFIX: &str = "test_";

/// Direction of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `REGISTER_IN`: applied before the run.
    In,
    /// `REGISTER_OUT`: compared after the run.
    Out,
}

/// One fixture case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureCase {
    /// Case name: the label, or the file stem for the implicit case.
    pub name: String,
    /// Entry label; `None` enters at the origin.
    pub entry: Option<String>,
    /// Register inputs.
    pub inputs: ContextFixture,
    /// Expected register outputs.
    pub outputs: ContextFixture,
    /// Number of annotations read.
    pub annotations: usize,
    /// 1-indexed line where the case starts.
    pub line: usize,
}

impl FixtureCase {
    fn new(name: String, entry: Option<String>, line: usize) -> Self {
        Self {
            name,
            entry,
            inputs: ContextFixture::default(),
            outputs: ContextFixture::default(),
            annotations: 0,
            line,
        }
    }

    fn record(&mut self, direction: Direction, register: RegisterId, value: u32) {
        match direction {
            Direction::In => self.inputs.set(register, value),
            Direction::Out => self.outputs.set(register, value),
        }
        self.annotations += 1;
    }
}

/// Classification of annotation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationErrorKind {
    /// Register name not recognised.
    UnknownRegister(String),
    /// Value missing, malformed or wider than 32 bits.
    InvalidValue(String),
    /// Wrong number of fields.
    Malformed(String),
}

impl fmt::Display for AnnotationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRegister(r) => write!(f, "unknown register in annotation: {r}"),
            Self::InvalidValue(v) => write!(f, "invalid annotation value: {v}"),
            Self::Malformed(text) => write!(f, "malformed annotation: {text}"),
        }
    }
}

/// Annotation error at a source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationError {
    /// 1-indexed line.
    pub line: usize,
    /// Kind of error.
    pub kind: AnnotationErrorKind,
}

impl fmt::Display for AnnotationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl std::error::Error for AnnotationError {}

/// Parses a single annotation comment; `Ok(None)` for ordinary comments
/// and non-comment lines.
///
/// # Errors
///
/// A `REGISTER_IN`/`REGISTER_OUT` comment with a bad register or value.
pub fn parse_annotation(
    line: &str,
) -> Result<Option<(Direction, RegisterId, u32)>, AnnotationErrorKind> {
    let Some(body) = line.trim_start().strip_prefix('#') else {
        return Ok(None);
    };
    let mut fields = body.split_whitespace();
    let direction = match fields.next() {
        Some("REGISTER_IN") => Direction::In,
        Some("REGISTER_OUT") => Direction::Out,
        _ => return Ok(None),
    };
    let (Some(name), Some(value), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(AnnotationErrorKind::Malformed(body.trim().to_owned()));
    };
    let register =
        RegisterId::parse(name).ok_or_else(|| AnnotationErrorKind::UnknownRegister(name.to_owned()))?;
    let value = parse_number(value)
        .ok()
        .and_then(register_value)
        .ok_or_else(|| AnnotationErrorKind::InvalidValue(value.to_owned()))?;
    Ok(Some((direction, register, value)))
}

/// Accepts anything that fits 32 bits as unsigned or as two's complement.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn register_value(value: i64) -> Option<u32> {
    (i64::from(i32::MIN)..=i64::from(u32::MAX))
        .contains(&value)
        .then_some(value as u32)
}

/// Splits `source` into fixture cases.
///
/// `default_name` names the implicit case entered at the origin.
///
/// # Errors
///
/// The first malformed annotation.
pub fn parse_fixtures(
    source: &str,
    default_name: &str,
) -> Result<Vec<FixtureCase>, AnnotationError> {
    let mut cases = vec![FixtureCase::new(default_name.to_owned(), None, 1)];

    for (index, text) in source.lines().enumerate() {
        let line = index + 1;
        let label = parse_line(text, line).ok().and_then(|parsed| parsed.label);
        if let Some(label) = label.filter(|l| l.starts_with(CASE_PREFIX)) {
            cases.push(FixtureCase::new(label.clone(), Some(label), line));
        }
        let annotation =
            parse_annotation(text).map_err(|kind| AnnotationError { line, kind })?;
        if let (Some((direction, register, value)), Some(case)) = (annotation, cases.last_mut()) {
            case.record(direction, register, value);
        }
    }

    // The implicit case only runs on its own or when it carries annotations.
    if cases.len() > 1 && cases[0].annotations == 0 {
        cases.remove(0);
    }
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("# REGISTER_IN r0 0x1", Some((Direction::In, RegisterId::R(0), 1)))]
    #[case("  # REGISTER_OUT fr3 0x3f800000", Some((Direction::Out, RegisterId::Fr(3), 0x3f80_0000)))]
    #[case("# REGISTER_IN fpscr 0x00040001", Some((Direction::In, RegisterId::Fpscr, 0x0004_0001)))]
    #[case("# REGISTER_OUT r1 -1", Some((Direction::Out, RegisterId::R(1), 0xffff_ffff)))]
    #[case("# just a note", None)]
    #[case("mov #1,r0", None)]
    fn annotations(#[case] text: &str, #[case] expected: Option<(Direction, RegisterId, u32)>) {
        assert_eq!(parse_annotation(text).unwrap(), expected);
    }

    #[rstest]
    #[case("# REGISTER_IN q9 1")]
    #[case("# REGISTER_IN r0")]
    #[case("# REGISTER_IN r0 0x1ffffffff")]
    #[case("# REGISTER_OUT r0 1 2")]
    fn bad_annotations(#[case] text: &str) {
        assert!(parse_annotation(text).is_err());
    }

    #[test]
    fn file_without_labels_is_one_case() {
        let source = "# REGISTER_IN r0 1\nadd #1,r0\nrts\nnop\n# REGISTER_OUT r0 2\n";
        let cases = parse_fixtures(source, "add").unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "add");
        assert_eq!(cases[0].entry, None);
        assert_eq!(cases[0].inputs.get(RegisterId::R(0)), Some(1));
        assert_eq!(cases[0].outputs.get(RegisterId::R(0)), Some(2));
    }

    #[test]
    fn test_labels_open_cases() {
        let source = "\
helper:
  rts
  nop
test_first:
  # REGISTER_IN r1 5
  rts
  nop
  # REGISTER_OUT r1 5
test_second: rts
  nop
  # REGISTER_OUT r2 0
";
        let cases = parse_fixtures(source, "file").unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["test_first", "test_second"]);
        assert_eq!(cases[0].entry.as_deref(), Some("test_first"));
        assert_eq!(cases[0].line, 4);
        assert_eq!(cases[0].annotations, 2);
        assert_eq!(cases[1].outputs.get(RegisterId::R(2)), Some(0));
        assert_eq!(cases[1].inputs.get(RegisterId::R(1)), None);
    }

    #[test]
    fn errors_report_the_line() {
        let err = parse_fixtures("nop\n# REGISTER_IN bogus 1\n", "x").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(matches!(err.kind, AnnotationErrorKind::UnknownRegister(_)));
    }
}
