//! Source line parser for labels, directives and instruction operands.
//!
//! Operand syntax follows the disassembler output, so anything
//! `sh4_core::disasm` prints can be read back: `r3`, `#-1`, `@r5+`,
//! `@-r15`, `@(8,gbr)`, `@(r0,r4)`, `r2_bank`, `dr4`, `fv8`, `xmtrx`,
//! plain labels and absolute branch targets.
//!
//! A line whose first non-blank character is `#` is a comment (fixture
//! annotations live there); `!` and `;` start a trailing comment anywhere.

use std::fmt;

/// A numeric literal or a symbol reference resolved in pass 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Literal value.
    Number(i64),
    /// Label reference.
    Symbol(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Symbol(s) => f.write_str(s),
        }
    }
}

/// Base register of a displacement or indexed operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    /// General register.
    Gpr(u8),
    /// Global base register.
    Gbr,
    /// Program counter.
    Pc,
}

/// Named system register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SystemRegister {
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
    Xmtrx,
}

impl SystemRegister {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "sr" => Self::Sr,
            "gbr" => Self::Gbr,
            "vbr" => Self::Vbr,
            "ssr" => Self::Ssr,
            "spc" => Self::Spc,
            "sgr" => Self::Sgr,
            "dbr" => Self::Dbr,
            "mach" => Self::Mach,
            "macl" => Self::Macl,
            "pr" => Self::Pr,
            "fpscr" => Self::Fpscr,
            "fpul" => Self::Fpul,
            "xmtrx" => Self::Xmtrx,
            _ => return None,
        })
    }
}

/// Parsed operand, before matching against an instruction template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `rN`
    Gpr(u8),
    /// `rN_bank`
    Bank(u8),
    /// `frN`
    Fr(u8),
    /// `drN` (N even)
    Dr(u8),
    /// `fvN` (N a multiple of four)
    Fv(u8),
    /// Named system register.
    System(SystemRegister),
    /// `#value`
    Immediate(Value),
    /// `@rN`
    Indirect(u8),
    /// `@rN+`
    PostIncrement(u8),
    /// `@-rN`
    PreDecrement(u8),
    /// `@(disp,base)`
    Displacement {
        /// Byte displacement or a label.
        disp: Value,
        /// Base register.
        base: Base,
    },
    /// `@(r0,base)`
    Indexed(Base),
    /// Bare label or absolute address.
    Address(Value),
}

/// A parsed instruction: mnemonic plus operands in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction {
    /// Mnemonic, lowercase.
    pub mnemonic: String,
    /// Operands in source order.
    pub operands: Vec<Operand>,
}

/// A data or layout directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `.data.l` / `.long`
    Long(Vec<Value>),
    /// `.data.w` / `.word`
    Word(Vec<Value>),
    /// `.align n`, in bytes.
    Align(u32),
}

/// What a source line contains besides its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// Nothing.
    Empty,
    /// A directive.
    Directive(Directive),
    /// An instruction.
    Instruction(ParsedInstruction),
}

/// A single parsed source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// Label defined on this line.
    pub label: Option<String>,
    /// Line content.
    pub item: Item,
}

impl ParsedLine {
    /// A line with neither label nor content.
    pub const BLANK: Self = Self {
        label: None,
        item: Item::Empty,
    };

    /// Returns true when the line carries nothing.
    #[must_use]
    pub const fn is_blank(&self) -> bool {
        self.label.is_none() && matches!(self.item, Item::Empty)
    }
}

/// Classification of parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Operand text matches no operand form.
    InvalidOperand(String),
    /// Register number out of range or misaligned (`dr3`, `fv2`).
    InvalidRegister(String),
    /// Malformed numeric literal.
    InvalidNumber(String),
    /// Unknown directive name.
    InvalidDirective(String),
    /// Directive argument missing or malformed.
    InvalidDirectiveValue(String),
    /// Bad label name.
    InvalidLabel(String),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOperand(o) => write!(f, "invalid operand: {o}"),
            Self::InvalidRegister(r) => write!(f, "invalid register: {r}"),
            Self::InvalidNumber(n) => write!(f, "invalid number: {n}"),
            Self::InvalidDirective(d) => write!(f, "unknown directive: .{d}"),
            Self::InvalidDirectiveValue(v) => write!(f, "invalid directive value: {v}"),
            Self::InvalidLabel(l) => write!(f, "invalid label: {l}"),
        }
    }
}

/// Parse error at a source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-indexed line.
    pub line: usize,
    /// Kind of error.
    pub kind: ParseErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for ParseError {}

/// Result of parsing a single line.
pub type ParseResult = Result<ParsedLine, ParseError>;

/// Parses one source line.
///
/// # Errors
///
/// Returns a [`ParseError`] for malformed operands, numbers, labels or
/// directives. Mnemonics are not checked here.
pub fn parse_line(line: &str, line_number: usize) -> ParseResult {
    let fail = |kind| ParseError {
        line: line_number,
        kind,
    };
    let text = strip_comment(line).trim();
    if text.is_empty() {
        return Ok(ParsedLine::BLANK);
    }

    let (label, rest) = match split_label(text) {
        Some((label, rest)) => {
            if !is_valid_label(label) {
                return Err(fail(ParseErrorKind::InvalidLabel(label.to_owned())));
            }
            (Some(label.to_owned()), rest.trim())
        }
        None => (None, text),
    };

    let item = if rest.is_empty() {
        Item::Empty
    } else if let Some(directive) = rest.strip_prefix('.') {
        Item::Directive(parse_directive(directive).map_err(fail)?)
    } else {
        Item::Instruction(parse_instruction(rest).map_err(fail)?)
    };
    Ok(ParsedLine { label, item })
}

/// Strips `#`-led comment lines and `!`/`;` trailing comments.
#[must_use]
pub fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    line.find(|c: char| c == '!' || c == ';').map_or(line, |pos| &line[..pos])
}

fn split_label(text: &str) -> Option<(&str, &str)> {
    let colon = text.find(':')?;
    let head = &text[..colon];
    if head.contains(|c: char| matches!(c, '@' | '(' | ',') || c.is_whitespace()) {
        return None;
    }
    Some((head.trim(), &text[colon + 1..]))
}

fn is_valid_label(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '.')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn parse_directive(text: &str) -> Result<Directive, ParseErrorKind> {
    let (name, args) = text
        .split_once(char::is_whitespace)
        .map_or((text, ""), |(n, a)| (n, a.trim()));
    let values = || -> Result<Vec<Value>, ParseErrorKind> {
        if args.is_empty() {
            return Err(ParseErrorKind::InvalidDirectiveValue(format!(".{name} needs a value")));
        }
        args.split(',').map(|v| parse_value(v.trim())).collect()
    };
    match name.to_ascii_lowercase().as_str() {
        "data.l" | "long" => values().map(Directive::Long),
        "data.w" | "word" | "short" => values().map(Directive::Word),
        "align" => {
            let n = parse_number(args)?;
            u32::try_from(n)
                .ok()
                .filter(|n| n.is_power_of_two())
                .map(Directive::Align)
                .ok_or_else(|| ParseErrorKind::InvalidDirectiveValue(args.to_owned()))
        }
        other => Err(ParseErrorKind::InvalidDirective(other.to_owned())),
    }
}

fn parse_instruction(text: &str) -> Result<ParsedInstruction, ParseErrorKind> {
    let (mnemonic, rest) = text
        .split_once(char::is_whitespace)
        .map_or((text, ""), |(m, r)| (m, r.trim()));
    let operands = split_operands(rest)
        .into_iter()
        .map(parse_operand)
        .collect::<Result<_, _>>()?;
    Ok(ParsedInstruction {
        mnemonic: mnemonic.to_ascii_lowercase(),
        operands,
    })
}

/// Splits on commas outside parentheses.
fn split_operands(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

fn parse_operand(text: &str) -> Result<Operand, ParseErrorKind> {
    let lower = text.to_ascii_lowercase();
    let invalid = || ParseErrorKind::InvalidOperand(text.to_owned());

    if let Some(imm) = text.strip_prefix('#') {
        return parse_value(imm.trim()).map(Operand::Immediate);
    }
    if let Some(mem) = text.strip_prefix('@') {
        return parse_memory(mem.trim()).ok_or_else(invalid)?;
    }
    if let Some(reg) = parse_register(&lower) {
        return reg;
    }
    if text.is_empty() {
        return Err(invalid());
    }
    parse_value(text).map(Operand::Address)
}

fn parse_memory(text: &str) -> Option<Result<Operand, ParseErrorKind>> {
    if let Some(reg) = text.strip_prefix('-') {
        return Some(gpr(reg).map(Operand::PreDecrement));
    }
    if let Some(reg) = text.strip_suffix('+') {
        return Some(gpr(reg).map(Operand::PostIncrement));
    }
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        let (left, right) = inner.split_once(',')?;
        let base = match right.trim().to_ascii_lowercase().as_str() {
            "gbr" => Ok(Base::Gbr),
            "pc" => Ok(Base::Pc),
            reg => gpr(reg).map(Base::Gpr),
        };
        let left = left.trim();
        return Some(base.and_then(|base| {
            if left.eq_ignore_ascii_case("r0") {
                Ok(Operand::Indexed(base))
            } else {
                parse_value(left).map(|disp| Operand::Displacement { disp, base })
            }
        }));
    }
    Some(gpr(text).map(Operand::Indirect))
}

fn gpr(text: &str) -> Result<u8, ParseErrorKind> {
    match parse_register(&text.trim().to_ascii_lowercase()) {
        Some(Ok(Operand::Gpr(n))) => Ok(n),
        _ => Err(ParseErrorKind::InvalidRegister(text.trim().to_owned())),
    }
}

/// Register-shaped names; `None` when the text is not a register at all.
fn parse_register(lower: &str) -> Option<Result<Operand, ParseErrorKind>> {
    if let Some(system) = SystemRegister::parse(lower) {
        return Some(Ok(Operand::System(system)));
    }
    let bad = || ParseErrorKind::InvalidRegister(lower.to_owned());
    let indexed = |prefix: &str| -> Option<Result<u8, ParseErrorKind>> {
        let digits = lower.strip_prefix(prefix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(digits.parse::<u8>().map_err(|_| bad()))
    };
    let checked = |n: Result<u8, ParseErrorKind>, ok: fn(u8) -> bool, wrap: fn(u8) -> Operand| {
        n.and_then(|n| if ok(n) { Ok(wrap(n)) } else { Err(bad()) })
    };

    if let Some(bank) = lower.strip_suffix("_bank") {
        let n = bank.strip_prefix('r')?.parse::<u8>().map_err(|_| bad());
        return Some(checked(n, |n| n < 8, Operand::Bank));
    }
    if let Some(n) = indexed("fr") {
        return Some(checked(n, |n| n < 16, Operand::Fr));
    }
    if let Some(n) = indexed("dr") {
        return Some(checked(n, |n| n < 16 && n % 2 == 0, Operand::Dr));
    }
    if let Some(n) = indexed("fv") {
        return Some(checked(n, |n| n < 16 && n % 4 == 0, Operand::Fv));
    }
    indexed("r").map(|n| checked(n, |n| n < 16, Operand::Gpr))
}

/// Parses a literal or a label reference.
///
/// # Errors
///
/// Text that is neither a number nor a valid label.
pub fn parse_value(text: &str) -> Result<Value, ParseErrorKind> {
    let starts_numeric = text
        .trim_start_matches(['-', '+'])
        .starts_with(|c: char| c.is_ascii_digit());
    if starts_numeric {
        parse_number(text).map(Value::Number)
    } else if is_valid_label(text) {
        Ok(Value::Symbol(text.to_owned()))
    } else {
        Err(ParseErrorKind::InvalidNumber(text.to_owned()))
    }
}

/// Parses `0x` hex, `0b` binary or decimal, optionally negative.
///
/// # Errors
///
/// Malformed or out-of-range literals.
pub fn parse_number(text: &str) -> Result<i64, ParseErrorKind> {
    let invalid = || ParseErrorKind::InvalidNumber(text.to_owned());
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let lower = body.to_ascii_lowercase();
    let magnitude = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        lower.parse::<i64>()
    }
    .map_err(|_| invalid())?;
    Ok(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn instruction(line: &str) -> ParsedInstruction {
        match parse_line(line, 1).unwrap().item {
            Item::Instruction(instr) => instr,
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    #[test]
    fn blank_and_comment_lines() {
        assert!(parse_line("", 1).unwrap().is_blank());
        assert!(parse_line("   ! just a comment", 1).unwrap().is_blank());
        assert!(parse_line("# REGISTER_IN r0 0x1", 1).unwrap().is_blank());
    }

    #[test]
    fn label_with_instruction_keeps_both() {
        let line = parse_line("loop: dt r1", 3).unwrap();
        assert_eq!(line.label.as_deref(), Some("loop"));
        assert_eq!(
            line.item,
            Item::Instruction(ParsedInstruction {
                mnemonic: "dt".into(),
                operands: vec![Operand::Gpr(1)],
            })
        );
    }

    #[rstest]
    #[case("r15", Operand::Gpr(15))]
    #[case("R3", Operand::Gpr(3))]
    #[case("r7_bank", Operand::Bank(7))]
    #[case("fr10", Operand::Fr(10))]
    #[case("dr4", Operand::Dr(4))]
    #[case("fv12", Operand::Fv(12))]
    #[case("fpul", Operand::System(SystemRegister::Fpul))]
    #[case("XMTRX", Operand::System(SystemRegister::Xmtrx))]
    #[case("#-1", Operand::Immediate(Value::Number(-1)))]
    #[case("#0x20", Operand::Immediate(Value::Number(0x20)))]
    #[case("@r5", Operand::Indirect(5))]
    #[case("@r5+", Operand::PostIncrement(5))]
    #[case("@-r15", Operand::PreDecrement(15))]
    #[case("@(8,gbr)", Operand::Displacement { disp: Value::Number(8), base: Base::Gbr })]
    #[case("@(4, PC)", Operand::Displacement { disp: Value::Number(4), base: Base::Pc })]
    #[case("@(12,r2)", Operand::Displacement { disp: Value::Number(12), base: Base::Gpr(2) })]
    #[case("@(data,pc)", Operand::Displacement { disp: Value::Symbol("data".into()), base: Base::Pc })]
    #[case("@(r0,r4)", Operand::Indexed(Base::Gpr(4)))]
    #[case("@(r0,gbr)", Operand::Indexed(Base::Gbr))]
    #[case("0x8c010008", Operand::Address(Value::Number(0x8c01_0008)))]
    #[case("done", Operand::Address(Value::Symbol("done".into())))]
    fn operand_forms(#[case] text: &str, #[case] expected: Operand) {
        assert_eq!(parse_operand(text).unwrap(), expected);
    }

    #[rstest]
    #[case("r16")]
    #[case("dr3")]
    #[case("fv2")]
    #[case("r8_bank")]
    #[case("@r99")]
    #[case("@(4,r20)")]
    fn bad_registers(#[case] text: &str) {
        assert!(matches!(
            parse_operand(text),
            Err(ParseErrorKind::InvalidRegister(_))
        ));
    }

    #[test]
    fn operand_lists_split_outside_parentheses() {
        let instr = instruction("mov.l @(4,r1), r2 ! load");
        assert_eq!(instr.mnemonic, "mov.l");
        assert_eq!(
            instr.operands,
            vec![
                Operand::Displacement {
                    disp: Value::Number(4),
                    base: Base::Gpr(1)
                },
                Operand::Gpr(2)
            ]
        );
        assert!(instruction("rts").operands.is_empty());
    }

    #[rstest]
    #[case(".data.l 0x12345678", Directive::Long(vec![Value::Number(0x1234_5678)]))]
    #[case(".long target, 4", Directive::Long(vec![Value::Symbol("target".into()), Value::Number(4)]))]
    #[case(".word -2", Directive::Word(vec![Value::Number(-2)]))]
    #[case(".data.w 0b101", Directive::Word(vec![Value::Number(5)]))]
    #[case(".align 4", Directive::Align(4))]
    fn directives(#[case] text: &str, #[case] expected: Directive) {
        assert_eq!(parse_line(text, 1).unwrap().item, Item::Directive(expected));
    }

    #[test]
    fn directive_errors_carry_the_line() {
        let err = parse_line(".align 3", 9).unwrap_err();
        assert_eq!(err.line, 9);
        assert!(matches!(err.kind, ParseErrorKind::InvalidDirectiveValue(_)));
        assert!(matches!(
            parse_line(".org 0", 1).unwrap_err().kind,
            ParseErrorKind::InvalidDirective(_)
        ));
    }

    #[rstest]
    #[case("10", 10)]
    #[case("-128", -128)]
    #[case("0xFF", 255)]
    #[case("0b11", 3)]
    fn numbers(#[case] text: &str, #[case] expected: i64) {
        assert_eq!(parse_number(text).unwrap(), expected);
    }
}
