//! Named register enumeration and harness fixtures.
//!
//! Register iteration goes through [`RegisterId`] and its typed accessors
//! rather than byte offsets into the context, so fixtures never depend on
//! how [`Sh4Context`] is laid out in memory.

use std::fmt;

use super::context::{FpBank, Sh4Context};

/// Sentinel marking a fixture field as "don't care".
pub const UNINITIALIZED_REG: u32 = 0xbaad_f00d;

/// Number of entries in [`RegisterId::ALL`].
pub const REGISTER_COUNT: usize = 13 + 16 + 8 + 16 + 16;

/// Architecturally named register.
///
/// `Fr(i)` is architectural `FRi` of the primary bank and `Xf(i)` of the
/// extended bank, regardless of `FPSCR.FR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterId {
    /// Status register.
    Sr,
    /// Floating-point status/control.
    Fpscr,
    /// Global base.
    Gbr,
    /// Vector base.
    Vbr,
    /// Saved status.
    Ssr,
    /// Saved program counter.
    Spc,
    /// Saved R15.
    Sgr,
    /// Debug base.
    Dbr,
    /// Program counter.
    Pc,
    /// Procedure register.
    Pr,
    /// MAC high.
    Mach,
    /// MAC low.
    Macl,
    /// FPU communication register.
    Fpul,
    /// General register of the active bank.
    R(u8),
    /// Inactive copy of R0–R7.
    RBank(u8),
    /// Primary floating bank, architectural index.
    Fr(u8),
    /// Extended floating bank, architectural index.
    Xf(u8),
}

const CONTROL: [RegisterId; 13] = [
    RegisterId::Sr,
    RegisterId::Fpscr,
    RegisterId::Gbr,
    RegisterId::Vbr,
    RegisterId::Ssr,
    RegisterId::Spc,
    RegisterId::Sgr,
    RegisterId::Dbr,
    RegisterId::Pc,
    RegisterId::Pr,
    RegisterId::Mach,
    RegisterId::Macl,
    RegisterId::Fpul,
];

const fn build_all() -> [RegisterId; REGISTER_COUNT] {
    let mut all = [RegisterId::Sr; REGISTER_COUNT];
    let mut index = 0;
    while index < CONTROL.len() {
        all[index] = CONTROL[index];
        index += 1;
    }
    let mut n = 0;
    while n < 16 {
        all[13 + n as usize] = RegisterId::R(n);
        all[13 + 16 + 8 + n as usize] = RegisterId::Fr(n);
        all[13 + 16 + 8 + 16 + n as usize] = RegisterId::Xf(n);
        if n < 8 {
            all[13 + 16 + n as usize] = RegisterId::RBank(n);
        }
        n += 1;
    }
    all
}

const fn build_test_order() -> [RegisterId; 49] {
    let mut order = [RegisterId::Fpscr; 49];
    let mut n = 0;
    while n < 16 {
        order[1 + n as usize] = RegisterId::R(n);
        order[17 + n as usize] = RegisterId::Fr(n);
        order[33 + n as usize] = RegisterId::Xf(n);
        n += 1;
    }
    order
}

impl RegisterId {
    /// Every register, in [`RegisterId::index`] order.
    pub const ALL: [Self; REGISTER_COUNT] = build_all();

    /// Fixture comparison order: `fpscr`, `r0`–`r15`, `fr0`–`fr15`,
    /// `xf0`–`xf15`.
    pub const TEST_ORDER: [Self; 49] = build_test_order();

    /// Position in [`RegisterId::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Sr => 0,
            Self::Fpscr => 1,
            Self::Gbr => 2,
            Self::Vbr => 3,
            Self::Ssr => 4,
            Self::Spc => 5,
            Self::Sgr => 6,
            Self::Dbr => 7,
            Self::Pc => 8,
            Self::Pr => 9,
            Self::Mach => 10,
            Self::Macl => 11,
            Self::Fpul => 12,
            Self::R(n) => 13 + (n as usize & 15),
            Self::RBank(n) => 29 + (n as usize & 7),
            Self::Fr(n) => 37 + (n as usize & 15),
            Self::Xf(n) => 53 + (n as usize & 15),
        }
    }

    /// Reads the register from `ctx`.
    #[must_use]
    pub const fn get(self, ctx: &Sh4Context) -> u32 {
        match self {
            Self::Sr => ctx.sr(),
            Self::Fpscr => ctx.fpscr(),
            Self::Gbr => ctx.gbr,
            Self::Vbr => ctx.vbr,
            Self::Ssr => ctx.ssr,
            Self::Spc => ctx.spc,
            Self::Sgr => ctx.sgr,
            Self::Dbr => ctx.dbr,
            Self::Pc => ctx.pc,
            Self::Pr => ctx.pr,
            Self::Mach => ctx.mach,
            Self::Macl => ctx.macl,
            Self::Fpul => ctx.fpul,
            Self::R(n) => ctx.r(n as usize),
            Self::RBank(n) => ctx.r_bank(n as usize),
            Self::Fr(n) => ctx.fp_reg(FpBank::Primary, n as usize),
            Self::Xf(n) => ctx.fp_reg(FpBank::Extended, n as usize),
        }
    }

    /// Writes the register into `ctx` as state import: `SR` is stored
    /// without bank switching.
    pub fn set(self, ctx: &mut Sh4Context, value: u32) {
        match self {
            Self::Sr => ctx.set_sr_raw(value),
            Self::Fpscr => ctx.set_fpscr(value),
            Self::Gbr => ctx.gbr = value,
            Self::Vbr => ctx.vbr = value,
            Self::Ssr => ctx.ssr = value,
            Self::Spc => ctx.spc = value,
            Self::Sgr => ctx.sgr = value,
            Self::Dbr => ctx.dbr = value,
            Self::Pc => ctx.pc = value,
            Self::Pr => ctx.pr = value,
            Self::Mach => ctx.mach = value,
            Self::Macl => ctx.macl = value,
            Self::Fpul => ctx.fpul = value,
            Self::R(n) => ctx.set_r(n as usize, value),
            Self::RBank(n) => ctx.set_r_bank(n as usize, value),
            Self::Fr(n) => ctx.set_fp_reg(FpBank::Primary, n as usize, value),
            Self::Xf(n) => ctx.set_fp_reg(FpBank::Extended, n as usize, value),
        }
    }

    /// Parses a lowercase or uppercase register name (`r3`, `fr10`,
    /// `xf0`, `r2_bank`, `fpscr`, ...).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let indexed = |prefix: &str, limit: u8| -> Option<u8> {
            lower
                .strip_prefix(prefix)?
                .parse::<u8>()
                .ok()
                .filter(|&n| n < limit)
        };
        let named = match lower.as_str() {
            "sr" => Some(Self::Sr),
            "fpscr" => Some(Self::Fpscr),
            "gbr" => Some(Self::Gbr),
            "vbr" => Some(Self::Vbr),
            "ssr" => Some(Self::Ssr),
            "spc" => Some(Self::Spc),
            "sgr" => Some(Self::Sgr),
            "dbr" => Some(Self::Dbr),
            "pc" => Some(Self::Pc),
            "pr" => Some(Self::Pr),
            "mach" => Some(Self::Mach),
            "macl" => Some(Self::Macl),
            "fpul" => Some(Self::Fpul),
            _ => None,
        };
        if named.is_some() {
            return named;
        }
        if let Some(bank) = lower.strip_suffix("_bank") {
            return bank
                .strip_prefix('r')?
                .parse::<u8>()
                .ok()
                .filter(|&n| n < 8)
                .map(Self::RBank);
        }
        indexed("fr", 16)
            .map(Self::Fr)
            .or_else(|| indexed("xf", 16).map(Self::Xf))
            .or_else(|| indexed("r", 16).map(Self::R))
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sr => f.write_str("sr"),
            Self::Fpscr => f.write_str("fpscr"),
            Self::Gbr => f.write_str("gbr"),
            Self::Vbr => f.write_str("vbr"),
            Self::Ssr => f.write_str("ssr"),
            Self::Spc => f.write_str("spc"),
            Self::Sgr => f.write_str("sgr"),
            Self::Dbr => f.write_str("dbr"),
            Self::Pc => f.write_str("pc"),
            Self::Pr => f.write_str("pr"),
            Self::Mach => f.write_str("mach"),
            Self::Macl => f.write_str("macl"),
            Self::Fpul => f.write_str("fpul"),
            Self::R(n) => write!(f, "r{n}"),
            Self::RBank(n) => write!(f, "r{n}_bank"),
            Self::Fr(n) => write!(f, "fr{n}"),
            Self::Xf(n) => write!(f, "xf{n}"),
        }
    }
}

/// One fixture field that did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMismatch {
    /// Register compared.
    pub register: RegisterId,
    /// Fixture value.
    pub expected: u32,
    /// Context value.
    pub actual: u32,
}

impl fmt::Display for RegisterMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} expected: {:#x}, actual {:#x}",
            self.register, self.expected, self.actual
        )
    }
}

/// Partial register context for test harnesses.
///
/// Every field starts at [`UNINITIALIZED_REG`]; such fields are neither
/// applied nor compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFixture {
    values: [u32; REGISTER_COUNT],
}

impl Default for ContextFixture {
    fn default() -> Self {
        Self {
            values: [UNINITIALIZED_REG; REGISTER_COUNT],
        }
    }
}

impl ContextFixture {
    /// Sets one field.
    #[must_use]
    pub const fn with(mut self, register: RegisterId, value: u32) -> Self {
        self.values[register.index()] = value;
        self
    }

    /// Sets one field in place.
    pub fn set(&mut self, register: RegisterId, value: u32) {
        self.values[register.index()] = value;
    }

    /// Field value, or `None` when it is "don't care".
    #[must_use]
    pub const fn get(&self, register: RegisterId) -> Option<u32> {
        match self.values[register.index()] {
            UNINITIALIZED_REG => None,
            value => Some(value),
        }
    }

    /// Writes every cared-for field into `ctx`.
    pub fn apply(&self, ctx: &mut Sh4Context) {
        for register in RegisterId::ALL {
            if let Some(value) = self.get(register) {
                register.set(ctx, value);
            }
        }
    }

    /// Compares every cared-for field against `ctx`, in test order first and
    /// then the remaining registers.
    #[must_use]
    pub fn mismatches(&self, ctx: &Sh4Context) -> Vec<RegisterMismatch> {
        let rest = RegisterId::ALL
            .into_iter()
            .filter(|r| !RegisterId::TEST_ORDER.contains(r));
        RegisterId::TEST_ORDER
            .into_iter()
            .chain(rest)
            .filter_map(|register| {
                let expected = self.get(register)?;
                let actual = register.get(ctx);
                (expected != actual).then_some(RegisterMismatch {
                    register,
                    expected,
                    actual,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::context::FPSCR_FR;
    use rstest::rstest;

    #[test]
    fn indices_match_all_table() {
        for (position, register) in RegisterId::ALL.iter().enumerate() {
            assert_eq!(register.index(), position, "{register}");
        }
    }

    #[test]
    fn test_order_starts_with_fpscr_and_covers_both_banks() {
        assert_eq!(RegisterId::TEST_ORDER[0], RegisterId::Fpscr);
        assert_eq!(RegisterId::TEST_ORDER[1], RegisterId::R(0));
        assert_eq!(RegisterId::TEST_ORDER[17], RegisterId::Fr(0));
        assert_eq!(RegisterId::TEST_ORDER[48], RegisterId::Xf(15));
    }

    #[rstest]
    #[case("r0", Some(RegisterId::R(0)))]
    #[case("R15", Some(RegisterId::R(15)))]
    #[case("fr10", Some(RegisterId::Fr(10)))]
    #[case("xf3", Some(RegisterId::Xf(3)))]
    #[case("r7_bank", Some(RegisterId::RBank(7)))]
    #[case("r8_bank", None)]
    #[case("fpscr", Some(RegisterId::Fpscr))]
    #[case("r16", None)]
    #[case("dr0", None)]
    fn parse_names(#[case] text: &str, #[case] expected: Option<RegisterId>) {
        assert_eq!(RegisterId::parse(text), expected);
    }

    #[test]
    fn names_round_trip_through_parse() {
        for register in RegisterId::ALL {
            assert_eq!(RegisterId::parse(&register.to_string()), Some(register));
        }
    }

    #[test]
    fn architectural_accessors_apply_pair_permutation() {
        let mut ctx = Sh4Context::default();
        RegisterId::Fr(0).set(&mut ctx, 0x1234);
        assert_eq!(ctx.fp_slot(FpBank::Primary, 1), 0x1234);
        RegisterId::Xf(7).set(&mut ctx, 0x5678);
        assert_eq!(ctx.fp_slot(FpBank::Extended, 6), 0x5678);
    }

    #[test]
    fn every_fp_register_reads_back_through_its_name() {
        for fr_bit in [false, true] {
            let mut ctx = Sh4Context::default();
            if fr_bit {
                ctx.set_fpscr(ctx.fpscr() | FPSCR_FR);
            }
            for n in 0u8..16 {
                let primary = 0x1000 + u32::from(n);
                let extended = 0x2000 + u32::from(n);
                RegisterId::Fr(n).set(&mut ctx, primary);
                RegisterId::Xf(n).set(&mut ctx, extended);
                assert_eq!(RegisterId::Fr(n).get(&ctx), primary);
                assert_eq!(RegisterId::Xf(n).get(&ctx), extended);
            }
        }
    }

    #[test]
    fn fixture_skips_dont_care_fields() {
        let fixture = ContextFixture::default()
            .with(RegisterId::R(0), 6)
            .with(RegisterId::Fr(1), 0x3f80_0000);
        let mut ctx = Sh4Context::default();
        ctx.set_r(1, 0xdead);
        fixture.apply(&mut ctx);
        assert_eq!(ctx.r(0), 6);
        assert_eq!(ctx.r(1), 0xdead);
        assert!(fixture.mismatches(&ctx).is_empty());

        ctx.set_r(0, 7);
        let mismatches = fixture.mismatches(&ctx);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].register, RegisterId::R(0));
        assert_eq!(mismatches[0].to_string(), "r0 expected: 0x6, actual 0x7");
    }
}
