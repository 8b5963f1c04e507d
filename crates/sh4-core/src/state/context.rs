//! SH4 register context.
//!
//! Floating-point banks are stored with architectural register pairs
//! swapped: architectural `FRi` lives at physical index `i ^ 1`. With that
//! layout the 64-bit view of a physical pair on a little-endian host is
//! exactly `DRk`, whose high word is `FR2k`. Every accessor here applies the
//! permutation; nothing outside this module indexes the banks directly.

use crate::fault::EmulatorError;
use crate::trap::CapturedState;

/// `SR.T`: condition bit.
pub const SR_T: u32 = 1 << 0;
/// `SR.S`: MAC saturation.
pub const SR_S: u32 = 1 << 1;
/// `SR.IMASK` shift.
pub const SR_IMASK_SHIFT: u32 = 4;
/// `SR.IMASK`: interrupt mask level.
pub const SR_IMASK: u32 = 0xF << SR_IMASK_SHIFT;
/// `SR.Q`: divide step state.
pub const SR_Q: u32 = 1 << 8;
/// `SR.M`: divide step state.
pub const SR_M: u32 = 1 << 9;
/// `SR.FD`: FPU disable.
pub const SR_FD: u32 = 1 << 15;
/// `SR.BL`: exception/interrupt block.
pub const SR_BL: u32 = 1 << 28;
/// `SR.RB`: general register bank select.
pub const SR_RB: u32 = 1 << 29;
/// `SR.MD`: privileged mode.
pub const SR_MD: u32 = 1 << 30;
/// Writable `SR` bits.
pub const SR_MASK: u32 = SR_MD | SR_RB | SR_BL | SR_FD | SR_M | SR_Q | SR_IMASK | SR_S | SR_T;

/// `FPSCR.RM`: rounding mode.
pub const FPSCR_RM: u32 = 0b11;
/// `FPSCR.DN`: denormals flush to zero.
pub const FPSCR_DN: u32 = 1 << 18;
/// `FPSCR.PR`: double precision.
pub const FPSCR_PR: u32 = 1 << 19;
/// `FPSCR.SZ`: 64-bit `FMOV` transfers.
pub const FPSCR_SZ: u32 = 1 << 20;
/// `FPSCR.FR`: floating register bank select.
pub const FPSCR_FR: u32 = 1 << 21;
/// Writable `FPSCR` bits.
pub const FPSCR_MASK: u32 = 0x003F_FFFF;

/// Power-on `SR`.
pub const SR_RESET: u32 = SR_MD | SR_RB | SR_BL | SR_IMASK;
/// Power-on `FPSCR`.
pub const FPSCR_RESET: u32 = 0x0004_0001;
/// Power-on `PC`.
pub const PC_RESET: u32 = 0xA000_0000;

/// Number of status/control words at the front of the serialized layout.
pub const CONTROL_WORD_COUNT: usize = 13;
/// Size in bytes of [`Sh4Context::to_bytes`].
pub const CONTEXT_LAYOUT_BYTES: usize = (CONTROL_WORD_COUNT + 16 + 16 + 16 + 8) * 4;

/// One of the two floating-point register files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpBank {
    /// `FR0`–`FR15` at `FPSCR.FR = 0`.
    Primary,
    /// `XF0`–`XF15`; addressed by opcodes at `FPSCR.FR = 1`.
    Extended,
}

impl FpBank {
    /// The other bank.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Primary => Self::Extended,
            Self::Extended => Self::Primary,
        }
    }
}

const fn phys(index: usize) -> usize {
    index ^ 1
}

/// Architectural register context of one SH4 core.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Sh4Context {
    r: [u32; 16],
    ralt: [u32; 8],
    fr: [u32; 16],
    xf: [u32; 16],
    sr: u32,
    fpscr: u32,
    /// Global base register.
    pub gbr: u32,
    /// Vector base register.
    pub vbr: u32,
    /// Saved status register.
    pub ssr: u32,
    /// Saved program counter.
    pub spc: u32,
    /// Saved general register 15.
    pub sgr: u32,
    /// Debug base register.
    pub dbr: u32,
    /// Program counter.
    pub pc: u32,
    /// Procedure register.
    pub pr: u32,
    /// Multiply-accumulate high.
    pub mach: u32,
    /// Multiply-accumulate low.
    pub macl: u32,
    /// FPU communication register.
    pub fpul: u32,
}

impl Default for Sh4Context {
    fn default() -> Self {
        Self {
            r: [0; 16],
            ralt: [0; 8],
            fr: [0; 16],
            xf: [0; 16],
            sr: SR_RESET,
            fpscr: FPSCR_RESET,
            gbr: 0,
            vbr: 0,
            ssr: 0,
            spc: 0,
            sgr: 0,
            dbr: 0,
            pc: PC_RESET,
            pr: 0,
            mach: 0,
            macl: 0,
            fpul: 0,
        }
    }
}

impl Sh4Context {
    /// Reads general register `n` of the active bank.
    #[must_use]
    pub const fn r(&self, n: usize) -> u32 {
        self.r[n & 15]
    }

    /// Writes general register `n` of the active bank.
    pub fn set_r(&mut self, n: usize, value: u32) {
        self.r[n & 15] = value;
    }

    /// Reads `Rn_BANK`, the inactive copy of `R0`–`R7`.
    #[must_use]
    pub const fn r_bank(&self, n: usize) -> u32 {
        self.ralt[n & 7]
    }

    /// Writes `Rn_BANK`.
    pub fn set_r_bank(&mut self, n: usize, value: u32) {
        self.ralt[n & 7] = value;
    }

    /// Status register.
    #[must_use]
    pub const fn sr(&self) -> u32 {
        self.sr
    }

    const fn register_bank(sr: u32) -> bool {
        sr & SR_MD != 0 && sr & SR_RB != 0
    }

    /// Writes `SR`, swapping `R0`–`R7` with the shadow bank when the
    /// effective bank changes.
    pub fn set_sr(&mut self, value: u32) {
        let value = value & SR_MASK;
        if Self::register_bank(self.sr) != Self::register_bank(value) {
            for n in 0..8 {
                std::mem::swap(&mut self.r[n], &mut self.ralt[n]);
            }
        }
        self.sr = value;
    }

    /// Writes `SR` without bank switching, for state import.
    pub fn set_sr_raw(&mut self, value: u32) {
        self.sr = value;
    }

    /// `SR.T`.
    #[must_use]
    pub const fn t(&self) -> bool {
        self.sr & SR_T != 0
    }

    /// Sets `SR.T`.
    pub fn set_t(&mut self, t: bool) {
        self.set_sr_bit(SR_T, t);
    }

    /// `SR.S`.
    #[must_use]
    pub const fn s(&self) -> bool {
        self.sr & SR_S != 0
    }

    /// `SR.Q`.
    #[must_use]
    pub const fn q(&self) -> bool {
        self.sr & SR_Q != 0
    }

    /// `SR.M`.
    #[must_use]
    pub const fn m(&self) -> bool {
        self.sr & SR_M != 0
    }

    /// Sets or clears a non-bank `SR` bit.
    pub fn set_sr_bit(&mut self, bit: u32, on: bool) {
        debug_assert!(bit & (SR_MD | SR_RB) == 0, "bank bits go through set_sr");
        if on {
            self.sr |= bit;
        } else {
            self.sr &= !bit;
        }
    }

    /// True in privileged mode.
    #[must_use]
    pub const fn privileged(&self) -> bool {
        self.sr & SR_MD != 0
    }

    /// Current interrupt mask level.
    #[must_use]
    pub const fn imask(&self) -> u32 {
        (self.sr & SR_IMASK) >> SR_IMASK_SHIFT
    }

    /// Floating-point status/control register.
    #[must_use]
    pub const fn fpscr(&self) -> u32 {
        self.fpscr
    }

    /// Writes `FPSCR`. Bank routing follows `FR` immediately.
    pub fn set_fpscr(&mut self, value: u32) {
        self.fpscr = value & FPSCR_MASK;
    }

    /// `FPSCR.PR`.
    #[must_use]
    pub const fn double_precision(&self) -> bool {
        self.fpscr & FPSCR_PR != 0
    }

    /// `FPSCR.SZ`.
    #[must_use]
    pub const fn pair_transfer(&self) -> bool {
        self.fpscr & FPSCR_SZ != 0
    }

    /// Bank addressed by opcode register indices.
    #[must_use]
    pub const fn active_fp_bank(&self) -> FpBank {
        if self.fpscr & FPSCR_FR != 0 {
            FpBank::Extended
        } else {
            FpBank::Primary
        }
    }

    const fn bank(&self, bank: FpBank) -> &[u32; 16] {
        match bank {
            FpBank::Primary => &self.fr,
            FpBank::Extended => &self.xf,
        }
    }

    fn bank_mut(&mut self, bank: FpBank) -> &mut [u32; 16] {
        match bank {
            FpBank::Primary => &mut self.fr,
            FpBank::Extended => &mut self.xf,
        }
    }

    /// Reads architectural register `index` of `bank`.
    #[must_use]
    pub const fn fp_reg(&self, bank: FpBank, index: usize) -> u32 {
        self.bank(bank)[phys(index & 15)]
    }

    /// Writes architectural register `index` of `bank`.
    pub fn set_fp_reg(&mut self, bank: FpBank, index: usize, value: u32) {
        self.bank_mut(bank)[phys(index & 15)] = value;
    }

    /// Reads the physical slot `slot` of `bank`, with no permutation.
    #[must_use]
    pub const fn fp_slot(&self, bank: FpBank, slot: usize) -> u32 {
        self.bank(bank)[slot & 15]
    }

    /// `FRn` as addressed by an opcode.
    #[must_use]
    pub const fn fr(&self, n: usize) -> u32 {
        self.fp_reg(self.active_fp_bank(), n)
    }

    /// Writes `FRn` as addressed by an opcode.
    pub fn set_fr(&mut self, n: usize, value: u32) {
        self.set_fp_reg(self.active_fp_bank(), n, value);
    }

    /// `FRn` as `f32`.
    #[must_use]
    pub fn fr_f32(&self, n: usize) -> f32 {
        f32::from_bits(self.fr(n))
    }

    /// Writes `FRn` from an `f32`.
    pub fn set_fr_f32(&mut self, n: usize, value: f32) {
        self.set_fr(n, value.to_bits());
    }

    /// `XFn`: register `n` of the bank not addressed by opcodes.
    #[must_use]
    pub const fn xf(&self, n: usize) -> u32 {
        self.fp_reg(self.active_fp_bank().opposite(), n)
    }

    /// Writes `XFn`.
    pub fn set_xf(&mut self, n: usize, value: u32) {
        self.set_fp_reg(self.active_fp_bank().opposite(), n, value);
    }

    const fn pair(&self, bank: FpBank, n: usize) -> u64 {
        let base = n & 14;
        let regs = self.bank(bank);
        ((regs[base + 1] as u64) << 32) | regs[base] as u64
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set_pair(&mut self, bank: FpBank, n: usize, value: u64) {
        let base = n & 14;
        let regs = self.bank_mut(bank);
        regs[base + 1] = (value >> 32) as u32;
        regs[base] = value as u32;
    }

    /// `DRn` (n even) as raw bits; the high word is `FRn`.
    #[must_use]
    pub const fn dr(&self, n: usize) -> u64 {
        self.pair(self.active_fp_bank(), n)
    }

    /// Writes `DRn` (n even).
    pub fn set_dr(&mut self, n: usize, value: u64) {
        self.set_pair(self.active_fp_bank(), n, value);
    }

    /// `DRn` as `f64`.
    #[must_use]
    pub fn dr_f64(&self, n: usize) -> f64 {
        f64::from_bits(self.dr(n))
    }

    /// Writes `DRn` from an `f64`.
    pub fn set_dr_f64(&mut self, n: usize, value: f64) {
        self.set_dr(n, value.to_bits());
    }

    /// `XDn` (n even): the pair in the opposite bank.
    #[must_use]
    pub const fn xd(&self, n: usize) -> u64 {
        self.pair(self.active_fp_bank().opposite(), n)
    }

    /// Writes `XDn`.
    pub fn set_xd(&mut self, n: usize, value: u64) {
        self.set_pair(self.active_fp_bank().opposite(), n, value);
    }

    /// Machine state recorded with a trap.
    #[must_use]
    pub const fn captured(&self) -> CapturedState {
        CapturedState {
            pc: self.pc,
            sr: self.sr,
            r: self.r,
        }
    }

    const fn control_words(&self) -> [u32; CONTROL_WORD_COUNT] {
        [
            self.sr, self.fpscr, self.gbr, self.vbr, self.ssr, self.spc, self.sgr, self.dbr,
            self.pc, self.pr, self.mach, self.macl, self.fpul,
        ]
    }

    /// Serializes the context in its fixed external layout.
    ///
    /// Little-endian words: control words (`SR`, `FPSCR`, `GBR`, `VBR`,
    /// `SSR`, `SPC`, `SGR`, `DBR`, `PC`, `PR`, `MACH`, `MACL`, `FPUL`),
    /// `R0`–`R15`, the primary then extended floating bank in physical
    /// (pair-swapped) order, then `R0_BANK`–`R7_BANK`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.control_words()
            .iter()
            .chain(&self.r)
            .chain(&self.fr)
            .chain(&self.xf)
            .chain(&self.ralt)
            .flat_map(|word| word.to_le_bytes())
            .collect()
    }

    /// Restores a context serialized by [`Self::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::ContextLayout`] if `bytes` has the wrong length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EmulatorError> {
        if bytes.len() != CONTEXT_LAYOUT_BYTES {
            return Err(EmulatorError::ContextLayout {
                expected: CONTEXT_LAYOUT_BYTES,
                actual: bytes.len(),
            });
        }
        let mut words = bytes
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]));
        let mut next = || words.next().unwrap_or_default();

        let mut ctx = Self {
            sr: next(),
            fpscr: next(),
            gbr: next(),
            vbr: next(),
            ssr: next(),
            spc: next(),
            sgr: next(),
            dbr: next(),
            pc: next(),
            pr: next(),
            mach: next(),
            macl: next(),
            fpul: next(),
            ..Self::default()
        };
        ctx.r = std::array::from_fn(|_| next());
        ctx.fr = std::array::from_fn(|_| next());
        ctx.xf = std::array::from_fn(|_| next());
        ctx.ralt = std::array::from_fn(|_| next());
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reset_state_matches_hardware() {
        let ctx = Sh4Context::default();
        assert_eq!(ctx.sr(), 0x7000_00F0);
        assert_eq!(ctx.fpscr(), 0x0004_0001);
        assert_eq!(ctx.pc, 0xA000_0000);
        assert!(ctx.privileged());
        assert_eq!(ctx.imask(), 15);
    }

    #[test]
    fn sr_bank_switch_swaps_low_registers() {
        let mut ctx = Sh4Context::default();
        ctx.set_r(0, 0x1111);
        ctx.set_r(8, 0x8888);
        ctx.set_r_bank(0, 0x2222);

        ctx.set_sr(SR_MD);
        assert_eq!(ctx.r(0), 0x2222);
        assert_eq!(ctx.r_bank(0), 0x1111);
        assert_eq!(ctx.r(8), 0x8888);

        ctx.set_sr(SR_MD | SR_BL);
        assert_eq!(ctx.r(0), 0x2222, "no swap while bank is unchanged");

        ctx.set_sr(SR_MD | SR_RB);
        assert_eq!(ctx.r(0), 0x1111);
    }

    #[test]
    fn storage_is_pair_swapped() {
        let mut ctx = Sh4Context::default();
        ctx.set_fp_reg(FpBank::Primary, 0, 0xAAAA_AAAA);
        ctx.set_fp_reg(FpBank::Primary, 1, 0xBBBB_BBBB);
        assert_eq!(ctx.fp_slot(FpBank::Primary, 1), 0xAAAA_AAAA);
        assert_eq!(ctx.fp_slot(FpBank::Primary, 0), 0xBBBB_BBBB);
        assert_eq!(ctx.dr(0), 0xAAAA_AAAA_BBBB_BBBB);
    }

    #[test]
    fn fr_bit_routes_opcode_indices_to_extended_bank() {
        let mut ctx = Sh4Context::default();
        ctx.set_fpscr(ctx.fpscr() | FPSCR_FR);
        ctx.set_fr(3, 0x3f80_0000);
        assert_eq!(ctx.fp_reg(FpBank::Extended, 3), 0x3f80_0000);
        assert_eq!(ctx.fp_reg(FpBank::Primary, 3), 0);
        assert_eq!(ctx.xf(3), 0);

        ctx.set_fpscr(ctx.fpscr() & !FPSCR_FR);
        assert_eq!(ctx.xf(3), 0x3f80_0000);
        assert_eq!(ctx.fr(3), 0);
    }

    #[test]
    fn doubles_round_trip_through_pairs() {
        let mut ctx = Sh4Context::default();
        ctx.set_dr_f64(4, -2.5);
        assert_eq!(ctx.dr_f64(4), -2.5);
        assert_eq!(ctx.fr(4), (-2.5f64).to_bits().checked_shr(32).unwrap() as u32);
        ctx.set_xd(4, 7);
        assert_eq!(ctx.xd(4), 7);
        assert_eq!(ctx.dr_f64(4), -2.5);
    }

    #[test]
    fn layout_order_is_fixed() {
        let mut ctx = Sh4Context::default();
        ctx.set_sr_raw(0x11);
        ctx.set_fpscr(0x22);
        ctx.set_r(0, 0x33);
        ctx.set_fp_reg(FpBank::Primary, 0, 0x44);
        ctx.set_fp_reg(FpBank::Extended, 1, 0x55);
        ctx.set_r_bank(7, 0x66);
        let bytes = ctx.to_bytes();
        assert_eq!(bytes.len(), CONTEXT_LAYOUT_BYTES);

        let word = |index: usize| {
            u32::from_le_bytes(bytes[index * 4..index * 4 + 4].try_into().unwrap())
        };
        assert_eq!(word(0), 0x11);
        assert_eq!(word(1), 0x22);
        assert_eq!(word(CONTROL_WORD_COUNT), 0x33);
        assert_eq!(word(CONTROL_WORD_COUNT + 16 + 1), 0x44, "fr0 at physical slot 1");
        assert_eq!(word(CONTROL_WORD_COUNT + 32), 0x55, "xf1 at physical slot 0");
        assert_eq!(word(CONTROL_WORD_COUNT + 48 + 7), 0x66);
    }

    #[test]
    fn from_bytes_rejects_bad_length() {
        assert_eq!(
            Sh4Context::from_bytes(&[0; 12]),
            Err(EmulatorError::ContextLayout {
                expected: CONTEXT_LAYOUT_BYTES,
                actual: 12
            })
        );
    }

    proptest! {
        #[test]
        fn serialization_round_trips(words in proptest::collection::vec(any::<u32>(), CONTEXT_LAYOUT_BYTES / 4)) {
            let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
            let ctx = Sh4Context::from_bytes(&bytes).unwrap();
            prop_assert_eq!(ctx.to_bytes(), bytes);
        }

        #[test]
        fn fp_registers_read_back_in_both_banks(index in 0usize..16, value in any::<u32>(), extended in any::<bool>()) {
            let mut ctx = Sh4Context::default();
            if extended {
                ctx.set_fpscr(ctx.fpscr() | FPSCR_FR);
            }
            ctx.set_fr(index, value);
            prop_assert_eq!(ctx.fr(index), value);
            let bank = if extended { FpBank::Extended } else { FpBank::Primary };
            prop_assert_eq!(ctx.fp_slot(bank, index ^ 1), value);
            prop_assert_eq!(ctx.fp_reg(bank.opposite(), index), 0);
        }
    }
}
