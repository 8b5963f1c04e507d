//! Integer arithmetic, multiply, logic and shift handlers.

use crate::decoder::DecodedInstruction;
use crate::memory::AccessWidth;
use crate::state::{SR_M, SR_Q};

use super::{Exec, ExecResult, Flow};

/// Applies `f(Rn, Rm)` to `Rn`.
fn binary(
    x: &mut Exec<'_>,
    i: &DecodedInstruction,
    f: impl FnOnce(u32, u32) -> u32,
) -> ExecResult {
    let value = f(x.rn(i), x.rm(i));
    x.set_rn(i, value);
    Ok(Flow::Next)
}

/// Applies `f(Rm)` to `Rn`.
fn unary(x: &mut Exec<'_>, i: &DecodedInstruction, f: impl FnOnce(u32) -> u32) -> ExecResult {
    let value = f(x.rm(i));
    x.set_rn(i, value);
    Ok(Flow::Next)
}

/// Sets `T` from `f(Rn, Rm)`.
fn compare(
    x: &mut Exec<'_>,
    i: &DecodedInstruction,
    f: impl FnOnce(u32, u32) -> bool,
) -> ExecResult {
    let t = f(x.rn(i), x.rm(i));
    x.ctx.set_t(t);
    Ok(Flow::Next)
}

/// Shifts `Rn` in place, with `T` receiving the bit shifted out when
/// `f` reports one.
fn shift(
    x: &mut Exec<'_>,
    i: &DecodedInstruction,
    f: impl FnOnce(u32, bool) -> (u32, Option<bool>),
) -> ExecResult {
    let (value, t) = f(x.rn(i), x.ctx.t());
    x.set_rn(i, value);
    if let Some(t) = t {
        x.ctx.set_t(t);
    }
    Ok(Flow::Next)
}

/// Read-modify-write of the byte at `GBR + R0`.
fn gbr_byte(x: &mut Exec<'_>, f: impl FnOnce(u8) -> u8) -> ExecResult {
    let addr = x.ctx.gbr.wrapping_add(x.ctx.r(0));
    let byte = x.load_byte(addr)?;
    x.store(addr, AccessWidth::Byte, u32::from(f(byte)))?;
    Ok(Flow::Next)
}

pub(super) fn add(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    binary(x, i, u32::wrapping_add)
}

pub(super) fn add_imm(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.rn(i).wrapping_add(i.imm_i32() as u32);
    x.set_rn(i, value);
    Ok(Flow::Next)
}

pub(super) fn addc(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let (partial, carry_a) = x.rn(i).overflowing_add(x.rm(i));
    let (sum, carry_b) = partial.overflowing_add(u32::from(x.ctx.t()));
    x.set_rn(i, sum);
    x.ctx.set_t(carry_a || carry_b);
    Ok(Flow::Next)
}

pub(super) fn addv(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let (sum, overflow) = (x.rn(i) as i32).overflowing_add(x.rm(i) as i32);
    x.set_rn(i, sum as u32);
    x.ctx.set_t(overflow);
    Ok(Flow::Next)
}

pub(super) fn sub(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    binary(x, i, u32::wrapping_sub)
}

pub(super) fn subc(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let (partial, borrow_a) = x.rn(i).overflowing_sub(x.rm(i));
    let (diff, borrow_b) = partial.overflowing_sub(u32::from(x.ctx.t()));
    x.set_rn(i, diff);
    x.ctx.set_t(borrow_a || borrow_b);
    Ok(Flow::Next)
}

pub(super) fn subv(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let (diff, overflow) = (x.rn(i) as i32).overflowing_sub(x.rm(i) as i32);
    x.set_rn(i, diff as u32);
    x.ctx.set_t(overflow);
    Ok(Flow::Next)
}

pub(super) fn neg(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    unary(x, i, u32::wrapping_neg)
}

pub(super) fn negc(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let (partial, borrow_a) = 0u32.overflowing_sub(x.rm(i));
    let (value, borrow_b) = partial.overflowing_sub(u32::from(x.ctx.t()));
    x.set_rn(i, value);
    x.ctx.set_t(borrow_a || borrow_b);
    Ok(Flow::Next)
}

pub(super) fn cmp_eq_imm(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let t = x.ctx.r(0) == i.imm_i32() as u32;
    x.ctx.set_t(t);
    Ok(Flow::Next)
}

pub(super) fn cmp_eq(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    compare(x, i, |n, m| n == m)
}

pub(super) fn cmp_hs(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    compare(x, i, |n, m| n >= m)
}

pub(super) fn cmp_ge(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    compare(x, i, |n, m| n as i32 >= m as i32)
}

pub(super) fn cmp_hi(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    compare(x, i, |n, m| n > m)
}

pub(super) fn cmp_gt(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    compare(x, i, |n, m| n as i32 > m as i32)
}

pub(super) fn cmp_pz(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    compare(x, i, |n, _| n as i32 >= 0)
}

pub(super) fn cmp_pl(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    compare(x, i, |n, _| n as i32 > 0)
}

/// `T` is set when any byte position holds equal bytes.
pub(super) fn cmp_str(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    compare(x, i, |n, m| (n ^ m).to_le_bytes().contains(&0))
}

pub(super) fn div0s(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let q = x.rn(i) & 0x8000_0000 != 0;
    let m = x.rm(i) & 0x8000_0000 != 0;
    x.ctx.set_sr_bit(SR_Q, q);
    x.ctx.set_sr_bit(SR_M, m);
    x.ctx.set_t(q != m);
    Ok(Flow::Next)
}

pub(super) fn div0u(x: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    x.ctx.set_sr_bit(SR_Q, false);
    x.ctx.set_sr_bit(SR_M, false);
    x.ctx.set_t(false);
    Ok(Flow::Next)
}

/// One non-restoring division step.
pub(super) fn div1(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let old_q = x.ctx.q();
    let m = x.ctx.m();
    let divisor = x.rm(i);
    let rn = x.rn(i);
    let shifted_out = rn & 0x8000_0000 != 0;
    let dividend = (rn << 1) | u32::from(x.ctx.t());

    let (result, carry) = if old_q == m {
        let result = dividend.wrapping_sub(divisor);
        (result, result > dividend)
    } else {
        let result = dividend.wrapping_add(divisor);
        (result, result < dividend)
    };
    let q = shifted_out ^ carry ^ m;

    x.set_rn(i, result);
    x.ctx.set_sr_bit(SR_Q, q);
    x.ctx.set_t(q == m);
    Ok(Flow::Next)
}

pub(super) fn dmuls(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let product = i64::from(x.rn(i) as i32) * i64::from(x.rm(i) as i32);
    set_mac(x, product as u64);
    Ok(Flow::Next)
}

pub(super) fn dmulu(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let product = u64::from(x.rn(i)) * u64::from(x.rm(i));
    set_mac(x, product);
    Ok(Flow::Next)
}

fn set_mac(x: &mut Exec<'_>, value: u64) {
    x.ctx.mach = (value >> 32) as u32;
    x.ctx.macl = value as u32;
}

fn mac(x: &Exec<'_>) -> i64 {
    ((u64::from(x.ctx.mach) << 32) | u64::from(x.ctx.macl)) as i64
}

pub(super) fn dt(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.rn(i).wrapping_sub(1);
    x.set_rn(i, value);
    x.ctx.set_t(value == 0);
    Ok(Flow::Next)
}

pub(super) fn exts_byte(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    unary(x, i, |m| m as u8 as i8 as i32 as u32)
}

pub(super) fn exts_word(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    unary(x, i, |m| m as u16 as i16 as i32 as u32)
}

pub(super) fn extu_byte(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    unary(x, i, |m| m & 0xff)
}

pub(super) fn extu_word(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    unary(x, i, |m| m & 0xffff)
}

const MAC_L_MAX: i64 = (1 << 47) - 1;
const MAC_L_MIN: i64 = -(1 << 47);

/// `MAC.L @Rm+,@Rn+`: with `S` set the accumulator saturates to 48 bits.
pub(super) fn mac_long(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let rn = x.rn(i);
    let lhs = x.load_long(rn)?;
    x.set_rn(i, rn.wrapping_add(4));
    let rm = x.rm(i);
    let rhs = match x.load_long(rm) {
        Ok(value) => value,
        Err(fault) => {
            x.set_rn(i, rn);
            return Err(fault);
        }
    };
    x.ctx.set_r(i.rm(), rm.wrapping_add(4));

    let product = i64::from(lhs as i32) * i64::from(rhs as i32);
    let sum = mac(x).wrapping_add(product);
    let sum = if x.ctx.s() {
        sum.clamp(MAC_L_MIN, MAC_L_MAX)
    } else {
        sum
    };
    set_mac(x, sum as u64);
    Ok(Flow::Next)
}

/// `MAC.W @Rm+,@Rn+`: with `S` set only `MACL` accumulates, saturating to
/// 32 bits and flagging overflow in `MACH` bit 0.
pub(super) fn mac_word(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let rn = x.rn(i);
    let lhs = x.load(rn, AccessWidth::Word)?;
    x.set_rn(i, rn.wrapping_add(2));
    let rm = x.rm(i);
    let rhs = match x.load(rm, AccessWidth::Word) {
        Ok(value) => value,
        Err(fault) => {
            x.set_rn(i, rn);
            return Err(fault);
        }
    };
    x.ctx.set_r(i.rm(), rm.wrapping_add(2));

    let product = i64::from(lhs as i32) * i64::from(rhs as i32);
    if x.ctx.s() {
        let sum = i64::from(x.ctx.macl as i32) + product;
        let clamped = sum.clamp(i64::from(i32::MIN), i64::from(i32::MAX));
        if clamped != sum {
            x.ctx.mach |= 1;
        }
        x.ctx.macl = clamped as u32;
    } else {
        let sum = mac(x).wrapping_add(product);
        set_mac(x, sum as u64);
    }
    Ok(Flow::Next)
}

pub(super) fn mul_long(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    x.ctx.macl = x.rn(i).wrapping_mul(x.rm(i));
    Ok(Flow::Next)
}

pub(super) fn muls_word(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let product = i32::from(x.rn(i) as i16) * i32::from(x.rm(i) as i16);
    x.ctx.macl = product as u32;
    Ok(Flow::Next)
}

pub(super) fn mulu_word(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    x.ctx.macl = (x.rn(i) & 0xffff) * (x.rm(i) & 0xffff);
    Ok(Flow::Next)
}

pub(super) fn and(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    binary(x, i, |n, m| n & m)
}

pub(super) fn and_imm(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.ctx.r(0) & i.imm_u32();
    x.ctx.set_r(0, value);
    Ok(Flow::Next)
}

pub(super) fn and_byte(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    gbr_byte(x, |byte| byte & i.imm)
}

pub(super) fn not(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    unary(x, i, |m| !m)
}

pub(super) fn or(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    binary(x, i, |n, m| n | m)
}

pub(super) fn or_imm(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.ctx.r(0) | i.imm_u32();
    x.ctx.set_r(0, value);
    Ok(Flow::Next)
}

pub(super) fn or_byte(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    gbr_byte(x, |byte| byte | i.imm)
}

pub(super) fn tas_byte(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rn(i);
    let byte = x.load_byte(addr)?;
    x.store(addr, AccessWidth::Byte, u32::from(byte | 0x80))?;
    x.ctx.set_t(byte == 0);
    Ok(Flow::Next)
}

pub(super) fn tst(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    compare(x, i, |n, m| n & m == 0)
}

pub(super) fn tst_imm(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let t = x.ctx.r(0) & i.imm_u32() == 0;
    x.ctx.set_t(t);
    Ok(Flow::Next)
}

pub(super) fn tst_byte(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.ctx.gbr.wrapping_add(x.ctx.r(0));
    let byte = x.load_byte(addr)?;
    x.ctx.set_t(byte & i.imm == 0);
    Ok(Flow::Next)
}

pub(super) fn xor(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    binary(x, i, |n, m| n ^ m)
}

pub(super) fn xor_imm(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.ctx.r(0) ^ i.imm_u32();
    x.ctx.set_r(0, value);
    Ok(Flow::Next)
}

pub(super) fn xor_byte(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    gbr_byte(x, |byte| byte ^ i.imm)
}

const MSB: u32 = 0x8000_0000;

pub(super) fn rotl(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, _| (n.rotate_left(1), Some(n & MSB != 0)))
}

pub(super) fn rotr(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, _| (n.rotate_right(1), Some(n & 1 != 0)))
}

pub(super) fn rotcl(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, t| ((n << 1) | u32::from(t), Some(n & MSB != 0)))
}

pub(super) fn rotcr(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, t| ((n >> 1) | (u32::from(t) << 31), Some(n & 1 != 0)))
}

/// Arithmetic shift by `Rm`: non-negative shifts left by `Rm & 31`,
/// negative shifts right by `32 - (Rm & 31)`.
pub(super) fn shad(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    binary(x, i, |n, m| {
        let amount = m & 0x1f;
        if m as i32 >= 0 {
            n << amount
        } else if amount == 0 {
            ((n as i32) >> 31) as u32
        } else {
            ((n as i32) >> (32 - amount)) as u32
        }
    })
}

/// Logical shift by `Rm`, same direction rules as `SHAD`.
pub(super) fn shld(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    binary(x, i, |n, m| {
        let amount = m & 0x1f;
        if m as i32 >= 0 {
            n << amount
        } else if amount == 0 {
            0
        } else {
            n >> (32 - amount)
        }
    })
}

pub(super) fn shll(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, _| (n << 1, Some(n & MSB != 0)))
}

pub(super) fn shar(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, _| (((n as i32) >> 1) as u32, Some(n & 1 != 0)))
}

pub(super) fn shlr(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, _| (n >> 1, Some(n & 1 != 0)))
}

pub(super) fn shll2(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, _| (n << 2, None))
}

pub(super) fn shlr2(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, _| (n >> 2, None))
}

pub(super) fn shll8(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, _| (n << 8, None))
}

pub(super) fn shlr8(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, _| (n >> 8, None))
}

pub(super) fn shll16(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, _| (n << 16, None))
}

pub(super) fn shlr16(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    shift(x, i, |n, _| (n >> 16, None))
}

#[cfg(test)]
mod tests {
    use crate::execute::test_support::{Bench, BASE};
    use crate::state::SR_S;
    use proptest::prelude::*;
    use rstest::rstest;

    fn run_rr(word: u16, rn: u32, rm: u32, t: bool) -> (u32, bool) {
        let mut bench = Bench::new();
        bench.ctx.set_r(1, rn);
        bench.ctx.set_r(2, rm);
        bench.ctx.set_t(t);
        bench.run(word).unwrap();
        (bench.ctx.r(1), bench.ctx.t())
    }

    // Encodings below use n = 1, m = 2.
    #[rstest]
    #[case::addc_carry(0x312e, 0xffff_ffff, 0, true, 0, true)]
    #[case::addc_plain(0x312e, 1, 2, true, 4, false)]
    #[case::addv_overflow(0x312f, 0x7fff_ffff, 1, false, 0x8000_0000, true)]
    #[case::subc_borrow(0x312a, 0, 0, true, 0xffff_ffff, true)]
    #[case::subv_overflow(0x312b, 0x8000_0000, 1, false, 0x7fff_ffff, true)]
    #[case::negc_zero(0x612a, 0, 0, false, 0, false)]
    #[case::negc_borrow(0x612a, 0, 1, false, 0xffff_ffff, true)]
    #[case::shad_left(0x412c, 1, 4, false, 16, false)]
    #[case::shad_right(0x412c, 0x8000_0000, 0xffff_fffc, false, 0xf800_0000, false)]
    #[case::shad_sign_fill(0x412c, 0x8000_0000, 0xffff_ffe0, false, 0xffff_ffff, false)]
    #[case::shld_right(0x412d, 0x8000_0000, 0xffff_fffc, false, 0x0800_0000, false)]
    #[case::shld_clear(0x412d, 0x8000_0000, 0xffff_ffe0, false, 0, false)]
    fn register_ops(
        #[case] word: u16,
        #[case] rn: u32,
        #[case] rm: u32,
        #[case] t: bool,
        #[case] expected: u32,
        #[case] expected_t: bool,
    ) {
        assert_eq!(run_rr(word, rn, rm, t), (expected, expected_t));
    }

    #[rstest]
    #[case::hs(0x3122, 5, 5, true)]
    #[case::hi(0x3126, 5, 5, false)]
    #[case::ge_signed(0x3123, 0, 0xffff_ffff, true)]
    #[case::hs_unsigned(0x3122, 0, 0xffff_ffff, false)]
    #[case::str_match(0x212c, 0x1200_0000, 0x12ff_ffff, true)]
    #[case::str_miss(0x212c, 0x0102_0304, 0x0203_0405, false)]
    fn comparisons(#[case] word: u16, #[case] rn: u32, #[case] rm: u32, #[case] t: bool) {
        assert_eq!(run_rr(word, rn, rm, false).1, t);
    }

    #[test]
    fn rotate_with_carry_threads_t() {
        // rotcl r1
        assert_eq!(run_rr(0x4124, 0x8000_0000, 0, true), (1, true));
        // rotcr r1
        assert_eq!(run_rr(0x4125, 1, 0, false), (0, true));
    }

    #[test]
    fn dt_sets_t_on_zero() {
        assert_eq!(run_rr(0x4110, 1, 0, false), (0, true));
        assert_eq!(run_rr(0x4110, 0, 0, true), (0xffff_ffff, false));
    }

    fn divide(dividend: u32, divisor: u32) -> u32 {
        let mut bench = Bench::new();
        bench.ctx.set_r(1, dividend);
        bench.ctx.set_r(2, divisor);
        bench.ctx.set_r(3, 0);
        // div0u
        bench.run(0x0019).unwrap();
        for _ in 0..32 {
            // rotcl r1 ; div1 r2,r3
            bench.run(0x4124).unwrap();
            bench.run(0x3324).unwrap();
        }
        // rotcl r1
        bench.run(0x4124).unwrap();
        bench.ctx.r(1)
    }

    proptest! {
        #[test]
        fn div1_sequence_divides_unsigned(dividend in any::<u32>(), divisor in 1u32..) {
            prop_assert_eq!(divide(dividend, divisor), dividend / divisor);
        }
    }

    #[test]
    fn multiplies_fill_mac() {
        let mut bench = Bench::new();
        bench.ctx.set_r(1, 0xffff_fffe);
        bench.ctx.set_r(2, 3);
        // dmuls.l r2,r1
        bench.run(0x312d).unwrap();
        assert_eq!((bench.ctx.mach, bench.ctx.macl), (0xffff_ffff, 0xffff_fffa));
        // dmulu.l r2,r1
        bench.run(0x3125).unwrap();
        assert_eq!((bench.ctx.mach, bench.ctx.macl), (2, 0xffff_fffa));
        // muls.w r2,r1
        bench.run(0x212f).unwrap();
        assert_eq!(bench.ctx.macl, 0xffff_fffa);
        // mulu.w r2,r1
        bench.run(0x212e).unwrap();
        assert_eq!(bench.ctx.macl, 0xfffe * 3);
    }

    #[test]
    fn mac_long_accumulates_and_saturates() {
        let mut bench = Bench::new();
        bench.space.write_u32(BASE + 0x100, 0x4000_0000).unwrap();
        bench.space.write_u32(BASE + 0x104, 0x4000_0000).unwrap();
        bench.space.write_u32(BASE + 0x200, 4).unwrap();
        bench.space.write_u32(BASE + 0x204, 4).unwrap();
        bench.ctx.set_r(1, BASE + 0x100);
        bench.ctx.set_r(2, BASE + 0x200);
        // mac.l @r2+,@r1+
        bench.run(0x012f).unwrap();
        assert_eq!((bench.ctx.mach, bench.ctx.macl), (1, 0));
        assert_eq!(bench.ctx.r(1), BASE + 0x104);
        assert_eq!(bench.ctx.r(2), BASE + 0x204);

        bench.ctx.set_sr(bench.ctx.sr() | SR_S);
        bench.ctx.mach = 0x7fff;
        bench.ctx.macl = 0xffff_ffff;
        bench.run(0x012f).unwrap();
        assert_eq!((bench.ctx.mach, bench.ctx.macl), (0x7fff, 0xffff_ffff));
    }

    #[test]
    fn mac_word_saturates_macl_only() {
        let mut bench = Bench::new();
        bench.space.write_u16(BASE + 0x100, 0x7fff).unwrap();
        bench.space.write_u16(BASE + 0x200, 0x7fff).unwrap();
        bench.ctx.set_r(1, BASE + 0x100);
        bench.ctx.set_r(2, BASE + 0x200);
        bench.ctx.set_sr(bench.ctx.sr() | SR_S);
        bench.ctx.mach = 0;
        bench.ctx.macl = 0x7fff_0000;
        // mac.w @r2+,@r1+
        bench.run(0x412f).unwrap();
        assert_eq!((bench.ctx.mach, bench.ctx.macl), (1, 0x7fff_ffff));
        assert_eq!(bench.ctx.r(1), BASE + 0x102);
    }

    #[test]
    fn gbr_byte_operations() {
        let mut bench = Bench::new();
        bench.ctx.gbr = BASE + 0x400;
        bench.ctx.set_r(0, 1);
        bench.space.write_u8(BASE + 0x401, 0xf0).unwrap();
        // or.b #0x0f,@(r0,gbr)
        bench.run(0xcf0f).unwrap();
        assert_eq!(bench.space.read_u8(BASE + 0x401).unwrap(), 0xff);
        // and.b #0x3c,@(r0,gbr)
        bench.run(0xcd3c).unwrap();
        assert_eq!(bench.space.read_u8(BASE + 0x401).unwrap(), 0x3c);
        // tst.b #0xc3,@(r0,gbr)
        bench.run(0xccc3).unwrap();
        assert!(bench.ctx.t());
        // xor.b #0xff,@(r0,gbr)
        bench.run(0xceff).unwrap();
        assert_eq!(bench.space.read_u8(BASE + 0x401).unwrap(), 0xc3);
    }

    #[test]
    fn tas_sets_high_bit_and_reports_zero() {
        let mut bench = Bench::new();
        bench.ctx.set_r(1, BASE + 0x500);
        // tas.b @r1
        bench.run(0x411b).unwrap();
        assert!(bench.ctx.t());
        assert_eq!(bench.space.read_u8(BASE + 0x500).unwrap(), 0x80);
        bench.run(0x411b).unwrap();
        assert!(!bench.ctx.t());
    }
}
