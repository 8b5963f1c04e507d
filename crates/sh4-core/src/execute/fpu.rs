//! Floating-point unit handlers.
//!
//! Arithmetic honours `FPSCR.PR` (pair operands use the even register of
//! the field) and moves honour `FPSCR.SZ`. Register indices always go
//! through the context's bank routing, so `FPSCR.FR` selects which bank an
//! opcode addresses.

use std::f64::consts::TAU;

use crate::decoder::DecodedInstruction;
use crate::memory::AccessWidth;
use crate::state::{FPSCR_FR, FPSCR_SZ};

use super::{Exec, ExecFault, ExecResult, Flow};

const SIGN: u32 = 0x8000_0000;

/// `FTRC` result for NaN and negative overflow.
const FTRC_INVALID: u32 = 0x8000_0000;

/// Width of an `FMOV` memory transfer.
fn transfer_width(x: &Exec<'_>) -> AccessWidth {
    if x.ctx.pair_transfer() {
        AccessWidth::Quad
    } else {
        AccessWidth::Long
    }
}

fn load_fp(x: &mut Exec<'_>, reg: usize, addr: u32) -> Result<(), ExecFault> {
    if x.ctx.pair_transfer() {
        let value = x.read(addr, AccessWidth::Quad)?;
        x.set_pair_bits(reg, value);
    } else {
        let value = x.load_long(addr)?;
        x.ctx.set_fr(reg, value);
    }
    Ok(())
}

fn store_fp(x: &mut Exec<'_>, reg: usize, addr: u32) -> Result<(), ExecFault> {
    if x.ctx.pair_transfer() {
        let value = x.pair_bits(reg);
        x.write(addr, AccessWidth::Quad, value)
    } else {
        let value = x.ctx.fr(reg);
        x.store(addr, AccessWidth::Long, value)
    }
}

/// Binary arithmetic on `FRn`/`FRm`, or `DRn`/`DRm` when `PR` is set.
fn arith(
    x: &mut Exec<'_>,
    i: &DecodedInstruction,
    single: impl FnOnce(f32, f32) -> f32,
    double: impl FnOnce(f64, f64) -> f64,
) -> ExecResult {
    if x.ctx.double_precision() {
        let (n, m) = (i.rn() & 14, i.rm() & 14);
        let value = double(x.ctx.dr_f64(n), x.ctx.dr_f64(m));
        x.ctx.set_dr_f64(n, value);
    } else {
        let value = single(x.ctx.fr_f32(i.rn()), x.ctx.fr_f32(i.rm()));
        x.ctx.set_fr_f32(i.rn(), value);
    }
    Ok(Flow::Next)
}

/// Sets `T` from a comparison of `FRn` with `FRm` (or the pairs).
fn fcompare(
    x: &mut Exec<'_>,
    i: &DecodedInstruction,
    single: impl FnOnce(f32, f32) -> bool,
    double: impl FnOnce(f64, f64) -> bool,
) -> ExecResult {
    let t = if x.ctx.double_precision() {
        double(x.ctx.dr_f64(i.rn() & 14), x.ctx.dr_f64(i.rm() & 14))
    } else {
        single(x.ctx.fr_f32(i.rn()), x.ctx.fr_f32(i.rm()))
    };
    x.ctx.set_t(t);
    Ok(Flow::Next)
}

/// Unary operation on `FRn` (or `DRn`).
fn funary(
    x: &mut Exec<'_>,
    i: &DecodedInstruction,
    single: impl FnOnce(f32) -> f32,
    double: impl FnOnce(f64) -> f64,
) -> ExecResult {
    if x.ctx.double_precision() {
        let n = i.rn() & 14;
        let value = double(x.ctx.dr_f64(n));
        x.ctx.set_dr_f64(n, value);
    } else {
        let value = single(x.ctx.fr_f32(i.rn()));
        x.ctx.set_fr_f32(i.rn(), value);
    }
    Ok(Flow::Next)
}

/// Sign-bit edit; in double mode the sign lives in the even register.
fn sign_op(x: &mut Exec<'_>, i: &DecodedInstruction, f: impl FnOnce(u32) -> u32) -> ExecResult {
    let n = if x.ctx.double_precision() {
        i.rn() & 14
    } else {
        i.rn()
    };
    let value = f(x.ctx.fr(n));
    x.ctx.set_fr(n, value);
    Ok(Flow::Next)
}

pub(super) fn fldi0(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    x.ctx.set_fr(i.rn(), 0);
    Ok(Flow::Next)
}

pub(super) fn fldi1(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    x.ctx.set_fr_f32(i.rn(), 1.0);
    Ok(Flow::Next)
}

/// `FMOV FRm,FRn`, or a 64-bit pair move when `SZ` is set.
pub(super) fn fmov(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    if x.ctx.pair_transfer() {
        let value = x.pair_bits(i.rm());
        x.set_pair_bits(i.rn(), value);
    } else {
        let value = x.ctx.fr(i.rm());
        x.ctx.set_fr(i.rn(), value);
    }
    Ok(Flow::Next)
}

pub(super) fn fmov_load(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rm(i);
    load_fp(x, i.rn(), addr)?;
    Ok(Flow::Next)
}

pub(super) fn fmov_load_indexed(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rm(i).wrapping_add(x.ctx.r(0));
    load_fp(x, i.rn(), addr)?;
    Ok(Flow::Next)
}

pub(super) fn fmov_load_inc(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rm(i);
    load_fp(x, i.rn(), addr)?;
    let step = transfer_width(x).bytes();
    x.ctx.set_r(i.rm(), addr.wrapping_add(step));
    Ok(Flow::Next)
}

pub(super) fn fmov_store(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rn(i);
    store_fp(x, i.rm(), addr)?;
    Ok(Flow::Next)
}

pub(super) fn fmov_store_indexed(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rn(i).wrapping_add(x.ctx.r(0));
    store_fp(x, i.rm(), addr)?;
    Ok(Flow::Next)
}

pub(super) fn fmov_store_dec(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let addr = x.rn(i).wrapping_sub(transfer_width(x).bytes());
    store_fp(x, i.rm(), addr)?;
    x.set_rn(i, addr);
    Ok(Flow::Next)
}

pub(super) fn flds(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    x.ctx.fpul = x.ctx.fr(i.rm());
    Ok(Flow::Next)
}

pub(super) fn fsts(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.ctx.fpul;
    x.ctx.set_fr(i.rn(), value);
    Ok(Flow::Next)
}

pub(super) fn fabs(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    sign_op(x, i, |bits| bits & !SIGN)
}

pub(super) fn fneg(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    sign_op(x, i, |bits| bits ^ SIGN)
}

pub(super) fn fadd(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    arith(x, i, |n, m| n + m, |n, m| n + m)
}

pub(super) fn fsub(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    arith(x, i, |n, m| n - m, |n, m| n - m)
}

pub(super) fn fmul(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    arith(x, i, |n, m| n * m, |n, m| n * m)
}

pub(super) fn fdiv(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    arith(x, i, |n, m| n / m, |n, m| n / m)
}

#[allow(clippy::float_cmp)]
pub(super) fn fcmp_eq(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    fcompare(x, i, |n, m| n == m, |n, m| n == m)
}

pub(super) fn fcmp_gt(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    fcompare(x, i, |n, m| n > m, |n, m| n > m)
}

pub(super) fn float(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.ctx.fpul as i32;
    if x.ctx.double_precision() {
        x.ctx.set_dr_f64(i.rn() & 14, f64::from(value));
    } else {
        x.ctx.set_fr_f32(i.rn(), value as f32);
    }
    Ok(Flow::Next)
}

/// Truncates toward zero, saturating; NaN converts to the negative limit.
fn truncate(value: f64) -> u32 {
    if value.is_nan() {
        FTRC_INVALID
    } else {
        value as i32 as u32
    }
}

pub(super) fn ftrc(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = if x.ctx.double_precision() {
        x.ctx.dr_f64(i.rm() & 14)
    } else {
        f64::from(x.ctx.fr_f32(i.rm()))
    };
    x.ctx.fpul = truncate(value);
    Ok(Flow::Next)
}

/// `FRn = FR0 * FRm + FRn`, single precision only.
pub(super) fn fmac(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.ctx.fr_f32(0) * x.ctx.fr_f32(i.rm()) + x.ctx.fr_f32(i.rn());
    x.ctx.set_fr_f32(i.rn(), value);
    Ok(Flow::Next)
}

pub(super) fn fsqrt(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    funary(x, i, f32::sqrt, f64::sqrt)
}

pub(super) fn fsrra(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.ctx.fr_f32(i.rn()).sqrt().recip();
    x.ctx.set_fr_f32(i.rn(), value);
    Ok(Flow::Next)
}

/// `FCNVDS DRm,FPUL`; the field is a pair number.
pub(super) fn fcnvds(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = x.ctx.dr_f64(i.rm() * 2) as f32;
    x.ctx.fpul = value.to_bits();
    Ok(Flow::Next)
}

/// `FCNVSD FPUL,DRn`; the field is a pair number.
pub(super) fn fcnvsd(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let value = f64::from(f32::from_bits(x.ctx.fpul));
    x.ctx.set_dr_f64(i.rn() * 2, value);
    Ok(Flow::Next)
}

/// Inner product of `FVm` and `FVn` into the last element of `FVn`.
pub(super) fn fipr(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let (n, m) = (i.rn() * 4, i.rm() * 4);
    let sum = (0..4)
        .map(|k| x.ctx.fr_f32(n + k) * x.ctx.fr_f32(m + k))
        .sum::<f32>();
    x.ctx.set_fr_f32(n + 3, sum);
    Ok(Flow::Next)
}

/// `FVn = XMTRX * FVn`, where `XMTRX` is the other bank in column-major
/// order.
pub(super) fn ftrv(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let n = i.rn() * 4;
    let vector: [f32; 4] = std::array::from_fn(|k| x.ctx.fr_f32(n + k));
    for row in 0..4 {
        let value = (0..4)
            .map(|col| f32::from_bits(x.ctx.xf(col * 4 + row)) * vector[col])
            .sum::<f32>();
        x.ctx.set_fr_f32(n + row, value);
    }
    Ok(Flow::Next)
}

/// Sine into `FRn`, cosine into `FRn+1` of `DRn`; `FPUL` low 16 bits are a
/// fraction of a full turn.
pub(super) fn fsca(x: &mut Exec<'_>, i: &DecodedInstruction) -> ExecResult {
    let n = i.rn() * 2;
    let angle = f64::from(x.ctx.fpul & 0xffff) * TAU / 65536.0;
    x.ctx.set_fr_f32(n, angle.sin() as f32);
    x.ctx.set_fr_f32(n + 1, angle.cos() as f32);
    Ok(Flow::Next)
}

pub(super) fn fschg(x: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    let fpscr = x.ctx.fpscr() ^ FPSCR_SZ;
    x.ctx.set_fpscr(fpscr);
    Ok(Flow::Next)
}

pub(super) fn frchg(x: &mut Exec<'_>, _: &DecodedInstruction) -> ExecResult {
    let fpscr = x.ctx.fpscr() ^ FPSCR_FR;
    x.ctx.set_fpscr(fpscr);
    Ok(Flow::Next)
}

#[cfg(test)]
mod tests {
    use super::{truncate, FTRC_INVALID};
    use crate::execute::test_support::{Bench, BASE};
    use crate::state::{FpBank, FPSCR_PR, FPSCR_SZ};
    use rstest::rstest;

    fn bench_with_fpscr(extra: u32) -> Bench {
        let mut bench = Bench::new();
        bench.ctx.set_fpscr((bench.ctx.fpscr() & !FPSCR_PR) | extra);
        bench
    }

    #[rstest]
    #[case(f64::NAN, FTRC_INVALID)]
    #[case(3.9, 3)]
    #[case(-3.9, (-3i32) as u32)]
    #[case(1e20, 0x7fff_ffff)]
    #[case(-1e20, 0x8000_0000)]
    fn ftrc_truncates_and_saturates(#[case] value: f64, #[case] expected: u32) {
        assert_eq!(truncate(value), expected);
    }

    #[test]
    fn single_precision_arithmetic() {
        let mut bench = bench_with_fpscr(0);
        bench.ctx.set_fr_f32(1, 1.5);
        bench.ctx.set_fr_f32(2, 2.0);
        // fadd fr1,fr2
        bench.run(0xf210).unwrap();
        assert_eq!(bench.ctx.fr_f32(2), 3.5);
        // fcmp/gt fr1,fr2
        bench.run(0xf215).unwrap();
        assert!(bench.ctx.t());
        // fmac fr0,fr1,fr2 with fr0 = 2
        bench.ctx.set_fr_f32(0, 2.0);
        bench.run(0xf21e).unwrap();
        assert_eq!(bench.ctx.fr_f32(2), 6.5);
        // fneg fr1 ; fabs fr1
        bench.run(0xf14d).unwrap();
        assert_eq!(bench.ctx.fr_f32(1), -1.5);
        bench.run(0xf15d).unwrap();
        assert_eq!(bench.ctx.fr_f32(1), 1.5);
    }

    #[test]
    fn double_precision_uses_pairs() {
        let mut bench = bench_with_fpscr(FPSCR_PR);
        bench.ctx.set_dr_f64(0, 0.1);
        bench.ctx.set_dr_f64(2, 0.2);
        // fadd dr0,dr2
        bench.run(0xf200).unwrap();
        assert_eq!(bench.ctx.dr_f64(2), 0.1 + 0.2);
        // fsqrt dr2 on 4.0
        bench.ctx.set_dr_f64(2, 4.0);
        bench.run(0xf26d).unwrap();
        assert_eq!(bench.ctx.dr_f64(2), 2.0);
    }

    #[test]
    fn float_and_conversions() {
        let mut bench = bench_with_fpscr(0);
        bench.ctx.fpul = (-7i32) as u32;
        // float fpul,fr3
        bench.run(0xf32d).unwrap();
        assert_eq!(bench.ctx.fr_f32(3), -7.0);

        bench.ctx.fpul = 1.25f32.to_bits();
        // fcnvsd fpul,dr2
        bench.run(0xf2ad).unwrap();
        assert_eq!(bench.ctx.dr_f64(2), 1.25);
        bench.ctx.fpul = 0;
        // fcnvds dr2,fpul
        bench.run(0xf2bd).unwrap();
        assert_eq!(f32::from_bits(bench.ctx.fpul), 1.25);
    }

    #[test]
    fn pair_move_reaches_extended_bank() {
        let mut bench = bench_with_fpscr(FPSCR_SZ);
        bench.ctx.set_dr(0, 0x1122_3344_5566_7788);
        // fmov dr0,xd2
        bench.run(0xf30c).unwrap();
        assert_eq!(bench.ctx.xd(2), 0x1122_3344_5566_7788);
        assert_eq!(bench.ctx.dr(2), 0);
    }

    #[test]
    fn pair_transfers_keep_memory_order() {
        let mut bench = bench_with_fpscr(FPSCR_SZ);
        bench.space.write_u32(BASE + 0x100, 0xaaaa_aaaa).unwrap();
        bench.space.write_u32(BASE + 0x104, 0xbbbb_bbbb).unwrap();
        bench.ctx.set_r(1, BASE + 0x100);
        // fmov.d @r1,dr2
        bench.run(0xf218).unwrap();
        assert_eq!(bench.ctx.fr(2), 0xaaaa_aaaa);
        assert_eq!(bench.ctx.fr(3), 0xbbbb_bbbb);

        bench.ctx.set_r(1, BASE + 0x208);
        // fmov.d dr2,@-r1
        bench.run(0xf12b).unwrap();
        assert_eq!(bench.ctx.r(1), BASE + 0x200);
        assert_eq!(bench.space.read_u32(BASE + 0x200).unwrap(), 0xaaaa_aaaa);
        assert_eq!(bench.space.read_u32(BASE + 0x204).unwrap(), 0xbbbb_bbbb);
    }

    #[test]
    fn single_transfer_post_increments_by_four() {
        let mut bench = bench_with_fpscr(0);
        bench.space.write_u32(BASE + 0x100, 1.0f32.to_bits()).unwrap();
        bench.ctx.set_r(1, BASE + 0x100);
        // fmov.s @r1+,fr2
        bench.run(0xf219).unwrap();
        assert_eq!(bench.ctx.fr_f32(2), 1.0);
        assert_eq!(bench.ctx.r(1), BASE + 0x104);
    }

    #[test]
    fn frchg_swaps_addressed_bank() {
        let mut bench = bench_with_fpscr(0);
        // fldi1 fr0
        bench.run(0xf09d).unwrap();
        // frchg
        bench.run(0xfbfd).unwrap();
        assert_eq!(bench.ctx.fr(0), 0);
        assert_eq!(bench.ctx.xf(0), 1.0f32.to_bits());
        assert_eq!(bench.ctx.fp_reg(FpBank::Primary, 0), 1.0f32.to_bits());
    }

    #[test]
    fn fipr_and_identity_ftrv() {
        let mut bench = bench_with_fpscr(0);
        for k in 0..4 {
            bench.ctx.set_fr_f32(k, (k + 1) as f32);
            bench.ctx.set_fr_f32(4 + k, 2.0);
            bench.ctx.set_xf(k * 5, 1.0f32.to_bits());
        }
        // fipr fv0,fv4
        bench.run(0xf4ed).unwrap();
        assert_eq!(bench.ctx.fr_f32(7), 20.0);
        // ftrv xmtrx,fv0
        bench.run(0xf1fd).unwrap();
        let vector: Vec<f32> = (0..4).map(|k| bench.ctx.fr_f32(k)).collect();
        assert_eq!(vector, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn fsca_quarter_turn() {
        let mut bench = bench_with_fpscr(0);
        bench.ctx.fpul = 0x4000;
        // fsca fpul,dr2
        bench.run(0xf2fd).unwrap();
        assert!((bench.ctx.fr_f32(2) - 1.0).abs() < 1e-6);
        assert!(bench.ctx.fr_f32(3).abs() < 1e-6);
    }
}
