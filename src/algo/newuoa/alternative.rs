//! Geometry step maximizing the denominator of the updating formula.
//!
//! Used when the step found by maximizing the Lagrange function would make
//! the update of the factorization badly conditioned. The step is rotated in
//! planes through the best point so that `|alpha beta + tau^2|` becomes large,
//! where the denominator along the rotation angle is a trigonometric
//! polynomial of degree four.

use nalgebra::{convert, Dyn, OMatrix, OVector, RealField, U1, U5};

use super::angle::{self, Goal};
use super::factorization::InverseKkt;
use super::model::QuadraticModel;

/// Number of terms of the denominator polynomial.
const TERMS: usize = 9;

pub(super) struct Workspace<T: RealField + Copy> {
    hcol: OVector<T, Dyn>,
    s: OVector<T, Dyn>,
    wx: OVector<T, Dyn>,
    wvec: OMatrix<T, Dyn, U5>,
    prod: OMatrix<T, Dyn, U5>,
}

impl<T: RealField + Copy> Workspace<T> {
    pub fn new(n: usize, npt: usize) -> Self {
        Self {
            hcol: OVector::zeros_generic(Dyn(npt), U1),
            s: OVector::zeros_generic(Dyn(n), U1),
            wx: OVector::zeros_generic(Dyn(n), U1),
            wvec: OMatrix::zeros_generic(Dyn(npt + n), U5),
            prod: OMatrix::zeros_generic(Dyn(npt + n), U5),
        }
    }
}

/// Values `1, cos θ, sin θ, cos 2θ, sin 2θ, ..., cos 4θ, sin 4θ`.
fn harmonics<T: RealField + Copy>(angle: T) -> [T; TERMS] {
    let mut par = [T::zero(); TERMS];
    let (sth, cth) = angle.sin_cos();

    par[0] = T::one();
    par[1] = cth;
    par[2] = sth;
    for j in [3, 5, 7] {
        par[j] = par[1] * par[j - 2] - par[2] * par[j - 1];
        par[j + 1] = par[1] * par[j - 1] + par[2] * par[j - 2];
    }

    par
}

fn combine<T: RealField + Copy>(coeffs: &[T; TERMS], par: &[T; TERMS]) -> T {
    coeffs
        .iter()
        .zip(par.iter())
        .fold(T::zero(), |acc, (c, p)| acc + *c * *p)
}

/// Improves the step `d` from the best point, keeping its length, so that the
/// denominator of the update replacing the `knew`-th point becomes large.
///
/// On return, `vlag` and `w` hold the same quantities as computed by
/// [`InverseKkt::lagrange_values`] for the final step, and the returned value
/// is the corresponding `beta`.
pub(super) fn select<T: RealField + Copy>(
    model: &QuadraticModel<T>,
    kkt: &InverseKkt<T>,
    knew: usize,
    d: &mut OVector<T, Dyn>,
    vlag: &mut OVector<T, Dyn>,
    w: &mut OVector<T, Dyn>,
    work: &mut Workspace<T>,
) -> T {
    let Workspace {
        hcol,
        s,
        wx,
        wvec,
        prod,
    } = work;

    let n = model.dim();
    let m = model.npt();
    let kopt = model.kopt;
    let xopt = &model.xopt;

    let half: T = convert(0.5);
    let quarter: T = convert(0.25);
    let two: T = convert(2.0);
    let parallel_tol: T = convert(0.99);
    let degenerate_tol: T = convert(1e-8);
    let sufficient: T = convert(1.1);

    let xoptsq = xopt.norm_squared();

    kkt.omega_column(knew, hcol);
    let alpha = hcol[knew];

    // The initial plane is spanned by d and the direction towards the replaced
    // point, unless they are nearly parallel.
    let mut dd = d.norm_squared();
    let mut ds = T::zero();
    let mut ss = T::zero();
    for i in 0..n {
        s[i] = model.xpt[(knew, i)] - xopt[i];
        ds += d[i] * s[i];
        ss += s[i] * s[i];
    }

    if ds * ds > parallel_tol * dd * ss {
        let mut ksav = knew;
        let mut dtest = ds * ds / ss;

        for k in (0..m).filter(|&k| k != kopt) {
            let mut dstemp = T::zero();
            let mut sstemp = T::zero();
            for i in 0..n {
                let diff = model.xpt[(k, i)] - xopt[i];
                dstemp += d[i] * diff;
                sstemp += diff * diff;
            }

            if dstemp * dstemp / sstemp < dtest {
                ksav = k;
                dtest = dstemp * dstemp / sstemp;
                ds = dstemp;
                ss = sstemp;
            }
        }

        for i in 0..n {
            s[i] = model.xpt[(ksav, i)] - xopt[i];
        }
    }

    let mut ssden = dd * ss - ds * ds;
    let mut densav = T::zero();
    let mut par;
    let mut beta;
    let mut iterc = 0;

    loop {
        iterc += 1;

        // Direction orthogonal to d of the same length.
        let temp = T::one() / ssden.sqrt();
        let mut xoptd = T::zero();
        let mut xopts = T::zero();
        for i in 0..n {
            s[i] = temp * (dd * s[i] - ds * d[i]);
            xoptd += xopt[i] * d[i];
            xopts += xopt[i] * s[i];
        }

        // Coefficients of beta as a function of the angle, without the terms
        // depending on the factorization.
        let mut den = [T::zero(); TERMS];
        let tempa = half * xoptd * xoptd;
        let tempb = half * xopts * xopts;
        den[0] = dd * (xoptsq + half * dd) + tempa + tempb;
        den[1] = two * xoptd * dd;
        den[2] = two * xopts * dd;
        den[3] = tempa - tempb;
        den[4] = xoptd * xopts;

        for k in 0..m {
            let ta = model.point_dot(k, d);
            let tb = model.point_dot(k, s);
            let tc = model.point_dot(k, xopt);

            wvec[(k, 0)] = quarter * (ta * ta + tb * tb);
            wvec[(k, 1)] = ta * tc;
            wvec[(k, 2)] = tb * tc;
            wvec[(k, 3)] = quarter * (ta * ta - tb * tb);
            wvec[(k, 4)] = half * ta * tb;
        }
        for i in 0..n {
            let ip = m + i;
            wvec[(ip, 0)] = T::zero();
            wvec[(ip, 1)] = d[i];
            wvec[(ip, 2)] = s[i];
            wvec[(ip, 3)] = T::zero();
            wvec[(ip, 4)] = T::zero();
        }

        // Products of the inverse KKT matrix with the columns of wvec.
        for jc in 0..5 {
            let nw = if jc == 1 || jc == 2 { m + n } else { m };

            for k in 0..m {
                prod[(k, jc)] = T::zero();
            }
            for j in 0..kkt.zmat.ncols() {
                let mut sum = T::zero();
                for i in 0..m {
                    sum += kkt.zmat[(i, j)] * wvec[(i, jc)];
                }
                sum *= kkt.sign(j);
                for k in 0..m {
                    prod[(k, jc)] += sum * kkt.zmat[(k, j)];
                }
            }

            if nw == m + n {
                for k in 0..m {
                    let mut sum = T::zero();
                    for j in 0..n {
                        sum += kkt.bmat[(k, j)] * wvec[(m + j, jc)];
                    }
                    prod[(k, jc)] += sum;
                }
            }

            for j in 0..n {
                let mut sum = T::zero();
                for i in 0..nw {
                    sum += kkt.bmat[(i, j)] * wvec[(i, jc)];
                }
                prod[(m + j, jc)] = sum;
            }
        }

        for k in 0..m + n {
            let p = |i: usize| prod[(k, i)];
            let v = |i: usize| wvec[(k, i)];

            let mut hp = [T::zero(); 5];
            let mut sum = T::zero();
            for (i, hpi) in hp.iter_mut().enumerate() {
                *hpi = half * p(i) * v(i);
                sum += *hpi;
            }

            den[0] = den[0] - hp[0] - sum;

            let tempa = p(0) * v(1) + p(1) * v(0);
            let tempb = p(1) * v(3) + p(3) * v(1);
            let tempc = p(2) * v(4) + p(4) * v(2);
            den[1] = den[1] - tempa - half * (tempb + tempc);
            den[5] -= half * (tempb - tempc);

            let tempa = p(0) * v(2) + p(2) * v(0);
            let tempb = p(1) * v(4) + p(4) * v(1);
            let tempc = p(2) * v(3) + p(3) * v(2);
            den[2] = den[2] - tempa - half * (tempb - tempc);
            den[6] -= half * (tempb + tempc);

            let tempa = p(0) * v(3) + p(3) * v(0);
            den[3] = den[3] - tempa - hp[1] + hp[2];

            let tempa = p(0) * v(4) + p(4) * v(0);
            let tempb = p(1) * v(2) + p(2) * v(1);
            den[4] = den[4] - tempa - half * tempb;

            den[7] = den[7] - hp[3] + hp[4];
            den[8] -= half * (p(3) * v(4) + p(4) * v(3));
        }

        // Coefficients of the full denominator alpha beta + tau^2.
        let pk = |i: usize| prod[(knew, i)];
        let mut par5 = [T::zero(); 5];
        let mut sum = T::zero();
        for (i, pi) in par5.iter_mut().enumerate() {
            *pi = half * pk(i) * pk(i);
            sum += *pi;
        }

        let mut denex = [T::zero(); TERMS];
        denex[0] = alpha * den[0] + par5[0] + sum;

        let tempa = two * pk(0) * pk(1);
        let tempb = pk(1) * pk(3);
        let tempc = pk(2) * pk(4);
        denex[1] = alpha * den[1] + tempa + tempb + tempc;
        denex[5] = alpha * den[5] + tempb - tempc;

        let tempa = two * pk(0) * pk(2);
        let tempb = pk(1) * pk(4);
        let tempc = pk(2) * pk(3);
        denex[2] = alpha * den[2] + tempa + tempb - tempc;
        denex[6] = alpha * den[6] + tempb + tempc;

        let tempa = two * pk(0) * pk(3);
        denex[3] = alpha * den[3] + tempa + par5[1] - par5[2];

        let tempa = two * pk(0) * pk(4);
        denex[4] = alpha * den[4] + tempa + pk(1) * pk(2);

        denex[7] = alpha * den[7] + par5[3] - par5[4];
        denex[8] = alpha * den[8] + pk(3) * pk(4);

        let denold = denex[0] + denex[1] + denex[3] + denex[5] + denex[7];
        let angle = angle::search(denold, Goal::MaximumModulus, |angle| {
            combine(&denex, &harmonics(angle))
        });

        par = harmonics(angle);
        beta = combine(&den, &par);
        let denmax = combine(&denex, &par);

        for k in 0..m + n {
            let mut sum = T::zero();
            for (j, pj) in par.iter().take(5).enumerate() {
                sum += prod[(k, j)] * *pj;
            }
            vlag[k] = sum;
        }
        let tau = vlag[knew];

        dd = T::zero();
        let mut tempa = T::zero();
        let mut tempb = T::zero();
        for i in 0..n {
            d[i] = par[1] * d[i] + par[2] * s[i];
            wx[i] = xopt[i] + d[i];
            dd += d[i] * d[i];
            tempa += d[i] * wx[i];
            tempb += wx[i] * wx[i];
        }

        if iterc >= n {
            break;
        }
        if iterc > 1 {
            densav = densav.max(denold);
        }
        if denmax.abs() <= sufficient * densav.abs() {
            break;
        }
        densav = denmax;

        // Gradient of the denominator at the new step, which defines the next
        // plane of the search.
        for i in 0..n {
            s[i] = tau * kkt.bmat[(knew, i)]
                + alpha * (tempa * xopt[i] + tempb * d[i] - vlag[m + i]);
        }
        for k in 0..m {
            let sum = model.point_dot(k, wx);
            let temp = (tau * hcol[k] - alpha * vlag[k]) * sum;
            for i in 0..n {
                s[i] += temp * model.xpt[(k, i)];
            }
        }

        ss = s.norm_squared();
        ds = d.dot(&*s);
        ssden = dd * ss - ds * ds;
        if ssden < degenerate_tol * dd * ss {
            break;
        }
    }

    for k in 0..m {
        let mut sum = T::zero();
        for (j, pj) in par.iter().take(5).enumerate() {
            sum += wvec[(k, j)] * *pj;
        }
        w[k] = sum;
    }
    vlag[kopt] += T::one();

    beta
}

#[cfg(test)]
mod tests {
    use super::*;

    use super::super::{initial, lagrange};

    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    fn objective(x: &OVector<f64, Dyn>) -> f64 {
        (x[0] - 1.0).powi(2) + 3.0 * (x[1] + 0.5).powi(2) + x[2].powi(4) + x[0] * x[2]
    }

    #[test]
    fn harmonics_match_trigonometry() {
        let angle = 0.7f64;
        let par = harmonics(angle);

        for j in 1..=4 {
            let t = j as f64 * angle;
            assert_abs_diff_eq!(par[2 * j - 1], t.cos(), epsilon = 1e-12);
            assert_abs_diff_eq!(par[2 * j], t.sin(), epsilon = 1e-12);
        }
    }

    #[test]
    fn returned_quantities_match_direct_computation() {
        let x0 = dvector![0.2, 0.1, -0.3];
        let (n, npt) = (3, 9);
        let (model, kkt) = initial::build_for_test(objective, &x0, npt, 0.5);

        let knew = (0..npt).rev().find(|&k| k != model.kopt).unwrap();
        let dstep = 0.25;

        let mut d = dvector![0.0, 0.0, 0.0];
        let mut work = lagrange::Workspace::new(n, npt);
        let alpha = lagrange::select(&model, &kkt, knew, dstep, &mut d, &mut work);

        let mut vlag = OVector::zeros_generic(Dyn(npt + n), U1);
        let mut w = OVector::zeros_generic(Dyn(npt), U1);
        let beta_before = kkt.lagrange_values(&model, &d, dstep * dstep, &mut vlag, &mut w);
        let denom_before = alpha * beta_before + vlag[knew] * vlag[knew];

        let mut work = Workspace::new(n, npt);
        let beta = select(&model, &kkt, knew, &mut d, &mut vlag, &mut w, &mut work);
        let denom = alpha * beta + vlag[knew] * vlag[knew];

        assert_abs_diff_eq!(d.norm(), dstep, epsilon = 1e-10);
        assert!(denom.abs() >= 0.99 * denom_before.abs());

        let mut vlag_direct = OVector::zeros_generic(Dyn(npt + n), U1);
        let mut w_direct = OVector::zeros_generic(Dyn(npt), U1);
        let beta_direct =
            kkt.lagrange_values(&model, &d, d.norm_squared(), &mut vlag_direct, &mut w_direct);

        assert_abs_diff_eq!(beta, beta_direct, epsilon = 1e-8);
        for k in 0..npt + n {
            assert_abs_diff_eq!(vlag[k], vlag_direct[k], epsilon = 1e-8);
        }
        for k in 0..npt {
            assert_abs_diff_eq!(w[k], w_direct[k], epsilon = 1e-8);
        }
    }
}
