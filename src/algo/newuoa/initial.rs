//! Initial interpolation set and the closed-form first model.
//!
//! The first point is the starting point itself, the next `2n` points are
//! displaced by `±rho_begin` along the coordinate axes and any further points
//! are displaced along two axes at once. The direction of every two-axis
//! displacement follows the smaller of the function values observed on the
//! corresponding axes. With this placement both the model and the inverse KKT
//! factorization are known explicitly, no linear system is solved.

use nalgebra::{convert, RealField};

use super::factorization::InverseKkt;
use super::model::QuadraticModel;

/// Coordinates displaced by the `p`-th point for `p > 2n`.
fn cross_pair(p: usize, n: usize) -> (usize, usize) {
    let itemp = (p - n - 1) / n;
    let mut jpt = p - itemp * n - n;
    let mut ipt = jpt + itemp;

    if ipt > n {
        let temp = jpt;
        jpt = ipt - n;
        ipt = temp;
    }

    (ipt - 1, jpt - 1)
}

/// Sets the `p`-th initial interpolation point.
///
/// For points with two displaced coordinates, the function values of all
/// preceding points must be already absorbed.
pub(super) fn place_point<T: RealField + Copy>(
    model: &mut QuadraticModel<T>,
    p: usize,
    rho_begin: T,
) {
    let n = model.dim();

    if p == 0 {
        // The starting point itself.
    } else if p <= n {
        model.xpt[(p, p - 1)] = rho_begin;
    } else if p <= 2 * n {
        model.xpt[(p, p - n - 1)] = -rho_begin;
    } else {
        let (i, j) = cross_pair(p, n);

        let xi = if model.fval[i + 1 + n] < model.fval[i + 1] {
            -rho_begin
        } else {
            rho_begin
        };
        let xj = if model.fval[j + 1 + n] < model.fval[j + 1] {
            -rho_begin
        } else {
            rho_begin
        };

        model.xpt[(p, i)] = xi;
        model.xpt[(p, j)] = xj;
    }
}

/// Incorporates the function value `f` at the `p`-th initial point into the
/// model and the factorization.
pub(super) fn absorb_value<T: RealField + Copy>(
    model: &mut QuadraticModel<T>,
    kkt: &mut InverseKkt<T>,
    p: usize,
    f: T,
    rho_begin: T,
) {
    let n = model.dim();
    let half: T = convert(0.5);

    let rhosq = rho_begin * rho_begin;
    let recip = T::one() / rhosq;
    let reciq = half.sqrt() / rhosq;

    model.fval[p] = f;

    if p == 0 {
        model.fopt = f;
        model.kopt = 0;
        model.xopt.fill(T::zero());
        return;
    }

    if f < model.fopt {
        model.fopt = f;
        model.kopt = p;
        for i in 0..n {
            model.xopt[i] = model.xpt[(p, i)];
        }
    }

    let fbeg = model.fval[0];

    if p <= n {
        let c = p - 1;
        model.gq[c] = (f - fbeg) / rho_begin;

        // Without the opposite point on this axis, the gradient stays a
        // forward difference and the curvature along the axis is zero.
        if model.npt() < p + 1 + n {
            kkt.bmat[(0, c)] = -T::one() / rho_begin;
            kkt.bmat[(p, c)] = T::one() / rho_begin;
            kkt.bmat[(model.npt() + c, c)] = -half * rhosq;
        }
    } else if p <= 2 * n {
        let c = p - n - 1;

        kkt.bmat[(p - n, c)] = half / rho_begin;
        kkt.bmat[(p, c)] = -half / rho_begin;
        kkt.zmat[(0, c)] = -(reciq + reciq);
        kkt.zmat[(p - n, c)] = reciq;
        kkt.zmat[(p, c)] = reciq;

        let temp = (fbeg - f) / rho_begin;
        model.hq[(c, c)] = (model.gq[c] - temp) / rho_begin;
        model.gq[c] = half * (model.gq[c] + temp);
    } else {
        let c = p - n - 1;
        let (i, j) = cross_pair(p, n);

        let xi = model.xpt[(p, i)];
        let xj = model.xpt[(p, j)];
        let ip = if xi < T::zero() { i + 1 + n } else { i + 1 };
        let jp = if xj < T::zero() { j + 1 + n } else { j + 1 };

        kkt.zmat[(0, c)] = recip;
        kkt.zmat[(p, c)] = recip;
        kkt.zmat[(ip, c)] = -recip;
        kkt.zmat[(jp, c)] = -recip;

        let h = (fbeg - model.fval[ip] - model.fval[jp] + f) / (xi * xj);
        model.hq[(i, j)] = h;
        model.hq[(j, i)] = h;
    }
}

#[cfg(test)]
pub(super) fn build_for_test<F>(
    f: F,
    x0: &nalgebra::OVector<f64, nalgebra::Dyn>,
    npt: usize,
    rho_begin: f64,
) -> (QuadraticModel<f64>, InverseKkt<f64>)
where
    F: Fn(&nalgebra::OVector<f64, nalgebra::Dyn>) -> f64,
{
    let n = x0.nrows();
    let mut model = QuadraticModel::new(n, npt);
    let mut kkt = InverseKkt::new(n, npt);
    model.xbase.copy_from(x0);

    for p in 0..npt {
        place_point(&mut model, p, rho_begin);
        let x = &model.xbase + model.xpt.row(p).transpose();
        let fx = f(&x);
        absorb_value(&mut model, &mut kkt, p, fx, rho_begin);
    }

    (model, kkt)
}
