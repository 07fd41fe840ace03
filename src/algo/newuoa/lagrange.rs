//! Geometry step maximizing the modulus of a Lagrange function.
//!
//! When an interpolation point is too far from the best point, it is moved to
//! a point within distance `dstep` from the best point where its Lagrange
//! function has a large modulus. The search alternates between choosing a
//! plane through the current step and rotating the step within that plane.

use nalgebra::{convert, Dyn, OVector, RealField, U1};

use super::angle::{self, Goal};
use super::factorization::InverseKkt;
use super::model::QuadraticModel;

pub(super) struct Workspace<T: RealField + Copy> {
    hcol: OVector<T, Dyn>,
    gc: OVector<T, Dyn>,
    gd: OVector<T, Dyn>,
    s: OVector<T, Dyn>,
    w: OVector<T, Dyn>,
}

impl<T: RealField + Copy> Workspace<T> {
    pub fn new(n: usize, npt: usize) -> Self {
        Self {
            hcol: OVector::zeros_generic(Dyn(npt), U1),
            gc: OVector::zeros_generic(Dyn(n), U1),
            gd: OVector::zeros_generic(Dyn(n), U1),
            s: OVector::zeros_generic(Dyn(n), U1),
            w: OVector::zeros_generic(Dyn(n), U1),
        }
    }
}

/// Computes `out = sum_k coeffs[k] (xpt_k^T v) xpt_k`.
fn implicit_mul<T: RealField + Copy>(
    model: &QuadraticModel<T>,
    coeffs: &OVector<T, Dyn>,
    v: &OVector<T, Dyn>,
    out: &mut OVector<T, Dyn>,
) {
    out.fill(T::zero());
    for k in 0..model.npt() {
        let temp = coeffs[k] * model.point_dot(k, v);
        for i in 0..model.dim() {
            out[i] += temp * model.xpt[(k, i)];
        }
    }
}

/// Computes a step `d` of length `dstep` from the best point that makes the
/// modulus of the Lagrange function of the `knew`-th point large.
///
/// Returns the `knew`-th diagonal element of `Ω`.
pub(super) fn select<T: RealField + Copy>(
    model: &QuadraticModel<T>,
    kkt: &InverseKkt<T>,
    knew: usize,
    dstep: T,
    d: &mut OVector<T, Dyn>,
    work: &mut Workspace<T>,
) -> T {
    let Workspace { hcol, gc, gd, s, w } = work;

    let n = model.dim();
    let half: T = convert(0.5);
    let parallel_tol: T = convert(0.99);
    let small: T = convert(0.01);
    let degenerate_tol: T = convert(1e-8);
    let sufficient: T = convert(1.1);

    let delsq = dstep * dstep;

    kkt.omega_column(knew, hcol);
    let alpha = hcol[knew];

    // Gradient of the Lagrange function at the best point and its second
    // derivatives applied to the initial direction.
    for i in 0..n {
        d[i] = model.xpt[(knew, i)] - model.xopt[i];
    }
    implicit_mul(model, hcol, &model.xopt, gc);
    for i in 0..n {
        gc[i] += kkt.bmat[(knew, i)];
    }
    implicit_mul(model, hcol, d, gd);

    let gg = gc.norm_squared();
    let sp = d.dot(&*gc);
    let dhd = d.dot(&*gd);
    let dd = d.norm_squared();

    let mut scale = dstep / dd.sqrt();
    if sp * dhd < T::zero() {
        scale = -scale;
    }

    let mut temp = T::zero();
    if sp * sp > parallel_tol * dd * gg {
        temp = T::one();
    }
    let tau = scale * (sp.abs() + half * scale * dhd.abs());
    if gg * delsq < small * tau * tau {
        temp = T::one();
    }

    for i in 0..n {
        d[i] *= scale;
        gd[i] *= scale;
        s[i] = gc[i] + temp * gd[i];
    }

    let mut iterc = 0;
    loop {
        iterc += 1;

        let dd = d.norm_squared();
        let sp = d.dot(&*s);
        let ss = s.norm_squared();

        let temp = dd * ss - sp * sp;
        if temp <= degenerate_tol * dd * ss {
            break;
        }

        // Direction orthogonal to d of the same length.
        let denom = temp.sqrt();
        for i in 0..n {
            s[i] = (dd * s[i] - sp * d[i]) / denom;
        }
        implicit_mul(model, hcol, s, w);

        let cf1 = half * s.dot(&*w);
        let cf2 = d.dot(&*gc);
        let cf3 = s.dot(&*gc);
        let cf4 = half * d.dot(&*gd) - cf1;
        let cf5 = s.dot(&*gd);
        let taubeg = cf1 + cf2 + cf4;

        let value = |angle: T| {
            let (sth, cth) = angle.sin_cos();
            cf1 + (cf2 + cf4 * cth) * cth + (cf3 + cf5 * cth) * sth
        };

        let angle = angle::search(taubeg, Goal::MaximumModulus, &value);
        let tau = value(angle);
        let (sth, cth) = angle.sin_cos();

        for i in 0..n {
            d[i] = cth * d[i] + sth * s[i];
            gd[i] = cth * gd[i] + sth * w[i];
            s[i] = gc[i] + gd[i];
        }

        if tau.abs() <= sufficient * taubeg.abs() || iterc >= n {
            break;
        }
    }

    alpha
}
