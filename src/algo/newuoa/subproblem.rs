//! Approximate minimization of the model within the trust region.
//!
//! Truncated conjugate gradient is run from the best point until it either
//! converges inside the trust region or hits its boundary. In the latter case,
//! the step is further improved by rotations along the boundary circle
//! spanned by the current step and the model gradient.

use nalgebra::{convert, Dyn, OVector, RealField, U1};

use super::angle::{self, Goal};
use super::model::QuadraticModel;

/// Scratch vectors reused between calls.
pub(super) struct Workspace<T: RealField + Copy> {
    g: OVector<T, Dyn>,
    d: OVector<T, Dyn>,
    hd: OVector<T, Dyn>,
    hs: OVector<T, Dyn>,
}

impl<T: RealField + Copy> Workspace<T> {
    pub fn new(n: usize) -> Self {
        Self {
            g: OVector::zeros_generic(Dyn(n), U1),
            d: OVector::zeros_generic(Dyn(n), U1),
            hd: OVector::zeros_generic(Dyn(n), U1),
            hs: OVector::zeros_generic(Dyn(n), U1),
        }
    }
}

/// Computes a step from the best point of the model that approximately
/// minimizes the model subject to `|step| <= delta`.
///
/// Returns the least curvature of the model seen along the conjugate
/// directions if the step is strictly inside the trust region, and zero
/// otherwise.
pub(super) fn solve<T: RealField + Copy>(
    model: &QuadraticModel<T>,
    delta: T,
    step: &mut OVector<T, Dyn>,
    work: &mut Workspace<T>,
) -> T {
    let Workspace { g, d, hd, hs } = work;

    let n = model.dim();
    let half: T = convert(0.5);
    let ratio_tol: T = convert(0.01);
    let gradient_tol: T = convert(1e-4);
    let angle_tol: T = convert(-0.99);

    let delsq = delta * delta;

    model.hess_mul(&model.xopt, hd);
    g.copy_from(&model.gq);
    *g += &*hd;

    step.fill(T::zero());
    hs.fill(T::zero());
    d.copy_from(&*g);
    d.neg_mut();

    let mut dd = d.norm_squared();
    let mut crvmin = T::zero();

    if dd == T::zero() {
        return crvmin;
    }

    let mut ds = T::zero();
    let mut ss = T::zero();
    let mut gg = dd;
    let ggbeg = gg;
    let mut qred = T::zero();
    let mut iterc = 0;

    // Truncated conjugate gradient.
    loop {
        iterc += 1;

        let temp = delsq - ss;
        let bstep = temp / (ds + (ds * ds + dd * temp).sqrt());

        model.hess_mul(d, hd);
        let dhd = d.dot(&*hd);

        let mut alpha = bstep;
        if dhd > T::zero() {
            let curvature = dhd / dd;
            if iterc == 1 {
                crvmin = curvature;
            }
            crvmin = crvmin.min(curvature);
            alpha = alpha.min(gg / dhd);
        }

        let qadd = alpha * (gg - half * alpha * dhd);
        qred += qadd;

        let ggsav = gg;
        gg = T::zero();
        for i in 0..n {
            step[i] += alpha * d[i];
            hs[i] += alpha * hd[i];
            let gi = g[i] + hs[i];
            gg += gi * gi;
        }

        if alpha < bstep {
            if qadd <= ratio_tol * qred || gg <= gradient_tol * ggbeg || iterc == n {
                return crvmin;
            }

            let beta = gg / ggsav;
            dd = T::zero();
            ds = T::zero();
            ss = T::zero();
            for i in 0..n {
                d[i] = beta * d[i] - g[i] - hs[i];
                dd += d[i] * d[i];
                ds += d[i] * step[i];
                ss += step[i] * step[i];
            }

            if ds <= T::zero() {
                return crvmin;
            }

            if ss < delsq {
                continue;
            }
        }

        crvmin = T::zero();
        break;
    }

    // Rotations of the step along the boundary of the trust region.
    loop {
        if gg <= gradient_tol * ggbeg {
            break;
        }

        let sg = step.dot(&*g);
        let shs = step.dot(&*hs);
        let sgk = sg + shs;

        if sgk / (gg * delsq).sqrt() <= angle_tol {
            break;
        }

        let temp = delsq * gg - sgk * sgk;
        if temp <= T::zero() {
            break;
        }

        iterc += 1;

        let temp = temp.sqrt();
        let tempa = delsq / temp;
        let tempb = sgk / temp;
        for i in 0..n {
            d[i] = tempa * (g[i] + hs[i]) - tempb * step[i];
        }

        model.hess_mul(d, hd);
        let dg = d.dot(&*g);
        let dhd = hd.dot(&*d);
        let dhs = hd.dot(&*step);

        let cf = half * (shs - dhd);
        let qbeg = sg + cf;

        let q = |angle: T| {
            let (sth, cth) = angle.sin_cos();
            (sg + cf * cth) * cth + (dg + dhs * cth) * sth
        };

        let angle = angle::search(qbeg, Goal::Minimum, &q);
        let (sth, cth) = angle.sin_cos();
        let reduc = qbeg - q(angle);

        gg = T::zero();
        for i in 0..n {
            step[i] = cth * step[i] + sth * d[i];
            hs[i] = cth * hs[i] + sth * hd[i];
            let gi = g[i] + hs[i];
            gg += gi * gi;
        }

        qred += reduc;
        if iterc >= n || reduc <= ratio_tol * qred {
            break;
        }
    }

    crvmin
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::{dmatrix, dvector};

    fn diagonal_model(g: [f64; 2], h: [f64; 2]) -> QuadraticModel<f64> {
        let mut model = QuadraticModel::new(2, 5);
        model.gq = dvector![g[0], g[1]];
        model.hq = dmatrix![h[0], 0.0; 0.0, h[1]];
        model
    }

    #[test]
    fn newton_step_inside_region() {
        let model = diagonal_model([-2.0, -4.0], [2.0, 4.0]);
        let mut step = dvector![0.0, 0.0];
        let mut work = Workspace::new(2);

        let crvmin = solve(&model, 10.0, &mut step, &mut work);

        assert_abs_diff_eq!(step[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(step[1], 1.0, epsilon = 1e-10);
        assert!((2.0 - 1e-10..=4.0 + 1e-10).contains(&crvmin));
    }

    #[test]
    fn step_on_boundary() {
        let model = diagonal_model([-2.0, -4.0], [2.0, 4.0]);
        let mut step = dvector![0.0, 0.0];
        let mut work = Workspace::new(2);

        let crvmin = solve(&model, 0.5, &mut step, &mut work);

        assert_eq!(crvmin, 0.0);
        assert_abs_diff_eq!(step.norm(), 0.5, epsilon = 1e-10);
        assert!(model.value(&step) < 0.0);

        // At least as good as the steepest descent step of the same length.
        let cauchy = dvector![2.0, 4.0].normalize() * 0.5;
        assert!(model.value(&step) <= model.value(&cauchy) + 1e-12);
    }

    #[test]
    fn negative_curvature_goes_to_boundary() {
        let model = diagonal_model([0.1, 0.0], [-1.0, 1.0]);
        let mut step = dvector![0.0, 0.0];
        let mut work = Workspace::new(2);

        let crvmin = solve(&model, 2.0, &mut step, &mut work);

        assert_eq!(crvmin, 0.0);
        assert_abs_diff_eq!(step.norm(), 2.0, epsilon = 1e-10);
        assert!(step[0] < -1.9);
    }

    #[test]
    fn zero_gradient() {
        let model = diagonal_model([0.0, 0.0], [1.0, 1.0]);
        let mut step = dvector![1.0, 1.0];
        let mut work = Workspace::new(2);

        let crvmin = solve(&model, 1.0, &mut step, &mut work);

        assert_eq!(crvmin, 0.0);
        assert_eq!(step, dvector![0.0, 0.0]);
    }

    #[test]
    fn gradient_is_taken_at_best_point() {
        let mut model = diagonal_model([0.0, 0.0], [1.0, 1.0]);
        model.xopt = dvector![-1.0, 2.0];
        let mut step = dvector![0.0, 0.0];
        let mut work = Workspace::new(2);

        solve(&model, 10.0, &mut step, &mut work);

        assert_abs_diff_eq!(step[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(step[1], -2.0, epsilon = 1e-10);
    }
}
