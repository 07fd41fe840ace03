//! Interpolation set and the quadratic model interpolating it.
//!
//! The model is a quadratic function of the displacement `x` from the base
//! point,
//!
//! ```text
//! Q(x) = c + gq^T x + 1/2 x^T (hq + sum_k pq[k] xpt_k xpt_k^T) x,
//! ```
//!
//! where `hq` is the explicit part of the second derivative matrix and `pq`
//! are the coefficients of the implicit part attached to the interpolation
//! points `xpt_k`. The constant `c` is never needed, only differences of model
//! values are.

use nalgebra::{convert, Dyn, OMatrix, OVector, RealField, U1};

use super::factorization::InverseKkt;

pub(super) struct QuadraticModel<T: RealField + Copy> {
    /// Origin from which the interpolation points are displaced.
    pub xbase: OVector<T, Dyn>,
    /// Interpolation points relative to `xbase`, one per row.
    pub xpt: OMatrix<T, Dyn, Dyn>,
    /// Function values at the interpolation points.
    pub fval: OVector<T, Dyn>,
    /// Gradient of the model at `xbase`.
    pub gq: OVector<T, Dyn>,
    /// Explicit second derivatives, kept symmetric.
    pub hq: OMatrix<T, Dyn, Dyn>,
    /// Implicit second derivative coefficients.
    pub pq: OVector<T, Dyn>,
    /// Index of the interpolation point with the least function value.
    pub kopt: usize,
    /// Best point relative to `xbase`.
    pub xopt: OVector<T, Dyn>,
    /// Least function value so far.
    pub fopt: T,
}

impl<T: RealField + Copy> QuadraticModel<T> {
    pub fn new(n: usize, npt: usize) -> Self {
        let n_dim = Dyn(n);
        let m_dim = Dyn(npt);

        Self {
            xbase: OVector::zeros_generic(n_dim, U1),
            xpt: OMatrix::zeros_generic(m_dim, n_dim),
            fval: OVector::zeros_generic(m_dim, U1),
            gq: OVector::zeros_generic(n_dim, U1),
            hq: OMatrix::zeros_generic(n_dim, n_dim),
            pq: OVector::zeros_generic(m_dim, U1),
            kopt: 0,
            xopt: OVector::zeros_generic(n_dim, U1),
            fopt: T::zero(),
        }
    }

    pub fn dim(&self) -> usize {
        self.xpt.ncols()
    }

    pub fn npt(&self) -> usize {
        self.xpt.nrows()
    }

    /// Inner product of the `k`-th interpolation point with `v`.
    pub fn point_dot(&self, k: usize, v: &OVector<T, Dyn>) -> T {
        (0..self.dim()).fold(T::zero(), |acc, i| acc + self.xpt[(k, i)] * v[i])
    }

    /// Squared distance of the `k`-th interpolation point from the best point.
    pub fn distance_sq(&self, k: usize) -> T {
        (0..self.dim()).fold(T::zero(), |acc, i| {
            let diff = self.xpt[(k, i)] - self.xopt[i];
            acc + diff * diff
        })
    }

    /// Computes the product of the full second derivative matrix of the model
    /// with `v`.
    pub fn hess_mul(&self, v: &OVector<T, Dyn>, out: &mut OVector<T, Dyn>) {
        let n = self.dim();

        out.fill(T::zero());

        for k in 0..self.npt() {
            let temp = self.pq[k] * self.point_dot(k, v);
            for i in 0..n {
                out[i] += temp * self.xpt[(k, i)];
            }
        }

        for j in 0..n {
            for i in 0..=j {
                if i < j {
                    out[j] += self.hq[(i, j)] * v[i];
                }
                out[i] += self.hq[(i, j)] * v[j];
            }
        }
    }

    /// Evaluates the model at `x` up to the unknown constant term.
    #[cfg(test)]
    pub fn value(&self, x: &OVector<T, Dyn>) -> T {
        let half: T = convert(0.5);
        let mut hx = x.clone_owned();
        self.hess_mul(x, &mut hx);
        self.gq.dot(x) + half * x.dot(&hx)
    }

    /// Predicted change of the model when moving from `xopt` to
    /// `xnew = xopt + d`.
    ///
    /// The vector `w` holds the changes of `1/2 (xpt_k^T x)^2` along the step
    /// for all interpolation points, as computed together with the Lagrange
    /// values of the step.
    pub fn predicted_change(
        &self,
        d: &OVector<T, Dyn>,
        xnew: &OVector<T, Dyn>,
        w: &OVector<T, Dyn>,
    ) -> T {
        let half: T = convert(0.5);
        let mut vquad = T::zero();

        for j in 0..self.dim() {
            vquad += d[j] * self.gq[j];
            for i in 0..=j {
                let mut temp = d[i] * xnew[j] + d[j] * self.xopt[i];
                if i == j {
                    temp *= half;
                }
                vquad += temp * self.hq[(i, j)];
            }
        }

        for k in 0..self.npt() {
            vquad += self.pq[k] * w[k];
        }

        vquad
    }

    /// Moves the base point to the current best point.
    ///
    /// The interpolation points, the model and the factorization are
    /// re-expressed relative to the new origin. Mathematically, none of them
    /// changes.
    pub fn shift_base(&mut self, kkt: &mut InverseKkt<T>) {
        let n = self.dim();
        let m = self.npt();
        let half: T = convert(0.5);
        let quarter: T = convert(0.25);

        let xoptsq = self.xopt.norm_squared();
        let tempq = quarter * xoptsq;

        let mut sums = OVector::<T, Dyn>::zeros_generic(Dyn(m), U1);
        let mut w = OVector::<T, Dyn>::zeros_generic(Dyn(n), U1);
        let mut v = OVector::<T, Dyn>::zeros_generic(Dyn(n), U1);

        // Changes of the gradient and of the part of BMAT that does not
        // depend on ZMAT.
        for k in 0..m {
            let mut sum = self.point_dot(k, &self.xopt);
            let temp = self.pq[k] * sum;
            sum -= half * xoptsq;
            sums[k] = sum;

            for i in 0..n {
                self.gq[i] += temp * self.xpt[(k, i)];
                self.xpt[(k, i)] -= half * self.xopt[i];
                v[i] = kkt.bmat[(k, i)];
                w[i] = sum * self.xpt[(k, i)] + tempq * self.xopt[i];

                let ip = m + i;
                for j in 0..=i {
                    kkt.bmat[(ip, j)] += v[i] * w[j] + w[i] * v[j];
                }
            }
        }

        // Changes of BMAT that depend on ZMAT.
        let mut wm = OVector::<T, Dyn>::zeros_generic(Dyn(m), U1);
        for col in 0..kkt.zmat.ncols() {
            let sign = kkt.sign(col);

            let mut sumz = T::zero();
            for i in 0..m {
                sumz += kkt.zmat[(i, col)];
                wm[i] = sums[i] * kkt.zmat[(i, col)];
            }

            for j in 0..n {
                let mut sum = tempq * sumz * self.xopt[j];
                for i in 0..m {
                    sum += wm[i] * self.xpt[(i, j)];
                }
                v[j] = sum;

                let sum = sum * sign;
                for i in 0..m {
                    kkt.bmat[(i, j)] += sum * kkt.zmat[(i, col)];
                }
            }

            for i in 0..n {
                let ip = m + i;
                let temp = v[i] * sign;
                for j in 0..=i {
                    kkt.bmat[(ip, j)] += temp * v[j];
                }
            }
        }

        // The second derivative matrix, the remaining part of the gradient
        // and the symmetric part of BMAT.
        for j in 0..n {
            w[j] = T::zero();
            for k in 0..m {
                w[j] += self.pq[k] * self.xpt[(k, j)];
                self.xpt[(k, j)] -= half * self.xopt[j];
            }

            for i in 0..=j {
                if i < j {
                    self.gq[j] += self.hq[(i, j)] * self.xopt[i];
                }
                self.gq[i] += self.hq[(i, j)] * self.xopt[j];

                let hij = self.hq[(i, j)] + w[i] * self.xopt[j] + self.xopt[i] * w[j];
                self.hq[(i, j)] = hij;
                self.hq[(j, i)] = hij;

                kkt.bmat[(m + i, j)] = kkt.bmat[(m + j, i)];
            }
        }

        self.xbase += &self.xopt;
        self.xopt.fill(T::zero());
    }

    /// Replaces the `knew`-th interpolation point by `xnew` with function value
    /// `f`, given the already updated factorization.
    ///
    /// `diff` is the error of the model prediction at `xnew`. The correction of
    /// the model is the multiple `diff` of the Lagrange function of the
    /// replaced point.
    pub fn replace_point(
        &mut self,
        knew: usize,
        f: T,
        diff: T,
        xnew: &OVector<T, Dyn>,
        kkt: &InverseKkt<T>,
    ) {
        let n = self.dim();

        self.fval[knew] = f;

        // The implicit curvature of the replaced point becomes explicit.
        let pk = self.pq[knew];
        for i in 0..n {
            let temp = pk * self.xpt[(knew, i)];
            for j in 0..=i {
                let hij = self.hq[(i, j)] + temp * self.xpt[(knew, j)];
                self.hq[(i, j)] = hij;
                self.hq[(j, i)] = hij;
            }
        }
        self.pq[knew] = T::zero();

        for j in 0..kkt.zmat.ncols() {
            let temp = diff * kkt.zmat[(knew, j)] * kkt.sign(j);
            for k in 0..self.npt() {
                self.pq[k] += temp * kkt.zmat[(k, j)];
            }
        }

        for i in 0..n {
            self.gq[i] += diff * kkt.bmat[(knew, i)];
            self.xpt[(knew, i)] = xnew[i];
        }
    }

    /// Computes the gradient at the base point of the interpolant with least
    /// Frobenius norm of its second derivative matrix.
    ///
    /// The right-hand sides `fval - fval[kopt]` are stored into `rhs` and the
    /// gradient into `grad`. Returns the squared norm of the gradient.
    pub fn least_frobenius_gradient(
        &self,
        kkt: &InverseKkt<T>,
        rhs: &mut OVector<T, Dyn>,
        grad: &mut OVector<T, Dyn>,
    ) -> T {
        let fbest = self.fval[self.kopt];
        for k in 0..self.npt() {
            rhs[k] = self.fval[k] - fbest;
        }

        let mut gisq = T::zero();
        for i in 0..self.dim() {
            let mut sum = T::zero();
            for k in 0..self.npt() {
                sum += kkt.bmat[(k, i)] * rhs[k];
            }
            gisq += sum * sum;
            grad[i] = sum;
        }

        gisq
    }

    /// Replaces the model by the least Frobenius norm interpolant computed by
    /// [`least_frobenius_gradient`](QuadraticModel::least_frobenius_gradient).
    pub fn adopt_least_frobenius(
        &mut self,
        kkt: &InverseKkt<T>,
        rhs: &OVector<T, Dyn>,
        grad: &OVector<T, Dyn>,
    ) {
        let m = self.npt();
        let nptm = kkt.zmat.ncols();

        self.gq.copy_from(grad);
        self.hq.fill(T::zero());

        let mut coeffs = OVector::<T, Dyn>::zeros_generic(Dyn(nptm), U1);
        for j in 0..nptm {
            let mut sum = T::zero();
            for k in 0..m {
                sum += rhs[k] * kkt.zmat[(k, j)];
            }
            coeffs[j] = sum * kkt.sign(j);
        }

        for k in 0..m {
            let mut sum = T::zero();
            for j in 0..nptm {
                sum += kkt.zmat[(k, j)] * coeffs[j];
            }
            self.pq[k] = sum;
        }
    }

    /// Records a new best point that is not (yet) an interpolation point.
    pub fn record_best(&mut self, xnew: &OVector<T, Dyn>, f: T) {
        self.xopt.copy_from(xnew);
        self.fopt = f;
    }
}
