//! Factored inverse of the interpolation KKT matrix.
//!
//! The inverse `H` of the matrix of the least Frobenius norm interpolation
//! conditions has the block form
//!
//! ```text
//!     [ Ω     Ξ^T ]
//! H = [           ]
//!     [ Ξ     Υ   ]
//! ```
//!
//! with `Ω` of size `npt x npt`. It is stored as `bmat`, holding `Ξ` in its
//! first `npt` rows and `Υ` in the remaining `n` rows, and `zmat`, a rank
//! factorization `Ω = Z S Z^T` where `S` is diagonal with the first `neg`
//! entries equal to -1 and the rest equal to +1. The first row and column of
//! `H`, which correspond to the constant term, are never stored.

use nalgebra::{convert, Dyn, OMatrix, OVector, RealField};

use super::model::QuadraticModel;

pub(super) struct InverseKkt<T: RealField + Copy> {
    /// Rows `0..npt` hold `Ξ`, rows `npt..npt + n` hold the symmetric `Υ`.
    pub bmat: OMatrix<T, Dyn, Dyn>,
    /// Factor of `Ω` with `npt - n - 1` columns.
    pub zmat: OMatrix<T, Dyn, Dyn>,
    /// Number of leading columns of `zmat` with negative sign.
    pub neg: usize,
}

impl<T: RealField + Copy> InverseKkt<T> {
    pub fn new(n: usize, npt: usize) -> Self {
        Self {
            bmat: OMatrix::zeros_generic(Dyn(npt + n), Dyn(n)),
            zmat: OMatrix::zeros_generic(Dyn(npt), Dyn(npt - n - 1)),
            neg: 0,
        }
    }

    /// Sign attached to the `j`-th column of `zmat`.
    pub fn sign(&self, j: usize) -> T {
        if j < self.neg {
            -T::one()
        } else {
            T::one()
        }
    }

    /// Column `k` of `Ω`.
    ///
    /// These are the coefficients of the implicit second derivatives of the
    /// `k`-th Lagrange function.
    pub fn omega_column(&self, k: usize, out: &mut OVector<T, Dyn>) {
        out.fill(T::zero());

        for j in 0..self.zmat.ncols() {
            let temp = self.zmat[(k, j)] * self.sign(j);
            for i in 0..self.zmat.nrows() {
                out[i] += temp * self.zmat[(i, j)];
            }
        }
    }

    /// Diagonal element `k` of `Ω`.
    pub fn omega_diagonal(&self, k: usize) -> T {
        (0..self.zmat.ncols()).fold(T::zero(), |acc, j| {
            let z = self.zmat[(k, j)];
            acc + self.sign(j) * z * z
        })
    }

    /// Computes the values of all Lagrange functions at `xopt + d` and the
    /// denominator term `beta` of the updating formula.
    ///
    /// On return, the first `npt` components of `vlag` are the Lagrange
    /// values and the remaining `n` components the corresponding part of
    /// `H w`. The vector `w` receives the first `npt` components of `w`, that
    /// is `(xpt_k^T d) (1/2 xpt_k^T d + xpt_k^T xopt)` for every point. The
    /// squared length of the step is passed as `dsq`.
    pub fn lagrange_values(
        &self,
        model: &QuadraticModel<T>,
        d: &OVector<T, Dyn>,
        dsq: T,
        vlag: &mut OVector<T, Dyn>,
        w: &mut OVector<T, Dyn>,
    ) -> T {
        let n = model.dim();
        let m = model.npt();
        let half: T = convert(0.5);
        let two: T = convert(2.0);

        for k in 0..m {
            let suma = model.point_dot(k, d);
            let sumb = model.point_dot(k, &model.xopt);
            w[k] = suma * (half * suma + sumb);

            vlag[k] = (0..n).fold(T::zero(), |acc, j| acc + self.bmat[(k, j)] * d[j]);
        }

        let mut beta = T::zero();
        for j in 0..self.zmat.ncols() {
            let mut sum = T::zero();
            for i in 0..m {
                sum += self.zmat[(i, j)] * w[i];
            }

            if j < self.neg {
                beta += sum * sum;
                sum = -sum;
            } else {
                beta -= sum * sum;
            }

            for i in 0..m {
                vlag[i] += sum * self.zmat[(i, j)];
            }
        }

        let mut bsum = T::zero();
        let mut dx = T::zero();
        for j in 0..n {
            let mut sum = T::zero();
            for i in 0..m {
                sum += w[i] * self.bmat[(i, j)];
            }
            bsum += sum * d[j];

            for k in 0..n {
                sum += self.bmat[(m + k, j)] * d[k];
            }
            vlag[m + j] = sum;
            bsum += sum * d[j];

            dx += d[j] * model.xopt[j];
        }

        let xoptsq = model.xopt.norm_squared();
        vlag[model.kopt] += T::one();

        dx * dx + dsq * (xoptsq + two * dx + half * dsq) + beta - bsum
    }
}
