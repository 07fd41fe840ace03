//! Rank-two update of the inverse KKT factorization.
//!
//! When the `knew`-th interpolation point is replaced, both `bmat` and `zmat`
//! are revised so that they represent the inverse of the new KKT matrix.
//! Givens rotations first reduce the `knew`-th row of `zmat` to at most two
//! nonzero entries, one in each sign group, which keeps the update of the
//! factor local to those columns.

use nalgebra::{Dyn, OVector, RealField};

use super::factorization::InverseKkt;

/// The denominator of the updating formula vanished or is not finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct DegenerateUpdate;

impl<T: RealField + Copy> InverseKkt<T> {
    /// Updates the factorization for replacing the `knew`-th interpolation
    /// point by `xopt + d`.
    ///
    /// `vlag` and `beta` must be the quantities computed for the step `d` by
    /// [`lagrange_values`](InverseKkt::lagrange_values) (or the alternative
    /// step selection). The vector `w` of length `npt + n` is workspace.
    pub fn update(
        &mut self,
        vlag: &mut OVector<T, Dyn>,
        beta: T,
        knew: usize,
        w: &mut OVector<T, Dyn>,
    ) -> Result<(), DegenerateUpdate> {
        let m = self.zmat.nrows();
        let n = self.bmat.ncols();
        let nptm = self.zmat.ncols();

        // Rotations that put zeros in the knew-th row of zmat.
        let mut jl = 0;
        for j in 1..nptm {
            if j == self.neg {
                jl = self.neg;
            } else if self.zmat[(knew, j)] != T::zero() {
                let zl = self.zmat[(knew, jl)];
                let zj = self.zmat[(knew, j)];
                let temp = (zl * zl + zj * zj).sqrt();
                let tempa = zl / temp;
                let tempb = zj / temp;

                for i in 0..m {
                    let temp = tempa * self.zmat[(i, jl)] + tempb * self.zmat[(i, j)];
                    self.zmat[(i, j)] = tempa * self.zmat[(i, j)] - tempb * self.zmat[(i, jl)];
                    self.zmat[(i, jl)] = temp;
                }
                self.zmat[(knew, j)] = T::zero();
            }
        }

        // The knew-th column of Ω and the denominator.
        let zfirst = self.zmat[(knew, 0)];
        let tempa = zfirst * self.sign(0);
        let tempb = if jl > 0 {
            self.zmat[(knew, jl)]
        } else {
            T::zero()
        };
        for i in 0..m {
            w[i] = tempa * self.zmat[(i, 0)];
            if jl > 0 {
                w[i] += tempb * self.zmat[(i, jl)];
            }
        }

        let alpha = w[knew];
        let tau = vlag[knew];
        let denom = alpha * beta + tau * tau;

        if denom == T::zero() || !denom.is_finite() {
            return Err(DegenerateUpdate);
        }

        vlag[knew] -= T::one();

        let mut swap_first = false;
        if jl == 0 {
            // Only the first column is involved. Its sign is multiplied by the
            // sign of the denominator.
            let temp = denom.abs().sqrt();
            let scale_z = tau / temp;
            let scale_v = zfirst / temp;
            for i in 0..m {
                self.zmat[(i, 0)] = scale_z * self.zmat[(i, 0)] - scale_v * vlag[i];
            }

            if denom < T::zero() {
                if self.neg == 0 {
                    self.neg = 1;
                } else {
                    swap_first = true;
                }
            }
        } else {
            let ja = if beta >= T::zero() { jl } else { 0 };
            let jb = jl - ja;

            let temp = self.zmat[(knew, jb)] / denom;
            let tempa = temp * beta;
            let tempb = temp * tau;
            let temp = self.zmat[(knew, ja)];

            let scala = T::one() / (beta.abs() * temp * temp + tau * tau).sqrt();
            let scalb = scala * denom.abs().sqrt();

            for i in 0..m {
                self.zmat[(i, ja)] = scala * (tau * self.zmat[(i, ja)] - temp * vlag[i]);
                self.zmat[(i, jb)] =
                    scalb * (self.zmat[(i, jb)] - tempa * w[i] - tempb * vlag[i]);
            }

            if denom <= T::zero() {
                if beta < T::zero() {
                    self.neg += 1;
                } else {
                    swap_first = true;
                }
            }
        }

        // The first column changed its sign to positive, move it behind the
        // negative ones.
        if swap_first {
            self.neg -= 1;
            self.zmat.swap_columns(0, self.neg);
        }

        for j in 0..n {
            let jp = m + j;
            w[jp] = self.bmat[(knew, j)];

            let tempa = (alpha * vlag[jp] - tau * w[jp]) / denom;
            let tempb = (-beta * w[jp] - tau * vlag[jp]) / denom;

            for i in 0..=jp {
                self.bmat[(i, j)] += tempa * vlag[i] + tempb * w[i];
                if i >= m {
                    self.bmat[(jp, i - m)] = self.bmat[(i, j)];
                }
            }
        }

        Ok(())
    }
}
