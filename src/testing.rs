//! Test functions and utilities useful for benchmarking, debugging and smoke
//! testing.
//!
//! [`ExtendedRosenbrock`] and [`Sphere`] are recommended for first tests.
//! Others can be used for specific conditions (e.g., badly scaled variables or
//! a failing function).
//!
//! # References
//!
//! \[1\] [A Literature Survey of Benchmark Functions For Global Optimization
//! Problems](https://arxiv.org/abs/1308.4008)
//!
//! \[2\] [Numerical Methods for Unconstrained Optimization and Nonlinear
//! Equations](https://epubs.siam.org/doi/book/10.1137/1.9781611971200)

#![allow(unused)]

use std::error::Error as StdError;

use nalgebra::{storage::Storage, DMatrix, DVector, Dyn, IsContiguous, OVector, Vector};
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

use crate::{
    algo::{Newuoa, NewuoaError},
    core::{Domain, Function, Optimizer, Problem, ProblemError},
};

/// Extension of the [`Problem`] trait that provides additional information
/// that is useful for testing optimizers.
pub trait TestProblem: Problem {
    /// Standard initial values for the problem. Using the same initial values is
    /// essential for fair comparison of methods.
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>>;
}

/// Extension of the [`Function`] trait that provides additional information
/// that is useful for testing optimizers.
pub trait TestFunction: Function + TestProblem {
    /// A set of global optima (if known and finite).
    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        Vec::new()
    }

    /// Test if given point is within the distance `eps` from a global
    /// optimum.
    fn is_optimum<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>, eps: Self::Field) -> bool
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        self.optima()
            .iter()
            .any(|optimum| (optimum - x).norm() <= eps)
    }
}

/// [Extended Rosenbrock
/// function](https://en.wikipedia.org/wiki/Rosenbrock_function) \[1,2\] (also
/// known as Rosenbrock's valley or banana function).
///
/// The global minimum is inside a long, narrow, parabolic shaped flat valley.
/// The challenge is to find the solution inside the valley.
#[derive(Debug, Clone, Copy)]
pub struct ExtendedRosenbrock {
    n: usize,
    alpha: f64,
}

impl ExtendedRosenbrock {
    /// Initializes the function with given dimension.
    ///
    /// The dimension **must** be a multiplier of 2.
    pub fn new(n: usize) -> Self {
        Self::with_scaling(n, 1.0)
    }

    /// Initializes the function with given dimension and scaling factor.
    ///
    /// The dimension **must** be a multiplier of 2. The higher the scaling
    /// factor is, the more difficult the problem is.
    pub fn with_scaling(n: usize, alpha: f64) -> Self {
        assert!(n > 0, "n must be greater than zero");
        assert!(n % 2 == 0, "n must be a multiple of 2");
        assert!(alpha > 0.0, "alpha must be greater than zero");
        Self { n, alpha }
    }
}

impl Default for ExtendedRosenbrock {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Problem for ExtendedRosenbrock {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        (0..self.n)
            .map(|i| {
                if i % 2 == 0 {
                    1.0 / self.alpha
                } else {
                    self.alpha
                }
            })
            .collect()
    }
}

impl Function for ExtendedRosenbrock {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        let value = (0..(self.n / 2))
            .map(|i| {
                let x1 = x[2 * i] * self.alpha;
                let x2 = x[2 * i + 1] / self.alpha;

                (10.0 * (x2 - x1 * x1)).powi(2) + (1.0 - x1).powi(2)
            })
            .sum();

        Ok(value)
    }
}

impl TestProblem for ExtendedRosenbrock {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        let init1 = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { -1.2 } else { 1.0 }),
        );

        let init2 = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { 6.39 } else { -0.221 }),
        );

        vec![init1, init2]
    }
}

impl TestFunction for ExtendedRosenbrock {
    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        let optimum = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| {
                if i % 2 == 0 {
                    1.0 / self.alpha
                } else {
                    self.alpha
                }
            }),
        );

        vec![optimum]
    }
}

/// [Sphere function](https://en.wikipedia.org/wiki/Test_functions_for_optimization)
/// \[1\].
///
/// An easy function with a single minimum at the origin.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    n: usize,
}

impl Sphere {
    /// Initializes the function with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Problem for Sphere {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        Domain::unconstrained(self.n)
    }
}

impl Function for Sphere {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        Ok(x.iter().map(|xi| xi.powi(2)).sum())
    }
}

impl TestProblem for Sphere {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        let init = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { 10.0 } else { -10.0 }),
        );

        vec![init]
    }
}

impl TestFunction for Sphere {
    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::from_element(self.n, 0.0)]
    }
}

/// Parabola `sum (x_i - center)^2 + offset` with the minimum away from the
/// origin and a nonzero optimal value.
#[derive(Debug, Clone, Copy)]
pub struct ShiftedParabola {
    n: usize,
    center: f64,
    offset: f64,
}

impl ShiftedParabola {
    /// Initializes the function with given dimension, position of the
    /// minimum in every coordinate and the minimal value.
    pub fn new(n: usize, center: f64, offset: f64) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n, center, offset }
    }
}

impl Default for ShiftedParabola {
    fn default() -> Self {
        Self::new(1, 3.0, 10.0)
    }
}

impl Problem for ShiftedParabola {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        Domain::unconstrained(self.n)
    }
}

impl Function for ShiftedParabola {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        Ok(x.iter().map(|xi| (xi - self.center).powi(2)).sum::<f64>() + self.offset)
    }
}

impl TestProblem for ShiftedParabola {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::zeros(self.n)]
    }
}

impl TestFunction for ShiftedParabola {
    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::from_element(self.n, self.center)]
    }
}

/// Sphere in badly scaled variables, `sum (s_i x_i - 1)^2`.
///
/// The domain carries the scale `s`, so an optimizer that respects it sees
/// the same problem for any `s`.
#[derive(Debug, Clone)]
pub struct ScaledSphere {
    scale: Vec<f64>,
}

impl ScaledSphere {
    /// Initializes the function with given scales of the variables.
    pub fn new(scale: Vec<f64>) -> Self {
        assert!(!scale.is_empty(), "n must be greater than zero");
        assert!(
            scale.iter().all(|s| s.is_finite() && *s > 0.0),
            "scale must be positive and finite"
        );
        Self { scale }
    }
}

impl Default for ScaledSphere {
    fn default() -> Self {
        Self::new(vec![1e3, 1.0, 1e-3])
    }
}

impl Problem for ScaledSphere {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        Domain::unconstrained(self.scale.len()).with_scale(self.scale.clone())
    }
}

impl Function for ScaledSphere {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        let value = x
            .iter()
            .zip(self.scale.iter())
            .map(|(xi, si)| (si * xi - 1.0).powi(2))
            .sum();

        Ok(value)
    }
}

impl TestProblem for ScaledSphere {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        let init = DVector::from_iterator(self.scale.len(), self.scale.iter().map(|si| 3.0 / si));
        vec![init]
    }
}

impl TestFunction for ScaledSphere {
    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        let optimum = DVector::from_iterator(self.scale.len(), self.scale.iter().map(|si| 1.0 / si));
        vec![optimum]
    }
}

/// Convex quadratic `1/2 x^T A x + b^T x` with random coefficients.
///
/// The matrix `A = B^T B + n I` is positive definite, so the minimum is
/// unique. A quadratic model with `(n + 1)(n + 2) / 2` interpolation points
/// reproduces the function exactly.
#[derive(Debug, Clone)]
pub struct RandomQuadratic {
    a: DMatrix<f64>,
    b: DVector<f64>,
    optimum: DVector<f64>,
}

impl RandomQuadratic {
    /// Initializes the function with given dimension, the coefficients are
    /// generated from given seed.
    pub fn new(n: usize, seed: u64) -> Self {
        assert!(n > 0, "n must be greater than zero");

        let mut rng = StdRng::seed_from_u64(seed);
        let factor = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-1.0..1.0));
        let a = factor.transpose() * &factor + DMatrix::identity(n, n) * n as f64;
        let b = DVector::from_fn(n, |_, _| rng.gen_range(-2.0..2.0));

        let optimum = -a
            .clone()
            .cholesky()
            .expect("matrix is positive definite")
            .solve(&b);

        Self { a, b, optimum }
    }
}

impl Problem for RandomQuadratic {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        Domain::unconstrained(self.b.nrows())
    }
}

impl Function for RandomQuadratic {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        let ax = &self.a * x;
        Ok(0.5 * x.dot(&ax) + self.b.dot(x))
    }
}

impl TestProblem for RandomQuadratic {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::zeros(self.b.nrows())]
    }
}

impl TestFunction for RandomQuadratic {
    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![self.optimum.clone()]
    }
}

/// Error of [`AlwaysFailing`] function.
#[derive(Debug, Error)]
#[error("evaluation failed")]
pub struct EvaluationFailed;

/// Function that fails for every input.
#[derive(Debug, Clone, Copy)]
pub struct AlwaysFailing {
    n: usize,
}

impl AlwaysFailing {
    /// Initializes the function with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }
}

impl Problem for AlwaysFailing {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        Domain::unconstrained(self.n)
    }
}

impl Function for AlwaysFailing {
    fn apply<Sx>(&self, _: &Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        Err(ProblemError::custom(EvaluationFailed))
    }
}

impl TestProblem for AlwaysFailing {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::zeros(self.n)]
    }
}

/// Error from [`optimize`] helper.
#[derive(Debug, Error)]
pub enum TestingError<E: StdError + 'static> {
    /// Error of the optimizer used.
    #[error("{0}")]
    Inner(#[from] E),
    /// Optimizer did not terminate.
    #[error("optimizer did not terminate")]
    Termination,
}

/// A simple driver that runs [`Newuoa`] until it terminates, returning the
/// final point and value.
pub fn optimize<F: Function>(
    f: &F,
    dom: &Domain<F::Field>,
    optimizer: &mut Newuoa<F>,
    mut x: OVector<F::Field, Dyn>,
    max_iters: usize,
) -> Result<(OVector<F::Field, Dyn>, F::Field), TestingError<NewuoaError>> {
    let mut iter = 0;

    loop {
        let fx = optimizer.opt_next(f, dom, &mut x)?;

        if optimizer.stop_reason().is_some() {
            return Ok((x, fx));
        }

        if iter == max_iters {
            return Err(TestingError::Termination);
        } else {
            iter += 1;
        }
    }
}

/// Iterate the optimizer and inspect it in each iteration.
pub fn iter<F: Function, O: Optimizer<F>, G>(
    f: &F,
    dom: &Domain<F::Field>,
    mut optimizer: O,
    mut x: OVector<F::Field, Dyn>,
    iters: usize,
    mut inspect: G,
) -> Result<(), O::Error>
where
    O::Error: StdError,
    G: FnMut(&O, &OVector<F::Field, Dyn>, F::Field, usize),
{
    for iter in 0..iters {
        let fx = optimizer.opt_next(f, dom, &mut x)?;
        inspect(&optimizer, &x, fx, iter);
    }

    Ok(())
}
