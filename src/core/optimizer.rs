use nalgebra::{storage::StorageMut, Dyn, IsContiguous, Vector};

use super::{domain::Domain, function::Function};

/// Interface of an optimizer.
///
/// An optimizer is an iterative algorithm which takes a point _x_ and computes
/// the next step in the optimization process. Repeated calls to the next step
/// should eventually converge into a minimum _x'_.
///
/// If you implement an optimizer, please reach out to discuss if we could
/// include it in newuoa.
///
/// ## Implementing an optimizer
///
/// Here is an implementation of a coordinate probing optimizer which tries a
/// fixed step in every direction and moves whenever it finds an improvement.
///
/// ```rust
/// use newuoa::nalgebra as na;
/// use newuoa::{Domain, Function, Optimizer, ProblemError};
/// use na::{storage::StorageMut, Dyn, IsContiguous, Vector};
///
/// struct Probe {
///     step: f64,
///     coord: usize,
/// }
///
/// impl<F: Function<Field = f64>> Optimizer<F> for Probe {
///     const NAME: &'static str = "Probe";
///     type Error = ProblemError;
///
///     fn opt_next<Sx>(
///         &mut self,
///         f: &F,
///         dom: &Domain<F::Field>,
///         x: &mut Vector<F::Field, Dyn, Sx>,
///     ) -> Result<F::Field, Self::Error>
///     where
///         Sx: StorageMut<F::Field, Dyn> + IsContiguous,
///     {
///         let fx = f.apply(x)?;
///         let i = self.coord % dom.dim();
///         self.coord += 1;
///
///         x[i] += self.step;
///         let fx_next = f.apply(x)?;
///
///         if fx_next < fx {
///             Ok(fx_next)
///         } else {
///             x[i] -= self.step;
///             Ok(fx)
///         }
///     }
/// }
/// ```
pub trait Optimizer<F: Function> {
    /// Name of the optimizer.
    const NAME: &'static str;

    /// Error while computing the next step.
    type Error;

    /// Computes the next step in the optimization process.
    ///
    /// The value of `x` is the current point. After the method returns, `x`
    /// should hold the variable values of the performed step and the return
    /// value _must_ be the function value of that step as computed by
    /// [`Function::apply`].
    ///
    /// The implementations _can_ assume that subsequent calls to `opt_next`
    /// pass the value of `x` as was outputted in the previous iteration by the
    /// same method.
    fn opt_next<Sx>(
        &mut self,
        f: &F,
        dom: &Domain<F::Field>,
        x: &mut Vector<F::Field, Dyn, Sx>,
    ) -> Result<F::Field, Self::Error>
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous;
}
