//! High-level API for optimization.
//!
//! This module contains a "driver" that encapsulates all internal state and
//! provides a simple API to run the iterative process of optimization.
//!
//! The simplest way of using the driver is to initialize it with the defaults:
//!
//! ```rust
//! use newuoa::OptimizerDriver;
//! # use newuoa::{Domain, Problem};
//! #
//! # struct MyFunction;
//! #
//! # impl MyFunction {
//! #     fn new() -> Self {
//! #         Self
//! #     }
//! # }
//! #
//! # impl Problem for MyFunction {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::unconstrained(2)
//! #     }
//! # }
//!
//! let f = MyFunction::new();
//!
//! let mut optimizer = OptimizerDriver::new(&f);
//! ```
//! If you need to specify additional settings, use the builder:
//!
//! ```rust
//! use newuoa::OptimizerDriver;
//! use newuoa::algo::{Newuoa, NewuoaOptions};
//! # use newuoa::{Domain, Problem};
//! #
//! # struct MyFunction;
//! #
//! # impl MyFunction {
//! #     fn new() -> Self {
//! #         Self
//! #     }
//! # }
//! #
//! # impl Problem for MyFunction {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::unconstrained(2)
//! #     }
//! # }
//!
//! let f = MyFunction::new();
//!
//! let mut options = NewuoaOptions::default();
//! options.set_rho_begin(0.5).set_rho_end(1e-6);
//!
//! let mut optimizer = OptimizerDriver::builder(&f)
//!     .with_initial(vec![10.0, -10.0])
//!     .with_algo(|f, dom| Newuoa::with_options(f, dom, options))
//!     .build();
//! ```
//!
//! Once you have the optimizer, you can run it until it terminates:
//!
//! ```rust
//! # use newuoa::nalgebra as na;
//! # use newuoa::{Domain, Function, OptimizerDriver, Problem, ProblemError};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct MyFunction;
//! #
//! # impl MyFunction {
//! #     fn new() -> Self {
//! #         Self
//! #     }
//! # }
//! #
//! # impl Problem for MyFunction {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::unconstrained(2)
//! #     }
//! # }
//! #
//! # impl Function for MyFunction {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         Ok(x[0].powi(2) + (x[1] - 1.0).powi(2))
//! #     }
//! # }
//! #
//! # let f = MyFunction::new();
//! #
//! # let mut optimizer = OptimizerDriver::new(&f);
//! #
//! let report = optimizer.run().expect("no optimizer error");
//! println!("{} after {} evaluations", report.reason, report.evaluations);
//! ```
//!
//! or stop it earlier with your own criterion:
//!
//! ```rust
//! # use newuoa::nalgebra as na;
//! # use newuoa::{Domain, Function, OptimizerDriver, Problem, ProblemError};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct MyFunction;
//! #
//! # impl MyFunction {
//! #     fn new() -> Self {
//! #         Self
//! #     }
//! # }
//! #
//! # impl Problem for MyFunction {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::unconstrained(2)
//! #     }
//! # }
//! #
//! # impl Function for MyFunction {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         Ok(x[0].powi(2) + (x[1] - 1.0).powi(2))
//! #     }
//! # }
//! #
//! # let f = MyFunction::new();
//! #
//! # let mut optimizer = OptimizerDriver::new(&f);
//! #
//! let result = optimizer.find(|state| state.fx() <= 1e-6 || state.iter() >= 100);
//! ```

use nalgebra::{convert, Dyn, OVector, U1};

use crate::{
    algo::{Newuoa, NewuoaError, StopReason},
    Domain, Function, Optimizer, Problem,
};

/// Builder for the [`OptimizerDriver`].
pub struct OptimizerBuilder<'a, F: Problem, A> {
    f: &'a F,
    dom: Domain<F::Field>,
    algo: A,
    x0: OVector<F::Field, Dyn>,
}

impl<'a, F: Problem> OptimizerBuilder<'a, F, Newuoa<F>> {
    fn new(f: &'a F) -> Self {
        let dom = f.domain();
        let algo = Newuoa::new(f, &dom);

        let dim = Dyn(dom.dim());
        let x0 = OVector::from_element_generic(dim, U1, convert(0.0));

        Self { f, dom, algo, x0 }
    }
}

impl<'a, F: Problem, A> OptimizerBuilder<'a, F, A> {
    /// Sets the initial point from which the iterative process starts.
    pub fn with_initial(mut self, x0: Vec<F::Field>) -> Self {
        let dim = Dyn(self.dom.dim());
        self.x0 = OVector::from_vec_generic(dim, U1, x0);
        self
    }

    /// Sets specific algorithm to be used.
    ///
    /// This builder method accepts a closure that takes the reference to the
    /// problem and its domain. To use the defaults, pass the `new`
    /// constructor directly (e.g., `Newuoa::new`).
    pub fn with_algo<A2, FA>(self, factory: FA) -> OptimizerBuilder<'a, F, A2>
    where
        FA: FnOnce(&F, &Domain<F::Field>) -> A2,
    {
        let algo = factory(self.f, &self.dom);

        OptimizerBuilder {
            f: self.f,
            dom: self.dom,
            algo,
            x0: self.x0,
        }
    }

    /// Builds the [`OptimizerDriver`].
    ///
    /// The initial point is projected into the domain.
    pub fn build(self) -> OptimizerDriver<'a, F, A> {
        let OptimizerBuilder {
            f,
            dom,
            algo,
            mut x0,
        } = self;

        dom.project(&mut x0);

        OptimizerDriver {
            f,
            dom,
            algo,
            x: x0,
            fx: convert(f64::INFINITY),
        }
    }
}

/// The driver for the process of optimization.
///
/// For default settings, use [`OptimizerDriver::new`]. For more flexibility,
/// use [`OptimizerDriver::builder`]. For the usage of the driver, see
/// [module](self) documentation.
pub struct OptimizerDriver<'a, F: Problem, A> {
    f: &'a F,
    dom: Domain<F::Field>,
    algo: A,
    x: OVector<F::Field, Dyn>,
    fx: F::Field,
}

impl<'a, F: Problem> OptimizerDriver<'a, F, Newuoa<F>> {
    /// Returns the builder for specifying additional settings.
    pub fn builder(f: &'a F) -> OptimizerBuilder<'a, F, Newuoa<F>> {
        OptimizerBuilder::new(f)
    }

    /// Initializes the driver with the default settings.
    pub fn new(f: &'a F) -> Self {
        OptimizerDriver::builder(f).build()
    }
}

impl<'a, F: Problem, A> OptimizerDriver<'a, F, A> {
    /// Returns reference to the current point.
    pub fn x(&self) -> &[F::Field] {
        self.x.as_slice()
    }

    /// Returns the current function value.
    pub fn fx(&self) -> F::Field {
        self.fx
    }

    /// Returns reference to the used algorithm.
    pub fn algo(&self) -> &A {
        &self.algo
    }

    /// Returns mutable reference to the used algorithm.
    pub fn algo_mut(&mut self) -> &mut A {
        &mut self.algo
    }
}

impl<'a, F: Function, A: Optimizer<F>> OptimizerDriver<'a, F, A> {
    /// Does one iteration of the process, returning the function value in case
    /// of no error.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<(&[F::Field], F::Field), A::Error> {
        self.fx = self.algo.opt_next(self.f, &self.dom, &mut self.x)?;
        Ok((self.x.as_slice(), self.fx))
    }

    /// Runs the iterative process until given stopping criterion is satisfied.
    pub fn find<C>(&mut self, stop: C) -> Result<(&[F::Field], F::Field), A::Error>
    where
        C: Fn(OptimizerIterState<'_, F>) -> bool,
    {
        let mut iter = 0;

        loop {
            self.next()?;

            let state = OptimizerIterState {
                x: &self.x,
                fx: self.fx,
                iter,
            };

            if stop(state) {
                return Ok((self.x.as_slice(), self.fx));
            }

            iter += 1;
        }
    }

    /// Returns the name of the used optimizer.
    pub fn name(&self) -> &str {
        A::NAME
    }
}

impl<'a, F: Function> OptimizerDriver<'a, F, Newuoa<F>> {
    /// Runs the optimizer until it terminates.
    ///
    /// The number of iterations is bounded by the maximum number of function
    /// evaluations set in the options.
    pub fn run(&mut self) -> Result<Report<F::Field>, NewuoaError> {
        let reason = loop {
            self.next()?;

            if let Some(reason) = self.algo.stop_reason() {
                break reason;
            }
        };

        Ok(Report {
            x: self.x.clone(),
            fx: self.fx,
            evaluations: self.algo.evaluations(),
            reason,
        })
    }
}

/// Result of a complete run of [`Newuoa`].
#[derive(Debug, Clone)]
pub struct Report<T: nalgebra::RealField + Copy> {
    /// The best point found.
    pub x: OVector<T, Dyn>,
    /// The function value at the best point.
    pub fx: T,
    /// Number of function evaluations made.
    pub evaluations: usize,
    /// Reason of the termination.
    pub reason: StopReason,
}

/// State of the current iteration.
pub struct OptimizerIterState<'a, F: Problem> {
    x: &'a OVector<F::Field, Dyn>,
    fx: F::Field,
    iter: usize,
}

impl<'a, F: Problem> OptimizerIterState<'a, F> {
    /// Returns reference to the current point.
    pub fn x(&self) -> &[F::Field] {
        self.x.as_slice()
    }

    /// Returns the current function value.
    pub fn fx(&self) -> F::Field {
        self.fx
    }

    /// Returns the current iteration number.
    pub fn iter(&self) -> usize {
        self.iter
    }
}
