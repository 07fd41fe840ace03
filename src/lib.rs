#![allow(clippy::many_single_char_names)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![warn(missing_docs)]

//! # Newuoa
//!
//! A pure Rust implementation of NEWUOA, a derivative-free method for
//! unconstrained minimization (or maximization) of a scalar function.
//!
//! The function is only evaluated, never differentiated. The optimizer builds
//! a quadratic model of the function by interpolating its values at a small
//! set of points and minimizes the model within a trust region. This makes
//! it suitable for objectives which are expensive to evaluate, noisy or
//! simply given as a black box, such as cost functions of model fitting.
//!
//! ## Problem
//!
//! Mathematically, the problem is formulated as
//!
//! ```text
//! min f(x)
//!
//! where x = { x1, ..., xn }
//! ```
//!
//! The variables can be scaled through the [`Domain`], so that a single trust
//! region radius is meaningful for all of them. Bounds given to the domain
//! are used for clamping the initial point and for estimating the scales, the
//! optimization itself is unconstrained.
//!
//! When it comes to code, the problem is any type that implements the
//! [`Function`] and [`Problem`] traits.
//!
//! ```rust
//! // Newuoa is based on `nalgebra` crate.
//! use newuoa::nalgebra as na;
//! use newuoa::{Domain, Function, Problem, ProblemError};
//! use na::{Dyn, IsContiguous};
//!
//! // A problem is represented by a type.
//! struct Rosenbrock {
//!     a: f64,
//!     b: f64,
//! }
//!
//! impl Problem for Rosenbrock {
//!     // The numeric type. Usually f64 or f32.
//!     type Field = f64;
//!
//!     // The domain of the problem (here: unconstrained, two variables).
//!     fn domain(&self) -> Domain<Self::Field> {
//!         Domain::unconstrained(2)
//!     }
//! }
//!
//! impl Function for Rosenbrock {
//!     // Evaluate the function at given point. A failure to evaluate is
//!     // reported as an error.
//!     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
//!     where
//!         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//!     {
//!         Ok((self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2))
//!     }
//! }
//! ```
//!
//! ## Usage
//!
//! The simplest way of using the optimizer is to run the
//! [`OptimizerDriver`] until the optimizer terminates:
//!
//! ```rust
//! use newuoa::OptimizerDriver;
//! # use newuoa::nalgebra as na;
//! # use newuoa::{Domain, Function, Problem, ProblemError};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct Rosenbrock {
//! #     a: f64,
//! #     b: f64,
//! # }
//! #
//! # impl Problem for Rosenbrock {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::unconstrained(2)
//! #     }
//! # }
//! #
//! # impl Function for Rosenbrock {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         Ok((self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2))
//! #     }
//! # }
//!
//! let f = Rosenbrock { a: 1.0, b: 100.0 };
//! let mut optimizer = OptimizerDriver::builder(&f)
//!     .with_initial(vec![-1.2, 1.0])
//!     .build();
//!
//! let report = optimizer.run().expect("function never fails");
//!
//! println!("f({:?}) = {} ({})", report.x, report.fx, report.reason);
//! ```
//!
//! The settings of the algorithm are given by
//! [`NewuoaOptions`](algo::NewuoaOptions), progress can be observed through
//! [`Observer`](algo::Observer) and a run can be cancelled from another
//! thread with a [`CancelFlag`](algo::CancelFlag). For full control over the
//! process, use the [`Optimizer`] interface directly.

pub mod algo;
mod core;
pub mod driver;

pub use core::*;
pub use driver::{OptimizerDriver, Report};

#[cfg(feature = "testing")]
pub mod testing;

#[cfg(not(feature = "testing"))]
pub(crate) mod testing;

pub use nalgebra;
