//! Optimization algorithms.
//!
//! * [NEWUOA](newuoa) -- Trust region method based on quadratic
//!   interpolation, it does not need derivatives of the function.

pub mod newuoa;

pub use newuoa::*;
