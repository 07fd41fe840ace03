use nalgebra::RealField;
use thiserror::Error;

use super::domain::Domain;

/// The base trait for [`Function`](super::function::Function).
pub trait Problem {
    /// Type of the field, usually f32 or f64.
    type Field: RealField + Copy;

    /// Gets the domain of the problem. At the very least, the dimension must
    /// be known. Bounds and scales are optional.
    fn domain(&self) -> Domain<Self::Field>;
}

/// Error encountered while applying variables to the function.
///
/// Returning an error from [`Function::apply`](super::function::Function::apply)
/// is the way for a cost function to signal that the trial point could not be
/// evaluated.
#[derive(Debug, Error)]
pub enum ProblemError {
    /// The number of variables does not match the dimensionality of the
    /// problem.
    #[error("invalid dimensionality")]
    InvalidDimensionality,
    /// An invalid value (NaN, positive or negative infinity) of the function
    /// occurred.
    #[error("invalid value encountered")]
    InvalidValue,
    /// A custom error specific to the function.
    #[error("{0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl ProblemError {
    /// Wraps any error type into [`ProblemError::Custom`].
    pub fn custom<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Custom(Box::new(error))
    }
}
