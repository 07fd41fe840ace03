//! Mapping between the caller's space and the internal space.
//!
//! Internally, every coordinate is multiplied by its scale so that a single
//! trust-region radius is meaningful in all directions, and the objective is
//! always minimized.

use log::warn;
use nalgebra::{
    storage::{Storage, StorageMut},
    Dyn, IsContiguous, OVector, RealField, Vector,
};

use crate::core::{Function, ProblemError};

pub(super) struct ScaledObjective<T: RealField + Copy> {
    scale: OVector<T, Dyn>,
    maximize: bool,
    tolerate_failures: bool,
    worst_value: T,
}

impl<T: RealField + Copy> ScaledObjective<T> {
    pub fn new(
        scale: OVector<T, Dyn>,
        maximize: bool,
        tolerate_failures: bool,
        worst_value: T,
    ) -> Self {
        Self {
            scale,
            maximize,
            tolerate_failures,
            worst_value,
        }
    }

    /// Maps a caller point into the internal space.
    pub fn to_internal<Sx>(&self, x: &Vector<T, Dyn, Sx>, out: &mut OVector<T, Dyn>)
    where
        Sx: Storage<T, Dyn>,
    {
        out.iter_mut()
            .zip(x.iter().zip(self.scale.iter()))
            .for_each(|(o, (xi, si))| *o = *xi * *si);
    }

    /// Maps an internal point into the caller's space.
    pub fn to_caller<Sx>(&self, internal: &OVector<T, Dyn>, out: &mut Vector<T, Dyn, Sx>)
    where
        Sx: StorageMut<T, Dyn>,
    {
        out.iter_mut()
            .zip(internal.iter().zip(self.scale.iter()))
            .for_each(|(o, (xi, si))| *o = *xi / *si);
    }

    /// Converts between the caller's value and the minimized internal value.
    ///
    /// The conversion is an involution, so it serves both directions.
    pub fn flip(&self, value: T) -> T {
        if self.maximize {
            -value
        } else {
            value
        }
    }

    /// Evaluates the function at a caller point and returns the internal
    /// value.
    ///
    /// A failure of the function, including a non-finite value, is replaced
    /// by the worst value if failures are tolerated.
    pub fn evaluate<F, Sx>(&self, f: &F, x: &Vector<T, Dyn, Sx>) -> Result<T, ProblemError>
    where
        F: Function<Field = T>,
        Sx: Storage<T, Dyn> + IsContiguous,
    {
        let result = match f.apply(x) {
            Ok(fx) if fx.is_finite() => Ok(fx),
            Ok(_) => Err(ProblemError::InvalidValue),
            Err(error) => Err(error),
        };

        match result {
            Ok(fx) => Ok(self.flip(fx)),
            Err(error) if self.tolerate_failures => {
                warn!("function evaluation failed, substituting the worst value: {}", error);
                Ok(self.flip(self.worst_value))
            }
            Err(error) => Err(error),
        }
    }
}
