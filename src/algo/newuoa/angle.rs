//! Search over a single angle parametrizing a great circle.
//!
//! The trust-region subproblem and both model-improvement steps reduce the
//! search in a two-dimensional subspace to a trigonometric polynomial of one
//! angle. The polynomial is sampled at a fixed resolution and the best sample
//! is refined by fitting a parabola through it and its two neighbours.

use nalgebra::{convert, RealField};

/// Number of intervals into which the full circle is divided.
const INTERVALS: usize = 50;

/// What is considered the best value of the sampled polynomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Goal {
    /// The least value.
    Minimum,
    /// The value of largest modulus.
    MaximumModulus,
}

impl Goal {
    fn improves<T: RealField + Copy>(self, candidate: T, best: T) -> bool {
        match self {
            Goal::Minimum => candidate < best,
            Goal::MaximumModulus => candidate.abs() > best.abs(),
        }
    }
}

/// Finds the angle in `[0, 2π)` at which `value` is best according to `goal`.
///
/// The value at angle zero must be passed as `initial`, it is the reference
/// that the search has to improve on.
pub(super) fn search<T, F>(initial: T, goal: Goal, mut value: F) -> T
where
    T: RealField + Copy,
    F: FnMut(T) -> T,
{
    let half: T = convert(0.5);
    let resolution = T::two_pi() / convert(INTERVALS as f64);
    let last = INTERVALS - 1;

    let mut best = initial;
    let mut previous = initial;
    let mut current = initial;
    let mut isave = 0;
    let mut before = T::zero();
    let mut after = T::zero();

    for i in 1..=last {
        current = value(resolution * convert(i as f64));

        if goal.improves(current, best) {
            best = current;
            isave = i;
            before = previous;
        } else if i == isave + 1 {
            after = current;
        }

        previous = current;
    }

    // The samples are periodic, so the neighbours wrap around.
    if isave == 0 {
        before = current;
    }
    if isave == last {
        after = initial;
    }

    let mut step = T::zero();
    if before != after {
        let before = before - best;
        let after = after - best;
        let curvature = before + after;

        if curvature != T::zero() {
            step = half * (before - after) / curvature;
        }
    }

    resolution * (convert::<f64, T>(isave as f64) + step)
}
