//! Progress notifications and cooperative cancellation.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use nalgebra::{Dyn, OVector, RealField};

use super::StopReason;

/// Notification emitted by [`Newuoa`](super::Newuoa) during a run.
///
/// All points are in the caller's space and all values are sign-corrected,
/// that is, they are the values returned by the function even when
/// maximizing.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a, T: RealField + Copy> {
    /// The run begins. Emitted once, on the first iteration.
    #[allow(missing_docs)]
    Start {
        dimension: usize,
        interpolation_points: usize,
        rho_begin: T,
        rho_end: T,
        max_evaluations: usize,
    },
    /// The function was evaluated.
    Iteration {
        /// Evaluations made so far, including this one.
        evaluations: usize,
        /// The evaluated point.
        x: &'a OVector<T, Dyn>,
        /// The function value at `x`.
        fx: T,
        /// Best value so far, including this evaluation.
        best: T,
        /// Lower bound of the trust region radius.
        rho: T,
        /// Trust region radius.
        delta: T,
    },
    /// The run terminated. Emitted exactly once.
    #[allow(missing_docs)]
    End {
        reason: StopReason,
        evaluations: usize,
        best: T,
    },
}

/// Receiver of [`Event`]s.
///
/// Implemented for every `FnMut(&Event<T>)` closure.
pub trait Observer<T: RealField + Copy> {
    /// Receives an event.
    fn observe(&mut self, event: &Event<'_, T>);
}

impl<T, F> Observer<T> for F
where
    T: RealField + Copy,
    F: FnMut(&Event<'_, T>),
{
    fn observe(&mut self, event: &Event<'_, T>) {
        self(event)
    }
}

/// Shared flag requesting termination of a run.
///
/// The optimizer checks the flag at the beginning of every iteration, so
/// cancellation takes effect before the next function evaluation. Clones
/// share the same flag and can be sent to other threads.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a flag that is not set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Checks whether the cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(super) fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}
