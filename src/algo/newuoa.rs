//! NEWUOA: unconstrained optimization without derivatives.
//!
//! The method maintains a quadratic model of the objective that interpolates
//! its values at `npt` points. The model is minimized within a trust region
//! around the best point, and the new point replaces one of the interpolation
//! points. Since `npt` is typically much smaller than the `(n+1)(n+2)/2`
//! needed to determine a quadratic, the freedom in the model is taken up by
//! minimizing the Frobenius norm of the change of its second derivative
//! matrix. The inverse of the interpolation system is kept in a factored form
//! which is updated in `O(npt n)` operations whenever a point is replaced.
//!
//! Two radii drive the process. The trust region radius `delta` is adjusted
//! after every step according to the agreement between the model and the
//! function, while `rho` is a lower bound on `delta` that decreases
//! monotonically from `rho_begin` to `rho_end`. When the steps become too
//! short for the current `rho`, some interpolation points are moved to
//! improve the geometry of the set (model steps), and `rho` is reduced only
//! when no further progress is possible at the current resolution.
//!
//! One call of [`Optimizer::opt_next`] makes at most one function evaluation.
//! After termination, the reason is available in [`Newuoa::stop_reason`].
//!
//! # References
//!
//! \[1\] [The NEWUOA software for unconstrained optimization without
//! derivatives](https://link.springer.com/chapter/10.1007/0-387-30065-1_16)
//!
//! \[2\] [Least Frobenius norm updating of quadratic models that satisfy
//! interpolation conditions](https://link.springer.com/article/10.1007/s10107-003-0490-7)

mod alternative;
mod angle;
mod factorization;
mod initial;
mod lagrange;
mod model;
mod progress;
mod scaling;
mod subproblem;
mod update;

pub use progress::{CancelFlag, Event, Observer};

use std::fmt;

use getset::{CopyGetters, Setters};
use log::{debug, warn};
use nalgebra::{
    convert,
    storage::{Storage, StorageMut},
    ComplexField, Dyn, IsContiguous, OVector, RealField, Vector, U1,
};
use num_traits::{One, Zero};
use thiserror::Error;

use crate::core::{Domain, Function, Optimizer, Problem, ProblemError};

use factorization::InverseKkt;
use model::QuadraticModel;
use scaling::ScaledObjective;

/// Options for [`Newuoa`] optimizer.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct NewuoaOptions<P: Problem> {
    /// Initial value of `rho`, the lower bound of the trust region radius.
    /// It should be about one tenth of the greatest expected change of a
    /// (scaled) variable. Default: `5`.
    rho_begin: P::Field,
    /// Final value of `rho`, the required accuracy in the (scaled) variables.
    /// Default: `1e-3`.
    rho_end: P::Field,
    /// Maximum number of function evaluations. Default: `1000`.
    max_evaluations: usize,
    /// Number of interpolation points, from `n + 2` to `(n + 1)(n + 2) / 2`.
    /// Default: `2n + 1`.
    interpolation_points: Option<usize>,
    /// Maximize the function instead of minimizing it. Default: `false`.
    maximize: bool,
    /// Substitute [`worst_value`](NewuoaOptions::worst_value) for failed
    /// function evaluations instead of aborting. Default: `false`.
    tolerate_failures: bool,
    /// Value used in place of a failed evaluation. Default: `1e10`.
    ///
    /// The value is taken in the caller's sense, it is negated together with
    /// the function values when maximizing. A maximizing caller should
    /// therefore set a large negative value, otherwise a failed evaluation
    /// becomes the best value seen.
    worst_value: P::Field,
    /// Step quality ratio below which a trust region step counts towards
    /// switching to the least Frobenius norm model. Default: `0.01`.
    frobenius_ratio_threshold: P::Field,
    /// The switch is considered only if the squared norm of the model
    /// gradient is at least this multiple of the squared norm of the least
    /// Frobenius norm gradient. Default: `100`.
    frobenius_gradient_factor: P::Field,
    /// Number of consecutive qualifying steps that trigger the switch.
    /// Default: `3`.
    frobenius_trigger_count: usize,
}

impl<P: Problem> Default for NewuoaOptions<P> {
    fn default() -> Self {
        Self {
            rho_begin: convert(5.0),
            rho_end: convert(1e-3),
            max_evaluations: 1000,
            interpolation_points: None,
            maximize: false,
            tolerate_failures: false,
            worst_value: convert(1e10),
            frobenius_ratio_threshold: convert(0.01),
            frobenius_gradient_factor: convert(100.0),
            frobenius_trigger_count: 3,
        }
    }
}

/// Error returned from [`Newuoa`] optimizer.
#[derive(Debug, Error)]
pub enum NewuoaError {
    /// Function evaluation failed and failures are not tolerated.
    #[error("{0}")]
    Problem(#[from] ProblemError),
}

/// Reason of the termination of a [`Newuoa`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The evaluation budget was exhausted.
    MaxEvaluations,
    /// The run was cancelled through its [`CancelFlag`].
    Cancelled,
    /// The interpolation set could not be changed without breaking the
    /// model.
    ModelImprovementFailed,
    /// The model predicted no decrease for a trust region step.
    TrustRegionStepFailed,
    /// `rho` reached `rho_end` and no further progress is possible.
    FinalRadiusReached,
    /// A function evaluation failed and failures are not tolerated.
    CallbackFailed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::MaxEvaluations => "maximum number of function evaluations reached",
            StopReason::Cancelled => "optimization cancelled",
            StopReason::ModelImprovementFailed => {
                "model improvement step failed to keep the interpolation system nonsingular"
            }
            StopReason::TrustRegionStepFailed => {
                "trust region step failed to reduce the quadratic model"
            }
            StopReason::FinalRadiusReached => "final trust region radius reached",
            StopReason::CallbackFailed => "function evaluation failed",
        };

        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    TrustRegion,
    Geometry,
    ReduceRho,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Evaluating the `p`-th initial interpolation point.
    Build(usize),
    Search(Action),
}

/// Point waiting for its function value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trial {
    Initial(usize),
    TrustRegion,
    /// Model step moving the given interpolation point.
    Model(usize),
    /// Last short step at the final radius.
    Final,
}

/// NEWUOA optimizer.
///
/// See [module](self) documentation for more details.
pub struct Newuoa<P: Problem> {
    options: NewuoaOptions<P>,
    objective: ScaledObjective<P::Field>,
    npt: usize,
    rho_begin: P::Field,
    rho_end: P::Field,
    max_evaluations: usize,
    model: QuadraticModel<P::Field>,
    kkt: InverseKkt<P::Field>,
    started: bool,
    stage: Stage,
    trial: Trial,
    rho: P::Field,
    delta: P::Field,
    ratio: P::Field,
    dnorm: P::Field,
    crvmin: P::Field,
    /// Moduli of the last three errors of the model predictions.
    model_errors: [P::Field; 3],
    short_step: bool,
    frobenius_count: usize,
    /// Evaluation count at the last step longer than `rho`.
    last_long_step: usize,
    d: OVector<P::Field, Dyn>,
    xnew: OVector<P::Field, Dyn>,
    vlag: OVector<P::Field, Dyn>,
    w: OVector<P::Field, Dyn>,
    beta: P::Field,
    scratch: OVector<P::Field, Dyn>,
    grad: OVector<P::Field, Dyn>,
    trs: subproblem::Workspace<P::Field>,
    lag: lagrange::Workspace<P::Field>,
    alt: alternative::Workspace<P::Field>,
    evaluations: usize,
    stop: Option<StopReason>,
    cancel: CancelFlag,
    observer: Option<Box<dyn Observer<P::Field>>>,
}

impl<P: Problem> Newuoa<P> {
    /// Initializes NEWUOA optimizer with default options.
    pub fn new(p: &P, dom: &Domain<P::Field>) -> Self {
        Self::with_options(p, dom, NewuoaOptions::default())
    }

    /// Initializes NEWUOA optimizer with given options.
    ///
    /// Invalid options are replaced by valid values and a warning is logged.
    pub fn with_options(_: &P, dom: &Domain<P::Field>, options: NewuoaOptions<P>) -> Self {
        let n = dom.dim();
        let dim = Dyn(n);

        let scale = dom
            .scale()
            .map(|scale| OVector::from_iterator_generic(dim, U1, scale.iter().copied()))
            .unwrap_or_else(|| OVector::from_element_generic(dim, U1, P::Field::one()));

        let objective = ScaledObjective::new(
            scale,
            options.maximize,
            options.tolerate_failures,
            options.worst_value,
        );

        let npt = match options.interpolation_points {
            None => 2 * n + 1,
            Some(npt) if npt >= n + 2 && npt <= (n + 1) * (n + 2) / 2 => npt,
            Some(npt) => {
                warn!(
                    "number of interpolation points {} is not in [{}, {}], using {}",
                    npt,
                    n + 2,
                    (n + 1) * (n + 2) / 2,
                    n + 2
                );
                n + 2
            }
        };

        let rho_begin = if options.rho_begin > P::Field::zero() && options.rho_begin.is_finite()
        {
            options.rho_begin
        } else {
            let default = NewuoaOptions::<P>::default().rho_begin;
            warn!(
                "initial radius {} is not positive, using {}",
                options.rho_begin, default
            );
            default
        };

        let rho_end = if options.rho_end > rho_begin {
            warn!(
                "final radius {} exceeds the initial radius, using {}",
                options.rho_end, rho_begin
            );
            rho_begin
        } else if options.rho_end > P::Field::zero() {
            options.rho_end
        } else {
            let clamped = NewuoaOptions::<P>::default().rho_end.min(rho_begin);
            warn!(
                "final radius {} is not positive, using {}",
                options.rho_end, clamped
            );
            clamped
        };

        let max_evaluations = if options.max_evaluations == 0 {
            warn!("maximum number of evaluations is zero, using 1");
            1
        } else {
            options.max_evaluations
        };

        Self {
            options,
            objective,
            npt,
            rho_begin,
            rho_end,
            max_evaluations,
            model: QuadraticModel::new(n, npt),
            kkt: InverseKkt::new(n, npt),
            started: false,
            stage: Stage::Build(0),
            trial: Trial::Initial(0),
            rho: rho_begin,
            delta: rho_begin,
            ratio: P::Field::zero(),
            dnorm: P::Field::zero(),
            crvmin: P::Field::zero(),
            model_errors: [P::Field::zero(); 3],
            short_step: false,
            frobenius_count: 0,
            last_long_step: 0,
            d: OVector::zeros_generic(dim, U1),
            xnew: OVector::zeros_generic(dim, U1),
            vlag: OVector::zeros_generic(Dyn(npt + n), U1),
            w: OVector::zeros_generic(Dyn(npt), U1),
            beta: P::Field::zero(),
            scratch: OVector::zeros_generic(Dyn(npt + n), U1),
            grad: OVector::zeros_generic(dim, U1),
            trs: subproblem::Workspace::new(n),
            lag: lagrange::Workspace::new(n, npt),
            alt: alternative::Workspace::new(n, npt),
            evaluations: 0,
            stop: None,
            cancel: CancelFlag::new(),
            observer: None,
        }
    }

    /// Resets the internal state of the optimizer.
    ///
    /// The next call of [`opt_next`](Optimizer::opt_next) starts a new run from
    /// the point it is given. Options and the observer are kept, a requested
    /// cancellation is cleared.
    pub fn reset(&mut self) {
        let n = self.model.dim();

        self.model = QuadraticModel::new(n, self.npt);
        self.kkt = InverseKkt::new(n, self.npt);
        self.started = false;
        self.stage = Stage::Build(0);
        self.trial = Trial::Initial(0);
        self.rho = self.rho_begin;
        self.delta = self.rho_begin;
        self.ratio = P::Field::zero();
        self.dnorm = P::Field::zero();
        self.crvmin = P::Field::zero();
        self.model_errors = [P::Field::zero(); 3];
        self.short_step = false;
        self.frobenius_count = 0;
        self.last_long_step = 0;
        self.evaluations = 0;
        self.stop = None;
        self.cancel.clear();
    }

    /// Gets the options.
    pub fn options(&self) -> &NewuoaOptions<P> {
        &self.options
    }

    /// Attaches an observer that is notified about the progress.
    pub fn set_observer<O>(&mut self, observer: O)
    where
        O: Observer<P::Field> + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    /// Gets a handle to the flag that cancels the run.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Gets the reason of termination, `None` while the run continues.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Gets the number of function evaluations, including failed ones.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Gets the number of interpolation points in use.
    pub fn interpolation_points(&self) -> usize {
        self.npt
    }

    /// Gets the current lower bound of the trust region radius.
    pub fn rho(&self) -> P::Field {
        self.rho
    }

    /// Gets the current trust region radius.
    pub fn delta(&self) -> P::Field {
        self.delta
    }

    /// Gets the best function value found so far, `None` if no evaluation
    /// succeeded yet.
    pub fn best_value(&self) -> Option<P::Field> {
        if self.model.fopt.is_finite() {
            Some(self.objective.flip(self.model.fopt))
        } else {
            None
        }
    }

    /// Writes the best point found so far into `x`.
    ///
    /// Before the first successful evaluation, this is the starting point.
    pub fn best_point<Sx>(&self, x: &mut Vector<P::Field, Dyn, Sx>)
    where
        Sx: StorageMut<P::Field, Dyn>,
    {
        let best = &self.model.xbase + &self.model.xopt;
        self.objective.to_caller(&best, x);
    }

    fn emit(&mut self, event: Event<'_, P::Field>) {
        if let Some(observer) = self.observer.as_mut() {
            observer.observe(&event);
        }
    }

    fn start<Sx>(
        &mut self,
        dom: &Domain<P::Field>,
        x: &Vector<P::Field, Dyn, Sx>,
    ) -> Result<(), NewuoaError>
    where
        Sx: Storage<P::Field, Dyn>,
    {
        let n = self.model.dim();
        if x.nrows() != n || dom.dim() != n {
            return Err(ProblemError::InvalidDimensionality.into());
        }

        self.objective.to_internal(x, &mut self.model.xbase);
        self.model.fopt = convert(f64::INFINITY);
        self.started = true;

        debug!(
            "starting with n = {}, npt = {}, rho_begin = {}, rho_end = {}, max_evaluations = {}",
            n, self.npt, self.rho_begin, self.rho_end, self.max_evaluations
        );

        self.emit(Event::Start {
            dimension: n,
            interpolation_points: self.npt,
            rho_begin: self.rho_begin,
            rho_end: self.rho_end,
            max_evaluations: self.max_evaluations,
        });

        Ok(())
    }

    fn terminate<Sx>(&mut self, reason: StopReason, x: &mut Vector<P::Field, Dyn, Sx>) -> P::Field
    where
        Sx: StorageMut<P::Field, Dyn>,
    {
        self.stop = Some(reason);
        self.best_point(x);

        let best = self.objective.flip(self.model.fopt);
        debug!(
            "terminated after {} evaluations with best value {}: {}",
            self.evaluations, best, reason
        );

        self.emit(Event::End {
            reason,
            evaluations: self.evaluations,
            best,
        });

        best
    }

    /// Prepares the next point to evaluate into `xnew`.
    fn plan(&mut self) -> Result<(), StopReason> {
        let half: P::Field = convert(0.5);
        let tenth: P::Field = convert(0.1);
        let eighth: P::Field = convert(0.125);
        let near: P::Field = convert(1.5);
        let four: P::Field = convert(4.0);

        loop {
            match self.stage {
                Stage::Build(p) => {
                    initial::place_point(&mut self.model, p, self.rho_begin);
                    for i in 0..self.model.dim() {
                        self.xnew[i] = self.model.xpt[(p, i)];
                    }

                    self.trial = Trial::Initial(p);
                    return Ok(());
                }
                Stage::Search(Action::TrustRegion) => {
                    self.short_step = false;
                    self.crvmin =
                        subproblem::solve(&self.model, self.delta, &mut self.d, &mut self.trs);

                    let dsq = self.d.norm_squared();
                    self.dnorm = dsq.sqrt().min(self.delta);

                    if self.dnorm >= half * self.rho {
                        return self.prepare(Trial::TrustRegion, dsq);
                    }

                    // The step is too short to be worth an evaluation.
                    self.short_step = true;
                    self.delta *= tenth;
                    self.ratio = -P::Field::one();
                    if self.delta <= near * self.rho {
                        self.delta = self.rho;
                    }

                    let [e1, e2, e3] = self.model_errors;
                    let error = e1.max(e2).max(e3);
                    let bound = eighth * self.crvmin * self.rho * self.rho;

                    self.stage = if self.evaluations <= self.last_long_step + 2 || bound <= error {
                        Stage::Search(Action::Geometry)
                    } else {
                        Stage::Search(Action::ReduceRho)
                    };
                }
                Stage::Search(Action::Geometry) => {
                    let mut farthest = None;
                    let mut distsq = four * self.delta * self.delta;
                    for k in 0..self.npt {
                        let dist = self.model.distance_sq(k);
                        if dist > distsq {
                            distsq = dist;
                            farthest = Some(k);
                        }
                    }

                    if let Some(k) = farthest {
                        self.short_step = false;
                        let dstep = (tenth * distsq.sqrt()).min(half * self.delta).max(self.rho);
                        return self.prepare(Trial::Model(k), dstep * dstep);
                    }

                    self.stage = if self.ratio > P::Field::zero() || self.delta.max(self.dnorm) > self.rho
                    {
                        Stage::Search(Action::TrustRegion)
                    } else {
                        Stage::Search(Action::ReduceRho)
                    };
                }
                Stage::Search(Action::ReduceRho) => {
                    if self.rho > self.rho_end {
                        self.reduce_rho();
                        self.stage = Stage::Search(Action::TrustRegion);
                    } else if self.short_step {
                        self.xnew.copy_from(&self.model.xopt);
                        self.xnew += &self.d;
                        self.trial = Trial::Final;
                        return Ok(());
                    } else {
                        return Err(StopReason::FinalRadiusReached);
                    }
                }
            }
        }
    }

    /// Computes everything the update needs for the step `d` of squared
    /// length `dsq` and sets `xnew`.
    ///
    /// For model steps, the step itself is computed here.
    fn prepare(&mut self, trial: Trial, dsq: P::Field) -> Result<(), StopReason> {
        let shift_tol: P::Field = convert(1e-3);
        let fragile: P::Field = convert(0.8);

        if dsq <= shift_tol * self.model.xopt.norm_squared() {
            debug!("shifting the base point to the best point");
            self.model.shift_base(&mut self.kkt);
        }

        let mut alpha = P::Field::zero();
        if let Trial::Model(k) = trial {
            alpha = lagrange::select(
                &self.model,
                &self.kkt,
                k,
                dsq.sqrt(),
                &mut self.d,
                &mut self.lag,
            );
        }

        self.beta = self
            .kkt
            .lagrange_values(&self.model, &self.d, dsq, &mut self.vlag, &mut self.w);

        if let Trial::Model(k) = trial {
            let tau = self.vlag[k];
            if (P::Field::one() + alpha * self.beta / (tau * tau)).abs() <= fragile {
                debug!("denominator of the update is small, using the alternative step");
                self.beta = alternative::select(
                    &self.model,
                    &self.kkt,
                    k,
                    &mut self.d,
                    &mut self.vlag,
                    &mut self.w,
                    &mut self.alt,
                );
            }
        }

        if !self.d.iter().all(|di| di.is_finite()) {
            return Err(StopReason::ModelImprovementFailed);
        }

        self.xnew.copy_from(&self.model.xopt);
        self.xnew += &self.d;
        self.trial = trial;

        Ok(())
    }

    fn reduce_rho(&mut self) {
        let half: P::Field = convert(0.5);
        let tenth: P::Field = convert(0.1);

        self.delta = half * self.rho;

        let ratio = self.rho / self.rho_end;
        self.rho = if ratio <= convert(16.0) {
            self.rho_end
        } else if ratio <= convert(250.0) {
            ratio.sqrt() * self.rho_end
        } else {
            tenth * self.rho
        };
        self.delta = self.delta.max(self.rho);
        self.last_long_step = self.evaluations;

        debug!(
            "reduced rho to {} after {} evaluations, best value {}",
            self.rho,
            self.evaluations,
            self.objective.flip(self.model.fopt)
        );
    }

    /// Adjusts the trust region radius after a trust region step.
    fn update_radius(&mut self) {
        let half: P::Field = convert(0.5);
        let two: P::Field = convert(2.0);
        let near: P::Field = convert(1.5);

        self.delta = if self.ratio <= convert(0.1) {
            half * self.dnorm
        } else if self.ratio <= convert(0.7) {
            (half * self.delta).max(self.dnorm)
        } else {
            (half * self.delta).max(two * self.dnorm)
        };

        if self.delta <= near * self.rho {
            self.delta = self.rho;
        }
    }

    /// Chooses the interpolation point to be replaced by a trust region step.
    ///
    /// Points far from the best point are preferred. The best point itself
    /// is kept if the step did not improve on it.
    fn replacement(&self, keep_best: bool) -> Option<usize> {
        let tenth: P::Field = convert(0.1);

        let rsq = (tenth * self.delta).max(self.rho).powi(2);
        let (kept, mut detrat) = if keep_best {
            (Some(self.model.kopt), P::Field::one())
        } else {
            (None, P::Field::zero())
        };

        let mut knew = None;
        for k in 0..self.npt {
            let hdiag = self.kkt.omega_diagonal(k);
            let mut temp = (self.beta * hdiag + self.vlag[k] * self.vlag[k]).abs();

            let distsq = self.model.distance_sq(k);
            if distsq > rsq {
                let r = distsq / rsq;
                temp *= r * r * r;
            }

            if temp > detrat && Some(k) != kept {
                detrat = temp;
                knew = Some(k);
            }
        }

        knew
    }

    /// Incorporates the value `f` of the pending trial point.
    fn absorb(&mut self, f: P::Field) -> Result<(), StopReason> {
        let tenth: P::Field = convert(0.1);

        let moved = match self.trial {
            Trial::Initial(p) => {
                initial::absorb_value(&mut self.model, &mut self.kkt, p, f, self.rho_begin);

                if p + 1 < self.npt {
                    self.stage = Stage::Build(p + 1);
                } else {
                    self.last_long_step = self.evaluations;
                    self.stage = Stage::Search(Action::TrustRegion);
                }

                return Ok(());
            }
            Trial::Final => {
                if f < self.model.fopt {
                    self.model.record_best(&self.xnew, f);
                }

                return Err(StopReason::FinalRadiusReached);
            }
            Trial::TrustRegion => None,
            Trial::Model(k) => Some(k),
        };

        let vquad = self.model.predicted_change(&self.d, &self.xnew, &self.w);
        let diff = f - self.model.fopt - vquad;
        self.model_errors = [diff.abs(), self.model_errors[0], self.model_errors[1]];
        if self.dnorm > self.rho {
            self.last_long_step = self.evaluations;
        }

        let fsave = self.model.fopt;
        if f < fsave {
            self.model.record_best(&self.xnew, f);
        }

        let knew = match moved {
            Some(k) => k,
            None => {
                if vquad >= P::Field::zero() {
                    return Err(StopReason::TrustRegionStepFailed);
                }

                self.ratio = (f - fsave) / vquad;
                self.update_radius();

                match self.replacement(f >= fsave) {
                    Some(k) => k,
                    None => {
                        self.stage = Stage::Search(Action::Geometry);
                        return Ok(());
                    }
                }
            }
        };

        self.kkt
            .update(&mut self.vlag, self.beta, knew, &mut self.scratch)
            .map_err(|_| StopReason::ModelImprovementFailed)?;
        self.model
            .replace_point(knew, f, diff, &self.xnew, &self.kkt);

        if moved.is_none() && self.delta == self.rho {
            self.consider_least_frobenius();
        }

        if f < fsave {
            self.model.kopt = knew;
        }

        self.stage = if moved.is_some() || f <= fsave + tenth * vquad {
            Stage::Search(Action::TrustRegion)
        } else {
            Stage::Search(Action::Geometry)
        };

        Ok(())
    }

    /// Replaces the model by the least Frobenius norm interpolant if the
    /// current one repeatedly predicted badly while its gradient is large.
    fn consider_least_frobenius(&mut self) {
        if self.ratio.abs() > self.options.frobenius_ratio_threshold {
            self.frobenius_count = 0;
            return;
        }

        let gisq = self
            .model
            .least_frobenius_gradient(&self.kkt, &mut self.scratch, &mut self.grad);
        self.frobenius_count += 1;

        if self.model.gq.norm_squared() < self.options.frobenius_gradient_factor * gisq {
            self.frobenius_count = 0;
        }

        if self.frobenius_count >= self.options.frobenius_trigger_count {
            debug!("switching to the least Frobenius norm model");
            self.model
                .adopt_least_frobenius(&self.kkt, &self.scratch, &self.grad);
            self.frobenius_count = 0;
        }
    }
}

impl<F: Function> Newuoa<F> {
    fn next_inner<Sx>(
        &mut self,
        f: &F,
        dom: &Domain<F::Field>,
        x: &mut Vector<F::Field, Dyn, Sx>,
    ) -> Result<F::Field, NewuoaError>
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
    {
        if !self.started {
            self.start(dom, x)?;
        }

        if self.stop.is_some() {
            self.best_point(x);
            return Ok(self.objective.flip(self.model.fopt));
        }

        if self.cancel.is_cancelled() {
            return Ok(self.terminate(StopReason::Cancelled, x));
        }

        if let Err(reason) = self.plan() {
            return Ok(self.terminate(reason, x));
        }

        if self.evaluations >= self.max_evaluations {
            return Ok(self.terminate(StopReason::MaxEvaluations, x));
        }

        self.evaluate_trial(f, x)
    }

    /// Evaluates the planned trial point and incorporates its value.
    fn evaluate_trial<Sx>(
        &mut self,
        f: &F,
        x: &mut Vector<F::Field, Dyn, Sx>,
    ) -> Result<F::Field, NewuoaError>
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
    {
        let point = &self.model.xbase + &self.xnew;
        self.objective.to_caller(&point, x);

        let fx = match self.objective.evaluate(f, x) {
            Ok(fx) => fx,
            Err(error) => {
                self.evaluations += 1;
                self.terminate(StopReason::CallbackFailed, x);
                return Err(error.into());
            }
        };
        self.evaluations += 1;

        if let Some(observer) = self.observer.as_mut() {
            let evaluated = x.clone_owned();
            observer.observe(&Event::Iteration {
                evaluations: self.evaluations,
                x: &evaluated,
                fx: self.objective.flip(fx),
                best: self.objective.flip(self.model.fopt.min(fx)),
                rho: self.rho,
                delta: self.delta,
            });
        }

        match self.absorb(fx) {
            Ok(()) => Ok(self.objective.flip(fx)),
            Err(reason) => Ok(self.terminate(reason, x)),
        }
    }
}

impl<F: Function> Optimizer<F> for Newuoa<F> {
    const NAME: &'static str = "NEWUOA";

    type Error = NewuoaError;

    fn opt_next<Sx>(
        &mut self,
        f: &F,
        dom: &Domain<F::Field>,
        x: &mut Vector<F::Field, Dyn, Sx>,
    ) -> Result<F::Field, Self::Error>
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
    {
        self.next_inner(f, dom, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{cell::RefCell, rc::Rc};

    use approx::assert_abs_diff_eq;
    use nalgebra::{dvector, DVector};

    use crate::testing::*;

    fn with<P: Problem>(configure: impl FnOnce(&mut NewuoaOptions<P>)) -> NewuoaOptions<P> {
        let mut options = NewuoaOptions::default();
        configure(&mut options);
        options
    }

    /// Records every event as an owned value.
    #[derive(Debug, Clone, PartialEq)]
    enum Recorded {
        Start,
        Iteration(DVector<f64>, f64, f64),
        End(StopReason, usize, f64),
    }

    fn record(optimizer: &mut Newuoa<impl Problem<Field = f64>>) -> Rc<RefCell<Vec<Recorded>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);

        optimizer.set_observer(move |event: &Event<'_, f64>| {
            let recorded = match event {
                Event::Start { .. } => Recorded::Start,
                Event::Iteration { x, fx, best, .. } => {
                    Recorded::Iteration((*x).clone(), *fx, *best)
                }
                Event::End {
                    reason,
                    evaluations,
                    best,
                } => Recorded::End(*reason, *evaluations, *best),
            };
            sink.borrow_mut().push(recorded);
        });

        events
    }

    struct Dome;

    impl Problem for Dome {
        type Field = f64;

        fn domain(&self) -> Domain<Self::Field> {
            Domain::unconstrained(2)
        }
    }

    impl Function for Dome {
        fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
        where
            Sx: Storage<f64, Dyn> + IsContiguous,
        {
            Ok(4.0 - (x[0] - 1.0).powi(2) - 2.0 * (x[1] + 2.0).powi(2))
        }
    }

    #[test]
    fn sphere_from_corner() {
        let f = Sphere::new(2);
        let dom = f.domain();
        let options = with(|o| {
            o.set_rho_begin(0.5).set_rho_end(1e-6).set_max_evaluations(200);
        });

        let mut optimizer = Newuoa::with_options(&f, &dom, options);
        let (x, fx) = optimize(&f, &dom, &mut optimizer, dvector![1.0, 1.0], 1000).unwrap();

        assert_eq!(optimizer.stop_reason(), Some(StopReason::FinalRadiusReached));
        assert!(optimizer.evaluations() <= 200);
        assert_abs_diff_eq!(x, dvector![0.0, 0.0], epsilon = 1e-5);
        assert_abs_diff_eq!(fx, 0.0, epsilon = 1e-10);
        assert!(f.is_optimum(&x, 1e-5));
    }

    #[test]
    fn univariate_parabola() {
        let f = ShiftedParabola::new(1, 3.0, 10.0);
        let dom = f.domain();
        let options = with(|o| {
            o.set_rho_begin(1.0).set_rho_end(1e-4);
        });

        let mut optimizer = Newuoa::with_options(&f, &dom, options);
        let (x, fx) = optimize(&f, &dom, &mut optimizer, dvector![0.0], 1000).unwrap();

        assert_eq!(optimizer.interpolation_points(), 3);
        assert_abs_diff_eq!(x[0], 3.0, epsilon = 1e-3);
        assert_abs_diff_eq!(fx, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn failing_function_is_tolerated() {
        let f = AlwaysFailing::new(2);
        let dom = f.domain();
        let options = with(|o| {
            o.set_tolerate_failures(true).set_worst_value(1e10);
        });

        let mut optimizer = Newuoa::with_options(&f, &dom, options);
        let (x, fx) = optimize(&f, &dom, &mut optimizer, dvector![1.0, 2.0], 2000).unwrap();

        // All values are equal, the model stays flat and the radius shrinks
        // without ever using up the budget.
        assert_eq!(optimizer.stop_reason(), Some(StopReason::FinalRadiusReached));
        assert!(optimizer.evaluations() < 1000);
        assert_eq!(fx, 1e10);
        assert_eq!(optimizer.best_value(), Some(1e10));
        assert!(x.iter().all(|xi| xi.is_finite()));
    }

    #[test]
    fn failing_function_exhausts_small_budget() {
        let f = AlwaysFailing::new(2);
        let dom = f.domain();
        let options = with(|o| {
            o.set_tolerate_failures(true)
                .set_worst_value(1e10)
                .set_max_evaluations(10);
        });

        let mut optimizer = Newuoa::with_options(&f, &dom, options);
        let (x, fx) = optimize(&f, &dom, &mut optimizer, dvector![1.0, 2.0], 100).unwrap();

        assert_eq!(optimizer.stop_reason(), Some(StopReason::MaxEvaluations));
        assert_eq!(optimizer.evaluations(), 10);
        assert_eq!(fx, 1e10);
        assert!(x.iter().all(|xi| xi.is_finite()));
    }

    #[test]
    fn failure_propagates() {
        let f = AlwaysFailing::new(2);
        let dom = f.domain();

        let mut optimizer = Newuoa::new(&f, &dom);
        let events = record(&mut optimizer);
        let mut x = dvector![1.0, 2.0];

        assert!(matches!(
            optimizer.opt_next(&f, &dom, &mut x),
            Err(NewuoaError::Problem(ProblemError::Custom(_)))
        ));
        assert_eq!(optimizer.stop_reason(), Some(StopReason::CallbackFailed));
        assert_eq!(x, dvector![1.0, 2.0]);
        assert_eq!(optimizer.best_value(), None);

        // No more evaluations after termination.
        optimizer.opt_next(&f, &dom, &mut x).unwrap();
        assert_eq!(optimizer.evaluations(), 1);

        let events = events.borrow();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Recorded::Start);
        assert!(matches!(
            events[1],
            Recorded::End(StopReason::CallbackFailed, 1, _)
        ));
    }

    #[test]
    fn best_value_is_monotone() {
        let f = ExtendedRosenbrock::new(2);
        let dom = f.domain();
        let options = with(|o| {
            o.set_rho_begin(0.5).set_rho_end(1e-5);
        });

        let mut optimizer = Newuoa::with_options(&f, &dom, options);
        let events = record(&mut optimizer);
        optimize(&f, &dom, &mut optimizer, dvector![-1.2, 1.0], 2000).unwrap();

        let bests = events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Recorded::Iteration(_, _, best) => Some(*best),
                _ => None,
            })
            .collect::<Vec<_>>();

        assert_eq!(bests.len(), optimizer.evaluations());
        assert!(bests.windows(2).all(|pair| pair[1] <= pair[0]));
    }

    #[test]
    fn rosenbrock() {
        let f = ExtendedRosenbrock::new(2);
        let dom = f.domain();
        let options = with(|o| {
            o.set_rho_begin(0.5).set_rho_end(1e-7).set_max_evaluations(5000);
        });

        for x in f.initials() {
            let mut optimizer = Newuoa::with_options(&f, &dom, options.clone());
            let (x, _) = optimize(&f, &dom, &mut optimizer, x, 10000).unwrap();
            assert!(f.is_optimum(&x, 1e-4));
        }
    }

    #[test]
    fn runs_are_deterministic() {
        let f = ExtendedRosenbrock::new(4);
        let dom = f.domain();
        let options = with(|o| {
            o.set_rho_begin(0.5).set_rho_end(1e-4);
        });

        let run = || {
            let mut optimizer = Newuoa::with_options(&f, &dom, options.clone());
            let events = record(&mut optimizer);
            let x0 = f.initials().remove(0);
            optimize(&f, &dom, &mut optimizer, x0, 5000).unwrap();
            let recorded = events.borrow().clone();
            recorded
        };

        let first = run();
        let second = run();

        assert!(first.len() > 10);
        assert_eq!(first, second);
    }

    #[test]
    fn scaling_does_not_change_the_result() {
        let x0 = dvector![3.0, -2.0, 0.5];
        let scale = vec![10.0, 0.1, 2.0];
        let options = with(|o| {
            o.set_rho_begin(0.5).set_rho_end(1e-6);
        });

        let plain = ScaledSphere::new(vec![1.0; 3]);
        let dom = plain.domain();
        let mut optimizer = Newuoa::with_options(&plain, &dom, options.clone());
        let (x, _) = optimize(&plain, &dom, &mut optimizer, x0.clone(), 2000).unwrap();

        let scaled = ScaledSphere::new(scale.clone());
        let dom = scaled.domain();
        let y0 = x0.zip_map(&DVector::from_vec(scale.clone()), |xi, si| xi / si);
        let mut optimizer = Newuoa::with_options(&scaled, &dom, options);
        let (y, _) = optimize(&scaled, &dom, &mut optimizer, y0, 2000).unwrap();

        let x_from_y = y.zip_map(&DVector::from_vec(scale), |yi, si| yi * si);
        assert_abs_diff_eq!(x, x_from_y, epsilon = 1e-5);
        assert!(scaled.is_optimum(&y, 1e-5));
    }

    #[test]
    fn quadratic_is_recovered_exactly() {
        let n = 3;
        let f = RandomQuadratic::new(n, 42);
        let dom = f.domain();
        let options = with(|o| {
            o.set_rho_begin(1.0)
                .set_rho_end(1e-6)
                .set_interpolation_points(Some((n + 1) * (n + 2) / 2));
        });

        let mut optimizer = Newuoa::with_options(&f, &dom, options);
        let x0 = f.initials().remove(0);
        let (x, _) = optimize(&f, &dom, &mut optimizer, x0, 2000).unwrap();

        assert_abs_diff_eq!(x, f.optima().remove(0), epsilon = 1e-6);
    }

    /// Runs the optimizer on the extended Rosenbrock function and checks the
    /// interpolation conditions of the model and of the Lagrange functions
    /// after every step.
    fn check_interpolation(n: usize, npt: usize, model_tol: f64, lagrange_tol: f64) {
        let f = ExtendedRosenbrock::new(n);
        let dom = f.domain();
        let options = with(|o| {
            o.set_rho_begin(0.5)
                .set_rho_end(1e-6)
                .set_max_evaluations(400)
                .set_interpolation_points(Some(npt));
        });

        let optimizer = Newuoa::with_options(&f, &dom, options);
        let x0 = f.initials()[0].clone_owned();

        let mut d = DVector::zeros(n);
        let mut vlag = DVector::zeros(npt + n);
        let mut w = DVector::zeros(npt + n);
        let mut checked = 0;

        iter(
            &f,
            &dom,
            optimizer,
            x0,
            400,
            |optimizer: &Newuoa<ExtendedRosenbrock>, _, _, step| {
                if !matches!(optimizer.stage, Stage::Search(_)) || optimizer.stop.is_some() {
                    return;
                }

                let model = &optimizer.model;
                let kopt = model.kopt;
                let qopt = model.value(&model.xpt.row(kopt).transpose());
                let magnitude = model
                    .fval
                    .iter()
                    .fold(1.0f64, |acc, fk| acc.max((fk - model.fval[kopt]).abs()));

                for k in 0..npt {
                    let q = model.value(&model.xpt.row(k).transpose()) - qopt;
                    let expected = model.fval[k] - model.fval[kopt];
                    assert_abs_diff_eq!(q, expected, epsilon = model_tol * magnitude);
                }

                if step % 10 == 0 {
                    for k in 0..npt {
                        for i in 0..n {
                            d[i] = model.xpt[(k, i)] - model.xopt[i];
                        }
                        let dsq = d.norm_squared();
                        optimizer
                            .kkt
                            .lagrange_values(model, &d, dsq, &mut vlag, &mut w);

                        for j in 0..npt {
                            let expected = if j == k { 1.0 } else { 0.0 };
                            assert_abs_diff_eq!(vlag[j], expected, epsilon = lagrange_tol);
                        }
                    }
                }

                checked += 1;
            },
        )
        .unwrap();

        assert!(checked > 0);
    }

    #[test]
    fn model_interpolates_after_every_step() {
        for n in [2, 4, 6] {
            check_interpolation(n, n + 2, 1e-8, 1e-5);
            check_interpolation(n, 2 * n + 1, 1e-8, 1e-5);
        }
    }

    #[test]
    fn model_interpolates_with_full_quadratic_set() {
        // Rounding errors of the updated factorization accumulate faster when
        // the interpolation points determine the quadratic completely.
        for n in [2, 4, 6] {
            check_interpolation(n, (n + 1) * (n + 2) / 2, 1e-5, 1e-2);
        }
    }

    #[test]
    fn cancellation_stops_before_next_evaluation() {
        let f = Sphere::new(3);
        let dom = f.domain();

        let mut optimizer = Newuoa::new(&f, &dom);
        let flag = optimizer.cancel_flag();
        optimizer.set_observer(move |event: &Event<'_, f64>| {
            if let Event::Iteration { evaluations: 5, .. } = event {
                flag.cancel();
            }
        });

        let (_, fx) = optimize(&f, &dom, &mut optimizer, dvector![1.0, 2.0, 3.0], 100).unwrap();

        assert_eq!(optimizer.stop_reason(), Some(StopReason::Cancelled));
        assert_eq!(optimizer.evaluations(), 5);
        assert_eq!(Some(fx), optimizer.best_value());
    }

    #[test]
    fn reset_starts_a_new_run() {
        let f = Sphere::new(2);
        let dom = f.domain();
        let options = with(|o| {
            o.set_rho_begin(0.5).set_rho_end(1e-4);
        });

        let mut optimizer = Newuoa::with_options(&f, &dom, options);
        optimizer.cancel_flag().cancel();
        optimize(&f, &dom, &mut optimizer, dvector![1.0, -1.0], 100).unwrap();
        assert_eq!(optimizer.stop_reason(), Some(StopReason::Cancelled));
        assert_eq!(optimizer.evaluations(), 0);

        optimizer.reset();
        let (x, _) = optimize(&f, &dom, &mut optimizer, dvector![1.0, -1.0], 1000).unwrap();

        assert_eq!(optimizer.stop_reason(), Some(StopReason::FinalRadiusReached));
        assert_abs_diff_eq!(x, dvector![0.0, 0.0], epsilon = 1e-3);
    }

    #[test]
    fn maximization() {
        let f = Dome;
        let dom = f.domain();
        let options = with(|o| {
            o.set_maximize(true).set_rho_begin(0.5).set_rho_end(1e-6);
        });

        let mut optimizer = Newuoa::with_options(&f, &dom, options);
        let events = record(&mut optimizer);
        let (x, fx) = optimize(&f, &dom, &mut optimizer, dvector![0.0, 0.0], 1000).unwrap();

        assert_abs_diff_eq!(x, dvector![1.0, -2.0], epsilon = 1e-5);
        assert_abs_diff_eq!(fx, 4.0, epsilon = 1e-9);
        assert_eq!(optimizer.best_value(), Some(fx));

        let bests = events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Recorded::Iteration(_, _, best) => Some(*best),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert!(bests.windows(2).all(|pair| pair[1] >= pair[0]));
    }

    /// Builds the initial model of the sphere, the next call plans a trust
    /// region step.
    fn built_sphere(
        f: &Sphere,
        dom: &Domain<f64>,
        x: &mut DVector<f64>,
    ) -> (Newuoa<Sphere>, Rc<RefCell<Vec<Recorded>>>) {
        let options = with(|o| {
            o.set_rho_begin(0.5).set_rho_end(1e-6);
        });
        let mut optimizer = Newuoa::with_options(f, dom, options);
        let events = record(&mut optimizer);

        for _ in 0..optimizer.interpolation_points() {
            optimizer.opt_next(f, dom, x).unwrap();
        }
        assert!(matches!(
            optimizer.stage,
            Stage::Search(Action::TrustRegion)
        ));

        (optimizer, events)
    }

    /// Checks that a fatal stop returned the best point and value and
    /// notified the end exactly once, also on the calls after it.
    fn assert_fatal_stop(
        f: &Sphere,
        dom: &Domain<f64>,
        optimizer: &mut Newuoa<Sphere>,
        events: &Rc<RefCell<Vec<Recorded>>>,
        x: &mut DVector<f64>,
        fx: f64,
        reason: StopReason,
    ) {
        assert_eq!(optimizer.stop_reason(), Some(reason));

        let best = optimizer.best_value().unwrap();
        let mut xbest = DVector::zeros(2);
        optimizer.best_point(&mut xbest);
        assert_eq!(fx, best);
        assert_eq!(*x, xbest);
        assert_abs_diff_eq!(f.apply(&*x).unwrap(), best, epsilon = 1e-12);

        let evaluations = optimizer.evaluations();
        let ends = |events: &Rc<RefCell<Vec<Recorded>>>| {
            events
                .borrow()
                .iter()
                .filter(|event| matches!(event, Recorded::End(..)))
                .count()
        };
        assert_eq!(ends(events), 1);
        assert_eq!(
            events.borrow().last(),
            Some(&Recorded::End(reason, evaluations, best))
        );

        let recorded = events.borrow().len();
        assert_eq!(optimizer.opt_next(f, dom, x).unwrap(), best);
        assert_eq!(*x, xbest);
        assert_eq!(optimizer.evaluations(), evaluations);
        assert_eq!(events.borrow().len(), recorded);
    }

    #[test]
    fn trust_region_step_without_model_decrease() {
        let f = Sphere::new(2);
        let dom = f.domain();
        let mut x = dvector![1.0, 1.0];
        let (mut optimizer, events) = built_sphere(&f, &dom, &mut x);

        optimizer.plan().unwrap();
        assert!(matches!(optimizer.trial, Trial::TrustRegion));

        // The inverted model predicts an increase along the planned step.
        optimizer.model.gq.neg_mut();
        optimizer.model.hq.neg_mut();
        optimizer.model.pq.neg_mut();

        let fx = optimizer.evaluate_trial(&f, &mut x).unwrap();
        assert_fatal_stop(
            &f,
            &dom,
            &mut optimizer,
            &events,
            &mut x,
            fx,
            StopReason::TrustRegionStepFailed,
        );
    }

    #[test]
    fn non_finite_step_stops_the_run() {
        let f = Sphere::new(2);
        let dom = f.domain();
        let mut x = dvector![1.0, 1.0];
        let (mut optimizer, events) = built_sphere(&f, &dom, &mut x);
        let evaluations = optimizer.evaluations();

        optimizer.model.gq[0] = f64::NAN;

        let fx = optimizer.opt_next(&f, &dom, &mut x).unwrap();
        assert_eq!(optimizer.evaluations(), evaluations);
        assert_fatal_stop(
            &f,
            &dom,
            &mut optimizer,
            &events,
            &mut x,
            fx,
            StopReason::ModelImprovementFailed,
        );
    }

    #[test]
    fn vanishing_update_denominator_stops_the_run() {
        let f = Sphere::new(2);
        let dom = f.domain();
        let mut x = dvector![1.0, 1.0];
        let (mut optimizer, events) = built_sphere(&f, &dom, &mut x);

        // All interpolation points are far from the best point relative to
        // the reduced radius, so a model step is planned.
        optimizer.rho = 0.1;
        optimizer.delta = 0.1;
        optimizer.stage = Stage::Search(Action::Geometry);
        optimizer.plan().unwrap();
        assert!(matches!(optimizer.trial, Trial::Model(_)));

        optimizer.vlag.fill(0.0);
        optimizer.beta = 0.0;

        let fx = optimizer.evaluate_trial(&f, &mut x).unwrap();
        assert_fatal_stop(
            &f,
            &dom,
            &mut optimizer,
            &events,
            &mut x,
            fx,
            StopReason::ModelImprovementFailed,
        );
    }

    /// The dome with a region where the evaluation fails.
    struct FencedDome;

    impl Problem for FencedDome {
        type Field = f64;

        fn domain(&self) -> Domain<Self::Field> {
            Domain::unconstrained(2)
        }
    }

    impl Function for FencedDome {
        fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
        where
            Sx: Storage<f64, Dyn> + IsContiguous,
        {
            if x[0] > 2.0 {
                Err(ProblemError::InvalidValue)
            } else {
                Dome.apply(x)
            }
        }
    }

    #[test]
    fn worst_value_is_in_callers_sense_when_maximizing() {
        let f = FencedDome;
        let dom = f.domain();
        let fenced = |worst: f64| {
            with(|o| {
                o.set_maximize(true)
                    .set_tolerate_failures(true)
                    .set_worst_value(worst)
                    .set_rho_begin(1.0)
                    .set_max_evaluations(50);
            })
        };

        // The second initial point lies in the failing region.
        let mut optimizer = Newuoa::with_options(&f, &dom, fenced(1e10));
        optimize(&f, &dom, &mut optimizer, dvector![1.5, 0.0], 100).unwrap();
        assert_eq!(optimizer.best_value(), Some(1e10));

        let mut optimizer = Newuoa::with_options(&f, &dom, fenced(-1e10));
        optimize(&f, &dom, &mut optimizer, dvector![1.5, 0.0], 100).unwrap();
        let best = optimizer.best_value().unwrap();
        assert!(best >= -4.25 && best <= 4.0);
    }

    #[test]
    fn budget_exhausted_while_building_the_model() {
        let f = Sphere::new(3);
        let dom = f.domain();
        let options = with(|o| {
            o.set_rho_begin(1.0).set_max_evaluations(3);
        });

        let mut optimizer = Newuoa::with_options(&f, &dom, options);
        let (x, fx) = optimize(&f, &dom, &mut optimizer, dvector![1.0, 1.0, 1.0], 100).unwrap();

        assert_eq!(optimizer.stop_reason(), Some(StopReason::MaxEvaluations));
        assert_eq!(optimizer.evaluations(), 3);
        // Both displaced points are worse than the start.
        assert_eq!(x, dvector![1.0, 1.0, 1.0]);
        assert_eq!(fx, 3.0);
    }

    #[test]
    fn event_order() {
        let f = Sphere::new(2);
        let dom = f.domain();
        let options = with(|o| {
            o.set_rho_begin(0.5).set_rho_end(1e-3);
        });

        let mut optimizer = Newuoa::with_options(&f, &dom, options);
        let events = record(&mut optimizer);
        let (_, fx) = optimize(&f, &dom, &mut optimizer, dvector![1.0, 1.0], 1000).unwrap();

        // Calls after termination do not emit anything.
        let mut x = dvector![0.0, 0.0];
        optimizer.opt_next(&f, &dom, &mut x).unwrap();

        let events = events.borrow();
        let iterations = events
            .iter()
            .filter(|event| matches!(event, Recorded::Iteration(..)))
            .count();

        assert_eq!(events.first(), Some(&Recorded::Start));
        assert_eq!(iterations, optimizer.evaluations());
        assert_eq!(events.len(), iterations + 2);
        assert_eq!(
            events.last(),
            Some(&Recorded::End(
                StopReason::FinalRadiusReached,
                optimizer.evaluations(),
                fx
            ))
        );
    }

    #[test]
    fn invalid_options_are_clamped() {
        let f = Sphere::new(2);
        let dom = f.domain();

        let optimizer = Newuoa::new(&f, &dom);
        assert_eq!(optimizer.interpolation_points(), 5);

        for npt in [3, 7] {
            let options = with(|o| {
                o.set_interpolation_points(Some(npt));
            });
            let optimizer = Newuoa::with_options(&f, &dom, options);
            assert_eq!(optimizer.interpolation_points(), 4);
        }

        let options = with(|o| {
            o.set_interpolation_points(Some(6))
                .set_rho_begin(-1.0)
                .set_rho_end(10.0)
                .set_max_evaluations(0);
        });
        let optimizer = Newuoa::with_options(&f, &dom, options);
        assert_eq!(optimizer.interpolation_points(), 6);
        assert_eq!(optimizer.rho_begin, 5.0);
        assert_eq!(optimizer.rho_end, 5.0);
        assert_eq!(optimizer.max_evaluations, 1);

        let options = with(|o| {
            o.set_rho_begin(1e-4).set_rho_end(0.0);
        });
        let optimizer = Newuoa::with_options(&f, &dom, options);
        assert_eq!(optimizer.rho_end, 1e-4);
    }

    #[test]
    fn fewest_interpolation_points() {
        let f = ExtendedRosenbrock::new(4);
        let dom = f.domain();
        let options = with(|o| {
            o.set_rho_begin(0.5)
                .set_rho_end(1e-6)
                .set_max_evaluations(10000)
                .set_interpolation_points(Some(6));
        });

        let mut optimizer = Newuoa::with_options(&f, &dom, options);
        let x0 = f.initials().remove(0);
        let (x, _) = optimize(&f, &dom, &mut optimizer, x0, 20000).unwrap();

        assert!(f.is_optimum(&x, 1e-3));
    }

    #[test]
    fn dimension_mismatch() {
        let f = Sphere::new(2);
        let dom = f.domain();

        let mut optimizer = Newuoa::new(&f, &dom);
        let mut x = dvector![1.0, 2.0, 3.0];

        assert!(matches!(
            optimizer.opt_next(&f, &dom, &mut x),
            Err(NewuoaError::Problem(ProblemError::InvalidDimensionality))
        ));
    }

    #[test]
    fn stop_reasons_have_text() {
        assert_eq!(
            StopReason::FinalRadiusReached.to_string(),
            "final trust region radius reached"
        );
        assert_eq!(
            StopReason::MaxEvaluations.to_string(),
            "maximum number of function evaluations reached"
        );
    }
}
