//! Problem domain definition (dimensionality, bounds, scaling).

use std::iter::FromIterator;

use na::{Dim, DimName};
use nalgebra as na;
use nalgebra::{storage::StorageMut, OVector, RealField, Vector};

/// Domain for a problem.
///
/// The optimizers in this crate are unconstrained. Bounds are used for
/// clamping the initial point and for estimating the scale of variables.
#[derive(Debug, Clone)]
pub struct Domain<T: RealField + Copy> {
    lower: OVector<T, na::Dyn>,
    upper: OVector<T, na::Dyn>,
    scale: Option<OVector<T, na::Dyn>>,
}

impl<T: RealField + Copy> Domain<T> {
    /// Creates unconstrained domain with given dimensionality.
    pub fn unconstrained(dim: usize) -> Self {
        assert!(dim > 0, "empty domain");

        let inf = T::from_subset(&f64::INFINITY);
        let n = na::Dyn(dim);
        let one = na::Const::<1>;

        Self {
            lower: OVector::from_iterator_generic(n, one, (0..dim).map(|_| -inf)),
            upper: OVector::from_iterator_generic(n, one, (0..dim).map(|_| inf)),
            scale: None,
        }
    }

    /// Creates rectangular domain with given lower and upper bounds.
    ///
    /// Positive and negative infinity can be used to indicate a value unbounded
    /// in that dimension and direction. If the entire domain is unconstrained,
    /// use [`Domain::unconstrained`] instead.
    ///
    /// The scale of every variable is estimated from the magnitude of its
    /// bounds.
    pub fn rect(lower: Vec<T>, upper: Vec<T>) -> Self {
        assert!(
            lower.len() == upper.len(),
            "lower and upper have different size"
        );

        let dim = lower.len();
        assert!(dim > 0, "empty domain");

        let scale = lower
            .iter()
            .copied()
            .zip(upper.iter().copied())
            .map(|(l, u)| T::one() / estimate_magnitude_from_bounds(l, u));

        let dim = na::Dyn(dim);
        let scale = OVector::from_iterator_generic(dim, na::U1::name(), scale);
        let lower = OVector::from_iterator_generic(dim, na::U1::name(), lower);
        let upper = OVector::from_iterator_generic(dim, na::U1::name(), upper);

        Self {
            lower,
            upper,
            scale: Some(scale),
        }
    }

    /// Sets a custom scale for the domain.
    ///
    /// Scale of a variable is the inverse of its expected magnitude. The
    /// optimizer works with variables multiplied by their scale, so that
    /// trust-region radii are comparable across all coordinates. All scale
    /// values must be positive and finite.
    pub fn with_scale(mut self, scale: Vec<T>) -> Self {
        assert!(
            scale.len() == self.lower.nrows(),
            "scale has invalid dimension"
        );
        assert!(
            scale.iter().all(|s| s.is_finite() && *s > T::zero()),
            "scale must be positive and finite"
        );

        let dim = na::Dyn(self.lower.nrows());
        let scale = OVector::from_iterator_generic(dim, na::U1::name(), scale);

        self.scale = Some(scale);
        self
    }

    /// Gets the dimensionality of the domain.
    pub fn dim(&self) -> usize {
        self.lower.nrows()
    }

    /// Gets the scale if available.
    ///
    /// Scale can be either provided by [`Domain::with_scale`] or estimated for
    /// a constrained domain. If there is no reliable way to estimate the scale
    /// (for unconstrained problem), `None` is returned.
    pub fn scale(&self) -> Option<&OVector<T, na::Dyn>> {
        self.scale.as_ref()
    }

    /// Gets the lower bounds.
    pub fn lower(&self) -> &OVector<T, na::Dyn> {
        &self.lower
    }

    /// Gets the upper bounds.
    pub fn upper(&self) -> &OVector<T, na::Dyn> {
        &self.upper
    }

    /// Projects given point into the domain.
    pub fn project<D, Sx>(&self, x: &mut Vector<T, D, Sx>) -> bool
    where
        D: Dim,
        Sx: StorageMut<T, D>,
    {
        let mut not_feasible = false;

        self.lower
            .iter()
            .zip(self.upper.iter())
            .zip(x.iter_mut())
            .for_each(|((li, ui), xi)| {
                if &*xi < li {
                    *xi = *li;
                    not_feasible = true;
                } else if &*xi > ui {
                    *xi = *ui;
                    not_feasible = true;
                }
            });

        not_feasible
    }
}

impl<T: RealField + Copy> FromIterator<(T, T)> for Domain<T> {
    fn from_iter<I: IntoIterator<Item = (T, T)>>(iter: I) -> Self {
        let (lower, upper) = iter.into_iter().unzip();
        Self::rect(lower, upper)
    }
}

impl<T: RealField + Copy> FromIterator<T> for Domain<T> {
    /// Creates unconstrained domain from the expected magnitudes of the
    /// variables.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let scale = iter
            .into_iter()
            .map(|magnitude| T::one() / magnitude)
            .collect::<Vec<_>>();

        Self::unconstrained(scale.len()).with_scale(scale)
    }
}

/// Estimates magnitude of a variable given lower and upper bounds.
fn estimate_magnitude_from_bounds<T: RealField + Copy>(lower: T, upper: T) -> T {
    let ten = T::from_subset(&10.0);
    let half = T::from_subset(&0.5);

    let avg = half * (lower.abs() + upper.abs());
    let magnitude = ten.powf(avg.abs().log10().trunc());

    // For [0, 0] range and unbounded variables, the computed magnitude is
    // undefined.
    if magnitude.is_finite() && magnitude > T::zero() {
        magnitude
    } else {
        T::one()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn magnitude() {
        assert_eq!(estimate_magnitude_from_bounds(-1e10f64, 1e10).log10(), 10.0);
        assert_eq!(estimate_magnitude_from_bounds(-1e4f64, -1e2).log10(), 3.0);
        assert_eq!(estimate_magnitude_from_bounds(-6e-6f64, 9e-6) / 1e-5, 1.0);
    }

    #[test]
    fn magnitude_when_bound_is_zero_or_infinite() {
        assert_eq!(estimate_magnitude_from_bounds(0f64, 1e2).log10(), 1.0);
        assert_eq!(estimate_magnitude_from_bounds(0f64, 0.0), 1.0);
        assert_eq!(
            estimate_magnitude_from_bounds(f64::NEG_INFINITY, f64::INFINITY),
            1.0
        );
    }

    #[test]
    fn rect_scale_is_inverse_magnitude() {
        let dom = Domain::rect(vec![-100.0, 0.0], vec![100.0, 1e-3]);
        let scale = dom.scale().unwrap();

        assert_relative_eq!(scale[0], 1e-2);
        assert_relative_eq!(scale[1], 1e3);
    }

    #[test]
    fn magnitudes_into_scale() {
        let dom: Domain<f64> = [10.0, 0.5].into_iter().collect();
        let scale = dom.scale().unwrap();

        assert_eq!(dom.dim(), 2);
        assert_eq!(scale[0], 0.1);
        assert_eq!(scale[1], 2.0);
    }

    #[test]
    fn projection() {
        let dom: Domain<f64> = [(0.0, 1.0), (-1.0, 1.0)].into_iter().collect();
        let mut x = nalgebra::dvector![2.0, 0.5];

        assert!(dom.project(&mut x));
        assert_eq!(x, nalgebra::dvector![1.0, 0.5]);
        assert!(!dom.project(&mut x));
    }

    #[test]
    #[should_panic(expected = "scale must be positive and finite")]
    fn non_positive_scale() {
        Domain::unconstrained(2).with_scale(vec![1.0, 0.0]);
    }
}
