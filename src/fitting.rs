//! Nonlinear least-squares estimation of circuit parameters.
//!
//! The engine minimizes the concatenated real and imaginary residuals
//! `[Re(Z_model) - Re(Z_data); Im(Z_model) - Im(Z_data)]` with a
//! Levenberg-Marquardt solver. Box bounds are enforced through a smooth
//! reparameterization, so the solver itself always works on unconstrained
//! internal coordinates. At convergence the Jacobian-derived covariance
//! yields one-standard-deviation confidence intervals per parameter.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{DMatrix, DVector, Dyn, Owned};

use crate::circuit::Circuit;
use crate::error::{Error, Result};
use crate::Cplx;

/// Outcome of a successful fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Estimated parameters in the circuit's canonical order.
    pub parameters: Vec<f64>,
    /// One-standard-deviation confidence intervals, one per parameter.
    /// `None` when the covariance matrix could not be formed (singular
    /// `J^T J` at the solution).
    pub confidence: Option<Vec<f64>>,
}

/// Fits `circuit` to a measured spectrum.
///
/// `bounds` overrides the element-supplied default limits when given; pass
/// `None` to fit with the defaults. All preconditions are checked before any
/// numerical work:
///
/// * guess length equals the circuit's parameter count,
/// * `freqs` and `zdata` have equal non-empty length, at least one point per
///   parameter, and only finite values,
/// * each bound pair is ordered and its initial guess lies strictly inside
///   the open interval. A guess exactly on a bound is rejected: the bound
///   reparameterization maps the open interval onto the real line, so an
///   on-bound start has no finite internal coordinate. Nudge such a guess
///   into the interior before fitting.
pub fn fit(
    circuit: &Circuit,
    initial_guess: &[f64],
    freqs: &[f64],
    zdata: &[Cplx],
    bounds: Option<&[(f64, f64)]>,
) -> Result<FitResult> {
    let n_params = circuit.param_count();
    if initial_guess.len() != n_params {
        return Err(Error::ParameterCount {
            expected: n_params,
            actual: initial_guess.len(),
        });
    }
    if freqs.is_empty() {
        return Err(Error::Validation("no data points to fit".to_string()));
    }
    if freqs.len() != zdata.len() {
        return Err(Error::Validation(format!(
            "got {} frequencies but {} impedance values",
            freqs.len(),
            zdata.len()
        )));
    }
    if freqs.len() < n_params {
        return Err(Error::Validation(format!(
            "underdetermined fit: {} data points for {} parameters",
            freqs.len(),
            n_params
        )));
    }
    if !freqs.iter().all(|f| f.is_finite()) {
        return Err(Error::Validation("frequencies must be finite".to_string()));
    }
    if !zdata.iter().all(|z| z.re.is_finite() && z.im.is_finite()) {
        return Err(Error::Validation("impedance data must be finite".to_string()));
    }
    if !initial_guess.iter().all(|g| g.is_finite()) {
        return Err(Error::Validation("initial guess must be finite".to_string()));
    }

    let default_bounds;
    let bounds = match bounds {
        Some(bounds) => bounds,
        None => {
            default_bounds = circuit.default_bounds();
            default_bounds.as_slice()
        }
    };
    if bounds.len() != n_params {
        return Err(Error::Validation(format!(
            "got {} bound pairs for {} parameters",
            bounds.len(),
            n_params
        )));
    }
    for (i, (&(lo, hi), &guess)) in bounds.iter().zip(initial_guess).enumerate() {
        if !(lo < hi) {
            return Err(Error::Validation(format!(
                "bounds for parameter {i} are not ordered: ({lo}, {hi})"
            )));
        }
        if !(guess > lo && guess < hi) {
            return Err(Error::Validation(format!(
                "initial guess {guess} for parameter {i} lies outside ({lo}, {hi})"
            )));
        }
    }

    let transforms: Vec<Transform> = bounds.iter().map(|&b| Transform::for_bounds(b)).collect();
    let internal = DVector::from_iterator(
        n_params,
        initial_guess
            .iter()
            .zip(&transforms)
            .map(|(&guess, transform)| transform.forward(guess)),
    );

    let problem = CircuitProblem {
        circuit,
        freqs,
        zdata,
        transforms: &transforms,
        internal,
    };
    let (solved, report) = LevenbergMarquardt::new()
        .with_patience(1000)
        .minimize(problem);
    if !report.termination.was_successful() || !report.objective_function.is_finite() {
        return Err(Error::FitConvergence {
            reason: format!("{:?}", report.termination),
        });
    }

    let parameters = solved.physical();
    let confidence = confidence_intervals(&solved, &parameters);
    Ok(FitResult {
        parameters,
        confidence,
    })
}

/// Smooth bijection between a bounded physical parameter and the solver's
/// unconstrained internal coordinate. Which branch applies depends only on
/// which side of the box is finite.
#[derive(Debug, Clone, Copy)]
enum Transform {
    /// `(-inf, +inf)`: identity.
    Identity,
    /// `(lo, +inf)`: `p = lo + exp(x)`.
    LogLower(f64),
    /// `(-inf, hi)`: `p = hi - exp(x)`.
    LogUpper(f64),
    /// `(lo, hi)`: logistic map onto the open interval.
    Logistic(f64, f64),
}

impl Transform {
    fn for_bounds((lo, hi): (f64, f64)) -> Self {
        match (lo.is_finite(), hi.is_finite()) {
            (false, false) => Transform::Identity,
            (true, false) => Transform::LogLower(lo),
            (false, true) => Transform::LogUpper(hi),
            (true, true) => Transform::Logistic(lo, hi),
        }
    }

    /// Physical value to internal coordinate. Finite for any value strictly
    /// inside the bounds, which validation guarantees for the initial guess.
    fn forward(self, physical: f64) -> f64 {
        match self {
            Transform::Identity => physical,
            Transform::LogLower(lo) => (physical - lo).ln(),
            Transform::LogUpper(hi) => (hi - physical).ln(),
            Transform::Logistic(lo, hi) => ((physical - lo) / (hi - physical)).ln(),
        }
    }

    /// Internal coordinate back to a physical value inside the bounds.
    fn backward(self, internal: f64) -> f64 {
        match self {
            Transform::Identity => internal,
            Transform::LogLower(lo) => lo + internal.exp(),
            Transform::LogUpper(hi) => hi - internal.exp(),
            Transform::Logistic(lo, hi) => lo + (hi - lo) / (1.0 + (-internal).exp()),
        }
    }

    /// `d physical / d internal`, used to map internal-space standard errors
    /// onto the physical parameters.
    fn derivative(self, internal: f64) -> f64 {
        match self {
            Transform::Identity => 1.0,
            Transform::LogLower(_) | Transform::LogUpper(_) => internal.exp(),
            Transform::Logistic(lo, hi) => {
                let physical = self.backward(internal);
                (physical - lo) * (hi - physical) / (hi - lo)
            }
        }
    }
}

/// Least-squares problem in the solver's vocabulary: internal coordinates in,
/// stacked real/imaginary residuals out.
struct CircuitProblem<'a> {
    circuit: &'a Circuit,
    freqs: &'a [f64],
    zdata: &'a [Cplx],
    transforms: &'a [Transform],
    internal: DVector<f64>,
}

impl CircuitProblem<'_> {
    fn physical(&self) -> Vec<f64> {
        self.internal
            .iter()
            .zip(self.transforms)
            .map(|(&x, transform)| transform.backward(x))
            .collect()
    }

    fn residual_vector(&self, physical: &[f64]) -> DVector<f64> {
        let n_points = self.freqs.len();
        let mut residuals = DVector::zeros(2 * n_points);
        for (i, (&freq, z)) in self.freqs.iter().zip(self.zdata).enumerate() {
            let model = self.circuit.impedance(physical, freq);
            residuals[i] = model.re - z.re;
            residuals[i + n_points] = model.im - z.im;
        }
        residuals
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for CircuitProblem<'_> {
    type ParameterStorage = Owned<f64, Dyn>;
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;

    fn set_params(&mut self, params: &DVector<f64>) {
        self.internal.copy_from(params);
    }

    fn params(&self) -> DVector<f64> {
        self.internal.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let residuals = self.residual_vector(&self.physical());
        residuals.iter().all(|r| r.is_finite()).then_some(residuals)
    }

    /// Forward-difference Jacobian in internal coordinates.
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let physical = self.physical();
        let base = self.residual_vector(&physical);
        if !base.iter().all(|r| r.is_finite()) {
            return None;
        }
        let n_residuals = base.len();
        let n_params = self.internal.len();
        let mut jacobian = DMatrix::zeros(n_residuals, n_params);
        for j in 0..n_params {
            let x = self.internal[j];
            let step = 1e-8 * (1.0 + x.abs());
            let mut perturbed = physical.clone();
            perturbed[j] = self.transforms[j].backward(x + step);
            let shifted = self.residual_vector(&perturbed);
            if !shifted.iter().all(|r| r.is_finite()) {
                return None;
            }
            for i in 0..n_residuals {
                jacobian[(i, j)] = (shifted[i] - base[i]) / step;
            }
        }
        Some(jacobian)
    }
}

/// `sqrt(diag((J^T J)^-1 * s^2))` at the solution, mapped to physical space
/// through the bound-transform derivative. `s^2` is the residual variance
/// with `2m - n` degrees of freedom.
fn confidence_intervals(problem: &CircuitProblem, physical: &[f64]) -> Option<Vec<f64>> {
    let jacobian = LeastSquaresProblem::jacobian(problem)?;
    let residuals = problem.residual_vector(physical);
    let n_residuals = residuals.len();
    let n_params = jacobian.ncols();
    if n_residuals <= n_params {
        return None;
    }
    let covariance = (jacobian.transpose() * &jacobian).try_inverse()?;
    let variance = residuals.norm_squared() / (n_residuals - n_params) as f64;
    Some(
        problem
            .internal
            .iter()
            .zip(problem.transforms)
            .enumerate()
            .map(|(i, (&x, transform))| {
                (covariance[(i, i)] * variance).max(0.0).sqrt() * transform.derivative(x).abs()
            })
            .collect(),
    )
}


// ---------- Unit tests ----------

#[cfg(test)]
mod test {
    use super::*;
    use crate::preprocessing::geomspace;
    use approx::assert_relative_eq;

    #[test]
    fn transforms_are_inverse_pairs() {
        let cases = [
            (Transform::Identity, -3.5),
            (Transform::LogLower(0.0), 42.0),
            (Transform::LogLower(-2.0), 0.5),
            (Transform::LogUpper(10.0), 3.0),
            (Transform::Logistic(0.0, 1.0), 0.25),
            (Transform::Logistic(-5.0, 7.0), 1.0),
        ];
        for (transform, physical) in cases {
            let x = transform.forward(physical);
            assert_relative_eq!(transform.backward(x), physical, max_relative = 1e-12);
            // finite-difference check of the derivative
            let h = 1e-7;
            let numeric = (transform.backward(x + h) - transform.backward(x - h)) / (2.0 * h);
            assert_relative_eq!(transform.derivative(x), numeric, max_relative = 1e-5);
        }
    }

    #[test]
    fn rejects_bad_guess_length_first() {
        let circuit = Circuit::parse("R0-p(R1,C1)").unwrap();
        let err = fit(&circuit, &[1.0, 2.0], &[1.0, 10.0, 100.0], &zeros(3), None).unwrap_err();
        match err {
            Error::ParameterCount { expected, actual } => {
                assert_eq!((expected, actual), (3, 2));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_mismatched_data_lengths() {
        let circuit = Circuit::parse("R0").unwrap();
        let err = fit(&circuit, &[1.0], &[1.0, 10.0], &zeros(3), None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_empty_and_underdetermined_data() {
        let circuit = Circuit::parse("R0-p(R1,C1)").unwrap();
        assert!(matches!(
            fit(&circuit, &[1.0, 1.0, 1.0], &[], &[], None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            fit(&circuit, &[1.0, 1.0, 1.0], &[1.0, 10.0], &zeros(2), None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn rejects_guess_outside_bounds() {
        let circuit = Circuit::parse("R0").unwrap();
        // default bound for a resistor is (0, inf)
        let err = fit(&circuit, &[-1.0], &[1.0, 10.0], &zeros(2), None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = fit(&circuit, &[5.0], &[1.0, 10.0], &zeros(2), Some(&[(0.0, 1.0)])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // exactly on a bound counts as outside
        let err = fit(&circuit, &[1.0], &[1.0, 10.0], &zeros(2), Some(&[(0.0, 1.0)])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_unordered_bounds() {
        let circuit = Circuit::parse("R0").unwrap();
        let err = fit(&circuit, &[5.0], &[1.0, 10.0], &zeros(2), Some(&[(1.0, 1.0)])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn recovers_synthesis_parameters() {
        // Noise-free round trip on a resolved RC semicircle plus offset.
        let circuit = Circuit::parse("R0-p(R1,C1)").unwrap();
        let truth = [10.0, 50.0, 1e-5];
        let freqs: Vec<f64> = geomspace(0.1, 1e5, 30).collect();
        let zdata = circuit.evaluate(&truth, &freqs);

        let result = fit(&circuit, &[5.0, 20.0, 1e-6], &freqs, &zdata, None).unwrap();
        for (estimate, expected) in result.parameters.iter().zip(truth) {
            assert_relative_eq!(*estimate, expected, max_relative = 1e-4);
        }
        // Noise-free data: intervals exist and are small next to the values.
        let confidence = result.confidence.expect("well-conditioned covariance");
        for (ci, value) in confidence.iter().zip(truth) {
            assert!(*ci >= 0.0 && *ci < value * 1e-2, "ci {ci} vs {value}");
        }
    }

    fn zeros(n: usize) -> Vec<Cplx> {
        vec![Cplx::new(1.0, -1.0); n]
    }
}
