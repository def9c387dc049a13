//! Model wrappers binding a circuit topology to guesses, bounds and fit state.
//!
//! A model owns its circuit tree, initial guess and (after a successful fit)
//! a [`FitResult`]. The fitting engine only borrows these for the duration of
//! a `fit` call; models never share state, so independent instances may be
//! fit from different threads.

use std::fmt;

use float_pretty_print::PrettyPrintFloat;

use crate::circuit::Circuit;
use crate::error::{Error, Result};
use crate::fitting::{self, FitResult};
use crate::Cplx;

/// The fixed Randles topology: solution resistance in series with the
/// double-layer capacitance shunting the charge-transfer resistance, plus an
/// open Warburg diffusion tail.
pub const RANDLES_CIRCUIT: &str = "R0-p(R1,C1)-Wo1";

/// Topology-free base model: an initial guess and a display name, nothing
/// else. Building block for the topology-bearing wrappers.
#[derive(Debug, Clone)]
pub struct BaseCircuit {
    name: Option<String>,
    initial_guess: Vec<f64>,
}

impl BaseCircuit {
    /// Validates and stores an initial guess. The guess must be non-empty
    /// and finite; length checks against a topology happen in the wrappers.
    pub fn new(initial_guess: Vec<f64>) -> Result<Self> {
        if initial_guess.is_empty() {
            return Err(Error::Validation("initial guess must not be empty".to_string()));
        }
        if !initial_guess.iter().all(|g| g.is_finite()) {
            return Err(Error::Validation("initial guess must be finite".to_string()));
        }
        Ok(Self {
            name: None,
            initial_guess,
        })
    }

    /// Display label, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The stored initial guess.
    pub fn initial_guess(&self) -> &[f64] {
        &self.initial_guess
    }

    /// Attaches a display label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A model over an arbitrary circuit string.
#[derive(Debug, Clone)]
pub struct CustomCircuit {
    circuit: Circuit,
    circuit_string: String,
    base: BaseCircuit,
    bounds: Option<Vec<(f64, f64)>>,
    fit_result: Option<FitResult>,
}

impl CustomCircuit {
    /// Parses `circuit` and binds it to `initial_guess`.
    ///
    /// Construction fails if the string does not parse or if the guess length
    /// differs from the circuit's parameter count; length problems are never
    /// deferred to fit time.
    pub fn new(circuit: &str, initial_guess: Vec<f64>) -> Result<Self> {
        let parsed = Circuit::parse(circuit)?;
        let base = BaseCircuit::new(initial_guess)?;
        let expected = parsed.param_count();
        if base.initial_guess().len() != expected {
            return Err(Error::ParameterCount {
                expected,
                actual: base.initial_guess().len(),
            });
        }
        Ok(Self {
            circuit: parsed,
            circuit_string: circuit.to_string(),
            base,
            bounds: None,
            fit_result: None,
        })
    }

    /// Attaches a display label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.base = self.base.with_name(name);
        self
    }

    /// Overrides the element-supplied fitting limits.
    ///
    /// One `(lower, upper)` pair per parameter, each pair ordered with the
    /// corresponding initial guess strictly inside the open interval (see
    /// [`crate::fitting::fit`]).
    pub fn with_bounds(mut self, bounds: Vec<(f64, f64)>) -> Result<Self> {
        let n_params = self.circuit.param_count();
        if bounds.len() != n_params {
            return Err(Error::Validation(format!(
                "got {} bound pairs for {} parameters",
                bounds.len(),
                n_params
            )));
        }
        for (i, (&(lo, hi), &guess)) in bounds.iter().zip(self.base.initial_guess()).enumerate() {
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
        self.bounds = Some(bounds);
        Ok(self)
    }

    /// The parsed composition tree.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// The circuit string the model was built from.
    pub fn circuit_string(&self) -> &str {
        &self.circuit_string
    }

    /// Display label, if any.
    pub fn name(&self) -> Option<&str> {
        self.base.name()
    }

    /// The stored initial guess.
    pub fn initial_guess(&self) -> &[f64] {
        self.base.initial_guess()
    }

    /// Parameter names and units in canonical order.
    pub fn get_param_names(&self) -> (Vec<String>, Vec<&'static str>) {
        (self.circuit.param_names(), self.circuit.param_units())
    }

    /// Whether a fit has succeeded on this model.
    pub fn is_fit(&self) -> bool {
        self.fit_result.is_some()
    }

    /// Fitted parameters, once a fit has succeeded.
    pub fn parameters(&self) -> Option<&[f64]> {
        self.fit_result.as_ref().map(|fit| fit.parameters.as_slice())
    }

    /// One-sigma confidence intervals, when the last fit produced them.
    pub fn confidence(&self) -> Option<&[f64]> {
        self.fit_result
            .as_ref()
            .and_then(|fit| fit.confidence.as_deref())
    }

    /// Estimates the circuit parameters from a measured spectrum.
    ///
    /// On success the result is stored on the model (a repeated fit
    /// overwrites the previous one). On any failure the model keeps its
    /// prior fit state untouched.
    pub fn fit(&mut self, freqs: &[f64], zdata: &[Cplx]) -> Result<&FitResult> {
        let result = fitting::fit(
            &self.circuit,
            self.base.initial_guess(),
            freqs,
            zdata,
            self.bounds.as_deref(),
        )?;
        Ok(self.fit_result.insert(result))
    }

    /// Model impedance at the fitted parameters.
    ///
    /// Fails with [`Error::UnfitModel`] before touching any frequency when
    /// the model has never been fit.
    pub fn predict(&self, freqs: &[f64]) -> Result<Vec<Cplx>> {
        let fit = self.fit_result.as_ref().ok_or(Error::UnfitModel)?;
        Ok(self.circuit.evaluate(&fit.parameters, freqs))
    }
}

impl fmt::Display for CustomCircuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Name: {}", self.name().unwrap_or("None"))?;
        writeln!(f, "Circuit string: {}", self.circuit_string)?;
        writeln!(f, "Fit: {}", if self.is_fit() { "True" } else { "False" })?;
        writeln!(f)?;

        let (names, units) = self.get_param_names();
        match &self.fit_result {
            Some(fit) => {
                writeln!(f, "Fit parameters:")?;
                for (i, (name, unit)) in names.iter().zip(&units).enumerate() {
                    write!(f, "  {:>5} = {}", name, fmt_exp(fit.parameters[i]))?;
                    if let Some(confidence) = &fit.confidence {
                        write!(f, " (+/- {})", fmt_exp(confidence[i]))?;
                    }
                    writeln!(f, " [{unit}]")?;
                }
            }
            None => {
                writeln!(f, "Initial guesses:")?;
                for (i, (name, unit)) in names.iter().zip(&units).enumerate() {
                    writeln!(
                        f,
                        "  {:>5} = {} [{}]",
                        name,
                        fmt_exp(self.base.initial_guess()[i]),
                        unit
                    )?;
                }
            }
        }

        if let Some(bounds) = &self.bounds {
            writeln!(f)?;
            writeln!(f, "Bounds:")?;
            for (name, &(lo, hi)) in names.iter().zip(bounds) {
                writeln!(
                    f,
                    "  {:>5} in ({}, {})",
                    name,
                    PrettyPrintFloat(lo),
                    PrettyPrintFloat(hi)
                )?;
            }
        }
        Ok(())
    }
}

/// Scientific notation with a signed two-digit exponent (`1.00e-02`), the
/// format the parameter tables are pinned to.
fn fmt_exp(value: f64) -> String {
    let plain = format!("{value:.2e}");
    match plain.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => plain,
    }
}

/// The Randles convenience model: [`RANDLES_CIRCUIT`] with its parameter
/// count of five enforced at construction.
#[derive(Debug, Clone)]
pub struct Randles {
    inner: CustomCircuit,
}

impl Randles {
    /// Builds a Randles model from exactly five initial-guess values
    /// `[R0, R1, C1, Wo1_0, Wo1_1]`.
    pub fn new(initial_guess: Vec<f64>) -> Result<Self> {
        if initial_guess.len() != 5 {
            return Err(Error::ParameterCount {
                expected: 5,
                actual: initial_guess.len(),
            });
        }
        Ok(Self {
            inner: CustomCircuit::new(RANDLES_CIRCUIT, initial_guess)?.with_name("Randles"),
        })
    }

    /// Overrides the element-supplied fitting limits.
    pub fn with_bounds(self, bounds: Vec<(f64, f64)>) -> Result<Self> {
        Ok(Self {
            inner: self.inner.with_bounds(bounds)?,
        })
    }

    /// Parameter names and units in canonical order.
    pub fn get_param_names(&self) -> (Vec<String>, Vec<&'static str>) {
        self.inner.get_param_names()
    }

    /// Whether a fit has succeeded on this model.
    pub fn is_fit(&self) -> bool {
        self.inner.is_fit()
    }

    /// Fitted parameters, once a fit has succeeded.
    pub fn parameters(&self) -> Option<&[f64]> {
        self.inner.parameters()
    }

    /// One-sigma confidence intervals, when the last fit produced them.
    pub fn confidence(&self) -> Option<&[f64]> {
        self.inner.confidence()
    }

    /// See [`CustomCircuit::fit`].
    pub fn fit(&mut self, freqs: &[f64], zdata: &[Cplx]) -> Result<&FitResult> {
        self.inner.fit(freqs, zdata)
    }

    /// See [`CustomCircuit::predict`].
    pub fn predict(&self, freqs: &[f64]) -> Result<Vec<Cplx>> {
        self.inner.predict(freqs)
    }

    /// The underlying custom model.
    pub fn as_custom(&self) -> &CustomCircuit {
        &self.inner
    }
}

impl fmt::Display for Randles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}


// ---------- Unit tests ----------
