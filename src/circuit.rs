//! Circuit composition trees and the circuit-string parser.
//!
//! A circuit string is ASCII with no whitespace: element tokens joined by `-`
//! for series connection, and `p(a,b,...)` groups for parallel combination.
//! Sub-expressions nest arbitrarily, e.g. `R0-p(R1-Wo1,C1)`.
//!
//! Parsing yields a [`Circuit`] tree whose depth-first, left-to-right leaf
//! order defines the canonical parameter-vector layout used everywhere else
//! in the crate.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, digit1},
    combinator::map,
    multi::separated_list1,
    sequence::{delimited, pair},
    IResult, Parser,
};

use crate::element::Element;
use crate::error::{Error, Result};
use crate::Cplx;

/// A node of the circuit composition tree.
///
/// The tree is finite and acyclic by construction: the grammar is strictly
/// nested and nodes own their children.
#[derive(Debug, Clone, PartialEq)]
pub enum Circuit {
    /// A single element instance, e.g. `Wo1`.
    Element {
        /// The element type behind the code prefix.
        element: Element,
        /// Full instance code as written, e.g. `Wo1`.
        code: String,
    },
    /// Children connected in series: `Z = Z_1 + Z_2 + ...`.
    Series(Vec<Circuit>),
    /// Children connected in parallel: `1/Z = 1/Z_1 + 1/Z_2 + ...`.
    Parallel(Vec<Circuit>),
}

impl Circuit {
    /// Parses a circuit string.
    ///
    /// Fails with [`Error::CircuitSyntax`] on malformed input (unbalanced
    /// parentheses, empty branches, trailing garbage) and with
    /// [`Error::UnknownElement`] when a token's letter prefix matches no
    /// registered element.
    pub fn parse(input: &str) -> Result<Self> {
        match series_expr(input) {
            Ok(("", circuit)) => Ok(circuit),
            Ok((rest, _)) => Err(Error::CircuitSyntax {
                input: input.to_string(),
                reason: format!("unexpected trailing input at {rest:?}"),
            }),
            Err(nom::Err::Failure(ParseFail::UnknownElement(code)))
            | Err(nom::Err::Error(ParseFail::UnknownElement(code))) => {
                Err(Error::UnknownElement { code })
            }
            Err(_) => Err(Error::CircuitSyntax {
                input: input.to_string(),
                reason: "malformed circuit expression".to_string(),
            }),
        }
    }

    /// Total number of parameters declared by the tree's leaves.
    pub fn param_count(&self) -> usize {
        match self {
            Circuit::Element { element, .. } => element.param_count(),
            Circuit::Series(children) | Circuit::Parallel(children) => {
                children.iter().map(Circuit::param_count).sum()
            }
        }
    }

    /// Parameter names in canonical order.
    ///
    /// A single-parameter element contributes its instance code (`R0`); a
    /// multi-parameter element contributes indexed names (`Wo1_0`, `Wo1_1`).
    pub fn param_names(&self) -> Vec<String> {
        match self {
            Circuit::Element { element, code } => match element.param_count() {
                1 => vec![code.clone()],
                n => (0..n).map(|i| format!("{code}_{i}")).collect(),
            },
            Circuit::Series(children) | Circuit::Parallel(children) => {
                children.iter().flat_map(Circuit::param_names).collect()
            }
        }
    }

    /// Parameter display units in canonical order.
    pub fn param_units(&self) -> Vec<&'static str> {
        match self {
            Circuit::Element { element, .. } => element.param_units().to_vec(),
            Circuit::Series(children) | Circuit::Parallel(children) => {
                children.iter().flat_map(Circuit::param_units).collect()
            }
        }
    }

    /// Element-supplied fitting limits in canonical order.
    pub fn default_bounds(&self) -> Vec<(f64, f64)> {
        match self {
            Circuit::Element { element, .. } => element.default_bounds().to_vec(),
            Circuit::Series(children) | Circuit::Parallel(children) => {
                children.iter().flat_map(Circuit::default_bounds).collect()
            }
        }
    }

    /// Complex impedance of the whole circuit at `freq` (Hz).
    ///
    /// `params` is the full parameter vector in canonical order. The call is
    /// purely functional and is made thousands of times per fit.
    /// Frequencies at which a child impedance vanishes or diverges are not
    /// intercepted; IEEE infinities and NaNs propagate to the result.
    pub fn impedance(&self, params: &[f64], freq: f64) -> Cplx {
        debug_assert_eq!(params.len(), self.param_count());
        match self {
            Circuit::Element { element, .. } => element.impedance(params, freq),
            Circuit::Series(children) => {
                let mut offset = 0;
                let mut total = Cplx::new(0.0, 0.0);
                for child in children {
                    let end = offset + child.param_count();
                    total += child.impedance(&params[offset..end], freq);
                    offset = end;
                }
                total
            }
            Circuit::Parallel(children) => {
                let mut offset = 0;
                let mut admittance = Cplx::new(0.0, 0.0);
                for child in children {
                    let end = offset + child.param_count();
                    admittance += 1.0 / child.impedance(&params[offset..end], freq);
                    offset = end;
                }
                1.0 / admittance
            }
        }
    }

    /// Vectorized [`Self::impedance`] over a frequency sweep.
    pub fn evaluate(&self, params: &[f64], freqs: &[f64]) -> Vec<Cplx> {
        freqs.iter().map(|&freq| self.impedance(params, freq)).collect()
    }
}


// ---------- Parser internals ----------

/// Parse-time error carrier. Unknown element codes must survive nom's
/// backtracking verbatim, everything else collapses into a generic syntax
/// failure at the top level.
#[derive(Debug)]
enum ParseFail {
    UnknownElement(String),
    Syntax,
}

impl<'a> nom::error::ParseError<&'a str> for ParseFail {
    fn from_error_kind(_input: &'a str, _kind: nom::error::ErrorKind) -> Self {
        ParseFail::Syntax
    }

    fn append(_input: &'a str, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

fn element_token(input: &str) -> IResult<&str, Circuit, ParseFail> {
    let (rest, (prefix, digits)) = pair(alpha1, digit1).parse(input)?;
    let Some(element) = Element::from_prefix(prefix) else {
        // Failure, not Error: `alt` must not backtrack over a well-formed
        // token with an unregistered prefix.
        return Err(nom::Err::Failure(ParseFail::UnknownElement(format!(
            "{prefix}{digits}"
        ))));
    };
    let code = format!("{prefix}{digits}");
    Ok((rest, Circuit::Element { element, code }))
}

fn parallel_group(input: &str) -> IResult<&str, Circuit, ParseFail> {
    map(
        delimited(tag("p("), separated_list1(tag(","), series_expr), tag(")")),
        Circuit::Parallel,
    )
    .parse(input)
}

fn term(input: &str) -> IResult<&str, Circuit, ParseFail> {
    // `p(` is checked first so the letter `p` never reaches element lookup.
    alt((parallel_group, element_token)).parse(input)
}

fn series_expr(input: &str) -> IResult<&str, Circuit, ParseFail> {
    map(separated_list1(tag("-"), term), |mut terms| {
        if terms.len() == 1 {
            terms.pop().expect("separated_list1 yields at least one term")
        } else {
            Circuit::Series(terms)
        }
    })
    .parse(input)
}


// ---------- Unit tests ----------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn approx_cplx(x: Cplx, y: Cplx, dev: f64) -> bool {
        let diff = y - x;
        (diff * diff.conj()).re < dev * dev
    }
    const APPROX_VAL: f64 = 1e-12;

    #[test]
    fn parses_canonical_layout() {
        let circuit = Circuit::parse("R0-p(R1,C1)-p(R2,C2)-Wo1").unwrap();
        assert_eq!(circuit.param_count(), 7);
        assert_eq!(
            circuit.param_names(),
            ["R0", "R1", "C1", "R2", "C2", "Wo1_0", "Wo1_1"]
        );
        assert_eq!(
            circuit.param_units(),
            ["Ohm", "Ohm", "F", "Ohm", "F", "Ohm", "sec"]
        );
    }

    #[test]
    fn parses_nested_groups() {
        let circuit = Circuit::parse("R0-p(R1-Wo1,C1,p(R2,L0))").unwrap();
        assert_eq!(circuit.param_count(), 7);
        assert_eq!(
            circuit.param_names(),
            ["R0", "R1", "Wo1_0", "Wo1_1", "C1", "R2", "L0"]
        );
    }

    #[test]
    fn rejects_malformed_strings() {
        for bad in ["", "R0-", "-R0", "R0-p(R1,C1", "p(R1,)", "p()", "R", "R0)"] {
            match Circuit::parse(bad) {
                Err(Error::CircuitSyntax { .. }) => {}
                other => panic!("{bad:?}: expected syntax error, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_unknown_elements() {
        match Circuit::parse("R0-X1") {
            Err(Error::UnknownElement { code }) => assert_eq!(code, "X1"),
            other => panic!("expected unknown element, got {other:?}"),
        }
        match Circuit::parse("R0-p(Foo2,C1)") {
            Err(Error::UnknownElement { code }) => assert_eq!(code, "Foo2"),
            other => panic!("expected unknown element, got {other:?}"),
        }
    }

    #[test]
    fn series_sums_impedances() {
        let circuit = Circuit::parse("R0-R1").unwrap();
        let z = circuit.impedance(&[40.0, 40.0], 10.0);
        assert!(approx_cplx(z, Cplx::new(80.0, 0.0), APPROX_VAL));
    }

    #[test]
    fn series_order_does_not_matter() {
        let a = Circuit::parse("R0-C1-Wo1").unwrap();
        let b = Circuit::parse("Wo1-R0-C1").unwrap();
        for freq in [0.1, 1.0, 100.0] {
            let za = a.impedance(&[12.0, 3e-4, 2.0, 5.0], freq);
            let zb = b.impedance(&[2.0, 5.0, 12.0, 3e-4], freq);
            assert!(approx_cplx(za, zb, APPROX_VAL));
        }
    }

    #[test]
    fn parallel_of_single_child_is_identity() {
        let wrapped = Circuit::parse("p(C1)").unwrap();
        let plain = Circuit::parse("C1").unwrap();
        for freq in [0.5, 20.0, 3e3] {
            let zw = wrapped.impedance(&[1e-4], freq);
            let zp = plain.impedance(&[1e-4], freq);
            assert!(approx_cplx(zw, zp, APPROX_VAL));
        }
    }

    #[test]
    fn parallel_resistors_halve() {
        let circuit = Circuit::parse("p(R0,R1)").unwrap();
        let z = circuit.impedance(&[40.0, 40.0], 10.0);
        assert!(approx_cplx(z, Cplx::new(20.0, 0.0), APPROX_VAL));
    }

    #[test]
    fn randles_reference_point() {
        // Fitted parameters of the reference Randles spectrum, with the
        // 10 Hz value pinned.
        let circuit = Circuit::parse("R0-p(R1,C1)-Wo1").unwrap();
        let params = [
            1.86146620e-2,
            1.15477171e-2,
            1.33331949,
            6.31473571e-2,
            2.22407275e2,
        ];
        let z = circuit.impedance(&params, 10.0);
        assert_relative_eq!(z.re, 0.024957484691605, max_relative = 1e-10);
        assert_relative_eq!(z.im, -0.006148415632702, max_relative = 1e-10);
    }

    #[test]
    fn evaluate_matches_pointwise_calls() {
        let circuit = Circuit::parse("R0-p(R1,C1)").unwrap();
        let params = [0.01, 0.005, 0.1];
        let freqs = [0.1, 1.0, 10.0, 1e3];
        let spectrum = circuit.evaluate(&params, &freqs);
        assert_eq!(spectrum.len(), freqs.len());
        for (&freq, &z) in freqs.iter().zip(&spectrum) {
            assert!(approx_cplx(z, circuit.impedance(&params, freq), APPROX_VAL));
        }
    }
}
