//! Error types shared across the crate.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while building, evaluating or fitting a model.
///
/// All failures are surfaced synchronously to the caller and none of them is
/// retried internally. A failed operation never leaves a model half-updated:
/// in particular a failed re-fit keeps the previous fit result intact.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad construction or fit inputs: wrong lengths, non-finite values,
    /// inconsistent bounds. Raised before any numerical work is done.
    #[error("validation error: {0}")]
    Validation(String),

    /// The circuit string does not match the grammar
    /// `expr := term ('-' term)*`, `term := element | 'p(' expr (',' expr)* ')'`.
    #[error("invalid circuit string {input:?}: {reason}")]
    CircuitSyntax {
        /// The string that failed to parse.
        input: String,
        /// What the parser objected to.
        reason: String,
    },

    /// An element code whose letter prefix matches no registered element.
    #[error("unknown circuit element {code:?}")]
    UnknownElement {
        /// The offending element code, e.g. `X1`.
        code: String,
    },

    /// The initial guess does not cover the circuit's parameters exactly.
    #[error("initial guess holds {actual} values but the circuit declares {expected} parameters")]
    ParameterCount {
        /// Parameter count derived from the circuit string.
        expected: usize,
        /// Length of the supplied initial guess.
        actual: usize,
    },

    /// The least-squares solver stopped without reaching a minimum.
    #[error("fit did not converge: {reason}")]
    FitConvergence {
        /// Termination reason reported by the solver.
        reason: String,
    },

    /// `predict` was called on a model that has never been fit.
    #[error("model has not been fit yet")]
    UnfitModel,
}
