//! Equivalent-circuit model fitting for electrochemical impedance spectra.
//!
//! The crate turns a circuit string such as `"R0-p(R1,C1)-Wo1"` into a
//! parameter-ordered impedance model, fits it to measured `(frequency,
//! impedance)` data by complex nonlinear least squares, and reports fitted
//! values with one-sigma confidence intervals.
//!
//! ```no_run
//! use eisfit::{Cplx, CustomCircuit};
//!
//! # fn main() -> eisfit::Result<()> {
//! let freqs = [1e4, 1e3, 1e2, 1e1, 1.0];
//! let zdata = [
//!     Cplx::new(0.019, -0.001),
//!     Cplx::new(0.020, -0.004),
//!     Cplx::new(0.025, -0.006),
//!     Cplx::new(0.029, -0.009),
//!     Cplx::new(0.038, -0.022),
//! ];
//! let mut model = CustomCircuit::new("R0-p(R1,C1)-Wo1", vec![0.01, 0.01, 1.0, 0.05, 100.0])?;
//! model.fit(&freqs, &zdata)?;
//! println!("{model}");
//! # Ok(())
//! # }
//! ```

pub mod circuit;
pub mod element;
pub mod error;
pub mod fitting;
pub mod model;
pub mod preprocessing;

/// Complex impedance value, Ohms on both axes.
pub type Cplx = num::complex::Complex<f64>;

pub use circuit::Circuit;
pub use element::Element;
pub use error::{Error, Result};
pub use fitting::{fit, FitResult};
pub use model::{BaseCircuit, CustomCircuit, Randles, RANDLES_CIRCUIT};
