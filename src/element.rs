//! The circuit element library.
//!
//! Every element the circuit grammar can reference lives in the closed
//! [`Element`] enum. Each variant carries fixed metadata (code prefix, arity,
//! display units, default fitting limits) and an impedance function over
//! frequency in Hz.

use std::f64::consts::{PI, TAU};

use crate::Cplx;

const J: Cplx = Cplx { re: 0.0, im: 1.0 };

/// Default limit for strictly positive physical parameters.
const POSITIVE: (f64, f64) = (0.0, f64::INFINITY);

/// A circuit element type.
///
/// Elements are referenced in circuit strings by a letter prefix plus a
/// user-chosen digit suffix (`R0`, `C1`, `Wo1`). The suffix only
/// disambiguates instances; two `R` leaves still occupy independent
/// parameter slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    /// Ideal resistor, `Z = R`.
    Resistor,
    /// Ideal capacitor, `Z = 1/(jwC)`.
    Capacitor,
    /// Ideal inductor, `Z = jwL`.
    Inductor,
    /// Semi-infinite Warburg diffusion, `Z = s(1-j)/sqrt(w)`.
    Warburg,
    /// Finite-space Warburg (reflective boundary),
    /// `Z = Z0 coth(sqrt(jwt))/sqrt(jwt)`.
    WarburgOpen,
    /// Finite-length Warburg (transmissive boundary),
    /// `Z = Z0 tanh(sqrt(jwt))/sqrt(jwt)`.
    WarburgShort,
    /// Constant phase element, `Z = 1/(Q (jw)^a)`.
    Cpe,
    /// Gerischer element, `Z = R/sqrt(1 + jwt)`.
    Gerischer,
    /// Single RC relaxation, `Z = R/(1 + jwt)`.
    KElement,
}

/// Registered element codes. The parser matches the whole letter run of a
/// token against these, so `Wo1` resolves to [`Element::WarburgOpen`] rather
/// than a Warburg named `o1`.
pub const REGISTRY: &[(&str, Element)] = &[
    ("CPE", Element::Cpe),
    ("Wo", Element::WarburgOpen),
    ("Ws", Element::WarburgShort),
    ("R", Element::Resistor),
    ("C", Element::Capacitor),
    ("L", Element::Inductor),
    ("W", Element::Warburg),
    ("G", Element::Gerischer),
    ("K", Element::KElement),
];

impl Element {
    /// Looks up an element by its letter prefix.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|(code, _)| *code == prefix)
            .map(|&(_, element)| element)
    }

    /// The letter prefix used in circuit strings.
    pub fn prefix(self) -> &'static str {
        match self {
            Element::Resistor => "R",
            Element::Capacitor => "C",
            Element::Inductor => "L",
            Element::Warburg => "W",
            Element::WarburgOpen => "Wo",
            Element::WarburgShort => "Ws",
            Element::Cpe => "CPE",
            Element::Gerischer => "G",
            Element::KElement => "K",
        }
    }

    /// Number of parameters this element consumes.
    pub fn param_count(self) -> usize {
        self.param_units().len()
    }

    /// Display units, one per parameter. Metadata only, never enforced
    /// dimensionally.
    pub fn param_units(self) -> &'static [&'static str] {
        match self {
            Element::Resistor => &["Ohm"],
            Element::Capacitor => &["F"],
            Element::Inductor => &["H"],
            Element::Warburg => &["Ohm sec^-1/2"],
            Element::WarburgOpen | Element::WarburgShort => &["Ohm", "sec"],
            Element::Cpe => &["Ohm^-1 sec^a", ""],
            Element::Gerischer | Element::KElement => &["Ohm", "sec"],
        }
    }

    /// Default fitting limits, one pair per parameter.
    pub fn default_bounds(self) -> &'static [(f64, f64)] {
        match self {
            Element::Resistor | Element::Capacitor | Element::Inductor | Element::Warburg => {
                &[POSITIVE]
            }
            Element::WarburgOpen
            | Element::WarburgShort
            | Element::Gerischer
            | Element::KElement => &[POSITIVE, POSITIVE],
            // The CPE exponent is a fraction of an ideal capacitor.
            Element::Cpe => &[POSITIVE, (0.0, 1.0)],
        }
    }

    /// Complex impedance at `freq` (Hz).
    ///
    /// `params` must hold exactly [`Self::param_count`] values; the slice is
    /// normally carved out of a circuit-wide parameter vector by the
    /// evaluator. `freq == 0` is not intercepted: capacitive and diffusive
    /// elements return IEEE infinities there.
    pub fn impedance(self, params: &[f64], freq: f64) -> Cplx {
        debug_assert_eq!(params.len(), self.param_count());
        let omega = TAU * freq;
        match self {
            Element::Resistor => Cplx::new(params[0], 0.0),
            Element::Capacitor => 1.0 / (J * omega * params[0]),
            Element::Inductor => J * omega * params[0],
            Element::Warburg => {
                let s = params[0] / omega.sqrt();
                Cplx::new(s, -s)
            }
            Element::WarburgOpen => {
                let x = (J * omega * params[1]).sqrt();
                params[0] / (x * x.tanh())
            }
            Element::WarburgShort => {
                let x = (J * omega * params[1]).sqrt();
                params[0] * x.tanh() / x
            }
            Element::Cpe => {
                let (q, n) = (params[0], params[1]);
                (-J * PI / 2.0 * n).exp() / (q * omega.powf(n))
            }
            Element::Gerischer => params[0] / (1.0 + J * omega * params[1]).sqrt(),
            Element::KElement => params[0] / (1.0 + J * omega * params[1]),
        }
    }
}


// ---------- Unit tests ----------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_cplx(z: Cplx, re: f64, im: f64) {
        assert_relative_eq!(z.re, re, max_relative = 1e-10, epsilon = 1e-12);
        assert_relative_eq!(z.im, im, max_relative = 1e-10, epsilon = 1e-12);
    }

    #[test]
    fn metadata_is_consistent() {
        for &(code, element) in REGISTRY {
            assert_eq!(element.prefix(), code);
            assert_eq!(Element::from_prefix(code), Some(element));
            assert_eq!(element.param_count(), element.param_units().len());
            assert_eq!(element.param_count(), element.default_bounds().len());
        }
        assert_eq!(Element::from_prefix("X"), None);
        assert_eq!(Element::from_prefix("p"), None);
    }

    #[test]
    fn ideal_elements() {
        assert_cplx(Element::Resistor.impedance(&[20.0], 1.0), 20.0, 0.0);
        assert_cplx(Element::Resistor.impedance(&[2000.0], 1e4), 2000.0, 0.0);

        // Z_C = -j/(wC), Z_L = jwL at w = 2*pi*f
        assert_cplx(
            Element::Capacitor.impedance(&[1e-3], 10.0),
            0.0,
            -1.0 / (TAU * 10.0 * 1e-3),
        );
        assert_cplx(Element::Inductor.impedance(&[2.0], 10.0), 0.0, TAU * 10.0 * 2.0);
    }

    #[test]
    fn warburg_variants() {
        // s(1-j)/sqrt(w) with s = 4, f = 10
        let s = 4.0 / (TAU * 10.0).sqrt();
        assert_cplx(Element::Warburg.impedance(&[4.0], 10.0), s, -s);

        // Reference values for Z0 = 2, tau = 3, f = 10. At this argument the
        // finite-length variants have both collapsed onto the 45-degree line.
        assert_cplx(
            Element::WarburgOpen.impedance(&[2.0, 3.0], 10.0),
            0.103006454106415,
            -0.103006454923761,
        );
        assert_cplx(
            Element::WarburgShort.impedance(&[2.0, 3.0], 10.0),
            0.103006453639286,
            -0.103006452821940,
        );

        // Low-frequency limit of the open variant: Re -> Z0/3.
        let lf = Element::WarburgOpen.impedance(&[2.0, 3.0], 1e-4);
        assert_relative_eq!(lf.re, 2.0 / 3.0, max_relative = 1e-4);
        assert!(lf.im < -100.0);
    }

    #[test]
    fn cpe_and_gerischer() {
        assert_cplx(
            Element::Cpe.impedance(&[0.05, 0.8], 10.0),
            0.225148192648565,
            -0.692934885939252,
        );
        // a = 0 degenerates to a resistor 1/Q, a = 1 to a capacitor Q
        assert_cplx(Element::Cpe.impedance(&[0.05, 0.0], 10.0), 20.0, 0.0);
        let ideal = Element::Capacitor.impedance(&[0.05], 10.0);
        assert_cplx(Element::Cpe.impedance(&[0.05, 1.0], 10.0), ideal.re, ideal.im);

        assert_cplx(
            Element::Gerischer.impedance(&[5.0, 0.1], 10.0),
            1.507818160909363,
            -1.286818763684946,
        );
        assert_cplx(
            Element::KElement.impedance(&[5.0, 0.1], 10.0),
            0.123522615159288,
            -0.776115480673238,
        );
    }
}
