//! Spectrum preprocessing helpers.
//!
//! Measured spectra often carry inductive artifacts at high frequency and
//! instrument noise outside the band of interest. These helpers filter a
//! paired `(frequencies, impedances)` spectrum before fitting; they never
//! mutate their inputs and keep the pairing intact.

use crate::Cplx;

/// Drops every point whose imaginary impedance is non-negative.
///
/// Points above the real axis of a Nyquist plot come from cabling inductance
/// or mutual induction, not from the cell, and bias capacitive fits.
pub fn ignore_below_x(freqs: &[f64], zdata: &[Cplx]) -> (Vec<f64>, Vec<Cplx>) {
    debug_assert_eq!(freqs.len(), zdata.len());
    freqs
        .iter()
        .zip(zdata)
        .filter(|(_, z)| z.im < 0.0)
        .map(|(&freq, &z)| (freq, z))
        .unzip()
}

/// Restricts a spectrum to `[fmin, fmax]`. A `None` endpoint leaves that
/// side unbounded.
pub fn crop_frequencies(
    freqs: &[f64],
    zdata: &[Cplx],
    fmin: Option<f64>,
    fmax: Option<f64>,
) -> (Vec<f64>, Vec<Cplx>) {
    debug_assert_eq!(freqs.len(), zdata.len());
    let lo = fmin.unwrap_or(f64::NEG_INFINITY);
    let hi = fmax.unwrap_or(f64::INFINITY);
    freqs
        .iter()
        .zip(zdata)
        .filter(|(&freq, _)| freq >= lo && freq <= hi)
        .map(|(&freq, &z)| (freq, z))
        .unzip()
}

/// `count` log-spaced values from `first` to `last` inclusive, the usual
/// layout of an impedance frequency sweep. Both endpoints must be positive.
/// A count of 1 yields `first` alone, a count of 0 an empty sweep.
pub fn geomspace(first: f64, last: f64, count: usize) -> impl Iterator<Item = f64> {
    debug_assert!(first > 0.0 && last > 0.0);
    let (lf, ll) = (first.ln(), last.ln());
    let delta = if count > 1 {
        (ll - lf) / ((count - 1) as f64)
    } else {
        0.0
    };
    (0..count).map(move |i| (lf + (i as f64) * delta).exp())
}


// ---------- Unit tests ----------
