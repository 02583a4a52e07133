//! Distortion between accelerator output and the software reference
//!
//! Per element the distortion is the squared relative error
//!
//! ```text
//! dist[i] = (ref[i] − meas[i])² / ref[i]²
//! ```
//!
//! reported in dB as `10·log10(mean(dist))` and `10·log10(max(dist))`. An
//! energy-normalized figure `10·log10(Σ err² / Σ ref²)` is reported alongside
//! for information; it does not take part in the verdict.
//!
//! # Zero references
//!
//! The ratio is undefined when `ref[i] == 0`. Elements that agree exactly
//! (including `0` against `0`) contribute zero distortion; any nonzero error
//! against a zero reference, and any non-finite term, contributes `+∞`, which
//! fails the run. The metric therefore never produces NaN.

use crate::error::{ConvError, Result};
use crate::tolerances::Tolerance;
use std::fmt;

/// A level in dB, rendered the way the bench log expects.
///
/// `+∞` prints as `Inf dB`, `−∞` as `-Inf dB`, anything else with two decimals.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Decibels(pub f64);

impl fmt::Display for Decibels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let x = self.0;
        if x.is_infinite() {
            if x > 0.0 {
                write!(f, "Inf dB")
            } else {
                write!(f, "-Inf dB")
            }
        } else {
            write!(f, "{x:.2} dB")
        }
    }
}

/// Outcome of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Both limits met
    Pass,
    /// At least one limit exceeded
    Fail,
}

impl Verdict {
    /// Process exit status: 0 for pass, 1 for fail.
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::Fail => 1,
        }
    }

    /// Whether the run passed.
    pub const fn passed(self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Mean and max distortion of one comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionReport {
    /// `10·log10(mean(dist))`
    pub mean_db: f64,
    /// `10·log10(max(dist))`
    pub max_db: f64,
    /// `10·log10(Σ err² / Σ ref²)`, informational
    pub energy_db: f64,
    /// Elements compared
    pub elements: usize,
}

impl DistortionReport {
    /// Apply `tol`: fail when `max_db > tol.max_db` or `mean_db > tol.mean_db`.
    pub fn verdict(&self, tol: &Tolerance) -> Verdict {
        if self.max_db > tol.max_db || self.mean_db > tol.mean_db {
            Verdict::Fail
        } else {
            Verdict::Pass
        }
    }

    /// Mean distortion for display
    pub const fn mean(&self) -> Decibels {
        Decibels(self.mean_db)
    }

    /// Max distortion for display
    pub const fn max(&self) -> Decibels {
        Decibels(self.max_db)
    }

    /// Energy-normalized distortion for display
    pub const fn energy(&self) -> Decibels {
        Decibels(self.energy_db)
    }
}

/// Squared relative error of one element, under the zero-reference policy.
pub fn element_distortion(measured: f32, reference: f32) -> f64 {
    let err = f64::from(reference) - f64::from(measured);
    if err == 0.0 {
        return 0.0;
    }
    let r = f64::from(reference);
    let dist = (err * err) / (r * r);
    if dist.is_nan() {
        f64::INFINITY
    } else {
        dist
    }
}

/// Compare `measured` against `reference` element by element.
///
/// # Errors
///
/// Returns `LengthMismatch` if the slices differ in length and
/// `EmptyComparison` if they are empty.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(measured: &[f32], reference: &[f32]) -> Result<DistortionReport> {
    if measured.len() != reference.len() {
        return Err(ConvError::length_mismatch("measured", reference.len(), measured.len()));
    }
    if reference.is_empty() {
        return Err(ConvError::EmptyComparison);
    }

    let mut sum = 0.0f64;
    let mut max = 0.0f64;
    let mut err_energy = 0.0f64;
    let mut ref_energy = 0.0f64;

    for (&m, &r) in measured.iter().zip(reference) {
        let dist = element_distortion(m, r);
        sum += dist;
        max = max.max(dist);

        let err = f64::from(r) - f64::from(m);
        err_energy += err * err;
        ref_energy += f64::from(r) * f64::from(r);
    }

    let mean = sum / reference.len() as f64;
    let energy = if err_energy == 0.0 {
        0.0
    } else {
        let ratio = err_energy / ref_energy;
        if ratio.is_nan() {
            f64::INFINITY
        } else {
            ratio
        }
    };

    Ok(DistortionReport {
        mean_db: to_db(mean),
        max_db: to_db(max),
        energy_db: to_db(energy),
        elements: reference.len(),
    })
}

/// `10·log10(x)`; zero maps to `−∞`, `+∞` to `+∞`.
pub fn to_db(x: f64) -> f64 {
    10.0 * x.log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::Xoshiro;

    #[test]
    fn identical_vectors_are_negative_infinity() {
        let mut rng = Xoshiro::new(17);
        for n in [1usize, 2, 31, 32, 1000] {
            let x = rng.gen_f32(n);
            let r = evaluate(&x, &x).unwrap();
            assert_eq!(r.mean_db, f64::NEG_INFINITY, "n={n}");
            assert_eq!(r.max_db, f64::NEG_INFINITY, "n={n}");
            assert_eq!(r.energy_db, f64::NEG_INFINITY, "n={n}");
            assert_eq!(r.verdict(&Tolerance::default()), Verdict::Pass);
        }
    }

    #[test]
    fn known_relative_errors() {
        // 1% error on one of two elements: dist = [1e-4, 0]
        let reference = [2.0f32, 4.0];
        let measured = [2.02f32, 4.0];
        let r = evaluate(&measured, &reference).unwrap();
        assert!((r.max_db - -40.0).abs() < 1e-3, "{}", r.max_db);
        assert!((r.mean_db - -43.0103).abs() < 1e-3, "{}", r.mean_db);
        assert_eq!(r.elements, 2);
    }

    #[test]
    fn boundary_values_pass() {
        let tol = Tolerance::default();
        let at_limit = DistortionReport {
            mean_db: -80.0,
            max_db: -60.0,
            energy_db: -90.0,
            elements: 1,
        };
        assert_eq!(at_limit.verdict(&tol), Verdict::Pass);
    }

    /// 99 exact elements and one with 0.1% error: dist = [1e-6, 0 × 99].
    fn one_in_a_hundred(measured_last: f32) -> DistortionReport {
        let mut reference = vec![1.0f32; 100];
        reference[99] = 1000.0;
        let mut measured = reference.clone();
        measured[99] = measured_last;
        evaluate(&measured, &reference).unwrap()
    }

    #[test]
    fn measured_pair_on_both_limits_passes() {
        let r = one_in_a_hundred(999.0);
        assert!((r.max_db - -60.0).abs() < 1e-9, "{}", r.max_db);
        assert!((r.mean_db - -80.0).abs() < 1e-9, "{}", r.mean_db);
        assert_eq!(r.verdict(&Tolerance::default()), Verdict::Pass);
    }

    #[test]
    fn measured_pair_just_past_limits_fails() {
        let r = one_in_a_hundred(998.99);
        assert!(r.max_db > -60.0);
        assert!(r.mean_db > -80.0);
        assert_eq!(r.verdict(&Tolerance::default()), Verdict::Fail);
    }

    #[test]
    fn any_excess_fails() {
        let tol = Tolerance::default();
        let base = DistortionReport {
            mean_db: -80.0,
            max_db: -60.0,
            energy_db: -90.0,
            elements: 1,
        };
        let over_max = DistortionReport {
            max_db: -60.0 + 1e-9,
            ..base
        };
        let over_mean = DistortionReport {
            mean_db: -80.0 + 1e-9,
            ..base
        };
        assert_eq!(over_max.verdict(&tol), Verdict::Fail);
        assert_eq!(over_mean.verdict(&tol), Verdict::Fail);
        assert_eq!(over_mean.verdict(&tol).exit_code(), 1);
    }

    #[test]
    fn small_error_passes_and_large_error_fails() {
        let mut rng = Xoshiro::new(23);
        let reference: Vec<f32> = (0..64).map(|_| rng.next_f32() + 0.5).collect();
        let close: Vec<f32> = reference.iter().map(|x| x * (1.0 + 5e-5)).collect();
        let far: Vec<f32> = reference.iter().map(|x| x * (1.0 + 2e-3)).collect();
        let tol = Tolerance::default();
        assert_eq!(evaluate(&close, &reference).unwrap().verdict(&tol), Verdict::Pass);
        assert_eq!(evaluate(&far, &reference).unwrap().verdict(&tol), Verdict::Fail);
    }

    #[test]
    fn zero_reference_with_zero_measurement_is_exact() {
        let r = evaluate(&[0.0, 1.0], &[0.0, 1.0]).unwrap();
        assert_eq!(r.max_db, f64::NEG_INFINITY);
        assert!(!r.mean_db.is_nan());
    }

    #[test]
    fn zero_reference_with_error_is_infinite_and_fails() {
        let r = evaluate(&[1e-6, 1.0], &[0.0, 1.0]).unwrap();
        assert_eq!(r.max_db, f64::INFINITY);
        assert_eq!(r.mean_db, f64::INFINITY);
        assert_eq!(r.verdict(&Tolerance::default()), Verdict::Fail);
    }

    #[test]
    fn nan_measurement_fails_instead_of_passing() {
        let r = evaluate(&[f32::NAN, 1.0], &[1.0, 1.0]).unwrap();
        assert_eq!(r.max_db, f64::INFINITY);
        assert_eq!(r.verdict(&Tolerance::default()), Verdict::Fail);
    }

    #[test]
    fn energy_figure_matches_aggregate_ratio() {
        // Σerr² = 1, Σref² = 117
        let r = evaluate(&[6.0, 8.0], &[6.0, 9.0]).unwrap();
        let expected = to_db(1.0 / (36.0 + 81.0));
        assert!((r.energy_db - expected).abs() < 1e-9);
    }

    #[test]
    fn rejects_empty_and_mismatched_input() {
        assert!(matches!(evaluate(&[], &[]), Err(ConvError::EmptyComparison)));
        assert!(matches!(
            evaluate(&[1.0], &[1.0, 2.0]),
            Err(ConvError::LengthMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn decibel_rendering() {
        assert_eq!(Decibels(f64::INFINITY).to_string(), "Inf dB");
        assert_eq!(Decibels(f64::NEG_INFINITY).to_string(), "-Inf dB");
        assert_eq!(Decibels(-87.254).to_string(), "-87.25 dB");
        assert_eq!(Decibels(-0.5).to_string(), "-0.50 dB");
        assert_eq!(Decibels(3.0).to_string(), "3.00 dB");
    }
}
