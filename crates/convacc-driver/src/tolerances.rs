//! Acceptance tolerances for hardware/software agreement.
//!
//! Both limits are in dB of normalized squared relative error (see
//! [`crate::distortion`]); a run passes when both measured values are at or
//! below their limit.
//!
//! | Limit | Value | Meaning |
//! |-------|-------|---------|
//! | max | −60 dB | worst element within 0.1% relative error |
//! | mean | −80 dB | average element within 0.01% relative error |

/// Largest acceptable per-element distortion.
pub const MAX_DISTORTION_DB: f64 = -60.0;

/// Largest acceptable mean distortion.
pub const MEAN_DISTORTION_DB: f64 = -80.0;

/// Pass/fail limits applied to a [`crate::DistortionReport`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// Limit on max distortion (dB)
    pub max_db: f64,
    /// Limit on mean distortion (dB)
    pub mean_db: f64,
}

impl Tolerance {
    /// Custom limits.
    pub const fn new(max_db: f64, mean_db: f64) -> Self {
        Self { max_db, mean_db }
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::new(MAX_DISTORTION_DB, MEAN_DISTORTION_DB)
    }
}
