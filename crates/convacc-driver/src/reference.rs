//! Software reference convolution
//!
//! Computes the same valid-region 2-D cross-correlation as the accelerator on
//! the CPU, in `f32`. The inputs are staged through locally owned scratch
//! buffers and the result is copied back to the caller, so the measured
//! cycles cover the same copy-in → compute → copy-out shape as the hardware
//! path:
//!
//! ```text
//! alloc scratch ─► t0 ─► copy in ─► correlate ─► copy out ─► t1
//! ```
//!
//! Allocation happens before `t0` and is not timed.

use crate::clock::CycleClock;
use crate::error::{ConvError, Result};
use crate::matrix::{output_dims, scratch, valid_output_dims, Matrix};
use tracing::info;

/// Result of a timed reference convolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Convolution {
    /// Valid-region output
    pub output: Matrix,
    /// Cycles spent copying in, computing and copying out
    pub elapsed_cycles: u64,
}

/// CPU reference for the accelerator.
#[derive(Debug, Clone)]
pub struct ReferenceEngine<C> {
    clock: C,
}

impl<C: CycleClock> ReferenceEngine<C> {
    /// Time runs with `clock`.
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Convolve into a newly allocated output matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes do not admit a valid convolution or
    /// scratch allocation fails.
    pub fn convolve(&self, data: &Matrix, filter: &Matrix) -> Result<Convolution> {
        let (rows, cols) = output_dims(data, filter)?;
        let mut output = Matrix::zeros(rows, cols)?;
        let elapsed_cycles = self.convolve_into(data, filter, output.as_mut_slice())?;
        Ok(Convolution {
            output,
            elapsed_cycles,
        })
    }

    /// Convolve into a caller-supplied destination, returning elapsed cycles.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes do not admit a valid convolution, `dest`
    /// does not hold exactly the output, or scratch allocation fails.
    pub fn convolve_into(&self, data: &Matrix, filter: &Matrix, dest: &mut [f32]) -> Result<u64> {
        let (out_rows, out_cols) = output_dims(data, filter)?;
        if dest.len() != out_rows * out_cols {
            return Err(ConvError::length_mismatch("destination", out_rows * out_cols, dest.len()));
        }

        let mut data_cached = scratch(data.len())?;
        let mut filt_cached = scratch(filter.len())?;
        let mut result_cached = scratch(dest.len())?;

        let t0 = self.clock.cycles();

        data_cached.copy_from_slice(data.as_slice());
        filt_cached.copy_from_slice(filter.as_slice());

        correlate_valid(
            &data_cached,
            data.cols(),
            data.rows(),
            &filt_cached,
            filter.cols(),
            filter.rows(),
            &mut result_cached,
        )?;

        dest.copy_from_slice(&result_cached);

        let elapsed = self.clock.since(t0);
        info!("Reference execution time = {elapsed} cycles");
        Ok(elapsed)
    }
}

/// Valid-region 2-D cross-correlation on raw row-major slices.
///
/// `out[i][j] = Σ_ki Σ_kj data[i+ki][j+kj] · filt[ki][kj]`, accumulated in
/// `f32` in row-major filter order. The kernel is not flipped.
///
/// # Errors
///
/// Returns an error if the dimensions do not describe the slices or do not
/// admit a valid convolution.
pub fn correlate_valid(
    data: &[f32],
    data_cols: usize,
    data_rows: usize,
    filt: &[f32],
    filt_cols: usize,
    filt_rows: usize,
    out: &mut [f32],
) -> Result<()> {
    let (out_rows, out_cols) = valid_output_dims(data_rows, data_cols, filt_rows, filt_cols)?;
    if data.len() != data_rows * data_cols {
        return Err(ConvError::length_mismatch("data", data_rows * data_cols, data.len()));
    }
    if filt.len() != filt_rows * filt_cols {
        return Err(ConvError::length_mismatch("filter", filt_rows * filt_cols, filt.len()));
    }
    if out.len() != out_rows * out_cols {
        return Err(ConvError::length_mismatch("output", out_rows * out_cols, out.len()));
    }

    for i in 0..out_rows {
        for j in 0..out_cols {
            let mut sum = 0.0f32;
            for ki in 0..filt_rows {
                for kj in 0..filt_cols {
                    sum += data[(i + ki) * data_cols + (j + kj)] * filt[ki * filt_cols + kj];
                }
            }
            out[i * out_cols + j] = sum;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::HostClock;
    use crate::synth::Xoshiro;

    fn engine() -> ReferenceEngine<HostClock> {
        ReferenceEngine::new(HostClock::new())
    }

    fn random(rng: &mut Xoshiro, rows: usize, cols: usize) -> Matrix {
        Matrix::from_vec(rows, cols, rng.gen_f32(rows * cols)).unwrap()
    }

    #[test]
    fn known_small_case() {
        // data:        filter:
        // 1 2 3        1 0
        // 4 5 6        0 1
        // 7 8 9
        let data = Matrix::from_vec(3, 3, (1..=9).map(|x| x as f32).collect()).unwrap();
        let filter = Matrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let out = engine().convolve(&data, &filter).unwrap().output;
        assert_eq!((out.rows(), out.cols()), (2, 2));
        assert_eq!(out.as_slice(), &[6.0, 8.0, 12.0, 14.0]);
    }

    #[test]
    fn kernel_is_not_flipped() {
        let data = Matrix::from_vec(1, 3, vec![1.0, 2.0, 3.0]).unwrap();
        let filter = Matrix::from_vec(1, 2, vec![1.0, 10.0]).unwrap();
        let out = engine().convolve(&data, &filter).unwrap().output;
        assert_eq!(out.as_slice(), &[21.0, 32.0]);
    }

    #[test]
    fn output_dims_hold_for_every_admissible_shape() {
        let mut rng = Xoshiro::new(11);
        for dr in 1..=6 {
            for dc in 1..=6 {
                let data = random(&mut rng, dr, dc);
                for fr in 1..=dr {
                    for fc in 1..=dc {
                        let filter = random(&mut rng, fr, fc);
                        let out = engine().convolve(&data, &filter).unwrap().output;
                        assert_eq!((out.rows(), out.cols()), (dr - fr + 1, dc - fc + 1));
                    }
                }
            }
        }
    }

    #[test]
    fn deterministic_bit_for_bit() {
        let mut rng = Xoshiro::new(3);
        let data = random(&mut rng, 16, 12);
        let filter = random(&mut rng, 3, 5);
        let a = engine().convolve(&data, &filter).unwrap().output;
        let b = engine().convolve(&data, &filter).unwrap().output;
        let bits = |m: &Matrix| m.as_slice().iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn unit_filter_is_identity() {
        let mut rng = Xoshiro::new(5);
        let data = random(&mut rng, 9, 7);
        let filter = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
        let out = engine().convolve(&data, &filter).unwrap().output;
        assert_eq!(out, data);
    }

    #[test]
    fn linear_in_filter_scale() {
        let mut rng = Xoshiro::new(9);
        let data = random(&mut rng, 12, 12);
        let filter = random(&mut rng, 3, 4);
        for k in [-3.0f32, 0.5, 2.0, 1e3] {
            let base = engine().convolve(&data, &filter).unwrap().output;
            let scaled = engine().convolve(&data, &filter.scaled(k)).unwrap().output;
            // Every |term| <= |k|, so rounding is bounded by the term count
            let tol = 1e-5 * k.abs() * filter.len() as f32;
            for (s, b) in scaled.as_slice().iter().zip(base.as_slice()) {
                let expected = k * b;
                assert!((s - expected).abs() <= tol, "k={k}: {s} vs {expected}");
            }
        }
    }

    #[test]
    fn filter_equal_to_data_gives_single_dot_product() {
        let data = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let filter = Matrix::from_vec(2, 2, vec![4.0, 3.0, 2.0, 1.0]).unwrap();
        let out = engine().convolve(&data, &filter).unwrap().output;
        assert_eq!(out.as_slice(), &[20.0]);
    }

    #[test]
    fn convolve_into_checks_destination() {
        let data = Matrix::zeros(4, 4).unwrap();
        let filter = Matrix::zeros(2, 2).unwrap();
        let mut dest = vec![0.0; 8];
        assert!(matches!(
            engine().convolve_into(&data, &filter, &mut dest),
            Err(ConvError::LengthMismatch { expected: 9, actual: 8, .. })
        ));
    }

    #[test]
    fn oversized_filter_is_rejected() {
        let data = Matrix::zeros(2, 8).unwrap();
        let filter = Matrix::zeros(3, 1).unwrap();
        assert!(matches!(
            engine().convolve(&data, &filter),
            Err(ConvError::InvalidShape { .. })
        ));
    }

    #[test]
    fn elapsed_cycles_are_monotonic_with_sampling() {
        let clock = HostClock::new();
        let before = clock.cycles();
        let engine = ReferenceEngine::new(&clock);
        let mut rng = Xoshiro::new(1);
        let data = random(&mut rng, 32, 32);
        let filter = random(&mut rng, 1, 32);
        let run = engine.convolve(&data, &filter).unwrap();
        let after = clock.cycles();
        assert!(run.elapsed_cycles <= after - before);
    }
}
