//! Matrix-vector product used by the CPU microbenchmark.

use crate::error::{ConvError, Result};
use crate::matrix::Matrix;

/// `a · v` as row-major dot products accumulated in `f32`.
///
/// # Errors
///
/// Returns `LengthMismatch` if `v` does not have `a.cols()` elements.
pub fn multiply(a: &Matrix, v: &[f32]) -> Result<Vec<f32>> {
    let mut out = vec![0.0; a.rows()];
    multiply_into(a, v, &mut out)?;
    Ok(out)
}

/// `a · v` into `out`.
///
/// # Errors
///
/// Returns `LengthMismatch` if `v` does not have `a.cols()` elements or `out`
/// does not have `a.rows()`.
pub fn multiply_into(a: &Matrix, v: &[f32], out: &mut [f32]) -> Result<()> {
    if v.len() != a.cols() {
        return Err(ConvError::length_mismatch("vector", a.cols(), v.len()));
    }
    if out.len() != a.rows() {
        return Err(ConvError::length_mismatch("output", a.rows(), out.len()));
    }
    for (row, o) in a.as_slice().chunks_exact(a.cols()).zip(out.iter_mut()) {
        let mut sum = 0.0f32;
        for (x, y) in row.iter().zip(v) {
            sum += x * y;
        }
        *o = sum;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_product() {
        let a = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(multiply(&a, &[1.0, 0.0, -1.0]).unwrap(), vec![-2.0, -2.0]);
    }

    #[test]
    fn identity_returns_vector() {
        let n = 16;
        let a = Matrix::from_fn(n, n, |r, c| if r == c { 1.0 } else { 0.0 }).unwrap();
        let v: Vec<f32> = (0..n).map(|i| i as f32 * 0.5).collect();
        assert_eq!(multiply(&a, &v).unwrap(), v);
    }

    #[test]
    fn integer_inputs_are_exact() {
        // 64 terms of at most 99·99 stay well inside f32's exact integer range
        let n = 64;
        let a = Matrix::from_fn(n, n, |r, c| ((r * 7 + c * 3) % 100) as f32).unwrap();
        let v: Vec<f32> = (0..n).map(|i| ((i * 11) % 100) as f32).collect();
        let got = multiply(&a, &v).unwrap();
        for (r, g) in got.iter().enumerate() {
            let exact: u64 = (0..n)
                .map(|c| ((r * 7 + c * 3) % 100) as u64 * ((c * 11) % 100) as u64)
                .sum();
            assert_eq!(*g, exact as f32);
        }
    }

    #[test]
    fn length_checks() {
        let a = Matrix::zeros(3, 4).unwrap();
        assert!(matches!(
            multiply(&a, &[0.0; 3]),
            Err(ConvError::LengthMismatch { what: "vector", .. })
        ));
        let mut out = [0.0; 2];
        assert!(matches!(
            multiply_into(&a, &[0.0; 4], &mut out),
            Err(ConvError::LengthMismatch { what: "output", .. })
        ));
    }
}
