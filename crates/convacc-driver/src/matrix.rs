//! Row-major `f32` matrix buffers shared by the hardware and software paths.

use crate::error::{ConvError, Result};

/// Contiguous row-major matrix of `f32`.
///
/// The storage never moves while a `Matrix` is borrowed, so its address can be
/// handed to the accelerator for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Allocate a zero-filled `rows × cols` matrix.
    ///
    /// # Errors
    ///
    /// Returns `InvalidShape` for a zero dimension and `AllocationFailed` if
    /// the buffer cannot be reserved.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        let len = element_count(rows, cols)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| ConvError::AllocationFailed { elements: len })?;
        data.resize(len, 0.0);
        Ok(Self { rows, cols, data })
    }

    /// Wrap an existing row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if `data.len() != rows * cols` or a dimension is zero.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        let len = element_count(rows, cols)?;
        if data.len() != len {
            return Err(ConvError::length_mismatch("matrix data", len, data.len()));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a matrix by evaluating `f(row, col)` for every element.
    ///
    /// # Errors
    ///
    /// Same as [`Matrix::zeros`].
    pub fn from_fn(
        rows: usize,
        cols: usize,
        mut f: impl FnMut(usize, usize) -> f32,
    ) -> Result<Self> {
        let mut m = Self::zeros(rows, cols)?;
        for r in 0..rows {
            for c in 0..cols {
                m.data[r * cols + c] = f(r, c);
            }
        }
        Ok(m)
    }

    /// Row count.
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Column count.
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false: zero-sized matrices cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if the index is outside the matrix.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        assert!(row < self.rows && col < self.cols, "index ({row}, {col}) out of bounds");
        self.data[row * self.cols + col]
    }

    /// Row-major element slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable row-major element slice.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Multiply every element by `k`.
    #[must_use]
    pub fn scaled(&self, k: f32) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|x| x * k).collect(),
        }
    }

    /// Consume into the row-major buffer.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Output dimensions `(rows, cols)` of a valid (non-padded) convolution.
///
/// # Errors
///
/// Returns `InvalidShape` if either operand has a zero dimension or the
/// filter is larger than the data along either axis.
pub fn valid_output_dims(
    data_rows: usize,
    data_cols: usize,
    filter_rows: usize,
    filter_cols: usize,
) -> Result<(usize, usize)> {
    if data_rows == 0 || data_cols == 0 || filter_rows == 0 || filter_cols == 0 {
        return Err(ConvError::invalid_shape(format!(
            "zero dimension: data {data_rows}×{data_cols}, filter {filter_rows}×{filter_cols}"
        )));
    }
    if filter_rows > data_rows || filter_cols > data_cols {
        return Err(ConvError::invalid_shape(format!(
            "filter {filter_rows}×{filter_cols} exceeds data {data_rows}×{data_cols}"
        )));
    }
    Ok((data_rows - filter_rows + 1, data_cols - filter_cols + 1))
}

/// [`valid_output_dims`] for two matrices.
///
/// # Errors
///
/// See [`valid_output_dims`].
pub fn output_dims(data: &Matrix, filter: &Matrix) -> Result<(usize, usize)> {
    valid_output_dims(data.rows, data.cols, filter.rows, filter.cols)
}

/// Zero-filled buffer of `len` elements, reporting allocation failure.
pub(crate) fn scratch(len: usize) -> Result<Vec<f32>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| ConvError::AllocationFailed { elements: len })?;
    buf.resize(len, 0.0);
    Ok(buf)
}

fn element_count(rows: usize, cols: usize) -> Result<usize> {
    if rows == 0 || cols == 0 {
        return Err(ConvError::invalid_shape(format!("zero dimension {rows}×{cols}")));
    }
    rows.checked_mul(cols)
        .ok_or_else(|| ConvError::invalid_shape(format!("{rows}×{cols} overflows usize")))
}
