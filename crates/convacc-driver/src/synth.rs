//! Deterministic synthetic inputs
//!
//! Xoshiro256++ seeded by SplitMix-style mixing: reproducible across runs and
//! platforms, so a failing seed can be replayed on the bench.

#![allow(clippy::unreadable_literal)]

use crate::error::Result;
use crate::matrix::Matrix;

/// Xoshiro256++ generator.
#[derive(Debug, Clone)]
pub struct Xoshiro {
    s: [u64; 4],
}

impl Xoshiro {
    /// Seed the generator; equal seeds give equal streams.
    pub fn new(seed: u64) -> Self {
        let s = [
            seed ^ 0x9e3779b97f4a7c15,
            seed.wrapping_add(0x6c62272e07bb0142),
            seed.rotate_left(17),
            seed.rotate_right(5),
        ];
        let mut rng = Self { s };
        for _ in 0..20 {
            let _ = rng.next_u64();
        }
        rng
    }

    /// Next raw 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);
        let t = self.s[1].wrapping_shl(17);
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);
        result
    }

    /// Uniform in `[0, 1)`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_f32(&mut self) -> f32 {
        let bits = (self.next_u64() >> 41) as u32 | 0x3f800000;
        f32::from_bits(bits) - 1.0
    }

    /// Uniform integer in `[0, n)`.
    pub fn next_below(&mut self, n: u32) -> u32 {
        // Lemire multiply-shift; bias is below 2^-32 for the small n used here
        #[allow(clippy::cast_possible_truncation)]
        let v = ((self.next_u64() >> 32) * u64::from(n)) >> 32;
        v as u32
    }

    /// `len` values uniform in `[-1, 1)`.
    pub fn gen_f32(&mut self, len: usize) -> Vec<f32> {
        (0..len).map(|_| self.next_f32() * 2.0 - 1.0).collect()
    }
}

/// `rows × cols` matrix of values uniform in `[0, scale)`.
///
/// # Errors
///
/// Returns an error for a zero dimension or failed allocation.
pub fn uniform_matrix(rng: &mut Xoshiro, rows: usize, cols: usize, scale: f32) -> Result<Matrix> {
    let mut m = Matrix::zeros(rows, cols)?;
    for x in m.as_mut_slice() {
        *x = rng.next_f32() * scale;
    }
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_seeds_give_equal_streams() {
        let mut a = Xoshiro::new(42);
        let mut b = Xoshiro::new(42);
        for _ in 0..64 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        assert_ne!(Xoshiro::new(1).next_u64(), Xoshiro::new(2).next_u64());
    }

    #[test]
    fn floats_stay_in_range() {
        let mut rng = Xoshiro::new(7);
        for _ in 0..10_000 {
            let x = rng.next_f32();
            assert!((0.0..1.0).contains(&x));
        }
        assert!(rng.gen_f32(1000).iter().all(|x| (-1.0..1.0).contains(x)));
    }

    #[test]
    fn next_below_stays_below() {
        let mut rng = Xoshiro::new(13);
        let draws: Vec<u32> = (0..5_000).map(|_| rng.next_below(100)).collect();
        assert!(draws.iter().all(|&v| v < 100));
        assert!(draws.iter().any(|&v| v >= 90));
    }

    #[test]
    fn uniform_matrix_has_requested_shape() {
        let mut rng = Xoshiro::new(0);
        let m = uniform_matrix(&mut rng, 3, 5, 0.5).unwrap();
        assert_eq!((m.rows(), m.cols()), (3, 5));
        assert!(m.as_slice().iter().all(|x| (0.0..0.5).contains(x)));
    }
}
