//! Co-verification harness
//!
//! Runs one convolution on the accelerator and on the software reference with
//! identical synthetic inputs and scores the agreement:
//!
//! ```text
//! allocate ─► fill (seeded PRNG) ─► accelerator ─► reference ─► evaluate ─► verdict
//! ```

use crate::accelerator::{Accelerator, PollPolicy};
use crate::backend::RegisterIo;
use crate::clock::CycleClock;
use crate::distortion::{evaluate, DistortionReport, Verdict};
use crate::error::Result;
use crate::matrix::{valid_output_dims, Matrix};
use crate::reference::ReferenceEngine;
use crate::synth::{uniform_matrix, Xoshiro};
use crate::tolerances::Tolerance;
use convacc_chip::regs::RegisterMap;
use tracing::{debug, info};

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 0x00c0_ffee;

/// Inputs are uniform in `[0, DEFAULT_INPUT_SCALE)`.
pub const DEFAULT_INPUT_SCALE: f32 = 0.5;

/// Shapes, inputs and limits for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Source data rows
    pub data_rows: usize,
    /// Source data columns
    pub data_cols: usize,
    /// Filter rows
    pub filter_rows: usize,
    /// Filter columns
    pub filter_cols: usize,
    /// PRNG seed for both inputs
    pub seed: u64,
    /// Upper bound (exclusive) of input values
    pub input_scale: f32,
    /// Wait policy for the accelerator
    pub poll: PollPolicy,
    /// Pass/fail limits
    pub tolerance: Tolerance,
}

impl Default for HarnessConfig {
    /// 32×32 data against a 1×32 filter.
    fn default() -> Self {
        Self {
            data_rows: 32,
            data_cols: 32,
            filter_rows: 1,
            filter_cols: 32,
            seed: DEFAULT_SEED,
            input_scale: DEFAULT_INPUT_SCALE,
            poll: PollPolicy::default(),
            tolerance: Tolerance::default(),
        }
    }
}

impl HarnessConfig {
    /// Set the data shape.
    #[must_use]
    pub fn with_data(mut self, rows: usize, cols: usize) -> Self {
        self.data_rows = rows;
        self.data_cols = cols;
        self
    }

    /// Set the filter shape.
    #[must_use]
    pub fn with_filter(mut self, rows: usize, cols: usize) -> Self {
        self.filter_rows = rows;
        self.filter_cols = cols;
        self
    }

    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the input range.
    #[must_use]
    pub fn with_input_scale(mut self, scale: f32) -> Self {
        self.input_scale = scale;
        self
    }

    /// Set the poll policy.
    #[must_use]
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Set the limits.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Output shape, or an error if the shapes do not admit a valid convolution.
    ///
    /// # Errors
    ///
    /// Returns `InvalidShape` for a zero dimension or a filter larger than the data.
    pub fn output_dims(&self) -> Result<(usize, usize)> {
        valid_output_dims(self.data_rows, self.data_cols, self.filter_rows, self.filter_cols)
    }
}

/// Outcome of one co-verification run.
#[derive(Debug, Clone)]
pub struct HarnessReport {
    /// Accelerator cycles, strobe to idle
    pub hw_cycles: u64,
    /// Reference cycles, copy-in to copy-out
    pub sw_cycles: u64,
    /// Agreement between the two outputs
    pub distortion: DistortionReport,
    /// Verdict under the configured tolerance
    pub verdict: Verdict,
    /// Accelerator output
    pub measured: Matrix,
    /// Reference output
    pub reference: Matrix,
}

/// Drives one run per call.
#[derive(Debug, Clone, Default)]
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    /// Harness for `config`.
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Build a driver for `io` with this harness's poll policy.
    pub fn accelerator<R: RegisterIo, C: CycleClock>(
        &self,
        io: R,
        map: RegisterMap,
        clock: C,
    ) -> Accelerator<R, C> {
        Accelerator::new(io, map, clock).with_poll_policy(self.config.poll)
    }

    /// Generate the data and filter matrices for the configured seed.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero dimension or failed allocation.
    pub fn inputs(&self) -> Result<(Matrix, Matrix)> {
        let c = &self.config;
        let mut rng = Xoshiro::new(c.seed);
        let data = uniform_matrix(&mut rng, c.data_rows, c.data_cols, c.input_scale)?;
        let filter = uniform_matrix(&mut rng, c.filter_rows, c.filter_cols, c.input_scale)?;
        Ok((data, filter))
    }

    /// Run the accelerator and the reference on the same inputs and compare.
    ///
    /// A tolerance failure is reported through [`HarnessReport::verdict`], not
    /// as an error. The inputs generated here are never handed to the device
    /// directly (see [`Accelerator::run`]), so returning early on a device
    /// timeout frees nothing the device can still reach.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid shape, failed allocation, or any device
    /// fault (busy, timeout, abandoned).
    pub fn run<R, C, K>(
        &self,
        accelerator: &mut Accelerator<R, C>,
        reference: &ReferenceEngine<K>,
    ) -> Result<HarnessReport>
    where
        R: RegisterIo,
        C: CycleClock,
        K: CycleClock,
    {
        let (out_rows, out_cols) = self.config.output_dims()?;
        let (data, filter) = self.inputs()?;
        let mut measured = Matrix::zeros(out_rows, out_cols)?;
        debug!(
            "Harness: data {}×{}, filter {}×{}, seed {:#x}",
            data.rows(),
            data.cols(),
            filter.rows(),
            filter.cols(),
            self.config.seed
        );

        let hw_cycles = accelerator.run(&data, &filter, measured.as_mut_slice())?;
        let sw = reference.convolve(&data, &filter)?;
        let distortion = evaluate(measured.as_slice(), sw.output.as_slice())?;
        let verdict = distortion.verdict(&self.config.tolerance);

        info!(
            "Co-verification {verdict}: mean {}, max {}",
            distortion.mean(),
            distortion.max()
        );

        Ok(HarnessReport {
            hw_cycles,
            sw_cycles: sw.elapsed_cycles,
            distortion,
            verdict,
            measured,
            reference: sw.output,
        })
    }
}
