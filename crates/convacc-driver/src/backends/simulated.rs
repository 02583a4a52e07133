//! Simulated accelerator backend
//!
//! Behavioural model of the convolution tile behind the same register window
//! the hardware exposes. It lets the full driver protocol and the acceptance
//! test run on a development host or in CI:
//!
//! ```text
//! write config regs ──► START=1 ──► BUSY=1 for `latency_polls` reads
//!                                    └─► DMA in, correlate, DMA out ──► BUSY=0
//! ```
//!
//! The model accumulates in `f64` and rounds once per output element, which
//! is how the tile's wide accumulator differs from the CPU's `f32`
//! accumulation. The resulting distortion sits far below the acceptance
//! thresholds.

use crate::backend::{BackendType, RegisterIo};
use convacc_chip::regs::{Register, RegisterMap, RegisterWidth, BUSY_IDLE, START_TRIGGER};
use tracing::{debug, warn};

/// Polls the model stays busy for by default.
pub const DEFAULT_LATENCY_POLLS: u32 = 8;

/// Configuration latched when the start strobe is written.
#[derive(Debug, Clone, Copy)]
struct LatchedJob {
    data_addr: u64,
    data_cols: usize,
    data_rows: usize,
    filt_addr: u64,
    filt_cols: usize,
    filt_rows: usize,
    dest_addr: u64,
}

/// In-process model of the accelerator.
#[derive(Debug)]
pub struct SimulatedAccelerator {
    map: RegisterMap,
    /// Register file indexed by [`Register::index`]
    values: [u64; Register::ALL.len()],
    /// Job in flight and polls remaining before it completes
    in_flight: Option<(LatchedJob, u32)>,
    latency_polls: u32,
    hung: bool,
    output_gain: f32,
    /// Register writes in arrival order
    writes: Vec<(Register, u64)>,
    completed: u64,
    busy_polls: u64,
    ignored_strobes: u64,
}

impl SimulatedAccelerator {
    /// Create an idle simulated device answering at `map`'s offsets.
    ///
    /// # Safety
    ///
    /// When the start strobe is written, the model reads `DATA_ROWS × DATA_COLS`
    /// and `FILT_ROWS × FILT_COLS` `f32`s from the programmed source pointers
    /// and writes the valid-region output to the destination pointer, exactly
    /// like the hardware's DMA engine. The caller guarantees that those
    /// addresses are valid for the programmed sizes from the strobe until
    /// `BUSY` reads zero, and that nothing else accesses the destination
    /// meanwhile. [`crate::Accelerator::run`] upholds this.
    pub unsafe fn new(map: RegisterMap) -> Self {
        Self {
            map,
            values: [0; Register::ALL.len()],
            in_flight: None,
            latency_polls: DEFAULT_LATENCY_POLLS,
            hung: false,
            output_gain: 1.0,
            writes: Vec::new(),
            completed: 0,
            busy_polls: 0,
            ignored_strobes: 0,
        }
    }

    /// Stay busy for `polls` reads of `BUSY` after each strobe.
    #[must_use]
    pub fn with_latency_polls(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    /// Never complete: `BUSY` stays set once triggered.
    #[must_use]
    pub fn hung(mut self) -> Self {
        self.hung = true;
        self
    }

    /// Scale every output element by `gain` (fault injection).
    #[must_use]
    pub fn with_output_gain(mut self, gain: f32) -> Self {
        self.output_gain = gain;
        self
    }

    /// Register writes seen so far, in order.
    pub fn writes(&self) -> &[(Register, u64)] {
        &self.writes
    }

    /// Jobs run to completion.
    pub const fn completed(&self) -> u64 {
        self.completed
    }

    /// Reads of `BUSY` that returned nonzero.
    pub const fn busy_polls(&self) -> u64 {
        self.busy_polls
    }

    /// Strobes ignored because a job was already in flight.
    pub const fn ignored_strobes(&self) -> u64 {
        self.ignored_strobes
    }

    /// Whether a job is in flight.
    pub const fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    fn decode(&self, offset: usize, width: RegisterWidth) -> Register {
        let reg = self
            .map
            .decode(offset)
            .unwrap_or_else(|| panic!("No register at offset {offset:#x}"));
        assert_eq!(
            reg.width(),
            width,
            "{} accessed with {} bytes",
            reg.name(),
            width.bytes()
        );
        reg
    }

    fn value(&self, reg: Register) -> u64 {
        self.values[reg.index()]
    }

    fn store(&mut self, reg: Register, value: u64) {
        assert!(reg.is_writable(), "{} is read-only", reg.name());
        self.writes.push((reg, value));
        if reg == Register::Start {
            if value == u64::from(START_TRIGGER) {
                self.strobe();
            }
            return;
        }
        self.values[reg.index()] = value;
    }

    fn load(&mut self, reg: Register) -> u64 {
        match reg {
            // Self-clearing strobe
            Register::Start => 0,
            Register::Busy => u64::from(self.poll_busy()),
            _ => self.value(reg),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn strobe(&mut self) {
        if self.in_flight.is_some() {
            self.ignored_strobes += 1;
            warn!("Simulated accelerator: START while busy ignored");
            return;
        }
        let job = LatchedJob {
            data_addr: self.value(Register::DataAddr),
            data_cols: self.value(Register::DataCols) as usize,
            data_rows: self.value(Register::DataRows) as usize,
            filt_addr: self.value(Register::FiltAddr),
            filt_cols: self.value(Register::FiltCols) as usize,
            filt_rows: self.value(Register::FiltRows) as usize,
            dest_addr: self.value(Register::DestAddr),
        };
        debug!(
            "Simulated accelerator: start data {}×{} filter {}×{}",
            job.data_rows, job.data_cols, job.filt_rows, job.filt_cols
        );
        self.in_flight = Some((job, self.latency_polls));
    }

    fn poll_busy(&mut self) -> u32 {
        let Some((job, remaining)) = self.in_flight else {
            return BUSY_IDLE;
        };
        if self.hung || remaining > 0 {
            self.busy_polls += 1;
            if !self.hung {
                self.in_flight = Some((job, remaining - 1));
            }
            return 1;
        }
        self.execute(&job);
        self.in_flight = None;
        self.completed += 1;
        BUSY_IDLE
    }

    fn execute(&self, job: &LatchedJob) {
        if job.filt_rows == 0
            || job.filt_cols == 0
            || job.filt_rows > job.data_rows
            || job.filt_cols > job.data_cols
        {
            warn!("Simulated accelerator: empty valid region, nothing written");
            return;
        }
        let out_rows = job.data_rows - job.filt_rows + 1;
        let out_cols = job.data_cols - job.filt_cols + 1;

        // SAFETY: the constructor's contract makes every programmed address
        // valid for the programmed sizes until BUSY reads zero, which has not
        // happened yet. Source and destination do not alias (the driver
        // borrows the destination mutably).
        let (data, filt, dest) = unsafe {
            (
                std::slice::from_raw_parts(
                    job.data_addr as *const f32,
                    job.data_rows * job.data_cols,
                ),
                std::slice::from_raw_parts(
                    job.filt_addr as *const f32,
                    job.filt_rows * job.filt_cols,
                ),
                std::slice::from_raw_parts_mut(job.dest_addr as *mut f32, out_rows * out_cols),
            )
        };

        for i in 0..out_rows {
            for j in 0..out_cols {
                let mut acc = 0.0f64;
                for ki in 0..job.filt_rows {
                    let d = &data[(i + ki) * job.data_cols + j..][..job.filt_cols];
                    let f = &filt[ki * job.filt_cols..][..job.filt_cols];
                    acc += d
                        .iter()
                        .zip(f)
                        .map(|(&x, &w)| f64::from(x) * f64::from(w))
                        .sum::<f64>();
                }
                #[allow(clippy::cast_possible_truncation)]
                let value = acc as f32;
                dest[i * out_cols + j] = value * self.output_gain;
            }
        }
    }
}

impl RegisterIo for SimulatedAccelerator {
    #[allow(clippy::cast_possible_truncation)]
    fn read32(&mut self, offset: usize) -> u32 {
        let reg = self.decode(offset, RegisterWidth::W32);
        self.load(reg) as u32
    }

    fn write32(&mut self, offset: usize, value: u32) {
        let reg = self.decode(offset, RegisterWidth::W32);
        self.store(reg, u64::from(value));
    }

    fn read64(&mut self, offset: usize) -> u64 {
        let reg = self.decode(offset, RegisterWidth::W64);
        self.load(reg)
    }

    fn write64(&mut self, offset: usize, value: u64) {
        let reg = self.decode(offset, RegisterWidth::W64);
        self.store(reg, value);
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Simulated
    }
}
