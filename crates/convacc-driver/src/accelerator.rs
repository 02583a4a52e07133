//! Accelerator driver: register handshake, busy-poll and cycle timing
//!
//! One invocation is strictly request → wait-for-completion → collect:
//!
//! ```text
//! BUSY? ─► DATA_ADDR/COLS/ROWS, FILT_ADDR/COLS/ROWS, DEST_ADDR
//!       ─► t0 ─► START=1 ─► poll BUSY until 0 ─► t1 ─► t1 − t0
//! ```
//!
//! There are no retries. A device that never clears `BUSY` is bounded by the
//! [`PollPolicy`]; [`PollPolicy::Unbounded`] keeps the lab-bench behaviour of
//! spinning forever.
//!
//! [`Accelerator::run`] hands the device driver-owned copies of the caller's
//! buffers. If the poll policy expires the job may still be running, so those
//! copies stay with the driver until [`Accelerator::recover`] sees `BUSY`
//! clear, and are leaked rather than freed if the driver is dropped first.

use crate::backend::RegisterIo;
use crate::clock::CycleClock;
use crate::error::{ConvError, Result};
use crate::matrix::{output_dims, scratch, valid_output_dims, Matrix};
use convacc_chip::regs::{Register, RegisterMap, BUSY_IDLE, START_TRIGGER};
use std::sync::atomic::{fence, Ordering};
use tracing::{debug, info, warn};

/// Default bound on busy reads before reporting a timeout.
pub const DEFAULT_MAX_POLLS: u64 = 1 << 24;

/// How long to wait for `BUSY` to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPolicy {
    /// Spin until the device completes, however long that takes.
    Unbounded,
    /// Give up after this many reads of `BUSY`.
    MaxPolls(u64),
    /// Give up once this many cycles have elapsed since the strobe.
    MaxCycles(u64),
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::MaxPolls(DEFAULT_MAX_POLLS)
    }
}

/// One convolution request in register terms.
///
/// Addresses are what the device masters: physical addresses on hardware,
/// process addresses for the simulated backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvJob {
    /// Source data address
    pub data_addr: u64,
    /// Source data columns
    pub data_cols: usize,
    /// Source data rows
    pub data_rows: usize,
    /// Filter address
    pub filt_addr: u64,
    /// Filter columns
    pub filt_cols: usize,
    /// Filter rows
    pub filt_rows: usize,
    /// Destination address
    pub dest_addr: u64,
}

/// Driver-owned copies of one job's buffers; the device masters these.
#[derive(Debug)]
struct Staging {
    data: Vec<f32>,
    filter: Vec<f32>,
    dest: Vec<f32>,
}

impl Staging {
    fn new(data: &Matrix, filter: &Matrix, out_len: usize) -> Result<Self> {
        let mut staged = Self {
            data: scratch(data.len())?,
            filter: scratch(filter.len())?,
            dest: scratch(out_len)?,
        };
        staged.data.copy_from_slice(data.as_slice());
        staged.filter.copy_from_slice(filter.as_slice());
        Ok(staged)
    }
}

/// Driver for one accelerator instance.
#[derive(Debug)]
pub struct Accelerator<R, C> {
    io: R,
    map: RegisterMap,
    clock: C,
    poll: PollPolicy,
    /// Set once a job was abandoned on timeout; the device may still own it
    abandoned: bool,
    /// Buffers of abandoned jobs, held until BUSY is seen clear
    quarantine: Vec<Staging>,
}

impl<R: RegisterIo, C: CycleClock> Accelerator<R, C> {
    /// Drive the device behind `io`, addressed through `map`.
    pub fn new(io: R, map: RegisterMap, clock: C) -> Self {
        Self {
            io,
            map,
            clock,
            poll: PollPolicy::default(),
            abandoned: false,
            quarantine: Vec::new(),
        }
    }

    /// Replace the poll policy.
    #[must_use]
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Active poll policy
    pub const fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    /// Register map in use
    pub const fn register_map(&self) -> &RegisterMap {
        &self.map
    }

    /// Register backend
    pub fn io(&self) -> &R {
        &self.io
    }

    /// Whether a timed-out job left the device unusable
    pub const fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Buffer sets held back from timed-out jobs
    pub fn quarantined(&self) -> usize {
        self.quarantine.len()
    }

    /// Read `BUSY` once after a timeout. If the device has gone idle, release
    /// the held buffers and accept new jobs again.
    ///
    /// Returns whether the driver is usable. A driver that never timed out
    /// returns `true` without touching the device.
    pub fn recover(&mut self) -> bool {
        if !self.abandoned {
            return true;
        }
        if self.read32(Register::Busy) != BUSY_IDLE {
            return false;
        }
        // Late device writes happen-before the buffers are freed
        fence(Ordering::Acquire);
        info!(
            "Accelerator idle again; releasing {} held buffer set(s)",
            self.quarantine.len()
        );
        self.quarantine.clear();
        self.abandoned = false;
        true
    }

    /// Run a valid convolution of `data` with `filter` on the device, writing
    /// the result into `dest`. Returns the elapsed cycles between the strobe
    /// and `BUSY` clearing.
    ///
    /// The inputs are copied into driver-owned buffers before programming and
    /// the output is copied back once `BUSY` clears; neither copy is timed.
    /// The caller's buffers are never handed to the device, so they are free
    /// to drop as soon as this returns, whatever the outcome.
    ///
    /// If the poll policy expires, the staged buffers are kept by the driver
    /// (see [`Accelerator::recover`]) and every later call fails with
    /// `DeviceAbandoned` until the device is seen idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes do not admit a valid convolution, `dest`
    /// does not hold exactly the output, a dimension overflows its register,
    /// the device is already busy, or the poll policy expires.
    pub fn run(&mut self, data: &Matrix, filter: &Matrix, dest: &mut [f32]) -> Result<u64> {
        if self.abandoned {
            return Err(ConvError::DeviceAbandoned);
        }
        let (rows, cols) = output_dims(data, filter)?;
        if dest.len() != rows * cols {
            return Err(ConvError::length_mismatch("destination", rows * cols, dest.len()));
        }

        let mut staged = Staging::new(data, filter, dest.len())?;
        let job = ConvJob {
            data_addr: staged.data.as_ptr() as u64,
            data_cols: data.cols(),
            data_rows: data.rows(),
            filt_addr: staged.filter.as_ptr() as u64,
            filt_cols: filter.cols(),
            filt_rows: filter.rows(),
            dest_addr: staged.dest.as_mut_ptr() as u64,
        };

        // SAFETY: the staged buffers are owned here and sized for the job. On
        // success the device is idle before they are read or dropped; on a
        // timeout they move into the quarantine, whose heap storage does not
        // move, and are only freed once BUSY reads idle.
        match unsafe { self.submit(job) } {
            Ok(cycles) => {
                dest.copy_from_slice(&staged.dest);
                Ok(cycles)
            }
            Err(e @ ConvError::DeviceTimeout { .. }) => {
                warn!("Holding staged buffers until the device reports idle");
                self.quarantine.push(staged);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Issue `job` and wait for it to complete.
    ///
    /// # Safety
    ///
    /// The device will read the source buffers and write the destination at
    /// the given addresses. They must be valid for the job's dimensions and
    /// must not be freed, moved or modified (destination: accessed at all)
    /// until this call returns. On a timeout the device may still be running,
    /// so the buffers must then be kept alive until [`Accelerator::recover`]
    /// returns `true`.
    ///
    /// # Errors
    ///
    /// See [`Accelerator::run`].
    pub unsafe fn submit(&mut self, job: ConvJob) -> Result<u64> {
        if self.abandoned {
            return Err(ConvError::DeviceAbandoned);
        }
        valid_output_dims(job.data_rows, job.data_cols, job.filt_rows, job.filt_cols)?;
        let data_cols = dim32(Register::DataCols, job.data_cols)?;
        let data_rows = dim32(Register::DataRows, job.data_rows)?;
        let filt_cols = dim32(Register::FiltCols, job.filt_cols)?;
        let filt_rows = dim32(Register::FiltRows, job.filt_rows)?;

        let status = self.read32(Register::Busy);
        if status != BUSY_IDLE {
            return Err(ConvError::DeviceBusy { status });
        }

        debug!(
            "Programming {} accelerator: data {}×{} @ {:#x}, filter {}×{} @ {:#x}, dest @ {:#x}",
            self.io.backend_type(),
            job.data_rows,
            job.data_cols,
            job.data_addr,
            job.filt_rows,
            job.filt_cols,
            job.filt_addr,
            job.dest_addr
        );

        self.write64(Register::DataAddr, job.data_addr);
        self.write32(Register::DataCols, data_cols);
        self.write32(Register::DataRows, data_rows);
        self.write64(Register::FiltAddr, job.filt_addr);
        self.write32(Register::FiltCols, filt_cols);
        self.write32(Register::FiltRows, filt_rows);
        self.write64(Register::DestAddr, job.dest_addr);

        // Buffer contents and configuration must be visible before the strobe
        fence(Ordering::Release);

        let t0 = self.clock.cycles();
        self.write32(Register::Start, START_TRIGGER);
        self.wait_idle(t0)?;
        let t1 = self.clock.cycles();

        // Device writes to dest happen-before our reads of it
        fence(Ordering::Acquire);

        let elapsed = t1.saturating_sub(t0);
        info!("HW accelerator execution time = {elapsed} cycles");
        Ok(elapsed)
    }

    fn wait_idle(&mut self, t0: u64) -> Result<()> {
        let mut polls: u64 = 0;
        loop {
            if self.read32(Register::Busy) == BUSY_IDLE {
                debug!("BUSY cleared after {polls} polls");
                return Ok(());
            }
            polls += 1;
            let expired = match self.poll {
                PollPolicy::Unbounded => false,
                PollPolicy::MaxPolls(max) => polls >= max,
                PollPolicy::MaxCycles(max) => self.clock.since(t0) >= max,
            };
            if expired {
                let cycles = self.clock.since(t0);
                warn!("Accelerator did not complete: {polls} polls, {cycles} cycles");
                self.abandoned = true;
                return Err(ConvError::DeviceTimeout { polls, cycles });
            }
            std::hint::spin_loop();
        }
    }

    fn read32(&mut self, reg: Register) -> u32 {
        self.io.read32(self.map.offset(reg))
    }

    fn write32(&mut self, reg: Register, value: u32) {
        self.io.write32(self.map.offset(reg), value);
    }

    fn write64(&mut self, reg: Register, value: u64) {
        self.io.write64(self.map.offset(reg), value);
    }
}

impl<R, C> Drop for Accelerator<R, C> {
    fn drop(&mut self) {
        if self.quarantine.is_empty() {
            return;
        }
        warn!(
            "Leaking {} buffer set(s) still owned by an unfinished accelerator job",
            self.quarantine.len()
        );
        for staged in self.quarantine.drain(..) {
            std::mem::forget(staged);
        }
    }
}

fn dim32(reg: Register, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| ConvError::DimensionOverflow {
        register: reg.name(),
        value,
    })
}
