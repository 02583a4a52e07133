//! Driver and co-verification stack for the memory-mapped 2-D convolution
//! accelerator.
//!
//! The same valid-region cross-correlation is run on the accelerator and on
//! the CPU, and the two results are scored by a distortion metric in dB.
//!
//! # Backends
//!
//! ```text
//! Hardware:
//!   MmioWindow::map_dev_mem  — /dev/mem mapping of the register window (Linux)
//!   MmioWindow::from_raw     — identity-mapped window (bare metal)
//!
//! Development / CI:
//!   SimulatedAccelerator     — in-process model, f64 accumulation
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use convacc_driver::prelude::*;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let map = RegisterMap::REFERENCE;
//! let window = MmioWindow::map_dev_mem(map.base, map.span())?;
//!
//! let harness = Harness::new(HarnessConfig::default());
//! let mut acc = harness.accelerator(window, map, default_clock());
//! let report = harness.run(&mut acc, &ReferenceEngine::new(default_clock()))?;
//!
//! println!("Mean Distortion = {}", report.distortion.mean());
//! std::process::exit(report.verdict.exit_code());
//! # }
//! ```
//!
//! # Acceptance limits
//!
//! | Metric | Limit |
//! |--------|-------|
//! | Max distortion | ≤ −60 dB |
//! | Mean distortion | ≤ −80 dB |

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod accelerator;
mod backend;
pub mod backends;
pub mod clock;
pub mod distortion;
mod error;
pub mod harness;
mod matrix;
pub mod matvec;
pub mod mmio;
pub mod reference;
pub mod sink;
pub mod synth;
pub mod tolerances;

/// Register model (re-exported from convacc-chip).
pub mod regs {
    pub use convacc_chip::regs::*;
}

pub use accelerator::{Accelerator, ConvJob, PollPolicy, DEFAULT_MAX_POLLS};
pub use backend::{BackendType, RegisterIo};
pub use backends::SimulatedAccelerator;
pub use clock::{default_clock, CycleClock, HostClock};
pub use convacc_chip::{Register, RegisterMap};
pub use distortion::{evaluate, Decibels, DistortionReport, Verdict};
pub use error::{ConvError, Result};
pub use harness::{Harness, HarnessConfig, HarnessReport};
pub use matrix::{output_dims, valid_output_dims, Matrix};
pub use mmio::MmioWindow;
pub use reference::{Convolution, ReferenceEngine};
pub use sink::{read_f32_file, BinaryFileSink, ResultSink};
pub use tolerances::Tolerance;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        default_clock, evaluate, Accelerator, ConvError, CycleClock, DistortionReport, Harness,
        HarnessConfig, HarnessReport, Matrix, MmioWindow, PollPolicy, ReferenceEngine,
        RegisterIo, RegisterMap, Result, SimulatedAccelerator, Tolerance, Verdict,
    };
}
