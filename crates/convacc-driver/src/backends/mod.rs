//! Register backends
//!
//! - **MMIO**: the device window itself, see [`crate::mmio::MmioWindow`]
//! - **Simulated**: in-process behavioural model for CI and host runs

pub mod simulated;

pub use simulated::SimulatedAccelerator;
