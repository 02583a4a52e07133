//! Register access abstraction
//!
//! The accelerator driver never touches memory directly; it goes through a
//! [`RegisterIo`] so the same protocol runs against the mapped device window
//! or the in-process simulator.

use std::fmt::Debug;

/// Typed access to the accelerator's register window.
///
/// Offsets are relative to the window base. Every call is a single device
/// access, performed in program order with respect to every other call on the
/// same value. Reads take `&mut self` because a device read may have side
/// effects (the busy flag advances while it is polled).
///
/// There is no error path: the window is assumed mapped and accessible, and
/// an offset outside it is a configuration defect that panics.
pub trait RegisterIo: Debug {
    /// Load a 32-bit register
    fn read32(&mut self, offset: usize) -> u32;

    /// Store a 32-bit register
    fn write32(&mut self, offset: usize, value: u32);

    /// Load a 64-bit register
    fn read64(&mut self, offset: usize) -> u64;

    /// Store a 64-bit register
    fn write64(&mut self, offset: usize, value: u64);

    /// Backend type for logs
    fn backend_type(&self) -> BackendType;
}

impl<R: RegisterIo + ?Sized> RegisterIo for &mut R {
    fn read32(&mut self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&mut self, offset: usize, value: u32) {
        (**self).write32(offset, value);
    }

    fn read64(&mut self, offset: usize) -> u64 {
        (**self).read64(offset)
    }

    fn write64(&mut self, offset: usize, value: u64) {
        (**self).write64(offset, value);
    }

    fn backend_type(&self) -> BackendType {
        (**self).backend_type()
    }
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Physical register window (raw pointer or `/dev/mem` mapping)
    Mmio,

    /// In-process behavioural model of the accelerator
    Simulated,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mmio => write!(f, "MMIO"),
            Self::Simulated => write!(f, "Simulated"),
        }
    }
}
