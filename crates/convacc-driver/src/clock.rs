//! Cycle clocks used to time the hardware and software paths.
//!
//! On RISC-V the `cycle` CSR is read directly with `rdcycle`; other targets
//! fall back to a monotonic nanosecond count so the harness still produces
//! comparable, non-decreasing numbers on a development host.

use std::time::Instant;

/// Monotonically increasing cycle counter.
///
/// Counter wrap is not handled; a single run is assumed to be far shorter
/// than the wrap period.
pub trait CycleClock {
    /// Current counter value.
    fn cycles(&self) -> u64;

    /// Cycles elapsed since `start`, never negative.
    fn since(&self, start: u64) -> u64 {
        self.cycles().saturating_sub(start)
    }
}

impl<C: CycleClock + ?Sized> CycleClock for &C {
    fn cycles(&self) -> u64 {
        (**self).cycles()
    }
}

/// RISC-V `cycle` CSR.
#[cfg(target_arch = "riscv64")]
#[derive(Debug, Clone, Copy, Default)]
pub struct RdCycle;

#[cfg(target_arch = "riscv64")]
impl CycleClock for RdCycle {
    #[inline]
    fn cycles(&self) -> u64 {
        let cycles: u64;
        // SAFETY: rdcycle reads a user-visible CSR with no side effects.
        unsafe {
            core::arch::asm!("rdcycle {0}", out(reg) cycles, options(nomem, nostack));
        }
        cycles
    }
}

/// Host fallback: nanoseconds since construction.
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    origin: Instant,
}

impl HostClock {
    /// Start counting from now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleClock for HostClock {
    fn cycles(&self) -> u64 {
        // Truncation acceptable: u64 nanoseconds covers ~584 years
        #[allow(clippy::cast_possible_truncation)]
        let ns = self.origin.elapsed().as_nanos() as u64;
        ns
    }
}

/// Best clock for the build target.
#[cfg(target_arch = "riscv64")]
pub fn default_clock() -> RdCycle {
    RdCycle
}

/// Best clock for the build target.
#[cfg(not(target_arch = "riscv64"))]
pub fn default_clock() -> HostClock {
    HostClock::new()
}
