//! Memory-mapped register window of the accelerator
//!
//! Provides volatile, bounds-checked access to the device registers, either
//! through a raw physical pointer (bare-metal and identity-mapped targets) or
//! through a `/dev/mem` mapping on a Linux host.
//!
//! `/dev/mem` gives access to the registers only. The accelerator masters
//! physical addresses, so on a host with virtual memory the source and
//! destination buffers must also live in physically contiguous, identity
//! mapped memory for a run to be meaningful.

// MMIO registers are naturally aligned by hardware, so pointer casts are safe
#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::cast_possible_truncation)]

use crate::backend::{BackendType, RegisterIo};
use crate::error::{ConvError, Result};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsFd;
use std::ptr::NonNull;

/// Physical-memory device node used for host mappings.
pub const DEV_MEM: &str = "/dev/mem";

/// Mapped register window
pub struct MmioWindow {
    /// First register byte
    regs: NonNull<u8>,
    /// Bytes addressable from `regs`
    size: usize,
    /// Owned mapping (page-aligned start, length) to release on drop
    mapping: Option<(NonNull<u8>, usize)>,
    /// Physical address of `regs`, for logs
    phys_base: u64,
}

impl std::fmt::Debug for MmioWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmioWindow")
            .field("regs", &format_args!("{:p}", self.regs))
            .field("size", &self.size)
            .field("phys_base", &format_args!("{:#x}", self.phys_base))
            .field("owned", &self.mapping.is_some())
            .finish()
    }
}

// SAFETY: Send - the window refers to device memory that is process-wide; moving
// the handle between threads does not invalidate it. No thread-local state.
unsafe impl Send for MmioWindow {}

impl MmioWindow {
    /// Wrap an already accessible register window.
    ///
    /// # Safety
    ///
    /// `base` must point at the device register window, be valid for volatile
    /// reads and writes of `size` bytes for the lifetime of the returned value,
    /// and not be accessed through any other handle meanwhile.
    pub unsafe fn from_raw(base: NonNull<u8>, size: usize) -> Self {
        Self {
            regs: base,
            size,
            mapping: None,
            phys_base: base.as_ptr() as u64,
        }
    }

    /// Map `size` bytes of physical memory at `phys_base` through `/dev/mem`.
    ///
    /// The device node is opened `O_SYNC` so the kernel maps the range
    /// uncached.
    ///
    /// # Errors
    ///
    /// Returns `MapFailed` if `/dev/mem` cannot be opened (root or
    /// `CAP_SYS_RAWIO` required) or the mapping is refused.
    pub fn map_dev_mem(phys_base: u64, size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(DEV_MEM)
            .map_err(|e| ConvError::map_failed(format!("Cannot open {DEV_MEM}: {e}")))?;

        let page = rustix::param::page_size() as u64;
        let aligned = phys_base & !(page - 1);
        let lead = (phys_base - aligned) as usize;
        let len = lead + size;

        // SAFETY: mmap necessary for MMIO - maps the device window into the process.
        // Invariants: (1) fd valid (just opened); (2) offset page-aligned; (3) len > 0
        // covers the whole window; (4) MAP_SHARED so stores reach the device.
        // The mapping is released in Drop; the fd may close once mapped.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                aligned,
            )
            .map_err(|e| {
                ConvError::map_failed(format!("mmap {DEV_MEM} at {aligned:#x}+{len:#x}: {e}"))
            })?
        };

        let start = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| ConvError::map_failed("mmap returned a null mapping"))?;
        // SAFETY: lead < page <= len, so the register pointer stays inside the mapping.
        let regs = unsafe { NonNull::new_unchecked(start.as_ptr().add(lead)) };

        tracing::info!("Mapped register window {phys_base:#x} ({size:#x} bytes) at {regs:p}");

        Ok(Self {
            regs,
            size,
            mapping: Some((start, len)),
            phys_base,
        })
    }

    /// Window size in bytes
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Physical address of the first register
    pub const fn phys_base(&self) -> u64 {
        self.phys_base
    }

    fn reg_ptr(&self, offset: usize, width: usize) -> *mut u8 {
        assert!(
            offset + width <= self.size,
            "Register offset {offset:#x} (+{width}) outside {:#x}-byte window",
            self.size
        );
        assert_eq!(offset % width, 0, "Register offset {offset:#x} misaligned");
        // SAFETY: offset + width <= size, so the result stays inside the window.
        unsafe { self.regs.as_ptr().add(offset) }
    }
}

impl RegisterIo for MmioWindow {
    fn read32(&mut self, offset: usize) -> u32 {
        let ptr = self.reg_ptr(offset, 4).cast::<u32>();
        // SAFETY: read_volatile necessary for MMIO - hardware can change value.
        // Invariants: (1) ptr inside the window (reg_ptr); (2) u32 aligned.
        let value = unsafe { ptr.read_volatile() };
        tracing::trace!("Read u32 @ {offset:#x} = {value:#x}");
        value
    }

    fn write32(&mut self, offset: usize, value: u32) {
        let ptr = self.reg_ptr(offset, 4).cast::<u32>();
        tracing::trace!("Write u32 @ {offset:#x} = {value:#x}");
        // SAFETY: write_volatile necessary for MMIO - triggers hardware side effects.
        // Invariants: (1) ptr inside the window (reg_ptr); (2) u32 aligned.
        unsafe { ptr.write_volatile(value) };
    }

    fn read64(&mut self, offset: usize) -> u64 {
        let ptr = self.reg_ptr(offset, 8).cast::<u64>();
        // SAFETY: read_volatile necessary for MMIO - hardware can change value.
        // Invariants: (1) ptr inside the window (reg_ptr); (2) u64 aligned.
        let value = unsafe { ptr.read_volatile() };
        tracing::trace!("Read u64 @ {offset:#x} = {value:#x}");
        value
    }

    fn write64(&mut self, offset: usize, value: u64) {
        let ptr = self.reg_ptr(offset, 8).cast::<u64>();
        tracing::trace!("Write u64 @ {offset:#x} = {value:#x}");
        // SAFETY: write_volatile necessary for MMIO - triggers hardware side effects.
        // Invariants: (1) ptr inside the window (reg_ptr); (2) u64 aligned.
        unsafe { ptr.write_volatile(value) };
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Mmio
    }
}

impl Drop for MmioWindow {
    fn drop(&mut self) {
        if let Some((start, len)) = self.mapping.take() {
            // SAFETY: (start, len) is exactly the region returned by mmap in
            // map_dev_mem, and Drop runs at most once.
            unsafe {
                // Ignore error in Drop (can't propagate)
                let _ = munmap(start.as_ptr().cast(), len);
            }
            tracing::debug!("Unmapped register window {:#x}", self.phys_base);
        }
    }
}
