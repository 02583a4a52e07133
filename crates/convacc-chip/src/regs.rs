//! Register map of the convolution accelerator.
//!
//! The device exposes a small window of control registers at a fixed
//! physical base. On the reference Rocket-based SoC the window starts at
//! `0x4000`:
//!
//! ```text
//! 0x4000  DATA_ADDR   64  source data pointer
//! 0x4008  DATA_COLS   32  source data columns
//! 0x400C  DATA_ROWS   32  source data rows
//! 0x4010  FILT_ADDR   64  filter pointer
//! 0x4018  FILT_COLS   32  filter columns
//! 0x401C  FILT_ROWS   32  filter rows
//! 0x4020  DEST_ADDR   64  destination pointer
//! 0x4028  START       32  write 1 to trigger (self-clearing)
//! 0x402C  BUSY        32  nonzero while executing (read-only)
//! ```
//!
//! Every configuration register must be written before `START` is asserted,
//! and `START` must not be asserted again while `BUSY` reads nonzero.

// ── Window ───────────────────────────────────────────────────────────────────

/// Physical base address of the register window on the reference SoC.
pub const DEFAULT_BASE: u64 = 0x4000;

/// Bytes covered by the register window (last register ends at 0x30).
pub const WINDOW_SIZE: usize = 0x30;

// ── Offsets (relative to base) ───────────────────────────────────────────────

/// Source data pointer (64-bit).
pub const DATA_ADDR: usize = 0x00;
/// Source data column count (32-bit).
pub const DATA_COLS: usize = 0x08;
/// Source data row count (32-bit).
pub const DATA_ROWS: usize = 0x0C;
/// Filter pointer (64-bit).
pub const FILT_ADDR: usize = 0x10;
/// Filter column count (32-bit).
pub const FILT_COLS: usize = 0x18;
/// Filter row count (32-bit).
pub const FILT_ROWS: usize = 0x1C;
/// Destination pointer (64-bit).
pub const DEST_ADDR: usize = 0x20;
/// Start strobe (32-bit, write-only).
pub const START: usize = 0x28;
/// Busy flag (32-bit, read-only).
pub const BUSY: usize = 0x2C;

// ── Handshake values ─────────────────────────────────────────────────────────

/// Value written to [`START`] to trigger a run.
pub const START_TRIGGER: u32 = 1;
/// Value [`BUSY`] reads once the device is idle.
pub const BUSY_IDLE: u32 = 0;

/// Access width of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWidth {
    /// 32-bit access.
    W32,
    /// 64-bit access.
    W64,
}

impl RegisterWidth {
    /// Width in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }
}

/// Named register of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Source data pointer.
    DataAddr,
    /// Source data columns.
    DataCols,
    /// Source data rows.
    DataRows,
    /// Filter pointer.
    FiltAddr,
    /// Filter columns.
    FiltCols,
    /// Filter rows.
    FiltRows,
    /// Destination pointer.
    DestAddr,
    /// Start strobe.
    Start,
    /// Busy flag.
    Busy,
}

impl Register {
    /// All registers in programming order.
    pub const ALL: [Self; 9] = [
        Self::DataAddr,
        Self::DataCols,
        Self::DataRows,
        Self::FiltAddr,
        Self::FiltCols,
        Self::FiltRows,
        Self::DestAddr,
        Self::Start,
        Self::Busy,
    ];

    /// Position in [`Register::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Access width.
    pub const fn width(self) -> RegisterWidth {
        match self {
            Self::DataAddr | Self::FiltAddr | Self::DestAddr => RegisterWidth::W64,
            _ => RegisterWidth::W32,
        }
    }

    /// Mnemonic used in logs and the `regs` listing.
    pub const fn name(self) -> &'static str {
        match self {
            Self::DataAddr => "DATA_ADDR",
            Self::DataCols => "DATA_COLS",
            Self::DataRows => "DATA_ROWS",
            Self::FiltAddr => "FILT_ADDR",
            Self::FiltCols => "FILT_COLS",
            Self::FiltRows => "FILT_ROWS",
            Self::DestAddr => "DEST_ADDR",
            Self::Start => "START",
            Self::Busy => "BUSY",
        }
    }

    /// Whether software writes this register.
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::Busy)
    }

    /// Whether software reads this register.
    pub const fn is_readable(self) -> bool {
        !matches!(self, Self::Start)
    }
}

/// Immutable description of one device instance: base address plus the
/// offset of every named register.
///
/// The driver only ever addresses registers through a `RegisterMap`, so an
/// alternate device instance or a simulation target is a different value,
/// not a different driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    /// Physical base address of the window.
    pub base: u64,
    /// Source data pointer offset.
    pub data_addr: usize,
    /// Source data columns offset.
    pub data_cols: usize,
    /// Source data rows offset.
    pub data_rows: usize,
    /// Filter pointer offset.
    pub filt_addr: usize,
    /// Filter columns offset.
    pub filt_cols: usize,
    /// Filter rows offset.
    pub filt_rows: usize,
    /// Destination pointer offset.
    pub dest_addr: usize,
    /// Start strobe offset.
    pub start: usize,
    /// Busy flag offset.
    pub busy: usize,
}

impl RegisterMap {
    /// Register map of the reference SoC.
    pub const REFERENCE: Self = Self {
        base: DEFAULT_BASE,
        data_addr: DATA_ADDR,
        data_cols: DATA_COLS,
        data_rows: DATA_ROWS,
        filt_addr: FILT_ADDR,
        filt_cols: FILT_COLS,
        filt_rows: FILT_ROWS,
        dest_addr: DEST_ADDR,
        start: START,
        busy: BUSY,
    };

    /// Same offsets, different base address.
    #[must_use]
    pub const fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    /// Offset of `reg` within the window.
    pub const fn offset(&self, reg: Register) -> usize {
        match reg {
            Register::DataAddr => self.data_addr,
            Register::DataCols => self.data_cols,
            Register::DataRows => self.data_rows,
            Register::FiltAddr => self.filt_addr,
            Register::FiltCols => self.filt_cols,
            Register::FiltRows => self.filt_rows,
            Register::DestAddr => self.dest_addr,
            Register::Start => self.start,
            Register::Busy => self.busy,
        }
    }

    /// Absolute physical address of `reg`.
    pub const fn address(&self, reg: Register) -> u64 {
        self.base + self.offset(reg) as u64
    }

    /// Bytes the window must span to reach every register.
    pub fn span(&self) -> usize {
        Register::ALL
            .iter()
            .map(|&r| self.offset(r) + r.width().bytes())
            .max()
            .unwrap_or(0)
    }

    /// Register whose offset is `offset`, if any.
    pub fn decode(&self, offset: usize) -> Option<Register> {
        Register::ALL.into_iter().find(|&r| self.offset(r) == offset)
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::REFERENCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_addresses_match_soc() {
        let map = RegisterMap::REFERENCE;
        assert_eq!(map.address(Register::DataAddr), 0x4000);
        assert_eq!(map.address(Register::DestAddr), 0x4020);
        assert_eq!(map.address(Register::Start), 0x4028);
        assert_eq!(map.address(Register::Busy), 0x402C);
    }

    #[test]
    fn registers_do_not_overlap() {
        let map = RegisterMap::REFERENCE;
        for a in Register::ALL {
            for b in Register::ALL {
                if a == b {
                    continue;
                }
                let (ao, bo) = (map.offset(a), map.offset(b));
                let disjoint = ao + a.width().bytes() <= bo || bo + b.width().bytes() <= ao;
                assert!(disjoint, "{} overlaps {}", a.name(), b.name());
            }
        }
    }

    #[test]
    fn pointer_registers_are_naturally_aligned() {
        let map = RegisterMap::REFERENCE;
        for r in Register::ALL {
            assert_eq!(map.offset(r) % r.width().bytes(), 0, "{} misaligned", r.name());
        }
    }

    #[test]
    fn span_covers_window() {
        assert_eq!(RegisterMap::REFERENCE.span(), WINDOW_SIZE);
    }

    #[test]
    fn decode_round_trips_offsets() {
        let map = RegisterMap::REFERENCE.with_base(0x1000_0000);
        assert_eq!(map.decode(START), Some(Register::Start));
        assert_eq!(map.decode(0x04), None);
        assert_eq!(map.address(Register::Busy), 0x1000_002C);
    }

    #[test]
    fn busy_is_read_only_and_start_is_write_only() {
        assert!(!Register::Busy.is_writable());
        assert!(!Register::Start.is_readable());
        assert!(Register::DataCols.is_readable() && Register::DataCols.is_writable());
    }
}
