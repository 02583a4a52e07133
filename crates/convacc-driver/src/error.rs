//! Error types for accelerator and verification operations

use thiserror::Error;

/// Result type alias for convacc operations
pub type Result<T> = std::result::Result<T, ConvError>;

/// Errors that can occur while driving or verifying the accelerator
#[derive(Debug, Error)]
pub enum ConvError {
    /// Matrix shape cannot take part in a valid convolution
    #[error("Invalid shape: {reason}")]
    InvalidShape {
        /// Why the shape was rejected
        reason: String,
    },

    /// Two buffers that must match in length do not
    #[error("Length mismatch: {what} has {actual} elements, expected {expected}")]
    LengthMismatch {
        /// Which buffer was checked
        what: &'static str,
        /// Required length
        expected: usize,
        /// Observed length
        actual: usize,
    },

    /// Distortion requested over zero elements
    #[error("Cannot compute distortion over an empty result")]
    EmptyComparison,

    /// A dimension does not fit its 32-bit register
    #[error("Dimension {value} does not fit the 32-bit {register} register")]
    DimensionOverflow {
        /// Register mnemonic
        register: &'static str,
        /// Offending value
        value: usize,
    },

    /// Start requested while the device still reports busy
    #[error("Device busy: refusing to re-trigger while BUSY={status:#x}")]
    DeviceBusy {
        /// Busy register value observed
        status: u32,
    },

    /// Busy flag did not clear within the poll policy
    #[error("Device timeout after {polls} polls ({cycles} cycles)")]
    DeviceTimeout {
        /// Busy reads performed
        polls: u64,
        /// Cycles elapsed since the strobe
        cycles: u64,
    },

    /// A previous job timed out and may still be running on the device
    #[error("Device abandoned after a timeout; reset it before reuse")]
    DeviceAbandoned,

    /// Buffer allocation failed
    #[error("Allocation of {elements} f32 elements failed")]
    AllocationFailed {
        /// Requested element count
        elements: usize,
    },

    /// Mapping the register window failed
    #[error("Failed to map register window: {reason}")]
    MapFailed {
        /// Reason for failure
        reason: String,
    },

    /// I/O error (result files, device nodes)
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl ConvError {
    /// Create an invalid shape error
    pub fn invalid_shape(reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            reason: reason.into(),
        }
    }

    /// Create a length mismatch error
    pub fn length_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::LengthMismatch {
            what,
            expected,
            actual,
        }
    }

    /// Create a map failed error
    pub fn map_failed(reason: impl Into<String>) -> Self {
        Self::MapFailed {
            reason: reason.into(),
        }
    }

    /// Whether the error came from the device handshake rather than the inputs
    pub fn is_device_fault(&self) -> bool {
        matches!(
            self,
            Self::DeviceBusy { .. } | Self::DeviceTimeout { .. } | Self::DeviceAbandoned
        )
    }
}
