//! Error types

use thiserror::Error;

/// Result type for detector operations
pub type MbsdResult<T> = Result<T, MbsdError>;

/// Contract violations reported by the `checked_*` fixed-point helpers
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedPointError {
    /// Divisor was zero
    #[error("fixed-point division by zero")]
    DivisionByZero,

    /// Shift outside the rounding table
    #[error("fixed-point shift {shift} out of range (max {max})")]
    ShiftOutOfRange { shift: u16, max: u16 },
}

/// Ring buffer errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// Backing storage length differs from the buffer capacity
    #[error("ring buffer capacity mismatch: expected {expected}, got {actual}")]
    CapacityMismatch { expected: usize, actual: usize },
}

/// Errors surfaced by the detector and its configuration
#[derive(Error, Debug)]
pub enum MbsdError {
    /// Sensitivity index not present in the table
    #[error("unknown sensitivity setting {index} ({available} available)")]
    UnknownSetting { index: u8, available: usize },

    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

