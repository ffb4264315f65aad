//! Error types

use thiserror::Error;

/// Result type for harness operations
pub type SimResult<T> = Result<T, SimError>;

/// Errors raised while reading, writing or generating traces
#[derive(Error, Debug)]
pub enum SimError {
    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV line
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Binary trace ends inside a record
    #[error("binary trace truncated: {trailing} trailing bytes after record {records}")]
    TruncatedRecord { records: usize, trailing: usize },

    /// Unknown trace file extension
    #[error("cannot infer trace format from {0}")]
    UnknownFormat(String),

    /// Synthetic generator parameters out of range
    #[error("invalid generator setting: {0}")]
    InvalidGenerator(String),

    /// Detector construction failed
    #[error(transparent)]
    Detector(#[from] mbsd_core::MbsdError),

    /// Report serialisation failed
    #[error("report serialisation failed: {0}")]
    Report(#[from] serde_json::Error),

    /// Producer or consumer thread panicked
    #[error("replay thread panicked")]
    ThreadPanicked,
}
