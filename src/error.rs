//! Custom error types for the application.
//!
//! This module defines the primary error type, `CalError`, for the whole
//! sequencing engine. Using the `thiserror` crate, it provides a centralized
//! and consistent way to classify the failure modes of a calibration run:
//!
//! - **`ResourceNotFound`**: a sequence file named on the command line does
//!   not exist. Checked before any device interaction.
//! - **`Validation`**: structural problems with a sequence entry. Reserved
//!   for future precondition tightening; current actions perform no checks.
//! - **`Verification`**: a postcondition read-back disagrees with the
//!   requested value. The actuation happened, but the device state is wrong.
//! - **`Timeout`**: a bounded poll never satisfied its predicate. Always
//!   fatal for the current run; there is no automatic retry.
//! - **`Parse`** / **`Io`**: sequence file loading failures.
//! - **`Store`**: a transport-level failure reported by the keyword store.
//!
//! All errors surface immediately to the top-level run and abort remaining
//! steps. There is no partial-failure continuation and no rollback of
//! already-actuated hardware (a lamp powered on stays on after a failure).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type CalResult<T> = std::result::Result<T, CalError>;

/// Error type for the calibration sequencing engine.
#[derive(Error, Debug)]
pub enum CalError {
    /// A sequence file named in the run plan does not exist.
    #[error("Sequence file not found: {}", .0.display())]
    ResourceNotFound(PathBuf),

    /// A sequence entry is structurally invalid (reserved).
    #[error("Sequence validation error: {0}")]
    Validation(String),

    /// A postcondition read-back did not match the requested value.
    #[error("Final {keyword} mismatch: {actual} != {expected}")]
    Verification {
        /// Fully qualified `service.KEYWORD` that was verified.
        keyword: String,
        /// Value the action requested.
        expected: String,
        /// Value the device actually reported.
        actual: String,
    },

    /// A bounded wait expired before its predicate was satisfied.
    #[error("Timed out after {timeout:?} waiting for {keyword} {condition}")]
    Timeout {
        /// Fully qualified `service.KEYWORD` that was polled.
        keyword: String,
        /// Human-readable form of the predicate (e.g. `== Readout`).
        condition: String,
        /// The timeout that expired.
        timeout: Duration,
    },

    /// A sequence file could not be parsed.
    #[error("Failed to parse sequence file {}: {source}", .path.display())]
    Parse {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// Keyword store transport failure.
    #[error("Keyword store error: {0}")]
    Store(String),

    /// I/O error reading a sequence file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
