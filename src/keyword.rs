//! Device keyword store abstraction.
//!
//! The instrument is controlled through named services (`kpfexpose`,
//! `kpfmot`, `kpfpower`), each exposing named keywords that can be read,
//! written, or polled until a predicate holds within a timeout. The engine
//! never talks to a transport directly; it consumes the [`KeywordStore`]
//! trait, which keeps the sequencing logic independent of how keywords are
//! actually carried (and lets tests substitute a simulated bench).
//!
//! Values are numeric or string-enumerated. Comma-joined strings are the
//! wire representation for multi-select keywords such as the triggered
//! detector list and the shutter sets.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::CalResult;

/// Keyword service names for the calibration bench.
pub mod services {
    /// Exposure control service (detector state, exposure time, shutters).
    pub const EXPOSURE: &str = "kpfexpose";
    /// Cal bench motion service (octagon, ND filter wheels).
    pub const MOTION: &str = "kpfmot";
    /// Power outlet service (lamp outlets with interlocks).
    pub const POWER: &str = "kpfpower";
}

/// Keyword names used by the action library.
pub mod keywords {
    /// Requested exposure time in seconds.
    pub const EXPOSURE: &str = "EXPOSURE";
    /// Detector exposure state (see [`crate::detector::DetectorState`]).
    pub const EXPOSE: &str = "EXPOSE";
    /// Comma-joined list of triggered detectors.
    pub const TRIG_TARG: &str = "TRIG_TARG";
    /// Comma-joined list of open source select shutters.
    pub const SRC_SHUTTERS: &str = "SRC_SHUTTERS";
    /// Comma-joined list of enabled timed shutters.
    pub const TIMED_SHUTTERS: &str = "TIMED_SHUTTERS";
    /// Octagon cal source selector.
    pub const OCTAGON: &str = "OCTAGON";
    /// ND1 filter wheel position.
    pub const ND1POS: &str = "ND1POS";
    /// ND2 filter wheel position.
    pub const ND2POS: &str = "ND2POS";
}

/// A single keyword value as carried on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum KeywordValue {
    /// Floating point value (exposure times, warm-up seconds).
    Float(f64),
    /// Integer value (enumerated state codes).
    Int(i64),
    /// String value (state names, positions, comma-joined lists).
    Str(String),
}

impl KeywordValue {
    /// Value as `f64`, parsing strings if necessary.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            KeywordValue::Float(f) => Some(*f),
            KeywordValue::Int(i) => Some(*i as f64),
            KeywordValue::Str(s) => s.parse().ok(),
        }
    }

    /// Borrowed string contents, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeywordValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for KeywordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeywordValue::Float(v) => write!(f, "{}", v),
            KeywordValue::Int(v) => write!(f, "{}", v),
            KeywordValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for KeywordValue {
    fn from(value: f64) -> Self {
        KeywordValue::Float(value)
    }
}

impl From<i64> for KeywordValue {
    fn from(value: i64) -> Self {
        KeywordValue::Int(value)
    }
}

impl From<&str> for KeywordValue {
    fn from(value: &str) -> Self {
        KeywordValue::Str(value.to_string())
    }
}

impl From<String> for KeywordValue {
    fn from(value: String) -> Self {
        KeywordValue::Str(value)
    }
}

/// Read/write/poll access to named keywords on named services.
///
/// The engine assumes single-writer access for the duration of a run: no
/// other controller mutates the same services, and the store performs no
/// locking of its own. The only caching contract is that the last write is
/// observed by the next read within device latency, which is why every
/// actuation in the action library is followed by an independent read-back.
#[async_trait]
pub trait KeywordStore: Send + Sync {
    /// Read the current value of `service.keyword`.
    async fn read(&self, service: &str, keyword: &str) -> CalResult<KeywordValue>;

    /// Write a value to `service.keyword`.
    async fn write(&self, service: &str, keyword: &str, value: KeywordValue) -> CalResult<()>;

    /// Poll `service.keyword` until `predicate` holds or `timeout` expires.
    ///
    /// Returns `Ok(true)` if the predicate was satisfied within the timeout
    /// and `Ok(false)` if the timeout expired first. Transport failures are
    /// reported as errors, never as `false`.
    async fn wait_for(
        &self,
        service: &str,
        keyword: &str,
        predicate: &(dyn for<'a> Fn(&'a KeywordValue) -> bool + Send + Sync),
        timeout: Duration,
    ) -> CalResult<bool>;
}

/// Formats a `service.KEYWORD` pair for error messages and log lines.
pub fn qualified(service: &str, keyword: &str) -> String {
    format!("{service}.{keyword}")
}
