//! Detector exposure state machine.
//!
//! The detector cycles `Ready → Start → InProgress → End → Readout → Ready`.
//! The engine only ever writes the `Start` transition; every other
//! transition is internal to the device and observed by polling the
//! `kpfexpose.EXPOSE` keyword. The wire reports either the state name or
//! its numeric code, so both forms parse here.

use std::fmt;

use crate::keyword::KeywordValue;

/// Exposure state reported by `kpfexpose.EXPOSE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorState {
    /// Idle, ready to start an exposure.
    Ready,
    /// Exposure start accepted, shutters opening.
    Start,
    /// Exposure integrating.
    InProgress,
    /// Exposure finished, shutters closing.
    End,
    /// Data transferring off the sensor.
    Readout,
}

impl DetectorState {
    /// Numeric wire code for this state.
    pub fn code(self) -> i64 {
        match self {
            DetectorState::Ready => 0,
            DetectorState::Start => 1,
            DetectorState::InProgress => 2,
            DetectorState::End => 3,
            DetectorState::Readout => 4,
        }
    }

    /// State for a numeric wire code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(DetectorState::Ready),
            1 => Some(DetectorState::Start),
            2 => Some(DetectorState::InProgress),
            3 => Some(DetectorState::End),
            4 => Some(DetectorState::Readout),
            _ => None,
        }
    }

    /// State for a wire name string.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Ready" => Some(DetectorState::Ready),
            "Start" => Some(DetectorState::Start),
            "InProgress" => Some(DetectorState::InProgress),
            "End" => Some(DetectorState::End),
            "Readout" => Some(DetectorState::Readout),
            _ => None,
        }
    }

    /// Decode a keyword value in either name or code form.
    pub fn from_keyword(value: &KeywordValue) -> Option<Self> {
        match value {
            KeywordValue::Str(s) => Self::from_name(s)
                .or_else(|| s.parse::<i64>().ok().and_then(Self::from_code)),
            KeywordValue::Int(i) => Self::from_code(*i),
            KeywordValue::Float(f) => Self::from_code(*f as i64),
        }
    }

    /// True while the detector is anywhere in an exposure cycle.
    pub fn is_busy(self) -> bool {
        self != DetectorState::Ready
    }
}

impl fmt::Display for DetectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectorState::Ready => "Ready",
            DetectorState::Start => "Start",
            DetectorState::InProgress => "InProgress",
            DetectorState::End => "End",
            DetectorState::Readout => "Readout",
        };
        write!(f, "{name}")
    }
}
