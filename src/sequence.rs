//! Sequence file entries.
//!
//! Each input file is one YAML mapping describing a single calibration
//! step: which source feeds the octagon, how the attenuators and shutters
//! are set, which detectors trigger, and the exposure parameters. Entries
//! are parsed once before the run and are immutable thereafter; actions
//! read from them but never write.
//!
//! The parser is forgiving of partially specified entries: every key
//! except `OctagonSource` and `WarmUp` may be omitted, and omitted keys
//! make the corresponding action a silent no-op. Unknown keys are ignored.

use serde::Deserialize;
use std::path::Path;

use crate::error::{CalError, CalResult};

fn default_n_exp() -> u32 {
    1
}

/// One resolved calibration step, parsed from a sequence file.
#[derive(Clone, Debug, Deserialize)]
pub struct SequenceEntry {
    /// Cal source the octagon selects (also names the lamp to power).
    #[serde(rename = "OctagonSource")]
    pub octagon_source: String,

    /// Warm-up time for the lamp in seconds.
    #[serde(rename = "WarmUp")]
    pub warm_up: f64,

    /// Exposure time in seconds.
    #[serde(rename = "Exptime", default)]
    pub exptime: Option<f64>,

    /// ND1 filter wheel position.
    #[serde(rename = "ND1", default)]
    pub nd1: Option<String>,

    /// ND2 filter wheel position.
    #[serde(rename = "ND2", default)]
    pub nd2: Option<String>,

    /// Trigger the Red detector.
    #[serde(rename = "TriggerRed", default)]
    pub trigger_red: bool,
    /// Trigger the Green detector.
    #[serde(rename = "TriggerGreen", default)]
    pub trigger_green: bool,
    /// Trigger the Ca H&K detector.
    #[serde(rename = "TriggerCaHK", default)]
    pub trigger_cahk: bool,

    /// Open the science source select shutter.
    #[serde(rename = "SSS_Science", default)]
    pub sss_science: bool,
    /// Open the sky source select shutter.
    #[serde(rename = "SSS_Sky", default)]
    pub sss_sky: bool,
    /// Open the SoCal science source select shutter.
    #[serde(rename = "SSS_SoCalSci", default)]
    pub sss_socalsci: bool,
    /// Open the SoCal cal source select shutter.
    #[serde(rename = "SSS_SoCalCal", default)]
    pub sss_socalcal: bool,
    /// Open the cal sci/sky source select shutter.
    #[serde(rename = "SSS_CalSciSky", default)]
    pub sss_calscisky: bool,

    /// Enable the scrambler timed shutter.
    #[serde(rename = "TS_Scrambler", default)]
    pub ts_scrambler: bool,
    /// Enable the simultaneous cal timed shutter.
    #[serde(rename = "TS_SimulCal", default)]
    pub ts_simulcal: bool,
    /// Enable the flat field fiber timed shutter.
    #[serde(rename = "TS_FF_Fiber", default)]
    pub ts_ff_fiber: bool,
    /// Enable the Ca H&K timed shutter.
    #[serde(rename = "TS_CaHK", default)]
    pub ts_cahk: bool,

    /// Number of exposures to take for this entry.
    #[serde(rename = "nExp", default = "default_n_exp")]
    pub n_exp: u32,
}

impl SequenceEntry {
    /// Parse an entry from a YAML sequence file.
    pub fn from_file(path: &Path) -> CalResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|source| CalError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// An empty entry for actions that do not depend on entry content
    /// (lamp power and the final detector-idle wait).
    pub fn blank() -> Self {
        Self {
            octagon_source: String::new(),
            warm_up: 0.0,
            exptime: None,
            nd1: None,
            nd2: None,
            trigger_red: false,
            trigger_green: false,
            trigger_cahk: false,
            sss_science: false,
            sss_sky: false,
            sss_socalsci: false,
            sss_socalcal: false,
            sss_calscisky: false,
            ts_scrambler: false,
            ts_simulcal: false,
            ts_ff_fiber: false,
            ts_cahk: false,
            n_exp: 1,
        }
    }
}
