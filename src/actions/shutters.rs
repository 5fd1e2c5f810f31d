//! Multi-select actions: triggered detectors and the two shutter sets.
//!
//! These keywords carry a comma-joined list on the wire; membership in the
//! list is what toggles each detector or shutter. Verification splits the
//! read-back and checks each flag's membership individually, so a device
//! that reorders the list still verifies.

use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::error::{CalError, CalResult};
use crate::keyword::{keywords, qualified, services, KeywordStore, KeywordValue};
use crate::sequence::SequenceEntry;

use super::Action;

fn join_selected(flags: &[(&str, bool)]) -> String {
    flags
        .iter()
        .filter(|(_, selected)| *selected)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(",")
}

async fn write_selection(
    store: &dyn KeywordStore,
    keyword: &'static str,
    flags: &[(&str, bool)],
    what: &str,
) -> CalResult<()> {
    let joined = join_selected(flags);
    info!("  Setting {what} to '{joined}'");
    store
        .write(services::EXPOSURE, keyword, KeywordValue::from(joined))
        .await
}

async fn verify_selection(
    store: &dyn KeywordStore,
    keyword: &'static str,
    flags: &[(&str, bool)],
) -> CalResult<()> {
    let readback = store.read(services::EXPOSURE, keyword).await?;
    let listed: Vec<&str> = match readback.as_str() {
        Some(s) => s.split(',').collect(),
        None => Vec::new(),
    };
    for (name, selected) in flags {
        let present = listed.contains(name);
        if present != *selected {
            return Err(CalError::Verification {
                keyword: qualified(services::EXPOSURE, keyword),
                expected: format!("{name} {}", if *selected { "selected" } else { "deselected" }),
                actual: readback.to_string(),
            });
        }
    }
    info!("    Done");
    Ok(())
}

/// Selects which cameras are triggered via `kpfexpose.TRIG_TARG`.
pub struct SetTriggeredDetectors {
    store: Arc<dyn KeywordStore>,
}

impl SetTriggeredDetectors {
    /// Create the action against a keyword store.
    pub fn new(store: Arc<dyn KeywordStore>) -> Self {
        Self { store }
    }

    fn flags(entry: &SequenceEntry) -> [(&'static str, bool); 3] {
        [
            ("Red", entry.trigger_red),
            ("Green", entry.trigger_green),
            ("Ca_HK", entry.trigger_cahk),
        ]
    }
}

#[async_trait]
impl Action for SetTriggeredDetectors {
    fn name(&self) -> &'static str {
        "SetTriggeredDetectors"
    }

    async fn perform(&self, entry: &SequenceEntry) -> CalResult<()> {
        write_selection(
            self.store.as_ref(),
            keywords::TRIG_TARG,
            &Self::flags(entry),
            "triggered detectors",
        )
        .await
    }

    async fn postcondition(&self, entry: &SequenceEntry) -> CalResult<()> {
        verify_selection(self.store.as_ref(), keywords::TRIG_TARG, &Self::flags(entry)).await
    }
}

/// Opens and closes the source select shutters via
/// `kpfexpose.SRC_SHUTTERS`.
pub struct SetSourceSelectShutters {
    store: Arc<dyn KeywordStore>,
}

impl SetSourceSelectShutters {
    /// Create the action against a keyword store.
    pub fn new(store: Arc<dyn KeywordStore>) -> Self {
        Self { store }
    }

    fn flags(entry: &SequenceEntry) -> [(&'static str, bool); 5] {
        [
            ("SciSelect", entry.sss_science),
            ("SkySelect", entry.sss_sky),
            ("SoCalSci", entry.sss_socalsci),
            ("SoCalCal", entry.sss_socalcal),
            ("Cal_SciSky", entry.sss_calscisky),
        ]
    }
}

#[async_trait]
impl Action for SetSourceSelectShutters {
    fn name(&self) -> &'static str {
        "SetSourceSelectShutters"
    }

    async fn perform(&self, entry: &SequenceEntry) -> CalResult<()> {
        write_selection(
            self.store.as_ref(),
            keywords::SRC_SHUTTERS,
            &Self::flags(entry),
            "source select shutters",
        )
        .await
    }

    async fn postcondition(&self, entry: &SequenceEntry) -> CalResult<()> {
        verify_selection(self.store.as_ref(), keywords::SRC_SHUTTERS, &Self::flags(entry)).await
    }
}

/// Selects which timed shutters participate in the exposure via
/// `kpfexpose.TIMED_SHUTTERS`.
pub struct SetTimedShutters {
    store: Arc<dyn KeywordStore>,
}

impl SetTimedShutters {
    /// Create the action against a keyword store.
    pub fn new(store: Arc<dyn KeywordStore>) -> Self {
        Self { store }
    }

    fn flags(entry: &SequenceEntry) -> [(&'static str, bool); 4] {
        [
            ("Scrambler", entry.ts_scrambler),
            ("SimulCal", entry.ts_simulcal),
            ("FF_Fiber", entry.ts_ff_fiber),
            ("Ca_HK", entry.ts_cahk),
        ]
    }
}

#[async_trait]
impl Action for SetTimedShutters {
    fn name(&self) -> &'static str {
        "SetTimedShutters"
    }

    async fn perform(&self, entry: &SequenceEntry) -> CalResult<()> {
        write_selection(
            self.store.as_ref(),
            keywords::TIMED_SHUTTERS,
            &Self::flags(entry),
            "timed shutters",
        )
        .await
    }

    async fn postcondition(&self, entry: &SequenceEntry) -> CalResult<()> {
        verify_selection(self.store.as_ref(), keywords::TIMED_SHUTTERS, &Self::flags(entry)).await
    }
}
