//! Run loop orchestration.
//!
//! The [`Sequencer`] drives a whole calibration campaign: resolve the
//! distinct set of lamps the sequence files reference, power them on, sit
//! out a single shared warm-up covering the slowest lamp, then execute the
//! fixed action chain for every entry in every repeat cycle, optionally
//! power the lamps back off, and confirm the detector is idle.
//!
//! The loop is fail-fast on purpose: the first verification mismatch or
//! timeout aborts the remaining steps and propagates to the caller, with
//! no retry and no rollback of already-actuated hardware. Re-running a
//! partially configured calibration step could silently corrupt data,
//! so nothing here masks a failure.

use log::info;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::{
    Action, PowerOffCalSource, PowerOnCalSource, SetCalSource, SetExptime, SetND1, SetND2,
    SetSourceSelectShutters, SetTimedShutters, SetTriggeredDetectors, StartExposure,
    WaitForReadout, WaitForReady,
};
use crate::detector::DetectorState;
use crate::error::{CalError, CalResult};
use crate::keyword::{keywords, qualified, services, KeywordStore};
use crate::lamp::LampPortMap;
use crate::sequence::SequenceEntry;

/// Everything a run needs, resolved before any device interaction.
#[derive(Clone, Debug)]
pub struct RunPlan {
    /// Sequence files, executed in order within each repeat cycle.
    pub files: Vec<PathBuf>,
    /// Number of times to run the whole set of files (>= 1).
    pub count: u32,
    /// Power the referenced lamps off at the end of the run.
    pub lamps_off: bool,
    /// Skip the exposure-triggering actions (dry run for testing).
    pub no_exposure: bool,
}

/// Executes a [`RunPlan`] against a keyword store.
pub struct Sequencer {
    store: Arc<dyn KeywordStore>,
    ports: LampPortMap,
}

impl Sequencer {
    /// Create a sequencer over a keyword store and lamp/outlet mapping.
    pub fn new(store: Arc<dyn KeywordStore>, ports: LampPortMap) -> Self {
        Self { store, ports }
    }

    /// Run the full campaign to completion or to the first error.
    pub async fn run(&self, plan: &RunPlan) -> CalResult<()> {
        self.precondition(plan)?;
        let entries = Self::load_entries(plan)?;
        self.perform(plan, &entries).await?;
        self.postcondition().await
    }

    /// Every sequence file must exist before anything touches the bench.
    fn precondition(&self, plan: &RunPlan) -> CalResult<()> {
        for file in &plan.files {
            if !file.exists() {
                return Err(CalError::ResourceNotFound(file.clone()));
            }
        }
        Ok(())
    }

    fn load_entries(plan: &RunPlan) -> CalResult<Vec<SequenceEntry>> {
        let entries = plan
            .files
            .iter()
            .map(|file| SequenceEntry::from_file(file))
            .collect::<CalResult<Vec<_>>>()?;
        info!("Read {} sequence files", entries.len());
        Ok(entries)
    }

    /// Distinct lamps referenced across all entries. Enumeration order is
    /// incidental; what matters is that no lamp appears twice.
    fn distinct_lamps(entries: &[SequenceEntry]) -> BTreeSet<String> {
        entries
            .iter()
            .map(|entry| entry.octagon_source.clone())
            .collect()
    }

    async fn perform(&self, plan: &RunPlan, entries: &[SequenceEntry]) -> CalResult<()> {
        let blank = SequenceEntry::blank();
        let lamps = Self::distinct_lamps(entries);

        for lamp in &lamps {
            PowerOnCalSource::new(self.store.clone(), self.ports.clone(), lamp)
                .execute(&blank)
                .await?;
        }

        // One shared warm-up sized for the slowest-warming lamp.
        let warm_up = entries.iter().map(|e| e.warm_up).fold(0.0, f64::max);
        info!("Sleeping {warm_up:.0} s for lamps to warm up");
        tokio::time::sleep(Duration::from_secs_f64(warm_up)).await;

        for repeat in 1..=plan.count {
            for (i, entry) in entries.iter().enumerate() {
                info!(
                    "(Repeat {repeat}/{}): Executing sequence {}/{} ({})",
                    plan.count,
                    i + 1,
                    entries.len(),
                    plan.files[i].display()
                );
                self.run_entry(entry, plan.no_exposure).await?;
            }
        }

        if plan.lamps_off {
            for lamp in &lamps {
                PowerOffCalSource::new(self.store.clone(), self.ports.clone(), lamp)
                    .execute(&blank)
                    .await?;
            }
        }

        // The final idle wait does not depend on any entry's content.
        WaitForReady::new(self.store.clone()).execute(&blank).await
    }

    async fn run_entry(&self, entry: &SequenceEntry, no_exposure: bool) -> CalResult<()> {
        let chain: Vec<Box<dyn Action>> = vec![
            Box::new(SetCalSource::new(self.store.clone())),
            Box::new(SetSourceSelectShutters::new(self.store.clone())),
            Box::new(SetTimedShutters::new(self.store.clone())),
            Box::new(SetND1::new(self.store.clone())),
            Box::new(SetND2::new(self.store.clone())),
            Box::new(SetExptime::new(self.store.clone())),
            Box::new(WaitForReady::new(self.store.clone())),
            Box::new(SetTriggeredDetectors::new(self.store.clone())),
        ];
        for action in &chain {
            action.execute(entry).await?;
        }

        for shot in 1..=entry.n_exp {
            WaitForReady::new(self.store.clone()).execute(entry).await?;
            if no_exposure {
                info!("  Skipping exposure {shot}/{} (dry run)", entry.n_exp);
                continue;
            }
            info!("  Starting exposure {shot}/{}", entry.n_exp);
            StartExposure::new(self.store.clone()).execute(entry).await?;
            WaitForReadout::new(self.store.clone()).execute(entry).await?;
        }
        Ok(())
    }

    /// The run only counts as complete with the detector back at `Ready`.
    async fn postcondition(&self) -> CalResult<()> {
        let state = self.store.read(services::EXPOSURE, keywords::EXPOSE).await?;
        if DetectorState::from_keyword(&state) != Some(DetectorState::Ready) {
            return Err(CalError::Verification {
                keyword: qualified(services::EXPOSURE, keywords::EXPOSE),
                expected: DetectorState::Ready.to_string(),
                actual: state.to_string(),
            });
        }
        Ok(())
    }
}
