//! Exposure control actions: exposure time, trigger, and detector waits.
//!
//! The engine only ever commands the `Start` transition of the detector
//! cycle; everything else is observed by bounded polling of
//! `kpfexpose.EXPOSE`. Each wait carries an explicit timeout: 300 s for an
//! in-progress exposure to clear before triggering, 60 s for the detector
//! to go idle, and the current exposure time plus a 10 s margin for readout
//! to begin (the detector must stay busy at least the exposure duration).

use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

use crate::detector::DetectorState;
use crate::error::{CalError, CalResult};
use crate::keyword::{keywords, qualified, services, KeywordStore, KeywordValue};
use crate::sequence::SequenceEntry;

use super::Action;

/// Read-back tolerance on the exposure time, in seconds.
const EXPTIME_TOLERANCE: f64 = 0.1;
/// How long to wait for a busy detector to clear before triggering.
const BUSY_TIMEOUT: Duration = Duration::from_secs(300);
/// How long to wait for the detector to be ready for another exposure.
const READY_TIMEOUT: Duration = Duration::from_secs(60);
/// Margin added to the exposure time when waiting for readout, in seconds.
const READOUT_MARGIN_SECS: f64 = 10.0;

fn is_state(target: DetectorState) -> impl Fn(&KeywordValue) -> bool + Send + Sync {
    move |value| DetectorState::from_keyword(value) == Some(target)
}

async fn read_exptime(store: &dyn KeywordStore) -> CalResult<f64> {
    let value = store.read(services::EXPOSURE, keywords::EXPOSURE).await?;
    Ok(value.as_f64().unwrap_or(0.0).max(0.0))
}

/// Sets the requested exposure time via `kpfexpose.EXPOSURE`.
pub struct SetExptime {
    store: Arc<dyn KeywordStore>,
}

impl SetExptime {
    /// Create the action against a keyword store.
    pub fn new(store: Arc<dyn KeywordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for SetExptime {
    fn name(&self) -> &'static str {
        "SetExptime"
    }

    async fn perform(&self, entry: &SequenceEntry) -> CalResult<()> {
        if let Some(exptime) = entry.exptime {
            info!("  Setting exposure time to {exptime:.1}");
            self.store
                .write(services::EXPOSURE, keywords::EXPOSURE, exptime.into())
                .await?;
        }
        Ok(())
    }

    async fn postcondition(&self, entry: &SequenceEntry) -> CalResult<()> {
        if let Some(exptime) = entry.exptime {
            let actual = read_exptime(self.store.as_ref()).await?;
            if (actual - exptime).abs() > EXPTIME_TOLERANCE {
                return Err(CalError::Verification {
                    keyword: qualified(services::EXPOSURE, keywords::EXPOSURE),
                    expected: format!("{exptime:.1}"),
                    actual: format!("{actual:.1}"),
                });
            }
        }
        info!("    Done");
        Ok(())
    }
}

/// Begins a triggered exposure by writing `Start` to `kpfexpose.EXPOSE`.
///
/// Returns as soon as the trigger is accepted. Use [`WaitForReadout`] or
/// [`WaitForReady`] to determine when the exposure is done.
pub struct StartExposure {
    store: Arc<dyn KeywordStore>,
}

impl StartExposure {
    /// Create the action against a keyword store.
    pub fn new(store: Arc<dyn KeywordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for StartExposure {
    fn name(&self) -> &'static str {
        "StartExposure"
    }

    async fn perform(&self, _entry: &SequenceEntry) -> CalResult<()> {
        let state = self.store.read(services::EXPOSURE, keywords::EXPOSE).await?;
        if DetectorState::from_keyword(&state) != Some(DetectorState::Ready) {
            info!("  Detector(s) are currently {state}, waiting for Ready");
            let satisfied = self
                .store
                .wait_for(
                    services::EXPOSURE,
                    keywords::EXPOSE,
                    &is_state(DetectorState::Ready),
                    BUSY_TIMEOUT,
                )
                .await?;
            if !satisfied {
                return Err(CalError::Timeout {
                    keyword: qualified(services::EXPOSURE, keywords::EXPOSE),
                    condition: "== Ready".to_string(),
                    timeout: BUSY_TIMEOUT,
                });
            }
        }
        info!("  Beginning exposure");
        self.store
            .write(services::EXPOSURE, keywords::EXPOSE, "Start".into())
            .await
    }

    async fn postcondition(&self, _entry: &SequenceEntry) -> CalResult<()> {
        let exptime = read_exptime(self.store.as_ref()).await?;
        let state = self.store.read(services::EXPOSURE, keywords::EXPOSE).await?;
        debug!("    exposure time = {exptime:.1}");
        debug!("    status = {state}");
        if exptime > EXPTIME_TOLERANCE {
            let busy = matches!(
                DetectorState::from_keyword(&state),
                Some(
                    DetectorState::Start
                        | DetectorState::InProgress
                        | DetectorState::End
                        | DetectorState::Readout
                )
            );
            if !busy {
                return Err(CalError::Verification {
                    keyword: qualified(services::EXPOSURE, keywords::EXPOSE),
                    expected: "Start, InProgress, End, or Readout".to_string(),
                    actual: state.to_string(),
                });
            }
        }
        info!("    Done");
        Ok(())
    }
}

/// Waits for `kpfexpose.EXPOSE` to reach `Readout`.
///
/// Blocks until the detector enters readout, timing out after the current
/// exposure time plus a 10 s margin.
pub struct WaitForReadout {
    store: Arc<dyn KeywordStore>,
}

impl WaitForReadout {
    /// Create the action against a keyword store.
    pub fn new(store: Arc<dyn KeywordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for WaitForReadout {
    fn name(&self) -> &'static str {
        "WaitForReadout"
    }

    async fn perform(&self, _entry: &SequenceEntry) -> CalResult<()> {
        info!("  Waiting for readout to begin");
        let exptime = read_exptime(self.store.as_ref()).await?;
        let timeout = Duration::from_secs_f64(exptime + READOUT_MARGIN_SECS);
        let satisfied = self
            .store
            .wait_for(
                services::EXPOSURE,
                keywords::EXPOSE,
                &is_state(DetectorState::Readout),
                timeout,
            )
            .await?;
        if !satisfied {
            return Err(CalError::Timeout {
                keyword: qualified(services::EXPOSURE, keywords::EXPOSE),
                condition: "== Readout".to_string(),
                timeout,
            });
        }
        Ok(())
    }

    async fn postcondition(&self, _entry: &SequenceEntry) -> CalResult<()> {
        let state = self.store.read(services::EXPOSURE, keywords::EXPOSE).await?;
        if DetectorState::from_keyword(&state) != Some(DetectorState::Readout) {
            return Err(CalError::Verification {
                keyword: qualified(services::EXPOSURE, keywords::EXPOSE),
                expected: DetectorState::Readout.to_string(),
                actual: state.to_string(),
            });
        }
        info!("    Done");
        Ok(())
    }
}

/// Waits for `kpfexpose.EXPOSE` to return to `Ready`.
///
/// Blocks until the detector can accept another exposure, timing out after
/// 60 seconds.
pub struct WaitForReady {
    store: Arc<dyn KeywordStore>,
}

impl WaitForReady {
    /// Create the action against a keyword store.
    pub fn new(store: Arc<dyn KeywordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for WaitForReady {
    fn name(&self) -> &'static str {
        "WaitForReady"
    }

    async fn perform(&self, _entry: &SequenceEntry) -> CalResult<()> {
        info!("  Waiting for detectors to be ready");
        let satisfied = self
            .store
            .wait_for(
                services::EXPOSURE,
                keywords::EXPOSE,
                &is_state(DetectorState::Ready),
                READY_TIMEOUT,
            )
            .await?;
        if !satisfied {
            return Err(CalError::Timeout {
                keyword: qualified(services::EXPOSURE, keywords::EXPOSE),
                condition: "== Ready".to_string(),
                timeout: READY_TIMEOUT,
            });
        }
        Ok(())
    }

    async fn postcondition(&self, _entry: &SequenceEntry) -> CalResult<()> {
        let state = self.store.read(services::EXPOSURE, keywords::EXPOSE).await?;
        if DetectorState::from_keyword(&state) != Some(DetectorState::Ready) {
            return Err(CalError::Verification {
                keyword: qualified(services::EXPOSURE, keywords::EXPOSE),
                expected: DetectorState::Ready.to_string(),
                actual: state.to_string(),
            });
        }
        info!("    Done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockKeywordStore;

    fn store() -> Arc<MockKeywordStore> {
        Arc::new(MockKeywordStore::new())
    }

    #[tokio::test]
    async fn test_set_exptime_absent_key_is_a_no_op() {
        let store = store();
        let action = SetExptime::new(store.clone());
        action.execute(&SequenceEntry::blank()).await.unwrap();
        assert!(store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_exptime_writes_and_verifies() {
        let store = store();
        let mut entry = SequenceEntry::blank();
        entry.exptime = Some(30.0);
        SetExptime::new(store.clone()).execute(&entry).await.unwrap();
        assert_eq!(store.write_count(services::EXPOSURE, keywords::EXPOSURE).await, 1);
    }

    #[tokio::test]
    async fn test_set_exptime_mismatch_fails_verification() {
        let store = store();
        store
            .set_read_override(services::EXPOSURE, keywords::EXPOSURE, 5.0.into())
            .await;
        let mut entry = SequenceEntry::blank();
        entry.exptime = Some(30.0);
        let err = SetExptime::new(store).execute(&entry).await.unwrap_err();
        assert!(matches!(err, CalError::Verification { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_exposure_runs_detector_cycle() {
        let store = store();
        let mut entry = SequenceEntry::blank();
        entry.exptime = Some(2.0);
        SetExptime::new(store.clone()).execute(&entry).await.unwrap();
        StartExposure::new(store.clone()).execute(&entry).await.unwrap();
        WaitForReadout::new(store.clone()).execute(&entry).await.unwrap();
        WaitForReady::new(store).execute(&entry).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_readout_succeeds_just_inside_margin() {
        let store = store();
        // Readout begins 9.9s after the 10s integration ends; the wait
        // timeout is exptime + 10s, so this lands just inside it.
        store.set_readout_delay(9.9).await;
        let mut entry = SequenceEntry::blank();
        entry.exptime = Some(10.0);
        SetExptime::new(store.clone()).execute(&entry).await.unwrap();
        StartExposure::new(store.clone()).execute(&entry).await.unwrap();
        WaitForReadout::new(store).execute(&entry).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_readout_times_out_beyond_margin() {
        let store = store();
        store.set_readout_delay(11.0).await;
        let mut entry = SequenceEntry::blank();
        entry.exptime = Some(10.0);
        SetExptime::new(store.clone()).execute(&entry).await.unwrap();
        StartExposure::new(store.clone()).execute(&entry).await.unwrap();
        let err = WaitForReadout::new(store).execute(&entry).await.unwrap_err();
        assert!(matches!(err, CalError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_exposure_waits_out_a_busy_detector() {
        let store = store();
        let mut entry = SequenceEntry::blank();
        entry.exptime = Some(1.0);
        SetExptime::new(store.clone()).execute(&entry).await.unwrap();
        StartExposure::new(store.clone()).execute(&entry).await.unwrap();
        // Second trigger while the first exposure is still in flight: the
        // action must wait for Ready before writing Start again.
        StartExposure::new(store.clone()).execute(&entry).await.unwrap();
        assert_eq!(store.write_count(services::EXPOSURE, keywords::EXPOSE).await, 2);
    }
}
