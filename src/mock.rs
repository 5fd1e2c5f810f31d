//! Simulated keyword store for tests and dry bench runs.
//!
//! Provides an in-memory [`KeywordStore`] with a simulated detector, so the
//! full sequencing engine can run without hardware. All timing uses
//! `tokio::time` (never `std::thread::sleep`), which lets paused-clock
//! tests drive multi-minute sequences instantly.
//!
//! # Detector simulation
//!
//! A write of `Start` to `kpfexpose.EXPOSE` begins an exposure cycle that
//! advances `Start → InProgress → End → Readout → Ready` on the tokio
//! clock, using the exposure time stored in `kpfexpose.EXPOSURE` at the
//! moment of the write. Readout-entry delay and readout duration are
//! configurable so tests can place the readout transition on either side
//! of a wait timeout.
//!
//! # Test hooks
//!
//! - every `write` is journaled and queryable via [`MockKeywordStore::writes`];
//! - per-keyword read overrides force verification mismatches.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::detector::DetectorState;
use crate::error::{CalError, CalResult};
use crate::keyword::{keywords, services, KeywordStore, KeywordValue};

/// How long the simulated detector sits in `Start` before integrating.
const START_HOLD_SECS: f64 = 0.2;

/// One journaled write.
#[derive(Clone, Debug)]
pub struct WriteRecord {
    /// Service the write went to.
    pub service: String,
    /// Keyword the write went to.
    pub keyword: String,
    /// Value written.
    pub value: KeywordValue,
}

struct ExposureSim {
    started: Instant,
    exptime: f64,
}

/// In-memory keyword store with a simulated detector.
pub struct MockKeywordStore {
    values: RwLock<HashMap<(String, String), KeywordValue>>,
    overrides: RwLock<HashMap<(String, String), KeywordValue>>,
    writes: Mutex<Vec<WriteRecord>>,
    exposure: RwLock<Option<ExposureSim>>,
    readout_delay: RwLock<f64>,
    readout_duration: RwLock<f64>,
    poll_interval: Duration,
}

impl MockKeywordStore {
    /// Create a store seeded with idle bench defaults: detector `Ready`,
    /// outlets `Off` and `Locked`, octagon at `Home`, empty shutter lists.
    pub fn new() -> Self {
        let mut values = HashMap::new();
        let mut set = |service: &str, keyword: &str, value: KeywordValue| {
            values.insert((service.to_string(), keyword.to_string()), value);
        };

        set(services::EXPOSURE, keywords::EXPOSE, "Ready".into());
        set(services::EXPOSURE, keywords::EXPOSURE, 0.0.into());
        set(services::EXPOSURE, keywords::TRIG_TARG, "".into());
        set(services::EXPOSURE, keywords::SRC_SHUTTERS, "".into());
        set(services::EXPOSURE, keywords::TIMED_SHUTTERS, "".into());
        set(services::MOTION, keywords::OCTAGON, "Home".into());

        for (outlet, name) in [
            ("OUTLET_CAL2_2", "Broadband fiber lamp"),
            ("OUTLET_CAL2_5", "ThAr gold lamp"),
            ("OUTLET_CAL2_6", "ThAr daily lamp"),
            ("OUTLET_CAL2_7", "UNe gold lamp"),
            ("OUTLET_CAL2_8", "UNe daily lamp"),
        ] {
            set(services::POWER, outlet, "Off".into());
            set(services::POWER, &format!("{outlet}_NAME"), name.into());
            set(services::POWER, &format!("{outlet}_LOCK"), "Locked".into());
        }

        Self {
            values: RwLock::new(values),
            overrides: RwLock::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            exposure: RwLock::new(None),
            readout_delay: RwLock::new(0.5),
            readout_duration: RwLock::new(3.0),
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Seed a keyword value without journaling a write.
    pub async fn set(&self, service: &str, keyword: &str, value: KeywordValue) {
        self.values
            .write()
            .await
            .insert((service.to_string(), keyword.to_string()), value);
    }

    /// Force subsequent reads of `service.keyword` to return `value`,
    /// regardless of writes. Used to simulate a device that did not take
    /// the commanded value.
    pub async fn set_read_override(&self, service: &str, keyword: &str, value: KeywordValue) {
        self.overrides
            .write()
            .await
            .insert((service.to_string(), keyword.to_string()), value);
    }

    /// Seconds after the end of integration before readout begins.
    pub async fn set_readout_delay(&self, secs: f64) {
        *self.readout_delay.write().await = secs;
    }

    /// Seconds the detector stays in `Readout` before returning to `Ready`.
    pub async fn set_readout_duration(&self, secs: f64) {
        *self.readout_duration.write().await = secs;
    }

    /// All journaled writes, in order.
    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().await.clone()
    }

    /// Number of writes made to one keyword.
    pub async fn write_count(&self, service: &str, keyword: &str) -> usize {
        self.writes
            .lock()
            .await
            .iter()
            .filter(|w| w.service == service && w.keyword == keyword)
            .count()
    }

    async fn detector_state(&self) -> Option<DetectorState> {
        let guard = self.exposure.read().await;
        let sim = guard.as_ref()?;
        let elapsed = sim.started.elapsed().as_secs_f64();
        let integration_end = sim.exptime.max(START_HOLD_SECS);
        let readout_start = integration_end + *self.readout_delay.read().await;
        let readout_end = readout_start + *self.readout_duration.read().await;

        let state = if elapsed < START_HOLD_SECS {
            DetectorState::Start
        } else if elapsed < integration_end {
            DetectorState::InProgress
        } else if elapsed < readout_start {
            DetectorState::End
        } else if elapsed < readout_end {
            DetectorState::Readout
        } else {
            DetectorState::Ready
        };
        Some(state)
    }
}

impl Default for MockKeywordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeywordStore for MockKeywordStore {
    async fn read(&self, service: &str, keyword: &str) -> CalResult<KeywordValue> {
        let key = (service.to_string(), keyword.to_string());
        if let Some(value) = self.overrides.read().await.get(&key) {
            return Ok(value.clone());
        }
        if service == services::EXPOSURE && keyword == keywords::EXPOSE {
            if let Some(state) = self.detector_state().await {
                return Ok(KeywordValue::Str(state.to_string()));
            }
        }
        self.values
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| CalError::Store(format!("no value for {service}.{keyword}")))
    }

    async fn write(&self, service: &str, keyword: &str, value: KeywordValue) -> CalResult<()> {
        self.writes.lock().await.push(WriteRecord {
            service: service.to_string(),
            keyword: keyword.to_string(),
            value: value.clone(),
        });

        if service == services::EXPOSURE
            && keyword == keywords::EXPOSE
            && value.as_str() == Some("Start")
        {
            let exptime = self
                .read(services::EXPOSURE, keywords::EXPOSURE)
                .await
                .ok()
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            *self.exposure.write().await = Some(ExposureSim {
                started: Instant::now(),
                exptime,
            });
        }

        self.values
            .write()
            .await
            .insert((service.to_string(), keyword.to_string()), value);
        Ok(())
    }

    async fn wait_for(
        &self,
        service: &str,
        keyword: &str,
        predicate: &(dyn for<'a> Fn(&'a KeywordValue) -> bool + Send + Sync),
        timeout: Duration,
    ) -> CalResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let value = self.read(service, keyword).await?;
            if predicate(&value) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
