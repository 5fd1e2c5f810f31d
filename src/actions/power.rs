//! Lamp power actions over the `kpfpower` outlet service.
//!
//! Outlets carry an interlock: the outlet keyword only accepts writes while
//! its `_LOCK` companion reads `Unlocked`, so every state change is an
//! unlock / write / lock triple. Each outlet also has a `_NAME` keyword
//! describing what is plugged into it; the name is read and logged so a
//! human can spot a miswired mapping, which is the only check on the
//! lamp/outlet table.
//!
//! Lamps with no outlet in the [`LampPortMap`] (always-energized or
//! fiber-fed sources) are silent no-ops for both actions.

use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;

use crate::error::{CalError, CalResult};
use crate::keyword::{qualified, services, KeywordStore, KeywordValue};
use crate::lamp::LampPortMap;
use crate::sequence::SequenceEntry;

use super::Action;

async fn outlet_name(store: &dyn KeywordStore, outlet: &str) -> CalResult<String> {
    let value = store
        .read(services::POWER, &format!("{outlet}_NAME"))
        .await?;
    Ok(value.to_string())
}

async fn set_locked(store: &dyn KeywordStore, outlet: &str, locked: bool) -> CalResult<()> {
    let state = if locked { "Locked" } else { "Unlocked" };
    store
        .write(services::POWER, &format!("{outlet}_LOCK"), state.into())
        .await
}

async fn verify_outlet(store: &dyn KeywordStore, outlet: &str, expected: &str) -> CalResult<()> {
    let state = store.read(services::POWER, outlet).await?;
    if state.as_str() != Some(expected) {
        return Err(CalError::Verification {
            keyword: qualified(services::POWER, outlet),
            expected: expected.to_string(),
            actual: state.to_string(),
        });
    }
    Ok(())
}

/// Powers on one cal lamp via its `kpfpower` outlet.
///
/// Idempotent: an outlet that already reads `On` is left alone, with no
/// unlock/write/lock cycle.
pub struct PowerOnCalSource {
    store: Arc<dyn KeywordStore>,
    ports: LampPortMap,
    lamp: String,
}

impl PowerOnCalSource {
    /// Create the action for one lamp.
    pub fn new(store: Arc<dyn KeywordStore>, ports: LampPortMap, lamp: impl Into<String>) -> Self {
        Self {
            store,
            ports,
            lamp: lamp.into(),
        }
    }
}

#[async_trait]
impl Action for PowerOnCalSource {
    fn name(&self) -> &'static str {
        "PowerOnCalSource"
    }

    async fn perform(&self, _entry: &SequenceEntry) -> CalResult<()> {
        let Some(outlet) = self.ports.outlet(&self.lamp) else {
            debug!("  Lamp {} has no controllable outlet, skipping power on", self.lamp);
            return Ok(());
        };
        let name = outlet_name(self.store.as_ref(), outlet).await?;
        let state = self.store.read(services::POWER, outlet).await?;
        if state.as_str() == Some("On") {
            info!("    Outlet {outlet} ({name}) is already On");
            return Ok(());
        }
        info!("    Unlocking {outlet} ({name})");
        set_locked(self.store.as_ref(), outlet, false).await?;
        info!("    Turning on {outlet} ({name})");
        self.store
            .write(services::POWER, outlet, KeywordValue::from("On"))
            .await?;
        info!("    Locking {outlet} ({name})");
        set_locked(self.store.as_ref(), outlet, true).await
    }

    async fn postcondition(&self, _entry: &SequenceEntry) -> CalResult<()> {
        if let Some(outlet) = self.ports.outlet(&self.lamp) {
            let name = outlet_name(self.store.as_ref(), outlet).await?;
            info!("    Reading {outlet} ({name})");
            verify_outlet(self.store.as_ref(), outlet, "On").await?;
        }
        info!("    Done");
        Ok(())
    }
}

/// Powers off one cal lamp via its `kpfpower` outlet.
///
/// Unlike power-on, the off sequence is unconditional: the unlock / `Off` /
/// lock triple is issued even if the outlet already reads `Off`.
pub struct PowerOffCalSource {
    store: Arc<dyn KeywordStore>,
    ports: LampPortMap,
    lamp: String,
}

impl PowerOffCalSource {
    /// Create the action for one lamp.
    pub fn new(store: Arc<dyn KeywordStore>, ports: LampPortMap, lamp: impl Into<String>) -> Self {
        Self {
            store,
            ports,
            lamp: lamp.into(),
        }
    }
}

#[async_trait]
impl Action for PowerOffCalSource {
    fn name(&self) -> &'static str {
        "PowerOffCalSource"
    }

    async fn perform(&self, _entry: &SequenceEntry) -> CalResult<()> {
        let Some(outlet) = self.ports.outlet(&self.lamp) else {
            debug!("  Lamp {} has no controllable outlet, skipping power off", self.lamp);
            return Ok(());
        };
        let name = outlet_name(self.store.as_ref(), outlet).await?;
        info!("  Powering off {}", self.lamp);
        info!("    Unlocking {outlet} ({name})");
        set_locked(self.store.as_ref(), outlet, false).await?;
        info!("    Turning off {outlet} ({name})");
        self.store
            .write(services::POWER, outlet, KeywordValue::from("Off"))
            .await?;
        info!("    Locking {outlet} ({name})");
        set_locked(self.store.as_ref(), outlet, true).await
    }

    async fn postcondition(&self, _entry: &SequenceEntry) -> CalResult<()> {
        if let Some(outlet) = self.ports.outlet(&self.lamp) {
            let name = outlet_name(self.store.as_ref(), outlet).await?;
            info!("    Reading {outlet} ({name})");
            verify_outlet(self.store.as_ref(), outlet, "Off").await?;
        }
        info!("    Done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockKeywordStore;

    #[tokio::test]
    async fn test_power_on_is_idempotent() {
        let store = Arc::new(MockKeywordStore::new());
        let blank = SequenceEntry::blank();
        let action = PowerOnCalSource::new(store.clone(), LampPortMap::default(), "U_gold");
        action.execute(&blank).await.unwrap();
        action.execute(&blank).await.unwrap();
        // The second execute sees On and issues no further writes.
        assert_eq!(store.write_count(services::POWER, "OUTLET_CAL2_7").await, 1);
        assert_eq!(store.write_count(services::POWER, "OUTLET_CAL2_7_LOCK").await, 2);
    }

    #[tokio::test]
    async fn test_unmapped_lamp_is_a_no_op() {
        let store = Arc::new(MockKeywordStore::new());
        let blank = SequenceEntry::blank();
        PowerOnCalSource::new(store.clone(), LampPortMap::default(), "EtalonFiber")
            .execute(&blank)
            .await
            .unwrap();
        PowerOffCalSource::new(store.clone(), LampPortMap::default(), "EtalonFiber")
            .execute(&blank)
            .await
            .unwrap();
        assert!(store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_power_off_cycles_the_interlock() {
        let store = Arc::new(MockKeywordStore::new());
        let blank = SequenceEntry::blank();
        PowerOffCalSource::new(store.clone(), LampPortMap::default(), "Th_daily")
            .execute(&blank)
            .await
            .unwrap();
        let writes = store.writes().await;
        let keywords: Vec<&str> = writes.iter().map(|w| w.keyword.as_str()).collect();
        assert_eq!(
            keywords,
            ["OUTLET_CAL2_6_LOCK", "OUTLET_CAL2_6", "OUTLET_CAL2_6_LOCK"]
        );
    }

    #[tokio::test]
    async fn test_power_on_verification_failure() {
        let store = Arc::new(MockKeywordStore::new());
        store
            .set_read_override(services::POWER, "OUTLET_CAL2_2", "Off".into())
            .await;
        let err = PowerOnCalSource::new(store, LampPortMap::default(), "BrdbandFiber")
            .execute(&SequenceEntry::blank())
            .await
            .unwrap_err();
        assert!(matches!(err, CalError::Verification { .. }));
    }
}
