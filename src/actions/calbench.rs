//! Cal bench motion actions: octagon source selection and ND filter wheels.

use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::error::{CalError, CalResult};
use crate::keyword::{keywords, qualified, services, KeywordStore, KeywordValue};
use crate::sequence::SequenceEntry;

use super::Action;

/// Selects which source the octagon feeds into the cal bench via
/// `kpfmot.OCTAGON`.
///
/// Valid positions: Home, EtalonFiber, BrdbandFiber, U_gold, U_daily,
/// Th_daily, Th_gold, SoCal-CalFib, LFCFiber.
pub struct SetCalSource {
    store: Arc<dyn KeywordStore>,
}

impl SetCalSource {
    /// Create the action against a keyword store.
    pub fn new(store: Arc<dyn KeywordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for SetCalSource {
    fn name(&self) -> &'static str {
        "SetCalSource"
    }

    async fn perform(&self, entry: &SequenceEntry) -> CalResult<()> {
        let target = &entry.octagon_source;
        info!("  Setting cal source (octagon) to {target}");
        self.store
            .write(
                services::MOTION,
                keywords::OCTAGON,
                KeywordValue::from(target.clone()),
            )
            .await
    }

    async fn postcondition(&self, entry: &SequenceEntry) -> CalResult<()> {
        let position = self.store.read(services::MOTION, keywords::OCTAGON).await?;
        if position.as_str() != Some(entry.octagon_source.as_str()) {
            return Err(CalError::Verification {
                keyword: qualified(services::MOTION, keywords::OCTAGON),
                expected: entry.octagon_source.clone(),
                actual: position.to_string(),
            });
        }
        info!("    Done");
        Ok(())
    }
}

/// Sets the filter in the ND1 wheel (at the output of the octagon) via
/// `kpfmot.ND1POS`.
pub struct SetND1 {
    store: Arc<dyn KeywordStore>,
}

impl SetND1 {
    /// Create the action against a keyword store.
    pub fn new(store: Arc<dyn KeywordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for SetND1 {
    fn name(&self) -> &'static str {
        "SetND1"
    }

    async fn perform(&self, entry: &SequenceEntry) -> CalResult<()> {
        if let Some(target) = &entry.nd1 {
            info!("  Setting ND1 to {target}");
            self.store
                .write(
                    services::MOTION,
                    keywords::ND1POS,
                    KeywordValue::from(target.clone()),
                )
                .await?;
        }
        Ok(())
    }

    async fn postcondition(&self, entry: &SequenceEntry) -> CalResult<()> {
        if let Some(target) = &entry.nd1 {
            let position = self.store.read(services::MOTION, keywords::ND1POS).await?;
            if position.as_str() != Some(target.as_str()) {
                return Err(CalError::Verification {
                    keyword: qualified(services::MOTION, keywords::ND1POS),
                    expected: target.clone(),
                    actual: position.to_string(),
                });
            }
            info!("    Done");
        }
        Ok(())
    }
}

/// Sets the filter in the ND2 wheel (second attenuator stage) via
/// `kpfmot.ND2POS`.
pub struct SetND2 {
    store: Arc<dyn KeywordStore>,
}

impl SetND2 {
    /// Create the action against a keyword store.
    pub fn new(store: Arc<dyn KeywordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for SetND2 {
    fn name(&self) -> &'static str {
        "SetND2"
    }

    async fn perform(&self, entry: &SequenceEntry) -> CalResult<()> {
        if let Some(target) = &entry.nd2 {
            info!("  Setting ND2 to {target}");
            self.store
                .write(
                    services::MOTION,
                    keywords::ND2POS,
                    KeywordValue::from(target.clone()),
                )
                .await?;
        }
        Ok(())
    }

    async fn postcondition(&self, entry: &SequenceEntry) -> CalResult<()> {
        if let Some(target) = &entry.nd2 {
            let position = self.store.read(services::MOTION, keywords::ND2POS).await?;
            if position.as_str() != Some(target.as_str()) {
                return Err(CalError::Verification {
                    keyword: qualified(services::MOTION, keywords::ND2POS),
                    expected: target.clone(),
                    actual: position.to_string(),
                });
            }
            info!("    Done");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockKeywordStore;

    #[tokio::test]
    async fn test_set_cal_source_writes_and_verifies() {
        let store = Arc::new(MockKeywordStore::new());
        let mut entry = SequenceEntry::blank();
        entry.octagon_source = "U_gold".to_string();
        SetCalSource::new(store.clone()).execute(&entry).await.unwrap();
        let position = store.read(services::MOTION, keywords::OCTAGON).await.unwrap();
        assert_eq!(position.as_str(), Some("U_gold"));
    }

    #[tokio::test]
    async fn test_absent_nd_targets_are_no_ops() {
        let store = Arc::new(MockKeywordStore::new());
        let blank = SequenceEntry::blank();
        SetND1::new(store.clone()).execute(&blank).await.unwrap();
        SetND2::new(store.clone()).execute(&blank).await.unwrap();
        assert!(store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_nd1_mismatch_fails_verification() {
        let store = Arc::new(MockKeywordStore::new());
        store
            .set_read_override(services::MOTION, keywords::ND1POS, "OD 2.0".into())
            .await;
        let mut entry = SequenceEntry::blank();
        entry.nd1 = Some("OD 0.1".to_string());
        let err = SetND1::new(store).execute(&entry).await.unwrap_err();
        match err {
            CalError::Verification { expected, actual, .. } => {
                assert_eq!(expected, "OD 0.1");
                assert_eq!(actual, "OD 2.0");
            }
            other => panic!("expected verification error, got {other}"),
        }
    }
}
