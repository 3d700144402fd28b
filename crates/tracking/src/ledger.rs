//! Read access to the append-only tracking ledger.
//!
//! Appends only happen inside lifecycle transitions; there is no way to
//! edit or remove an entry through this crate.

use wastetrack_storage::{TrackingRecord, TrackingStorage};

use crate::actor::{authorize, Actor, Capability};
use crate::error::TrackingError;
use crate::lifecycle::TrackingService;

impl<S: TrackingStorage> TrackingService<S> {
    /// An item's ledger, most recent first.
    pub async fn history(
        &self,
        item_id: &str,
        actor: &Actor,
    ) -> Result<Vec<TrackingRecord>, TrackingError> {
        let item = self.storage.get_item(item_id).await?;
        authorize(
            actor,
            Capability::ViewBarangay {
                barangay_id: item.barangay_id,
            },
        )?;
        Ok(self.storage.tracking_history(item_id).await?)
    }

    /// The most recent ledger entry for an item, if any.
    pub async fn latest(&self, item_id: &str) -> Result<Option<TrackingRecord>, TrackingError> {
        Ok(self.storage.latest_tracking(item_id).await?)
    }

    /// Check that an item agrees with its ledger head.
    ///
    /// Returns the mismatch as a state error; used by consistency audits.
    pub async fn verify_consistency(&self, item_id: &str) -> Result<(), TrackingError> {
        let item = self.storage.get_item(item_id).await?;
        match self.storage.latest_tracking(item_id).await? {
            Some(latest) if latest.status == item.status => Ok(()),
            Some(latest) => Err(TrackingError::State(format!(
                "item {item_id} is {} but its latest ledger entry is {}",
                item.status, latest.status
            ))),
            None => Err(TrackingError::State(format!(
                "item {item_id} has no ledger entries"
            ))),
        }
    }
}
