use serde::{Deserialize, Serialize};

use crate::model::{ClaimRecord, Group, Member, Metric, RatableObject, Rating};
use crate::{RecordId, StoreError};

/// Field filter applied by every fetch. `group_id: None` fetches the full set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct RecordFilter {
    pub group_id: Option<RecordId>,
}

impl RecordFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn group(group_id: RecordId) -> Self {
        Self {
            group_id: Some(group_id),
        }
    }

    #[must_use]
    pub fn matches(&self, group_id: &RecordId) -> bool {
        self.group_id.as_ref().map_or(true, |wanted| wanted == group_id)
    }
}

/// Rewrite of a rating's target reference.
///
/// `target_member_id: None` leaves the legacy alias untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RatingTargetPatch {
    pub target_object_id: RecordId,
    pub target_member_id: Option<RecordId>,
}

impl RatingTargetPatch {
    /// Sets both the object reference and its legacy alias.
    #[must_use]
    pub fn both(target: RecordId) -> Self {
        Self {
            target_object_id: target.clone(),
            target_member_id: Some(target),
        }
    }

    #[must_use]
    pub fn object_only(target: RecordId) -> Self {
        Self {
            target_object_id: target,
            target_member_id: None,
        }
    }
}

/// Read/write access to the record sets the integrity core works over.
///
/// Every write is an independent request; implementations do not group
/// writes into a transaction across calls.
pub trait EntityStore {
    /// # Errors
    /// Returns [`StoreError`] when the read fails.
    fn fetch_group(&self, group_id: &RecordId) -> Result<Option<Group>, StoreError>;

    /// # Errors
    /// Returns [`StoreError`] when the read fails.
    fn fetch_objects(&self, filter: &RecordFilter) -> Result<Vec<RatableObject>, StoreError>;

    /// # Errors
    /// Returns [`StoreError`] when the read fails.
    fn fetch_members(&self, filter: &RecordFilter) -> Result<Vec<Member>, StoreError>;

    /// # Errors
    /// Returns [`StoreError`] when the read fails.
    fn fetch_ratings(&self, filter: &RecordFilter) -> Result<Vec<Rating>, StoreError>;

    /// # Errors
    /// Returns [`StoreError`] when the read fails.
    fn fetch_metrics(&self, filter: &RecordFilter) -> Result<Vec<Metric>, StoreError>;

    /// # Errors
    /// Returns [`StoreError`] when the read fails.
    fn fetch_claims(&self, filter: &RecordFilter) -> Result<Vec<ClaimRecord>, StoreError>;

    /// # Errors
    /// Returns [`StoreError`] when the write fails.
    fn upsert_object(&mut self, object: &RatableObject) -> Result<(), StoreError>;

    /// # Errors
    /// Returns [`StoreError`] when the write fails or the rating is missing.
    fn patch_rating_target(
        &mut self,
        rating_id: &RecordId,
        patch: &RatingTargetPatch,
    ) -> Result<(), StoreError>;

    /// # Errors
    /// Returns [`StoreError`] when the write fails.
    fn upsert_claim(&mut self, claim: &ClaimRecord) -> Result<(), StoreError>;

    /// Looks up a single object by identity.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the read fails.
    fn fetch_object(&self, object_id: &RecordId) -> Result<Option<RatableObject>, StoreError> {
        Ok(self
            .fetch_objects(&RecordFilter::all())?
            .into_iter()
            .find(|object| &object.id == object_id))
    }
}
