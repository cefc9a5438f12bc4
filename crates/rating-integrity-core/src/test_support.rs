#![allow(clippy::missing_errors_doc)]

use time::OffsetDateTime;

use crate::gateway::{EntityStore, RatingTargetPatch, RecordFilter};
use crate::model::{
    ClaimRecord, ClaimState, Group, Member, MemberStatus, Metric, ObjectType, RatableObject,
    Rating, RatingMode,
};
use crate::{parse_rfc3339_utc, RecordId, StoreError};

pub fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("expected Ok(..), got error: {err}"),
    }
}

pub fn must_some<T>(value: Option<T>) -> T {
    match value {
        Some(inner) => inner,
        None => panic!("expected Some(..), got None"),
    }
}

pub fn fixture_time() -> OffsetDateTime {
    must(parse_rfc3339_utc("2026-02-07T12:00:00Z"))
}

pub fn fixture_object(id: &str, group_id: &str, name: &str) -> RatableObject {
    RatableObject {
        id: RecordId::new(id),
        group_id: RecordId::new(group_id),
        name: name.to_string(),
        description: None,
        image_url: None,
        object_type: ObjectType::User,
        category: None,
        disabled_metric_ids: Vec::new(),
        enabled_metric_ids: Vec::new(),
        rating_mode: RatingMode::GroupAverage,
        claim: Some(ClaimState::unclaimed()),
        created_at: fixture_time(),
    }
}

pub fn fixture_placeholder(id: &str, group_id: &str, name: &str) -> Member {
    Member {
        id: RecordId::new(id),
        group_id: RecordId::new(group_id),
        user_id: None,
        name: name.to_string(),
        status: MemberStatus::Placeholder,
        description: None,
        placeholder_image_url: None,
        image_url: None,
        object_category: None,
        member_category: None,
        object_type: None,
        disabled_metric_ids: Vec::new(),
        enabled_metric_ids: Vec::new(),
        rating_mode: None,
        claimed_by_user_id: None,
        claimed_by_name: None,
        claimed_by_image: None,
        created_at: fixture_time(),
    }
}

pub fn fixture_active_member(id: &str, group_id: &str, user_id: &str) -> Member {
    let mut member = fixture_placeholder(id, group_id, user_id);
    member.status = MemberStatus::Active;
    member.user_id = Some(RecordId::new(user_id));
    member
}

pub fn fixture_rating(id: &str, target: &str, metric_id: &str, rater: &str, value: f64) -> Rating {
    Rating {
        id: RecordId::new(id),
        group_id: RecordId::new("g1"),
        metric_id: RecordId::new(metric_id),
        rater_user_id: RecordId::new(rater),
        target_object_id: Some(RecordId::new(target)),
        target_member_id: Some(RecordId::new(target)),
        value,
        updated_at: fixture_time(),
    }
}

pub fn fixture_metric(id: &str, group_id: &str) -> Metric {
    Metric {
        id: RecordId::new(id),
        group_id: RecordId::new(group_id),
        name: format!("metric {id}"),
        min_value: 0.0,
        max_value: 10.0,
        prefix: None,
        suffix: None,
        applicable_categories: Vec::new(),
    }
}

/// In-memory gateway with optional write-failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub groups: Vec<Group>,
    pub objects: Vec<RatableObject>,
    pub members: Vec<Member>,
    pub ratings: Vec<Rating>,
    pub metrics: Vec<Metric>,
    pub claims: Vec<ClaimRecord>,
    pub writes: usize,
    /// Fails the write with this zero-based index.
    pub fail_on_write: Option<usize>,
}

impl MemoryStore {
    fn record_write(&mut self, operation: &str) -> Result<(), StoreError> {
        let index = self.writes;
        if self.fail_on_write == Some(index) {
            return Err(StoreError::new(operation, "injected write failure"));
        }
        self.writes += 1;
        Ok(())
    }

    pub fn rating(&self, id: &str) -> &Rating {
        must_some(self.ratings.iter().find(|rating| rating.id.as_str() == id))
    }
}

impl EntityStore for MemoryStore {
    fn fetch_group(&self, group_id: &RecordId) -> Result<Option<Group>, StoreError> {
        Ok(self.groups.iter().find(|group| &group.id == group_id).cloned())
    }

    fn fetch_objects(&self, filter: &RecordFilter) -> Result<Vec<RatableObject>, StoreError> {
        Ok(self
            .objects
            .iter()
            .filter(|object| filter.matches(&object.group_id))
            .cloned()
            .collect())
    }

    fn fetch_members(&self, filter: &RecordFilter) -> Result<Vec<Member>, StoreError> {
        Ok(self
            .members
            .iter()
            .filter(|member| filter.matches(&member.group_id))
            .cloned()
            .collect())
    }

    fn fetch_ratings(&self, filter: &RecordFilter) -> Result<Vec<Rating>, StoreError> {
        Ok(self
            .ratings
            .iter()
            .filter(|rating| filter.matches(&rating.group_id))
            .cloned()
            .collect())
    }

    fn fetch_metrics(&self, filter: &RecordFilter) -> Result<Vec<Metric>, StoreError> {
        Ok(self
            .metrics
            .iter()
            .filter(|metric| filter.matches(&metric.group_id))
            .cloned()
            .collect())
    }

    fn fetch_claims(&self, filter: &RecordFilter) -> Result<Vec<ClaimRecord>, StoreError> {
        Ok(self
            .claims
            .iter()
            .filter(|claim| filter.matches(&claim.group_id))
            .cloned()
            .collect())
    }

    fn upsert_object(&mut self, object: &RatableObject) -> Result<(), StoreError> {
        self.record_write("upsert_object")?;
        if let Some(existing) = self.objects.iter_mut().find(|item| item.id == object.id) {
            *existing = object.clone();
        } else {
            self.objects.push(object.clone());
        }
        Ok(())
    }

    fn patch_rating_target(
        &mut self,
        rating_id: &RecordId,
        patch: &RatingTargetPatch,
    ) -> Result<(), StoreError> {
        self.record_write("patch_rating_target")?;
        let Some(rating) = self.ratings.iter_mut().find(|item| &item.id == rating_id) else {
            return Err(StoreError::new(
                "patch_rating_target",
                format!("rating {rating_id} not found"),
            ));
        };
        rating.target_object_id = Some(patch.target_object_id.clone());
        if let Some(member_id) = &patch.target_member_id {
            rating.target_member_id = Some(member_id.clone());
        }
        Ok(())
    }

    fn upsert_claim(&mut self, claim: &ClaimRecord) -> Result<(), StoreError> {
        self.record_write("upsert_claim")?;
        if let Some(existing) = self.claims.iter_mut().find(|item| item.id == claim.id) {
            *existing = claim.clone();
        } else {
            self.claims.push(claim.clone());
        }
        Ok(())
    }
}
