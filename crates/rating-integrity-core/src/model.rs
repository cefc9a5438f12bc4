use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{IntegrityError, RecordId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Text,
    Link,
    User,
}

impl ObjectType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Link => "link",
            Self::User => "user",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "link" => Some(Self::Link),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RatingMode {
    CaptainOnly,
    #[default]
    GroupAverage,
}

impl RatingMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CaptainOnly => "captain_only",
            Self::GroupAverage => "group_average",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "captain_only" | "captain" => Some(Self::CaptainOnly),
            "group_average" | "group" => Some(Self::GroupAverage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Unclaimed,
    Pending,
    Claimed,
}

impl ClaimStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unclaimed => "unclaimed",
            Self::Pending => "pending",
            Self::Claimed => "claimed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unclaimed" => Some(Self::Unclaimed),
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Placeholder,
    Removed,
}

impl MemberStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Placeholder => "placeholder",
            Self::Removed => "removed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "placeholder" => Some(Self::Placeholder),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClaimRecordStatus {
    Pending,
    Approved,
    Rejected,
}

impl ClaimRecordStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Claim state carried by user-type objects.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ClaimState {
    pub status: ClaimStatus,
    pub claimed_by_user_id: Option<RecordId>,
    pub claimed_by_name: Option<String>,
    pub claimed_by_image: Option<String>,
}

impl ClaimState {
    #[must_use]
    pub fn unclaimed() -> Self {
        Self {
            status: ClaimStatus::Unclaimed,
            claimed_by_user_id: None,
            claimed_by_name: None,
            claimed_by_image: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Group {
    pub id: RecordId,
    pub name: String,
    pub captain_user_id: RecordId,
}

/// Current first-class ratable entity within a group.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RatableObject {
    pub id: RecordId,
    pub group_id: RecordId,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub object_type: ObjectType,
    pub category: Option<String>,
    pub disabled_metric_ids: Vec<RecordId>,
    pub enabled_metric_ids: Vec<RecordId>,
    pub rating_mode: RatingMode,
    pub claim: Option<ClaimState>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Member record. Only `status == Placeholder` rows take part in migration
/// and repair; the legacy descriptive fields exist for those rows.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Member {
    pub id: RecordId,
    pub group_id: RecordId,
    pub user_id: Option<RecordId>,
    pub name: String,
    pub status: MemberStatus,
    pub description: Option<String>,
    pub placeholder_image_url: Option<String>,
    pub image_url: Option<String>,
    pub object_category: Option<String>,
    pub member_category: Option<String>,
    pub object_type: Option<ObjectType>,
    pub disabled_metric_ids: Vec<RecordId>,
    pub enabled_metric_ids: Vec<RecordId>,
    pub rating_mode: Option<RatingMode>,
    pub claimed_by_user_id: Option<RecordId>,
    pub claimed_by_name: Option<String>,
    pub claimed_by_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Member {
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.status == MemberStatus::Placeholder
    }

    /// Identity that has claimed this placeholder, if any.
    #[must_use]
    pub fn claiming_identity(&self) -> Option<&RecordId> {
        self.claimed_by_user_id
            .as_ref()
            .filter(|id| !id.is_blank())
            .or_else(|| self.user_id.as_ref().filter(|id| !id.is_blank()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub id: RecordId,
    pub group_id: RecordId,
    pub metric_id: RecordId,
    pub rater_user_id: RecordId,
    pub target_object_id: Option<RecordId>,
    /// Legacy alias of `target_object_id`.
    pub target_member_id: Option<RecordId>,
    pub value: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Rating {
    /// Checks the value against the metric bounds.
    ///
    /// # Errors
    /// Returns [`IntegrityError::Validation`] when the metric does not match
    /// or the value falls outside `[min_value, max_value]`.
    pub fn validate_against(&self, metric: &Metric) -> Result<(), IntegrityError> {
        if self.metric_id != metric.id {
            return Err(IntegrityError::Validation(format!(
                "rating {} references metric {}, not {}",
                self.id, self.metric_id, metric.id
            )));
        }

        if !self.value.is_finite() || self.value < metric.min_value || self.value > metric.max_value
        {
            return Err(IntegrityError::Validation(format!(
                "rating {} value {} MUST be in [{}, {}]",
                self.id, self.value, metric.min_value, metric.max_value
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    pub id: RecordId,
    pub group_id: RecordId,
    pub name: String,
    pub min_value: f64,
    pub max_value: f64,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub applicable_categories: Vec<String>,
}

impl Metric {
    /// # Errors
    /// Returns [`IntegrityError::Validation`] when the bounds are inverted or
    /// not finite.
    pub fn validate(&self) -> Result<(), IntegrityError> {
        if !self.min_value.is_finite() || !self.max_value.is_finite() {
            return Err(IntegrityError::Validation(format!(
                "metric {} bounds MUST be finite",
                self.id
            )));
        }
        if self.min_value > self.max_value {
            return Err(IntegrityError::Validation(format!(
                "metric {} minValue cannot exceed maxValue",
                self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ClaimRecord {
    pub id: RecordId,
    pub group_id: RecordId,
    pub object_id: RecordId,
    pub token: String,
    pub status: ClaimRecordStatus,
    pub claimant_user_id: Option<RecordId>,
    pub claimant_name: Option<String>,
    pub claimant_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Resolves the identity a rating points at.
///
/// Precedence: `target_object_id`, then `target_member_id`. Blank identities
/// count as absent.
#[must_use]
pub fn resolve_target(rating: &Rating) -> Option<&RecordId> {
    rating
        .target_object_id
        .as_ref()
        .filter(|id| !id.is_blank())
        .or_else(|| rating.target_member_id.as_ref().filter(|id| !id.is_blank()))
}

/// Lowercased, trimmed form used for name matching.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Decides whether a metric is shown for an object.
///
/// Precedence: explicit disable, explicit enable, category default, and
/// finally "no category restriction applies to all". An object without a
/// category does not match a restricted metric.
#[must_use]
pub fn metric_applies_to_object(metric: &Metric, object: &RatableObject) -> bool {
    if object.disabled_metric_ids.contains(&metric.id) {
        return false;
    }
    if object.enabled_metric_ids.contains(&metric.id) {
        return true;
    }
    if metric.applicable_categories.is_empty() {
        return true;
    }

    object.category.as_deref().is_some_and(|category| {
        metric
            .applicable_categories
            .iter()
            .any(|candidate| candidate == category)
    })
}

#[must_use]
pub fn applicable_metrics<'a>(object: &RatableObject, metrics: &'a [Metric]) -> Vec<&'a Metric> {
    metrics
        .iter()
        .filter(|metric| metric.group_id == object.group_id)
        .filter(|metric| metric_applies_to_object(metric, object))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture_metric, fixture_object, fixture_rating};

    #[test]
    fn resolve_target_prefers_object_identity() {
        let mut rating = fixture_rating("r1", "obj-1", "m1", "u1", 4.0);
        rating.target_member_id = Some(RecordId::new("mem-1"));
        assert_eq!(resolve_target(&rating), Some(&RecordId::new("obj-1")));
    }

    #[test]
    fn resolve_target_falls_back_to_member_alias() {
        let mut rating = fixture_rating("r1", "obj-1", "m1", "u1", 4.0);
        rating.target_object_id = None;
        rating.target_member_id = Some(RecordId::new("mem-1"));
        assert_eq!(resolve_target(&rating), Some(&RecordId::new("mem-1")));

        rating.target_object_id = Some(RecordId::new(" "));
        assert_eq!(resolve_target(&rating), Some(&RecordId::new("mem-1")));
    }

    #[test]
    fn resolve_target_treats_blank_as_missing() {
        let mut rating = fixture_rating("r1", "", "m1", "u1", 4.0);
        rating.target_member_id = Some(RecordId::new(""));
        assert_eq!(resolve_target(&rating), None);
    }

    #[test]
    fn normalize_name_trims_and_lowercases() {
        assert_eq!(normalize_name("  LeBron James "), "lebron james");
    }

    #[test]
    fn explicit_disable_beats_explicit_enable() {
        let metric = fixture_metric("m1", "g1");
        let mut object = fixture_object("o1", "g1", "LeBron");
        object.enabled_metric_ids.push(RecordId::new("m1"));
        object.disabled_metric_ids.push(RecordId::new("m1"));
        assert!(!metric_applies_to_object(&metric, &object));
    }

    #[test]
    fn explicit_enable_beats_category_restriction() {
        let mut metric = fixture_metric("m1", "g1");
        metric.applicable_categories = vec!["athlete".to_string()];
        let mut object = fixture_object("o1", "g1", "Lasagna");
        object.category = Some("food".to_string());
        assert!(!metric_applies_to_object(&metric, &object));

        object.enabled_metric_ids.push(RecordId::new("m1"));
        assert!(metric_applies_to_object(&metric, &object));
    }

    #[test]
    fn category_default_and_unrestricted_metrics() {
        let mut metric = fixture_metric("m1", "g1");
        let mut object = fixture_object("o1", "g1", "LeBron");
        assert!(metric_applies_to_object(&metric, &object));

        metric.applicable_categories = vec!["athlete".to_string()];
        assert!(!metric_applies_to_object(&metric, &object));

        object.category = Some("athlete".to_string());
        assert!(metric_applies_to_object(&metric, &object));
    }

    #[test]
    fn applicable_metrics_is_scoped_to_object_group() {
        let metrics = vec![fixture_metric("m1", "g1"), fixture_metric("m2", "g2")];
        let object = fixture_object("o1", "g1", "LeBron");
        let applicable = applicable_metrics(&object, &metrics);
        assert_eq!(applicable.len(), 1);
        assert_eq!(applicable[0].id, RecordId::new("m1"));
    }

    #[test]
    fn rating_value_must_fall_inside_metric_bounds() {
        let metric = fixture_metric("m1", "g1");
        let inside = fixture_rating("r1", "o1", "m1", "u1", 10.0);
        assert!(inside.validate_against(&metric).is_ok());

        let outside = fixture_rating("r2", "o1", "m1", "u1", 10.5);
        assert!(matches!(
            outside.validate_against(&metric),
            Err(IntegrityError::Validation(_))
        ));
    }

    #[test]
    fn inverted_metric_bounds_are_rejected() {
        let mut metric = fixture_metric("m1", "g1");
        metric.min_value = 5.0;
        metric.max_value = 1.0;
        assert!(metric.validate().is_err());
    }

    #[test]
    fn claiming_identity_ignores_blank_ids() {
        let mut member = crate::test_support::fixture_placeholder("p1", "g1", "LeBron");
        assert_eq!(member.claiming_identity(), None);
        member.claimed_by_user_id = Some(RecordId::new(""));
        assert_eq!(member.claiming_identity(), None);
        member.user_id = Some(RecordId::new("user-9"));
        member.claimed_by_user_id = None;
        assert_eq!(member.claiming_identity(), Some(&RecordId::new("user-9")));
    }
}
