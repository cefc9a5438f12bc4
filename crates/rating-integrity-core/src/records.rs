//! Loosely-typed document shapes as exported from the document store.
//!
//! Every field other than the identity is optional here. Decoding resolves
//! blanks to absent values, parses enum strings and checks rating values
//! against their metric, so the typed entities never carry raw shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::{
    ClaimRecord, ClaimRecordStatus, ClaimState, ClaimStatus, Group, Member, MemberStatus, Metric,
    ObjectType, RatableObject, Rating, RatingMode,
};
use crate::{now_utc, parse_rfc3339_utc, IntegrityError, RecordId};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawGroup {
    pub id: String,
    pub name: Option<String>,
    pub captain_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawObject {
    pub id: String,
    pub group_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(rename = "type")]
    pub object_type: Option<String>,
    pub category: Option<String>,
    pub disabled_metric_ids: Option<Vec<String>>,
    pub enabled_metric_ids: Option<Vec<String>>,
    pub rating_mode: Option<String>,
    pub claim_status: Option<String>,
    pub claimed_by_user_id: Option<String>,
    pub claimed_by_name: Option<String>,
    pub claimed_by_image: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawMember {
    pub id: String,
    pub group_id: Option<String>,
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub placeholder_image_url: Option<String>,
    pub image_url: Option<String>,
    pub object_category: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub object_type: Option<String>,
    pub disabled_metric_ids: Option<Vec<String>>,
    pub enabled_metric_ids: Option<Vec<String>>,
    pub rating_mode: Option<String>,
    pub claimed_by_user_id: Option<String>,
    pub claimed_by_name: Option<String>,
    pub claimed_by_image: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawRating {
    pub id: String,
    pub group_id: Option<String>,
    pub metric_id: Option<String>,
    #[serde(alias = "userId")]
    pub rater_id: Option<String>,
    pub target_object_id: Option<String>,
    pub target_member_id: Option<String>,
    pub value: Option<f64>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawMetric {
    pub id: String,
    pub group_id: Option<String>,
    pub name: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub applicable_categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawClaim {
    pub id: String,
    pub group_id: Option<String>,
    pub object_id: Option<String>,
    pub token: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "userId")]
    pub claimant_user_id: Option<String>,
    pub claimant_name: Option<String>,
    pub claimant_image: Option<String>,
    pub created_at: Option<String>,
}

/// Full export of the record sets in their stored shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordSnapshot {
    pub groups: Vec<RawGroup>,
    pub objects: Vec<RawObject>,
    pub members: Vec<RawMember>,
    pub ratings: Vec<RawRating>,
    pub metrics: Vec<RawMetric>,
    pub claims: Vec<RawClaim>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedSnapshot {
    pub groups: Vec<Group>,
    pub objects: Vec<RatableObject>,
    pub members: Vec<Member>,
    pub ratings: Vec<Rating>,
    pub metrics: Vec<Metric>,
    pub claims: Vec<ClaimRecord>,
}

impl RecordSnapshot {
    /// Decodes every record into its typed entity.
    ///
    /// Missing timestamps default to the decode time. Ratings whose metric is
    /// part of the snapshot are checked against its bounds.
    ///
    /// # Errors
    /// Returns [`IntegrityError::Validation`] naming the first record that
    /// fails to decode.
    pub fn decode(self) -> Result<TypedSnapshot, IntegrityError> {
        let now = now_utc();

        let metrics = self
            .metrics
            .into_iter()
            .map(decode_metric)
            .collect::<Result<Vec<_>, _>>()?;
        let metric_index: HashMap<&RecordId, &Metric> =
            metrics.iter().map(|metric| (&metric.id, metric)).collect();

        let ratings = self
            .ratings
            .into_iter()
            .map(|raw| decode_rating(raw, now))
            .collect::<Result<Vec<_>, _>>()?;
        for rating in &ratings {
            if let Some(metric) = metric_index.get(&rating.metric_id) {
                rating.validate_against(metric)?;
            }
        }

        Ok(TypedSnapshot {
            groups: self
                .groups
                .into_iter()
                .map(decode_group)
                .collect::<Result<Vec<_>, _>>()?,
            objects: self
                .objects
                .into_iter()
                .map(|raw| decode_object(raw, now))
                .collect::<Result<Vec<_>, _>>()?,
            members: self
                .members
                .into_iter()
                .map(|raw| decode_member(raw, now))
                .collect::<Result<Vec<_>, _>>()?,
            claims: self
                .claims
                .into_iter()
                .map(|raw| decode_claim(raw, now))
                .collect::<Result<Vec<_>, _>>()?,
            ratings,
            metrics,
        })
    }
}

fn decode_group(raw: RawGroup) -> Result<Group, IntegrityError> {
    let id = required_id("group", "id", &raw.id, Some(raw.id.clone()))?;
    Ok(Group {
        captain_user_id: required_id("group", "captainId", &raw.id, raw.captain_id)?,
        name: raw.name.unwrap_or_default(),
        id,
    })
}

fn decode_object(raw: RawObject, now: OffsetDateTime) -> Result<RatableObject, IntegrityError> {
    let id = required_id("object", "id", &raw.id, Some(raw.id.clone()))?;
    let object_type = match text(raw.object_type) {
        Some(value) => parse_enum("object", &raw.id, "type", &value, ObjectType::parse)?,
        None => ObjectType::Text,
    };
    let claim_status = text(raw.claim_status)
        .map(|value| parse_enum("object", &raw.id, "claimStatus", &value, ClaimStatus::parse))
        .transpose()?;

    let claim = if object_type == ObjectType::User || claim_status.is_some() {
        Some(ClaimState {
            status: claim_status.unwrap_or(ClaimStatus::Unclaimed),
            claimed_by_user_id: optional_id(raw.claimed_by_user_id),
            claimed_by_name: text(raw.claimed_by_name),
            claimed_by_image: text(raw.claimed_by_image),
        })
    } else {
        None
    };

    Ok(RatableObject {
        group_id: required_id("object", "groupId", &raw.id, raw.group_id)?,
        name: raw.name.unwrap_or_default(),
        description: text(raw.description),
        image_url: text(raw.image_url),
        object_type,
        category: text(raw.category),
        disabled_metric_ids: id_list(raw.disabled_metric_ids),
        enabled_metric_ids: id_list(raw.enabled_metric_ids),
        rating_mode: decode_rating_mode("object", &raw.id, raw.rating_mode)?.unwrap_or_default(),
        claim,
        created_at: timestamp("object", &raw.id, raw.created_at, now)?,
        id,
    })
}

fn decode_member(raw: RawMember, now: OffsetDateTime) -> Result<Member, IntegrityError> {
    let id = required_id("member", "id", &raw.id, Some(raw.id.clone()))?;
    let status = match text(raw.status) {
        Some(value) => parse_enum("member", &raw.id, "status", &value, MemberStatus::parse)?,
        None => MemberStatus::Active,
    };
    let object_type = text(raw.object_type)
        .map(|value| parse_enum("member", &raw.id, "type", &value, ObjectType::parse))
        .transpose()?;

    Ok(Member {
        group_id: required_id("member", "groupId", &raw.id, raw.group_id)?,
        user_id: optional_id(raw.user_id),
        name: raw.name.unwrap_or_default(),
        status,
        description: text(raw.description),
        placeholder_image_url: text(raw.placeholder_image_url),
        image_url: text(raw.image_url),
        object_category: text(raw.object_category),
        member_category: text(raw.category),
        object_type,
        disabled_metric_ids: id_list(raw.disabled_metric_ids),
        enabled_metric_ids: id_list(raw.enabled_metric_ids),
        rating_mode: decode_rating_mode("member", &raw.id, raw.rating_mode)?,
        claimed_by_user_id: optional_id(raw.claimed_by_user_id),
        claimed_by_name: text(raw.claimed_by_name),
        claimed_by_image: text(raw.claimed_by_image),
        created_at: timestamp("member", &raw.id, raw.created_at, now)?,
        id,
    })
}

fn decode_rating(raw: RawRating, now: OffsetDateTime) -> Result<Rating, IntegrityError> {
    let id = required_id("rating", "id", &raw.id, Some(raw.id.clone()))?;
    let Some(value) = raw.value else {
        return Err(IntegrityError::Validation(format!(
            "rating {} is missing value",
            raw.id
        )));
    };

    Ok(Rating {
        group_id: required_id("rating", "groupId", &raw.id, raw.group_id)?,
        metric_id: required_id("rating", "metricId", &raw.id, raw.metric_id)?,
        rater_user_id: required_id("rating", "raterId", &raw.id, raw.rater_id)?,
        target_object_id: optional_id(raw.target_object_id),
        target_member_id: optional_id(raw.target_member_id),
        value,
        updated_at: timestamp("rating", &raw.id, raw.updated_at, now)?,
        id,
    })
}

fn decode_metric(raw: RawMetric) -> Result<Metric, IntegrityError> {
    let metric = Metric {
        id: required_id("metric", "id", &raw.id, Some(raw.id.clone()))?,
        group_id: required_id("metric", "groupId", &raw.id, raw.group_id)?,
        name: raw.name.unwrap_or_default(),
        min_value: raw.min_value.unwrap_or(0.0),
        max_value: raw.max_value.unwrap_or(10.0),
        prefix: text(raw.prefix),
        suffix: text(raw.suffix),
        applicable_categories: raw
            .applicable_categories
            .unwrap_or_default()
            .into_iter()
            .filter_map(|category| text(Some(category)))
            .collect(),
    };
    metric.validate()?;
    Ok(metric)
}

fn decode_claim(raw: RawClaim, now: OffsetDateTime) -> Result<ClaimRecord, IntegrityError> {
    let id = required_id("claim", "id", &raw.id, Some(raw.id.clone()))?;
    let status = match text(raw.status) {
        Some(value) => parse_enum("claim", &raw.id, "status", &value, ClaimRecordStatus::parse)?,
        None => ClaimRecordStatus::Pending,
    };
    let Some(token) = text(raw.token) else {
        return Err(IntegrityError::Validation(format!(
            "claim {} is missing token",
            raw.id
        )));
    };

    Ok(ClaimRecord {
        group_id: required_id("claim", "groupId", &raw.id, raw.group_id)?,
        object_id: required_id("claim", "objectId", &raw.id, raw.object_id)?,
        token,
        status,
        claimant_user_id: optional_id(raw.claimant_user_id),
        claimant_name: text(raw.claimant_name),
        claimant_image: text(raw.claimant_image),
        created_at: timestamp("claim", &raw.id, raw.created_at, now)?,
        id,
    })
}

fn decode_rating_mode(
    kind: &str,
    id: &str,
    raw: Option<String>,
) -> Result<Option<RatingMode>, IntegrityError> {
    text(raw)
        .map(|value| parse_enum(kind, id, "ratingMode", &value, RatingMode::parse))
        .transpose()
}

fn parse_enum<T>(
    kind: &str,
    id: &str,
    field: &str,
    value: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, IntegrityError> {
    parse(value).ok_or_else(|| {
        IntegrityError::Validation(format!("{kind} {id} has unknown {field} \"{value}\""))
    })
}

fn required_id(
    kind: &str,
    field: &str,
    id: &str,
    value: Option<String>,
) -> Result<RecordId, IntegrityError> {
    optional_id(value).ok_or_else(|| {
        IntegrityError::Validation(format!("{kind} {id:?} is missing {field}"))
    })
}

fn optional_id(value: Option<String>) -> Option<RecordId> {
    text(value).map(RecordId::from)
}

fn id_list(values: Option<Vec<String>>) -> Vec<RecordId> {
    values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| optional_id(Some(value)))
        .collect()
}

fn text(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}

fn timestamp(
    kind: &str,
    id: &str,
    value: Option<String>,
    now: OffsetDateTime,
) -> Result<OffsetDateTime, IntegrityError> {
    match text(value) {
        Some(raw) => parse_rfc3339_utc(&raw)
            .map_err(|err| IntegrityError::Validation(format!("{kind} {id}: {err}"))),
        None => Ok(now),
    }
}
