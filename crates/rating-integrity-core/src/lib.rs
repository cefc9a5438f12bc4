//! Rating aggregation and referential-integrity repair for group ratings.
//!
//! Ratings historically pointed at legacy "placeholder" member records. The
//! current identity space is the object record set. This crate:
//! - classifies ratings by where their target resolves ([`classify_ratings`]),
//! - converts placeholder members into objects ([`migrate_placeholders`]),
//! - rewrites leftover references by normalized name ([`repair_ratings`]),
//! - aggregates per-object, per-metric scores ([`aggregate_scores`]).
//!
//! Storage is reached only through the [`EntityStore`] gateway.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use ulid::Ulid;

mod aggregate;
mod claims;
mod classify;
mod gateway;
mod migrate;
mod model;
mod records;
mod repair;

#[cfg(test)]
mod test_support;

pub use aggregate::{
    aggregate_group, aggregate_scores, AggregatedScore, AggregationInput, ScoreBoard,
};
pub use claims::{request_claim, resolve_claim, ClaimDecision};
pub use classify::{
    classify_rating, classify_ratings, diagnose, DiagnosticReport, DiagnosticSummary,
    RatingClass, RatingPartition, RatingSample, RecordSample,
};
pub use gateway::{EntityStore, RatingTargetPatch, RecordFilter};
pub use migrate::{
    migrate_placeholders, migrate_placeholders_with, object_from_placeholder, preview_migration,
    MigratedPlaceholder, MigrationPreview, MigrationPreviewGroup, MigrationReport,
};
pub use model::{
    applicable_metrics, metric_applies_to_object, normalize_name, resolve_target, ClaimRecord,
    ClaimRecordStatus, ClaimState, ClaimStatus, Group, Member, MemberStatus, Metric, ObjectType,
    RatableObject, Rating, RatingMode,
};
pub use records::{
    RawClaim, RawGroup, RawMember, RawMetric, RawObject, RawRating, RecordSnapshot,
    TypedSnapshot,
};
pub use repair::{
    plan_repairs, repair_ratings, RatingFix, RepairPlan, RepairReport, UnfixableRating,
};

/// Default number of sample rows carried by diagnostic and repair reports.
pub const DEFAULT_SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum IntegrityError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("migration failed: {message}")]
    MigrationFailed {
        message: String,
        partial: Box<MigrationReport>,
    },
    #[error("repair failed: {message}")]
    RepairFailed {
        message: String,
        partial: Box<RepairReport>,
    },
}

/// A failed request against the entity store.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
#[error("store {operation} failed: {message}")]
pub struct StoreError {
    pub operation: String,
    pub message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Opaque document identity shared by every record set.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mints a fresh identity. Never derived from a prior identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`IntegrityError::Validation`] when parsing fails or an input
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, IntegrityError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| IntegrityError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(IntegrityError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`IntegrityError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, IntegrityError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            IntegrityError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}
