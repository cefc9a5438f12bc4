use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::gateway::{EntityStore, RecordFilter};
use crate::model::{resolve_target, Member, RatableObject, Rating};
use crate::{IntegrityError, RecordId};

const DIAGNOSE_CONTRACT_VERSION: &str = "diagnose.v1";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RatingClass {
    Valid,
    PlaceholderBound,
    Orphaned,
}

/// Classifies one rating against the object and placeholder identity sets.
#[must_use]
pub fn classify_rating(
    rating: &Rating,
    object_ids: &HashSet<RecordId>,
    placeholder_ids: &HashSet<RecordId>,
) -> RatingClass {
    match resolve_target(rating) {
        Some(target) if object_ids.contains(target) => RatingClass::Valid,
        Some(target) if placeholder_ids.contains(target) => RatingClass::PlaceholderBound,
        _ => RatingClass::Orphaned,
    }
}

/// Disjoint, exhaustive split of a rating set. Input order is preserved
/// within each partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingPartition<'a> {
    pub valid: Vec<&'a Rating>,
    pub placeholder_bound: Vec<&'a Rating>,
    pub orphaned: Vec<&'a Rating>,
}

impl RatingPartition<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.valid.len() + self.placeholder_bound.len() + self.orphaned.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[must_use]
pub fn classify_ratings<'a>(
    object_ids: &HashSet<RecordId>,
    placeholder_ids: &HashSet<RecordId>,
    ratings: &'a [Rating],
) -> RatingPartition<'a> {
    let mut partition = RatingPartition::default();
    for rating in ratings {
        match classify_rating(rating, object_ids, placeholder_ids) {
            RatingClass::Valid => partition.valid.push(rating),
            RatingClass::PlaceholderBound => partition.placeholder_bound.push(rating),
            RatingClass::Orphaned => partition.orphaned.push(rating),
        }
    }
    partition
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DiagnosticSummary {
    pub total_objects: usize,
    pub total_placeholders: usize,
    pub total_ratings: usize,
    pub valid_ratings: usize,
    pub orphaned_ratings: usize,
    pub ratings_pointing_to_placeholders: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RecordSample {
    pub id: RecordId,
    pub group_id: RecordId,
    pub name: String,
}

impl From<&RatableObject> for RecordSample {
    fn from(object: &RatableObject) -> Self {
        Self {
            id: object.id.clone(),
            group_id: object.group_id.clone(),
            name: object.name.clone(),
        }
    }
}

impl From<&Member> for RecordSample {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id.clone(),
            group_id: member.group_id.clone(),
            name: member.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RatingSample {
    pub rating_id: RecordId,
    pub group_id: RecordId,
    pub metric_id: RecordId,
    pub target_object_id: Option<RecordId>,
    pub target_member_id: Option<RecordId>,
}

impl From<&Rating> for RatingSample {
    fn from(rating: &Rating) -> Self {
        Self {
            rating_id: rating.id.clone(),
            group_id: rating.group_id.clone(),
            metric_id: rating.metric_id.clone(),
            target_object_id: rating.target_object_id.clone(),
            target_member_id: rating.target_member_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DiagnosticReport {
    pub contract_version: String,
    pub group_id: Option<RecordId>,
    pub summary: DiagnosticSummary,
    pub objects: Vec<RecordSample>,
    pub placeholders: Vec<RecordSample>,
    pub orphaned_ratings: Vec<RatingSample>,
    pub placeholder_bound_ratings: Vec<RatingSample>,
    pub next_step: String,
}

/// Read-only integrity report over the current snapshot.
///
/// # Errors
/// Returns [`IntegrityError::Store`] when a fetch fails.
pub fn diagnose<S: EntityStore + ?Sized>(
    store: &S,
    group_id: Option<&RecordId>,
    sample_limit: usize,
) -> Result<DiagnosticReport, IntegrityError> {
    let filter = RecordFilter {
        group_id: group_id.cloned(),
    };
    let objects = store.fetch_objects(&filter)?;
    let placeholders: Vec<Member> = store
        .fetch_members(&filter)?
        .into_iter()
        .filter(Member::is_placeholder)
        .collect();
    let ratings = store.fetch_ratings(&filter)?;

    let object_ids: HashSet<RecordId> = objects.iter().map(|object| object.id.clone()).collect();
    let placeholder_ids: HashSet<RecordId> =
        placeholders.iter().map(|member| member.id.clone()).collect();
    let partition = classify_ratings(&object_ids, &placeholder_ids, &ratings);

    let summary = DiagnosticSummary {
        total_objects: objects.len(),
        total_placeholders: placeholders.len(),
        total_ratings: ratings.len(),
        valid_ratings: partition.valid.len(),
        orphaned_ratings: partition.orphaned.len(),
        ratings_pointing_to_placeholders: partition.placeholder_bound.len(),
    };

    tracing::info!(
        total_ratings = summary.total_ratings,
        valid = summary.valid_ratings,
        orphaned = summary.orphaned_ratings,
        placeholder_bound = summary.ratings_pointing_to_placeholders,
        "diagnosed rating references"
    );

    Ok(DiagnosticReport {
        contract_version: DIAGNOSE_CONTRACT_VERSION.to_string(),
        group_id: group_id.cloned(),
        next_step: next_step_message(&summary),
        objects: objects.iter().take(sample_limit).map(Into::into).collect(),
        placeholders: placeholders
            .iter()
            .take(sample_limit)
            .map(Into::into)
            .collect(),
        orphaned_ratings: partition
            .orphaned
            .iter()
            .take(sample_limit)
            .map(|rating| RatingSample::from(*rating))
            .collect(),
        placeholder_bound_ratings: partition
            .placeholder_bound
            .iter()
            .take(sample_limit)
            .map(|rating| RatingSample::from(*rating))
            .collect(),
        summary,
    })
}

fn next_step_message(summary: &DiagnosticSummary) -> String {
    if summary.ratings_pointing_to_placeholders > 0 && summary.total_objects == 0 {
        return format!(
            "{} ratings point at placeholder members and no objects exist yet: preview and run migrate",
            summary.ratings_pointing_to_placeholders
        );
    }
    if summary.ratings_pointing_to_placeholders > 0 {
        return format!(
            "{} ratings point at placeholder members: run repair to relink them to same-named objects, or migrate if the placeholders were never converted",
            summary.ratings_pointing_to_placeholders
        );
    }
    if summary.orphaned_ratings > 0 {
        return format!(
            "{} ratings reference unknown targets: run repair with dry-run to list them",
            summary.orphaned_ratings
        );
    }
    if summary.total_placeholders > 0 {
        return format!(
            "{} placeholder members remain but no ratings reference them: migrate converts them to objects",
            summary.total_placeholders
        );
    }
    "all ratings resolve to objects; no action needed".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        fixture_active_member, fixture_object, fixture_placeholder, fixture_rating, must,
        MemoryStore,
    };
    use proptest::prelude::*;

    fn id_set(ids: &[&str]) -> HashSet<RecordId> {
        ids.iter().map(|id| RecordId::new(*id)).collect()
    }

    #[test]
    fn object_resolution_takes_precedence_over_placeholder() {
        let rating = fixture_rating("r1", "shared", "m1", "u1", 5.0);
        let class = classify_rating(&rating, &id_set(&["shared"]), &id_set(&["shared"]));
        assert_eq!(class, RatingClass::Valid);
    }

    #[test]
    fn missing_target_is_orphaned() {
        let mut rating = fixture_rating("r1", "", "m1", "u1", 5.0);
        rating.target_member_id = None;
        let class = classify_rating(&rating, &id_set(&["o1"]), &id_set(&["p1"]));
        assert_eq!(class, RatingClass::Orphaned);
    }

    #[test]
    fn legacy_alias_resolves_against_placeholders() {
        let mut rating = fixture_rating("r1", "p1", "m1", "u1", 5.0);
        rating.target_object_id = None;
        let class = classify_rating(&rating, &id_set(&["o1"]), &id_set(&["p1"]));
        assert_eq!(class, RatingClass::PlaceholderBound);
    }

    fn scenario_store() -> MemoryStore {
        MemoryStore {
            objects: vec![fixture_object("o1", "g1", "LeBron")],
            members: vec![
                fixture_placeholder("p1", "g1", "LeBron"),
                fixture_active_member("mem-1", "g1", "user-1"),
            ],
            ratings: vec![
                fixture_rating("r1", "o1", "m1", "u1", 7.0),
                fixture_rating("r2", "p1", "m1", "u2", 8.0),
                fixture_rating("r3", "ghost-1", "m1", "u3", 3.0),
            ],
            ..MemoryStore::default()
        }
    }

    #[test]
    fn diagnose_reports_each_category() {
        let store = scenario_store();
        let report = must(diagnose(&store, None, 10));

        assert_eq!(report.contract_version, "diagnose.v1");
        assert_eq!(
            report.summary,
            DiagnosticSummary {
                total_objects: 1,
                total_placeholders: 1,
                total_ratings: 3,
                valid_ratings: 1,
                orphaned_ratings: 1,
                ratings_pointing_to_placeholders: 1,
            }
        );
        assert_eq!(report.placeholder_bound_ratings[0].rating_id, RecordId::new("r2"));
        assert_eq!(report.orphaned_ratings[0].rating_id, RecordId::new("r3"));
        assert_eq!(report.placeholders.len(), 1);
        assert!(report.next_step.contains("repair"));
    }

    #[test]
    fn diagnose_is_repeatable_without_writes() {
        let store = scenario_store();
        let first = must(diagnose(&store, None, 10));
        let second = must(diagnose(&store, None, 10));
        assert_eq!(first, second);
    }

    #[test]
    fn diagnose_samples_are_bounded() {
        let mut store = scenario_store();
        for index in 0..25 {
            store.ratings.push(fixture_rating(
                &format!("ghost-rating-{index}"),
                &format!("ghost-{index}"),
                "m1",
                "u1",
                1.0,
            ));
        }
        let report = must(diagnose(&store, None, 5));
        assert_eq!(report.summary.orphaned_ratings, 26);
        assert_eq!(report.orphaned_ratings.len(), 5);
    }

    #[test]
    fn diagnose_respects_group_scope() {
        let mut store = scenario_store();
        let mut other = fixture_rating("r9", "o9", "m1", "u1", 1.0);
        other.group_id = RecordId::new("g2");
        store.ratings.push(other);

        let report = must(diagnose(&store, Some(&RecordId::new("g2")), 10));
        assert_eq!(report.summary.total_ratings, 1);
        assert_eq!(report.summary.total_objects, 0);
        assert_eq!(report.summary.orphaned_ratings, 1);
    }

    #[test]
    fn clean_snapshot_needs_no_action() {
        let store = MemoryStore {
            objects: vec![fixture_object("o1", "g1", "LeBron")],
            ratings: vec![fixture_rating("r1", "o1", "m1", "u1", 7.0)],
            ..MemoryStore::default()
        };
        let report = must(diagnose(&store, None, 10));
        assert_eq!(report.next_step, "all ratings resolve to objects; no action needed");
    }

    proptest! {
        #[test]
        fn prop_partition_is_disjoint_and_exhaustive(targets in prop::collection::vec(0u8..9, 0..60)) {
            let object_ids = id_set(&["t0", "t1", "t2"]);
            let placeholder_ids = id_set(&["t2", "t3", "t4", "t5"]);
            let ratings: Vec<Rating> = targets
                .iter()
                .enumerate()
                .map(|(index, target)| {
                    let target = if *target == 8 { String::new() } else { format!("t{target}") };
                    fixture_rating(&format!("r{index}"), &target, "m1", "u1", 1.0)
                })
                .collect();

            let partition = classify_ratings(&object_ids, &placeholder_ids, &ratings);
            prop_assert_eq!(partition.len(), ratings.len());

            let mut seen = HashSet::new();
            for rating in partition
                .valid
                .iter()
                .chain(partition.placeholder_bound.iter())
                .chain(partition.orphaned.iter())
            {
                prop_assert!(seen.insert(rating.id.clone()));
            }
            for rating in &partition.placeholder_bound {
                let target = resolve_target(rating);
                prop_assert!(target.is_some_and(|id| !object_ids.contains(id)));
            }
        }
    }
}
