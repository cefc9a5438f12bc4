use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::gateway::{EntityStore, RatingTargetPatch, RecordFilter};
use crate::model::{resolve_target, ClaimState, ClaimStatus, Member, ObjectType, RatableObject};
use crate::{now_utc, IntegrityError, RecordId};

const MIGRATION_CONTRACT_VERSION: &str = "migration.v1";
const MIGRATION_PREVIEW_CONTRACT_VERSION: &str = "migration_preview.v1";

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MigratedPlaceholder {
    pub name: String,
    pub group_id: RecordId,
    pub old_id: RecordId,
    pub new_id: RecordId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MigrationReport {
    pub contract_version: String,
    pub migrated_count: usize,
    pub ratings_updated: usize,
    pub migrated: Vec<MigratedPlaceholder>,
    /// Old placeholder identity to new object identity.
    pub id_mapping: BTreeMap<RecordId, RecordId>,
}

impl MigrationReport {
    fn empty() -> Self {
        Self {
            contract_version: MIGRATION_CONTRACT_VERSION.to_string(),
            migrated_count: 0,
            ratings_updated: 0,
            migrated: Vec::new(),
            id_mapping: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MigrationPreviewGroup {
    pub group_id: RecordId,
    pub count: usize,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MigrationPreview {
    pub contract_version: String,
    pub total_placeholders: usize,
    pub groups: Vec<MigrationPreviewGroup>,
}

/// Builds the object that replaces a placeholder member.
///
/// Fallbacks: image is placeholder image, then generic image, then none;
/// category is the legacy object category, then the member category, then
/// none. Claim status is `claimed` when a claiming identity is attached.
#[must_use]
pub fn object_from_placeholder(
    member: &Member,
    new_id: RecordId,
    created_at: OffsetDateTime,
) -> RatableObject {
    let object_type = member.object_type.unwrap_or(ObjectType::User);
    let claiming_identity = member.claiming_identity().cloned();

    let claim = if object_type == ObjectType::User || claiming_identity.is_some() {
        Some(ClaimState {
            status: if claiming_identity.is_some() {
                ClaimStatus::Claimed
            } else {
                ClaimStatus::Unclaimed
            },
            claimed_by_name: claiming_identity
                .as_ref()
                .and(non_blank(member.claimed_by_name.as_ref())),
            claimed_by_image: claiming_identity
                .as_ref()
                .and(non_blank(member.claimed_by_image.as_ref())),
            claimed_by_user_id: claiming_identity,
        })
    } else {
        None
    };

    RatableObject {
        id: new_id,
        group_id: member.group_id.clone(),
        name: member.name.clone(),
        description: non_blank(member.description.as_ref()),
        image_url: non_blank(member.placeholder_image_url.as_ref())
            .or_else(|| non_blank(member.image_url.as_ref())),
        object_type,
        category: non_blank(member.object_category.as_ref())
            .or_else(|| non_blank(member.member_category.as_ref())),
        disabled_metric_ids: member.disabled_metric_ids.clone(),
        enabled_metric_ids: member.enabled_metric_ids.clone(),
        rating_mode: member.rating_mode.unwrap_or_default(),
        claim,
        created_at,
    }
}

/// Read-only view of what [`migrate_placeholders`] would convert, grouped
/// by group identity.
///
/// # Errors
/// Returns [`IntegrityError::Store`] when the member fetch fails.
pub fn preview_migration<S: EntityStore + ?Sized>(
    store: &S,
) -> Result<MigrationPreview, IntegrityError> {
    let mut groups: BTreeMap<RecordId, Vec<String>> = BTreeMap::new();
    let mut total_placeholders = 0;

    for member in store
        .fetch_members(&RecordFilter::all())?
        .into_iter()
        .filter(Member::is_placeholder)
    {
        total_placeholders += 1;
        groups.entry(member.group_id).or_default().push(member.name);
    }

    Ok(MigrationPreview {
        contract_version: MIGRATION_PREVIEW_CONTRACT_VERSION.to_string(),
        total_placeholders,
        groups: groups
            .into_iter()
            .map(|(group_id, names)| MigrationPreviewGroup {
                group_id,
                count: names.len(),
                names,
            })
            .collect(),
    })
}

/// Converts every placeholder member into a new object with a fresh
/// identity, then rewrites both target fields of every rating that
/// resolves to a migrated placeholder.
///
/// Not idempotent: each call creates new objects for the placeholder set it
/// sees. Callers run it at most once per placeholder cohort and serialize
/// invocations.
///
/// # Errors
/// Returns [`IntegrityError::Store`] when a fetch fails and
/// [`IntegrityError::MigrationFailed`] on the first failed write, carrying
/// the objects and rating rewrites already persisted.
pub fn migrate_placeholders<S: EntityStore + ?Sized>(
    store: &mut S,
) -> Result<MigrationReport, IntegrityError> {
    migrate_placeholders_with(store, RecordId::generate)
}

/// [`migrate_placeholders`] with a caller-supplied identity source.
///
/// # Errors
/// Same as [`migrate_placeholders`].
pub fn migrate_placeholders_with<S, F>(
    store: &mut S,
    mut mint_id: F,
) -> Result<MigrationReport, IntegrityError>
where
    S: EntityStore + ?Sized,
    F: FnMut() -> RecordId,
{
    let placeholders: Vec<Member> = store
        .fetch_members(&RecordFilter::all())?
        .into_iter()
        .filter(Member::is_placeholder)
        .collect();

    tracing::info!(placeholders = placeholders.len(), "starting placeholder migration");

    let mut report = MigrationReport::empty();
    let created_at = now_utc();

    for member in &placeholders {
        let object = object_from_placeholder(member, mint_id(), created_at);
        if let Err(err) = store.upsert_object(&object) {
            tracing::warn!(placeholder = %member.id, error = %err, "object write failed");
            return Err(IntegrityError::MigrationFailed {
                message: format!("failed to create object for placeholder {}: {err}", member.id),
                partial: Box::new(report),
            });
        }

        tracing::debug!(old_id = %member.id, new_id = %object.id, "placeholder migrated");
        report
            .id_mapping
            .insert(member.id.clone(), object.id.clone());
        report.migrated.push(MigratedPlaceholder {
            name: member.name.clone(),
            group_id: member.group_id.clone(),
            old_id: member.id.clone(),
            new_id: object.id,
        });
        report.migrated_count += 1;
    }

    for rating in store.fetch_ratings(&RecordFilter::all())? {
        let Some(new_id) = resolve_target(&rating).and_then(|target| report.id_mapping.get(target))
        else {
            continue;
        };

        let patch = RatingTargetPatch::both(new_id.clone());
        if let Err(err) = store.patch_rating_target(&rating.id, &patch) {
            tracing::warn!(rating = %rating.id, error = %err, "rating rewrite failed");
            return Err(IntegrityError::MigrationFailed {
                message: format!("failed to rewrite rating {}: {err}", rating.id),
                partial: Box::new(report),
            });
        }
        report.ratings_updated += 1;
    }

    tracing::info!(
        migrated = report.migrated_count,
        ratings_updated = report.ratings_updated,
        "placeholder migration complete"
    );

    Ok(report)
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|item| !item.trim().is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify_ratings, RatingPartition};
    use crate::model::{MemberStatus, RatingMode};
    use crate::test_support::{
        fixture_active_member, fixture_object, fixture_placeholder, fixture_rating, fixture_time,
        must, MemoryStore,
    };
    use std::collections::HashSet;

    fn sequential_ids() -> impl FnMut() -> RecordId {
        let mut next = 0;
        move || {
            next += 1;
            RecordId::new(format!("new-{next}"))
        }
    }

    fn fixture_store() -> MemoryStore {
        MemoryStore {
            members: vec![
                fixture_placeholder("p1", "g1", "LeBron"),
                fixture_placeholder("p2", "g2", "Curry"),
                fixture_active_member("mem-1", "g1", "user-1"),
            ],
            ratings: vec![
                fixture_rating("r1", "p1", "m1", "u1", 7.0),
                fixture_rating("r2", "p2", "m1", "u2", 8.0),
                fixture_rating("r3", "ghost-1", "m1", "u3", 3.0),
            ],
            ..MemoryStore::default()
        }
    }

    #[test]
    fn image_and_category_follow_fallback_order() {
        let mut member = fixture_placeholder("p1", "g1", "LeBron");
        member.image_url = Some("generic.png".to_string());
        member.member_category = Some("athlete".to_string());
        let object = object_from_placeholder(&member, RecordId::new("o1"), fixture_time());
        assert_eq!(object.image_url.as_deref(), Some("generic.png"));
        assert_eq!(object.category.as_deref(), Some("athlete"));

        member.placeholder_image_url = Some("placeholder.png".to_string());
        member.object_category = Some("player".to_string());
        let object = object_from_placeholder(&member, RecordId::new("o1"), fixture_time());
        assert_eq!(object.image_url.as_deref(), Some("placeholder.png"));
        assert_eq!(object.category.as_deref(), Some("player"));

        let bare = fixture_placeholder("p2", "g1", "Curry");
        let object = object_from_placeholder(&bare, RecordId::new("o2"), fixture_time());
        assert_eq!(object.image_url, None);
        assert_eq!(object.category, None);
    }

    #[test]
    fn claim_status_follows_claiming_identity() {
        let mut member = fixture_placeholder("p1", "g1", "LeBron");
        let object = object_from_placeholder(&member, RecordId::new("o1"), fixture_time());
        assert_eq!(object.claim, Some(ClaimState::unclaimed()));

        member.claimed_by_user_id = Some(RecordId::new("user-7"));
        member.claimed_by_name = Some("LeBron J".to_string());
        let object = object_from_placeholder(&member, RecordId::new("o1"), fixture_time());
        let claim = crate::test_support::must_some(object.claim);
        assert_eq!(claim.status, ClaimStatus::Claimed);
        assert_eq!(claim.claimed_by_user_id, Some(RecordId::new("user-7")));
        assert_eq!(claim.claimed_by_name.as_deref(), Some("LeBron J"));
    }

    #[test]
    fn descriptive_fields_are_copied() {
        let mut member = fixture_placeholder("p1", "g1", "LeBron");
        member.description = Some("forward".to_string());
        member.rating_mode = Some(RatingMode::CaptainOnly);
        member.object_type = Some(ObjectType::Text);
        member.disabled_metric_ids = vec![RecordId::new("m2")];
        let object = object_from_placeholder(&member, RecordId::new("o1"), fixture_time());
        assert_eq!(object.group_id, RecordId::new("g1"));
        assert_eq!(object.name, "LeBron");
        assert_eq!(object.description.as_deref(), Some("forward"));
        assert_eq!(object.rating_mode, RatingMode::CaptainOnly);
        assert_eq!(object.object_type, ObjectType::Text);
        assert_eq!(object.claim, None);
        assert_eq!(object.disabled_metric_ids, vec![RecordId::new("m2")]);
    }

    #[test]
    fn migration_creates_one_object_per_placeholder_and_rewrites_ratings() {
        let mut store = fixture_store();
        let report = must(migrate_placeholders_with(&mut store, sequential_ids()));

        assert_eq!(report.migrated_count, 2);
        assert_eq!(report.id_mapping.len(), 2);
        assert_eq!(report.ratings_updated, 2);
        assert_eq!(store.objects.len(), 2);
        assert_eq!(
            report.id_mapping.get(&RecordId::new("p1")),
            Some(&RecordId::new("new-1"))
        );

        let rewritten = store.rating("r1");
        assert_eq!(rewritten.target_object_id, Some(RecordId::new("new-1")));
        assert_eq!(rewritten.target_member_id, Some(RecordId::new("new-1")));

        let untouched = store.rating("r3");
        assert_eq!(untouched.target_object_id, Some(RecordId::new("ghost-1")));
    }

    #[test]
    fn migrated_ratings_classify_as_valid() {
        let mut store = fixture_store();
        let _ = must(migrate_placeholders_with(&mut store, sequential_ids()));

        let object_ids: HashSet<RecordId> =
            store.objects.iter().map(|object| object.id.clone()).collect();
        let placeholder_ids: HashSet<RecordId> = store
            .members
            .iter()
            .filter(|member| member.status == MemberStatus::Placeholder)
            .map(|member| member.id.clone())
            .collect();
        let RatingPartition {
            valid,
            placeholder_bound,
            orphaned,
        } = classify_ratings(&object_ids, &placeholder_ids, &store.ratings);
        assert_eq!(valid.len(), 2);
        assert!(placeholder_bound.is_empty());
        assert_eq!(orphaned.len(), 1);
    }

    #[test]
    fn rerunning_migration_duplicates_objects() {
        let mut store = fixture_store();
        let _ = must(migrate_placeholders(&mut store));
        let _ = must(migrate_placeholders(&mut store));
        assert_eq!(store.objects.len(), 4);
    }

    #[test]
    fn failed_object_write_aborts_with_partial_report() {
        let mut store = fixture_store();
        store.fail_on_write = Some(1);

        let err = match migrate_placeholders_with(&mut store, sequential_ids()) {
            Ok(_) => panic!("expected migration failure"),
            Err(err) => err,
        };
        let IntegrityError::MigrationFailed { message, partial } = err else {
            panic!("expected MigrationFailed");
        };
        assert!(message.contains("p2"));
        assert_eq!(partial.migrated_count, 1);
        assert_eq!(partial.ratings_updated, 0);
        assert_eq!(store.objects.len(), 1);
        assert_eq!(store.rating("r1").target_object_id, Some(RecordId::new("p1")));
    }

    #[test]
    fn failed_rating_write_keeps_prior_rewrites() {
        let mut store = fixture_store();
        store.fail_on_write = Some(3);

        let Err(IntegrityError::MigrationFailed { partial, .. }) =
            migrate_placeholders_with(&mut store, sequential_ids())
        else {
            panic!("expected MigrationFailed");
        };
        assert_eq!(partial.migrated_count, 2);
        assert_eq!(partial.ratings_updated, 1);
        assert_eq!(store.rating("r1").target_object_id, Some(RecordId::new("new-1")));
        assert_eq!(store.rating("r2").target_object_id, Some(RecordId::new("p2")));
    }

    #[test]
    fn preview_groups_placeholders_without_writing() {
        let mut store = fixture_store();
        store.members.push(fixture_placeholder("p3", "g1", "Bronny"));
        store.objects.push(fixture_object("o1", "g1", "Existing"));

        let preview = must(preview_migration(&store));
        assert_eq!(preview.total_placeholders, 3);
        assert_eq!(preview.groups.len(), 2);
        assert_eq!(preview.groups[0].group_id, RecordId::new("g1"));
        assert_eq!(preview.groups[0].count, 2);
        assert_eq!(preview.groups[0].names, vec!["LeBron", "Bronny"]);
        assert_eq!(store.writes, 0);
    }
}
