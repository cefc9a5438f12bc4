use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::gateway::{EntityStore, RatingTargetPatch, RecordFilter};
use crate::model::{normalize_name, resolve_target, Member, RatableObject, Rating};
use crate::{IntegrityError, RecordId};

const REPAIR_CONTRACT_VERSION: &str = "repair.v1";

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RatingFix {
    pub rating_id: RecordId,
    pub old_target: RecordId,
    pub new_target: RecordId,
    pub matched_by_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct UnfixableRating {
    pub rating_id: RecordId,
    pub target: Option<RecordId>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct RepairPlan {
    pub fixes: Vec<RatingFix>,
    pub unfixable: Vec<UnfixableRating>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RepairReport {
    pub contract_version: String,
    pub dry_run: bool,
    pub fixed_count: usize,
    pub unfixable_count: usize,
    pub fixes: Vec<RatingFix>,
    pub unfixable: Vec<UnfixableRating>,
}

type NameKey = (RecordId, String);

/// Plans target rewrites for ratings whose target is not a live object.
///
/// A rating is fixable when its target is a placeholder whose normalized
/// name matches an object in the same group. Matching is exact after
/// lowercase/trim. When several objects in a group share a normalized name
/// the last one indexed wins.
#[must_use]
pub fn plan_repairs(
    objects: &[RatableObject],
    placeholders: &[Member],
    ratings: &[Rating],
) -> RepairPlan {
    let mut object_names: HashMap<RecordId, NameKey> = HashMap::new();
    let mut objects_by_name: HashMap<NameKey, RecordId> = HashMap::new();
    for object in objects {
        let key = (object.group_id.clone(), normalize_name(&object.name));
        object_names.insert(object.id.clone(), key.clone());
        objects_by_name.insert(key, object.id.clone());
    }

    let placeholder_names: HashMap<&RecordId, (&RecordId, &str)> = placeholders
        .iter()
        .filter(|member| member.is_placeholder())
        .map(|member| (&member.id, (&member.group_id, member.name.as_str())))
        .collect();

    let mut plan = RepairPlan::default();
    for rating in ratings {
        let target = resolve_target(rating);
        if target.is_some_and(|id| object_names.contains_key(id)) {
            continue;
        }

        let Some(target) = target else {
            plan.unfixable.push(UnfixableRating {
                rating_id: rating.id.clone(),
                target: None,
                reason: "rating has no target identity".to_string(),
            });
            continue;
        };

        let Some((group_id, name)) = placeholder_names.get(target) else {
            plan.unfixable.push(UnfixableRating {
                rating_id: rating.id.clone(),
                target: Some(target.clone()),
                reason: format!("target {target} not found in objects or placeholders"),
            });
            continue;
        };

        let normalized = normalize_name(name);
        match objects_by_name.get(&((*group_id).clone(), normalized.clone())) {
            Some(object_id) => plan.fixes.push(RatingFix {
                rating_id: rating.id.clone(),
                old_target: target.clone(),
                new_target: object_id.clone(),
                matched_by_name: normalized,
            }),
            None => plan.unfixable.push(UnfixableRating {
                rating_id: rating.id.clone(),
                target: Some(target.clone()),
                reason: format!(
                    "placeholder {target} named \"{name}\" has no object with a matching name in group {group_id}"
                ),
            }),
        }
    }

    plan
}

/// Relinks ratings from unresolved placeholder identities to same-named
/// objects. Only `target_object_id` is rewritten; the legacy alias is left
/// as it was.
///
/// With `dry_run` the plan is reported and nothing is written.
///
/// # Errors
/// Returns [`IntegrityError::Store`] when a fetch fails and
/// [`IntegrityError::RepairFailed`] on the first failed write, carrying the
/// fixes already applied.
pub fn repair_ratings<S: EntityStore + ?Sized>(
    store: &mut S,
    sample_limit: usize,
    dry_run: bool,
) -> Result<RepairReport, IntegrityError> {
    let filter = RecordFilter::all();
    let objects = store.fetch_objects(&filter)?;
    let placeholders: Vec<Member> = store
        .fetch_members(&filter)?
        .into_iter()
        .filter(Member::is_placeholder)
        .collect();
    let ratings = store.fetch_ratings(&filter)?;

    let plan = plan_repairs(&objects, &placeholders, &ratings);
    for entry in &plan.unfixable {
        tracing::warn!(rating = %entry.rating_id, reason = %entry.reason, "rating is unfixable");
    }

    let mut report = RepairReport {
        contract_version: REPAIR_CONTRACT_VERSION.to_string(),
        dry_run,
        fixed_count: 0,
        unfixable_count: plan.unfixable.len(),
        fixes: Vec::new(),
        unfixable: plan.unfixable.into_iter().take(sample_limit).collect(),
    };

    if dry_run {
        report.fixed_count = plan.fixes.len();
        report.fixes = plan.fixes.into_iter().take(sample_limit).collect();
        return Ok(report);
    }

    for fix in plan.fixes {
        let patch = RatingTargetPatch::object_only(fix.new_target.clone());
        if let Err(err) = store.patch_rating_target(&fix.rating_id, &patch) {
            tracing::warn!(rating = %fix.rating_id, error = %err, "rating repair write failed");
            return Err(IntegrityError::RepairFailed {
                message: format!("failed to repair rating {}: {err}", fix.rating_id),
                partial: Box::new(report),
            });
        }

        tracing::debug!(
            rating = %fix.rating_id,
            old_target = %fix.old_target,
            new_target = %fix.new_target,
            "rating relinked by name"
        );
        report.fixed_count += 1;
        if report.fixes.len() < sample_limit {
            report.fixes.push(fix);
        }
    }

    tracing::info!(
        fixed = report.fixed_count,
        unfixable = report.unfixable_count,
        "rating repair complete"
    );

    Ok(report)
}
