use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::gateway::{EntityStore, RecordFilter};
use crate::model::{resolve_target, Member, Metric, RatableObject, Rating, RatingMode};
use crate::{IntegrityError, RecordId};

/// Inputs for one aggregation pass. `members` and `metrics` are context for
/// callers and do not enter the arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct AggregationInput<'a> {
    pub members: &'a [Member],
    pub metrics: &'a [Metric],
    pub objects: &'a [RatableObject],
    pub ratings: &'a [Rating],
    pub captain_user_id: &'a RecordId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedScore {
    pub object_id: RecordId,
    pub metric_id: RecordId,
    pub average_value: f64,
    pub total_ratings: usize,
}

/// Mean and count per (object, metric) pair, ordered by object then metric.
///
/// Objects in captain-only mode count only ratings authored by the captain.
/// Pairs with no contributing rating are absent. Values are neither clamped
/// nor rounded.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate_scores(input: &AggregationInput<'_>) -> Vec<AggregatedScore> {
    let modes: HashMap<&RecordId, RatingMode> = input
        .objects
        .iter()
        .map(|object| (&object.id, object.rating_mode))
        .collect();

    let mut sums: BTreeMap<(&RecordId, &RecordId), (f64, usize)> = BTreeMap::new();
    for rating in input.ratings {
        let Some(object_id) = resolve_target(rating) else {
            continue;
        };

        let mode = modes.get(object_id).copied().unwrap_or_default();
        if mode == RatingMode::CaptainOnly && &rating.rater_user_id != input.captain_user_id {
            continue;
        }

        let entry = sums.entry((object_id, &rating.metric_id)).or_insert((0.0, 0));
        entry.0 += rating.value;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|((object_id, metric_id), (sum, count))| AggregatedScore {
            object_id: object_id.clone(),
            metric_id: metric_id.clone(),
            average_value: sum / count as f64,
            total_ratings: count,
        })
        .collect()
}

/// Fetches a group snapshot and aggregates it.
///
/// The captain identity is `captain_override` when given, else the stored
/// group's captain.
///
/// # Errors
/// Returns [`IntegrityError::Validation`] when no captain identity can be
/// determined and [`IntegrityError::Store`] when a fetch fails.
pub fn aggregate_group<S: EntityStore + ?Sized>(
    store: &S,
    group_id: &RecordId,
    captain_override: Option<&RecordId>,
) -> Result<Vec<AggregatedScore>, IntegrityError> {
    if group_id.is_blank() {
        return Err(IntegrityError::Validation(
            "group_id MUST be provided for aggregation".to_string(),
        ));
    }

    let captain_user_id = match captain_override.filter(|id| !id.is_blank()) {
        Some(id) => id.clone(),
        None => store
            .fetch_group(group_id)?
            .map(|group| group.captain_user_id)
            .filter(|id| !id.is_blank())
            .ok_or_else(|| {
                IntegrityError::Validation(format!(
                    "captain identity is required: group {group_id} has no stored captain"
                ))
            })?,
    };

    let filter = RecordFilter::group(group_id.clone());
    let members = store.fetch_members(&filter)?;
    let metrics = store.fetch_metrics(&filter)?;
    let objects = store.fetch_objects(&filter)?;
    let ratings = store.fetch_ratings(&filter)?;

    Ok(aggregate_scores(&AggregationInput {
        members: &members,
        metrics: &metrics,
        objects: &objects,
        ratings: &ratings,
        captain_user_id: &captain_user_id,
    }))
}

/// Lookup over aggregated scores where absent pairs read as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBoard {
    scores: BTreeMap<(RecordId, RecordId), AggregatedScore>,
}

impl ScoreBoard {
    #[must_use]
    pub fn new(scores: Vec<AggregatedScore>) -> Self {
        Self {
            scores: scores
                .into_iter()
                .map(|score| ((score.object_id.clone(), score.metric_id.clone()), score))
                .collect(),
        }
    }

    /// Returns `(average_value, total_ratings)`, or `(0.0, 0)` when absent.
    #[must_use]
    pub fn get(&self, object_id: &RecordId, metric_id: &RecordId) -> (f64, usize) {
        self.scores
            .get(&(object_id.clone(), metric_id.clone()))
            .map_or((0.0, 0), |score| (score.average_value, score.total_ratings))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}
