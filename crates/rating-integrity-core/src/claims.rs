//! Claim transitions on user-type objects.
//!
//! `unclaimed -> pending` on request, then `pending -> claimed` on approval
//! or `pending -> unclaimed` on rejection.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::gateway::{EntityStore, RecordFilter};
use crate::model::{ClaimRecord, ClaimRecordStatus, ClaimState, ClaimStatus, ObjectType};
use crate::{now_utc, IntegrityError, RatableObject, RecordId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimDecision {
    Approve,
    Reject,
}

/// Opens a claim on an unclaimed user-type object and marks it pending.
///
/// # Errors
/// Returns [`IntegrityError::Validation`] when the claimant is missing, the
/// object does not exist, is not a user object, or is already pending or
/// claimed. Returns [`IntegrityError::Store`] when a read or write fails.
pub fn request_claim<S: EntityStore + ?Sized>(
    store: &mut S,
    object_id: &RecordId,
    claimant_user_id: &RecordId,
    claimant_name: Option<&str>,
    claimant_image: Option<&str>,
) -> Result<ClaimRecord, IntegrityError> {
    if claimant_user_id.is_blank() {
        return Err(IntegrityError::Validation(
            "claimant_user_id MUST be provided".to_string(),
        ));
    }

    let mut object = load_object(store, object_id)?;
    if object.object_type != ObjectType::User {
        return Err(IntegrityError::Validation(format!(
            "object {object_id} is a {} object and cannot be claimed",
            object.object_type.as_str()
        )));
    }

    let current = object.claim.clone().unwrap_or_else(ClaimState::unclaimed);
    if current.status != ClaimStatus::Unclaimed {
        return Err(IntegrityError::Validation(format!(
            "object {object_id} is already {}",
            current.status.as_str()
        )));
    }

    let claim = ClaimRecord {
        id: RecordId::generate(),
        group_id: object.group_id.clone(),
        object_id: object.id.clone(),
        token: Ulid::new().to_string(),
        status: ClaimRecordStatus::Pending,
        claimant_user_id: Some(claimant_user_id.clone()),
        claimant_name: claimant_name.map(str::to_string),
        claimant_image: claimant_image.map(str::to_string),
        created_at: now_utc(),
    };
    store.upsert_claim(&claim)?;

    object.claim = Some(ClaimState {
        status: ClaimStatus::Pending,
        claimed_by_user_id: claim.claimant_user_id.clone(),
        claimed_by_name: claim.claimant_name.clone(),
        claimed_by_image: claim.claimant_image.clone(),
    });
    store.upsert_object(&object)?;

    tracing::info!(object = %object.id, claim = %claim.id, "claim requested");
    Ok(claim)
}

/// Approves or rejects a pending claim identified by its token.
///
/// # Errors
/// Returns [`IntegrityError::Validation`] when the token is unknown or the
/// claim is no longer pending, and [`IntegrityError::Store`] when a read or
/// write fails.
pub fn resolve_claim<S: EntityStore + ?Sized>(
    store: &mut S,
    token: &str,
    decision: ClaimDecision,
) -> Result<RatableObject, IntegrityError> {
    let Some(mut claim) = store
        .fetch_claims(&RecordFilter::all())?
        .into_iter()
        .find(|claim| claim.token == token)
    else {
        return Err(IntegrityError::Validation(format!(
            "claim token {token} not found"
        )));
    };

    if claim.status != ClaimRecordStatus::Pending {
        return Err(IntegrityError::Validation(format!(
            "claim {} is already {}",
            claim.id,
            claim.status.as_str()
        )));
    }

    let mut object = load_object(store, &claim.object_id)?;
    match decision {
        ClaimDecision::Approve => {
            claim.status = ClaimRecordStatus::Approved;
            object.claim = Some(ClaimState {
                status: ClaimStatus::Claimed,
                claimed_by_user_id: claim.claimant_user_id.clone(),
                claimed_by_name: claim.claimant_name.clone(),
                claimed_by_image: claim.claimant_image.clone(),
            });
        }
        ClaimDecision::Reject => {
            claim.status = ClaimRecordStatus::Rejected;
            object.claim = Some(ClaimState::unclaimed());
        }
    }

    store.upsert_claim(&claim)?;
    store.upsert_object(&object)?;

    tracing::info!(object = %object.id, claim = %claim.id, status = claim.status.as_str(), "claim resolved");
    Ok(object)
}

fn load_object<S: EntityStore + ?Sized>(
    store: &S,
    object_id: &RecordId,
) -> Result<RatableObject, IntegrityError> {
    store
        .fetch_object(object_id)?
        .ok_or_else(|| IntegrityError::Validation(format!("object {object_id} not found")))
}
