//! Claim queue. Submitting a claim never touches capacity; seats are only
//! consumed when staff approve a claim (see `ledger::approve_claim`), so a
//! team may have more pending claims than open seats.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::lifecycle::ensure_approved;
use super::models::*;
use super::require_id;
use crate::errors::WorkflowError;

/// Trim, reject blanks, and collapse duplicates of a team list.
pub(crate) fn normalize_teams(teams: Vec<TeamId>) -> Result<BTreeSet<TeamId>, WorkflowError> {
    let mut set = BTreeSet::new();
    for team in teams {
        let team = team.trim().to_string();
        require_id("team id", &team)?;
        set.insert(team);
    }
    if set.is_empty() {
        return Err(WorkflowError::validation("at least one team is required"));
    }
    Ok(set)
}

pub fn submit_claim(
    pitch: &mut Pitch,
    contributor_id: &str,
    requested_teams: Vec<TeamId>,
    message: &str,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "claim a team on")?;
    require_id("contributor id", contributor_id)?;
    let requested_teams = normalize_teams(requested_teams)?;

    if pitch.pending_claim(contributor_id).is_some() {
        return Err(WorkflowError::DuplicateClaim {
            contributor_id: contributor_id.to_string(),
        });
    }
    if pitch
        .assignment(contributor_id)
        .is_some_and(|held| !held.teams.is_disjoint(&requested_teams))
    {
        return Err(WorkflowError::DuplicateClaim {
            contributor_id: contributor_id.to_string(),
        });
    }

    pitch.pending_claims.push(PendingClaim {
        contributor_id: contributor_id.to_string(),
        requested_teams,
        message: message.trim().to_string(),
        submitted_at: now,
        claim_status: ClaimStatus::Pending,
    });
    Ok(())
}

/// Mark the contributor's pending claim declined. The entry is kept for
/// audit but drops out of [`pending_claims`].
pub fn decline_claim(pitch: &mut Pitch, contributor_id: &str) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "decline a claim on")?;
    let entry = pitch
        .pending_claims
        .iter_mut()
        .find(|c| c.contributor_id == contributor_id && c.claim_status == ClaimStatus::Pending)
        .ok_or_else(|| {
            WorkflowError::not_found(format!(
                "no pending claim from {} on pitch {}",
                contributor_id, pitch.id
            ))
        })?;
    entry.claim_status = ClaimStatus::Declined;
    Ok(())
}

/// Pending entries in submission order (oldest first).
pub fn pending_claims(pitch: &Pitch) -> Vec<&PendingClaim> {
    let mut pending: Vec<&PendingClaim> = pitch
        .pending_claims
        .iter()
        .filter(|c| c.claim_status == ClaimStatus::Pending)
        .collect();
    pending.sort_by_key(|c| c.submitted_at);
    pending
}
