//! Assignment ledger: who holds which seat on a pitch.
//!
//! Each operation checks every precondition before it writes anything, so a
//! rejected call leaves the pitch untouched.

use super::capacity::{decrement_seat, has_open_seat, increment_seat};
use super::claims::normalize_teams;
use super::lifecycle::ensure_approved;
use super::models::*;
use super::require_id;
use crate::errors::WorkflowError;

/// Promote part or all of a pending claim into team assignments.
///
/// All-or-nothing: if any named team lacks an open seat the whole call is
/// rejected and neither the queue nor any capacity changes.
pub fn approve_claim(
    pitch: &mut Pitch,
    contributor_id: &str,
    teams: Vec<TeamId>,
) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "approve a claim on")?;
    let teams = normalize_teams(teams)?;

    let idx = pitch
        .pending_claims
        .iter()
        .position(|c| c.contributor_id == contributor_id && c.claim_status == ClaimStatus::Pending)
        .ok_or_else(|| {
            WorkflowError::not_found(format!(
                "no pending claim from {} on pitch {}",
                contributor_id, pitch.id
            ))
        })?;

    let requested = &pitch.pending_claims[idx].requested_teams;
    if let Some(extra) = teams.iter().find(|t| !requested.contains(*t)) {
        return Err(WorkflowError::validation(format!(
            "{} did not request team {}",
            contributor_id, extra
        )));
    }
    let already_held = pitch
        .assignment(contributor_id)
        .and_then(|held| teams.iter().find(|t| held.teams.contains(*t)));
    if let Some(dup) = already_held {
        return Err(WorkflowError::Duplicate(format!(
            "{} already holds a seat on team {}",
            contributor_id, dup
        )));
    }
    if let Some(full) = teams.iter().find(|t| !has_open_seat(pitch, t)) {
        return Err(WorkflowError::CapacityExhausted {
            team_id: full.clone(),
        });
    }

    for team in &teams {
        decrement_seat(pitch, team)?;
    }

    let entry = &mut pitch.pending_claims[idx];
    entry.requested_teams.retain(|t| !teams.contains(t));
    if entry.requested_teams.is_empty() {
        pitch.pending_claims.remove(idx);
    }

    match pitch
        .assignment_contributors
        .iter_mut()
        .find(|a| a.contributor_id == contributor_id)
    {
        Some(existing) => existing.teams.extend(teams),
        None => pitch.assignment_contributors.push(Assignment {
            contributor_id: contributor_id.to_string(),
            teams,
        }),
    }
    Ok(())
}

/// Take a contributor off a team and reopen the seat.
pub fn remove_contributor(
    pitch: &mut Pitch,
    contributor_id: &str,
    team_id: &str,
) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "remove a contributor from")?;
    let idx = pitch
        .assignment_contributors
        .iter()
        .position(|a| a.contributor_id == contributor_id && a.teams.contains(team_id))
        .ok_or_else(|| {
            WorkflowError::not_found(format!(
                "{} is not assigned to team {} on pitch {}",
                contributor_id, team_id, pitch.id
            ))
        })?;

    let entry = &mut pitch.assignment_contributors[idx];
    entry.teams.remove(team_id);
    if entry.teams.is_empty() {
        pitch.assignment_contributors.remove(idx);
    }
    increment_seat(pitch, team_id);
    Ok(())
}

pub fn assign_writer(pitch: &mut Pitch, contributor_id: &str) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "assign a writer to")?;
    require_id("contributor id", contributor_id)?;
    if pitch.writer.is_some() {
        return Err(WorkflowError::SlotOccupied { slot: "writer" });
    }
    if let Some(tier) = pitch.editors.tier_of(contributor_id) {
        return Err(WorkflowError::validation(format!(
            "{} is already the {} editor and cannot also write",
            contributor_id, tier
        )));
    }
    pitch.writer = Some(contributor_id.to_string());
    Ok(())
}

pub fn clear_writer(pitch: &mut Pitch) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "clear the writer of")?;
    match pitch.writer.take() {
        Some(_) => Ok(()),
        None => Err(WorkflowError::not_found(format!(
            "pitch {} has no writer",
            pitch.id
        ))),
    }
}

pub fn assign_editor(
    pitch: &mut Pitch,
    contributor_id: &str,
    editor_type: EditorType,
) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "assign an editor to")?;
    require_id("contributor id", contributor_id)?;
    if pitch.writer.as_deref() == Some(contributor_id) {
        return Err(WorkflowError::validation(format!(
            "{} is the writer and cannot also edit",
            contributor_id
        )));
    }
    if let Some(tier) = pitch.editors.tier_of(contributor_id) {
        return Err(WorkflowError::Duplicate(format!(
            "{} is already the {} editor",
            contributor_id, tier
        )));
    }
    if editor_type == EditorType::Primary && pitch.editors.primary.is_some() {
        return Err(WorkflowError::SlotOccupied {
            slot: "primary editor",
        });
    }
    insert_editor(&mut pitch.editors, contributor_id, editor_type);
    Ok(())
}

pub fn change_editor_type(
    pitch: &mut Pitch,
    contributor_id: &str,
    from: EditorType,
    to: EditorType,
) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "change an editor on")?;
    if from == to {
        return Err(WorkflowError::validation(format!(
            "{} is already a {} editor",
            contributor_id, to
        )));
    }
    if pitch.editors.tier_of(contributor_id) != Some(from) {
        return Err(WorkflowError::not_found(format!(
            "{} is not a {} editor on pitch {}",
            contributor_id, from, pitch.id
        )));
    }
    if to == EditorType::Primary && pitch.editors.primary.is_some() {
        return Err(WorkflowError::SlotOccupied {
            slot: "primary editor",
        });
    }
    remove_from_tier(&mut pitch.editors, contributor_id, from);
    insert_editor(&mut pitch.editors, contributor_id, to);
    Ok(())
}

pub fn remove_editor(pitch: &mut Pitch, contributor_id: &str) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "remove an editor from")?;
    let tier = pitch.editors.tier_of(contributor_id).ok_or_else(|| {
        WorkflowError::not_found(format!(
            "{} is not an editor on pitch {}",
            contributor_id, pitch.id
        ))
    })?;
    remove_from_tier(&mut pitch.editors, contributor_id, tier);
    Ok(())
}

fn insert_editor(slots: &mut EditorSlots, contributor_id: &str, tier: EditorType) {
    let id = contributor_id.to_string();
    match tier {
        EditorType::Primary => slots.primary = Some(id),
        EditorType::Second => {
            slots.seconds.insert(id);
        }
        EditorType::Third => {
            slots.thirds.insert(id);
        }
    }
}

fn remove_from_tier(slots: &mut EditorSlots, contributor_id: &str, tier: EditorType) {
    match tier {
        EditorType::Primary => slots.primary = None,
        EditorType::Second => {
            slots.seconds.remove(contributor_id);
        }
        EditorType::Third => {
            slots.thirds.remove(contributor_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitches::claims::{pending_claims, submit_claim};
    use crate::pitches::lifecycle::tests::approved_pitch;
    use chrono::Utc;

    fn teams(names: &[&str]) -> Vec<TeamId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn claim(pitch: &mut Pitch, who: &str, names: &[&str]) {
        submit_claim(pitch, who, teams(names), "please", Utc::now()).unwrap();
    }

    #[test]
    fn test_approve_claim_moves_contributor_into_ledger() {
        let mut pitch = approved_pitch(&[("writing", 1), ("photo", 2)]);
        claim(&mut pitch, "x", &["writing"]);
        approve_claim(&mut pitch, "x", teams(&["writing"])).unwrap();

        assert_eq!(pitch.capacity("writing").unwrap().target, 0);
        assert!(pitch.assignment("x").unwrap().teams.contains("writing"));
        assert!(pitch.pending_claim("x").is_none());
        assert!(pitch.pending_claims.is_empty());
    }

    #[test]
    fn test_partial_team_approval_keeps_rest_pending() {
        let mut pitch = approved_pitch(&[("writing", 1), ("photo", 1)]);
        claim(&mut pitch, "x", &["writing", "photo"]);
        approve_claim(&mut pitch, "x", teams(&["photo"])).unwrap();

        let remaining = pitch.pending_claim("x").unwrap();
        assert_eq!(remaining.requested_teams.len(), 1);
        assert!(remaining.requested_teams.contains("writing"));

        approve_claim(&mut pitch, "x", teams(&["writing"])).unwrap();
        assert!(pitch.pending_claim("x").is_none());
        // merged into a single ledger entry
        assert_eq!(pitch.assignment_contributors.len(), 1);
        assert_eq!(pitch.assignment("x").unwrap().teams.len(), 2);
    }

    #[test]
    fn test_failed_approval_leaves_pitch_untouched() {
        let mut pitch = approved_pitch(&[("writing", 1), ("photo", 0)]);
        claim(&mut pitch, "x", &["writing", "photo"]);
        let before = pitch.clone();

        let err = approve_claim(&mut pitch, "x", teams(&["writing", "photo"])).unwrap_err();
        assert!(matches!(err, WorkflowError::CapacityExhausted { ref team_id } if team_id == "photo"));
        assert_eq!(pitch, before);
    }

    #[test]
    fn test_approve_unrequested_team_is_rejected() {
        let mut pitch = approved_pitch(&[("writing", 1), ("photo", 1)]);
        claim(&mut pitch, "x", &["writing"]);
        let err = approve_claim(&mut pitch, "x", teams(&["photo"])).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn test_approve_without_claim_is_not_found() {
        let mut pitch = approved_pitch(&[("photo", 1)]);
        let err = approve_claim(&mut pitch, "ghost", teams(&["photo"])).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }

    #[test]
    fn test_declined_claim_cannot_be_approved() {
        let mut pitch = approved_pitch(&[("photo", 1)]);
        claim(&mut pitch, "x", &["photo"]);
        crate::pitches::claims::decline_claim(&mut pitch, "x").unwrap();
        assert!(matches!(
            approve_claim(&mut pitch, "x", teams(&["photo"])),
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[test]
    fn test_last_seat_goes_to_first_approval() {
        let mut pitch = approved_pitch(&[("photo", 1)]);
        claim(&mut pitch, "y", &["photo"]);
        claim(&mut pitch, "z", &["photo"]);
        approve_claim(&mut pitch, "y", teams(&["photo"])).unwrap();
        let err = approve_claim(&mut pitch, "z", teams(&["photo"])).unwrap_err();
        assert!(matches!(err, WorkflowError::CapacityExhausted { .. }));
        assert_eq!(pitch.capacity("photo").unwrap().target, 0);
        assert_eq!(pending_claims(&pitch).len(), 1);
    }

    #[test]
    fn test_remove_contributor_restores_seat() {
        let mut pitch = approved_pitch(&[("photo", 1)]);
        claim(&mut pitch, "x", &["photo"]);
        approve_claim(&mut pitch, "x", teams(&["photo"])).unwrap();

        remove_contributor(&mut pitch, "x", "photo").unwrap();
        assert_eq!(pitch.capacity("photo").unwrap().target, 1);
        assert!(pitch.assignment("x").is_none());
    }

    #[test]
    fn test_remove_unassigned_contributor_is_not_found() {
        let mut pitch = approved_pitch(&[("writing", 1)]);
        let before = pitch.clone();
        let err = remove_contributor(&mut pitch, "x", "writing").unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
        assert_eq!(pitch, before);
    }

    #[test]
    fn test_writer_slot_is_single_valued() {
        let mut pitch = approved_pitch(&[]);
        assign_writer(&mut pitch, "w1").unwrap();
        assert!(matches!(
            assign_writer(&mut pitch, "w2"),
            Err(WorkflowError::SlotOccupied { slot: "writer" })
        ));
        clear_writer(&mut pitch).unwrap();
        assign_writer(&mut pitch, "w2").unwrap();
        assert_eq!(pitch.writer.as_deref(), Some("w2"));
    }

    #[test]
    fn test_clear_empty_writer_is_not_found() {
        let mut pitch = approved_pitch(&[]);
        assert!(matches!(
            clear_writer(&mut pitch),
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[test]
    fn test_writer_and_editor_are_exclusive() {
        let mut pitch = approved_pitch(&[]);
        assign_writer(&mut pitch, "ann").unwrap();
        assert!(matches!(
            assign_editor(&mut pitch, "ann", EditorType::Second),
            Err(WorkflowError::Validation(_))
        ));

        assign_editor(&mut pitch, "bo", EditorType::Third).unwrap();
        clear_writer(&mut pitch).unwrap();
        assert!(matches!(
            assign_writer(&mut pitch, "bo"),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn test_primary_editor_is_single_valued() {
        let mut pitch = approved_pitch(&[]);
        assign_editor(&mut pitch, "a", EditorType::Primary).unwrap();
        assert!(matches!(
            assign_editor(&mut pitch, "b", EditorType::Primary),
            Err(WorkflowError::SlotOccupied { .. })
        ));
        remove_editor(&mut pitch, "a").unwrap();
        assign_editor(&mut pitch, "b", EditorType::Primary).unwrap();
        assert_eq!(pitch.editors.primary.as_deref(), Some("b"));
    }

    #[test]
    fn test_second_and_third_tiers_are_unbounded() {
        let mut pitch = approved_pitch(&[]);
        for who in ["a", "b", "c", "d"] {
            assign_editor(&mut pitch, who, EditorType::Second).unwrap();
        }
        assign_editor(&mut pitch, "e", EditorType::Third).unwrap();
        assert_eq!(pitch.editors.seconds.len(), 4);
        assert!(matches!(
            assign_editor(&mut pitch, "a", EditorType::Third),
            Err(WorkflowError::Duplicate(_))
        ));
    }

    #[test]
    fn test_change_editor_type() {
        let mut pitch = approved_pitch(&[]);
        assign_editor(&mut pitch, "a", EditorType::Second).unwrap();
        change_editor_type(&mut pitch, "a", EditorType::Second, EditorType::Primary).unwrap();
        assert_eq!(pitch.editors.primary.as_deref(), Some("a"));
        assert!(pitch.editors.seconds.is_empty());

        assign_editor(&mut pitch, "b", EditorType::Third).unwrap();
        assert!(matches!(
            change_editor_type(&mut pitch, "b", EditorType::Third, EditorType::Primary),
            Err(WorkflowError::SlotOccupied { .. })
        ));
        assert!(matches!(
            change_editor_type(&mut pitch, "b", EditorType::Second, EditorType::Third),
            Err(WorkflowError::NotFound(_))
        ));
        assert!(matches!(
            change_editor_type(&mut pitch, "b", EditorType::Third, EditorType::Third),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn test_remove_editor_not_found() {
        let mut pitch = approved_pitch(&[]);
        assert!(matches!(
            remove_editor(&mut pitch, "nobody"),
            Err(WorkflowError::NotFound(_))
        ));
    }
}
