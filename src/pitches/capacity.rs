//! Per-pitch seat bookkeeping.
//!
//! `target` is the number of seats still open on a team. Occupancy is never
//! stored alongside it; it is derived from the assignment ledger.

use std::collections::BTreeMap;

use super::lifecycle::ensure_approved;
use super::models::*;
use super::require_id;
use crate::errors::WorkflowError;

pub fn has_open_seat(pitch: &Pitch, team_id: &str) -> bool {
    pitch.capacity(team_id).is_some_and(|c| c.target > 0)
}

/// Consume one seat. Fails without touching the pitch when none is left.
pub fn decrement_seat(pitch: &mut Pitch, team_id: &str) -> Result<(), WorkflowError> {
    match pitch
        .team_capacities
        .iter_mut()
        .find(|c| c.team_id == team_id)
    {
        Some(cap) if cap.target > 0 => {
            cap.target -= 1;
            Ok(())
        }
        _ => Err(WorkflowError::CapacityExhausted {
            team_id: team_id.to_string(),
        }),
    }
}

/// Give a seat back. A team that was never requested gets one open seat.
pub fn increment_seat(pitch: &mut Pitch, team_id: &str) {
    match pitch
        .team_capacities
        .iter_mut()
        .find(|c| c.team_id == team_id)
    {
        Some(cap) => cap.target = cap.target.saturating_add(1),
        None => pitch.team_capacities.push(TeamCapacity {
            team_id: team_id.to_string(),
            target: 1,
        }),
    }
}

pub fn count_assigned(pitch: &Pitch, team_id: &str) -> usize {
    pitch
        .assignment_contributors
        .iter()
        .filter(|a| a.teams.contains(team_id))
        .count()
}

/// Administrative resize of a team's open seats.
pub fn set_target(pitch: &mut Pitch, team_id: &str, new_target: u32) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "resize a team on")?;
    require_id("team id", team_id)?;

    let assigned = count_assigned(pitch, team_id);
    if (new_target as usize) < assigned {
        return Err(WorkflowError::validation(format!(
            "target {} for team {} is below the {} contributor(s) already assigned",
            new_target, team_id, assigned
        )));
    }

    match pitch
        .team_capacities
        .iter_mut()
        .find(|c| c.team_id == team_id)
    {
        Some(cap) => cap.target = new_target,
        None => pitch.team_capacities.push(TeamCapacity {
            team_id: team_id.to_string(),
            target: new_target,
        }),
    }
    Ok(())
}

/// Every team is full and every requested role is filled.
pub fn is_fully_claimed(pitch: &Pitch) -> bool {
    pitch.team_capacities.iter().all(|c| c.target == 0)
        && (!pitch.needs_writer || pitch.writer.is_some())
        && (!pitch.needs_primary_editor || pitch.editors.primary.is_some())
}

/// Teams that can still take a contributor, for claim-eligibility display.
pub fn open_teams(pitch: &Pitch) -> BTreeMap<TeamId, u32> {
    pitch
        .team_capacities
        .iter()
        .filter(|c| c.target > 0)
        .map(|c| (c.team_id.clone(), c.target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitches::lifecycle::tests::{approved_pitch, pending_pitch};

    #[test]
    fn test_has_open_seat() {
        let pitch = approved_pitch(&[("writing", 1), ("photo", 0)]);
        assert!(has_open_seat(&pitch, "writing"));
        assert!(!has_open_seat(&pitch, "photo"));
        assert!(!has_open_seat(&pitch, "video"));
    }

    #[test]
    fn test_decrement_seat_stops_at_zero() {
        let mut pitch = approved_pitch(&[("photo", 1)]);
        decrement_seat(&mut pitch, "photo").unwrap();
        assert_eq!(pitch.capacity("photo").unwrap().target, 0);

        let before = pitch.clone();
        let err = decrement_seat(&mut pitch, "photo").unwrap_err();
        assert!(matches!(err, WorkflowError::CapacityExhausted { ref team_id } if team_id == "photo"));
        assert_eq!(pitch, before);
    }

    #[test]
    fn test_decrement_unrequested_team_is_exhausted() {
        let mut pitch = approved_pitch(&[("photo", 1)]);
        assert!(matches!(
            decrement_seat(&mut pitch, "video"),
            Err(WorkflowError::CapacityExhausted { .. })
        ));
    }

    #[test]
    fn test_increment_seat() {
        let mut pitch = approved_pitch(&[("photo", 0)]);
        increment_seat(&mut pitch, "photo");
        assert_eq!(pitch.capacity("photo").unwrap().target, 1);
        increment_seat(&mut pitch, "video");
        assert_eq!(pitch.capacity("video").unwrap().target, 1);
    }

    #[test]
    fn test_set_target_respects_current_occupancy() {
        let mut pitch = approved_pitch(&[("photo", 0)]);
        for who in ["a", "b"] {
            pitch.assignment_contributors.push(Assignment {
                contributor_id: who.into(),
                teams: ["photo".to_string()].into(),
            });
        }
        let before = pitch.clone();
        let err = set_target(&mut pitch, "photo", 1).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(pitch, before);

        set_target(&mut pitch, "photo", 3).unwrap();
        assert_eq!(pitch.capacity("photo").unwrap().target, 3);
    }

    #[test]
    fn test_set_target_adds_new_team() {
        let mut pitch = approved_pitch(&[]);
        set_target(&mut pitch, "illustration", 2).unwrap();
        assert_eq!(open_teams(&pitch).get("illustration"), Some(&2));
    }

    #[test]
    fn test_set_target_requires_approved() {
        let mut pitch = pending_pitch();
        assert!(matches!(
            set_target(&mut pitch, "photo", 1),
            Err(WorkflowError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_fully_claimed_predicate() {
        let mut pitch = approved_pitch(&[("photo", 1)]);
        pitch.needs_writer = true;
        pitch.needs_primary_editor = false;
        assert!(!is_fully_claimed(&pitch));

        decrement_seat(&mut pitch, "photo").unwrap();
        assert!(!is_fully_claimed(&pitch), "writer still missing");

        pitch.writer = Some("wendy".into());
        assert!(is_fully_claimed(&pitch));

        pitch.needs_primary_editor = true;
        assert!(!is_fully_claimed(&pitch));
        pitch.editors.primary = Some("ed".into());
        assert!(is_fully_claimed(&pitch));
    }

    #[test]
    fn test_open_teams_filters_full_teams() {
        let pitch = approved_pitch(&[("writing", 0), ("photo", 2)]);
        let open = open_teams(&pitch);
        assert_eq!(open.len(), 1);
        assert_eq!(open.get("photo"), Some(&2));
    }
}
