//! Issue bucketing: which editorial issues a pitch is slated for, and with
//! what production status.

use std::collections::BTreeMap;

use super::lifecycle::ensure_approved;
use super::models::*;
use super::require_id;
use crate::errors::WorkflowError;

pub fn add_to_issue(
    pitch: &mut Pitch,
    issue_id: &str,
    initial_status: IssueStatus,
) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "add to an issue")?;
    require_id("issue id", issue_id)?;
    if pitch.issue_status(issue_id).is_some() {
        return Err(WorkflowError::Duplicate(format!(
            "pitch {} is already in issue {}",
            pitch.id, issue_id
        )));
    }
    pitch.issue_statuses.push(IssueStatusEntry {
        issue_id: issue_id.to_string(),
        status: initial_status,
    });
    Ok(())
}

/// Update the status in place. The pitch must already be in the issue.
pub fn set_issue_status(
    pitch: &mut Pitch,
    issue_id: &str,
    status: IssueStatus,
) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "set an issue status on")?;
    let pitch_id = pitch.id;
    let entry = pitch
        .issue_statuses
        .iter_mut()
        .find(|e| e.issue_id == issue_id)
        .ok_or_else(|| {
            WorkflowError::not_found(format!("pitch {} is not in issue {}", pitch_id, issue_id))
        })?;
    entry.status = status;
    Ok(())
}

pub fn remove_from_issue(pitch: &mut Pitch, issue_id: &str) -> Result<(), WorkflowError> {
    ensure_approved(pitch, "remove from an issue")?;
    let before = pitch.issue_statuses.len();
    pitch.issue_statuses.retain(|e| e.issue_id != issue_id);
    if pitch.issue_statuses.len() == before {
        return Err(WorkflowError::not_found(format!(
            "pitch {} is not in issue {}",
            pitch.id, issue_id
        )));
    }
    Ok(())
}

/// Group the candidates that belong to `issue_id` by their status for that
/// issue. Candidates without an entry are left out; the rest land in
/// exactly one bucket, in their input order.
pub fn bucket_pitches_by_status<'a, I>(issue_id: &str, candidates: I) -> BTreeMap<IssueStatus, Vec<Pitch>>
where
    I: IntoIterator<Item = &'a Pitch>,
{
    let mut buckets: BTreeMap<IssueStatus, Vec<Pitch>> = BTreeMap::new();
    for pitch in candidates {
        if let Some(status) = pitch.issue_status(issue_id) {
            buckets.entry(status).or_default().push(pitch.clone());
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitches::lifecycle::tests::{approved_pitch, pending_pitch};

    #[test]
    fn test_add_to_issue_rejects_duplicates() {
        let mut pitch = approved_pitch(&[]);
        add_to_issue(&mut pitch, "issue-1", IssueStatus::MaybeIn).unwrap();
        let err = add_to_issue(&mut pitch, "issue-1", IssueStatus::ConfirmedIn).unwrap_err();
        assert!(matches!(err, WorkflowError::Duplicate(_)));
        assert_eq!(pitch.issue_status("issue-1"), Some(IssueStatus::MaybeIn));
    }

    #[test]
    fn test_add_to_issue_requires_approved() {
        let mut pitch = pending_pitch();
        assert!(matches!(
            add_to_issue(&mut pitch, "issue-1", IssueStatus::MaybeIn),
            Err(WorkflowError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_set_issue_status_updates_in_place() {
        let mut pitch = approved_pitch(&[]);
        add_to_issue(&mut pitch, "issue-1", IssueStatus::MaybeIn).unwrap();
        set_issue_status(&mut pitch, "issue-1", IssueStatus::Push).unwrap();
        assert_eq!(pitch.issue_statuses.len(), 1);
        assert_eq!(pitch.issue_status("issue-1"), Some(IssueStatus::Push));
    }

    #[test]
    fn test_set_issue_status_without_entry_is_not_found() {
        let mut pitch = approved_pitch(&[]);
        let err = set_issue_status(&mut pitch, "issue-9", IssueStatus::Delayed).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
        assert!(pitch.issue_statuses.is_empty());
    }

    #[test]
    fn test_remove_from_issue() {
        let mut pitch = approved_pitch(&[]);
        add_to_issue(&mut pitch, "issue-1", IssueStatus::Delayed).unwrap();
        add_to_issue(&mut pitch, "issue-2", IssueStatus::ConfirmedIn).unwrap();
        remove_from_issue(&mut pitch, "issue-1").unwrap();
        assert_eq!(pitch.issue_status("issue-1"), None);
        assert_eq!(pitch.issue_status("issue-2"), Some(IssueStatus::ConfirmedIn));
        assert!(matches!(
            remove_from_issue(&mut pitch, "issue-1"),
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[test]
    fn test_bucketing_is_a_stable_partition() {
        let mut a = approved_pitch(&[]);
        a.id = 1;
        let mut b = approved_pitch(&[]);
        b.id = 2;
        let mut c = approved_pitch(&[]);
        c.id = 3;
        let mut other = approved_pitch(&[]);
        other.id = 4;

        add_to_issue(&mut a, "issue-1", IssueStatus::Push).unwrap();
        add_to_issue(&mut b, "issue-1", IssueStatus::MaybeIn).unwrap();
        add_to_issue(&mut c, "issue-1", IssueStatus::Push).unwrap();
        add_to_issue(&mut other, "issue-2", IssueStatus::Push).unwrap();

        let buckets = bucket_pitches_by_status("issue-1", [&a, &b, &c, &other]);
        assert_eq!(buckets.len(), 2);
        let push: Vec<i64> = buckets[&IssueStatus::Push].iter().map(|p| p.id).collect();
        assert_eq!(push, vec![1, 3]);
        let maybe: Vec<i64> = buckets[&IssueStatus::MaybeIn].iter().map(|p| p.id).collect();
        assert_eq!(maybe, vec![2]);
        let total: usize = buckets.values().map(Vec::len).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_bucketing_empty_when_no_entries() {
        let pitch = approved_pitch(&[]);
        assert!(bucket_pitches_by_status("issue-1", [&pitch]).is_empty());
    }
}
