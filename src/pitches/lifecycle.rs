//! Pitch lifecycle: `Pending → Approved` or `Pending → Declined`, nothing else.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::models::*;
use super::require_id;
use crate::errors::WorkflowError;

const MAX_TITLE_LEN: usize = 200;

/// Build a freshly submitted pitch. The store assigns the id on insert.
pub fn submit(
    author_id: &str,
    details: PitchDetails,
    now: DateTime<Utc>,
) -> Result<Pitch, WorkflowError> {
    require_id("author id", author_id)?;
    let details = normalize_details(details)?;

    Ok(Pitch {
        id: 0,
        author_id: author_id.to_string(),
        details,
        status: PitchStatus::Pending,
        team_capacities: Vec::new(),
        writer: None,
        editors: EditorSlots::default(),
        assignment_contributors: Vec::new(),
        pending_claims: Vec::new(),
        issue_statuses: Vec::new(),
        needs_writer: false,
        needs_primary_editor: false,
        reviewed_by: None,
        review_reasoning: None,
        revision: 0,
        created_at: now,
        updated_at: now,
    })
}

fn normalize_details(mut details: PitchDetails) -> Result<PitchDetails, WorkflowError> {
    details.title = details.title.trim().to_string();
    details.description = details.description.trim().to_string();
    if details.title.is_empty() {
        return Err(WorkflowError::validation("title is required"));
    }
    if details.title.chars().count() > MAX_TITLE_LEN {
        return Err(WorkflowError::validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    if details.description.is_empty() {
        return Err(WorkflowError::validation("description is required"));
    }

    let mut seen = BTreeSet::new();
    let mut topics = Vec::with_capacity(details.topics.len());
    for topic in details.topics {
        let topic = topic.trim().to_string();
        if topic.is_empty() {
            return Err(WorkflowError::validation("topics must not be blank"));
        }
        if seen.insert(topic.clone()) {
            topics.push(topic);
        }
    }
    details.topics = topics;
    Ok(details)
}

pub fn approve(
    pitch: &mut Pitch,
    reviewer_id: &str,
    plan: ApprovalPlan,
) -> Result<(), WorkflowError> {
    ensure_pending(pitch, "approve")?;
    require_id("reviewer id", reviewer_id)?;
    validate_plan(&plan)?;

    let mut editors = EditorSlots::default();
    for e in plan.editors {
        match e.editor_type {
            EditorType::Primary => editors.primary = Some(e.contributor_id),
            EditorType::Second => {
                editors.seconds.insert(e.contributor_id);
            }
            EditorType::Third => {
                editors.thirds.insert(e.contributor_id);
            }
        }
    }

    pitch.status = PitchStatus::Approved;
    pitch.reviewed_by = Some(reviewer_id.to_string());
    pitch.team_capacities = plan.team_capacities;
    pitch.needs_writer = plan.needs_writer || plan.writer.is_some();
    pitch.needs_primary_editor = plan.needs_primary_editor || editors.primary.is_some();
    pitch.writer = plan.writer;
    pitch.editors = editors;
    pitch.issue_statuses = plan.issues;
    Ok(())
}

fn validate_plan(plan: &ApprovalPlan) -> Result<(), WorkflowError> {
    let mut teams = BTreeSet::new();
    for cap in &plan.team_capacities {
        require_id("team id", &cap.team_id)?;
        if !teams.insert(cap.team_id.as_str()) {
            return Err(WorkflowError::validation(format!(
                "team {} listed more than once",
                cap.team_id
            )));
        }
    }

    let mut people = BTreeSet::new();
    if let Some(writer) = &plan.writer {
        require_id("writer id", writer)?;
        people.insert(writer.as_str());
    }
    let mut primaries = 0;
    for e in &plan.editors {
        require_id("editor id", &e.contributor_id)?;
        if !people.insert(e.contributor_id.as_str()) {
            return Err(WorkflowError::validation(format!(
                "contributor {} given more than one role",
                e.contributor_id
            )));
        }
        if e.editor_type == EditorType::Primary {
            primaries += 1;
        }
    }
    if primaries > 1 {
        return Err(WorkflowError::validation("at most one primary editor"));
    }

    let mut issues = BTreeSet::new();
    for entry in &plan.issues {
        require_id("issue id", &entry.issue_id)?;
        if !issues.insert(entry.issue_id.as_str()) {
            return Err(WorkflowError::validation(format!(
                "issue {} listed more than once",
                entry.issue_id
            )));
        }
    }
    Ok(())
}

pub fn decline(
    pitch: &mut Pitch,
    reviewer_id: &str,
    reasoning: Option<String>,
) -> Result<(), WorkflowError> {
    ensure_pending(pitch, "decline")?;
    require_id("reviewer id", reviewer_id)?;

    pitch.status = PitchStatus::Declined;
    pitch.reviewed_by = Some(reviewer_id.to_string());
    pitch.review_reasoning = reasoning
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    Ok(())
}

fn ensure_pending(pitch: &Pitch, operation: &'static str) -> Result<(), WorkflowError> {
    if pitch.status != PitchStatus::Pending {
        return Err(WorkflowError::InvalidState {
            id: pitch.id,
            status: pitch.status,
            operation,
        });
    }
    Ok(())
}

/// Claims, roster edits and issue bucketing all require an approved pitch.
pub fn ensure_approved(pitch: &Pitch, operation: &'static str) -> Result<(), WorkflowError> {
    if pitch.status != PitchStatus::Approved {
        return Err(WorkflowError::InvalidState {
            id: pitch.id,
            status: pitch.status,
            operation,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn details(title: &str) -> PitchDetails {
        PitchDetails {
            title: title.to_string(),
            description: "A story worth telling".to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn pending_pitch() -> Pitch {
        let mut pitch = submit("author-1", details("City council budget"), Utc::now()).unwrap();
        pitch.id = 1;
        pitch
    }

    pub(crate) fn approved_pitch(capacities: &[(&str, u32)]) -> Pitch {
        let mut pitch = pending_pitch();
        let plan = ApprovalPlan {
            team_capacities: capacities
                .iter()
                .map(|(team, target)| TeamCapacity {
                    team_id: team.to_string(),
                    target: *target,
                })
                .collect(),
            ..Default::default()
        };
        approve(&mut pitch, "admin-1", plan).unwrap();
        pitch
    }

    #[test]
    fn test_submit_creates_pending_pitch() {
        let now = Utc::now();
        let pitch = submit("author-1", details("  Night buses  "), now).unwrap();
        assert_eq!(pitch.status, PitchStatus::Pending);
        assert_eq!(pitch.details.title, "Night buses");
        assert!(pitch.team_capacities.is_empty());
        assert!(pitch.pending_claims.is_empty());
        assert!(pitch.assignment_contributors.is_empty());
        assert_eq!(pitch.created_at, now);
        assert_eq!(pitch.revision, 0);
    }

    #[test]
    fn test_submit_requires_title_and_description() {
        let err = submit("author-1", details("   "), Utc::now()).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let mut d = details("Title");
        d.description = String::new();
        let err = submit("author-1", d, Utc::now()).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn test_submit_rejects_overlong_title() {
        let err = submit("author-1", details(&"x".repeat(201)), Utc::now()).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn test_submit_collapses_duplicate_topics() {
        let mut d = details("Title");
        d.topics = vec!["transit".into(), " transit ".into(), "housing".into()];
        let pitch = submit("author-1", d, Utc::now()).unwrap();
        assert_eq!(pitch.details.topics, vec!["transit", "housing"]);
    }

    #[test]
    fn test_approve_installs_plan() {
        let mut pitch = pending_pitch();
        let plan = ApprovalPlan {
            team_capacities: vec![TeamCapacity {
                team_id: "photo".into(),
                target: 2,
            }],
            writer: Some("wendy".into()),
            editors: vec![
                EditorAssignment {
                    contributor_id: "ed".into(),
                    editor_type: EditorType::Primary,
                },
                EditorAssignment {
                    contributor_id: "sam".into(),
                    editor_type: EditorType::Second,
                },
            ],
            issues: vec![IssueStatusEntry {
                issue_id: "issue-1".into(),
                status: IssueStatus::MaybeIn,
            }],
            needs_writer: false,
            needs_primary_editor: false,
        };
        approve(&mut pitch, "admin-1", plan).unwrap();

        assert_eq!(pitch.status, PitchStatus::Approved);
        assert_eq!(pitch.reviewed_by.as_deref(), Some("admin-1"));
        assert_eq!(pitch.capacity("photo").unwrap().target, 2);
        assert_eq!(pitch.writer.as_deref(), Some("wendy"));
        assert_eq!(pitch.editors.primary.as_deref(), Some("ed"));
        assert!(pitch.editors.seconds.contains("sam"));
        assert_eq!(pitch.issue_status("issue-1"), Some(IssueStatus::MaybeIn));
        // pre-assigned roles count as requested
        assert!(pitch.needs_writer);
        assert!(pitch.needs_primary_editor);
    }

    #[test]
    fn test_approve_then_decline_fails() {
        let mut pitch = pending_pitch();
        approve(&mut pitch, "admin-1", ApprovalPlan::default()).unwrap();
        let err = decline(&mut pitch, "admin-2", None).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidState {
                status: PitchStatus::Approved,
                ..
            }
        ));
        assert_eq!(pitch.reviewed_by.as_deref(), Some("admin-1"));
    }

    #[test]
    fn test_decline_then_approve_fails() {
        let mut pitch = pending_pitch();
        decline(&mut pitch, "admin-1", Some("  off-beat  ".into())).unwrap();
        assert_eq!(pitch.review_reasoning.as_deref(), Some("off-beat"));
        let before = pitch.clone();
        let err = approve(&mut pitch, "admin-2", ApprovalPlan::default()).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));
        assert_eq!(pitch, before);
    }

    #[test]
    fn test_approve_rejects_invalid_plan_without_mutating() {
        let mut pitch = pending_pitch();
        let before = pitch.clone();
        let plan = ApprovalPlan {
            team_capacities: vec![
                TeamCapacity {
                    team_id: "photo".into(),
                    target: 1,
                },
                TeamCapacity {
                    team_id: "photo".into(),
                    target: 2,
                },
            ],
            ..Default::default()
        };
        let err = approve(&mut pitch, "admin-1", plan).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(pitch, before);
    }

    #[test]
    fn test_approve_rejects_writer_who_is_also_editor() {
        let mut pitch = pending_pitch();
        let plan = ApprovalPlan {
            writer: Some("ann".into()),
            editors: vec![EditorAssignment {
                contributor_id: "ann".into(),
                editor_type: EditorType::Third,
            }],
            ..Default::default()
        };
        let err = approve(&mut pitch, "admin-1", plan).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn test_approve_rejects_two_primaries() {
        let mut pitch = pending_pitch();
        let plan = ApprovalPlan {
            editors: vec![
                EditorAssignment {
                    contributor_id: "a".into(),
                    editor_type: EditorType::Primary,
                },
                EditorAssignment {
                    contributor_id: "b".into(),
                    editor_type: EditorType::Primary,
                },
            ],
            ..Default::default()
        };
        assert!(approve(&mut pitch, "admin-1", plan).is_err());
    }

    #[test]
    fn test_ensure_approved() {
        let pitch = pending_pitch();
        assert!(matches!(
            ensure_approved(&pitch, "claim"),
            Err(WorkflowError::InvalidState { operation: "claim", .. })
        ));
        let pitch = approved_pitch(&[]);
        assert!(ensure_approved(&pitch, "claim").is_ok());
    }
}
