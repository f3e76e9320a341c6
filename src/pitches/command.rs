use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::*;
use super::{capacity, claims, issues, ledger, lifecycle};
use crate::errors::WorkflowError;

/// Every mutation the engine can apply to an existing pitch.
///
/// Submission is not here: it creates a pitch rather than changing one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PitchCommand {
    Approve {
        reviewer_id: ContributorId,
        plan: ApprovalPlan,
    },
    Decline {
        reviewer_id: ContributorId,
        reasoning: Option<String>,
    },
    SubmitClaim {
        contributor_id: ContributorId,
        teams: Vec<TeamId>,
        message: String,
    },
    ApproveClaim {
        contributor_id: ContributorId,
        teams: Vec<TeamId>,
    },
    DeclineClaim {
        contributor_id: ContributorId,
    },
    RemoveContributor {
        contributor_id: ContributorId,
        team_id: TeamId,
    },
    SetTarget {
        team_id: TeamId,
        target: u32,
    },
    AssignWriter {
        contributor_id: ContributorId,
    },
    ClearWriter,
    AssignEditor {
        contributor_id: ContributorId,
        editor_type: EditorType,
    },
    ChangeEditorType {
        contributor_id: ContributorId,
        from: EditorType,
        to: EditorType,
    },
    RemoveEditor {
        contributor_id: ContributorId,
    },
    AddToIssue {
        issue_id: IssueId,
        status: IssueStatus,
    },
    SetIssueStatus {
        issue_id: IssueId,
        status: IssueStatus,
    },
    RemoveFromIssue {
        issue_id: IssueId,
    },
}

impl PitchCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Decline { .. } => "decline",
            Self::SubmitClaim { .. } => "submit_claim",
            Self::ApproveClaim { .. } => "approve_claim",
            Self::DeclineClaim { .. } => "decline_claim",
            Self::RemoveContributor { .. } => "remove_contributor",
            Self::SetTarget { .. } => "set_target",
            Self::AssignWriter { .. } => "assign_writer",
            Self::ClearWriter => "clear_writer",
            Self::AssignEditor { .. } => "assign_editor",
            Self::ChangeEditorType { .. } => "change_editor_type",
            Self::RemoveEditor { .. } => "remove_editor",
            Self::AddToIssue { .. } => "add_to_issue",
            Self::SetIssueStatus { .. } => "set_issue_status",
            Self::RemoveFromIssue { .. } => "remove_from_issue",
        }
    }

    /// Lifecycle transitions and claim resolutions are logged at info level.
    pub fn is_milestone(&self) -> bool {
        matches!(
            self,
            Self::Approve { .. }
                | Self::Decline { .. }
                | Self::ApproveClaim { .. }
                | Self::DeclineClaim { .. }
        )
    }

    /// Apply to `pitch`. On error the pitch is unchanged.
    pub fn apply(self, pitch: &mut Pitch, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        match self {
            Self::Approve { reviewer_id, plan } => lifecycle::approve(pitch, &reviewer_id, plan),
            Self::Decline {
                reviewer_id,
                reasoning,
            } => lifecycle::decline(pitch, &reviewer_id, reasoning),
            Self::SubmitClaim {
                contributor_id,
                teams,
                message,
            } => claims::submit_claim(pitch, &contributor_id, teams, &message, now),
            Self::ApproveClaim {
                contributor_id,
                teams,
            } => ledger::approve_claim(pitch, &contributor_id, teams),
            Self::DeclineClaim { contributor_id } => claims::decline_claim(pitch, &contributor_id),
            Self::RemoveContributor {
                contributor_id,
                team_id,
            } => ledger::remove_contributor(pitch, &contributor_id, &team_id),
            Self::SetTarget { team_id, target } => capacity::set_target(pitch, &team_id, target),
            Self::AssignWriter { contributor_id } => ledger::assign_writer(pitch, &contributor_id),
            Self::ClearWriter => ledger::clear_writer(pitch),
            Self::AssignEditor {
                contributor_id,
                editor_type,
            } => ledger::assign_editor(pitch, &contributor_id, editor_type),
            Self::ChangeEditorType {
                contributor_id,
                from,
                to,
            } => ledger::change_editor_type(pitch, &contributor_id, from, to),
            Self::RemoveEditor { contributor_id } => ledger::remove_editor(pitch, &contributor_id),
            Self::AddToIssue { issue_id, status } => issues::add_to_issue(pitch, &issue_id, status),
            Self::SetIssueStatus { issue_id, status } => {
                issues::set_issue_status(pitch, &issue_id, status)
            }
            Self::RemoveFromIssue { issue_id } => issues::remove_from_issue(pitch, &issue_id),
        }
    }
}
