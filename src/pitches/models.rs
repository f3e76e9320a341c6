use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PitchId = i64;
pub type ContributorId = String;
pub type TeamId = String;
pub type IssueId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PitchStatus {
    Pending,
    Approved,
    Declined,
}

impl PitchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
        }
    }
}

impl std::fmt::Display for PitchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PitchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "declined" => Ok(Self::Declined),
            _ => Err(format!("Invalid pitch status: {}", s)),
        }
    }
}

/// Editor tiers. Only `Primary` is single-valued.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EditorType {
    Primary,
    Second,
    Third,
}

impl EditorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Second => "second",
            Self::Third => "third",
        }
    }
}

impl std::fmt::Display for EditorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "second" => Ok(Self::Second),
            "third" => Ok(Self::Third),
            _ => Err(format!("Invalid editor type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Declined,
}

/// Per-issue production status. Ordering follows the production board's
/// column order, which is also the key order of a bucketed board.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum IssueStatus {
    ConfirmedIn,
    MaybeIn,
    Delayed,
    Push,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfirmedIn => "confirmed-in",
            Self::MaybeIn => "maybe-in",
            Self::Delayed => "delayed",
            Self::Push => "push",
        }
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed-in" => Ok(Self::ConfirmedIn),
            "maybe-in" => Ok(Self::MaybeIn),
            "delayed" => Ok(Self::Delayed),
            "push" => Ok(Self::Push),
            _ => Err(format!("Invalid issue status: {}", s)),
        }
    }
}

/// Open seats remaining on one team. `target` never goes below zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamCapacity {
    pub team_id: TeamId,
    pub target: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditorSlots {
    pub primary: Option<ContributorId>,
    pub seconds: BTreeSet<ContributorId>,
    pub thirds: BTreeSet<ContributorId>,
}

impl EditorSlots {
    /// Tier currently held by `contributor_id`, if any.
    pub fn tier_of(&self, contributor_id: &str) -> Option<EditorType> {
        if self.primary.as_deref() == Some(contributor_id) {
            Some(EditorType::Primary)
        } else if self.seconds.contains(contributor_id) {
            Some(EditorType::Second)
        } else if self.thirds.contains(contributor_id) {
            Some(EditorType::Third)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.seconds.is_empty() && self.thirds.is_empty()
    }
}

/// Team memberships held by one contributor outside the writer/editor roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub contributor_id: ContributorId,
    pub teams: BTreeSet<TeamId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingClaim {
    pub contributor_id: ContributorId,
    pub requested_teams: BTreeSet<TeamId>,
    pub message: String,
    pub submitted_at: DateTime<Utc>,
    pub claim_status: ClaimStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueStatusEntry {
    pub issue_id: IssueId,
    pub status: IssueStatus,
}

/// Descriptive fields supplied by the author at submission time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PitchDetails {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub conflict_of_interest: bool,
    #[serde(default)]
    pub is_internal: bool,
}

/// The pitch aggregate. Every workflow mutation reads and writes one of
/// these as a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pitch {
    pub id: PitchId,
    pub author_id: ContributorId,
    pub details: PitchDetails,
    pub status: PitchStatus,
    pub team_capacities: Vec<TeamCapacity>,
    pub writer: Option<ContributorId>,
    pub editors: EditorSlots,
    pub assignment_contributors: Vec<Assignment>,
    pub pending_claims: Vec<PendingClaim>,
    pub issue_statuses: Vec<IssueStatusEntry>,
    pub needs_writer: bool,
    pub needs_primary_editor: bool,
    pub reviewed_by: Option<ContributorId>,
    pub review_reasoning: Option<String>,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pitch {
    pub fn capacity(&self, team_id: &str) -> Option<&TeamCapacity> {
        self.team_capacities.iter().find(|c| c.team_id == team_id)
    }

    pub fn assignment(&self, contributor_id: &str) -> Option<&Assignment> {
        self.assignment_contributors
            .iter()
            .find(|a| a.contributor_id == contributor_id)
    }

    pub fn pending_claim(&self, contributor_id: &str) -> Option<&PendingClaim> {
        self.pending_claims
            .iter()
            .find(|c| c.contributor_id == contributor_id && c.claim_status == ClaimStatus::Pending)
    }

    pub fn issue_status(&self, issue_id: &str) -> Option<IssueStatus> {
        self.issue_statuses
            .iter()
            .find(|e| e.issue_id == issue_id)
            .map(|e| e.status)
    }

    /// True when the contributor is author, writer, editor or team member.
    pub fn involves(&self, contributor_id: &str) -> bool {
        self.author_id == contributor_id
            || self.writer.as_deref() == Some(contributor_id)
            || self.editors.tier_of(contributor_id).is_some()
            || self.assignment(contributor_id).is_some()
    }
}

// ── Staff inputs ──────────────────────────────────────────────────────

/// Everything staff stipulate when approving a pitch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalPlan {
    #[serde(default)]
    pub team_capacities: Vec<TeamCapacity>,
    #[serde(default)]
    pub writer: Option<ContributorId>,
    #[serde(default)]
    pub editors: Vec<EditorAssignment>,
    #[serde(default)]
    pub issues: Vec<IssueStatusEntry>,
    #[serde(default = "default_true")]
    pub needs_writer: bool,
    #[serde(default = "default_true")]
    pub needs_primary_editor: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ApprovalPlan {
    fn default() -> Self {
        Self {
            team_capacities: Vec::new(),
            writer: None,
            editors: Vec::new(),
            issues: Vec::new(),
            needs_writer: true,
            needs_primary_editor: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditorAssignment {
    pub contributor_id: ContributorId,
    pub editor_type: EditorType,
}

// API view types

/// Production board for one issue: status → pitches, in board column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueBoard {
    pub issue_id: IssueId,
    pub buckets: BTreeMap<IssueStatus, Vec<Pitch>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTeamsView {
    pub pitch_id: PitchId,
    pub open_teams: BTreeMap<TeamId, u32>,
    pub fully_claimed: bool,
}
