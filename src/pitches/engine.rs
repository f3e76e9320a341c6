//! The workflow orchestrator. Every mutation of a stored pitch goes through
//! [`WorkflowEngine::execute`]:
//!
//! 1. take the pitch's in-process lock,
//! 2. load the aggregate and check `expected_revision`,
//! 3. apply a [`PitchCommand`] to a copy,
//! 4. write the copy back with a compare-and-set on `revision`.
//!
//! Step 4 also catches writers in other processes sharing the database file.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::Instrument;

use super::command::PitchCommand;
use super::db::DbHandle;
use super::models::*;
use super::{capacity, claims, issues, lifecycle};
use crate::errors::{ErrorKind, WorkflowError};

/// Never held across an `.await`.
type LockMap = Arc<std::sync::Mutex<HashMap<PitchId, Arc<Mutex<()>>>>>;

#[derive(Clone)]
pub struct WorkflowEngine {
    db: DbHandle,
    /// One async mutex per pitch with an operation in flight.
    locks: LockMap,
}

/// Exclusive access to one pitch. The lease exists before the wait starts, so
/// a caller cancelled mid-wait still cleans up. On drop the map entry goes
/// away once no other caller holds or awaits it.
struct PitchLease {
    pitch_id: PitchId,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PitchLease {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(&self.pitch_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.pitch_id);
        }
    }
}

impl WorkflowEngine {
    pub fn new(db: DbHandle) -> Self {
        Self {
            db,
            locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    async fn lock_pitch(&self, pitch_id: PitchId) -> PitchLease {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(pitch_id).or_default().clone()
        };
        let mut lease = PitchLease {
            pitch_id,
            locks: self.locks.clone(),
            guard: None,
        };
        lease.guard = Some(lock.lock_owned().await);
        lease
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    // ── Mutations ─────────────────────────────────────────────────────

    pub async fn submit(
        &self,
        author_id: &str,
        details: PitchDetails,
    ) -> Result<Pitch, WorkflowError> {
        let pitch = lifecycle::submit(author_id, details, Utc::now())?;
        let stored = self.db.call(move |db| Ok(db.insert_pitch(&pitch)?)).await?;
        tracing::info!(pitch_id = stored.id, author_id = %stored.author_id, "pitch submitted");
        Ok(stored)
    }

    /// Apply `command` to pitch `pitch_id` as one atomic unit and return the
    /// updated aggregate. On any error nothing is written.
    pub async fn execute(
        &self,
        pitch_id: PitchId,
        expected_revision: Option<i64>,
        command: PitchCommand,
    ) -> Result<Pitch, WorkflowError> {
        let op = command.name();
        let milestone = command.is_milestone();
        let span = tracing::info_span!("pitch_op", pitch_id, op);

        async move {
            let result = self.execute_locked(pitch_id, expected_revision, command).await;
            match &result {
                Ok(pitch) if milestone => {
                    tracing::info!(revision = pitch.revision, status = %pitch.status, "pitch updated")
                }
                Ok(pitch) => tracing::debug!(revision = pitch.revision, "pitch updated"),
                Err(e) => match e.kind() {
                    ErrorKind::ConcurrencyConflict | ErrorKind::CapacityExhausted => {
                        tracing::warn!(error = %e, "pitch operation rejected")
                    }
                    ErrorKind::Internal => tracing::error!(error = %e, "pitch operation failed"),
                    _ => tracing::debug!(error = %e, "pitch operation rejected"),
                },
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute_locked(
        &self,
        pitch_id: PitchId,
        expected_revision: Option<i64>,
        command: PitchCommand,
    ) -> Result<Pitch, WorkflowError> {
        let _lease = self.lock_pitch(pitch_id).await;

        let current = self.get_pitch(pitch_id).await?;
        if let Some(expected) = expected_revision {
            if expected != current.revision {
                return Err(WorkflowError::ConcurrencyConflict {
                    id: pitch_id,
                    expected,
                    actual: current.revision,
                });
            }
        }

        let now = Utc::now();
        let base_revision = current.revision;
        let mut next = current;
        command.apply(&mut next, now)?;
        next.revision = base_revision + 1;
        next.updated_at = now;

        self.db
            .call(move |db| {
                if db.save_pitch(&next, base_revision)? {
                    return Ok(next);
                }
                match db.current_revision(pitch_id)? {
                    Some(actual) => Err(WorkflowError::ConcurrencyConflict {
                        id: pitch_id,
                        expected: base_revision,
                        actual,
                    }),
                    None => Err(WorkflowError::PitchNotFound { id: pitch_id }),
                }
            })
            .await
    }

    pub async fn approve(
        &self,
        pitch_id: PitchId,
        reviewer_id: &str,
        plan: ApprovalPlan,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::Approve {
            reviewer_id: reviewer_id.to_string(),
            plan,
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn decline(
        &self,
        pitch_id: PitchId,
        reviewer_id: &str,
        reasoning: Option<String>,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::Decline {
            reviewer_id: reviewer_id.to_string(),
            reasoning,
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn submit_claim(
        &self,
        pitch_id: PitchId,
        contributor_id: &str,
        teams: Vec<TeamId>,
        message: &str,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::SubmitClaim {
            contributor_id: contributor_id.to_string(),
            teams,
            message: message.to_string(),
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn approve_claim(
        &self,
        pitch_id: PitchId,
        contributor_id: &str,
        teams: Vec<TeamId>,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::ApproveClaim {
            contributor_id: contributor_id.to_string(),
            teams,
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn decline_claim(
        &self,
        pitch_id: PitchId,
        contributor_id: &str,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::DeclineClaim {
            contributor_id: contributor_id.to_string(),
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn remove_contributor(
        &self,
        pitch_id: PitchId,
        contributor_id: &str,
        team_id: &str,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::RemoveContributor {
            contributor_id: contributor_id.to_string(),
            team_id: team_id.to_string(),
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn set_target(
        &self,
        pitch_id: PitchId,
        team_id: &str,
        target: u32,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::SetTarget {
            team_id: team_id.to_string(),
            target,
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn assign_writer(
        &self,
        pitch_id: PitchId,
        contributor_id: &str,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::AssignWriter {
            contributor_id: contributor_id.to_string(),
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn clear_writer(
        &self,
        pitch_id: PitchId,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        self.execute(pitch_id, expected_revision, PitchCommand::ClearWriter)
            .await
    }

    pub async fn assign_editor(
        &self,
        pitch_id: PitchId,
        contributor_id: &str,
        editor_type: EditorType,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::AssignEditor {
            contributor_id: contributor_id.to_string(),
            editor_type,
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn change_editor_type(
        &self,
        pitch_id: PitchId,
        contributor_id: &str,
        from: EditorType,
        to: EditorType,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::ChangeEditorType {
            contributor_id: contributor_id.to_string(),
            from,
            to,
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn remove_editor(
        &self,
        pitch_id: PitchId,
        contributor_id: &str,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::RemoveEditor {
            contributor_id: contributor_id.to_string(),
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn add_to_issue(
        &self,
        pitch_id: PitchId,
        issue_id: &str,
        status: IssueStatus,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::AddToIssue {
            issue_id: issue_id.to_string(),
            status,
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn set_issue_status(
        &self,
        pitch_id: PitchId,
        issue_id: &str,
        status: IssueStatus,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::SetIssueStatus {
            issue_id: issue_id.to_string(),
            status,
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    pub async fn remove_from_issue(
        &self,
        pitch_id: PitchId,
        issue_id: &str,
        expected_revision: Option<i64>,
    ) -> Result<Pitch, WorkflowError> {
        let command = PitchCommand::RemoveFromIssue {
            issue_id: issue_id.to_string(),
        };
        self.execute(pitch_id, expected_revision, command).await
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub async fn get_pitch(&self, pitch_id: PitchId) -> Result<Pitch, WorkflowError> {
        self.db
            .call(move |db| {
                db.get_pitch(pitch_id)?
                    .ok_or(WorkflowError::PitchNotFound { id: pitch_id })
            })
            .await
    }

    pub async fn list_pitches(
        &self,
        status: Option<PitchStatus>,
    ) -> Result<Vec<Pitch>, WorkflowError> {
        self.db.call(move |db| Ok(db.list_pitches(status)?)).await
    }

    /// Approved pitches that still have an open seat or an unfilled role.
    pub async fn list_open_pitches(&self) -> Result<Vec<Pitch>, WorkflowError> {
        let approved = self.list_pitches(Some(PitchStatus::Approved)).await?;
        Ok(approved
            .into_iter()
            .filter(|p| !capacity::is_fully_claimed(p))
            .collect())
    }

    pub async fn list_pitches_for_contributor(
        &self,
        contributor_id: &str,
    ) -> Result<Vec<Pitch>, WorkflowError> {
        let all = self.list_pitches(None).await?;
        Ok(all
            .into_iter()
            .filter(|p| p.involves(contributor_id))
            .collect())
    }

    pub async fn list_pitches_with_pending_claims(&self) -> Result<Vec<Pitch>, WorkflowError> {
        self.db
            .call(|db| Ok(db.list_pitches_with_pending_claims()?))
            .await
    }

    pub async fn open_teams(&self, pitch_id: PitchId) -> Result<OpenTeamsView, WorkflowError> {
        let pitch = self.get_pitch(pitch_id).await?;
        Ok(OpenTeamsView {
            pitch_id,
            open_teams: capacity::open_teams(&pitch),
            fully_claimed: capacity::is_fully_claimed(&pitch),
        })
    }

    pub async fn pending_claims(
        &self,
        pitch_id: PitchId,
    ) -> Result<Vec<PendingClaim>, WorkflowError> {
        let pitch = self.get_pitch(pitch_id).await?;
        Ok(claims::pending_claims(&pitch).into_iter().cloned().collect())
    }

    pub async fn issue_board(&self, issue_id: &str) -> Result<IssueBoard, WorkflowError> {
        let owned_id = issue_id.to_string();
        let candidates = self
            .db
            .call(move |db| Ok(db.list_pitches_in_issue(&owned_id)?))
            .await?;
        Ok(IssueBoard {
            issue_id: issue_id.to_string(),
            buckets: issues::bucket_pitches_by_status(issue_id, &candidates),
        })
    }
}
