use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::models::*;
use crate::errors::WorkflowError;

/// Shared handle the engine uses to reach SQLite.
///
/// Every call hops onto the blocking pool; the connection itself sits behind
/// a std mutex, so only one closure touches it at a time.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<PitchDb>>,
}

impl DbHandle {
    pub fn new(db: PitchDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run `f` against the database off the async runtime. Storage errors
    /// surface as `WorkflowError::Database`.
    pub async fn call<F, R>(&self, f: F) -> Result<R, WorkflowError>
    where
        F: FnOnce(&PitchDb) -> Result<R, WorkflowError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

const PITCH_COLUMNS: &str = "id, author_id, title, description, deadline, topics, conflict_of_interest, is_internal, \
     status, team_capacities, writer, editors, assignment_contributors, pending_claims, issue_statuses, \
     needs_writer, needs_primary_editor, reviewed_by, review_reasoning, revision, created_at, updated_at";

pub struct PitchDb {
    conn: Connection,
}

impl PitchDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        // Collections are stored as JSON text; the aggregate is always read
        // and written whole.
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS pitches (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    author_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    deadline TEXT,
                    topics TEXT NOT NULL DEFAULT '[]',
                    conflict_of_interest INTEGER NOT NULL DEFAULT 0,
                    is_internal INTEGER NOT NULL DEFAULT 0,
                    status TEXT NOT NULL DEFAULT 'pending',
                    team_capacities TEXT NOT NULL DEFAULT '[]',
                    writer TEXT,
                    editors TEXT NOT NULL DEFAULT '{}',
                    assignment_contributors TEXT NOT NULL DEFAULT '[]',
                    pending_claims TEXT NOT NULL DEFAULT '[]',
                    issue_statuses TEXT NOT NULL DEFAULT '[]',
                    needs_writer INTEGER NOT NULL DEFAULT 0,
                    needs_primary_editor INTEGER NOT NULL DEFAULT 0,
                    reviewed_by TEXT,
                    review_reasoning TEXT,
                    revision INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_pitches_status ON pitches(status);
                CREATE INDEX IF NOT EXISTS idx_pitches_author ON pitches(author_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Writes ────────────────────────────────────────────────────────

    /// Insert a new pitch and return it with its assigned id.
    pub fn insert_pitch(&self, pitch: &Pitch) -> Result<Pitch> {
        let enc = EncodedPitch::new(pitch)?;
        self.conn
            .execute(
                "INSERT INTO pitches (author_id, title, description, deadline, topics, conflict_of_interest, is_internal,
                     status, team_capacities, writer, editors, assignment_contributors, pending_claims, issue_statuses,
                     needs_writer, needs_primary_editor, reviewed_by, review_reasoning, revision, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
                params![
                    pitch.author_id,
                    pitch.details.title,
                    pitch.details.description,
                    enc.deadline,
                    enc.topics,
                    pitch.details.conflict_of_interest,
                    pitch.details.is_internal,
                    pitch.status.as_str(),
                    enc.team_capacities,
                    pitch.writer,
                    enc.editors,
                    enc.assignment_contributors,
                    enc.pending_claims,
                    enc.issue_statuses,
                    pitch.needs_writer,
                    pitch.needs_primary_editor,
                    pitch.reviewed_by,
                    pitch.review_reasoning,
                    pitch.revision,
                    pitch.created_at.to_rfc3339(),
                    pitch.updated_at.to_rfc3339(),
                ],
            )
            .context("Failed to insert pitch")?;
        let id = self.conn.last_insert_rowid();
        self.get_pitch(id)?
            .context("Pitch not found after insert")
    }

    /// Overwrite the stored pitch only if its revision is still
    /// `expected_revision`. Returns `false` when another writer got there
    /// first (or the pitch is gone); nothing is written in that case.
    pub fn save_pitch(&self, pitch: &Pitch, expected_revision: i64) -> Result<bool> {
        let enc = EncodedPitch::new(pitch)?;
        let changed = self
            .conn
            .execute(
                "UPDATE pitches SET
                     title = ?1, description = ?2, deadline = ?3, topics = ?4,
                     conflict_of_interest = ?5, is_internal = ?6, status = ?7,
                     team_capacities = ?8, writer = ?9, editors = ?10,
                     assignment_contributors = ?11, pending_claims = ?12, issue_statuses = ?13,
                     needs_writer = ?14, needs_primary_editor = ?15,
                     reviewed_by = ?16, review_reasoning = ?17,
                     revision = ?18, updated_at = ?19
                 WHERE id = ?20 AND revision = ?21",
                params![
                    pitch.details.title,
                    pitch.details.description,
                    enc.deadline,
                    enc.topics,
                    pitch.details.conflict_of_interest,
                    pitch.details.is_internal,
                    pitch.status.as_str(),
                    enc.team_capacities,
                    pitch.writer,
                    enc.editors,
                    enc.assignment_contributors,
                    enc.pending_claims,
                    enc.issue_statuses,
                    pitch.needs_writer,
                    pitch.needs_primary_editor,
                    pitch.reviewed_by,
                    pitch.review_reasoning,
                    pitch.revision,
                    pitch.updated_at.to_rfc3339(),
                    pitch.id,
                    expected_revision,
                ],
            )
            .context("Failed to save pitch")?;
        Ok(changed == 1)
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub fn get_pitch(&self, id: PitchId) -> Result<Option<Pitch>> {
        let sql = format!("SELECT {} FROM pitches WHERE id = ?1", PITCH_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], PitchRow::from_row)
            .optional()
            .context("Failed to query pitch")?;
        row.map(PitchRow::into_pitch).transpose()
    }

    pub fn current_revision(&self, id: PitchId) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT revision FROM pitches WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query pitch revision")
    }

    /// All pitches, optionally filtered by status, oldest first.
    pub fn list_pitches(&self, status: Option<PitchStatus>) -> Result<Vec<Pitch>> {
        match status {
            Some(status) => self.query_pitches(
                &format!(
                    "SELECT {} FROM pitches WHERE status = ?1 ORDER BY id",
                    PITCH_COLUMNS
                ),
                params![status.as_str()],
            ),
            None => self.query_pitches(
                &format!("SELECT {} FROM pitches ORDER BY id", PITCH_COLUMNS),
                params![],
            ),
        }
    }

    /// Pitches with an entry for `issue_id`, oldest first.
    pub fn list_pitches_in_issue(&self, issue_id: &str) -> Result<Vec<Pitch>> {
        self.query_pitches(
            &format!(
                "SELECT {} FROM pitches
                 WHERE EXISTS (
                     SELECT 1 FROM json_each(pitches.issue_statuses)
                     WHERE json_extract(json_each.value, '$.issue_id') = ?1
                 )
                 ORDER BY id",
                PITCH_COLUMNS
            ),
            params![issue_id],
        )
    }

    /// Pitches with at least one claim still awaiting a decision.
    pub fn list_pitches_with_pending_claims(&self) -> Result<Vec<Pitch>> {
        self.query_pitches(
            &format!(
                "SELECT {} FROM pitches
                 WHERE EXISTS (
                     SELECT 1 FROM json_each(pitches.pending_claims)
                     WHERE json_extract(json_each.value, '$.claim_status') = 'pending'
                 )
                 ORDER BY id",
                PITCH_COLUMNS
            ),
            params![],
        )
    }

    fn query_pitches(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Pitch>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare pitch query")?;
        let rows = stmt
            .query_map(params, PitchRow::from_row)
            .context("Failed to query pitches")?;
        let mut pitches = Vec::new();
        for row in rows {
            let r = row.context("Failed to read pitch row")?;
            pitches.push(r.into_pitch()?);
        }
        Ok(pitches)
    }
}

/// JSON/text encodings of the non-scalar pitch fields.
struct EncodedPitch {
    deadline: Option<String>,
    topics: String,
    team_capacities: String,
    editors: String,
    assignment_contributors: String,
    pending_claims: String,
    issue_statuses: String,
}

impl EncodedPitch {
    fn new(pitch: &Pitch) -> Result<Self> {
        Ok(Self {
            deadline: pitch.details.deadline.map(|d| d.to_rfc3339()),
            topics: serde_json::to_string(&pitch.details.topics)
                .context("Failed to encode topics")?,
            team_capacities: serde_json::to_string(&pitch.team_capacities)
                .context("Failed to encode team capacities")?,
            editors: serde_json::to_string(&pitch.editors).context("Failed to encode editors")?,
            assignment_contributors: serde_json::to_string(&pitch.assignment_contributors)
                .context("Failed to encode assignments")?,
            pending_claims: serde_json::to_string(&pitch.pending_claims)
                .context("Failed to encode pending claims")?,
            issue_statuses: serde_json::to_string(&pitch.issue_statuses)
                .context("Failed to encode issue statuses")?,
        })
    }
}

/// Intermediate row struct for pitches.
struct PitchRow {
    id: i64,
    author_id: String,
    title: String,
    description: String,
    deadline: Option<String>,
    topics: String,
    conflict_of_interest: bool,
    is_internal: bool,
    status: String,
    team_capacities: String,
    writer: Option<String>,
    editors: String,
    assignment_contributors: String,
    pending_claims: String,
    issue_statuses: String,
    needs_writer: bool,
    needs_primary_editor: bool,
    reviewed_by: Option<String>,
    review_reasoning: Option<String>,
    revision: i64,
    created_at: String,
    updated_at: String,
}

impl PitchRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            author_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            deadline: row.get(4)?,
            topics: row.get(5)?,
            conflict_of_interest: row.get(6)?,
            is_internal: row.get(7)?,
            status: row.get(8)?,
            team_capacities: row.get(9)?,
            writer: row.get(10)?,
            editors: row.get(11)?,
            assignment_contributors: row.get(12)?,
            pending_claims: row.get(13)?,
            issue_statuses: row.get(14)?,
            needs_writer: row.get(15)?,
            needs_primary_editor: row.get(16)?,
            reviewed_by: row.get(17)?,
            review_reasoning: row.get(18)?,
            revision: row.get(19)?,
            created_at: row.get(20)?,
            updated_at: row.get(21)?,
        })
    }

    fn into_pitch(self) -> Result<Pitch> {
        let status = PitchStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse pitch status")?;
        let deadline = self
            .deadline
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .context("Failed to parse pitch deadline")?;

        Ok(Pitch {
            id: self.id,
            author_id: self.author_id,
            details: PitchDetails {
                title: self.title,
                description: self.description,
                deadline,
                topics: serde_json::from_str(&self.topics).context("Failed to parse topics JSON")?,
                conflict_of_interest: self.conflict_of_interest,
                is_internal: self.is_internal,
            },
            status,
            team_capacities: serde_json::from_str(&self.team_capacities)
                .context("Failed to parse team capacities JSON")?,
            writer: self.writer,
            editors: serde_json::from_str(&self.editors).context("Failed to parse editors JSON")?,
            assignment_contributors: serde_json::from_str(&self.assignment_contributors)
                .context("Failed to parse assignments JSON")?,
            pending_claims: serde_json::from_str(&self.pending_claims)
                .context("Failed to parse pending claims JSON")?,
            issue_statuses: serde_json::from_str(&self.issue_statuses)
                .context("Failed to parse issue statuses JSON")?,
            needs_writer: self.needs_writer,
            needs_primary_editor: self.needs_primary_editor,
            reviewed_by: self.reviewed_by,
            review_reasoning: self.review_reasoning,
            revision: self.revision,
            created_at: parse_timestamp(&self.created_at).context("Failed to parse created_at")?,
            updated_at: parse_timestamp(&self.updated_at).context("Failed to parse updated_at")?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

// ── Tests ─────────────────────────────────────────────────────────────
