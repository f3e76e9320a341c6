use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use tokio::sync::broadcast;

use super::engine::WorkflowEngine;
use super::models::*;
use super::ws::{FeedEvent, WsMessage, broadcast_message, ws_handler};
use crate::errors::{ErrorKind, WorkflowError};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub engine: WorkflowEngine,
    pub ws_tx: broadcast::Sender<FeedEvent>,
}

pub type SharedState = Arc<AppState>;

// ── Actor identity ────────────────────────────────────────────────────

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Caller roles, lowest privilege first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Contributor,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contributor => "contributor",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contributor" => Ok(Self::Contributor),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// The authenticated caller, as asserted by the upstream gateway.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: ContributorId,
    pub role: Role,
}

impl Actor {
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.role < role {
            return Err(ApiError::Forbidden(format!(
                "{} role required, caller is {}",
                role.as_str(),
                self.role.as_str()
            )));
        }
        Ok(())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let id = header(ACTOR_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", ACTOR_ID_HEADER)))?;
        let role = header(ACTOR_ROLE_HEADER)
            .ok_or_else(|| {
                ApiError::Unauthorized(format!("missing {} header", ACTOR_ROLE_HEADER))
            })?
            .parse::<Role>()
            .map_err(ApiError::Unauthorized)?;
        Ok(Actor {
            id: id.to_string(),
            role,
        })
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListPitchesQuery {
    pub status: Option<String>,
}

/// For operations without a body (declines and DELETEs).
#[derive(Deserialize)]
pub struct RevisionQuery {
    pub expected_revision: Option<i64>,
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    #[serde(flatten)]
    pub plan: ApprovalPlan,
    pub expected_revision: Option<i64>,
}

#[derive(Deserialize)]
pub struct DeclineRequest {
    pub reasoning: Option<String>,
    pub expected_revision: Option<i64>,
}

#[derive(Deserialize)]
pub struct SubmitClaimRequest {
    pub teams: Vec<TeamId>,
    #[serde(default)]
    pub message: String,
    pub expected_revision: Option<i64>,
}

#[derive(Deserialize)]
pub struct ApproveClaimRequest {
    pub teams: Vec<TeamId>,
    pub expected_revision: Option<i64>,
}

#[derive(Deserialize)]
pub struct SetTargetRequest {
    pub target: i64,
    pub expected_revision: Option<i64>,
}

#[derive(Deserialize)]
pub struct AssignWriterRequest {
    pub contributor_id: ContributorId,
    pub expected_revision: Option<i64>,
}

#[derive(Deserialize)]
pub struct AssignEditorRequest {
    pub contributor_id: ContributorId,
    pub editor_type: EditorType,
    pub expected_revision: Option<i64>,
}

#[derive(Deserialize)]
pub struct ChangeEditorTypeRequest {
    pub from: EditorType,
    pub to: EditorType,
    pub expected_revision: Option<i64>,
}

#[derive(Deserialize)]
pub struct AddToIssueRequest {
    pub issue_id: IssueId,
    pub status: IssueStatus,
    pub expected_revision: Option<i64>,
}

#[derive(Deserialize)]
pub struct SetIssueStatusRequest {
    pub status: IssueStatus,
    pub expected_revision: Option<i64>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    Workflow(WorkflowError),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        ApiError::Workflow(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// ── Extractors ────────────────────────────────────────────────────────
//
// Thin wrappers over axum's extractors so a malformed body, query string or
// path segment is answered with the same `{error, kind}` JSON as every other
// failure.

pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState
        | ErrorKind::DuplicateClaim
        | ErrorKind::Duplicate
        | ErrorKind::CapacityExhausted
        | ErrorKind::SlotOccupied
        | ErrorKind::ConcurrencyConflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Workflow(e) => {
                let kind = e.kind();
                let message = match kind {
                    // Storage details stay in the log.
                    ErrorKind::Internal => {
                        tracing::error!(error = %e, "internal error serving request");
                        "internal error".to_string()
                    }
                    _ => e.to_string(),
                };
                (status_for(kind), kind.as_str(), message)
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorKind::Validation.as_str(), msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
        };
        (
            status,
            Json(serde_json::json!({"error": message, "kind": kind})),
        )
            .into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/pitches", get(list_pitches).post(submit_pitch))
        .route("/api/pitches/open", get(list_open_pitches))
        .route("/api/pitches/review-queue", get(review_queue))
        .route("/api/contributors/{id}/pitches", get(list_contributor_pitches))
        .route("/api/pitches/{id}", get(get_pitch))
        .route("/api/pitches/{id}/open-teams", get(get_open_teams))
        .route("/api/pitches/{id}/approve", post(approve_pitch))
        .route("/api/pitches/{id}/decline", post(decline_pitch))
        .route(
            "/api/pitches/{id}/claims",
            get(list_pending_claims).post(submit_claim),
        )
        .route(
            "/api/pitches/{id}/claims/{contributor}/approve",
            post(approve_claim),
        )
        .route(
            "/api/pitches/{id}/claims/{contributor}/decline",
            post(decline_claim),
        )
        .route("/api/pitches/{id}/teams/{team}", put(set_target))
        .route(
            "/api/pitches/{id}/teams/{team}/contributors/{contributor}",
            axum::routing::delete(remove_contributor),
        )
        .route(
            "/api/pitches/{id}/writer",
            put(assign_writer).delete(clear_writer),
        )
        .route("/api/pitches/{id}/editors", post(assign_editor))
        .route(
            "/api/pitches/{id}/editors/{contributor}",
            axum::routing::patch(change_editor_type).delete(remove_editor),
        )
        .route("/api/pitches/{id}/issues", post(add_to_issue))
        .route(
            "/api/pitches/{id}/issues/{issue}",
            put(set_issue_status).delete(remove_from_issue),
        )
        .route("/api/issues/{issue}/board", get(issue_board))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Broadcast a roster or claim change and hand the pitch back.
fn updated(state: &SharedState, op: &str, pitch: Pitch) -> Json<Pitch> {
    publish_update(state, op, None, pitch)
}

/// Like [`updated`], for edits to one issue's board.
fn updated_in_issue(state: &SharedState, op: &str, issue_id: &str, pitch: Pitch) -> Json<Pitch> {
    publish_update(state, op, Some(issue_id.to_string()), pitch)
}

fn publish_update(
    state: &SharedState,
    op: &str,
    issue_id: Option<IssueId>,
    pitch: Pitch,
) -> Json<Pitch> {
    broadcast_message(
        &state.ws_tx,
        &WsMessage::PitchUpdated {
            op: op.to_string(),
            issue_id,
            pitch: pitch.clone(),
        },
    );
    Json(pitch)
}

fn reviewed(state: &SharedState, pitch: Pitch) -> Json<Pitch> {
    broadcast_message(
        &state.ws_tx,
        &WsMessage::PitchReviewed {
            pitch: pitch.clone(),
        },
    );
    Json(pitch)
}

// ── Handlers: reads ───────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_pitches(
    State(state): State<SharedState>,
    actor: Actor,
    ApiQuery(query): ApiQuery<ListPitchesQuery>,
) -> Result<Json<Vec<Pitch>>, ApiError> {
    actor.require(Role::Contributor)?;
    let status = query
        .status
        .as_deref()
        .map(PitchStatus::from_str)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    Ok(Json(state.engine.list_pitches(status).await?))
}

async fn list_open_pitches(
    State(state): State<SharedState>,
    actor: Actor,
) -> Result<Json<Vec<Pitch>>, ApiError> {
    actor.require(Role::Contributor)?;
    Ok(Json(state.engine.list_open_pitches().await?))
}

async fn review_queue(
    State(state): State<SharedState>,
    actor: Actor,
) -> Result<Json<Vec<Pitch>>, ApiError> {
    actor.require(Role::Staff)?;
    Ok(Json(state.engine.list_pitches_with_pending_claims().await?))
}

async fn list_contributor_pitches(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(contributor_id): ApiPath<String>,
) -> Result<Json<Vec<Pitch>>, ApiError> {
    actor.require(Role::Contributor)?;
    Ok(Json(
        state
            .engine
            .list_pitches_for_contributor(&contributor_id)
            .await?,
    ))
}

async fn get_pitch(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(id): ApiPath<PitchId>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Contributor)?;
    Ok(Json(state.engine.get_pitch(id).await?))
}

async fn get_open_teams(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(id): ApiPath<PitchId>,
) -> Result<Json<OpenTeamsView>, ApiError> {
    actor.require(Role::Contributor)?;
    Ok(Json(state.engine.open_teams(id).await?))
}

async fn list_pending_claims(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(id): ApiPath<PitchId>,
) -> Result<Json<Vec<PendingClaim>>, ApiError> {
    actor.require(Role::Staff)?;
    Ok(Json(state.engine.pending_claims(id).await?))
}

async fn issue_board(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(issue_id): ApiPath<String>,
) -> Result<Json<IssueBoard>, ApiError> {
    actor.require(Role::Contributor)?;
    Ok(Json(state.engine.issue_board(&issue_id).await?))
}

// ── Handlers: lifecycle ───────────────────────────────────────────────

async fn submit_pitch(
    State(state): State<SharedState>,
    actor: Actor,
    ApiJson(details): ApiJson<PitchDetails>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require(Role::Contributor)?;
    let pitch = state.engine.submit(&actor.id, details).await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::PitchSubmitted {
            pitch: pitch.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(pitch)))
}

async fn approve_pitch(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(id): ApiPath<PitchId>,
    ApiJson(req): ApiJson<ApproveRequest>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Admin)?;
    let pitch = state
        .engine
        .approve(id, &actor.id, req.plan, req.expected_revision)
        .await?;
    Ok(reviewed(&state, pitch))
}

async fn decline_pitch(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(id): ApiPath<PitchId>,
    ApiJson(req): ApiJson<DeclineRequest>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Admin)?;
    let pitch = state
        .engine
        .decline(id, &actor.id, req.reasoning, req.expected_revision)
        .await?;
    Ok(reviewed(&state, pitch))
}

// ── Handlers: claims ──────────────────────────────────────────────────

async fn submit_claim(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(id): ApiPath<PitchId>,
    ApiJson(req): ApiJson<SubmitClaimRequest>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Contributor)?;
    let pitch = state
        .engine
        .submit_claim(id, &actor.id, req.teams, &req.message, req.expected_revision)
        .await?;
    Ok(updated(&state, "submit_claim", pitch))
}

async fn approve_claim(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath((id, contributor_id)): ApiPath<(PitchId, String)>,
    ApiJson(req): ApiJson<ApproveClaimRequest>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Staff)?;
    let pitch = state
        .engine
        .approve_claim(id, &contributor_id, req.teams, req.expected_revision)
        .await?;
    Ok(updated(&state, "approve_claim", pitch))
}

async fn decline_claim(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath((id, contributor_id)): ApiPath<(PitchId, String)>,
    ApiQuery(query): ApiQuery<RevisionQuery>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Staff)?;
    let pitch = state
        .engine
        .decline_claim(id, &contributor_id, query.expected_revision)
        .await?;
    Ok(updated(&state, "decline_claim", pitch))
}

// ── Handlers: roster ──────────────────────────────────────────────────

async fn remove_contributor(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath((id, team_id, contributor_id)): ApiPath<(PitchId, String, String)>,
    ApiQuery(query): ApiQuery<RevisionQuery>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Staff)?;
    let pitch = state
        .engine
        .remove_contributor(id, &contributor_id, &team_id, query.expected_revision)
        .await?;
    Ok(updated(&state, "remove_contributor", pitch))
}

async fn set_target(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath((id, team_id)): ApiPath<(PitchId, String)>,
    ApiJson(req): ApiJson<SetTargetRequest>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Staff)?;
    let target = u32::try_from(req.target).map_err(|_| {
        ApiError::BadRequest(format!("target must be between 0 and {}", u32::MAX))
    })?;
    let pitch = state
        .engine
        .set_target(id, &team_id, target, req.expected_revision)
        .await?;
    Ok(updated(&state, "set_target", pitch))
}

async fn assign_writer(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(id): ApiPath<PitchId>,
    ApiJson(req): ApiJson<AssignWriterRequest>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Staff)?;
    let pitch = state
        .engine
        .assign_writer(id, &req.contributor_id, req.expected_revision)
        .await?;
    Ok(updated(&state, "assign_writer", pitch))
}

async fn clear_writer(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(id): ApiPath<PitchId>,
    ApiQuery(query): ApiQuery<RevisionQuery>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Staff)?;
    let pitch = state
        .engine
        .clear_writer(id, query.expected_revision)
        .await?;
    Ok(updated(&state, "clear_writer", pitch))
}

async fn assign_editor(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(id): ApiPath<PitchId>,
    ApiJson(req): ApiJson<AssignEditorRequest>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Staff)?;
    let pitch = state
        .engine
        .assign_editor(id, &req.contributor_id, req.editor_type, req.expected_revision)
        .await?;
    Ok(updated(&state, "assign_editor", pitch))
}

async fn change_editor_type(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath((id, contributor_id)): ApiPath<(PitchId, String)>,
    ApiJson(req): ApiJson<ChangeEditorTypeRequest>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Staff)?;
    let pitch = state
        .engine
        .change_editor_type(id, &contributor_id, req.from, req.to, req.expected_revision)
        .await?;
    Ok(updated(&state, "change_editor_type", pitch))
}

async fn remove_editor(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath((id, contributor_id)): ApiPath<(PitchId, String)>,
    ApiQuery(query): ApiQuery<RevisionQuery>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Staff)?;
    let pitch = state
        .engine
        .remove_editor(id, &contributor_id, query.expected_revision)
        .await?;
    Ok(updated(&state, "remove_editor", pitch))
}

// ── Handlers: issues ──────────────────────────────────────────────────

async fn add_to_issue(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath(id): ApiPath<PitchId>,
    ApiJson(req): ApiJson<AddToIssueRequest>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Admin)?;
    let pitch = state
        .engine
        .add_to_issue(id, &req.issue_id, req.status, req.expected_revision)
        .await?;
    Ok(updated_in_issue(&state, "add_to_issue", &req.issue_id, pitch))
}

async fn set_issue_status(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath((id, issue_id)): ApiPath<(PitchId, String)>,
    ApiJson(req): ApiJson<SetIssueStatusRequest>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Admin)?;
    let pitch = state
        .engine
        .set_issue_status(id, &issue_id, req.status, req.expected_revision)
        .await?;
    Ok(updated_in_issue(&state, "set_issue_status", &issue_id, pitch))
}

async fn remove_from_issue(
    State(state): State<SharedState>,
    actor: Actor,
    ApiPath((id, issue_id)): ApiPath<(PitchId, String)>,
    ApiQuery(query): ApiQuery<RevisionQuery>,
) -> Result<Json<Pitch>, ApiError> {
    actor.require(Role::Admin)?;
    let pitch = state
        .engine
        .remove_from_issue(id, &issue_id, query.expected_revision)
        .await?;
    Ok(updated_in_issue(&state, "remove_from_issue", &issue_id, pitch))
}

// ── Tests ─────────────────────────────────────────────────────────────
