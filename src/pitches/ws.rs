//! Change feed for production boards and the notification service.
//!
//! `GET /ws` streams every pitch change. `?pitch_id=` narrows the stream to
//! one pitch and `?issue=` to pitches on one issue's board; both may be given.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

use super::api::{ApiQuery, AppState};
use super::models::{IssueId, Pitch, PitchId};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// A board that stays silent this long after a Ping is dropped.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Feed entries. Pitch-bearing variants carry the full updated aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    PitchSubmitted {
        pitch: Pitch,
    },
    /// Approved or declined.
    PitchReviewed {
        pitch: Pitch,
    },
    PitchUpdated {
        op: String,
        /// Issue the operation touched. Set on issue edits so a board still
        /// hears about a pitch that was just removed from it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issue_id: Option<IssueId>,
        pitch: Pitch,
    },
    /// Sent to one subscriber that fell behind; it should refetch its view.
    Resync { skipped: u64 },
}

impl WsMessage {
    pub fn pitch(&self) -> Option<&Pitch> {
        match self {
            Self::PitchSubmitted { pitch }
            | Self::PitchReviewed { pitch }
            | Self::PitchUpdated { pitch, .. } => Some(pitch),
            Self::Resync { .. } => None,
        }
    }
}

/// A serialized feed entry and the keys subscribers filter on.
#[derive(Debug, Clone)]
pub struct FeedEvent {
    pub pitch_id: PitchId,
    pub issue_ids: Vec<IssueId>,
    pub payload: Utf8Bytes,
}

impl FeedEvent {
    /// `None` for messages that are not about a pitch.
    pub fn from_message(msg: &WsMessage) -> serde_json::Result<Option<Self>> {
        let Some(pitch) = msg.pitch() else {
            return Ok(None);
        };
        let mut issue_ids: Vec<IssueId> = pitch
            .issue_statuses
            .iter()
            .map(|entry| entry.issue_id.clone())
            .collect();
        if let WsMessage::PitchUpdated {
            issue_id: Some(touched),
            ..
        } = msg
        {
            if !issue_ids.contains(touched) {
                issue_ids.push(touched.clone());
            }
        }
        Ok(Some(Self {
            pitch_id: pitch.id,
            issue_ids,
            payload: serde_json::to_string(msg)?.into(),
        }))
    }
}

/// Subscriber-side narrowing of the feed. Empty means everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedFilter {
    pub pitch_id: Option<PitchId>,
    pub issue: Option<IssueId>,
}

impl FeedFilter {
    pub fn matches(&self, event: &FeedEvent) -> bool {
        self.pitch_id.is_none_or(|id| id == event.pitch_id)
            && self
                .issue
                .as_ref()
                .is_none_or(|issue| event.issue_ids.contains(issue))
    }
}

/// Ping bookkeeping for one connection.
#[derive(Debug, Default)]
struct Keepalive {
    /// When the oldest unanswered Ping went out.
    unanswered_since: Option<Instant>,
}

impl Keepalive {
    fn expired(&self, now: Instant) -> bool {
        self.unanswered_since
            .is_some_and(|sent| now.duration_since(sent) > PONG_TIMEOUT)
    }

    fn pinged(&mut self, now: Instant) {
        self.unanswered_since.get_or_insert(now);
    }

    fn ponged(&mut self) {
        self.unanswered_since = None;
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<FeedFilter>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, filter))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, filter: FeedFilter) {
    let (sender, receiver) = socket.split();
    let rx = state.ws_tx.subscribe();
    tracing::debug!(pitch_id = ?filter.pitch_id, issue = ?filter.issue, "feed subscriber connected");
    run_socket_loop(sender, receiver, rx, filter).await;
    tracing::debug!("feed subscriber disconnected");
}

/// Forward matching feed entries to one client until it disconnects or stops
/// answering pings.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<FeedEvent>,
    filter: FeedFilter,
) {
    let mut ping_interval = tokio::time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    let mut keepalive = Keepalive::default();

    loop {
        let outbound = tokio::select! {
            _ = ping_interval.tick() => {
                let now = Instant::now();
                if keepalive.expired(now) {
                    tracing::debug!("feed subscriber stopped answering pings");
                    break;
                }
                keepalive.pinged(now);
                Message::Ping(Default::default())
            }

            event = rx.recv() => match event {
                Ok(event) if filter.matches(&event) => Message::Text(event.payload),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "feed subscriber lagged; asking it to resync");
                    match serde_json::to_string(&WsMessage::Resync { skipped }) {
                        Ok(json) => Message::Text(json.into()),
                        Err(_) => continue,
                    }
                }
                Err(RecvError::Closed) => break,
            },

            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Pong(_))) => {
                    keepalive.ponged();
                    continue;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };

        if sender.send(outbound).await.is_err() {
            break;
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

/// Publish one change-feed entry. Having no subscribers is not an error.
pub fn broadcast_message(tx: &broadcast::Sender<FeedEvent>, msg: &WsMessage) {
    match FeedEvent::from_message(msg) {
        Ok(Some(event)) => {
            let _ = tx.send(event);
        }
        Ok(None) => tracing::debug!("feed message carries no pitch; not broadcast"),
        Err(e) => tracing::error!(error = %e, "failed to serialize WsMessage"),
    }
}
