// crates/server/src/hub.rs
//! WebSocket hub for job progress.
//!
//! Client frames:
//! - `{"type":"join","jobId":"..."}` subscribe this session to a job and
//!   receive anything buffered for it
//! - `{"type":"leave","jobId":"..."}` stop listening; cancels the job
//!
//! Server frames are either hub replies (`joined`, `left`, `error`, tagged by
//! `type`) or job events (tagged by `event`).

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use longrun_core::JobId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::{AppState, SessionSender};

pub const HUB_PATH: &str = "/hub/job-progress";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    Join {
        #[serde(rename = "jobId")]
        job_id: String,
    },
    Leave {
        #[serde(rename = "jobId")]
        job_id: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum HubReply {
    Joined {
        #[serde(rename = "jobId")]
        job_id: JobId,
        /// Buffered events about to be replayed.
        pending: usize,
    },
    Left {
        #[serde(rename = "jobId")]
        job_id: JobId,
    },
    Error {
        message: String,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.sessions.insert(session_id.clone(), tx.clone());
    crate::metrics::record_session_opened();
    info!(session_id = %session_id, "hub session opened");

    let forward_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => handle_text(&state, &session_id, &tx, text.as_str()),
            Message::Close(_) => break,
            _ => {}
        }
    }

    disconnect(&state, &session_id);
    forward_task.abort();
    info!(session_id = %session_id, "hub session closed");
}

fn handle_text(state: &AppState, session_id: &str, tx: &SessionSender, text: &str) {
    let result = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Join { job_id }) => {
            parse_job_id(&job_id).and_then(|id| join(state, session_id, tx, id))
        }
        Ok(ClientMessage::Leave { job_id }) => parse_job_id(&job_id).map(|id| {
            leave(state, session_id, id);
            send_reply(tx, &HubReply::Left { job_id: id });
        }),
        Err(e) => {
            debug!(session_id, error = %e, "unrecognised hub frame");
            Err(format!("invalid message: {e}"))
        }
    };

    if let Err(message) = result {
        send_reply(tx, &HubReply::Error { message });
    }
}

fn parse_job_id(raw: &str) -> Result<JobId, String> {
    raw.parse::<JobId>()
        .map_err(|_| format!("invalid job id: {raw}"))
}

/// Subscribe `session_id` to `job_id`, then release its backlog. The reply is
/// queued before the flush so it precedes the replayed events on the wire.
fn join(state: &AppState, session_id: &str, tx: &SessionSender, job_id: JobId) -> Result<(), String> {
    if state.store.get_job(&job_id).is_none() {
        return Err(format!("job not found: {job_id}"));
    }

    send_reply(
        tx,
        &HubReply::Joined {
            job_id,
            pending: state.notifications.pending(&job_id),
        },
    );

    state.connections().add(job_id, session_id);
    let flushed = state.notifications.flush(&job_id);
    info!(%job_id, session_id, flushed, "session joined job");
    Ok(())
}

/// Leaving a job abandons it: the job is cancelled and its backlog dropped.
fn leave(state: &AppState, session_id: &str, job_id: JobId) {
    let cancelled = state.store.cancel_job(&job_id);
    state.notifications.clear(&job_id);
    let owned = state.connections().remove_if_owned(&job_id, session_id);
    info!(%job_id, session_id, cancelled, owned, "session left job");
}

fn disconnect(state: &AppState, session_id: &str) {
    for job_id in state.connections().jobs_for_session(session_id) {
        leave(state, session_id, job_id);
    }
    state.sessions.remove(session_id);
}

fn send_reply(tx: &SessionSender, reply: &HubReply) {
    match serde_json::to_string(reply) {
        Ok(frame) => {
            if tx.send(frame).is_err() {
                debug!("hub reply dropped, session already closed");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize hub reply"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use longrun_core::{ChannelNotifier, ConnectionTracker, JobQueue, JobStatus, JobStore, NotificationService};
    use pretty_assertions::assert_eq;

    fn state() -> (Arc<AppState>, JobQueue) {
        let (store, queue) = JobStore::new();
        let (notifier, _rx) = ChannelNotifier::new();
        let notifications = NotificationService::new(
            Arc::new(notifier),
            Arc::new(ConnectionTracker::new()),
        );
        (AppState::new(Arc::new(store), Arc::new(notifications)), queue)
    }

    fn frames(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[test]
    fn test_join_flushes_backlog() {
        let (state, _queue) = state();
        let job = state.store.create_job("abc").unwrap().id;
        state.notifications.started(job);
        state.notifications.unit_delivered(job, "a");
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_text(&state, "s1", &tx, &format!(r#"{{"type":"join","jobId":"{job}"}}"#));

        let replies = frames(&mut rx);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["type"], "joined");
        assert_eq!(replies[0]["pending"], 2);
        assert_eq!(state.connections().session_for(&job), Some("s1".to_string()));
        assert_eq!(state.notifications.pending(&job), 0);
    }

    #[test]
    fn test_join_unknown_job() {
        let (state, _queue) = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let job = JobId::new();

        handle_text(&state, "s1", &tx, &format!(r#"{{"type":"join","jobId":"{job}"}}"#));

        let replies = frames(&mut rx);
        assert_eq!(replies[0]["type"], "error");
        assert!(!state.connections().is_connected(&job));
    }

    #[test]
    fn test_reply_to_closed_session_is_dropped() {
        let (state, _queue) = state();
        let job = state.store.create_job("abc").unwrap().id;
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        handle_text(&state, "s1", &tx, &format!(r#"{{"type":"join","jobId":"{job}"}}"#));
        handle_text(&state, "s1", &tx, "not json");

        assert_eq!(state.connections().session_for(&job), Some("s1".to_string()));
    }

    #[test]
    fn test_malformed_frames() {
        let (state, _queue) = state();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_text(&state, "s1", &tx, "not json");
        handle_text(&state, "s1", &tx, r#"{"type":"join","jobId":"nope"}"#);
        handle_text(&state, "s1", &tx, r#"{"type":"dance"}"#);

        let replies = frames(&mut rx);
        assert_eq!(replies.len(), 3);
        assert!(replies.iter().all(|r| r["type"] == "error"));
    }

    #[test]
    fn test_leave_cancels_and_clears() {
        let (state, _queue) = state();
        let job = state.store.create_job("abc").unwrap().id;
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.notifications.started(job);
        state.connections().add(job, "s1");
        assert_eq!(state.notifications.pending(&job), 1);

        handle_text(&state, "s1", &tx, &format!(r#"{{"type":"leave","jobId":"{job}"}}"#));

        let replies = frames(&mut rx);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["type"], "left");
        assert_eq!(state.store.get_job(&job).unwrap().status(), JobStatus::Cancelled);
        assert_eq!(state.notifications.pending(&job), 0);
        assert!(!state.connections().is_connected(&job));
    }

    #[test]
    fn test_disconnect_only_touches_owned_jobs() {
        let (state, _queue) = state();
        let mine = state.store.create_job("mine").unwrap().id;
        let taken = state.store.create_job("taken").unwrap().id;
        let (tx, _rx) = mpsc::unbounded_channel();
        state.sessions.insert("s1".into(), tx);
        state.connections().add(mine, "s1");
        state.connections().add(taken, "s1");
        state.connections().add(taken, "s2");

        disconnect(&state, "s1");

        assert_eq!(state.store.get_job(&mine).unwrap().status(), JobStatus::Cancelled);
        assert_eq!(state.store.get_job(&taken).unwrap().status(), JobStatus::Queued);
        assert_eq!(state.connections().session_for(&taken), Some("s2".to_string()));
        assert!(!state.sessions.contains_key("s1"));
    }
}
