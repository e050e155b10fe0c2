//! `WebSocket` handler for display and operator clients.
//!
//! Clients connect to `GET /ws`, optionally with `?token=<session token>`.
//! Each connection first receives a bootstrap snapshot, then every event
//! published by the [`Broadcaster`](callsys_core::broadcaster::Broadcaster).
//! Anonymous clients only see public events; a valid token adds the
//! operator log.
//!
//! If a client falls behind, lagged events are skipped and the client
//! resumes from the most recent one.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use callsys_types::{Audience, BroadcastEvent};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Query of `GET /ws`.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session token for the privileged channel.
    pub token: Option<String>,
}

/// Upgrade to a `WebSocket` and start streaming events.
///
/// A token that does not resolve to a live session is rejected before
/// the upgrade.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_events(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let audience = match params.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            let session = state.system().auth().authenticate(token).await?;
            debug!(username = %session.username, "privileged WebSocket client");
            Audience::Privileged
        }
        None => Audience::Public,
    };
    Ok(ws
        .on_upgrade(move |socket| handle_ws(socket, state, audience))
        .into_response())
}

/// Whether `event` may be delivered to a client on `audience`.
pub fn visible_to(event: &BroadcastEvent, audience: Audience) -> bool {
    audience == Audience::Privileged || event.audience() == Audience::Public
}

async fn send_event(socket: &mut WebSocket, event: &BroadcastEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize broadcast event: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Subscribe, send the bootstrap snapshot, then forward events until the
/// client leaves.
async fn handle_ws(mut socket: WebSocket, state: AppState, audience: Audience) {
    debug!(?audience, "WebSocket client connected");

    // Subscribe before the snapshot so nothing between the two is lost.
    let mut rx = state.system().broadcaster().subscribe();

    match state.system().snapshot(audience).await {
        Ok(snapshot) => {
            if !send_event(&mut socket, &BroadcastEvent::Bootstrap(Box::new(snapshot))).await {
                debug!("WebSocket client disconnected (bootstrap failed)");
                return;
            }
        }
        Err(e) => {
            warn!(error = %e, "bootstrap snapshot failed, closing WebSocket");
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !visible_to(&event, audience) {
                            continue;
                        }
                        if !send_event(&mut socket, &event).await {
                            debug!("WebSocket client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use callsys_types::AdminLogEntry;
    use chrono::Utc;

    use super::*;

    #[test]
    fn operator_log_is_privileged_only() {
        let log = BroadcastEvent::AdminLog(AdminLogEntry {
            at: Utc::now(),
            operator: "alice".to_owned(),
            message: "called A1".to_owned(),
        });
        assert!(!visible_to(&log, Audience::Public));
        assert!(visible_to(&log, Audience::Privileged));

        let sound = BroadcastEvent::SoundSetting { enabled: true };
        assert!(visible_to(&sound, Audience::Public));
    }
}
