//! Public REST handlers: status page, snapshot, lines and ticket intake.
//!
//! None of these require credentials. Operator commands live in
//! [`crate::operator`], chat-bot commands in [`crate::bot`].

use std::fmt::Write as _;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse};
use callsys_types::{Audience, LineId};

use crate::error::ApiError;
use crate::state::{AppState, caller_key};

/// Parse a line id from a path segment.
pub fn parse_line_id(raw: &str) -> Result<LineId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::InvalidId(format!("line {raw}: {e}")))
}

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

/// Minimal HTML status page listing every line.
pub async fn index(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.system().snapshot(Audience::Public).await?;
    let status = if snapshot.is_public { "open" } else { "closed" };

    let mut rows = String::new();
    for l in &snapshot.lines {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}{}</td><td>{}</td><td>{} min</td></tr>",
            l.line.name,
            l.line.prefix,
            l.state.current,
            l.state.waiting(),
            l.wait_minutes
        );
    }

    Ok(Html(format!(
        "<!DOCTYPE html>\n<html><head><title>callsys</title></head><body>\
         <h1>callsys</h1><p>System is {status}, mode {mode}.</p>\
         <table><tr><th>Line</th><th>Serving</th><th>Waiting</th><th>Wait</th></tr>{rows}</table>\
         <p><a href=\"/api/snapshot\">/api/snapshot</a> &middot; <code>/ws</code></p>\
         </body></html>",
        mode = snapshot.mode.as_str(),
    )))
}

// ---------------------------------------------------------------------------
// GET /api/snapshot
// ---------------------------------------------------------------------------

/// Public state of every line and the display settings.
pub async fn snapshot(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.system().snapshot(Audience::Public).await?))
}

// ---------------------------------------------------------------------------
// GET /api/lines
// ---------------------------------------------------------------------------

/// All lines, oldest first.
pub async fn list_lines(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let lines = state.system().lines().list().await?;
    Ok(Json(serde_json::json!({
        "count": lines.len(),
        "lines": lines,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/lines/{id}/passed
// ---------------------------------------------------------------------------

/// Passed numbers of a line.
pub async fn list_passed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let numbers = state.system().passed(parse_line_id(&id)?).await?;
    Ok(Json(serde_json::json!({ "numbers": numbers })))
}

// ---------------------------------------------------------------------------
// POST /api/lines/{id}/ticket
// ---------------------------------------------------------------------------

/// Self-service ticket; rate-limited per client address.
pub async fn take_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let line_id = parse_line_id(&id)?;
    let outcome = state
        .system()
        .take_ticket(&caller_key(&headers), line_id)
        .await?;
    Ok(Json(serde_json::json!({ "number": outcome.number })))
}

// ---------------------------------------------------------------------------
// GET /api/featured
// ---------------------------------------------------------------------------

/// Featured links shown on displays.
pub async fn list_featured(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.system().featured().await?))
}
