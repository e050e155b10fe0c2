//! Operator REST handlers.
//!
//! Every endpoint here needs an `Authorization: Bearer <token>` header
//! from `POST /api/auth/login`. The role check happens in the queue core.
//!
//! # Endpoints
//!
//! | Method | Path | Permission |
//! |--------|------|------------|
//! | `POST` | `/api/auth/login` | none |
//! | `POST` | `/api/auth/logout` | session |
//! | `GET` | `/api/auth/me` | session |
//! | `POST` | `/api/lines` | admin |
//! | `DELETE` | `/api/lines/{id}` | admin |
//! | `POST` | `/api/lines/{id}/call` | call |
//! | `PUT` | `/api/lines/{id}/current` | call |
//! | `POST` | `/api/lines/{id}/issue` | issue |
//! | `PUT` | `/api/lines/{id}/issued` | issue |
//! | `POST` | `/api/lines/{id}/pass` | pass |
//! | `POST` | `/api/lines/{id}/recall` | recall |
//! | `POST` | `/api/lines/{id}/passed` | recall |
//! | `DELETE` | `/api/lines/{id}/passed` | recall |
//! | `DELETE` | `/api/lines/{id}/passed/{number}` | recall |
//! | `POST` | `/api/lines/{id}/reset` | settings |
//! | `POST` | `/api/lines/{id}/appointments` | appointment |
//! | `GET` | `/api/appointments` | appointment |
//! | `DELETE` | `/api/appointments/{id}` | appointment |
//! | `PUT` | `/api/settings/public` | settings |
//! | `PUT` | `/api/settings/sound` | settings |
//! | `PUT` | `/api/settings/mode` | settings |
//! | `POST` | `/api/featured` | settings |
//! | `DELETE` | `/api/featured` | settings |
//! | `POST` | `/api/announce` | settings |
//! | `GET` | `/api/history` | session |
//! | `GET` | `/api/stats/daily` | session |
//! | `GET` | `/api/admin-log` | session |
//! | `DELETE` | `/api/admin-log` | settings |

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use callsys_types::{AppointmentId, Direction, LineId, SystemMode};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::error::ApiError;
use crate::handlers::parse_line_id;
use crate::state::{AppState, bearer_token};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body of `POST /api/auth/login`.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Login name.
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    /// Login password.
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

/// Body of `POST /api/lines`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLineRequest {
    /// Display name.
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    /// Subscriber-facing code.
    #[validate(length(min = 1, max = 8))]
    pub prefix: String,
    /// Display color (`#rgb` or `#rrggbb`).
    #[serde(default = "default_color")]
    #[validate(length(min = 4, max = 7))]
    pub color: String,
}

fn default_color() -> String {
    "#2563eb".to_owned()
}

/// Body of the call and issue commands.
#[derive(Debug, Deserialize)]
pub struct DirectionRequest {
    /// Advance or roll back.
    pub direction: Direction,
}

/// Body of the commands taking a number.
#[derive(Debug, Deserialize, Validate)]
pub struct NumberRequest {
    /// The number.
    #[validate(range(max = 999_999))]
    pub number: u64,
}

/// Body of `POST /api/lines/{id}/appointments`.
#[derive(Debug, Deserialize, Validate)]
pub struct AppointmentRequest {
    /// Reserved number.
    #[validate(range(min = 1, max = 999_999))]
    pub number: u64,
    /// When the number becomes callable.
    pub scheduled_at: DateTime<Utc>,
}

/// Query of `GET /api/appointments`.
#[derive(Debug, Deserialize)]
pub struct AppointmentQuery {
    /// Restrict to one line.
    pub line_id: Option<String>,
}

/// Body of the boolean settings.
#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    /// New value.
    pub enabled: bool,
}

/// Body of `PUT /api/settings/mode`.
#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    /// New dispensing mode.
    pub mode: SystemMode,
}

/// Body of `POST /api/featured`.
#[derive(Debug, Deserialize, Validate)]
pub struct FeaturedRequest {
    /// Link caption.
    #[validate(length(min = 1, max = 500))]
    pub link_text: String,
    /// Link target.
    #[validate(url)]
    pub link_url: String,
}

/// Query of `DELETE /api/featured`; without a URL every link is removed.
#[derive(Debug, Deserialize)]
pub struct FeaturedQuery {
    /// Link to remove.
    pub link_url: Option<String>,
}

/// Body of `POST /api/announce`.
#[derive(Debug, Deserialize, Validate)]
pub struct AnnounceRequest {
    /// Text shown on every display.
    #[validate(length(min = 1, max = 500))]
    pub message: String,
}

/// Query of the reporting endpoints.
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    /// First local date (`YYYY-MM-DD`), default today.
    pub from: Option<NaiveDate>,
    /// Last local date, default `from`.
    pub to: Option<NaiveDate>,
    /// Restrict to one line.
    pub line_id: Option<String>,
}

fn optional_line(raw: Option<&str>) -> Result<Option<LineId>, ApiError> {
    raw.map(parse_line_id).transpose()
}

fn ok() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

fn number(n: u64) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "number": n }))
}

fn numbers(ns: &[u64]) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "numbers": ns }))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Log in and receive a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let session = state
        .system()
        .auth()
        .login(&body.username, &body.password)
        .await?;
    Ok(Json(session))
}

/// Drop the caller's session.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        state.system().auth().logout(token).await?;
    }
    Ok(ok())
}

/// The caller's session.
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.session(&headers).await?))
}

// ---------------------------------------------------------------------------
// Lines
// ---------------------------------------------------------------------------

/// Create a line.
pub async fn create_line(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateLineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    body.validate()?;
    let line = state
        .system()
        .create_line(&session, &body.name, &body.prefix, &body.color)
        .await?;
    Ok(Json(line))
}

/// Delete a line.
pub async fn delete_line(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    state
        .system()
        .delete_line(&session, parse_line_id(&id)?)
        .await?;
    Ok(ok())
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Call the next number or go back one.
pub async fn call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<DirectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    let outcome = state
        .system()
        .call(&session, parse_line_id(&id)?, body.direction)
        .await?;
    Ok(number(outcome.number))
}

/// Set the current number.
pub async fn set_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<NumberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    body.validate()?;
    let outcome = state
        .system()
        .set_call(&session, parse_line_id(&id)?, body.number)
        .await?;
    Ok(number(outcome.number))
}

/// Issue the next ticket or withdraw the last.
pub async fn issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<DirectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    let outcome = state
        .system()
        .issue(&session, parse_line_id(&id)?, body.direction)
        .await?;
    Ok(number(outcome.number))
}

/// Set the issued number.
pub async fn set_issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<NumberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    body.validate()?;
    let outcome = state
        .system()
        .set_issue(&session, parse_line_id(&id)?, body.number)
        .await?;
    Ok(number(outcome.number))
}

/// Pass the current number.
pub async fn pass_current(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    let outcome = state
        .system()
        .pass_current(&session, parse_line_id(&id)?)
        .await?;
    Ok(number(outcome.number))
}

/// Recall a passed number.
pub async fn recall(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<NumberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    body.validate()?;
    let outcome = state
        .system()
        .recall_passed(&session, parse_line_id(&id)?, body.number)
        .await?;
    Ok(number(outcome.number))
}

/// Add a number to the passed list.
pub async fn add_passed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<NumberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    body.validate()?;
    let list = state
        .system()
        .add_passed(&session, parse_line_id(&id)?, body.number)
        .await?;
    Ok(numbers(&list))
}

/// Remove one number from the passed list.
pub async fn remove_passed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, n)): Path<(String, u64)>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    let list = state
        .system()
        .remove_passed(&session, parse_line_id(&id)?, n)
        .await?;
    Ok(numbers(&list))
}

/// Clear the passed list.
pub async fn clear_passed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    state
        .system()
        .clear_passed(&session, parse_line_id(&id)?)
        .await?;
    Ok(ok())
}

/// Reset a line.
pub async fn reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    state.system().reset(&session, parse_line_id(&id)?).await?;
    Ok(ok())
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

/// Reserve a number for a scheduled time.
pub async fn add_appointment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AppointmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    body.validate()?;
    let appointment = state
        .system()
        .add_appointment(&session, parse_line_id(&id)?, body.number, body.scheduled_at)
        .await?;
    Ok(Json(appointment))
}

/// List appointments.
pub async fn list_appointments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AppointmentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    let line_id = optional_line(params.line_id.as_deref())?;
    let appointments = state
        .system()
        .list_appointments(&session, line_id)
        .await?;
    Ok(Json(serde_json::json!({
        "count": appointments.len(),
        "appointments": appointments,
    })))
}

/// Delete an appointment.
pub async fn remove_appointment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    let appointment_id: AppointmentId = id
        .parse()
        .map_err(|e| ApiError::InvalidId(format!("appointment {id}: {e}")))?;
    state
        .system()
        .remove_appointment(&session, appointment_id)
        .await?;
    Ok(ok())
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Open or close the system.
pub async fn set_public(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ToggleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    state.system().set_public(&session, body.enabled).await?;
    Ok(ok())
}

/// Toggle display sounds.
pub async fn set_sound(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ToggleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    state.system().set_sound(&session, body.enabled).await?;
    Ok(ok())
}

/// Switch the dispensing mode.
pub async fn set_mode(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ModeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    state.system().set_mode(&session, body.mode).await?;
    Ok(ok())
}

/// Add or replace a featured link.
pub async fn add_featured(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<FeaturedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    body.validate()?;
    state
        .system()
        .add_featured(&session, &body.link_text, &body.link_url)
        .await?;
    Ok(ok())
}

/// Remove one featured link, or all of them.
pub async fn remove_featured(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<FeaturedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    match params.link_url.as_deref() {
        Some(url) => state.system().remove_featured(&session, url).await?,
        None => state.system().clear_featured(&session).await?,
    }
    Ok(ok())
}

/// Push an announcement to every display.
pub async fn announce(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AnnounceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    body.validate()?;
    state.system().announce(&session, &body.message).await?;
    Ok(ok())
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// History records of a date range.
pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ReportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.session(&headers).await?;
    let today = state.system().clock().date(Utc::now());
    let from = params.from.unwrap_or(today);
    let to = params.to.unwrap_or(from);
    let line_id = optional_line(params.line_id.as_deref())?;
    let records = state.system().history(from, to, line_id).await?;
    Ok(Json(serde_json::json!({
        "count": records.len(),
        "records": records,
    })))
}

/// Hourly call counts of one day (`from`, default today).
pub async fn daily_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ReportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.session(&headers).await?;
    let date = params
        .from
        .unwrap_or_else(|| state.system().clock().date(Utc::now()));
    let line_id = optional_line(params.line_id.as_deref())?;
    Ok(Json(state.system().daily_stats(date, line_id).await?))
}

/// Operator log, newest first.
pub async fn admin_log(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.session(&headers).await?;
    Ok(Json(state.system().admin_log().await?))
}

/// Delete the operator log.
pub async fn clear_admin_log(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&headers).await?;
    state.system().clear_admin_log(&session).await?;
    Ok(ok())
}
