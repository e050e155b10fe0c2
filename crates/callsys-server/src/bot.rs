//! Chat-bot adapter endpoints.
//!
//! The adapter parses the user's message, then calls one of these with the
//! shared `x-bot-token` header. Replies carry the rendered confirmation
//! text to send back to the user.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde::Deserialize;
use validator::Validate;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /api/bot/subscribe`.
#[derive(Debug, Deserialize, Validate)]
pub struct SubscribeRequest {
    /// Chat platform user id.
    #[validate(length(min = 1, max = 128))]
    pub subscriber_id: String,
    /// Line prefix the number belongs to.
    #[validate(length(min = 1, max = 8))]
    pub prefix: String,
    /// Number to follow.
    #[validate(range(min = 1, max = 999_999))]
    pub number: u64,
}

/// Body of `POST /api/bot/cancel`.
#[derive(Debug, Deserialize, Validate)]
pub struct CancelRequest {
    /// Chat platform user id.
    #[validate(length(min = 1, max = 128))]
    pub subscriber_id: String,
}

/// Follow a number.
pub async fn subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.verify_bot(&headers)?;
    body.validate()?;
    let status = state
        .system()
        .subscribe(&body.subscriber_id, &body.prefix, body.number)
        .await?;
    Ok(Json(status))
}

/// Stop following.
pub async fn cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CancelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.verify_bot(&headers)?;
    body.validate()?;
    let status = state
        .system()
        .cancel_subscription(&body.subscriber_id)
        .await?;
    Ok(Json(serde_json::json!({ "cancelled": status })))
}

/// The subscriber's live target, `null` when none.
pub async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(subscriber_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.verify_bot(&headers)?;
    let status = state.system().query_subscription(&subscriber_id).await?;
    Ok(Json(serde_json::json!({ "subscription": status })))
}

/// Passed numbers of the line with `prefix`.
pub async fn passed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(prefix): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.verify_bot(&headers)?;
    let numbers = state.system().passed_by_prefix(&prefix).await?;
    Ok(Json(serde_json::json!({
        "prefix": prefix.to_ascii_uppercase(),
        "numbers": numbers,
    })))
}
