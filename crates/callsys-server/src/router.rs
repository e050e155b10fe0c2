//! Axum router construction for the callsys API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS enabled for the display and operator front ends.

use axum::Router;
use axum::routing::{delete, get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{bot, handlers, operator, ws};

/// Build the complete Axum router.
///
/// Public routes:
/// - `GET /` -- HTML status page
/// - `GET /ws` -- event stream
/// - `GET /api/snapshot`, `GET /api/lines`, `GET /api/featured`
/// - `GET /api/lines/{id}/passed`
/// - `POST /api/lines/{id}/ticket` -- self-service intake
///
/// Operator routes are listed in [`crate::operator`]; chat-bot routes live
/// under `/api/bot`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page and event stream
        .route("/", get(handlers::index))
        .route("/ws", get(ws::ws_events))
        // Public API
        .route("/api/snapshot", get(handlers::snapshot))
        .route(
            "/api/lines",
            get(handlers::list_lines).post(operator::create_line),
        )
        .route("/api/lines/{id}", delete(operator::delete_line))
        .route("/api/lines/{id}/ticket", post(handlers::take_ticket))
        .route(
            "/api/lines/{id}/passed",
            get(handlers::list_passed)
                .post(operator::add_passed)
                .delete(operator::clear_passed),
        )
        .route(
            "/api/lines/{id}/passed/{number}",
            delete(operator::remove_passed),
        )
        .route(
            "/api/featured",
            get(handlers::list_featured)
                .post(operator::add_featured)
                .delete(operator::remove_featured),
        )
        // Sessions
        .route("/api/auth/login", post(operator::login))
        .route("/api/auth/logout", post(operator::logout))
        .route("/api/auth/me", get(operator::me))
        // Counters
        .route("/api/lines/{id}/call", post(operator::call))
        .route("/api/lines/{id}/current", put(operator::set_call))
        .route("/api/lines/{id}/issue", post(operator::issue))
        .route("/api/lines/{id}/issued", put(operator::set_issue))
        .route("/api/lines/{id}/pass", post(operator::pass_current))
        .route("/api/lines/{id}/recall", post(operator::recall))
        .route("/api/lines/{id}/reset", post(operator::reset))
        // Appointments
        .route(
            "/api/lines/{id}/appointments",
            post(operator::add_appointment),
        )
        .route("/api/appointments", get(operator::list_appointments))
        .route(
            "/api/appointments/{id}",
            delete(operator::remove_appointment),
        )
        // Settings
        .route("/api/settings/public", put(operator::set_public))
        .route("/api/settings/sound", put(operator::set_sound))
        .route("/api/settings/mode", put(operator::set_mode))
        .route("/api/announce", post(operator::announce))
        // Reporting
        .route("/api/history", get(operator::history))
        .route("/api/stats/daily", get(operator::daily_stats))
        .route(
            "/api/admin-log",
            get(operator::admin_log).delete(operator::clear_admin_log),
        )
        // Chat-bot adapter
        .route("/api/bot/subscribe", post(bot::subscribe))
        .route("/api/bot/cancel", post(bot::cancel))
        .route("/api/bot/subscription/{subscriber_id}", get(bot::query))
        .route("/api/bot/passed/{prefix}", get(bot::passed))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
