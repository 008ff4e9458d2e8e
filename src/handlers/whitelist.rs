use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::bg_task::run_bounded_cycle;
use crate::handlers::auth::{require_role, Claims};
use crate::models::whitelist::{CycleReport, SubmitOutcome, WhitelistRequest};
use crate::utils::is_valid_player_name;
use crate::AppState;

// Submit a whitelist request (public)
#[utoipa::path(
    post,
    path = "/api/whitelist",
    request_body = WhitelistRequest,
    responses(
        (status = 201, description = "Player whitelisted"),
        (status = 202, description = "Registry unavailable, request queued for retry"),
        (status = 400, description = "Invalid player name"),
        (status = 409, description = "Player already whitelisted"),
        (status = 500, description = "Request could not be recorded")
    )
)]
pub async fn submit_whitelist(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WhitelistRequest>,
) -> impl IntoResponse {
    let player_name = payload.player_name.trim();
    let requester_id = payload.requester_id.trim();
    if !is_valid_player_name(player_name) || requester_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid player name or requester" })),
        );
    }
    let request = WhitelistRequest::new(requester_id, player_name);
    let player_name = request.player_name.clone();

    match state.engine.submit(request).await {
        Ok(SubmitOutcome::AlreadyConfirmed) => (
            StatusCode::CONFLICT,
            Json(json!({
                "status": "already_whitelisted",
                "message": format!("Player `{}` is already whitelisted.", player_name)
            })),
        ),
        Ok(SubmitOutcome::Accepted { now_confirmed: true }) => (
            StatusCode::CREATED,
            Json(json!({
                "status": "whitelisted",
                "message": format!("Player `{}` has been added to the whitelist.", player_name)
            })),
        ),
        Ok(SubmitOutcome::Accepted { now_confirmed: false }) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "pending",
                "message": format!("Player `{}` will be added once the server is reachable.", player_name)
            })),
        ),
        Err(e) => {
            tracing::error!("Failed to record whitelist request for {}: {}", player_name, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Request could not be recorded, please try again" })),
            )
        }
    }
}

// Confirmed players, sorted
#[utoipa::path(
    get,
    path = "/api/whitelist",
    responses(
        (status = 200, description = "Whitelisted players", body = Vec<String>)
    )
)]
pub async fn list_whitelist(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.confirmed_players().await {
        Ok(players) => (StatusCode::OK, Json(json!(players))),
        Err(e) => {
            tracing::error!("Failed to fetch whitelist: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Failed to fetch whitelist" })))
        }
    }
}

// Pending requests, oldest first
#[utoipa::path(
    get,
    path = "/api/whitelist/pending",
    responses(
        (status = 200, description = "Requests waiting for retry", body = Vec<WhitelistRequest>)
    )
)]
pub async fn list_pending(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.pending_requests().await {
        Ok(pending) => (StatusCode::OK, Json(json!(pending))),
        Err(e) => {
            tracing::error!("Failed to fetch pending whitelist: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Failed to fetch pending requests" })))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/whitelist/status",
    responses(
        (status = 200, description = "Last sync cycle, null before the first one", body = CycleReport)
    )
)]
pub async fn sync_status(State(state): State<Arc<AppState>>) -> Json<Option<CycleReport>> {
    Json(state.engine.last_report().await)
}

// Retry pending requests and resync from the registry (operator)
#[utoipa::path(
    post,
    path = "/api/whitelist/sync",
    responses(
        (status = 200, description = "Cycle finished", body = CycleReport),
        (status = 403, description = "Missing operator role"),
        (status = 504, description = "Cycle abandoned after the deadline")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn sync_whitelist(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    if let Err(denied) = require_role(&claims, &state.auth.moderator_role) {
        return denied;
    }

    tracing::info!("Manual sync requested by {}", claims.sub);
    match run_bounded_cycle(&state.engine, state.cycle_deadline).await {
        Some(report) => (StatusCode::OK, Json(json!(report))).into_response(),
        None => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({ "error": "Sync did not finish in time" })),
        )
            .into_response(),
    }
}

// Drop a pending request (operator deny)
#[utoipa::path(
    post,
    path = "/api/whitelist/withdraw",
    request_body = WhitelistRequest,
    responses(
        (status = 200, description = "Matching pending requests removed"),
        (status = 400, description = "Blank player name or requester"),
        (status = 403, description = "Missing operator role")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn withdraw_pending(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<WhitelistRequest>,
) -> impl IntoResponse {
    if let Err(denied) = require_role(&claims, &state.auth.moderator_role) {
        return denied;
    }

    let player_name = payload.player_name.trim();
    let requester_id = payload.requester_id.trim();
    if player_name.is_empty() || requester_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Player name and requester are required" })),
        )
            .into_response();
    }

    match state.engine.withdraw(requester_id, player_name).await {
        Ok(removed) => (StatusCode::OK, Json(json!({ "removed": removed }))).into_response(),
        Err(e) => {
            tracing::error!("Failed to withdraw request for {}: {}", player_name, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to withdraw request" })),
            )
                .into_response()
        }
    }
}
