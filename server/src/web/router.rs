use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use super::app_state::AppState;
use super::rest_api;

/// Requests carry ids and short texts only.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the axum router for the group moderation API.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(|| async { "ok" }))
        .route(
            "/api/groups/{group_id}/bootstrap",
            post(rest_api::bootstrap_group),
        )
        .route(
            "/api/groups/{group_id}/members/{member_id}",
            get(rest_api::get_member),
        )
        .route("/api/groups/{group_id}/actions", post(rest_api::apply_action))
        .route(
            "/api/groups/{group_id}/warnings",
            post(rest_api::record_warning),
        )
        .route(
            "/api/groups/{group_id}/messages",
            post(rest_api::inspect_message),
        )
        .route("/api/groups/{group_id}/screen", post(rest_api::screen_message))
        .route("/api/groups/{group_id}/settings", get(rest_api::get_settings))
        .route(
            "/api/groups/{group_id}/settings/{key}",
            put(rest_api::set_setting),
        )
        .route(
            "/api/groups/{group_id}/texts/{field}",
            get(rest_api::get_text).put(rest_api::set_text),
        )
        .route(
            "/api/groups/{group_id}/blocked-terms",
            post(rest_api::add_blocked_term).delete(rest_api::remove_blocked_term),
        )
        .route("/api/groups/{group_id}/stats", get(rest_api::get_stats))
        .route(
            "/api/groups/{group_id}/audit-log",
            get(rest_api::get_audit_log),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}
