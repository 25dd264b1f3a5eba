use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::engine::errors::EngineError;
use crate::engine::moderation::WarningState;
use crate::engine::permissions::{Command, Rank};
use crate::engine::records::{SettingKey, TextField};

use super::app_state::AppState;

/// Map an engine failure onto an HTTP response. Authorization failures carry
/// their reason code; store failures never leak details.
fn engine_error(e: EngineError) -> Response {
    match e {
        EngineError::Auth(auth) => (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": auth.to_string(), "code": auth.code() })),
        )
            .into_response(),
        EngineError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
        EngineError::Store(store) => {
            error!(error = %store, "store failure while handling request");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Temporarily unavailable, try again later",
            )
                .into_response()
        }
    }
}

// ── Members ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct MemberView {
    pub member_id: String,
    pub rank: Rank,
    pub rank_name: Option<&'static str>,
    pub warning_count: u32,
    pub warning_state: WarningState,
    pub commands: Vec<&'static str>,
}

pub async fn get_member(
    State(state): State<Arc<AppState>>,
    Path((group_id, member_id)): Path<(String, String)>,
) -> Response {
    let member = match state.engine.member(&group_id, &member_id).await {
        Ok(m) => m,
        Err(e) => return engine_error(e),
    };
    let commands = crate::engine::permissions::available_commands(member.rank)
        .iter()
        .map(Command::as_str)
        .collect();
    Json(MemberView {
        member_id,
        rank: member.rank,
        rank_name: member.rank.name(),
        warning_count: member.warning_count,
        warning_state: WarningState::from_count(member.warning_count),
        commands,
    })
    .into_response()
}

#[derive(Deserialize)]
pub struct BootstrapRequest {
    pub owner_id: String,
    #[serde(default)]
    pub admin_ids: Vec<String>,
}

/// Seed ranks from the platform's own admin list. Trusted callers only.
pub async fn bootstrap_group(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    Json(body): Json<BootstrapRequest>,
) -> Response {
    match state
        .engine
        .bootstrap_group(&group_id, &body.owner_id, &body.admin_ids)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => engine_error(e),
    }
}

// ── Moderation ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankAction {
    Promote,
    Demote,
    Ban,
    Unban,
    Mute,
    Unmute,
}

#[derive(Deserialize)]
pub struct RankActionRequest {
    pub actor_id: String,
    pub target_id: String,
    pub action: RankAction,
    /// Rank given back by `unban`; defaults to regular.
    pub restored_rank: Option<String>,
}

pub async fn apply_action(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    Json(body): Json<RankActionRequest>,
) -> Response {
    let engine = &state.engine;
    let (actor, target) = (body.actor_id.as_str(), body.target_id.as_str());
    let result = match body.action {
        RankAction::Promote => engine.promote(&group_id, actor, target).await,
        RankAction::Demote => engine.demote(&group_id, actor, target).await,
        RankAction::Ban => engine.ban(&group_id, actor, target).await,
        RankAction::Mute => engine.mute(&group_id, actor, target).await,
        RankAction::Unmute => engine.unmute(&group_id, actor, target).await,
        RankAction::Unban => {
            let restored = match body.restored_rank.as_deref() {
                None => Rank::REGULAR,
                Some(raw) => match Rank::parse(raw) {
                    Some(rank) => rank,
                    None => {
                        return (StatusCode::BAD_REQUEST, format!("Unknown rank: {raw}"))
                            .into_response();
                    }
                },
            };
            engine.unban(&group_id, actor, target, restored).await
        }
    };
    match result {
        Ok(rank) => Json(json!({
            "target_id": target,
            "rank": rank,
            "rank_name": rank.name(),
        }))
        .into_response(),
        Err(e) => engine_error(e),
    }
}

#[derive(Deserialize)]
pub struct WarningRequest {
    pub actor_id: String,
    pub target_id: String,
    #[serde(default)]
    pub reason: String,
}

pub async fn record_warning(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    Json(body): Json<WarningRequest>,
) -> Response {
    match state
        .engine
        .record_warning(&group_id, &body.actor_id, &body.target_id, &body.reason)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => engine_error(e),
    }
}

#[derive(Deserialize)]
pub struct MessageRequest {
    pub sender_id: String,
    pub text: String,
}

/// Inbound message hook: counts the message and returns what to do with it.
pub async fn inspect_message(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> Response {
    match state
        .engine
        .inspect_message(&group_id, &body.sender_id, &body.text)
        .await
    {
        Ok(action) => Json(action).into_response(),
        Err(e) => engine_error(e),
    }
}

#[derive(Deserialize)]
pub struct ScreenRequest {
    pub text: String,
}

pub async fn screen_message(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    Json(body): Json<ScreenRequest>,
) -> Response {
    match state.engine.screen_message(&group_id, &body.text).await {
        Ok(action) => Json(action).into_response(),
        Err(e) => engine_error(e),
    }
}

// ── Settings ────────────────────────────────────────────────

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> Response {
    match state.engine.settings(&group_id).await {
        Ok(settings) => Json(settings).into_response(),
        Err(e) => engine_error(e),
    }
}

#[derive(Deserialize)]
pub struct SetSettingRequest {
    pub actor_id: String,
    pub value: bool,
}

pub async fn set_setting(
    State(state): State<Arc<AppState>>,
    Path((group_id, key)): Path<(String, String)>,
    Json(body): Json<SetSettingRequest>,
) -> Response {
    let Some(key) = SettingKey::parse(&key) else {
        return (StatusCode::NOT_FOUND, "Unknown setting").into_response();
    };
    match state
        .engine
        .configure_setting(&group_id, &body.actor_id, key, body.value)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => engine_error(e),
    }
}

pub async fn get_text(
    State(state): State<Arc<AppState>>,
    Path((group_id, field)): Path<(String, String)>,
) -> Response {
    let Some(field) = TextField::parse(&field) else {
        return (StatusCode::NOT_FOUND, "Unknown text field").into_response();
    };
    match state.engine.get_text(&group_id, field).await {
        Ok(value) => Json(json!({ "field": field.as_str(), "value": value })).into_response(),
        Err(e) => engine_error(e),
    }
}

#[derive(Deserialize)]
pub struct SetTextRequest {
    pub actor_id: String,
    pub value: String,
}

pub async fn set_text(
    State(state): State<Arc<AppState>>,
    Path((group_id, field)): Path<(String, String)>,
    Json(body): Json<SetTextRequest>,
) -> Response {
    let Some(field) = TextField::parse(&field) else {
        return (StatusCode::NOT_FOUND, "Unknown text field").into_response();
    };
    match state
        .engine
        .configure_text(&group_id, &body.actor_id, field, body.value)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => engine_error(e),
    }
}

#[derive(Deserialize)]
pub struct BlockedTermRequest {
    pub actor_id: String,
    pub term: String,
}

pub async fn add_blocked_term(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    Json(body): Json<BlockedTermRequest>,
) -> Response {
    match state
        .engine
        .add_blocked_term(&group_id, &body.actor_id, &body.term)
        .await
    {
        Ok(true) => StatusCode::CREATED.into_response(),
        Ok(false) => StatusCode::OK.into_response(),
        Err(e) => engine_error(e),
    }
}

pub async fn remove_blocked_term(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    Json(body): Json<BlockedTermRequest>,
) -> Response {
    match state
        .engine
        .remove_blocked_term(&group_id, &body.actor_id, &body.term)
        .await
    {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "Term not on the blocked list").into_response(),
        Err(e) => engine_error(e),
    }
}

// ── Reporting ───────────────────────────────────────────────

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> Response {
    match state.engine.stats(&group_id).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => engine_error(e),
    }
}

#[derive(Deserialize)]
pub struct AuditLogParams {
    pub limit: Option<usize>,
}

pub async fn get_audit_log(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    Query(params): Query<AuditLogParams>,
) -> Response {
    let limit = params.limit.unwrap_or(50).min(500);
    match state.engine.audit_log(&group_id, limit).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => engine_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_action_request_deserialize() {
        let json = r#"{"actor_id": "a", "target_id": "b", "action": "unban", "restored_rank": "trusted"}"#;
        let req: RankActionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.action, RankAction::Unban);
        assert_eq!(req.restored_rank.as_deref(), Some("trusted"));
    }

    #[test]
    fn test_rank_action_unknown_fails() {
        let json = r#"{"actor_id": "a", "target_id": "b", "action": "kick"}"#;
        assert!(serde_json::from_str::<RankActionRequest>(json).is_err());
    }

    #[test]
    fn test_warning_request_reason_optional() {
        let json = r#"{"actor_id": "a", "target_id": "b"}"#;
        let req: WarningRequest = serde_json::from_str(json).unwrap();
        assert!(req.reason.is_empty());
    }

    #[test]
    fn test_member_view_serialize() {
        let view = MemberView {
            member_id: "m1".into(),
            rank: Rank::MODERATOR,
            rank_name: Rank::MODERATOR.name(),
            warning_count: 1,
            warning_state: WarningState::Warned(1),
            commands: vec!["warn"],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["rank"], 50);
        assert_eq!(json["rank_name"], "moderator");
        assert_eq!(json["warning_state"]["state"], "warned");
        assert_eq!(json["warning_state"]["count"], 1);
    }
}
