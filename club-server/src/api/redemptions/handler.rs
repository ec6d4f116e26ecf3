//! Redemption API Handlers

use axum::{
    Json,
    extract::{Path, State},
};

use crate::core::ServerState;
use crate::entitlement;
use crate::utils::{AppError, AppResult};
use shared::models::RedemptionItem;

#[derive(serde::Deserialize)]
pub struct RequestPayload {
    pub member_id: i64,
    #[serde(default = "one")]
    pub quantity: i64,
}

#[derive(serde::Deserialize)]
pub struct ConfirmPayload {
    pub product_ref: String,
    #[serde(default = "one")]
    pub quantity: i64,
    pub confirmed_by: String,
}

#[derive(serde::Deserialize)]
pub struct AssignPayload {
    pub member_id: i64,
    pub product_ref: String,
    #[serde(default = "one")]
    pub quantity: i64,
    pub confirmed_by: String,
}

fn one() -> i64 {
    1
}

/// POST /api/redemptions/request - 会员发起兑换申请
pub async fn request(
    State(state): State<ServerState>,
    Json(payload): Json<RequestPayload>,
) -> AppResult<Json<RedemptionItem>> {
    let item = entitlement::request_redemption(
        &state.pool,
        payload.member_id,
        payload.quantity,
        shared::util::now_millis(),
        state.config.timezone,
    )
    .await?;
    Ok(Json(item))
}

/// POST /api/redemptions/:id/confirm - 管理员确认兑换并指定商品
pub async fn confirm(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<ConfirmPayload>,
) -> AppResult<Json<RedemptionItem>> {
    let item = entitlement::confirm_redemption(
        &state.pool,
        id,
        &payload.product_ref,
        payload.quantity,
        &payload.confirmed_by,
    )
    .await?;
    Ok(Json(item))
}

/// POST /api/redemptions/assign - 管理员直接登记兑换 (跳过配额检查)
pub async fn assign(
    State(state): State<ServerState>,
    Json(payload): Json<AssignPayload>,
) -> AppResult<Json<RedemptionItem>> {
    let item = entitlement::admin_assign(
        &state.pool,
        payload.member_id,
        payload.quantity,
        &payload.product_ref,
        &payload.confirmed_by,
        shared::util::now_millis(),
        state.config.timezone,
    )
    .await?;
    Ok(Json(item))
}

/// GET /api/redemptions/session/:id - 某次到店会话的兑换记录
pub async fn by_session(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<RedemptionItem>>> {
    use crate::db::repository::{redemption, visit_session};

    visit_session::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))?;
    let items = redemption::find_by_session(&state.pool, id).await?;
    Ok(Json(items))
}
