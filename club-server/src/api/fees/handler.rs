//! Fee API Handlers

use axum::{
    Json,
    extract::{Path, State},
};

use crate::billing::{self, FeeSweepReport};
use crate::core::ServerState;
use crate::utils::AppResult;
use shared::models::{FeeRecord, FeeRecordCreate};

/// POST /api/fees - 手动创建年费记录
///
/// 扣款失败后会员没有 pending 记录，管理员从这里补一笔。
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<FeeRecordCreate>,
) -> AppResult<Json<FeeRecord>> {
    let record = billing::create_fee_record(
        &state.pool,
        payload.member_id,
        payload.due_date,
        payload.renewal_type,
        payload.previous_due_date,
    )
    .await?;
    Ok(Json(record))
}

/// POST /api/fees/:id/deduct - 手动触发单笔年费扣款
pub async fn deduct(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<FeeRecord>> {
    let record = billing::deduct(&state.pool, id).await?;
    Ok(Json(record))
}

/// POST /api/fees/sweep - 手动触发年费扫描
pub async fn sweep(State(state): State<ServerState>) -> AppResult<Json<FeeSweepReport>> {
    let report = billing::run_fee_sweep(&state.pool, state.config.timezone).await?;
    Ok(Json(report))
}
