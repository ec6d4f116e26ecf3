//! Visit Session API Handlers

use axum::{
    Json,
    extract::{Path, State},
};

use crate::core::ServerState;
use crate::utils::AppResult;
use crate::visits::{self, SweepReport};
use shared::models::VisitSession;

#[derive(serde::Deserialize)]
pub struct CheckInPayload {
    pub member_id: i64,
}

#[derive(serde::Deserialize, Default)]
pub struct CheckOutPayload {
    /// Admin override: bill this many hours instead of the elapsed time.
    pub forced_hours: Option<f64>,
}

/// POST /api/visits/check-in - 会员到店打卡
pub async fn check_in(
    State(state): State<ServerState>,
    Json(payload): Json<CheckInPayload>,
) -> AppResult<Json<VisitSession>> {
    let session = visits::open_session(&state.pool, payload.member_id).await?;
    Ok(Json(session))
}

/// POST /api/visits/:id/check-out - 离店结算
pub async fn check_out(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    payload: Option<Json<CheckOutPayload>>,
) -> AppResult<Json<VisitSession>> {
    let forced_hours = payload.and_then(|Json(p)| p.forced_hours);
    let session = visits::close_session(&state.pool, id, forced_hours).await?;
    Ok(Json(session))
}

/// POST /api/visits/sweep - 手动触发过期会话扫描
pub async fn sweep(State(state): State<ServerState>) -> AppResult<Json<SweepReport>> {
    let report = visits::run_expiry_sweep(&state.pool).await?;
    Ok(Json(report))
}
