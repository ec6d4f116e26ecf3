//! Settings API Handlers

use axum::{Json, extract::State};

use crate::core::ServerState;
use crate::db::repository::settings;
use crate::utils::{AppError, AppResult};
use shared::models::{AnnualFee, AnnualFeeCreate, ClubSettings, ClubSettingsUpdate};

/// GET /api/settings - 读取营业配置
pub async fn get(State(state): State<ServerState>) -> AppResult<Json<ClubSettings>> {
    let config = settings::get(&state.pool).await?;
    Ok(Json(config))
}

/// PUT /api/settings - 部分更新营业配置
pub async fn update(
    State(state): State<ServerState>,
    Json(payload): Json<ClubSettingsUpdate>,
) -> AppResult<Json<ClubSettings>> {
    if let Some(cutoff) = &payload.cutoff_time
        && chrono::NaiveTime::parse_from_str(cutoff, "%H:%M").is_err()
    {
        return Err(AppError::Validation(format!(
            "Invalid cutoff_time '{}', expected HH:MM",
            cutoff
        )));
    }
    let config = settings::update(&state.pool, &payload).await?;
    tracing::info!("Club settings updated");
    Ok(Json(config))
}

/// GET /api/settings/annual-fees - 年费金额表
pub async fn list_annual_fees(State(state): State<ServerState>) -> AppResult<Json<Vec<AnnualFee>>> {
    let fees = settings::list_annual_fees(&state.pool).await?;
    Ok(Json(fees))
}

/// POST /api/settings/annual-fees - 新增年费金额区间
pub async fn create_annual_fee(
    State(state): State<ServerState>,
    Json(payload): Json<AnnualFeeCreate>,
) -> AppResult<Json<AnnualFee>> {
    if payload.amount <= 0 {
        return Err(AppError::Validation("Fee amount must be positive".into()));
    }
    let fee = settings::insert_annual_fee(&state.pool, &payload).await?;
    tracing::info!(amount = fee.amount, "Annual fee entry created");
    Ok(Json(fee))
}
