//! Member API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::billing;
use crate::core::ServerState;
use crate::db::repository::{fee_record, ledger, member, visit_session};
use crate::entitlement;
use crate::utils::{AppError, AppResult};
use shared::models::{
    EffectiveLimits, FeeRecord, LedgerDirection, LedgerEntry, LedgerSource, Member, MemberCreate,
    MemberUpdate, VisitSession,
};

#[derive(serde::Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(serde::Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i32,
    #[serde(default)]
    pub offset: i32,
}

fn default_limit() -> i32 {
    50
}

/// GET /api/members - 获取所有会员
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<Vec<Member>>> {
    let members = member::find_all(&state.pool).await?;
    Ok(Json(members))
}

/// GET /api/members/search?q=xxx - 搜索会员 (姓名/电话/邮箱)
pub async fn search(
    State(state): State<ServerState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<Member>>> {
    let members = member::search(&state.pool, &query.q).await?;
    Ok(Json(members))
}

/// Member detail response (member + current quota ceilings)
#[derive(serde::Serialize)]
pub struct MemberDetail {
    #[serde(flatten)]
    pub member: Member,
    pub limits: EffectiveLimits,
}

/// GET /api/members/:id - 获取单个会员（含当前配额上限）
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MemberDetail>> {
    let member = member::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Member {} not found", id)))?;
    let limits = entitlement::limits(&state.pool, id).await?;

    Ok(Json(MemberDetail { member, limits }))
}

/// POST /api/members - 创建会员
///
/// 会员行、首笔 pending 年费记录 (到期日 = 注册时刻) 与可选的注册赠点
/// 在同一事务中提交，中途失败不留任何残留。
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<MemberCreate>,
) -> AppResult<Json<Member>> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("Member name cannot be empty".into()));
    }

    let member = billing::register_member(&state.pool, &payload).await?;
    Ok(Json(member))
}

/// PUT /api/members/:id - 更新会员身份信息
pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<MemberUpdate>,
) -> AppResult<Json<Member>> {
    let member = member::update(&state.pool, id, &payload).await?;
    Ok(Json(member))
}

#[derive(serde::Deserialize)]
pub struct LedgerPostPayload {
    pub direction: LedgerDirection,
    pub amount: i64,
    pub source: LedgerSource,
    pub related_id: Option<i64>,
}

/// POST /api/members/:id/ledger - 管理员手动调整积分 (充值/补偿)
pub async fn post_ledger(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<LedgerPostPayload>,
) -> AppResult<Json<LedgerEntry>> {
    let entry = ledger::post(
        &state.pool,
        id,
        payload.direction,
        payload.amount,
        payload.source,
        payload.related_id,
    )
    .await?;
    tracing::info!(
        member_id = id,
        amount = payload.amount,
        resulting_balance = entry.resulting_balance,
        "Manual ledger adjustment"
    );
    Ok(Json(entry))
}

/// GET /api/members/:id/ledger - 积分流水 (新→旧)
pub async fn ledger_history(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Vec<LedgerEntry>>> {
    ensure_member(&state, id).await?;
    let entries = ledger::find_by_member(&state.pool, id, page.limit, page.offset).await?;
    Ok(Json(entries))
}

/// GET /api/members/:id/sessions - 到店会话历史 (新→旧)
pub async fn session_history(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Vec<VisitSession>>> {
    ensure_member(&state, id).await?;
    let sessions = visit_session::find_by_member(&state.pool, id, page.limit, page.offset).await?;
    Ok(Json(sessions))
}

/// GET /api/members/:id/limits - 当前配额上限 (含时长加成)
pub async fn limits(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<EffectiveLimits>> {
    let limits = entitlement::limits(&state.pool, id).await?;
    Ok(Json(limits))
}

/// GET /api/members/:id/fees - 年费记录 (按到期日新→旧)
pub async fn fee_history(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<FeeRecord>>> {
    ensure_member(&state, id).await?;
    let records = fee_record::find_by_member(&state.pool, id).await?;
    Ok(Json(records))
}

async fn ensure_member(state: &ServerState, id: i64) -> AppResult<()> {
    member::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Member {} not found", id)))?;
    Ok(())
}
