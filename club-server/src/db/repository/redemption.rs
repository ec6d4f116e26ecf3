//! Redemption Item Repository
//!
//! Rows sharing a `session_id` form the per-session aggregate. Every
//! mutation happens through a caller-held transaction that also rewrites
//! the session's display mirror — never read-modify-write without it.

use super::RepoResult;
use shared::models::{RedemptionItem, RedemptionStatus};
use sqlx::{SqliteConnection, SqlitePool};

const ITEM_SELECT: &str = "SELECT id, session_id, member_id, status, day_key, hour_key, quantity, product_ref, redeemed_at, confirmed_by, confirmed_at, created_at, updated_at FROM redemption_item";

pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> RepoResult<Option<RedemptionItem>> {
    let sql = format!("{ITEM_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, RedemptionItem>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn find_by_session(pool: &SqlitePool, session_id: i64) -> RepoResult<Vec<RedemptionItem>> {
    let sql = format!("{ITEM_SELECT} WHERE session_id = ? ORDER BY redeemed_at ASC, id ASC");
    let rows = sqlx::query_as::<_, RedemptionItem>(&sql)
        .bind(session_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn find_by_session_conn(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> RepoResult<Vec<RedemptionItem>> {
    let sql = format!("{ITEM_SELECT} WHERE session_id = ? ORDER BY redeemed_at ASC, id ASC");
    let rows = sqlx::query_as::<_, RedemptionItem>(&sql)
        .bind(session_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    conn: &mut SqliteConnection,
    session_id: i64,
    member_id: i64,
    status: RedemptionStatus,
    day_key: &str,
    hour_key: &str,
    quantity: i64,
    product_ref: Option<&str>,
    confirmed_by: Option<&str>,
    redeemed_at: i64,
) -> RepoResult<i64> {
    let id = shared::util::snowflake_id();
    let confirmed_at = match status {
        RedemptionStatus::Completed => Some(redeemed_at),
        RedemptionStatus::PendingSelection => None,
    };
    sqlx::query(
        "INSERT INTO redemption_item (id, session_id, member_id, status, day_key, hour_key, quantity, product_ref, redeemed_at, confirmed_by, confirmed_at, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?9, ?9)",
    )
    .bind(id)
    .bind(session_id)
    .bind(member_id)
    .bind(status)
    .bind(day_key)
    .bind(hour_key)
    .bind(quantity)
    .bind(product_ref)
    .bind(redeemed_at)
    .bind(confirmed_by)
    .bind(confirmed_at)
    .execute(&mut *conn)
    .await?;
    Ok(id)
}

/// Pending-selection guard: confirming twice affects 0 rows, so a
/// duplicate confirm can never double-count against the quotas.
pub async fn confirm_row(
    conn: &mut SqliteConnection,
    id: i64,
    product_ref: &str,
    quantity: i64,
    confirmed_by: &str,
    now: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE redemption_item SET status = 'completed', product_ref = ?1, quantity = ?2, confirmed_by = ?3, confirmed_at = ?4, updated_at = ?4 WHERE id = ?5 AND status = 'pending_selection'",
    )
    .bind(product_ref)
    .bind(quantity)
    .bind(confirmed_by)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(rows.rows_affected() > 0)
}

// ========== Quota bucket counts ==========

/// Completed units in a venue-local calendar day.
pub async fn completed_in_day(
    conn: &mut SqliteConnection,
    member_id: i64,
    day_key: &str,
) -> RepoResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM redemption_item WHERE member_id = ? AND day_key = ? AND status = 'completed'",
    )
    .bind(member_id)
    .bind(day_key)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// All units in an hour bucket — pending items occupy the hour slot to
/// stop request flooding, even though they don't consume daily/total
/// quota until confirmed.
pub async fn units_in_hour(
    conn: &mut SqliteConnection,
    member_id: i64,
    hour_key: &str,
) -> RepoResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM redemption_item WHERE member_id = ? AND hour_key = ?",
    )
    .bind(member_id)
    .bind(hour_key)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Completed units inside the membership period window `[start, end)`.
pub async fn completed_in_period(
    conn: &mut SqliteConnection,
    member_id: i64,
    period_start: i64,
    period_end: i64,
) -> RepoResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM redemption_item WHERE member_id = ? AND status = 'completed' AND redeemed_at >= ? AND redeemed_at < ?",
    )
    .bind(member_id)
    .bind(period_start)
    .bind(period_end)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}
