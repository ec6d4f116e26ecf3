//! Visit Session Repository

use super::{RepoError, RepoResult};
use shared::models::VisitSession;
use sqlx::{SqliteConnection, SqlitePool};

const SESSION_SELECT: &str = "SELECT id, member_id, check_in_at, check_out_at, status, duration_minutes, duration_hours, points_charged, is_waived, redemptions, created_at, updated_at FROM visit_session";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<VisitSession>> {
    let sql = format!("{SESSION_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, VisitSession>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_by_id_conn(
    conn: &mut SqliteConnection,
    id: i64,
) -> RepoResult<Option<VisitSession>> {
    let sql = format!("{SESSION_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, VisitSession>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// At most one of these exists per member (one-open-session invariant).
pub async fn find_pending_by_member(
    conn: &mut SqliteConnection,
    member_id: i64,
) -> RepoResult<Option<VisitSession>> {
    let sql = format!("{SESSION_SELECT} WHERE member_id = ? AND status = 'pending' LIMIT 1");
    let row = sqlx::query_as::<_, VisitSession>(&sql)
        .bind(member_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn find_by_member(
    pool: &SqlitePool,
    member_id: i64,
    limit: i32,
    offset: i32,
) -> RepoResult<Vec<VisitSession>> {
    let sql = format!("{SESSION_SELECT} WHERE member_id = ? ORDER BY check_in_at DESC LIMIT ? OFFSET ?");
    // SQLite treats a negative LIMIT as unbounded; clamp client paging
    let rows = sqlx::query_as::<_, VisitSession>(&sql)
        .bind(member_id)
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn insert(
    conn: &mut SqliteConnection,
    member_id: i64,
    check_in_at: i64,
    is_waived: bool,
) -> RepoResult<i64> {
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO visit_session (id, member_id, check_in_at, status, is_waived, created_at, updated_at) VALUES (?1, ?2, ?3, 'pending', ?4, ?3, ?3)",
    )
    .bind(id)
    .bind(member_id)
    .bind(check_in_at)
    .bind(is_waived)
    .execute(&mut *conn)
    .await?;
    Ok(id)
}

/// Status-guarded close; 0 rows affected means the session was already
/// completed (the sweep and a concurrent checkout cannot double-close).
pub async fn close_row(
    conn: &mut SqliteConnection,
    id: i64,
    check_out_at: i64,
    duration_minutes: i64,
    duration_hours: f64,
    points_charged: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE visit_session SET status = 'completed', check_out_at = ?1, duration_minutes = ?2, duration_hours = ?3, points_charged = ?4, updated_at = ?1 WHERE id = ?5 AND status = 'pending'",
    )
    .bind(check_out_at)
    .bind(duration_minutes)
    .bind(duration_hours)
    .bind(points_charged)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Sessions left open for the expiry sweep: pending and checked in
/// before `opened_before`.
pub async fn find_stale(pool: &SqlitePool, opened_before: i64) -> RepoResult<Vec<VisitSession>> {
    let sql = format!("{SESSION_SELECT} WHERE status = 'pending' AND check_in_at <= ?");
    let rows = sqlx::query_as::<_, VisitSession>(&sql)
        .bind(opened_before)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Rewrite the session's display mirror (serialized redemption items).
pub async fn set_redemptions_mirror(
    conn: &mut SqliteConnection,
    session_id: i64,
    mirror_json: &str,
    now: i64,
) -> RepoResult<()> {
    let rows = sqlx::query(
        "UPDATE visit_session SET redemptions = ?1, updated_at = ?2 WHERE id = ?3",
    )
    .bind(mirror_json)
    .bind(now)
    .bind(session_id)
    .execute(&mut *conn)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Session {session_id} not found")));
    }
    Ok(())
}

/// Completed hours inside a membership period window `[start, end)`,
/// keyed by check-in time. Source of truth for quota bonuses.
pub async fn sum_hours_in_period(
    conn: &mut SqliteConnection,
    member_id: i64,
    period_start: i64,
    period_end: i64,
) -> RepoResult<f64> {
    let hours: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(duration_hours), 0.0) FROM visit_session WHERE member_id = ? AND status = 'completed' AND check_in_at >= ? AND check_in_at < ?",
    )
    .bind(member_id)
    .bind(period_start)
    .bind(period_end)
    .fetch_one(&mut *conn)
    .await?;
    Ok(hours)
}
