//! Fee Record Repository

use super::RepoResult;
use shared::models::{FeeRecord, RenewalType};
use sqlx::{SqliteConnection, SqlitePool};

const FEE_SELECT: &str = "SELECT id, member_id, due_date, amount, renewal_type, previous_due_date, status, deducted_at, created_at, updated_at FROM fee_record";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<FeeRecord>> {
    let sql = format!("{FEE_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, FeeRecord>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_by_id_conn(
    conn: &mut SqliteConnection,
    id: i64,
) -> RepoResult<Option<FeeRecord>> {
    let sql = format!("{FEE_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, FeeRecord>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn find_by_member(pool: &SqlitePool, member_id: i64) -> RepoResult<Vec<FeeRecord>> {
    let sql = format!("{FEE_SELECT} WHERE member_id = ? ORDER BY due_date DESC");
    let rows = sqlx::query_as::<_, FeeRecord>(&sql)
        .bind(member_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// The most recently paid record anchors the membership period.
pub async fn find_most_recent_paid(
    conn: &mut SqliteConnection,
    member_id: i64,
) -> RepoResult<Option<FeeRecord>> {
    let sql = format!(
        "{FEE_SELECT} WHERE member_id = ? AND status = 'paid' ORDER BY due_date DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, FeeRecord>(&sql)
        .bind(member_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Pending records due before `due_before` (the fee sweep's batch).
pub async fn find_due_pending(pool: &SqlitePool, due_before: i64) -> RepoResult<Vec<FeeRecord>> {
    let sql = format!(
        "{FEE_SELECT} WHERE status = 'pending' AND due_date < ? ORDER BY due_date ASC"
    );
    let rows = sqlx::query_as::<_, FeeRecord>(&sql)
        .bind(due_before)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn insert(
    conn: &mut SqliteConnection,
    member_id: i64,
    due_date: i64,
    amount: i64,
    renewal_type: RenewalType,
    previous_due_date: Option<i64>,
) -> RepoResult<i64> {
    let id = shared::util::snowflake_id();
    let now = shared::util::now_millis();
    sqlx::query(
        "INSERT INTO fee_record (id, member_id, due_date, amount, renewal_type, previous_due_date, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
    )
    .bind(id)
    .bind(member_id)
    .bind(due_date)
    .bind(amount)
    .bind(renewal_type)
    .bind(previous_due_date)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(id)
}

/// Pending-status guard makes the deduct sweep idempotent: a record can
/// move out of `pending` exactly once.
pub async fn mark_processed(
    conn: &mut SqliteConnection,
    id: i64,
    paid: bool,
    deducted_at: i64,
) -> RepoResult<bool> {
    let status = if paid { "paid" } else { "failed" };
    let rows = sqlx::query(
        "UPDATE fee_record SET status = ?1, deducted_at = ?2, updated_at = ?2 WHERE id = ?3 AND status = 'pending'",
    )
    .bind(status)
    .bind(deducted_at)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Guard against stacking duplicate obligations for the same member.
pub async fn has_pending(conn: &mut SqliteConnection, member_id: i64) -> RepoResult<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM fee_record WHERE member_id = ? AND status = 'pending'")
            .bind(member_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count > 0)
}
