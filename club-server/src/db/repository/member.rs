//! Member Repository
//!
//! `point_balance`, `status`, `total_visit_hours` and the session
//! pointer are engine-owned fields: the only writers are the
//! connection-level helpers below, called from ledger / visit / billing
//! transactions. API handlers may only touch identity fields.

use super::{RepoError, RepoResult};
use shared::models::{Member, MemberCreate, MemberStatus, MemberUpdate};
use sqlx::{SqliteConnection, SqlitePool};

const MEMBER_SELECT: &str = "SELECT id, name, phone, email, point_balance, status, total_visit_hours, current_session_id, last_check_in_at, renewal_waiver_expires_at, notes, created_at, updated_at FROM member";

pub async fn find_all(pool: &SqlitePool) -> RepoResult<Vec<Member>> {
    let sql = format!("{MEMBER_SELECT} ORDER BY created_at DESC");
    let rows = sqlx::query_as::<_, Member>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Member>> {
    let sql = format!("{MEMBER_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Member>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_by_id_conn(conn: &mut SqliteConnection, id: i64) -> RepoResult<Option<Member>> {
    let sql = format!("{MEMBER_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Member>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn search(pool: &SqlitePool, query: &str) -> RepoResult<Vec<Member>> {
    let pattern = format!("%{query}%");
    let sql = format!(
        "{MEMBER_SELECT} WHERE name LIKE ?1 OR phone LIKE ?1 OR email LIKE ?1 ORDER BY created_at DESC"
    );
    let rows = sqlx::query_as::<_, Member>(&sql)
        .bind(&pattern)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Insert a new member row. Connection-level so registration can commit
/// the member, the initial fee record and the welcome grant as one
/// transaction (see `billing::register_member`).
pub async fn create(conn: &mut SqliteConnection, data: &MemberCreate) -> RepoResult<Member> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO member (id, name, phone, email, status, notes, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
    )
    .bind(id)
    .bind(&data.name)
    .bind(&data.phone)
    .bind(&data.email)
    .bind(MemberStatus::Active)
    .bind(&data.notes)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    find_by_id_conn(conn, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create member".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: &MemberUpdate) -> RepoResult<Member> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE member SET name = COALESCE(?1, name), phone = COALESCE(?2, phone), email = COALESCE(?3, email), notes = COALESCE(?4, notes), updated_at = ?5 WHERE id = ?6",
    )
    .bind(&data.name)
    .bind(&data.phone)
    .bind(&data.email)
    .bind(&data.notes)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Member {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Member {id} not found")))
}

// ========== Engine-owned field writers (transaction scoped) ==========

/// Point check-in: set the open-session pointer, optionally consuming
/// the renewal waiver (one charge-free visit per waiver).
pub async fn mark_checked_in(
    conn: &mut SqliteConnection,
    member_id: i64,
    session_id: i64,
    check_in_at: i64,
    consume_waiver: bool,
) -> RepoResult<()> {
    if consume_waiver {
        sqlx::query(
            "UPDATE member SET current_session_id = ?1, last_check_in_at = ?2, renewal_waiver_expires_at = NULL, updated_at = ?2 WHERE id = ?3",
        )
        .bind(session_id)
        .bind(check_in_at)
        .bind(member_id)
        .execute(&mut *conn)
        .await?;
    } else {
        sqlx::query(
            "UPDATE member SET current_session_id = ?1, last_check_in_at = ?2, updated_at = ?2 WHERE id = ?3",
        )
        .bind(session_id)
        .bind(check_in_at)
        .bind(member_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Point check-out: clear the session pointer and add visited hours to
/// the running counter.
pub async fn mark_checked_out(
    conn: &mut SqliteConnection,
    member_id: i64,
    hours: f64,
    now: i64,
) -> RepoResult<()> {
    sqlx::query(
        "UPDATE member SET current_session_id = NULL, total_visit_hours = total_visit_hours + ?1, updated_at = ?2 WHERE id = ?3",
    )
    .bind(hours)
    .bind(now)
    .bind(member_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn set_status(
    conn: &mut SqliteConnection,
    member_id: i64,
    status: MemberStatus,
    now: i64,
) -> RepoResult<()> {
    sqlx::query("UPDATE member SET status = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(status)
        .bind(now)
        .bind(member_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn set_renewal_waiver(
    conn: &mut SqliteConnection,
    member_id: i64,
    expires_at: i64,
    now: i64,
) -> RepoResult<()> {
    sqlx::query("UPDATE member SET renewal_waiver_expires_at = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(expires_at)
        .bind(now)
        .bind(member_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Crossing into a new membership period resets the display counter;
/// quota math re-derives hours from the period-filtered session sum.
pub async fn reset_visit_hours(
    conn: &mut SqliteConnection,
    member_id: i64,
    now: i64,
) -> RepoResult<()> {
    sqlx::query("UPDATE member SET total_visit_hours = 0, updated_at = ?1 WHERE id = ?2")
        .bind(now)
        .bind(member_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
