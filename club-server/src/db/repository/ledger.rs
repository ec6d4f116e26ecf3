//! Points Ledger Repository
//!
//! The only sanctioned path to mutate a member's balance: one
//! transactional read-modify-write over the member row plus one new
//! ledger row. Entries are append-only; there is no update or delete.

use super::{RepoError, RepoResult};
use shared::models::{LedgerDirection, LedgerEntry, LedgerSource};
use sqlx::{SqliteConnection, SqlitePool};

const LEDGER_SELECT: &str = "SELECT id, member_id, direction, amount, source, related_id, resulting_balance, created_at FROM ledger_entry";

/// Post a balance change and return the created entry.
///
/// `spend` is permitted to drive the balance negative — no floor is
/// enforced here; a negative balance is the trigger for `inactive`
/// status in the billing cycle.
pub async fn post(
    pool: &SqlitePool,
    member_id: i64,
    direction: LedgerDirection,
    amount: i64,
    source: LedgerSource,
    related_id: Option<i64>,
) -> RepoResult<LedgerEntry> {
    let mut tx = pool.begin().await?;
    let entry = post_with_conn(&mut tx, member_id, direction, amount, source, related_id).await?;
    tx.commit().await?;
    Ok(entry)
}

/// Transaction-composable variant used by session close and fee deduct,
/// which must post atomically with their own row updates.
pub async fn post_with_conn(
    conn: &mut SqliteConnection,
    member_id: i64,
    direction: LedgerDirection,
    amount: i64,
    source: LedgerSource,
    related_id: Option<i64>,
) -> RepoResult<LedgerEntry> {
    // Negative amount is a caller bug: reject before any write.
    if amount < 0 {
        return Err(RepoError::Validation(format!(
            "Ledger amount cannot be negative: {amount}"
        )));
    }

    let balance: Option<i64> =
        sqlx::query_scalar("SELECT point_balance FROM member WHERE id = ?")
            .bind(member_id)
            .fetch_optional(&mut *conn)
            .await?;
    let balance = balance.ok_or_else(|| RepoError::NotFound(format!("Member {member_id} not found")))?;

    let resulting_balance = match direction {
        LedgerDirection::Earn => balance + amount,
        LedgerDirection::Spend => balance - amount,
    };

    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();

    sqlx::query("UPDATE member SET point_balance = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(resulting_balance)
        .bind(now)
        .bind(member_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO ledger_entry (id, member_id, direction, amount, source, related_id, resulting_balance, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(id)
    .bind(member_id)
    .bind(direction)
    .bind(amount)
    .bind(source)
    .bind(related_id)
    .bind(resulting_balance)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(LedgerEntry {
        id,
        member_id,
        direction,
        amount,
        source,
        related_id,
        resulting_balance,
        created_at: now,
    })
}

/// Audit/history listing, newest first. Balance reads never aggregate
/// this table; they come from the member row.
pub async fn find_by_member(
    pool: &SqlitePool,
    member_id: i64,
    limit: i32,
    offset: i32,
) -> RepoResult<Vec<LedgerEntry>> {
    let sql = format!("{LEDGER_SELECT} WHERE member_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
    // SQLite treats a negative LIMIT as unbounded; clamp client paging
    let rows = sqlx::query_as::<_, LedgerEntry>(&sql)
        .bind(member_id)
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
