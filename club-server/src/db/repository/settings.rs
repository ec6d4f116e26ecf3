//! Club Settings Repository
//!
//! Singleton configuration row plus the dated annual-fee table.

use super::{RepoError, RepoResult};
use shared::models::{AnnualFee, AnnualFeeCreate, ClubSettings, ClubSettingsUpdate};
use sqlx::{SqliteConnection, SqlitePool};

const SETTINGS_SELECT: &str = "SELECT id, daily_limit, total_limit, hourly_limit, cutoff_time, hourly_point_rate, expiry_forced_hours, updated_at FROM club_settings WHERE id = 1";

pub async fn get(pool: &SqlitePool) -> RepoResult<ClubSettings> {
    let row = sqlx::query_as::<_, ClubSettings>(SETTINGS_SELECT)
        .fetch_optional(pool)
        .await?;
    row.ok_or_else(|| RepoError::NotFound("Club settings not seeded".into()))
}

pub async fn get_conn(conn: &mut SqliteConnection) -> RepoResult<ClubSettings> {
    let row = sqlx::query_as::<_, ClubSettings>(SETTINGS_SELECT)
        .fetch_optional(&mut *conn)
        .await?;
    row.ok_or_else(|| RepoError::NotFound("Club settings not seeded".into()))
}

pub async fn update(pool: &SqlitePool, data: &ClubSettingsUpdate) -> RepoResult<ClubSettings> {
    let now = shared::util::now_millis();
    sqlx::query(
        "UPDATE club_settings SET daily_limit = COALESCE(?1, daily_limit), total_limit = COALESCE(?2, total_limit), hourly_limit = COALESCE(?3, hourly_limit), cutoff_time = COALESCE(?4, cutoff_time), hourly_point_rate = COALESCE(?5, hourly_point_rate), expiry_forced_hours = COALESCE(?6, expiry_forced_hours), updated_at = ?7 WHERE id = 1",
    )
    .bind(data.daily_limit)
    .bind(data.total_limit)
    .bind(data.hourly_limit)
    .bind(&data.cutoff_time)
    .bind(data.hourly_point_rate)
    .bind(data.expiry_forced_hours)
    .bind(now)
    .execute(pool)
    .await?;
    get(pool).await
}

// ========== Annual fee table ==========

pub async fn list_annual_fees(pool: &SqlitePool) -> RepoResult<Vec<AnnualFee>> {
    let rows = sqlx::query_as::<_, AnnualFee>(
        "SELECT id, start_date, end_date, amount, created_at FROM annual_fee ORDER BY start_date ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn insert_annual_fee(pool: &SqlitePool, data: &AnnualFeeCreate) -> RepoResult<AnnualFee> {
    if let Some(end) = data.end_date
        && end <= data.start_date
    {
        return Err(RepoError::Validation(
            "end_date must be after start_date".into(),
        ));
    }
    let id = shared::util::snowflake_id();
    let now = shared::util::now_millis();
    sqlx::query(
        "INSERT INTO annual_fee (id, start_date, end_date, amount, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(id)
    .bind(data.start_date)
    .bind(data.end_date)
    .bind(data.amount)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(AnnualFee {
        id,
        start_date: data.start_date,
        end_date: data.end_date,
        amount: data.amount,
        created_at: now,
    })
}

/// Fee amount effective on `due_date`: the entry with the latest
/// `start_date <= due_date` whose `end_date` (if any) is still open at
/// `due_date`; falls back to the earliest configured entry.
pub async fn fee_amount_on(conn: &mut SqliteConnection, due_date: i64) -> RepoResult<i64> {
    let amount: Option<i64> = sqlx::query_scalar(
        "SELECT amount FROM annual_fee WHERE start_date <= ?1 AND (end_date IS NULL OR end_date > ?1) ORDER BY start_date DESC LIMIT 1",
    )
    .bind(due_date)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(amount) = amount {
        return Ok(amount);
    }

    let fallback: Option<i64> =
        sqlx::query_scalar("SELECT amount FROM annual_fee ORDER BY start_date ASC LIMIT 1")
            .fetch_optional(&mut *conn)
            .await?;
    fallback.ok_or_else(|| RepoError::Validation("No annual fee configured".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::test_pool;

    async fn seed_fee(pool: &SqlitePool, start: i64, end: Option<i64>, amount: i64) {
        insert_annual_fee(
            pool,
            &AnnualFeeCreate {
                start_date: start,
                end_date: end,
                amount,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn picks_latest_window_covering_due_date() {
        let pool = test_pool().await;
        seed_fee(&pool, 0, Some(1000), 500).await;
        seed_fee(&pool, 1000, None, 800).await;

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(fee_amount_on(&mut conn, 500).await.unwrap(), 500);
        assert_eq!(fee_amount_on(&mut conn, 1000).await.unwrap(), 800);
        assert_eq!(fee_amount_on(&mut conn, 9999).await.unwrap(), 800);
    }

    #[tokio::test]
    async fn falls_back_to_earliest_entry() {
        let pool = test_pool().await;
        // Only a future-dated entry exists; a due date before it falls
        // back to the earliest configured amount.
        seed_fee(&pool, 5000, None, 1200).await;
        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(fee_amount_on(&mut conn, 100).await.unwrap(), 1200);
    }

    #[tokio::test]
    async fn empty_table_is_a_validation_error() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let err = fee_amount_on(&mut conn, 100).await.unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[tokio::test]
    async fn settings_update_is_partial() {
        let pool = test_pool().await;
        let before = get(&pool).await.unwrap();
        assert_eq!(before.cutoff_time, "23:00");

        let after = update(
            &pool,
            &ClubSettingsUpdate {
                daily_limit: Some(2),
                total_limit: None,
                hourly_limit: None,
                cutoff_time: None,
                hourly_point_rate: None,
                expiry_forced_hours: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(after.daily_limit, 2);
        assert_eq!(after.total_limit, before.total_limit);
        assert_eq!(after.cutoff_time, "23:00");
    }
}
