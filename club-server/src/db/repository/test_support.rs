//! Shared test fixtures for repository and engine tests.

use shared::models::MemberStatus;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// In-memory SQLite pool with the real migration schema applied.
///
/// Single connection: `sqlite::memory:` databases are per-connection,
/// and the engine's transactions must see the seeded rows.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    sqlx::raw_sql(include_str!("../../../migrations/0001_init.sql"))
        .execute(&pool)
        .await
        .unwrap();

    // Seed: Alice active, Bob inactive
    seed_member(&pool, 1, "Alice", MemberStatus::Active).await;
    seed_member(&pool, 2, "Bob", MemberStatus::Inactive).await;

    pool
}

pub async fn seed_member(pool: &SqlitePool, id: i64, name: &str, status: MemberStatus) {
    sqlx::query(
        "INSERT INTO member (id, name, status, created_at, updated_at) VALUES (?1, ?2, ?3, 0, 0)",
    )
    .bind(id)
    .bind(name)
    .bind(status)
    .execute(pool)
    .await
    .unwrap();
}
