//! Repository Module
//!
//! Thin SQL layer: free functions over `&SqlitePool` (or a transaction
//! connection for callers composing multi-table invariants). Business
//! orchestration lives in the `visits` / `billing` / `entitlement`
//! modules, never here.

pub mod fee_record;
pub mod ledger;
pub mod member;
pub mod redemption;
pub mod settings;
pub mod visit_session;

#[cfg(test)]
pub mod test_support;

use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepoError::NotFound("row not found".into()),
            other => RepoError::Database(other.to_string()),
        }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;
