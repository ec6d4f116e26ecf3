//! Unified Result Types

use super::error::AppError;

/// Result alias used by every API handler.
pub type AppResult<T> = Result<T, AppError>;
