//! Visit Session Model

use serde::{Deserialize, Serialize};

/// Session lifecycle: `none → pending → completed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum SessionStatus {
    Pending,
    Completed,
}

/// One check-in / check-out cycle (到店记录)
///
/// Completed sessions are immutable except for the `redemptions` mirror,
/// which is appended to while the session is still open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct VisitSession {
    pub id: i64,
    pub member_id: i64,
    pub check_in_at: i64,
    pub check_out_at: Option<i64>,
    pub status: SessionStatus,
    pub duration_minutes: Option<i64>,
    pub duration_hours: Option<f64>,
    pub points_charged: Option<i64>,
    /// Waiver flag snapshotted at check-in time.
    pub is_waived: bool,
    /// Display mirror of the session's redemption items (JSON array).
    /// The `redemption_item` rows are the source of truth; this copy is
    /// rewritten inside every item transaction.
    pub redemptions: String,
    pub created_at: i64,
    pub updated_at: i64,
}
