//! Member Model

use serde::{Deserialize, Serialize};

/// Member account status (会员状态)
///
/// `Inactive` members cannot check in or redeem; the billing cycle
/// toggles this flag on fee deduction outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum MemberStatus {
    Active,
    Inactive,
}

/// Member entity (会员)
///
/// `point_balance`, `status` and `total_visit_hours` are mutated only
/// through the ledger / visit tracker / billing cycle — never written
/// directly by API handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Member {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Signed balance; fee deduction may drive it negative.
    pub point_balance: i64,
    pub status: MemberStatus,
    /// Denormalized running counter; reset when a renewal is paid.
    pub total_visit_hours: f64,
    /// At most one pending session at a time.
    pub current_session_id: Option<i64>,
    pub last_check_in_at: Option<i64>,
    /// While current, the next visit session is charge-exempt.
    pub renewal_waiver_expires_at: Option<i64>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create member payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberCreate {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    /// Optional welcome points, posted as an `earn` ledger entry with
    /// source `registration`.
    pub registration_points: Option<i64>,
}

/// Update member payload (identity fields only; entitlement state is
/// owned by the engine components)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}
