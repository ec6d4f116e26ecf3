//! Points Ledger Model

use serde::{Deserialize, Serialize};

/// Sign of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum LedgerDirection {
    Earn,
    Spend,
}

/// What caused a balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum LedgerSource {
    Registration,
    Purchase,
    Event,
    Visit,
    MembershipFee,
    Reload,
    Admin,
    Other,
}

/// Immutable audit row (积分流水)
///
/// Never updated or deleted; `resulting_balance` snapshots the member
/// balance after applying this entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct LedgerEntry {
    pub id: i64,
    pub member_id: i64,
    pub direction: LedgerDirection,
    /// Always positive; the direction carries the sign.
    pub amount: i64,
    pub source: LedgerSource,
    /// FK to the record that caused the change (session, fee, ...).
    pub related_id: Option<i64>,
    pub resulting_balance: i64,
    pub created_at: i64,
}
