//! Annual Fee Model

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum RenewalType {
    Initial,
    Renewal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum FeeStatus {
    Pending,
    Paid,
    Failed,
}

/// One billing obligation (年费记录)
///
/// The chain of paid records defines the membership period:
/// `[previous_due_date ?? account creation, due_date)` of the most
/// recently paid record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct FeeRecord {
    pub id: i64,
    pub member_id: i64,
    pub due_date: i64,
    pub amount: i64,
    pub renewal_type: RenewalType,
    pub previous_due_date: Option<i64>,
    pub status: FeeStatus,
    pub deducted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Admin payload for creating a fee record out of cycle (e.g. a fresh
/// obligation after a failed deduction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRecordCreate {
    pub member_id: i64,
    pub due_date: i64,
    pub renewal_type: RenewalType,
    pub previous_due_date: Option<i64>,
}
