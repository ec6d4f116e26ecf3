//! Club Configuration Models

use serde::{Deserialize, Serialize};

/// Read-mostly configuration singleton (营业配置)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ClubSettings {
    pub id: i64,
    /// Base redemption quotas before visited-hours bonuses.
    pub daily_limit: i64,
    pub total_limit: i64,
    /// Per-hour ceiling; engine falls back to 1 when unset.
    pub hourly_limit: Option<i64>,
    /// Venue-local time-of-day after which redemption is refused (HH:MM).
    pub cutoff_time: String,
    /// Points charged per visited hour.
    pub hourly_point_rate: i64,
    /// Hours assigned to sessions force-closed by the expiry sweep.
    pub expiry_forced_hours: f64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClubSettingsUpdate {
    pub daily_limit: Option<i64>,
    pub total_limit: Option<i64>,
    pub hourly_limit: Option<i64>,
    pub cutoff_time: Option<String>,
    pub hourly_point_rate: Option<i64>,
    pub expiry_forced_hours: Option<f64>,
}

/// One row of the dated annual-fee table.
///
/// Validity window is `[start_date, end_date)`; an open `end_date`
/// means the amount applies indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct AnnualFee {
    pub id: i64,
    pub start_date: i64,
    pub end_date: Option<i64>,
    pub amount: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnualFeeCreate {
    pub start_date: i64,
    pub end_date: Option<i64>,
    pub amount: i64,
}
