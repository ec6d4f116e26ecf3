//! Redemption Model

use serde::{Deserialize, Serialize};

/// Two-phase fulfillment: member requests a unit, admin assigns the
/// concrete product and confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum RedemptionStatus {
    PendingSelection,
    Completed,
}

/// One unit-of-goods claim tied to a visit session (兑换记录)
///
/// Rows sharing a `session_id` form the per-session aggregate; they are
/// only ever mutated inside a transaction that also rewrites the
/// session's display mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct RedemptionItem {
    pub id: i64,
    pub session_id: i64,
    pub member_id: i64,
    pub status: RedemptionStatus,
    /// Venue-local calendar day of `redeemed_at` (YYYY-MM-DD).
    pub day_key: String,
    /// Venue-local hour bucket of `redeemed_at` (YYYY-MM-DDTHH).
    pub hour_key: String,
    pub quantity: i64,
    /// Unset while pending admin fulfillment.
    pub product_ref: Option<String>,
    pub redeemed_at: i64,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Lightweight copy mirrored into `visit_session.redemptions` for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionMirrorEntry {
    pub id: i64,
    pub status: RedemptionStatus,
    pub quantity: i64,
    pub product_ref: Option<String>,
    pub redeemed_at: i64,
}

impl From<&RedemptionItem> for RedemptionMirrorEntry {
    fn from(item: &RedemptionItem) -> Self {
        Self {
            id: item.id,
            status: item.status,
            quantity: item.quantity,
            product_ref: item.product_ref.clone(),
            redeemed_at: item.redeemed_at,
        }
    }
}

/// Quota ceilings after applying visited-hours bonuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveLimits {
    pub daily_limit: i64,
    pub total_limit: i64,
    pub hourly_limit: i64,
}
