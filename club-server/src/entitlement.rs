//! Redemption Entitlement Engine
//!
//! Quota ceilings derive from visited hours inside the current
//! membership period; consumption is counted from completed redemption
//! items bucketed by venue-local day / hour keys. Fulfillment is
//! two-phase: the member requests a unit (pending_selection), an
//! administrator assigns the concrete product and confirms.
//!
//! The quota check runs INSIDE the same transaction that appends the
//! item, so two concurrent requests for one member cannot both pass a
//! stale count and overshoot the ceiling.

use chrono_tz::Tz;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;

use crate::billing;
use crate::db::repository::{RepoError, member, redemption, settings, visit_session};
use crate::utils::{AppError, time};
use shared::models::{
    ClubSettings, EffectiveLimits, Member, MemberStatus, RedemptionItem, RedemptionMirrorEntry,
    RedemptionStatus, VisitSession,
};

#[derive(Debug, Error)]
pub enum RedeemError {
    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("Member {0} not found")]
    MemberNotFound(i64),

    #[error("Member {0} is inactive")]
    MemberInactive(i64),

    #[error("Redemption refused after daily cutoff")]
    PastCutoff,

    #[error("Member {0} has no open visit session")]
    NoOpenSession(i64),

    #[error("Daily redemption limit {limit} exceeded")]
    DailyExceeded { limit: i64 },

    #[error("Total redemption limit {limit} exceeded for this membership period")]
    TotalExceeded { limit: i64 },

    #[error("Hourly redemption limit {limit} exceeded")]
    HourlyExceeded { limit: i64 },

    #[error("Redemption item {0} not found")]
    ItemNotFound(i64),

    #[error("Redemption item {0} already confirmed")]
    AlreadyConfirmed(i64),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<RedeemError> for AppError {
    fn from(e: RedeemError) -> Self {
        match e {
            RedeemError::InvalidQuantity(_) => AppError::Validation(e.to_string()),
            RedeemError::MemberNotFound(_) | RedeemError::ItemNotFound(_) => {
                AppError::NotFound(e.to_string())
            }
            RedeemError::AlreadyConfirmed(_) => AppError::Conflict(e.to_string()),
            RedeemError::MemberInactive(_)
            | RedeemError::PastCutoff
            | RedeemError::NoOpenSession(_)
            | RedeemError::DailyExceeded { .. }
            | RedeemError::TotalExceeded { .. }
            | RedeemError::HourlyExceeded { .. } => AppError::BusinessRule(e.to_string()),
            RedeemError::Repo(re) => re.into(),
        }
    }
}

/// Quota ceilings after the visited-hours bonus. Step function at
/// 50/100/150 hours; the hourly ceiling never grows with hours and
/// defaults to 1 when unset.
pub fn effective_limits(config: &ClubSettings, period_hours: f64) -> EffectiveLimits {
    let (daily_bonus, total_bonus) = if period_hours >= 150.0 {
        (3, 75)
    } else if period_hours >= 100.0 {
        (2, 50)
    } else if period_hours >= 50.0 {
        (1, 25)
    } else {
        (0, 0)
    };
    EffectiveLimits {
        daily_limit: config.daily_limit + daily_bonus,
        total_limit: config.total_limit + total_bonus,
        hourly_limit: config.hourly_limit.unwrap_or(1),
    }
}

/// Current ceilings for a member, for display alongside the quota
/// rejection reasons.
pub async fn limits(pool: &SqlitePool, member_id: i64) -> Result<EffectiveLimits, RedeemError> {
    let mut conn = pool.acquire().await.map_err(RepoError::from)?;
    let member = member::find_by_id_conn(&mut conn, member_id)
        .await?
        .ok_or(RedeemError::MemberNotFound(member_id))?;
    let config = settings::get_conn(&mut conn).await?;
    let hours = period_hours(&mut conn, &member).await?;
    Ok(effective_limits(&config, hours))
}

/// Visited hours inside the current membership period. The period is
/// re-resolved from the fee history on every call; never cached.
async fn period_hours(conn: &mut SqliteConnection, member: &Member) -> Result<f64, RepoError> {
    let (start, end) = billing::membership_period(conn, member).await?;
    visit_session::sum_hours_in_period(conn, member.id, start, end).await
}

/// Ordered eligibility checks. Returns the member, their open session
/// and the computed ceilings so the append can reuse them without
/// re-reading.
async fn check_redeemable(
    conn: &mut SqliteConnection,
    member_id: i64,
    quantity: i64,
    at: i64,
    tz: Tz,
) -> Result<(Member, VisitSession, EffectiveLimits), RedeemError> {
    if quantity <= 0 {
        return Err(RedeemError::InvalidQuantity(quantity));
    }
    let member = member::find_by_id_conn(conn, member_id)
        .await?
        .ok_or(RedeemError::MemberNotFound(member_id))?;
    if member.status != MemberStatus::Active {
        return Err(RedeemError::MemberInactive(member_id));
    }

    let config = settings::get_conn(conn).await?;
    let cutoff = time::parse_cutoff(&config.cutoff_time);
    if time::past_cutoff(at, cutoff, tz) {
        return Err(RedeemError::PastCutoff);
    }

    let session = visit_session::find_pending_by_member(conn, member_id)
        .await?
        .ok_or(RedeemError::NoOpenSession(member_id))?;

    let hours = period_hours(conn, &member).await?;
    let limits = effective_limits(&config, hours);

    let day = time::day_key(at, tz);
    let used_today = redemption::completed_in_day(conn, member_id, &day).await?;
    if used_today + quantity > limits.daily_limit {
        return Err(RedeemError::DailyExceeded {
            limit: limits.daily_limit,
        });
    }

    let (start, end) = billing::membership_period(conn, &member).await?;
    let used_period = redemption::completed_in_period(conn, member_id, start, end).await?;
    if used_period + quantity > limits.total_limit {
        return Err(RedeemError::TotalExceeded {
            limit: limits.total_limit,
        });
    }

    // Pending items occupy the hour bucket too, so flooding the request
    // phase cannot park more than the hourly ceiling.
    let hour = time::hour_key(at, tz);
    let used_hour = redemption::units_in_hour(conn, member_id, &hour).await?;
    if used_hour + quantity > limits.hourly_limit {
        return Err(RedeemError::HourlyExceeded {
            limit: limits.hourly_limit,
        });
    }

    Ok((member, session, limits))
}

/// Dry-run eligibility check for the UI.
pub async fn can_redeem(
    pool: &SqlitePool,
    member_id: i64,
    quantity: i64,
    at: i64,
    tz: Tz,
) -> Result<EffectiveLimits, RedeemError> {
    let mut conn = pool.acquire().await.map_err(RepoError::from)?;
    let (_, _, limits) = check_redeemable(&mut conn, member_id, quantity, at, tz).await?;
    Ok(limits)
}

/// Member-initiated request: appends a `pending_selection` item to the
/// open session and refreshes the session's display mirror, all in one
/// transaction with the quota check.
pub async fn request_redemption(
    pool: &SqlitePool,
    member_id: i64,
    quantity: i64,
    at: i64,
    tz: Tz,
) -> Result<RedemptionItem, RedeemError> {
    let mut tx = pool.begin().await.map_err(RepoError::from)?;

    let (_, session, _) = check_redeemable(&mut tx, member_id, quantity, at, tz).await?;

    let day = time::day_key(at, tz);
    let hour = time::hour_key(at, tz);
    let id = redemption::insert(
        &mut tx,
        session.id,
        member_id,
        RedemptionStatus::PendingSelection,
        &day,
        &hour,
        quantity,
        None,
        None,
        at,
    )
    .await?;
    rebuild_mirror(&mut tx, session.id).await?;

    let item = redemption::find_by_id(&mut tx, id)
        .await?
        .ok_or(RedeemError::ItemNotFound(id))?;
    tx.commit().await.map_err(RepoError::from)?;

    tracing::info!(member_id, session_id = session.id, quantity, "Redemption requested");
    Ok(item)
}

/// Admin-initiated confirm: fills in the chosen product and completes
/// the item. The pending-selection row guard makes a duplicate confirm
/// fail instead of double-counting against the quotas.
pub async fn confirm_redemption(
    pool: &SqlitePool,
    item_id: i64,
    product_ref: &str,
    quantity: i64,
    confirmed_by: &str,
) -> Result<RedemptionItem, RedeemError> {
    if quantity <= 0 {
        return Err(RedeemError::InvalidQuantity(quantity));
    }
    let now = shared::util::now_millis();
    let mut tx = pool.begin().await.map_err(RepoError::from)?;

    let item = redemption::find_by_id(&mut tx, item_id)
        .await?
        .ok_or(RedeemError::ItemNotFound(item_id))?;
    if !redemption::confirm_row(&mut tx, item_id, product_ref, quantity, confirmed_by, now).await? {
        return Err(RedeemError::AlreadyConfirmed(item_id));
    }
    rebuild_mirror(&mut tx, item.session_id).await?;

    let confirmed = redemption::find_by_id(&mut tx, item_id)
        .await?
        .ok_or(RedeemError::ItemNotFound(item_id))?;
    tx.commit().await.map_err(RepoError::from)?;

    tracing::info!(item_id, product_ref, confirmed_by, "Redemption confirmed");
    Ok(confirmed)
}

/// Manual override path: an administrator records a completed
/// redemption directly, bypassing the request phase and every quota
/// ceiling. Still requires an active member with an open session.
pub async fn admin_assign(
    pool: &SqlitePool,
    member_id: i64,
    quantity: i64,
    product_ref: &str,
    confirmed_by: &str,
    at: i64,
    tz: Tz,
) -> Result<RedemptionItem, RedeemError> {
    if quantity <= 0 {
        return Err(RedeemError::InvalidQuantity(quantity));
    }
    let mut tx = pool.begin().await.map_err(RepoError::from)?;

    let member = member::find_by_id_conn(&mut tx, member_id)
        .await?
        .ok_or(RedeemError::MemberNotFound(member_id))?;
    if member.status != MemberStatus::Active {
        return Err(RedeemError::MemberInactive(member_id));
    }
    let session = visit_session::find_pending_by_member(&mut tx, member_id)
        .await?
        .ok_or(RedeemError::NoOpenSession(member_id))?;

    let day = time::day_key(at, tz);
    let hour = time::hour_key(at, tz);
    let id = redemption::insert(
        &mut tx,
        session.id,
        member_id,
        RedemptionStatus::Completed,
        &day,
        &hour,
        quantity,
        Some(product_ref),
        Some(confirmed_by),
        at,
    )
    .await?;
    rebuild_mirror(&mut tx, session.id).await?;

    let item = redemption::find_by_id(&mut tx, id)
        .await?
        .ok_or(RedeemError::ItemNotFound(id))?;
    tx.commit().await.map_err(RepoError::from)?;

    tracing::info!(member_id, session_id = session.id, product_ref, "Redemption assigned by admin");
    Ok(item)
}

/// Rewrite the session's display mirror from the canonical items. The
/// item table is the source of truth; the mirror is a cache reconciled
/// on every write.
async fn rebuild_mirror(conn: &mut SqliteConnection, session_id: i64) -> Result<(), RedeemError> {
    let items = redemption::find_by_session_conn(conn, session_id).await?;
    let mirror: Vec<RedemptionMirrorEntry> = items.iter().map(RedemptionMirrorEntry::from).collect();
    let json = serde_json::to_string(&mirror)
        .map_err(|e| RepoError::Database(format!("Failed to serialize redemption mirror: {e}")))?;
    visit_session::set_redemptions_mirror(conn, session_id, &json, shared::util::now_millis())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::test_pool;
    use crate::visits;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Asia::Macau;
    use shared::models::ClubSettingsUpdate;

    const TZ: Tz = Macau;

    fn base_config() -> ClubSettings {
        ClubSettings {
            id: 1,
            daily_limit: 1,
            total_limit: 25,
            hourly_limit: Some(1),
            cutoff_time: "23:00".into(),
            hourly_point_rate: 10,
            expiry_forced_hours: 5.0,
            updated_at: 0,
        }
    }

    /// Fixed instant safely inside the 23:00 cutoff: 10:00 Macau.
    fn mid_morning() -> i64 {
        Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0)
            .unwrap()
            .timestamp_millis()
    }

    async fn raise_limits(pool: &SqlitePool, daily: i64, hourly: i64) {
        settings::update(
            pool,
            &ClubSettingsUpdate {
                daily_limit: Some(daily),
                total_limit: None,
                hourly_limit: Some(hourly),
                cutoff_time: None,
                hourly_point_rate: None,
                expiry_forced_hours: None,
            },
        )
        .await
        .unwrap();
    }

    /// Insert a completed historical session so period hours add up.
    async fn seed_completed_hours(pool: &SqlitePool, member_id: i64, hours: f64) {
        let check_in = shared::util::now_millis() - 48 * 3600 * 1000;
        let mut conn = pool.acquire().await.unwrap();
        let id = visit_session::insert(&mut conn, member_id, check_in, false)
            .await
            .unwrap();
        visit_session::close_row(&mut conn, id, check_in + 1000, (hours * 60.0) as i64, hours, 0)
            .await
            .unwrap();
    }

    #[test]
    fn limits_step_at_milestones() {
        let config = base_config();
        // Scenario: 52 period hours against a base total of 25 → 50
        let at_52 = effective_limits(&config, 52.0);
        assert_eq!(at_52.total_limit, 50);
        assert_eq!(at_52.daily_limit, 2);

        assert_eq!(effective_limits(&config, 0.0).total_limit, 25);
        assert_eq!(effective_limits(&config, 49.9).daily_limit, 1);
        assert_eq!(effective_limits(&config, 100.0).daily_limit, 3);
        assert_eq!(effective_limits(&config, 150.0).total_limit, 100);
        assert_eq!(effective_limits(&config, 150.0).daily_limit, 4);

        // Hourly ceiling never grows with hours
        assert_eq!(effective_limits(&config, 150.0).hourly_limit, 1);
        let mut no_hourly = base_config();
        no_hourly.hourly_limit = None;
        assert_eq!(effective_limits(&no_hourly, 0.0).hourly_limit, 1);
    }

    #[test]
    fn daily_limit_is_monotonic_in_hours() {
        let config = base_config();
        let mut prev = 0;
        for tenth in 0..=2000 {
            let hours = tenth as f64 / 10.0;
            let daily = effective_limits(&config, hours).daily_limit;
            assert!(daily >= prev, "daily limit decreased at {hours}h");
            prev = daily;
        }
    }

    #[tokio::test]
    async fn cutoff_boundary_allows_2259_refuses_2300() {
        let pool = test_pool().await;
        visits::open_session(&pool, 1).await.unwrap();

        // 22:59 Macau
        let before = Utc
            .with_ymd_and_hms(2025, 6, 1, 14, 59, 0)
            .unwrap()
            .timestamp_millis();
        can_redeem(&pool, 1, 1, before, TZ).await.unwrap();

        // 23:00 Macau
        let at = Utc
            .with_ymd_and_hms(2025, 6, 1, 15, 0, 0)
            .unwrap()
            .timestamp_millis();
        let err = can_redeem(&pool, 1, 1, at, TZ).await.unwrap_err();
        assert!(matches!(err, RedeemError::PastCutoff));
    }

    #[tokio::test]
    async fn ordered_rejections() {
        let pool = test_pool().await;
        let at = mid_morning();

        let err = can_redeem(&pool, 1, 0, at, TZ).await.unwrap_err();
        assert!(matches!(err, RedeemError::InvalidQuantity(0)));

        let err = can_redeem(&pool, 999, 1, at, TZ).await.unwrap_err();
        assert!(matches!(err, RedeemError::MemberNotFound(999)));

        // Bob is seeded inactive
        let err = can_redeem(&pool, 2, 1, at, TZ).await.unwrap_err();
        assert!(matches!(err, RedeemError::MemberInactive(2)));

        // Alice is active but has no open session
        let err = can_redeem(&pool, 1, 1, at, TZ).await.unwrap_err();
        assert!(matches!(err, RedeemError::NoOpenSession(1)));
    }

    #[tokio::test]
    async fn request_then_confirm_consumes_daily_quota() {
        let pool = test_pool().await;
        raise_limits(&pool, 1, 10).await;
        visits::open_session(&pool, 1).await.unwrap();
        let at = mid_morning();

        let item = request_redemption(&pool, 1, 1, at, TZ).await.unwrap();
        assert_eq!(item.status, RedemptionStatus::PendingSelection);

        // Pending does not consume daily quota yet (next hour bucket)
        can_redeem(&pool, 1, 1, at + 3600_000, TZ).await.unwrap();

        confirm_redemption(&pool, item.id, "soda", 1, "admin").await.unwrap();

        // Completed unit now fills the 1-per-day ceiling
        let err = can_redeem(&pool, 1, 1, at + 3600_000, TZ).await.unwrap_err();
        assert!(matches!(err, RedeemError::DailyExceeded { limit: 1 }));
    }

    #[tokio::test]
    async fn pending_item_occupies_hour_bucket() {
        let pool = test_pool().await;
        raise_limits(&pool, 5, 1).await;
        visits::open_session(&pool, 1).await.unwrap();
        let at = mid_morning();

        request_redemption(&pool, 1, 1, at, TZ).await.unwrap();
        let err = request_redemption(&pool, 1, 1, at, TZ).await.unwrap_err();
        assert!(matches!(err, RedeemError::HourlyExceeded { limit: 1 }));

        // Next hour bucket is free again
        request_redemption(&pool, 1, 1, at + 3600_000, TZ).await.unwrap();
    }

    #[tokio::test]
    async fn total_limit_scopes_to_membership_period() {
        let pool = test_pool().await;
        // total_limit 1 so a single completed unit exhausts the period
        settings::update(
            &pool,
            &ClubSettingsUpdate {
                daily_limit: Some(5),
                total_limit: Some(1),
                hourly_limit: Some(5),
                cutoff_time: None,
                hourly_point_rate: None,
                expiry_forced_hours: None,
            },
        )
        .await
        .unwrap();
        visits::open_session(&pool, 1).await.unwrap();
        let at = mid_morning();

        admin_assign(&pool, 1, 1, "soda", "admin", at, TZ).await.unwrap();
        let err = can_redeem(&pool, 1, 1, at + 2 * 3600_000, TZ).await.unwrap_err();
        assert!(matches!(err, RedeemError::TotalExceeded { limit: 1 }));
    }

    #[tokio::test]
    async fn milestone_hours_raise_total_ceiling() {
        let pool = test_pool().await;
        seed_completed_hours(&pool, 1, 52.0).await;
        let limits = limits(&pool, 1).await.unwrap();
        assert_eq!(limits.total_limit, 50);
        assert_eq!(limits.daily_limit, 2);
    }

    #[tokio::test]
    async fn confirm_twice_is_rejected() {
        let pool = test_pool().await;
        raise_limits(&pool, 5, 5).await;
        visits::open_session(&pool, 1).await.unwrap();
        let item = request_redemption(&pool, 1, 1, mid_morning(), TZ).await.unwrap();

        confirm_redemption(&pool, item.id, "soda", 1, "admin").await.unwrap();
        let err = confirm_redemption(&pool, item.id, "beer", 1, "admin").await.unwrap_err();
        assert!(matches!(err, RedeemError::AlreadyConfirmed(_)));

        // Quantity unchanged by the rejected second confirm
        let mut conn = pool.acquire().await.unwrap();
        let stored = redemption::find_by_id(&mut conn, item.id).await.unwrap().unwrap();
        assert_eq!(stored.product_ref.as_deref(), Some("soda"));
    }

    #[tokio::test]
    async fn mirror_tracks_canonical_items() {
        let pool = test_pool().await;
        raise_limits(&pool, 5, 5).await;
        let session = visits::open_session(&pool, 1).await.unwrap();
        let at = mid_morning();

        let item = request_redemption(&pool, 1, 1, at, TZ).await.unwrap();
        admin_assign(&pool, 1, 2, "juice", "admin", at + 3600_000, TZ).await.unwrap();
        confirm_redemption(&pool, item.id, "soda", 1, "admin").await.unwrap();

        let stored = visit_session::find_by_id(&pool, session.id).await.unwrap().unwrap();
        let mirror: Vec<RedemptionMirrorEntry> = serde_json::from_str(&stored.redemptions).unwrap();
        let items = redemption::find_by_session(&pool, session.id).await.unwrap();
        assert_eq!(mirror.len(), items.len());
        for (m, i) in mirror.iter().zip(items.iter()) {
            assert_eq!(m.id, i.id);
            assert_eq!(m.status, i.status);
            assert_eq!(m.quantity, i.quantity);
            assert_eq!(m.product_ref, i.product_ref);
        }
    }

    #[tokio::test]
    async fn admin_assign_bypasses_quota_but_not_session() {
        let pool = test_pool().await;
        let at = mid_morning();

        // No open session: refused even for admins
        let err = admin_assign(&pool, 1, 1, "soda", "admin", at, TZ).await.unwrap_err();
        assert!(matches!(err, RedeemError::NoOpenSession(1)));

        visits::open_session(&pool, 1).await.unwrap();
        // Base ceilings are 1/day, 1/hour; admin writes three in one hour
        for _ in 0..3 {
            admin_assign(&pool, 1, 1, "soda", "admin", at, TZ).await.unwrap();
        }

        // Inactive member: still refused
        let err = admin_assign(&pool, 2, 1, "soda", "admin", at, TZ).await.unwrap_err();
        assert!(matches!(err, RedeemError::MemberInactive(2)));
    }
}
