//! Visit Session Tracker
//!
//! State machine for a member's checked-in presence:
//! `none → pending → completed`. Closing a session converts elapsed
//! time into a point charge posted through the ledger, all inside one
//! transaction. The expiry sweep force-closes sessions left open ≥24h.

use sqlx::SqlitePool;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::ServerState;
use crate::db::repository::{RepoError, ledger, member, settings, visit_session};
use crate::utils::AppError;
use shared::models::{
    LedgerDirection, LedgerSource, MemberStatus, SessionStatus, VisitSession,
};

/// Sessions still pending after this long are force-closed by the sweep.
const EXPIRY_AGE_MS: i64 = 24 * 3600 * 1000;

/// How often the expiry sweep wakes up.
const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum VisitError {
    #[error("Member {0} already has an open session")]
    AlreadyOpen(i64),

    #[error("Member {0} is inactive")]
    MemberInactive(i64),

    #[error("Member {0} not found")]
    MemberNotFound(i64),

    #[error("Session {0} not found")]
    SessionNotFound(i64),

    #[error("Session {0} is not pending")]
    NotPending(i64),

    #[error("Forced hours must be a non-negative finite number, got {0}")]
    InvalidForcedHours(f64),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<VisitError> for AppError {
    fn from(e: VisitError) -> Self {
        match e {
            VisitError::AlreadyOpen(_) => AppError::Conflict(e.to_string()),
            VisitError::MemberInactive(_) | VisitError::NotPending(_) => {
                AppError::BusinessRule(e.to_string())
            }
            VisitError::MemberNotFound(_) | VisitError::SessionNotFound(_) => {
                AppError::NotFound(e.to_string())
            }
            VisitError::InvalidForcedHours(_) => AppError::Validation(e.to_string()),
            VisitError::Repo(re) => re.into(),
        }
    }
}

/// Duration→hours rounding rule.
///
/// ≤15 min is a grace period (no charge), ≤30 min is half an hour,
/// anything longer rounds up to whole hours.
pub fn round_duration_hours(minutes: i64) -> f64 {
    if minutes <= 15 {
        0.0
    } else if minutes <= 30 {
        0.5
    } else {
        // minutes is non-negative here (clamped by the caller)
        ((minutes + 59) / 60) as f64
    }
}

/// Check-in: create a pending session and point the member at it.
///
/// Snapshots the renewal waiver into `is_waived` and consumes it — the
/// waiver covers exactly one visit.
pub async fn open_session(pool: &SqlitePool, member_id: i64) -> Result<VisitSession, VisitError> {
    let now = shared::util::now_millis();
    let mut tx = pool.begin().await.map_err(RepoError::from)?;

    let member = member::find_by_id_conn(&mut tx, member_id)
        .await?
        .ok_or(VisitError::MemberNotFound(member_id))?;
    if member.status != MemberStatus::Active {
        return Err(VisitError::MemberInactive(member_id));
    }
    if visit_session::find_pending_by_member(&mut tx, member_id)
        .await?
        .is_some()
    {
        return Err(VisitError::AlreadyOpen(member_id));
    }

    let is_waived = member
        .renewal_waiver_expires_at
        .is_some_and(|expires| now <= expires);

    let session_id = visit_session::insert(&mut tx, member_id, now, is_waived).await?;
    member::mark_checked_in(&mut tx, member_id, session_id, now, is_waived).await?;
    tx.commit().await.map_err(RepoError::from)?;

    tracing::info!(member_id, session_id, is_waived, "Member checked in");

    visit_session::find_by_id(pool, session_id)
        .await?
        .ok_or(VisitError::SessionNotFound(session_id))
}

/// Check-out: compute duration and charge, post the ledger entry, mark
/// the session completed and credit the visited hours — one transaction.
///
/// `forced_hours` overrides the elapsed time (expiry sweep, manual admin
/// correction); the rounding rule is skipped for forced closes.
pub async fn close_session(
    pool: &SqlitePool,
    session_id: i64,
    forced_hours: Option<f64>,
) -> Result<VisitSession, VisitError> {
    // A negative or non-finite override would corrupt the hours counter
    // and the charge: reject before any write.
    if let Some(h) = forced_hours
        && (!h.is_finite() || h < 0.0)
    {
        return Err(VisitError::InvalidForcedHours(h));
    }

    let config = settings::get(pool).await?;
    let now = shared::util::now_millis();
    let mut tx = pool.begin().await.map_err(RepoError::from)?;

    let session = visit_session::find_by_id_conn(&mut tx, session_id)
        .await?
        .ok_or(VisitError::SessionNotFound(session_id))?;
    if session.status != SessionStatus::Pending {
        return Err(VisitError::NotPending(session_id));
    }

    let (minutes, hours) = match forced_hours {
        Some(h) => ((h * 60.0).round() as i64, h),
        None => {
            let elapsed = ((now - session.check_in_at) / 60_000).max(0);
            (elapsed, round_duration_hours(elapsed))
        }
    };

    let charge = if session.is_waived {
        0
    } else {
        (hours * config.hourly_point_rate as f64).round() as i64
    };

    if charge > 0 {
        // Balance may go negative; the billing cycle reacts to that.
        ledger::post_with_conn(
            &mut tx,
            session.member_id,
            LedgerDirection::Spend,
            charge,
            LedgerSource::Visit,
            Some(session_id),
        )
        .await?;
    }

    let closed = visit_session::close_row(&mut tx, session_id, now, minutes, hours, charge).await?;
    if !closed {
        return Err(VisitError::NotPending(session_id));
    }
    member::mark_checked_out(&mut tx, session.member_id, hours, now).await?;
    tx.commit().await.map_err(RepoError::from)?;

    tracing::info!(
        member_id = session.member_id,
        session_id,
        minutes,
        hours,
        charge,
        "Member checked out"
    );

    visit_session::find_by_id(pool, session_id)
        .await?
        .ok_or(VisitError::SessionNotFound(session_id))
}

/// Outcome of one expiry sweep run.
#[derive(Debug, Default, serde::Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub closed: usize,
    pub failed: usize,
}

/// Force-close every pending session open ≥24h with the configured
/// fallback hours. Failures are isolated per session; one bad record
/// never aborts the batch.
pub async fn run_expiry_sweep(pool: &SqlitePool) -> Result<SweepReport, VisitError> {
    let config = settings::get(pool).await?;
    let opened_before = shared::util::now_millis() - EXPIRY_AGE_MS;
    let stale = visit_session::find_stale(pool, opened_before).await?;

    let mut report = SweepReport {
        scanned: stale.len(),
        ..Default::default()
    };
    for session in stale {
        match close_session(pool, session.id, Some(config.expiry_forced_hours)).await {
            Ok(_) => report.closed += 1,
            Err(e) => {
                tracing::error!(session_id = session.id, error = %e, "Failed to expire session");
                report.failed += 1;
            }
        }
    }
    if report.scanned > 0 {
        tracing::info!(
            scanned = report.scanned,
            closed = report.closed,
            failed = report.failed,
            "Expiry sweep finished"
        );
    }
    Ok(report)
}

/// 过期会话扫描调度器
///
/// 注册为 `TaskKind::Periodic`，在 `start_background_tasks()` 中启动。
pub struct ExpirySweepScheduler {
    state: ServerState,
    shutdown: CancellationToken,
}

impl ExpirySweepScheduler {
    pub fn new(state: ServerState, shutdown: CancellationToken) -> Self {
        Self { state, shutdown }
    }

    pub async fn run(self) {
        tracing::info!("Session expiry sweep started");

        // 启动时立即扫描一次
        self.sweep_once().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                    self.sweep_once().await;
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Session expiry sweep received shutdown signal");
                    return;
                }
            }
        }
    }

    async fn sweep_once(&self) {
        if let Err(e) = run_expiry_sweep(&self.state.pool).await {
            tracing::error!("Expiry sweep failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::test_pool;

    #[test]
    fn duration_rounding_table() {
        let cases = [
            (0, 0.0),
            (10, 0.0),
            (15, 0.0),
            (16, 0.5),
            (30, 0.5),
            (31, 1.0),
            (50, 1.0),
            (60, 1.0),
            (61, 2.0),
            (90, 2.0),
            (120, 2.0),
            (121, 3.0),
        ];
        for (minutes, expected) in cases {
            assert_eq!(round_duration_hours(minutes), expected, "minutes={minutes}");
        }
    }

    #[tokio::test]
    async fn open_sets_session_pointer() {
        let pool = test_pool().await;
        let session = open_session(&pool, 1).await.unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
        assert!(!session.is_waived);

        let alice = member::find_by_id(&pool, 1).await.unwrap().unwrap();
        assert_eq!(alice.current_session_id, Some(session.id));
        assert!(alice.last_check_in_at.is_some());
    }

    #[tokio::test]
    async fn second_open_is_rejected() {
        let pool = test_pool().await;
        open_session(&pool, 1).await.unwrap();
        let err = open_session(&pool, 1).await.unwrap_err();
        assert!(matches!(err, VisitError::AlreadyOpen(1)));
    }

    #[tokio::test]
    async fn inactive_member_cannot_check_in() {
        let pool = test_pool().await;
        let err = open_session(&pool, 2).await.unwrap_err();
        assert!(matches!(err, VisitError::MemberInactive(2)));
    }

    /// Scenario: 50 minutes at rate 10/h rounds up to 1h and charges 10.
    #[tokio::test]
    async fn fifty_minutes_charges_one_hour() {
        let pool = test_pool().await;
        let check_in = shared::util::now_millis() - 50 * 60_000;
        let mut conn = pool.acquire().await.unwrap();
        let session_id = visit_session::insert(&mut conn, 1, check_in, false).await.unwrap();
        drop(conn);

        let session = close_session(&pool, session_id, None).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.duration_hours, Some(1.0));
        assert_eq!(session.points_charged, Some(10));

        let alice = member::find_by_id(&pool, 1).await.unwrap().unwrap();
        assert_eq!(alice.point_balance, -10);
        assert_eq!(alice.total_visit_hours, 1.0);
        assert_eq!(alice.current_session_id, None);
    }

    #[tokio::test]
    async fn grace_period_is_free() {
        let pool = test_pool().await;
        let check_in = shared::util::now_millis() - 10 * 60_000;
        let mut conn = pool.acquire().await.unwrap();
        let session_id = visit_session::insert(&mut conn, 1, check_in, false).await.unwrap();
        drop(conn);

        let session = close_session(&pool, session_id, None).await.unwrap();
        assert_eq!(session.duration_hours, Some(0.0));
        assert_eq!(session.points_charged, Some(0));

        // No zero-amount noise in the ledger
        let entries = ledger::find_by_member(&pool, 1, 10, 0).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn waiver_exempts_one_session() {
        let pool = test_pool().await;
        let future = shared::util::now_millis() + 24 * 3600 * 1000;
        sqlx::query("UPDATE member SET renewal_waiver_expires_at = ? WHERE id = 1")
            .bind(future)
            .execute(&pool)
            .await
            .unwrap();

        let session = open_session(&pool, 1).await.unwrap();
        assert!(session.is_waived);

        // Waiver consumed at check-in
        let alice = member::find_by_id(&pool, 1).await.unwrap().unwrap();
        assert_eq!(alice.renewal_waiver_expires_at, None);

        // Backdate the check-in so the stay would normally be charged
        sqlx::query("UPDATE visit_session SET check_in_at = check_in_at - 7200000 WHERE id = ?")
            .bind(session.id)
            .execute(&pool)
            .await
            .unwrap();

        let closed = close_session(&pool, session.id, None).await.unwrap();
        assert_eq!(closed.points_charged, Some(0));
        let alice = member::find_by_id(&pool, 1).await.unwrap().unwrap();
        assert_eq!(alice.point_balance, 0);
    }

    #[tokio::test]
    async fn negative_forced_hours_rejected_before_any_write() {
        let pool = test_pool().await;
        let session = open_session(&pool, 1).await.unwrap();

        let err = close_session(&pool, session.id, Some(-5.0)).await.unwrap_err();
        assert!(matches!(err, VisitError::InvalidForcedHours(_)));
        let err = close_session(&pool, session.id, Some(f64::NAN)).await.unwrap_err();
        assert!(matches!(err, VisitError::InvalidForcedHours(_)));

        // Session untouched, hours counter untouched
        let session = visit_session::find_by_id(&pool, session.id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
        let alice = member::find_by_id(&pool, 1).await.unwrap().unwrap();
        assert_eq!(alice.total_visit_hours, 0.0);
        assert_eq!(alice.point_balance, 0);

        // Zero is a legal override (free close)
        let closed = close_session(&pool, session.id, Some(0.0)).await.unwrap();
        assert_eq!(closed.duration_hours, Some(0.0));
        assert_eq!(closed.points_charged, Some(0));
    }

    #[tokio::test]
    async fn close_twice_is_rejected() {
        let pool = test_pool().await;
        let session = open_session(&pool, 1).await.unwrap();
        close_session(&pool, session.id, None).await.unwrap();
        let err = close_session(&pool, session.id, None).await.unwrap_err();
        assert!(matches!(err, VisitError::NotPending(_)));
    }

    #[tokio::test]
    async fn expiry_sweep_force_closes_stale_sessions() {
        let pool = test_pool().await;
        let stale_check_in = shared::util::now_millis() - 25 * 3600 * 1000;
        let mut conn = pool.acquire().await.unwrap();
        let stale_id = visit_session::insert(&mut conn, 1, stale_check_in, false).await.unwrap();
        drop(conn);
        // A fresh session is not touched
        let fresh = open_session(&pool, 2).await.err(); // Bob inactive, skip
        assert!(fresh.is_some());

        let report = run_expiry_sweep(&pool).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.closed, 1);
        assert_eq!(report.failed, 0);

        // Default forced hours 5 × rate 10 = 50 points
        let session = visit_session::find_by_id(&pool, stale_id).await.unwrap().unwrap();
        assert_eq!(session.duration_hours, Some(5.0));
        assert_eq!(session.points_charged, Some(50));

        // Idempotent: nothing left to close
        let report = run_expiry_sweep(&pool).await.unwrap();
        assert_eq!(report.scanned, 0);
    }
}
