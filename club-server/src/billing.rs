//! Membership Billing Cycle
//!
//! Collects the annual fee from the points ledger, chains the next
//! obligation on success, and toggles the member's active flag. The
//! chain of paid records defines the membership period that scopes
//! visited hours and redemption counters.

use chrono::NaiveTime;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::ServerState;
use crate::db::repository::{RepoError, fee_record, ledger, member, settings};
use crate::utils::{AppError, time};
use shared::models::{
    FeeRecord, FeeStatus, LedgerDirection, LedgerSource, Member, MemberCreate, MemberStatus,
    RenewalType,
};

/// A successful renewal grants one charge-free visit inside this window.
const RENEWAL_WAIVER_MS: i64 = 30 * 24 * 3600 * 1000;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Fee record {0} already processed")]
    AlreadyProcessed(i64),

    #[error("Fee record {0} not found")]
    RecordNotFound(i64),

    #[error("Member {0} not found")]
    MemberNotFound(i64),

    #[error("Member {0} already has a pending fee record")]
    PendingExists(i64),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<BillingError> for AppError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::AlreadyProcessed(_) | BillingError::PendingExists(_) => {
                AppError::Conflict(e.to_string())
            }
            BillingError::RecordNotFound(_) | BillingError::MemberNotFound(_) => {
                AppError::NotFound(e.to_string())
            }
            BillingError::Repo(re) => re.into(),
        }
    }
}

/// Price and insert a pending record inside the caller's transaction.
async fn seed_record(
    conn: &mut SqliteConnection,
    member_id: i64,
    due_date: i64,
    renewal_type: RenewalType,
    previous_due_date: Option<i64>,
) -> Result<i64, BillingError> {
    let amount = settings::fee_amount_on(conn, due_date).await?;
    let id =
        fee_record::insert(conn, member_id, due_date, amount, renewal_type, previous_due_date)
            .await?;
    Ok(id)
}

/// Register a new member.
///
/// The member row, the initial fee record (due on the signup date) and
/// the optional welcome grant commit as one transaction; a mid-way
/// failure (e.g. an unseeded annual-fee table) leaves nothing behind.
pub async fn register_member(
    pool: &SqlitePool,
    payload: &MemberCreate,
) -> Result<Member, BillingError> {
    let mut tx = pool.begin().await.map_err(RepoError::from)?;

    let member = member::create(&mut tx, payload).await?;
    seed_record(&mut tx, member.id, member.created_at, RenewalType::Initial, None).await?;
    if let Some(points) = payload.registration_points
        && points > 0
    {
        ledger::post_with_conn(
            &mut tx,
            member.id,
            LedgerDirection::Earn,
            points,
            LedgerSource::Registration,
            None,
        )
        .await?;
    }
    tx.commit().await.map_err(RepoError::from)?;

    tracing::info!(member_id = member.id, name = %member.name, "Member registered");

    // Re-read: the welcome grant already moved the balance
    member::find_by_id(pool, member.id)
        .await?
        .ok_or(BillingError::MemberNotFound(member.id))
}

/// Create a pending fee record; the amount comes from the dated
/// annual-fee table as effective on `due_date`.
pub async fn create_fee_record(
    pool: &SqlitePool,
    member_id: i64,
    due_date: i64,
    renewal_type: RenewalType,
    previous_due_date: Option<i64>,
) -> Result<FeeRecord, BillingError> {
    let mut tx = pool.begin().await.map_err(RepoError::from)?;

    member::find_by_id_conn(&mut tx, member_id)
        .await?
        .ok_or(BillingError::MemberNotFound(member_id))?;
    if fee_record::has_pending(&mut tx, member_id).await? {
        return Err(BillingError::PendingExists(member_id));
    }

    let id = seed_record(&mut tx, member_id, due_date, renewal_type, previous_due_date).await?;
    tx.commit().await.map_err(RepoError::from)?;

    fee_record::find_by_id(pool, id)
        .await?
        .ok_or(BillingError::RecordNotFound(id))
}

/// Collect one pending fee record.
///
/// The `spend` ledger entry is posted unconditionally — a failed attempt
/// is itself the audit record and is never reversed. A non-negative
/// resulting balance marks the record paid, reactivates the member,
/// grants the renewal waiver, resets the period hour counter and chains
/// the next obligation exactly one year after the paid due date.
pub async fn deduct(pool: &SqlitePool, fee_record_id: i64) -> Result<FeeRecord, BillingError> {
    let now = shared::util::now_millis();
    let mut tx = pool.begin().await.map_err(RepoError::from)?;

    let record = fee_record::find_by_id_conn(&mut tx, fee_record_id)
        .await?
        .ok_or(BillingError::RecordNotFound(fee_record_id))?;
    if record.status != FeeStatus::Pending {
        return Err(BillingError::AlreadyProcessed(fee_record_id));
    }

    let entry = ledger::post_with_conn(
        &mut tx,
        record.member_id,
        LedgerDirection::Spend,
        record.amount,
        LedgerSource::MembershipFee,
        Some(record.id),
    )
    .await?;

    let paid = entry.resulting_balance >= 0;
    if !fee_record::mark_processed(&mut tx, record.id, paid, now).await? {
        return Err(BillingError::AlreadyProcessed(fee_record_id));
    }

    if paid {
        member::set_status(&mut tx, record.member_id, MemberStatus::Active, now).await?;
        if record.renewal_type == RenewalType::Renewal {
            member::set_renewal_waiver(&mut tx, record.member_id, now + RENEWAL_WAIVER_MS, now)
                .await?;
        }
        // New period: the display counter restarts; quota math re-derives
        // from the period-filtered session sum anyway.
        member::reset_visit_hours(&mut tx, record.member_id, now).await?;

        let next_due = shared::util::add_one_year_millis(record.due_date);
        seed_record(
            &mut tx,
            record.member_id,
            next_due,
            RenewalType::Renewal,
            Some(record.due_date),
        )
        .await?;
    } else {
        member::set_status(&mut tx, record.member_id, MemberStatus::Inactive, now).await?;
    }

    tx.commit().await.map_err(RepoError::from)?;

    tracing::info!(
        member_id = record.member_id,
        fee_record_id,
        amount = record.amount,
        resulting_balance = entry.resulting_balance,
        paid,
        "Fee deduction processed"
    );

    fee_record::find_by_id(pool, fee_record_id)
        .await?
        .ok_or(BillingError::RecordNotFound(fee_record_id))
}

/// Membership period window `[start, end)` — a pure function of the fee
/// history, recomputed on demand and never cached across requests.
pub async fn membership_period(
    conn: &mut SqliteConnection,
    member: &Member,
) -> Result<(i64, i64), RepoError> {
    match fee_record::find_most_recent_paid(conn, member.id).await? {
        Some(paid) => Ok((
            paid.previous_due_date.unwrap_or(member.created_at),
            paid.due_date,
        )),
        // Nothing paid yet: open-ended window from account creation.
        None => Ok((member.created_at, i64::MAX)),
    }
}

/// Outcome of one fee sweep run.
#[derive(Debug, Default, serde::Serialize)]
pub struct FeeSweepReport {
    pub scanned: usize,
    pub paid: usize,
    pub failed_payment: usize,
    pub errors: usize,
}

/// Deduct every pending record due by the end of the current venue-local
/// day. The pending-status guard makes re-runs (and catch-up after
/// downtime) idempotent; per-record errors never abort the batch.
pub async fn run_fee_sweep(pool: &SqlitePool, tz: chrono_tz::Tz) -> Result<FeeSweepReport, BillingError> {
    let due_before = time::end_of_today_millis(tz);
    let due = fee_record::find_due_pending(pool, due_before).await?;

    let mut report = FeeSweepReport {
        scanned: due.len(),
        ..Default::default()
    };
    for record in due {
        match deduct(pool, record.id).await {
            Ok(processed) if processed.status == FeeStatus::Paid => report.paid += 1,
            Ok(_) => report.failed_payment += 1,
            Err(e) => {
                tracing::error!(fee_record_id = record.id, error = %e, "Fee deduction failed");
                report.errors += 1;
            }
        }
    }
    if report.scanned > 0 {
        tracing::info!(
            scanned = report.scanned,
            paid = report.paid,
            failed_payment = report.failed_payment,
            errors = report.errors,
            "Fee sweep finished"
        );
    }
    Ok(report)
}

/// 年费扣款调度器 — 每天在 cutoff 时间点执行一次
///
/// 注册为 `TaskKind::Periodic`，在 `start_background_tasks()` 中启动。
pub struct FeeSweepScheduler {
    state: ServerState,
    shutdown: CancellationToken,
}

impl FeeSweepScheduler {
    pub fn new(state: ServerState, shutdown: CancellationToken) -> Self {
        Self { state, shutdown }
    }

    pub async fn run(self) {
        tracing::info!("Fee deduction sweep started");

        // 启动时立即扫描一次（停机期间错过的到期记录）
        self.sweep_once().await;

        loop {
            let cutoff = self.get_cutoff_time().await;
            let tz = self.state.config.timezone;
            let sleep_duration = time::duration_until_next_cutoff(cutoff, tz);

            tracing::info!(
                "Next fee sweep in {} minutes (cutoff={})",
                sleep_duration.as_secs() / 60,
                cutoff.format("%H:%M")
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.sweep_once().await;
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Fee sweep received shutdown signal");
                    return;
                }
            }
        }
    }

    async fn sweep_once(&self) {
        if let Err(e) = run_fee_sweep(&self.state.pool, self.state.config.timezone).await {
            tracing::error!("Fee sweep failed: {}", e);
        }
    }

    /// 每次从 DB 读取 cutoff，支持动态修改
    async fn get_cutoff_time(&self) -> NaiveTime {
        let cutoff_str = settings::get(&self.state.pool)
            .await
            .map(|s| s.cutoff_time)
            .unwrap_or_else(|_| "23:00".to_string());
        time::parse_cutoff(&cutoff_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::test_pool;
    use shared::models::AnnualFeeCreate;

    async fn seed_annual_fee(pool: &SqlitePool, amount: i64) {
        settings::insert_annual_fee(
            pool,
            &AnnualFeeCreate {
                start_date: 0,
                end_date: None,
                amount,
            },
        )
        .await
        .unwrap();
    }

    async fn earn(pool: &SqlitePool, member_id: i64, amount: i64) {
        ledger::post(pool, member_id, LedgerDirection::Earn, amount, LedgerSource::Reload, None)
            .await
            .unwrap();
    }

    fn signup(name: &str, points: Option<i64>) -> MemberCreate {
        MemberCreate {
            name: name.into(),
            phone: None,
            email: None,
            notes: None,
            registration_points: points,
        }
    }

    #[tokio::test]
    async fn registration_commits_member_fee_and_grant_together() {
        let pool = test_pool().await;
        seed_annual_fee(&pool, 1000).await;

        let carol = register_member(&pool, &signup("Carol", Some(200))).await.unwrap();
        assert_eq!(carol.point_balance, 200);
        assert_eq!(carol.status, MemberStatus::Active);

        let records = fee_record::find_by_member(&pool, carol.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, FeeStatus::Pending);
        assert_eq!(records[0].due_date, carol.created_at);
        assert_eq!(records[0].renewal_type, RenewalType::Initial);

        let entries = ledger::find_by_member(&pool, carol.id, 10, 0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, LedgerSource::Registration);
    }

    #[tokio::test]
    async fn unseeded_fee_table_rolls_back_registration() {
        let pool = test_pool().await;
        // annual_fee is empty: the initial record cannot be priced and
        // the whole registration rolls back, member row included.
        let before = member::find_all(&pool).await.unwrap().len();
        let err = register_member(&pool, &signup("Carol", Some(200))).await.unwrap_err();
        assert!(matches!(err, BillingError::Repo(RepoError::Validation(_))));
        assert_eq!(member::find_all(&pool).await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn paid_deduct_chains_next_record() {
        let pool = test_pool().await;
        seed_annual_fee(&pool, 1000).await;
        earn(&pool, 1, 2000).await;

        let due = shared::util::now_millis();
        let record = create_fee_record(&pool, 1, due, RenewalType::Initial, None)
            .await
            .unwrap();
        assert_eq!(record.amount, 1000);

        let processed = deduct(&pool, record.id).await.unwrap();
        assert_eq!(processed.status, FeeStatus::Paid);
        assert!(processed.deducted_at.is_some());

        let alice = member::find_by_id(&pool, 1).await.unwrap().unwrap();
        assert_eq!(alice.point_balance, 1000);
        assert_eq!(alice.status, MemberStatus::Active);

        // Exactly one new pending record, due one year after the paid one
        let records = fee_record::find_by_member(&pool, 1).await.unwrap();
        let pending: Vec<_> = records.iter().filter(|r| r.status == FeeStatus::Pending).collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].due_date, shared::util::add_one_year_millis(due));
        assert_eq!(pending[0].previous_due_date, Some(due));
        assert_eq!(pending[0].renewal_type, RenewalType::Renewal);
    }

    /// Scenario: 30 points against a 1000-point fee → failed, inactive,
    /// no new record, the -970 charge stands in the ledger.
    #[tokio::test]
    async fn failed_deduct_deactivates_without_chaining() {
        let pool = test_pool().await;
        seed_annual_fee(&pool, 1000).await;
        earn(&pool, 1, 30).await;

        let record = create_fee_record(&pool, 1, shared::util::now_millis(), RenewalType::Initial, None)
            .await
            .unwrap();
        let processed = deduct(&pool, record.id).await.unwrap();
        assert_eq!(processed.status, FeeStatus::Failed);

        let alice = member::find_by_id(&pool, 1).await.unwrap().unwrap();
        assert_eq!(alice.point_balance, -970);
        assert_eq!(alice.status, MemberStatus::Inactive);

        let records = fee_record::find_by_member(&pool, 1).await.unwrap();
        assert_eq!(records.len(), 1); // no chained record

        // The charge attempt is the audit record
        let entries = ledger::find_by_member(&pool, 1, 10, 0).await.unwrap();
        assert_eq!(entries[0].resulting_balance, -970);
    }

    #[tokio::test]
    async fn deduct_twice_is_rejected() {
        let pool = test_pool().await;
        seed_annual_fee(&pool, 100).await;
        earn(&pool, 1, 500).await;
        let record = create_fee_record(&pool, 1, shared::util::now_millis(), RenewalType::Initial, None)
            .await
            .unwrap();
        deduct(&pool, record.id).await.unwrap();
        let err = deduct(&pool, record.id).await.unwrap_err();
        assert!(matches!(err, BillingError::AlreadyProcessed(_)));
    }

    #[tokio::test]
    async fn renewal_grants_waiver_and_resets_hours() {
        let pool = test_pool().await;
        seed_annual_fee(&pool, 100).await;
        earn(&pool, 1, 500).await;
        sqlx::query("UPDATE member SET total_visit_hours = 42 WHERE id = 1")
            .execute(&pool)
            .await
            .unwrap();

        let due = shared::util::now_millis();
        let record = create_fee_record(&pool, 1, due, RenewalType::Renewal, Some(due - 1000))
            .await
            .unwrap();
        let before = shared::util::now_millis();
        deduct(&pool, record.id).await.unwrap();

        let alice = member::find_by_id(&pool, 1).await.unwrap().unwrap();
        assert_eq!(alice.total_visit_hours, 0.0);
        let waiver = alice.renewal_waiver_expires_at.unwrap();
        assert!(waiver >= before + RENEWAL_WAIVER_MS);
    }

    #[tokio::test]
    async fn initial_payment_grants_no_waiver() {
        let pool = test_pool().await;
        seed_annual_fee(&pool, 100).await;
        earn(&pool, 1, 500).await;
        let record = create_fee_record(&pool, 1, shared::util::now_millis(), RenewalType::Initial, None)
            .await
            .unwrap();
        deduct(&pool, record.id).await.unwrap();
        let alice = member::find_by_id(&pool, 1).await.unwrap().unwrap();
        assert_eq!(alice.renewal_waiver_expires_at, None);
    }

    #[tokio::test]
    async fn period_window_follows_paid_chain() {
        let pool = test_pool().await;
        seed_annual_fee(&pool, 100).await;
        earn(&pool, 1, 500).await;

        let alice = member::find_by_id(&pool, 1).await.unwrap().unwrap();
        let mut conn = pool.acquire().await.unwrap();
        // Nothing paid yet: open-ended from creation
        let (start, end) = membership_period(&mut conn, &alice).await.unwrap();
        assert_eq!(start, alice.created_at);
        assert_eq!(end, i64::MAX);
        drop(conn);

        let due = shared::util::now_millis();
        let record = create_fee_record(&pool, 1, due, RenewalType::Initial, None)
            .await
            .unwrap();
        deduct(&pool, record.id).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let (start, end) = membership_period(&mut conn, &alice).await.unwrap();
        assert_eq!(start, alice.created_at); // initial record has no previous due date
        assert_eq!(end, due);
    }

    #[tokio::test]
    async fn sweep_collects_due_records_idempotently() {
        let pool = test_pool().await;
        seed_annual_fee(&pool, 100).await;
        earn(&pool, 1, 500).await;

        // Due yesterday — missed while the server was down
        let due = shared::util::now_millis() - 24 * 3600 * 1000;
        let record = create_fee_record(&pool, 1, due, RenewalType::Initial, None)
            .await
            .unwrap();

        let tz = chrono_tz::Asia::Macau;
        let report = run_fee_sweep(&pool, tz).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.paid, 1);

        let processed = fee_record::find_by_id(&pool, record.id).await.unwrap().unwrap();
        assert_eq!(processed.status, FeeStatus::Paid);

        // Chained record is due next year, so a re-run finds nothing
        let report = run_fee_sweep(&pool, tz).await.unwrap();
        assert_eq!(report.scanned, 0);
    }

    #[tokio::test]
    async fn pending_record_blocks_duplicate_creation() {
        let pool = test_pool().await;
        seed_annual_fee(&pool, 100).await;
        let due = shared::util::now_millis();
        create_fee_record(&pool, 1, due, RenewalType::Initial, None).await.unwrap();
        let err = create_fee_record(&pool, 1, due, RenewalType::Initial, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::PendingExists(1)));
    }
}
