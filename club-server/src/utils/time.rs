//! 时间工具函数 — 业务时区转换
//!
//! 所有日期→时间戳转换统一在这里完成，
//! repository 层只接收 `i64` Unix millis 和预先算好的 bucket key。

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Unix millis → 业务时区时间
pub fn local_time(millis: i64, tz: Tz) -> DateTime<Tz> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
        .with_timezone(&tz)
}

/// 日历日 bucket key (YYYY-MM-DD, 业务时区)
pub fn day_key(millis: i64, tz: Tz) -> String {
    local_time(millis, tz).format("%Y-%m-%d").to_string()
}

/// 小时 bucket key (YYYY-MM-DDTHH, 业务时区)
pub fn hour_key(millis: i64, tz: Tz) -> String {
    local_time(millis, tz).format("%Y-%m-%dT%H").to_string()
}

/// 日期 + 时分秒 → Unix millis (业务时区)
///
/// DST gap fallback: 如果本地时间不存在 (夏令时跳跃)，fallback 到 UTC。
pub fn date_hms_to_millis(date: NaiveDate, hour: u32, min: u32, sec: u32, tz: Tz) -> i64 {
    let naive = date.and_hms_opt(hour, min, sec).unwrap();
    naive
        .and_local_timezone(tz)
        .latest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis())
}

/// 今天结束 → 次日 00:00:00 的 Unix millis (业务时区)
///
/// 调用方使用 `< end` (不含) 语义。
pub fn end_of_today_millis(tz: Tz) -> i64 {
    let today = Utc::now().with_timezone(&tz).date_naive();
    let next_day = today.succ_opt().unwrap_or(today);
    date_hms_to_millis(next_day, 0, 0, 0, tz)
}

/// 解析 cutoff 时间字符串 (HH:MM)，失败返回 00:00
pub fn parse_cutoff(cutoff: &str) -> NaiveTime {
    NaiveTime::parse_from_str(cutoff, "%H:%M").unwrap_or_else(|e| {
        tracing::warn!(
            "Failed to parse cutoff_time '{}': {}, falling back to 00:00",
            cutoff,
            e
        );
        NaiveTime::MIN
    })
}

/// 当前时刻是否已过 cutoff (业务时区)
///
/// `at` 当地时间 >= cutoff → true (拒绝兑换)。
pub fn past_cutoff(at_millis: i64, cutoff: NaiveTime, tz: Tz) -> bool {
    local_time(at_millis, tz).time() >= cutoff
}

/// 计算距离下一次每日 cutoff 的 Duration (调度器用)
pub fn duration_until_next_cutoff(cutoff_time: NaiveTime, tz: Tz) -> std::time::Duration {
    let now = Utc::now().with_timezone(&tz);
    let today = now.date_naive();

    let target_date = if now.time() >= cutoff_time {
        // 今天的 cutoff 已过，等明天
        today + chrono::Duration::days(1)
    } else {
        today
    };

    let target_datetime = target_date
        .and_time(cutoff_time)
        .and_local_timezone(tz)
        .single()
        .unwrap_or_else(|| {
            // DST edge case: fallback to +1 min
            (target_date.and_time(cutoff_time) + chrono::Duration::minutes(1))
                .and_local_timezone(tz)
                .latest()
                .unwrap_or_else(|| {
                    tracing::error!("Cannot resolve local time for sweep alarm, using fallback");
                    now + chrono::Duration::hours(1)
                })
        });

    let duration = target_datetime.signed_duration_since(now);
    if duration.num_seconds() <= 0 {
        // Safety: 不应该发生，但以防万一用 1 分钟兜底
        std::time::Duration::from_secs(60)
    } else {
        duration
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(60))
    }
}
