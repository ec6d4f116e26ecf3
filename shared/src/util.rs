/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a Snowflake-style i64 for use as resource ID.
///
/// Layout (53 bits, fits in JavaScript's Number.MAX_SAFE_INTEGER):
///   - 41 bits: milliseconds since 2024-01-01 UTC (~69 years)
///   - 12 bits: random (4096 values per ms, collision-free at club scale)
pub fn snowflake_id() -> i64 {
    use rand::Rng;
    // Custom epoch: 2024-01-01 00:00:00 UTC
    const EPOCH_MS: i64 = 1_704_067_200_000;
    let now = now_millis();
    let ts = (now - EPOCH_MS) & 0x1FF_FFFF_FFFF; // 41 bits
    let rand_bits: i64 = rand::thread_rng().gen_range(0..0x1000); // 12 bits
    (ts << 12) | rand_bits
}

/// One year in milliseconds is not constant (leap years); fee chaining
/// adds a calendar year instead. Falls back to +365d on Feb 29.
pub fn add_one_year_millis(millis: i64) -> i64 {
    use chrono::{Datelike, TimeZone, Utc};
    let dt = Utc.timestamp_millis_opt(millis).single();
    match dt.and_then(|d| d.with_year(d.year() + 1)) {
        Some(next) => next.timestamp_millis(),
        None => millis + 365 * 24 * 3600 * 1000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflake_ids_are_js_safe() {
        for _ in 0..100 {
            let id = snowflake_id();
            assert!(id > 0);
            assert!(id <= 9_007_199_254_740_991); // 2^53 - 1
        }
    }

    #[test]
    fn add_one_year_plain_date() {
        // 2025-03-01 00:00:00 UTC -> 2026-03-01 00:00:00 UTC
        let from = 1_740_787_200_000;
        let to = add_one_year_millis(from);
        assert_eq!(to - from, 365 * 24 * 3600 * 1000);
    }
}
