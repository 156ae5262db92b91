//! Time formatting helpers.

use chrono::{DateTime, Utc};

/// Age of `then` relative to `now`, e.g. `2d 5h ago` or `just now`.
///
/// Shows at most the two largest non-zero units. Timestamps in the future
/// (clock skew between hosts) are reported as `in the future`.
#[must_use]
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(then).num_seconds();
    if seconds < 0 {
        return "in the future".to_string();
    }
    if seconds < 60 {
        return "just now".to_string();
    }

    let units = [
        (seconds / 86_400, "d"),
        (seconds % 86_400 / 3_600, "h"),
        (seconds % 3_600 / 60, "m"),
    ];
    let parts: Vec<String> = units
        .iter()
        .skip_while(|(n, _)| *n == 0)
        .take(2)
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect();
    format!("{} ago", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn under_a_minute_is_just_now() {
        assert_eq!(format_age(at(0), at(59)), "just now");
    }

    #[test]
    fn two_largest_units() {
        let now = at(0) + Duration::days(2) + Duration::hours(5) + Duration::minutes(7);
        assert_eq!(format_age(at(0), now), "2d 5h ago");
    }

    #[test]
    fn zero_middle_unit_is_skipped() {
        let now = at(0) + Duration::days(1) + Duration::minutes(30);
        assert_eq!(format_age(at(0), now), "1d ago");
        assert_eq!(format_age(at(0), at(0) + Duration::minutes(42)), "42m ago");
    }

    #[test]
    fn future_timestamp() {
        assert_eq!(format_age(at(100), at(0)), "in the future");
    }
}
