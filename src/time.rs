//! time.rs
//! Interval algebra: merging, periodic alignment and human-readable durations.

use crate::types::Interval;
use chrono::{TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static DURATION_COMPONENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(ms|d|h|m|s)$").expect("static duration pattern"));

/// Merges overlapping or adjoining intervals.
///
/// The result is sorted and disjoint; an interval is folded into the running one
/// when its start is `<=` the running end.
pub fn merge_intervals(intervals: impl IntoIterator<Item = Interval>) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.into_iter().collect();
    sorted.sort_unstable();

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for next in sorted {
        match merged.last_mut() {
            Some(current) if next.start <= current.end => {
                current.end = current.end.max(next.end);
            }
            _ => merged.push(next),
        }
    }
    merged
}

/// Rounds `time` up to the next `offset + k * window` boundary.
pub fn align_start(time: i64, window: i64, offset: i64) -> i64 {
    if (time - offset).rem_euclid(window) == 0 {
        time
    } else {
        offset + ((time - offset).div_euclid(window) + 1) * window
    }
}

/// Rounds `time` down to the nearest `offset + k * window` boundary.
pub fn align_end(time: i64, window: i64, offset: i64) -> i64 {
    offset + (time - offset).div_euclid(window) * window
}

/// Parses a compound duration such as `"1d 2h 30m"` into whole seconds.
///
/// Components are whitespace separated `<n><unit>` pairs with units `d`, `h`, `m`,
/// `s` and `ms`. Anything else is ignored.
pub fn human_duration(text: &str) -> i64 {
    let mut millis: i64 = 0;
    for component in text.split_whitespace() {
        let Some(caps) = DURATION_COMPONENT.captures(component) else {
            continue;
        };
        let Ok(amount) = caps[1].parse::<i64>() else {
            continue;
        };
        let unit_ms = match &caps[2] {
            "d" => 86_400_000,
            "h" => 3_600_000,
            "m" => 60_000,
            "s" => 1_000,
            _ => 1,
        };
        millis = millis.saturating_add(amount.saturating_mul(unit_ms));
    }
    millis / 1000
}

/// Formats epoch seconds as `%Y-%m-%dT%H:%M:%S%z` in UTC.
pub fn format_timestamp(secs: i64) -> String {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%z").to_string(),
        None => secs.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn iv(pairs: &[(i64, i64)]) -> Vec<Interval> {
        pairs.iter().copied().map(Interval::from).collect()
    }

    #[rstest]
    #[case(&[], &[])]
    #[case(&[(0, 300)], &[(0, 300)])]
    #[case(&[(300, 600), (0, 300)], &[(0, 600)])] // Adjoining intervals merge
    #[case(&[(0, 300), (100, 200)], &[(0, 300)])] // Containment
    #[case(&[(0, 100), (200, 300)], &[(0, 100), (200, 300)])]
    #[case(&[(600, 900), (0, 300), (250, 400), (900, 901)], &[(0, 400), (600, 901)])]
    fn test_merge_intervals(#[case] input: &[(i64, i64)], #[case] expected: &[(i64, i64)]) {
        assert_eq!(merge_intervals(iv(input)), iv(expected));
    }

    fn intervals() -> impl Strategy<Value = Vec<Interval>> {
        prop::collection::vec((-1000i64..1000, 0i64..200), 0..20)
            .prop_map(|pairs| pairs.into_iter().map(|(start, len)| Interval::new(start, start + len)).collect())
    }

    fn covered(intervals: &[Interval], t: i64) -> bool {
        intervals.iter().any(|i| i.start < t && t <= i.end)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_merge_is_sorted_disjoint_and_idempotent(input in intervals()) {
            let merged = merge_intervals(input.clone());

            for pair in merged.windows(2) {
                prop_assert!(pair[0].end < pair[1].start, "not sorted and disjoint: {:?}", pair);
            }
            prop_assert_eq!(merge_intervals(merged.clone()), merged.clone());
            prop_assert!(merged.len() <= input.len());

            // Integer endpoints: coverage of every integer point decides coverage of the reals.
            for t in -1000..1200 {
                prop_assert_eq!(covered(&input, t), covered(&merged, t), "coverage differs at {}", t);
            }
        }

        #[test]
        fn prop_alignment_brackets_time(
            time in -1_000_000i64..1_000_000,
            window in 1i64..10_000,
            offset in -10_000i64..10_000,
        ) {
            let start = align_start(time, window, offset);
            let end = align_end(time, window, offset);

            prop_assert_eq!((start - offset).rem_euclid(window), 0);
            prop_assert_eq!((end - offset).rem_euclid(window), 0);
            prop_assert!(end <= time && time <= start);
            prop_assert!(start - time < window && time - end < window);

            if (time - offset).rem_euclid(window) == 0 {
                prop_assert_eq!((start, end), (time, time));
            } else {
                prop_assert_eq!(start - end, window);
            }
            // Aligned values are fixed points of both directions.
            prop_assert_eq!(align_start(end, window, offset), end);
            prop_assert_eq!(align_end(start, window, offset), start);
        }
    }

    #[rstest]
    #[case(0, 300, 0, 0, 0)]
    #[case(1, 300, 0, 300, 0)]
    #[case(299, 300, 0, 300, 0)]
    #[case(301, 300, 0, 600, 300)]
    #[case(100, 3600, 600, 600, -3000)]
    #[case(-1, 300, 0, 0, -300)]
    fn test_alignment(
        #[case] time: i64,
        #[case] window: i64,
        #[case] offset: i64,
        #[case] start: i64,
        #[case] end: i64,
    ) {
        assert_eq!(align_start(time, window, offset), start);
        assert_eq!(align_end(time, window, offset), end);
    }

    #[test]
    fn test_alignment_fixed_points() {
        for boundary in [-600, 0, 300, 900, 3600] {
            assert_eq!(align_start(boundary, 300, 0), boundary);
            assert_eq!(align_end(boundary, 300, 0), boundary);
        }
    }

    #[rstest]
    #[case("5m", 300)]
    #[case("1h 30m", 5400)]
    #[case("1d", 86_400)]
    #[case("24h", 86_400)]
    #[case("10s", 10)]
    #[case("1500ms", 1)]
    #[case("500ms 500ms", 1)]
    #[case("0", 0)]
    #[case("2h bogus 1x", 7200)]
    #[case("", 0)]
    fn test_human_duration(#[case] text: &str, #[case] expected: i64) {
        assert_eq!(human_duration(text), expected);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+0000");
        assert_eq!(format_timestamp(86_400 + 3_661), "1970-01-02T01:01:01+0000");
    }
}
