//! Weekly cross-node median of window CoV values.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::stability::types::{StatRecord, WeeklyMedian};
use crate::stability::utility::median;

/// First day of week 0: the latest `anchor` weekday on or before `start`.
pub fn week_origin(start: NaiveDate, anchor: Weekday) -> NaiveDate {
    let back = (start.weekday().num_days_from_monday() + 7 - anchor.num_days_from_monday()) % 7;
    start - Days::new(u64::from(back))
}

pub fn week_index(origin: NaiveDate, date: NaiveDate) -> i64 {
    (date - origin).num_days().div_euclid(7)
}

/// Groups `records` by week of `window_end_date` and takes the median CoV of each week.
///
/// Weeks without records are absent from the output, which is ascending by week index.
pub fn weekly_medians<'a, I>(records: I, origin: NaiveDate) -> Vec<WeeklyMedian>
where
    I: IntoIterator<Item = &'a StatRecord>,
{
    let mut weeks: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for record in records {
        weeks
            .entry(week_index(origin, record.window_end_date))
            .or_default()
            .push(record.cov);
    }

    weeks
        .into_iter()
        .filter_map(|(week_index, covs)| {
            median(covs).map(|median_cov| WeeklyMedian {
                week_index,
                median_cov,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        // 2024-07-01 is a Monday
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    fn record(node: &str, d: u32, cov: f64) -> StatRecord {
        StatRecord {
            node_id: node.to_string(),
            window_end_date: day(d),
            cov,
            stdev: cov,
        }
    }

    #[test]
    fn test_origin_defaults_to_start() {
        assert_eq!(week_origin(day(3), day(3).weekday()), day(3));
    }

    #[test]
    fn test_origin_walks_back_to_anchor() {
        assert_eq!(week_origin(day(3), Weekday::Mon), day(1));
        assert_eq!(week_origin(day(3), Weekday::Thu), day(3) - Days::new(6));
    }

    #[test]
    fn test_week_index_boundaries() {
        assert_eq!(week_index(day(1), day(1)), 0);
        assert_eq!(week_index(day(1), day(7)), 0);
        assert_eq!(week_index(day(1), day(8)), 1);
        assert_eq!(week_index(day(1), day(22)), 3);
    }

    #[test]
    fn test_even_and_odd_medians() {
        let records = vec![
            record("A", 1, 1.0),
            record("B", 2, 2.0),
            record("C", 3, 3.0),
            record("D", 4, 4.0),
            record("A", 8, 3.0),
            record("B", 9, 1.0),
            record("C", 10, 2.0),
        ];

        let weekly = weekly_medians(&records, day(1));

        assert_eq!(
            weekly,
            vec![
                WeeklyMedian {
                    week_index: 0,
                    median_cov: 2.5,
                },
                WeeklyMedian {
                    week_index: 1,
                    median_cov: 2.0,
                },
            ]
        );
    }

    #[test]
    fn test_weeks_without_data_are_absent() {
        let records = vec![record("A", 2, 0.5), record("A", 20, 0.25)];

        let weekly = weekly_medians(&records, day(1));

        let weeks: Vec<_> = weekly.iter().map(|w| w.week_index).collect();
        assert_eq!(weeks, vec![0, 2]);
    }

    #[test]
    fn test_no_records_no_weeks() {
        assert!(weekly_medians(&Vec::new(), day(1)).is_empty());
    }
}
