//! Sliding-window CoV and standard deviation over one node's series.

use std::num::NonZeroUsize;

use chrono::NaiveDate;

use crate::error::DegenerateMean;
use crate::stability::types::{NodeId, Series, SeriesPoint, StatRecord};
use crate::stability::utility::{mean, stddev};

pub const DEFAULT_WINDOW_LENGTH: NonZeroUsize = NonZeroUsize::new(7).unwrap();

/// Why a window position produced no [`StatRecord`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WindowIssue {
    #[error("window ending {} of node {} has zero mean", .0.window_end_date, .0.node_id)]
    DegenerateMean(DegenerateMean),

    #[error("window of node {node_id} spans a gap between {before} and {after}")]
    CoverageGap {
        node_id: NodeId,
        before: NaiveDate,
        after: NaiveDate,
    },
}

/// Finite, restartable iterator over the window positions of one series.
///
/// Yields exactly `max(0, N - W + 1)` items for a series of `N` points. A
/// clone taken before iteration replays the same sequence independently.
#[derive(Debug, Clone)]
pub struct WindowStats<'a> {
    node_id: &'a str,
    points: &'a [SeriesPoint],
    window_length: usize,
    position: usize,
}

pub fn window_stats<'a>(
    node_id: &'a str,
    series: &'a Series,
    window_length: NonZeroUsize,
) -> WindowStats<'a> {
    WindowStats {
        node_id,
        points: series.points(),
        window_length: window_length.get(),
        position: 0,
    }
}

impl Iterator for WindowStats<'_> {
    type Item = Result<StatRecord, WindowIssue>;

    fn next(&mut self) -> Option<Self::Item> {
        let window = self
            .points
            .get(self.position..self.position + self.window_length)?;
        self.position += 1;
        Some(evaluate(self.node_id, window))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.points.len() + 1).saturating_sub(self.position + self.window_length);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WindowStats<'_> {}

fn evaluate(node_id: &str, window: &[SeriesPoint]) -> Result<StatRecord, WindowIssue> {
    if let Some(pair) = window
        .windows(2)
        .find(|pair| (pair[1].date - pair[0].date).num_days() != 1)
    {
        return Err(WindowIssue::CoverageGap {
            node_id: node_id.to_string(),
            before: pair[0].date,
            after: pair[1].date,
        });
    }

    // window is non-empty: the length is a NonZeroUsize
    let window_end_date = window[window.len() - 1].date;
    let values: Vec<f64> = window.iter().map(|p| p.value).collect();
    let m = mean(&values);
    if m == 0.0 {
        return Err(WindowIssue::DegenerateMean(DegenerateMean {
            node_id: node_id.to_string(),
            window_end_date,
        }));
    }

    let sd = stddev(&values, m);
    Ok(StatRecord {
        node_id: node_id.to_string(),
        window_end_date,
        cov: sd / m,
        stdev: sd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn series(values: &[(u32, f64)]) -> Series {
        Series::from_sorted(
            values
                .iter()
                .map(|&(d, value)| SeriesPoint { date: day(d), value })
                .collect(),
        )
    }

    fn consecutive(values: &[f64]) -> Series {
        let points: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u32 + 1, *v))
            .collect();
        series(&points)
    }

    fn w(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_window_count_law() {
        for n in 0..12 {
            let s = consecutive(&vec![5.0; n]);
            let stats = window_stats("A", &s, DEFAULT_WINDOW_LENGTH);
            let expected = (n + 1).saturating_sub(7);
            assert_eq!(stats.len(), expected);
            assert_eq!(stats.count(), expected, "series of {n} points");
        }
    }

    #[test]
    fn test_cov_and_population_stdev() {
        let s = consecutive(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let records: Vec<_> = window_stats("A", &s, w(8)).collect();

        assert_eq!(records.len(), 1);
        let record = records[0].clone().unwrap();
        assert_eq!(record.stdev, 2.0);
        assert_eq!(record.cov, 2.0 / 5.0);
        assert_eq!(record.window_end_date, day(8));
    }

    #[test]
    fn test_window_end_date_is_last_date() {
        let s = consecutive(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let ends: Vec<_> = window_stats("A", &s, DEFAULT_WINDOW_LENGTH)
            .map(|r| r.unwrap().window_end_date)
            .collect();

        assert_eq!(ends, vec![day(7), day(8), day(9)]);
    }

    #[test]
    fn test_cov_is_scale_invariant() {
        let base = [3.0, 8.0, 1.0, 4.0, 6.0, 2.0, 9.0];
        let scaled: Vec<f64> = base.iter().map(|v| v * 37.5).collect();

        let a = window_stats("A", &consecutive(&base), DEFAULT_WINDOW_LENGTH)
            .next()
            .unwrap()
            .unwrap();
        let b = window_stats("A", &consecutive(&scaled), DEFAULT_WINDOW_LENGTH)
            .next()
            .unwrap()
            .unwrap();

        assert!((a.cov - b.cov).abs() < 1e-12);
        assert!((a.stdev * 37.5 - b.stdev).abs() < 1e-9);
    }

    #[test]
    fn test_zero_mean_window_is_degenerate() {
        let s = consecutive(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 4.0]);
        let results: Vec<_> = window_stats("A", &s, DEFAULT_WINDOW_LENGTH).collect();

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0],
            Err(WindowIssue::DegenerateMean(DegenerateMean {
                node_id: "A".to_string(),
                window_end_date: day(7),
            }))
        );
        let record = results[1].clone().unwrap();
        assert!(record.cov.is_finite());
    }

    #[test]
    fn test_gap_is_reported() {
        let s = series(&[(1, 1.0), (2, 1.0), (4, 1.0)]);
        let results: Vec<_> = window_stats("A", &s, w(3)).collect();

        assert_eq!(
            results,
            vec![Err(WindowIssue::CoverageGap {
                node_id: "A".to_string(),
                before: day(2),
                after: day(4),
            })]
        );
    }

    #[test]
    fn test_iteration_restarts() {
        let s = consecutive(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let stats = window_stats("A", &s, DEFAULT_WINDOW_LENGTH);

        let first: Vec<_> = stats.clone().collect();
        let second: Vec<_> = stats.collect();
        assert_eq!(first, second);
    }
}
