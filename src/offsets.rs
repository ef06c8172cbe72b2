//! How far each panel sample was taken from a daily baseline time.
//!
//! Onionoo does not record every relay at the same moment, so a panel built
//! from it mixes sample times. These statistics show how large that spread is.

use std::collections::BTreeMap;

use chrono::{NaiveTime, TimeDelta};
use serde::Serialize;

use crate::output::SampleTime;
use crate::stability::utility::{median, percentile};

/// Reference time of day the offsets are measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Baseline {
    Midnight,
    Time(NaiveTime),
    /// The panel's most common `HH:MM`.
    Auto,
}

pub const BUCKET_LABELS: [&str; 6] = ["0-1h", "1-3h", "3-6h", "6-12h", "12-24h", ">24h"];

// inclusive upper edges of all but the last bucket
const BUCKET_EDGES_SECS: [i64; 5] = [3_600, 3 * 3_600, 6 * 3_600, 12 * 3_600, 24 * 3_600];

const COMMON_TIMES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffsetStats {
    pub baseline: NaiveTime,
    pub samples: usize,
    pub median_secs: f64,
    pub p95_secs: f64,
    pub max_secs: i64,
    /// Counts per [`BUCKET_LABELS`] entry.
    pub buckets: [usize; 6],
    /// Most common `HH:MM` sample times with their row counts.
    pub common_times: Vec<(String, usize)>,
}

/// Offset statistics over `samples`, or `None` when there are none.
pub fn offset_stats(samples: &[SampleTime], baseline: Baseline) -> Option<OffsetStats> {
    let mut by_minute: BTreeMap<String, usize> = BTreeMap::new();
    for sample in samples {
        *by_minute
            .entry(sample.at.format("%H:%M").to_string())
            .or_default() += 1;
    }
    let mut common_times: Vec<(String, usize)> = by_minute.into_iter().collect();
    // count descending, then earliest time
    common_times.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let baseline = match baseline {
        Baseline::Midnight => NaiveTime::MIN,
        Baseline::Time(time) => time,
        Baseline::Auto => {
            let (most_common, _) = common_times.first()?;
            NaiveTime::parse_from_str(most_common, "%H:%M").ok()?
        }
    };

    let offsets: Vec<i64> = samples.iter().map(|s| offset_secs(s, baseline)).collect();
    let max_secs = offsets.iter().copied().max()?;
    let seconds: Vec<f64> = offsets.iter().map(|&o| o as f64).collect();

    let mut buckets = [0; 6];
    for &offset in &offsets {
        let idx = BUCKET_EDGES_SECS
            .iter()
            .position(|edge| offset <= *edge)
            .unwrap_or(BUCKET_EDGES_SECS.len());
        buckets[idx] += 1;
    }

    common_times.truncate(COMMON_TIMES);
    Some(OffsetStats {
        baseline,
        samples: samples.len(),
        median_secs: median(seconds.clone())?,
        p95_secs: percentile(seconds, 0.95)?,
        max_secs,
        buckets,
        common_times,
    })
}

/// Distance to the nearest baseline anchor on the row's day or a neighbouring
/// day, so samples just past midnight count as close to a 23:30 baseline.
fn offset_secs(sample: &SampleTime, baseline: NaiveTime) -> i64 {
    let anchor = sample.date.and_time(baseline);
    let day = TimeDelta::days(1);
    [anchor - day, anchor, anchor + day]
        .iter()
        .map(|a| (sample.at - *a).num_seconds().abs())
        .fold(i64::MAX, i64::min)
}
