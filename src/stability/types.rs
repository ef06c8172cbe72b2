//! Data types shared by the stability pipeline stages.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::PipelineError;

/// Opaque, stable identifier of a measured node (a relay fingerprint in practice).
pub type NodeId = String;

/// Per-node series keyed by node id.
pub type SeriesMap = BTreeMap<NodeId, Series>;

/// Nodes with full coverage over a date range.
pub type NodeSet = BTreeSet<NodeId>;

/// One reading of one node on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    date: NaiveDate,
    node_id: NodeId,
    value: f64,
}

impl Observation {
    /// Builds an observation, rejecting negative and non-finite values.
    pub fn new(
        date: NaiveDate,
        node_id: impl Into<NodeId>,
        value: f64,
    ) -> Result<Self, PipelineError> {
        let node_id = node_id.into();
        if !value.is_finite() || value < 0.0 {
            return Err(PipelineError::InvalidObservation {
                node_id,
                date,
                reason: format!("value {value} is not a non-negative finite number"),
            });
        }
        Ok(Self {
            date,
            node_id,
            value,
        })
    }

    /// Builds an observation from an integral bandwidth reading, which is always valid.
    pub fn from_bandwidth(date: NaiveDate, node_id: impl Into<NodeId>, bandwidth: u64) -> Self {
        Self {
            date,
            node_id: node_id.into(),
            value: bandwidth as f64,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// A contiguous run of calendar days starting at `start`.
///
/// Built from an inclusive `[start, end]` pair, or explicitly empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    days: u32,
}

impl DateRange {
    /// Inclusive range `[start, end]`. Fails when `start > end`.
    pub fn inclusive(start: NaiveDate, end: NaiveDate) -> Result<Self, PipelineError> {
        if start > end {
            return Err(PipelineError::InvalidConfig(format!(
                "date range start {start} is after end {end}"
            )));
        }
        let days = u32::try_from((end - start).num_days() + 1).map_err(|_| {
            PipelineError::InvalidConfig(format!("date range {start}..={end} is too long"))
        })?;
        Ok(Self { start, days })
    }

    /// A zero-day range anchored at `start`.
    pub fn empty(start: NaiveDate) -> Self {
        Self { start, days: 0 }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the range, or `None` when the range is empty.
    pub fn end(&self) -> Option<NaiveDate> {
        self.dates().last()
    }

    pub fn len_days(&self) -> usize {
        self.days as usize
    }

    pub fn is_empty(&self) -> bool {
        self.days == 0
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && (date - self.start).num_days() < i64::from(self.days)
    }

    /// Every day of the range in ascending order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + Clone + use<> {
        self.start.iter_days().take(self.days as usize)
    }
}

/// A dated value inside a [`Series`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// One node's readings, strictly ascending by date. Missing days have no entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    points: Vec<SeriesPoint>,
}

impl Series {
    /// Callers must pass points with strictly increasing dates.
    pub(crate) fn from_sorted(points: Vec<SeriesPoint>) -> Self {
        debug_assert!(points.windows(2).all(|p| p[0].date < p[1].date));
        Self { points }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| self.points[idx].value)
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.value_on(date).is_some()
    }
}

/// CoV and standard deviation of one window of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRecord {
    pub node_id: NodeId,
    pub window_end_date: NaiveDate,
    pub cov: f64,
    pub stdev: f64,
}

/// Median CoV across all nodes for one week.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeeklyMedian {
    pub week_index: i64,
    pub median_cov: f64,
}
