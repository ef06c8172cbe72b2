//! Error taxonomy for the stability pipeline.
//!
//! Structural failures ([`PipelineError`]) abort a run. Per-record conditions
//! are collected into a [`RunReport`] and never halt the pipeline.

use chrono::NaiveDate;
use serde::Serialize;

use crate::stability::types::NodeId;

/// Failures that stop a pipeline run and are surfaced to the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("conflicting observations for node {node_id} on {date}: {first} vs {second}")]
    DuplicateObservation {
        node_id: NodeId,
        date: NaiveDate,
        first: f64,
        second: f64,
    },

    /// A window crossed a missing date in a series that passed the coverage filter.
    #[error("series of node {node_id} has a gap between {before} and {after}")]
    IncompleteCoverageGap {
        node_id: NodeId,
        before: NaiveDate,
        after: NaiveDate,
    },

    #[error("invalid observation for node {node_id} on {date}: {reason}")]
    InvalidObservation {
        node_id: NodeId,
        date: NaiveDate,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// An observation dated outside the requested range. Skipped, run continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutOfRangeObservation {
    pub node_id: NodeId,
    pub date: NaiveDate,
}

/// A window whose mean was zero, so its CoV is undefined. The record is omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegenerateMean {
    pub node_id: NodeId,
    pub window_end_date: NaiveDate,
}

/// Per-record conditions collected over one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub out_of_range: Vec<OutOfRangeObservation>,
    pub degenerate_means: Vec<DegenerateMean>,
}

impl RunReport {
    /// Returns `true` when nothing was skipped or omitted.
    pub fn is_clean(&self) -> bool {
        self.out_of_range.is_empty() && self.degenerate_means.is_empty()
    }
}
