use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{DegenerateMean, PipelineError, RunReport};
use crate::stability::coverage::full_coverage_nodes;
use crate::stability::series::build_series;
use crate::stability::types::{NodeSet, Observation, Series, StatRecord, WeeklyMedian};
use crate::stability::weekly::weekly_medians;
use crate::stability::window::{WindowIssue, window_stats};

/// Everything a pipeline run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityRun {
    pub nodes: NodeSet,
    /// Ordered by window end date, then node id.
    pub records: Vec<StatRecord>,
    pub weekly: Vec<WeeklyMedian>,
    pub report: RunReport,
}

/// Runs series assembly, coverage filtering, windowed statistics and weekly
/// aggregation over `observations`.
///
/// Nodes are processed in parallel. The run fails on conflicting duplicates and
/// on any coverage gap found while windowing.
#[tracing::instrument(
    skip(observations, config),
    fields(
        start = %config.date_range().start(),
        days = config.date_range().len_days(),
        window_length = config.window_length().get()
    )
)]
pub fn run<I>(observations: I, config: &PipelineConfig) -> Result<StabilityRun, PipelineError>
where
    I: IntoIterator<Item = Observation>,
{
    let mut report = RunReport::default();
    let range = config.date_range();

    let series = build_series(observations, range, &mut report)?;
    let nodes = full_coverage_nodes(&series, range);
    info!(
        known_nodes = series.len(),
        covered_nodes = nodes.len(),
        out_of_range = report.out_of_range.len(),
        "Series assembled"
    );

    let per_node = nodes
        .par_iter()
        .map(|node_id| node_stats(node_id, &series[node_id], config))
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::new();
    for (node_records, degenerate) in per_node {
        records.extend(node_records);
        report.degenerate_means.extend(degenerate);
    }
    records.sort_by(|a, b| {
        a.window_end_date
            .cmp(&b.window_end_date)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });

    if !report.degenerate_means.is_empty() {
        warn!(
            count = report.degenerate_means.len(),
            "Windows with zero mean omitted"
        );
    }

    let weekly = weekly_medians(&records, config.week_origin());
    info!(
        records = records.len(),
        weeks = weekly.len(),
        "Stability statistics computed"
    );

    Ok(StabilityRun {
        nodes,
        records,
        weekly,
        report,
    })
}

fn node_stats(
    node_id: &str,
    series: &Series,
    config: &PipelineConfig,
) -> Result<(Vec<StatRecord>, Vec<DegenerateMean>), PipelineError> {
    let mut records = Vec::new();
    let mut degenerate = Vec::new();

    for outcome in window_stats(node_id, series, config.window_length()) {
        match outcome {
            Ok(record) => records.push(record),
            Err(WindowIssue::DegenerateMean(d)) => {
                debug!(node_id, window_end_date = %d.window_end_date, "Zero-mean window");
                degenerate.push(d);
            }
            Err(WindowIssue::CoverageGap {
                node_id,
                before,
                after,
            }) => {
                return Err(PipelineError::IncompleteCoverageGap {
                    node_id,
                    before,
                    after,
                });
            }
        }
    }

    Ok((records, degenerate))
}
