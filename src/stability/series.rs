//! Assembly of flat observations into per-node series.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{OutOfRangeObservation, PipelineError, RunReport};
use crate::stability::types::{DateRange, NodeId, Observation, Series, SeriesMap, SeriesPoint};

/// Groups `observations` by node into date-ordered series restricted to `range`.
///
/// Out-of-range observations are recorded in `report` and skipped; their node
/// is still registered, possibly with an empty series. A repeated
/// `(date, node_id)` pair collapses when the values agree and fails with
/// [`PipelineError::DuplicateObservation`] when they differ.
pub fn build_series<I>(
    observations: I,
    range: &DateRange,
    report: &mut RunReport,
) -> Result<SeriesMap, PipelineError>
where
    I: IntoIterator<Item = Observation>,
{
    let mut by_node: BTreeMap<NodeId, BTreeMap<NaiveDate, f64>> = BTreeMap::new();

    for obs in observations {
        let readings = by_node.entry(obs.node_id().to_string()).or_default();

        if !range.contains(obs.date()) {
            debug!(
                node_id = obs.node_id(),
                date = %obs.date(),
                "Observation outside requested range"
            );
            report.out_of_range.push(OutOfRangeObservation {
                node_id: obs.node_id().to_string(),
                date: obs.date(),
            });
            continue;
        }

        match readings.entry(obs.date()) {
            Entry::Vacant(slot) => {
                slot.insert(obs.value());
            }
            Entry::Occupied(slot) => {
                let first = *slot.get();
                if first != obs.value() {
                    return Err(PipelineError::DuplicateObservation {
                        node_id: obs.node_id().to_string(),
                        date: obs.date(),
                        first,
                        second: obs.value(),
                    });
                }
            }
        }
    }

    Ok(by_node
        .into_iter()
        .map(|(node_id, readings)| {
            let points = readings
                .into_iter()
                .map(|(date, value)| SeriesPoint { date, value })
                .collect();
            (node_id, Series::from_sorted(points))
        })
        .collect())
}
