use crate::stability::types::{DateRange, NodeSet, SeriesMap};

/// Returns the nodes whose series has an entry on every day of `range`.
///
/// A node missing a single day is excluded entirely. With an empty range every
/// known node qualifies.
pub fn full_coverage_nodes(series: &SeriesMap, range: &DateRange) -> NodeSet {
    series
        .iter()
        .filter(|(_, s)| s.len() >= range.len_days() && range.dates().all(|d| s.contains_date(d)))
        .map(|(node_id, _)| node_id.clone())
        .collect()
}
