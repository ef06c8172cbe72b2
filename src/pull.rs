//! Concurrent collection of one snapshot per day over a date range.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tracing::{Instrument, error, info, warn};

use crate::output::PanelRow;
use crate::services::snapshot_source::{Snapshot, SnapshotSource};
use crate::stability::types::{DateRange, NodeSet, Observation};

/// A day for which no hour produced a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingSnapshot {
    pub date: NaiveDate,
    /// Last fetch error, or `None` when the source simply had no document.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PullOutcome {
    /// Ascending by date.
    pub snapshots: Vec<Snapshot>,
    pub missing: Vec<MissingSnapshot>,
}

impl PullOutcome {
    pub fn observations(&self) -> impl Iterator<Item = Observation> + '_ {
        self.snapshots.iter().flat_map(Snapshot::observations)
    }

    /// Nodes present in every fetched snapshot. Empty when nothing was fetched.
    pub fn common_nodes(&self) -> NodeSet {
        let mut snapshots = self.snapshots.iter();
        let Some(first) = snapshots.next() else {
            return NodeSet::new();
        };
        let mut common: HashSet<&String> = first.readings.keys().collect();
        for snapshot in snapshots {
            common.retain(|node| snapshot.readings.contains_key(*node));
        }
        common.into_iter().cloned().collect()
    }

    /// Rows for the nodes present on every fetched day, each stamped with the
    /// hour its day was actually sampled at.
    pub fn panel_rows(&self) -> Vec<PanelRow> {
        let common = self.common_nodes();
        let common = &common;
        self.snapshots
            .iter()
            .flat_map(|snapshot| {
                let sampled_at = snapshot.sampled_at();
                snapshot
                    .observations()
                    .filter(move |obs| common.contains(obs.node_id()))
                    .map(move |obs| PanelRow::new(&obs, sampled_at))
            })
            .collect()
    }
}

/// Fetches one snapshot per day of `range`, trying `hours` in order for each day.
///
/// At most `concurrency` days are fetched at once. Days where every hour is
/// absent or failing are reported in [`PullOutcome::missing`] rather than
/// failing the pull.
pub async fn pull_snapshots<S>(
    source: Arc<S>,
    range: &DateRange,
    hours: &[u32],
    concurrency: usize,
) -> Result<PullOutcome>
where
    S: SnapshotSource + 'static,
{
    if hours.is_empty() {
        bail!("at least one sampling hour is required");
    }
    if let Some(hour) = hours.iter().find(|h| **h > 23) {
        bail!("invalid hour {hour}: expected 0-23");
    }
    if concurrency == 0 {
        bail!("concurrency must be at least 1");
    }

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = Vec::with_capacity(range.len_days());

    for date in range.dates() {
        let sem = semaphore.clone();
        let source = source.clone();
        let hours = hours.to_vec();
        let span = tracing::info_span!("pull_day", date = %date);

        tasks.push(tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await?;
                fetch_day(source.as_ref(), date, &hours).await
            }
            .instrument(span),
        ));
    }

    let mut outcome = PullOutcome::default();
    for task in tasks {
        match task.await?? {
            Ok(snapshot) => outcome.snapshots.push(snapshot),
            Err(missing) => outcome.missing.push(missing),
        }
    }

    info!(
        fetched = outcome.snapshots.len(),
        missing = outcome.missing.len(),
        "Snapshot pull finished"
    );
    Ok(outcome)
}

async fn fetch_day<S: SnapshotSource + ?Sized>(
    source: &S,
    date: NaiveDate,
    hours: &[u32],
) -> Result<Result<Snapshot, MissingSnapshot>> {
    let mut last_error = None;

    for &hour in hours {
        match source.snapshot(date, hour).await {
            Ok(Some(snapshot)) => {
                info!(hour, relays = snapshot.readings.len(), "Snapshot fetched");
                return Ok(Ok(snapshot));
            }
            Ok(None) => warn!(hour, "No snapshot at this hour"),
            Err(e) => {
                error!(hour, error = %e, "Snapshot fetch failed");
                last_error = Some(e.to_string());
            }
        }
    }

    Ok(Err(MissingSnapshot {
        date,
        error: last_error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    /// Serves `(date, hour) -> readings`; day 13 always errors.
    struct FakeSource {
        documents: HashMap<(NaiveDate, u32), Vec<(&'static str, u64)>>,
    }

    #[async_trait]
    impl SnapshotSource for FakeSource {
        async fn snapshot(&self, date: NaiveDate, hour: u32) -> Result<Option<Snapshot>> {
            if date == day(13) {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.documents.get(&(date, hour)).map(|readings| Snapshot {
                date,
                hour,
                readings: readings
                    .iter()
                    .map(|(node, bw)| (node.to_string(), *bw))
                    .collect(),
            }))
        }
    }

    fn source() -> Arc<FakeSource> {
        let mut documents = HashMap::new();
        documents.insert((day(1), 0), vec![("A", 10), ("B", 20), ("C", 5)]);
        documents.insert((day(2), 2), vec![("A", 11), ("B", 21)]);
        documents.insert((day(3), 0), vec![("A", 12), ("B", 22), ("C", 6)]);
        Arc::new(FakeSource { documents })
    }

    #[tokio::test]
    async fn test_falls_back_to_later_hours() {
        let range = DateRange::inclusive(day(1), day(3)).unwrap();
        let outcome = pull_snapshots(source(), &range, &[0, 2], 2).await.unwrap();

        let dates: Vec<_> = outcome.snapshots.iter().map(|s| (s.date, s.hour)).collect();
        assert_eq!(dates, vec![(day(1), 0), (day(2), 2), (day(3), 0)]);
        assert!(outcome.missing.is_empty());
        assert_eq!(outcome.observations().count(), 7);

        let common: Vec<_> = outcome.common_nodes().into_iter().collect();
        assert_eq!(common, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_panel_rows_carry_the_fallback_hour() {
        let range = DateRange::inclusive(day(1), day(3)).unwrap();
        let outcome = pull_snapshots(source(), &range, &[0, 2], 2).await.unwrap();

        let mut rows: Vec<_> = outcome
            .panel_rows()
            .into_iter()
            .map(|row| (row.date, row.fingerprint, row.timestamp))
            .collect();
        rows.sort();

        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|(_, fp, _)| fp != "C"));
        assert_eq!(
            rows[2],
            (
                day(2),
                "A".to_string(),
                Some("2024-04-02T02:00:00".to_string())
            )
        );
        assert_eq!(rows[0].2.as_deref(), Some("2024-04-01T00:00:00"));
    }

    #[tokio::test]
    async fn test_missing_and_failing_days_are_reported() {
        let range = DateRange::inclusive(day(12), day(13)).unwrap();
        let outcome = pull_snapshots(source(), &range, &[0], 1).await.unwrap();

        assert!(outcome.snapshots.is_empty());
        assert_eq!(
            outcome.missing,
            vec![
                MissingSnapshot {
                    date: day(12),
                    error: None,
                },
                MissingSnapshot {
                    date: day(13),
                    error: Some("connection reset".to_string()),
                },
            ]
        );
        assert!(outcome.common_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_hours() {
        let range = DateRange::inclusive(day(1), day(1)).unwrap();
        assert!(pull_snapshots(source(), &range, &[24], 1).await.is_err());
        assert!(pull_snapshots(source(), &range, &[], 1).await.is_err());
    }
}
