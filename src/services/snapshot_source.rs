//! Trait and types for a provider of daily snapshots.

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;

use crate::stability::types::Observation;

/// One snapshot: every node's reading at `hour` on `date`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub date: NaiveDate,
    pub hour: u32,
    pub readings: HashMap<String, u64>,
}

impl Snapshot {
    /// Turns the readings into observations dated on the snapshot day.
    pub fn observations(&self) -> impl Iterator<Item = Observation> + '_ {
        self.readings.iter().map(|(node_id, bandwidth)| {
            Observation::from_bandwidth(self.date, node_id.as_str(), *bandwidth)
        })
    }

    /// The snapshot day at its hour, or `None` for an hour outside 0-23.
    pub fn sampled_at(&self) -> Option<NaiveDateTime> {
        self.date.and_hms_opt(self.hour, 0, 0)
    }
}

/// Abstraction over a snapshot archive (e.g., Tor CollecTor).
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Returns the snapshot for `date` at `hour`, or `None` if the source has none.
    async fn snapshot(&self, date: NaiveDate, hour: u32) -> Result<Option<Snapshot>>;
}
