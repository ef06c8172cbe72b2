use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::fetch::{BasicClient, HttpClient, RetryPolicy, fetch_bytes};
use crate::parser::parse_consensus;
use crate::services::snapshot_source::{Snapshot, SnapshotSource};

/// Only the last few days of consensuses are kept here; older days live in
/// the monthly archives read by [`ArchiveClient`](crate::infra::archive::ArchiveClient).
pub const RECENT_BASE_URL: &str =
    "https://collector.torproject.org/recent/relay-descriptors/consensuses";

/// Reads hourly consensus documents laid out as
/// `<base_url>/YYYY-MM-DD-HH-00-00-consensus`.
pub struct CollectorClient<C> {
    client: C,
    base_url: String,
    retry: RetryPolicy,
}

impl CollectorClient<BasicClient> {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(BasicClient::new()?, base_url))
    }
}

impl<C> CollectorClient<C> {
    pub fn with_client(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn document_url(&self, date: NaiveDate, hour: u32) -> String {
        format!(
            "{}/{}-{:02}-00-00-consensus",
            self.base_url,
            date.format("%Y-%m-%d"),
            hour
        )
    }
}

#[async_trait]
impl<C: HttpClient> SnapshotSource for CollectorClient<C> {
    async fn snapshot(&self, date: NaiveDate, hour: u32) -> Result<Option<Snapshot>> {
        let url = self.document_url(date, hour);
        let Some(body) = fetch_bytes(&self.client, &url, self.retry).await? else {
            debug!(%url, "Consensus not published");
            return Ok(None);
        };

        let text = String::from_utf8_lossy(&body);
        let readings = parse_consensus(&text);
        debug!(%url, relays = readings.len(), "Consensus parsed");

        Ok(Some(Snapshot {
            date,
            hour,
            readings,
        }))
    }
}
