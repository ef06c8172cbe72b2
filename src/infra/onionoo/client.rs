use anyhow::{Context, Result};
use reqwest::Url;
use tracing::{info, warn};

use super::history::{HistoryWindow, WeightSample, WeightsPage};
use crate::fetch::{BasicClient, HttpClient, RetryPolicy, fetch_bytes};

pub const WEIGHTS_URL: &str = "https://onionoo.torproject.org/weights";

pub const PAGE_SIZE: usize = 5000;

/// Pages through Onionoo's `weights` document and unpacks each relay's
/// `consensus_weight` history.
pub struct OnionooClient<C> {
    client: C,
    base_url: String,
    page_size: usize,
    retry: RetryPolicy,
}

impl OnionooClient<BasicClient> {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(BasicClient::new()?, base_url))
    }
}

impl<C> OnionooClient<C> {
    pub fn with_client(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            page_size: PAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn page_url(&self, offset: usize) -> Result<Url> {
        Url::parse_with_params(
            &self.base_url,
            &[
                ("limit", self.page_size.to_string()),
                ("offset", offset.to_string()),
            ],
        )
        .with_context(|| format!("Invalid Onionoo URL '{}'", self.base_url))
    }
}

impl<C: HttpClient> OnionooClient<C> {
    async fn page(&self, offset: usize) -> Result<WeightsPage> {
        let url = self.page_url(offset)?;
        let body = fetch_bytes(&self.client, url.as_str(), self.retry)
            .await?
            .with_context(|| format!("{url} answered 404"))?;
        serde_json::from_slice(&body)
            .with_context(|| format!("Invalid weights document from {url}"))
    }

    /// Every non-null sample of every relay's history, preferring `window`.
    ///
    /// Relays without a fingerprint or without any history are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_samples(&self, window: HistoryWindow) -> Result<Vec<WeightSample>> {
        let mut samples = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.page(offset).await?;
            let relays = page.relays.len();

            for relay in &page.relays {
                let Some(fingerprint) = relay.fingerprint.as_deref() else {
                    continue;
                };
                let Some(history) = relay.history(window) else {
                    continue;
                };
                match history.samples() {
                    Ok(points) => samples.extend(points.into_iter().map(|(at, value)| {
                        WeightSample {
                            fingerprint: fingerprint.to_string(),
                            at,
                            value,
                        }
                    })),
                    Err(e) => warn!(fingerprint, error = %e, "Unreadable history; relay skipped"),
                }
            }

            info!(offset, relays, samples = samples.len(), "Weights page fetched");
            if relays < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        Ok(samples)
    }
}
