//! HTTP fetching with retry for snapshot documents.

mod basic;
mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use basic::{BasicClient, USER_AGENT};
pub use client::HttpClient;

use anyhow::{Context, Result};
use reqwest::{Method, StatusCode, Url};
use std::time::Duration;
use tracing::warn;

/// How many times a transport failure is attempted and how the delay grows.
///
/// The delay before retry `n` (1-based) is `backoff_base^n` seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            backoff_base: 1.5,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.backoff_base.powi(attempt as i32))
    }
}

/// Fetches `url`, returning `None` when the server answers 404.
///
/// Transport errors and non-404 error statuses are retried per `policy`.
pub async fn fetch_bytes<C: HttpClient>(
    client: &C,
    url: &str,
    policy: RetryPolicy,
) -> Result<Option<Vec<u8>>> {
    let url: Url = url.parse().with_context(|| format!("Invalid URL '{url}'"))?;
    let mut attempt = 1;

    loop {
        match fetch_once(client, url.clone()).await {
            Ok(body) => return Ok(body),
            Err(e) if attempt < policy.attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    %url,
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    error = %e,
                    "Fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!("Giving up on {url} after {attempt} attempts")));
            }
        }
    }
}

async fn fetch_once<C: HttpClient>(client: &C, url: Url) -> Result<Option<Vec<u8>>> {
    let req = reqwest::Request::new(Method::GET, url);
    let resp = client.execute(req).await?;

    if resp.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }

    let resp = resp.error_for_status()?;
    Ok(Some(resp.bytes().await?.to_vec()))
}
