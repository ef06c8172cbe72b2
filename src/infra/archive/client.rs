use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bzip2::read::BzDecoder;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};
use xz2::read::XzDecoder;

use crate::fetch::{BasicClient, HttpClient, RetryPolicy, fetch_bytes};
use crate::parser::parse_consensus;
use crate::services::snapshot_source::{Snapshot, SnapshotSource};

pub const ARCHIVE_BASE_URL: &str =
    "https://collector.torproject.org/archive/relay-descriptors/consensuses";

pub const DEFAULT_CACHE_DIR: &str = ".cache/tor-consensuses";

/// Reads consensuses out of CollecTor's monthly `consensuses-YYYY-MM.tar.xz`
/// archives.
///
/// Each month is downloaded at most once and kept under the cache directory,
/// so later runs and every other day of the same month read it from disk.
pub struct ArchiveClient<C> {
    client: C,
    base_url: String,
    cache_dir: PathBuf,
    retry: RetryPolicy,
    // month -> cached tarball, or None when the month is not published
    months: Mutex<HashMap<String, Arc<OnceCell<Option<PathBuf>>>>>,
}

impl ArchiveClient<BasicClient> {
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_client(BasicClient::new()?, base_url, cache_dir))
    }
}

impl<C> ArchiveClient<C> {
    pub fn with_client(
        client: C,
        base_url: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
            retry: RetryPolicy::default(),
            months: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn archive_url(&self, month: &str) -> String {
        format!("{}/consensuses-{month}.tar.xz", self.base_url)
    }

    pub fn cache_path(&self, month: &str) -> PathBuf {
        self.cache_dir.join(format!("consensuses-{month}.tar.xz"))
    }
}

impl<C: HttpClient> ArchiveClient<C> {
    async fn month_archive(&self, month: &str) -> Result<Option<PathBuf>> {
        let cell = self
            .months
            .lock()
            .await
            .entry(month.to_string())
            .or_default()
            .clone();
        cell.get_or_try_init(|| self.load_month(month))
            .await
            .cloned()
    }

    async fn load_month(&self, month: &str) -> Result<Option<PathBuf>> {
        let path = self.cache_path(month);
        if tokio::fs::try_exists(&path).await? {
            info!(path = %path.display(), "Using cached archive");
            return Ok(Some(path));
        }

        let url = self.archive_url(month);
        info!(%url, "Downloading monthly archive");
        let Some(blob) = fetch_bytes(&self.client, &url, self.retry).await? else {
            warn!(%url, "Monthly archive not published");
            return Ok(None);
        };

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .with_context(|| format!("Failed to create '{}'", self.cache_dir.display()))?;
        // written aside and renamed so an interrupted download never looks cached
        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, &blob)
            .await
            .with_context(|| format!("Failed to write '{}'", partial.display()))?;
        tokio::fs::rename(&partial, &path).await?;
        info!(path = %path.display(), bytes = blob.len(), "Archive cached");

        Ok(Some(path))
    }
}

#[async_trait]
impl<C: HttpClient> SnapshotSource for ArchiveClient<C> {
    async fn snapshot(&self, date: NaiveDate, hour: u32) -> Result<Option<Snapshot>> {
        let month = date.format("%Y-%m").to_string();
        let Some(archive) = self.month_archive(&month).await? else {
            return Ok(None);
        };

        let text =
            tokio::task::spawn_blocking(move || find_consensus(&archive, date, hour)).await??;
        let Some(text) = text else {
            debug!(%date, hour, "Consensus not in archive");
            return Ok(None);
        };

        let readings = parse_consensus(&text);
        debug!(%date, hour, relays = readings.len(), "Consensus parsed");
        Ok(Some(Snapshot {
            date,
            hour,
            readings,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberEncoding {
    Plain,
    Xz,
    Bzip2,
}

/// Matches `[consensuses-]YYYY-MM-DD-HH-00-00[-00]-consensus[.xz|.bz2]`.
fn member_encoding(name: &str, date: NaiveDate, hour: u32) -> Option<MemberEncoding> {
    let name = name.strip_prefix("consensuses-").unwrap_or(name);
    let stamp = format!("{}-{hour:02}-00-00", date.format("%Y-%m-%d"));
    let rest = name.strip_prefix(stamp.as_str())?;
    let rest = rest.strip_prefix("-00").unwrap_or(rest);

    match rest.strip_prefix("-consensus")? {
        "" => Some(MemberEncoding::Plain),
        ".xz" => Some(MemberEncoding::Xz),
        ".bz2" => Some(MemberEncoding::Bzip2),
        _ => None,
    }
}

/// Scans the tarball for the consensus of `date` at `hour`.
fn find_consensus(archive: &Path, date: NaiveDate, hour: u32) -> Result<Option<String>> {
    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive '{}'", archive.display()))?;
    let mut tar = tar::Archive::new(XzDecoder::new(BufReader::new(file)));

    for entry in tar.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let encoding = {
            let path = entry.path()?;
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| member_encoding(name, date, hour))
        };
        let Some(encoding) = encoding else {
            continue;
        };

        let mut raw = Vec::new();
        match encoding {
            MemberEncoding::Plain => entry.read_to_end(&mut raw)?,
            MemberEncoding::Xz => XzDecoder::new(&mut entry).read_to_end(&mut raw)?,
            MemberEncoding::Bzip2 => BzDecoder::new(&mut entry).read_to_end(&mut raw)?,
        };
        debug!(archive = %archive.display(), ?encoding, "Found consensus member");
        return Ok(Some(String::from_utf8_lossy(&raw).into_owned()));
    }

    Ok(None)
}
