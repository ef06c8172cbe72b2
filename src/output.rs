//! CSV persistence for daily panels, window statistics and weekly medians.
//!
//! Paths ending in `.gz` are transparently gzip-compressed on write and
//! decompressed on read.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::WriterBuilder;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::stability::types::{Observation, StatRecord, WeeklyMedian};

/// One row of a daily panel: a node's reading on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub date: NaiveDate,
    pub fingerprint: String,
    #[serde(alias = "advertised_bw", serialize_with = "integral_or_float")]
    pub relay_bandwidth: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl PanelRow {
    /// Row for `obs`, stamped with the time its reading was sampled.
    pub fn new(obs: &Observation, sampled_at: Option<NaiveDateTime>) -> Self {
        Self {
            date: obs.date(),
            fingerprint: obs.node_id().to_string(),
            relay_bandwidth: obs.value(),
            timestamp: sampled_at.map(|at| at.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }
}

// largest f64 below which every integer is exact
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Whole-number bandwidths are written as integers (`5`, not `5.0`).
fn integral_or_float<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < EXACT_INTEGER_LIMIT {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// When a row's reading was actually taken, for rows with a readable timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTime {
    pub date: NaiveDate,
    pub at: NaiveDateTime,
}

/// Parses ISO-8601 timestamps with or without a UTC offset, `T` or space separated.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.naive_utc());
    }
    if let Ok(at) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(at.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// A row that could not be turned into an [`Observation`].
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Observations read from a panel plus rows that were rejected.
#[derive(Debug, Clone, Default)]
pub struct PanelData {
    pub observations: Vec<Observation>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub sample_times: Vec<SampleTime>,
}

impl PanelData {
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.iter().map(Observation::date).min()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.iter().map(Observation::date).max()
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

/// Reads a panel CSV with columns `date,fingerprint,relay_bandwidth[,timestamp]`.
pub fn read_panel(path: &Path) -> Result<PanelData> {
    let file =
        File::open(path).with_context(|| format!("Failed to open panel '{}'", path.display()))?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let data = read_panel_from(reader)?;
    info!(
        path = %path.display(),
        rows = data.rows_read,
        rejected = data.row_errors.len(),
        "Panel loaded"
    );
    Ok(data)
}

pub fn read_panel_from<R: Read>(reader: R) -> Result<PanelData> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut data = PanelData::default();

    for (idx, result) in rdr.deserialize::<PanelRow>().enumerate() {
        // header is line 1
        let line = idx + 2;
        data.rows_read += 1;

        let row = match result {
            Ok(row) => row,
            Err(e) => {
                data.row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        if let Some(at) = row.timestamp.as_deref().and_then(parse_timestamp) {
            data.sample_times.push(SampleTime { date: row.date, at });
        }
        match Observation::new(row.date, row.fingerprint, row.relay_bandwidth) {
            Ok(obs) => data.observations.push(obs),
            Err(e) => data.row_errors.push(RowError {
                line,
                message: e.to_string(),
            }),
        }
    }

    Ok(data)
}

/// Writes panel rows sorted by date then fingerprint.
pub fn write_panel<I>(path: &Path, rows: I) -> Result<usize>
where
    I: IntoIterator<Item = PanelRow>,
{
    let mut rows: Vec<PanelRow> = rows.into_iter().collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.fingerprint.cmp(&b.fingerprint)));

    let count = rows.len();
    write_csv(
        path,
        &["date", "fingerprint", "relay_bandwidth", "timestamp"],
        rows,
    )?;
    Ok(count)
}

/// Writes `week_index,median_cov` rows in the given order.
pub fn write_weekly(path: &Path, weekly: &[WeeklyMedian]) -> Result<()> {
    write_csv(path, &["week_index", "median_cov"], weekly)
}

/// Writes one `node_id,window_end_date,cov,stdev` row per window.
pub fn write_stats(path: &Path, records: &[StatRecord]) -> Result<()> {
    write_csv(path, &["node_id", "window_end_date", "cov", "stdev"], records)
}

/// Hex SHA-256 of the file's bytes, logged alongside validation results.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn write_csv<T, I>(path: &Path, headers: &[&str], rows: I) -> Result<()>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create '{}'", path.display()))?;
    debug!(path = %path.display(), gzip = is_gzip(path), "Writing CSV");

    if is_gzip(path) {
        let encoder = write_rows(GzEncoder::new(file, Compression::default()), headers, rows)?;
        encoder.finish()?;
    } else {
        write_rows(file, headers, rows)?;
    }
    Ok(())
}

fn write_rows<W, T, I>(sink: W, headers: &[&str], rows: I) -> Result<W>
where
    W: Write,
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    // header written explicitly so empty outputs still carry it
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(sink);
    writer.write_record(headers)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush CSV writer: {}", e.error()))
}
