//! CLI entry point for the relay stability tool.
//!
//! Provides subcommands for pulling a daily bandwidth panel from consensus
//! archives, validating a panel, and computing weekly stability statistics.

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime, Weekday};
use clap::{Parser, Subcommand, ValueEnum};
use relay_stability::config::{PipelineConfig, RunConfigFile, parse_hhmm, parse_weekday};
use relay_stability::infra::archive::{ARCHIVE_BASE_URL, ArchiveClient, DEFAULT_CACHE_DIR};
use relay_stability::infra::collector::{CollectorClient, RECENT_BASE_URL};
use relay_stability::infra::onionoo::{
    HistoryWindow, OnionooClient, WEIGHTS_URL, nearest_daily_samples,
};
use relay_stability::offsets::{BUCKET_LABELS, Baseline, offset_stats};
use relay_stability::output::{file_sha256, read_panel, write_panel, write_stats, write_weekly};
use relay_stability::pull::pull_snapshots;
use relay_stability::services::snapshot_source::SnapshotSource;
use relay_stability::stability::{self, types::DateRange};
use relay_stability::validate::validate_panel;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "relay_stability")]
#[command(about = "Rolling bandwidth stability statistics for Tor relays", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a daily bandwidth panel from hourly consensus documents
    Pull {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Preferred consensus hour (0-23)
        #[arg(long, default_value_t = 0)]
        hour: u32,

        /// Fallback hour(s), tried in order when the preferred hour is missing
        #[arg(long = "hour-fallback")]
        hour_fallback: Vec<u32>,

        /// Where consensus documents are read from
        #[arg(long, value_enum, default_value_t = ConsensusSource::Archive)]
        source: ConsensusSource,

        /// Base URL of the source (defaults to CollecTor's for that source)
        #[arg(long)]
        base_url: Option<String>,

        /// Directory holding downloaded monthly archives
        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,

        /// Maximum number of days fetched at once
        #[arg(short, long, default_value_t = 5)]
        concurrency: usize,

        /// Panel CSV to write (`.gz` to compress)
        #[arg(short, long, default_value = "daily_bw.csv")]
        out: PathBuf,
    },
    /// Build a daily panel from Onionoo consensus-weight histories
    Onionoo {
        /// Preferred history window; the longest published one is used if absent
        #[arg(long, default_value = "1year", value_parser = HistoryWindow::from_str)]
        window: HistoryWindow,

        /// UTC time of day (HH:MM); each relay's closest sample per day is kept
        #[arg(long, default_value = "00:00", value_parser = parse_hhmm)]
        sample_time: NaiveTime,

        #[arg(long, default_value = WEIGHTS_URL)]
        base_url: String,

        /// Panel CSV to write (`.gz` to compress)
        #[arg(short, long, default_value = "daily_bw.csv")]
        out: PathBuf,
    },
    /// Compute windowed CoV statistics and weekly medians from a panel
    Analyze {
        /// Panel CSV (date,fingerprint,relay_bandwidth)
        #[arg(value_name = "PANEL_CSV")]
        panel: PathBuf,

        /// First day of the analysis range (defaults to the panel's first date)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day of the analysis range (defaults to the panel's last date)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Sliding window length in days
        #[arg(short, long)]
        window_length: Option<usize>,

        /// Weekday on which weeks start (defaults to the start date's weekday)
        #[arg(long, value_parser = parse_weekday)]
        week_anchor: Option<Weekday>,

        /// JSON run configuration; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Weekly median CSV to write
        #[arg(short, long, default_value = "weekly_cov.csv")]
        out: PathBuf,

        /// Optional per-window statistics CSV
        #[arg(long)]
        stats_out: Option<PathBuf>,
    },
    /// Check that a panel has one row per relay per day with no gaps
    Validate {
        #[arg(value_name = "PANEL_CSV")]
        panel: PathBuf,

        /// Baseline for the time-of-day offset report
        #[arg(long, value_enum, default_value_t = BaselineArg::Midnight)]
        baseline: BaselineArg,

        /// HH:MM (UTC) used with `--baseline time`
        #[arg(long, value_parser = parse_hhmm)]
        baseline_time: Option<NaiveTime>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConsensusSource {
    /// Monthly CollecTor archives, cached on disk
    Archive,
    /// CollecTor's recent directory (last few days only)
    Recent,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BaselineArg {
    /// 00:00 UTC
    Midnight,
    /// The time given with --baseline-time
    Time,
    /// The panel's most common sample time
    Auto,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/relay_stability.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("relay_stability.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pull {
            start,
            end,
            hour,
            hour_fallback,
            source,
            base_url,
            cache_dir,
            concurrency,
            out,
        } => {
            let range = DateRange::inclusive(start, end)?;
            let mut hours = vec![hour];
            hours.extend(hour_fallback);
            match source {
                ConsensusSource::Archive => {
                    let base_url = base_url.as_deref().unwrap_or(ARCHIVE_BASE_URL);
                    let client = ArchiveClient::new(base_url, cache_dir)?;
                    pull(Arc::new(client), range, &hours, concurrency, &out).await?;
                }
                ConsensusSource::Recent => {
                    let base_url = base_url.as_deref().unwrap_or(RECENT_BASE_URL);
                    let client = CollectorClient::new(base_url)?;
                    pull(Arc::new(client), range, &hours, concurrency, &out).await?;
                }
            }
        }
        Commands::Onionoo {
            window,
            sample_time,
            base_url,
            out,
        } => {
            onionoo(window, sample_time, &base_url, &out).await?;
        }
        Commands::Analyze {
            panel,
            start,
            end,
            window_length,
            week_anchor,
            config,
            out,
            stats_out,
        } => {
            let file_config = config
                .as_deref()
                .map(RunConfigFile::load)
                .transpose()?
                .unwrap_or_default();
            let overrides = AnalyzeOverrides {
                start: start.or(file_config.start),
                end: end.or(file_config.end),
                window_length: window_length.or(file_config.window_length),
                week_anchor: week_anchor.or(file_config.week_anchor()?),
            };
            analyze(&panel, overrides, &out, stats_out.as_deref())?;
        }
        Commands::Validate {
            panel,
            baseline,
            baseline_time,
        } => {
            let baseline = match (baseline, baseline_time) {
                (BaselineArg::Midnight, _) => Baseline::Midnight,
                (BaselineArg::Auto, _) => Baseline::Auto,
                (BaselineArg::Time, Some(time)) => Baseline::Time(time),
                (BaselineArg::Time, None) => {
                    bail!("--baseline time requires --baseline-time HH:MM")
                }
            };
            validate(&panel, baseline)?;
        }
    }

    Ok(())
}

/// Fetches one consensus per day and writes the relays present on every fetched day.
#[tracing::instrument(skip(source, hours))]
async fn pull<S: SnapshotSource + 'static>(
    source: Arc<S>,
    range: DateRange,
    hours: &[u32],
    concurrency: usize,
    out: &Path,
) -> Result<()> {
    let outcome = pull_snapshots(source, &range, hours, concurrency).await?;
    for missing in &outcome.missing {
        warn!(date = %missing.date, error = ?missing.error, "No snapshot for day");
    }
    if outcome.snapshots.is_empty() {
        bail!("no days fetched; nothing to write");
    }

    let common_relays = outcome.common_nodes().len();
    if common_relays == 0 {
        warn!("No relays present on all fetched days; panel will be empty");
    }

    let rows = write_panel(out, outcome.panel_rows())?;
    info!(
        path = %out.display(),
        days = outcome.snapshots.len(),
        common_relays,
        rows,
        "Panel written"
    );
    Ok(())
}

/// Writes one row per relay and day from the sample closest to `sample_time`.
#[tracing::instrument(skip(base_url))]
async fn onionoo(
    window: HistoryWindow,
    sample_time: NaiveTime,
    base_url: &str,
    out: &Path,
) -> Result<()> {
    let client = OnionooClient::new(base_url)?;
    let samples = client.fetch_samples(window).await?;
    if samples.is_empty() {
        bail!("Onionoo returned no weight history; try another --window");
    }

    let mut rows = Vec::new();
    for sample in nearest_daily_samples(samples, sample_time) {
        match sample.panel_row() {
            Ok(row) => rows.push(row),
            Err(e) => warn!(error = %e, "Sample skipped"),
        }
    }

    let rows = write_panel(out, rows)?;
    info!(path = %out.display(), rows, "Panel written");
    Ok(())
}

fn validate(panel: &Path, baseline: Baseline) -> Result<()> {
    let digest = file_sha256(panel)?;
    let data = read_panel(panel)?;

    match offset_stats(&data.sample_times, baseline) {
        Some(stats) => {
            info!(
                baseline = %stats.baseline.format("%H:%M"),
                samples = stats.samples,
                median_secs = stats.median_secs,
                p95_secs = stats.p95_secs,
                max_secs = stats.max_secs,
                "Time-of-day offsets from baseline"
            );
            for (label, rows) in BUCKET_LABELS.iter().zip(stats.buckets) {
                info!(bucket = *label, rows, "Offset bucket");
            }
            for (time, rows) in &stats.common_times {
                info!(time = %time, rows = *rows, "Common sample time");
            }
        }
        None => info!("No readable timestamps; time-of-day offsets skipped"),
    }

    let summary = validate_panel(&data)
        .with_context(|| format!("Validation failed for '{}'", panel.display()))?;
    if summary.zero_readings > 0 {
        warn!(rows = summary.zero_readings, "Rows with zero bandwidth");
    }
    if summary.huge_readings > 0 {
        warn!(rows = summary.huge_readings, "Rows with very large bandwidth (>1e9)");
    }
    info!(
        sha256 = %digest,
        first_date = %summary.first_date,
        last_date = %summary.last_date,
        days = summary.days,
        common_relays = summary.common_nodes,
        rows = summary.rows,
        "Panel passed all checks"
    );
    Ok(())
}

/// Analysis settings after merging flags over the config file.
struct AnalyzeOverrides {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    window_length: Option<usize>,
    week_anchor: Option<Weekday>,
}

#[tracing::instrument(skip(overrides))]
fn analyze(
    panel: &Path,
    overrides: AnalyzeOverrides,
    out: &Path,
    stats_out: Option<&Path>,
) -> Result<()> {
    let data = read_panel(panel)?;
    for row_error in data.row_errors.iter().take(10) {
        warn!(line = row_error.line, message = %row_error.message, "Skipped panel row");
    }

    let start = overrides
        .start
        .or(data.first_date())
        .context("panel is empty and no --start was given")?;
    let end = overrides
        .end
        .or(data.last_date())
        .context("panel is empty and no --end was given")?;

    let mut config = PipelineConfig::new(DateRange::inclusive(start, end)?);
    if let Some(window_length) = overrides.window_length {
        config = config.with_window_length(window_length)?;
    }
    if let Some(anchor) = overrides.week_anchor {
        config = config.with_week_anchor(anchor);
    }

    let result = stability::run(data.observations, &config)?;
    if !result.report.is_clean() {
        warn!(
            out_of_range = result.report.out_of_range.len(),
            zero_mean_windows = result.report.degenerate_means.len(),
            "Some observations or windows were skipped"
        );
    }

    write_weekly(out, &result.weekly)?;
    if let Some(path) = stats_out {
        write_stats(path, &result.records)?;
    }

    info!(
        relays = result.nodes.len(),
        windows = result.records.len(),
        weeks = result.weekly.len(),
        out = %out.display(),
        "Analysis written"
    );
    Ok(())
}
