//! Run configuration for the stability pipeline.
//!
//! [`PipelineConfig`] is the validated configuration the core accepts.
//! [`RunConfigFile`] is an optional JSON file whose values sit between the
//! built-in defaults and command-line flags:
//! ```json
//! {
//!   "start": "2024-01-01",
//!   "end": "2024-12-31",
//!   "window_length": 7,
//!   "week_anchor": "mon"
//! }
//! ```

use std::num::NonZeroUsize;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::Deserialize;

use crate::error::PipelineError;
use crate::stability::types::DateRange;
use crate::stability::weekly::week_origin;
use crate::stability::window::DEFAULT_WINDOW_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    date_range: DateRange,
    window_length: NonZeroUsize,
    week_anchor: Weekday,
}

impl PipelineConfig {
    /// Window length 7, weeks anchored on the weekday of the range start.
    pub fn new(date_range: DateRange) -> Self {
        Self {
            date_range,
            window_length: DEFAULT_WINDOW_LENGTH,
            week_anchor: date_range.start().weekday(),
        }
    }

    pub fn with_window_length(mut self, window_length: usize) -> Result<Self, PipelineError> {
        self.window_length = NonZeroUsize::new(window_length).ok_or_else(|| {
            PipelineError::InvalidConfig("window_length must be a positive integer".to_string())
        })?;
        Ok(self)
    }

    pub fn with_week_anchor(mut self, week_anchor: Weekday) -> Self {
        self.week_anchor = week_anchor;
        self
    }

    pub fn date_range(&self) -> &DateRange {
        &self.date_range
    }

    pub fn window_length(&self) -> NonZeroUsize {
        self.window_length
    }

    pub fn week_anchor(&self) -> Weekday {
        self.week_anchor
    }

    /// First day of week 0.
    pub fn week_origin(&self) -> NaiveDate {
        week_origin(self.date_range.start(), self.week_anchor)
    }
}

/// Optional on-disk run configuration. Every key may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfigFile {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub window_length: Option<usize>,
    week_anchor: Option<String>,
}

impl RunConfigFile {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config '{}'", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid config '{}'", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn week_anchor(&self) -> Result<Option<Weekday>> {
        self.week_anchor.as_deref().map(parse_weekday).transpose()
    }
}

/// Parses a weekday name such as `mon` or `Monday`, case-insensitively.
pub fn parse_weekday(name: &str) -> Result<Weekday> {
    name.trim()
        .parse::<Weekday>()
        .map_err(|_| anyhow::anyhow!("'{name}' is not a weekday name"))
}

/// Parses a UTC time of day written `HH:MM`.
pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| anyhow::anyhow!("'{value}' is not a time of day (HH:MM)"))
}
