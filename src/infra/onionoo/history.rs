//! Onionoo `weights` documents and per-day sampling of their histories.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::Deserialize;

use crate::error::PipelineError;
use crate::output::PanelRow;
use crate::stability::types::Observation;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// History span published by Onionoo for each relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryWindow {
    Week,
    Month,
    ThreeMonths,
    SixMonths,
    Year,
}

impl HistoryWindow {
    /// Longest first: the order tried when the preferred window is absent.
    pub const FALLBACK_ORDER: [HistoryWindow; 5] = [
        HistoryWindow::Year,
        HistoryWindow::SixMonths,
        HistoryWindow::ThreeMonths,
        HistoryWindow::Month,
        HistoryWindow::Week,
    ];

    /// Key of this window inside a `consensus_weight` object.
    pub fn key(self) -> &'static str {
        match self {
            HistoryWindow::Week => "1_week",
            HistoryWindow::Month => "1_month",
            HistoryWindow::ThreeMonths => "3_months",
            HistoryWindow::SixMonths => "6_months",
            HistoryWindow::Year => "1_year",
        }
    }
}

impl FromStr for HistoryWindow {
    type Err = String;

    /// Accepts `1week`..`1year` and the document keys `1_week`..`1_year`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('_', "").as_str() {
            "1week" => Ok(HistoryWindow::Week),
            "1month" => Ok(HistoryWindow::Month),
            "3months" => Ok(HistoryWindow::ThreeMonths),
            "6months" => Ok(HistoryWindow::SixMonths),
            "1year" => Ok(HistoryWindow::Year),
            _ => Err(format!(
                "'{s}' is not a history window (1week, 1month, 3months, 6months, 1year)"
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsPage {
    #[serde(default)]
    pub relays: Vec<RelayWeights>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayWeights {
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub consensus_weight: HashMap<String, History>,
}

impl RelayWeights {
    /// The `preferred` history if published, else the longest one available.
    pub fn history(&self, preferred: HistoryWindow) -> Option<&History> {
        self.consensus_weight.get(preferred.key()).or_else(|| {
            HistoryWindow::FALLBACK_ORDER
                .iter()
                .find_map(|window| self.consensus_weight.get(window.key()))
        })
    }
}

/// Evenly spaced, normalized values starting at `first`.
#[derive(Debug, Clone, Deserialize)]
pub struct History {
    pub first: String,
    #[serde(default = "default_interval")]
    pub interval: i64,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default)]
    pub values: Vec<Option<f64>>,
}

fn default_interval() -> i64 {
    86_400
}

fn default_factor() -> f64 {
    1.0
}

impl History {
    /// Absolute UTC sample times with values scaled by `factor`. Null values are dropped.
    pub fn samples(&self) -> Result<Vec<(NaiveDateTime, f64)>, chrono::ParseError> {
        let first = NaiveDateTime::parse_from_str(&self.first, TIME_FORMAT)?;
        let interval = TimeDelta::seconds(self.interval);

        Ok(self
            .values
            .iter()
            .zip(0..)
            .filter_map(|(value, i)| value.map(|v| (first + interval * i, v * self.factor)))
            .collect())
    }
}

/// One weight reading of one relay at the time Onionoo recorded it.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSample {
    pub fingerprint: String,
    pub at: NaiveDateTime,
    pub value: f64,
}

impl WeightSample {
    /// Panel row dated on the sample's UTC day and stamped with its actual time.
    pub fn panel_row(&self) -> Result<PanelRow, PipelineError> {
        let obs = Observation::new(self.at.date(), self.fingerprint.as_str(), self.value)?;
        Ok(PanelRow::new(&obs, Some(self.at)))
    }
}

/// Keeps, per relay and UTC calendar day, the sample closest to `target` on
/// that day. On a tie the earlier sample wins. Output is ordered by
/// fingerprint, then day.
pub fn nearest_daily_samples<I>(samples: I, target: NaiveTime) -> Vec<WeightSample>
where
    I: IntoIterator<Item = WeightSample>,
{
    let mut best: BTreeMap<(String, NaiveDate), (i64, WeightSample)> = BTreeMap::new();

    for sample in samples {
        let day = sample.at.date();
        let distance = (sample.at - day.and_time(target)).num_seconds().abs();

        match best.entry((sample.fingerprint.clone(), day)) {
            Entry::Vacant(slot) => {
                slot.insert((distance, sample));
            }
            Entry::Occupied(mut slot) => {
                let (kept_distance, kept) = slot.get();
                if (distance, sample.at) < (*kept_distance, kept.at) {
                    slot.insert((distance, sample));
                }
            }
        }
    }

    best.into_values().map(|(_, sample)| sample).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn sample(fingerprint: &str, when: NaiveDateTime, value: f64) -> WeightSample {
        WeightSample {
            fingerprint: fingerprint.to_string(),
            at: when,
            value,
        }
    }

    fn hhmm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_window_names() {
        assert_eq!("1year".parse::<HistoryWindow>(), Ok(HistoryWindow::Year));
        assert_eq!("3_months".parse::<HistoryWindow>(), Ok(HistoryWindow::ThreeMonths));
        assert!("2years".parse::<HistoryWindow>().is_err());
    }

    #[test]
    fn test_history_prefers_requested_then_longest() {
        let relay: RelayWeights = serde_json::from_str(
            r#"{
                "fingerprint": "AA",
                "consensus_weight": {
                    "1_week": {"first": "2024-03-01 00:00:00", "values": [1]},
                    "6_months": {"first": "2023-09-01 00:00:00", "values": [2]}
                }
            }"#,
        )
        .unwrap();

        let week = relay.history(HistoryWindow::Week).unwrap();
        assert_eq!(week.first, "2024-03-01 00:00:00");
        let fallback = relay.history(HistoryWindow::Year).unwrap();
        assert_eq!(fallback.first, "2023-09-01 00:00:00");
    }

    #[test]
    fn test_samples_scaled_and_nulls_dropped() {
        let history: History = serde_json::from_str(
            r#"{"first": "2024-03-01 00:00:00", "interval": 43200, "factor": 0.5,
                "values": [10, null, 30]}"#,
        )
        .unwrap();

        assert_eq!(
            history.samples().unwrap(),
            vec![(at(1, 0, 0), 5.0), (at(2, 0, 0), 15.0)]
        );
    }

    #[test]
    fn test_bad_first_timestamp() {
        let history: History =
            serde_json::from_str(r#"{"first": "yesterday", "values": [1]}"#).unwrap();
        assert!(history.samples().is_err());
    }

    #[test]
    fn test_nearest_sample_per_day() {
        let samples = vec![
            sample("B", at(1, 12, 0), 7.0),
            sample("A", at(1, 23, 0), 3.0),
            sample("A", at(1, 6, 0), 2.0),
            sample("A", at(1, 0, 0), 1.0),
            sample("A", at(2, 0, 30), 4.0),
        ];

        let picked = nearest_daily_samples(samples.clone(), hhmm(5, 0));
        assert_eq!(
            picked,
            vec![
                sample("A", at(1, 6, 0), 2.0),
                sample("A", at(2, 0, 30), 4.0),
                sample("B", at(1, 12, 0), 7.0),
            ]
        );

        // 03:00 is equally far from 00:00 and 06:00
        let tie = nearest_daily_samples(samples, hhmm(3, 0));
        assert_eq!(tie[0], sample("A", at(1, 0, 0), 1.0));
    }

    #[test]
    fn test_panel_row_keeps_sample_time() {
        let row = sample("A", at(4, 7, 15), 12.0).panel_row().unwrap();

        assert_eq!(row.date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(row.relay_bandwidth, 12.0);
        assert_eq!(row.timestamp.as_deref(), Some("2024-03-04T07:15:00"));
        assert!(sample("A", at(4, 0, 0), -1.0).panel_row().is_err());
    }
}
