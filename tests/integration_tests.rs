use chrono::{Days, NaiveDate};
use relay_stability::config::PipelineConfig;
use relay_stability::output::{read_panel, write_panel, write_weekly};
use relay_stability::parser::parse_consensus;
use relay_stability::pull::PullOutcome;
use relay_stability::services::snapshot_source::Snapshot;
use relay_stability::stability::types::{DateRange, Observation};
use relay_stability::stability::run;
use relay_stability::validate::validate_panel;
use std::env;
use std::fs;

const RELAY_A: &str = "AAECAwQFBgcICQoLDA0ODxAREhM";
const RELAY_B: &str = "//79/Pv6+fj39vX08/Lx8O/u7e0";
const RELAY_C: &str = "ERERERERERERERERERERERERERE";

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// Consensus for day `i` (0-based); relay C is absent on day 4 (the fifth day).
fn consensus(i: u64) -> String {
    let mut doc = String::from("network-status-version 3\n");
    let relays = [(RELAY_A, 1000 + 10 * i), (RELAY_B, 500 + (i % 3) * 100), (RELAY_C, 200)];
    for (idx, (identity, bw)) in relays.iter().enumerate() {
        if *identity == RELAY_C && i == 4 {
            continue;
        }
        doc.push_str(&format!(
            "r relay{idx} {identity} ZGlnZXN0 2024-01-01 00:00:00 10.0.0.{idx} 9001 0\n"
        ));
        doc.push_str("s Running Valid\n");
        doc.push_str(&format!("w Bandwidth={bw}\n"));
    }
    doc
}

fn snapshots() -> Vec<Snapshot> {
    (0..10)
        .map(|i| Snapshot {
            date: start() + Days::new(i),
            hour: 0,
            readings: parse_consensus(&consensus(i)),
        })
        .collect()
}

#[test]
fn test_full_pipeline_from_consensus_documents() {
    let observations: Vec<Observation> = snapshots()
        .iter()
        .flat_map(Snapshot::observations)
        .collect();
    assert_eq!(observations.len(), 29);

    let range = DateRange::inclusive(start(), start() + Days::new(9)).unwrap();
    let config = PipelineConfig::new(range);
    let result = run(observations, &config).expect("pipeline run failed");

    let nodes: Vec<_> = result.nodes.iter().cloned().collect();
    assert_eq!(
        nodes,
        vec![
            "000102030405060708090A0B0C0D0E0F10111213".to_string(),
            "FFFEFDFCFBFAF9F8F7F6F5F4F3F2F1F0EFEEEDED".to_string(),
        ]
    );
    for node in &nodes {
        assert_eq!(result.records.iter().filter(|r| &r.node_id == node).count(), 4);
    }
    assert!(result.report.is_clean());

    // windows end on days 7..=10: one end date in week 0, three in week 1
    let weeks: Vec<_> = result.weekly.iter().map(|w| w.week_index).collect();
    assert_eq!(weeks, vec![0, 1]);

    let mut week0: Vec<f64> = result
        .records
        .iter()
        .filter(|r| r.window_end_date == start() + Days::new(6))
        .map(|r| r.cov)
        .collect();
    week0.sort_by(f64::total_cmp);
    assert_eq!(week0.len(), 2);
    assert_eq!(result.weekly[0].median_cov, (week0[0] + week0[1]) / 2.0);
}

#[test]
fn test_panel_round_trip_validates_and_analyzes() {
    let panel_path = env::temp_dir().join("relay_stability_it_panel.csv");
    let weekly_path = env::temp_dir().join("relay_stability_it_weekly.csv");
    let _ = fs::remove_file(&panel_path);
    let _ = fs::remove_file(&weekly_path);

    // relay C is missing on one day and is left out of the panel
    let outcome = PullOutcome {
        snapshots: snapshots(),
        missing: Vec::new(),
    };
    assert_eq!(write_panel(&panel_path, outcome.panel_rows()).unwrap(), 20);
    let content = fs::read_to_string(&panel_path).unwrap();
    assert_eq!(
        content.lines().nth(1),
        Some("2024-01-01,000102030405060708090A0B0C0D0E0F10111213,1000,2024-01-01T00:00:00")
    );

    let panel = read_panel(&panel_path).unwrap();
    let summary = validate_panel(&panel).unwrap();
    assert_eq!(summary.days, 10);
    assert_eq!(summary.common_nodes, 2);
    assert_eq!(summary.rows, 20);

    let range = DateRange::inclusive(summary.first_date, summary.last_date).unwrap();
    let config = PipelineConfig::new(range).with_window_length(3).unwrap();
    let result = run(panel.observations, &config).unwrap();
    assert_eq!(result.records.len(), 2 * 8);

    write_weekly(&weekly_path, &result.weekly).unwrap();
    let content = fs::read_to_string(&weekly_path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines[0], "week_index,median_cov");
    assert_eq!(lines.len(), 1 + result.weekly.len());

    fs::remove_file(&panel_path).unwrap();
    fs::remove_file(&weekly_path).unwrap();
}

#[test]
fn test_empty_range_yields_all_nodes_and_no_records() {
    let observations: Vec<Observation> = snapshots()
        .iter()
        .flat_map(Snapshot::observations)
        .collect();

    let config = PipelineConfig::new(DateRange::empty(start()));
    let result = run(observations, &config).unwrap();

    assert_eq!(result.nodes.len(), 3);
    assert!(result.records.is_empty());
    assert!(result.weekly.is_empty());
}
