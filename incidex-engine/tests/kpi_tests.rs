//! KPI aggregation over stored records

mod helpers;

use chrono::{NaiveDate, TimeZone, Utc};
use helpers::{date, push_status_change, record};
use incidex_common::config::KpiConfig;
use incidex_common::models::{IncidentRecord, Severity, Status};
use incidex_engine::services::{aggregate, KpiAggregator};

fn stale_and_master() -> Vec<IncidentRecord> {
    // A: open, untouched for 20 days
    let a = record("jira", "A", Status::Open, Utc.with_ymd_and_hms(2026, 7, 12, 8, 0, 0).unwrap());

    // B: closed, six clients affected
    let mut b = record("jira", "B", Status::Open, Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0).unwrap());
    b.clients_affected = Some(6);
    push_status_change(&mut b, Status::Closed, Utc.with_ymd_and_hms(2026, 7, 4, 20, 0, 0).unwrap());

    vec![a, b]
}

#[test]
fn test_stale_and_master_scenario() {
    let today = date(2026, 8, 1);
    let result = aggregate(&stale_and_master(), today, 30, 5, 15);

    assert_eq!(result.stale_count, 1);
    assert_eq!(result.master_count, 1);
    assert_eq!(result.total_incidents, 2);
    assert_eq!(result.by_status[&Status::Open], 1);
    assert_eq!(result.by_status[&Status::Closed], 1);
    assert_eq!(result.by_severity[&Severity::Medium], 2);

    let incidents = stale_and_master();
    assert_eq!(result.stale_ids, vec![incidents[0].global_id.clone()]);
    assert_eq!(result.master_ids, vec![incidents[1].global_id.clone()]);
}

#[test]
fn test_stale_threshold_is_exclusive() {
    let records = stale_and_master();
    // 20 days old is not more than 20
    let result = aggregate(&records, date(2026, 8, 1), 30, 5, 20);
    assert_eq!(result.stale_count, 0);

    let result = aggregate(&records, date(2026, 8, 1), 30, 5, 19);
    assert_eq!(result.stale_count, 1);
}

#[test]
fn test_master_threshold_is_inclusive() {
    let records = stale_and_master();
    assert_eq!(aggregate(&records, date(2026, 8, 1), 30, 6, 15).master_count, 1);
    assert_eq!(aggregate(&records, date(2026, 8, 1), 30, 7, 15).master_count, 0);
}

#[test]
fn test_negative_thresholds_disable_metrics() {
    let result = aggregate(&stale_and_master(), date(2026, 8, 1), 30, -1, -1);
    assert_eq!(result.stale_count, 0);
    assert_eq!(result.master_count, 0);
    assert_eq!(result.total_incidents, 2);
}

#[test]
fn test_resolution_time_in_window() {
    let result = aggregate(&stale_and_master(), date(2026, 8, 1), 30, 5, 15);

    // B: first seen 07-01 08:00, closed 07-04 20:00
    assert_eq!(result.closed_in_period, 1);
    assert_eq!(result.resolution.count, 1);
    assert_eq!(result.resolution.mean_days, Some(3.5));
    assert_eq!(result.resolution.p90_days, Some(3.5));
}

#[test]
fn test_closure_outside_window_excluded() {
    // Window starts 07-22, B closed 07-04
    let result = aggregate(&stale_and_master(), date(2026, 8, 1), 10, 5, 15);
    assert_eq!(result.closed_in_period, 0);
    assert_eq!(result.resolution.mean_days, None);
    // Tallies are not windowed
    assert_eq!(result.by_status[&Status::Closed], 1);
}

#[test]
fn test_zero_and_negative_period_is_same_day_window() {
    let today = date(2026, 7, 4);
    for period in [0, -5] {
        let result = aggregate(&stale_and_master(), today, period, 5, 15);
        assert_eq!(result.window_start, today);
        assert_eq!(result.period_days, period);
        assert_eq!(result.closed_in_period, 1);
    }

    let result = aggregate(&stale_and_master(), date(2026, 7, 5), 0, 5, 15);
    assert_eq!(result.closed_in_period, 0);
}

#[test]
fn test_closed_without_transition_uses_creation_time() {
    let created = Utc.with_ymd_and_hms(2026, 7, 30, 8, 0, 0).unwrap();
    let closed_at_creation = record("sheet", "row-1", Status::Closed, created);

    let result = aggregate([&closed_at_creation], date(2026, 8, 1), 30, 5, 15);
    assert_eq!(result.closed_in_period, 1);
    assert_eq!(result.resolution.mean_days, Some(0.0));
    assert_eq!(result.opened_in_period, 1);
}

#[test]
fn test_aggregator_uses_configured_thresholds() {
    let aggregator = KpiAggregator::new(KpiConfig {
        period_days: 30,
        master_threshold_clients: 5,
        stale_days_threshold: 15,
    });
    let records = stale_and_master();
    let result = aggregator.aggregate(&records, date(2026, 8, 1));

    assert_eq!(result, aggregate(&records, date(2026, 8, 1), 30, 5, 15));
    assert!(result.render_text().contains("Stale: 1"));
}

#[test]
fn test_period_beyond_calendar_is_unbounded_window() {
    let today = date(2026, 8, 1);
    for period in [1_000_000_000, i64::MAX] {
        let result = aggregate(&stale_and_master(), today, period, 5, 15);
        assert_eq!(result.window_start, NaiveDate::MIN);
        assert_eq!(result.period_days, period);
        assert_eq!(result.closed_in_period, 1);
        assert_eq!(result.opened_in_period, 2);
        assert_eq!(result.stale_count, 1);
    }
}
