//! KPI Aggregator
//!
//! Pure summary over a set of (override-applied) incident records for a reference date.
//!
//! - **Tallies** by status and severity cover every incident, regardless of the window
//! - **Stale**: active status and more than `stale_days_threshold` days since the last
//!   history event
//! - **Master**: affected-client count present and at least `master_threshold_clients`
//! - **Resolution time**: for incidents whose closing event falls in
//!   `[today - period_days, today]`, days from first sighting to closing
//!
//! Degenerate configuration never fails: `period_days <= 0` is a same-day window, a window
//! longer than the calendar covers every date, and a negative threshold disables its metric.

use chrono::{Duration, NaiveDate};
use incidex_common::config::KpiConfig;
use incidex_common::models::{IncidentRecord, Severity, Status};
use incidex_common::time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Resolution-time distribution in days
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub count: usize,
    pub mean_days: Option<f64>,
    pub min_days: Option<f64>,
    pub max_days: Option<f64>,
    pub median_days: Option<f64>,
    pub p90_days: Option<f64>,
}

impl ResolutionStats {
    fn from_samples(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(|a, b| a.total_cmp(b));

        let count = samples.len();
        let mean = samples.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 1 {
            samples[count / 2]
        } else {
            (samples[count / 2 - 1] + samples[count / 2]) / 2.0
        };
        // Nearest-rank percentile
        let p90_rank = ((0.9 * count as f64).ceil() as usize).clamp(1, count);

        Self {
            count,
            mean_days: Some(mean),
            min_days: samples.first().copied(),
            max_days: samples.last().copied(),
            median_days: Some(median),
            p90_days: Some(samples[p90_rank - 1]),
        }
    }
}

/// KPI report for one reference date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiResult {
    pub reference_date: NaiveDate,
    pub period_days: i64,
    /// First day of the period window (inclusive)
    pub window_start: NaiveDate,
    pub total_incidents: usize,
    pub by_status: BTreeMap<Status, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub stale_count: usize,
    pub stale_ids: Vec<String>,
    pub master_count: usize,
    pub master_ids: Vec<String>,
    /// Incidents whose closing event falls in the window
    pub closed_in_period: usize,
    /// Incidents first seen in the window
    pub opened_in_period: usize,
    pub resolution: ResolutionStats,
}

impl KpiResult {
    /// Plain-text rendering for terminals
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "KPI report for {} (window {} .. {}, {} days)",
            self.reference_date, self.window_start, self.reference_date, self.period_days
        );
        let _ = writeln!(out, "Incidents: {}", self.total_incidents);
        for (status, count) in &self.by_status {
            let _ = writeln!(out, "  status {:<12} {}", status.as_str(), count);
        }
        for (severity, count) in &self.by_severity {
            let _ = writeln!(out, "  severity {:<10} {}", severity.as_str(), count);
        }
        let _ = writeln!(out, "Stale: {}", self.stale_count);
        let _ = writeln!(out, "Master: {}", self.master_count);
        let _ = writeln!(
            out,
            "Opened in period: {}, closed in period: {}",
            self.opened_in_period, self.closed_in_period
        );
        match (self.resolution.mean_days, self.resolution.median_days) {
            (Some(mean), Some(median)) => {
                let _ = writeln!(
                    out,
                    "Resolution days: mean {:.1}, median {:.1}, min {:.1}, max {:.1}, p90 {:.1}",
                    mean,
                    median,
                    self.resolution.min_days.unwrap_or_default(),
                    self.resolution.max_days.unwrap_or_default(),
                    self.resolution.p90_days.unwrap_or_default()
                );
            }
            _ => {
                let _ = writeln!(out, "Resolution days: no incidents closed in period");
            }
        }
        out
    }
}

/// Aggregate KPIs over `incidents`
pub fn aggregate<'a, I>(
    incidents: I,
    today: NaiveDate,
    period_days: i64,
    master_threshold_clients: i64,
    stale_days_threshold: i64,
) -> KpiResult
where
    I: IntoIterator<Item = &'a IncidentRecord>,
{
    // Windows reaching past the calendar's start are unbounded
    let window_start = Duration::try_days(period_days.max(0))
        .and_then(|span| today.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN);
    let in_window = |date: NaiveDate| date >= window_start && date <= today;

    let mut by_status: BTreeMap<Status, usize> = Status::ALL.iter().map(|s| (*s, 0)).collect();
    let mut by_severity: BTreeMap<Severity, usize> =
        Severity::ALL.iter().map(|s| (*s, 0)).collect();
    let mut total_incidents = 0;
    let mut stale_ids = Vec::new();
    let mut master_ids = Vec::new();
    let mut opened_in_period = 0;
    let mut resolution_samples = Vec::new();

    for record in incidents {
        total_incidents += 1;
        *by_status.entry(record.status).or_insert(0) += 1;
        *by_severity.entry(record.severity).or_insert(0) += 1;

        if stale_days_threshold >= 0
            && record.status.is_active()
            && time::days_since(record.last_updated_at(), today) > stale_days_threshold
        {
            stale_ids.push(record.global_id.clone());
        }

        if master_threshold_clients >= 0
            && record
                .clients_affected
                .is_some_and(|clients| i64::from(clients) >= master_threshold_clients)
        {
            master_ids.push(record.global_id.clone());
        }

        if in_window(record.first_seen_at.date_naive()) {
            opened_in_period += 1;
        }

        if let Some(closed_at) = record.closed_at() {
            if in_window(closed_at.date_naive()) {
                let days = time::duration_in_days(closed_at - record.first_seen_at);
                resolution_samples.push(days.max(0.0));
            }
        }
    }

    KpiResult {
        reference_date: today,
        period_days,
        window_start,
        total_incidents,
        by_status,
        by_severity,
        stale_count: stale_ids.len(),
        stale_ids,
        master_count: master_ids.len(),
        master_ids,
        closed_in_period: resolution_samples.len(),
        opened_in_period,
        resolution: ResolutionStats::from_samples(resolution_samples),
    }
}

/// Aggregator bound to configured thresholds
#[derive(Debug, Clone, Copy)]
pub struct KpiAggregator {
    config: KpiConfig,
}

impl KpiAggregator {
    pub fn new(config: KpiConfig) -> Self {
        Self { config }
    }

    pub fn aggregate<'a, I>(&self, incidents: I, today: NaiveDate) -> KpiResult
    where
        I: IntoIterator<Item = &'a IncidentRecord>,
    {
        aggregate(
            incidents,
            today,
            self.config.period_days,
            self.config.master_threshold_clients,
            self.config.stale_days_threshold,
        )
    }
}
