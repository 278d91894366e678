use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, TimeDelta, Utc};

/// How long a report stays in a node's rolling window.
pub const RETENTION_HOURS: i64 = 24;

pub fn retention() -> TimeDelta {
    TimeDelta::hours(RETENTION_HOURS)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    pub temp_f: f64,
    pub battery_v: f64,
}

/// Reports for one node, oldest first, with min/max over what is retained.
///
/// An empty history reports `0.0` for both extremes; callers check
/// [`NodeHistory::is_empty`] before treating them as readings.
#[derive(Debug, Clone, Default)]
pub struct NodeHistory {
    reports: VecDeque<Report>,
    min_temp_f: f64,
    max_temp_f: f64,
}

impl NodeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, timestamp: DateTime<Utc>, battery_v: f64, temp_f: f64) {
        self.add_at(timestamp, battery_v, temp_f, Utc::now());
    }

    /// Append a report, then prune against `now - retention()`.
    pub fn add_at(&mut self, timestamp: DateTime<Utc>, battery_v: f64, temp_f: f64, now: DateTime<Utc>) {
        self.reports.push_back(Report { timestamp, temp_f, battery_v });
        self.prune(now);
    }

    /// Drop everything older than the window and recompute the extremes.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - retention();
        self.reports.retain(|r| r.timestamp >= cutoff);

        let mut temps = self.reports.iter().map(|r| r.temp_f);
        let Some(first) = temps.next() else {
            self.min_temp_f = 0.0;
            self.max_temp_f = 0.0;
            return;
        };
        let (min, max) = temps.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
        self.min_temp_f = min;
        self.max_temp_f = max;
    }

    pub fn latest(&self) -> Option<&Report> {
        self.reports.back()
    }

    pub fn reports(&self) -> impl Iterator<Item = &Report> {
        self.reports.iter()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn min_temp_f(&self) -> f64 {
        self.min_temp_f
    }

    pub fn max_temp_f(&self) -> f64 {
        self.max_temp_f
    }
}

/// Rolling histories keyed by node id, iterated in key order.
#[derive(Debug, Clone, Default)]
pub struct NodeHistories {
    nodes: BTreeMap<String, NodeHistory>,
}

impl NodeHistories {
    pub fn new() -> Self {
        Self::default()
    }

    /// History for `node`, created empty on first sight.
    pub fn entry(&mut self, node: &str) -> &mut NodeHistory {
        self.nodes.entry(node.to_string()).or_default()
    }

    pub fn get(&self, node: &str) -> Option<&NodeHistory> {
        self.nodes.get(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeHistory)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn report_count(&self) -> usize {
        self.nodes.values().map(NodeHistory::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
