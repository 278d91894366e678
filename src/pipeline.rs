//! Orchestrator between the serial side and everything downstream.
//!
//! The pipeline task is the only owner of the node histories. Each accepted
//! report updates the owning history, re-renders the chart, offers a fresh
//! summary to the relay and hands the record to the sensor log.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::{
    chart::{ChartCache, render_svg},
    history::NodeHistories,
    report::{ParseError, SensorRecord},
    sensor_log::SensorData,
    summary::format_summary,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
}

/// What happened to one raw line.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Accepted { node: String, summary: String },
    Duplicate { node: String },
    Rejected(ParseError),
}

pub struct Pipeline {
    histories: NodeHistories,
    slots: Vec<String>,
    summaries: mpsc::Sender<String>,
    sensor_log: mpsc::Sender<SensorData>,
    chart: ChartCache,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        histories: NodeHistories,
        slots: Vec<String>,
        summaries: mpsc::Sender<String>,
        sensor_log: mpsc::Sender<SensorData>,
        chart: ChartCache,
    ) -> Self {
        Self {
            histories,
            slots,
            summaries,
            sensor_log,
            chart,
            stats: PipelineStats::default(),
        }
    }

    pub fn histories(&self) -> &NodeHistories {
        &self.histories
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn summary(&self) -> String {
        format_summary(&self.histories, &self.slots)
    }

    pub async fn refresh_chart(&self, now: DateTime<Utc>) {
        self.chart.update(render_svg(&self.histories, now)).await;
    }

    /// Offer a summary to the relay without waiting. A full queue drops it;
    /// the next accepted report produces a newer one.
    fn submit_summary(&self, summary: String) {
        match self.summaries.try_send(summary) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("relay queue full, summary dropped"),
            Err(TrySendError::Closed(_)) => debug!("relay gone, summary dropped"),
        }
    }

    pub async fn handle_line(&mut self, line: &str) -> Outcome {
        self.handle_line_at(line, Utc::now()).await
    }

    pub async fn handle_line_at(&mut self, line: &str, now: DateTime<Utc>) -> Outcome {
        debug!(line, "SENSOR");
        let record = match SensorRecord::parse(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "SENSOR: rejected line");
                self.stats.rejected += 1;
                return Outcome::Rejected(e);
            }
        };
        if record.duplicate {
            info!(node = %record.node, seq = %record.seq, "SENSOR: duplicate");
            self.stats.duplicates += 1;
            return Outcome::Duplicate { node: record.node };
        }

        self.histories
            .entry(&record.node)
            .add_at(now, record.battery_v, record.temp_f, now);
        self.stats.accepted += 1;
        self.refresh_chart(now).await;

        let summary = self.summary();
        self.submit_summary(summary.clone());

        if self.sensor_log.send(SensorData::from_record(&record, now)).await.is_err() {
            warn!(node = %record.node, "sensor log closed, record not logged");
        }
        Outcome::Accepted { node: record.node, summary }
    }

    /// Consume raw lines until the sender side closes.
    ///
    /// With `announce_after`, the current summary is sent once after that
    /// delay, unless a live report has already produced a fresher one.
    pub async fn run(mut self, mut lines: mpsc::Receiver<String>, announce_after: Option<Duration>) -> PipelineStats {
        self.refresh_chart(Utc::now()).await;
        let announce = sleep(announce_after.unwrap_or_default());
        tokio::pin!(announce);
        let mut pending = announce_after.is_some();

        loop {
            tokio::select! {
                _ = &mut announce, if pending => {
                    pending = false;
                    let summary = self.summary();
                    info!(summary = %summary, "sending startup summary");
                    self.submit_summary(summary);
                }
                line = lines.recv() => match line {
                    Some(line) => {
                        if let Outcome::Accepted { .. } = self.handle_line(&line).await {
                            pending = false;
                        }
                    }
                    None => break,
                },
            }
        }
        info!(
            accepted = self.stats.accepted,
            duplicates = self.stats.duplicates,
            rejected = self.stats.rejected,
            "pipeline stopped"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        pipeline: Pipeline,
        summaries: mpsc::Receiver<String>,
        logged: mpsc::Receiver<SensorData>,
        chart: ChartCache,
    }

    fn harness(capacity: usize) -> Harness {
        let (summary_tx, summaries) = mpsc::channel(capacity);
        let (log_tx, logged) = mpsc::channel(32);
        let chart = ChartCache::new();
        let pipeline = Pipeline::new(
            NodeHistories::new(),
            vec!["1".into(), "2".into()],
            summary_tx,
            log_tx,
            chart.clone(),
        );
        Harness { pipeline, summaries, logged, chart }
    }

    #[tokio::test]
    async fn accepted_report_fans_out() {
        let mut h = harness(4);
        let outcome = h
            .pipeline
            .handle_line("ESPNOW: -63, 0.0, 2, 38734b3c, 3.80, 64, OK")
            .await;
        let Outcome::Accepted { node, summary } = outcome else {
            panic!("expected acceptance, got {outcome:?}");
        };
        assert_eq!(node, "2");
        assert!(summary.starts_with("!pre /--/--/64 380 64 64/  2  "), "{summary}");

        assert_eq!(h.summaries.try_recv().unwrap(), summary);
        let logged = h.logged.try_recv().unwrap();
        assert_eq!((logged.node.as_str(), logged.rssi.as_str(), logged.temp_f), ("2", "-63", 64.0));
        assert!(String::from_utf8_lossy(&h.chart.get().await).contains("#ff7f0e"));

        let history = h.pipeline.histories().get("2").unwrap();
        assert_eq!(history.latest().map(|r| r.temp_f), Some(64.0));
    }

    #[tokio::test]
    async fn duplicates_have_no_side_effects() {
        let mut h = harness(4);
        h.pipeline
            .handle_line("LORA: -122, -14.0, 1, 38734ca6, 3.80, 63, OK")
            .await;
        let before = h.pipeline.histories().get("1").unwrap().len();
        let _ = h.summaries.try_recv();
        let _ = h.logged.try_recv();

        let outcome = h
            .pipeline
            .handle_line("LORA: -122, -14.0, 1, 38734ca6, 3.80, 63, DUP")
            .await;
        assert_eq!(outcome, Outcome::Duplicate { node: "1".into() });
        assert_eq!(h.pipeline.histories().get("1").unwrap().len(), before);
        assert!(h.summaries.try_recv().is_err());
        assert!(h.logged.try_recv().is_err());
        assert_eq!(h.pipeline.stats().duplicates, 1);
    }

    #[tokio::test]
    async fn malformed_lines_are_counted_and_dropped() {
        let mut h = harness(4);
        for line in ["LORA: -1, 0, 1", "LORA: -1, 0, 1, 2, x, 60, OK", "garbage"] {
            assert!(matches!(h.pipeline.handle_line(line).await, Outcome::Rejected(_)));
        }
        assert!(h.pipeline.histories().is_empty());
        assert_eq!(h.pipeline.stats(), PipelineStats { accepted: 0, duplicates: 0, rejected: 3 });
        assert!(h.summaries.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_relay_queue_never_blocks() {
        let mut h = harness(1);
        for temp in [60, 61, 62] {
            let line = format!("LORA: -1, 0, 1, 2, 3.8, {temp}, OK");
            let outcome = tokio::time::timeout(Duration::from_secs(1), h.pipeline.handle_line(&line))
                .await
                .expect("pipeline blocked on relay queue");
            assert!(matches!(outcome, Outcome::Accepted { .. }));
        }
        assert!(h.summaries.try_recv().unwrap().starts_with("!pre /60 "));
        assert!(h.summaries.try_recv().is_err());
        assert_eq!(h.pipeline.stats().accepted, 3);
    }

    #[tokio::test]
    async fn run_announces_loaded_history_then_stops_when_lines_close() {
        let now = Utc::now();
        let mut histories = NodeHistories::new();
        histories.entry("1").add_at(now, 3.8, 63.0, now);
        let (summary_tx, mut summaries) = mpsc::channel(4);
        let (log_tx, _logged) = mpsc::channel(4);
        let pipeline = Pipeline::new(histories, vec!["1".into(), "2".into()], summary_tx, log_tx, ChartCache::new());

        let (line_tx, lines) = mpsc::channel(4);
        let task = tokio::spawn(pipeline.run(lines, Some(Duration::from_millis(10))));
        let announced = tokio::time::timeout(Duration::from_secs(2), summaries.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(announced.starts_with("!pre /63 380 63 63/  1  "), "{announced}");
        assert!(announced.ends_with("/--/--"));

        line_tx.send("LORA: -1, 0, 2, 9, 3.9, 70, OK".into()).await.unwrap();
        drop(line_tx);
        let stats = task.await.unwrap();
        assert_eq!(stats.accepted, 1);
    }
}
