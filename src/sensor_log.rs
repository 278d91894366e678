//! Daily CSV audit log of accepted reports, and the reader that seeds the
//! rolling windows from it at startup.
//!
//! One file per UTC day, `YYYY-MM-DD-UTC.csv`:
//!
//! ```text
//! Timestamp,Node,RSSI,SNR,BatteryV,TempF
//! 2025-11-17T05:30:00Z,1,-122,-14.0,3.80,63
//! ```

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{history::NodeHistories, report::SensorRecord};

pub const CSV_HEADER: &str = "Timestamp,Node,RSSI,SNR,BatteryV,TempF";

#[derive(Debug, Error)]
pub enum SensorLogError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}:{line}: {reason}", .path.display())]
    Row {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// One accepted report as it is written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorData {
    pub timestamp: DateTime<Utc>,
    pub node: String,
    pub rssi: String,
    pub snr: String,
    pub battery_v: f64,
    pub temp_f: f64,
}

impl SensorData {
    pub fn from_record(record: &SensorRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            node: record.node.clone(),
            rssi: record.rssi.clone(),
            snr: record.snr.clone(),
            battery_v: record.battery_v,
            temp_f: record.temp_f,
        }
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{:.2},{:.0}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.node,
            self.rssi,
            self.snr,
            self.battery_v,
            self.temp_f,
        )
    }
}

pub fn log_path_for(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}-UTC.csv", date.format("%Y-%m-%d")))
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> SensorLogError + '_ {
    move |source| SensorLogError::Io { path: path.to_path_buf(), source }
}

/// Appends rows to the file for the current UTC day, switching files when
/// the day changes.
pub struct SensorLogger {
    dir: PathBuf,
    current: Option<(PathBuf, File)>,
}

impl SensorLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), current: None }
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|(p, _)| p.as_path())
    }

    fn open(&self, path: &Path) -> Result<File, SensorLogError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err(path))?;
        // A restart on the same day appends to the existing file.
        let empty = file.metadata().map_err(io_err(path))?.len() == 0;
        if empty {
            writeln!(file, "{CSV_HEADER}").map_err(io_err(path))?;
        }
        info!(path = %path.display(), "logging sensor data");
        Ok(file)
    }

    /// Append one row to the file for `now`'s UTC day. On error the file is
    /// closed and reopened for the next record.
    pub fn write(&mut self, data: &SensorData, now: DateTime<Utc>) -> Result<(), SensorLogError> {
        let path = log_path_for(&self.dir, now.date_naive());
        let mut file = match self.current.take() {
            Some((open, file)) if open == path => file,
            _ => self.open(&path)?,
        };
        writeln!(file, "{}", data.to_csv_row()).map_err(io_err(&path))?;
        self.current = Some((path, file));
        Ok(())
    }

    /// Log every record from `rx` until the channel closes. A failed write
    /// drops that record only.
    pub async fn run(mut self, mut rx: mpsc::Receiver<SensorData>) {
        info!(dir = %self.dir.display(), "sensor logger started");
        while let Some(data) = rx.recv().await {
            if let Err(e) = self.write(&data, Utc::now()) {
                error!(error = %e, node = %data.node, "writing sensor log failed, record dropped");
            }
        }
        info!("sensor logger stopped");
    }
}

struct Row {
    timestamp: DateTime<Utc>,
    node: String,
    battery_v: f64,
    temp_f: f64,
}

fn parse_row(line: &str) -> Result<Row, String> {
    let fields: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
    if fields.len() < 6 {
        return Err(format!("expected 6 fields, got {}", fields.len()));
    }
    let timestamp = DateTime::parse_from_rfc3339(fields[0])
        .map_err(|e| format!("timestamp `{}`: {e}", fields[0]))?
        .with_timezone(&Utc);
    let node = fields[1].trim();
    if node.is_empty() {
        return Err("empty node".to_string());
    }
    let number = |i: usize, what: &str| {
        fields[i]
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("{what} `{}`", fields[i]))
    };
    Ok(Row {
        timestamp,
        node: node.to_string(),
        battery_v: number(4, "battery")?,
        temp_f: number(5, "temperature")?,
    })
}

/// Feed one log file into `histories`. Returns the number of rows accepted.
pub fn load_file(path: &Path, histories: &mut NodeHistories, now: DateTime<Utc>) -> Result<usize, SensorLogError> {
    let content = fs::read_to_string(path).map_err(io_err(path))?;
    let mut accepted = 0;
    // First line is the header.
    for (idx, line) in content.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        match parse_row(line) {
            Ok(row) => {
                histories.entry(&row.node).add_at(row.timestamp, row.battery_v, row.temp_f, now);
                accepted += 1;
            }
            Err(reason) => {
                let err = SensorLogError::Row { path: path.to_path_buf(), line: idx + 1, reason };
                warn!(error = %err, "skipping sensor log row");
            }
        }
    }
    Ok(accepted)
}

/// Rebuild rolling histories from the last `days` daily files, oldest first.
/// Missing or unreadable files are skipped.
pub fn load_history(dir: &Path, days: u32, now: DateTime<Utc>) -> NodeHistories {
    let mut histories = NodeHistories::new();
    for back in (0..days).rev() {
        let date = (now - TimeDelta::days(i64::from(back))).date_naive();
        let path = log_path_for(dir, date);
        if !path.exists() {
            debug!(path = %path.display(), "no sensor log for day");
            continue;
        }
        match load_file(&path, &mut histories, now) {
            Ok(rows) => info!(path = %path.display(), rows, "loaded sensor log"),
            Err(e) => warn!(error = %e, "skipping sensor log"),
        }
    }
    histories
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn data(node: &str, temp_f: f64, timestamp: DateTime<Utc>) -> SensorData {
        SensorData {
            timestamp,
            node: node.into(),
            rssi: "-122".into(),
            snr: "-14.0".into(),
            battery_v: 3.8,
            temp_f,
        }
    }

    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn row_format() {
        let row = data("1", 63.4, Utc.with_ymd_and_hms(2025, 11, 17, 5, 30, 0).unwrap()).to_csv_row();
        assert_eq!(row, "2025-11-17T05:30:00Z,1,-122,-14.0,3.80,63");
    }

    #[test]
    fn header_written_once_per_file() {
        let dir = TempDir::new().unwrap();
        let now = noon(17);
        let mut logger = SensorLogger::new(dir.path());
        logger.write(&data("1", 63.0, now), now).unwrap();
        logger.write(&data("2", 67.0, now), now).unwrap();

        // A restart the same day appends without a second header.
        let mut again = SensorLogger::new(dir.path());
        again.write(&data("1", 64.0, now), now).unwrap();

        let path = log_path_for(dir.path(), now.date_naive());
        assert!(path.ends_with("2025-11-17-UTC.csv"));
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.iter().filter(|l| **l == CSV_HEADER).count(), 1);
    }

    #[test]
    fn rotates_when_the_utc_day_changes() {
        let dir = TempDir::new().unwrap();
        let mut logger = SensorLogger::new(dir.path().join("nested"));
        logger.write(&data("1", 60.0, noon(16)), noon(16)).unwrap();
        logger.write(&data("1", 61.0, noon(17)), noon(17)).unwrap();
        assert_eq!(logger.current_path(), Some(log_path_for(&dir.path().join("nested"), noon(17).date_naive()).as_path()));

        for day in [16, 17] {
            let content = fs::read_to_string(log_path_for(&dir.path().join("nested"), noon(day).date_naive())).unwrap();
            assert_eq!(content.lines().count(), 2);
        }
    }

    #[test]
    fn reloads_recent_history_and_skips_bad_rows() {
        let dir = TempDir::new().unwrap();
        let now = noon(17);
        let yesterday = log_path_for(dir.path(), noon(16).date_naive());
        fs::write(
            &yesterday,
            format!(
                "{CSV_HEADER}\n\
                 2025-11-16T06:00:00Z,1,-1,0,3.70,40\n\
                 2025-11-16T18:00:00Z,1,-1,0,3.75,55\n\
                 not-a-time,1,-1,0,3.75,55\n\
                 2025-11-16T19:00:00Z,2,-1,0,,55\n\
                 2025-11-16T20:00:00Z,2,-1\n"
            ),
        )
        .unwrap();
        let today = log_path_for(dir.path(), now.date_naive());
        fs::write(&today, format!("{CSV_HEADER}\n2025-11-17T11:00:00Z,2,-1,0,3.89,67\n")).unwrap();

        let histories = load_history(dir.path(), 2, now);
        assert_eq!(histories.node_count(), 2);
        // 06:00 yesterday is outside the 24 h window.
        let one = histories.get("1").unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one.min_temp_f(), 55.0);
        let two = histories.get("2").unwrap();
        assert_eq!(two.latest().map(|r| r.battery_v), Some(3.89));
    }

    #[test]
    fn missing_files_yield_empty_history() {
        let dir = TempDir::new().unwrap();
        let histories = load_history(dir.path(), 2, noon(17));
        assert!(histories.is_empty());
    }

    #[tokio::test]
    async fn run_drains_channel_until_closed() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(SensorLogger::new(dir.path()).run(rx));
        let now = Utc::now();
        tx.send(data("1", 63.0, now)).await.unwrap();
        tx.send(data("2", 67.0, now)).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let path = log_path_for(dir.path(), Utc::now().date_naive());
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }
}
