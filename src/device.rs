//! Serial gateway discovery and line reading.
//!
//! The board enumerates as a USB CDC device whose path changes when it is
//! unplugged and plugged back in, so every reconnect starts from discovery.
//! On macOS the `cu.*` node is the one to open; `tty.*` blocks waiting for
//! carrier detect.

use std::{
    fs,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
    time::Duration,
};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use thiserror::Error;
use tokio::{sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::report::looks_like_report;

pub const DEFAULT_PATTERNS: &[&str] = &["/dev/ttyACM*", "/dev/cu.usbmodem*"];
pub const BAUD_RATE: u32 = 115_200;
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on how long a read blocks before cancellation is rechecked.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Lines longer than this are discarded up to the next newline.
pub const MAX_LINE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no serial device matches {patterns:?}")]
    NotFound { patterns: Vec<String> },

    #[error("{} serial devices match, expected one: {candidates:?}", .candidates.len())]
    Ambiguous { candidates: Vec<PathBuf> },

    #[error("open {port} failed: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("read from {port} failed: {source}")]
    Read {
        port: String,
        #[source]
        source: io::Error,
    },
}

/// How a monitoring pass over one open device ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEnd {
    Eof,
    Cancelled,
    ConsumerGone,
}

/// Shell-style match supporting `*` only.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let head = parts.next().unwrap_or_default();
    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return pattern == name;
    };
    let Some(mut rest) = name.strip_prefix(head) else {
        return false;
    };
    for part in middle {
        match rest.find(part) {
            Some(i) => rest = &rest[i + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// Paths matching one pattern. Wildcards are honored in the final component only.
pub fn expand_pattern(pattern: &str) -> Vec<PathBuf> {
    let path = Path::new(pattern);
    let Some(file) = path.file_name().and_then(|f| f.to_str()) else {
        return Vec::new();
    };
    if !file.contains('*') {
        return if path.exists() { vec![path.to_path_buf()] } else { Vec::new() };
    }
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_str().is_some_and(|n| wildcard_match(file, n)))
        .map(|e| dir.join(e.file_name()))
        .collect()
}

/// The one device matching `patterns`. Zero or several matches mean the
/// device is not ready yet.
pub fn find_port<S: AsRef<str>>(patterns: &[S]) -> Result<PathBuf, DeviceError> {
    let mut candidates: Vec<PathBuf> = patterns
        .iter()
        .flat_map(|p| expand_pattern(p.as_ref()))
        .collect();
    candidates.sort();
    candidates.dedup();
    match candidates.len() {
        0 => Err(DeviceError::NotFound {
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(DeviceError::Ambiguous { candidates }),
    }
}

/// Open at 115200 8N1 without flow control.
pub fn open_port(port: &Path) -> Result<Box<dyn SerialPort>, DeviceError> {
    let name = port.to_string_lossy().to_string();
    serialport::new(&name, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|source| DeviceError::Open { port: name, source })
}

/// Forward report-looking lines from `reader` until EOF, a read error,
/// cancellation, or the consumer dropping its receiver. Sending blocks while
/// the channel is full.
pub fn monitor<R: BufRead>(
    mut reader: R,
    port: &str,
    out: &mpsc::Sender<String>,
    cancel: &CancellationToken,
) -> Result<MonitorEnd, DeviceError> {
    let mut buf = Vec::with_capacity(256);
    let mut overlong = false;
    loop {
        if cancel.is_cancelled() {
            return Ok(MonitorEnd::Cancelled);
        }
        // A timed-out read leaves the partial line in `buf`; keep appending.
        let limit = (MAX_LINE - buf.len()) as u64;
        match reader.by_ref().take(limit).read_until(b'\n', &mut buf) {
            Ok(0) => {
                info!(port, "serial port EOF");
                return Ok(MonitorEnd::Eof);
            }
            Ok(_) if buf.len() >= MAX_LINE && buf.last() != Some(&b'\n') => {
                if !overlong {
                    warn!(port, limit = MAX_LINE, "discarding overlong serial line");
                    overlong = true;
                }
                buf.clear();
                continue;
            }
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => continue,
            Err(source) => {
                return Err(DeviceError::Read { port: port.to_string(), source });
            }
        }
        if overlong {
            overlong = false;
            buf.clear();
            continue;
        }
        let line = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string();
        buf.clear();
        if !looks_like_report(&line) {
            debug!(port, line = %line, "ignoring serial noise");
            continue;
        }
        if out.blocking_send(line).is_err() {
            return Ok(MonitorEnd::ConsumerGone);
        }
    }
}

async fn pause(cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = sleep(RETRY_DELAY) => {}
    }
}

/// Discover, open and read the gateway forever, restarting from discovery
/// after every disconnect. Returns only on cancellation or when the line
/// consumer is gone.
pub async fn run(patterns: Vec<String>, out: mpsc::Sender<String>, cancel: CancellationToken) {
    info!(patterns = ?patterns, "starting serial device connector");
    let mut waiting = false;
    while !cancel.is_cancelled() {
        let port = match find_port(&patterns) {
            Ok(port) => port,
            Err(e) => {
                if !waiting {
                    info!(reason = %e, "waiting for serial device");
                    waiting = true;
                }
                pause(&cancel).await;
                continue;
            }
        };
        waiting = false;
        let name = port.display().to_string();
        info!(port = %name, "monitoring serial port");

        let pass = {
            let out = out.clone();
            let cancel = cancel.clone();
            let name = name.clone();
            tokio::task::spawn_blocking(move || {
                let device = open_port(&port)?;
                monitor(BufReader::new(device), &name, &out, &cancel)
            })
        };
        match pass.await {
            Ok(Ok(MonitorEnd::Eof)) => {}
            Ok(Ok(MonitorEnd::Cancelled)) => break,
            Ok(Ok(MonitorEnd::ConsumerGone)) => {
                info!("serial line consumer closed");
                break;
            }
            Ok(Err(e)) => warn!(port = %name, error = %e, "serial device disconnected"),
            Err(e) => warn!(port = %name, error = %e, "serial monitor task failed"),
        }
        pause(&cancel).await;
    }
    info!("serial device connector stopped");
}
