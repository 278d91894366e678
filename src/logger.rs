use std::{fs, path::Path};

use anyhow::Context;
use strum_macros::{AsRefStr, Display, EnumString};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

pub const LOG_FILE_PREFIX: &str = "sensorhub";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Unknown level names fall back to `info`.
pub fn convert_level(level: &str) -> LogLevel {
    level.parse().unwrap_or_default()
}

/// Keeps the file writer flushing; drop it only at process exit.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber: stdout always, plus a daily rolling text
/// file under `log_dir` when given. `RUST_LOG` overrides `level`.
pub fn init_tracing(level: LogLevel, log_dir: Option<&Path>) -> anyhow::Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_ref()));

    let stdout_layer = fmt::layer().with_thread_names(true);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .build(dir)
                .with_context(|| format!("opening log file in {}", dir.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(LogGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(convert_level("debug"), LogLevel::Debug);
        assert_eq!(convert_level("WARN"), LogLevel::Warn);
        assert_eq!(convert_level("Trace"), LogLevel::Trace);
        assert_eq!(convert_level("critical"), LogLevel::Info);
        assert_eq!(LogLevel::Error.as_ref(), "error");
    }
}
