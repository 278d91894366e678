use std::time::Duration;

use anyhow::Result;
use channel_irc::{RelayClient, SessionState};
use chrono::Utc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    chart::ChartCache,
    config::HubConfig,
    device,
    pipeline::Pipeline,
    sensor_log::{SensorLogger, load_history},
    web,
};

pub const CHANNEL_CAPACITY: usize = 32;

/// Head start for the relay to register and join before the summary of
/// replayed history goes out.
pub const STARTUP_SUMMARY_DELAY: Duration = Duration::from_secs(8);

/// Per-task wait during shutdown before the task is aborted.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Hub {
    cancel: CancellationToken,
    relay_state: Option<watch::Receiver<SessionState>>,
    relay_task: Option<JoinHandle<()>>,
    device_task: Option<JoinHandle<()>>,
    pipeline_task: Option<JoinHandle<()>>,
    logger_task: Option<JoinHandle<()>>,
    web_task: Option<JoinHandle<()>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            relay_state: None,
            relay_task: None,
            device_task: None,
            pipeline_task: None,
            logger_task: None,
            web_task: None,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn relay_state(&self) -> Option<SessionState> {
        self.relay_state.as_ref().map(|rx| *rx.borrow())
    }

    /// Replay recent history, then start the relay, web server, sensor log,
    /// pipeline and device connector.
    pub async fn bootstrap(&mut self, config: HubConfig) -> Result<()> {
        let histories = load_history(&config.sensor_log_dir, config.history_days, Utc::now());
        info!(
            nodes = histories.node_count(),
            reports = histories.report_count(),
            "sensor log summary"
        );
        let announce = (!histories.is_empty()).then_some(STARTUP_SUMMARY_DELAY);

        let (line_tx, line_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (summary_tx, summary_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (log_tx, log_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let chart = ChartCache::new();

        let relay = RelayClient::new(config.irc_config(), summary_rx, self.cancel.clone());
        self.relay_state = Some(relay.subscribe_state());
        self.relay_task = Some(tokio::spawn(relay.run()));

        self.web_task = Some({
            let chart = chart.clone();
            let cancel = self.cancel.clone();
            let addr = config.web_addr;
            tokio::spawn(async move {
                if let Err(e) = web::serve(addr, chart, cancel).await {
                    error!(addr = %addr, "web server failed: {e:#}");
                }
            })
        });

        self.logger_task = Some(tokio::spawn(SensorLogger::new(config.sensor_log_dir.clone()).run(log_rx)));

        let pipeline = Pipeline::new(histories, config.summary_nodes.clone(), summary_tx, log_tx, chart);
        self.pipeline_task = Some(tokio::spawn(async move {
            pipeline.run(line_rx, announce).await;
        }));

        self.device_task = Some(tokio::spawn(device::run(
            config.device_patterns.clone(),
            line_tx,
            self.cancel.clone(),
        )));

        info!("sensor hub running");
        Ok(())
    }

    /// Cancel everything and wait for each task in pipeline order. The
    /// pipeline and sensor log drain once their upstream has stopped.
    pub async fn shutdown(&mut self) {
        info!("sensor hub shutting down");
        self.cancel.cancel();
        let tasks = [
            ("device", self.device_task.take()),
            ("pipeline", self.pipeline_task.take()),
            ("sensor log", self.logger_task.take()),
            ("relay", self.relay_task.take()),
            ("web", self.web_task.take()),
        ];
        for (name, task) in tasks {
            let Some(mut task) = task else { continue };
            match timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(())) => info!(task = name, "stopped"),
                Ok(Err(e)) => warn!(task = name, error = %e, "task ended abnormally"),
                Err(_) => {
                    warn!(task = name, "did not stop in time, aborting");
                    task.abort();
                }
            }
        }
    }
}
