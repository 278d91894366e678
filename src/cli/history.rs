use std::path::PathBuf;

use chrono::Utc;
use clap::Args;

use sensorhub::{
    logger::{LogLevel, init_tracing},
    sensor_log::load_history,
    summary::{format_summary, last_seen_label},
};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Directory holding the daily CSV sensor logs
    #[arg(long, default_value = "./sensor-logs")]
    pub log_dir: PathBuf,

    /// Number of daily files to replay, today included
    #[arg(long, default_value_t = 2)]
    pub days: u32,

    /// Nodes shown in the summary line
    #[arg(long, value_delimiter = ',', default_value = "1,2")]
    pub nodes: Vec<String>,
}

pub fn execute(args: HistoryArgs) -> anyhow::Result<()> {
    // Only problems with the log files are worth showing here.
    let _log_guard = init_tracing(LogLevel::Warn, None)?;

    let histories = load_history(&args.log_dir, args.days, Utc::now());
    println!(
        "{} nodes, {} reports in the last 24h ({})",
        histories.node_count(),
        histories.report_count(),
        args.log_dir.display()
    );
    for (node, history) in histories.iter() {
        let Some(last) = history.latest() else {
            println!("  node {node}: no reports");
            continue;
        };
        println!(
            "  node {node}: {} reports, min {:.0}F max {:.0}F, last {:.0}F {:.2}V at {}",
            history.len(),
            history.min_temp_f(),
            history.max_temp_f(),
            last.temp_f,
            last.battery_v,
            last_seen_label(last.timestamp),
        );
    }
    println!("{}", format_summary(&histories, &args.nodes));
    Ok(())
}
