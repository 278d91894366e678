use clap::{Parser, Subcommand};

pub mod history;
pub mod parse;
pub mod run;

use history::HistoryArgs;
use parse::ParseArgs;
use run::RunArgs;

#[derive(Parser, Debug)]
#[command(
    name = "sensorhub",
    about = "Relays serial sensor reports to an IRC channel topic",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the hub (default)
    Run(RunArgs),

    /// Summarize the history replayed from the CSV sensor logs
    History(HistoryArgs),

    /// Decode one sensor report line
    Parse(ParseArgs),
}

pub async fn execute(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => run::execute(args).await,
        Commands::History(args) => history::execute(args),
        Commands::Parse(args) => parse::execute(args),
    }
}

pub fn default_command() -> Commands {
    Commands::Run(RunArgs::default_runtime())
}
