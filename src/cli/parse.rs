use anyhow::bail;
use clap::Args;

use sensorhub::report::SensorRecord;

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Raw report, e.g. "LORA: -122, -14.0, 1, 38734ca6, 3.80, 63, DUP"
    pub line: String,
}

pub fn execute(args: ParseArgs) -> anyhow::Result<()> {
    match SensorRecord::parse(&args.line) {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            if record.duplicate {
                println!("duplicate: would be counted and skipped");
            } else {
                println!("accepted: would update node {} history", record.node);
            }
            Ok(())
        }
        Err(e) => bail!("{e}"),
    }
}
