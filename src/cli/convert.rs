use std::path::PathBuf;
use std::process;

use clap::Args;
use valgraph::config::EngineConfig;

use super::load_and_convert;

#[derive(Args)]
pub struct ConvertArgs {
    /// JSON file with execution records
    pub input: PathBuf,
    /// Print the converted executions as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_convert(args: ConvertArgs, config: &EngineConfig) {
    let outcome = load_and_convert(&args.input, config);

    if args.json {
        match serde_json::to_string_pretty(&outcome.executions) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: cannot serialize executions: {}", e);
                process::exit(1);
            }
        }
    } else {
        for (i, execution) in outcome.executions.iter().enumerate() {
            println!("[{}] {}", i, execution.summary());
        }
    }

    eprintln!(
        "Converted {} execution(s), dropped {}",
        outcome.executions.len(),
        outcome.dropped.len()
    );
    if outcome.executions.is_empty() && !outcome.dropped.is_empty() {
        process::exit(1);
    }
}
