use std::path::PathBuf;
use std::process;

use clap::Args;
use valgraph::config::EngineConfig;
use valgraph::graph::{execution_graph, to_dot};

use super::load_and_convert;

#[derive(Args)]
pub struct GraphArgs {
    /// JSON file with execution records
    pub input: PathBuf,
    /// Which converted execution to draw
    #[arg(long, default_value_t = 0)]
    pub index: usize,
}

pub fn cmd_graph(args: GraphArgs, config: &EngineConfig) {
    let outcome = load_and_convert(&args.input, config);
    let Some(execution) = outcome.executions.get(args.index) else {
        eprintln!(
            "error: no execution at index {} ({} converted)",
            args.index,
            outcome.executions.len()
        );
        process::exit(1);
    };
    print!("{}", to_dot(&execution_graph(execution)));
}
