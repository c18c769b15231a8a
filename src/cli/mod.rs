pub mod assert;
pub mod convert;
pub mod graph;

use std::path::Path;
use std::process;

use valgraph::batch::{convert_batch, BatchOutcome};
use valgraph::config::EngineConfig;
use valgraph::trace::load_executions;

pub fn load_config(path: Option<&Path>) -> EngineConfig {
    match EngineConfig::load_or_default(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

/// Read execution records from `input` and convert them all.
pub fn load_and_convert(input: &Path, config: &EngineConfig) -> BatchOutcome {
    let raws = match load_executions(input) {
        Ok(raws) => raws,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    let outcome = convert_batch(&raws, config);
    for dropped in &outcome.dropped {
        eprintln!("warning: {}", dropped);
        for cause in &dropped.causes {
            eprintln!("  {}", cause);
        }
    }
    outcome
}
