mod cli;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cli::assert::{cmd_assert, AssertArgs};
use cli::convert::{cmd_convert, ConvertArgs};
use cli::graph::{cmd_graph, GraphArgs};

#[derive(Parser)]
#[command(
    name = "valgraph",
    version,
    about = "Value models and equivalence assertions from execution traces"
)]
struct Cli {
    /// Engine configuration (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert execution records into value models
    Convert(ConvertArgs),
    /// Generate equivalence assertions for converted executions
    Assert(AssertArgs),
    /// Print the model graph of one execution as Graphviz
    Graph(GraphArgs),
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli::load_config(cli.config.as_deref());

    match cli.command {
        Command::Convert(args) => cmd_convert(args, &config),
        Command::Assert(args) => cmd_assert(args, &config),
        Command::Graph(args) => cmd_graph(args, &config),
    }
}

/// `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "valgraph=debug" } else { "valgraph=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
