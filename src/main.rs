//! stackplan CLI: declarative infrastructure stack orchestration.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "stackplan",
    version,
    about = "Plan and run infrastructure stacks: conditional units, dependency order, handle wiring"
)]
struct Cli {
    /// Log verbosely (same as STACKPLAN_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: stackplan::cli::Commands,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("stackplan=debug")
    } else {
        EnvFilter::try_from_env("STACKPLAN_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let stackplan::cli::Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "stackplan", &mut std::io::stdout());
        return;
    }

    if let Err(e) = stackplan::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
