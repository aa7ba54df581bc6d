//! Evalstack CLI
//!
//! Replays stack scripts against an evaluation stack and prints the resulting
//! stack, reference accounting and operation journal.

mod runner;
mod script;

use clap::{Parser as ClapParser, Subcommand};
use evalstack_core::StackConfig;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "evalstack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluation stack replay tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a stack script and print the final state
    Run {
        /// Script file, one stack operation per line
        script: PathBuf,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,

        /// Disable the operation journal (overrides EVALSTACK_JOURNAL)
        #[arg(long)]
        no_journal: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            script,
            json,
            no_journal,
        } => run_script(&script, json, no_journal),
    }
}

fn run_script(path: &Path, json: bool, no_journal: bool) {
    let lines = match script::load_script(path) {
        Ok(lines) => lines,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let mut config = StackConfig::from_env();
    if no_journal {
        config = config.without_journal();
    }
    tracing::debug!(?config, lines = lines.len(), "running script");

    let report = runner::Runner::new(&config).run(&lines);

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: failed to serialize report: {}", e);
                process::exit(1);
            }
        }
    } else {
        print!("{}", report);
    }

    if report.fault.is_some() {
        process::exit(1);
    }
}
