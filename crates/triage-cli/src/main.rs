mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "triage",
    about = "Validate and dry-run declarative issue and pull request policies",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log evaluation progress to stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a policy file and report its triggers and warnings
    Validate {
        /// Path to the policy YAML document
        policy: PathBuf,
    },

    /// Evaluate a policy against an event snapshot without touching any repository
    Run {
        /// Path to the policy YAML document
        policy: PathBuf,

        /// Event snapshot (JSON)
        #[arg(long)]
        event: PathBuf,

        /// Milestone/project fixtures for lookups (JSON)
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Validate { policy } => cmd::validate::run(&policy, cli.json),
        Commands::Run {
            policy,
            event,
            fixtures,
        } => cmd::run::run(&policy, &event, fixtures.as_deref(), cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
