pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tally",
    about = "Tally operator CLI",
    long_about = "Inspect tally configuration, run readiness checks, and read progress stats \
                  from the persisted database.",
    after_help = "Examples:\n  tally doctor --json\n  tally config\n  tally stats --user 123456789"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to the config file (JSON, or TOML by extension)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database readability and reminder routing")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the stats report for one user from the persisted database")]
    Stats {
        #[arg(long, help = "Chat user id")]
        user: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(config_path) }
        }
        Command::Doctor { json } => commands::doctor::run(config_path, json),
        Command::Stats { user } => commands::stats::run(config_path, &user),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
