pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::remind::RemindCommand;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "paysage",
    about = "Paysage operator CLI",
    long_about = "Derive landscaping quotes from free text and drive unpaid-invoice reminder workflows.",
    after_help = "Examples:\n  paysage doctor --json\n  paysage derive \"Tonte de gazon sur 200m²\"\n  paysage remind start --invoice F-2026-0042 --auto-send\n  paysage remind run-due"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Validate config, rule table, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Turn a free-text work description into priced quote lines")]
    Derive {
        text: String,
        #[arg(long, help = "TOML rule table replacing the built-in one")]
        rules: Option<PathBuf>,
    },
    #[command(subcommand, about = "Manage unpaid-invoice reminder workflows")]
    Remind(RemindCommand),
}

pub fn run() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Derive { text, rules } => commands::derive::run(&text, rules),
        Command::Remind(command) => commands::remind::run(command),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Diagnostics go to stderr so stdout stays a single JSON payload.
fn init_logging() {
    let filter = EnvFilter::try_from_env("PAYSAGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
