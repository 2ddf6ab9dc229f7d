use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::validate::VaultMode;

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Gatekeeper for agent-issued SQL")]
struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a connection catalog and print what each connection enforces.
    Check {
        /// Catalog file (JSON, or YAML with a .yaml/.yml extension)
        #[arg(long, short, env = "WARDEN_CONFIG")]
        config: PathBuf,
    },

    /// Validate one SQL statement and print the verdict as JSON.
    /// Exits with a non-zero status when the statement is rejected.
    Validate {
        /// Catalog file (JSON, or YAML with a .yaml/.yml extension)
        #[arg(long, short, env = "WARDEN_CONFIG")]
        config: PathBuf,

        /// Connection name from the catalog
        #[arg(long)]
        connection: String,

        /// Whether sensitive data may be requested
        #[arg(long, value_enum, default_value_t = VaultMode::Closed)]
        vault: VaultMode,

        /// The statement to validate
        sql: String,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Command::Check { config } => {
            commands::check::run(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate {
            config,
            connection,
            vault,
            sql,
        } => commands::validate::run(&config, &connection, vault, &sql),
    }
}

/// Logs go to stderr so stdout only carries command output.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
