//! backend-shield management CLI.
//!
//! Offline tooling that needs no running daemon: print the default
//! configuration, validate a configuration file, and show the normalized
//! form of a query as the plan cache keys it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use backend_shield::cache::normalize_query;
use backend_shield::config::{load_config, ConfigError, ShieldConfig};

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Configuration and cache tooling for backend-shield", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default configuration as TOML
    DefaultConfig,
    /// Load and validate a configuration file
    CheckConfig {
        path: PathBuf,
        /// Print the effective configuration as JSON when valid
        #[arg(long)]
        json: bool,
    },
    /// Show the normalized form used as a plan cache key
    Normalize { query: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::DefaultConfig => match toml::to_string_pretty(&ShieldConfig::default()) {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        },
        Commands::CheckConfig { path, json } => match load_config(&path) {
            Ok(config) => {
                println!("{}: ok", path.display());
                if json {
                    match serde_json::to_string_pretty(&config) {
                        Ok(text) => println!("{text}"),
                        Err(e) => eprintln!("Error: {e}"),
                    }
                }
                ExitCode::SUCCESS
            }
            Err(ConfigError::Validation(errors)) => {
                eprintln!("{}: {} problem(s)", path.display(), errors.len());
                for error in errors {
                    eprintln!("  - {error}");
                }
                ExitCode::FAILURE
            }
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                ExitCode::FAILURE
            }
        },
        Commands::Normalize { query } => {
            println!("{}", normalize_query(&query));
            ExitCode::SUCCESS
        }
    }
}
