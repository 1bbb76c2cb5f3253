//! Erpeto CLI entry point.
//!
//! Commands:
//! - `analyse`: reassemble a recorded session and discover its dependencies
//! - `classify`: show how values are classified by the randomness test
//! - `config`: manage the configuration file

use clap::{Parser, Subcommand};
use erpeto_config::{AppConfig, LoggingConfig};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "erpeto",
    about = "Erpeto: recover the dynamic dependencies of a recorded browser session",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reassemble a recording and attach discovered dependencies
    Analyse {
        /// Recording file (JSON with `key`, `events` and `bodies`)
        recording: PathBuf,

        /// Write the analysed session here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fail on the first protocol violation
        #[arg(long)]
        strict: bool,
    },

    /// Classify values as random tokens or structured text
    Classify {
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration file
    Init,

    /// Print the effective configuration
    Show,

    /// Check the configuration file
    Validate,

    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = AppConfig::load();
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging, cli.verbose);

    match cli.command {
        Commands::Analyse {
            recording,
            output,
            strict,
        } => {
            let mut config = loaded?;
            config.reassembly.strict |= strict;
            commands::analyse::run(&config, &recording, output.as_deref()).await?
        }
        Commands::Classify { values } => commands::classify::run(&values),
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config_cmd::init()?,
            ConfigAction::Show => commands::config_cmd::show(loaded?)?,
            ConfigAction::Validate => commands::config_cmd::validate(loaded)?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // Logs go to stderr so stdout stays clean for the analysed session
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
