//! sqlstage CLI - validate statement stage configurations
//!
//! Checks a YAML stage configuration against its input schema and the
//! service credentials, the same way a topology would before submitting
//! the stage, and prints the resulting descriptor.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlstage::config::StageConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sqlstage")]
#[command(about = "Validate SQL statement stages for streaming pipelines")]
#[command(version)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a stage configuration and print its descriptor as JSON
    Validate {
        /// Stage configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Credentials file; overrides the configuration's own setting
        #[arg(long, env = "SQLSTAGE_CREDENTIALS")]
        credentials: Option<PathBuf>,

        /// Print compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Print the JSON Schema of stage configuration files
    Schema,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Validate {
            config,
            credentials,
            compact,
        } => validate(&config, credentials.as_deref(), compact),
        Commands::Schema => {
            let schema = schemars::schema_for!(StageConfig);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

fn validate(
    config_path: &std::path::Path,
    credentials: Option<&std::path::Path>,
    compact: bool,
) -> anyhow::Result<()> {
    let config = StageConfig::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let creds = config
        .load_credentials(credentials)
        .context("Failed to load credentials")?;
    let descriptor = config
        .descriptor(creds)
        .context("Invalid statement stage")?;

    info!(
        driver_class = descriptor.driver.effective_class(),
        output_schema = %descriptor.output_schema,
        "Statement stage is valid"
    );

    let json = if compact {
        serde_json::to_string(&descriptor)?
    } else {
        serde_json::to_string_pretty(&descriptor)?
    };
    println!("{}", json);
    Ok(())
}
