use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tekqctl", version, about = "tekq PipelineRun defaulting CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Default a PipelineRun file and print the result as YAML
    Mutate {
        /// PipelineRun manifest (YAML or JSON)
        #[arg(long = "pipelinerun")]
        pipelinerun: PathBuf,
        /// Directory holding config.yaml
        #[arg(long = "config-dir", env = "TEKQ_CONFIG_DIR")]
        config_dir: PathBuf,
    },
    /// Parse, validate and compile a policy without applying it
    Check {
        /// Directory holding config.yaml
        #[arg(long = "config-dir", env = "TEKQ_CONFIG_DIR")]
        config_dir: PathBuf,
        /// Output format
        #[arg(short = 'o', long = "output", value_enum, default_value_t = Output::Human)]
        output: Output,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckSummary<'a> {
    queue_name: &'a str,
    is_multi_kueue: bool,
    multi_kueue_override: bool,
    expressions: &'a [String],
}

fn init_tracing() {
    let env = std::env::var("TEKQ_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Mutate { pipelinerun, config_dir } => {
            info!(pipelinerun = %pipelinerun.display(), config_dir = %config_dir.display(), "mutate invoked");
            let out = tekq_webhook::mutate_pipeline_run(&pipelinerun, &config_dir).inspect_err(|e| {
                error!(error = ?e, "mutate failed");
            })?;
            std::io::stdout().write_all(&out).context("writing mutated PipelineRun")?;
        }
        Commands::Check { config_dir, output } => {
            info!(config_dir = %config_dir.display(), "check invoked");
            let store = tekq_webhook::load_store(&config_dir).inspect_err(|e| {
                error!(error = ?e, "check failed");
            })?;
            let generation = store.snapshot().context("no policy loaded")?;
            let config = &generation.config;
            match output {
                Output::Human => {
                    println!("queue            {}", config.queue_name);
                    println!("multikueue       {}", config.is_multi_kueue);
                    println!("override         {}", config.multi_kueue_override);
                    println!("expressions      {}", config.expressions().len());
                    for (i, expr) in config.expressions().iter().enumerate() {
                        println!("  #{i:<3} {expr}");
                    }
                }
                Output::Json => {
                    let summary = CheckSummary {
                        queue_name: &config.queue_name,
                        is_multi_kueue: config.is_multi_kueue,
                        multi_kueue_override: config.multi_kueue_override,
                        expressions: config.expressions(),
                    };
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
            }
        }
    }
    Ok(())
}
