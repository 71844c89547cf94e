//! CLI for producing a single tip.
//!
//! # Usage
//!
//! ```bash
//! # One tip from a running llama.cpp-style server
//! cargo run -p tip-generator --bin tip-generate -- --server http://127.0.0.1:8080
//!
//! # Pick the shortest of 5 candidates
//! cargo run -p tip-generator --bin tip-generate -- --multi 5
//!
//! # Offline with the simulated backend, reproducible
//! cargo run -p tip-generator --bin tip-generate -- --simulate --seed 42 --json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tip_core::{GenerationMode, ModelLoader, Task, CANDIDATES_COUNT_DEFAULT};
use tip_generator::{ModelGenerator, RemoteLoader, SharedModel, TipConfig, TipPipeline};
use tip_sim::{SimulatedLoader, SimulatedModel};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tip-generate", about = "Generate one short trading tip")]
struct Cli {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inference server base URL
    #[arg(long)]
    server: Option<String>,

    /// Model identifier
    #[arg(long)]
    model: Option<String>,

    /// Multi-candidate mode, optionally with a candidate count
    #[arg(long, value_name = "N")]
    multi: Option<Option<u32>>,

    /// Seed for prompt synthesis
    #[arg(long)]
    seed: Option<u64>,

    /// Use the deterministic simulated backend
    #[arg(long)]
    simulate: bool,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let loader: Arc<dyn ModelLoader> = if cli.simulate {
        let task = config
            .task
            .unwrap_or_else(|| Task::from_model_id(&config.model_id));
        let model = Arc::new(SimulatedModel::new(task, config.seed.unwrap_or(1)));
        Arc::new(SimulatedLoader::new(model, config.model_id.clone()))
    } else {
        Arc::new(
            RemoteLoader::new(config.server_url.clone(), config.request_timeout())
                .with_task(config.task),
        )
    };

    let generator = ModelGenerator::new(Arc::new(SharedModel::new(
        config.model_id.clone(),
        loader,
    )));

    // Fail fast on a bad model instead of inside the first attempt
    match generator.warm_up().await {
        Ok(task) => info!(model = %config.model_id, task = task.name(), "model ready"),
        Err(e) => {
            error!(error = %e, "model load failed");
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let pipeline = match TipPipeline::from_config(&config, Arc::new(generator)) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match pipeline.produce_report(&config.sampling, config.mode).await {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Failed to serialize report: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                if cli.verbose {
                    eprintln!("{}", report.format_summary());
                }
                println!("{}", report.tip);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "tip generation failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// File, then environment, then command line.
fn build_config(cli: &Cli) -> Result<TipConfig, tip_generator::ConfigError> {
    let mut config = match cli.config {
        Some(ref path) => TipConfig::from_file(path)?,
        None => TipConfig::default(),
    };
    config.apply_env()?;

    if let Some(ref server) = cli.server {
        config.server_url = server.clone();
    }
    if let Some(ref model) = cli.model {
        config.model_id = model.clone();
    }
    if let Some(multi) = cli.multi {
        config.mode = GenerationMode::MultiCandidate {
            count: multi.unwrap_or(CANDIDATES_COUNT_DEFAULT),
        };
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    config.validate()?;
    Ok(config)
}
