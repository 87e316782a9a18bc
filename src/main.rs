use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bdlob_inference::config::{deployment_dir, effective_model_path};
use bdlob_inference::{serve, Normalizer, OnnxOracle, Oracle, Predictor, ServerConfig, StaticOracle};

/// BDLOB prediction server: line-delimited JSON over stdin/stdout
#[derive(Parser)]
#[command(name = "bdlob-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Path to the ONNX model (relative to the working directory)
    #[arg(long, short, env = "BDLOB_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Timesteps per request the model expects
    #[arg(long)]
    sequence_length: Option<usize>,

    /// Answer with fixed scores instead of loading a model
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    mock_scores: Option<Vec<f32>>,
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only protocol lines
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bdlob_inference=info,bdlob_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_yaml(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(sequence_length) = cli.sequence_length {
        config.sequence_length = Some(sequence_length);
    }
    config.model.path =
        effective_model_path(&config.model.path, cli.model.as_deref(), &deployment_dir());

    let mut oracle = load_oracle(&config, cli.mock_scores);
    let normalizer = Normalizer::new(config.sequence_length);
    let mut predictor = Predictor::new(oracle.as_deref_mut(), normalizer);

    tracing::info!(
        model_loaded = predictor.is_loaded(),
        sequence_length = ?config.sequence_length,
        "BDLOB prediction server started"
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(&mut predictor, stdin.lock(), stdout.lock())?;
    Ok(())
}

/// Load the oracle once for the process lifetime. A failed load leaves the
/// server running without a model.
fn load_oracle(config: &ServerConfig, mock_scores: Option<Vec<f32>>) -> Option<Box<dyn Oracle>> {
    if let Some(scores) = mock_scores {
        tracing::warn!(?scores, "using static mock scores, no model loaded");
        return Some(Box::new(StaticOracle::new(scores)));
    }

    match OnnxOracle::load(&config.model) {
        Ok(oracle) => {
            tracing::info!(path = %config.model.path.display(), "model loaded successfully");
            Some(Box::new(oracle))
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to load model, serving without it");
            None
        }
    }
}
