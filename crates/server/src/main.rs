use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use churnkit_model::{load_artifacts, Scorer};
use churnkit_server::{start_server, AppState};
use churnkit_tables::read_csv;

/// Serve churn risk predictions over HTTP.
#[derive(Parser, Debug)]
#[command(name = "churnkit-server", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Directory holding the persisted model artifacts.
    #[arg(long, default_value = "artifacts")]
    artifacts: PathBuf,

    /// Feature table CSV produced by training.
    #[arg(long, default_value = "artifacts/features.csv")]
    features: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let (model, transform) = load_artifacts(&args.artifacts)
        .with_context(|| format!("failed to load artifacts from {:?}", args.artifacts))?;
    let features = read_csv(&args.features)
        .with_context(|| format!("failed to read feature table {:?}", args.features))?;

    let scorer = Scorer::new(features, transform, model);
    info!(
        listen = %args.listen,
        feature_rows = scorer.feature_rows(),
        "starting scoring server"
    );

    start_server(AppState::new(scorer), &args.listen).await
}
