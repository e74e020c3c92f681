//! Churnkit command line pipeline
//!
//! Deterministic offline pipeline: train a churn model from the source
//! CSV sheets, score users against persisted artifacts, and generate
//! discount and plan recommendations.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use churnkit_features::{build_feature_table, churn_labels, NON_FEATURE_COLUMNS};
use churnkit_model::{
    classification_report, load_artifacts, save_artifacts, stratified_split, FittedTransform,
    GbdtConfig, GbdtTrainer, Scorer,
};
use churnkit_recommend::{recommend_discounts, recommendations_table, DiscountConfig, PlanRecommender};
use churnkit_tables::{load_tables, read_csv};

const FEATURES_FILE: &str = "features.csv";

#[derive(Parser, Debug)]
#[command(name = "churnkit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Churn risk training, scoring, and recommendation pipeline", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a churn model from the source CSV sheets
    Train {
        /// Directory holding the four source CSV files
        #[arg(short, long, default_value = "data")]
        data: PathBuf,

        /// Output directory for artifacts and the feature table
        #[arg(short, long, default_value = "artifacts")]
        output: PathBuf,

        /// Number of boosting trees
        #[arg(long, default_value = "50")]
        trees: usize,

        /// Maximum tree depth
        #[arg(long, default_value = "4")]
        max_depth: usize,

        /// Minimum samples per leaf
        #[arg(long, default_value = "2")]
        min_samples_leaf: usize,

        /// Learning rate
        #[arg(long, default_value = "0.1")]
        learning_rate: f64,

        /// Held-out fraction for the stratified split
        #[arg(long, default_value = "0.2")]
        test_fraction: f64,

        /// Random seed for the stratified split
        #[arg(long, default_value = "42")]
        seed: i64,
    },

    /// Score a single user against persisted artifacts
    Score {
        /// Directory holding the persisted artifacts
        #[arg(short, long, default_value = "artifacts")]
        artifacts: PathBuf,

        /// User identifier to score
        user_id: i64,
    },

    /// Score every user and write a predictions CSV
    Batch {
        /// Directory holding the persisted artifacts
        #[arg(short, long, default_value = "artifacts")]
        artifacts: PathBuf,

        /// Output CSV path
        #[arg(short, long, default_value = "predictions.csv")]
        output: PathBuf,
    },

    /// Recommend a retention discount per subscription
    Discounts {
        /// Directory holding the four source CSV files
        #[arg(short, long, default_value = "data")]
        data: PathBuf,

        /// Output CSV path
        #[arg(short, long, default_value = "discounts.csv")]
        output: PathBuf,
    },

    /// Recommend plans similar to a named plan
    Plans {
        /// Directory holding the four source CSV files
        #[arg(short, long, default_value = "data")]
        data: PathBuf,

        /// Plan name to query; omit to list available plans
        plan: Option<String>,

        /// Number of recommendations
        #[arg(short = 'n', long, default_value = "3")]
        top: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    match cli.command {
        Command::Train {
            data,
            output,
            trees,
            max_depth,
            min_samples_leaf,
            learning_rate,
            test_fraction,
            seed,
        } => {
            let config = GbdtConfig {
                num_trees: trees,
                max_depth,
                min_samples_leaf,
                learning_rate,
                ..GbdtConfig::default()
            };
            train(&data, &output, config, test_fraction, seed)
        }
        Command::Score { artifacts, user_id } => score(&artifacts, user_id),
        Command::Batch { artifacts, output } => batch(&artifacts, &output),
        Command::Discounts { data, output } => discounts(&data, &output),
        Command::Plans { data, plan, top } => plans(&data, plan.as_deref(), top),
    }
}

fn train(
    data: &PathBuf,
    output: &PathBuf,
    config: GbdtConfig,
    test_fraction: f64,
    seed: i64,
) -> Result<()> {
    info!("loading source tables from {}", data.display());
    let sources = load_tables(data).context("failed to load source tables")?;
    let features = build_feature_table(&sources).context("failed to build feature table")?;
    info!(
        "built feature table: {} users, {} columns",
        features.len(),
        features.columns().len()
    );

    let transform = FittedTransform::fit(&features, NON_FEATURE_COLUMNS)
        .context("failed to fit feature transform")?;
    let matrix = transform.transform_table(&features)?;
    let labels = churn_labels(&features)?;

    let split = stratified_split(&labels, test_fraction, seed);
    let train_matrix: Vec<Vec<f64>> = split.train.iter().map(|&i| matrix[i].clone()).collect();
    let train_labels: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();
    info!(
        "stratified split: {} train / {} test",
        split.train.len(),
        split.test.len()
    );

    let model = GbdtTrainer::new(config)
        .train(&train_matrix, &train_labels)
        .context("training failed")?;

    if !split.test.is_empty() {
        let truth: Vec<u8> = split.test.iter().map(|&i| labels[i]).collect();
        let predicted: Vec<u8> = split
            .test
            .iter()
            .map(|&i| model.predict(&matrix[i]))
            .collect::<Result<_, _>>()?;
        classification_report(&truth, &predicted).log();
    }

    save_artifacts(output, &model, &transform).context("failed to persist artifacts")?;
    features
        .write_csv(output.join(FEATURES_FILE))
        .context("failed to write feature table")?;
    info!("artifacts written to {}", output.display());
    Ok(())
}

fn load_scorer(artifacts: &PathBuf) -> Result<Scorer> {
    let (model, transform) = load_artifacts(artifacts)
        .with_context(|| format!("failed to load artifacts from {}", artifacts.display()))?;
    let features = read_csv(artifacts.join(FEATURES_FILE))
        .context("failed to read persisted feature table")?;
    Ok(Scorer::new(features, transform, model))
}

fn score(artifacts: &PathBuf, user_id: i64) -> Result<()> {
    let scorer = load_scorer(artifacts)?;
    let prediction = scorer.score_user(user_id, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

fn batch(artifacts: &PathBuf, output: &PathBuf) -> Result<()> {
    let scorer = load_scorer(artifacts)?;
    let predictions = scorer.score_all(Utc::now())?;
    let table = Scorer::predictions_table(&predictions)?;
    table
        .write_csv(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        "wrote {} predictions to {}",
        predictions.len(),
        output.display()
    );
    Ok(())
}

fn discounts(data: &PathBuf, output: &PathBuf) -> Result<()> {
    let sources = load_tables(data).context("failed to load source tables")?;
    let recommendations = recommend_discounts(&sources.subscriptions, &DiscountConfig::default())
        .context("failed to generate discount recommendations")?;
    let table = recommendations_table(&recommendations)?;
    table
        .write_csv(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        "wrote {} discount recommendations to {}",
        recommendations.len(),
        output.display()
    );
    Ok(())
}

fn plans(data: &PathBuf, plan: Option<&str>, top: usize) -> Result<()> {
    let sources = load_tables(data).context("failed to load source tables")?;
    let recommender = PlanRecommender::build(&[
        &sources.users,
        &sources.subscriptions,
        &sources.logs,
        &sources.billing,
    ])
    .context("failed to build plan recommender")?;

    match plan {
        Some(name) => {
            let recommendations = recommender.recommend(name, top);
            if recommendations.is_empty() {
                println!("no recommendations for plan {name:?}");
            } else {
                for rec in recommendations {
                    println!("{rec}");
                }
            }
        }
        None => {
            for name in recommender.available_plans() {
                println!("{name}");
            }
        }
    }
    Ok(())
}
