//! Churnkit modeling layer
//!
//! Fits the categorical encoders and numeric scaler, trains the GBDT churn
//! classifier with deterministic splits, scores single users and whole
//! feature tables, and persists the fitted artifacts as hashed JSON blobs.

pub mod artifacts;
pub mod cart;
pub mod deterministic;
pub mod encode;
pub mod metrics;
pub mod model;
pub mod scale;
pub mod scorer;
pub mod trainer;
pub mod transform;

pub use artifacts::{load_artifacts, save_artifacts, ArtifactError};
pub use deterministic::LcgRng;
pub use encode::LabelEncoder;
pub use metrics::{classification_report, ClassificationReport};
pub use model::{Model, ModelError, Node, Tree};
pub use scale::StandardScaler;
pub use scorer::{Prediction, ScoreError, Scorer};
pub use trainer::{stratified_split, GbdtConfig, GbdtTrainer, SplitIndices, TrainError};
pub use transform::{FittedTransform, TransformError};
