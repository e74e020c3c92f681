//! Artifact persistence
//!
//! Three independently loadable JSON blobs — model, scaler (with the
//! feature column order), and per-column encoders — each with a BLAKE3
//! hash sidecar. Hashes are verified on load when the sidecar is present.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::encode::LabelEncoder;
use crate::model::Model;
use crate::scale::StandardScaler;
use crate::transform::FittedTransform;

pub const MODEL_FILE: &str = "model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const ENCODERS_FILE: &str = "encoders.json";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("hash mismatch for {path}; artifact may be corrupt")]
    HashMismatch { path: PathBuf },
}

/// The scaler blob also carries the fitted feature column order, so the
/// transform can be reassembled from its two halves.
#[derive(Serialize, Deserialize)]
struct ScalerArtifact {
    feature_columns: Vec<String>,
    scaler: StandardScaler,
}

/// Persist the model and transform under `dir` as hashed JSON blobs.
pub fn save_artifacts(
    dir: &Path,
    model: &Model,
    transform: &FittedTransform,
) -> Result<(), ArtifactError> {
    std::fs::create_dir_all(dir).map_err(|source| ArtifactError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    write_blob(&dir.join(MODEL_FILE), model)?;
    write_blob(
        &dir.join(SCALER_FILE),
        &ScalerArtifact {
            feature_columns: transform.feature_columns().to_vec(),
            scaler: transform.scaler().clone(),
        },
    )?;
    write_blob(&dir.join(ENCODERS_FILE), transform.encoders())?;

    tracing::info!(dir = %dir.display(), "saved model artifacts");
    Ok(())
}

/// Load and reassemble the persisted artifacts.
pub fn load_artifacts(dir: &Path) -> Result<(Model, FittedTransform), ArtifactError> {
    let model: Model = read_blob(&dir.join(MODEL_FILE))?;
    let scaler_artifact: ScalerArtifact = read_blob(&dir.join(SCALER_FILE))?;
    let encoders: BTreeMap<String, LabelEncoder> = read_blob(&dir.join(ENCODERS_FILE))?;

    let transform = FittedTransform::from_parts(
        scaler_artifact.feature_columns,
        encoders,
        scaler_artifact.scaler,
    );
    Ok((model, transform))
}

fn hash_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".hash");
    PathBuf::from(os)
}

fn write_blob<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, &json).map_err(|source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    let hash = hex::encode(blake3::hash(json.as_bytes()).as_bytes());
    let hash_file = hash_path(path);
    std::fs::write(&hash_file, &hash).map_err(|source| ArtifactError::Write {
        path: hash_file.clone(),
        source,
    })?;
    Ok(())
}

fn read_blob<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let json = std::fs::read_to_string(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let hash_file = hash_path(path);
    if hash_file.exists() {
        let expected = std::fs::read_to_string(&hash_file)
            .map_err(|source| ArtifactError::Read {
                path: hash_file.clone(),
                source,
            })?;
        let actual = hex::encode(blake3::hash(json.as_bytes()).as_bytes());
        if expected.trim() != actual {
            return Err(ArtifactError::HashMismatch {
                path: path.to_path_buf(),
            });
        }
    }

    serde_json::from_str(&json).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}
