use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::model::SeasonalModel;

/// Tag written into every blob; loading rejects anything else.
pub const MODEL_FORMAT: &str = "grid-forecaster/seasonal-v1";

#[derive(Debug, Serialize, Deserialize)]
struct ModelBlob {
    format: String,
    trained_at: DateTime<Utc>,
    model: SeasonalModel,
}

/// One JSON blob at `<bucket>/<filename>`. Saving replaces it wholesale.
#[derive(Debug, Clone)]
pub struct ModelStore {
    bucket: PathBuf,
    filename: String,
}

impl ModelStore {
    pub fn new(bucket: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            filename: filename.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(cfg.require_model_bucket()?, cfg.model_filename.clone()))
    }

    pub fn location(&self) -> PathBuf {
        self.bucket.join(&self.filename)
    }

    /// Write to a sibling temp file then rename, so readers never observe a
    /// partial blob. Returns the blob size in bytes.
    pub async fn save(&self, model: &SeasonalModel) -> Result<usize> {
        let blob = ModelBlob {
            format: MODEL_FORMAT.to_string(),
            trained_at: Utc::now(),
            model: model.clone(),
        };
        let bytes = serde_json::to_vec(&blob)?;

        fs::create_dir_all(&self.bucket).await?;
        let tmp = self.bucket.join(format!(".{}.tmp", self.filename));
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, self.location()).await?;

        info!(
            bytes = bytes.len(),
            "Model uploaded to {}",
            self.location().display()
        );
        Ok(bytes.len())
    }

    pub async fn load(&self) -> Result<SeasonalModel> {
        let path = self.location();
        let bytes = fs::read(&path)
            .await
            .map_err(|e| AppError::ModelStore(format!("reading {}: {e}", path.display())))?;
        decode(&path, &bytes)
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<SeasonalModel> {
    let blob: ModelBlob = serde_json::from_slice(bytes)
        .map_err(|e| AppError::ModelStore(format!("decoding {}: {e}", path.display())))?;
    if blob.format != MODEL_FORMAT {
        return Err(AppError::ModelStore(format!(
            "{} has format `{}`, expected `{MODEL_FORMAT}`",
            path.display(),
            blob.format
        )));
    }
    info!(trained_at = %blob.trained_at, "Decoded model blob");
    Ok(blob.model)
}
